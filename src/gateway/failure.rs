// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Failure classification for network git operations.
//!
//! Push and pull run through the git binary, whose only failure report is
//! human-readable text. That text is translated into a [`GitFailure`] exactly
//! once, right where the command fails. Everything above the command boundary
//! branches on the enum.
//!
//! Commands always run with `LC_ALL=C`, so the messages matched here are the
//! untranslated ones.

use serde::Serialize;
use std::fmt::{Display, Formatter, Result as FmtResult};

/// Why a push or pull did not go through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GitFailure {
    /// No remote by that name is configured locally.
    NoRemote,

    /// Remote exists but has no such branch.
    RemoteRefNotFound,

    /// Remote URL does not point at a repository.
    NotARepository,

    /// Hosting service reports the repository does not exist.
    RepositoryNotFound,

    /// Remote host cannot be reached.
    Unreachable,

    /// Current branch has no upstream.
    NoTrackingInfo,

    /// Working tree holds changes that block a rebase.
    UnstagedChanges,

    /// Anything else, e.g., rejected pushes or authentication failures.
    Other,
}

// Order matters: git often follows a specific message with the generic
// "could not read from remote repository" line.
const SIGNATURES: &[(&str, GitFailure)] = &[
    ("there is no tracking information", GitFailure::NoTrackingInfo),
    ("couldn't find remote ref", GitFailure::RemoteRefNotFound),
    ("remote ref does not exist", GitFailure::RemoteRefNotFound),
    ("repository not found", GitFailure::RepositoryNotFound),
    ("does not appear to be a git repository", GitFailure::NotARepository),
    ("not a git repository", GitFailure::NotARepository),
    ("you have unstaged changes", GitFailure::UnstagedChanges),
    ("your local changes to the following files would be overwritten", GitFailure::UnstagedChanges),
    ("could not resolve host", GitFailure::Unreachable),
    ("failed to connect to", GitFailure::Unreachable),
    ("connection refused", GitFailure::Unreachable),
    ("network is unreachable", GitFailure::Unreachable),
    ("could not read from remote repository", GitFailure::Unreachable),
];

impl GitFailure {
    /// Classify output of a failed git command.
    pub fn classify(output: &str) -> Self {
        let output = output.to_lowercase();

        // HTTPS remotes phrase it as "repository 'https://...' not found".
        if output.contains("repository '") && output.contains("' not found") {
            return Self::RepositoryNotFound;
        }

        SIGNATURES
            .iter()
            .find(|(signature, _)| output.contains(signature))
            .map(|(_, failure)| *failure)
            .unwrap_or(Self::Other)
    }

    /// Remote or remote branch does not exist, or cannot be reached.
    ///
    /// A push failing this way leaves the commits safely local.
    pub fn is_remote_absent(self) -> bool {
        matches!(
            self,
            Self::NoRemote
                | Self::RemoteRefNotFound
                | Self::NotARepository
                | Self::RepositoryNotFound
                | Self::Unreachable
        )
    }

    /// Nothing valid to pull yet, or local state takes precedence.
    pub fn is_pull_recoverable(self) -> bool {
        matches!(
            self,
            Self::NoRemote
                | Self::NoTrackingInfo
                | Self::RemoteRefNotFound
                | Self::NotARepository
                | Self::RepositoryNotFound
                | Self::UnstagedChanges
        )
    }
}

impl Display for GitFailure {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        let label = match self {
            Self::NoRemote => "remote is not configured",
            Self::RemoteRefNotFound => "remote branch does not exist",
            Self::NotARepository => "remote is not a git repository",
            Self::RepositoryNotFound => "remote repository not found",
            Self::Unreachable => "remote is unreachable",
            Self::NoTrackingInfo => "no tracking information",
            Self::UnstagedChanges => "unstaged local changes",
            Self::Other => "unclassified failure",
        };
        fmt.write_str(label)
    }
}
