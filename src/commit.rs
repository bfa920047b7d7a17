// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Commit production.
//!
//! Every fabricated commit rewrites a single __marker file__ with a fresh
//! record before committing it. The record carries a random identifier, so no
//! two commits ever share the same content, even when they share a timestamp.

use crate::gateway::{CommitSummary, GatewayError, VcsGateway};

use chrono::{DateTime, SecondsFormat, TimeZone};
use rand::{seq::SliceRandom, Rng};
use serde::Serialize;
use std::{
    fmt::Display,
    fs::write,
    path::{Path, PathBuf},
    sync::Arc,
};
use tracing::{debug, error, info};
use uuid::Uuid;

const KINDS: &[&str] = &["feat", "fix", "docs", "chore", "refactor", "style", "test"];

/// One logical unit of fabricated history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitRecord<Tz: TimeZone> {
    pub timestamp: DateTime<Tz>,
    pub message: String,
    pub id: Uuid,
}

impl<Tz> CommitRecord<Tz>
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    /// Construct new commit record, generating a message if none is given.
    pub fn new(timestamp: DateTime<Tz>, message: Option<String>) -> Self {
        let message = message.unwrap_or_else(|| default_message(&timestamp));
        Self {
            timestamp,
            message,
            id: Uuid::new_v4(),
        }
    }

    /// Serialize record as marker file content.
    pub fn to_marker(&self) -> Result<String> {
        let marker = Marker {
            date: self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, false),
            message: &self.message,
            timestamp: self.timestamp.timestamp_millis(),
            id: self.id,
        };

        Ok(serde_json::to_string_pretty(&marker)?)
    }
}

#[derive(Serialize)]
struct Marker<'a> {
    date: String,
    message: &'a str,
    timestamp: i64,
    id: Uuid,
}

/// Generate commit message of the form
/// `<kind>: contribution <YYYY-MM-DD HH:MM:SS> [<8 hex digits>]`.
pub fn default_message<Tz>(timestamp: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let mut rng = rand::thread_rng();
    let kind = KINDS.choose(&mut rng).copied().unwrap_or("chore");
    let tag: u32 = rng.gen();
    format!(
        "{kind}: contribution {} [{tag:08x}]",
        timestamp.format("%Y-%m-%d %H:%M:%S")
    )
}

/// Write marker file and commit it at a requested timestamp.
pub struct CommitProducer<G>
where
    G: VcsGateway,
{
    gateway: Arc<G>,
    marker_path: PathBuf,
}

impl<G> CommitProducer<G>
where
    G: VcsGateway,
{
    /// Construct new commit producer.
    ///
    /// A relative `marker_path` is resolved against the gateway's working
    /// tree.
    pub fn new(gateway: Arc<G>, marker_path: impl AsRef<Path>) -> Self {
        let marker_path = gateway.workdir().join(marker_path.as_ref());
        Self {
            gateway,
            marker_path,
        }
    }

    pub fn gateway(&self) -> &Arc<G> {
        &self.gateway
    }

    pub fn marker_path(&self) -> &Path {
        &self.marker_path
    }

    /// Create one commit dated at `timestamp`.
    ///
    /// # Errors
    ///
    /// - Return [`CommitError::Gateway`] if the repository operation fails.
    /// - Return [`CommitError::MarkerFile`] if the marker file cannot be
    ///   written.
    pub fn create_commit<Tz>(
        &self,
        timestamp: DateTime<Tz>,
        message: Option<String>,
    ) -> Result<CommitSummary>
    where
        Tz: TimeZone,
        Tz::Offset: Display,
    {
        let record = CommitRecord::new(timestamp, message);
        self.commit_record(&record).inspect_err(|err| {
            error!(
                timestamp = %record.timestamp,
                message = record.message,
                "failed to create commit: {err}"
            );
        })
    }

    fn commit_record<Tz>(&self, record: &CommitRecord<Tz>) -> Result<CommitSummary>
    where
        Tz: TimeZone,
        Tz::Offset: Display,
    {
        self.gateway.ensure_initialized()?;

        let contents = record.to_marker()?;
        if self.gateway.is_rehearsal() {
            info!(
                "rehearsal: skip writing {:?} for {}",
                self.marker_path.display(),
                record.id
            );
        } else {
            if let Some(parent) = self.marker_path.parent() {
                mkdirp::mkdirp(parent).map_err(|err| CommitError::MarkerFile {
                    source: err,
                    path: self.marker_path.clone(),
                })?;
            }
            write(&self.marker_path, &contents).map_err(|err| CommitError::MarkerFile {
                source: err,
                path: self.marker_path.clone(),
            })?;
            debug!("wrote marker {:?}", self.marker_path.display());
        }

        Ok(self.gateway.stage_and_commit(
            std::slice::from_ref(&self.marker_path),
            &record.message,
            record.timestamp.fixed_offset(),
        )?)
    }
}

/// Commit production error types.
#[derive(Debug, thiserror::Error)]
pub enum CommitError {
    /// Repository operation fails.
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    /// Marker record cannot be serialized.
    #[error(transparent)]
    Serialize(#[from] serde_json::Error),

    /// Marker file cannot be written.
    #[error("failed to write marker file {path:?}")]
    MarkerFile {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },
}

/// Friendly result alias :3
pub type Result<T, E = CommitError> = std::result::Result<T, E>;
