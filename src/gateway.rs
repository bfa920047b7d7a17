// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Version-control gateway.
//!
//! The gateway is the only component that touches the history repository.
//! It offers repository initialization, staged commits with an explicit
//! author date, push, and pull as idempotent primitives.
//!
//! # Lifecycle
//!
//! A gateway starts __uninitialized__. The first operation that needs the
//! repository calls [`VcsGateway::ensure_initialized`], which opens or creates
//! the repository exactly once. In rehearsal mode the gateway moves to a
//! __rehearsal__ state instead and never touches the file system or network.
//!
//! # Local And Remote Operations
//!
//! Local operations go through libgit2. Push and pull go through the git
//! binary (see [`cli`]) and their failures are classified into a
//! [`GitFailure`] (see [`failure`]). A remote that does not exist yet is not an
//! error: commits simply stay local until it appears.

pub mod cli;
pub mod failure;

pub use cli::{GitCli, GitCliError, SystemGit};
pub use failure::GitFailure;

use crate::config::{GitSettings, RetrySettings, Settings};

use chrono::{DateTime, FixedOffset};
use git2::{Commit, ErrorCode, Repository, RepositoryInitOptions, Signature, Time};
use std::{
    ffi::OsString,
    future::Future,
    path::{Path, PathBuf},
    sync::{Mutex, MutexGuard, PoisonError},
};
use tracing::{debug, error, info, instrument, warn};

/// Layer of indirection for repository access.
pub trait VcsGateway: Send + Sync + 'static {
    /// Working tree of the repository.
    fn workdir(&self) -> &Path;

    /// Whether mutating operations are only simulated.
    fn is_rehearsal(&self) -> bool;

    /// Initialize repository unless already done.
    fn ensure_initialized(&self) -> Result<()>;

    /// Open or create repository and (re-)apply identity and remote.
    fn initialize(&self) -> Result<()>;

    /// Stage paths and commit them with `date` as the author date.
    fn stage_and_commit(
        &self,
        paths: &[PathBuf],
        message: &str,
        date: DateTime<FixedOffset>,
    ) -> Result<CommitSummary>;

    /// Push branch to remote, retrying with linear backoff.
    fn push(
        &self,
        remote: Option<&str>,
        branch: Option<&str>,
    ) -> impl Future<Output = Result<PushOutcome>> + Send;

    /// Pull branch from remote with rebase.
    fn pull(
        &self,
        remote: Option<&str>,
        branch: Option<&str>,
    ) -> impl Future<Output = Result<PullOutcome>> + Send;
}

/// Result of a single commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitSummary {
    /// Object id, absent for rehearsed commits.
    pub oid: Option<String>,

    /// Files that differ from the parent commit.
    pub files_changed: usize,

    /// Author date recorded in the commit.
    pub authored_at: DateTime<FixedOffset>,
}

impl CommitSummary {
    /// Synthetic zero-change result for rehearsal mode.
    pub fn rehearsal(authored_at: DateTime<FixedOffset>) -> Self {
        Self {
            oid: None,
            files_changed: 0,
            authored_at,
        }
    }
}

/// Result of a push.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushOutcome {
    /// Remote accepted the branch.
    Pushed { remote: String, branch: String },

    /// Remote is absent; commits remain local only.
    LocalOnly { reason: GitFailure },

    /// Rehearsal mode, nothing was sent.
    Rehearsed,
}

impl PushOutcome {
    pub fn pushed(&self) -> bool {
        matches!(self, Self::Pushed { .. })
    }

    pub fn local(&self) -> bool {
        true
    }
}

/// Result of a pull.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PullOutcome {
    /// Pull ran to completion.
    Updated { summary: String },

    /// Nothing valid to pull; local state kept as-is.
    Skipped { reason: GitFailure },

    /// Rehearsal mode, nothing was fetched.
    Rehearsed,
}

enum RepoState {
    Uninitialized,
    Rehearsal,
    Ready(Repository),
}

/// Repository access through libgit2 and the git binary.
pub struct Git2Gateway<C = SystemGit>
where
    C: GitCli,
{
    workdir: PathBuf,
    git: GitSettings,
    retry: RetrySettings,
    dry_run: bool,
    cli: C,
    state: Mutex<RepoState>,
}

impl Git2Gateway<SystemGit> {
    /// Construct new gateway using the git binary on `PATH`.
    pub fn new(settings: &Settings) -> Self {
        Self::with_cli(settings, SystemGit::new(settings.retry.command_timeout()))
    }
}

impl<C> Git2Gateway<C>
where
    C: GitCli,
{
    /// Construct new gateway with custom git command runner.
    pub fn with_cli(settings: &Settings, cli: C) -> Self {
        Self {
            workdir: settings.git.repo_path.clone(),
            git: settings.git.clone(),
            retry: settings.retry.clone(),
            dry_run: settings.dry_run,
            cli,
            state: Mutex::new(RepoState::Uninitialized),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RepoState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn open_or_init(&self) -> Result<RepoState> {
        if self.dry_run {
            info!(
                "rehearsal: skip repository initialization at {:?}",
                self.workdir.display()
            );
            return Ok(RepoState::Rehearsal);
        }

        mkdirp::mkdirp(&self.workdir).map_err(|err| GatewayError::Workdir {
            source: err,
            path: self.workdir.clone(),
        })?;

        let repository = match Repository::open(&self.workdir) {
            Ok(repository) => {
                debug!("open repository: {:?}", self.workdir.display());
                repository
            }
            Err(err) if err.code() == ErrorCode::NotFound => {
                info!("initialize new repository: {:?}", self.workdir.display());
                let mut opts = RepositoryInitOptions::new();
                opts.initial_head(&self.git.branch);
                Repository::init_opts(&self.workdir, &opts)?
            }
            Err(err) => return Err(err.into()),
        };

        self.configure(&repository)?;

        Ok(RepoState::Ready(repository))
    }

    fn configure(&self, repository: &Repository) -> Result<()> {
        // INVARIANT: Identity is always re-applied, even on existing repositories.
        let mut config = repository.config()?;
        config.set_str("user.name", self.git.author_name())?;
        config.set_str("user.email", self.git.author_email())?;

        let Some(url) = self
            .git
            .remote_url
            .as_deref()
            .filter(|url| !url.trim().is_empty())
        else {
            debug!("no remote url configured");
            return Ok(());
        };

        match repository.find_remote(&self.git.remote_name) {
            Ok(_) => debug!("remote {} already present", self.git.remote_name),
            Err(err) if err.code() == ErrorCode::NotFound => {
                info!("add remote {} -> {url}", self.git.remote_name);
                repository.remote(&self.git.remote_name, url)?;
            }
            Err(err) => return Err(err.into()),
        }

        Ok(())
    }

    fn has_remote(&self, remote: &str) -> bool {
        match &*self.lock() {
            RepoState::Ready(repository) => repository.find_remote(remote).is_ok(),
            RepoState::Uninitialized | RepoState::Rehearsal => false,
        }
    }

    fn relative<'a>(&self, path: &'a Path) -> &'a Path {
        path.strip_prefix(&self.workdir).unwrap_or(path)
    }
}

impl<C> VcsGateway for Git2Gateway<C>
where
    C: GitCli,
{
    fn workdir(&self) -> &Path {
        &self.workdir
    }

    fn is_rehearsal(&self) -> bool {
        self.dry_run
    }

    fn ensure_initialized(&self) -> Result<()> {
        let mut state = self.lock();
        if matches!(*state, RepoState::Uninitialized) {
            *state = self.open_or_init()?;
        }

        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    fn initialize(&self) -> Result<()> {
        let mut state = self.lock();
        *state = self.open_or_init()?;

        Ok(())
    }

    #[instrument(skip(self, paths), level = "debug")]
    fn stage_and_commit(
        &self,
        paths: &[PathBuf],
        message: &str,
        date: DateTime<FixedOffset>,
    ) -> Result<CommitSummary> {
        self.ensure_initialized()?;
        let state = self.lock();
        let RepoState::Ready(repository) = &*state else {
            info!(%date, "rehearsal: skip commit {message:?}");
            return Ok(CommitSummary::rehearsal(date));
        };

        // INVARIANT: Always use new tree produced by index after staging paths.
        let mut index = repository.index()?;
        for path in paths {
            index.add_path(self.relative(path))?;
        }
        index.write()?;
        let tree = repository.find_tree(index.write_tree()?)?;

        // INVARIANT: Always append to the latest commit of HEAD, if any.
        let parent = repository
            .head()
            .ok()
            .and_then(|head| head.peel_to_commit().ok());
        let parent_tree = parent.as_ref().map(Commit::tree).transpose()?;
        let files_changed = repository
            .diff_tree_to_tree(parent_tree.as_ref(), Some(&tree), None)?
            .stats()?
            .files_changed();

        // INVARIANT: Author date is the requested date, committer date is now.
        let name = self.git.author_name();
        let email = self.git.author_email();
        let when = Time::new(date.timestamp(), date.offset().local_minus_utc() / 60);
        let author = Signature::new(name, email, &when)?;
        let committer = Signature::now(name, email)?;
        let parents = parent.iter().collect::<Vec<_>>();
        let oid = repository.commit(Some("HEAD"), &author, &committer, message, &tree, &parents)?;

        info!(%oid, %date, files_changed, "commit {message:?}");

        Ok(CommitSummary {
            oid: Some(oid.to_string()),
            files_changed,
            authored_at: date,
        })
    }

    #[instrument(skip(self), level = "debug")]
    async fn push(&self, remote: Option<&str>, branch: Option<&str>) -> Result<PushOutcome> {
        self.ensure_initialized()?;
        let remote = remote.unwrap_or(self.git.remote_name.as_str());
        let branch = branch.unwrap_or(self.git.branch.as_str());

        if self.dry_run {
            info!(remote, branch, "rehearsal: skip push");
            return Ok(PushOutcome::Rehearsed);
        }

        if !self.has_remote(remote) {
            warn!(remote, branch, "remote is not configured, commits stay local");
            return Ok(PushOutcome::LocalOnly {
                reason: GitFailure::NoRemote,
            });
        }

        let attempts = self.retry.max_retries.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            let args: Vec<OsString> = vec![
                "push".into(),
                remote.into(),
                format!("HEAD:refs/heads/{branch}").into(),
            ];

            match self.cli.run(&self.workdir, args).await {
                Ok(output) => {
                    info!(remote, branch, attempt, "push complete");
                    debug!("{output}");
                    return Ok(PushOutcome::Pushed {
                        remote: remote.to_string(),
                        branch: branch.to_string(),
                    });
                }
                Err(err) => {
                    let failure = err.classify();
                    if failure.is_remote_absent() {
                        warn!(remote, branch, %failure, "remote is absent, commits stay local");
                        return Ok(PushOutcome::LocalOnly { reason: failure });
                    }

                    if attempt >= attempts {
                        error!(remote, branch, attempts, "push failed: {err}");
                        return Err(GatewayError::PushExhausted {
                            attempts,
                            source: err,
                        });
                    }

                    let delay = self.retry.delay() * attempt;
                    warn!(remote, branch, attempt, ?delay, "push failed, retrying: {err}");
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    #[instrument(skip(self), level = "debug")]
    async fn pull(&self, remote: Option<&str>, branch: Option<&str>) -> Result<PullOutcome> {
        self.ensure_initialized()?;
        let remote = remote.unwrap_or(self.git.remote_name.as_str());
        let branch = branch.unwrap_or(self.git.branch.as_str());

        if self.dry_run {
            info!(remote, branch, "rehearsal: skip pull");
            return Ok(PullOutcome::Rehearsed);
        }

        if !self.has_remote(remote) {
            debug!(remote, "remote is not configured, nothing to pull");
            return Ok(PullOutcome::Skipped {
                reason: GitFailure::NoRemote,
            });
        }

        let args: Vec<OsString> = vec![
            "pull".into(),
            "--rebase".into(),
            remote.into(),
            branch.into(),
        ];

        match self.cli.run(&self.workdir, args).await {
            Ok(summary) => {
                info!(remote, branch, "pull complete");
                Ok(PullOutcome::Updated { summary })
            }
            Err(err) => {
                let failure = err.classify();
                if failure.is_pull_recoverable() {
                    warn!(remote, branch, %failure, "nothing to pull");
                    return Ok(PullOutcome::Skipped { reason: failure });
                }

                Err(GatewayError::Pull {
                    remote: remote.to_string(),
                    branch: branch.to_string(),
                    source: err,
                })
            }
        }
    }
}

/// Gateway error types.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Operations from libgit2 fail.
    #[error(transparent)]
    Git2(#[from] git2::Error),

    /// Working directory cannot be created.
    #[error("failed to prepare working directory {path:?}")]
    Workdir {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Push kept failing for a reason other than an absent remote.
    #[error("push failed after {attempts} attempt(s)")]
    PushExhausted {
        attempts: u32,
        #[source]
        source: GitCliError,
    },

    /// Pull failed for a reason that cannot be skipped.
    #[error("pull from {remote}/{branch} failed")]
    Pull {
        remote: String,
        branch: String,
        #[source]
        source: GitCliError,
    },
}

/// Friendly result alias :3
pub type Result<T, E = GatewayError> = std::result::Result<T, E>;
