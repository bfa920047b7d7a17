// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Configuration layout.
//!
//! Specify the layout of the configuration file that greenwall reads at
//! startup. Every section and field has a default, so an empty or missing
//! file yields a usable development setup. The loaded [`Settings`] value is
//! constructed once and handed to each component that needs it.
//!
//! # General Layout
//!
//! ```toml
//! environment = "production"
//! dry_run = false
//! marker_file = "contribution.json"
//!
//! [git]
//! repo_path = "~/history"
//! user_name = "Jane Doe"
//! user_email = "jane@doe.org"
//! remote_name = "origin"
//! branch = "main"
//! remote_url = "git@github.com:jane/history.git"
//!
//! [schedule]
//! cron = "0 12 * * *"
//! timezone = "Europe/Berlin"
//!
//! [pattern.grids]
//! bar = ["#", "#", "#", "#", "#", "#", "#"]
//! ```

use chrono::NaiveDate;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fmt::{Display, Error as FmtError, Formatter, Result as FmtResult},
    fs::read_to_string,
    io::ErrorKind,
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};

/// Fallback author name when none is configured.
pub const FALLBACK_USER_NAME: &str = "greenwall";

/// Fallback author email when none is configured.
pub const FALLBACK_USER_EMAIL: &str = "greenwall@localhost";

/// Complete runtime settings.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    /// Deployment environment, decides how strict validation is.
    pub environment: Environment,

    /// Rehearsal mode: simulate and log every mutating operation.
    pub dry_run: bool,

    /// Marker file rewritten before each commit, relative to the repository.
    pub marker_file: PathBuf,

    pub git: GitSettings,
    pub commits: CommitSettings,
    pub backfill: BackfillSettings,
    pub schedule: ScheduleSettings,
    pub pattern: PatternSettings,
    pub retry: RetrySettings,
    pub server: ServerSettings,
    pub log: LogSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            environment: Environment::default(),
            dry_run: false,
            marker_file: PathBuf::from("contribution.json"),
            git: GitSettings::default(),
            commits: CommitSettings::default(),
            backfill: BackfillSettings::default(),
            schedule: ScheduleSettings::default(),
            pattern: PatternSettings::default(),
            retry: RetrySettings::default(),
            server: ServerSettings::default(),
            log: LogSettings::default(),
        }
    }
}

impl Settings {
    /// Load settings from configuration file at target path.
    ///
    /// A missing file is not an error; defaults are used instead.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::Read`] if the file exists but cannot be read.
    /// - Return [`ConfigError::Deserialize`] if the file is not valid TOML
    ///   for this layout.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        match read_to_string(path.as_ref()) {
            Ok(data) => data.parse(),
            Err(err) if err.kind() == ErrorKind::NotFound => Settings::default().expanded(),
            Err(err) => Err(ConfigError::Read {
                source: err,
                path: path.as_ref().to_path_buf(),
            }),
        }
    }

    /// Validate settings as a whole.
    ///
    /// Bound violations are always errors. Missing identity fields are errors
    /// in a production environment and warnings otherwise. Returns the list of
    /// warnings on success.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::Bounds`] if a minimum exceeds its maximum.
    /// - Return [`ConfigError::Invalid`] if a field holds an unusable value.
    /// - Return [`ConfigError::MissingRequired`] if a production setup lacks
    ///   identity or remote information.
    pub fn validate(&self) -> Result<Vec<String>> {
        check_bounds(
            "commits.min_per_day",
            self.commits.min_per_day,
            self.commits.max_per_day,
        )?;
        check_bounds(
            "backfill.min_commits",
            self.backfill.min_commits,
            self.backfill.max_commits,
        )?;

        if self.retry.max_retries == 0 {
            return Err(ConfigError::Invalid(
                "retry.max_retries must be at least 1".into(),
            ));
        }

        if self.pattern.intensity == 0 {
            return Err(ConfigError::Invalid(
                "pattern.intensity must be at least 1".into(),
            ));
        }

        if let (Some(start), Some(end)) = (self.backfill.start_date, self.backfill.end_date) {
            if start > end {
                return Err(ConfigError::Invalid(format!(
                    "backfill.start_date {start} is after backfill.end_date {end}"
                )));
            }
        }

        let mut missing = Vec::new();
        if self.git.user_name.trim().is_empty() {
            missing.push("git.user_name");
        }
        if self.git.user_email.trim().is_empty() {
            missing.push("git.user_email");
        }
        if self.git.remote_url.as_deref().is_none_or(|url| url.trim().is_empty()) {
            missing.push("git.remote_url");
        }

        if missing.is_empty() {
            return Ok(Vec::new());
        }

        if self.environment.is_production() {
            return Err(ConfigError::MissingRequired(missing.join(", ")));
        }

        Ok(missing
            .into_iter()
            .map(|field| format!("{field} is not set"))
            .collect())
    }

    fn expanded(mut self) -> Result<Self> {
        // INVARIANT: Perform shell expansion on every path field.
        self.git.repo_path = expand_path(&self.git.repo_path)?;
        self.marker_file = expand_path(&self.marker_file)?;

        Ok(self)
    }
}

impl FromStr for Settings {
    type Err = ConfigError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let settings: Settings = toml::de::from_str(data).map_err(ConfigError::Deserialize)?;
        settings.expanded()
    }
}

impl Display for Settings {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(
            toml::ser::to_string_pretty(self)
                .map_err(ConfigError::Serialize)?
                .as_str(),
        )
    }
}

/// Deployment environment.
#[derive(Default, Debug, PartialEq, Eq, Clone, Copy, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl Environment {
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }
}

/// Repository identity and remote settings.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GitSettings {
    /// Working tree of the history repository.
    pub repo_path: PathBuf,

    /// Author name applied to the repository configuration.
    pub user_name: String,

    /// Author email applied to the repository configuration.
    pub user_email: String,

    /// Name of the remote to push to and pull from.
    pub remote_name: String,

    /// Branch to push to and pull from.
    pub branch: String,

    /// URL of the remote. No remote is added when unset.
    pub remote_url: Option<String>,
}

impl Default for GitSettings {
    fn default() -> Self {
        Self {
            repo_path: crate::path::default_repo_dir().unwrap_or_else(|_| PathBuf::from(".")),
            user_name: String::new(),
            user_email: String::new(),
            remote_name: "origin".into(),
            branch: "main".into(),
            remote_url: None,
        }
    }
}

impl GitSettings {
    /// Author name, falling back to [`FALLBACK_USER_NAME`] when unset.
    pub fn author_name(&self) -> &str {
        non_blank(&self.user_name).unwrap_or(FALLBACK_USER_NAME)
    }

    /// Author email, falling back to [`FALLBACK_USER_EMAIL`] when unset.
    pub fn author_email(&self) -> &str {
        non_blank(&self.user_email).unwrap_or(FALLBACK_USER_EMAIL)
    }
}

/// Cardinality and pacing of "today" runs.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CommitSettings {
    pub min_per_day: u32,
    pub max_per_day: u32,

    /// Pause between consecutive commits in milliseconds.
    pub delay_ms: u64,
}

impl Default for CommitSettings {
    fn default() -> Self {
        Self {
            min_per_day: 1,
            max_per_day: 5,
            delay_ms: 100,
        }
    }
}

impl CommitSettings {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

/// Defaults for backfill runs. Command line arguments take precedence.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BackfillSettings {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub skip_weekends: bool,
    pub min_commits: u32,
    pub max_commits: u32,

    /// Pause between consecutive commits in milliseconds. Also used between
    /// pattern commits.
    pub delay_ms: u64,
}

impl Default for BackfillSettings {
    fn default() -> Self {
        Self {
            start_date: None,
            end_date: None,
            skip_weekends: false,
            min_commits: 1,
            max_commits: 3,
            delay_ms: 50,
        }
    }
}

impl BackfillSettings {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

/// Recurring trigger settings.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ScheduleSettings {
    /// Cron expression, five fields or six/seven with seconds.
    pub cron: String,

    /// IANA timezone for the cron expression and for "today".
    pub timezone: Tz,
}

impl Default for ScheduleSettings {
    fn default() -> Self {
        Self {
            cron: "0 12 * * *".into(),
            timezone: Tz::UTC,
        }
    }
}

/// Pattern drawing settings.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PatternSettings {
    /// How many years back week zero of the graph starts.
    pub years_back: u32,

    /// Commits per lit cell.
    pub intensity: u32,

    /// Additional named grids, seven rows each, `#` marks a lit cell.
    pub grids: BTreeMap<String, Vec<String>>,
}

impl Default for PatternSettings {
    fn default() -> Self {
        Self {
            years_back: 1,
            intensity: 1,
            grids: BTreeMap::new(),
        }
    }
}

/// Push retry policy.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Total push attempts.
    pub max_retries: u32,

    /// Base delay in milliseconds, multiplied by the attempt number.
    pub delay_ms: u64,

    /// Upper bound for a single external git command.
    pub command_timeout_secs: Option<u64>,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            delay_ms: 1000,
            command_timeout_secs: None,
        }
    }
}

impl RetrySettings {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    pub fn command_timeout(&self) -> Option<Duration> {
        self.command_timeout_secs.map(Duration::from_secs)
    }
}

/// Control surface settings.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerSettings {
    pub bind: String,
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".into(),
            port: 3000,
        }
    }
}

impl ServerSettings {
    pub fn address(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}

/// Logging settings.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LogSettings {
    /// Filter directive used when `RUST_LOG` is not set.
    pub level: String,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

fn check_bounds(field: &'static str, min: u32, max: u32) -> Result<()> {
    if min > max {
        return Err(ConfigError::Bounds { field, min, max });
    }

    Ok(())
}

fn expand_path(path: &Path) -> Result<PathBuf> {
    Ok(PathBuf::from(
        shellexpand::full(path.to_string_lossy().as_ref())
            .map_err(ConfigError::ShellExpansion)?
            .into_owned(),
    ))
}

fn non_blank(value: &str) -> Option<&str> {
    let value = value.trim();
    (!value.is_empty()).then_some(value)
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read configuration file {path:?}")]
    Read {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Failed to deserialize configuration.
    #[error(transparent)]
    Deserialize(#[from] toml::de::Error),

    /// Failed to serialize configuration.
    #[error(transparent)]
    Serialize(#[from] toml::ser::Error),

    /// Failed to perform shell expansion on configuration.
    #[error(transparent)]
    ShellExpansion(#[from] shellexpand::LookupError<std::env::VarError>),

    /// Minimum exceeds maximum.
    #[error("{field} ({min}) exceeds its maximum ({max})")]
    Bounds {
        field: &'static str,
        min: u32,
        max: u32,
    },

    /// Field holds an unusable value.
    #[error("{0}")]
    Invalid(String),

    /// Production setup lacks required fields.
    #[error("missing required settings for production: {0}")]
    MissingRequired(String),
}

impl From<ConfigError> for FmtError {
    fn from(_: ConfigError) -> Self {
        FmtError
    }
}

/// Friendly result alias :3
type Result<T, E = ConfigError> = std::result::Result<T, E>;
