// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Run orchestration.
//!
//! A __run__ is one batch of commits. Greenwall knows three kinds:
//!
//! - __Today__: a random number of commits spread over the next twelve hours.
//! - __Backfill__: a random number of commits on every day of a historical
//!   date range, optionally leaving weekends empty.
//! - __Pattern__: one or more commits per lit cell of a pattern grid, in
//!   grid order.
//!
//! Commits within a run are always created one after another. Each commit
//! rewrites the marker file and advances the index, so a run must be the
//! only writer of the repository while it lasts.

use crate::{
    commit::{CommitError, CommitProducer},
    config::{BackfillSettings, CommitSettings, Settings},
    coords::{localize, CoordinateMapper, PatternBook, PatternError},
    gateway::{CommitSummary, VcsGateway},
};

use chrono::{Datelike, NaiveDate, NaiveTime, TimeDelta, Utc, Weekday};
use chrono_tz::Tz;
use indicatif::ProgressBar;
use rand::Rng;
use serde::Serialize;
use std::{sync::Arc, time::Duration};
use tracing::{debug, info, instrument, warn};

/// Commits of a "today" run land within this window after now.
const TODAY_WINDOW_SECS: i64 = 12 * 60 * 60;

/// Backfill commits land between these hours, end exclusive.
const WORKING_HOURS: std::ops::Range<u32> = 9..21;

/// Processed days between two backfill progress checkpoints.
const CHECKPOINT_DAYS: u64 = 7;

/// Outcome of a today or pattern run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunResult {
    /// Successful commits in creation order.
    pub commits: Vec<CommitSummary>,

    /// Failed commits that were logged and skipped.
    pub errors: usize,
}

impl RunResult {
    pub fn created(&self) -> usize {
        self.commits.len()
    }
}

/// Outcome of a backfill run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BackfillReport {
    /// Days that received commits.
    pub total_days: u64,
    pub total_commits: u64,

    /// Weekend days left empty.
    pub skipped_days: u64,
    pub errors: u64,
}

/// Date range and cardinality of a backfill run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackfillPlan {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub skip_weekends: bool,
    pub min_commits: u32,
    pub max_commits: u32,
}

impl BackfillPlan {
    /// Construct plan from configured backfill defaults.
    ///
    /// # Errors
    ///
    /// - Return [`RunError::MissingRange`] if no start or end date is
    ///   configured.
    pub fn from_settings(settings: &BackfillSettings) -> Result<Self> {
        let (Some(start), Some(end)) = (settings.start_date, settings.end_date) else {
            return Err(RunError::MissingRange);
        };

        Ok(Self {
            start,
            end,
            skip_weekends: settings.skip_weekends,
            min_commits: settings.min_commits,
            max_commits: settings.max_commits,
        })
    }

    /// Check range and bounds.
    ///
    /// # Errors
    ///
    /// - Return [`RunError::InvalidPlan`] if start is after end, or minimum
    ///   exceeds maximum.
    pub fn validate(&self) -> Result<()> {
        if self.start > self.end {
            return Err(RunError::InvalidPlan(format!(
                "start date {} is after end date {}",
                self.start, self.end
            )));
        }

        if self.min_commits > self.max_commits {
            return Err(RunError::InvalidPlan(format!(
                "minimum commits ({}) exceeds maximum commits ({})",
                self.min_commits, self.max_commits
            )));
        }

        Ok(())
    }

    /// Number of days in range, both ends inclusive.
    pub fn day_count(&self) -> u64 {
        u64::try_from((self.end - self.start).num_days() + 1).unwrap_or(0)
    }

    /// Iterate days in range.
    pub fn days(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.start.iter_days().take_while(move |date| *date <= self.end)
    }
}

/// Sequence commit production for today, backfill, and pattern runs.
pub struct Orchestrator<G>
where
    G: VcsGateway,
{
    producer: CommitProducer<G>,
    mapper: CoordinateMapper,
    patterns: PatternBook,
    commits: CommitSettings,
    backfill_delay: Duration,
    intensity: u32,
}

impl<G> Orchestrator<G>
where
    G: VcsGateway,
{
    /// Construct new orchestrator.
    ///
    /// # Errors
    ///
    /// - Return [`RunError::Pattern`] if a configured pattern grid is
    ///   malformed.
    /// - Return [`RunError::InvalidPlan`] if daily bounds are inverted.
    pub fn new(settings: &Settings, gateway: Arc<G>) -> Result<Self> {
        if settings.commits.min_per_day > settings.commits.max_per_day {
            return Err(RunError::InvalidPlan(format!(
                "minimum commits per day ({}) exceeds maximum ({})",
                settings.commits.min_per_day, settings.commits.max_per_day
            )));
        }

        Ok(Self {
            producer: CommitProducer::new(gateway, &settings.marker_file),
            mapper: CoordinateMapper::new(
                settings.schedule.timezone,
                settings.pattern.years_back,
            ),
            patterns: PatternBook::with_custom(&settings.pattern.grids)?,
            commits: settings.commits.clone(),
            backfill_delay: settings.backfill.delay(),
            intensity: settings.pattern.intensity,
        })
    }

    pub fn gateway(&self) -> &Arc<G> {
        self.producer.gateway()
    }

    pub fn producer(&self) -> &CommitProducer<G> {
        &self.producer
    }

    pub fn mapper(&self) -> &CoordinateMapper {
        &self.mapper
    }

    pub fn patterns(&self) -> &PatternBook {
        &self.patterns
    }

    fn timezone(&self) -> Tz {
        self.mapper.timezone()
    }

    /// Create a random number of commits dated within the next twelve hours.
    ///
    /// Failed commits are logged and counted; they never abort the run.
    #[instrument(skip(self), level = "debug")]
    pub async fn run_today(&self) -> RunResult {
        let count = rand::thread_rng()
            .gen_range(self.commits.min_per_day..=self.commits.max_per_day);
        let now = Utc::now().with_timezone(&self.timezone());
        info!(count, "create commits for {}", now.date_naive());

        let mut result = RunResult::default();
        for index in 0..count {
            if index > 0 {
                tokio::time::sleep(self.commits.delay()).await;
            }

            let offset = TimeDelta::seconds(rand::thread_rng().gen_range(0..TODAY_WINDOW_SECS));
            match self.producer.create_commit(now + offset, None) {
                Ok(summary) => result.commits.push(summary),
                Err(err) => {
                    warn!(index, "skip failed commit: {err}");
                    result.errors += 1;
                }
            }
        }

        info!(
            created = result.created(),
            errors = result.errors,
            "today's run finished"
        );
        result
    }

    /// Create commits on every day of a date range.
    ///
    /// Failed commits are logged and counted; they never abort the day or the
    /// range. Progress is reported through `progress`, and logged every seven
    /// processed days.
    ///
    /// # Errors
    ///
    /// - Return [`RunError::InvalidPlan`] if the plan is malformed.
    #[instrument(skip(self, progress), level = "debug")]
    pub async fn run_backfill(
        &self,
        plan: &BackfillPlan,
        progress: &ProgressBar,
    ) -> Result<BackfillReport> {
        plan.validate()?;
        info!(
            days = plan.day_count(),
            skip_weekends = plan.skip_weekends,
            "backfill {} to {}",
            plan.start,
            plan.end
        );
        progress.set_length(plan.day_count());

        let mut report = BackfillReport::default();
        for date in plan.days() {
            progress.set_message(date.to_string());
            if plan.skip_weekends && is_weekend(date) {
                debug!("skip weekend day {date}");
                report.skipped_days += 1;
                progress.inc(1);
                continue;
            }

            report.total_days += 1;
            let count = rand::thread_rng().gen_range(plan.min_commits..=plan.max_commits);
            for _ in 0..count {
                let time = random_working_time();
                match self
                    .producer
                    .create_commit(localize(self.timezone(), date.and_time(time)), None)
                {
                    Ok(_) => report.total_commits += 1,
                    Err(err) => {
                        warn!(%date, "skip failed commit: {err}");
                        report.errors += 1;
                    }
                }
                tokio::time::sleep(self.backfill_delay).await;
            }

            if report.total_days % CHECKPOINT_DAYS == 0 {
                info!(
                    days = report.total_days,
                    commits = report.total_commits,
                    errors = report.errors,
                    "backfill checkpoint at {date}"
                );
            }
            progress.inc(1);
        }

        progress.finish_with_message("done");
        info!(
            total_days = report.total_days,
            total_commits = report.total_commits,
            skipped_days = report.skipped_days,
            errors = report.errors,
            "backfill finished"
        );

        Ok(report)
    }

    /// Draw a named pattern starting at a week offset.
    ///
    /// Commits are created strictly in expansion order. The first failed
    /// commit aborts the run, since a missing cell breaks the picture.
    ///
    /// # Errors
    ///
    /// - Return [`RunError::Pattern`] if the pattern is unknown or cannot be
    ///   expanded.
    /// - Return [`RunError::PatternCommit`] if a commit fails.
    #[instrument(skip(self), level = "debug")]
    pub async fn run_pattern(&self, name: &str, start_week_offset: u32) -> Result<RunResult> {
        let grid = self.patterns.get(name)?;
        let timestamps = self
            .mapper
            .expand_pattern(grid, start_week_offset, self.intensity)?;
        info!(
            cells = grid.lit_count(),
            commits = timestamps.len(),
            "draw pattern {name:?} from week {start_week_offset}"
        );

        let mut result = RunResult::default();
        for (index, timestamp) in timestamps.into_iter().enumerate() {
            if index > 0 {
                tokio::time::sleep(self.backfill_delay).await;
            }

            let summary = self
                .producer
                .create_commit(timestamp, None)
                .map_err(|source| RunError::PatternCommit { index, source })?;
            result.commits.push(summary);
        }

        info!(created = result.created(), "pattern {name:?} finished");
        Ok(result)
    }
}

fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

fn random_working_time() -> NaiveTime {
    let mut rng = rand::thread_rng();
    let hour = rng.gen_range(WORKING_HOURS);
    let minute = rng.gen_range(0..60);
    NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or(NaiveTime::MIN)
}

/// Run error types.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    /// Pattern lookup or expansion fails.
    #[error(transparent)]
    Pattern(#[from] PatternError),

    /// A pattern commit fails.
    #[error("pattern commit #{index} failed")]
    PatternCommit {
        index: usize,
        #[source]
        source: CommitError,
    },

    /// Backfill has no date range.
    #[error("backfill needs a start and an end date")]
    MissingRange,

    /// Run parameters are unusable.
    #[error("{0}")]
    InvalidPlan(String),
}

/// Friendly result alias :3
pub type Result<T, E = RunError> = std::result::Result<T, E>;
