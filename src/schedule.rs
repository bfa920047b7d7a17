// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Recurring and manual run scheduling.
//!
//! The [`Scheduler`] owns a cron trigger and a manual trigger. Both funnel
//! into [`Scheduler::execute_task`], which performs one full cycle: pull,
//! create today's commits, push.
//!
//! # Single Execution
//!
//! At most one cycle runs at any time. A trigger that fires while a cycle is
//! in flight is dropped on the spot: it is neither queued nor delayed, and it
//! leaves the run statistics untouched. The execution flag is released by a
//! drop guard, so a cycle that fails or panics midway never wedges the
//! scheduler.
//!
//! # Cron Expressions
//!
//! Standard five-field expressions (`minute hour day month weekday`) are
//! accepted with the usual weekday numbering: Sunday is 0 or 7, Monday is 1.
//! So `30 9 * * 1-5` fires on weekdays only. Six and seven-field expressions
//! carry a leading seconds field (and an optional trailing year) and are
//! taken verbatim, which means their numeric weekdays count from Sunday = 1.
//! Weekday names (`MON-FRI`) mean the same thing in every form.
//!
//! # Shutdown
//!
//! [`Scheduler::stop`] disarms the cron trigger and then waits until no cycle
//! is in flight, including cycles started through [`Scheduler::run_now`].

use crate::{
    gateway::{GatewayError, PullOutcome, PushOutcome, VcsGateway},
    run::{Orchestrator, RunResult},
};

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use cron::Schedule;
use serde::Serialize;
use std::{
    str::FromStr,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, MutexGuard, PoisonError,
    },
};
use tokio::{
    sync::{watch, Notify},
    task::JoinHandle,
};
use tracing::{debug, error, info, warn};

/// Validated cron expression.
#[derive(Debug, Clone)]
pub struct CronSchedule {
    expression: String,
    schedule: Schedule,
}

impl CronSchedule {
    /// Parse cron expression.
    ///
    /// # Errors
    ///
    /// - Return [`ScheduleError::InvalidCron`] describing why the expression
    ///   was rejected.
    pub fn parse(expression: &str) -> Result<Self> {
        let expression = expression.trim();
        let fields = expression.split_whitespace().collect::<Vec<_>>();
        let normalized = match fields.as_slice() {
            [minute, hour, day, month, weekday] => format!(
                "0 {minute} {hour} {day} {month} {}",
                standard_weekdays(weekday)
            ),
            [_, _, _, _, _, _] | [_, _, _, _, _, _, _] => expression.to_string(),
            fields => {
                return Err(ScheduleError::InvalidCron {
                    expression: expression.to_string(),
                    reason: format!("expected 5, 6, or 7 fields, found {}", fields.len()),
                })
            }
        };

        let schedule =
            Schedule::from_str(&normalized).map_err(|err| ScheduleError::InvalidCron {
                expression: expression.to_string(),
                reason: err.to_string(),
            })?;

        Ok(Self {
            expression: expression.to_string(),
            schedule,
        })
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// Next fire time strictly after `after`, evaluated in `timezone`.
    pub fn next_after(&self, timezone: Tz, after: DateTime<Utc>) -> Option<DateTime<Tz>> {
        self.schedule.after(&after.with_timezone(&timezone)).next()
    }
}

/// Rewrite a standard weekday field (Sunday = 0 or 7) into the Sunday = 1
/// numbering understood by [`Schedule`].
///
/// Numeric list items are expanded into the explicit days they cover, so
/// ranges and steps keep their meaning. Wildcards, names, and anything
/// malformed pass through untouched and are judged by the cron parser.
fn standard_weekdays(field: &str) -> String {
    field
        .split(',')
        .map(|item| match weekday_set(item) {
            Some(days) => days
                .iter()
                .map(u32::to_string)
                .collect::<Vec<_>>()
                .join(","),
            None => item.to_string(),
        })
        .collect::<Vec<_>>()
        .join(",")
}

fn weekday_set(item: &str) -> Option<Vec<u32>> {
    let (base, step) = match item.split_once('/') {
        Some((base, step)) => (base, Some(step.parse::<usize>().ok().filter(|step| *step > 0)?)),
        None => (item, None),
    };

    let (first, last) = match base.split_once('-') {
        Some((first, last)) => (first.parse::<u32>().ok()?, last.parse::<u32>().ok()?),
        None => {
            let day = base.parse::<u32>().ok()?;
            (day, if step.is_some() { 7 } else { day })
        }
    };
    if first > last || last > 7 {
        return None;
    }

    let mut days = (first..=last)
        .step_by(step.unwrap_or(1))
        .map(|day| day % 7 + 1)
        .collect::<Vec<_>>();
    days.sort_unstable();
    days.dedup();
    Some(days)
}

/// Cumulative run statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
    pub total_runs: u64,
    pub successful_runs: u64,
    pub failed_runs: u64,
}

/// Read-only snapshot of scheduler state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScheduleStatus {
    pub running: bool,
    pub executing: bool,
    pub last_run: Option<DateTime<Utc>>,
    pub stats: RunStats,
    pub cron: Option<String>,
    pub timezone: Option<String>,
}

/// Everything one successful cycle did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub pull: PullOutcome,
    pub run: RunResult,
    pub push: PushOutcome,
}

/// Outcome of one trigger.
#[derive(Debug)]
pub enum TaskOutcome {
    /// Cycle ran to completion.
    Completed(CycleReport),

    /// Cycle surfaced an error.
    Failed(GatewayError),

    /// Another cycle was in flight, trigger dropped.
    Skipped,
}

impl TaskOutcome {
    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped)
    }
}

#[derive(Debug, Default)]
struct ScheduleState {
    running: bool,
    last_run_at: Option<DateTime<Utc>>,
    stats: RunStats,
    cron: Option<String>,
    timezone: Option<Tz>,
}

struct Trigger {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

struct Inner<G>
where
    G: VcsGateway,
{
    orchestrator: Arc<Orchestrator<G>>,
    executing: AtomicBool,
    idle: Notify,
    state: Mutex<ScheduleState>,
    trigger: tokio::sync::Mutex<Option<Trigger>>,
}

/// Cron and manual trigger with single-execution guarantee.
pub struct Scheduler<G>
where
    G: VcsGateway,
{
    inner: Arc<Inner<G>>,
}

impl<G> Clone for Scheduler<G>
where
    G: VcsGateway,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<G> Scheduler<G>
where
    G: VcsGateway,
{
    /// Construct new idle scheduler.
    pub fn new(orchestrator: Arc<Orchestrator<G>>) -> Self {
        Self {
            inner: Arc::new(Inner {
                orchestrator,
                executing: AtomicBool::new(false),
                idle: Notify::new(),
                state: Mutex::new(ScheduleState::default()),
                trigger: tokio::sync::Mutex::new(None),
            }),
        }
    }

    pub fn orchestrator(&self) -> &Arc<Orchestrator<G>> {
        &self.inner.orchestrator
    }

    /// Arm recurring trigger.
    ///
    /// # Errors
    ///
    /// - Return [`ScheduleError::InvalidCron`] if the expression is malformed.
    /// - Return [`ScheduleError::AlreadyRunning`] if a trigger is armed.
    pub async fn start(&self, expression: &str, timezone: Tz) -> Result<()> {
        let schedule = CronSchedule::parse(expression)?;
        let mut trigger = self.inner.trigger.lock().await;
        if trigger
            .as_ref()
            .is_some_and(|trigger| !trigger.handle.is_finished())
        {
            return Err(ScheduleError::AlreadyRunning);
        }

        let cron = schedule.expression().to_string();
        self.update(|state| {
            state.running = true;
            state.cron = Some(cron.clone());
            state.timezone = Some(timezone);
        });

        let (shutdown, signal) = watch::channel(false);
        let scheduler = self.clone();
        let handle = tokio::spawn(async move {
            scheduler.trigger_loop(schedule, timezone, signal).await;
        });
        *trigger = Some(Trigger { shutdown, handle });
        info!("scheduler armed with {cron:?} in {timezone}");

        Ok(())
    }

    /// Disarm recurring trigger, then wait for any in-flight cycle to finish.
    ///
    /// Cycles started by [`Self::run_now`] are waited on as well. Stopping an
    /// idle scheduler returns right away.
    pub async fn stop(&self) {
        let trigger = self.inner.trigger.lock().await.take();
        match trigger {
            Some(trigger) => {
                let _ = trigger.shutdown.send(true);
                if let Err(err) = trigger.handle.await {
                    error!("scheduler trigger ended abnormally: {err}");
                }
                self.update(|state| state.running = false);
            }
            None => debug!("scheduler trigger not armed"),
        }

        self.wait_idle().await;
        info!("scheduler stopped");
    }

    /// Trigger one cycle in the background.
    ///
    /// Returns right away. The handle resolves once the cycle finished or was
    /// skipped.
    pub fn run_now(&self) -> JoinHandle<TaskOutcome> {
        info!("manual run requested");
        let scheduler = self.clone();
        tokio::spawn(async move { scheduler.execute_task().await })
    }

    /// Run one cycle unless another one is in flight.
    pub async fn execute_task(&self) -> TaskOutcome {
        let Some(_guard) = ExecutionGuard::acquire(&self.inner.executing, &self.inner.idle) else {
            info!("previous run is still executing, skip trigger");
            return TaskOutcome::Skipped;
        };

        let started = Utc::now();
        self.update(|state| {
            state.last_run_at = Some(started);
            state.stats.total_runs += 1;
        });
        info!("run started at {started}");

        match self.run_cycle().await {
            Ok(report) => {
                self.update(|state| state.stats.successful_runs += 1);
                info!(
                    created = report.run.created(),
                    errors = report.run.errors,
                    pushed = report.push.pushed(),
                    "run completed"
                );
                TaskOutcome::Completed(report)
            }
            Err(err) => {
                self.update(|state| state.stats.failed_runs += 1);
                error!("run failed: {err}");
                TaskOutcome::Failed(err)
            }
        }
    }

    /// Snapshot of current state.
    pub fn status(&self) -> ScheduleStatus {
        let state = self.lock();
        ScheduleStatus {
            running: state.running,
            executing: self.is_executing(),
            last_run: state.last_run_at,
            stats: state.stats,
            cron: state.cron.clone(),
            timezone: state.timezone.map(|tz| tz.name().to_string()),
        }
    }

    pub fn stats(&self) -> RunStats {
        self.lock().stats
    }

    pub fn is_executing(&self) -> bool {
        self.inner.executing.load(Ordering::Acquire)
    }

    async fn run_cycle(&self) -> Result<CycleReport, GatewayError> {
        let orchestrator = &self.inner.orchestrator;
        let pull = orchestrator.gateway().pull(None, None).await?;
        let run = orchestrator.run_today().await;
        let push = orchestrator.gateway().push(None, None).await?;

        Ok(CycleReport { pull, run, push })
    }

    async fn wait_idle(&self) {
        loop {
            let idle = self.inner.idle.notified();
            tokio::pin!(idle);
            idle.as_mut().enable();
            if !self.is_executing() {
                return;
            }

            info!("waiting for in-flight run to finish");
            idle.await;
        }
    }

    async fn trigger_loop(self, schedule: CronSchedule, timezone: Tz, mut signal: watch::Receiver<bool>) {
        loop {
            let Some(next) = schedule.next_after(timezone, Utc::now()) else {
                warn!("cron expression {:?} never fires again", schedule.expression());
                self.update(|state| state.running = false);
                break;
            };

            let wait = (next.with_timezone(&Utc) - Utc::now())
                .to_std()
                .unwrap_or_default();
            debug!("next run at {next}");

            tokio::select! {
                _ = tokio::time::sleep(wait) => {
                    self.execute_task().await;
                }
                _ = signal.changed() => break,
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, ScheduleState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn update(&self, apply: impl FnOnce(&mut ScheduleState)) {
        apply(&mut self.lock());
    }
}

/// Holds the execution flag for the duration of one cycle.
///
/// Waiters on `idle` are woken once the flag is released.
struct ExecutionGuard<'a> {
    flag: &'a AtomicBool,
    idle: &'a Notify,
}

impl<'a> ExecutionGuard<'a> {
    fn acquire(flag: &'a AtomicBool, idle: &'a Notify) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag, idle })
    }
}

impl Drop for ExecutionGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
        self.idle.notify_waiters();
    }
}

/// Scheduling error types.
#[derive(Debug, thiserror::Error)]
pub enum ScheduleError {
    /// Cron expression cannot be parsed.
    #[error("invalid cron expression {expression:?}: {reason}")]
    InvalidCron { expression: String, reason: String },

    /// Trigger is already armed.
    #[error("scheduler is already running")]
    AlreadyRunning,
}

/// Friendly result alias :3
pub type Result<T, E = ScheduleError> = std::result::Result<T, E>;
