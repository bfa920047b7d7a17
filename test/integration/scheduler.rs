// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use crate::{test_settings, FakeGateway};

use greenwall::{
    run::Orchestrator,
    schedule::{RunStats, ScheduleError, Scheduler, TaskOutcome},
};

use anyhow::Result;
use chrono_tz::Tz;
use pretty_assertions::assert_eq;
use std::{sync::Arc, time::Duration};
use tokio::{sync::Notify, time::sleep};

fn scheduler(gateway: FakeGateway) -> Result<(Scheduler<FakeGateway>, Arc<FakeGateway>)> {
    let mut settings = test_settings("fake-history");
    settings.commits.min_per_day = 1;
    settings.commits.max_per_day = 1;

    let gateway = Arc::new(gateway);
    let orchestrator = Orchestrator::new(&settings, Arc::clone(&gateway))?;
    Ok((Scheduler::new(Arc::new(orchestrator)), gateway))
}

#[tokio::test]
async fn run_pulls_commits_then_pushes() -> Result<()> {
    let (scheduler, gateway) = scheduler(FakeGateway::new())?;

    let report = match scheduler.execute_task().await {
        TaskOutcome::Completed(report) => report,
        other => panic!("expected completed run, got {other:?}"),
    };
    assert_eq!(report.run.created(), 1);
    assert!(report.push.pushed());
    assert_eq!(gateway.events(), vec!["pull", "commit", "push"]);

    let status = scheduler.status();
    assert!(!status.executing);
    assert!(status.last_run.is_some());
    assert_eq!(
        status.stats,
        RunStats {
            total_runs: 1,
            successful_runs: 1,
            failed_runs: 0,
        }
    );

    Ok(())
}

#[tokio::test]
async fn failed_push_counts_as_failed_run() -> Result<()> {
    let (scheduler, _) = scheduler(FakeGateway::new().failing_push())?;

    let outcome = scheduler.execute_task().await;
    assert!(matches!(outcome, TaskOutcome::Failed(_)));
    assert_eq!(
        scheduler.stats(),
        RunStats {
            total_runs: 1,
            successful_runs: 0,
            failed_runs: 1,
        }
    );
    assert!(!scheduler.is_executing());

    Ok(())
}

#[tokio::test]
async fn trigger_while_executing_is_dropped() -> Result<()> {
    let entered = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());
    let (scheduler, gateway) = scheduler(
        FakeGateway::new().gated(Arc::clone(&entered), Arc::clone(&release)),
    )?;

    let first = scheduler.run_now();
    entered.notified().await;
    assert!(scheduler.is_executing());

    let second = scheduler.execute_task().await;
    assert!(second.is_skipped());
    assert!(scheduler.run_now().await?.is_skipped());
    assert_eq!(scheduler.stats().total_runs, 1);

    release.notify_one();
    let first = first.await?;
    assert!(matches!(first, TaskOutcome::Completed(_)));
    assert_eq!(
        scheduler.stats(),
        RunStats {
            total_runs: 1,
            successful_runs: 1,
            failed_runs: 0,
        }
    );
    assert_eq!(gateway.events(), vec!["pull", "commit", "push"]);
    assert!(!scheduler.is_executing());

    Ok(())
}

#[tokio::test]
async fn start_rejects_invalid_cron() -> Result<()> {
    let (scheduler, _) = scheduler(FakeGateway::new())?;

    let result = scheduler.start("every day at noon", Tz::UTC).await;
    assert!(matches!(result, Err(ScheduleError::InvalidCron { .. })));
    assert!(!scheduler.status().running);

    Ok(())
}

#[tokio::test]
async fn start_and_stop_lifecycle() -> Result<()> {
    let (scheduler, gateway) = scheduler(FakeGateway::new())?;

    scheduler
        .start("0 0 1 1 *", chrono_tz::Europe::Berlin)
        .await?;
    let status = scheduler.status();
    assert!(status.running);
    assert_eq!(status.cron.as_deref(), Some("0 0 1 1 *"));
    assert_eq!(status.timezone.as_deref(), Some("Europe/Berlin"));

    let again = scheduler.start("0 12 * * *", Tz::UTC).await;
    assert!(matches!(again, Err(ScheduleError::AlreadyRunning)));

    scheduler.stop().await;
    assert!(!scheduler.status().running);
    scheduler.stop().await;
    assert!(!scheduler.status().running);

    scheduler.start("0 12 * * *", Tz::UTC).await?;
    assert!(scheduler.status().running);
    scheduler.stop().await;

    assert!(gateway.events().is_empty());
    assert_eq!(scheduler.stats(), RunStats::default());

    Ok(())
}

#[tokio::test]
async fn stop_waits_for_manual_run() -> Result<()> {
    let entered = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());
    let (scheduler, gateway) = scheduler(
        FakeGateway::new().gated(Arc::clone(&entered), Arc::clone(&release)),
    )?;

    scheduler.start("0 0 1 1 *", Tz::UTC).await?;
    let manual = scheduler.run_now();
    entered.notified().await;

    let stopping = tokio::spawn({
        let scheduler = scheduler.clone();
        async move { scheduler.stop().await }
    });
    sleep(Duration::from_millis(100)).await;
    assert!(!stopping.is_finished());
    assert!(scheduler.is_executing());

    release.notify_one();
    stopping.await?;
    assert_eq!(gateway.events(), vec!["pull", "commit", "push"]);
    assert!(!scheduler.is_executing());
    assert!(!scheduler.status().running);
    assert!(matches!(manual.await?, TaskOutcome::Completed(_)));

    Ok(())
}

#[tokio::test]
async fn cron_trigger_fires_until_stopped() -> Result<()> {
    let (scheduler, gateway) = scheduler(FakeGateway::new())?;

    scheduler.start("* * * * * *", Tz::UTC).await?;
    for _ in 0..60 {
        if scheduler.stats().total_runs >= 1 {
            break;
        }
        sleep(Duration::from_millis(50)).await;
    }
    scheduler.stop().await;

    let stats = scheduler.stats();
    assert!(stats.total_runs >= 1);
    assert_eq!(stats.successful_runs, stats.total_runs);
    assert_eq!(gateway.events()[..3], ["pull", "commit", "push"]);

    sleep(Duration::from_millis(1500)).await;
    assert_eq!(scheduler.stats(), stats);
    assert!(!scheduler.status().running);

    Ok(())
}

#[tokio::test]
async fn exhausted_cron_clears_running() -> Result<()> {
    let (scheduler, gateway) = scheduler(FakeGateway::new())?;

    scheduler.start("0 0 0 1 1 * 2020", Tz::UTC).await?;
    for _ in 0..20 {
        if !scheduler.status().running {
            break;
        }
        sleep(Duration::from_millis(10)).await;
    }
    assert!(!scheduler.status().running);

    scheduler.start("0 12 * * *", Tz::UTC).await?;
    assert!(scheduler.status().running);
    scheduler.stop().await;

    assert!(gateway.events().is_empty());

    Ok(())
}
