// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use greenwall::{
    config::Settings,
    coords::PatternBook,
    gateway::{Git2Gateway, PushOutcome, VcsGateway},
    path::default_config_path,
    run::{BackfillPlan, Orchestrator, RunError},
    schedule::{Scheduler, TaskOutcome},
    server::{build_router, serve, AppState},
};

use anyhow::{anyhow, Result};
use chrono::NaiveDate;
use chrono_tz::Tz;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::{path::PathBuf, process::exit, sync::Arc};
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Clone, Parser)]
#[command(
    about,
    override_usage = "greenwall [options] <greenwall-command>",
    subcommand_help_heading = "Commands",
    version
)]
struct Cli {
    /// Path to configuration file.
    #[arg(short, long, global = true, env = "GREENWALL_CONFIG", value_name = "path")]
    pub config: Option<PathBuf>,

    /// Simulate and log every mutating operation without performing it.
    #[arg(long, global = true, env = "GREENWALL_DRY_RUN")]
    pub dry_run: bool,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    fn load_settings(&self) -> Result<Settings> {
        let path = match &self.config {
            Some(path) => path.clone(),
            None => default_config_path()?,
        };

        let mut settings = Settings::load(&path)?;
        if self.dry_run {
            settings.dry_run = true;
        }

        Ok(settings)
    }

    async fn run(self, settings: Settings) -> Result<()> {
        match self.command {
            Command::Today => run_today(settings).await,
            Command::Backfill(opts) => run_backfill(settings, opts).await,
            Command::Schedule(opts) => run_schedule(settings, opts).await,
            Command::Pattern(opts) => run_pattern(settings, opts).await,
            Command::Patterns => run_patterns(settings),
            Command::Check => run_check(settings),
        }
    }
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Pull, create today's commits, then push.
    #[command(override_usage = "greenwall today [options]")]
    Today,

    /// Create commits on every day of a past date range.
    #[command(override_usage = "greenwall backfill [options]")]
    Backfill(BackfillOptions),

    /// Run today's commits on a cron schedule with an HTTP control surface.
    #[command(override_usage = "greenwall schedule [options]")]
    Schedule(ScheduleOptions),

    /// Draw a named pattern onto the contribution calendar.
    #[command(override_usage = "greenwall pattern [options] <pattern_name>")]
    Pattern(PatternOptions),

    /// List available patterns.
    #[command(override_usage = "greenwall patterns [options]")]
    Patterns,

    /// Validate configuration and print effective settings.
    #[command(override_usage = "greenwall check [options]")]
    Check,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct BackfillOptions {
    /// First day of range, inclusive.
    #[arg(short, long, value_name = "YYYY-MM-DD")]
    pub start: Option<NaiveDate>,

    /// Last day of range, inclusive.
    #[arg(short, long, value_name = "YYYY-MM-DD")]
    pub end: Option<NaiveDate>,

    /// Leave Saturdays and Sundays empty.
    #[arg(long)]
    pub skip_weekends: bool,

    /// Minimum commits per day.
    #[arg(long, value_name = "count")]
    pub min: Option<u32>,

    /// Maximum commits per day.
    #[arg(long, value_name = "count")]
    pub max: Option<u32>,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct ScheduleOptions {
    /// Cron expression to use instead of the configured one.
    #[arg(long, value_name = "expression")]
    pub cron: Option<String>,

    /// Timezone to evaluate cron expression in.
    #[arg(long, value_name = "zone")]
    pub timezone: Option<Tz>,

    /// Port of control surface.
    #[arg(short, long, value_name = "port")]
    pub port: Option<u16>,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct PatternOptions {
    /// Name of pattern to draw.
    #[arg(value_name = "pattern_name")]
    pub name: String,

    /// Week offset of the pattern's first column.
    #[arg(short = 'w', long, default_value_t = 0, value_name = "week")]
    pub start_week: u32,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let settings = cli.load_settings();
    let level = settings
        .as_ref()
        .map(|settings| settings.log.level.clone())
        .unwrap_or_else(|_| "info".into());

    let layer = fmt::layer().compact().with_target(false);
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .init();

    if let Err(error) = run(cli, settings).await {
        error!("{error:?}");
        exit(1);
    }

    exit(0)
}

async fn run(cli: Cli, settings: Result<Settings>) -> Result<()> {
    cli.run(settings?).await
}

fn prepare(settings: &Settings) -> Result<Arc<Orchestrator<Git2Gateway>>> {
    for warning in settings.validate()? {
        warn!("{warning}");
    }

    if settings.dry_run {
        info!("rehearsal mode: nothing will be written or sent");
    }

    let gateway = Arc::new(Git2Gateway::new(settings));
    gateway.ensure_initialized()?;
    Ok(Arc::new(Orchestrator::new(settings, gateway)?))
}

fn report_push(outcome: &PushOutcome) {
    match outcome {
        PushOutcome::Pushed { remote, branch } => info!("pushed to {remote}/{branch}"),
        PushOutcome::LocalOnly { reason } => warn!("commits kept local: {reason}"),
        PushOutcome::Rehearsed => info!("rehearsal: push skipped"),
    }
}

async fn run_today(settings: Settings) -> Result<()> {
    let scheduler = Scheduler::new(prepare(&settings)?);
    match scheduler.execute_task().await {
        TaskOutcome::Completed(report) => {
            report_push(&report.push);
            info!(
                created = report.run.created(),
                errors = report.run.errors,
                "today's commits done"
            );
            Ok(())
        }
        TaskOutcome::Failed(err) => Err(err.into()),
        TaskOutcome::Skipped => Err(anyhow!("another run is already executing")),
    }
}

async fn run_backfill(settings: Settings, opts: BackfillOptions) -> Result<()> {
    let orchestrator = prepare(&settings)?;
    let defaults = &settings.backfill;
    let plan = BackfillPlan {
        start: opts
            .start
            .or(defaults.start_date)
            .ok_or(RunError::MissingRange)?,
        end: opts.end.or(defaults.end_date).ok_or(RunError::MissingRange)?,
        skip_weekends: opts.skip_weekends || defaults.skip_weekends,
        min_commits: opts.min.unwrap_or(defaults.min_commits),
        max_commits: opts.max.unwrap_or(defaults.max_commits),
    };
    plan.validate()?;

    let progress = ProgressBar::new(plan.day_count());
    progress.set_style(ProgressStyle::with_template(
        "{spinner} [{elapsed_precise}] {bar:40} {pos}/{len} days {msg}",
    )?);

    let report = orchestrator.run_backfill(&plan, &progress).await?;
    info!(
        total_days = report.total_days,
        total_commits = report.total_commits,
        skipped_days = report.skipped_days,
        errors = report.errors,
        "backfill done"
    );

    let push = orchestrator.gateway().push(None, None).await?;
    report_push(&push);

    Ok(())
}

async fn run_pattern(settings: Settings, opts: PatternOptions) -> Result<()> {
    let orchestrator = prepare(&settings)?;
    let result = orchestrator.run_pattern(&opts.name, opts.start_week).await?;
    info!(created = result.created(), "pattern {:?} done", opts.name);

    let push = orchestrator.gateway().push(None, None).await?;
    report_push(&push);

    Ok(())
}

async fn run_schedule(mut settings: Settings, opts: ScheduleOptions) -> Result<()> {
    if let Some(cron) = opts.cron {
        settings.schedule.cron = cron;
    }
    if let Some(timezone) = opts.timezone {
        settings.schedule.timezone = timezone;
    }
    if let Some(port) = opts.port {
        settings.server.port = port;
    }

    let scheduler = Scheduler::new(prepare(&settings)?);
    scheduler
        .start(&settings.schedule.cron, settings.schedule.timezone)
        .await?;

    let listener = TcpListener::bind(settings.server.address()).await?;
    let router = build_router(AppState::new(scheduler.clone(), &settings));
    let served = serve(listener, router, shutdown_signal()).await;

    info!("shutting down scheduler");
    scheduler.stop().await;
    served
}

fn run_patterns(settings: Settings) -> Result<()> {
    let patterns = PatternBook::with_custom(&settings.pattern.grids)?;
    for name in patterns.names() {
        let grid = patterns.get(name)?;
        println!(
            "{name:<12} {:>2} weeks {:>3} cells",
            grid.width(),
            grid.lit_count()
        );
    }

    Ok(())
}

fn run_check(settings: Settings) -> Result<()> {
    let warnings = settings.validate()?;
    for warning in &warnings {
        warn!("{warning}");
    }

    print!("{settings}");
    info!(warnings = warnings.len(), "configuration is valid");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!("failed to listen for ctrl-c: {err}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                error!("failed to listen for SIGTERM: {err}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("shutdown requested");
}
