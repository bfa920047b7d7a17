// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! HTTP control surface for a long-running scheduler.
//!
//! - `GET /health`: liveness probe.
//! - `GET /status`: scheduler snapshot plus a summary of active settings.
//! - `POST /trigger`: submit a manual run in the background.

use crate::{
    config::{Environment, Settings},
    gateway::VcsGateway,
    schedule::{ScheduleStatus, Scheduler},
};

use axum::{extract::State, http::StatusCode, routing::get, routing::post, Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::{future::Future, path::PathBuf};
use tokio::net::TcpListener;
use tracing::info;

/// Non-secret view of active settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigSummary {
    pub environment: Environment,
    pub dry_run: bool,
    pub repo_path: PathBuf,
    pub remote_name: String,
    pub remote_configured: bool,
    pub branch: String,
    pub cron: String,
    pub timezone: String,
}

impl From<&Settings> for ConfigSummary {
    fn from(settings: &Settings) -> Self {
        Self {
            environment: settings.environment,
            dry_run: settings.dry_run,
            repo_path: settings.git.repo_path.clone(),
            remote_name: settings.git.remote_name.clone(),
            remote_configured: settings
                .git
                .remote_url
                .as_deref()
                .is_some_and(|url| !url.trim().is_empty()),
            branch: settings.git.branch.clone(),
            cron: settings.schedule.cron.clone(),
            timezone: settings.schedule.timezone.name().to_string(),
        }
    }
}

/// Shared handler state.
pub struct AppState<G>
where
    G: VcsGateway,
{
    pub scheduler: Scheduler<G>,
    pub config: ConfigSummary,
}

impl<G> AppState<G>
where
    G: VcsGateway,
{
    pub fn new(scheduler: Scheduler<G>, settings: &Settings) -> Self {
        Self {
            scheduler,
            config: ConfigSummary::from(settings),
        }
    }
}

impl<G> Clone for AppState<G>
where
    G: VcsGateway,
{
    fn clone(&self) -> Self {
        Self {
            scheduler: self.scheduler.clone(),
            config: self.config.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
struct Health {
    status: &'static str,
    time: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
struct StatusReport {
    scheduler: ScheduleStatus,
    config: ConfigSummary,
}

#[derive(Debug, Serialize)]
struct Accepted {
    accepted: bool,
}

/// Build the control surface router.
pub fn build_router<G>(state: AppState<G>) -> Router
where
    G: VcsGateway,
{
    Router::new()
        .route("/health", get(health))
        .route("/status", get(status::<G>))
        .route("/trigger", post(trigger::<G>))
        .with_state(state)
}

/// Serve router on a bound listener until `shutdown` resolves.
///
/// In-flight requests are allowed to finish before returning.
pub async fn serve(
    listener: TcpListener,
    router: Router,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let address = listener.local_addr()?;
    info!("control surface listening on http://{address}");
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await?;
    info!("control surface stopped");

    Ok(())
}

async fn health() -> Json<Health> {
    Json(Health {
        status: "ok",
        time: Utc::now(),
    })
}

async fn status<G>(State(state): State<AppState<G>>) -> Json<StatusReport>
where
    G: VcsGateway,
{
    Json(StatusReport {
        scheduler: state.scheduler.status(),
        config: state.config,
    })
}

async fn trigger<G>(State(state): State<AppState<G>>) -> (StatusCode, Json<Accepted>)
where
    G: VcsGateway,
{
    // Detach, outcome shows up in scheduler statistics. Shutdown drains it.
    drop(state.scheduler.run_now());
    (StatusCode::ACCEPTED, Json(Accepted { accepted: true }))
}
