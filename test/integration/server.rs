// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use crate::{test_settings, FakeGateway};

use greenwall::{
    run::Orchestrator,
    schedule::Scheduler,
    server::{build_router, AppState},
};

use anyhow::Result;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use pretty_assertions::assert_eq;
use std::{sync::Arc, time::Duration};
use tower::ServiceExt;

fn app() -> Result<(Router, Scheduler<FakeGateway>)> {
    let mut settings = test_settings("fake-history");
    settings.git.remote_url = Some("https://example.invalid/history.git".into());
    settings.commits.min_per_day = 1;
    settings.commits.max_per_day = 1;

    let gateway = Arc::new(FakeGateway::new());
    let orchestrator = Orchestrator::new(&settings, gateway)?;
    let scheduler = Scheduler::new(Arc::new(orchestrator));
    let router = build_router(AppState::new(scheduler.clone(), &settings));
    Ok((router, scheduler))
}

/// Send request via `oneshot` and return status with parsed JSON body.
async fn send(app: Router, method: &str, uri: &str) -> Result<(StatusCode, serde_json::Value)> {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())?;
    let response = app.oneshot(request).await?;
    let status = response.status();
    let body = response.into_body().collect().await?.to_bytes();
    let json = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
    Ok((status, json))
}

#[tokio::test]
async fn health_reports_ok() -> Result<()> {
    let (app, _) = app()?;

    let (status, json) = send(app, "GET", "/health").await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert!(json["time"].is_string());

    Ok(())
}

#[tokio::test]
async fn status_reports_scheduler_and_config() -> Result<()> {
    let (app, _) = app()?;

    let (status, json) = send(app, "GET", "/status").await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["scheduler"]["running"], false);
    assert_eq!(json["scheduler"]["executing"], false);
    assert_eq!(json["scheduler"]["last_run"], serde_json::Value::Null);
    assert_eq!(json["scheduler"]["stats"]["total_runs"], 0);
    assert_eq!(json["config"]["environment"], "development");
    assert_eq!(json["config"]["branch"], "main");
    assert_eq!(json["config"]["remote_configured"], true);
    assert_eq!(json["config"]["cron"], "0 12 * * *");
    assert_eq!(json["config"]["timezone"], "UTC");

    Ok(())
}

#[tokio::test]
async fn trigger_accepts_and_runs_in_background() -> Result<()> {
    let (app, scheduler) = app()?;

    let (status, json) = send(app, "POST", "/trigger").await?;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(json, serde_json::json!({ "accepted": true }));

    for _ in 0..100 {
        if scheduler.stats().successful_runs == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(scheduler.stats().total_runs, 1);
    assert_eq!(scheduler.stats().successful_runs, 1);

    Ok(())
}

#[tokio::test]
async fn trigger_rejects_get() -> Result<()> {
    let (app, _) = app()?;

    let (status, _) = send(app, "GET", "/trigger").await?;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);

    Ok(())
}
