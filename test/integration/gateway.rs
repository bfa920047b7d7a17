// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use crate::{test_settings, RepoFixture, ScriptedGit};

use greenwall::{
    commit::CommitProducer,
    gateway::{GatewayError, Git2Gateway, GitFailure, PullOutcome, PushOutcome, VcsGateway},
};

use anyhow::Result;
use chrono::{TimeZone, Utc};
use git2::Repository;
use pretty_assertions::assert_eq;
use std::sync::Arc;
use tempfile::TempDir;

const REMOTE_URL: &str = "https://example.invalid/history.git";

fn remote_settings(dir: &TempDir) -> greenwall::config::Settings {
    let mut settings = test_settings(dir.path().join("history"));
    settings.git.remote_url = Some(REMOTE_URL.into());
    settings
}

#[test]
fn initialize_is_idempotent() -> Result<()> {
    let dir = TempDir::new()?;
    let settings = remote_settings(&dir);
    let gateway = Git2Gateway::with_cli(&settings, ScriptedGit::failing("unused"));

    gateway.ensure_initialized()?;
    gateway.ensure_initialized()?;
    gateway.initialize()?;

    let repo = Repository::open(dir.path().join("history"))?;
    let head = repo.find_reference("HEAD")?;
    assert_eq!(head.symbolic_target(), Some("refs/heads/main"));

    let config = repo.config()?.snapshot()?;
    assert_eq!(config.get_str("user.name")?, "John Doe");
    assert_eq!(config.get_str("user.email")?, "john@doe.com");

    let remotes = repo.remotes()?;
    assert_eq!(remotes.len(), 1);
    assert_eq!(repo.find_remote("origin")?.url(), Some(REMOTE_URL));

    Ok(())
}

#[test]
fn open_existing_repository() -> Result<()> {
    let dir = TempDir::new()?;
    let fixture = RepoFixture::new(dir.path().join("history"))?;
    fixture.stage_and_commit("README.md", "# history\n")?;

    let settings = remote_settings(&dir);
    let gateway = Arc::new(Git2Gateway::with_cli(&settings, ScriptedGit::failing("unused")));
    let producer = CommitProducer::new(Arc::clone(&gateway), &settings.marker_file);
    producer.create_commit(Utc::now(), Some("chore: on top".into()))?;

    let repo = Repository::open(dir.path().join("history"))?;
    let head = repo.head()?.peel_to_commit()?;
    assert_eq!(head.message(), Some("chore: on top"));
    assert_eq!(head.parent_count(), 1);
    assert_eq!(head.author().name(), Some("John Doe"));
    assert_eq!(repo.find_remote("origin")?.url(), Some(REMOTE_URL));

    Ok(())
}

#[test]
fn commit_carries_requested_author_date() -> Result<()> {
    let dir = TempDir::new()?;
    let settings = test_settings(dir.path().join("history"));
    let gateway = Arc::new(Git2Gateway::with_cli(&settings, ScriptedGit::failing("unused")));
    let producer = CommitProducer::new(Arc::clone(&gateway), &settings.marker_file);

    let first_at = chrono_tz::Europe::Berlin
        .with_ymd_and_hms(2024, 5, 17, 14, 30, 5)
        .unwrap();
    let second_at = chrono_tz::Europe::Berlin
        .with_ymd_and_hms(2024, 5, 18, 9, 0, 0)
        .unwrap();
    let first = producer.create_commit(first_at, Some("feat: first".into()))?;
    let second = producer.create_commit(second_at, None)?;

    assert!(first.oid.is_some());
    assert_eq!(first.files_changed, 1);
    assert_eq!(second.files_changed, 1);
    assert_eq!(first.authored_at, first_at.fixed_offset());

    let repo = Repository::open(dir.path().join("history"))?;
    let head = repo.head()?.peel_to_commit()?;
    assert_eq!(head.author().when().seconds(), second_at.timestamp());
    assert_eq!(head.author().when().offset_minutes(), 120);
    assert!(head.committer().when().seconds() > second_at.timestamp());
    assert_eq!(head.parent_count(), 1);

    let parent = head.parent(0)?;
    assert_eq!(parent.message(), Some("feat: first"));
    assert_eq!(parent.author().when().seconds(), first_at.timestamp());
    assert_eq!(Some(parent.id().to_string()), first.oid);

    let marker = std::fs::read_to_string(dir.path().join("history").join(&settings.marker_file))?;
    assert!(marker.contains("2024-05-18T09:00:00.000+02:00"));

    Ok(())
}

#[tokio::test]
async fn rehearsal_touches_nothing() -> Result<()> {
    let dir = TempDir::new()?;
    let mut settings = remote_settings(&dir);
    settings.dry_run = true;
    let git = ScriptedGit::failing("unused");
    let calls = git.calls();
    let gateway = Arc::new(Git2Gateway::with_cli(&settings, git));
    let producer = CommitProducer::new(Arc::clone(&gateway), &settings.marker_file);

    let summary = producer.create_commit(Utc::now(), None)?;
    assert_eq!(summary.oid, None);
    assert_eq!(summary.files_changed, 0);
    assert_eq!(gateway.push(None, None).await?, PushOutcome::Rehearsed);
    assert_eq!(gateway.pull(None, None).await?, PullOutcome::Rehearsed);

    assert!(!dir.path().join("history").exists());
    assert!(calls.lock().unwrap().is_empty());

    Ok(())
}

#[tokio::test]
async fn push_without_remote_stays_local() -> Result<()> {
    let dir = TempDir::new()?;
    let settings = test_settings(dir.path().join("history"));
    let git = ScriptedGit::failing("unused");
    let calls = git.calls();
    let gateway = Git2Gateway::with_cli(&settings, git);

    let outcome = gateway.push(None, None).await?;
    assert_eq!(
        outcome,
        PushOutcome::LocalOnly {
            reason: GitFailure::NoRemote
        }
    );
    assert!(outcome.local());
    assert!(!outcome.pushed());
    assert!(calls.lock().unwrap().is_empty());

    Ok(())
}

#[tokio::test]
async fn push_to_absent_remote_stays_local() -> Result<()> {
    let dir = TempDir::new()?;
    let settings = remote_settings(&dir);
    let git = ScriptedGit::failing(format!(
        "stderr: remote: Repository not found.\nfatal: repository '{REMOTE_URL}/' not found"
    ));
    let calls = git.calls();
    let gateway = Git2Gateway::with_cli(&settings, git);

    let outcome = gateway.push(None, None).await?;
    assert_eq!(
        outcome,
        PushOutcome::LocalOnly {
            reason: GitFailure::RepositoryNotFound
        }
    );
    assert_eq!(calls.lock().unwrap().len(), 1);

    Ok(())
}

#[tokio::test]
async fn push_gives_up_after_max_retries() -> Result<()> {
    let dir = TempDir::new()?;
    let mut settings = remote_settings(&dir);
    settings.retry.max_retries = 3;
    let git = ScriptedGit::failing(
        "stderr: ! [rejected] main -> main (fetch first)\nerror: failed to push some refs",
    );
    let calls = git.calls();
    let gateway = Git2Gateway::with_cli(&settings, git);

    let result = gateway.push(None, None).await;
    assert!(matches!(
        result,
        Err(GatewayError::PushExhausted { attempts: 3, .. })
    ));
    assert_eq!(
        *calls.lock().unwrap(),
        vec!["push origin HEAD:refs/heads/main".to_string(); 3]
    );

    Ok(())
}

#[tokio::test]
async fn push_recovers_on_retry() -> Result<()> {
    let dir = TempDir::new()?;
    let settings = remote_settings(&dir);
    let git = ScriptedGit::new(
        [Err("stderr: error: failed to push some refs".to_string())],
        Ok("stderr: main -> main".to_string()),
    );
    let calls = git.calls();
    let gateway = Git2Gateway::with_cli(&settings, git);

    let outcome = gateway.push(None, Some("trunk")).await?;
    assert_eq!(
        outcome,
        PushOutcome::Pushed {
            remote: "origin".into(),
            branch: "trunk".into()
        }
    );
    assert_eq!(calls.lock().unwrap().len(), 2);
    assert_eq!(calls.lock().unwrap()[1], "push origin HEAD:refs/heads/trunk");

    Ok(())
}

#[tokio::test]
async fn pull_of_missing_branch_is_skipped() -> Result<()> {
    let dir = TempDir::new()?;
    let settings = remote_settings(&dir);
    let git = ScriptedGit::failing("stderr: fatal: couldn't find remote ref main");
    let calls = git.calls();
    let gateway = Git2Gateway::with_cli(&settings, git);

    let outcome = gateway.pull(None, None).await?;
    assert_eq!(
        outcome,
        PullOutcome::Skipped {
            reason: GitFailure::RemoteRefNotFound
        }
    );
    assert_eq!(
        *calls.lock().unwrap(),
        vec!["pull --rebase origin main".to_string()]
    );

    Ok(())
}

#[tokio::test]
async fn pull_conflict_surfaces() -> Result<()> {
    let dir = TempDir::new()?;
    let settings = remote_settings(&dir);
    let gateway = Git2Gateway::with_cli(
        &settings,
        ScriptedGit::failing("stdout: CONFLICT (content): Merge conflict in contribution.json"),
    );

    let result = gateway.pull(None, None).await;
    assert!(matches!(
        result,
        Err(GatewayError::Pull { remote, branch, .. }) if remote == "origin" && branch == "main"
    ));

    Ok(())
}
