use std::time::{Duration, Instant};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;
use tracing::Instrument;
use uuid::Uuid;

use crate::auth::signature;
use crate::config::Config;
use crate::deployer::publish::{self, PublishOutcome, SkipReason};
use crate::error::ApiError;
use crate::git::sync::{Git, SyncOutcome};
use crate::state::AppState;

use super::build::{self, BuildOutcome, BuildResult, BuildSettings};
use super::discover;
use super::error::PipelineError;
use super::trigger::TriggerEvent;
use super::{RepoHandle, Stage};

/// Summary of a run that reached `Done`.
#[derive(Debug)]
pub struct RunReport {
    pub run_id: Uuid,
    pub repository: String,
    pub revision: Option<String>,
    pub sync: SyncOutcome,
    pub builds: Vec<BuildResult>,
    pub publish: PublishOutcome,
    pub started_at: DateTime<Utc>,
    pub elapsed: Duration,
}

/// Verify and parse an inbound trigger. This is the only stage whose outcome
/// reaches the caller; everything after it runs in the background.
pub fn accept(
    config: &Config,
    raw_body: Bytes,
    signature_header: Option<String>,
) -> Result<TriggerEvent, ApiError> {
    tracing::debug!(from = %Stage::Idle, to = %Stage::Verifying, "stage transition");
    if !signature::verify(
        config.webhook_secret.as_deref(),
        &raw_body,
        signature_header.as_deref(),
    ) {
        tracing::warn!(
            has_header = signature_header.is_some(),
            "rejecting trigger: missing or invalid signature"
        );
        return Err(ApiError::Unauthorized);
    }
    TriggerEvent::from_verified(raw_body, signature_header)
}

/// Start a run in the background and return immediately.
///
/// The task is tracked in `state.runs` and logs its own outcome, including
/// being dropped before it finishes. The handle is only for callers that
/// want to wait on it.
pub fn spawn(
    state: AppState,
    event: TriggerEvent,
) -> (Uuid, JoinHandle<Result<RunReport, PipelineError>>) {
    let run_id = Uuid::new_v4();
    let span = tracing::info_span!("run", %run_id, repo = %event.repo_name);
    let runs = state.runs.clone();
    let handle = runs.spawn(
        async move {
            let mut pending = Unfinished {
                run_id,
                repository: event.repo_name.clone(),
                done: false,
            };
            let result = run(&state, &event, run_id).await;
            pending.done = true;
            match &result {
                Ok(report) => log_report(report),
                Err(e) => {
                    tracing::error!(stage = %e.stage(), error = %e, "pipeline run failed");
                }
            }
            result
        }
        .instrument(span),
    );
    (run_id, handle)
}

/// Stop accepting new runs into `runs` and wait up to `grace` for the
/// in-flight ones. Returns how many were still running when it gave up.
pub async fn drain(runs: &TaskTracker, grace: Duration) -> usize {
    runs.close();
    if runs.is_empty() {
        return 0;
    }
    tracing::info!(
        in_flight = runs.len(),
        grace_s = grace.as_secs(),
        "waiting for in-flight runs"
    );
    if tokio::time::timeout(grace, runs.wait()).await.is_ok() {
        return 0;
    }
    let interrupted = runs.len();
    tracing::warn!(interrupted, "grace period elapsed, interrupting in-flight runs");
    interrupted
}

/// Reports a run whose future was dropped before it produced an outcome,
/// e.g. when the runtime shuts down mid-build.
struct Unfinished {
    run_id: Uuid,
    repository: String,
    done: bool,
}

impl Drop for Unfinished {
    fn drop(&mut self) {
        if !self.done {
            tracing::error!(
                run_id = %self.run_id,
                repository = %self.repository,
                "pipeline run interrupted before completion"
            );
        }
    }
}

/// Execute one run: sync → discover → build each sub-project → publish.
///
/// Runs for the same repository are serialized; the lock is held for the
/// whole run because every stage touches the shared working copy or target.
pub async fn run(
    state: &AppState,
    event: &TriggerEvent,
    run_id: Uuid,
) -> Result<RunReport, PipelineError> {
    let config = &state.config;
    let started_at = Utc::now();
    let clock = Instant::now();

    if state.repo_locks.is_busy(&event.repo_name) {
        tracing::info!("another run for this repository is in progress, queued");
    }
    let _guard = state.repo_locks.acquire(&event.repo_name).await;

    let repo = RepoHandle {
        name: event.repo_name.clone(),
        source_path: config.source_path(&event.repo_name),
        clone_url: event.clone_url.clone(),
    };
    let mut stage = StageTracker::default();

    stage.enter(Stage::Syncing);
    let git = Git::new(config.git_bin.as_str(), config.command_timeout);
    let sync = git.sync(&repo).await?;
    let revision = git.head_revision(&repo.source_path).await;

    stage.enter(Stage::Discovering);
    let projects = {
        let root = repo.source_path.clone();
        let excluded = config.excluded_dirs.clone();
        let package_manager = config.package_manager.clone();
        tokio::task::spawn_blocking(move || {
            discover::discover(&root, &excluded, &package_manager)
        })
        .await
        .map_err(|e| PipelineError::DiscoveryFailed(e.to_string()))??
    };

    stage.enter(Stage::Building);
    let settings = BuildSettings {
        root: &repo.source_path,
        build_dir: &config.build_dir,
        timeout: config.command_timeout,
    };
    let mut builds = Vec::with_capacity(projects.len());
    for project in &projects {
        builds.push(build::build(project, &settings).await?);
    }

    stage.enter(Stage::Publishing);
    let publish = publish::publish(&builds, &config.deploy_path(&repo.name)).await?;

    stage.enter(Stage::Done);
    Ok(RunReport {
        run_id,
        repository: repo.name,
        revision,
        sync,
        builds,
        publish,
        started_at,
        elapsed: clock.elapsed(),
    })
}

#[derive(Debug)]
struct StageTracker {
    current: Stage,
}

impl Default for StageTracker {
    fn default() -> Self {
        Self {
            current: Stage::Idle,
        }
    }
}

impl StageTracker {
    fn enter(&mut self, next: Stage) {
        tracing::info!(from = %self.current, to = %next, "stage transition");
        self.current = next;
    }
}

fn log_report(report: &RunReport) {
    let built = report
        .builds
        .iter()
        .filter(|b| matches!(b.outcome, BuildOutcome::Succeeded { .. }))
        .count();
    let skipped = report.builds.len() - built;
    let elapsed_ms = u64::try_from(report.elapsed.as_millis()).unwrap_or(u64::MAX);

    match &report.publish {
        PublishOutcome::Published { source } => tracing::info!(
            revision = report.revision.as_deref().unwrap_or("unknown"),
            sync = ?report.sync,
            built,
            skipped,
            source = %source.display(),
            started_at = %report.started_at,
            elapsed_ms,
            "deployment complete"
        ),
        PublishOutcome::Skipped(SkipReason::NoBuilds) => tracing::info!(
            revision = report.revision.as_deref().unwrap_or("unknown"),
            sync = ?report.sync,
            skipped,
            elapsed_ms,
            "run complete, no build step to publish"
        ),
        PublishOutcome::Skipped(SkipReason::MissingOutput(path)) => tracing::warn!(
            revision = report.revision.as_deref().unwrap_or("unknown"),
            sync = ?report.sync,
            built,
            missing = %path.display(),
            elapsed_ms,
            "run complete without publish: build output directory missing"
        ),
    }
}
