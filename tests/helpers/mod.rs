#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::extract::DefaultBodyLimit;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;
use tower_http::limit::RequestBodyLimitLayer;

use pushdeploy::auth::signature;
use pushdeploy::config::Config;
use pushdeploy::state::AppState;

pub const TEST_SECRET: &str = "integration-secret";

/// Stand-in for the package manager: `install` succeeds, `run build` copies
/// `public/` into `build/` unless the checkout contains a `FAIL` marker.
pub const FAKE_PM: &str = r#"case "$1" in
  install) echo "added 0 packages" ;;
  run)
    if [ -f FAIL ]; then echo "compiling"; echo "Module not found: ./missing" >&2; exit 1; fi
    mkdir -p build && cp -R public/. build/
    ;;
esac
"#;

/// Build a test `AppState` rooted in a fresh tempdir.
///
/// - Source and deploy bases live under the tempdir (`src/`, `www/`)
/// - The package manager is `sh <script>` so no real npm is needed
/// - Subprocess timeout is short so hung commands fail the test quickly
pub fn test_state(pm_script: &str) -> (TempDir, AppState) {
    let dir = tempfile::tempdir().unwrap();
    let script = dir.path().join("fake-pm.sh");
    std::fs::write(&script, pm_script).unwrap();

    let config = Config {
        listen: "127.0.0.1:0".into(),
        webhook_secret: Some(TEST_SECRET.into()),
        source_base: dir.path().join("src"),
        deploy_base: dir.path().join("www"),
        git_bin: "git".into(),
        package_manager: format!("sh {}", script.display()),
        build_dir: "build".into(),
        excluded_dirs: vec!["node_modules".into()],
        command_timeout: Duration::from_secs(30),
        max_body_bytes: 64 * 1024,
        shutdown_grace: Duration::from_secs(5),
    };
    (dir, AppState::new(config))
}

/// Build the full router with the given state, as `main` does.
pub fn test_router(state: AppState) -> Router {
    let max_body_bytes = state.config.max_body_bytes;
    Router::new()
        .route("/healthz", axum::routing::get(|| async { "ok" }))
        .merge(pushdeploy::api::router())
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .with_state(state)
}

/// A minimal push payload naming `name` and `clone_url`.
pub fn push_payload(name: &str, clone_url: &str) -> Vec<u8> {
    serde_json::to_vec(&serde_json::json!({
        "ref": "refs/heads/main",
        "repository": { "name": name, "clone_url": clone_url },
    }))
    .unwrap()
}

/// POST raw bytes to `/webhook` with optional signature and event headers.
pub async fn post_webhook(
    app: &Router,
    body: &[u8],
    signature: Option<&str>,
    event: Option<&str>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/webhook")
        .header("Content-Type", "application/json");
    if let Some(sig) = signature {
        builder = builder.header(signature::SIGNATURE_HEADER, sig);
    }
    if let Some(event) = event {
        builder = builder.header("X-GitHub-Event", event);
    }
    let req = builder.body(Body::from(body.to_vec())).unwrap();

    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let body = body_json(resp).await;
    (status, body)
}

/// POST `body` to `/webhook` signed with [`TEST_SECRET`].
pub async fn post_signed(app: &Router, body: &[u8]) -> (StatusCode, Value) {
    let sig = signature::sign(TEST_SECRET, body);
    post_webhook(app, body, Some(&sig), Some("push")).await
}

async fn body_json(resp: axum::http::Response<Body>) -> Value {
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    if bytes.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(&bytes).unwrap_or(Value::Null)
}

/// Poll until `path` exists. Panics after `timeout_secs`.
pub async fn wait_for_file(path: &Path, timeout_secs: u64) {
    let start = std::time::Instant::now();
    while !path.exists() {
        assert!(
            start.elapsed().as_secs() <= timeout_secs,
            "{} did not appear within {timeout_secs}s",
            path.display()
        );
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

// ---------------------------------------------------------------------------
// Git repo helpers
// ---------------------------------------------------------------------------

/// Create a bare git repo whose default branch is `main`.
pub fn create_bare_repo() -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let repo_path = dir.path().join("remote.git");
    git_cmd(dir.path(), &["init", "--bare", repo_path.to_str().unwrap()]);
    git_cmd(&repo_path, &["symbolic-ref", "HEAD", "refs/heads/main"]);
    (dir, repo_path)
}

/// Create a working copy of `bare_path`, write `files`, commit and push to `main`.
pub fn create_working_copy(bare_path: &Path, files: &[(&str, &str)]) -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let work_path = dir.path().join("work");
    git_cmd(dir.path(), &["clone", bare_path.to_str().unwrap(), "work"]);
    commit_and_push(&work_path, files, "initial commit");
    (dir, work_path)
}

/// Write `files` (relative path, contents) into `work`, commit and push to `main`.
pub fn commit_and_push(work: &Path, files: &[(&str, &str)], message: &str) {
    for (rel, contents) in files {
        let path = work.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, contents).unwrap();
    }
    git_cmd(work, &["add", "."]);
    git_cmd(work, &["commit", "-m", message]);
    git_cmd(work, &["push", "origin", "HEAD:refs/heads/main"]);
}

/// Run a git command in a directory; panic on failure.
pub fn git_cmd(dir: &Path, args: &[&str]) -> String {
    let output = std::process::Command::new("git")
        .args(args)
        .current_dir(dir)
        .env("GIT_AUTHOR_NAME", "Integration Test")
        .env("GIT_AUTHOR_EMAIL", "test@pushdeploy.local")
        .env("GIT_COMMITTER_NAME", "Integration Test")
        .env("GIT_COMMITTER_EMAIL", "test@pushdeploy.local")
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "git {} failed: {}",
        args.join(" "),
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8(output.stdout).unwrap()
}
