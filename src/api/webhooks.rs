use axum::extract::State;
use axum::http::HeaderMap;
use axum::routing::post;
use axum::{Json, Router};
use bytes::Bytes;

use crate::auth::signature::SIGNATURE_HEADER;
use crate::error::ApiError;
use crate::pipeline::controller;
use crate::state::AppState;

/// Header naming the event type; absent for senders that only send pushes.
pub const EVENT_HEADER: &str = "X-GitHub-Event";

pub fn router() -> Router<AppState> {
    Router::new().route("/webhook", post(receive_push))
}

/// Trigger endpoint. Responds once the signature and payload are valid; the
/// deployment itself runs in the background and reports only through logs.
///
/// The body is taken as raw bytes so the signature is checked against exactly
/// what was sent.
#[tracing::instrument(skip_all, fields(body_len = body.len()))]
async fn receive_push(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<serde_json::Value>, ApiError> {
    let signature = header_str(&headers, SIGNATURE_HEADER);
    let event = controller::accept(&state.config, body, signature)?;

    if let Some(kind) = header_str(&headers, EVENT_HEADER)
        && kind != "push"
    {
        tracing::info!(event = %kind, repository = %event.repo_name, "ignoring non-push event");
        return Ok(Json(serde_json::json!({
            "status": "ignored",
            "event": kind,
            "repository": event.repo_name,
        })));
    }

    let repository = event.repo_name.clone();
    let (run_id, _detached) = controller::spawn(state, event);
    tracing::info!(%run_id, %repository, "trigger accepted, deployment started");

    Ok(Json(serde_json::json!({
        "status": "accepted",
        "repository": repository,
        "run_id": run_id,
    })))
}

fn header_str(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned)
}
