use bytes::Bytes;
use serde::Deserialize;

use crate::error::ApiError;
use crate::validation;

/// One authenticated push notification, consumed by a single pipeline run.
#[derive(Debug, Clone)]
pub struct TriggerEvent {
    pub repo_name: String,
    pub clone_url: String,
    pub raw_body: Bytes,
    pub signature: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PushPayload {
    repository: Option<RepositoryInfo>,
}

#[derive(Debug, Deserialize)]
struct RepositoryInfo {
    name: Option<String>,
    clone_url: Option<String>,
}

impl TriggerEvent {
    /// Build an event from an already-verified request body.
    ///
    /// Only `repository.name` and `repository.clone_url` are required; every
    /// other field of the push payload is ignored.
    pub fn from_verified(raw_body: Bytes, signature: Option<String>) -> Result<Self, ApiError> {
        let payload: PushPayload = serde_json::from_slice(&raw_body)
            .map_err(|e| ApiError::BadRequest(format!("invalid JSON payload: {e}")))?;
        let repo = payload
            .repository
            .ok_or_else(|| ApiError::BadRequest("missing repository in payload".into()))?;

        let (Some(repo_name), Some(clone_url)) = (repo.name, repo.clone_url) else {
            return Err(ApiError::BadRequest(
                "missing repository.name or repository.clone_url in payload".into(),
            ));
        };

        validation::check_repo_name(&repo_name)?;
        validation::check_clone_url(&clone_url)?;

        Ok(Self {
            repo_name,
            clone_url,
            raw_body,
            signature,
        })
    }
}
