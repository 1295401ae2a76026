use crate::deployer::error::DeployerError;

use super::Stage;

/// Failures that abort a pipeline run.
///
/// Recoverable conditions (dirty working tree, unparsable manifest, missing
/// build step, nothing to publish) are handled inside their stage and never
/// show up here.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("repository sync failed: {0}")]
    SyncFailed(String),

    #[error("project discovery failed: {0}")]
    DiscoveryFailed(String),

    #[error("dependency install failed in {project}: {detail}")]
    BuildEnvironment { project: String, detail: String },

    #[error("build step failed in {project} ({status})\n{output}")]
    BuildStep {
        project: String,
        status: String,
        output: String,
    },

    #[error(transparent)]
    Publish(#[from] DeployerError),
}

impl PipelineError {
    /// The stage this failure terminates.
    pub fn stage(&self) -> Stage {
        match self {
            Self::SyncFailed(_) => Stage::Syncing,
            Self::DiscoveryFailed(_) => Stage::Discovering,
            Self::BuildEnvironment { .. } | Self::BuildStep { .. } => Stage::Building,
            Self::Publish(_) => Stage::Publishing,
        }
    }
}
