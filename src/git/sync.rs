use std::path::Path;
use std::time::Duration;

use crate::pipeline::RepoHandle;
use crate::pipeline::error::PipelineError;
use crate::pipeline::process::{self, CommandOutput, CommandSpec};

/// Identity used for the autostash commit so it works on hosts without git user config.
const STASH_IDENTITY: [&str; 4] = [
    "-c",
    "user.name=pushdeploy",
    "-c",
    "user.email=pushdeploy@localhost",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    Cloned,
    Pulled,
    /// Local modifications were stashed so the update could apply.
    /// `stash_restored` is false when reapplying them conflicted; the stash
    /// entry is kept and the tree is left at the remote state.
    PulledAfterStash { stash_restored: bool },
}

/// Why a fast-forward update was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateFailure {
    DirtyTree,
    Other,
}

/// Classify `git pull` stderr. Only a dirty working tree is recoverable.
pub fn classify_update_failure(stderr: &str) -> UpdateFailure {
    const DIRTY_MARKERS: [&str; 3] = [
        "would be overwritten",
        "commit your changes",
        "commit or stash",
    ];
    let lower = stderr.to_lowercase();
    if DIRTY_MARKERS.iter().any(|m| lower.contains(m)) {
        UpdateFailure::DirtyTree
    } else {
        UpdateFailure::Other
    }
}

/// Whether `git stash push` saved nothing, leaving nothing to pop afterwards.
fn nothing_stashed(stdout: &str) -> bool {
    stdout.contains("No local changes to save")
}

/// Runs `git` with a fixed binary and per-invocation timeout.
#[derive(Debug, Clone)]
pub struct Git {
    bin: String,
    timeout: Duration,
}

impl Git {
    pub fn new(bin: impl Into<String>, timeout: Duration) -> Self {
        Self {
            bin: bin.into(),
            timeout,
        }
    }

    async fn run(&self, cwd: &Path, args: &[&str]) -> Result<CommandOutput, PipelineError> {
        let spec = CommandSpec::new(self.bin.as_str(), args.iter().copied());
        process::run(&spec, cwd, self.timeout)
            .await
            .map_err(|e| PipelineError::SyncFailed(e.to_string()))
    }

    /// Clone the repository if missing, otherwise fast-forward it, recovering
    /// from local modifications by stashing them around the update.
    ///
    /// Never deletes the working copy on failure.
    #[tracing::instrument(skip(self, repo), fields(repo = %repo.name, path = %repo.source_path.display()), err)]
    pub async fn sync(&self, repo: &RepoHandle) -> Result<SyncOutcome, PipelineError> {
        if tokio::fs::try_exists(&repo.source_path)
            .await
            .unwrap_or(false)
        {
            self.pull(&repo.source_path).await
        } else {
            self.clone_repo(&repo.clone_url, &repo.source_path).await?;
            Ok(SyncOutcome::Cloned)
        }
    }

    async fn clone_repo(&self, url: &str, dest: &Path) -> Result<(), PipelineError> {
        let parent = dest
            .parent()
            .ok_or_else(|| PipelineError::SyncFailed("source path has no parent".into()))?;
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| PipelineError::SyncFailed(format!("create {}: {e}", parent.display())))?;

        tracing::info!(%url, "working copy missing, cloning");
        let dest_str = dest.to_string_lossy().into_owned();
        let output = self
            .run(parent, &["clone", "--", url, dest_str.as_str()])
            .await?;
        if !output.success() {
            return Err(PipelineError::SyncFailed(format!(
                "git clone failed: {}",
                output.stderr.trim()
            )));
        }
        Ok(())
    }

    async fn pull(&self, repo_dir: &Path) -> Result<SyncOutcome, PipelineError> {
        tracing::info!("working copy exists, pulling");
        let output = self.run(repo_dir, &["pull", "--ff-only"]).await?;
        if output.success() {
            return Ok(SyncOutcome::Pulled);
        }

        match classify_update_failure(&output.stderr) {
            UpdateFailure::DirtyTree => {
                tracing::warn!(
                    stderr = %output.stderr.trim(),
                    "local modifications block the update, stashing"
                );
                self.pull_after_stash(repo_dir).await
            }
            UpdateFailure::Other => Err(PipelineError::SyncFailed(format!(
                "git pull failed: {}",
                output.stderr.trim()
            ))),
        }
    }

    async fn pull_after_stash(&self, repo_dir: &Path) -> Result<SyncOutcome, PipelineError> {
        let mut args = STASH_IDENTITY.to_vec();
        args.extend([
            "stash",
            "push",
            "--include-untracked",
            "-m",
            "pushdeploy: autostash before sync",
        ]);
        let stash = self.run(repo_dir, &args).await?;
        if !stash.success() {
            return Err(PipelineError::SyncFailed(format!(
                "git stash failed: {}",
                stash.stderr.trim()
            )));
        }
        let stashed = !nothing_stashed(&stash.stdout);

        let retry = self.run(repo_dir, &["pull", "--ff-only"]).await?;
        if !retry.success() {
            return Err(PipelineError::SyncFailed(format!(
                "git pull failed after stashing local changes: {}",
                retry.stderr.trim()
            )));
        }

        if !stashed {
            return Ok(SyncOutcome::Pulled);
        }

        let pop = self.run(repo_dir, &["stash", "pop"]).await?;
        if pop.success() {
            tracing::info!("local modifications reapplied after update");
            return Ok(SyncOutcome::PulledAfterStash {
                stash_restored: true,
            });
        }

        tracing::warn!(
            output = %pop.combined(),
            "local modifications conflict with the update; stash kept, tree reset to remote"
        );
        let reset = self.run(repo_dir, &["reset", "--hard", "HEAD"]).await?;
        if !reset.success() {
            return Err(PipelineError::SyncFailed(format!(
                "git reset after conflicting stash pop failed: {}",
                reset.stderr.trim()
            )));
        }
        Ok(SyncOutcome::PulledAfterStash {
            stash_restored: false,
        })
    }

    /// Current `HEAD` commit, for run reports. `None` if it cannot be read.
    pub async fn head_revision(&self, repo_dir: &Path) -> Option<String> {
        match self.run(repo_dir, &["rev-parse", "HEAD"]).await {
            Ok(output) if output.success() => Some(output.stdout.trim().to_owned()),
            Ok(output) => {
                tracing::warn!(stderr = %output.stderr.trim(), "git rev-parse failed");
                None
            }
            Err(e) => {
                tracing::warn!(error = %e, "git rev-parse failed");
                None
            }
        }
    }
}
