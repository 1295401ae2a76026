use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use uuid::Uuid;

use super::error::DeployerError;
use crate::pipeline::build::BuildResult;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    /// The target now holds a copy of `source`.
    Published { source: PathBuf },
    Skipped(SkipReason),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// No sub-project ran a successful build step.
    NoBuilds,
    /// The selected build claimed success but its output directory is missing.
    MissingOutput(PathBuf),
}

/// The last successful build in discovery order; one artifact per target.
pub fn select_artifact(results: &[BuildResult]) -> Option<&BuildResult> {
    results.iter().rev().find(|r| r.output_dir().is_some())
}

/// Replace the contents of `target` with the selected artifact's build output.
///
/// The artifact is copied into a sibling staging directory first and then
/// renamed into place, so a failed copy leaves the previous deployment intact.
#[tracing::instrument(skip_all, fields(target = %target.display()), err)]
pub async fn publish(
    results: &[BuildResult],
    target: &Path,
) -> Result<PublishOutcome, DeployerError> {
    let Some(source) = select_artifact(results).and_then(BuildResult::output_dir) else {
        tracing::info!("no successful builds, nothing to publish");
        return Ok(PublishOutcome::Skipped(SkipReason::NoBuilds));
    };

    if !tokio::fs::try_exists(source).await.unwrap_or(false) {
        tracing::warn!(
            source = %source.display(),
            "build reported success but produced no output directory, skipping publish"
        );
        return Ok(PublishOutcome::Skipped(SkipReason::MissingOutput(
            source.to_path_buf(),
        )));
    }

    let source = source.to_path_buf();
    let target = target.to_path_buf();
    let published = source.clone();
    tokio::task::spawn_blocking(move || replace_dir(&source, &target)).await??;

    tracing::info!(source = %published.display(), "build output published");
    Ok(PublishOutcome::Published { source: published })
}

fn replace_dir(source: &Path, target: &Path) -> Result<(), DeployerError> {
    let (Some(parent), Some(name)) = (target.parent(), target.file_name()) else {
        return Err(DeployerError::SwapFailed(format!(
            "invalid target path {}",
            target.display()
        )));
    };
    let name = name.to_string_lossy();
    fs::create_dir_all(parent)
        .map_err(|e| DeployerError::CopyFailed(format!("create {}: {e}", parent.display())))?;
    sweep_leftovers(parent, &name);

    let run_tag = Uuid::new_v4().simple().to_string();
    let staging = parent.join(format!(".{name}.staging-{run_tag}"));
    if let Err(e) = copy_dir(source, &staging) {
        discard(&staging);
        return Err(DeployerError::CopyFailed(format!(
            "{} -> {}: {e}",
            source.display(),
            staging.display()
        )));
    }

    let previous = parent.join(format!(".{name}.previous-{run_tag}"));
    let had_previous = target.symlink_metadata().is_ok();
    if had_previous && let Err(e) = fs::rename(target, &previous) {
        discard(&staging);
        return Err(DeployerError::SwapFailed(format!(
            "move aside {}: {e}",
            target.display()
        )));
    }

    if let Err(e) = fs::rename(&staging, target) {
        if had_previous && let Err(restore) = fs::rename(&previous, target) {
            tracing::error!(
                error = %restore,
                previous = %previous.display(),
                "failed to restore previous deployment"
            );
        }
        discard(&staging);
        return Err(DeployerError::SwapFailed(format!(
            "move {} into place: {e}",
            staging.display()
        )));
    }

    if had_previous {
        discard(&previous);
    }
    Ok(())
}

/// Recursively copy the contents of `src` into a new directory `dst`.
fn copy_dir(src: &Path, dst: &Path) -> io::Result<()> {
    fs::create_dir(dst)?;
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        let to = dst.join(entry.file_name());
        if file_type.is_dir() {
            copy_dir(&entry.path(), &to)?;
        } else if file_type.is_symlink() {
            copy_symlink(&entry.path(), &to)?;
        } else {
            fs::copy(entry.path(), &to)?;
        }
    }
    Ok(())
}

#[cfg(unix)]
fn copy_symlink(src: &Path, dst: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(fs::read_link(src)?, dst)
}

#[cfg(not(unix))]
fn copy_symlink(src: &Path, dst: &Path) -> io::Result<()> {
    fs::copy(src, dst).map(|_| ())
}

/// Remove staging and backup siblings of `name` left by a run that was killed
/// mid-publish. Runs for one repository are serialized, so none are live.
fn sweep_leftovers(parent: &Path, name: &str) {
    let prefixes = [format!(".{name}.staging-"), format!(".{name}.previous-")];
    let Ok(entries) = fs::read_dir(parent) else {
        return;
    };
    for entry in entries.filter_map(Result::ok) {
        let file_name = entry.file_name();
        let file_name = file_name.to_string_lossy();
        if prefixes.iter().any(|p| file_name.starts_with(p.as_str())) {
            tracing::warn!(
                path = %entry.path().display(),
                "removing leftover from an interrupted publish"
            );
            discard(&entry.path());
        }
    }
}

fn discard(path: &Path) {
    let result = match path.symlink_metadata() {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(path),
        Ok(_) => fs::remove_file(path),
        Err(_) => return,
    };
    if let Err(e) = result {
        tracing::warn!(path = %path.display(), error = %e, "failed to remove leftover directory");
    }
}
