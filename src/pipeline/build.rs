use std::path::{Path, PathBuf};
use std::time::Duration;

use super::discover::SubProject;
use super::error::PipelineError;
use super::process::{self, ProcessError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildOutcome {
    /// Build step exited zero. `output_dir` is where its artifacts are
    /// expected; existence is only checked at publish time.
    Succeeded { output_dir: PathBuf },
    /// No build step declared; dependencies were still installed.
    Skipped,
}

#[derive(Debug, Clone)]
pub struct BuildResult {
    pub project: SubProject,
    pub outcome: BuildOutcome,
}

impl BuildResult {
    pub fn output_dir(&self) -> Option<&Path> {
        match &self.outcome {
            BuildOutcome::Succeeded { output_dir } => Some(output_dir),
            BuildOutcome::Skipped => None,
        }
    }
}

/// Settings shared by every sub-project build in one run.
#[derive(Debug, Clone)]
pub struct BuildSettings<'a> {
    /// Repository root, used to name sub-projects in logs and errors.
    pub root: &'a Path,
    /// Conventional output directory name inside each sub-project.
    pub build_dir: &'a str,
    pub timeout: Duration,
}

/// Install dependencies for `project`, then run its build step if it has one.
///
/// Install failure is a `BuildEnvironment` error and build failure a
/// `BuildStep` error carrying the captured output; both abort the run.
#[tracing::instrument(skip_all, fields(project = %project.display_name(settings.root)), err)]
pub async fn build(
    project: &SubProject,
    settings: &BuildSettings<'_>,
) -> Result<BuildResult, PipelineError> {
    let name = project.display_name(settings.root);

    tracing::info!(command = %project.install, "installing dependencies");
    let install = process::run(&project.install, &project.dir, settings.timeout)
        .await
        .map_err(|e| PipelineError::BuildEnvironment {
            project: name.clone(),
            detail: e.to_string(),
        })?;
    if !install.success() {
        return Err(PipelineError::BuildEnvironment {
            project: name,
            detail: format!(
                "`{}` exited with {}: {}",
                project.install,
                exit_status(install.exit_code),
                install.combined()
            ),
        });
    }

    let Some(build_cmd) = &project.build else {
        tracing::info!("no build step declared, skipping");
        return Ok(BuildResult {
            project: project.clone(),
            outcome: BuildOutcome::Skipped,
        });
    };

    tracing::info!(command = %build_cmd, "running build step");
    let output = match process::run(build_cmd, &project.dir, settings.timeout).await {
        Ok(output) => output,
        Err(e @ ProcessError::TimedOut { .. }) => {
            return Err(PipelineError::BuildStep {
                project: name,
                status: e.to_string(),
                output: String::new(),
            });
        }
        Err(e @ ProcessError::Spawn { .. }) => {
            return Err(PipelineError::BuildEnvironment {
                project: name,
                detail: e.to_string(),
            });
        }
    };

    if !output.success() {
        return Err(PipelineError::BuildStep {
            project: name,
            status: exit_status(output.exit_code),
            output: format!(
                "--- stdout ---\n{}\n--- stderr ---\n{}",
                output.stdout.trim_end(),
                output.stderr.trim_end()
            ),
        });
    }

    tracing::info!("build step succeeded");
    Ok(BuildResult {
        project: project.clone(),
        outcome: BuildOutcome::Succeeded {
            output_dir: project.dir.join(settings.build_dir),
        },
    })
}

fn exit_status(code: Option<i32>) -> String {
    code.map_or_else(
        || "terminated by signal".to_owned(),
        |c| format!("exit code {c}"),
    )
}
