use std::fmt;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

/// One external program invocation: a program name and its argv, never a shell line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Build from a configured command prefix such as `npm` or `pnpm --silent`,
    /// split on whitespace, followed by `args`.
    pub fn with_prefix(prefix: &str, args: &[&str]) -> Self {
        let mut parts = prefix.split_whitespace();
        let program = parts.next().unwrap_or(prefix);
        Self::new(program, parts.chain(args.iter().copied()))
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Exit status and captured output of a finished subprocess.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Stdout and stderr joined for diagnostics, empty streams omitted.
    pub fn combined(&self) -> String {
        match (self.stdout.trim(), self.stderr.trim()) {
            ("", "") => String::new(),
            (out, "") => out.to_owned(),
            ("", err) => err.to_owned(),
            (out, err) => format!("{out}\n{err}"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("failed to start `{command}`: {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },

    #[error("`{command}` timed out after {}s", .timeout.as_secs())]
    TimedOut { command: String, timeout: Duration },
}

/// Run `spec` in `cwd`, capturing output. The child is killed if it outlives `timeout`.
#[tracing::instrument(skip_all, fields(command = %spec, cwd = %cwd.display()))]
pub async fn run(
    spec: &CommandSpec,
    cwd: &Path,
    timeout: Duration,
) -> Result<CommandOutput, ProcessError> {
    let child = tokio::process::Command::new(&spec.program)
        .args(&spec.args)
        .current_dir(cwd)
        .env("GIT_TERMINAL_PROMPT", "0")
        .env("LC_ALL", "C")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output();

    let output = match tokio::time::timeout(timeout, child).await {
        Ok(Ok(output)) => output,
        Ok(Err(source)) => {
            return Err(ProcessError::Spawn {
                command: spec.to_string(),
                source,
            });
        }
        Err(_) => {
            tracing::warn!(timeout_s = timeout.as_secs(), "command timed out, killing");
            return Err(ProcessError::TimedOut {
                command: spec.to_string(),
                timeout,
            });
        }
    };

    let result = CommandOutput {
        exit_code: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    };
    tracing::debug!(exit_code = ?result.exit_code, "command finished");
    Ok(result)
}
