use std::env;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub listen: String,
    pub webhook_secret: Option<String>,
    pub source_base: PathBuf,
    pub deploy_base: PathBuf,
    pub git_bin: String,
    pub package_manager: String,
    pub build_dir: String,
    pub excluded_dirs: Vec<String>,
    pub command_timeout: Duration,
    pub max_body_bytes: usize,
    /// How long shutdown waits for in-flight runs before interrupting them.
    pub shutdown_grace: Duration,
}

fn parse_list(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect()
}

impl Config {
    pub fn load() -> Self {
        Self {
            listen: env::var("PUSHDEPLOY_LISTEN").unwrap_or_else(|_| "0.0.0.0:5001".into()),
            webhook_secret: env::var("PUSHDEPLOY_WEBHOOK_SECRET")
                .ok()
                .filter(|s| !s.is_empty()),
            source_base: env::var("PUSHDEPLOY_SOURCE_BASE")
                .map_or_else(|_| PathBuf::from("/root/ci-cd"), PathBuf::from),
            deploy_base: env::var("PUSHDEPLOY_DEPLOY_BASE")
                .map_or_else(|_| PathBuf::from("/var/www"), PathBuf::from),
            git_bin: env::var("PUSHDEPLOY_GIT_BIN").unwrap_or_else(|_| "git".into()),
            package_manager: env::var("PUSHDEPLOY_PACKAGE_MANAGER")
                .unwrap_or_else(|_| "npm".into()),
            build_dir: env::var("PUSHDEPLOY_BUILD_DIR").unwrap_or_else(|_| "build".into()),
            excluded_dirs: env::var("PUSHDEPLOY_EXCLUDED_DIRS")
                .ok()
                .map_or_else(|| vec!["node_modules".to_owned()], |v| parse_list(&v)),
            command_timeout: Duration::from_secs(
                env::var("PUSHDEPLOY_COMMAND_TIMEOUT_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(600),
            ),
            max_body_bytes: env::var("PUSHDEPLOY_MAX_BODY_BYTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(5 * 1024 * 1024),
            shutdown_grace: Duration::from_secs(
                env::var("PUSHDEPLOY_SHUTDOWN_GRACE_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(120),
            ),
        }
    }

    /// Working copy location for a repository: `<source_base>/<name>`.
    pub fn source_path(&self, repo_name: &str) -> PathBuf {
        self.source_base.join(repo_name)
    }

    /// Public serving location for a repository: `<deploy_base>/<name>`.
    pub fn deploy_path(&self, repo_name: &str) -> PathBuf {
        self.deploy_base.join(repo_name)
    }
}
