use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use super::error::PipelineError;
use super::process::CommandSpec;

/// File that marks a directory as an installable sub-project.
pub const MANIFEST_FILE: &str = "package.json";

/// Script name whose presence makes a sub-project buildable.
pub const BUILD_SCRIPT: &str = "build";

/// Directories never descended into regardless of configuration.
const ALWAYS_SKIPPED: [&str; 1] = [".git"];

#[derive(Debug, Deserialize)]
struct Manifest {
    #[serde(default)]
    scripts: BTreeMap<String, serde_json::Value>,
}

/// A directory with its own manifest, ready to install and possibly build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubProject {
    pub dir: PathBuf,
    pub install: CommandSpec,
    pub build: Option<CommandSpec>,
}

impl SubProject {
    /// Path relative to `root` for logs and error messages; `.` for the root itself.
    pub fn display_name(&self, root: &Path) -> String {
        match self.dir.strip_prefix(root) {
            Ok(rel) if rel.as_os_str().is_empty() => ".".to_owned(),
            Ok(rel) => rel.display().to_string(),
            Err(_) => self.dir.display().to_string(),
        }
    }
}

/// Enumerate sub-projects under `root` in depth-first, name-sorted order.
///
/// Directories named in `excluded_dirs` (dependency caches) and `.git` are
/// not descended into; symlinked directories are not followed. A manifest
/// that cannot be read or parsed is skipped with a warning.
pub fn discover(
    root: &Path,
    excluded_dirs: &[String],
    package_manager: &str,
) -> Result<Vec<SubProject>, PipelineError> {
    if !root.is_dir() {
        return Err(PipelineError::DiscoveryFailed(format!(
            "{} is not a directory",
            root.display()
        )));
    }

    let mut found = Vec::new();
    walk(root, excluded_dirs, package_manager, &mut found);
    tracing::info!(root = %root.display(), count = found.len(), "sub-projects discovered");
    Ok(found)
}

fn walk(dir: &Path, excluded_dirs: &[String], package_manager: &str, found: &mut Vec<SubProject>) {
    let manifest_path = dir.join(MANIFEST_FILE);
    if manifest_path.is_file() {
        match read_manifest(&manifest_path) {
            Ok(manifest) => found.push(describe(dir, &manifest, package_manager)),
            Err(e) => {
                tracing::warn!(
                    path = %manifest_path.display(),
                    error = %e,
                    "skipping unparsable manifest"
                );
            }
        }
    }

    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!(path = %dir.display(), error = %e, "skipping unreadable directory");
            return;
        }
    };

    let mut subdirs: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_ok_and(|t| t.is_dir()))
        .filter(|entry| {
            let file_name = entry.file_name();
            let name: &str = &file_name.to_string_lossy();
            !ALWAYS_SKIPPED.contains(&name) && !excluded_dirs.iter().any(|d| d == name)
        })
        .map(|entry| entry.path())
        .collect();
    subdirs.sort();

    for sub in subdirs {
        walk(&sub, excluded_dirs, package_manager, found);
    }
}

fn read_manifest(path: &Path) -> anyhow::Result<Manifest> {
    let raw = fs::read(path)?;
    Ok(serde_json::from_slice(&raw)?)
}

fn describe(dir: &Path, manifest: &Manifest, package_manager: &str) -> SubProject {
    let has_build = manifest
        .scripts
        .get(BUILD_SCRIPT)
        .and_then(serde_json::Value::as_str)
        .is_some_and(|s| !s.trim().is_empty());

    SubProject {
        dir: dir.to_path_buf(),
        install: CommandSpec::with_prefix(package_manager, &["install"]),
        build: has_build.then(|| CommandSpec::with_prefix(package_manager, &["run", BUILD_SCRIPT])),
    }
}
