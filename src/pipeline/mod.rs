pub mod build;
pub mod controller;
pub mod discover;
pub mod error;
pub mod process;
pub mod trigger;

use std::fmt;
use std::path::PathBuf;

/// Pipeline run states, in order. Any stage after `Verifying` may end in failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Idle,
    Verifying,
    Syncing,
    Discovering,
    Building,
    Publishing,
    Done,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Verifying => "verifying",
            Self::Syncing => "syncing",
            Self::Discovering => "discovering",
            Self::Building => "building",
            Self::Publishing => "publishing",
            Self::Done => "done",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The on-disk working copy of one remote repository.
#[derive(Debug, Clone)]
pub struct RepoHandle {
    pub name: String,
    pub source_path: PathBuf,
    pub clone_url: String,
}
