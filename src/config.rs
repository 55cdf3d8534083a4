use crate::patch::{DEFAULT_CONTEXT_LINES, PatchOptions};
use std::path::PathBuf;

/// Settings shared by every operation on a repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Working tree git is run in
    pub repo_path: PathBuf,
    /// Context lines kept around each staged change
    pub context_lines: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            repo_path: PathBuf::from("."),
            context_lines: DEFAULT_CONTEXT_LINES,
        }
    }
}

impl Config {
    pub fn new(repo_path: impl Into<PathBuf>) -> Self {
        Self {
            repo_path: repo_path.into(),
            ..Self::default()
        }
    }

    pub fn with_context_lines(mut self, context_lines: usize) -> Self {
        self.context_lines = context_lines;
        self
    }

    pub fn patch_options(&self) -> PatchOptions {
        PatchOptions {
            context_lines: self.context_lines,
        }
    }
}
