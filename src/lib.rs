//! Line-level staging and declarative interactive rebase for git.
//!
//! Both turn an interactive git workflow into one driven by plain text: a
//! list of `path:lines` selections for staging, and a list of rebase actions
//! in place of an editor session.

use error_set::error_set;
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::Path;

pub mod config;
pub mod diff;
pub mod git;
pub mod parse;
pub mod patch;
pub mod rebase;

pub use config::Config;
pub use diff::{DiffError, ParsedDiff, format_diff};
pub use git::{Git, RebaseOutcome, RebaseState, RebaseStatus};
pub use parse::{ParseError, SelectionMap};
pub use rebase::{AutosquashPlan, CommitInfo, RebaseError, RebaseSpec, rewrite_todo};

use rebase::TodoEntry;
use rebase::todo::{shell_quote, validate_against_commits};

error_set! {
    /// Top-level error for git-lines operations
    GitLinesError := {
        #[display("No changes found in {paths}")]
        NoChanges { paths: String },
        #[display("Nothing staged to commit")]
        NothingStaged,
        #[display("Commit message is empty")]
        EmptyCommitMessage,
        #[display("Failed to access rebase spec {path}: {message}")]
        SpecFileError { path: String, message: String },
        #[display("Failed to access rebase todo {path}: {message}")]
        TodoFileError { path: String, message: String },
        ParseError(ParseError),
        DiffError(DiffError),
        RebaseError(RebaseError),
    } || GitCommandError

    /// Errors from git command execution
    GitCommandError := {
        #[display("Failed to run git {command}: {message}")]
        SpawnFailed { command: String, message: String },
        #[display("Failed to get stdin handle for git apply")]
        StdinFailed,
        #[display("Failed to write patch to git apply: {message}")]
        WriteFailed { message: String },
        #[display("Failed to wait for git apply: {message}")]
        WaitFailed { message: String },
        #[display("git {command} failed: {stderr}")]
        ExitError { command: String, stderr: String },
        #[display("Invalid UTF-8 in git {command} output: {message}")]
        InvalidUtf8 { command: String, message: String },
        #[display("Unexpected git log line '{line}'")]
        MalformedLog { line: String },
    }
}

/// Result of a staging request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StageOutcome {
    Staged { patch: String },
    /// The patch that would have been applied
    DryRun { patch: String },
    /// The selections matched no change line
    NothingToStage,
}

/// Result of `autosquash`; `outcome` is absent when no rebase ran.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AutosquashReport {
    pub plan: AutosquashPlan,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<RebaseOutcome>,
}

/// Main interface for git-lines operations
pub struct GitLines {
    config: Config,
}

impl GitLines {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    fn git(&self) -> Git<'_> {
        Git::new(&self.config.repo_path)
    }

    /// Parsed unstaged changes for `paths` (all files if empty)
    ///
    /// # Examples
    /// ```no_run
    /// # use git_lines::{Config, GitLines, format_diff};
    /// let lines = GitLines::new(Config::new("."));
    /// let diff = lines.diff(&[]).unwrap();
    /// print!("{}", format_diff(&diff));
    /// ```
    pub fn diff(&self, paths: &[String]) -> Result<ParsedDiff, GitLinesError> {
        let raw = self.git().diff(paths, self.config.context_lines)?;
        Ok(ParsedDiff::parse(&raw)?)
    }

    /// Parsed staged changes for `paths` (all files if empty)
    pub fn staged_diff(&self, paths: &[String]) -> Result<ParsedDiff, GitLinesError> {
        let raw = self.git().diff_cached(paths, self.config.context_lines)?;
        Ok(ParsedDiff::parse(&raw)?)
    }

    /// Stage exactly the selected change lines
    ///
    /// # Examples
    /// ```no_run
    /// # use git_lines::{Config, GitLines};
    /// let lines = GitLines::new(Config::new("."));
    /// lines.stage(&["src/main.rs:12-15,20"], false).unwrap();
    /// lines.stage(&["README.md:3", "src/lib.rs:7"], true).unwrap();
    /// ```
    pub fn stage<S: AsRef<str>>(
        &self,
        selections: &[S],
        dry_run: bool,
    ) -> Result<StageOutcome, GitLinesError> {
        let selections = SelectionMap::from_tokens(selections)?;
        let paths: Vec<String> = selections.paths().map(str::to_string).collect();

        let diff = self.diff(&paths)?;
        if diff.is_empty() {
            return Err(GitLinesError::NoChanges {
                paths: paths.join(", "),
            });
        }

        let patch = patch::build_patch(&diff, &selections, &self.config.patch_options());
        tracing::debug!(
            files = diff.files.len(),
            hunks = patch::count_hunks(&patch),
            "built patch"
        );

        if patch::is_empty_patch(&patch) {
            return Ok(StageOutcome::NothingToStage);
        }
        if dry_run {
            return Ok(StageOutcome::DryRun { patch });
        }

        self.git().apply_cached(&patch)?;
        Ok(StageOutcome::Staged { patch })
    }

    /// Commit what is staged, refusing when the index matches HEAD.
    ///
    /// # Examples
    /// ```no_run
    /// # use git_lines::{Config, GitLines};
    /// let lines = GitLines::new(Config::new("."));
    /// lines.stage(&["src/parse.rs:40-42"], false).unwrap();
    /// let commit = lines.commit("Reject empty ranges").unwrap();
    /// println!("{} {}", commit.short_hash, commit.subject);
    /// ```
    pub fn commit(&self, message: &str) -> Result<CommitInfo, GitLinesError> {
        if message.trim().is_empty() {
            return Err(GitLinesError::EmptyCommitMessage);
        }
        if self.git().diff_cached(&[], 0)?.trim().is_empty() {
            return Err(GitLinesError::NothingStaged);
        }
        Ok(self.git().commit(message)?)
    }

    /// Unstage `paths`, or everything when `paths` is empty
    pub fn reset(&self, paths: &[String]) -> Result<(), GitLinesError> {
        Ok(self.git().reset(paths)?)
    }

    /// Commits `base..HEAD`, oldest first
    pub fn list_commits(&self, base: &str) -> Result<Vec<CommitInfo>, GitLinesError> {
        Ok(self.git().list_commits(base)?)
    }

    /// Rebase onto `base` following `spec`.
    ///
    /// `editor_program` is this tool's executable; git runs it as the
    /// sequence editor (`rebase apply-spec SPEC TODO`) to rewrite the todo.
    /// The spec is checked against the commit range before git starts.
    pub fn rebase(
        &self,
        base: &str,
        spec: &RebaseSpec,
        editor_program: &Path,
    ) -> Result<RebaseOutcome, GitLinesError> {
        spec.validate().map_err(RebaseError::from)?;

        let range: Vec<TodoEntry> = self
            .list_commits(base)?
            .into_iter()
            .map(|c| TodoEntry::new(rebase::ActionType::Pick, c.hash, c.subject))
            .collect();
        if range.is_empty() {
            return Err(RebaseError::from(rebase::RebaseValidationError::EmptyTodo).into());
        }
        validate_against_commits(spec, &range).map_err(RebaseError::from)?;

        let spec_error = |e: std::io::Error| GitLinesError::SpecFileError {
            path: "<temporary>".to_string(),
            message: e.to_string(),
        };
        let mut spec_file = tempfile::Builder::new()
            .prefix("git-lines-spec-")
            .suffix(".json")
            .tempfile()
            .map_err(spec_error)?;
        spec_file
            .write_all(spec.to_json().as_bytes())
            .and_then(|()| spec_file.flush())
            .map_err(spec_error)?;

        let editor = format!(
            "{} rebase apply-spec {}",
            shell_quote(&editor_program.to_string_lossy()),
            shell_quote(&spec_file.path().to_string_lossy())
        );
        tracing::debug!(actions = spec.actions.len(), %editor, "rebase sequence editor");

        // spec_file stays alive until git returns
        Ok(self.git().rebase_start(base, &editor)?)
    }

    /// Move `fixup!`/`squash!` commits after their targets and rebase.
    pub fn autosquash(
        &self,
        base: &str,
        dry_run: bool,
        editor_program: &Path,
    ) -> Result<AutosquashReport, GitLinesError> {
        let plan = rebase::plan_autosquash(&self.list_commits(base)?);
        if dry_run || plan.is_noop() {
            return Ok(AutosquashReport {
                plan,
                outcome: None,
            });
        }

        let outcome = self.rebase(base, &plan.to_spec(), editor_program)?;
        Ok(AutosquashReport {
            plan,
            outcome: Some(outcome),
        })
    }

    pub fn rebase_continue(&self) -> Result<RebaseOutcome, GitLinesError> {
        Ok(self.git().rebase_continue()?)
    }

    pub fn rebase_skip(&self) -> Result<RebaseOutcome, GitLinesError> {
        Ok(self.git().rebase_skip()?)
    }

    pub fn rebase_abort(&self) -> Result<(), GitLinesError> {
        Ok(self.git().rebase_abort()?)
    }

    pub fn rebase_status(&self) -> Result<RebaseStatus, GitLinesError> {
        Ok(self.git().rebase_status()?)
    }
}

/// Sequence editor step: rewrite the todo file at `todo_path` in place to
/// carry out the JSON spec at `spec_path`.
///
/// The todo file is left untouched on any error.
pub fn apply_spec_file(spec_path: &Path, todo_path: &Path) -> Result<(), GitLinesError> {
    let spec_text = fs::read_to_string(spec_path).map_err(|e| GitLinesError::SpecFileError {
        path: spec_path.display().to_string(),
        message: e.to_string(),
    })?;
    let spec = RebaseSpec::parse_json(&spec_text)?;

    let todo_error = |e: std::io::Error| GitLinesError::TodoFileError {
        path: todo_path.display().to_string(),
        message: e.to_string(),
    };
    let todo = fs::read_to_string(todo_path).map_err(todo_error)?;
    let rewritten = rewrite_todo(&spec, &todo)?;
    fs::write(todo_path, rewritten).map_err(todo_error)?;

    tracing::debug!(todo = %todo_path.display(), "applied rebase spec");
    Ok(())
}
