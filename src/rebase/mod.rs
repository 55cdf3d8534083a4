//! Declarative interactive rebase: specs, todo files and autosquash planning.
//!
//! A [`RebaseSpec`] says what the history should look like; [`todo`] turns
//! it into the todo file git's own rebase machinery executes.

use error_set::error_set;
use serde::Serialize;

pub mod action;
pub mod autosquash;
pub mod spec;
pub mod todo;

pub use action::ActionType;
pub use autosquash::{AutosquashPlan, AutosquashStep, plan_autosquash};
pub use spec::{RebaseAction, RebaseSpec};
pub use todo::{TodoEntry, rewrite_todo};

error_set! {
    /// Any failure to read or apply a rebase spec
    RebaseError := RebaseParseError || RebaseValidationError

    /// Malformed spec or todo syntax
    RebaseParseError := {
        #[display("no rebase actions specified")]
        NoActions,
        #[display("unknown action '{action}'")]
        UnknownAction { action: String },
        #[display("invalid JSON spec: {message}\ninput: {snippet}")]
        InvalidJson { message: String, snippet: String },
        #[display("malformed todo line '{line}'")]
        MalformedTodoLine { line: String },
    }

    /// A well-formed spec that cannot be carried out
    RebaseValidationError := {
        #[display("rebase spec has no actions")]
        EmptySpec,
        #[display("action {index}: exec command cannot contain newlines")]
        CommandNewline { index: usize },
        #[display("action {index}: exec action requires a command")]
        MissingCommand { index: usize },
        #[display("action {index}: {action} action requires a commit hash")]
        MissingCommit { index: usize, action: ActionType },
        #[display("action {index}: only exec actions take a command")]
        UnexpectedCommand { index: usize },
        #[display("action {index}: {action} does not take a message")]
        UnexpectedMessage { index: usize, action: ActionType },
        #[display("cannot start with {action}: no previous commit to combine with")]
        StartsWithCombine { action: ActionType },
        #[display("action {index}: commit '{commit}' not found in rebase range")]
        CommitNotFound { index: usize, commit: String },
        #[display("action {index}: commit '{commit}' is ambiguous, matches {candidates}")]
        AmbiguousCommit {
            index: usize,
            commit: String,
            candidates: String,
        },
        #[display("rebase todo list has no commits")]
        EmptyTodo,
    }
}

/// A commit in the range being rebased, oldest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommitInfo {
    pub hash: String,
    pub short_hash: String,
    pub subject: String,
    pub author: String,
    /// Author date, ISO 8601
    pub date: String,
}

impl CommitInfo {
    /// Whether `query` names this commit by full hash or any prefix of it.
    pub fn matches(&self, query: &str) -> bool {
        !query.is_empty() && self.hash.starts_with(query)
    }
}

/// Looks like a 7-40 character hex object name.
pub fn is_commit_hash(s: &str) -> bool {
    (7..=40).contains(&s.len()) && s.chars().all(|c| c.is_ascii_hexdigit())
}
