//! git's interactive rebase todo file, and rewriting it to follow a spec.

use super::{ActionType, RebaseError, RebaseParseError, RebaseSpec, RebaseValidationError};
use nom::IResult;
use nom::Parser;
use nom::bytes::complete::take_till1;
use nom::character::complete::space0;
use nom::combinator::rest;
use serde::Serialize;
use std::fmt;

/// One instruction line of a todo file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TodoEntry {
    pub action: ActionType,
    /// Empty for exec lines
    pub commit: String,
    /// Commit subject, or the command of an exec line
    pub subject: String,
}

impl TodoEntry {
    pub fn new(action: ActionType, commit: impl Into<String>, subject: impl Into<String>) -> Self {
        TodoEntry {
            action,
            commit: commit.into(),
            subject: subject.into(),
        }
    }

    pub fn exec(command: impl Into<String>) -> Self {
        TodoEntry::new(ActionType::Exec, String::new(), command)
    }
}

impl fmt::Display for TodoEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.action == ActionType::Exec {
            return write!(f, "exec {}", self.subject);
        }
        write!(f, "{} {}", self.action, self.commit)?;
        if !self.subject.is_empty() {
            write!(f, " {}", self.subject)?;
        }
        Ok(())
    }
}

/// A run of non-whitespace
fn word(i: &str) -> IResult<&str, &str> {
    take_till1(|c: char| c.is_whitespace()).parse(i)
}

/// `WORD REST`, with the separating blanks dropped
fn word_and_rest(i: &str) -> IResult<&str, (&str, &str)> {
    (word, space0, rest).map(|(w, _, r)| (w, r)).parse(i)
}

/// Parse a todo file into entries.
///
/// Blank lines and `#` comments are skipped, as are instructions outside
/// [`ActionType`] (`label`, `reset`, `merge`, `update-ref`, `break`, `noop`).
///
/// ```
/// use git_lines::rebase::ActionType;
/// use git_lines::rebase::todo::parse_todo;
///
/// let entries = parse_todo("pick abc1234 First\n# comment\nf def5678 fixup! First\n").unwrap();
/// assert_eq!(entries.len(), 2);
/// assert_eq!(entries[1].action, ActionType::Fixup);
/// assert_eq!(entries[1].subject, "fixup! First");
/// ```
pub fn parse_todo(text: &str) -> Result<Vec<TodoEntry>, RebaseParseError> {
    let mut entries = Vec::new();

    for raw in text.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let malformed = || RebaseParseError::MalformedTodoLine {
            line: line.to_string(),
        };
        let (_, (verb, args)) = word_and_rest(line).map_err(|_| malformed())?;

        let Some(action) = ActionType::parse(verb) else {
            tracing::debug!(verb, "skipping todo instruction");
            continue;
        };

        if action == ActionType::Exec {
            if args.is_empty() {
                return Err(malformed());
            }
            entries.push(TodoEntry::exec(args));
            continue;
        }

        // `fixup -C <commit>` keeps the fixup's message; only the commit matters here
        let args = args
            .strip_prefix("-C ")
            .or_else(|| args.strip_prefix("-c "))
            .map_or(args, str::trim_start);

        let (_, (commit, subject)) = word_and_rest(args).map_err(|_| malformed())?;
        entries.push(TodoEntry::new(action, commit, subject));
    }

    Ok(entries)
}

/// Render entries back into todo file syntax, one per line.
pub fn render_todo(entries: &[TodoEntry]) -> String {
    entries.iter().map(|e| format!("{e}\n")).collect()
}

/// Find the original entry a spec commit refers to.
///
/// An exact match wins; otherwise either string may be a prefix of the
/// other, and more than one distinct match is rejected.
fn resolve<'a>(
    index: usize,
    query: &str,
    original: &'a [TodoEntry],
) -> Result<&'a TodoEntry, RebaseValidationError> {
    let query_lower = query.to_ascii_lowercase();
    let commits = original.iter().filter(|e| !e.commit.is_empty());

    if let Some(entry) = commits.clone().find(|e| e.commit.eq_ignore_ascii_case(query)) {
        return Ok(entry);
    }

    let mut matches: Vec<&TodoEntry> = commits
        .filter(|e| {
            let commit = e.commit.to_ascii_lowercase();
            commit.starts_with(&query_lower) || query_lower.starts_with(&commit)
        })
        .collect();
    matches.dedup_by(|a, b| a.commit == b.commit);

    match matches.as_slice() {
        [entry] => Ok(entry),
        [] => Err(RebaseValidationError::CommitNotFound {
            index,
            commit: query.to_string(),
        }),
        many => Err(RebaseValidationError::AmbiguousCommit {
            index,
            commit: query.to_string(),
            candidates: many
                .iter()
                .map(|e| e.commit.as_str())
                .collect::<Vec<_>>()
                .join(", "),
        }),
    }
}

/// Check that every commit the spec names is in the rebase range.
pub fn validate_against_commits(
    spec: &RebaseSpec,
    original: &[TodoEntry],
) -> Result<(), RebaseValidationError> {
    for (i, action) in spec.actions.iter().enumerate() {
        if action.action == ActionType::Exec {
            continue;
        }
        let commit = action.commit().unwrap_or_default();
        resolve(i + 1, commit, original)?;
    }
    Ok(())
}

/// Build the new todo entries, in spec order, from the entries git wrote.
///
/// The original entry supplies the full commit and subject; the spec
/// supplies the action. A reword or squash with a message is followed by an
/// exec that amends the commit with that message.
pub fn reorder_to_match_spec(
    spec: &RebaseSpec,
    original: &[TodoEntry],
) -> Result<Vec<TodoEntry>, RebaseValidationError> {
    let mut entries = Vec::with_capacity(spec.actions.len());

    for (i, action) in spec.actions.iter().enumerate() {
        if action.action == ActionType::Exec {
            let command = action.command.as_deref().unwrap_or_default().trim();
            entries.push(TodoEntry::exec(command));
            continue;
        }

        let entry = resolve(i + 1, action.commit().unwrap_or_default(), original)?;
        match (action.action, action.message()) {
            (ActionType::Reword, Some(message)) => {
                entries.push(TodoEntry::new(ActionType::Pick, &entry.commit, &entry.subject));
                entries.push(TodoEntry::exec(amend_message_command(message)));
            }
            (ActionType::Squash, Some(message)) => {
                entries.push(TodoEntry::new(ActionType::Squash, &entry.commit, &entry.subject));
                entries.push(TodoEntry::exec(amend_message_command(message)));
            }
            (kind, _) => entries.push(TodoEntry::new(kind, &entry.commit, &entry.subject)),
        }
    }

    Ok(entries)
}

/// A single-line shell command that replaces HEAD's message with `message`.
pub fn amend_message_command(message: &str) -> String {
    let lines: Vec<String> = message.trim_end().lines().map(shell_quote).collect();
    format!(
        "printf '%s\\n' {} | git commit --amend --allow-empty --only --quiet -F -",
        lines.join(" ")
    )
}

/// Quote `s` as one POSIX shell word.
pub fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

/// Rewrite the todo file git generated so that it carries out `spec`.
///
/// Nothing is rewritten unless every commit in the spec resolves.
pub fn rewrite_todo(spec: &RebaseSpec, todo: &str) -> Result<String, RebaseError> {
    let original = parse_todo(todo)?;
    if original.iter().all(|e| e.commit.is_empty()) {
        return Err(RebaseValidationError::EmptyTodo.into());
    }

    spec.validate()?;
    validate_against_commits(spec, &original)?;
    let entries = reorder_to_match_spec(spec, &original)?;

    tracing::debug!(
        original = original.len(),
        rewritten = entries.len(),
        "rewrote rebase todo"
    );
    Ok(render_todo(&entries))
}
