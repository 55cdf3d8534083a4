//! Thin wrapper around the `git` binary.

use crate::GitCommandError;
use crate::rebase::CommitInfo;
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

/// Field separator for `git log --format`
const FIELD_SEP: char = '\x1f';
const LOG_FORMAT: &str = "--format=%H%x1f%h%x1f%s%x1f%an <%ae>%x1f%aI";

/// How a rebase command left the repository
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RebaseOutcome {
    Completed,
    /// Stopped for an `edit`, a conflict, or a failing `exec`
    Stopped { conflicts: Vec<String> },
}

/// Whether a rebase is paused, and why
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RebaseState {
    #[default]
    None,
    /// Waiting at an `edit`, a `break` or a failed `exec`
    Stopped,
    /// Waiting for conflicts to be resolved
    Conflict,
}

/// Progress of the rebase in progress, read from git's state directory
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RebaseStatus {
    pub in_progress: bool,
    pub state: RebaseState,
    /// Branch being rebased, without `refs/heads/`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub onto: Option<String>,
    pub done: usize,
    pub remaining: usize,
    pub total: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub conflicts: Vec<String>,
}

/// Runs git commands against one repository
pub struct Git<'a> {
    repo_path: &'a Path,
}

impl<'a> Git<'a> {
    pub fn new(repo_path: &'a Path) -> Self {
        Self { repo_path }
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new("git");
        cmd.arg("-C").arg(self.repo_path);
        cmd
    }

    fn output(&self, cmd: &mut Command, name: &str) -> Result<Output, GitCommandError> {
        cmd.output().map_err(|e| GitCommandError::SpawnFailed {
            command: name.to_string(),
            message: e.to_string(),
        })
    }

    /// Run `git <args>` and return its stdout, failing on a non-zero exit.
    fn run(&self, args: &[&str]) -> Result<String, GitCommandError> {
        let name = args.first().copied().unwrap_or("git");
        let output = self.output(self.command().args(args), name)?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(GitCommandError::ExitError {
                command: name.to_string(),
                stderr: stderr.trim().to_string(),
            });
        }

        String::from_utf8(output.stdout).map_err(|e| GitCommandError::InvalidUtf8 {
            command: name.to_string(),
            message: e.to_string(),
        })
    }

    fn diff_args<'s>(context: &'s str, cached: bool, paths: &'s [String]) -> Vec<&'s str> {
        let mut args = vec!["diff"];
        if cached {
            args.push("--cached");
        }
        args.extend([
            "--no-ext-diff",
            "--no-color",
            "--src-prefix=a/",
            "--dst-prefix=b/",
            context,
            "--",
        ]);
        args.extend(paths.iter().map(|s| s.as_str()));
        args
    }

    /// Unstaged changes for `paths` (everything if empty)
    pub fn diff(&self, paths: &[String], context_lines: usize) -> Result<String, GitCommandError> {
        let context = format!("-U{context_lines}");
        self.run(&Self::diff_args(&context, false, paths))
    }

    /// Staged changes for `paths` (everything if empty)
    pub fn diff_cached(
        &self,
        paths: &[String],
        context_lines: usize,
    ) -> Result<String, GitCommandError> {
        let context = format!("-U{context_lines}");
        self.run(&Self::diff_args(&context, true, paths))
    }

    /// Apply a patch to the index only.
    ///
    /// Always passes `--unidiff-zero`: a hunk cut short at an unselected
    /// change can carry no trailing context without being at end of file.
    pub fn apply_cached(&self, patch: &str) -> Result<(), GitCommandError> {
        let mut child = self
            .command()
            .args(["apply", "--cached", "--unidiff-zero", "-"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| GitCommandError::SpawnFailed {
                command: "apply".to_string(),
                message: e.to_string(),
            })?;

        child
            .stdin
            .take()
            .ok_or(GitCommandError::StdinFailed)?
            .write_all(patch.as_bytes())
            .map_err(|e| GitCommandError::WriteFailed {
                message: e.to_string(),
            })?;

        let output = child
            .wait_with_output()
            .map_err(|e| GitCommandError::WaitFailed {
                message: e.to_string(),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(GitCommandError::ExitError {
                command: "apply".to_string(),
                stderr: stderr.trim().to_string(),
            });
        }

        tracing::info!(bytes = patch.len(), "applied patch to index");
        Ok(())
    }

    /// Commit the index with `message` and return the new HEAD.
    pub fn commit(&self, message: &str) -> Result<CommitInfo, GitCommandError> {
        self.run(&["commit", "--quiet", "-m", message])?;
        let head = self.head()?;
        tracing::info!(commit = %head.short_hash, "committed index");
        Ok(head)
    }

    fn head(&self) -> Result<CommitInfo, GitCommandError> {
        let stdout = self.run(&["log", "-1", "--no-color", LOG_FORMAT, "HEAD", "--"])?;
        parse_log_line(stdout.trim_end_matches('\n'))
    }

    /// Unstage `paths`, or the whole index when `paths` is empty.
    pub fn reset(&self, paths: &[String]) -> Result<(), GitCommandError> {
        let mut args = vec!["reset", "--quiet"];
        if !paths.is_empty() {
            args.push("--");
            args.extend(paths.iter().map(String::as_str));
        }
        self.run(&args)?;
        tracing::info!(paths = paths.len(), "reset index");
        Ok(())
    }

    /// Commits in `base..HEAD`, oldest first.
    pub fn list_commits(&self, base: &str) -> Result<Vec<CommitInfo>, GitCommandError> {
        let range = format!("{base}..HEAD");
        let stdout = self.run(&["log", "--reverse", "--no-color", LOG_FORMAT, &range, "--"])?;
        stdout.lines().map(parse_log_line).collect()
    }

    /// Start `git rebase -i` onto `base`, with `sequence_editor` rewriting the todo.
    pub fn rebase_start(
        &self,
        base: &str,
        sequence_editor: &str,
    ) -> Result<RebaseOutcome, GitCommandError> {
        tracing::info!(base, "starting interactive rebase");
        let mut cmd = self.command();
        cmd.args(["rebase", "-i", "--no-autosquash", base])
            .env("GIT_SEQUENCE_EDITOR", sequence_editor);
        self.drive_rebase(cmd)
    }

    pub fn rebase_continue(&self) -> Result<RebaseOutcome, GitCommandError> {
        let mut cmd = self.command();
        cmd.args(["rebase", "--continue"]);
        self.drive_rebase(cmd)
    }

    pub fn rebase_skip(&self) -> Result<RebaseOutcome, GitCommandError> {
        let mut cmd = self.command();
        cmd.args(["rebase", "--skip"]);
        self.drive_rebase(cmd)
    }

    pub fn rebase_abort(&self) -> Result<(), GitCommandError> {
        self.run(&["rebase", "--abort"])?;
        tracing::info!("aborted rebase");
        Ok(())
    }

    /// Run a rebase step with no interactive editor.
    ///
    /// A failure that leaves the rebase in progress is a stop, not an error.
    fn drive_rebase(&self, mut cmd: Command) -> Result<RebaseOutcome, GitCommandError> {
        cmd.env("GIT_EDITOR", "cat");
        let output = self.output(&mut cmd, "rebase")?;

        if self.rebase_in_progress()? {
            let conflicts = self.conflicts()?;
            tracing::info!(conflicts = conflicts.len(), "rebase stopped");
            return Ok(RebaseOutcome::Stopped { conflicts });
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(GitCommandError::ExitError {
                command: "rebase".to_string(),
                stderr: stderr.trim().to_string(),
            });
        }

        tracing::info!("rebase completed");
        Ok(RebaseOutcome::Completed)
    }

    fn git_path(&self, name: &str) -> Result<PathBuf, GitCommandError> {
        let path = PathBuf::from(self.run(&["rev-parse", "--git-path", name])?.trim());
        Ok(if path.is_absolute() {
            path
        } else {
            self.repo_path.join(path)
        })
    }

    pub fn rebase_in_progress(&self) -> Result<bool, GitCommandError> {
        Ok(self.git_path("rebase-merge")?.exists() || self.git_path("rebase-apply")?.exists())
    }

    /// Where the current rebase stands; the default status when none is running.
    pub fn rebase_status(&self) -> Result<RebaseStatus, GitCommandError> {
        let merge_dir = self.git_path("rebase-merge")?;
        let apply_dir = self.git_path("rebase-apply")?;

        let (dir, done, remaining) = if merge_dir.exists() {
            let done = count_todo_lines(&read_state(&merge_dir, "done"));
            let remaining = count_todo_lines(&read_state(&merge_dir, "git-rebase-todo"));
            (merge_dir, done, remaining)
        } else if apply_dir.exists() {
            // Patches are numbered: `next` of `last`, the current one not yet done
            let number = |name: &str| -> usize {
                read_state(&apply_dir, name).trim().parse().unwrap_or(0)
            };
            let done = number("next").saturating_sub(1);
            let remaining = number("last").saturating_sub(done);
            (apply_dir, done, remaining)
        } else {
            return Ok(RebaseStatus::default());
        };

        let conflicts = self.conflicts()?;
        let state = if conflicts.is_empty() {
            RebaseState::Stopped
        } else {
            RebaseState::Conflict
        };
        let head_name = read_state(&dir, "head-name");
        let head_name = head_name.trim();
        let onto = read_state(&dir, "onto");

        Ok(RebaseStatus {
            in_progress: true,
            state,
            branch: non_empty(head_name.strip_prefix("refs/heads/").unwrap_or(head_name)),
            onto: non_empty(onto.trim()),
            done,
            remaining,
            total: done + remaining,
            conflicts,
        })
    }

    /// Paths with unresolved merge conflicts
    pub fn conflicts(&self) -> Result<Vec<String>, GitCommandError> {
        let stdout = self.run(&["diff", "--name-only", "--diff-filter=U"])?;
        Ok(stdout.lines().map(str::to_string).collect())
    }
}

/// A rebase state file, empty when missing
fn read_state(dir: &Path, name: &str) -> String {
    fs::read_to_string(dir.join(name)).unwrap_or_default()
}

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

/// Instruction lines in a todo or done file
fn count_todo_lines(text: &str) -> usize {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .count()
}

fn parse_log_line(line: &str) -> Result<CommitInfo, GitCommandError> {
    let fields: Vec<&str> = line.split(FIELD_SEP).collect();
    let [hash, short_hash, subject, author, date] = fields.as_slice() else {
        return Err(GitCommandError::MalformedLog {
            line: line.to_string(),
        });
    };
    Ok(CommitInfo {
        hash: hash.to_string(),
        short_hash: short_hash.to_string(),
        subject: subject.to_string(),
        author: author.to_string(),
        date: date.to_string(),
    })
}
