//! Structural, line-numbered model of a unified diff.

use error_set::error_set;
use std::fmt::Write;

pub mod file;
pub mod full;
pub mod hunk;
pub mod line;

pub use file::FileDiff;
pub use full::ParsedDiff;
pub use hunk::Hunk;
pub use line::{DiffLine, LineOp};

error_set! {
    /// Errors from parsing unified diff text
    DiffError := {
        #[display("Malformed hunk header '{line}'")]
        MalformedHunkHeader { line: String },
        #[display("Hunk header '{line}' appears before any file header")]
        HunkOutsideFile { line: String },
        #[display("Unexpected line in hunk body: '{line}'")]
        UnexpectedHunkLine { line: String },
        #[display("Hunk body does not match the counts in '{header}'")]
        HunkCountMismatch { header: String },
        #[display("Hunk '{header}' ended early: {missing_old} old and {missing_new} new lines missing")]
        TruncatedHunk {
            header: String,
            missing_old: u32,
            missing_new: u32,
        },
        #[display("Line numbers in hunk '{header}' overflow")]
        LineNumberOverflow { header: String },
    }
}

/// Format a parsed diff for display with explicit line numbers.
///
/// Only change lines are listed; additions carry their new-file number and
/// deletions their old-file number, which are the numbers a selection uses.
///
/// ```text
/// flake.nix:
///   +137:	      debug = true;
/// ```
pub fn format_diff(diff: &ParsedDiff) -> String {
    let mut result = String::new();

    for file in &diff.files {
        result.push_str(file.path());
        result.push_str(":\n");

        if file.is_binary {
            result.push_str("  (binary file)\n\n");
            continue;
        }

        for hunk in &file.hunks {
            for line in hunk.lines.iter().filter(|l| l.is_change()) {
                if let Some(number) = line.effective_line() {
                    let _ = writeln!(
                        result,
                        "  {}{}:\t{}",
                        line.op.prefix(),
                        number,
                        line.content
                    );
                }
            }
            result.push('\n');
        }
    }

    // Remove trailing blank line if present
    if result.ends_with("\n\n") {
        result.pop();
    }

    result
}
