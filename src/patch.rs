//! Build a patch that stages exactly the selected lines.
//!
//! Each source hunk can turn into several output hunks: included changes that
//! are separated by an unselected change line are emitted separately, unless
//! only unselected additions stand between them. Each output hunk carries up
//! to [`PatchOptions::context_lines`] lines of context on either side.

use crate::diff::file::DEV_NULL;
use crate::diff::hunk::tally;
use crate::diff::{DiffLine, FileDiff, Hunk, LineOp, ParsedDiff};
use crate::parse::{FileSelection, SelectionMap};
use std::fmt::Write;

/// Context lines kept around each output hunk, matching git's default
pub const DEFAULT_CONTEXT_LINES: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatchOptions {
    pub context_lines: usize,
}

impl Default for PatchOptions {
    fn default() -> Self {
        PatchOptions {
            context_lines: DEFAULT_CONTEXT_LINES,
        }
    }
}

/// Build a unified diff containing only the selected changes.
///
/// Returns an empty string when no selection matches a changed line.
///
/// ```
/// use git_lines::diff::ParsedDiff;
/// use git_lines::parse::SelectionMap;
/// use git_lines::patch::{PatchOptions, build_patch};
///
/// let diff = ParsedDiff::parse(
///     "--- a/a.txt\n+++ b/a.txt\n@@ -1,1 +1,3 @@\n one\n+two\n+three\n",
/// )
/// .unwrap();
/// let selection = SelectionMap::from_tokens(["a.txt:3"]).unwrap();
///
/// let patch = build_patch(&diff, &selection, &PatchOptions::default());
/// assert_eq!(patch, "--- a/a.txt\n+++ b/a.txt\n@@ -1,0 +2,1 @@\n+three\n");
/// ```
pub fn build_patch(diff: &ParsedDiff, selections: &SelectionMap, options: &PatchOptions) -> String {
    let mut patch = String::new();

    for file in &diff.files {
        let Some(selection) = selection_for(file, selections) else {
            continue;
        };
        if file.is_binary {
            tracing::debug!(path = file.path(), "skipping binary file");
            continue;
        }

        let hunks = select_hunks(file, selection, options);
        if hunks.is_empty() {
            continue;
        }

        let deletes_whole_file = file.is_deleted && covers_every_change(file, selection);
        write_file_header(&mut patch, file, deletes_whole_file);
        for hunk in &hunks {
            let _ = write!(patch, "{hunk}");
        }

        tracing::debug!(path = file.path(), hunks = hunks.len(), "selected hunks");
    }

    patch
}

/// Look a file up by its path, then by either side's name.
fn selection_for<'a>(file: &FileDiff, selections: &'a SelectionMap) -> Option<&'a FileSelection> {
    selections
        .get(file.path())
        .or_else(|| selections.get(&file.old_name))
        .or_else(|| selections.get(&file.new_name))
}

fn write_file_header(patch: &mut String, file: &FileDiff, deletes_whole_file: bool) {
    if file.is_new {
        let _ = writeln!(patch, "--- {DEV_NULL}");
    } else {
        let _ = writeln!(patch, "--- a/{}", file.old_name);
    }

    if deletes_whole_file {
        let _ = writeln!(patch, "+++ {DEV_NULL}");
    } else if file.is_deleted {
        // Removing only part of a deleted file leaves it a modification
        let _ = writeln!(patch, "+++ b/{}", file.old_name);
    } else {
        let _ = writeln!(patch, "+++ b/{}", file.new_name);
    }
}

fn covers_every_change(file: &FileDiff, selection: &FileSelection) -> bool {
    file.hunks.iter().all(|hunk| {
        included_changes(hunk, selection)
            .iter()
            .zip(&hunk.lines)
            .all(|(included, line)| *included || !line.is_change())
    })
}

/// Split every hunk of a file into the output hunks that stage the selection.
pub fn select_hunks(
    file: &FileDiff,
    selection: &FileSelection,
    options: &PatchOptions,
) -> Vec<Hunk> {
    let mut output = Vec::new();
    // Lines added minus lines removed by hunks already emitted for this file
    let mut delta: i64 = 0;

    for hunk in &file.hunks {
        let included = included_changes(hunk, selection);
        for (first, last) in included_runs(&hunk.lines, &included) {
            let (lo, hi) = extend_context(&hunk.lines, first, last, options.context_lines);
            let out = build_hunk(hunk, &included, lo, hi, delta);
            delta += out.line_delta();
            output.push(out);
        }
    }

    output
}

/// Decide, per line, whether it is a change to stage.
///
/// A change group holding both deletions and additions is all or nothing;
/// other groups are selected line by line.
fn included_changes(hunk: &Hunk, selection: &FileSelection) -> Vec<bool> {
    let lines = &hunk.lines;
    let mut included = vec![false; lines.len()];
    let selected = |line: &DiffLine| line.effective_line().is_some_and(|n| selection.contains(n));

    let mut start = 0;
    while start < lines.len() {
        if !lines[start].is_change() {
            start += 1;
            continue;
        }

        let end = lines[start..]
            .iter()
            .position(|l| !l.is_change())
            .map_or(lines.len(), |offset| start + offset);
        let group = &lines[start..end];

        let mixed = group.iter().any(|l| l.op == LineOp::Add)
            && group.iter().any(|l| l.op == LineOp::Delete);
        if mixed {
            let take = group.iter().any(selected);
            included[start..end].iter_mut().for_each(|inc| *inc = take);
        } else {
            for (offset, line) in group.iter().enumerate() {
                included[start + offset] = selected(line);
            }
        }

        start = end;
    }

    included
}

/// An unselected addition never reaches the index, so inside a run it is
/// dropped from the output hunk.
fn is_skipped_addition(line: &DiffLine, included: bool) -> bool {
    line.op == LineOp::Add && !included
}

/// Index ranges `(first, last)` of included changes.
///
/// An unselected change ends a run only when an old-file line also lies
/// between the two included changes: hunks split by additions alone share an
/// old-side anchor, and `git apply` stacks those in reverse.
fn included_runs(lines: &[DiffLine], included: &[bool]) -> Vec<(usize, usize)> {
    let mut runs = Vec::new();
    let mut current: Option<(usize, usize)> = None;
    let mut interrupted = false;
    let mut crossed_old_line = false;

    for (i, line) in lines.iter().enumerate() {
        if included[i] {
            current = match current {
                Some(run) if interrupted && crossed_old_line => {
                    runs.push(run);
                    Some((i, i))
                }
                Some((first, _)) => Some((first, i)),
                None => Some((i, i)),
            };
            interrupted = false;
            crossed_old_line = false;
        } else {
            interrupted |= line.is_change();
            crossed_old_line |= line.op != LineOp::Add;
        }
    }
    runs.extend(current);

    runs
}

/// Widen a run by up to `context` context lines each way, never crossing a change line.
fn extend_context(lines: &[DiffLine], first: usize, last: usize, context: usize) -> (usize, usize) {
    let before = lines[..first]
        .iter()
        .rev()
        .take(context)
        .take_while(|l| !l.is_change())
        .count();
    let after = lines[last + 1..]
        .iter()
        .take(context)
        .take_while(|l| !l.is_change())
        .count();

    (first - before, last + after)
}

/// Build the output hunk for `lines[lo..=hi]` without its skipped additions,
/// renumbered for a file that already has `delta` extra lines from earlier
/// output hunks.
fn build_hunk(source: &Hunk, included: &[bool], lo: usize, hi: usize, delta: i64) -> Hunk {
    let lines: Vec<DiffLine> = source.lines[lo..=hi]
        .iter()
        .zip(&included[lo..=hi])
        .filter(|(line, inc)| !is_skipped_addition(line, **inc))
        .map(|(line, _)| line.clone())
        .collect();
    let (old_count, new_count) = tally(&lines);

    // Old-file position of the first retained line, or where it would be inserted
    let anchor = match lines.first().and_then(|l| l.old_line) {
        Some(n) => n,
        None => source.lines[..lo]
            .iter()
            .rev()
            .find_map(|l| l.old_line)
            .map(|n| n + 1)
            .unwrap_or(if source.old_count == 0 {
                source.old_start.saturating_add(1)
            } else {
                source.old_start
            }),
    };

    // An empty side points at the line before, as git writes it
    let old_start = if old_count == 0 { anchor.saturating_sub(1) } else { anchor };
    let new_anchor = i64::from(anchor) + delta;
    let new_start = if new_count == 0 { new_anchor - 1 } else { new_anchor };

    Hunk {
        old_start,
        old_count,
        new_start: u32::try_from(new_start.max(0)).unwrap_or(0),
        new_count,
        section: source.section.clone(),
        lines,
    }
}

/// True when the patch has nothing to apply
pub fn is_empty_patch(patch: &str) -> bool {
    patch.trim().is_empty()
}

/// Number of hunk headers in a rendered patch
pub fn count_hunks(patch: &str) -> usize {
    patch.lines().filter(|l| l.starts_with("@@ ")).count()
}


#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod proptests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::BTreeSet;

    fn arb_op() -> impl Strategy<Value = LineOp> {
        prop_oneof![Just(LineOp::Context), Just(LineOp::Add), Just(LineOp::Delete)]
    }

    /// Render a single-hunk diff whose lines have unique content
    fn render_diff(ops: &[LineOp]) -> String {
        let old_count = ops.iter().filter(|op| **op != LineOp::Add).count();
        let new_count = ops.iter().filter(|op| **op != LineOp::Delete).count();
        let old_start = if old_count == 0 { 0 } else { 1 };
        let new_start = if new_count == 0 { 0 } else { 1 };

        let mut text = format!(
            "diff --git a/f.txt b/f.txt\n--- a/f.txt\n+++ b/f.txt\n@@ -{old_start},{old_count} +{new_start},{new_count} @@\n"
        );
        for (i, op) in ops.iter().enumerate() {
            text.push(op.prefix());
            text.push_str(&format!("line{i}\n"));
        }
        text
    }

    fn arb_case() -> impl Strategy<Value = (Vec<LineOp>, BTreeSet<u32>, usize)> {
        (
            prop::collection::vec(arb_op(), 1..30),
            prop::collection::btree_set(1..35u32, 1..8),
            0..4usize,
        )
    }

    proptest! {
        /// Every generated patch parses back with consistent hunk counts
        #[test]
        fn patch_reparses((ops, lines, context_lines) in arb_case()) {
            let diff = ParsedDiff::parse(&render_diff(&ops)).unwrap();
            let tokens: Vec<String> = lines.iter().map(|n| format!("f.txt:{n}")).collect();
            let selection = SelectionMap::from_tokens(&tokens).unwrap();

            let patch = build_patch(&diff, &selection, &PatchOptions { context_lines });
            let reparsed = ParsedDiff::parse(&patch);

            prop_assert!(reparsed.is_ok(), "unparseable patch:\n{}", patch);
            for hunk in reparsed.unwrap().files.iter().flat_map(|f| &f.hunks) {
                prop_assert_eq!(tally(&hunk.lines), (hunk.old_count, hunk.new_count));
                prop_assert!(hunk.change_count() > 0);
            }
        }

        /// Every selected addition is staged
        #[test]
        fn selected_additions_are_included((ops, lines, context_lines) in arb_case()) {
            let diff = ParsedDiff::parse(&render_diff(&ops)).unwrap();
            let tokens: Vec<String> = lines.iter().map(|n| format!("f.txt:{n}")).collect();
            let selection = SelectionMap::from_tokens(&tokens).unwrap();

            let patch = build_patch(&diff, &selection, &PatchOptions { context_lines });

            for line in diff.files[0].hunks[0].lines.iter().filter(|l| l.op == LineOp::Add) {
                if line.new_line.is_some_and(|n| lines.contains(&n)) {
                    let added = format!("+{}\n", line.content);
                    prop_assert!(patch.contains(&added), "missing {}", added);
                }
            }
        }

        /// Output hunks never overlap and appear in strict source order
        #[test]
        fn hunks_are_ordered((ops, lines, context_lines) in arb_case()) {
            let diff = ParsedDiff::parse(&render_diff(&ops)).unwrap();
            let tokens: Vec<String> = lines.iter().map(|n| format!("f.txt:{n}")).collect();
            let selection = SelectionMap::from_tokens(&tokens).unwrap();

            let file = &diff.files[0];
            let options = PatchOptions { context_lines };
            let hunks = select_hunks(file, selection.get("f.txt").unwrap(), &options);
            // An empty old side names the line before the insertion point
            let first_old = |h: &Hunk| if h.old_count == 0 { h.old_start + 1 } else { h.old_start };
            // A pure insertion sits between old lines `old_start` and `old_start + 1`
            let position = |h: &Hunk| 2 * h.old_start + u32::from(h.old_count == 0);
            for pair in hunks.windows(2) {
                prop_assert!(pair[0].old_start + pair[0].old_count <= first_old(&pair[1]));
                prop_assert!(position(&pair[0]) < position(&pair[1]));
            }
        }
    }
}
