use serde::Serialize;
use super::hunk::Hunk;

/// Path git uses for the missing side of an added or deleted file
pub const DEV_NULL: &str = "/dev/null";

/// A complete diff for a single file.
///
/// Contains all hunks (change blocks) for one file from a git diff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileDiff {
    /// Path before the change, [`DEV_NULL`] for an added file
    pub old_name: String,
    /// Path after the change, [`DEV_NULL`] for a deleted file
    pub new_name: String,
    pub is_new: bool,
    pub is_deleted: bool,
    pub is_renamed: bool,
    pub is_binary: bool,
    /// All hunks for this file, in file order
    pub hunks: Vec<Hunk>,
}

impl FileDiff {
    fn named(old_name: String, new_name: String) -> Self {
        FileDiff {
            old_name,
            new_name,
            is_new: false,
            is_deleted: false,
            is_renamed: false,
            is_binary: false,
            hunks: Vec::new(),
        }
    }

    /// The path a user refers to this file by.
    pub fn path(&self) -> &str {
        if self.is_deleted {
            &self.old_name
        } else {
            &self.new_name
        }
    }

    /// Start a file section from a `diff --git a/X b/Y` line.
    ///
    /// The names are provisional; `---`/`+++` and `rename` headers refine them.
    pub(crate) fn from_git_header(line: &str) -> Self {
        let rest = line.trim_start_matches("diff --git ");
        let (old, new) = split_git_header_paths(rest);
        FileDiff::named(old, new)
    }

    /// Start a file section from a bare `--- path` line (diffs without `diff --git`).
    pub(crate) fn from_old_header(line: &str) -> Self {
        let mut file = FileDiff::named(String::new(), String::new());
        file.apply_header(line);
        file
    }

    /// Apply one extended header line. Returns false for lines that are not
    /// recognised; those carry nothing the patch engine needs (index, mode,
    /// similarity).
    pub(crate) fn apply_header(&mut self, line: &str) -> bool {
        if let Some(name) = line.strip_prefix("--- ") {
            let name = header_path(name, "a/");
            self.is_new |= name == DEV_NULL;
            self.old_name = name;
        } else if let Some(name) = line.strip_prefix("+++ ") {
            let name = header_path(name, "b/");
            self.is_deleted |= name == DEV_NULL;
            self.new_name = name;
        } else if line.starts_with("new file mode") {
            self.is_new = true;
        } else if line.starts_with("deleted file mode") {
            self.is_deleted = true;
        } else if let Some(name) = line.strip_prefix("rename from ") {
            self.old_name = unquote(name).to_string();
        } else if let Some(name) = line.strip_prefix("rename to ") {
            self.new_name = unquote(name).to_string();
        } else if line == "GIT binary patch"
            || (line.starts_with("Binary files ") && line.ends_with(" differ"))
        {
            self.is_binary = true;
        } else {
            return false;
        }
        true
    }

    /// Settle the sentinel names and the rename flag once the section ends.
    pub(crate) fn finalize(mut self) -> Self {
        if self.is_new {
            self.old_name = DEV_NULL.to_string();
        }
        if self.is_deleted {
            self.new_name = DEV_NULL.to_string();
        }
        self.is_renamed = !self.is_new && !self.is_deleted && self.old_name != self.new_name;
        self
    }
}

/// Strip a `---`/`+++` value down to the repository path.
fn header_path(value: &str, prefix: &str) -> String {
    // Some diff producers append a tab and a timestamp
    let value = value.split('\t').next().unwrap_or(value);
    let value = unquote(value.trim_end_matches('\r'));
    if value == DEV_NULL {
        return DEV_NULL.to_string();
    }
    value.strip_prefix(prefix).unwrap_or(value).to_string()
}

fn unquote(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
}

/// Split `a/X b/Y` into `X` and `Y`.
///
/// Paths may contain spaces, so prefer the split where both sides agree,
/// which is the common unrenamed case.
fn split_git_header_paths(rest: &str) -> (String, String) {
    let candidates: Vec<usize> = rest.match_indices(" b/").map(|(i, _)| i).collect();
    let side = |s: &str, prefix: &str| {
        let s = unquote(s);
        s.strip_prefix(prefix).unwrap_or(s).to_string()
    };

    let split = candidates
        .iter()
        .copied()
        .find(|&i| side(&rest[..i], "a/") == side(&rest[i + 1..], "b/"))
        .or_else(|| candidates.first().copied());

    match split {
        Some(i) => (side(&rest[..i], "a/"), side(&rest[i + 1..], "b/")),
        None => (side(rest, "a/"), side(rest, "a/")),
    }
}
