use serde::Serialize;

/// Kind of a line inside a hunk body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LineOp {
    Context,
    Add,
    Delete,
}

impl LineOp {
    /// The unified-diff prefix character for this kind of line
    pub fn prefix(self) -> char {
        match self {
            LineOp::Context => ' ',
            LineOp::Add => '+',
            LineOp::Delete => '-',
        }
    }

    pub fn from_prefix(c: char) -> Option<Self> {
        match c {
            ' ' => Some(LineOp::Context),
            '+' => Some(LineOp::Add),
            '-' => Some(LineOp::Delete),
            _ => None,
        }
    }
}

/// One physical line of a hunk body, numbered on both sides.
///
/// `old_line` is present unless the line is an addition, `new_line` is
/// present unless the line is a deletion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiffLine {
    pub op: LineOp,
    pub content: String,
    pub old_line: Option<u32>,
    pub new_line: Option<u32>,
    /// Followed by `\ No newline at end of file` in the source diff
    pub missing_newline: bool,
}

impl DiffLine {
    pub fn context(content: impl Into<String>, old_line: u32, new_line: u32) -> Self {
        Self {
            op: LineOp::Context,
            content: content.into(),
            old_line: Some(old_line),
            new_line: Some(new_line),
            missing_newline: false,
        }
    }

    pub fn add(content: impl Into<String>, new_line: u32) -> Self {
        Self {
            op: LineOp::Add,
            content: content.into(),
            old_line: None,
            new_line: Some(new_line),
            missing_newline: false,
        }
    }

    pub fn delete(content: impl Into<String>, old_line: u32) -> Self {
        Self {
            op: LineOp::Delete,
            content: content.into(),
            old_line: Some(old_line),
            new_line: None,
            missing_newline: false,
        }
    }

    /// True for additions and deletions
    pub fn is_change(&self) -> bool {
        self.op != LineOp::Context
    }

    /// Line number a selection is matched against: the new-file number for
    /// additions, the old-file number otherwise.
    pub fn effective_line(&self) -> Option<u32> {
        match self.op {
            LineOp::Add => self.new_line,
            LineOp::Delete | LineOp::Context => self.old_line,
        }
    }
}
