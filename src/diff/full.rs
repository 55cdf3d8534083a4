use serde::Serialize;
use super::DiffError;
use super::file::FileDiff;
use super::hunk::HunkBody;

/// A complete git diff containing changes for multiple files
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ParsedDiff {
    pub files: Vec<FileDiff>,
}

impl ParsedDiff {
    /// Parse a complete unified diff into file diffs.
    ///
    /// Empty or whitespace-only input is an empty diff, not an error.
    ///
    /// ```
    /// use git_lines::diff::ParsedDiff;
    ///
    /// let diff = ParsedDiff::parse(
    ///     "diff --git a/a.txt b/a.txt\n--- a/a.txt\n+++ b/a.txt\n@@ -1,0 +2 @@\n+hello\n",
    /// )
    /// .unwrap();
    /// assert_eq!(diff.files[0].path(), "a.txt");
    /// assert_eq!(diff.files[0].hunks[0].lines[0].new_line, Some(2));
    /// ```
    pub fn parse(text: &str) -> Result<Self, DiffError> {
        if text.trim().is_empty() {
            return Ok(ParsedDiff::default());
        }

        let mut parser = DiffParser::default();
        let text = text.strip_suffix('\n').unwrap_or(text);
        for raw in text.split('\n') {
            parser.line(raw)?;
        }

        parser.finish()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

#[derive(Default)]
struct DiffParser {
    files: Vec<FileDiff>,
    current: Option<FileDiff>,
    body: Option<HunkBody>,
}

impl DiffParser {
    fn line(&mut self, raw: &str) -> Result<(), DiffError> {
        if let Some(body) = self.body.as_mut() {
            if raw.starts_with('\\') {
                body.mark_missing_newline();
                return Ok(());
            }
            if !body.is_complete() {
                return body.push(raw);
            }
            self.close_hunk()?;
        }

        if raw.starts_with("diff --git ") {
            self.close_file();
            self.current = Some(FileDiff::from_git_header(raw));
        } else if raw.starts_with("@@") {
            if self.current.is_none() {
                return Err(DiffError::HunkOutsideFile {
                    line: raw.to_string(),
                });
            }
            self.body = Some(HunkBody::start(raw)?);
        } else if raw.starts_with("--- ")
            && self.current.as_ref().is_none_or(|f| !f.hunks.is_empty())
        {
            // A plain unified diff has no `diff --git` line between files
            self.close_file();
            self.current = Some(FileDiff::from_old_header(raw));
        } else if let Some(file) = self.current.as_mut() {
            file.apply_header(raw);
        }

        Ok(())
    }

    fn close_hunk(&mut self) -> Result<(), DiffError> {
        if let Some(body) = self.body.take() {
            let hunk = body.finish()?;
            if let Some(file) = self.current.as_mut() {
                file.hunks.push(hunk);
            }
        }
        Ok(())
    }

    fn close_file(&mut self) {
        if let Some(file) = self.current.take() {
            self.files.push(file.finalize());
        }
    }

    fn finish(mut self) -> Result<ParsedDiff, DiffError> {
        self.close_hunk()?;
        self.close_file();
        Ok(ParsedDiff { files: self.files })
    }
}
