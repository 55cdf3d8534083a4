use super::DiffError;
use super::line::{DiffLine, LineOp};
use nom::IResult;
use nom::Parser;
use nom::bytes::complete::tag;
use nom::character::complete::{char, u32 as decimal};
use nom::combinator::opt;
use nom::sequence::preceded;
use serde::Serialize;
use std::fmt;

pub const NO_NEWLINE_MARKER: &str = "\\ No newline at end of file";

/// A single hunk from a unified diff, with every body line numbered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Hunk {
    pub old_start: u32,
    pub old_count: u32,
    pub new_start: u32,
    pub new_count: u32,
    /// Text after the closing `@@`, usually the enclosing function
    pub section: Option<String>,
    pub lines: Vec<DiffLine>,
}

/// The numeric part of a `@@ -a,b +c,d @@ section` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HunkHeader {
    pub old_start: u32,
    pub old_count: u32,
    pub new_start: u32,
    pub new_count: u32,
    pub section: Option<String>,
}

fn number(i: &str) -> IResult<&str, u32> {
    decimal(i)
}

/// `start[,count]`, count defaulting to 1
fn range(i: &str) -> IResult<&str, (u32, u32)> {
    (number, opt(preceded(char(','), number)))
        .map(|(start, count)| (start, count.unwrap_or(1)))
        .parse(i)
}

fn header_ranges(i: &str) -> IResult<&str, ((u32, u32), (u32, u32))> {
    (tag("@@ -"), range, tag(" +"), range, tag(" @@"))
        .map(|(_, old, _, new, _)| (old, new))
        .parse(i)
}

impl HunkHeader {
    /// Parse a hunk header line.
    ///
    /// ```
    /// use git_lines::diff::hunk::HunkHeader;
    ///
    /// let header = HunkHeader::parse("@@ -10,2 +11 @@ fn main()").unwrap();
    /// assert_eq!((header.old_start, header.old_count), (10, 2));
    /// assert_eq!((header.new_start, header.new_count), (11, 1));
    /// assert_eq!(header.section.as_deref(), Some("fn main()"));
    /// ```
    pub fn parse(line: &str) -> Result<Self, DiffError> {
        let malformed = || DiffError::MalformedHunkHeader {
            line: line.to_string(),
        };
        let (rest, ((old_start, old_count), (new_start, new_count))) =
            header_ranges(line).map_err(|_| malformed())?;

        if !rest.is_empty() && !rest.starts_with(' ') {
            return Err(malformed());
        }
        let section = rest.trim_start_matches(' ');

        Ok(HunkHeader {
            old_start,
            old_count,
            new_start,
            new_count,
            section: (!section.is_empty()).then(|| section.to_string()),
        })
    }
}

/// Accumulates the body of one hunk, numbering lines as they arrive.
///
/// The header counts delimit the body, so a body line that happens to look
/// like a file header (`--- x`) is still read as a deletion.
#[derive(Debug)]
pub(crate) struct HunkBody {
    hunk: Hunk,
    header_line: String,
    old_next: u32,
    new_next: u32,
    old_left: u32,
    new_left: u32,
}

impl HunkBody {
    pub(crate) fn start(header_line: &str) -> Result<Self, DiffError> {
        let header = HunkHeader::parse(header_line)?;

        // Numbering stops at start + count on each side
        let fits = header.old_start.checked_add(header.old_count).is_some()
            && header.new_start.checked_add(header.new_count).is_some();
        if !fits {
            return Err(DiffError::LineNumberOverflow {
                header: header_line.to_string(),
            });
        }

        Ok(HunkBody {
            old_next: header.old_start,
            new_next: header.new_start,
            old_left: header.old_count,
            new_left: header.new_count,
            header_line: header_line.to_string(),
            hunk: Hunk {
                old_start: header.old_start,
                old_count: header.old_count,
                new_start: header.new_start,
                new_count: header.new_count,
                section: header.section,
                lines: Vec::new(),
            },
        })
    }

    pub(crate) fn is_complete(&self) -> bool {
        self.old_left == 0 && self.new_left == 0
    }

    /// Consume one raw body line (with its prefix).
    pub(crate) fn push(&mut self, raw: &str) -> Result<(), DiffError> {
        // Some tools strip the single space of an empty context line
        let (op, content) = match raw.chars().next() {
            None => (LineOp::Context, ""),
            Some(c) => match LineOp::from_prefix(c) {
                Some(op) => (op, &raw[1..]),
                None => {
                    return Err(DiffError::UnexpectedHunkLine {
                        line: raw.to_string(),
                    });
                }
            },
        };

        let fits = match op {
            LineOp::Context => self.old_left > 0 && self.new_left > 0,
            LineOp::Add => self.new_left > 0,
            LineOp::Delete => self.old_left > 0,
        };
        if !fits {
            return Err(DiffError::HunkCountMismatch {
                header: self.header_line.clone(),
            });
        }

        let line = match op {
            LineOp::Context => {
                let line = DiffLine::context(content, self.old_next, self.new_next);
                self.old_next += 1;
                self.new_next += 1;
                self.old_left -= 1;
                self.new_left -= 1;
                line
            }
            LineOp::Add => {
                let line = DiffLine::add(content, self.new_next);
                self.new_next += 1;
                self.new_left -= 1;
                line
            }
            LineOp::Delete => {
                let line = DiffLine::delete(content, self.old_next);
                self.old_next += 1;
                self.old_left -= 1;
                line
            }
        };
        self.hunk.lines.push(line);
        Ok(())
    }

    /// Apply a `\ No newline at end of file` marker to the latest line.
    pub(crate) fn mark_missing_newline(&mut self) {
        if let Some(last) = self.hunk.lines.last_mut() {
            last.missing_newline = true;
        }
    }

    pub(crate) fn finish(self) -> Result<Hunk, DiffError> {
        if !self.is_complete() {
            return Err(DiffError::TruncatedHunk {
                header: self.header_line,
                missing_old: self.old_left,
                missing_new: self.new_left,
            });
        }
        Ok(self.hunk)
    }
}

impl Hunk {
    /// Parse a standalone hunk: header line followed by its body.
    pub fn parse(text: &str) -> Result<Self, DiffError> {
        let text = text.strip_suffix('\n').unwrap_or(text);
        let mut lines = text.split('\n');
        let header = lines.next().unwrap_or_default();
        let mut body = HunkBody::start(header)?;

        for raw in lines {
            if raw.starts_with('\\') {
                body.mark_missing_newline();
            } else if body.is_complete() {
                if !raw.is_empty() {
                    return Err(DiffError::HunkCountMismatch {
                        header: header.to_string(),
                    });
                }
            } else {
                body.push(raw)?;
            }
        }

        body.finish()
    }

    /// Number of change lines (additions and deletions)
    pub fn change_count(&self) -> usize {
        self.lines.iter().filter(|l| l.is_change()).count()
    }

    /// Net number of lines this hunk adds to the file
    pub fn line_delta(&self) -> i64 {
        i64::from(self.new_count) - i64::from(self.old_count)
    }
}

/// Count old-side and new-side lines of a hunk body.
pub fn tally(lines: &[DiffLine]) -> (u32, u32) {
    lines.iter().fold((0, 0), |(old, new), line| match line.op {
        LineOp::Context => (old + 1, new + 1),
        LineOp::Add => (old, new + 1),
        LineOp::Delete => (old + 1, new),
    })
}

impl fmt::Display for Hunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "@@ -{},{} +{},{} @@",
            self.old_start, self.old_count, self.new_start, self.new_count
        )?;
        match &self.section {
            Some(section) => writeln!(f, " {section}")?,
            None => writeln!(f)?,
        }

        for line in &self.lines {
            writeln!(f, "{}{}", line.op.prefix(), line.content)?;
            if line.missing_newline {
                writeln!(f, "{NO_NEWLINE_MARKER}")?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use similar_asserts::assert_eq;

    #[test]
    fn header_with_counts() {
        let header = HunkHeader::parse("@@ -136,0 +137,2 @@").unwrap();
        assert_eq!(
            header,
            HunkHeader {
                old_start: 136,
                old_count: 0,
                new_start: 137,
                new_count: 2,
                section: None,
            }
        );
    }

    #[test]
    fn header_counts_default_to_one() {
        let header = HunkHeader::parse("@@ -10 +11 @@").unwrap();
        assert_eq!((header.old_count, header.new_count), (1, 1));
    }

    #[test]
    fn header_keeps_section_text() {
        let header = HunkHeader::parse("@@ -5,3 +5,4 @@ impl Foo for Bar {").unwrap();
        assert_eq!(header.section.as_deref(), Some("impl Foo for Bar {"));
    }

    #[test]
    fn header_rejects_garbage() {
        for line in [
            "@@ -a,1 +1 @@",
            "@@ -1 +1",
            "@@ 1,1 1,1 @@",
            "@@ -1,2 +3,4 @@@",
            "",
        ] {
            assert!(
                matches!(
                    HunkHeader::parse(line),
                    Err(DiffError::MalformedHunkHeader { .. })
                ),
                "accepted {line:?}"
            );
        }
    }

    #[test]
    fn parse_numbers_every_line() {
        let hunk = Hunk::parse(
            "@@ -9,3 +9,3 @@\n line 9\n-    gtk.theme.name = \"Adwaita\";\n+    # Theme managed by Stylix\n line 11",
        )
        .unwrap();

        assert_eq!(
            hunk.lines,
            vec![
                DiffLine::context("line 9", 9, 9),
                DiffLine::delete("    gtk.theme.name = \"Adwaita\";", 10),
                DiffLine::add("    # Theme managed by Stylix", 10),
                DiffLine::context("line 11", 11, 11),
            ]
        );
    }

    #[test]
    fn parse_pure_insertion() {
        let hunk = Hunk::parse("@@ -136,0 +137 @@\n+      debug = true;").unwrap();
        assert_eq!(hunk.lines, vec![DiffLine::add("      debug = true;", 137)]);
    }

    #[test]
    fn parse_no_newline_marker_flags_previous_line() {
        let hunk = Hunk::parse(
            "@@ -3 +3 @@\n-last\n\\ No newline at end of file\n+last\n",
        )
        .unwrap();

        assert_eq!(hunk.lines.len(), 2);
        assert!(hunk.lines[0].missing_newline);
        assert!(!hunk.lines[1].missing_newline);
    }

    #[test]
    fn parse_body_line_that_looks_like_header() {
        let hunk = Hunk::parse("@@ -1,2 +1 @@\n--- a/file\n-++ b\n+x").unwrap();
        assert_eq!(hunk.lines[0], DiffLine::delete("-- a/file", 1));
        assert_eq!(hunk.lines[1], DiffLine::delete("++ b", 2));
    }

    #[test]
    fn parse_short_body_is_truncated() {
        let result = Hunk::parse("@@ -1,3 +1,3 @@\n a\n b");
        assert!(matches!(
            result,
            Err(DiffError::TruncatedHunk {
                missing_old: 1,
                missing_new: 1,
                ..
            })
        ));
    }

    #[test]
    fn parse_rejects_unknown_prefix() {
        let result = Hunk::parse("@@ -1 +1 @@\n*bogus");
        assert!(matches!(result, Err(DiffError::UnexpectedHunkLine { .. })));
    }

    #[test]
    fn parse_rejects_extra_add() {
        let result = Hunk::parse("@@ -1 +1 @@\n+a\n+b");
        assert!(matches!(result, Err(DiffError::HunkCountMismatch { .. })));
    }

    #[test]
    fn empty_line_counts_as_empty_context() {
        let hunk = Hunk::parse("@@ -1,2 +1,3 @@\n\n+x\n y").unwrap();
        assert_eq!(hunk.lines[0], DiffLine::context("", 1, 1));
        assert_eq!(hunk.lines[2], DiffLine::context("y", 2, 3));
    }

    #[test]
    fn render_always_writes_counts() {
        let hunk = Hunk::parse("@@ -10 +10 @@\n-old version\n+new version").unwrap();
        assert_eq!(
            hunk.to_string(),
            "@@ -10,1 +10,1 @@\n-old version\n+new version\n"
        );
    }

    #[test]
    fn render_section_and_marker() {
        let hunk = Hunk::parse(
            "@@ -4,2 +4,2 @@ fn tail()\n keep\n-gone\n\\ No newline at end of file\n+here\n\\ No newline at end of file",
        )
        .unwrap();
        insta::assert_snapshot!(hunk.to_string(), @r"
        @@ -4,2 +4,2 @@ fn tail()
         keep
        -gone
        \ No newline at end of file
        +here
        \ No newline at end of file
        ");
    }

    #[test]
    fn line_numbers_past_u32_are_an_error() {
        let err = Hunk::parse("@@ -4294967295,2 +1,2 @@\n a\n b").unwrap_err();
        assert!(matches!(err, DiffError::LineNumberOverflow { .. }));

        let err = Hunk::parse("@@ -1,1 +4294967295,1 @@\n-a\n+b").unwrap_err();
        assert!(matches!(err, DiffError::LineNumberOverflow { .. }));
    }

    #[test]
    fn last_representable_line_parses() {
        let hunk = Hunk::parse("@@ -4294967294,1 +4294967294,1 @@\n-a\n+b").unwrap();
        assert_eq!(hunk.lines[1], DiffLine::add("b", 4294967294));
    }

    #[test]
    fn tally_matches_header() {
        let hunk = Hunk::parse("@@ -1,3 +1,4 @@\n a\n-b\n+c\n+d\n e").unwrap();
        assert_eq!(tally(&hunk.lines), (hunk.old_count, hunk.new_count));
        assert_eq!(hunk.change_count(), 3);
        assert_eq!(hunk.line_delta(), 1);
    }
}
