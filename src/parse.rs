//! Parsing for `path:ranges` selection syntax.
//!
//! This module turns user input like `src/main.rs:10-15,20` into merged,
//! normalized line ranges that the patch engine matches diff lines against.
//!
//! # Syntax
//!
//! The expected format is `PATH:RANGES` where:
//! - `PATH` is a file path (cannot be empty); it may itself contain colons,
//!   since the input is split on the **last** colon
//! - `RANGES` is a comma-separated list of `N` or `N-M` (1-based, inclusive)
//!
//! Additions are matched by their new-file line number, deletions by their
//! old-file line number.
//!
//! # Examples
//!
//! ```
//! use git_lines::parse::{FileSelection, LineRange};
//!
//! let selection = FileSelection::parse("flake.nix:137").unwrap();
//! assert_eq!(selection.path, "flake.nix");
//! assert_eq!(selection.ranges, vec![LineRange::new(137, 137).unwrap()]);
//!
//! // Overlapping and adjacent ranges are merged
//! let selection = FileSelection::parse("gtk.nix:12,10-11,20").unwrap();
//! assert_eq!(
//!     selection.ranges,
//!     vec![LineRange::new(10, 12).unwrap(), LineRange::new(20, 20).unwrap()]
//! );
//! ```

use error_set::error_set;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

error_set! {
    /// Errors from parsing path:ranges syntax
    ParseError := {
        /// Input string does not contain a colon separator
        #[display("Invalid format '{input}': expected 'path:ranges'")]
        InvalidFormat { input: String },
        /// Path portion before the colon is empty or whitespace
        #[display("Invalid format '{input}': path cannot be empty")]
        EmptyPath { input: String },
        /// No ranges provided after the colon
        #[display("No line ranges provided in '{input}'")]
        EmptyRanges { input: String },
        /// Line number could not be parsed as a positive integer
        #[display("Invalid line number '{value}'")]
        InvalidLineNumber { value: String },
        /// Range has start greater than end
        #[display("Invalid range {start}-{end}: start must be <= end")]
        InvalidRange { start: u32, end: u32 },
    }
}

/// An inclusive range of line numbers, `1 <= start <= end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LineRange {
    start: u32,
    end: u32,
}

impl LineRange {
    /// Build a range, rejecting zero and inverted bounds.
    pub fn new(start: u32, end: u32) -> Result<Self, ParseError> {
        if start == 0 {
            return Err(ParseError::InvalidLineNumber {
                value: start.to_string(),
            });
        }
        if start > end {
            return Err(ParseError::InvalidRange { start, end });
        }
        Ok(LineRange { start, end })
    }

    pub fn start(&self) -> u32 {
        self.start
    }

    pub fn end(&self) -> u32 {
        self.end
    }

    pub fn contains(&self, line: u32) -> bool {
        self.start <= line && line <= self.end
    }
}

impl fmt::Display for LineRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start == self.end {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}-{}", self.start, self.end)
        }
    }
}

impl FromStr for LineRange {
    type Err = ParseError;

    /// Parse `N` or `N-M`
    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.split_once('-') {
            Some((start, end)) => {
                LineRange::new(parse_line_number(start)?, parse_line_number(end)?)
            }
            None => {
                let line = parse_line_number(input)?;
                LineRange::new(line, line)
            }
        }
    }
}

/// Parse a positive line number
fn parse_line_number(input: &str) -> Result<u32, ParseError> {
    match input.trim().parse::<u32>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(ParseError::InvalidLineNumber {
            value: input.to_string(),
        }),
    }
}

/// Sort ranges and coalesce any that overlap or touch.
///
/// Returns a new list covering exactly the same line numbers, sorted by
/// start, with no two ranges overlapping or adjacent.
pub fn merge_ranges(ranges: &[LineRange]) -> Vec<LineRange> {
    let mut sorted = ranges.to_vec();
    sorted.sort();

    let mut merged: Vec<LineRange> = Vec::with_capacity(sorted.len());
    for range in sorted {
        match merged.last_mut() {
            Some(previous) if range.start <= previous.end.saturating_add(1) => {
                previous.end = previous.end.max(range.end);
            }
            _ => merged.push(range),
        }
    }
    merged
}

/// The lines selected in one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSelection {
    /// The file path
    pub path: String,
    /// Normalized ranges: sorted, not overlapping, not adjacent
    pub ranges: Vec<LineRange>,
}

impl FileSelection {
    /// Parse a `path:ranges` token.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError`] if:
    /// - Input doesn't contain `:` separator
    /// - Path is empty or whitespace
    /// - No ranges provided
    /// - A line number is zero or not a number, or a range is inverted
    pub fn parse(input: &str) -> Result<Self, ParseError> {
        let Some((path, ranges)) = input.rsplit_once(':') else {
            return Err(ParseError::InvalidFormat {
                input: input.to_string(),
            });
        };

        let path = path.trim();
        if path.is_empty() {
            return Err(ParseError::EmptyPath {
                input: input.to_string(),
            });
        }

        let ranges = ranges
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(LineRange::from_str)
            .collect::<Result<Vec<_>, _>>()?;

        if ranges.is_empty() {
            return Err(ParseError::EmptyRanges {
                input: input.to_string(),
            });
        }

        Ok(FileSelection {
            path: path.to_string(),
            ranges: merge_ranges(&ranges),
        })
    }

    pub fn contains(&self, line: u32) -> bool {
        self.ranges.iter().any(|r| r.contains(line))
    }
}

impl fmt::Display for FileSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:", self.path)?;
        for (i, range) in self.ranges.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{range}")?;
        }
        Ok(())
    }
}

/// Selections for any number of files, keyed by path.
///
/// A path given in several tokens has its ranges merged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionMap {
    files: BTreeMap<String, FileSelection>,
}

impl SelectionMap {
    /// Parse every token and merge them by path.
    ///
    /// ```
    /// use git_lines::parse::SelectionMap;
    ///
    /// let map = SelectionMap::from_tokens(["a.txt:1-2", "b.txt:5", "a.txt:3"]).unwrap();
    /// assert_eq!(map.get("a.txt").unwrap().to_string(), "a.txt:1-3");
    /// assert!(map.get("b.txt").unwrap().contains(5));
    /// ```
    pub fn from_tokens<I, S>(tokens: I) -> Result<Self, ParseError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut map = SelectionMap::default();
        for token in tokens {
            map.insert(FileSelection::parse(token.as_ref())?);
        }
        Ok(map)
    }

    pub fn insert(&mut self, selection: FileSelection) {
        match self.files.get_mut(&selection.path) {
            Some(existing) => {
                existing.ranges.extend(selection.ranges);
                existing.ranges = merge_ranges(&existing.ranges);
            }
            None => {
                self.files.insert(selection.path.clone(), selection);
            }
        }
    }

    pub fn get(&self, path: &str) -> Option<&FileSelection> {
        self.files.get(path)
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}
