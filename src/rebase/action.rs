use super::RebaseParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A verb of git's interactive rebase todo list.
///
/// Serializes as the lowercase name; deserializes from full or short names
/// in any case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum ActionType {
    Pick,
    Reword,
    Edit,
    Squash,
    Fixup,
    Drop,
    Exec,
}

impl ActionType {
    pub const ALL: [ActionType; 7] = [
        ActionType::Pick,
        ActionType::Reword,
        ActionType::Edit,
        ActionType::Squash,
        ActionType::Fixup,
        ActionType::Drop,
        ActionType::Exec,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ActionType::Pick => "pick",
            ActionType::Reword => "reword",
            ActionType::Edit => "edit",
            ActionType::Squash => "squash",
            ActionType::Fixup => "fixup",
            ActionType::Drop => "drop",
            ActionType::Exec => "exec",
        }
    }

    /// Single-letter abbreviation git also accepts
    pub fn short_form(self) -> &'static str {
        match self {
            ActionType::Pick => "p",
            ActionType::Reword => "r",
            ActionType::Edit => "e",
            ActionType::Squash => "s",
            ActionType::Fixup => "f",
            ActionType::Drop => "d",
            ActionType::Exec => "x",
        }
    }

    /// Look up a verb by full or short name, ignoring case.
    pub fn parse(verb: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|a| {
            verb.eq_ignore_ascii_case(a.name()) || verb.eq_ignore_ascii_case(a.short_form())
        })
    }

    /// Squash and fixup fold a commit into the one before it.
    pub fn combines_with_previous(self) -> bool {
        matches!(self, ActionType::Squash | ActionType::Fixup)
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ActionType {
    type Err = RebaseParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ActionType::parse(s).ok_or_else(|| RebaseParseError::UnknownAction {
            action: s.to_string(),
        })
    }
}

impl TryFrom<String> for ActionType {
    type Error = RebaseParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}
