use super::{ActionType, RebaseError, RebaseParseError, RebaseValidationError, is_commit_hash};
use serde::{Deserialize, Serialize};

/// Characters of invalid JSON echoed back in the parse error
const JSON_SNIPPET_LEN: usize = 100;

/// One step of a declarative rebase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RebaseAction {
    pub action: ActionType,
    /// Required for everything except exec
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit: Option<String>,
    /// New message for reword or squash
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Shell command for exec
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
}

impl RebaseAction {
    pub fn new(action: ActionType, commit: impl Into<String>) -> Self {
        RebaseAction {
            action,
            commit: Some(commit.into()),
            message: None,
            command: None,
        }
    }

    pub fn pick(commit: impl Into<String>) -> Self {
        RebaseAction::new(ActionType::Pick, commit)
    }

    pub fn exec(command: impl Into<String>) -> Self {
        RebaseAction {
            action: ActionType::Exec,
            commit: None,
            message: None,
            command: Some(command.into()),
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// The commit, treating an empty string as absent
    pub fn commit(&self) -> Option<&str> {
        self.commit.as_deref().filter(|c| !c.is_empty())
    }

    /// The message, treating a blank one as absent
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref().filter(|m| !m.trim().is_empty())
    }

    /// Check the shape of one action; `index` is 1-based for messages.
    fn validate(&self, index: usize) -> Result<(), RebaseValidationError> {
        // Checked first: a newline would smuggle extra lines into the todo file
        if let Some(command) = &self.command {
            if command.contains(['\n', '\r']) {
                return Err(RebaseValidationError::CommandNewline { index });
            }
        }

        if self.action == ActionType::Exec {
            return match self.command.as_deref().map(str::trim) {
                Some(command) if !command.is_empty() => Ok(()),
                _ => Err(RebaseValidationError::MissingCommand { index }),
            };
        }

        if self.commit().is_none() {
            return Err(RebaseValidationError::MissingCommit {
                index,
                action: self.action,
            });
        }
        if self.command.is_some() {
            return Err(RebaseValidationError::UnexpectedCommand { index });
        }
        let takes_message = matches!(self.action, ActionType::Reword | ActionType::Squash);
        if self.message().is_some() && !takes_message {
            return Err(RebaseValidationError::UnexpectedMessage {
                index,
                action: self.action,
            });
        }

        Ok(())
    }
}

/// An ordered list of rebase actions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RebaseSpec {
    pub actions: Vec<RebaseAction>,
}

impl RebaseSpec {
    pub fn new(actions: Vec<RebaseAction>) -> Self {
        RebaseSpec { actions }
    }

    /// Parse the command-line shorthand and validate the result.
    ///
    /// Arguments are joined with commas, then split on commas outside quotes.
    /// Each token is `COMMIT`, `ACTION:COMMIT`, `ACTION:COMMIT:MESSAGE` or
    /// `exec:COMMAND`.
    ///
    /// ```
    /// use git_lines::rebase::{ActionType, RebaseSpec};
    ///
    /// let spec = RebaseSpec::parse_cli(&["abc1234,f:def5678", "r:0123abc:\"Fix, then test\""]).unwrap();
    /// assert_eq!(spec.actions[1].action, ActionType::Fixup);
    /// assert_eq!(spec.actions[2].message.as_deref(), Some("Fix, then test"));
    /// ```
    pub fn parse_cli<S: AsRef<str>>(args: &[S]) -> Result<Self, RebaseError> {
        let combined = args.iter().map(AsRef::as_ref).collect::<Vec<_>>().join(",");

        let actions = split_preserving_quotes(&combined)
            .iter()
            .map(|token| token.trim())
            .filter(|token| !token.is_empty())
            .map(parse_action_token)
            .collect::<Result<Vec<_>, _>>()?;

        if actions.is_empty() {
            return Err(RebaseParseError::NoActions.into());
        }

        let spec = RebaseSpec { actions };
        spec.validate()?;
        Ok(spec)
    }

    /// Parse `{"actions": [...]}` and validate the result.
    pub fn parse_json(text: &str) -> Result<Self, RebaseError> {
        let spec: RebaseSpec = serde_json::from_str(text).map_err(|e| {
            let mut snippet: String = text.chars().take(JSON_SNIPPET_LEN).collect();
            if text.chars().count() > JSON_SNIPPET_LEN {
                snippet.push_str("...");
            }
            RebaseParseError::InvalidJson {
                message: e.to_string(),
                snippet,
            }
        })?;

        spec.validate()?;
        Ok(spec)
    }

    pub fn to_json(&self) -> String {
        // A spec is plain strings and enums, which always serialize
        serde_json::to_string_pretty(self).unwrap_or_default()
    }

    /// Check every action's shape and that the first one has something to fold into.
    pub fn validate(&self) -> Result<(), RebaseValidationError> {
        let Some(first) = self.actions.first() else {
            return Err(RebaseValidationError::EmptySpec);
        };

        for (i, action) in self.actions.iter().enumerate() {
            action.validate(i + 1)?;
        }

        if first.action.combines_with_previous() {
            return Err(RebaseValidationError::StartsWithCombine {
                action: first.action,
            });
        }

        Ok(())
    }
}

/// Parse one shorthand token.
fn parse_action_token(token: &str) -> Result<RebaseAction, RebaseParseError> {
    if !token.contains(':') || is_commit_hash(token) {
        return Ok(RebaseAction::pick(token));
    }

    let (verb, rest) = token.split_once(':').unwrap_or((token, ""));
    let Some(action) = ActionType::parse(verb.trim()) else {
        return Err(RebaseParseError::UnknownAction {
            action: verb.trim().to_lowercase(),
        });
    };

    if action == ActionType::Exec {
        return Ok(RebaseAction::exec(rest.trim()));
    }

    Ok(match rest.split_once(':') {
        Some((commit, message)) => {
            RebaseAction::new(action, commit.trim()).with_message(unquote(message.trim()))
        }
        None => RebaseAction::new(action, rest.trim()),
    })
}

/// Split on commas that are not inside single or double quotes.
fn split_preserving_quotes(s: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;

    for c in s.chars() {
        match (quote, c) {
            (None, '"' | '\'') => {
                quote = Some(c);
                current.push(c);
            }
            (Some(q), _) if c == q => {
                quote = None;
                current.push(c);
            }
            (None, ',') => {
                if !current.is_empty() {
                    parts.push(std::mem::take(&mut current));
                }
            }
            _ => current.push(c),
        }
    }
    if !current.is_empty() {
        parts.push(current);
    }

    parts
}

/// Remove one pair of matching surrounding quotes.
fn unquote(s: &str) -> &str {
    for q in ['"', '\''] {
        if let Some(inner) = s.strip_prefix(q).and_then(|rest| rest.strip_suffix(q)) {
            return inner;
        }
    }
    s
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use similar_asserts::assert_eq;

    #[test]
    fn bare_commits_are_picks() {
        let spec = RebaseSpec::parse_cli(&["abc1234,def5678"]).unwrap();
        assert_eq!(
            spec.actions,
            vec![RebaseAction::pick("abc1234"), RebaseAction::pick("def5678")]
        );
    }

    #[test]
    fn explicit_and_short_actions() {
        let spec = RebaseSpec::parse_cli(&["pick:abc1234", "s:def5678", "DROP:0123abc"]).unwrap();
        let actions: Vec<_> = spec.actions.iter().map(|a| a.action).collect();
        assert_eq!(actions, vec![ActionType::Pick, ActionType::Squash, ActionType::Drop]);
        assert_eq!(spec.actions[2].commit(), Some("0123abc"));
    }

    #[test]
    fn message_keeps_colons_and_quoted_commas() {
        let spec = RebaseSpec::parse_cli(&[
            "abc1234",
            "reword:def5678:'feat: parse ranges, merge them'",
        ])
        .unwrap();
        assert_eq!(
            spec.actions[1].message(),
            Some("feat: parse ranges, merge them")
        );
    }

    #[test]
    fn exec_takes_rest_of_token() {
        let spec = RebaseSpec::parse_cli(&["abc1234", "exec:cargo test --all"]).unwrap();
        assert_eq!(spec.actions[1], RebaseAction::exec("cargo test --all"));
    }

    #[test]
    fn hash_like_token_with_colon_is_unknown_action() {
        let result = RebaseSpec::parse_cli(&["abc1234", "bogus:abc1234"]);
        assert!(matches!(
            result,
            Err(RebaseError::UnknownAction { action }) if action == "bogus"
        ));
    }

    #[test]
    fn no_args_is_an_error() {
        let empty: [&str; 0] = [];
        assert!(matches!(
            RebaseSpec::parse_cli(&empty),
            Err(RebaseError::NoActions)
        ));
        assert!(matches!(
            RebaseSpec::parse_cli(&[" , ,"]),
            Err(RebaseError::NoActions)
        ));
    }

    #[test]
    fn cannot_start_with_squash_or_fixup() {
        for verb in ["squash", "fixup"] {
            let args = [format!("{verb}:abc1234"), "def5678".to_string()];
            let err = RebaseSpec::parse_cli(&args).unwrap_err();
            assert!(
                err.to_string().contains(&format!("cannot start with {verb}")),
                "{err}"
            );
        }
    }

    #[test]
    fn exec_with_newline_always_fails() {
        let spec = RebaseSpec::new(vec![
            RebaseAction::pick("abc1234"),
            RebaseAction::exec("make test\npick deadbeef"),
        ]);
        assert!(matches!(
            spec.validate(),
            Err(RebaseValidationError::CommandNewline { index: 2 })
        ));

        // Even when attached to an action that would otherwise be rejected for something else
        let mut sneaky = RebaseAction::new(ActionType::Pick, "");
        sneaky.command = Some("x\ry".into());
        assert!(matches!(
            RebaseSpec::new(vec![sneaky]).validate(),
            Err(RebaseValidationError::CommandNewline { index: 1 })
        ));
    }

    #[test]
    fn shape_errors() {
        let missing_commit = RebaseSpec::new(vec![RebaseAction::new(ActionType::Edit, "")]);
        assert!(matches!(
            missing_commit.validate(),
            Err(RebaseValidationError::MissingCommit {
                index: 1,
                action: ActionType::Edit
            })
        ));

        let missing_command = RebaseSpec::new(vec![RebaseAction::exec("   ")]);
        assert!(matches!(
            missing_command.validate(),
            Err(RebaseValidationError::MissingCommand { index: 1 })
        ));

        let stray_message = RebaseSpec::new(vec![RebaseAction::pick("abc1234").with_message("hi")]);
        assert!(matches!(
            stray_message.validate(),
            Err(RebaseValidationError::UnexpectedMessage { .. })
        ));

        assert!(matches!(
            RebaseSpec::default().validate(),
            Err(RebaseValidationError::EmptySpec)
        ));
    }

    #[test]
    fn blank_message_counts_as_absent() {
        let reword = RebaseAction::new(ActionType::Reword, "abc1234").with_message(" \n\t ");
        assert_eq!(reword.message(), None);

        let pick = RebaseSpec::new(vec![RebaseAction::pick("abc1234").with_message("  ")]);
        assert!(pick.validate().is_ok());
    }

    #[test]
    fn json_spec() {
        let spec = RebaseSpec::parse_json(
            r#"{"actions":[
                {"action":"pick","commit":"abc1234"},
                {"action":"f","commit":"def5678"},
                {"action":"reword","commit":"0123abc","message":"Better subject"},
                {"action":"exec","command":"make check"}
            ]}"#,
        )
        .unwrap();

        assert_eq!(spec.actions.len(), 4);
        assert_eq!(spec.actions[1].action, ActionType::Fixup);
        assert_eq!(spec.actions[3].command.as_deref(), Some("make check"));
    }

    #[test]
    fn json_round_trips() {
        let spec = RebaseSpec::new(vec![
            RebaseAction::pick("abc1234"),
            RebaseAction::new(ActionType::Squash, "def5678").with_message("Combined"),
            RebaseAction::exec("make"),
        ]);
        assert_eq!(RebaseSpec::parse_json(&spec.to_json()).unwrap(), spec);
    }

    #[test]
    fn json_serializes_without_empty_fields() {
        let spec = RebaseSpec::new(vec![RebaseAction::pick("abc1234"), RebaseAction::exec("make")]);
        insta::assert_json_snapshot!(spec, @r#"
        {
          "actions": [
            {
              "action": "pick",
              "commit": "abc1234"
            },
            {
              "action": "exec",
              "command": "make"
            }
          ]
        }
        "#);
    }

    #[test]
    fn invalid_json_includes_snippet() {
        let input = format!("{{\"actions\": [{}", "x".repeat(200));
        let err = RebaseSpec::parse_json(&input).unwrap_err();
        assert!(
            matches!(
                &err,
                RebaseError::InvalidJson { snippet, .. }
                    if snippet.len() == JSON_SNIPPET_LEN + 3 && snippet.ends_with("...")
            ),
            "{err}"
        );
    }

    #[test]
    fn json_spec_is_validated() {
        let result =
            RebaseSpec::parse_json(r#"{"actions":[{"action":"fixup","commit":"abc1234"}]}"#);
        assert!(matches!(
            result,
            Err(RebaseError::StartsWithCombine {
                action: ActionType::Fixup
            })
        ));
    }

    #[test]
    fn split_respects_both_quote_styles() {
        assert_eq!(
            split_preserving_quotes(r#"a,"b,c",'d,"e',f"#),
            vec!["a", "\"b,c\"", "'d,\"e'", "f"]
        );
    }
}
