//! Non-interactive `--autosquash`: move `fixup!`/`squash!` commits after
//! the commits they name.

use super::{ActionType, CommitInfo, RebaseAction, RebaseSpec};
use serde::Serialize;

const FIXUP_MARKER: &str = "fixup! ";
const SQUASH_MARKER: &str = "squash! ";

/// Shortest hash prefix accepted in `fixup! <hash>` subjects
const MIN_HASH_PREFIX: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AutosquashStep {
    pub action: ActionType,
    pub commit: String,
    pub subject: String,
    /// Commit this step folds into, when it is a resolved fixup or squash
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AutosquashPlan {
    pub steps: Vec<AutosquashStep>,
    /// Fixup and squash commits that found a target
    pub fixup_count: usize,
}

impl AutosquashPlan {
    /// Nothing would move or fold.
    pub fn is_noop(&self) -> bool {
        self.fixup_count == 0
    }

    pub fn to_spec(&self) -> RebaseSpec {
        RebaseSpec::new(
            self.steps
                .iter()
                .map(|step| RebaseAction::new(step.action, &step.commit))
                .collect(),
        )
    }
}

/// The action a subject's leading marker asks for, and the text after it.
fn strip_marker(subject: &str) -> Option<(ActionType, &str)> {
    if let Some(rest) = subject.strip_prefix(FIXUP_MARKER) {
        Some((ActionType::Fixup, rest))
    } else {
        subject
            .strip_prefix(SQUASH_MARKER)
            .map(|rest| (ActionType::Squash, rest))
    }
}

fn find_target<'a>(text: &str, candidates: &[&'a CommitInfo]) -> Option<&'a CommitInfo> {
    let mut text = text.trim();
    loop {
        if text.is_empty() {
            return None;
        }
        let found = candidates
            .iter()
            .copied()
            .find(|c| c.subject == text)
            .or_else(|| candidates.iter().copied().find(|c| c.subject.starts_with(text)))
            .or_else(|| {
                if text.len() < MIN_HASH_PREFIX {
                    return None;
                }
                candidates.iter().copied().find(|c| c.matches(text))
            });
        if let Some(commit) = found {
            return Some(commit);
        }

        // fixup! fixup! A targets A
        let (_, inner) = strip_marker(text)?;
        text = inner.trim();
    }
}

/// Plan an autosquash over `commits`, oldest first.
///
/// Each resolved fixup or squash lands right after its target, keeping the
/// relative order of fixups that share a target. Unresolved ones are kept as
/// plain picks at the end so they never fold into an unrelated commit.
///
/// ```
/// use git_lines::rebase::{ActionType, CommitInfo, plan_autosquash};
///
/// let commit = |hash: &str, subject: &str| CommitInfo {
///     hash: hash.into(),
///     short_hash: hash[..7].into(),
///     subject: subject.into(),
///     author: "A U Thor <author@example.com>".into(),
///     date: "2009-02-13T23:31:30+00:00".into(),
/// };
/// let plan = plan_autosquash(&[
///     commit("aaaaaaaa", "A"),
///     commit("bbbbbbbb", "B"),
///     commit("cccccccc", "fixup! A"),
/// ]);
///
/// let order: Vec<_> = plan.steps.iter().map(|s| s.subject.as_str()).collect();
/// assert_eq!(order, ["A", "fixup! A", "B"]);
/// assert_eq!(plan.steps[1].action, ActionType::Fixup);
/// ```
pub fn plan_autosquash(commits: &[CommitInfo]) -> AutosquashPlan {
    let candidates: Vec<&CommitInfo> = commits
        .iter()
        .filter(|c| strip_marker(&c.subject).is_none())
        .collect();

    // (commit, action, target hash) for every marked commit that resolved
    let mut folded: Vec<(&CommitInfo, ActionType, &str)> = Vec::new();
    let mut unresolved: Vec<&CommitInfo> = Vec::new();

    for commit in commits {
        let Some((action, text)) = strip_marker(&commit.subject) else {
            continue;
        };
        match find_target(text, &candidates) {
            Some(target) => folded.push((commit, action, &target.hash)),
            None => {
                tracing::debug!(commit = %commit.short_hash, subject = %commit.subject, "no autosquash target");
                unresolved.push(commit);
            }
        }
    }

    let step = |commit: &CommitInfo, action, target: Option<&str>| AutosquashStep {
        action,
        commit: commit.hash.clone(),
        subject: commit.subject.clone(),
        target: target.map(str::to_string),
    };

    let mut steps = Vec::with_capacity(commits.len());
    for target in candidates.iter().copied() {
        steps.push(step(target, ActionType::Pick, None));
        for (commit, action, _) in folded.iter().filter(|(_, _, t)| *t == target.hash) {
            steps.push(step(*commit, *action, Some(target.hash.as_str())));
        }
    }
    for commit in unresolved {
        steps.push(step(commit, ActionType::Pick, None));
    }

    tracing::debug!(commits = commits.len(), fixups = folded.len(), "planned autosquash");
    AutosquashPlan {
        steps,
        fixup_count: folded.len(),
    }
}
