//! # foreman-classifier
//!
//! Assigns a risk category to the textual output of a completed task.
//! A fixed-priority rule list over lowercased text: risk signals are
//! checked before safety signals, so a response mentioning both
//! "refactor" and "npm test" still requires approval. First match wins.
//!
//! Deliberately a keyword/regex rule list, not an NLP classifier.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

use foreman_core::{ApprovalActionType, Task};

/// The classifier's verdict for one engine response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Classification {
    /// Action family tag, e.g. "planning", "test_runner", "edit".
    pub kind: String,
    pub requires_approval: bool,
    pub approval_type: Option<ApprovalActionType>,
    pub description: String,
}

// Rule 1: planning/architecture keywords. Word-bounded so that
// "structure" does not fire inside "restructure" (a large-edit signal).
static PLANNING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(plan|design|architect|structure|approach|strategy|implementation plan)\b")
        .unwrap()
});

// Rule 2: git-push phrases.
const GIT_PUSH_PHRASES: &[&str] = &["git push", "push to remote", "push to origin"];

// Rule 3: large-edit indicators.
static LARGE_EDIT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(multiple files|refactor|rewrite|major changes|restructure)\b").unwrap()
});

// Rule 4: known safe command families, auto-approved.
static SAFE_FAMILIES: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    vec![
        (
            "test_runner",
            Regex::new(r"(?i)\b(npm|yarn|pnpm|bun)( run)? test\b|\bcargo (test|nextest)\b|\bpytest\b|\bgo test\b|\bjest\b|\bvitest\b|\brun(ning)? (the )?tests?\b")
                .unwrap(),
        ),
        (
            "formatter",
            Regex::new(r"(?i)\bcargo (fmt|clippy)\b|\brustfmt\b|\bprettier\b|\beslint\b|\bruff\b|\bblack\b|\bgofmt\b")
                .unwrap(),
        ),
        (
            "local_git",
            // add/commit/branch and friends, but never push (rule 2 owns that)
            Regex::new(r"(?i)\bgit (add|commit|status|diff|log|branch|checkout|switch|stash)\b")
                .unwrap(),
        ),
        (
            "package_install",
            Regex::new(r"(?i)\b(npm|yarn|pnpm|bun) (install|add)\b|\bcargo add\b|\bpip install\b|\bbrew install\b")
                .unwrap(),
        ),
    ]
});

/// Classify an engine response for a task. Pure: same inputs, same verdict.
pub fn classify(response: &str, task: &Task) -> Classification {
    let lower = response.to_lowercase();

    if let Some(m) = PLANNING.find(response) {
        return Classification {
            kind: "planning".into(),
            requires_approval: true,
            approval_type: Some(ApprovalActionType::Planning),
            description: format!(
                "Planning/architecture decision (\"{}\") for task '{}'",
                m.as_str(),
                task.title
            ),
        };
    }

    if let Some(phrase) = GIT_PUSH_PHRASES.iter().find(|p| lower.contains(**p)) {
        return Classification {
            kind: "git_push".into(),
            requires_approval: true,
            approval_type: Some(ApprovalActionType::GitPush),
            description: format!("Push to remote (\"{}\") for task '{}'", phrase, task.title),
        };
    }

    if let Some(m) = LARGE_EDIT.find(response) {
        return Classification {
            kind: "large_edit".into(),
            requires_approval: true,
            approval_type: Some(ApprovalActionType::LargeEdit),
            description: format!(
                "Large edit (\"{}\") for task '{}'",
                m.as_str(),
                task.title
            ),
        };
    }

    for (family, pattern) in SAFE_FAMILIES.iter() {
        if pattern.is_match(response) {
            return Classification {
                kind: (*family).into(),
                requires_approval: false,
                approval_type: None,
                description: format!("Safe {} action for task '{}'", family, task.title),
            };
        }
    }

    Classification {
        kind: "edit".into(),
        requires_approval: false,
        approval_type: None,
        description: format!("Routine edit for task '{}'", task.title),
    }
}
