//! Accept/dismiss decisions for recognized prompts.

use std::collections::HashSet;

use autoprompt_core::pattern::{MatchResult, PatternKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Send the match's response.
    Accept,
    /// Leave the prompt for the operator.
    Dismiss,
}

/// Decides whether a recognized match is answered automatically.
pub trait MatchPolicy {
    fn decide(&self, result: &MatchResult) -> Decision;
}

/// Accepts prompts whose pattern id is on the list.
///
/// Completion matches are informational and never answered.
#[derive(Debug, Clone, Default)]
pub struct AllowListPolicy {
    accept: HashSet<String>,
    accept_all: bool,
}

impl AllowListPolicy {
    pub fn new<I, S>(accept: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            accept: accept.into_iter().map(Into::into).collect(),
            accept_all: false,
        }
    }

    pub fn accept_all() -> Self {
        Self {
            accept: HashSet::new(),
            accept_all: true,
        }
    }
}

impl MatchPolicy for AllowListPolicy {
    fn decide(&self, result: &MatchResult) -> Decision {
        if result.kind == Some(PatternKind::Completion) || result.response.is_none() {
            return Decision::Dismiss;
        }
        if self.accept_all || self.accept.contains(&result.pattern_id) {
            Decision::Accept
        } else {
            Decision::Dismiss
        }
    }
}
