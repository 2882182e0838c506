//! Sequence patterns: ordered line fragments recognized on the rendered screen.
//!
//! A pattern describes a multi-line prompt as an ordered list of fragments.
//! The first fragment is anchored at its lowest line from which the rest can
//! still complete; each later fragment takes the first line at or after the
//! previous fragment's line. See [`matcher`] for the full algorithm.
//!
//! # Pattern files
//!
//! Patterns are usually authored as JSON and loaded through [`PatternDef`]:
//!
//! ```json
//! {
//!   "id": "edit-file",
//!   "title": "Edit file",
//!   "lines": ["Edit file", "Do you want to make this edit to {{ fileName }}?", "❯ 1. Yes"],
//!   "trigger_text": "Do you want to make this edit",
//!   "kind": "prompt",
//!   "response": "1"
//! }
//! ```
//!
//! Computed responses can only be attached in code via [`PatternSpec::with_response`].

pub mod matcher;
pub mod template;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::response::{Response, ResponsePayload};

pub use matcher::{MatchResult, PatternMatcher};
pub use template::LineTemplate;

/// Classification tag partitioning patterns into independently deduplicated groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternKind {
    /// The child is asking the operator to choose.
    Prompt,
    /// The child finished a unit of work.
    Completion,
}

impl fmt::Display for PatternKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatternKind::Prompt => write!(f, "prompt"),
            PatternKind::Completion => write!(f, "completion"),
        }
    }
}

/// A pattern to register with the matcher.
#[derive(Debug, Clone)]
pub struct PatternSpec {
    pub id: String,
    pub title: String,
    /// Ordered line fragments. Must not be empty.
    pub lines: Vec<String>,
    /// Cheap substring that arms the settle timer when seen in raw output.
    pub trigger_text: Option<String>,
    pub kind: Option<PatternKind>,
    pub case_sensitive: bool,
    /// `None` makes the pattern observe-only.
    pub response: Option<Response>,
}

impl PatternSpec {
    pub fn new<I, S>(id: impl Into<String>, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let id = id.into();
        Self {
            title: id.clone(),
            id,
            lines: lines.into_iter().map(Into::into).collect(),
            trigger_text: None,
            kind: None,
            case_sensitive: false,
            response: None,
        }
    }

    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    #[must_use]
    pub fn with_trigger(mut self, trigger_text: impl Into<String>) -> Self {
        self.trigger_text = Some(trigger_text.into());
        self
    }

    #[must_use]
    pub fn with_kind(mut self, kind: PatternKind) -> Self {
        self.kind = Some(kind);
        self
    }

    #[must_use]
    pub fn case_sensitive(mut self, yes: bool) -> Self {
        self.case_sensitive = yes;
        self
    }

    #[must_use]
    pub fn with_response(mut self, response: Response) -> Self {
        self.response = Some(response);
        self
    }
}

/// Serializable pattern definition, as found in pattern files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternDef {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    pub lines: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<PatternKind>,
    #[serde(default)]
    pub case_sensitive: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<ResponsePayload>,
}

impl From<PatternDef> for PatternSpec {
    fn from(def: PatternDef) -> Self {
        PatternSpec {
            title: def.title.unwrap_or_else(|| def.id.clone()),
            id: def.id,
            lines: def.lines,
            trigger_text: def.trigger_text,
            kind: def.kind,
            case_sensitive: def.case_sensitive,
            response: def.response.map(Response::from),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::ResponseStep;

    #[test]
    fn test_pattern_def_from_json() {
        let json = r#"{
            "id": "edit-file",
            "lines": ["Edit file", "Do you want to make this edit to {{ fileName }}?"],
            "trigger_text": "Do you want to make this edit",
            "kind": "prompt",
            "response": ["1", 50, "\r"]
        }"#;
        let def: PatternDef = serde_json::from_str(json).unwrap();
        let spec = PatternSpec::from(def);

        assert_eq!(spec.id, "edit-file");
        assert_eq!(spec.title, "edit-file");
        assert_eq!(spec.kind, Some(PatternKind::Prompt));
        assert!(!spec.case_sensitive);
        match spec.response {
            Some(Response::Sequence(steps)) => {
                assert_eq!(steps[1], ResponseStep::Pause(50));
            }
            other => panic!("expected sequence response, got {other:?}"),
        }
    }

    #[test]
    fn test_pattern_def_minimal_is_observe_only() {
        let def: PatternDef =
            serde_json::from_str(r#"{"id": "done", "lines": ["Task complete"]}"#).unwrap();
        let spec = PatternSpec::from(def);
        assert!(spec.response.is_none());
        assert!(spec.kind.is_none());
        assert!(spec.trigger_text.is_none());
    }

    #[test]
    fn test_builder_sets_fields() {
        let spec = PatternSpec::new("p", ["a", "b"])
            .with_title("Prompt")
            .with_trigger("a")
            .with_kind(PatternKind::Completion)
            .case_sensitive(true)
            .with_response(Response::Literal("y".into()));
        assert_eq!(spec.title, "Prompt");
        assert_eq!(spec.lines, vec!["a", "b"]);
        assert_eq!(spec.trigger_text.as_deref(), Some("a"));
        assert!(spec.case_sensitive);
        assert_eq!(PatternKind::Completion.to_string(), "completion");
    }
}
