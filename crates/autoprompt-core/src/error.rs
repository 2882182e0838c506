//! Error types for pattern registration and matching.
//!
//! Every error carries a [`suggestion`](PatternError::suggestion) so that the
//! operator (or whoever authored the pattern file) knows how to fix it.

use thiserror::Error;

/// A pattern was rejected at registration time.
///
/// Rejection never disturbs patterns that are already registered.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatternError {
    #[error("pattern '{id}' has no line fragments")]
    EmptyFragments { id: String },

    #[error("pattern id must not be empty")]
    EmptyId,

    #[error("pattern '{id}' is already registered")]
    DuplicateId { id: String },

    #[error("pattern '{id}', fragment {index}: unbalanced placeholder braces in {fragment:?}")]
    UnbalancedPlaceholder {
        id: String,
        index: usize,
        fragment: String,
    },

    #[error("pattern '{id}', fragment {index}: invalid placeholder name {name:?}")]
    InvalidPlaceholderName {
        id: String,
        index: usize,
        name: String,
    },

    #[error("pattern '{id}', fragment {index}: {message}")]
    Compile {
        id: String,
        index: usize,
        message: String,
    },
}

impl PatternError {
    /// Actionable hint for the pattern author.
    pub fn suggestion(&self) -> &'static str {
        match self {
            PatternError::EmptyFragments { .. } => {
                "Add at least one entry to the pattern's \"lines\" list"
            }
            PatternError::EmptyId => "Give the pattern a unique, non-empty \"id\"",
            PatternError::DuplicateId { .. } => {
                "Rename one of the patterns, or remove the existing one first"
            }
            PatternError::UnbalancedPlaceholder { .. } => {
                "Placeholders are written as {{ name }}; check for a missing '{{' or '}}'"
            }
            PatternError::InvalidPlaceholderName { .. } => {
                "Placeholder names must start with a letter or '_' and contain only letters, digits and '_'"
            }
            PatternError::Compile { .. } => "This is an internal error. Please report it.",
        }
    }
}

/// Failure while producing match results.
#[derive(Debug, Error)]
pub enum MatchError {
    /// A computed response returned an error. Usually a pattern-authoring bug.
    #[error("response for pattern '{pattern_id}' failed: {source}")]
    Response {
        pattern_id: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}
