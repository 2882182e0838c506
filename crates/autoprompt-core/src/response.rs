//! Keystroke responses attached to patterns.
//!
//! A pattern's response is a tagged union:
//!
//! | Variant | Meaning |
//! |---------|---------|
//! | [`Response::Literal`] | Write one string |
//! | [`Response::Sequence`] | Write strings in order, with numeric pauses |
//! | [`Response::Computed`] | Build the payload from the match context |
//!
//! A pattern without a response is observe-only: it still produces match
//! results, but nothing is typed.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// One element of a keystroke payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResponseStep {
    /// Bytes written verbatim to the child.
    Keys(String),
    /// Pause in milliseconds; nothing is written.
    Pause(u64),
}

impl From<&str> for ResponseStep {
    fn from(s: &str) -> Self {
        ResponseStep::Keys(s.to_string())
    }
}

impl From<u64> for ResponseStep {
    fn from(ms: u64) -> Self {
        ResponseStep::Pause(ms)
    }
}

/// Resolved keystroke payload: a single string or an ordered list of steps.
///
/// Deserializes from either `"1"` or `["1", 50, "\r"]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResponsePayload {
    Text(String),
    Sequence(Vec<ResponseStep>),
}

impl ResponsePayload {
    /// The payload as an ordered list of steps.
    pub fn steps(&self) -> Vec<ResponseStep> {
        match self {
            ResponsePayload::Text(s) => vec![ResponseStep::Keys(s.clone())],
            ResponsePayload::Sequence(steps) => steps.clone(),
        }
    }

    /// Concatenation of all keys, ignoring pauses.
    pub fn keys(&self) -> String {
        match self {
            ResponsePayload::Text(s) => s.clone(),
            ResponsePayload::Sequence(steps) => steps
                .iter()
                .filter_map(|step| match step {
                    ResponseStep::Keys(k) => Some(k.as_str()),
                    ResponseStep::Pause(_) => None,
                })
                .collect(),
        }
    }
}

impl From<&str> for ResponsePayload {
    fn from(s: &str) -> Self {
        ResponsePayload::Text(s.to_string())
    }
}

/// Variables injected by the orchestrator and shared by all computed responses.
///
/// Constructed once at orchestrator start and dropped at teardown.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineContext {
    pub vars: BTreeMap<String, String>,
}

impl EngineContext {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(key.into(), value.into());
        self
    }

    pub fn var(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }
}

/// Everything a computed response may look at.
#[derive(Debug, Clone, Copy)]
pub struct ResponseContext<'a> {
    pub pattern_id: &'a str,
    pub matched_text: &'a str,
    pub extracted: &'a BTreeMap<String, String>,
    pub engine: &'a EngineContext,
}

/// Error type returned by computed responses.
pub type ComputeError = Box<dyn std::error::Error + Send + Sync>;

/// Signature of a computed response. `Ok(None)` means "do not answer".
pub type ComputeFn =
    dyn Fn(&ResponseContext<'_>) -> Result<Option<ResponsePayload>, ComputeError> + Send + Sync;

/// Response attached to a pattern.
#[derive(Clone)]
pub enum Response {
    Literal(String),
    Sequence(Vec<ResponseStep>),
    Computed(Arc<ComputeFn>),
}

impl Response {
    /// Wrap a closure as a computed response.
    pub fn computed<F>(f: F) -> Self
    where
        F: Fn(&ResponseContext<'_>) -> Result<Option<ResponsePayload>, ComputeError>
            + Send
            + Sync
            + 'static,
    {
        Response::Computed(Arc::new(f))
    }

    /// Resolve to a concrete payload for one match.
    pub fn resolve(&self, ctx: &ResponseContext<'_>) -> Result<Option<ResponsePayload>, ComputeError> {
        match self {
            Response::Literal(s) => Ok(Some(ResponsePayload::Text(s.clone()))),
            Response::Sequence(steps) => Ok(Some(ResponsePayload::Sequence(steps.clone()))),
            Response::Computed(f) => f(ctx),
        }
    }
}

impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Response::Literal(s) => f.debug_tuple("Literal").field(s).finish(),
            Response::Sequence(steps) => f.debug_tuple("Sequence").field(steps).finish(),
            Response::Computed(_) => f.write_str("Computed(<fn>)"),
        }
    }
}

impl From<ResponsePayload> for Response {
    fn from(payload: ResponsePayload) -> Self {
        match payload {
            ResponsePayload::Text(s) => Response::Literal(s),
            ResponsePayload::Sequence(steps) => Response::Sequence(steps),
        }
    }
}
