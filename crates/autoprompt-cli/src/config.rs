//! Pattern file and engine tuning.
//!
//! A pattern file is JSON:
//!
//! ```json
//! {
//!   "patterns": [
//!     { "id": "npm-init", "lines": ["package name: ({{ name }})"], "response": "\r" }
//!   ],
//!   "accept": ["npm-init", "edit-file"],
//!   "engine": { "settle_ms": 150 }
//! }
//! ```
//!
//! All sections use `#[serde(default)]` so any of them may be omitted.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use autoprompt_core::pattern::{PatternDef, PatternMatcher, PatternSpec};
use serde::{Deserialize, Serialize};

use crate::engine::activity::{DEFAULT_ABSENCE, DEFAULT_PERSISTENCE};
use crate::engine::queue::DEFAULT_KEY_INTERVAL;
use crate::engine::terminal::DEFAULT_SCROLLBACK;
use crate::engine::trigger::DEFAULT_SETTLE;

pub const DEFAULT_INDICATOR: &str = "esc to interrupt";
pub const DEFAULT_POLL: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternFile {
    pub patterns: Vec<PatternDef>,
    /// Pattern ids answered automatically.
    pub accept: Vec<String>,
    pub engine: EngineConfig,
}

impl PatternFile {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read pattern file {}", path.display()))?;
        Self::parse(&contents)
            .with_context(|| format!("Invalid pattern file {}", path.display()))
    }

    pub fn parse(contents: &str) -> Result<Self> {
        Ok(serde_json::from_str(contents)?)
    }

    /// Register every pattern, stopping at the first invalid one.
    pub fn register(&self, matcher: &mut PatternMatcher) -> Result<()> {
        for def in &self.patterns {
            let id = def.id.clone();
            matcher.add_pattern(PatternSpec::from(def.clone())).map_err(|e| {
                anyhow::anyhow!("Pattern '{}': {} ({})", id, e, e.suggestion())
            })?;
        }
        Ok(())
    }
}

/// Timing knobs. Durations are stored in milliseconds in the file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub settle_ms: u64,
    pub key_interval_ms: u64,
    pub poll_ms: u64,
    pub persistence_ms: u64,
    pub absence_ms: u64,
    pub scrollback: usize,
    /// Busy marker; empty disables the activity monitor.
    pub indicator: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            settle_ms: DEFAULT_SETTLE.as_millis() as u64,
            key_interval_ms: DEFAULT_KEY_INTERVAL.as_millis() as u64,
            poll_ms: DEFAULT_POLL.as_millis() as u64,
            persistence_ms: DEFAULT_PERSISTENCE.as_millis() as u64,
            absence_ms: DEFAULT_ABSENCE.as_millis() as u64,
            scrollback: DEFAULT_SCROLLBACK,
            indicator: DEFAULT_INDICATOR.to_string(),
        }
    }
}

impl EngineConfig {
    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn key_interval(&self) -> Duration {
        Duration::from_millis(self.key_interval_ms)
    }

    pub fn poll(&self) -> Duration {
        Duration::from_millis(self.poll_ms.max(1))
    }

    pub fn persistence(&self) -> Duration {
        Duration::from_millis(self.persistence_ms)
    }

    pub fn absence(&self) -> Duration {
        Duration::from_millis(self.absence_ms)
    }
}
