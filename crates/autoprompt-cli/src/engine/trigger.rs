//! Debounced snapshot trigger.
//!
//! Matching the whole screen on every PTY chunk is wasteful and races
//! half-drawn frames. Instead each raw chunk is searched for cheap trigger
//! substrings; a hit (re)starts a short settle timer, and only when output has
//! been quiet for the settle window does the session take a snapshot and run
//! the matcher.
//!
//! The timer task never touches the mirror or the matcher. It sends a
//! [`SettleEvent`] to the session loop, which owns both.

use std::time::Duration;

use autoprompt_core::ansi::strip_ansi_bytes;
use autoprompt_core::pattern::PatternKind;
use tokio::sync::mpsc;
use tracing::debug;

use crate::engine::timer::DelayedTask;

/// Default quiet period after a trigger hit.
pub const DEFAULT_SETTLE: Duration = Duration::from_millis(100);

/// Which patterns to run once the screen has settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchScope {
    /// All patterns (trigger belongs to an untagged pattern).
    All,
    Kind(PatternKind),
}

impl From<Option<PatternKind>> for MatchScope {
    fn from(kind: Option<PatternKind>) -> Self {
        kind.map_or(MatchScope::All, MatchScope::Kind)
    }
}

/// Emitted when the settle window elapses after one or more trigger hits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettleEvent {
    /// Scopes whose trigger text was seen during the window, deduplicated.
    pub scopes: Vec<MatchScope>,
}

#[derive(Debug, Clone)]
struct Trigger {
    needle: String,
    scope: MatchScope,
}

pub struct SnapshotTrigger {
    triggers: Vec<Trigger>,
    settle: Duration,
    timer: DelayedTask,
    pending: Vec<MatchScope>,
    /// End of the previous chunk, so needles split across chunks are found.
    tail: String,
    tail_chars: usize,
    tx: mpsc::UnboundedSender<SettleEvent>,
}

impl SnapshotTrigger {
    /// Build a trigger from `(trigger_text, kind)` pairs.
    pub fn new<I>(triggers: I, settle: Duration, tx: mpsc::UnboundedSender<SettleEvent>) -> Self
    where
        I: IntoIterator<Item = (String, Option<PatternKind>)>,
    {
        let triggers: Vec<Trigger> = triggers
            .into_iter()
            .filter(|(text, _)| !text.is_empty())
            .map(|(text, kind)| Trigger {
                needle: text.to_lowercase(),
                scope: kind.into(),
            })
            .collect();
        let tail_chars = triggers
            .iter()
            .map(|t| t.needle.chars().count())
            .max()
            .unwrap_or(1)
            .saturating_sub(1);

        Self {
            triggers,
            settle,
            timer: DelayedTask::new(),
            pending: Vec::new(),
            tail: String::new(),
            tail_chars,
            tx,
        }
    }

    pub fn trigger_count(&self) -> usize {
        self.triggers.len()
    }

    /// Inspect one raw output chunk. Returns true if a trigger was hit.
    pub fn feed(&mut self, chunk: &[u8]) -> bool {
        if self.triggers.is_empty() {
            return false;
        }

        let text = strip_ansi_bytes(chunk).to_lowercase();
        let mut haystack = std::mem::take(&mut self.tail);
        let carried = haystack.len();
        haystack.push_str(&text);

        // A hit must end inside the new chunk, or a short needle sitting in
        // the carried tail would fire again on every later chunk.
        let hits: Vec<MatchScope> = self
            .triggers
            .iter()
            .filter(|t| {
                haystack
                    .match_indices(t.needle.as_str())
                    .any(|(at, needle)| at + needle.len() > carried)
            })
            .map(|t| t.scope)
            .collect();

        let keep_from = haystack
            .char_indices()
            .rev()
            .nth(self.tail_chars.saturating_sub(1))
            .map_or(0, |(i, _)| i);
        self.tail = if self.tail_chars == 0 {
            String::new()
        } else {
            haystack[keep_from..].to_string()
        };

        if hits.is_empty() {
            return false;
        }

        // A finished timer means the previous window already fired.
        if !self.timer.is_pending() {
            self.pending.clear();
        }
        for scope in hits {
            if !self.pending.contains(&scope) {
                self.pending.push(scope);
            }
        }
        debug!("Trigger hit, settling for {:?} ({:?})", self.settle, self.pending);

        let event = SettleEvent {
            scopes: self.pending.clone(),
        };
        let tx = self.tx.clone();
        self.timer.schedule(self.settle, async move {
            let _ = tx.send(event);
        });
        true
    }

    /// Cancel any pending settle timer.
    pub fn cancel(&mut self) {
        self.timer.cancel();
        self.pending.clear();
        self.tail.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trigger(
        pairs: &[(&str, Option<PatternKind>)],
    ) -> (SnapshotTrigger, mpsc::UnboundedReceiver<SettleEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let t = SnapshotTrigger::new(
            pairs.iter().map(|(s, k)| (s.to_string(), *k)),
            DEFAULT_SETTLE,
            tx,
        );
        (t, rx)
    }

    #[tokio::test(start_paused = true)]
    async fn test_fires_after_settle_window() {
        let (mut t, mut rx) = trigger(&[("Do you want", Some(PatternKind::Prompt))]);

        assert!(t.feed(b"\x1b[1mDo you want\x1b[0m to proceed?"));
        assert!(rx.try_recv().is_err());

        tokio::time::sleep(Duration::from_millis(150)).await;
        let event = rx.try_recv().expect("settle event");
        assert_eq!(event.scopes, vec![MatchScope::Kind(PatternKind::Prompt)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ignores_chunks_without_trigger() {
        let (mut t, mut rx) = trigger(&[("Do you want", None)]);
        assert!(!t.feed(b"compiling crate foo v0.1.0"));
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_restarts_timer_and_fires_once() {
        let (mut t, mut rx) = trigger(&[("proceed", None)]);

        for _ in 0..5 {
            t.feed(b"proceed?");
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert!(rx.try_recv().is_err(), "fired during the burst");

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(rx.try_recv().unwrap().scopes, vec![MatchScope::All]);
        assert!(rx.try_recv().is_err(), "fired more than once");
    }

    #[tokio::test(start_paused = true)]
    async fn test_collects_scopes_within_window() {
        let (mut t, mut rx) = trigger(&[
            ("Do you want", Some(PatternKind::Prompt)),
            ("Task complete", Some(PatternKind::Completion)),
        ]);
        t.feed(b"Task complete\r\n");
        t.feed(b"Do you want to run this?");
        tokio::time::sleep(Duration::from_millis(150)).await;

        let event = rx.try_recv().unwrap();
        assert_eq!(
            event.scopes,
            vec![
                MatchScope::Kind(PatternKind::Completion),
                MatchScope::Kind(PatternKind::Prompt)
            ]
        );

        // Next window starts fresh.
        t.feed(b"Do you want to run this?");
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(
            rx.try_recv().unwrap().scopes,
            vec![MatchScope::Kind(PatternKind::Prompt)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_finds_trigger_split_across_chunks() {
        let (mut t, mut rx) = trigger(&[("Do you want", None)]);
        assert!(!t.feed(b"Do yo"));
        assert!(t.feed(b"u want to proceed?"));
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(rx.try_recv().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_carried_tail_does_not_rehit_short_needle() {
        let (mut t, mut rx) = trigger(&[
            ("Do you want", Some(PatternKind::Prompt)),
            ("✻", Some(PatternKind::Completion)),
        ]);
        assert!(t.feed("✻ Thinking".as_bytes()));
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(!t.feed(b"x"));
        assert!(!t.feed(b"y"));

        // The window opened by the first chunk is not extended.
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(
            rx.try_recv().unwrap().scopes,
            vec![MatchScope::Kind(PatternKind::Completion)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_case_insensitive_search() {
        let (mut t, _rx) = trigger(&[("do you want", None)]);
        assert!(t.feed(b"DO YOU WANT"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_drops_pending_window() {
        let (mut t, mut rx) = trigger(&[("proceed", None)]);
        t.feed(b"proceed");
        t.cancel();
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(rx.try_recv().is_err());
    }
}
