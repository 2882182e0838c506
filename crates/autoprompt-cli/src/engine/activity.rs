//! Busy/idle detection from screen snapshots.
//!
//! The child shows an indicator (e.g. "esc to interrupt") while it works. The
//! monitor debounces both edges: the indicator has to persist before the child
//! counts as busy, and it has to stay gone before the cycle completes.
//!
//! ```text
//! Idle ──seen──▶ PendingPresent ──held ≥ persistence──▶ Present
//!   ▲                 │ gone                               │ gone
//!   │                 ▼                                    ▼
//!   └──────────────── Idle ◀──gone ≥ absence── PendingAbsent
//!                                                 │ seen again
//!                                                 ▼
//!                                              Present
//! ```

use std::time::{Duration, Instant};

use tracing::debug;

pub const DEFAULT_PERSISTENCE: Duration = Duration::from_secs(1);
pub const DEFAULT_ABSENCE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityState {
    Idle,
    PendingPresent,
    Present,
    PendingAbsent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityEvent {
    /// Indicator held long enough to count as busy.
    Started,
    /// Indicator stayed gone long enough; the busy cycle is over.
    ///
    /// `busy` runs from the promotion to `Present` until now, so the
    /// persistence window is not counted.
    Completed { busy: Duration },
    /// The cycle that just completed is the longest seen so far.
    NewRecord {
        busy: Duration,
        previous: Option<Duration>,
    },
}

pub struct ActivityMonitor {
    indicator: String,
    persistence: Duration,
    absence: Duration,
    state: ActivityState,
    /// First observation of the indicator in the current cycle.
    first_seen: Option<Instant>,
    /// Promotion to `Present`; kept across a cancelled absence countdown.
    busy_since: Option<Instant>,
    /// When the indicator went missing while `PendingAbsent`.
    gone_since: Option<Instant>,
    last_transition: Option<Instant>,
    longest: Option<Duration>,
}

impl ActivityMonitor {
    pub fn new(indicator: impl Into<String>) -> Self {
        Self {
            indicator: indicator.into(),
            persistence: DEFAULT_PERSISTENCE,
            absence: DEFAULT_ABSENCE,
            state: ActivityState::Idle,
            first_seen: None,
            busy_since: None,
            gone_since: None,
            last_transition: None,
            longest: None,
        }
    }

    pub fn with_thresholds(mut self, persistence: Duration, absence: Duration) -> Self {
        self.persistence = persistence;
        self.absence = absence;
        self
    }

    /// Seed the longest busy duration, e.g. from the record store.
    pub fn with_record(mut self, longest: Option<Duration>) -> Self {
        self.longest = longest;
        self
    }

    pub fn state(&self) -> ActivityState {
        self.state
    }

    pub fn longest(&self) -> Option<Duration> {
        self.longest
    }

    pub fn check_snapshot(&mut self, screen: &str) -> Vec<ActivityEvent> {
        self.check_snapshot_at(screen, Instant::now())
    }

    /// Advance the state machine with a snapshot observed at `now`.
    pub fn check_snapshot_at(&mut self, screen: &str, now: Instant) -> Vec<ActivityEvent> {
        let seen = !self.indicator.is_empty() && screen.contains(&self.indicator);
        let mut events = Vec::new();

        match (self.state, seen) {
            (ActivityState::Idle, true) => {
                self.first_seen = Some(now);
                self.transition(ActivityState::PendingPresent, now);
                // A zero persistence threshold promotes immediately.
                if self.persistence.is_zero() {
                    self.busy_since = Some(now);
                    self.transition(ActivityState::Present, now);
                    events.push(ActivityEvent::Started);
                }
            }
            (ActivityState::Idle, false) => {}
            (ActivityState::PendingPresent, true) => {
                let since = self.first_seen.unwrap_or(now);
                if now.saturating_duration_since(since) >= self.persistence {
                    self.busy_since = Some(now);
                    self.transition(ActivityState::Present, now);
                    events.push(ActivityEvent::Started);
                }
            }
            (ActivityState::PendingPresent, false) => {
                // Flicker: never held long enough.
                self.first_seen = None;
                self.transition(ActivityState::Idle, now);
            }
            (ActivityState::Present, true) => {}
            (ActivityState::Present, false) => {
                self.gone_since = Some(now);
                self.transition(ActivityState::PendingAbsent, now);
            }
            (ActivityState::PendingAbsent, true) => {
                self.gone_since = None;
                self.transition(ActivityState::Present, now);
            }
            (ActivityState::PendingAbsent, false) => {
                let gone = self.gone_since.unwrap_or(now);
                if now.saturating_duration_since(gone) >= self.absence {
                    let busy = self
                        .busy_since
                        .map(|start| now.saturating_duration_since(start))
                        .unwrap_or_default();
                    events.push(ActivityEvent::Completed { busy });

                    let previous = self.longest;
                    if busy > previous.unwrap_or(Duration::ZERO) {
                        self.longest = Some(busy);
                        events.push(ActivityEvent::NewRecord { busy, previous });
                    }

                    self.first_seen = None;
                    self.busy_since = None;
                    self.gone_since = None;
                    self.transition(ActivityState::Idle, now);
                }
            }
        }

        events
    }

    /// Forget the current cycle. The longest duration is kept.
    pub fn reset(&mut self) {
        self.state = ActivityState::Idle;
        self.first_seen = None;
        self.busy_since = None;
        self.gone_since = None;
        self.last_transition = None;
    }

    fn transition(&mut self, to: ActivityState, now: Instant) {
        let held = self
            .last_transition
            .map(|at| now.saturating_duration_since(at))
            .unwrap_or_default();
        debug!("Activity {:?} -> {:?} after {:?}", self.state, to, held);
        self.state = to;
        self.last_transition = Some(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BUSY: &str = "✻ Working… (esc to interrupt)";
    const IDLE: &str = "> ";

    struct Clock {
        start: Instant,
    }

    impl Clock {
        fn new() -> Self {
            Self {
                start: Instant::now(),
            }
        }

        fn at(&self, ms: u64) -> Instant {
            self.start + Duration::from_millis(ms)
        }
    }

    fn monitor() -> ActivityMonitor {
        ActivityMonitor::new("esc to interrupt")
    }

    #[test]
    fn test_short_flicker_never_fires() {
        let clock = Clock::new();
        let mut m = monitor();

        assert!(m.check_snapshot_at(BUSY, clock.at(0)).is_empty());
        assert!(m.check_snapshot_at(BUSY, clock.at(500)).is_empty());
        assert!(m.check_snapshot_at(IDLE, clock.at(900)).is_empty());
        assert_eq!(m.state(), ActivityState::Idle);

        for ms in (1000..6000).step_by(500) {
            assert!(m.check_snapshot_at(IDLE, clock.at(ms)).is_empty());
        }
    }

    #[test]
    fn test_full_cycle_fires_one_completion() {
        let clock = Clock::new();
        let mut m = monitor();

        m.check_snapshot_at(BUSY, clock.at(0));
        assert_eq!(
            m.check_snapshot_at(BUSY, clock.at(1000)),
            vec![ActivityEvent::Started]
        );
        assert_eq!(m.state(), ActivityState::Present);

        assert!(m.check_snapshot_at(IDLE, clock.at(3000)).is_empty());
        assert_eq!(m.state(), ActivityState::PendingAbsent);
        assert!(m.check_snapshot_at(IDLE, clock.at(4000)).is_empty());

        let events = m.check_snapshot_at(IDLE, clock.at(5000));
        assert_eq!(events[0], ActivityEvent::Completed {
            busy: Duration::from_secs(4)
        });
        assert_eq!(m.state(), ActivityState::Idle);

        // Stays quiet afterwards.
        assert!(m.check_snapshot_at(IDLE, clock.at(9000)).is_empty());
    }

    #[test]
    fn test_reappearance_cancels_absence_countdown() {
        let clock = Clock::new();
        let mut m = monitor();

        m.check_snapshot_at(BUSY, clock.at(0));
        m.check_snapshot_at(BUSY, clock.at(1000));
        m.check_snapshot_at(IDLE, clock.at(1500));
        assert!(m.check_snapshot_at(BUSY, clock.at(2500)).is_empty());
        assert_eq!(m.state(), ActivityState::Present);

        // Absence restarts from the new disappearance.
        m.check_snapshot_at(IDLE, clock.at(3000));
        assert!(m.check_snapshot_at(IDLE, clock.at(4500)).is_empty());
        let events = m.check_snapshot_at(IDLE, clock.at(5000));
        assert!(matches!(events[0], ActivityEvent::Completed { .. }));
    }

    #[test]
    fn test_new_record_only_when_exceeded() {
        let clock = Clock::new();
        let mut m = monitor().with_record(Some(Duration::from_secs(10)));

        m.check_snapshot_at(BUSY, clock.at(0));
        m.check_snapshot_at(BUSY, clock.at(1000));
        m.check_snapshot_at(IDLE, clock.at(2000));
        let events = m.check_snapshot_at(IDLE, clock.at(4000));
        assert_eq!(events, vec![ActivityEvent::Completed {
            busy: Duration::from_secs(3)
        }]);

        m.check_snapshot_at(BUSY, clock.at(10_000));
        m.check_snapshot_at(BUSY, clock.at(11_000));
        m.check_snapshot_at(IDLE, clock.at(20_000));
        let events = m.check_snapshot_at(IDLE, clock.at(22_000));
        assert_eq!(events, vec![
            ActivityEvent::Completed {
                busy: Duration::from_secs(11)
            },
            ActivityEvent::NewRecord {
                busy: Duration::from_secs(11),
                previous: Some(Duration::from_secs(10)),
            },
        ]);
        assert_eq!(m.longest(), Some(Duration::from_secs(11)));
    }

    #[test]
    fn test_first_cycle_sets_record() {
        let clock = Clock::new();
        let mut m = monitor();

        m.check_snapshot_at(BUSY, clock.at(0));
        m.check_snapshot_at(BUSY, clock.at(1000));
        m.check_snapshot_at(IDLE, clock.at(1000));
        let events = m.check_snapshot_at(IDLE, clock.at(3000));
        assert!(events.contains(&ActivityEvent::NewRecord {
            busy: Duration::from_secs(2),
            previous: None,
        }));
    }

    #[test]
    fn test_reset_clears_cycle_keeps_record() {
        let clock = Clock::new();
        let mut m = monitor().with_record(Some(Duration::from_secs(7)));

        m.check_snapshot_at(BUSY, clock.at(0));
        m.check_snapshot_at(BUSY, clock.at(1000));
        m.reset();
        assert_eq!(m.state(), ActivityState::Idle);
        assert!(m.check_snapshot_at(IDLE, clock.at(5000)).is_empty());
        assert_eq!(m.longest(), Some(Duration::from_secs(7)));
    }

    #[test]
    fn test_busy_time_excludes_persistence_window() {
        let clock = Clock::new();
        let mut m = monitor();

        m.check_snapshot_at(BUSY, clock.at(0));
        m.check_snapshot_at(BUSY, clock.at(1500));
        // Cancelled countdown keeps the original start.
        m.check_snapshot_at(IDLE, clock.at(2000));
        m.check_snapshot_at(BUSY, clock.at(2500));
        m.check_snapshot_at(IDLE, clock.at(3000));
        let events = m.check_snapshot_at(IDLE, clock.at(5000));
        assert_eq!(events[0], ActivityEvent::Completed {
            busy: Duration::from_millis(3500)
        });
    }

    #[test]
    fn test_empty_indicator_never_matches() {
        let clock = Clock::new();
        let mut m = ActivityMonitor::new("");
        assert!(m.check_snapshot_at(BUSY, clock.at(0)).is_empty());
        assert_eq!(m.state(), ActivityState::Idle);
    }
}
