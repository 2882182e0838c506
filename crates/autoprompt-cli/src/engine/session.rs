//! Session orchestration.
//!
//! [`Engine`] owns the mirror, the trigger, the matcher, the queue and the
//! activity monitor, and reacts to events one at a time. [`run`] wires an
//! `Engine` to a real PTY and the operator's terminal with `tokio::select!`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use autoprompt_core::dedup::DedupKey;
use autoprompt_core::pattern::{MatchResult, PatternKind, PatternMatcher};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::config::EngineConfig;
use crate::engine::activity::{ActivityEvent, ActivityMonitor};
use crate::engine::policy::{Decision, MatchPolicy};
use crate::engine::pty::{AsyncPtyHandle, PtySession, TermSize};
use crate::engine::queue::{KeystrokeSink, ResponseQueue};
use crate::engine::rawmode::{terminal_size, RawModeGuard};
use crate::engine::records::RecordStore;
use crate::engine::terminal::{TerminalEmulator, VirtualScreen};
use crate::engine::trigger::{MatchScope, SettleEvent, SnapshotTrigger};

/// How long to wait for the child's exit status after its output closes.
const EXIT_STATUS_WAIT: Duration = Duration::from_millis(500);

pub struct Engine {
    mirror: TerminalEmulator,
    trigger: SnapshotTrigger,
    matcher: PatternMatcher,
    /// Last match handed to the policy, per tag. The matcher keeps separate
    /// memories for its two entry points; this one spans both.
    dispatched: HashMap<Option<PatternKind>, DedupKey>,
    policy: Box<dyn MatchPolicy + Send>,
    queue: ResponseQueue,
    monitor: Option<ActivityMonitor>,
    records: Option<RecordStore>,
    label: String,
}

impl Engine {
    /// Build an engine. Settle events are delivered on `settle_tx`.
    pub fn new(
        matcher: PatternMatcher,
        policy: Box<dyn MatchPolicy + Send>,
        config: &EngineConfig,
        size: TermSize,
        settle_tx: mpsc::UnboundedSender<SettleEvent>,
    ) -> Self {
        let trigger = SnapshotTrigger::new(matcher.trigger_texts(), config.settle(), settle_tx);
        let monitor = (!config.indicator.is_empty()).then(|| {
            ActivityMonitor::new(config.indicator.clone())
                .with_thresholds(config.persistence(), config.absence())
        });

        Self {
            mirror: TerminalEmulator::new(size, config.scrollback),
            trigger,
            matcher,
            dispatched: HashMap::new(),
            policy,
            queue: ResponseQueue::new(config.key_interval()),
            monitor,
            records: None,
            label: String::new(),
        }
    }

    /// Persist busy records in `store`; the saved record is labelled with `label`.
    pub fn with_records(mut self, store: RecordStore, label: impl Into<String>) -> Self {
        let previous = match store.load() {
            Ok(record) => record.map(|r| r.busy()),
            Err(e) => {
                warn!("Ignoring busy record: {:#}", e);
                None
            }
        };
        debug!(
            "Busy record from {}: {:?}",
            store.path().display(),
            previous
        );
        self.monitor = self.monitor.map(|m| m.with_record(previous));
        self.records = Some(store);
        self.label = label.into();
        self
    }

    pub fn set_target(&self, target: Arc<dyn KeystrokeSink>) {
        self.queue.set_target(target);
    }

    pub fn has_monitor(&self) -> bool {
        self.monitor.is_some()
    }

    /// Child output: mirror it and look for triggers.
    pub fn on_output(&mut self, bytes: &[u8]) {
        self.mirror.write(bytes);
        self.trigger.feed(bytes);
    }

    pub fn on_resize(&mut self, size: TermSize) {
        if let Some(old) = self.mirror.size() {
            debug!(
                "Mirror {}x{} -> {}x{}",
                old.cols, old.rows, size.cols, size.rows
            );
        }
        self.mirror.resize(size);
    }

    /// Match the settled screen and queue accepted responses.
    ///
    /// Returns every match handed to the policy, accepted or not. A match
    /// identical to the last one dispatched for its tag is skipped, whichever
    /// scope produced it.
    pub fn on_settle(&mut self, event: SettleEvent) -> Vec<MatchResult> {
        let Some(snapshot) = self.mirror.serialize() else {
            debug!("Screen mirror unavailable, skipping match");
            return Vec::new();
        };

        let mut emitted = Vec::new();
        for scope in event.scopes {
            let results = match scope {
                MatchScope::All => self.matcher.process_data(&snapshot),
                MatchScope::Kind(kind) => self.matcher.process_data_by_type(&snapshot, kind),
            };
            match results {
                Ok(results) => {
                    for result in results {
                        let key = DedupKey::new(result.kind, &result.matched_text);
                        if self.dispatched.get(&result.kind) == Some(&key) {
                            debug!("Already handled '{}' ({})", result.title, result.pattern_id);
                            continue;
                        }
                        self.dispatched.insert(result.kind, key);
                        self.dispatch(&result);
                        emitted.push(result);
                    }
                }
                Err(e) => error!("{}", e),
            }
        }
        emitted
    }

    fn dispatch(&self, result: &MatchResult) {
        if result.kind == Some(PatternKind::Completion) {
            info!("{} ({})", result.title, result.pattern_id);
            return;
        }

        match self.policy.decide(result) {
            Decision::Accept => {
                info!(
                    "Answering '{}' ({}) with {:?} {:?}",
                    result.title,
                    result.pattern_id,
                    result.response.as_ref().map(|r| r.keys()),
                    result.extracted_data
                );
                self.queue.enqueue(result.response.clone(), Duration::ZERO);
                debug!("{} response(s) waiting", self.queue.pending());
            }
            Decision::Dismiss => {
                info!(
                    "Leaving '{}' ({}) for the operator {:?}",
                    result.title, result.pattern_id, result.extracted_data
                );
            }
        }
    }

    /// Feed the current screen to the activity monitor.
    pub fn on_poll(&mut self) -> Vec<ActivityEvent> {
        let Some(monitor) = self.monitor.as_mut() else {
            return Vec::new();
        };
        let Some(snapshot) = self.mirror.serialize() else {
            return Vec::new();
        };

        let events = monitor.check_snapshot(&snapshot);
        for event in &events {
            match event {
                ActivityEvent::Started => info!("Child is busy"),
                ActivityEvent::Completed { busy } => {
                    info!("Child finished after {:.1}s", busy.as_secs_f64())
                }
                ActivityEvent::NewRecord { busy, previous } => {
                    info!(
                        "Longest busy stretch so far: {:.1}s (previous {:?})",
                        busy.as_secs_f64(),
                        previous
                    );
                    if let Some(store) = &self.records {
                        if let Err(e) = store.save(*busy, &self.label) {
                            warn!("Failed to save busy record: {:#}", e);
                        }
                    }
                }
            }
        }
        events
    }

    /// Stop timers, drop pending responses, and release the mirror.
    pub fn teardown(&mut self) {
        self.trigger.cancel();
        let dropped = self.queue.clear();
        if dropped > 0 || !self.queue.is_idle() {
            debug!("Dropped {} pending responses, one may still be in flight", dropped);
        }
        self.mirror.teardown();
        if let Some(monitor) = self.monitor.as_mut() {
            debug!(
                "Activity {:?} at teardown, longest {:?}",
                monitor.state(),
                monitor.longest()
            );
            monitor.reset();
        }
        self.matcher.reset_dedup();
        self.dispatched.clear();
    }
}

/// Run `command` under a PTY until it exits. Returns the child's exit code.
pub async fn run(
    command: &[String],
    matcher: PatternMatcher,
    policy: Box<dyn MatchPolicy + Send>,
    config: &EngineConfig,
    records: Option<RecordStore>,
) -> Result<u32> {
    let size = terminal_size().unwrap_or_default();
    let session = PtySession::spawn(command, size)?;
    let mut pty = AsyncPtyHandle::new(session)?;

    let (settle_tx, mut settle_rx) = mpsc::unbounded_channel();
    let mut engine = Engine::new(matcher, policy, config, size, settle_tx);
    if let Some(store) = records {
        engine = engine.with_records(store, command.join(" "));
    }
    engine.set_target(Arc::new(pty.input()));

    let _raw = RawModeGuard::enter().context("Failed to prepare terminal")?;

    let mut winch = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::window_change())
        .context("Failed to register SIGWINCH handler")?;
    let mut poll = tokio::time::interval(config.poll());
    poll.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let monitor_enabled = engine.has_monitor();

    let mut stdin = tokio::io::stdin();
    let mut stdout = tokio::io::stdout();
    let mut stdin_open = true;
    let mut buf = vec![0u8; 1024];

    info!(
        "Started '{}' at {}x{} with {} trigger(s)",
        command.join(" "),
        size.cols,
        size.rows,
        engine.trigger.trigger_count()
    );

    loop {
        tokio::select! {
            chunk = pty.read() => {
                let Some(chunk) = chunk else {
                    debug!("Child output closed");
                    break;
                };
                stdout.write_all(&chunk).await.context("Failed to write to stdout")?;
                stdout.flush().await.context("Failed to flush stdout")?;
                engine.on_output(&chunk);
            }
            read = stdin.read(&mut buf), if stdin_open => {
                match read {
                    Ok(0) => {
                        debug!("stdin closed");
                        stdin_open = false;
                    }
                    Ok(n) => {
                        if let Err(e) = pty.write(&buf[..n]).await {
                            warn!("Dropped operator input: {:#}", e);
                        }
                    }
                    Err(e) => {
                        warn!("Failed to read stdin: {}", e);
                        stdin_open = false;
                    }
                }
            }
            _ = winch.recv() => {
                match terminal_size() {
                    Some(size) if size != pty.size() => {
                        if let Err(e) = pty.resize(size) {
                            warn!("{:#}", e);
                        }
                        engine.on_resize(size);
                    }
                    _ => {}
                }
            }
            Some(event) = settle_rx.recv() => {
                engine.on_settle(event);
            }
            _ = poll.tick(), if monitor_enabled => {
                engine.on_poll();
            }
        }
    }

    engine.teardown();
    let code = wait_for_exit(&pty).await;
    pty.shutdown();
    info!("Child exited with code {:?}", code);
    Ok(code.unwrap_or(1))
}

async fn wait_for_exit(pty: &AsyncPtyHandle) -> Option<u32> {
    let deadline = tokio::time::Instant::now() + EXIT_STATUS_WAIT;
    loop {
        if let Some(code) = pty.exit_code() {
            return Some(code);
        }
        if tokio::time::Instant::now() >= deadline {
            return None;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use autoprompt_core::pattern::PatternSpec;
    use autoprompt_core::response::{EngineContext, Response};

    use crate::builtin::register_builtins;
    use crate::engine::activity::ActivityState;
    use crate::engine::policy::AllowListPolicy;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<String>>);

    impl Recorder {
        fn keys(&self) -> Vec<String> {
            self.0.lock().unwrap().clone()
        }
    }

    impl KeystrokeSink for Recorder {
        fn send_keys(&self, bytes: &[u8]) -> Result<()> {
            self.0
                .lock()
                .unwrap()
                .push(String::from_utf8_lossy(bytes).into_owned());
            Ok(())
        }
    }

    fn engine(
        policy: AllowListPolicy,
        config: EngineConfig,
    ) -> (Engine, mpsc::UnboundedReceiver<SettleEvent>, Arc<Recorder>) {
        engine_with(Vec::new(), policy, config)
    }

    /// Builtins plus `extra` patterns.
    fn engine_with(
        extra: Vec<PatternSpec>,
        policy: AllowListPolicy,
        config: EngineConfig,
    ) -> (Engine, mpsc::UnboundedReceiver<SettleEvent>, Arc<Recorder>) {
        let mut matcher = PatternMatcher::with_context(EngineContext::new());
        register_builtins(&mut matcher).unwrap();
        for spec in extra {
            matcher.add_pattern(spec).unwrap();
        }
        let (tx, rx) = mpsc::unbounded_channel();
        let engine = Engine::new(matcher, Box::new(policy), &config, TermSize::default(), tx);
        let sink = Arc::new(Recorder::default());
        engine.set_target(sink.clone());
        (engine, rx, sink)
    }

    const CREATE_PROMPT: &[u8] =
        b"\x1b[2J\x1b[HDo you want to create \x1b[1mnotes.md\x1b[0m?\r\n\xe2\x9d\xaf 1. Yes\r\n  2. No\r\n";

    #[tokio::test(start_paused = true)]
    async fn test_accepted_prompt_is_answered_once() {
        let (mut engine, mut rx, sink) = engine(
            AllowListPolicy::new(["create-file"]),
            EngineConfig::default(),
        );

        engine.on_output(CREATE_PROMPT);
        let event = rx.recv().await.expect("settle event");
        let emitted = engine.on_settle(event);
        assert_eq!(emitted.len(), 1);
        assert_eq!(emitted[0].extracted_data["fileName"], "notes.md");

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(sink.keys(), vec!["1"]);

        // Redraw of the identical prompt does not answer again.
        engine.on_output(b"\x1b[H");
        engine.on_output(CREATE_PROMPT);
        let event = rx.recv().await.expect("settle event");
        assert!(engine.on_settle(event).is_empty());
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(sink.keys(), vec!["1"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_both_scopes_in_one_window_answer_once() {
        let note = PatternSpec::new("note", ["notes.md was saved"]).with_trigger("notes");
        let (mut engine, mut rx, sink) = engine_with(
            vec![note],
            AllowListPolicy::new(["create-file"]),
            EngineConfig::default(),
        );

        engine.on_output(CREATE_PROMPT);
        let event = rx.recv().await.expect("settle event");
        assert!(event.scopes.contains(&MatchScope::All));
        assert!(event.scopes.contains(&MatchScope::Kind(PatternKind::Prompt)));

        let emitted = engine.on_settle(event);
        let ids: Vec<&str> = emitted.iter().map(|r| r.pattern_id.as_str()).collect();
        assert_eq!(ids, vec!["create-file"]);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(sink.keys(), vec!["1"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_untagged_trigger_does_not_reanswer_prompt() {
        let npm = PatternSpec::new("npm-name", ["package name: {{ name }}", "version:"])
            .with_trigger("package name")
            .with_response(Response::Literal("\r".into()));
        let (mut engine, mut rx, sink) = engine_with(
            vec![npm],
            AllowListPolicy::new(["create-file", "npm-name"]),
            EngineConfig::default(),
        );

        engine.on_output(CREATE_PROMPT);
        let event = rx.recv().await.expect("settle event");
        assert_eq!(event.scopes, vec![MatchScope::Kind(PatternKind::Prompt)]);
        assert_eq!(engine.on_settle(event).len(), 1);
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(sink.keys(), vec!["1"]);

        // The answered prompt is still the bottommost complete match.
        engine.on_output(b"package name: (foo)");
        let event = rx.recv().await.expect("settle event");
        assert_eq!(event.scopes, vec![MatchScope::All]);
        assert!(engine.on_settle(event).is_empty());
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(sink.keys(), vec!["1"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dismissed_prompt_is_reported_not_answered() {
        let (mut engine, mut rx, sink) =
            engine(AllowListPolicy::default(), EngineConfig::default());

        engine.on_output(CREATE_PROMPT);
        let event = rx.recv().await.expect("settle event");
        assert_eq!(engine.on_settle(event).len(), 1);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(sink.keys().is_empty());
        assert!(engine.queue.is_idle());
    }

    #[tokio::test(start_paused = true)]
    async fn test_settle_after_teardown_is_skipped() {
        let (mut engine, _rx, sink) =
            engine(AllowListPolicy::accept_all(), EngineConfig::default());

        engine.on_output(CREATE_PROMPT);
        engine.teardown();
        let emitted = engine.on_settle(SettleEvent {
            scopes: vec![MatchScope::All],
        });
        assert!(emitted.is_empty());
        assert!(sink.keys().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_computed_error_is_logged_and_loop_survives() {
        let mut matcher = PatternMatcher::new();
        matcher
            .add_pattern(
                PatternSpec::new("broken", ["Continue?"])
                    .with_trigger("Continue")
                    .with_response(Response::computed(|_| Err("no answer".into()))),
            )
            .unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut engine = Engine::new(
            matcher,
            Box::new(AllowListPolicy::accept_all()),
            &EngineConfig::default(),
            TermSize::default(),
            tx,
        );

        engine.on_output(b"Continue?");
        let event = rx.recv().await.expect("settle event");
        assert!(engine.on_settle(event).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_tracks_activity_from_mirror() {
        let config = EngineConfig {
            persistence_ms: 0,
            ..EngineConfig::default()
        };
        let (mut engine, _rx, _sink) = engine(AllowListPolicy::default(), config);
        assert!(engine.has_monitor());

        engine.on_output(b"\xe2\x9c\xbb Working... (esc to interrupt)");
        assert_eq!(engine.on_poll(), vec![ActivityEvent::Started]);
        assert_eq!(
            engine.monitor.as_ref().map(|m| m.state()),
            Some(ActivityState::Present)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_indicator_disables_monitor() {
        let config = EngineConfig {
            indicator: String::new(),
            ..EngineConfig::default()
        };
        let (mut engine, _rx, _sink) = engine(AllowListPolicy::default(), config);
        assert!(!engine.has_monitor());
        engine.on_output(b"esc to interrupt");
        assert!(engine.on_poll().is_empty());
    }
}
