//! Paced keystroke delivery.
//!
//! Responses are queued and drained by a single background task. Each item
//! waits its leading delay and then writes its steps in order. String steps
//! that follow each other are spaced by a fixed interval, because many TUIs
//! read input in a loop and drop keys that arrive in the same read.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use anyhow::Result;
use autoprompt_core::response::{ResponsePayload, ResponseStep};
use chrono::{DateTime, Utc};
use tracing::{debug, warn};
use uuid::Uuid;

/// Default pause between adjacent string steps.
pub const DEFAULT_KEY_INTERVAL: Duration = Duration::from_millis(100);

/// Destination for synthetic keystrokes.
pub trait KeystrokeSink: Send + Sync {
    fn send_keys(&self, bytes: &[u8]) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct QueuedResponse {
    pub id: Uuid,
    pub payload: ResponsePayload,
    pub leading_delay: Duration,
    pub enqueued_at: DateTime<Utc>,
}

#[derive(Default)]
struct QueueState {
    items: VecDeque<QueuedResponse>,
    target: Option<Arc<dyn KeystrokeSink>>,
    draining: bool,
}

/// FIFO of responses awaiting delivery.
pub struct ResponseQueue {
    state: Arc<Mutex<QueueState>>,
    key_interval: Duration,
}

fn lock(state: &Mutex<QueueState>) -> MutexGuard<'_, QueueState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl ResponseQueue {
    pub fn new(key_interval: Duration) -> Self {
        Self {
            state: Arc::new(Mutex::new(QueueState::default())),
            key_interval,
        }
    }

    /// Replace the sink. The next write goes to the new target.
    pub fn set_target(&self, target: Arc<dyn KeystrokeSink>) {
        lock(&self.state).target = Some(target);
    }

    /// Queue a payload. `None` is ignored.
    ///
    /// Returns the id assigned to the queued item. Must be called from within
    /// a tokio runtime: the drain task is spawned on demand.
    pub fn enqueue(
        &self,
        payload: Option<ResponsePayload>,
        leading_delay: Duration,
    ) -> Option<Uuid> {
        let payload = payload?;
        let item = QueuedResponse {
            id: Uuid::new_v4(),
            payload,
            leading_delay,
            enqueued_at: Utc::now(),
        };
        let id = item.id;

        let spawn_drain = {
            let mut state = lock(&self.state);
            state.items.push_back(item);
            !std::mem::replace(&mut state.draining, true)
        };
        debug!("Queued response {}", id);

        if spawn_drain {
            tokio::spawn(drain(self.state.clone(), self.key_interval));
        }
        Some(id)
    }

    /// Drop items that have not started. The item being sent still finishes.
    pub fn clear(&self) -> usize {
        let mut state = lock(&self.state);
        let dropped = state.items.len();
        state.items.clear();
        dropped
    }

    /// Number of queued items not yet started.
    pub fn pending(&self) -> usize {
        lock(&self.state).items.len()
    }

    /// True when no drain task is running.
    pub fn is_idle(&self) -> bool {
        !lock(&self.state).draining
    }
}

impl Default for ResponseQueue {
    fn default() -> Self {
        Self::new(DEFAULT_KEY_INTERVAL)
    }
}

async fn drain(state: Arc<Mutex<QueueState>>, key_interval: Duration) {
    loop {
        let next = {
            let mut guard = lock(&state);
            let next = guard.items.pop_front();
            if next.is_none() {
                guard.draining = false;
            }
            next
        };
        let Some(item) = next else {
            return;
        };

        if !item.leading_delay.is_zero() {
            tokio::time::sleep(item.leading_delay).await;
        }
        debug!(
            "Delivering response {} ({}ms after enqueue)",
            item.id,
            (Utc::now() - item.enqueued_at).num_milliseconds()
        );
        if let Err(e) = deliver(&state, &item, key_interval).await {
            warn!("Failed to deliver response {}: {:#}", item.id, e);
        }
    }
}

async fn deliver(
    state: &Mutex<QueueState>,
    item: &QueuedResponse,
    key_interval: Duration,
) -> Result<()> {
    let mut previous_was_keys = false;
    for step in item.payload.steps() {
        match step {
            ResponseStep::Pause(ms) => {
                tokio::time::sleep(Duration::from_millis(ms)).await;
                previous_was_keys = false;
            }
            ResponseStep::Keys(keys) => {
                if previous_was_keys {
                    tokio::time::sleep(key_interval).await;
                }
                let target = lock(state).target.clone();
                let target =
                    target.ok_or_else(|| anyhow::anyhow!("No keystroke target attached"))?;
                target.send_keys(keys.as_bytes())?;
                debug!("Sent {} bytes for response {}", keys.len(), item.id);
                previous_was_keys = true;
            }
        }
    }
    Ok(())
}
