//! De-duplicated user notification gate
//!
//! Failure notifications can fire from both an RPC response and an
//! overlapping push event for the same underlying fault. The gate suppresses
//! repeats of the same `(task_id, message)` pair inside a cooldown window.

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Default cooldown window between identical notifications
pub const DEFAULT_DEDUP_WINDOW: Duration = Duration::from_secs(5);

#[derive(Debug)]
pub struct NotificationGate {
    window: Duration,
    last_emitted: HashMap<(String, String), Instant>,
}

impl NotificationGate {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_emitted: HashMap::new(),
        }
    }

    /// Returns true when the notification should be surfaced, recording the
    /// emission; returns false while an identical one is still cooling down.
    pub fn should_emit(&mut self, task_id: &str, message: &str) -> bool {
        self.should_emit_at(task_id, message, Instant::now())
    }

    fn should_emit_at(&mut self, task_id: &str, message: &str, now: Instant) -> bool {
        self.prune(now);
        let key = (task_id.to_string(), message.to_string());
        match self.last_emitted.get(&key) {
            Some(last) if now.duration_since(*last) < self.window => false,
            _ => {
                self.last_emitted.insert(key, now);
                true
            }
        }
    }

    fn prune(&mut self, now: Instant) {
        let window = self.window;
        self.last_emitted
            .retain(|_, last| now.duration_since(*last) < window);
    }
}

impl Default for NotificationGate {
    fn default() -> Self {
        Self::new(DEFAULT_DEDUP_WINDOW)
    }
}
