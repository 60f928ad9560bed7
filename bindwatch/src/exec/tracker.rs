//! Tracked set of in-flight forwarded commands.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;

/// Set of forwarded command sequences that are currently running.
///
/// Teardown calls [`close_and_drain`](Self::close_and_drain), which refuses new
/// entries and waits until every outstanding [`TrackedProcess`] guard has been
/// dropped.
#[derive(Debug, Default)]
pub struct ProcessTracker {
    state: Mutex<TrackerState>,
    idle: Notify,
}

#[derive(Debug, Default)]
struct TrackerState {
    closed: bool,
    next_id: u64,
    running: HashMap<u64, String>,
}

impl ProcessTracker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register a new in-flight command. Returns `None` once the tracker is closed.
    pub fn track(self: &Arc<Self>, label: impl Into<String>) -> Option<TrackedProcess> {
        let mut state = self.state.lock();
        if state.closed {
            return None;
        }
        let id = state.next_id;
        state.next_id += 1;
        state.running.insert(id, label.into());
        Some(TrackedProcess {
            tracker: Arc::clone(self),
            id,
        })
    }

    pub fn running(&self) -> usize {
        self.state.lock().running.len()
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Labels of running commands, for shutdown diagnostics.
    pub fn running_labels(&self) -> Vec<String> {
        self.state.lock().running.values().cloned().collect()
    }

    /// Refuse new entries and wait for every running command to finish.
    pub async fn close_and_drain(&self) {
        self.state.lock().closed = true;

        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            // Register before checking so a release between check and await is not lost.
            notified.as_mut().enable();

            if self.state.lock().running.is_empty() {
                return;
            }
            notified.await;
        }
    }

    fn release(&self, id: u64) {
        let now_idle = {
            let mut state = self.state.lock();
            state.running.remove(&id);
            state.running.is_empty()
        };
        if now_idle {
            self.idle.notify_waiters();
        }
    }
}

/// Guard for one in-flight command; removes itself from the tracker on drop.
#[derive(Debug)]
pub struct TrackedProcess {
    tracker: Arc<ProcessTracker>,
    id: u64,
}

impl Drop for TrackedProcess {
    fn drop(&mut self) {
        self.tracker.release(self.id);
    }
}
