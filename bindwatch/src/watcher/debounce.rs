//! Per-path debounce table.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

/// Handle for one scheduled corrective action.
#[derive(Debug, Clone)]
pub(crate) struct Scheduled {
    pub(crate) ticket: u64,
    pub(crate) token: CancellationToken,
}

/// Maps host paths to their pending scheduled action.
///
/// At most one action is pending per path. Scheduling a path again cancels
/// the previous handle and installs the new one under the same lock.
#[derive(Debug, Default)]
pub(crate) struct DebounceTable {
    entries: Mutex<DebounceEntries>,
}

#[derive(Debug, Default)]
struct DebounceEntries {
    next_ticket: u64,
    pending: HashMap<PathBuf, Scheduled>,
}

impl DebounceTable {
    /// Install a fresh handle for `path`, cancelling whatever was pending.
    ///
    /// The handle's token is a child of `parent`, so cancelling the parent
    /// cancels every pending action at once.
    pub(crate) fn schedule(&self, path: &Path, parent: &CancellationToken) -> Scheduled {
        let mut entries = self.entries.lock();
        let scheduled = Scheduled {
            ticket: entries.next_ticket,
            token: parent.child_token(),
        };
        entries.next_ticket += 1;

        if let Some(previous) = entries.pending.insert(path.to_path_buf(), scheduled.clone()) {
            previous.token.cancel();
        }
        scheduled
    }

    /// Cancel and forget the pending action for `path`, if any.
    pub(crate) fn cancel(&self, path: &Path) -> bool {
        match self.entries.lock().pending.remove(path) {
            Some(previous) => {
                previous.token.cancel();
                true
            }
            None => false,
        }
    }

    /// Remove the entry for `path` only if it still belongs to `ticket`.
    ///
    /// A fired timer calls this; if the path was rescheduled in the meantime
    /// the newer entry is left alone.
    pub(crate) fn complete(&self, path: &Path, ticket: u64) -> bool {
        let mut entries = self.entries.lock();
        match entries.pending.get(path) {
            Some(current) if current.ticket == ticket => {
                entries.pending.remove(path);
                true
            }
            _ => false,
        }
    }

    /// Cancel every pending action.
    pub(crate) fn cancel_all(&self) {
        let drained: Vec<Scheduled> = {
            let mut entries = self.entries.lock();
            entries.pending.drain().map(|(_, s)| s).collect()
        };
        for scheduled in drained {
            scheduled.token.cancel();
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.lock().pending.len()
    }
}
