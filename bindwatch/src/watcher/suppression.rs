//! Feedback suppression for forwarded commands.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

/// Container paths currently being acted on by a forwarded command.
///
/// Host events that translate to a suppressed path are the echo of our own
/// command and must not be forwarded again. Holds are counted so overlapping
/// commands on one path release it only when the last one finishes.
#[derive(Debug, Default)]
pub(crate) struct SuppressionSet {
    paths: Mutex<HashMap<String, usize>>,
}

impl SuppressionSet {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Suppress `container_path` until the returned guard is dropped.
    pub(crate) fn hold(self: &Arc<Self>, container_path: &str) -> SuppressionGuard {
        *self
            .paths
            .lock()
            .entry(container_path.to_string())
            .or_insert(0) += 1;
        SuppressionGuard {
            set: Arc::clone(self),
            path: container_path.to_string(),
        }
    }

    pub(crate) fn contains(&self, container_path: &str) -> bool {
        self.paths.lock().contains_key(container_path)
    }
}

/// Removes its path from the set on drop, whether the command succeeded or not.
#[derive(Debug)]
pub(crate) struct SuppressionGuard {
    set: Arc<SuppressionSet>,
    path: String,
}

impl Drop for SuppressionGuard {
    fn drop(&mut self) {
        let mut paths = self.set.paths.lock();
        if let Some(count) = paths.get_mut(&self.path) {
            *count -= 1;
            if *count == 0 {
                paths.remove(&self.path);
            }
        }
    }
}
