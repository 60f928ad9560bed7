//! Watch Set management.
//!
//! One entry per running container, holding one [`MountWatcher`] per watchable
//! bind mount. All reads and writes of the map go through a single lock;
//! watchers are always disposed after the lock is released, since disposal
//! waits for in-flight commands.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;
use parking_lot::Mutex;

use bindwatch_shared::errors::ForwarderResult;

use crate::engine::ContainerRuntime;
use crate::path::host_source_path;
use crate::runtime::types::{Container, ContainerID, HostPlatform, LifecycleEvent};
use crate::watcher::{MountSpec, MountWatcher, WatchContext};

/// Registry of mount watchers for one runtime session.
pub struct ContainerRegistry {
    runtime: Arc<dyn ContainerRuntime>,
    ctx: WatchContext,
    watch_set: Mutex<WatchSet>,
}

#[derive(Default)]
struct WatchSet {
    disposed: bool,
    entries: HashMap<ContainerID, Vec<MountWatcher>>,
}

impl std::fmt::Debug for ContainerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let set = self.watch_set.lock();
        f.debug_struct("ContainerRegistry")
            .field("containers", &set.entries.len())
            .field("disposed", &set.disposed)
            .finish()
    }
}

impl ContainerRegistry {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, ctx: WatchContext) -> Self {
        Self {
            runtime,
            ctx,
            watch_set: Mutex::new(WatchSet::default()),
        }
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Discover running containers and start watching their bind mounts.
    ///
    /// Fails only if the runtime cannot be listed; unwatchable mounts are
    /// skipped.
    pub async fn initialize(&self) -> ForwarderResult<()> {
        let containers = self.runtime.list_running().await?;
        let discovered = containers.len();

        for container in containers {
            let watchers = self.build_watchers(&container);
            self.install(container.id, watchers).await;
        }

        tracing::info!(
            containers = discovered,
            watched = self.watch_set.lock().entries.len(),
            "Container discovery complete"
        );
        Ok(())
    }

    /// Apply one lifecycle event. Failures are logged and absorbed.
    pub async fn handle_lifecycle_event(&self, event: LifecycleEvent) {
        match event {
            LifecycleEvent::Started { id } => self.on_started(id).await,
            LifecycleEvent::Stopped { id } => self.on_stopped(&id).await,
            LifecycleEvent::Other { action, id } => {
                tracing::trace!(container_id = %id.short(), action = %action, "Ignoring container event");
            }
        }
    }

    /// Dispose every watcher and refuse further installs. Idempotent.
    pub async fn dispose(&self) {
        let drained: Vec<(ContainerID, Vec<MountWatcher>)> = {
            let mut set = self.watch_set.lock();
            set.disposed = true;
            set.entries.drain().collect()
        };

        if drained.is_empty() {
            return;
        }

        tracing::debug!(containers = drained.len(), "Disposing all mount watchers");
        join_all(
            drained
                .iter()
                .flat_map(|(_, watchers)| watchers.iter().map(MountWatcher::dispose)),
        )
        .await;
    }

    // ========================================================================
    // Introspection
    // ========================================================================

    /// IDs of containers with an installed entry, sorted.
    pub fn watched_containers(&self) -> Vec<ContainerID> {
        let mut ids: Vec<_> = self.watch_set.lock().entries.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Number of live watchers for `id`.
    pub fn watcher_count(&self, id: &ContainerID) -> usize {
        self.watch_set
            .lock()
            .entries
            .get(id)
            .map_or(0, Vec::len)
    }

    /// `(source, destination)` of each live watcher for `id`.
    pub fn watched_mounts(&self, id: &ContainerID) -> Vec<(String, String)> {
        self.watch_set
            .lock()
            .entries
            .get(id)
            .map(|watchers| {
                watchers
                    .iter()
                    .map(|w| (w.source().to_string(), w.destination().to_string()))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn is_disposed(&self) -> bool {
        self.watch_set.lock().disposed
    }

    // ========================================================================
    // Event handlers
    // ========================================================================

    async fn on_started(&self, id: ContainerID) {
        if self.is_disposed() {
            return;
        }

        // Mounts are only reported once the container is running, so always
        // re-query instead of reusing an earlier snapshot.
        let container = match self.runtime.inspect(&id).await {
            Ok(Some(container)) => container,
            Ok(None) => {
                tracing::debug!(container_id = %id.short(), "Started container disappeared, dropping event");
                return;
            }
            Err(e) => {
                tracing::warn!(container_id = %id.short(), error = %e, "Failed to inspect started container");
                return;
            }
        };

        let stale = self.watch_set.lock().entries.remove(&id);
        if let Some(stale) = stale {
            tracing::debug!(container_id = %id.short(), "Replacing stale watchers");
            dispose_all(&stale).await;
        }

        let watchers = self.build_watchers(&container);
        self.install(id, watchers).await;
    }

    async fn on_stopped(&self, id: &ContainerID) {
        let removed = self.watch_set.lock().entries.remove(id);
        match removed {
            Some(watchers) => {
                dispose_all(&watchers).await;
                tracing::info!(
                    container_id = %id.short(),
                    watchers = watchers.len(),
                    "Container stopped, watchers disposed"
                );
            }
            None => {
                tracing::trace!(container_id = %id.short(), "Stop for unwatched container");
            }
        }
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn build_watchers(&self, container: &Container) -> Vec<MountWatcher> {
        watchable_mounts(container, self.ctx.platform())
            .into_iter()
            .filter_map(|spec| {
                let source = spec.source.clone();
                match MountWatcher::start(spec, &self.ctx) {
                    Ok(watcher) => Some(watcher),
                    Err(e) => {
                        tracing::warn!(
                            container_id = %container.id.short(),
                            source = %source.display(),
                            error = %e,
                            "Failed to watch bind mount"
                        );
                        None
                    }
                }
            })
            .collect()
    }

    /// Install `watchers` as the entry for `id`.
    ///
    /// An entry that raced in since the caller last looked is replaced and
    /// disposed; after [`dispose`](Self::dispose) the new watchers are disposed
    /// instead.
    async fn install(&self, id: ContainerID, watchers: Vec<MountWatcher>) {
        if watchers.is_empty() {
            return;
        }

        let outcome = {
            let mut set = self.watch_set.lock();
            if set.disposed {
                Err(watchers)
            } else {
                Ok(set.entries.insert(id.clone(), watchers))
            }
        };

        match outcome {
            Ok(Some(replaced)) => {
                tracing::debug!(container_id = %id.short(), "Concurrent install replaced");
                dispose_all(&replaced).await;
            }
            Ok(None) => {}
            Err(rejected) => {
                tracing::debug!(container_id = %id.short(), "Registry disposed, discarding watchers");
                dispose_all(&rejected).await;
            }
        }
    }
}

async fn dispose_all(watchers: &[MountWatcher]) {
    join_all(watchers.iter().map(MountWatcher::dispose)).await;
}

/// Bind mounts of `container` whose host source exists as a directory.
///
/// Anything else cannot be watched and is skipped.
pub fn watchable_mounts(container: &Container, platform: HostPlatform) -> Vec<MountSpec> {
    container
        .mounts
        .iter()
        .filter_map(|mount| {
            let source = host_source_path(&mount.source, platform);
            if !source.is_dir() {
                tracing::debug!(
                    container_id = %container.id.short(),
                    source = %mount.source,
                    "Bind source is not a host directory, skipping"
                );
                return None;
            }
            Some(MountSpec {
                container_id: container.id.clone(),
                container_name: container.name.clone(),
                source,
                destination: mount.destination.clone(),
            })
        })
        .collect()
}
