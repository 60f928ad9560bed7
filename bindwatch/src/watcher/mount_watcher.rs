//! Mount watcher - debounced forwarding of host changes into a container.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use bindwatch_shared::constants::commands;
use bindwatch_shared::errors::{ForwarderError, ForwarderResult};

use super::debounce::{DebounceTable, Scheduled};
use super::events::FsEvent;
use super::suppression::SuppressionSet;
use crate::exec::{CommandExecutor, ProcessTracker};
use crate::path::PathTranslator;
use crate::runtime::options::ForwarderOptions;
use crate::runtime::types::{ContainerID, HostPlatform};

// ============================================================================
// CONTEXT
// ============================================================================

/// Dependencies and settings shared by every mount watcher.
#[derive(Clone)]
pub struct WatchContext {
    pub(crate) executor: Arc<dyn CommandExecutor>,
    pub(crate) debounce: Duration,
    pub(crate) settle: Duration,
    pub(crate) platform: HostPlatform,
    pub(crate) action_limit: Option<Arc<Semaphore>>,
}

impl WatchContext {
    pub fn new(executor: Arc<dyn CommandExecutor>, options: &ForwarderOptions) -> Self {
        Self {
            executor,
            debounce: options.debounce(),
            settle: options.settle(),
            platform: HostPlatform::current(),
            action_limit: options
                .max_concurrent_actions
                .map(|limit| Arc::new(Semaphore::new(limit))),
        }
    }

    pub fn platform(&self) -> HostPlatform {
        self.platform
    }
}

impl std::fmt::Debug for WatchContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchContext")
            .field("debounce", &self.debounce)
            .field("settle", &self.settle)
            .field("platform", &self.platform)
            .finish()
    }
}

/// What a single watcher watches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountSpec {
    pub container_id: ContainerID,
    /// Container display name, for diagnostics.
    pub container_name: String,
    /// Existing host directory.
    pub source: PathBuf,
    /// Directory inside the container.
    pub destination: String,
}

// ============================================================================
// MOUNT WATCHER
// ============================================================================

/// Watches one bind mount source and forwards changes into its container.
///
/// Teardown is explicit: call [`dispose`](Self::dispose), which stops new
/// events, waits for in-flight commands and then releases the subscription.
pub struct MountWatcher {
    inner: Arc<WatcherInner>,
    subscription: Mutex<Option<RecommendedWatcher>>,
    pump: Mutex<Option<JoinHandle<()>>>,
    disposed: AtomicBool,
}

struct WatcherInner {
    container_id: ContainerID,
    container_name: String,
    translator: PathTranslator,
    executor: Arc<dyn CommandExecutor>,
    debounce_window: Duration,
    settle: Duration,
    action_limit: Option<Arc<Semaphore>>,

    debounce: DebounceTable,
    suppressed: Arc<SuppressionSet>,
    processes: Arc<ProcessTracker>,

    /// Cancelled on dispose; parent of every pending debounce token.
    shutdown: CancellationToken,
    span: tracing::Span,
}

impl MountWatcher {
    /// Subscribe to host notifications under `spec.source` and start forwarding.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(spec: MountSpec, ctx: &WatchContext) -> ForwarderResult<Self> {
        let translator = PathTranslator::new(
            &spec.source.to_string_lossy(),
            &spec.destination,
            ctx.platform,
        );

        let span = tracing::info_span!(
            "mount_watcher",
            container_id = %spec.container_id.short(),
            container = %spec.container_name,
            source = %translator.source(),
            destination = %translator.destination(),
        );

        let inner = Arc::new(WatcherInner {
            container_id: spec.container_id,
            container_name: spec.container_name,
            translator,
            executor: Arc::clone(&ctx.executor),
            debounce_window: ctx.debounce,
            settle: ctx.settle,
            action_limit: ctx.action_limit.clone(),
            debounce: DebounceTable::default(),
            suppressed: SuppressionSet::new(),
            processes: ProcessTracker::new(),
            shutdown: CancellationToken::new(),
            span: span.clone(),
        });

        let (tx, rx) = mpsc::unbounded_channel();
        let callback_span = span.clone();
        let mut subscription = RecommendedWatcher::new(
            move |result: notify::Result<notify::Event>| match result {
                Ok(event) => {
                    for fs_event in FsEvent::from_notify(event) {
                        // Receiver is gone once the watcher is disposed.
                        let _ = tx.send(fs_event);
                    }
                }
                Err(e) => {
                    let _enter = callback_span.enter();
                    tracing::warn!(error = %e, "Host filesystem notification error");
                }
            },
            notify::Config::default(),
        )
        .map_err(|e| ForwarderError::Watch(format!("Failed to create watcher: {}", e)))?;

        subscription
            .watch(&spec.source, RecursiveMode::Recursive)
            .map_err(|e| {
                ForwarderError::Watch(format!(
                    "Failed to watch {}: {}",
                    spec.source.display(),
                    e
                ))
            })?;

        let pump = tokio::spawn(Self::pump(Arc::clone(&inner), rx).instrument(span.clone()));

        span.in_scope(|| {
            tracing::info!(
                "Watching {} for {}:{}",
                inner.translator.source(),
                inner.container_name,
                inner.translator.destination()
            )
        });

        Ok(Self {
            inner,
            subscription: Mutex::new(Some(subscription)),
            pump: Mutex::new(Some(pump)),
            disposed: AtomicBool::new(false),
        })
    }

    async fn pump(inner: Arc<WatcherInner>, mut events: mpsc::UnboundedReceiver<FsEvent>) {
        loop {
            tokio::select! {
                biased;
                _ = inner.shutdown.cancelled() => break,
                event = events.recv() => match event {
                    Some(event) => inner.handle_event(event),
                    None => break,
                },
            }
        }
    }

    /// Handle one host filesystem event.
    ///
    /// The subscription pump calls this for every notification; other event
    /// sources may feed it directly. Ignored once disposal has begun.
    pub fn handle_event(&self, event: FsEvent) {
        self.inner.handle_event(event);
    }

    pub fn container_id(&self) -> &ContainerID {
        &self.inner.container_id
    }

    pub fn container_name(&self) -> &str {
        &self.inner.container_name
    }

    /// Host source root, with trailing separator.
    pub fn source(&self) -> &str {
        self.inner.translator.source()
    }

    /// Container destination root, with trailing separator.
    pub fn destination(&self) -> &str {
        self.inner.translator.destination()
    }

    /// Number of paths with a scheduled, not yet fired, action.
    pub fn pending_count(&self) -> usize {
        self.inner.debounce.len()
    }

    /// Number of corrective actions currently running.
    pub fn in_flight(&self) -> usize {
        self.inner.processes.running()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    /// Stop watching.
    ///
    /// Order: stop accepting events and cancel pending timers, wait for every
    /// in-flight forwarded command to exit, then release the host subscription.
    /// Calling it again is a no-op.
    pub async fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }

        let inner = &self.inner;
        inner.shutdown.cancel();
        inner.debounce.cancel_all();

        let running = inner.processes.running_labels();
        if !running.is_empty() {
            inner.span.in_scope(|| {
                tracing::info!(
                    commands = ?running,
                    "Waiting for {} forwarded command(s) to finish",
                    running.len()
                )
            });
        }
        inner.processes.close_and_drain().await;

        let pump = self.pump.lock().take();
        if let Some(pump) = pump
            && let Err(e) = pump.await
        {
            inner
                .span
                .in_scope(|| tracing::warn!(error = %e, "Event pump ended abnormally"));
        }

        let subscription = self.subscription.lock().take();
        drop(subscription);

        inner.span.in_scope(|| {
            tracing::info!(
                "Stopped watching {} for {}:{}",
                inner.translator.source(),
                inner.container_name,
                inner.translator.destination()
            )
        });
    }
}

impl Drop for MountWatcher {
    fn drop(&mut self) {
        // Stops the pump and pending timers of a watcher that was never disposed.
        self.inner.shutdown.cancel();
    }
}

impl std::fmt::Debug for MountWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MountWatcher")
            .field("container_id", &self.inner.container_id)
            .field("source", &self.inner.translator.source())
            .field("destination", &self.inner.translator.destination())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

// ============================================================================
// EVENT HANDLING
// ============================================================================

impl WatcherInner {
    fn handle_event(self: &Arc<Self>, event: FsEvent) {
        if self.shutdown.is_cancelled() {
            return;
        }

        match event {
            FsEvent::Created(path) | FsEvent::Modified(path) => self.schedule(path),
            FsEvent::Renamed { from, to } => {
                self.debounce.cancel(&from);
                self.schedule(to);
            }
            FsEvent::Removed(path) => {
                self.debounce.cancel(&path);
                // The deleted path has no container counterpart left; touch the
                // closest directory that still exists instead.
                match nearest_existing_ancestor(&path) {
                    Some(ancestor) => self.schedule(ancestor),
                    None => tracing::debug!(
                        path = %path.display(),
                        "No existing ancestor for deleted path, dropping event"
                    ),
                }
            }
        }
    }

    fn schedule(self: &Arc<Self>, path: PathBuf) {
        let Some(container_path) = self.translator.translate(&path) else {
            tracing::debug!(path = %path.display(), "Path outside mount source, dropping event");
            return;
        };

        if self.suppressed.contains(&container_path) {
            tracing::trace!(path = %container_path, "Suppressed echo of forwarded command");
            return;
        }

        let scheduled = self.debounce.schedule(&path, &self.shutdown);
        let inner = Arc::clone(self);
        tokio::spawn(
            async move { inner.fire(path, scheduled).await }.instrument(self.span.clone()),
        );
    }

    async fn fire(self: Arc<Self>, path: PathBuf, scheduled: Scheduled) {
        tokio::select! {
            biased;
            _ = scheduled.token.cancelled() => return,
            _ = tokio::time::sleep(self.debounce_window) => {}
        }

        // Rescheduled or cancelled after the timer elapsed: the newer entry wins.
        if !self.debounce.complete(&path, scheduled.ticket) {
            return;
        }

        self.forward(&path).await;
    }

    /// Reapply the path's permission bits inside the container.
    async fn forward(&self, host_path: &Path) {
        let Some(container_path) = self.translator.translate(host_path) else {
            return;
        };

        let Some(_tracked) = self.processes.track(container_path.clone()) else {
            return;
        };

        let _permit = match &self.action_limit {
            Some(limit) => tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => return,
                permit = Arc::clone(limit).acquire_owned() => match permit {
                    Ok(permit) => Some(permit),
                    Err(_) => return,
                },
            },
            None => None,
        };

        let stat = format!("{} {}", commands::STAT_MODE, container_path);
        let output = match self.executor.run(&self.container_id, &stat).await {
            Ok(output) if output.success => output,
            Ok(output) => {
                tracing::warn!(
                    path = %container_path,
                    exit_code = ?output.exit_code,
                    stderr = %output.stderr.trim(),
                    "Error getting permissions of {}",
                    container_path
                );
                return;
            }
            Err(e) => {
                tracing::warn!(path = %container_path, error = %e, "Failed to run stat");
                return;
            }
        };

        let Some(mode) = permission_bits(&output.stdout) else {
            tracing::warn!(
                path = %container_path,
                "Could not get permission from stat's return: {:?}",
                output.stdout
            );
            return;
        };

        if self.shutdown.is_cancelled() {
            tracing::debug!(path = %container_path, "Watcher stopping, skipping chmod");
            return;
        }

        let chmod = format!("{} {} {}", commands::CHMOD, mode, container_path);
        let _suppressed = self.suppressed.hold(&container_path);
        match self.executor.run(&self.container_id, &chmod).await {
            Ok(output) if output.success => {
                tracing::debug!(path = %container_path, mode = %mode, "Forwarded change");
                // Keep the path suppressed briefly so a late echo is discarded.
                tokio::select! {
                    biased;
                    _ = self.shutdown.cancelled() => {}
                    _ = tokio::time::sleep(self.settle) => {}
                }
            }
            Ok(output) => tracing::warn!(
                path = %container_path,
                exit_code = ?output.exit_code,
                "chmod failed: {}",
                output.stderr.trim()
            ),
            Err(e) => tracing::warn!(path = %container_path, error = %e, "Failed to run chmod"),
        }
    }
}

/// Closest ancestor of `path` that still exists as a directory.
fn nearest_existing_ancestor(path: &Path) -> Option<PathBuf> {
    let mut current = path.parent();
    while let Some(dir) = current {
        if dir.is_dir() {
            return Some(dir.to_path_buf());
        }
        current = dir.parent();
    }
    None
}

/// Permission mode to reapply, parsed from `stat -c%a` output.
///
/// Output shorter than 3 characters (after trimming) is malformed. The first 3
/// characters are used, which must be octal digits; a 4-digit octal mode
/// (setuid/setgid/sticky set) is kept whole so the special bits survive.
///
/// This is stricter than taking any 3 leading characters: non-octal output is
/// rejected and a special-bits mode is not truncated, since `chmod 755` on a
/// `4755` file would clear setuid.
pub fn permission_bits(stat_output: &str) -> Option<String> {
    let trimmed = stat_output.trim();
    let is_octal = |s: &str| s.chars().all(|c| ('0'..='7').contains(&c));

    if trimmed.len() < 3 || !trimmed.is_char_boundary(3) {
        return None;
    }
    if trimmed.len() == 4 && is_octal(trimmed) {
        return Some(trimmed.to_string());
    }

    let mode = &trimmed[..3];
    is_octal(mode).then(|| mode.to_string())
}
