//! Connection supervisor - the reconnect loop.
//!
//! `Disconnected → Connecting → Streaming → Disconnected → ...` until
//! cancelled or an authorization failure, then `Stopped`.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use bindwatch_shared::errors::ForwarderResult;

use crate::engine::{ContainerRuntime, RuntimeConnector};
use crate::registry::ContainerRegistry;
use crate::runtime::types::{ConnectionState, LifecycleEvent};
use crate::watcher::WatchContext;

/// A discovered runtime session.
struct Session {
    runtime: Arc<dyn ContainerRuntime>,
    registry: Arc<ContainerRegistry>,
}

pub(crate) struct Supervisor {
    connector: Arc<dyn RuntimeConnector>,
    ctx: WatchContext,
    retry_interval: Duration,
    cancel: CancellationToken,
    state: watch::Sender<ConnectionState>,
}

impl Supervisor {
    pub(crate) fn new(
        connector: Arc<dyn RuntimeConnector>,
        ctx: WatchContext,
        retry_interval: Duration,
        cancel: CancellationToken,
        state: watch::Sender<ConnectionState>,
    ) -> Self {
        Self {
            connector,
            ctx,
            retry_interval,
            cancel,
            state,
        }
    }

    /// Run until cancelled (`Ok`) or an authorization failure (`Err`).
    pub(crate) async fn run(self) -> ForwarderResult<()> {
        let result = self.run_loop().await;
        self.set_state(ConnectionState::Stopped);
        result
    }

    async fn run_loop(&self) -> ForwarderResult<()> {
        tracing::info!(endpoint = %self.connector.endpoint(), "Watch forwarder starting");

        loop {
            if self.cancel.is_cancelled() {
                return Ok(());
            }

            self.set_state(ConnectionState::Connecting);
            let session = match self.connect_and_discover().await {
                Ok(Some(session)) => session,
                Ok(None) => return Ok(()),
                Err(e) if e.is_unauthorized() => {
                    tracing::error!(error = %e, "Access to container runtime denied");
                    return Err(e);
                }
                Err(e) => {
                    self.set_state(ConnectionState::Disconnected);
                    tracing::warn!(
                        error = %e,
                        "Could not connect to container runtime. Retrying in {} seconds...",
                        self.retry_interval.as_secs_f64()
                    );
                    if !self.backoff().await {
                        return Ok(());
                    }
                    continue;
                }
            };

            self.set_state(ConnectionState::Streaming);
            tracing::info!("Connected to container runtime");

            self.stream_events(&session).await;
            session.registry.dispose().await;

            if self.cancel.is_cancelled() {
                tracing::info!("Watch forwarder stopped");
                return Ok(());
            }

            self.set_state(ConnectionState::Disconnected);
            tracing::warn!("Disconnected from container runtime, reconnecting");
        }
    }

    /// Connect and populate a fresh registry. `Ok(None)` if cancelled midway.
    async fn connect_and_discover(&self) -> ForwarderResult<Option<Session>> {
        let runtime = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Ok(None),
            runtime = self.connector.connect() => runtime?,
        };

        let registry = Arc::new(ContainerRegistry::new(
            Arc::clone(&runtime),
            self.ctx.clone(),
        ));

        let discovered = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            result = registry.initialize() => Some(result),
        };

        match discovered {
            Some(Ok(())) => Ok(Some(Session { runtime, registry })),
            Some(Err(e)) => {
                registry.dispose().await;
                Err(e)
            }
            None => {
                registry.dispose().await;
                Ok(None)
            }
        }
    }

    /// Wait out the retry interval. Returns `false` if cancelled first.
    async fn backoff(&self) -> bool {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(self.retry_interval) => true,
        }
    }

    /// Pump lifecycle events to the registry until the stream ends or
    /// cancellation. Returns once every queued event has been handled.
    async fn stream_events(&self, session: &Session) {
        let mut events = session.runtime.lifecycle_events();
        let (tx, rx) = mpsc::unbounded_channel();
        let dispatcher = tokio::spawn(
            dispatch(Arc::clone(&session.registry), rx, self.cancel.clone())
                .instrument(tracing::Span::current()),
        );

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                item = events.next() => match item {
                    Some(Ok(event)) => {
                        if tx.send(event).is_err() {
                            break;
                        }
                    }
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "Container event stream failed");
                        break;
                    }
                    None => {
                        tracing::debug!("Container event stream ended");
                        break;
                    }
                },
            }
        }

        drop(events);
        drop(tx);
        if let Err(e) = dispatcher.await {
            tracing::warn!(error = %e, "Event dispatcher ended abnormally");
        }
    }

    fn set_state(&self, state: ConnectionState) {
        self.state.send_if_modified(|current| {
            if *current == state {
                return false;
            }
            tracing::debug!(from = %current, to = %state, "Connection state changed");
            *current = state;
            true
        });
    }
}

/// Apply lifecycle events in arrival order, off the stream's context.
async fn dispatch(
    registry: Arc<ContainerRegistry>,
    mut events: mpsc::UnboundedReceiver<LifecycleEvent>,
    cancel: CancellationToken,
) {
    while let Some(event) = events.recv().await {
        if cancel.is_cancelled() {
            break;
        }
        tracing::debug!(event = ?event, "Container event");
        registry.handle_lifecycle_event(event).await;
    }
}
