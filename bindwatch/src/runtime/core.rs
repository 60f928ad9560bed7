//! Public forwarder handle.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use bindwatch_shared::errors::{ForwarderError, ForwarderResult};

use crate::engine::{DockerConnector, RuntimeConnector};
use crate::exec::{CommandExecutor, DockerCliExecutor};
use crate::runtime::options::ForwarderOptions;
use crate::runtime::supervisor::Supervisor;
use crate::runtime::types::ConnectionState;
use crate::watcher::WatchContext;

// ============================================================================
// PUBLIC API
// ============================================================================

/// Handle to a running watch forwarder.
///
/// [`start`](Self::start) spawns the background supervisor;
/// [`stop`](Self::stop) cancels it and waits until every watcher has been
/// disposed and every forwarded command has exited.
///
/// Must be created within a Tokio runtime.
pub struct WatchForwarder {
    endpoint: String,
    cancel: CancellationToken,
    worker: Mutex<Option<JoinHandle<ForwarderResult<()>>>>,
    state: watch::Receiver<ConnectionState>,
}

impl WatchForwarder {
    /// Start forwarding against a Docker-compatible runtime.
    ///
    /// The endpoint comes from the options, then `DOCKER_HOST`, then the
    /// platform default; forwarded commands go through the runtime CLI.
    pub fn start(options: ForwarderOptions) -> ForwarderResult<Self> {
        options.validate()?;
        let endpoint = options.resolved_endpoint();

        let connector = Arc::new(DockerConnector::new(endpoint.clone()));
        let executor = Arc::new(
            DockerCliExecutor::new(options.docker_binary.clone()).with_endpoint(endpoint),
        );

        Self::start_with(options, connector, executor)
    }

    /// Start forwarding with caller-provided runtime and executor.
    pub fn start_with(
        options: ForwarderOptions,
        connector: Arc<dyn RuntimeConnector>,
        executor: Arc<dyn CommandExecutor>,
    ) -> ForwarderResult<Self> {
        options.validate()?;

        let ctx = WatchContext::new(executor, &options);
        Ok(Self::spawn(connector, ctx, &options))
    }

    fn spawn(
        connector: Arc<dyn RuntimeConnector>,
        ctx: WatchContext,
        options: &ForwarderOptions,
    ) -> Self {
        let endpoint = connector.endpoint().to_string();
        let cancel = CancellationToken::new();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);

        let supervisor = Supervisor::new(
            connector,
            ctx,
            options.retry_interval(),
            cancel.clone(),
            state_tx,
        );
        let span = tracing::info_span!("forwarder", endpoint = %endpoint);
        let worker = tokio::spawn(supervisor.run().instrument(span));

        Self {
            endpoint,
            cancel,
            worker: Mutex::new(Some(worker)),
            state: state_rx,
        }
    }

    /// Request shutdown and wait for the supervisor to exit.
    ///
    /// Returns the fatal error that ended the supervisor, if any. Calling it
    /// again after it returned is a no-op.
    pub async fn stop(&self) -> ForwarderResult<()> {
        self.cancel.cancel();

        let worker = self.worker.lock().take();
        match worker {
            Some(worker) => worker
                .await
                .map_err(|e| ForwarderError::Internal(format!("Supervisor task failed: {}", e)))?,
            None => Ok(()),
        }
    }

    /// Resolves once the supervisor has reached [`ConnectionState::Stopped`],
    /// either through [`stop`](Self::stop) or a fatal error.
    pub async fn stopped(&self) {
        let mut state = self.state.clone();
        // The sender only goes away after publishing `Stopped`.
        let _ = state.wait_for(ConnectionState::is_stopped).await;
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Receiver for connection state changes.
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl Drop for WatchForwarder {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl std::fmt::Debug for WatchForwarder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchForwarder")
            .field("endpoint", &self.endpoint)
            .field("state", &self.state())
            .finish()
    }
}
