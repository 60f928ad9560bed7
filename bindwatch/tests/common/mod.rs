//! In-memory fakes shared by the integration tests.

#![allow(dead_code)]

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_stream::wrappers::UnboundedReceiverStream;

use bindwatch::{
    CommandExecutor, Container, ContainerID, ContainerRuntime, ExecOutput, ForwarderError,
    ForwarderResult, LifecycleEvent, LifecycleStream, RuntimeConnector,
};

// ============================================================================
// RUNTIME
// ============================================================================

type EventItem = ForwarderResult<LifecycleEvent>;

/// Scriptable container runtime session.
pub struct FakeRuntime {
    containers: Mutex<BTreeMap<ContainerID, Container>>,
    list_error: Mutex<Option<ForwarderError>>,
    inspections: Mutex<Vec<ContainerID>>,
    events_tx: Mutex<Option<mpsc::UnboundedSender<EventItem>>>,
    events_rx: Mutex<Option<mpsc::UnboundedReceiver<EventItem>>>,
}

impl FakeRuntime {
    pub fn new() -> Arc<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            containers: Mutex::new(BTreeMap::new()),
            list_error: Mutex::new(None),
            inspections: Mutex::new(Vec::new()),
            events_tx: Mutex::new(Some(tx)),
            events_rx: Mutex::new(Some(rx)),
        })
    }

    pub fn with_containers(containers: Vec<Container>) -> Arc<Self> {
        let runtime = Self::new();
        for container in containers {
            runtime.put_container(container);
        }
        runtime
    }

    /// Add or replace a running container.
    pub fn put_container(&self, container: Container) {
        self.containers.lock().insert(container.id.clone(), container);
    }

    pub fn remove_container(&self, id: &str) {
        self.containers.lock().remove(&ContainerID::new(id));
    }

    /// Make the next `list_running` fail.
    pub fn fail_listing(&self, err: ForwarderError) {
        *self.list_error.lock() = Some(err);
    }

    pub fn inspections(&self) -> Vec<ContainerID> {
        self.inspections.lock().clone()
    }

    pub fn emit(&self, event: LifecycleEvent) {
        if let Some(tx) = self.events_tx.lock().as_ref() {
            let _ = tx.send(Ok(event));
        }
    }

    pub fn emit_error(&self, err: ForwarderError) {
        if let Some(tx) = self.events_tx.lock().as_ref() {
            let _ = tx.send(Err(err));
        }
    }

    /// End the event stream, as a dropped connection would.
    pub fn end_stream(&self) {
        self.events_tx.lock().take();
    }

    /// Whether the subscriber has dropped the event stream.
    pub fn stream_released(&self) -> bool {
        self.events_tx
            .lock()
            .as_ref()
            .is_none_or(|tx| tx.is_closed())
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn list_running(&self) -> ForwarderResult<Vec<Container>> {
        if let Some(err) = self.list_error.lock().take() {
            return Err(err);
        }
        Ok(self.containers.lock().values().cloned().collect())
    }

    async fn inspect(&self, id: &ContainerID) -> ForwarderResult<Option<Container>> {
        self.inspections.lock().push(id.clone());
        Ok(self.containers.lock().get(id).cloned())
    }

    fn lifecycle_events(&self) -> LifecycleStream {
        match self.events_rx.lock().take() {
            Some(rx) => Box::pin(UnboundedReceiverStream::new(rx)),
            None => Box::pin(futures::stream::empty()),
        }
    }
}

// ============================================================================
// CONNECTOR
// ============================================================================

/// Hands out scripted sessions; unreachable once the script runs out.
#[derive(Default)]
pub struct FakeConnector {
    script: Mutex<VecDeque<ForwarderResult<Arc<FakeRuntime>>>>,
    attempts: Mutex<Vec<Instant>>,
}

impl FakeConnector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push_runtime(&self, runtime: Arc<FakeRuntime>) {
        self.script.lock().push_back(Ok(runtime));
    }

    pub fn push_failure(&self, err: ForwarderError) {
        self.script.lock().push_back(Err(err));
    }

    pub fn attempts(&self) -> usize {
        self.attempts.lock().len()
    }

    pub fn attempt_times(&self) -> Vec<Instant> {
        self.attempts.lock().clone()
    }
}

#[async_trait]
impl RuntimeConnector for FakeConnector {
    fn endpoint(&self) -> &str {
        "fake://runtime"
    }

    async fn connect(&self) -> ForwarderResult<Arc<dyn ContainerRuntime>> {
        self.attempts.lock().push(Instant::now());
        match self.script.lock().pop_front() {
            Some(Ok(runtime)) => Ok(runtime as Arc<dyn ContainerRuntime>),
            Some(Err(err)) => Err(err),
            None => Err(ForwarderError::Connection("runtime unreachable".into())),
        }
    }
}

// ============================================================================
// EXECUTOR
// ============================================================================

/// Records every command; `stat` answers `644`.
#[derive(Default)]
pub struct RecordingExecutor {
    commands: Mutex<Vec<(ContainerID, String)>>,
}

impl RecordingExecutor {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn commands(&self) -> Vec<(ContainerID, String)> {
        self.commands.lock().clone()
    }

    pub fn command_lines(&self) -> Vec<String> {
        self.commands.lock().iter().map(|(_, c)| c.clone()).collect()
    }
}

#[async_trait]
impl CommandExecutor for RecordingExecutor {
    async fn run(&self, container: &ContainerID, command_line: &str) -> ForwarderResult<ExecOutput> {
        self.commands
            .lock()
            .push((container.clone(), command_line.to_string()));
        if command_line.starts_with("stat") {
            Ok(ExecOutput::success("644\n"))
        } else {
            Ok(ExecOutput::success(""))
        }
    }
}

// ============================================================================
// HELPERS
// ============================================================================

/// Poll `condition` every 10ms until it holds or `limit` elapses.
pub async fn eventually(limit: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + limit;
    loop {
        if condition() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
