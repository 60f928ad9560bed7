//! Container runtime client boundary.
//!
//! The supervisor and registry only see these traits; [`DockerConnector`] is
//! the production implementation over the Docker Engine API.

mod docker;

pub use docker::{DockerConnector, DockerRuntime};

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;

use bindwatch_shared::errors::ForwarderResult;

use crate::runtime::types::{Container, ContainerID, LifecycleEvent};

/// Live container lifecycle notifications. An `Err` item or the end of the
/// stream both mean the session is gone.
pub type LifecycleStream = BoxStream<'static, ForwarderResult<LifecycleEvent>>;

/// Opens sessions against a container runtime.
#[async_trait]
pub trait RuntimeConnector: Send + Sync {
    /// Endpoint this connector targets, for diagnostics.
    fn endpoint(&self) -> &str;

    /// Open a session. Authorization failures surface as
    /// `ForwarderError::Unauthorized`.
    async fn connect(&self) -> ForwarderResult<Arc<dyn ContainerRuntime>>;
}

/// Query and event capability of a connected runtime session.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Running containers with their bind mounts.
    async fn list_running(&self) -> ForwarderResult<Vec<Container>>;

    /// Current snapshot of one container; `None` if it no longer exists.
    async fn inspect(&self, id: &ContainerID) -> ForwarderResult<Option<Container>>;

    /// Subscribe to container lifecycle events.
    fn lifecycle_events(&self) -> LifecycleStream;
}
