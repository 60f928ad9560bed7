//! Docker Engine API adapter.

use std::sync::Arc;

use async_trait::async_trait;
use bollard::errors::Error as BollardError;
use bollard::models::{EventMessage, EventMessageTypeEnum, MountPoint, MountPointTypeEnum};
use bollard::query_parameters::{EventsOptions, InspectContainerOptions, ListContainersOptions};
use bollard::{API_DEFAULT_VERSION, Docker};
use futures::StreamExt;

use bindwatch_shared::errors::{ForwarderError, ForwarderResult};

use super::{ContainerRuntime, LifecycleStream, RuntimeConnector};
use crate::runtime::types::{BindMount, Container, ContainerID, LifecycleEvent};

const CONNECT_TIMEOUT_SECS: u64 = 120;

// ============================================================================
// CONNECTOR
// ============================================================================

/// Connects to a Docker-compatible engine at a fixed endpoint.
#[derive(Debug, Clone)]
pub struct DockerConnector {
    endpoint: String,
}

impl DockerConnector {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
        }
    }

    fn client(&self) -> ForwarderResult<Docker> {
        let endpoint = self.endpoint.as_str();
        let client = if endpoint.starts_with("tcp://") || endpoint.starts_with("http://") {
            Docker::connect_with_http(endpoint, CONNECT_TIMEOUT_SECS, API_DEFAULT_VERSION)
        } else {
            Docker::connect_with_socket(endpoint, CONNECT_TIMEOUT_SECS, API_DEFAULT_VERSION)
        };
        client.map_err(|e| classify_error(&format!("Failed to connect to {}", endpoint), e))
    }
}

#[async_trait]
impl RuntimeConnector for DockerConnector {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn connect(&self) -> ForwarderResult<Arc<dyn ContainerRuntime>> {
        let docker = self.client()?;
        docker.ping().await.map_err(|e| {
            classify_error(&format!("Container runtime at {} not reachable", self.endpoint), e)
        })?;

        tracing::debug!(endpoint = %self.endpoint, "Connected to container runtime");
        Ok(Arc::new(DockerRuntime::new(docker)))
    }
}

// ============================================================================
// RUNTIME SESSION
// ============================================================================

/// A connected Docker client.
#[derive(Debug, Clone)]
pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    pub fn new(docker: Docker) -> Self {
        Self { docker }
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn list_running(&self) -> ForwarderResult<Vec<Container>> {
        let summaries = self
            .docker
            .list_containers(None::<ListContainersOptions>)
            .await
            .map_err(|e| classify_error("Failed to list containers", e))?;

        Ok(summaries
            .into_iter()
            .filter_map(|summary| {
                let id = summary.id?;
                let name = summary
                    .names
                    .as_ref()
                    .and_then(|names| names.first())
                    .map(|name| display_name(name))
                    .unwrap_or_default();
                Some(Container::new(id, name, bind_mounts(summary.mounts)))
            })
            .collect())
    }

    async fn inspect(&self, id: &ContainerID) -> ForwarderResult<Option<Container>> {
        let response = match self
            .docker
            .inspect_container(id.as_str(), None::<InspectContainerOptions>)
            .await
        {
            Ok(response) => response,
            Err(e) => {
                return match classify_error(&format!("Failed to inspect {}", id.short()), e) {
                    ForwarderError::NotFound(_) => Ok(None),
                    other => Err(other),
                };
            }
        };

        let container_id = response.id.unwrap_or_else(|| id.as_str().to_string());
        let name = response.name.as_deref().map(display_name).unwrap_or_default();
        Ok(Some(Container::new(
            container_id,
            name,
            bind_mounts(response.mounts),
        )))
    }

    fn lifecycle_events(&self) -> LifecycleStream {
        let docker = self.docker.clone();
        Box::pin(async_stream::stream! {
            let mut events = Box::pin(docker.events(None::<EventsOptions>));
            while let Some(item) = events.next().await {
                match item {
                    Ok(message) => {
                        if let Some(event) = lifecycle_event(&message) {
                            yield Ok(event);
                        }
                    }
                    Err(e) => {
                        yield Err(classify_error("Event stream failed", e));
                        break;
                    }
                }
            }
        })
    }
}

// ============================================================================
// MAPPING
// ============================================================================

/// Runtime names carry a leading `/`.
fn display_name(name: &str) -> String {
    name.trim_start_matches('/').to_string()
}

fn bind_mounts(mounts: Option<Vec<MountPoint>>) -> Vec<BindMount> {
    mounts
        .unwrap_or_default()
        .into_iter()
        .filter(|mount| mount.typ == Some(MountPointTypeEnum::BIND))
        .filter_map(|mount| Some(BindMount::new(mount.source?, mount.destination?)))
        .collect()
}

fn lifecycle_event(message: &EventMessage) -> Option<LifecycleEvent> {
    if message.typ != Some(EventMessageTypeEnum::CONTAINER) {
        return None;
    }

    let id = ContainerID::new(message.actor.as_ref()?.id.clone()?);
    let action = message.action.as_deref().unwrap_or_default();

    Some(match action {
        "start" => LifecycleEvent::Started { id },
        // A crashed container only reports `die`.
        "stop" | "die" => LifecycleEvent::Stopped { id },
        other => LifecycleEvent::Other {
            action: other.to_string(),
            id,
        },
    })
}

/// Map a client error onto the forwarder taxonomy.
fn classify_error(context: &str, err: BollardError) -> ForwarderError {
    match &err {
        BollardError::DockerResponseServerError {
            status_code: 401 | 403,
            message,
        } => ForwarderError::Unauthorized(format!("{}: {}", context, message)),
        BollardError::DockerResponseServerError {
            status_code: 404,
            message,
        } => ForwarderError::NotFound(format!("{}: {}", context, message)),
        BollardError::IOError { err: io } if io.kind() == std::io::ErrorKind::PermissionDenied => {
            ForwarderError::Unauthorized(format!("{}: {}", context, io))
        }
        _ if permission_denied(&err) => {
            ForwarderError::Unauthorized(format!("{}: {}", context, err))
        }
        _ => ForwarderError::Connection(format!("{}: {}", context, err)),
    }
}

/// Whether an OS permission-denied error appears anywhere in the source chain.
fn permission_denied(err: &(dyn std::error::Error + 'static)) -> bool {
    let mut current = Some(err);
    while let Some(e) = current {
        if let Some(io) = e.downcast_ref::<std::io::Error>()
            && io.kind() == std::io::ErrorKind::PermissionDenied
        {
            return true;
        }
        current = e.source();
    }
    false
}
