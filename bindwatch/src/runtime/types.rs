//! Core data types for container and connection lifecycle.

use std::fmt;

// ============================================================================
// CONTAINER ID
// ============================================================================

/// Container identifier as reported by the container runtime.
///
/// Opaque to bindwatch; only the 12-character short form is derived for display.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContainerID(String);

impl ContainerID {
    /// Length of the short ID used in diagnostics.
    pub const SHORT_LENGTH: usize = 12;

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short form for display (first 12 characters, or the whole ID if shorter).
    pub fn short(&self) -> &str {
        match self.0.char_indices().nth(Self::SHORT_LENGTH) {
            Some((idx, _)) => &self.0[..idx],
            None => &self.0,
        }
    }
}

impl fmt::Display for ContainerID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for ContainerID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContainerID({})", self.short())
    }
}

impl AsRef<str> for ContainerID {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ContainerID {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ContainerID {
    fn from(id: String) -> Self {
        Self(id)
    }
}

// ============================================================================
// CONTAINER SNAPSHOT
// ============================================================================

/// Bind mount as reported by the runtime, before host path remapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindMount {
    /// Host-side source directory.
    pub source: String,
    /// Container-side destination directory.
    pub destination: String,
}

impl BindMount {
    pub fn new(source: impl Into<String>, destination: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
        }
    }
}

/// Immutable snapshot of a running container taken at discovery time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Container {
    pub id: ContainerID,
    /// Display name without the runtime's leading `/`.
    pub name: String,
    /// Bind mounts in runtime order.
    pub mounts: Vec<BindMount>,
}

impl Container {
    pub fn new(id: impl Into<ContainerID>, name: impl Into<String>, mounts: Vec<BindMount>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            mounts,
        }
    }
}

// ============================================================================
// LIFECYCLE EVENTS
// ============================================================================

/// Container lifecycle notification delivered by the live event stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// Container started (or restarted); its mounts must be re-fetched.
    Started { id: ContainerID },

    /// Container stopped or died.
    Stopped { id: ContainerID },

    /// Any other container action; ignored by the registry.
    Other { action: String, id: ContainerID },
}

impl LifecycleEvent {
    pub fn container_id(&self) -> &ContainerID {
        match self {
            LifecycleEvent::Started { id }
            | LifecycleEvent::Stopped { id }
            | LifecycleEvent::Other { id, .. } => id,
        }
    }
}

// ============================================================================
// CONNECTION STATE
// ============================================================================

/// State of the connection supervisor.
///
/// `Disconnected → Connecting → Streaming → Disconnected → ... → Stopped`.
/// `Stopped` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Streaming,
    Stopped,
}

impl ConnectionState {
    pub fn is_stopped(&self) -> bool {
        matches!(self, ConnectionState::Stopped)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Streaming => "streaming",
            ConnectionState::Stopped => "stopped",
        };
        write!(f, "{}", s)
    }
}

// ============================================================================
// HOST PLATFORM
// ============================================================================

/// Host platform family; decides the default endpoint and bind source remapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostPlatform {
    Windows,
    Unix,
}

impl HostPlatform {
    pub fn current() -> Self {
        if cfg!(windows) {
            HostPlatform::Windows
        } else {
            HostPlatform::Unix
        }
    }
}
