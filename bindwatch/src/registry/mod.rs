//! Container registry - the Watch Set kept in sync with container lifecycle.

mod manager;

pub use manager::{ContainerRegistry, watchable_mounts};
