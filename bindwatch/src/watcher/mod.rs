//! Host-side watching of bind mounts.
//!
//! One [`MountWatcher`] runs per (container, bind mount) pair. It subscribes to
//! host filesystem notifications under the mount source, debounces them per
//! path, and forwards a permission reapply into the container so the
//! container's own notification mechanism fires.

mod debounce;
mod events;
mod mount_watcher;
mod suppression;

pub use events::FsEvent;
pub use mount_watcher::{MountSpec, MountWatcher, WatchContext, permission_bits};
