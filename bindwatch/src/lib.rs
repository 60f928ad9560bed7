//! Bindwatch library.
//!
//! Keeps bind-mounted directories "live" inside containers on hosts where file
//! change notifications do not cross the bind mount. Host changes under each
//! bind source are debounced and forwarded into the container as a permission
//! reapply, which the container's own notification mechanism picks up.

use std::path::{Path, PathBuf};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

pub mod engine;
pub mod exec;
pub mod path;
pub mod registry;
pub mod runtime;
pub mod watcher;

pub use bindwatch_shared::constants;
pub use bindwatch_shared::errors::{ForwarderError, ForwarderResult};
pub use engine::{ContainerRuntime, DockerConnector, LifecycleStream, RuntimeConnector};
pub use exec::{CommandExecutor, DockerCliExecutor, ExecOutput};
pub use registry::ContainerRegistry;
pub use runtime::WatchForwarder;
pub use runtime::options::ForwarderOptions;
pub use runtime::types::{
    BindMount, ConnectionState, Container, ContainerID, HostPlatform, LifecycleEvent,
};
pub use watcher::{FsEvent, MountSpec, MountWatcher, WatchContext};

use bindwatch_shared::constants::logging;

// ============================================================================
// LOGGING
// ============================================================================

/// Where diagnostics go. Chosen once at process start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogTarget {
    /// Human-readable lines on stderr.
    Console,
    /// Append-only log file.
    File(PathBuf),
}

impl LogTarget {
    /// An explicit log file wins; otherwise the console when attached to a
    /// terminal, else the default log file.
    pub fn resolve(log_file: Option<PathBuf>, interactive: bool) -> Self {
        match log_file {
            Some(path) => LogTarget::File(path),
            None if interactive => LogTarget::Console,
            None => LogTarget::File(default_log_path()),
        }
    }
}

/// `<data-local-dir>/bindwatch/logs/bindwatch.log`, falling back to the
/// temp directory when the platform has no data directory.
pub fn default_log_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(logging::APP_DIR)
        .join(logging::LOGS_DIR)
        .join(logging::LOG_FILE)
}

/// Install the global tracing subscriber.
///
/// Filtering uses `RUST_LOG` when set, else `info` (`debug` with `debug`).
/// For [`LogTarget::File`] the returned guard must be held for the process
/// lifetime or buffered lines are lost.
pub fn init_logging(target: &LogTarget, debug: bool) -> ForwarderResult<Option<WorkerGuard>> {
    let default_level = if debug { "debug" } else { "info" };
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    match target {
        LogTarget::Console => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_writer(std::io::stderr)
                        .with_target(false),
                )
                .try_init()
                .map_err(|e| ForwarderError::Internal(format!("Failed to init logging: {}", e)))?;
            Ok(None)
        }
        LogTarget::File(path) => {
            let (dir, file_name) = split_log_path(path)?;
            std::fs::create_dir_all(&dir).map_err(|e| {
                ForwarderError::Config(format!(
                    "Failed to create log directory {}: {}",
                    dir.display(),
                    e
                ))
            })?;

            let file_appender = tracing_appender::rolling::never(&dir, file_name);
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_writer(non_blocking)
                        .with_ansi(false)
                        .with_thread_ids(true),
                )
                .try_init()
                .map_err(|e| ForwarderError::Internal(format!("Failed to init logging: {}", e)))?;
            Ok(Some(guard))
        }
    }
}

fn split_log_path(path: &Path) -> ForwarderResult<(PathBuf, &std::ffi::OsStr)> {
    let file_name = path.file_name().ok_or_else(|| {
        ForwarderError::Config(format!("Log path {} has no file name", path.display()))
    })?;
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    Ok((dir, file_name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_log_file_wins() {
        let target = LogTarget::resolve(Some(PathBuf::from("/tmp/bw.log")), true);
        assert_eq!(target, LogTarget::File(PathBuf::from("/tmp/bw.log")));
    }

    #[test]
    fn test_interactive_logs_to_console() {
        assert_eq!(LogTarget::resolve(None, true), LogTarget::Console);
    }

    #[test]
    fn test_non_interactive_logs_to_default_file() {
        match LogTarget::resolve(None, false) {
            LogTarget::File(path) => {
                assert!(path.ends_with("bindwatch/logs/bindwatch.log"));
            }
            other => panic!("expected file target, got {:?}", other),
        }
    }

    #[test]
    fn test_split_log_path_relative_file() {
        let (dir, name) = split_log_path(Path::new("bw.log")).unwrap();
        assert_eq!(dir, PathBuf::from("."));
        assert_eq!(name, "bw.log");
    }
}
