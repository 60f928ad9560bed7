//! Configuration options for the forwarder.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use bindwatch_shared::constants::{endpoints, env, timing};
use bindwatch_shared::errors::{ForwarderError, ForwarderResult};

use crate::runtime::types::HostPlatform;

/// Options controlling how bindwatch connects and forwards events.
///
/// Every field has a default, so a JSON options file only needs to name the
/// fields it overrides.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForwarderOptions {
    /// Container runtime endpoint. Falls back to `DOCKER_HOST`, then the
    /// platform default.
    pub endpoint: Option<String>,

    /// Container runtime CLI used to run forwarded commands.
    pub docker_binary: PathBuf,

    /// Per-path debounce window in milliseconds.
    pub debounce_ms: u64,

    /// Backoff between failed connection attempts in milliseconds.
    pub retry_interval_ms: u64,

    /// How long a forwarded path stays suppressed after its command succeeds.
    pub settle_ms: u64,

    /// Upper bound on concurrently running corrective actions across all
    /// watchers. `None` leaves it unbounded.
    pub max_concurrent_actions: Option<usize>,
}

impl Default for ForwarderOptions {
    fn default() -> Self {
        Self {
            endpoint: None,
            docker_binary: PathBuf::from("docker"),
            debounce_ms: timing::DEBOUNCE_MS,
            retry_interval_ms: timing::RETRY_INTERVAL_MS,
            settle_ms: timing::SETTLE_MS,
            max_concurrent_actions: None,
        }
    }
}

impl ForwarderOptions {
    /// Load options from a JSON file; missing fields keep their defaults.
    pub fn from_file(path: &Path) -> ForwarderResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            ForwarderError::Config(format!(
                "Failed to read options file {}: {}",
                path.display(),
                e
            ))
        })?;
        let options: Self = serde_json::from_str(&raw)?;
        options.validate()?;
        Ok(options)
    }

    /// Reject values that would make the forwarder spin or stall.
    pub fn validate(&self) -> ForwarderResult<()> {
        if self.debounce_ms == 0 {
            return Err(ForwarderError::Config(
                "debounce_ms must be greater than zero".into(),
            ));
        }
        if self.retry_interval_ms == 0 {
            return Err(ForwarderError::Config(
                "retry_interval_ms must be greater than zero".into(),
            ));
        }
        if self.max_concurrent_actions == Some(0) {
            return Err(ForwarderError::Config(
                "max_concurrent_actions must be at least 1".into(),
            ));
        }
        if self.docker_binary.as_os_str().is_empty() {
            return Err(ForwarderError::Config("docker_binary must not be empty".into()));
        }
        Ok(())
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    /// Endpoint to connect to, resolved against the environment and platform.
    pub fn resolved_endpoint(&self) -> String {
        resolve_endpoint(
            self.endpoint.as_deref(),
            std::env::var(env::DOCKER_HOST).ok().as_deref(),
            HostPlatform::current(),
        )
    }
}

/// Resolve the runtime endpoint: explicit value, then environment, then the
/// platform default. Blank values are skipped.
pub fn resolve_endpoint(
    explicit: Option<&str>,
    from_env: Option<&str>,
    platform: HostPlatform,
) -> String {
    let non_blank = |v: Option<&str>| v.map(str::trim).filter(|v| !v.is_empty()).map(String::from);

    non_blank(explicit)
        .or_else(|| non_blank(from_env))
        .unwrap_or_else(|| match platform {
            HostPlatform::Windows => endpoints::WINDOWS_DEFAULT.to_string(),
            HostPlatform::Unix => endpoints::UNIX_DEFAULT.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_match_documented_timings() {
        let options = ForwarderOptions::default();
        assert_eq!(options.debounce(), Duration::from_millis(500));
        assert_eq!(options.retry_interval(), Duration::from_secs(3));
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_resolve_endpoint_prefers_explicit() {
        let endpoint = resolve_endpoint(
            Some("tcp://10.0.0.1:2375"),
            Some("unix:///custom.sock"),
            HostPlatform::Unix,
        );
        assert_eq!(endpoint, "tcp://10.0.0.1:2375");
    }

    #[test]
    fn test_resolve_endpoint_skips_blank_values() {
        let endpoint = resolve_endpoint(Some("  "), Some(""), HostPlatform::Unix);
        assert_eq!(endpoint, "unix:///var/run/docker.sock");
    }

    #[test]
    fn test_resolve_endpoint_uses_env() {
        let endpoint = resolve_endpoint(None, Some("unix:///custom.sock"), HostPlatform::Windows);
        assert_eq!(endpoint, "unix:///custom.sock");
    }

    #[test]
    fn test_resolve_endpoint_windows_default() {
        let endpoint = resolve_endpoint(None, None, HostPlatform::Windows);
        assert_eq!(endpoint, "npipe:////./pipe/docker_engine");
    }

    #[test]
    fn test_validate_rejects_zero_debounce() {
        let options = ForwarderOptions {
            debounce_ms: 0,
            ..Default::default()
        };
        let err = options.validate().unwrap_err();
        assert!(err.to_string().contains("debounce_ms"));
    }

    #[test]
    fn test_validate_rejects_zero_concurrency_cap() {
        let options = ForwarderOptions {
            max_concurrent_actions: Some(0),
            ..Default::default()
        };
        assert!(options.validate().is_err());
    }

    #[test]
    fn test_from_file_keeps_defaults_for_missing_fields() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"debounce_ms": 250, "endpoint": "unix:///run/podman.sock"}}"#).unwrap();

        let options = ForwarderOptions::from_file(file.path()).unwrap();
        assert_eq!(options.debounce_ms, 250);
        assert_eq!(options.endpoint.as_deref(), Some("unix:///run/podman.sock"));
        assert_eq!(options.retry_interval_ms, 3_000);
        assert_eq!(options.docker_binary, PathBuf::from("docker"));
    }

    #[test]
    fn test_from_file_rejects_invalid_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();

        let err = ForwarderOptions::from_file(file.path()).unwrap_err();
        assert!(matches!(err, ForwarderError::Config(_)));
    }
}
