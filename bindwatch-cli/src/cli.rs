//! CLI definition and argument parsing for the bindwatch daemon.

use std::path::PathBuf;

use anyhow::Context;
use bindwatch::ForwarderOptions;
use bindwatch::constants::env;
use clap::{Args, Parser};

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Parser, Debug)]
#[command(
    name = "bindwatch",
    author,
    version,
    about = "Forward host file changes on bind mounts into running containers"
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalFlags,

    #[command(flatten)]
    pub forward: ForwardFlags,
}

// ============================================================================
// GLOBAL FLAGS
// ============================================================================

#[derive(Args, Debug, Clone)]
pub struct GlobalFlags {
    /// Enable debug output
    #[arg(long)]
    pub debug: bool,

    /// Append logs to this file instead of the console
    #[arg(long, value_name = "PATH", env = env::LOG_FILE)]
    pub log_file: Option<PathBuf>,

    /// JSON options file
    #[arg(long, value_name = "PATH", env = env::CONFIG)]
    pub config: Option<PathBuf>,
}

// ============================================================================
// FORWARD FLAGS
// ============================================================================

#[derive(Args, Debug, Clone)]
pub struct ForwardFlags {
    /// Container runtime endpoint (unix://, npipe://, tcp://)
    #[arg(long, value_name = "URL", env = env::DOCKER_HOST)]
    pub docker_host: Option<String>,

    /// Container runtime CLI used to run forwarded commands
    #[arg(long, value_name = "PATH")]
    pub docker_bin: Option<PathBuf>,

    /// Per-path debounce window in milliseconds
    #[arg(long, value_name = "MS")]
    pub debounce_ms: Option<u64>,

    /// Wait between connection attempts in milliseconds
    #[arg(long, value_name = "MS")]
    pub retry_ms: Option<u64>,

    /// Cap on concurrently running forwarded commands
    #[arg(long, value_name = "N")]
    pub max_concurrent_actions: Option<usize>,
}

impl Cli {
    /// Defaults, then the options file, then flags and environment.
    pub fn forwarder_options(&self) -> anyhow::Result<ForwarderOptions> {
        let mut options = match &self.global.config {
            Some(path) => ForwarderOptions::from_file(path)
                .with_context(|| format!("invalid options file {}", path.display()))?,
            None => ForwarderOptions::default(),
        };

        let flags = &self.forward;
        if let Some(host) = flags.docker_host.as_deref().map(str::trim)
            && !host.is_empty()
        {
            options.endpoint = Some(host.to_string());
        }
        if let Some(bin) = &flags.docker_bin {
            options.docker_binary = bin.clone();
        }
        if let Some(ms) = flags.debounce_ms {
            options.debounce_ms = ms;
        }
        if let Some(ms) = flags.retry_ms {
            options.retry_interval_ms = ms;
        }
        if let Some(limit) = flags.max_concurrent_actions {
            options.max_concurrent_actions = Some(limit);
        }

        options.validate()?;
        Ok(options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("bindwatch").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_flags_override_defaults() {
        let cli = parse(&[
            "--docker-host",
            "tcp://10.0.0.2:2375",
            "--debounce-ms",
            "250",
            "--max-concurrent-actions",
            "4",
        ]);
        let options = cli.forwarder_options().unwrap();
        assert_eq!(options.endpoint.as_deref(), Some("tcp://10.0.0.2:2375"));
        assert_eq!(options.debounce_ms, 250);
        assert_eq!(options.max_concurrent_actions, Some(4));
        assert_eq!(options.retry_interval_ms, 3_000);
    }

    #[test]
    fn test_flags_override_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"debounce_ms": 800, "retry_interval_ms": 1000}}"#).unwrap();
        let path = file.path().to_string_lossy().into_owned();

        let cli = parse(&["--config", &path, "--retry-ms", "5000"]);
        let options = cli.forwarder_options().unwrap();
        assert_eq!(options.debounce_ms, 800);
        assert_eq!(options.retry_interval_ms, 5_000);
    }

    #[test]
    fn test_invalid_flag_value_is_rejected() {
        let cli = parse(&["--debounce-ms", "0"]);
        assert!(cli.forwarder_options().is_err());
    }

    #[test]
    fn test_missing_config_file_is_an_error() {
        let cli = parse(&["--config", "/no/such/bindwatch.json"]);
        let err = cli.forwarder_options().unwrap_err();
        assert!(format!("{:#}", err).contains("/no/such/bindwatch.json"));
    }
}
