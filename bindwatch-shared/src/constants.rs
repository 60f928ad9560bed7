//! Constants shared by the library and the daemon binary.

/// Environment variables read by bindwatch.
pub mod env {
    /// Container runtime endpoint override (same variable the docker CLI uses).
    pub const DOCKER_HOST: &str = "DOCKER_HOST";

    /// Path to a JSON options file.
    pub const CONFIG: &str = "BINDWATCH_CONFIG";

    /// Path of an append-only log file.
    pub const LOG_FILE: &str = "BINDWATCH_LOG_FILE";
}

/// Default container runtime endpoints per host platform family.
pub mod endpoints {
    pub const WINDOWS_DEFAULT: &str = "npipe:////./pipe/docker_engine";
    pub const UNIX_DEFAULT: &str = "unix:///var/run/docker.sock";
}

/// Timing defaults.
pub mod timing {
    /// Quiet period a path must observe before its corrective action fires.
    pub const DEBOUNCE_MS: u64 = 500;

    /// Wait between failed connection attempts.
    pub const RETRY_INTERVAL_MS: u64 = 3_000;

    /// How long a forwarded path stays suppressed after a successful command.
    pub const SETTLE_MS: u64 = 100;
}

/// Forwarded command templates.
pub mod commands {
    /// Reads octal permission bits.
    pub const STAT_MODE: &str = "stat -c%a";

    pub const CHMOD: &str = "chmod";
}

/// Log file naming.
pub mod logging {
    pub const APP_DIR: &str = "bindwatch";
    pub const LOGS_DIR: &str = "logs";
    pub const LOG_FILE: &str = "bindwatch.log";
}
