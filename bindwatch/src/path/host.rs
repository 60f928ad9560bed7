//! Runtime-reported bind sources to host paths.

use std::path::PathBuf;

use crate::runtime::types::HostPlatform;

const HOST_MNT_PREFIX: &str = "/host_mnt/";

/// Convert a bind mount source as reported by the runtime into a host path.
///
/// Runtimes on Windows hosts report sources in POSIX form, either
/// `/host_mnt/c/Users/x` or `/c/Users/x`; both become `c:/Users/x`. Sources
/// that are already native, and every source on other platforms, pass through.
pub fn host_source_path(source: &str, platform: HostPlatform) -> PathBuf {
    if platform == HostPlatform::Unix {
        return PathBuf::from(source);
    }

    let remainder = source.strip_prefix(HOST_MNT_PREFIX).or_else(|| source.strip_prefix('/'));

    match remainder.and_then(split_drive) {
        Some((drive, rest)) => PathBuf::from(format!("{}:{}", drive, rest)),
        None => PathBuf::from(source),
    }
}

/// `c/Users/x` → (`c`, `/Users/x`). The drive must be a single ASCII letter
/// followed by a separator or the end of the string.
fn split_drive(s: &str) -> Option<(char, &str)> {
    let mut chars = s.chars();
    let drive = chars.next().filter(char::is_ascii_alphabetic)?;
    let rest = &s[drive.len_utf8()..];
    if rest.is_empty() || rest.starts_with('/') {
        Some((drive, rest))
    } else {
        None
    }
}
