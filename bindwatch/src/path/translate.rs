//! Host path → container path translation.

use std::path::Path;

use crate::runtime::types::HostPlatform;

/// Translates host paths under a bind source into container paths under the
/// bind destination.
///
/// Both roots carry a trailing `/` so prefix matching never confuses
/// `/data/app` with `/data/application`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathTranslator {
    source: String,
    destination: String,
    platform: HostPlatform,
}

impl PathTranslator {
    pub fn new(source: &str, destination: &str, platform: HostPlatform) -> Self {
        let source = normalize_separators(source, platform);
        Self {
            source: with_trailing_separator(&source),
            destination: with_trailing_separator(destination),
            platform,
        }
    }

    /// Host source root, with trailing separator.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Container destination root, with trailing separator.
    pub fn destination(&self) -> &str {
        &self.destination
    }

    /// Container path for `host_path`, escaped for shell-word usage.
    ///
    /// Returns `None` when the path is not under the source root.
    pub fn translate(&self, host_path: &Path) -> Option<String> {
        let host = normalize_separators(&host_path.to_string_lossy(), self.platform);

        let rest = match host.strip_prefix(self.source.as_str()) {
            Some(rest) => rest,
            None if host == self.source.trim_end_matches('/') => "",
            None => return None,
        };

        Some(escape_shell_word(&format!("{}{}", self.destination, rest)))
    }
}

/// Append `/` unless the path already ends with a separator.
pub fn with_trailing_separator(path: &str) -> String {
    if path.ends_with('/') || path.ends_with('\\') {
        path.to_string()
    } else {
        format!("{}/", path)
    }
}

/// Containers use POSIX separators. Only Windows hosts produce `\`; on other
/// hosts a backslash is a legal filename character and is left for escaping.
fn normalize_separators(path: &str, platform: HostPlatform) -> String {
    match platform {
        HostPlatform::Windows => path.replace('\\', "/"),
        HostPlatform::Unix => path.to_string(),
    }
}

/// Escape whitespace, glob wildcards and shell metacharacters so the path is
/// read back as one literal word by `sh`.
pub fn escape_shell_word(path: &str) -> String {
    let mut escaped = String::with_capacity(path.len());
    for c in path.chars() {
        match c {
            // backslash-newline is a line continuation, so quote it instead
            '\n' => escaped.push_str("'\n'"),
            ' ' | '\t' | '*' | '?' | '[' | ']' | '\\' | '\'' | '"' | '$' | '`' | ';' | '&'
            | '|' | '<' | '>' | '(' | ')' | '{' | '}' | '!' | '#' | '~' => {
                escaped.push('\\');
                escaped.push(c);
            }
            _ => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn unix(source: &str, destination: &str) -> PathTranslator {
        PathTranslator::new(source, destination, HostPlatform::Unix)
    }

    #[test]
    fn test_roots_get_trailing_separator() {
        let translator = unix("/data/app", "/srv/app");
        assert_eq!(translator.source(), "/data/app/");
        assert_eq!(translator.destination(), "/srv/app/");
    }

    #[test]
    fn test_translate_file_under_source() {
        let translator = unix("/data/app/", "/srv/app/");
        let translated = translator.translate(&PathBuf::from("/data/app/config.yml"));
        assert_eq!(translated.as_deref(), Some("/srv/app/config.yml"));
    }

    #[test]
    fn test_translate_nested_path() {
        let translator = unix("/data/app", "/srv/app");
        let translated = translator.translate(&PathBuf::from("/data/app/src/lib/main.rs"));
        assert_eq!(translated.as_deref(), Some("/srv/app/src/lib/main.rs"));
    }

    #[test]
    fn test_translate_source_root_itself() {
        let translator = unix("/data/app", "/srv/app");
        let translated = translator.translate(&PathBuf::from("/data/app"));
        assert_eq!(translated.as_deref(), Some("/srv/app/"));
    }

    #[test]
    fn test_translate_rejects_sibling_with_shared_prefix() {
        let translator = unix("/data/app", "/srv/app");
        assert!(translator.translate(&PathBuf::from("/data/application/x")).is_none());
        assert!(translator.translate(&PathBuf::from("/etc/passwd")).is_none());
    }

    #[test]
    fn test_translate_escapes_spaces_and_wildcards() {
        let translator = unix("/data/app", "/srv/app");
        let translated = translator.translate(&PathBuf::from("/data/app/my file*.txt"));
        assert_eq!(translated.as_deref(), Some(r"/srv/app/my\ file\*.txt"));
    }

    #[test]
    fn test_windows_separators_are_normalized() {
        let translator = PathTranslator::new(r"c:/Users/dev/app", "/srv/app", HostPlatform::Windows);
        let translated = translator.translate(&PathBuf::from(r"c:/Users/dev/app\src\index.js"));
        assert_eq!(translated.as_deref(), Some("/srv/app/src/index.js"));
    }

    #[test]
    fn test_escape_shell_metacharacters() {
        assert_eq!(escape_shell_word("a;b&c"), r"a\;b\&c");
        assert_eq!(escape_shell_word("$(rm)"), r"\$\(rm\)");
        assert_eq!(escape_shell_word("plain-name_1.0+x"), "plain-name_1.0+x");
    }

    #[test]
    fn test_escape_newline_is_quoted() {
        assert_eq!(escape_shell_word("a\nb"), "a'\n'b");
    }
}
