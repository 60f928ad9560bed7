//! Host ↔ container path handling.
//!
//! - [`PathTranslator`] maps host paths under a bind source to container paths
//!   under its destination, escaped for use as a single shell word.
//! - [`host_source_path`] turns a runtime-reported bind source into a path the
//!   host filesystem understands.

mod host;
mod translate;

pub use host::host_source_path;
pub use translate::{PathTranslator, escape_shell_word, with_trailing_separator};
