//! Types shared between the bindwatch library and its daemon binary.

pub mod constants;
pub mod errors;

pub use errors::{ForwarderError, ForwarderResult};
