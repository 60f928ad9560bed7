//! Forwarder runtime: public handle, connection supervisor, options and types.

pub mod core;
pub mod options;
pub mod types;

mod supervisor;

pub use self::core::WatchForwarder;
