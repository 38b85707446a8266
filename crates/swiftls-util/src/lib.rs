//! Shared utilities for swiftls.
//!
//! This crate carries the small pieces every other crate needs:
//! - Logging setup for the server process ([`log`])
//! - Pseudo-path derivation and URI helpers ([`path`])

pub mod log;
pub mod path;

pub use path::{pseudo_path, uri_scheme};
