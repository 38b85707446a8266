//! Client for the Swift compiler-service daemon.
//!
//! The daemon is reached through a C client library loaded at runtime from a
//! dynamic library path. This crate wraps that library behind the
//! [`CompilerService`] trait so the language worker stays generic over the
//! transport and can be tested against an in-process fake.
//!
//! - [`Value`]: owned request/response trees, decoded once at the FFI
//!   boundary so everything above works on plain Rust data.
//! - [`Uid`] / [`Vocabulary`]: opaque identifiers resolved once per loaded
//!   library; never hard-coded integers.
//! - [`DylibService`]: the FFI adapter, deduplicated process-wide by
//!   canonical dylib path.
//! - [`Notification`]: unsolicited daemon messages, including the
//!   synthesized connection-interrupted signal used for crash detection.

mod dylib;
mod error;
mod service;
mod uid;
mod value;

pub use dylib::DylibService;
pub use error::{ServiceError, ServiceResult};
pub use service::{CompilerService, Notification};
pub use uid::{Keys, Kinds, Requests, Uid, Vocabulary};
pub use value::Value;
