//! The Swift language service worker.
//!
//! This crate is the core of swiftls: it owns per-document state, serializes
//! every mutation and daemon round-trip through a single FIFO execution lane,
//! maintains a coherent view of build settings and diagnostics, and drives
//! crash recovery of the out-of-process compiler service. Responses are
//! translated into LSP results with UTF-8/UTF-16-correct position
//! arithmetic.
//!
//! The worker is generic over [`CompilerService`](swiftls_sourcekitd::CompilerService)
//! (FFI adapter in production, scriptable fake in tests) and reports upward
//! through the [`Coordinator`] trait (diagnostics publication, applyEdit,
//! document re-opening after a daemon restart).

pub mod colors;
pub mod completion;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod folding;
pub mod hover;
pub mod refactor;
pub mod symbols;
pub mod tokens;
pub mod worker;

pub use config::WorkerConfig;
pub use error::{WorkerError, WorkerResult};
pub use refactor::{SemanticRefactorCommand, SEMANTIC_REFACTOR_COMMAND};
pub use symbols::SymbolDetails;
pub use worker::{
    server_capabilities, BuildSettings, BuildSettingsChange, CompileCommand, Coordinator, Handled,
    SwiftWorker, WorkerState,
};
