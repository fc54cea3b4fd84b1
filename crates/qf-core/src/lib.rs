//! # qf-core
//!
//! Core crate for the quote feed, providing:
//!
//! - **Types** (`types`): the normalized `Quote`, market tags, connection states, stats
//! - **Configuration** (`config`): JSON config deserialization and validation
//! - **Error types** (`error`): connection, decode and subscriber errors via thiserror
//! - **Time utilities** (`time_util`): wall-clock timestamps
//! - **Logging** (`logging`): tracing-based structured logging

pub mod config;
pub mod error;
pub mod logging;
pub mod time_util;
pub mod types;

// Re-export types at crate root for convenience.
pub use types::*;
