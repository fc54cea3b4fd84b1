//! Core data types: the normalized quote record, enums, and stats snapshots.

pub mod enums;
pub mod quote;
pub mod stats;

pub use enums::*;
pub use quote::*;
pub use stats::*;
