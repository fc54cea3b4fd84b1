//! # qf-md
//!
//! Real-time quote ingestion from a length-prefixed TCP upstream.
//!
//! ## Architecture
//!
//! ```text
//! TCP ─► Framer ─► (checksum) ─► Parser ─► QuoteCache
//!                                     └──► Dispatcher ─► callbacks / pull queue
//! ```
//!
//! One supervisor task owns the connection lifecycle and runs each session
//! inline, so quotes are handled strictly in wire order. [`feed::QuoteFeed`]
//! starts and stops it; [`feed::FeedHandle`] gives any thread read access.
//!
//! ## Modules
//!
//! - [`framer`]: `<u32 LE len><payload>` splitting, optional checksum layout
//! - [`checksum`]: xxHash64 verification of checksummed frames
//! - [`parser`]: delimited and JSON dialects, control frames
//! - [`cache`]: bounded latest-quote map
//! - [`dispatcher`]: subscriber callbacks and the bounded pull queue
//! - [`session`] / [`supervisor`]: one connection / reconnect policy
//! - [`feed`]: the public facade
//! - [`export`]: JSON diagnostics dump

pub mod cache;
pub mod checksum;
pub mod dispatcher;
pub mod export;
pub mod feed;
pub mod framer;
pub mod json_util;
pub mod parser;
pub mod pipeline;
pub mod session;
pub mod state;
pub mod stats;
pub mod supervisor;

#[cfg(test)]
mod test_support;

use async_trait::async_trait;
use qf_core::error::FeedError;

pub use dispatcher::{QuoteCallback, SubscriberId};
pub use feed::{FeedHandle, QuoteFeed};

/// Lifecycle of a market data module as driven by the runner.
///
/// Only `Send` is required (not `Sync`) because modules are accessed
/// sequentially by the runner, never concurrently.
#[async_trait]
pub trait MdModule: Send {
    /// Human-readable module name.
    fn name(&self) -> &str;
    /// Begin ingesting. `Ok(true)` once a session is live or pending.
    async fn start(&mut self) -> Result<bool, FeedError>;
    /// Stop ingesting and wait (bounded) for the worker to exit.
    async fn stop(&mut self);
}
