//! Typed error definitions for the quote feed.
//!
//! Errors are split by scope. [`FeedError`] ends a connection (or, for
//! `Config`, refuses to start one). [`ParseError`] only ever drops a single
//! frame, and [`SubscriberError`] only ever skips a single callback
//! invocation. All variants implement `std::error::Error` via `thiserror`, so
//! they integrate with `anyhow::Result` in application glue.

use std::io;
use std::time::Duration;

use thiserror::Error;

/// Connection-scoped errors. Any of these ends the current session.
#[derive(Debug, Error)]
pub enum FeedError {
    /// Missing or invalid configuration. Only surfaced by `start()`.
    #[error("config error: {0}")]
    Config(String),

    /// Socket connect, read or write failure.
    #[error("transport error: {0}")]
    Transport(#[from] io::Error),

    /// The upstream violated the framing or liveness contract.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

impl FeedError {
    /// Whether the supervisor should try another session after this error.
    pub fn is_transient(&self) -> bool {
        !matches!(self, Self::Config(_))
    }
}

/// Framing, handshake and liveness violations.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("frame length {len} exceeds ceiling {max}")]
    FrameTooLarge { len: usize, max: usize },

    #[error("no frame received for {0:?}")]
    Idle(Duration),

    #[error("read timed out in the middle of a frame")]
    MidFrameTimeout,

    #[error("upstream closed the connection during the handshake")]
    HandshakeRejected,
}

/// Per-frame failure. The frame is dropped and counted; the session goes on.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),
}

/// The payload could not be turned into a quote at all.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DecodeError {
    #[error("payload is not valid UTF-8")]
    NotUtf8,

    #[error("malformed JSON: {0}")]
    MalformedJson(String),

    #[error("unknown dialect")]
    UnknownDialect,

    #[error("delimited record has {0} fields, need at least 6")]
    TooFewFields(usize),

    #[error("frame checksum mismatch")]
    ChecksumMismatch,
}

/// A decoded quote broke a record invariant.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("empty instrument code")]
    EmptyCode,

    #[error("negative last price {0}")]
    NegativePrice(f64),
}

/// A subscriber callback failed. Caught, counted and logged, never propagated.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SubscriberError {
    #[error("subscriber failed: {0}")]
    Failed(String),

    #[error("subscriber panicked: {0}")]
    Panicked(String),
}
