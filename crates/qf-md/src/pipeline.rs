//! The per-frame processing chain and the state it shares.
//!
//! [`Pipeline`] bundles everything a session needs besides its socket:
//! config, cache, dispatcher, counters and the connection state cell. The
//! supervisor task and the public handles all hold it through an `Arc`.
//!
//! # Per-frame flow
//!
//! ```text
//! RawFrame ──► checksum::verify ──► parser::parse_payload ──► QuoteCache::put
//!                                                        └──► Dispatcher::dispatch
//! ```
//!
//! Every frame error is absorbed here; nothing in this module can end a
//! session.

use std::sync::Arc;

use qf_core::config::FeedConfig;
use qf_core::error::ParseError;
use qf_core::{IngestionStats, Quote};
use tracing::{debug, trace};

use crate::cache::QuoteCache;
use crate::checksum;
use crate::dispatcher::Dispatcher;
use crate::framer::RawFrame;
use crate::parser::{self, ControlFrame, Parsed};
use crate::state::StateCell;
use crate::stats::FeedCounters;

/// What a single frame turned into.
#[derive(Debug, Clone, PartialEq)]
pub enum FrameOutcome {
    /// Zero-length payload.
    Empty,
    /// A heartbeat control frame; not forwarded.
    Control(ControlFrame),
    /// A quote that reached the cache and subscribers.
    Quote(Arc<Quote>),
    /// Dropped as undecodable or invalid.
    Dropped(ParseError),
}

pub struct Pipeline {
    pub config: FeedConfig,
    pub cache: QuoteCache,
    pub dispatcher: Dispatcher,
    pub counters: Arc<FeedCounters>,
    pub state: StateCell,
}

impl Pipeline {
    pub fn new(config: FeedConfig) -> Self {
        let counters = Arc::new(FeedCounters::default());
        Self {
            cache: QuoteCache::new(config.cache_capacity),
            dispatcher: Dispatcher::new(config.label.clone(), config.queue_capacity, Arc::clone(&counters)),
            state: StateCell::new(config.label.clone()),
            counters,
            config,
        }
    }

    pub fn label(&self) -> &str {
        &self.config.label
    }

    /// Count, decode and fan out one received frame.
    pub fn process_frame(&self, frame: RawFrame) -> FrameOutcome {
        self.counters.mark_frame();

        if let Err(e) = checksum::verify(&frame) {
            return self.drop_frame(e.into());
        }
        if frame.data.is_empty() {
            trace!("[{}] empty frame", self.label());
            return FrameOutcome::Empty;
        }

        match parser::parse_payload(&frame.data, self.config.keep_raw) {
            Ok(Parsed::Quote(quote)) => {
                FeedCounters::incr(&self.counters.parse_ok);
                if quote.last_price > self.config.price_alert_threshold {
                    FeedCounters::incr(&self.counters.price_alerts);
                    debug!("[{}] price alert: {quote}", self.label());
                }
                let quote = Arc::new(quote);
                for old in self.cache.put(Arc::clone(&quote)) {
                    trace!("[{}] evicted {}", self.label(), old.code);
                }
                self.dispatcher.dispatch(&quote);
                FrameOutcome::Quote(quote)
            }
            Ok(Parsed::Control(ctl)) => {
                FeedCounters::incr(&self.counters.heartbeats_received);
                trace!("[{}] control frame {ctl:?}", self.label());
                FrameOutcome::Control(ctl)
            }
            Err(e) => self.drop_frame(e),
        }
    }

    fn drop_frame(&self, e: ParseError) -> FrameOutcome {
        FeedCounters::incr(&self.counters.parse_failed);
        debug!("[{}] dropped frame: {e}", self.label());
        FrameOutcome::Dropped(e)
    }

    pub fn stats(&self) -> IngestionStats {
        self.counters.snapshot(
            self.state.get(),
            self.cache.len(),
            self.dispatcher.subscriber_count(),
            self.dispatcher.queue_len(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum::checksum_of;
    use qf_core::error::DecodeError;
    use std::sync::atomic::Ordering;

    fn pipeline() -> Pipeline {
        Pipeline::new(FeedConfig::new("127.0.0.1", 9000))
    }

    fn plain(data: &[u8]) -> RawFrame {
        RawFrame { data: data.to_vec(), checksum: None }
    }

    #[test]
    fn valid_frame_updates_cache_queue_and_counters() {
        let p = pipeline();
        let out = p.process_frame(plain(b"SZ000001$PingAn$0$10.0$10.5$9.8$10.3$1000$10300"));
        assert!(matches!(out, FrameOutcome::Quote(_)));
        assert_eq!(p.cache.get("SZ000001").unwrap().last_price, 10.3);
        assert_eq!(p.dispatcher.try_poll().unwrap().code, "SZ000001");

        let s = p.stats();
        assert_eq!((s.frames_received, s.parse_ok, s.parse_failed), (1, 1, 0));
        assert_eq!(s.cache_size, 1);
    }

    #[test]
    fn empty_frame_counts_as_received_only() {
        let p = pipeline();
        assert_eq!(p.process_frame(plain(b"")), FrameOutcome::Empty);
        let s = p.stats();
        assert_eq!((s.frames_received, s.parse_ok, s.parse_failed), (1, 0, 0));
    }

    #[test]
    fn malformed_json_is_counted_and_not_cached() {
        let p = pipeline();
        let out = p.process_frame(plain(br#"{"stock_code":"#));
        assert!(matches!(out, FrameOutcome::Dropped(ParseError::Decode(DecodeError::MalformedJson(_)))));
        let s = p.stats();
        assert_eq!((s.frames_received, s.parse_failed, s.cache_size), (1, 1, 0));
    }

    #[test]
    fn heartbeat_responses_are_not_forwarded() {
        let p = pipeline();
        let out = p.process_frame(plain(br#"{"type":"heartbeat_response"}"#));
        assert_eq!(out, FrameOutcome::Control(ControlFrame::HeartbeatResponse));
        assert_eq!(p.dispatcher.queue_len(), 0);
        let s = p.stats();
        assert_eq!((s.heartbeats_received, s.parse_failed, s.parse_ok), (1, 0, 0));
    }

    #[test]
    fn bad_checksum_drops_frame() {
        let p = pipeline();
        let data = b"SH600000$A$0$1$1$1$1".to_vec();
        let good = RawFrame { checksum: Some(checksum_of(&data).to_vec()), data: data.clone() };
        let bad = RawFrame { checksum: Some(checksum_of(b"other").to_vec()), data };
        assert!(matches!(p.process_frame(good), FrameOutcome::Quote(_)));
        assert_eq!(
            p.process_frame(bad),
            FrameOutcome::Dropped(ParseError::Decode(DecodeError::ChecksumMismatch))
        );
        assert_eq!(p.counters.parse_failed.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn expensive_quotes_are_flagged_but_delivered() {
        let p = pipeline();
        p.process_frame(plain(b"SH600519$Moutai$0$1700$1750$1690$1720.5$10$17205"));
        assert_eq!(p.counters.price_alerts.load(Ordering::Relaxed), 1);
        assert!(p.cache.get("SH600519").is_some());
    }

    #[test]
    fn same_code_keeps_last_in_wire_order() {
        let p = pipeline();
        p.process_frame(plain(b"SH600000$A$0$1$1$1$1.10"));
        p.process_frame(plain(b"SH600000$A$0$1$1$1$1.20"));
        assert_eq!(p.cache.get("SH600000").unwrap().last_price, 1.20);
    }
}
