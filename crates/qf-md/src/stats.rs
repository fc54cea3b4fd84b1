//! Live ingestion counters.
//!
//! Plain relaxed atomics: the worker is the only writer for most of them and
//! readers accept slightly stale values.

use std::sync::atomic::{AtomicU64, Ordering};

use qf_core::{ConnectionState, IngestionStats, time_util};

#[derive(Debug, Default)]
pub struct FeedCounters {
    pub frames_received: AtomicU64,
    pub parse_ok: AtomicU64,
    pub parse_failed: AtomicU64,
    pub dropped_queue_full: AtomicU64,
    pub reconnects: AtomicU64,
    pub connect_attempts: AtomicU64,
    pub subscriber_errors: AtomicU64,
    pub heartbeats_received: AtomicU64,
    pub price_alerts: AtomicU64,
    pub last_frame_wall_time_ms: AtomicU64,
}

impl FeedCounters {
    #[inline]
    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn mark_frame(&self) {
        Self::incr(&self.frames_received);
        self.last_frame_wall_time_ms.store(time_util::now_ms(), Ordering::Relaxed);
    }

    /// Zero every counter.
    pub fn reset(&self) {
        for c in [
            &self.frames_received,
            &self.parse_ok,
            &self.parse_failed,
            &self.dropped_queue_full,
            &self.reconnects,
            &self.connect_attempts,
            &self.subscriber_errors,
            &self.heartbeats_received,
            &self.price_alerts,
            &self.last_frame_wall_time_ms,
        ] {
            c.store(0, Ordering::Relaxed);
        }
    }

    /// Counter snapshot. Gauges are supplied by the caller, which owns the
    /// structures they measure.
    pub fn snapshot(
        &self,
        connection_state: ConnectionState,
        cache_size: usize,
        subscriber_count: usize,
        queue_len: usize,
    ) -> IngestionStats {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        IngestionStats {
            frames_received: load(&self.frames_received),
            parse_ok: load(&self.parse_ok),
            parse_failed: load(&self.parse_failed),
            dropped_queue_full: load(&self.dropped_queue_full),
            reconnects: load(&self.reconnects),
            connect_attempts: load(&self.connect_attempts),
            subscriber_errors: load(&self.subscriber_errors),
            heartbeats_received: load(&self.heartbeats_received),
            price_alerts: load(&self.price_alerts),
            last_frame_wall_time_ms: load(&self.last_frame_wall_time_ms),
            connection_state,
            cache_size,
            subscriber_count,
            queue_len,
        }
    }
}
