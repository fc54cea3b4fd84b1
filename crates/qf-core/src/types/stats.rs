//! Point-in-time view of the ingestion counters.

use serde::{Deserialize, Serialize};

use super::enums::ConnectionState;

/// Snapshot returned by `stats()`.
///
/// Counters are monotonic within one start/stop cycle. Readers may observe
/// values that lag the worker by a frame or so.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IngestionStats {
    pub frames_received: u64,
    pub parse_ok: u64,
    pub parse_failed: u64,
    pub dropped_queue_full: u64,
    pub reconnects: u64,
    pub connect_attempts: u64,
    pub subscriber_errors: u64,
    pub heartbeats_received: u64,
    pub price_alerts: u64,
    /// Wall time of the last received frame, ms since epoch. `0` = never.
    pub last_frame_wall_time_ms: u64,
    pub connection_state: ConnectionState,
    pub cache_size: usize,
    pub subscriber_count: usize,
    pub queue_len: usize,
}

impl std::fmt::Display for IngestionStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "state={} frames={} ok={} failed={} queue_drops={} reconnects={} sub_errors={} cache={} subs={}",
            self.connection_state,
            self.frames_received,
            self.parse_ok,
            self.parse_failed,
            self.dropped_queue_full,
            self.reconnects,
            self.subscriber_errors,
            self.cache_size,
            self.subscriber_count,
        )
    }
}
