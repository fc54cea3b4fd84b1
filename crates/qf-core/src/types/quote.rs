//! The normalized quote record, the one data type flowing through the feed.
//!
//! Both upstream dialects are mapped onto [`Quote`]. Prices are plain `f64`
//! because the upstream sends decimal text or JSON numbers and downstream
//! consumers only display or compare them.
//!
//! # Timestamp convention
//!
//! `source_recv_time_us` is **microseconds since Unix epoch**, stamped by the
//! parser when the record is produced.

use serde::{Deserialize, Serialize};

use super::enums::Market;
use crate::error::ValidationError;

/// A normalized real-time quote for one instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    /// Instrument code, e.g. `"SH600000"` or `"430047"`. Unique cache key.
    pub code: String,
    /// Display name. May be empty.
    pub name: String,
    pub last_price: f64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub prev_close: f64,
    /// Traded share count.
    pub volume: u64,
    /// Turnover.
    pub amount: f64,
    /// Percent change against `prev_close`, see [`change_pct`].
    pub change_pct: f64,
    pub market: Market,
    pub source_recv_time_us: u64,
    /// Debugging echo of the originating payload. Never read by the feed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,
}

impl Quote {
    /// An all-zero quote for `code`, handy as a base for struct update syntax.
    pub fn empty(code: impl Into<String>, market: Market) -> Self {
        Self {
            code: code.into(),
            name: String::new(),
            last_price: 0.0,
            open: 0.0,
            high: 0.0,
            low: 0.0,
            prev_close: 0.0,
            volume: 0,
            amount: 0.0,
            change_pct: 0.0,
            market,
            source_recv_time_us: 0,
            raw: None,
        }
    }

    /// Check the record invariants: non-empty code, non-negative last price.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.code.is_empty() {
            return Err(ValidationError::EmptyCode);
        }
        if self.last_price < 0.0 {
            return Err(ValidationError::NegativePrice(self.last_price));
        }
        Ok(())
    }

    /// Recompute `change_pct` from `last_price` and `prev_close`.
    #[inline]
    pub fn refresh_change_pct(&mut self) {
        self.change_pct = change_pct(self.last_price, self.prev_close);
    }
}

/// `(last − prev) / prev × 100`, or `0` when there is no usable previous close.
#[inline]
pub fn change_pct(last_price: f64, prev_close: f64) -> f64 {
    if prev_close > 0.0 {
        (last_price - prev_close) / prev_close * 100.0
    } else {
        0.0
    }
}

impl std::fmt::Display for Quote {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Quote({} {} last={:.3} chg={:+.2}% vol={} {})",
            self.code, self.name, self.last_price, self.change_pct, self.volume, self.market
        )
    }
}
