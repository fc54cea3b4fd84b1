//! Wall-clock timestamps for quote stamping and stats.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

#[inline]
fn since_epoch() -> Duration {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default()
}

/// Current time as **microseconds** since Unix epoch.
#[inline]
pub fn now_us() -> u64 {
    since_epoch().as_micros() as u64
}

/// Current time as **milliseconds** since Unix epoch.
#[inline]
pub fn now_ms() -> u64 {
    since_epoch().as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wall_clock_units_agree() {
        let ms = now_ms();
        let us = now_us();
        assert!(us / 1000 >= ms);
        assert!(us / 1000 - ms < 1_000);
    }
}
