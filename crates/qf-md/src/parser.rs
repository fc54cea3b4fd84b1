//! Payload → [`Quote`] normalization for both upstream dialects.
//!
//! Dialect dispatch is a sniff of the decoded text:
//!
//! | Payload starts with / contains | Dialect | Market |
//! |---|---|---|
//! | starts with `{` | JSON object | `NORTH_EXCHANGE` |
//! | contains `$` | `$`-delimited tokens | `MAIN_A` |
//! | anything else | dropped (`UnknownDialect`) | |
//!
//! JSON objects whose `type` is `heartbeat` or `heartbeat_response` are
//! control frames, not quotes.
//!
//! Numeric fields are lenient (see [`crate::json_util`]); only a missing
//! code or a negative last price drops a record. Large prices are *not*
//! rejected here: normalization stays faithful and flagging is left to the
//! pipeline.

use qf_core::error::{DecodeError, ParseError};
use qf_core::{Market, Quote, time_util};

use crate::json_util::{lenient_f64, lenient_u64, value_f64, value_text, value_u64};

/// Field separator of the delimited dialect.
pub const FIELD_SEP: char = '$';

/// Records with fewer fields than this are dropped.
pub const MIN_DELIMITED_FIELDS: usize = 6;

// Delimited dialect field positions.
const IDX_CODE: usize = 0;
const IDX_NAME: usize = 1;
const IDX_OPEN: usize = 3;
const IDX_HIGH: usize = 4;
const IDX_LOW: usize = 5;
const IDX_LAST: usize = 6;
const IDX_VOLUME: usize = 7;
const IDX_AMOUNT: usize = 8;
const IDX_PREV_CLOSE: usize = 30;

/// Out-of-band control frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlFrame {
    Heartbeat,
    HeartbeatResponse,
}

/// Result of parsing one non-empty payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Parsed {
    Quote(Quote),
    Control(ControlFrame),
}

/// Parse one payload. Stamps `source_recv_time_us` with the current time.
///
/// With `keep_raw`, the payload text is echoed into [`Quote::raw`].
pub fn parse_payload(payload: &[u8], keep_raw: bool) -> Result<Parsed, ParseError> {
    let text = std::str::from_utf8(payload).map_err(|_| DecodeError::NotUtf8)?;

    let mut parsed = if text.starts_with('{') {
        parse_json(text)?
    } else if text.contains(FIELD_SEP) {
        Parsed::Quote(parse_delimited(text)?)
    } else {
        return Err(DecodeError::UnknownDialect.into());
    };

    if let Parsed::Quote(ref mut q) = parsed {
        q.validate()?;
        q.refresh_change_pct();
        q.source_recv_time_us = time_util::now_us();
        if keep_raw {
            q.raw = Some(text.to_string());
        }
    }
    Ok(parsed)
}

/// Parse the `$`-delimited (MAIN_A) dialect.
///
/// ```text
/// SZ000001$PingAn$0$10.0$10.5$9.8$10.3$1000$10300[$...$prev_close at index 30]
/// ```
pub fn parse_delimited(text: &str) -> Result<Quote, DecodeError> {
    let fields: Vec<&str> = text.split(FIELD_SEP).collect();
    if fields.len() < MIN_DELIMITED_FIELDS {
        return Err(DecodeError::TooFewFields(fields.len()));
    }

    let num = |i: usize| fields.get(i).map(|s| lenient_f64(s)).unwrap_or(0.0);

    Ok(Quote {
        name: fields[IDX_NAME].trim().to_string(),
        open: num(IDX_OPEN),
        high: num(IDX_HIGH),
        low: num(IDX_LOW),
        last_price: num(IDX_LAST),
        volume: fields.get(IDX_VOLUME).map(|s| lenient_u64(s)).unwrap_or(0),
        amount: num(IDX_AMOUNT),
        prev_close: num(IDX_PREV_CLOSE),
        ..Quote::empty(fields[IDX_CODE].trim(), Market::MainA)
    })
}

/// Parse the JSON (NORTH_EXCHANGE) dialect, or recognize a control frame.
pub fn parse_json(text: &str) -> Result<Parsed, DecodeError> {
    let v: serde_json::Value =
        serde_json::from_str(text).map_err(|e| DecodeError::MalformedJson(e.to_string()))?;
    if !v.is_object() {
        return Err(DecodeError::MalformedJson("top-level value is not an object".into()));
    }

    match v.get("type").and_then(|t| t.as_str()) {
        Some("heartbeat") => return Ok(Parsed::Control(ControlFrame::Heartbeat)),
        Some("heartbeat_response") => return Ok(Parsed::Control(ControlFrame::HeartbeatResponse)),
        _ => {}
    }

    Ok(Parsed::Quote(Quote {
        name: value_text(v.get("stock_name")),
        last_price: value_f64(v.get("lastPrice")),
        open: value_f64(v.get("open")),
        high: value_f64(v.get("high")),
        low: value_f64(v.get("low")),
        volume: value_u64(v.get("volume")),
        amount: value_f64(v.get("amount")),
        prev_close: value_f64(v.get("lastClose")),
        ..Quote::empty(value_text(v.get("stock_code")), Market::NorthExchange)
    }))
}
