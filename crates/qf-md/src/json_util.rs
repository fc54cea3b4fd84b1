//! Lenient field conversion helpers shared by both dialect parsers.
//!
//! The upstream feed is irregular: numbers arrive as JSON numbers, as quoted
//! strings, as empty strings, or not at all. Every helper here maps anything
//! unusable to `0` instead of failing, so one bad field never costs a quote.

/// Parse text as `f64`. Empty, malformed and non-finite input yield `0.0`.
#[inline]
pub fn lenient_f64(s: &str) -> f64 {
    let s = s.trim();
    if s.is_empty() {
        return 0.0;
    }
    fast_float2::parse::<f64, _>(s).ok().filter(|v| v.is_finite()).unwrap_or(0.0)
}

/// Parse text as a share count. Fractional input is truncated; negative,
/// empty and malformed input yield `0`.
#[inline]
pub fn lenient_u64(s: &str) -> u64 {
    let s = s.trim();
    s.parse::<u64>().unwrap_or_else(|_| f64_to_u64(lenient_f64(s)))
}

/// Parse a JSON value (string or number) as `f64`.
#[inline]
pub fn value_f64(v: Option<&serde_json::Value>) -> f64 {
    match v {
        Some(serde_json::Value::String(s)) => lenient_f64(s),
        Some(v) => v.as_f64().filter(|f| f.is_finite()).unwrap_or(0.0),
        None => 0.0,
    }
}

/// Parse a JSON value (string or number) as `u64`.
#[inline]
pub fn value_u64(v: Option<&serde_json::Value>) -> u64 {
    match v {
        Some(serde_json::Value::String(s)) => lenient_u64(s),
        Some(v) => v.as_u64().unwrap_or_else(|| f64_to_u64(v.as_f64().unwrap_or(0.0))),
        None => 0,
    }
}

/// Read a JSON value as text. Numbers are rendered, so a numeric instrument
/// code like `430047` still becomes `"430047"`.
#[inline]
pub fn value_text(v: Option<&serde_json::Value>) -> String {
    match v {
        Some(serde_json::Value::String(s)) => s.trim().to_string(),
        Some(serde_json::Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

#[inline]
fn f64_to_u64(f: f64) -> u64 {
    if f.is_finite() && f > 0.0 { f as u64 } else { 0 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn text_numbers_are_lenient() {
        assert_eq!(lenient_f64("10.35"), 10.35);
        assert_eq!(lenient_f64(" 9.8 "), 9.8);
        assert_eq!(lenient_f64(""), 0.0);
        assert_eq!(lenient_f64("n/a"), 0.0);
        assert_eq!(lenient_f64("inf"), 0.0);
        assert_eq!(lenient_u64("1000"), 1000);
        assert_eq!(lenient_u64("1000.9"), 1000);
        assert_eq!(lenient_u64("-5"), 0);
        assert_eq!(lenient_u64("abc"), 0);
    }

    #[test]
    fn json_values_accept_strings_and_numbers() {
        let v = json!({"a": "10.5", "b": 10.5, "c": null, "d": 50000, "e": "7", "f": 1.9e3, "g": true});
        assert_eq!(value_f64(v.get("a")), 10.5);
        assert_eq!(value_f64(v.get("b")), 10.5);
        assert_eq!(value_f64(v.get("c")), 0.0);
        assert_eq!(value_f64(v.get("missing")), 0.0);
        assert_eq!(value_f64(v.get("g")), 0.0);
        assert_eq!(value_u64(v.get("d")), 50000);
        assert_eq!(value_u64(v.get("e")), 7);
        assert_eq!(value_u64(v.get("f")), 1900);
    }

    #[test]
    fn codes_render_numbers_as_text() {
        let v = json!({"s": " BJ430047 ", "n": 430047, "x": [1]});
        assert_eq!(value_text(v.get("s")), "BJ430047");
        assert_eq!(value_text(v.get("n")), "430047");
        assert_eq!(value_text(v.get("x")), "");
        assert_eq!(value_text(None), "");
    }
}
