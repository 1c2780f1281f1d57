//! Lenient field parsing shared by the upstream clients

use chrono::{NaiveDate, NaiveDateTime, TimeZone};
use serde_json::Value;

use crate::types::{Candle, MARKET_TZ};

const DATETIME_LAYOUTS: [&str; 2] = ["%Y-%m-%d %H:%M", "%Y-%m-%d %H:%M:%S"];
const DATE_LAYOUTS: [&str; 2] = ["%Y-%m-%d", "%Y%m%d"];

/// Parse an upstream timestamp in market-local time into epoch millis.
pub fn parse_datetime(input: &str) -> Option<i64> {
    let input = input.trim();
    let naive = DATETIME_LAYOUTS
        .iter()
        .find_map(|layout| NaiveDateTime::parse_from_str(input, layout).ok())
        .or_else(|| {
            DATE_LAYOUTS
                .iter()
                .find_map(|layout| NaiveDate::parse_from_str(input, layout).ok())
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })?;
    MARKET_TZ
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.timestamp_millis())
}

/// Numbers may arrive as JSON numbers or numeric strings; anything else is 0.
pub fn value_f64(v: Option<&Value>) -> f64 {
    match v {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    }
}

pub fn value_i64(v: Option<&Value>) -> i64 {
    match v {
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .unwrap_or(0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0),
        _ => 0,
    }
}

/// String form of a scalar field; null/missing is empty.
pub fn value_string(v: Option<&Value>) -> String {
    match v {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    }
}

/// Sort ascending by open time and drop duplicate bars.
pub fn finalize_candles(mut candles: Vec<Candle>) -> Vec<Candle> {
    candles.sort_by_key(|c| c.open_time);
    candles.dedup_by_key(|c| c.open_time);
    candles
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_all_layouts_in_market_time() {
        // 2026-01-01 09:30 +08:00 == 2026-01-01 01:30 UTC
        let expected = chrono::Utc
            .with_ymd_and_hms(2026, 1, 1, 1, 30, 0)
            .unwrap()
            .timestamp_millis();
        assert_eq!(parse_datetime("2026-01-01 09:30"), Some(expected));
        assert_eq!(parse_datetime("2026-01-01 09:30:00"), Some(expected));

        let midnight = chrono::Utc
            .with_ymd_and_hms(2025, 12, 31, 16, 0, 0)
            .unwrap()
            .timestamp_millis();
        assert_eq!(parse_datetime("2026-01-01"), Some(midnight));
        assert_eq!(parse_datetime("20260101"), Some(midnight));
        assert_eq!(parse_datetime("01/01/2026"), None);
    }

    #[test]
    fn lenient_scalars() {
        assert_eq!(value_f64(Some(&json!(12.5))), 12.5);
        assert_eq!(value_f64(Some(&json!(" 7.25 "))), 7.25);
        assert_eq!(value_f64(Some(&json!("-"))), 0.0);
        assert_eq!(value_f64(None), 0.0);
        assert_eq!(value_i64(Some(&json!(1))), 1);
        assert_eq!(value_i64(Some(&json!("0"))), 0);
        assert_eq!(value_string(Some(&json!("600519"))), "600519");
        assert_eq!(value_string(Some(&json!(20260101))), "20260101");
        assert_eq!(value_string(Some(&Value::Null)), "");
    }

    #[test]
    fn finalize_sorts_and_dedups() {
        let bar = |t: i64| Candle {
            open_time: t,
            close_time: t + 59_999,
            open: 1.0,
            high: 1.0,
            low: 1.0,
            close: 1.0,
            volume: 0.0,
            quote_volume: 0.0,
        };
        let out = finalize_candles(vec![bar(120_000), bar(0), bar(60_000), bar(0)]);
        let times: Vec<i64> = out.iter().map(|c| c.open_time).collect();
        assert_eq!(times, vec![0, 60_000, 120_000]);
    }
}
