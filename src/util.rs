use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Reads an integer that upstream APIs send either as a JSON number or a string.
pub fn value_to_i128(value: &Value) -> Option<i128> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .map(i128::from)
            .or_else(|| n.as_u64().map(i128::from))
            .or_else(|| n.as_f64().map(|f| f as i128)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i128>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().filter(|f| f.is_finite()).map(|f| f as i128))
        }
        _ => None,
    }
}

pub fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

// serde helper for fields like `"decimals": "8"` vs `"decimals": 8`
pub fn de_opt_u32<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value
        .as_ref()
        .and_then(value_to_i128)
        .and_then(|v| u32::try_from(v).ok()))
}

pub fn de_opt_i64<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value
        .as_ref()
        .and_then(value_to_i128)
        .and_then(|v| i64::try_from(v).ok()))
}

/// Parses a Hedera consensus timestamp ("seconds.nanoseconds").
///
/// Strings without a single dot are tried as epoch milliseconds or RFC 3339.
pub fn parse_hedera_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    let parts: Vec<&str> = raw.split('.').collect();
    if parts.len() == 2 {
        let seconds = parts[0].parse::<i64>().ok()?;
        let nanos = parts[1].parse::<i64>().ok()?;
        if nanos < 0 {
            return None;
        }
        let millis = seconds.checked_mul(1000)?.checked_add(nanos / 1_000_000)?;
        return DateTime::from_timestamp_millis(millis);
    }
    parse_timestamp(raw)
}

/// Parses epoch milliseconds (digits only) or an RFC 3339 string.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if raw.bytes().all(|b| b.is_ascii_digit()) {
        return raw.parse::<i64>().ok().and_then(DateTime::from_timestamp_millis);
    }
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

pub fn timestamp_from_value(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(n) => n.as_i64().and_then(DateTime::from_timestamp_millis),
        Value::String(s) => parse_timestamp(s),
        _ => None,
    }
}

// ISO-8601 instant with millisecond precision, e.g. 2023-11-03T08:26:40.500Z
pub fn iso_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

// Display form, e.g. 11/3/2023, 8:26:40 AM UTC
pub fn display_timestamp(ts: &DateTime<Utc>) -> String {
    ts.format("%-m/%-d/%Y, %-I:%M:%S %p UTC").to_string()
}

pub fn timestamp_fields(ts: Option<&DateTime<Utc>>) -> (Option<String>, Option<String>) {
    match ts {
        Some(ts) => (Some(iso_timestamp(ts)), Some(display_timestamp(ts))),
        None => (None, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn hedera_timestamp_to_millis() {
        let ts = parse_hedera_timestamp("1699000000.500000000").unwrap();
        assert_eq!(ts.timestamp_millis(), 1_699_000_000_500);
        assert_eq!(iso_timestamp(&ts), "2023-11-03T08:26:40.500Z");
        assert_eq!(display_timestamp(&ts), "11/3/2023, 8:26:40 AM UTC");
    }

    #[test]
    fn garbage_timestamps_yield_nothing() {
        assert!(parse_hedera_timestamp("not-a-time").is_none());
        assert!(parse_hedera_timestamp("abc.def").is_none());
        assert!(parse_timestamp("").is_none());
        assert_eq!(timestamp_fields(None), (None, None));
    }

    #[test]
    fn sui_timestamps_in_millis_or_iso() {
        let from_ms = timestamp_from_value(&json!("1699000000500")).unwrap();
        assert_eq!(from_ms.timestamp_millis(), 1_699_000_000_500);
        let from_num = timestamp_from_value(&json!(1_699_000_000_500i64)).unwrap();
        assert_eq!(from_ms, from_num);
        let from_iso = timestamp_from_value(&json!("2023-11-03T08:26:40.500Z")).unwrap();
        assert_eq!(from_iso, from_ms);
    }

    #[test]
    fn numbers_as_strings_or_numbers() {
        assert_eq!(value_to_i128(&json!("-1000")), Some(-1000));
        assert_eq!(value_to_i128(&json!(250)), Some(250));
        assert_eq!(value_to_i128(&json!("1.5e3")), Some(1500));
        assert_eq!(value_to_i128(&json!(null)), None);
        assert_eq!(value_to_i128(&json!("x")), None);
    }
}
