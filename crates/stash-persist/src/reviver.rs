use chrono::{DateTime, NaiveDateTime, SecondsFormat, Timelike};
use serde_json::Value;

const NAIVE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

/// Default parse-time reviver: strings shaped like an ISO-8601 date-time are
/// re-emitted in canonical chrono rendering, so revived date-times compare
/// equal regardless of source formatting. Everything else passes through
/// unchanged, as do strings that look like a date-time but fail a full parse.
pub fn date_reviver(_key: &str, value: Value) -> Value {
    if let Value::String(text) = &value {
        if let Some(canonical) = canonical_datetime(text) {
            return Value::String(canonical);
        }
    }
    value
}

/// Parse a revived (or raw) date-time string into a naive UTC timestamp.
/// Accepts both offset-carrying RFC 3339 text and bare `YYYY-MM-DDTHH:mm:ss`
/// with optional fractional seconds.
pub fn parse_datetime(text: &str) -> Option<NaiveDateTime> {
    if !has_datetime_shape(text) {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.naive_utc());
    }
    NaiveDateTime::parse_from_str(text, NAIVE_FORMAT).ok()
}

/// Apply a reviver to every value of a parsed JSON tree, innermost values
/// first, with JSON member names as keys (array indices as decimal strings,
/// `""` at the root).
pub fn revive<F>(value: Value, reviver: &F) -> Value
where
    F: Fn(&str, Value) -> Value + ?Sized,
{
    revive_at("", value, reviver)
}

fn revive_at<F>(key: &str, value: Value, reviver: &F) -> Value
where
    F: Fn(&str, Value) -> Value + ?Sized,
{
    let value = match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(name, member)| {
                    let revived = revive_at(&name, member, reviver);
                    (name, revived)
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .enumerate()
                .map(|(index, item)| revive_at(&index.to_string(), item, reviver))
                .collect(),
        ),
        other => other,
    };
    reviver(key, value)
}

fn canonical_datetime(text: &str) -> Option<String> {
    if !has_datetime_shape(text) {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.to_rfc3339_opts(SecondsFormat::AutoSi, true));
    }
    let naive = NaiveDateTime::parse_from_str(text, NAIVE_FORMAT).ok()?;
    Some(format_naive(&naive))
}

fn format_naive(dt: &NaiveDateTime) -> String {
    if dt.nanosecond() == 0 {
        dt.format("%Y-%m-%dT%H:%M:%S").to_string()
    } else {
        dt.format(NAIVE_FORMAT).to_string()
    }
}

/// Anchored `YYYY-MM-DDTHH:mm:ss` prefix check; seconds required, fractional
/// seconds and timezone optional.
fn has_datetime_shape(text: &str) -> bool {
    let bytes = text.as_bytes();
    if bytes.len() < 19 {
        return false;
    }
    bytes[..19].iter().enumerate().all(|(i, b)| match i {
        4 | 7 => *b == b'-',
        10 => *b == b'T',
        13 | 16 => *b == b':',
        _ => b.is_ascii_digit(),
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn bare_datetime_revives_to_itself() {
        let value = date_reviver("", json!("2021-05-01T00:00:00"));
        assert_eq!(value, json!("2021-05-01T00:00:00"));
    }

    #[test]
    fn offset_datetime_gets_canonical_rendering() {
        let value = date_reviver("", json!("2021-05-01T00:00:00+00:00"));
        assert_eq!(value, json!("2021-05-01T00:00:00Z"));
    }

    #[test]
    fn non_datetime_values_pass_through() {
        assert_eq!(date_reviver("", json!("hello")), json!("hello"));
        assert_eq!(date_reviver("", json!(42)), json!(42));
        assert_eq!(date_reviver("", json!(null)), json!(null));
        // right shape up front, but not a real parseable date-time
        assert_eq!(
            date_reviver("", json!("2021-05-01T00:00:00garbage")),
            json!("2021-05-01T00:00:00garbage")
        );
        // seconds are required
        assert_eq!(date_reviver("", json!("2021-05-01T00:00")), json!("2021-05-01T00:00"));
    }

    #[test]
    fn parse_datetime_round_trips_the_canonical_form() {
        let dt = parse_datetime("2021-05-01T00:00:00").expect("parse");
        assert_eq!(format_naive(&dt), "2021-05-01T00:00:00");

        let with_offset = parse_datetime("2021-05-01T02:00:00+02:00").expect("parse");
        assert_eq!(format_naive(&with_offset), "2021-05-01T00:00:00");
    }

    #[test]
    fn revive_walks_nested_values_bottom_up() {
        let parsed = json!({
            "saved_at": "2021-05-01T00:00:00+00:00",
            "items": [{"due": "2022-01-02T03:04:05+00:00"}, "plain"],
        });
        let revived = revive(parsed, &date_reviver);
        assert_eq!(
            revived,
            json!({
                "saved_at": "2021-05-01T00:00:00Z",
                "items": [{"due": "2022-01-02T03:04:05Z"}, "plain"],
            })
        );
    }

    #[test]
    fn revive_reports_member_names_and_root_key() {
        use std::cell::RefCell;

        let seen = RefCell::new(Vec::new());
        let parsed = json!({"outer": {"inner": 1}, "list": [true]});
        let _ = revive(parsed, &|key: &str, value: Value| {
            seen.borrow_mut().push(key.to_string());
            value
        });
        // innermost first within each branch, root last
        assert_eq!(seen.into_inner(), vec!["inner", "outer", "0", "list", ""]);
    }
}
