//! The JSON envelope convention.
//!
//! Messages travel with `content-type: application/json` and a UTF-8 encoded
//! JSON body. On the way in, [`decode_body`] parses the body into a
//! [`JsonValue`] tree - best effort: a body that fails to parse, or a message
//! with a different content type, simply yields `None` and the message is
//! handed to the handler undecoded. This is deliberate; downstream code may
//! want the raw bytes when decoding fails.

use chrono::{DateTime, NaiveDateTime, Utc};
use lapin::BasicProperties;
use std::collections::BTreeMap;

/// A decoded JSON payload.
///
/// This mirrors [`serde_json::Value`] with one addition: when date recognition
/// is enabled, strings that strictly match `YYYY-MM-DDTHH:MM:SS.sssZ` are
/// promoted to [`JsonValue::Date`] during decoding. With recognition disabled
/// the same tree is produced with those strings left untouched, so handler
/// code works against a single type either way.
#[derive(Clone, Debug, PartialEq)]
pub enum JsonValue {
    Null,
    Bool(bool),
    Number(serde_json::Number),
    String(String),
    Date(DateTime<Utc>),
    Array(Vec<JsonValue>),
    Object(BTreeMap<String, JsonValue>),
}

impl JsonValue {
    /// Build a tree from a raw [`serde_json::Value`], optionally promoting
    /// ISO-8601-looking strings to [`JsonValue::Date`].
    pub fn from_raw(value: serde_json::Value, recognize_dates: bool) -> Self {
        match value {
            serde_json::Value::Null => JsonValue::Null,
            serde_json::Value::Bool(b) => JsonValue::Bool(b),
            serde_json::Value::Number(n) => JsonValue::Number(n),
            serde_json::Value::String(s) => {
                if recognize_dates {
                    match parse_iso_datetime(&s) {
                        Some(date) => JsonValue::Date(date),
                        None => JsonValue::String(s),
                    }
                } else {
                    JsonValue::String(s)
                }
            }
            serde_json::Value::Array(items) => JsonValue::Array(
                items
                    .into_iter()
                    .map(|item| JsonValue::from_raw(item, recognize_dates))
                    .collect(),
            ),
            serde_json::Value::Object(map) => JsonValue::Object(
                map.into_iter()
                    .map(|(key, item)| (key, JsonValue::from_raw(item, recognize_dates)))
                    .collect(),
            ),
        }
    }

    /// Lookup a key on an object value.
    pub fn get(&self, key: &str) -> Option<&JsonValue> {
        match self {
            JsonValue::Object(map) => map.get(key),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            JsonValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            JsonValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<DateTime<Utc>> {
        match self {
            JsonValue::Date(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[JsonValue]> {
        match self {
            JsonValue::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&BTreeMap<String, JsonValue>> {
        match self {
            JsonValue::Object(map) => Some(map),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, JsonValue::Null)
    }
}

impl From<serde_json::Value> for JsonValue {
    fn from(value: serde_json::Value) -> Self {
        JsonValue::from_raw(value, false)
    }
}

/// Decode a message body according to the JSON envelope convention.
///
/// Returns `Some` only if the declared content type starts with
/// `application/json` and the body parses as UTF-8 JSON; `None` otherwise.
/// Parse failures are swallowed, never surfaced as errors.
pub fn decode_body(
    properties: &BasicProperties,
    data: &[u8],
    recognize_dates: bool,
) -> Option<JsonValue> {
    let content_type = properties.content_type().as_ref()?;
    if !content_type.as_str().starts_with("application/json") {
        return None;
    }
    let raw: serde_json::Value = serde_json::from_slice(data).ok()?;
    Some(JsonValue::from_raw(raw, recognize_dates))
}

/// Parse a string that strictly matches `YYYY-MM-DDTHH:MM:SS.sssZ`.
///
/// The length check pins the year to four digits and the fractional part to
/// exactly three, matching the wire format produced by `Date#toISOString` in
/// JavaScript clients.
fn parse_iso_datetime(s: &str) -> Option<DateTime<Utc>> {
    if s.len() != 24 || !s.ends_with('Z') {
        return None;
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.3fZ")
        .ok()
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::{decode_body, parse_iso_datetime, JsonValue};
    use chrono::{DateTime, Utc};
    use lapin::BasicProperties;

    fn json_properties() -> BasicProperties {
        BasicProperties::default().with_content_type("application/json".into())
    }

    #[test]
    fn decodes_a_json_body() {
        let body = br#"{"b": {"c": "bee"}, "n": 3}"#;

        let decoded = decode_body(&json_properties(), body, false).unwrap();

        assert_eq!(
            decoded.get("b").and_then(|b| b.get("c")).unwrap(),
            &JsonValue::String("bee".into())
        );
        assert_eq!(decoded.get("n").unwrap(), &JsonValue::Number(3.into()));
    }

    #[test]
    fn content_type_parameters_are_tolerated() {
        let properties =
            BasicProperties::default().with_content_type("application/json; charset=utf-8".into());

        assert!(decode_body(&properties, b"{}", false).is_some());
    }

    #[test]
    fn non_json_content_type_is_not_decoded() {
        let properties = BasicProperties::default().with_content_type("text/plain".into());

        assert_eq!(decode_body(&properties, b"{}", false), None);
    }

    #[test]
    fn missing_content_type_is_not_decoded() {
        assert_eq!(decode_body(&BasicProperties::default(), b"{}", false), None);
    }

    #[test]
    fn malformed_bodies_are_swallowed() {
        assert_eq!(decode_body(&json_properties(), b"{not json", false), None);
    }

    #[test]
    fn iso_strings_become_dates_only_when_recognition_is_on() {
        let body = br#"{"sDate": "2017-07-10T10:54:26.578Z"}"#;
        let expected = DateTime::parse_from_rfc3339("2017-07-10T10:54:26.578Z")
            .unwrap()
            .with_timezone(&Utc);

        let with_dates = decode_body(&json_properties(), body, true).unwrap();
        assert_eq!(
            with_dates.get("sDate").unwrap().as_date().unwrap(),
            expected
        );

        let without_dates = decode_body(&json_properties(), body, false).unwrap();
        assert_eq!(
            without_dates.get("sDate").unwrap().as_str().unwrap(),
            "2017-07-10T10:54:26.578Z"
        );
    }

    #[test]
    fn recognition_is_applied_inside_arrays() {
        let body = br#"{"stamps": ["2017-07-10T10:54:26.578Z", "not a date"]}"#;

        let decoded = decode_body(&json_properties(), body, true).unwrap();
        let stamps = decoded.get("stamps").unwrap().as_array().unwrap();

        assert!(stamps[0].as_date().is_some());
        assert_eq!(stamps[1].as_str(), Some("not a date"));
    }

    #[test]
    fn loose_date_lookalikes_stay_strings() {
        for s in [
            "2017-07-10T10:54:26Z",       // no millis
            "2017-07-10T10:54:26.5780Z",  // four fractional digits
            "2017-07-10 10:54:26.578Z",   // space separator
            "2017-07-10T10:54:26.578",    // no zone
            "12017-07-10T10:54:26.578Z",  // five-digit year
            "2017-13-10T10:54:26.578Z",   // month out of range
        ] {
            assert_eq!(parse_iso_datetime(s), None, "{s:?} should not parse");
        }
    }
}
