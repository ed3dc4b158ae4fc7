//! The frame envelope shared by both directions.

// ============================================================================
// Imports
// ============================================================================

use std::result::Result as StdResult;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Value, from_str, to_string, to_value};

use crate::error::Result;

// ============================================================================
// Frame
// ============================================================================

/// One typed message unit exchanged over the transport.
///
/// # Format
///
/// ```json
/// {
///   "type": "price_update",
///   "payload": { "symbol": "AAPL", "price": 100.0 },
///   "timestamp": "2025-01-01T00:00:00Z"
/// }
/// ```
///
/// Outbound frames always carry a timestamp. Inbound frames may omit it,
/// and a missing payload decodes as `null`. An inbound timestamp may be
/// RFC 3339, `YYYY-MM-DD HH:MM:SS` (UTC) or epoch milliseconds; anything
/// else reads as `None` without rejecting the frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    /// Message type key used for routing.
    #[serde(rename = "type")]
    pub frame_type: String,

    /// Message body, opaque to the transport.
    #[serde(default)]
    pub payload: Value,

    /// Send time (ISO-8601, UTC).
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_timestamp"
    )]
    pub timestamp: Option<DateTime<Utc>>,
}

impl Frame {
    /// Creates a frame stamped with the current time.
    #[inline]
    #[must_use]
    pub fn new(frame_type: impl Into<String>, payload: Value) -> Self {
        Self {
            frame_type: frame_type.into(),
            payload,
            timestamp: Some(Utc::now()),
        }
    }

    /// Creates a timestamped frame from any serializable payload.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`](crate::Error::Json) if the payload cannot be
    /// represented as JSON.
    pub fn with_payload<T: Serialize>(frame_type: impl Into<String>, payload: &T) -> Result<Self> {
        Ok(Self::new(frame_type, to_value(payload)?))
    }

    /// Parses a frame from a text message.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`](crate::Error::Json) on malformed input.
    pub fn parse(text: &str) -> Result<Self> {
        Ok(from_str(text)?)
    }

    /// Serializes the frame for the wire.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`](crate::Error::Json) if serialization fails.
    pub fn to_text(&self) -> Result<String> {
        Ok(to_string(self)?)
    }
}

// ============================================================================
// Timestamp Decoding
// ============================================================================

/// Reads a frame timestamp, mapping unrecognized forms to `None`.
fn lenient_timestamp<'de, D>(deserializer: D) -> StdResult<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(timestamp_from_value))
}

fn timestamp_from_value(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(text) => DateTime::parse_from_rfc3339(text)
            .map(|ts| ts.with_timezone(&Utc))
            .ok()
            .or_else(|| {
                ["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M:%S%.f"]
                    .iter()
                    .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
                    .map(|ts| ts.and_utc())
            }),
        Value::Number(millis) => millis.as_i64().and_then(DateTime::from_timestamp_millis),
        _ => None,
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    #[test]
    fn test_new_sets_timestamp() {
        let frame = Frame::new("ping", json!({ "timestamp": 1 }));
        assert_eq!(frame.frame_type, "ping");
        assert!(frame.timestamp.is_some());
    }

    #[test]
    fn test_wire_field_names() {
        let frame = Frame::new("subscribe_prices", json!({ "symbols": ["AAPL"] }));
        let value: Value = serde_json::from_str(&frame.to_text().unwrap()).unwrap();

        assert_eq!(value["type"], "subscribe_prices");
        assert_eq!(value["payload"]["symbols"][0], "AAPL");
        assert!(value["timestamp"].as_str().unwrap().contains('T'));
    }

    #[test]
    fn test_parse_without_timestamp() {
        let frame = Frame::parse(r#"{"type":"trade_update","payload":{"id":7}}"#).unwrap();
        assert_eq!(frame.frame_type, "trade_update");
        assert_eq!(frame.payload["id"], 7);
        assert!(frame.timestamp.is_none());
    }

    #[test]
    fn test_parse_missing_payload_is_null() {
        let frame = Frame::parse(r#"{"type":"portfolio_update"}"#).unwrap();
        assert_eq!(frame.payload, Value::Null);
    }

    #[test]
    fn test_parse_iso_timestamp() {
        let frame =
            Frame::parse(r#"{"type":"x","payload":1,"timestamp":"2024-03-01T12:30:00.000Z"}"#)
                .unwrap();
        let ts = frame.timestamp.unwrap();
        assert_eq!(ts.to_rfc3339(), "2024-03-01T12:30:00+00:00");
    }

    #[test]
    fn test_parse_epoch_millis_timestamp() {
        let frame =
            Frame::parse(r#"{"type":"x","payload":1,"timestamp":1700000000000}"#).unwrap();
        assert_eq!(frame.timestamp.unwrap().timestamp_millis(), 1_700_000_000_000);
    }

    #[test]
    fn test_parse_space_separated_timestamp() {
        let frame =
            Frame::parse(r#"{"type":"x","payload":1,"timestamp":"2024-03-01 12:30:00"}"#).unwrap();
        let ts = frame.timestamp.unwrap();
        assert_eq!(ts.to_rfc3339(), "2024-03-01T12:30:00+00:00");
    }

    #[test]
    fn test_parse_unrecognized_timestamp_is_none() {
        for raw in [r#""yesterday""#, "true", "null", r#"{"s":1}"#, "1.5e300"] {
            let text = format!(r#"{{"type":"x","payload":1,"timestamp":{raw}}}"#);
            let frame = Frame::parse(&text).unwrap();
            assert_eq!(frame.frame_type, "x");
            assert!(frame.timestamp.is_none(), "timestamp {raw}");
        }
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(Frame::parse("not json").is_err());
        assert!(Frame::parse(r#"{"payload":1}"#).is_err());
        assert!(Frame::parse(r#"{"type":5}"#).is_err());
    }
}
