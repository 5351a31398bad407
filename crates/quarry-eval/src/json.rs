//! JSON wire format for events.
//!
//! An event is an object with a `name`, an optional `id` (default 0), an
//! optional `timestamp` (RFC 3339 string or epoch seconds; default epoch),
//! and an optional `record` array:
//!
//! ```json
//! {"name": "conn", "id": 7, "timestamp": "2011-08-12T14:59:11Z",
//!  "record": [443, "http", [1, 2]]}
//! ```
//!
//! Nested arrays inside `record` become records, so offset paths descend
//! into them. Scalars map onto the value universe: integers to int (or
//! uint past `i64::MAX`), floats to real, strings to string, booleans to
//! bool, null to the invalid value.

use chrono::{DateTime, Utc};
use serde_json::Value as Json;

use quarry_parser::Value;

use crate::error::{EvalError, Result};
use crate::event::Event;

/// Convert one JSON value into an event.
pub fn event_from_json(json: &Json) -> Result<Event> {
    let obj = json
        .as_object()
        .ok_or_else(|| EvalError::Event("expected a JSON object".into()))?;

    let name = obj
        .get("name")
        .and_then(Json::as_str)
        .ok_or_else(|| EvalError::Event("missing string field `name`".into()))?;

    let id = match obj.get("id") {
        None => 0,
        Some(v) => v
            .as_u64()
            .ok_or_else(|| EvalError::Event("field `id` must be an unsigned integer".into()))?,
    };

    let timestamp = match obj.get("timestamp") {
        None => DateTime::UNIX_EPOCH,
        Some(v) => timestamp_from_json(v)?,
    };

    let record = match obj.get("record") {
        None => Vec::new(),
        Some(Json::Array(items)) => items.iter().map(value_from_json).collect(),
        Some(_) => {
            return Err(EvalError::Event("field `record` must be an array".into()));
        }
    };

    Ok(Event::new(id, timestamp, name, record))
}

/// Parse a full event stream from JSON-lines text, skipping blank lines.
pub fn events_from_json_lines(input: &str) -> Result<Vec<Event>> {
    input
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            let json: Json = serde_json::from_str(line)?;
            event_from_json(&json)
        })
        .collect()
}

fn timestamp_from_json(v: &Json) -> Result<DateTime<Utc>> {
    if let Some(s) = v.as_str() {
        return DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| EvalError::Event(format!("bad timestamp `{s}`: {e}")));
    }
    if let Some(secs) = v.as_i64() {
        return DateTime::from_timestamp(secs, 0)
            .ok_or_else(|| EvalError::Event(format!("timestamp {secs} out of range")));
    }
    if let Some(secs) = v.as_f64() {
        let nanos = (secs * 1e9) as i64;
        return Ok(DateTime::from_timestamp_nanos(nanos));
    }
    Err(EvalError::Event("field `timestamp` must be a string or number".into()))
}

/// Convert one JSON value into a runtime value.
pub fn value_from_json(json: &Json) -> Value {
    match json {
        Json::Null => Value::Invalid,
        Json::Bool(b) => Value::Bool(*b),
        Json::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Int(i)
            } else if let Some(u) = n.as_u64() {
                Value::UInt(u)
            } else {
                Value::Real(n.as_f64().unwrap_or(f64::NAN))
            }
        }
        Json::String(s) => Value::String(s.clone()),
        Json::Array(items) => Value::Record(items.iter().map(value_from_json).collect()),
        // Objects flatten to a record of their values, in key order.
        Json::Object(map) => Value::Record(map.values().map(value_from_json).collect()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn full_event() {
        let j = json!({
            "name": "conn",
            "id": 7,
            "timestamp": "2011-08-12T14:59:11Z",
            "record": [443, "http", [1, 2]]
        });
        let event = event_from_json(&j).unwrap();
        assert_eq!(event.name(), "conn");
        assert_eq!(event.id(), 7);
        assert_eq!(
            event.timestamp(),
            Utc.with_ymd_and_hms(2011, 8, 12, 14, 59, 11).unwrap()
        );
        assert_eq!(event.record().len(), 3);
        assert_eq!(event.record()[0], Value::Int(443));
        // The nested array became a record: four leaves in total.
        assert_eq!(event.flat_size(), 4);
    }

    #[test]
    fn defaults_for_missing_fields() {
        let j = json!({"name": "x"});
        let event = event_from_json(&j).unwrap();
        assert_eq!(event.id(), 0);
        assert_eq!(event.timestamp(), DateTime::UNIX_EPOCH);
        assert!(event.is_empty());
    }

    #[test]
    fn epoch_timestamp() {
        let j = json!({"name": "x", "timestamp": 1313161151});
        let event = event_from_json(&j).unwrap();
        assert_eq!(event.timestamp().timestamp(), 1_313_161_151);
    }

    #[test]
    fn rejects_malformed_events() {
        assert!(event_from_json(&json!("not an object")).is_err());
        assert!(event_from_json(&json!({"id": 1})).is_err());
        assert!(event_from_json(&json!({"name": "x", "record": 5})).is_err());
        assert!(event_from_json(&json!({"name": "x", "timestamp": "noon"})).is_err());
    }

    #[test]
    fn scalar_mapping() {
        assert_eq!(value_from_json(&json!(true)), Value::Bool(true));
        assert_eq!(value_from_json(&json!(-3)), Value::Int(-3));
        assert_eq!(value_from_json(&json!(1.5)), Value::Real(1.5));
        assert_eq!(value_from_json(&json!("s")), Value::String("s".into()));
        assert_eq!(value_from_json(&json!(u64::MAX)), Value::UInt(u64::MAX));
        assert!(value_from_json(&json!(null)).is_invalid());
    }

    #[test]
    fn json_lines() {
        let input = "\n{\"name\": \"a\"}\n\n{\"name\": \"b\", \"id\": 2}\n";
        let events = events_from_json_lines(input).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].name(), "a");
        assert_eq!(events[1].id(), 2);

        assert!(events_from_json_lines("{broken").is_err());
    }
}
