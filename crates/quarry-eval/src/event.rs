//! The event accessor: the only view through which the expression core
//! consumes events.

use chrono::{DateTime, Utc};

use quarry_parser::Value;

/// A timestamped, named, identified record of values.
///
/// Events are produced by an upstream ingestor and are read-only from the
/// expression core's perspective; an evaluation borrows an event for a
/// single pass and never retains it.
///
/// The depth-first flattening of the nested record is precomputed at
/// construction, so [`flat_size`](Event::flat_size) and
/// [`flat_at`](Event::flat_at) are O(1). Only records recurse during
/// flattening; vectors, sets and tables are leaves.
#[derive(Debug, Clone)]
pub struct Event {
    id: u64,
    timestamp: DateTime<Utc>,
    name: String,
    record: Vec<Value>,
    flat: Vec<Value>,
}

impl Event {
    pub fn new(
        id: u64,
        timestamp: DateTime<Utc>,
        name: impl Into<String>,
        record: Vec<Value>,
    ) -> Self {
        let mut flat = Vec::new();
        flatten_into(&record, &mut flat);
        Event {
            id,
            timestamp,
            name: name.into(),
            record,
            flat,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the event carries no record payload.
    pub fn is_empty(&self) -> bool {
        self.record.is_empty()
    }

    /// Number of leaf values under the depth-first flattening.
    pub fn flat_size(&self) -> usize {
        self.flat.len()
    }

    /// The `i`-th leaf of the flattened record.
    ///
    /// # Panics
    ///
    /// Panics when `i >= flat_size()`.
    pub fn flat_at(&self, i: usize) -> &Value {
        &self.flat[i]
    }

    /// The top-level record.
    pub fn record(&self) -> &[Value] {
        &self.record
    }
}

fn flatten_into(values: &[Value], out: &mut Vec<Value>) {
    for v in values {
        match v {
            Value::Record(nested) => flatten_into(nested, out),
            other => out.push(other.clone()),
        }
    }
}
