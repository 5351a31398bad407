//! Multi-expression evaluation engine.

use crate::compiler::{CompileOptions, Expression};
use crate::error::Result;
use crate::event::Event;
use crate::schema::Schema;

/// A set of compiled expressions evaluated against each event in turn.
///
/// Expressions are independent; the engine evaluates them serially (a
/// single expression is never shared across threads). Callers wanting
/// parallel fan-out clone individual expressions instead.
///
/// # Example
///
/// ```rust
/// use quarry_eval::{Engine, Event, Schema};
/// use quarry_parser::Value;
/// use chrono::{TimeZone, Utc};
///
/// let mut engine = Engine::new(Schema::default());
/// engine.add_query(r#"name == "http""#).unwrap();
/// engine.add_query("id > 100").unwrap();
///
/// let ts = Utc.with_ymd_and_hms(2011, 8, 12, 14, 59, 11).unwrap();
/// let event = Event::new(7, ts, "http", vec![Value::Int(1)]);
/// assert_eq!(engine.evaluate(&event), vec![0]);
/// ```
pub struct Engine {
    schema: Schema,
    options: CompileOptions,
    expressions: Vec<Expression>,
}

impl Engine {
    /// Create an engine compiling queries against the given schema.
    pub fn new(schema: Schema) -> Self {
        Engine::with_options(schema, CompileOptions::default())
    }

    pub fn with_options(schema: Schema, options: CompileOptions) -> Self {
        Engine {
            schema,
            options,
            expressions: Vec::new(),
        }
    }

    /// Compile and register a query. Returns its index.
    pub fn add_query(&mut self, source: &str) -> Result<usize> {
        let expr = Expression::compile_with(source, self.schema.clone(), self.options)?;
        self.expressions.push(expr);
        Ok(self.expressions.len() - 1)
    }

    /// Evaluate one event against all expressions; returns the indices of
    /// those that matched, in registration order.
    pub fn evaluate(&mut self, event: &Event) -> Vec<usize> {
        self.expressions
            .iter_mut()
            .enumerate()
            .filter_map(|(i, expr)| expr.eval(event).then_some(i))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.expressions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.expressions.is_empty()
    }

    pub fn expressions(&self) -> &[Expression] {
        &self.expressions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use quarry_parser::Value;

    fn event(name: &str, id: u64) -> Event {
        let ts = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        Event::new(id, ts, name, vec![Value::Int(1)])
    }

    #[test]
    fn routes_events_to_matching_queries() {
        let mut engine = Engine::new(Schema::default());
        engine.add_query(r#"name == "http""#).unwrap();
        engine.add_query("id == 2").unwrap();
        engine.add_query(r#"name == "http" && id == 2"#).unwrap();

        assert_eq!(engine.evaluate(&event("http", 1)), vec![0]);
        assert_eq!(engine.evaluate(&event("dns", 2)), vec![1]);
        assert_eq!(engine.evaluate(&event("http", 2)), vec![0, 1, 2]);
        assert!(engine.evaluate(&event("dns", 1)).is_empty());
    }

    #[test]
    fn add_query_surfaces_compile_errors() {
        let mut engine = Engine::new(Schema::default());
        assert!(engine.add_query("").is_err());
        assert!(engine.add_query("name === 1").is_err());
        assert!(engine.is_empty());
    }
}
