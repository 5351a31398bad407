use chrono::{DateTime, TimeZone, Utc};

use quarry_eval::{Event, Expression, Schema};
use quarry_parser::Value;

pub fn ts() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2011, 8, 12, 14, 59, 11).unwrap()
}

pub fn event(name: &str, id: u64, record: Vec<Value>) -> Event {
    Event::new(id, ts(), name, record)
}

pub fn compile(query: &str) -> Expression {
    Expression::compile(query, Schema::default()).unwrap()
}

pub fn eval(query: &str, event: &Event) -> bool {
    compile(query).eval(event)
}
