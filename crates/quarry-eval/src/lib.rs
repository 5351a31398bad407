//! # quarry-eval
//!
//! Evaluation core for the quarry telemetry engine.
//!
//! Queries parsed by [`quarry_parser`] compile here into expression trees
//! that are evaluated lazily against one event at a time:
//!
//! - **Events** ([`Event`]): timestamped, named, identified records of
//!   values with a precomputed depth-first flattening.
//! - **Expression trees** ([`expr::Node`]): extractor, constant,
//!   relational and boolean nodes sharing a ready/result protocol. The
//!   `exists` extractor is a resumable cursor over the event's leaves,
//!   consumed by the relational operator's retry loop.
//! - **Compiler** ([`Expression`]): parse → validate → normalize to
//!   disjunctive normal form → lower, collecting a flat extractor list.
//! - **Engine** ([`Engine`]): a set of compiled expressions evaluated
//!   serially per event.
//!
//! Once compiled, evaluation is total: type mismatches and failed offset
//! walks surface as the invalid value, which relational operators turn
//! into a `false` verdict rather than an error.
//!
//! ## Quick Start
//!
//! ```rust
//! use chrono::{TimeZone, Utc};
//! use quarry_eval::{Event, Expression, Schema};
//! use quarry_parser::Value;
//!
//! let mut expr = Expression::compile(
//!     r#"name == "http" && @0 < 100"#,
//!     Schema::default(),
//! ).unwrap();
//!
//! let ts = Utc.with_ymd_and_hms(2011, 8, 12, 14, 59, 11).unwrap();
//! let event = Event::new(1, ts, "http", vec![Value::Int(50)]);
//! assert!(expr.eval(&event));
//! ```

pub mod compiler;
pub mod engine;
pub mod error;
pub mod event;
pub mod expr;
pub mod json;
pub mod schema;
pub mod source;

// Re-export the most commonly used types and functions at crate root
pub use compiler::{CompileOptions, EventOffsetMode, Expression, NodePath};
pub use engine::Engine;
pub use error::{EvalError, Result};
pub use event::Event;
pub use json::{event_from_json, events_from_json_lines, value_from_json};
pub use schema::{EventDecl, Field, Schema, Type, TypedValue};
pub use source::{EventSource, PcapIngestConfig};
