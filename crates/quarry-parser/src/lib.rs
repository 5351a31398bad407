//! # quarry-parser
//!
//! Query language frontend for the quarry telemetry engine.
//!
//! Queries are boolean combinations of predicate clauses over events:
//!
//! ```text
//! name == "http" && :addr in 192.168.0.0/16
//! @0.1 >= 100 || !(id == 7)
//! pcap::* : == 443
//! ```
//!
//! This crate parses that surface into a typed AST, validates it, and
//! provides the runtime value model shared with the evaluator:
//!
//! - **Grammar**: PEG ([`pest`]) with a Pratt parser for `||` < `&&` < `!`
//!   precedence and parenthesized grouping.
//! - **Clauses**: tag (`name`/`time`/`id`), type (`:addr`, `:string`, …),
//!   offset (`@0.1.2`), and event (`conn* : == 443`) forms, each pairing a
//!   relational operator with a constant right-hand side.
//! - **Literals**: booleans, integers, unsigneds, reals, strings, regexes,
//!   addresses, subnets, ports, durations, timestamps, plus checked
//!   constant arithmetic folded by [`ast::fold`].
//! - **Values**: the tagged [`Value`] universe with a distinguished invalid
//!   value, total per-tag equality, and a deterministic cross-tag order.
//!
//! ## Quick Start
//!
//! ```rust
//! use quarry_parser::{parse_query, validate};
//!
//! let query = r#"name == "dns" && :addr in 10.0.0.0/8"#;
//! let ast = parse_query(query).unwrap();
//! validate(query, &ast).unwrap();
//! println!("{ast}");
//! ```

pub mod ast;
pub mod error;
pub mod parser;
pub mod value;

// Re-export the most commonly used types and functions at crate root
pub use ast::{ArithOp, Clause, CompareOp, Expr, Literal, TagField, ValueExpr, fold, validate};
pub use error::{ParseError, Result, SourceLocation};
pub use parser::parse_query;
pub use value::{Port, Proto, Regexp, Value, ValueKind};
