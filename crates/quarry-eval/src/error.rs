//! Evaluation-side error types.
//!
//! Errors exist at compile time only: once a query has compiled, `eval`
//! always returns a verdict. Evaluation-time type mismatches surface as
//! the invalid value on the data plane, never as an error.

use thiserror::Error;

/// Errors from compiling queries or converting wire-format events.
#[derive(Debug, Error)]
pub enum EvalError {
    /// The query failed to parse or validate.
    #[error("query error: {0}")]
    Parse(#[from] quarry_parser::ParseError),

    /// A wire-format event was structurally malformed.
    #[error("malformed event: {0}")]
    Event(String),

    /// A wire-format event was not valid JSON.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, EvalError>;
