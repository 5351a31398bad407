use std::fmt;

use thiserror::Error;

/// Source location within a query string.
///
/// Attached to syntax errors when position information is available from
/// pest parse failures. Line and column are 1-indexed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceLocation {
    pub line: u32,
    pub col: u32,
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.col)
    }
}

/// Errors that can occur while parsing or validating a query.
#[derive(Debug, Error)]
pub enum ParseError {
    /// The query text was empty (or all whitespace).
    #[error("empty query")]
    Empty,

    /// The query text does not parse.
    #[error("syntax error at {location} in `{query}`: {message}")]
    Syntax {
        query: String,
        location: SourceLocation,
        message: String,
    },

    /// The query parsed but failed semantic validation.
    #[error("semantic error in `{query}`: {message}")]
    Semantic { query: String, message: String },

    /// A literal token could not be converted to a value.
    #[error("invalid literal `{0}`")]
    InvalidLiteral(String),

    /// A constant expression does not fold to a value.
    #[error("cannot fold constant expression: {0}")]
    Fold(String),

    /// A regex literal failed to compile.
    #[error("invalid regex: {0}")]
    Regex(#[from] regex::Error),
}

impl ParseError {
    /// Returns the source location if this error variant carries one.
    pub fn location(&self) -> Option<SourceLocation> {
        match self {
            ParseError::Syntax { location, .. } => Some(*location),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ParseError>;
