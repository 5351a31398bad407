//! AST types for parsed queries: boolean structure, clauses, relational
//! operators, and constant (right-hand-side) expressions with folding.

use std::fmt;
use std::net::IpAddr;

use chrono::{DateTime, TimeDelta, Utc};
use ipnet::IpNet;
use serde::{Serialize, Serializer};

use crate::error::{ParseError, Result};
use crate::value::{Port, Regexp, Value, ValueKind};

// =============================================================================
// Boolean structure
// =============================================================================

/// The boolean skeleton of a query.
///
/// `And`/`Or` are n-ary; the parser flattens same-operator nesting, so
/// `a && b && c` is a single `And` with three children.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Expr {
    Clause(Clause),
    Not(Box<Expr>),
    And(Vec<Expr>),
    Or(Vec<Expr>),
}

/// A single predicate clause.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Clause {
    /// `name == "http"`, `time > 2011-08-12`, `id != 42`
    Tag {
        field: TagField,
        op: CompareOp,
        rhs: ValueExpr,
    },
    /// `:addr in 192.168.0.0/16`
    Type {
        kind: ValueKind,
        op: CompareOp,
        rhs: ValueExpr,
    },
    /// `@0.1 >= 100`
    Offset {
        offsets: Vec<usize>,
        op: CompareOp,
        rhs: ValueExpr,
    },
    /// `conn* : == 443` or `conn : service == "http"`
    Event {
        pattern: String,
        field: Option<String>,
        op: CompareOp,
        rhs: ValueExpr,
    },
}

impl Clause {
    pub fn op(&self) -> CompareOp {
        match self {
            Clause::Tag { op, .. }
            | Clause::Type { op, .. }
            | Clause::Offset { op, .. }
            | Clause::Event { op, .. } => *op,
        }
    }

    pub fn rhs(&self) -> &ValueExpr {
        match self {
            Clause::Tag { rhs, .. }
            | Clause::Type { rhs, .. }
            | Clause::Offset { rhs, .. }
            | Clause::Event { rhs, .. } => rhs,
        }
    }
}

/// Event attribute on the left-hand side of a tag clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TagField {
    Name,
    Time,
    Id,
}

impl fmt::Display for TagField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TagField::Name => "name",
            TagField::Time => "time",
            TagField::Id => "id",
        };
        write!(f, "{s}")
    }
}

// =============================================================================
// Relational operators
// =============================================================================

/// The closed set of relational operator kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    Match,
    NotMatch,
    In,
    NotIn,
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
}

impl CompareOp {
    /// The logical negation of this operator, used when a `!` is pushed
    /// down onto a clause.
    pub fn negate(self) -> Self {
        match self {
            CompareOp::Match => CompareOp::NotMatch,
            CompareOp::NotMatch => CompareOp::Match,
            CompareOp::In => CompareOp::NotIn,
            CompareOp::NotIn => CompareOp::In,
            CompareOp::Equal => CompareOp::NotEqual,
            CompareOp::NotEqual => CompareOp::Equal,
            CompareOp::Less => CompareOp::GreaterEqual,
            CompareOp::LessEqual => CompareOp::Greater,
            CompareOp::Greater => CompareOp::LessEqual,
            CompareOp::GreaterEqual => CompareOp::Less,
        }
    }

    /// Whether this is `<`, `<=`, `>` or `>=`.
    pub fn is_order(self) -> bool {
        matches!(
            self,
            CompareOp::Less | CompareOp::LessEqual | CompareOp::Greater | CompareOp::GreaterEqual
        )
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CompareOp::Match => "~",
            CompareOp::NotMatch => "!~",
            CompareOp::In => "in",
            CompareOp::NotIn => "!in",
            CompareOp::Equal => "==",
            CompareOp::NotEqual => "!=",
            CompareOp::Less => "<",
            CompareOp::LessEqual => "<=",
            CompareOp::Greater => ">",
            CompareOp::GreaterEqual => ">=",
        };
        write!(f, "{s}")
    }
}

// =============================================================================
// Constant expressions
// =============================================================================

/// A right-hand-side constant expression, folded to a [`Value`] at compile
/// time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ValueExpr {
    Literal(Literal),
    Neg(Box<ValueExpr>),
    Binary {
        op: ArithOp,
        lhs: Box<ValueExpr>,
        rhs: Box<ValueExpr>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl fmt::Display for ArithOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ArithOp::Add => "+",
            ArithOp::Sub => "-",
            ArithOp::Mul => "*",
            ArithOp::Div => "/",
        };
        write!(f, "{s}")
    }
}

/// A literal token, as written in the query.
///
/// Regex literals keep their pattern text; compilation happens at fold
/// time so a parse tree stays plain data.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Literal {
    Bool(bool),
    Int(i64),
    UInt(u64),
    Real(f64),
    #[serde(serialize_with = "serialize_timedelta")]
    Duration(TimeDelta),
    Timestamp(DateTime<Utc>),
    String(String),
    Regex(String),
    Addr(IpAddr),
    Subnet(IpNet),
    Port(Port),
}

fn serialize_timedelta<S: Serializer>(d: &TimeDelta, s: S) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_i64(d.num_nanoseconds().unwrap_or(i64::MAX))
}

impl Literal {
    /// Convert to a runtime value, compiling regex patterns.
    pub fn to_value(&self) -> Result<Value> {
        Ok(match self {
            Literal::Bool(b) => Value::Bool(*b),
            Literal::Int(n) => Value::Int(*n),
            Literal::UInt(n) => Value::UInt(*n),
            Literal::Real(f) => Value::Real(*f),
            Literal::Duration(d) => Value::Duration(*d),
            Literal::Timestamp(t) => Value::Timestamp(*t),
            Literal::String(s) => Value::String(s.clone()),
            Literal::Regex(pattern) => Value::Regex(Regexp::new(pattern)?),
            Literal::Addr(a) => Value::Addr(*a),
            Literal::Subnet(n) => Value::Subnet(*n),
            Literal::Port(p) => Value::Port(*p),
        })
    }
}

/// Fold a constant expression to a single value.
///
/// Arithmetic is checked: overflow, division by zero, and operand tags
/// outside the supported combinations are fold errors. Supported:
/// int/int, uint/uint, real/real, duration±duration, timestamp±duration,
/// timestamp−timestamp.
pub fn fold(expr: &ValueExpr) -> Result<Value> {
    match expr {
        ValueExpr::Literal(lit) => lit.to_value(),
        ValueExpr::Neg(inner) => match fold(inner)? {
            Value::Int(n) => n
                .checked_neg()
                .map(Value::Int)
                .ok_or_else(|| ParseError::Fold("integer overflow".into())),
            Value::Real(f) => Ok(Value::Real(-f)),
            Value::Duration(d) => TimeDelta::zero()
                .checked_sub(&d)
                .map(Value::Duration)
                .ok_or_else(|| ParseError::Fold("duration overflow".into())),
            v => Err(ParseError::Fold(format!("cannot negate {}", v.which()))),
        },
        ValueExpr::Binary { op, lhs, rhs } => fold_binary(*op, fold(lhs)?, fold(rhs)?),
    }
}

fn fold_binary(op: ArithOp, lhs: Value, rhs: Value) -> Result<Value> {
    let overflow = || ParseError::Fold("arithmetic overflow".into());
    match (op, lhs, rhs) {
        (_, Value::Int(a), Value::Int(b)) => {
            let r = match op {
                ArithOp::Add => a.checked_add(b),
                ArithOp::Sub => a.checked_sub(b),
                ArithOp::Mul => a.checked_mul(b),
                ArithOp::Div => a.checked_div(b),
            };
            r.map(Value::Int).ok_or_else(overflow)
        }
        (_, Value::UInt(a), Value::UInt(b)) => {
            let r = match op {
                ArithOp::Add => a.checked_add(b),
                ArithOp::Sub => a.checked_sub(b),
                ArithOp::Mul => a.checked_mul(b),
                ArithOp::Div => a.checked_div(b),
            };
            r.map(Value::UInt).ok_or_else(overflow)
        }
        (_, Value::Real(a), Value::Real(b)) => {
            let r = match op {
                ArithOp::Add => a + b,
                ArithOp::Sub => a - b,
                ArithOp::Mul => a * b,
                ArithOp::Div => a / b,
            };
            Ok(Value::Real(r))
        }
        (ArithOp::Add, Value::Duration(a), Value::Duration(b)) => {
            a.checked_add(&b).map(Value::Duration).ok_or_else(overflow)
        }
        (ArithOp::Sub, Value::Duration(a), Value::Duration(b)) => {
            a.checked_sub(&b).map(Value::Duration).ok_or_else(overflow)
        }
        (ArithOp::Add, Value::Timestamp(t), Value::Duration(d)) => t
            .checked_add_signed(d)
            .map(Value::Timestamp)
            .ok_or_else(overflow),
        (ArithOp::Sub, Value::Timestamp(t), Value::Duration(d)) => t
            .checked_sub_signed(d)
            .map(Value::Timestamp)
            .ok_or_else(overflow),
        (ArithOp::Sub, Value::Timestamp(a), Value::Timestamp(b)) => {
            Ok(Value::Duration(a.signed_duration_since(b)))
        }
        (op, lhs, rhs) => Err(ParseError::Fold(format!(
            "no `{op}` over {} and {}",
            lhs.which(),
            rhs.which()
        ))),
    }
}

// =============================================================================
// Semantic validation
// =============================================================================

/// Validate a parsed query against the static rules of the language.
///
/// Every right-hand side must fold; `~`/`!~` require a regex; `in`/`!in`
/// a regex or subnet; order operators reject regexes; `time` clauses take
/// timestamps and `id` clauses integers.
pub fn validate(query: &str, expr: &Expr) -> Result<()> {
    match expr {
        Expr::Clause(clause) => validate_clause(query, clause),
        Expr::Not(inner) => validate(query, inner),
        Expr::And(children) | Expr::Or(children) => {
            children.iter().try_for_each(|c| validate(query, c))
        }
    }
}

fn validate_clause(query: &str, clause: &Clause) -> Result<()> {
    let semantic = |message: String| ParseError::Semantic {
        query: query.to_string(),
        message,
    };

    let folded = fold(clause.rhs()).map_err(|e| semantic(e.to_string()))?;
    let tag = folded.which();
    let op = clause.op();

    match op {
        CompareOp::Match | CompareOp::NotMatch => {
            if tag != ValueKind::Regex {
                return Err(semantic(format!("`{op}` requires a regex, got {tag}")));
            }
        }
        CompareOp::In | CompareOp::NotIn => {
            if tag != ValueKind::Regex && tag != ValueKind::Subnet {
                return Err(semantic(format!(
                    "`{op}` requires a regex or subnet, got {tag}"
                )));
            }
        }
        _ => {
            if op.is_order() && tag == ValueKind::Regex {
                return Err(semantic(format!("regexes admit no `{op}` ordering")));
            }
        }
    }

    match clause {
        Clause::Tag {
            field: TagField::Time,
            ..
        } => {
            if tag != ValueKind::Timestamp {
                return Err(semantic(format!(
                    "`time` compares against timestamps, got {tag}"
                )));
            }
        }
        Clause::Tag {
            field: TagField::Id,
            ..
        } => {
            if tag != ValueKind::Int && tag != ValueKind::UInt {
                return Err(semantic(format!(
                    "`id` compares against integers, got {tag}"
                )));
            }
        }
        Clause::Tag {
            field: TagField::Name,
            ..
        } => {
            if tag != ValueKind::String && tag != ValueKind::Regex {
                return Err(semantic(format!(
                    "`name` compares against strings or regexes, got {tag}"
                )));
            }
        }
        _ => {}
    }

    Ok(())
}

// =============================================================================
// Display
// =============================================================================

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Clause(c) => write!(f, "{c}"),
            Expr::Not(inner) => write!(f, "! {inner}"),
            Expr::And(children) => write_joined(f, children, " && "),
            Expr::Or(children) => write_joined(f, children, " || "),
        }
    }
}

fn write_joined(f: &mut fmt::Formatter<'_>, children: &[Expr], sep: &str) -> fmt::Result {
    write!(f, "(")?;
    for (i, c) in children.iter().enumerate() {
        if i > 0 {
            write!(f, "{sep}")?;
        }
        write!(f, "{c}")?;
    }
    write!(f, ")")
}

impl fmt::Display for Clause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Clause::Tag { field, op, rhs } => write!(f, "{field} {op} {rhs}"),
            Clause::Type { kind, op, rhs } => write!(f, ":{kind} {op} {rhs}"),
            Clause::Offset { offsets, op, rhs } => {
                write!(f, "@")?;
                for (i, o) in offsets.iter().enumerate() {
                    if i > 0 {
                        write!(f, ".")?;
                    }
                    write!(f, "{o}")?;
                }
                write!(f, " {op} {rhs}")
            }
            Clause::Event {
                pattern,
                field,
                op,
                rhs,
            } => match field {
                Some(field) => write!(f, "{pattern} : {field} {op} {rhs}"),
                None => write!(f, "{pattern} : {op} {rhs}"),
            },
        }
    }
}

impl fmt::Display for ValueExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueExpr::Literal(lit) => write!(f, "{lit}"),
            ValueExpr::Neg(inner) => write!(f, "-{inner}"),
            ValueExpr::Binary { op, lhs, rhs } => write!(f, "({lhs} {op} {rhs})"),
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Regex(pattern) => write!(f, "/{pattern}/"),
            // The folded rendering is the written one for everything else.
            other => match other.to_value() {
                Ok(v) => write!(f, "{v}"),
                Err(_) => write!(f, "<bad literal>"),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn lit(l: Literal) -> ValueExpr {
        ValueExpr::Literal(l)
    }

    fn binary(op: ArithOp, lhs: ValueExpr, rhs: ValueExpr) -> ValueExpr {
        ValueExpr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    #[test]
    fn negate_is_an_involution() {
        for op in [
            CompareOp::Match,
            CompareOp::NotMatch,
            CompareOp::In,
            CompareOp::NotIn,
            CompareOp::Equal,
            CompareOp::NotEqual,
            CompareOp::Less,
            CompareOp::LessEqual,
            CompareOp::Greater,
            CompareOp::GreaterEqual,
        ] {
            assert_eq!(op.negate().negate(), op);
        }
    }

    #[test]
    fn negate_order_operators() {
        assert_eq!(CompareOp::Less.negate(), CompareOp::GreaterEqual);
        assert_eq!(CompareOp::LessEqual.negate(), CompareOp::Greater);
        assert_eq!(CompareOp::Greater.negate(), CompareOp::LessEqual);
        assert_eq!(CompareOp::GreaterEqual.negate(), CompareOp::Less);
    }

    #[test]
    fn fold_literals() {
        assert_eq!(fold(&lit(Literal::Int(7))).unwrap(), Value::Int(7));
        assert_eq!(
            fold(&lit(Literal::String("x".into()))).unwrap(),
            Value::String("x".into())
        );
    }

    #[test]
    fn fold_arithmetic() {
        let e = binary(
            ArithOp::Add,
            lit(Literal::Int(40)),
            binary(ArithOp::Mul, lit(Literal::Int(2)), lit(Literal::Int(1))),
        );
        assert_eq!(fold(&e).unwrap(), Value::Int(42));
    }

    #[test]
    fn fold_unary_negation() {
        let e = ValueExpr::Neg(Box::new(lit(Literal::Int(7))));
        assert_eq!(fold(&e).unwrap(), Value::Int(-7));
    }

    #[test]
    fn fold_timestamp_minus_duration() {
        let ts = Utc.with_ymd_and_hms(2011, 8, 12, 15, 0, 0).unwrap();
        let e = binary(
            ArithOp::Sub,
            lit(Literal::Timestamp(ts)),
            lit(Literal::Duration(TimeDelta::minutes(30))),
        );
        let expected = Utc.with_ymd_and_hms(2011, 8, 12, 14, 30, 0).unwrap();
        assert_eq!(fold(&e).unwrap(), Value::Timestamp(expected));
    }

    #[test]
    fn fold_rejects_mixed_tags() {
        let e = binary(ArithOp::Add, lit(Literal::Int(1)), lit(Literal::Real(1.0)));
        assert!(matches!(fold(&e), Err(ParseError::Fold(_))));
    }

    #[test]
    fn fold_rejects_division_by_zero() {
        let e = binary(ArithOp::Div, lit(Literal::Int(1)), lit(Literal::Int(0)));
        assert!(matches!(fold(&e), Err(ParseError::Fold(_))));
    }

    #[test]
    fn fold_rejects_overflow() {
        let e = binary(
            ArithOp::Add,
            lit(Literal::Int(i64::MAX)),
            lit(Literal::Int(1)),
        );
        assert!(matches!(fold(&e), Err(ParseError::Fold(_))));
    }

    #[test]
    fn validate_match_requires_regex() {
        let expr = Expr::Clause(Clause::Tag {
            field: TagField::Name,
            op: CompareOp::Match,
            rhs: lit(Literal::String("http".into())),
        });
        assert!(matches!(
            validate("name ~ \"http\"", &expr),
            Err(ParseError::Semantic { .. })
        ));
    }

    #[test]
    fn validate_in_requires_regex_or_subnet() {
        let subnet: IpNet = "10.0.0.0/8".parse().unwrap();
        let good = Expr::Clause(Clause::Type {
            kind: ValueKind::Addr,
            op: CompareOp::In,
            rhs: lit(Literal::Subnet(subnet)),
        });
        assert!(validate(":addr in 10.0.0.0/8", &good).is_ok());

        let bad = Expr::Clause(Clause::Type {
            kind: ValueKind::Addr,
            op: CompareOp::In,
            rhs: lit(Literal::Int(5)),
        });
        assert!(matches!(
            validate(":addr in 5", &bad),
            Err(ParseError::Semantic { .. })
        ));
    }

    #[test]
    fn validate_time_requires_timestamp() {
        let expr = Expr::Clause(Clause::Tag {
            field: TagField::Time,
            op: CompareOp::Greater,
            rhs: lit(Literal::Int(5)),
        });
        assert!(matches!(
            validate("time > 5", &expr),
            Err(ParseError::Semantic { .. })
        ));
    }

    #[test]
    fn validate_id_requires_integer() {
        let ok = Expr::Clause(Clause::Tag {
            field: TagField::Id,
            op: CompareOp::Equal,
            rhs: lit(Literal::Int(7)),
        });
        assert!(validate("id == 7", &ok).is_ok());

        let bad = Expr::Clause(Clause::Tag {
            field: TagField::Id,
            op: CompareOp::Equal,
            rhs: lit(Literal::String("7".into())),
        });
        assert!(matches!(
            validate("id == \"7\"", &bad),
            Err(ParseError::Semantic { .. })
        ));
    }

    #[test]
    fn ast_serializes_to_json() {
        let expr = Expr::Clause(Clause::Tag {
            field: TagField::Name,
            op: CompareOp::Equal,
            rhs: lit(Literal::String("http".into())),
        });
        let json = serde_json::to_string(&expr).unwrap();
        assert!(json.contains("equal"), "got: {json}");
        assert!(json.contains("http"), "got: {json}");
    }

    #[test]
    fn validate_recurses_into_boolean_structure() {
        let bad = Expr::And(vec![
            Expr::Clause(Clause::Tag {
                field: TagField::Id,
                op: CompareOp::Equal,
                rhs: lit(Literal::Int(1)),
            }),
            Expr::Not(Box::new(Expr::Clause(Clause::Tag {
                field: TagField::Time,
                op: CompareOp::Less,
                rhs: lit(Literal::Bool(true)),
            }))),
        ]);
        assert!(validate("id == 1 && ! (time < true)", &bad).is_err());
    }
}
