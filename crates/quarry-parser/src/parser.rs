//! Query text → AST, using a pest PEG grammar plus a Pratt parser for the
//! boolean operators (`||` < `&&` < `!`).
//!
//! Parsing here is syntax only; semantic checks live in [`crate::ast::validate`].

use std::net::IpAddr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use ipnet::IpNet;
use pest::Parser;
use pest::error::LineColLocation;
use pest::iterators::Pair;
use pest::pratt_parser::{Assoc, Op, PrattParser};
use pest_derive::Parser;

use crate::ast::{ArithOp, Clause, CompareOp, Expr, Literal, TagField, ValueExpr};
use crate::error::{ParseError, Result, SourceLocation};
use crate::value::{self, Port, Proto, ValueKind};

// ---------------------------------------------------------------------------
// Pest parser (generated from query.pest grammar)
// ---------------------------------------------------------------------------

#[derive(Parser)]
#[grammar = "src/query.pest"]
struct QueryParser;

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Parse a query string into an AST.
///
/// Rejects empty input with [`ParseError::Empty`] and surfaces pest
/// failures as [`ParseError::Syntax`] carrying the query text and the
/// 1-indexed source location.
///
/// # Examples
///
/// ```
/// use quarry_parser::parse_query;
///
/// let expr = parse_query(r#"name == "http" && !(id == 7)"#).unwrap();
/// println!("{expr}");
/// ```
pub fn parse_query(input: &str) -> Result<Expr> {
    if input.trim().is_empty() {
        return Err(ParseError::Empty);
    }

    let pairs =
        QueryParser::parse(Rule::query, input).map_err(|e| syntax_error(input, &e))?;

    let pratt = PrattParser::new()
        .op(Op::infix(Rule::or_op, Assoc::Left))
        .op(Op::infix(Rule::and_op, Assoc::Left))
        .op(Op::prefix(Rule::not_op));

    // query = { SOI ~ expr ~ EOI }
    let query_pair = pairs.into_iter().next().unwrap();
    let expr_pair = query_pair
        .into_inner()
        .find(|p| p.as_rule() == Rule::expr)
        .unwrap();

    parse_expr(expr_pair, &pratt)
}

fn syntax_error(query: &str, e: &pest::error::Error<Rule>) -> ParseError {
    let (line, col) = match e.line_col {
        LineColLocation::Pos((l, c)) => (l, c),
        LineColLocation::Span((l, c), _) => (l, c),
    };
    ParseError::Syntax {
        query: query.to_string(),
        location: SourceLocation {
            line: line as u32,
            col: col as u32,
        },
        message: e.variant.message().into_owned(),
    }
}

// ---------------------------------------------------------------------------
// Boolean structure
// ---------------------------------------------------------------------------

fn parse_expr(pair: Pair<'_, Rule>, pratt: &PrattParser<Rule>) -> Result<Expr> {
    pratt
        .map_primary(|primary| match primary.as_rule() {
            Rule::tag_clause => parse_tag_clause(primary),
            Rule::type_clause => parse_type_clause(primary),
            Rule::offset_clause => parse_offset_clause(primary),
            Rule::event_clause => parse_event_clause(primary),
            Rule::expr => parse_expr(primary, pratt),
            other => unreachable!("unexpected primary rule: {other:?}"),
        })
        .map_prefix(|op, rhs| match op.as_rule() {
            Rule::not_op => Ok(Expr::Not(Box::new(rhs?))),
            other => unreachable!("unexpected prefix rule: {other:?}"),
        })
        .map_infix(|lhs, op, rhs| match op.as_rule() {
            Rule::and_op => Ok(merge_binary(Expr::And, lhs?, rhs?)),
            Rule::or_op => Ok(merge_binary(Expr::Or, lhs?, rhs?)),
            other => unreachable!("unexpected infix rule: {other:?}"),
        })
        .parse(pair.into_inner())
}

/// Flatten nested binary operators of the same kind.
/// `a && (b && c)` becomes `And(a, b, c)` instead of `And(a, And(b, c))`.
fn merge_binary(ctor: fn(Vec<Expr>) -> Expr, lhs: Expr, rhs: Expr) -> Expr {
    let is_same = |expr: &Expr| -> bool {
        matches!(
            (&ctor(vec![]), expr),
            (Expr::And(_), Expr::And(_)) | (Expr::Or(_), Expr::Or(_))
        )
    };

    let mut args = Vec::new();
    for side in [lhs, rhs] {
        if is_same(&side) {
            match side {
                Expr::And(children) | Expr::Or(children) => args.extend(children),
                _ => unreachable!(),
            }
        } else {
            args.push(side);
        }
    }

    ctor(args)
}

// ---------------------------------------------------------------------------
// Clauses
// ---------------------------------------------------------------------------

fn parse_tag_clause(pair: Pair<'_, Rule>) -> Result<Expr> {
    let mut inner = pair.into_inner();
    let field = match inner.next().expect("tag clause has a field").as_str() {
        "name" => TagField::Name,
        "time" => TagField::Time,
        "id" => TagField::Id,
        other => unreachable!("unexpected tag field: {other}"),
    };
    let op = compare_op(inner.next().expect("tag clause has an operator"));
    let rhs = parse_value_expr(inner.next().expect("tag clause has a value"))?;
    Ok(Expr::Clause(Clause::Tag { field, op, rhs }))
}

fn parse_type_clause(pair: Pair<'_, Rule>) -> Result<Expr> {
    let mut inner = pair.into_inner();
    let kind: ValueKind = inner
        .next()
        .expect("type clause has a tag")
        .as_str()
        .parse()
        .expect("grammar enumerates the type tags");
    let op = compare_op(inner.next().expect("type clause has an operator"));
    let rhs = parse_value_expr(inner.next().expect("type clause has a value"))?;
    Ok(Expr::Clause(Clause::Type { kind, op, rhs }))
}

fn parse_offset_clause(pair: Pair<'_, Rule>) -> Result<Expr> {
    let mut inner = pair.into_inner();
    let offsets_pair = inner.next().expect("offset clause has offsets");
    let offsets = offsets_pair
        .as_str()
        .trim_start_matches('@')
        .split('.')
        .map(|o| {
            o.parse::<usize>()
                .map_err(|_| ParseError::InvalidLiteral(o.to_string()))
        })
        .collect::<Result<Vec<_>>>()?;
    let op = compare_op(inner.next().expect("offset clause has an operator"));
    let rhs = parse_value_expr(inner.next().expect("offset clause has a value"))?;
    Ok(Expr::Clause(Clause::Offset { offsets, op, rhs }))
}

fn parse_event_clause(pair: Pair<'_, Rule>) -> Result<Expr> {
    let mut pattern = None;
    let mut field = None;
    let mut op = None;
    let mut rhs = None;

    for p in pair.into_inner() {
        match p.as_rule() {
            Rule::event_pattern => pattern = Some(p.as_str().to_string()),
            Rule::field_name => field = Some(p.as_str().to_string()),
            Rule::rel_op => op = Some(compare_op(p)),
            Rule::value_expr => rhs = Some(parse_value_expr(p)?),
            other => unreachable!("unexpected event clause rule: {other:?}"),
        }
    }

    Ok(Expr::Clause(Clause::Event {
        pattern: pattern.expect("event clause has a pattern"),
        field,
        op: op.expect("event clause has an operator"),
        rhs: rhs.expect("event clause has a value"),
    }))
}

fn compare_op(pair: Pair<'_, Rule>) -> CompareOp {
    match pair.as_str() {
        "~" => CompareOp::Match,
        "!~" => CompareOp::NotMatch,
        "in" => CompareOp::In,
        "!in" => CompareOp::NotIn,
        "==" => CompareOp::Equal,
        "!=" => CompareOp::NotEqual,
        "<" => CompareOp::Less,
        "<=" => CompareOp::LessEqual,
        ">" => CompareOp::Greater,
        ">=" => CompareOp::GreaterEqual,
        other => unreachable!("unexpected relational operator: {other}"),
    }
}

// ---------------------------------------------------------------------------
// Constant expressions
// ---------------------------------------------------------------------------

fn parse_value_expr(pair: Pair<'_, Rule>) -> Result<ValueExpr> {
    // value_expr = { term ~ (add_op ~ term)* }
    let mut inner = pair.into_inner();
    let mut acc = parse_term(inner.next().expect("value expression has a term"))?;
    while let Some(op_pair) = inner.next() {
        let op = match op_pair.as_str() {
            "+" => ArithOp::Add,
            "-" => ArithOp::Sub,
            other => unreachable!("unexpected additive operator: {other}"),
        };
        let rhs = parse_term(inner.next().expect("additive operator has a right side"))?;
        acc = ValueExpr::Binary {
            op,
            lhs: Box::new(acc),
            rhs: Box::new(rhs),
        };
    }
    Ok(acc)
}

fn parse_term(pair: Pair<'_, Rule>) -> Result<ValueExpr> {
    // term = { factor ~ (mul_op ~ factor)* }
    let mut inner = pair.into_inner();
    let mut acc = parse_factor(inner.next().expect("term has a factor"))?;
    while let Some(op_pair) = inner.next() {
        let op = match op_pair.as_str() {
            "*" => ArithOp::Mul,
            "/" => ArithOp::Div,
            other => unreachable!("unexpected multiplicative operator: {other}"),
        };
        let rhs = parse_factor(inner.next().expect("multiplicative operator has a right side"))?;
        acc = ValueExpr::Binary {
            op,
            lhs: Box::new(acc),
            rhs: Box::new(rhs),
        };
    }
    Ok(acc)
}

fn parse_factor(pair: Pair<'_, Rule>) -> Result<ValueExpr> {
    // factor = { neg_op? ~ atom }; atom is silent, so the literal (or a
    // parenthesized value_expr) appears directly.
    let mut negated = false;
    let mut result = None;
    for p in pair.into_inner() {
        match p.as_rule() {
            Rule::neg_op => negated = true,
            Rule::value_expr => result = Some(parse_value_expr(p)?),
            _ => result = Some(ValueExpr::Literal(parse_literal(p)?)),
        }
    }
    let expr = result.expect("factor has an atom");
    Ok(if negated {
        ValueExpr::Neg(Box::new(expr))
    } else {
        expr
    })
}

fn parse_literal(pair: Pair<'_, Rule>) -> Result<Literal> {
    let s = pair.as_str();
    let invalid = || ParseError::InvalidLiteral(s.to_string());
    match pair.as_rule() {
        Rule::timestamp_lit => parse_timestamp(s).map(Literal::Timestamp),
        Rule::subnet_lit => s
            .parse::<IpNet>()
            .map(|n| Literal::Subnet(n.trunc()))
            .map_err(|_| invalid()),
        Rule::addr_lit => s.parse::<IpAddr>().map(Literal::Addr).map_err(|_| invalid()),
        Rule::port_lit => {
            let (number, proto) = s.split_once('/').ok_or_else(invalid)?;
            let number: u16 = number.parse().map_err(|_| invalid())?;
            let proto = match proto {
                "tcp" => Proto::Tcp,
                "udp" => Proto::Udp,
                "icmp" => Proto::Icmp,
                _ => Proto::Unknown,
            };
            Ok(Literal::Port(Port::new(number, proto)))
        }
        Rule::duration_lit => value::parse_duration(s).map(Literal::Duration),
        Rule::uint_lit => s
            .strip_suffix('u')
            .and_then(|d| d.parse::<u64>().ok())
            .map(Literal::UInt)
            .ok_or_else(invalid),
        Rule::real_lit => s.parse::<f64>().map(Literal::Real).map_err(|_| invalid()),
        Rule::int_lit => s.parse::<i64>().map(Literal::Int).map_err(|_| invalid()),
        Rule::bool_lit => Ok(Literal::Bool(s == "true")),
        Rule::string_lit => Ok(Literal::String(unescape_string(
            &s[1..s.len() - 1],
        ))),
        Rule::regex_lit => Ok(Literal::Regex(unescape_regex(&s[1..s.len() - 1]))),
        other => unreachable!("unexpected literal rule: {other:?}"),
    }
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    // Naive date-times are taken as UTC.
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f") {
        return Ok(naive.and_utc());
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Ok(date.and_time(NaiveTime::MIN).and_utc());
    }
    Err(ParseError::InvalidLiteral(s.to_string()))
}

fn unescape_string(inner: &str) -> String {
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('"') => out.push('"'),
            Some('\\') => out.push('\\'),
            // backslash before anything else: keep both
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

/// Only the delimiter is escapable inside `/…/`; every other escape
/// belongs to the regex engine and passes through untouched.
fn unescape_regex(inner: &str) -> String {
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' && chars.peek() == Some(&'/') {
            out.push('/');
            chars.next();
        } else {
            out.push(c);
        }
    }
    out
}

// =============================================================================
// Tests
// =============================================================================
