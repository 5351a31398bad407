use std::cmp::Ordering;
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, TimeDelta, Utc};
use ipnet::IpNet;
use regex::Regex;
use serde::Serialize;

use crate::error::{ParseError, Result};

// =============================================================================
// ValueKind — the closed tag set
// =============================================================================

/// Tag identifying the runtime type of a [`Value`].
///
/// The declaration order is load-bearing: the derived [`Ord`] provides the
/// tag-index ordering that [`Value::total_cmp`] uses for unlike tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    Invalid,
    Bool,
    Int,
    UInt,
    Real,
    Duration,
    Timestamp,
    String,
    Regex,
    Addr,
    Subnet,
    Port,
    Record,
    Vector,
    Set,
    Table,
}

/// Parse a type tag as it appears after `:` in a type clause.
impl FromStr for ValueKind {
    type Err = ();
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "bool" => Ok(ValueKind::Bool),
            "int" => Ok(ValueKind::Int),
            "uint" => Ok(ValueKind::UInt),
            "real" => Ok(ValueKind::Real),
            "duration" => Ok(ValueKind::Duration),
            "time" => Ok(ValueKind::Timestamp),
            "string" => Ok(ValueKind::String),
            "regex" => Ok(ValueKind::Regex),
            "addr" => Ok(ValueKind::Addr),
            "subnet" => Ok(ValueKind::Subnet),
            "port" => Ok(ValueKind::Port),
            "record" => Ok(ValueKind::Record),
            "vector" => Ok(ValueKind::Vector),
            "set" => Ok(ValueKind::Set),
            "table" => Ok(ValueKind::Table),
            _ => Err(()),
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ValueKind::Invalid => "invalid",
            ValueKind::Bool => "bool",
            ValueKind::Int => "int",
            ValueKind::UInt => "uint",
            ValueKind::Real => "real",
            ValueKind::Duration => "duration",
            ValueKind::Timestamp => "time",
            ValueKind::String => "string",
            ValueKind::Regex => "regex",
            ValueKind::Addr => "addr",
            ValueKind::Subnet => "subnet",
            ValueKind::Port => "port",
            ValueKind::Record => "record",
            ValueKind::Vector => "vector",
            ValueKind::Set => "set",
            ValueKind::Table => "table",
        };
        write!(f, "{s}")
    }
}

// =============================================================================
// Regexp — compiled regex values
// =============================================================================

/// A compiled regex value.
///
/// Holds two compilations of the same pattern: an anchored one for the
/// full-string `~` match and an unanchored one for `in` search. Equality
/// and ordering are on the pattern text.
#[derive(Debug, Clone)]
pub struct Regexp {
    pattern: String,
    anchored: Regex,
    unanchored: Regex,
}

impl Regexp {
    /// Compile a pattern.
    pub fn new(pattern: &str) -> Result<Self> {
        let anchored = Regex::new(&format!("^(?:{pattern})$"))?;
        let unanchored = Regex::new(pattern)?;
        Ok(Regexp {
            pattern: pattern.to_string(),
            anchored,
            unanchored,
        })
    }

    /// Compile a glob pattern: `*` becomes `.*`, `?` becomes `.`,
    /// everything else is matched literally.
    pub fn glob(glob: &str) -> Result<Self> {
        let mut pattern = String::new();
        for c in glob.chars() {
            match c {
                '*' => pattern.push_str(".*"),
                '?' => pattern.push('.'),
                _ => pattern.push_str(&regex::escape(&c.to_string())),
            }
        }
        Regexp::new(&pattern)
    }

    /// The pattern text this regex was compiled from.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Full-anchor match: the entire input must match the pattern.
    pub fn matches(&self, s: &str) -> bool {
        self.anchored.is_match(s)
    }

    /// Unanchored search: the pattern must match somewhere in the input.
    pub fn search(&self, s: &str) -> bool {
        self.unanchored.is_match(s)
    }
}

impl PartialEq for Regexp {
    fn eq(&self, other: &Self) -> bool {
        self.pattern == other.pattern
    }
}

impl Eq for Regexp {}

impl fmt::Display for Regexp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}/", self.pattern)
    }
}

// =============================================================================
// Port — transport-layer ports
// =============================================================================

/// Transport protocol of a [`Port`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Proto {
    Unknown,
    Tcp,
    Udp,
    Icmp,
}

impl fmt::Display for Proto {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Proto::Unknown => "?",
            Proto::Tcp => "tcp",
            Proto::Udp => "udp",
            Proto::Icmp => "icmp",
        };
        write!(f, "{s}")
    }
}

/// A transport-layer port: number plus protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Port {
    pub number: u16,
    pub proto: Proto,
}

impl Port {
    pub fn new(number: u16, proto: Proto) -> Self {
        Port { number, proto }
    }
}

impl PartialOrd for Port {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Port {
    fn cmp(&self, other: &Self) -> Ordering {
        self.number
            .cmp(&other.number)
            .then(self.proto.cmp(&other.proto))
    }
}

impl fmt::Display for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.number, self.proto)
    }
}

// =============================================================================
// Value — the tagged runtime value
// =============================================================================

/// A runtime value in the event universe.
///
/// Values carry their tag ([`ValueKind`], via [`Value::which`]) and compare
/// equal only when their tags agree and the payloads agree under the tag's
/// natural equality. [`Value::Invalid`] equals nothing, including itself.
///
/// There is deliberately no `PartialOrd` impl: an ordering consistent with
/// `PartialEq` would have to make the invalid value incomparable, while the
/// order-family relational operators need a total, deterministic order.
/// [`Value::total_cmp`] provides the latter: unlike tags order by tag
/// index, like tags by the tag's natural ordering.
#[derive(Debug, Clone)]
pub enum Value {
    Invalid,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Real(f64),
    Duration(TimeDelta),
    Timestamp(DateTime<Utc>),
    String(String),
    Regex(Regexp),
    Addr(IpAddr),
    Subnet(IpNet),
    Port(Port),
    Record(Vec<Value>),
    Vector(Vec<Value>),
    Set(Vec<Value>),
    Table(Vec<(Value, Value)>),
}

impl Value {
    /// The tag of this value.
    pub fn which(&self) -> ValueKind {
        match self {
            Value::Invalid => ValueKind::Invalid,
            Value::Bool(_) => ValueKind::Bool,
            Value::Int(_) => ValueKind::Int,
            Value::UInt(_) => ValueKind::UInt,
            Value::Real(_) => ValueKind::Real,
            Value::Duration(_) => ValueKind::Duration,
            Value::Timestamp(_) => ValueKind::Timestamp,
            Value::String(_) => ValueKind::String,
            Value::Regex(_) => ValueKind::Regex,
            Value::Addr(_) => ValueKind::Addr,
            Value::Subnet(_) => ValueKind::Subnet,
            Value::Port(_) => ValueKind::Port,
            Value::Record(_) => ValueKind::Record,
            Value::Vector(_) => ValueKind::Vector,
            Value::Set(_) => ValueKind::Set,
            Value::Table(_) => ValueKind::Table,
        }
    }

    pub fn is_invalid(&self) -> bool {
        matches!(self, Value::Invalid)
    }

    /// The boolean payload, if this is a bool.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// The record payload, if this is a record.
    pub fn as_record(&self) -> Option<&[Value]> {
        match self {
            Value::Record(r) => Some(r),
            _ => None,
        }
    }

    /// Deterministic total order over all values.
    ///
    /// Unlike tags order by tag index (declaration order of [`ValueKind`]);
    /// like tags use the natural ordering of the payload. Reals use
    /// `f64::total_cmp`, regexes their pattern text, composites
    /// element-wise lexicographic order. Two invalid values order equal
    /// here even though they never compare equal under `==`.
    pub fn total_cmp(&self, other: &Value) -> Ordering {
        let (lk, rk) = (self.which(), other.which());
        if lk != rk {
            return lk.cmp(&rk);
        }
        match (self, other) {
            (Value::Invalid, Value::Invalid) => Ordering::Equal,
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Int(a), Value::Int(b)) => a.cmp(b),
            (Value::UInt(a), Value::UInt(b)) => a.cmp(b),
            (Value::Real(a), Value::Real(b)) => a.total_cmp(b),
            (Value::Duration(a), Value::Duration(b)) => a.cmp(b),
            (Value::Timestamp(a), Value::Timestamp(b)) => a.cmp(b),
            (Value::String(a), Value::String(b)) => a.cmp(b),
            (Value::Regex(a), Value::Regex(b)) => a.pattern().cmp(b.pattern()),
            (Value::Addr(a), Value::Addr(b)) => a.cmp(b),
            (Value::Subnet(a), Value::Subnet(b)) => a.cmp(b),
            (Value::Port(a), Value::Port(b)) => a.cmp(b),
            (Value::Record(a), Value::Record(b))
            | (Value::Vector(a), Value::Vector(b))
            | (Value::Set(a), Value::Set(b)) => cmp_seq(a, b),
            (Value::Table(a), Value::Table(b)) => {
                for ((ak, av), (bk, bv)) in a.iter().zip(b.iter()) {
                    let ord = ak.total_cmp(bk).then_with(|| av.total_cmp(bv));
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                a.len().cmp(&b.len())
            }
            _ => unreachable!("tags already matched"),
        }
    }
}

fn cmp_seq(a: &[Value], b: &[Value]) -> Ordering {
    for (x, y) in a.iter().zip(b.iter()) {
        let ord = x.total_cmp(y);
        if ord != Ordering::Equal {
            return ord;
        }
    }
    a.len().cmp(&b.len())
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            // The invalid value equals nothing, including itself.
            (Value::Invalid, _) | (_, Value::Invalid) => false,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::UInt(a), Value::UInt(b)) => a == b,
            (Value::Real(a), Value::Real(b)) => a == b,
            (Value::Duration(a), Value::Duration(b)) => a == b,
            (Value::Timestamp(a), Value::Timestamp(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Regex(a), Value::Regex(b)) => a == b,
            (Value::Addr(a), Value::Addr(b)) => a == b,
            (Value::Subnet(a), Value::Subnet(b)) => a == b,
            (Value::Port(a), Value::Port(b)) => a == b,
            (Value::Record(a), Value::Record(b))
            | (Value::Vector(a), Value::Vector(b))
            | (Value::Set(a), Value::Set(b)) => a == b,
            (Value::Table(a), Value::Table(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Invalid => write!(f, "<invalid>"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(n) => write!(f, "{n}"),
            Value::UInt(n) => write!(f, "{n}u"),
            Value::Real(n) => write!(f, "{n}"),
            Value::Duration(d) => write_duration(f, *d),
            Value::Timestamp(t) => {
                write!(f, "{}", t.to_rfc3339_opts(SecondsFormat::AutoSi, true))
            }
            Value::String(s) => write!(f, "\"{s}\""),
            Value::Regex(r) => write!(f, "{r}"),
            Value::Addr(a) => write!(f, "{a}"),
            Value::Subnet(n) => write!(f, "{n}"),
            Value::Port(p) => write!(f, "{p}"),
            Value::Record(vs) => write_seq(f, "(", vs, ")"),
            Value::Vector(vs) => write_seq(f, "[", vs, "]"),
            Value::Set(vs) => write_seq(f, "{", vs, "}"),
            Value::Table(kvs) => {
                write!(f, "{{")?;
                for (i, (k, v)) in kvs.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{k} -> {v}")?;
                }
                write!(f, "}}")
            }
        }
    }
}

fn write_seq(f: &mut fmt::Formatter<'_>, open: &str, vs: &[Value], close: &str) -> fmt::Result {
    write!(f, "{open}")?;
    for (i, v) in vs.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{v}")?;
    }
    write!(f, "{close}")
}

fn write_duration(f: &mut fmt::Formatter<'_>, d: TimeDelta) -> fmt::Result {
    let ns = d.num_nanoseconds().unwrap_or(i64::MAX);
    if ns % 1_000_000_000 == 0 {
        write!(f, "{}s", ns / 1_000_000_000)
    } else if ns % 1_000_000 == 0 {
        write!(f, "{}ms", ns / 1_000_000)
    } else if ns % 1_000 == 0 {
        write!(f, "{}us", ns / 1_000)
    } else {
        write!(f, "{ns}ns")
    }
}

/// Parse a duration literal body: count plus unit suffix.
pub(crate) fn parse_duration(s: &str) -> Result<TimeDelta> {
    let unit_at = s
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(|| ParseError::InvalidLiteral(s.to_string()))?;
    let (count, unit) = s.split_at(unit_at);
    let count: i64 = count
        .parse()
        .map_err(|_| ParseError::InvalidLiteral(s.to_string()))?;
    let nanos = match unit {
        "ns" => 1,
        "us" => 1_000,
        "ms" => 1_000_000,
        "s" => 1_000_000_000,
        "m" => 60_000_000_000,
        "h" => 3_600_000_000_000,
        "d" => 86_400_000_000_000,
        _ => return Err(ParseError::InvalidLiteral(s.to_string())),
    };
    count
        .checked_mul(nanos)
        .map(TimeDelta::nanoseconds)
        .ok_or_else(|| ParseError::InvalidLiteral(s.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn invalid_equals_nothing() {
        assert_ne!(Value::Invalid, Value::Invalid);
        assert_ne!(Value::Invalid, Value::Bool(true));
        assert_ne!(Value::Int(0), Value::Invalid);
    }

    #[test]
    fn like_tags_natural_equality() {
        assert_eq!(Value::Int(7), Value::Int(7));
        assert_ne!(Value::Int(7), Value::Int(8));
        assert_eq!(Value::String("http".into()), Value::String("http".into()));
    }

    #[test]
    fn unlike_tags_never_equal() {
        assert_ne!(Value::Int(7), Value::UInt(7));
        assert_ne!(Value::Bool(true), Value::Int(1));
    }

    #[test]
    fn total_cmp_like_tags() {
        assert_eq!(Value::Int(1).total_cmp(&Value::Int(2)), Ordering::Less);
        assert_eq!(
            Value::String("a".into()).total_cmp(&Value::String("b".into())),
            Ordering::Less
        );
        assert_eq!(
            Value::Real(1.5).total_cmp(&Value::Real(1.5)),
            Ordering::Equal
        );
    }

    #[test]
    fn total_cmp_unlike_tags_uses_tag_index() {
        // Bool is declared before Int, Int before String.
        assert_eq!(Value::Bool(true).total_cmp(&Value::Int(0)), Ordering::Less);
        assert_eq!(
            Value::String("a".into()).total_cmp(&Value::Int(999)),
            Ordering::Greater
        );
    }

    #[test]
    fn total_cmp_invalid_is_equal_to_itself() {
        // Ordering is total even though equality is not.
        assert_eq!(Value::Invalid.total_cmp(&Value::Invalid), Ordering::Equal);
        assert_eq!(Value::Invalid.total_cmp(&Value::Bool(false)), Ordering::Less);
    }

    #[test]
    fn regexp_match_is_anchored() {
        let re = Regexp::new("http.*").unwrap();
        assert!(re.matches("https"));
        assert!(re.matches("http"));
        assert!(!re.matches("xhttp"));
    }

    #[test]
    fn regexp_search_is_unanchored() {
        let re = Regexp::new("ttp").unwrap();
        assert!(!re.matches("https"));
        assert!(re.search("https"));
    }

    #[test]
    fn regexp_glob_lowers_wildcards() {
        let re = Regexp::glob("pcap::*").unwrap();
        assert!(re.matches("pcap::packet"));
        assert!(!re.matches("bro::conn"));

        let re = Regexp::glob("conn?").unwrap();
        assert!(re.matches("conn1"));
        assert!(!re.matches("conn12"));
    }

    #[test]
    fn glob_escapes_regex_metacharacters() {
        let re = Regexp::glob("a.b").unwrap();
        assert!(re.matches("a.b"));
        assert!(!re.matches("axb"));
    }

    #[test]
    fn subnet_contains_address() {
        let net: IpNet = "192.168.0.0/16".parse().unwrap();
        let inside: IpAddr = "192.168.1.5".parse().unwrap();
        let outside: IpAddr = "10.0.0.1".parse().unwrap();
        assert!(net.contains(&inside));
        assert!(!net.contains(&outside));
    }

    #[test]
    fn value_kind_from_str() {
        assert_eq!("addr".parse::<ValueKind>(), Ok(ValueKind::Addr));
        assert_eq!("time".parse::<ValueKind>(), Ok(ValueKind::Timestamp));
        assert!("gibberish".parse::<ValueKind>().is_err());
    }

    #[test]
    fn duration_parse_and_display() {
        assert_eq!(parse_duration("90s").unwrap(), TimeDelta::seconds(90));
        assert_eq!(
            parse_duration("250ms").unwrap(),
            TimeDelta::milliseconds(250)
        );
        assert_eq!(parse_duration("2h").unwrap(), TimeDelta::hours(2));
        assert!(parse_duration("5 parsecs").is_err());
        assert!(parse_duration("12").is_err());

        assert_eq!(
            Value::Duration(TimeDelta::milliseconds(1500)).to_string(),
            "1500ms"
        );
    }

    #[test]
    fn display_round_trips_shapes() {
        let ts = Utc.with_ymd_and_hms(2011, 8, 12, 14, 59, 11).unwrap();
        assert_eq!(Value::Timestamp(ts).to_string(), "2011-08-12T14:59:11Z");
        assert_eq!(
            Value::Record(vec![Value::Int(1), Value::String("x".into())]).to_string(),
            "(1, \"x\")"
        );
        assert_eq!(Value::Port(Port::new(80, Proto::Tcp)).to_string(), "80/tcp");
    }

    #[test]
    fn record_equality_is_element_wise() {
        let a = Value::Record(vec![Value::Int(1), Value::Bool(true)]);
        let b = Value::Record(vec![Value::Int(1), Value::Bool(true)]);
        let c = Value::Record(vec![Value::Int(2), Value::Bool(true)]);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn record_with_invalid_member_never_equal() {
        let a = Value::Record(vec![Value::Invalid]);
        let b = Value::Record(vec![Value::Invalid]);
        assert_ne!(a, b);
    }
}
