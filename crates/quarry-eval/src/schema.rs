//! Event schemas: structural types, typed values, and field-offset
//! resolution.
//!
//! The schema is an immutable snapshot shared into each compiled
//! expression; it is authoritative for type checks and, in schema mode,
//! for resolving event-clause field names to record offsets.

use quarry_parser::{Regexp, Value, ValueKind};

/// Structural type of a value.
#[derive(Debug, Clone, PartialEq)]
pub enum Type {
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
    Record(Vec<Field>),
    Vector(Box<Type>),
    Set(Box<Type>),
    Table(Box<Type>, Box<Type>),
}

/// A named field within a record type.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub ty: Type,
}

impl Field {
    pub fn new(name: impl Into<String>, ty: Type) -> Self {
        Field {
            name: name.into(),
            ty,
        }
    }
}

impl Type {
    /// The value tag this type describes.
    pub fn kind(&self) -> ValueKind {
        match self {
            Type::Bool => ValueKind::Bool,
            Type::Int => ValueKind::Int,
            Type::UInt => ValueKind::UInt,
            Type::Real => ValueKind::Real,
            Type::Duration => ValueKind::Duration,
            Type::Timestamp => ValueKind::Timestamp,
            Type::String => ValueKind::String,
            Type::Regex => ValueKind::Regex,
            Type::Addr => ValueKind::Addr,
            Type::Subnet => ValueKind::Subnet,
            Type::Port => ValueKind::Port,
            Type::Record(_) => ValueKind::Record,
            Type::Vector(_) => ValueKind::Vector,
            Type::Set(_) => ValueKind::Set,
            Type::Table(_, _) => ValueKind::Table,
        }
    }

    /// Whether the given data has this shape. The invalid value checks
    /// against no type.
    pub fn check(&self, value: &Value) -> bool {
        match (self, value) {
            (Type::Record(fields), Value::Record(values)) => {
                fields.len() == values.len()
                    && fields.iter().zip(values).all(|(f, v)| f.ty.check(v))
            }
            (Type::Vector(elem), Value::Vector(values))
            | (Type::Set(elem), Value::Set(values)) => values.iter().all(|v| elem.check(v)),
            (Type::Table(key, val), Value::Table(entries)) => entries
                .iter()
                .all(|(k, v)| key.check(k) && val.check(v)),
            _ => self.kind() == value.which(),
        }
    }
}

/// Typed representation of data: a `(data, type)` pair where the type
/// witnesses the shape of the data.
#[derive(Debug, Clone, PartialEq)]
pub struct TypedValue {
    data: Value,
    ty: Option<Type>,
}

impl TypedValue {
    /// Construct a type-safe value by checking the data against the type.
    /// A failed check yields the invalid value with an empty type slot.
    pub fn make(data: Value, ty: Type) -> TypedValue {
        if ty.check(&data) {
            TypedValue {
                data,
                ty: Some(ty),
            }
        } else {
            TypedValue {
                data: Value::Invalid,
                ty: None,
            }
        }
    }

    /// Construct an untyped value; the type slot stays empty.
    pub fn untyped(data: Value) -> TypedValue {
        TypedValue { data, ty: None }
    }

    /// Assign a type. Succeeds when the data is invalid or the check
    /// passes; otherwise leaves the value untouched.
    pub fn set_type(&mut self, ty: Type) -> bool {
        if self.data.is_invalid() || ty.check(&self.data) {
            self.ty = Some(ty);
            true
        } else {
            false
        }
    }

    pub fn data(&self) -> &Value {
        &self.data
    }

    pub fn ty(&self) -> Option<&Type> {
        self.ty.as_ref()
    }
}

/// Declaration of one event type: its name and its record fields.
#[derive(Debug, Clone, PartialEq)]
pub struct EventDecl {
    pub name: String,
    pub fields: Vec<Field>,
}

impl EventDecl {
    pub fn new(name: impl Into<String>, fields: Vec<Field>) -> Self {
        EventDecl {
            name: name.into(),
            fields,
        }
    }
}

/// An immutable set of event declarations.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Schema {
    events: Vec<EventDecl>,
}

impl Schema {
    pub fn new(events: Vec<EventDecl>) -> Self {
        Schema { events }
    }

    pub fn events(&self) -> &[EventDecl] {
        &self.events
    }

    /// Look up an event declaration by exact name.
    pub fn event(&self, name: &str) -> Option<&EventDecl> {
        self.events.iter().find(|d| d.name == name)
    }

    /// Resolve a field name to a record offset path for the first event
    /// declaration matching `pattern` (glob-aware). Nested records are
    /// searched depth-first.
    pub fn resolve_offsets(&self, pattern: &str, field: &str) -> Option<Vec<usize>> {
        let decl = if pattern.contains(['*', '?']) {
            let glob = Regexp::glob(pattern).ok()?;
            self.events.iter().find(|d| glob.matches(&d.name))?
        } else {
            self.event(pattern)?
        };
        find_field(&decl.fields, field)
    }
}

fn find_field(fields: &[Field], name: &str) -> Option<Vec<usize>> {
    for (i, field) in fields.iter().enumerate() {
        if field.name == name {
            return Some(vec![i]);
        }
        if let Type::Record(nested) = &field.ty
            && let Some(rest) = find_field(nested, name)
        {
            let mut path = vec![i];
            path.extend(rest);
            return Some(path);
        }
    }
    None
}
