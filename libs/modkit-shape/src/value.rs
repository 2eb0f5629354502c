//! Tagged value model exchanged through the type-erased accessors.
//!
//! Every member read or written through a [`TypeReadAccessor`] /
//! [`TypeWriteAccessor`] travels as a [`Value`]. Concrete member types opt in
//! through [`MemberValue`]; conversions are strict except for integer to
//! float widening and range-checked integer narrowing.
//!
//! [`TypeReadAccessor`]: crate::TypeReadAccessor
//! [`TypeWriteAccessor`]: crate::TypeWriteAccessor

use std::fmt;

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use uuid::Uuid;

use crate::error::ValueError;

/// Ordered list of named values; the representation of composite members.
pub type ValueMap = Vec<(String, Value)>;

#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Uuid(Uuid),
    DateTime(DateTime<Utc>),
    Date(NaiveDate),
    List(Vec<Value>),
    Object(ValueMap),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Null,
    Bool,
    Int,
    Float,
    String,
    Uuid,
    DateTime,
    Date,
    List,
    Object,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueKind::Null => "null",
            ValueKind::Bool => "bool",
            ValueKind::Int => "int",
            ValueKind::Float => "float",
            ValueKind::String => "string",
            ValueKind::Uuid => "uuid",
            ValueKind::DateTime => "datetime",
            ValueKind::Date => "date",
            ValueKind::List => "list",
            ValueKind::Object => "object",
        };
        f.write_str(name)
    }
}

impl Value {
    #[must_use]
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Null => ValueKind::Null,
            Value::Bool(_) => ValueKind::Bool,
            Value::Int(_) => ValueKind::Int,
            Value::Float(_) => ValueKind::Float,
            Value::String(_) => ValueKind::String,
            Value::Uuid(_) => ValueKind::Uuid,
            Value::DateTime(_) => ValueKind::DateTime,
            Value::Date(_) => ValueKind::Date,
            Value::List(_) => ValueKind::List,
            Value::Object(_) => ValueKind::Object,
        }
    }

    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Look up a member of an object value by exact name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        match self {
            Value::Object(entries) => entries.iter().find(|(k, _)| k == name).map(|(_, v)| v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Render as plain JSON, keys unchanged.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Float(x) => serde_json::Number::from_f64(*x)
                .map_or(serde_json::Value::Null, serde_json::Value::Number),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Uuid(u) => serde_json::Value::String(u.hyphenated().to_string()),
            Value::DateTime(dt) => {
                serde_json::Value::String(dt.to_rfc3339_opts(SecondsFormat::AutoSi, true))
            }
            Value::Date(d) => serde_json::Value::String(d.format("%Y-%m-%d").to_string()),
            Value::List(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
            Value::Object(entries) => serde_json::Value::Object(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
        }
    }

    /// Decode JSON guided by a declared type.
    ///
    /// Wire strings are parsed into `Uuid`, `DateTime` and `Date` values when
    /// the declared type asks for them. Composite members are decoded without
    /// type guidance; use [`MemberValue::decode_json`] of the concrete type to
    /// decode nested members precisely.
    ///
    /// # Errors
    /// Returns `ValueError::TypeMismatch` when the JSON shape does not match.
    pub fn from_json(json: &serde_json::Value, declared: &DeclaredType) -> Result<Value, ValueError> {
        match declared {
            DeclaredType::Optional(inner) => {
                if json.is_null() {
                    Ok(Value::Null)
                } else {
                    Value::from_json(json, inner)
                }
            }
            DeclaredType::Collection(inner) => match json {
                serde_json::Value::Array(items) => items
                    .iter()
                    .map(|item| Value::from_json(item, inner))
                    .collect::<Result<Vec<_>, _>>()
                    .map(Value::List),
                other => Err(ValueError::mismatch(
                    declared.to_string(),
                    Value::untyped(other).kind(),
                )),
            },
            DeclaredType::Composite(_) => Ok(Value::untyped(json)),
            DeclaredType::Primitive(kind) => Value::primitive_from_json(json, *kind),
        }
    }

    fn primitive_from_json(json: &serde_json::Value, kind: ValueKind) -> Result<Value, ValueError> {
        let raw = Value::untyped(json);
        let text = raw.as_str();
        let parsed = match kind {
            ValueKind::Uuid => text.and_then(|s| Uuid::parse_str(s).ok()).map(Value::Uuid),
            ValueKind::DateTime => text
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|dt| Value::DateTime(dt.with_timezone(&Utc))),
            ValueKind::Date => text
                .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
                .map(Value::Date),
            _ => return Ok(raw),
        };
        parsed.ok_or_else(|| ValueError::mismatch(kind.to_string(), raw.kind()))
    }

    /// Decode JSON with no type guidance: strings stay strings.
    #[must_use]
    pub fn untyped(json: &serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => n
                .as_i64()
                .map(Value::Int)
                .or_else(|| n.as_f64().map(Value::Float))
                .unwrap_or(Value::Null),
            serde_json::Value::String(s) => Value::String(s.clone()),
            serde_json::Value::Array(items) => Value::List(items.iter().map(Value::untyped).collect()),
            serde_json::Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), Value::untyped(v)))
                    .collect(),
            ),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_json())
    }
}

/// Semantic type of a member as recorded in its descriptor.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum DeclaredType {
    Primitive(ValueKind),
    Composite(&'static str),
    Collection(Box<DeclaredType>),
    Optional(Box<DeclaredType>),
}

impl DeclaredType {
    #[must_use]
    pub fn collection_of(inner: DeclaredType) -> Self {
        DeclaredType::Collection(Box::new(inner))
    }

    #[must_use]
    pub fn optional(inner: DeclaredType) -> Self {
        DeclaredType::Optional(Box::new(inner))
    }
}

impl fmt::Display for DeclaredType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeclaredType::Primitive(kind) => write!(f, "{kind}"),
            DeclaredType::Composite(name) => f.write_str(name),
            DeclaredType::Collection(inner) => write!(f, "list<{inner}>"),
            DeclaredType::Optional(inner) => write!(f, "{inner}?"),
        }
    }
}

/// Conversion between a concrete member type and [`Value`].
///
/// Implemented for the primitive types below, for `Option<T>`, `Vec<T>`,
/// and generated by `#[derive(Accessible)]` for composites.
pub trait MemberValue: Sized {
    fn declared_type() -> DeclaredType;

    fn to_value(&self) -> Value;

    /// # Errors
    /// Returns `ValueError` when `value` does not match the member type.
    fn from_value(value: Value) -> Result<Self, ValueError>;

    /// Decode wire JSON into a `Value` accepted by [`MemberValue::from_value`].
    ///
    /// # Errors
    /// Returns `ValueError` when the JSON shape does not match.
    fn decode_json(json: &serde_json::Value) -> Result<Value, ValueError> {
        Value::from_json(json, &Self::declared_type())
    }
}

impl MemberValue for Value {
    fn declared_type() -> DeclaredType {
        DeclaredType::Composite("any")
    }

    fn to_value(&self) -> Value {
        self.clone()
    }

    fn from_value(value: Value) -> Result<Self, ValueError> {
        Ok(value)
    }

    fn decode_json(json: &serde_json::Value) -> Result<Value, ValueError> {
        Ok(Value::untyped(json))
    }
}

impl MemberValue for bool {
    fn declared_type() -> DeclaredType {
        DeclaredType::Primitive(ValueKind::Bool)
    }

    fn to_value(&self) -> Value {
        Value::Bool(*self)
    }

    fn from_value(value: Value) -> Result<Self, ValueError> {
        match value {
            Value::Bool(b) => Ok(b),
            other => Err(ValueError::mismatch("bool", other.kind())),
        }
    }
}

macro_rules! impl_member_value_int {
    ($($t:ty),*) => {
        $(
            impl MemberValue for $t {
                fn declared_type() -> DeclaredType {
                    DeclaredType::Primitive(ValueKind::Int)
                }

                fn to_value(&self) -> Value {
                    Value::Int(i64::from(*self))
                }

                fn from_value(value: Value) -> Result<Self, ValueError> {
                    match value {
                        Value::Int(v) => <$t>::try_from(v).map_err(|_| ValueError::OutOfRange {
                            target: stringify!($t),
                            value: v,
                        }),
                        other => Err(ValueError::mismatch(stringify!($t), other.kind())),
                    }
                }
            }
        )*
    };
}

impl_member_value_int!(i8, i16, i32, i64, u8, u16, u32);

/// Unsigned types wider than `i64` can hold. Values above `i64::MAX` are
/// clamped on read; writes are range-checked.
macro_rules! impl_member_value_wide_uint {
    ($($t:ty),*) => {
        $(
            impl MemberValue for $t {
                fn declared_type() -> DeclaredType {
                    DeclaredType::Primitive(ValueKind::Int)
                }

                fn to_value(&self) -> Value {
                    Value::Int(i64::try_from(*self).unwrap_or(i64::MAX))
                }

                fn from_value(value: Value) -> Result<Self, ValueError> {
                    match value {
                        Value::Int(v) => <$t>::try_from(v).map_err(|_| ValueError::OutOfRange {
                            target: stringify!($t),
                            value: v,
                        }),
                        other => Err(ValueError::mismatch(stringify!($t), other.kind())),
                    }
                }
            }
        )*
    };
}

impl_member_value_wide_uint!(u64, usize);

impl MemberValue for f64 {
    fn declared_type() -> DeclaredType {
        DeclaredType::Primitive(ValueKind::Float)
    }

    fn to_value(&self) -> Value {
        Value::Float(*self)
    }

    #[allow(clippy::cast_precision_loss)] // integer to float widening is the one allowed coercion
    fn from_value(value: Value) -> Result<Self, ValueError> {
        match value {
            Value::Float(x) => Ok(x),
            Value::Int(i) => Ok(i as f64),
            other => Err(ValueError::mismatch("f64", other.kind())),
        }
    }
}

impl MemberValue for f32 {
    fn declared_type() -> DeclaredType {
        DeclaredType::Primitive(ValueKind::Float)
    }

    fn to_value(&self) -> Value {
        Value::Float(f64::from(*self))
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)] // f32 members accept f32 precision
    fn from_value(value: Value) -> Result<Self, ValueError> {
        match value {
            Value::Float(x) => Ok(x as f32),
            Value::Int(i) => Ok(i as f32),
            other => Err(ValueError::mismatch("f32", other.kind())),
        }
    }
}

impl MemberValue for String {
    fn declared_type() -> DeclaredType {
        DeclaredType::Primitive(ValueKind::String)
    }

    fn to_value(&self) -> Value {
        Value::String(self.clone())
    }

    fn from_value(value: Value) -> Result<Self, ValueError> {
        match value {
            Value::String(s) => Ok(s),
            other => Err(ValueError::mismatch("string", other.kind())),
        }
    }
}

impl MemberValue for Uuid {
    fn declared_type() -> DeclaredType {
        DeclaredType::Primitive(ValueKind::Uuid)
    }

    fn to_value(&self) -> Value {
        Value::Uuid(*self)
    }

    fn from_value(value: Value) -> Result<Self, ValueError> {
        match value {
            Value::Uuid(u) => Ok(u),
            other => Err(ValueError::mismatch("uuid", other.kind())),
        }
    }
}

impl MemberValue for DateTime<Utc> {
    fn declared_type() -> DeclaredType {
        DeclaredType::Primitive(ValueKind::DateTime)
    }

    fn to_value(&self) -> Value {
        Value::DateTime(*self)
    }

    fn from_value(value: Value) -> Result<Self, ValueError> {
        match value {
            Value::DateTime(dt) => Ok(dt),
            other => Err(ValueError::mismatch("datetime", other.kind())),
        }
    }
}

impl MemberValue for NaiveDate {
    fn declared_type() -> DeclaredType {
        DeclaredType::Primitive(ValueKind::Date)
    }

    fn to_value(&self) -> Value {
        Value::Date(*self)
    }

    fn from_value(value: Value) -> Result<Self, ValueError> {
        match value {
            Value::Date(d) => Ok(d),
            other => Err(ValueError::mismatch("date", other.kind())),
        }
    }
}

impl<T: MemberValue> MemberValue for Option<T> {
    fn declared_type() -> DeclaredType {
        DeclaredType::optional(T::declared_type())
    }

    fn to_value(&self) -> Value {
        self.as_ref().map_or(Value::Null, MemberValue::to_value)
    }

    fn from_value(value: Value) -> Result<Self, ValueError> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }

    fn decode_json(json: &serde_json::Value) -> Result<Value, ValueError> {
        if json.is_null() {
            Ok(Value::Null)
        } else {
            T::decode_json(json)
        }
    }
}

impl<T: MemberValue> MemberValue for Vec<T> {
    fn declared_type() -> DeclaredType {
        DeclaredType::collection_of(T::declared_type())
    }

    fn to_value(&self) -> Value {
        Value::List(self.iter().map(MemberValue::to_value).collect())
    }

    fn from_value(value: Value) -> Result<Self, ValueError> {
        match value {
            Value::List(items) => items.into_iter().map(T::from_value).collect(),
            other => Err(ValueError::mismatch(
                Self::declared_type().to_string(),
                other.kind(),
            )),
        }
    }

    fn decode_json(json: &serde_json::Value) -> Result<Value, ValueError> {
        match json {
            serde_json::Value::Array(items) => items
                .iter()
                .map(T::decode_json)
                .collect::<Result<Vec<_>, _>>()
                .map(Value::List),
            other => Err(ValueError::mismatch(
                Self::declared_type().to_string(),
                Value::untyped(other).kind(),
            )),
        }
    }
}
