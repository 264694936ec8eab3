//! Value types for CellDB
//!
//! Two forms are kept apart on purpose:
//!
//! - [`Value`] is what collaborators hand in. It is loosely typed (most import
//!   paths produce text) and is coerced to the declared kind on write.
//! - [`Scalar`] / [`FieldValue`] is what the store holds. A stored scalar
//!   always matches its field's declared [`ValueKind`].
//!
//! ## Coercion table
//!
//! | Input | Bool | Int | Float | String | Ref |
//! |-------|------|-----|-------|--------|-----|
//! | Bool | yes | 0/1 | no | display | no |
//! | Int | 0/1 only | yes | yes | display | if >= 0 |
//! | Float | no | if integral | yes | display | no |
//! | Text | true/false/1/0 | parse | parse | yes | `#n` or `n` |
//! | Ref | no | no | no | raw id | yes |

use crate::error::{Error, Result};
use crate::types::{CellId, ValueKind};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stored scalar value
///
/// Equality is structural; floats use IEEE-754 semantics (`NaN != NaN`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Scalar {
    /// Boolean
    Bool(bool),
    /// 64-bit signed integer
    Int(i64),
    /// 64-bit float
    Float(f64),
    /// UTF-8 string
    String(String),
    /// Weak reference to another cell
    Ref(CellId),
}

impl Scalar {
    /// Kind of this scalar
    pub fn kind(&self) -> ValueKind {
        match self {
            Scalar::Bool(_) => ValueKind::Bool,
            Scalar::Int(_) => ValueKind::Int,
            Scalar::Float(_) => ValueKind::Float,
            Scalar::String(_) => ValueKind::String,
            Scalar::Ref(_) => ValueKind::Ref,
        }
    }

    /// Try to get as bool
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Scalar::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Try to get as i64
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Scalar::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Try to get as f64
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Scalar::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Try to get as string slice
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Scalar::String(s) => Some(s),
            _ => None,
        }
    }

    /// Try to get as a cell reference
    pub fn as_ref_id(&self) -> Option<CellId> {
        match self {
            Scalar::Ref(id) => Some(*id),
            _ => None,
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Bool(b) => write!(f, "{}", b),
            Scalar::Int(i) => write!(f, "{}", i),
            Scalar::Float(x) => write!(f, "{}", x),
            Scalar::String(s) => f.write_str(s),
            Scalar::Ref(id) => write!(f, "{}", id),
        }
    }
}

/// Stored field value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldValue {
    /// Single-cardinality field
    Single(Scalar),
    /// List-cardinality field, in append order
    List(Vec<Scalar>),
}

impl FieldValue {
    /// The scalar of a single-cardinality field
    pub fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            FieldValue::Single(s) => Some(s),
            FieldValue::List(_) => None,
        }
    }

    /// The elements of a list field
    pub fn as_list(&self) -> Option<&[Scalar]> {
        match self {
            FieldValue::List(items) => Some(items),
            FieldValue::Single(_) => None,
        }
    }

    /// Shorthand for a single string field
    pub fn as_str(&self) -> Option<&str> {
        self.as_scalar().and_then(Scalar::as_str)
    }

    /// Shorthand for a single int field
    pub fn as_int(&self) -> Option<i64> {
        self.as_scalar().and_then(Scalar::as_int)
    }

    /// Shorthand for a single float field
    pub fn as_float(&self) -> Option<f64> {
        self.as_scalar().and_then(Scalar::as_float)
    }

    /// Shorthand for a single reference field
    pub fn as_ref_id(&self) -> Option<CellId> {
        self.as_scalar().and_then(Scalar::as_ref_id)
    }

    /// Number of scalars held (1 for single fields)
    pub fn len(&self) -> usize {
        match self {
            FieldValue::Single(_) => 1,
            FieldValue::List(items) => items.len(),
        }
    }

    /// True only for an empty list
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Externally supplied value, before coercion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Boolean
    Bool(bool),
    /// Integer
    Int(i64),
    /// Float
    Float(f64),
    /// Text, the usual form produced by importers
    Text(String),
    /// Cell reference
    Ref(CellId),
    /// Several values at once
    List(Vec<Value>),
}

impl Value {
    /// Short description used in mismatch errors
    pub fn describe(&self) -> String {
        match self {
            Value::Bool(b) => format!("bool {}", b),
            Value::Int(i) => format!("int {}", i),
            Value::Float(x) => format!("float {}", x),
            Value::Text(s) => format!("text {:?}", s),
            Value::Ref(id) => format!("ref {}", id),
            Value::List(items) => format!("list of {}", items.len()),
        }
    }

    /// Coerce to a scalar of `kind`, reporting failures against `field`
    ///
    /// Lists are never coerced here; callers decide how a list input maps to
    /// the field's cardinality.
    pub fn coerce(&self, field: &str, kind: ValueKind) -> Result<Scalar> {
        coerce_scalar(self, kind).ok_or_else(|| Error::TypeMismatch {
            field: field.to_string(),
            expected: kind,
            actual: self.describe(),
        })
    }
}

fn coerce_scalar(value: &Value, kind: ValueKind) -> Option<Scalar> {
    match kind {
        ValueKind::Bool => match value {
            Value::Bool(b) => Some(Scalar::Bool(*b)),
            Value::Int(0) => Some(Scalar::Bool(false)),
            Value::Int(1) => Some(Scalar::Bool(true)),
            Value::Text(s) => parse_bool(s.trim()).map(Scalar::Bool),
            _ => None,
        },
        ValueKind::Int => match value {
            Value::Int(i) => Some(Scalar::Int(*i)),
            Value::Bool(b) => Some(Scalar::Int(i64::from(*b))),
            Value::Float(f) => integral(*f).map(Scalar::Int),
            Value::Text(s) => {
                let s = s.trim();
                s.parse::<i64>()
                    .ok()
                    .or_else(|| s.parse::<f64>().ok().and_then(integral))
                    .map(Scalar::Int)
            }
            _ => None,
        },
        ValueKind::Float => match value {
            Value::Float(f) => Some(Scalar::Float(*f)),
            Value::Int(i) => Some(Scalar::Float(*i as f64)),
            Value::Text(s) => s.trim().parse::<f64>().ok().map(Scalar::Float),
            _ => None,
        },
        ValueKind::String => match value {
            Value::Text(s) => Some(Scalar::String(s.clone())),
            Value::Bool(b) => Some(Scalar::String(b.to_string())),
            Value::Int(i) => Some(Scalar::String(i.to_string())),
            Value::Float(f) => Some(Scalar::String(f.to_string())),
            Value::Ref(id) => Some(Scalar::String(id.as_u64().to_string())),
            Value::List(_) => None,
        },
        ValueKind::Ref => match value {
            Value::Ref(id) => Some(Scalar::Ref(*id)),
            Value::Int(i) if *i >= 0 => Some(Scalar::Ref(CellId::new(*i as u64))),
            Value::Text(s) => {
                let s = s.trim();
                s.strip_prefix('#')
                    .unwrap_or(s)
                    .parse::<u64>()
                    .ok()
                    .map(|raw| Scalar::Ref(CellId::new(raw)))
            }
            _ => None,
        },
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    if s.eq_ignore_ascii_case("true") || s == "1" {
        Some(true)
    } else if s.eq_ignore_ascii_case("false") || s == "0" {
        Some(false)
    } else {
        None
    }
}

fn integral(f: f64) -> Option<i64> {
    if f.is_finite() && f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 {
        Some(f as i64)
    } else {
        None
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<u32> for Value {
    fn from(i: u32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<&String> for Value {
    fn from(s: &String) -> Self {
        Value::Text(s.clone())
    }
}

impl From<CellId> for Value {
    fn from(id: CellId) -> Self {
        Value::Ref(id)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::List(items.into_iter().map(Into::into).collect())
    }
}

impl From<Scalar> for Value {
    fn from(s: Scalar) -> Self {
        match s {
            Scalar::Bool(b) => Value::Bool(b),
            Scalar::Int(i) => Value::Int(i),
            Scalar::Float(f) => Value::Float(f),
            Scalar::String(s) => Value::Text(s),
            Scalar::Ref(id) => Value::Ref(id),
        }
    }
}

impl From<FieldValue> for Value {
    fn from(v: FieldValue) -> Self {
        match v {
            FieldValue::Single(s) => s.into(),
            FieldValue::List(items) => Value::List(items.into_iter().map(Into::into).collect()),
        }
    }
}
