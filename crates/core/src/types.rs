//! Identifier and field-declaration types
//!
//! - [`CellId`]: unique identifier of a cell within one store
//! - [`ValueKind`]: scalar kind a field holds
//! - [`Cardinality`]: single value or append-only list
//! - [`Optionality`]: whether importers are expected to populate the field

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for a cell
///
/// Immutable once assigned. A `CellId` stored inside another cell's field is a
/// weak reference: the target may not exist yet, and nothing keeps it alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellId(u64);

impl CellId {
    /// Create a CellId from its raw integer form
    ///
    /// # Examples
    ///
    /// ```
    /// use celldb_core::CellId;
    ///
    /// let id = CellId::new(42);
    /// assert_eq!(id.as_u64(), 42);
    /// ```
    pub const fn new(raw: u64) -> Self {
        CellId(raw)
    }

    /// Raw integer form
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl From<u64> for CellId {
    fn from(raw: u64) -> Self {
        CellId(raw)
    }
}

impl From<CellId> for u64 {
    fn from(id: CellId) -> Self {
        id.0
    }
}

impl fmt::Display for CellId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Kind of scalar a field holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueKind {
    /// Boolean
    Bool,
    /// 64-bit signed integer
    Int,
    /// 64-bit IEEE-754 float
    Float,
    /// UTF-8 string
    String,
    /// Weak reference to another cell
    Ref,
}

impl ValueKind {
    /// Stable one-byte tag used by the snapshot format
    pub fn tag(&self) -> u8 {
        match self {
            ValueKind::Bool => 0,
            ValueKind::Int => 1,
            ValueKind::Float => 2,
            ValueKind::String => 3,
            ValueKind::Ref => 4,
        }
    }

    /// Inverse of [`ValueKind::tag`]
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(ValueKind::Bool),
            1 => Some(ValueKind::Int),
            2 => Some(ValueKind::Float),
            3 => Some(ValueKind::String),
            4 => Some(ValueKind::Ref),
            _ => None,
        }
    }

    /// Name used in error messages
    pub fn name(&self) -> &'static str {
        match self {
            ValueKind::Bool => "bool",
            ValueKind::Int => "int",
            ValueKind::Float => "float",
            ValueKind::String => "string",
            ValueKind::Ref => "ref",
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Single value or append-only list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Cardinality {
    /// Exactly one value when present
    Single,
    /// Sequence that only grows by append
    List,
}

impl Cardinality {
    /// Stable one-byte tag used by the snapshot format
    pub fn tag(&self) -> u8 {
        match self {
            Cardinality::Single => 0,
            Cardinality::List => 1,
        }
    }

    /// Inverse of [`Cardinality::tag`]
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Cardinality::Single),
            1 => Some(Cardinality::List),
            _ => None,
        }
    }
}

/// Whether a field is expected to be populated
///
/// The engine never enforces `Required` at commit time; completeness is the
/// importer's contract. The flag is carried so collaborators can check it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Optionality {
    /// Expected to be populated eventually
    Required,
    /// May stay absent
    Optional,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_id_roundtrip() {
        let id = CellId::from(7u64);
        assert_eq!(u64::from(id), 7);
        assert_eq!(id, CellId::new(7));
    }

    #[test]
    fn test_cell_id_display() {
        assert_eq!(CellId::new(12).to_string(), "#12");
    }

    #[test]
    fn test_cell_id_ordering() {
        assert!(CellId::new(1) < CellId::new(2));
    }

    #[test]
    fn test_kind_tags_roundtrip() {
        for kind in [
            ValueKind::Bool,
            ValueKind::Int,
            ValueKind::Float,
            ValueKind::String,
            ValueKind::Ref,
        ] {
            assert_eq!(ValueKind::from_tag(kind.tag()), Some(kind));
        }
        assert_eq!(ValueKind::from_tag(99), None);
    }

    #[test]
    fn test_cardinality_tags() {
        assert_eq!(Cardinality::from_tag(0), Some(Cardinality::Single));
        assert_eq!(Cardinality::from_tag(1), Some(Cardinality::List));
        assert_eq!(Cardinality::from_tag(2), None);
    }

    #[test]
    fn test_cell_id_serialization() {
        let id = CellId::new(99);
        let json = serde_json::to_string(&id).unwrap();
        let back: CellId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, back);
    }
}
