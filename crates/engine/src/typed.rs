//! Statically typed cells
//!
//! [`TypedCell`] is implemented by Rust structs whose layout is known at
//! compile time (usually generated from schema files). The struct declares
//! its schema once and converts to and from stored cells; the store keeps
//! such cells in the compact typed layout.

use celldb_core::{Error, FieldSpec, FieldValue, Result, Value};
use celldb_storage::{CellData, CellView, FieldOp};

/// A Rust type with a fixed cell schema
///
/// # Example
///
/// ```ignore
/// struct Book { title: String, readers: Vec<i64> }
///
/// impl TypedCell for Book {
///     const TYPE_NAME: &'static str = "Book";
///
///     fn fields() -> Vec<FieldSpec> {
///         vec![
///             FieldSpec::single("title", ValueKind::String),
///             FieldSpec::list("readers", ValueKind::Int).optional(),
///         ]
///     }
///
///     fn write_fields(&self, cell: &mut CellWriter<'_>) -> Result<()> {
///         cell.set("title", self.title.as_str())?;
///         cell.set("readers", self.readers.clone())
///     }
///
///     fn from_view(view: &CellView) -> Result<Self> {
///         Ok(Book {
///             title: required(view, "title")?.as_str().unwrap_or_default().to_string(),
///             readers: ints(view, "readers"),
///         })
///     }
/// }
/// ```
pub trait TypedCell: Sized {
    /// Registered type name
    const TYPE_NAME: &'static str;

    /// Field layout, in declaration order
    fn fields() -> Vec<FieldSpec>;

    /// Write this value's fields into an empty cell
    fn write_fields(&self, cell: &mut CellWriter<'_>) -> Result<()>;

    /// Rebuild a value from a committed cell of type `TYPE_NAME`
    fn from_view(view: &CellView) -> Result<Self>;
}

/// Write access to a cell being built from a [`TypedCell`]
pub struct CellWriter<'a> {
    data: &'a mut CellData,
}

impl<'a> CellWriter<'a> {
    pub(crate) fn new(data: &'a mut CellData) -> Self {
        Self { data }
    }

    /// Overwrite `field`
    pub fn set(&mut self, field: &str, value: impl Into<Value>) -> Result<()> {
        let op = FieldOp::set(self.data.schema(), field, value.into())?;
        self.data.apply(op)?;
        Ok(())
    }

    /// Append-or-overwrite write
    pub fn append(&mut self, field: &str, value: impl Into<Value>) -> Result<()> {
        let op = FieldOp::append(self.data.schema(), field, value.into())?;
        self.data.apply(op)?;
        Ok(())
    }

    /// Write `value` only when it is `Some`
    pub fn set_opt<V: Into<Value>>(&mut self, field: &str, value: Option<V>) -> Result<()> {
        match value {
            Some(v) => self.set(field, v),
            None => Ok(()),
        }
    }
}

/// Value of `field`, or `SchemaViolation` if it is absent
pub fn required(view: &CellView, field: &str) -> Result<FieldValue> {
    view.field(field)
        .ok_or_else(|| Error::violation(view.type_name(), field, "required field is absent"))
}

/// Integer elements of a list field; empty if absent
pub fn ints(view: &CellView, field: &str) -> Vec<i64> {
    view.field(field)
        .and_then(|v| v.as_list().map(|items| items.iter().filter_map(|s| s.as_int()).collect()))
        .unwrap_or_default()
}
