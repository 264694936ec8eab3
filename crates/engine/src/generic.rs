//! Generic Cell Resolver
//!
//! A [`GenericCell`] is bound to a schema chosen at runtime by type name,
//! typically read from ingested data. The type is resolved once in
//! [`Database::new_generic`](crate::Database::new_generic); every later
//! field write works against the resolved `Arc<CellSchema>`.
//!
//! The cell is detached from the store until it is saved: writes accumulate
//! locally and [`Database::save_generic`](crate::Database::save_generic)
//! publishes all of them in one store write.

use celldb_core::{CellId, CellSchema, FieldSpec, FieldValue, Result, Value};
use celldb_storage::{CellData, CellLayout, FieldOp};
use std::sync::Arc;

/// An in-flight cell whose type was resolved at runtime
#[derive(Debug, Clone, PartialEq)]
pub struct GenericCell {
    data: CellData,
}

impl GenericCell {
    pub(crate) fn new(id: CellId, schema: Arc<CellSchema>) -> Self {
        Self {
            data: CellData::new(id, schema, CellLayout::Generic),
        }
    }

    pub(crate) fn from_committed(data: &CellData) -> Self {
        let mut data = data.clone();
        data.set_layout(CellLayout::Generic);
        Self { data }
    }

    /// Cell id
    pub fn id(&self) -> CellId {
        self.data.id()
    }

    /// Resolved type name
    pub fn type_name(&self) -> &str {
        self.data.type_name()
    }

    /// Resolved schema
    pub fn schema(&self) -> &Arc<CellSchema> {
        self.data.schema()
    }

    /// Append-or-overwrite write, same rules as the scoped accessor
    ///
    /// # Errors
    ///
    /// `SchemaViolation` for an undeclared field or a multi-element list
    /// aimed at a single field; `TypeMismatch` if the value does not coerce.
    /// The field is unchanged on error.
    pub fn append_to_field(&mut self, field: &str, value: impl Into<Value>) -> Result<()> {
        let op = FieldOp::append(self.data.schema(), field, value.into())?;
        self.data.apply(op)?;
        Ok(())
    }

    /// Overwrite `field` regardless of cardinality
    pub fn set_field(&mut self, field: &str, value: impl Into<Value>) -> Result<()> {
        let op = FieldOp::set(self.data.schema(), field, value.into())?;
        self.data.apply(op)?;
        Ok(())
    }

    /// Current value of `field`
    pub fn get(&self, field: &str) -> Option<FieldValue> {
        self.data.get(field)
    }

    /// Present fields in declaration order
    pub fn fields(&self) -> Vec<(&FieldSpec, FieldValue)> {
        self.data.fields()
    }

    /// Number of present fields
    pub fn present_count(&self) -> usize {
        self.data.present_count()
    }

    /// Required fields not yet written
    pub fn missing_required(&self) -> Vec<&str> {
        self.data.missing_required()
    }

    pub(crate) fn data(&self) -> &CellData {
        &self.data
    }
}
