//! Scoped cell accessor
//!
//! A [`CellAccessor`] owns the lease on exactly one cell for its lifetime.
//! Writes are validated and coerced as they are made, then staged; nothing
//! is visible to other observers until the scope closes.
//!
//! ## Closing a scope
//!
//! ```text
//! commit()   -> publish staged writes, release lease
//! abandon()  -> discard staged writes, release lease
//! drop       -> commit, unless the thread is unwinding (then discard)
//! ```
//!
//! A write that fails validation is reported to the caller and staged
//! nothing, so earlier staged writes in the same scope are unaffected.

use celldb_core::{CellId, CellSchema, FieldValue, Result, Value};
use celldb_storage::{CellData, FieldOp, LeaseGuard, MemoryStore};
use std::fmt;
use std::sync::Arc;
use std::thread;
use tracing::{debug, warn};

/// Exclusive mutation handle on one cell
///
/// Committed state is read through the lease on demand. The accessor never
/// keeps its own reference to it, so a commit with no outside readers
/// mutates the cell in place.
pub struct CellAccessor<'a> {
    store: &'a MemoryStore,
    guard: Option<LeaseGuard>,
    id: CellId,
    schema: Arc<CellSchema>,
    staged: Vec<FieldOp>,
    // Committed state plus staged ops, built on first read after a write
    preview: Option<CellData>,
    created: bool,
}

impl<'a> CellAccessor<'a> {
    /// Wrap a held lease
    ///
    /// `created` records whether the cell was allocated by this open.
    pub fn new(store: &'a MemoryStore, guard: LeaseGuard, created: bool) -> Self {
        let schema = Arc::clone(guard.current().schema());
        Self {
            store,
            id: guard.id(),
            guard: Some(guard),
            schema,
            staged: Vec::new(),
            preview: None,
            created,
        }
    }

    /// Cell identifier
    pub fn id(&self) -> CellId {
        self.id
    }

    /// Cell type
    pub fn type_name(&self) -> &str {
        self.schema.name()
    }

    /// Schema of the cell
    pub fn schema(&self) -> &Arc<CellSchema> {
        &self.schema
    }

    /// True if this scope created the cell
    pub fn was_created(&self) -> bool {
        self.created
    }

    /// Number of staged writes
    pub fn staged_len(&self) -> usize {
        self.staged.len()
    }

    /// True if anything is staged
    pub fn is_dirty(&self) -> bool {
        !self.staged.is_empty()
    }

    /// Append to a list or string field, overwrite any other field
    ///
    /// # Errors
    ///
    /// - `SchemaViolation` for an unknown field or a multi-element list
    ///   written to a single-value field
    /// - `TypeMismatch` if the value cannot be converted; nothing is staged
    pub fn append_to_field(&mut self, field: &str, value: impl Into<Value>) -> Result<()> {
        let op = FieldOp::append(&self.schema, field, value.into())?;
        self.stage(op)
    }

    /// Overwrite a field, replacing a whole list
    pub fn set_field(&mut self, field: &str, value: impl Into<Value>) -> Result<()> {
        let op = FieldOp::set(&self.schema, field, value.into())?;
        self.stage(op)
    }

    fn stage(&mut self, op: FieldOp) -> Result<()> {
        if let Some(preview) = self.preview.as_mut() {
            preview.apply(op.clone())?;
        }
        self.staged.push(op);
        Ok(())
    }

    fn current(&self) -> Option<Arc<CellData>> {
        self.guard.as_ref().map(LeaseGuard::current)
    }

    /// Current value of a field, including staged writes
    pub fn get(&mut self, field: &str) -> Option<FieldValue> {
        if self.staged.is_empty() {
            return self.committed(field);
        }
        if self.preview.is_none() {
            let mut preview = CellData::clone(&*self.current()?);
            for op in &self.staged {
                preview.apply(op.clone()).ok()?;
            }
            self.preview = Some(preview);
        }
        self.preview.as_ref().and_then(|p| p.get(field))
    }

    /// Value of a field as of the last commit, ignoring staged writes
    pub fn committed(&self, field: &str) -> Option<FieldValue> {
        self.current().and_then(|data| data.get(field))
    }

    /// Publish staged writes and release the lease
    ///
    /// Returns the store version after the commit. A scope with nothing
    /// staged publishes nothing and returns the current version.
    ///
    /// # Errors
    ///
    /// `SchemaViolation` if the cell's schema no longer accepts the staged
    /// writes. Nothing is published and the lease is released.
    pub fn commit(mut self) -> Result<u64> {
        self.publish()
    }

    /// Discard staged writes and release the lease
    pub fn abandon(mut self) {
        let discarded = self.staged.len();
        self.staged.clear();
        self.guard = None;
        if discarded > 0 {
            debug!(id = %self.id, discarded, "Abandoned cell scope");
        }
    }

    fn publish(&mut self) -> Result<u64> {
        self.preview = None;
        let Some(guard) = self.guard.take() else {
            return Ok(self.store.version());
        };
        if self.staged.is_empty() {
            return Ok(self.store.version());
        }
        let ops = std::mem::take(&mut self.staged);
        let count = ops.len();
        let version = self.store.commit(&guard, ops)?;
        debug!(id = %self.id, ops = count, version, "Committed cell scope");
        Ok(version)
    }
}

impl Drop for CellAccessor<'_> {
    fn drop(&mut self) {
        if self.guard.is_none() {
            return;
        }
        if thread::panicking() {
            if !self.staged.is_empty() {
                warn!(
                    id = %self.id,
                    discarded = self.staged.len(),
                    "Discarding staged writes while unwinding"
                );
            }
            return;
        }
        if let Err(e) = self.publish() {
            warn!(id = %self.id, error = %e, "Dropped cell scope failed to commit");
        }
    }
}

impl fmt::Debug for CellAccessor<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CellAccessor")
            .field("id", &self.id)
            .field("type_name", &self.type_name())
            .field("staged", &self.staged.len())
            .field("created", &self.created)
            .finish()
    }
}
