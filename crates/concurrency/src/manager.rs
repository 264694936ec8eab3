//! Cell manager: opens accessors against one store
//!
//! Resolves [`UseOptions`] into a lease:
//!
//! ```text
//! FailIfNotFound      -> lease existing cell or NotFound
//! CreateIfNotFound(T) -> lookup T, lease existing cell (must be of type T)
//!                        or allocate an empty T and lease it
//! ```
//!
//! No store-wide lock is taken on this path. Scopes on different cells run
//! in parallel; scopes on one cell serialize in lease acquisition order.

use crate::accessor::CellAccessor;
use crate::options::{UseMode, UseOptions};
use celldb_core::{CellId, Error, Result, SchemaRegistry};
use celldb_storage::{CellLayout, MemoryStore};
use std::sync::Arc;
use std::time::Duration;

/// Opens scoped accessors on cells of one store
#[derive(Debug, Clone)]
pub struct CellManager {
    store: Arc<MemoryStore>,
    registry: Arc<SchemaRegistry>,
    default_timeout: Option<Duration>,
}

impl CellManager {
    /// Create a manager
    ///
    /// `default_timeout` applies when [`UseOptions::timeout`] is unset;
    /// `None` waits indefinitely.
    pub fn new(
        store: Arc<MemoryStore>,
        registry: Arc<SchemaRegistry>,
        default_timeout: Option<Duration>,
    ) -> Self {
        Self {
            store,
            registry,
            default_timeout,
        }
    }

    /// Underlying store
    pub fn store(&self) -> &Arc<MemoryStore> {
        &self.store
    }

    /// Schema registry
    pub fn registry(&self) -> &Arc<SchemaRegistry> {
        &self.registry
    }

    /// Lease bound used when options leave it unset
    pub fn default_timeout(&self) -> Option<Duration> {
        self.default_timeout
    }

    /// Open an exclusive accessor on `id`
    ///
    /// Blocks until the cell's lease is free or the timeout elapses. A
    /// cell created by this call is visible, empty, before the accessor is
    /// returned and is not removed if the scope later discards its writes.
    ///
    /// # Errors
    ///
    /// - `NotFound` if absent and creation was not requested
    /// - `UnknownType` if the type to create is not registered
    /// - `SchemaViolation` if the existing cell has a different type than
    ///   the one creation was requested for
    /// - `LeaseTimeout` / `LeaseReentrant` from lease acquisition
    pub fn use_cell(&self, id: CellId, options: &UseOptions) -> Result<CellAccessor<'_>> {
        let timeout = options.timeout.or(self.default_timeout);
        match &options.mode {
            UseMode::FailIfNotFound => {
                let guard = self.store.lease(id, timeout)?;
                Ok(CellAccessor::new(&self.store, guard, false))
            }
            UseMode::CreateIfNotFound(type_name) => {
                let schema = self.registry.lookup(type_name)?;
                let (guard, created) =
                    self.store
                        .lease_or_create(id, &schema, CellLayout::Typed, timeout)?;
                let existing = guard.current();
                if existing.type_name() != type_name.as_str() {
                    return Err(Error::violation(
                        type_name,
                        "",
                        format!(
                            "cell {} already exists with type '{}'",
                            id,
                            existing.type_name()
                        ),
                    ));
                }
                Ok(CellAccessor::new(&self.store, guard, created))
            }
        }
    }

    /// Run `f` inside a scope on `id`
    ///
    /// Staged writes are committed if `f` returns `Ok` and discarded if it
    /// returns `Err` or panics. The lease is released either way.
    pub fn with_cell<R>(
        &self,
        id: CellId,
        options: &UseOptions,
        f: impl FnOnce(&mut CellAccessor<'_>) -> Result<R>,
    ) -> Result<R> {
        let mut accessor = self.use_cell(id, options)?;
        match f(&mut accessor) {
            Ok(value) => {
                accessor.commit()?;
                Ok(value)
            }
            Err(e) => {
                accessor.abandon();
                Err(e)
            }
        }
    }
}
