//! Database handle
//!
//! [`Database`] ties the layers together: one schema registry, one memory
//! store, the accessor manager and the checkpoint manager.
//!
//! ## Lifecycle
//!
//! ```text
//! open:  register configured schemas -> reload snapshot (if any)
//! use:   use_cell / with_cell / new_generic + save_generic / fetch
//! close: final checkpoint (or discard: drop without writing)
//! ```

use crate::config::DatabaseConfig;
use crate::generic::GenericCell;
use crate::typed::{CellWriter, TypedCell};
use celldb_concurrency::{CellAccessor, CellManager, UseOptions};
use celldb_core::{CellId, CellSchema, Error, FieldSpec, Result, SchemaRegistry};
use celldb_durability::{
    CheckpointConsistency, CheckpointInfo, CheckpointManager, LoadInfo, SnapshotWriter,
};
use celldb_storage::{CellData, CellLayout, CellView, MemoryStore, StoreStats};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// An open cell database
///
/// Create one with [`Database::open`], [`Database::ephemeral`] or
/// [`Database::builder`].
///
/// # Example
///
/// ```ignore
/// use celldb::prelude::*;
///
/// let db = Database::open("./books")?;
/// db.register_schema("Book", vec![FieldSpec::single("title", ValueKind::String)])?;
///
/// db.with_cell(CellId::new(1), &UseOptions::create_if_not_found("Book"), |cell| {
///     cell.append_to_field("title", "Solaris")
/// })?;
///
/// db.close()?;
/// ```
#[derive(Debug)]
pub struct Database {
    registry: Arc<SchemaRegistry>,
    store: Arc<MemoryStore>,
    manager: CellManager,
    checkpoint: Arc<CheckpointManager>,
    data_dir: Option<PathBuf>,
    checkpoint_on_close: bool,
    restored: Option<LoadInfo>,
}

impl Database {
    /// Open a database persisted under `path`
    ///
    /// Reloads `path/snapshot.cdb` if it exists.
    ///
    /// # Arguments
    ///
    /// * `path` - Directory holding the snapshot; created on first checkpoint
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::builder().path(path).open()
    }

    /// Create a database with no disk I/O
    ///
    /// `save_storage` fails with `CheckpointError::NoStoragePath` and
    /// `close` writes nothing.
    pub fn ephemeral() -> Result<Self> {
        Self::builder().open()
    }

    /// Open a database from a parsed configuration
    pub fn from_config(config: DatabaseConfig) -> Result<Self> {
        Self::open_with(config, Vec::new())
    }

    /// Create a builder for database configuration
    ///
    /// # Example
    ///
    /// ```ignore
    /// let db = Database::builder()
    ///     .path("./books")
    ///     .lease_timeout(Some(Duration::from_secs(5)))
    ///     .consistency(CheckpointConsistency::Quiescent)
    ///     .open()?;
    /// ```
    pub fn builder() -> DatabaseBuilder {
        DatabaseBuilder::new()
    }

    fn open_with(config: DatabaseConfig, extra: Vec<CellSchema>) -> Result<Self> {
        let registry = Arc::new(SchemaRegistry::new());
        for schema in config.schema_definitions()?.into_iter().chain(extra) {
            registry.register(schema)?;
        }

        let store = Arc::new(MemoryStore::new());
        let writer = config
            .data_dir
            .as_ref()
            .map(|dir| SnapshotWriter::new(dir, &config.snapshot_file));
        let checkpoint = Arc::new(
            CheckpointManager::with_writer(Arc::clone(&store), Arc::clone(&registry), writer)
                .with_consistency(config.consistency)
                .with_node_id(&config.node_id),
        );
        let restored = checkpoint.load()?;

        let manager = CellManager::new(
            Arc::clone(&store),
            Arc::clone(&registry),
            config.lease_timeout(),
        );

        info!(
            path = ?config.data_dir,
            schemas = registry.len(),
            cells = store.len(),
            "Database opened"
        );

        Ok(Self {
            registry,
            store,
            manager,
            checkpoint,
            data_dir: config.data_dir,
            checkpoint_on_close: config.checkpoint_on_close,
            restored,
        })
    }

    /// Snapshot directory, `None` for an ephemeral database
    pub fn path(&self) -> Option<&Path> {
        self.data_dir.as_deref()
    }

    /// True if the database has no durable storage
    pub fn is_ephemeral(&self) -> bool {
        self.data_dir.is_none()
    }

    /// What was reloaded at open, if a snapshot existed
    pub fn restored(&self) -> Option<&LoadInfo> {
        self.restored.as_ref()
    }

    /// Schema registry
    pub fn registry(&self) -> &Arc<SchemaRegistry> {
        &self.registry
    }

    /// Underlying memory store
    pub fn store(&self) -> &Arc<MemoryStore> {
        &self.store
    }

    /// Checkpoint manager, shareable as a cluster participant
    pub fn checkpoint_manager(&self) -> Arc<CheckpointManager> {
        Arc::clone(&self.checkpoint)
    }

    /// Lease wait bound used when options leave it unset
    pub fn lease_timeout(&self) -> Option<Duration> {
        self.manager.default_timeout()
    }

    // ========================================================================
    // Schemas
    // ========================================================================

    /// Register a cell type
    ///
    /// Idempotent for an identical layout.
    ///
    /// # Errors
    ///
    /// `SchemaConflict` if `type_name` is registered with a different layout.
    pub fn register_schema(
        &self,
        type_name: impl Into<String>,
        fields: Vec<FieldSpec>,
    ) -> Result<Arc<CellSchema>> {
        self.registry.register_type(type_name, fields)
    }

    /// Register the schema of a [`TypedCell`]
    pub fn register_typed<T: TypedCell>(&self) -> Result<Arc<CellSchema>> {
        self.registry.register_type(T::TYPE_NAME, T::fields())
    }

    // ========================================================================
    // Scoped access
    // ========================================================================

    /// Open an exclusive accessor on `id`
    ///
    /// Writes become visible when the accessor is committed or dropped.
    /// See [`CellManager::use_cell`] for the error cases.
    pub fn use_cell(&self, id: CellId, options: &UseOptions) -> Result<CellAccessor<'_>> {
        self.manager.use_cell(id, options)
    }

    /// Run `f` inside a scope on `id`; commit on `Ok`, discard on `Err`
    pub fn with_cell<R>(
        &self,
        id: CellId,
        options: &UseOptions,
        f: impl FnOnce(&mut CellAccessor<'_>) -> Result<R>,
    ) -> Result<R> {
        self.manager.with_cell(id, options, f)
    }

    /// Immutable view of the committed state of `id`
    pub fn fetch(&self, id: CellId) -> Result<CellView> {
        self.store.fetch(id)
    }

    /// Check whether `id` exists
    pub fn contains(&self, id: CellId) -> bool {
        self.store.contains(id)
    }

    /// Number of cells
    pub fn len(&self) -> usize {
        self.store.len()
    }

    /// True if there are no cells
    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Store statistics
    pub fn stats(&self) -> StoreStats {
        self.store.stats()
    }

    /// Remove `id`, waiting for any scope that holds it
    pub fn remove(&self, id: CellId) -> Result<()> {
        self.store.remove(id, self.lease_timeout())
    }

    // ========================================================================
    // Generic cells
    // ========================================================================

    /// Start a detached cell of a type named at runtime
    ///
    /// Nothing is written to the store until [`Database::save_generic`].
    ///
    /// # Errors
    ///
    /// `UnknownType` if `type_name` is not registered.
    pub fn new_generic(&self, id: CellId, type_name: &str) -> Result<GenericCell> {
        let schema = self.registry.lookup(type_name)?;
        Ok(GenericCell::new(id, schema))
    }

    /// Detached copy of a committed cell, for edit-and-save
    pub fn load_generic(&self, id: CellId) -> Result<GenericCell> {
        let view = self.store.fetch(id)?;
        Ok(GenericCell::from_committed(view.data()))
    }

    /// Publish every field of `cell` in one store write
    ///
    /// Creates the cell if absent. An existing cell is replaced after its
    /// lease is acquired.
    ///
    /// # Errors
    ///
    /// `SchemaViolation` if `id` already holds a cell of another type;
    /// `LeaseTimeout` if the existing cell stays leased too long.
    pub fn save_generic(&self, cell: &GenericCell) -> Result<()> {
        let created = self
            .store
            .replace(cell.data().clone(), self.lease_timeout())?;
        debug!(id = %cell.id(), type_name = cell.type_name(), created, "Saved generic cell");
        Ok(())
    }

    // ========================================================================
    // Typed cells
    // ========================================================================

    /// Store `value` as cell `id` in the typed layout
    ///
    /// The type must have been registered, e.g. with
    /// [`Database::register_typed`].
    pub fn save_typed<T: TypedCell>(&self, id: CellId, value: &T) -> Result<()> {
        let schema = self.registry.lookup(T::TYPE_NAME)?;
        let mut data = CellData::new(id, schema, CellLayout::Typed);
        value.write_fields(&mut CellWriter::new(&mut data))?;
        self.store.replace(data, self.lease_timeout())?;
        Ok(())
    }

    /// Read cell `id` as a `T`
    ///
    /// # Errors
    ///
    /// `NotFound` if absent; `SchemaViolation` if the cell is not a
    /// `T::TYPE_NAME`, or whatever `T::from_view` reports.
    pub fn load_typed<T: TypedCell>(&self, id: CellId) -> Result<T> {
        let view = self.store.fetch(id)?;
        if view.type_name() != T::TYPE_NAME {
            return Err(Error::violation(
                T::TYPE_NAME,
                "",
                format!("cell {} has type '{}'", id, view.type_name()),
            ));
        }
        T::from_view(&view)
    }

    // ========================================================================
    // Checkpoints and shutdown
    // ========================================================================

    /// Durably checkpoint the whole store
    ///
    /// Returns after the snapshot has been fsynced into place.
    pub fn save_storage(&self) -> Result<CheckpointInfo> {
        Ok(self.checkpoint.save_storage()?)
    }

    /// Checkpoint consistency contract in effect
    pub fn consistency(&self) -> CheckpointConsistency {
        self.checkpoint.consistency()
    }

    /// Close the database, writing a final checkpoint
    ///
    /// Returns the final checkpoint's info, or `None` when the database is
    /// ephemeral or closing without a checkpoint was configured.
    ///
    /// The in-memory store is left intact. If the checkpoint fails the
    /// caller can retry `close`, or give up with [`Database::discard`].
    pub fn close(&self) -> Result<Option<CheckpointInfo>> {
        if self.is_ephemeral() || !self.checkpoint_on_close {
            info!(cells = self.store.len(), "Database closed without checkpoint");
            return Ok(None);
        }
        let info = self.save_storage()?;
        info!(cells = info.cells, path = %info.path.display(), "Database closed");
        Ok(Some(info))
    }

    /// Drop all in-memory state without writing
    pub fn discard(self) {
        info!(cells = self.store.len(), "Database discarded");
        self.store.clear();
    }
}

/// Builder for [`Database`]
///
/// Starts from [`DatabaseConfig::default`]: ephemeral, 30 s lease timeout,
/// best-effort checkpoints.
#[derive(Debug, Clone, Default)]
pub struct DatabaseBuilder {
    config: DatabaseConfig,
    schemas: Vec<CellSchema>,
}

impl DatabaseBuilder {
    /// Create a builder with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing configuration
    pub fn from_config(config: DatabaseConfig) -> Self {
        Self {
            config,
            schemas: Vec::new(),
        }
    }

    /// Persist snapshots under `path`
    pub fn path(mut self, path: impl AsRef<Path>) -> Self {
        self.config.data_dir = Some(path.as_ref().to_path_buf());
        self
    }

    /// Lease wait bound; `None` waits indefinitely
    pub fn lease_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.lease_timeout_ms = timeout.map_or(0, |d| d.as_millis().max(1) as u64);
        self
    }

    /// Checkpoint consistency contract
    pub fn consistency(mut self, consistency: CheckpointConsistency) -> Self {
        self.config.consistency = consistency;
        self
    }

    /// Snapshot file name inside the data directory
    pub fn snapshot_file(mut self, file_name: impl Into<String>) -> Self {
        self.config.snapshot_file = file_name.into();
        self
    }

    /// Node id reported in cluster checkpoints
    pub fn node_id(mut self, node_id: impl Into<String>) -> Self {
        self.config.node_id = node_id.into();
        self
    }

    /// Whether `close` writes a final checkpoint
    pub fn checkpoint_on_close(mut self, enabled: bool) -> Self {
        self.config.checkpoint_on_close = enabled;
        self
    }

    /// Register `schema` at open, before the snapshot is reloaded
    pub fn schema(mut self, schema: CellSchema) -> Self {
        self.schemas.push(schema);
        self
    }

    /// Open the database
    pub fn open(self) -> Result<Database> {
        Database::open_with(self.config, self.schemas)
    }
}
