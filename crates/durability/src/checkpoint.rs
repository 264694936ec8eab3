//! Checkpoint Manager
//!
//! Serializes the Memory Store into a snapshot and reloads it on open.
//!
//! ## Consistency
//!
//! | Mode | Writers during checkpoint | Snapshot contents |
//! |------|---------------------------|-------------------|
//! | `BestEffort` | keep committing | every commit finished before the call, plus any subset of concurrent ones |
//! | `Quiescent` | commits wait while cells are collected | exactly the commits up to one store version |
//!
//! In both modes only the collection pass interacts with writers. Encoding
//! and file I/O run after the store has been released.
//!
//! ## Reload
//!
//! Catalog schemas are checked against the registry before any cell is
//! materialized. A registered type whose layout differs from the snapshot's
//! fails the whole load; types the registry has never seen are registered
//! from the catalog.

use crate::format::{decode_record, encode_snapshot};
use crate::snapshot::{SnapshotReader, SnapshotWriter, DEFAULT_SNAPSHOT_FILE};
use celldb_core::{CellSchema, CheckpointError, Result, SchemaRegistry};
use celldb_storage::{CellData, MemoryStore};
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

/// Consistency contract of `save_storage`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointConsistency {
    /// Walk live cells while writers continue
    #[default]
    BestEffort,
    /// Hold all commits while cells are collected
    Quiescent,
}

/// Outcome of a successful checkpoint
#[derive(Debug, Clone)]
pub struct CheckpointInfo {
    /// Snapshot file written
    pub path: PathBuf,
    /// Cells written
    pub cells: usize,
    /// Snapshot size in bytes
    pub bytes: u64,
    /// Store version recorded in the snapshot
    pub store_version: u64,
    /// When the snapshot was taken
    pub created_at: DateTime<Utc>,
    /// Wall time spent
    pub elapsed: Duration,
}

/// Outcome of a snapshot reload
#[derive(Debug, Clone)]
pub struct LoadInfo {
    /// Snapshot file read
    pub path: PathBuf,
    /// Cells restored
    pub cells: usize,
    /// Store version restored
    pub store_version: u64,
    /// Catalog types that were not registered before the load
    pub registered_types: Vec<String>,
    /// When the snapshot was taken
    pub created_at: Option<DateTime<Utc>>,
}

/// Checkpoints one Memory Store
///
/// Concurrent `save_storage` calls are serialized.
#[derive(Debug)]
pub struct CheckpointManager {
    store: Arc<MemoryStore>,
    registry: Arc<SchemaRegistry>,
    writer: Option<SnapshotWriter>,
    consistency: CheckpointConsistency,
    node_id: String,
    in_progress: Mutex<()>,
}

impl CheckpointManager {
    /// Manager writing `dir/snapshot.cdb`
    pub fn new(
        store: Arc<MemoryStore>,
        registry: Arc<SchemaRegistry>,
        dir: impl Into<PathBuf>,
    ) -> Self {
        Self::with_writer(
            store,
            registry,
            Some(SnapshotWriter::new(dir, DEFAULT_SNAPSHOT_FILE)),
        )
    }

    /// Manager with no storage; every save fails with `NoStoragePath`
    pub fn ephemeral(store: Arc<MemoryStore>, registry: Arc<SchemaRegistry>) -> Self {
        Self::with_writer(store, registry, None)
    }

    /// Manager with an explicit writer
    pub fn with_writer(
        store: Arc<MemoryStore>,
        registry: Arc<SchemaRegistry>,
        writer: Option<SnapshotWriter>,
    ) -> Self {
        Self {
            store,
            registry,
            writer,
            consistency: CheckpointConsistency::default(),
            node_id: "local".to_string(),
            in_progress: Mutex::new(()),
        }
    }

    /// Set the consistency contract
    pub fn with_consistency(mut self, consistency: CheckpointConsistency) -> Self {
        self.consistency = consistency;
        self
    }

    /// Set the node id reported in cluster checkpoints
    pub fn with_node_id(mut self, node_id: impl Into<String>) -> Self {
        self.node_id = node_id.into();
        self
    }

    /// Consistency contract in effect
    pub fn consistency(&self) -> CheckpointConsistency {
        self.consistency
    }

    /// Node id reported in cluster checkpoints
    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// Snapshot path, if storage is configured
    pub fn snapshot_path(&self) -> Option<PathBuf> {
        self.writer.as_ref().map(SnapshotWriter::path)
    }

    /// Write every live cell to durable storage
    ///
    /// Returns once the snapshot has been fsynced and renamed into place.
    /// Every commit that finished before the call is included.
    ///
    /// # Errors
    ///
    /// Any failure is returned as-is and never retried here. The previous
    /// snapshot remains the durable state.
    pub fn save_storage(&self) -> std::result::Result<CheckpointInfo, CheckpointError> {
        let writer = self.writer.as_ref().ok_or(CheckpointError::NoStoragePath)?;
        let _serial = self.in_progress.lock();
        let started = Instant::now();

        let (cells, store_version) = match self.consistency {
            CheckpointConsistency::BestEffort => {
                let version = self.store.version();
                (self.store.cells_snapshot(), version)
            }
            CheckpointConsistency::Quiescent => {
                let _gate = self.store.quiesce();
                (self.store.cells_snapshot(), self.store.version())
            }
        };

        let catalog = self.catalog_for(&cells);
        let created_at = Utc::now();
        let image = encode_snapshot(
            &cells,
            &catalog,
            store_version,
            created_at.timestamp_millis() as u64,
        )?;

        let bytes = writer.write(&image).map_err(|e| {
            error!(path = %writer.path().display(), error = %e, "Checkpoint failed");
            e
        })?;

        let info = CheckpointInfo {
            path: writer.path(),
            cells: cells.len(),
            bytes,
            store_version,
            created_at,
            elapsed: started.elapsed(),
        };
        info!(
            node = %self.node_id,
            cells = info.cells,
            bytes = info.bytes,
            store_version = info.store_version,
            elapsed_ms = info.elapsed.as_millis() as u64,
            "Checkpoint complete"
        );
        Ok(info)
    }

    // Registered schemas, plus any cell schema the registry lacks
    fn catalog_for(&self, cells: &[Arc<CellData>]) -> Vec<Arc<CellSchema>> {
        let mut catalog = self.registry.schemas();
        for cell in cells {
            if !catalog.iter().any(|s| s.name() == cell.type_name()) {
                catalog.push(Arc::clone(cell.schema()));
            }
        }
        catalog
    }

    /// Reload the snapshot into the (empty) store
    ///
    /// Returns `Ok(None)` when storage is not configured or no snapshot
    /// exists yet.
    ///
    /// # Errors
    ///
    /// - `CheckpointError::Corrupt` / `UnsupportedVersion` for an unreadable file
    /// - `CheckpointError::SchemaMismatch` if a catalog schema conflicts with
    ///   a registered one
    /// - `DuplicateId` if a restored id is already present in the store
    pub fn load(&self) -> Result<Option<LoadInfo>> {
        let Some(path) = self.snapshot_path() else {
            return Ok(None);
        };
        let Some(snapshot) = SnapshotReader::read(&path)? else {
            debug!(path = %path.display(), "No snapshot to load");
            return Ok(None);
        };

        let mut schemas = Vec::with_capacity(snapshot.catalog.len());
        let mut registered_types = Vec::new();
        for schema in snapshot.catalog {
            if self.registry.contains(schema.name()) {
                let existing = self.registry.lookup(schema.name())?;
                if existing.fingerprint() != schema.fingerprint() {
                    return Err(CheckpointError::SchemaMismatch {
                        type_name: schema.name().to_string(),
                    }
                    .into());
                }
                schemas.push(existing);
            } else {
                registered_types.push(schema.name().to_string());
                schemas.push(self.registry.register(schema)?);
            }
        }

        for record in &snapshot.records {
            let schema = &schemas[record.schema_index as usize];
            let cell = decode_record(record, schema)?;
            self.store.insert(cell)?;
        }
        self.store.set_version(snapshot.header.store_version);

        let info = LoadInfo {
            path,
            cells: snapshot.records.len(),
            store_version: snapshot.header.store_version,
            registered_types,
            created_at: Utc
                .timestamp_millis_opt(snapshot.header.created_ms as i64)
                .single(),
        };
        info!(
            path = %info.path.display(),
            cells = info.cells,
            store_version = info.store_version,
            "Snapshot loaded"
        );
        Ok(Some(info))
    }
}
