//! Memory Store
//!
//! DashMap-indexed arena of cells, one [`CellSlot`] per [`CellId`].
//!
//! # Design
//!
//! - DashMap: sharded index, lookups only lock one shard for the duration
//!   of an `Arc` clone
//! - FxHash: fast non-crypto hash over 64-bit ids
//! - Per-cell lease: mutation scopes on different cells never contend
//!
//! No method holds a DashMap shard guard while blocking on a lease. Callers
//! clone the slot's `Arc` out of the index first.
//!
//! # Commit gate
//!
//! Every commit holds the shared side of a store-wide gate for the few
//! instructions it takes to publish new state. A quiescent checkpoint takes
//! the exclusive side, which gives it an exact commit cut without touching
//! leases. Open scopes keep running; only their commits wait.
//!
//! Lock order is gate, then index shard, then slot data. The gate is never
//! held while waiting for a lease.

use crate::cell::{CellData, CellLayout, CellView, FieldOp};
use crate::lease::{CellSlot, LeaseGuard};
use celldb_core::{CellId, CellSchema, Error, Result};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::{RwLock, RwLockWriteGuard};
use rustc_hash::FxHasher;
use std::fmt;
use std::hash::BuildHasherDefault;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

type FxBuildHasher = BuildHasherDefault<FxHasher>;

/// What `allocate` does when the id is already present
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocMode {
    /// Fail with `DuplicateId`
    New,
    /// Leave the existing cell alone
    GetOrCreate,
}

/// Point-in-time store counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Live cells
    pub cells: usize,
    /// Store version (one tick per commit, replace, or remove)
    pub version: u64,
    /// List buffer reallocations since the store was created
    pub list_reallocations: u64,
}

/// In-memory cell store
pub struct MemoryStore {
    cells: DashMap<CellId, Arc<CellSlot>, FxBuildHasher>,
    version: AtomicU64,
    list_reallocations: AtomicU64,
    commit_gate: RwLock<()>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Create with room for `capacity` cells
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            cells: DashMap::with_capacity_and_hasher(capacity, FxBuildHasher::default()),
            version: AtomicU64::new(0),
            list_reallocations: AtomicU64::new(0),
            commit_gate: RwLock::new(()),
        }
    }

    /// Get current version
    #[inline]
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    #[inline]
    fn next_version(&self) -> u64 {
        self.version.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Set version (used when reloading a snapshot)
    pub fn set_version(&self, version: u64) {
        self.version.store(version, Ordering::Release);
    }

    /// Number of live cells
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// True if the store holds no cells
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Check if a cell exists
    pub fn contains(&self, id: CellId) -> bool {
        self.slot(id).is_some()
    }

    /// All live ids, ascending
    pub fn ids(&self) -> Vec<CellId> {
        let mut ids: Vec<_> = self.cells.iter().map(|e| *e.key()).collect();
        ids.sort_unstable();
        ids
    }

    /// Counters
    pub fn stats(&self) -> StoreStats {
        StoreStats {
            cells: self.len(),
            version: self.version(),
            list_reallocations: self.list_reallocations.load(Ordering::Relaxed),
        }
    }

    fn slot(&self, id: CellId) -> Option<Arc<CellSlot>> {
        self.cells
            .get(&id)
            .map(|e| Arc::clone(e.value()))
            .filter(|slot| !slot.is_removed())
    }

    // ========================================================================
    // Allocation
    // ========================================================================

    /// Create an empty cell of `schema`
    ///
    /// Returns true if a cell was created. With [`AllocMode::New`] an
    /// existing id fails with [`Error::DuplicateId`]; with
    /// [`AllocMode::GetOrCreate`] it is left untouched.
    pub fn allocate(
        &self,
        id: CellId,
        schema: &Arc<CellSchema>,
        layout: CellLayout,
        mode: AllocMode,
    ) -> Result<bool> {
        let _gate = self.commit_gate.read();
        match self.cells.entry(id) {
            Entry::Occupied(_) if mode == AllocMode::New => Err(Error::DuplicateId(id)),
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(v) => {
                let data = CellData::new(id, Arc::clone(schema), layout);
                v.insert(Arc::new(CellSlot::new(data)));
                self.next_version();
                Ok(true)
            }
        }
    }

    /// Insert fully built state for a new id
    ///
    /// Used by snapshot reload. Fails with [`Error::DuplicateId`] if the id is
    /// taken.
    pub fn insert(&self, data: CellData) -> Result<()> {
        match self.cells.entry(data.id()) {
            Entry::Occupied(_) => Err(Error::DuplicateId(data.id())),
            Entry::Vacant(v) => {
                v.insert(Arc::new(CellSlot::new(data)));
                Ok(())
            }
        }
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Immutable view of a committed cell
    ///
    /// Never waits for a lease holder.
    pub fn fetch(&self, id: CellId) -> Result<CellView> {
        self.slot(id)
            .map(|slot| slot.view())
            .ok_or(Error::NotFound(id))
    }

    /// Committed state of every live cell, ordered by id
    ///
    /// Each entry is the state as of its last commit when visited. Combine
    /// with [`MemoryStore::quiesce`] for an exact cut.
    pub fn cells_snapshot(&self) -> Vec<Arc<CellData>> {
        let slots: Vec<Arc<CellSlot>> = self.cells.iter().map(|e| Arc::clone(e.value())).collect();
        let mut cells: Vec<_> = slots
            .into_iter()
            .filter(|slot| !slot.is_removed())
            .map(|slot| slot.current())
            .collect();
        cells.sort_unstable_by_key(|c| c.id());
        cells
    }

    // ========================================================================
    // Leases and commits
    // ========================================================================

    /// Take the exclusive lease on an existing cell
    pub fn lease(&self, id: CellId, timeout: Option<Duration>) -> Result<LeaseGuard> {
        let slot = self.slot(id).ok_or(Error::NotFound(id))?;
        slot.acquire(timeout)
    }

    /// Take the lease on a cell, creating an empty one of `schema` if absent
    ///
    /// Returns the guard and whether the cell was created. A cell removed
    /// between lookup and acquisition is treated as absent.
    pub fn lease_or_create(
        &self,
        id: CellId,
        schema: &Arc<CellSchema>,
        layout: CellLayout,
        timeout: Option<Duration>,
    ) -> Result<(LeaseGuard, bool)> {
        loop {
            let gate = self.commit_gate.read();
            let slot = match self.cells.entry(id) {
                Entry::Occupied(e) => Arc::clone(e.get()),
                Entry::Vacant(v) => {
                    let slot = Arc::new(CellSlot::new(CellData::new(
                        id,
                        Arc::clone(schema),
                        layout,
                    )));
                    // Nobody else can see the slot yet, so this cannot block
                    let guard = slot.acquire(None)?;
                    v.insert(slot);
                    self.next_version();
                    debug!(%id, type_name = schema.name(), "Created cell on upsert");
                    return Ok((guard, true));
                }
            };
            drop(gate);
            match slot.acquire(timeout) {
                Ok(guard) => return Ok((guard, false)),
                Err(Error::NotFound(_)) => continue,
                Err(e) => return Err(e),
            }
        }
    }

    /// Apply staged mutations to a leased cell and publish them
    ///
    /// Returns the new store version. Every op is checked against the cell
    /// before any is applied, so a rejected batch leaves the cell and the
    /// version unchanged.
    pub fn commit(&self, guard: &LeaseGuard, ops: Vec<FieldOp>) -> Result<u64> {
        let _gate = self.commit_gate.read();
        let reallocations = guard.update(|data| -> Result<u64> {
            for op in &ops {
                data.check_op(op)?;
            }
            let mut reallocations = 0;
            for op in ops {
                reallocations += u64::from(data.apply(op)?);
            }
            Ok(reallocations)
        })?;
        if reallocations > 0 {
            self.list_reallocations
                .fetch_add(reallocations, Ordering::Relaxed);
        }
        Ok(self.next_version())
    }

    /// Publish entirely new state for a leased cell
    pub fn commit_replace(&self, guard: &LeaseGuard, data: CellData) -> u64 {
        let _gate = self.commit_gate.read();
        guard.replace(data);
        self.next_version()
    }

    /// Write a whole cell in one step
    ///
    /// Inserts `data` if the id is absent. Otherwise takes the existing
    /// cell's lease and replaces its state, which requires the type tags to
    /// match. Returns true if the cell was created.
    pub fn replace(&self, data: CellData, timeout: Option<Duration>) -> Result<bool> {
        let id = data.id();
        loop {
            let gate = self.commit_gate.read();
            let slot = match self.cells.entry(id) {
                Entry::Occupied(e) => Arc::clone(e.get()),
                Entry::Vacant(v) => {
                    v.insert(Arc::new(CellSlot::new(data)));
                    self.next_version();
                    return Ok(true);
                }
            };
            drop(gate);
            let guard = match slot.acquire(timeout) {
                Ok(guard) => guard,
                Err(Error::NotFound(_)) => continue,
                Err(e) => return Err(e),
            };
            let existing = guard.current();
            if existing.type_name() != data.type_name() {
                return Err(Error::violation(
                    data.type_name(),
                    "",
                    format!("cell {} already exists with type '{}'", id, existing.type_name()),
                ));
            }
            self.commit_replace(&guard, data);
            return Ok(false);
        }
    }

    /// Remove a cell
    ///
    /// Waits for the cell's lease so no in-flight scope is cut short.
    /// Irreversible.
    pub fn remove(&self, id: CellId, timeout: Option<Duration>) -> Result<()> {
        let slot = self.slot(id).ok_or(Error::NotFound(id))?;
        let guard = slot.acquire(timeout)?;
        let _gate = self.commit_gate.read();
        guard.mark_removed();
        self.cells.remove_if(&id, |_, s| Arc::ptr_eq(s, &slot));
        self.next_version();
        debug!(%id, "Removed cell");
        Ok(())
    }

    /// Block all commits until the returned guard is dropped
    pub fn quiesce(&self) -> RwLockWriteGuard<'_, ()> {
        self.commit_gate.write()
    }

    /// Drop every cell
    pub fn clear(&self) {
        let _gate = self.commit_gate.write();
        self.cells.clear();
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryStore")
            .field("cells", &self.len())
            .field("version", &self.version())
            .finish()
    }
}
