//! Per-cell slot and exclusive lease
//!
//! Every live cell owns one [`CellSlot`]. The slot carries two locks with
//! different lifetimes:
//!
//! - the lease: held for a whole mutation scope, acquired through a
//!   `Condvar` wait so it can time out;
//! - the data lock: held only while a commit swaps in new state or a reader
//!   clones the current `Arc`.
//!
//! Readers therefore never wait for a lease holder. They see the state as of
//! the last commit.

use crate::cell::{CellData, CellView};
use celldb_core::{CellId, Error, Result};
use parking_lot::{Condvar, Mutex, RwLock};
use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};
use tracing::trace;

#[derive(Debug, Default)]
struct LeaseState {
    holder: Option<ThreadId>,
    removed: bool,
}

/// Storage slot for one cell
#[derive(Debug)]
pub struct CellSlot {
    id: CellId,
    lease: Mutex<LeaseState>,
    released: Condvar,
    data: RwLock<Arc<CellData>>,
}

impl CellSlot {
    /// Wrap freshly built cell state
    pub fn new(data: CellData) -> Self {
        Self {
            id: data.id(),
            lease: Mutex::new(LeaseState::default()),
            released: Condvar::new(),
            data: RwLock::new(Arc::new(data)),
        }
    }

    /// Cell identifier
    pub fn id(&self) -> CellId {
        self.id
    }

    /// Committed state
    pub fn current(&self) -> Arc<CellData> {
        self.data.read().clone()
    }

    /// Immutable view of the committed state
    pub fn view(&self) -> CellView {
        CellView::new(self.current())
    }

    /// True once the cell has been removed from the store
    pub fn is_removed(&self) -> bool {
        self.lease.lock().removed
    }

    /// True while some thread holds the lease
    pub fn is_leased(&self) -> bool {
        self.lease.lock().holder.is_some()
    }

    /// Acquire the exclusive lease
    ///
    /// Blocks until the lease is free, the cell is removed, or `timeout`
    /// elapses. `None` waits indefinitely.
    ///
    /// # Errors
    ///
    /// - [`Error::LeaseReentrant`] if the calling thread already holds it
    /// - [`Error::LeaseTimeout`] if `timeout` elapsed
    /// - [`Error::NotFound`] if the cell was removed while waiting
    pub fn acquire(self: &Arc<Self>, timeout: Option<Duration>) -> Result<LeaseGuard> {
        let me = thread::current().id();
        let started = Instant::now();
        let deadline = timeout.map(|t| started + t);

        let mut state = self.lease.lock();
        loop {
            if state.removed {
                return Err(Error::NotFound(self.id));
            }
            match state.holder {
                None => {
                    state.holder = Some(me);
                    trace!(id = %self.id, "Lease acquired");
                    return Ok(LeaseGuard {
                        slot: Arc::clone(self),
                    });
                }
                Some(holder) if holder == me => return Err(Error::LeaseReentrant(self.id)),
                Some(_) => match deadline {
                    None => self.released.wait(&mut state),
                    Some(deadline) => {
                        if self.released.wait_until(&mut state, deadline).timed_out()
                            && state.holder.is_some()
                            && !state.removed
                        {
                            return Err(Error::LeaseTimeout {
                                id: self.id,
                                waited_ms: started.elapsed().as_millis() as u64,
                            });
                        }
                    }
                },
            }
        }
    }
}

/// Exclusive lease on one cell
///
/// Released on drop, on every exit path including unwinding.
#[derive(Debug)]
pub struct LeaseGuard {
    slot: Arc<CellSlot>,
}

impl LeaseGuard {
    /// Leased cell's identifier
    pub fn id(&self) -> CellId {
        self.slot.id
    }

    /// Slot this lease is held on
    pub fn slot(&self) -> &Arc<CellSlot> {
        &self.slot
    }

    /// Committed state of the leased cell
    pub fn current(&self) -> Arc<CellData> {
        self.slot.current()
    }

    /// Mutate the committed state in place
    ///
    /// Clones the state first if a reader still holds the previous `Arc`.
    pub fn update<R>(&self, f: impl FnOnce(&mut CellData) -> R) -> R {
        let mut data = self.slot.data.write();
        f(Arc::make_mut(&mut *data))
    }

    /// Swap in entirely new state
    pub fn replace(&self, data: CellData) {
        *self.slot.data.write() = Arc::new(data);
    }

    /// Mark the cell removed; waiters fail with `NotFound` once woken
    pub fn mark_removed(&self) {
        self.slot.lease.lock().removed = true;
    }
}

impl Drop for LeaseGuard {
    fn drop(&mut self) {
        let mut state = self.slot.lease.lock();
        state.holder = None;
        if state.removed {
            self.slot.released.notify_all();
        } else {
            self.slot.released.notify_one();
        }
        trace!(id = %self.slot.id, "Lease released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::{CellLayout, FieldOp};
    use celldb_core::{CellSchema, FieldSpec, Value, ValueKind};
    use std::sync::atomic::{AtomicBool, Ordering};

    fn slot() -> Arc<CellSlot> {
        let schema = Arc::new(
            CellSchema::new("Counter", vec![FieldSpec::list("hits", ValueKind::Int)]).unwrap(),
        );
        Arc::new(CellSlot::new(CellData::new(
            CellId::new(7),
            schema,
            CellLayout::Typed,
        )))
    }

    #[test]
    fn test_acquire_and_release() {
        let slot = slot();
        {
            let guard = slot.acquire(None).unwrap();
            assert_eq!(guard.id(), CellId::new(7));
            assert!(slot.is_leased());
        }
        assert!(!slot.is_leased());
    }

    #[test]
    fn test_reentrant_acquire_fails_fast() {
        let slot = slot();
        let _guard = slot.acquire(None).unwrap();
        assert!(matches!(
            slot.acquire(None),
            Err(Error::LeaseReentrant(id)) if id == CellId::new(7)
        ));
    }

    #[test]
    fn test_timeout_while_held_elsewhere() {
        let slot = slot();
        let _guard = slot.acquire(None).unwrap();

        let other = Arc::clone(&slot);
        let result = thread::spawn(move || {
            other
                .acquire(Some(Duration::from_millis(50)))
                .map(|_| ())
        })
        .join()
        .unwrap();

        match result {
            Err(Error::LeaseTimeout { id, waited_ms }) => {
                assert_eq!(id, CellId::new(7));
                assert!(waited_ms >= 40);
            }
            other => panic!("expected LeaseTimeout, got {:?}", other),
        }
    }

    #[test]
    fn test_waiter_gets_lease_after_release() {
        let slot = slot();
        let guard = slot.acquire(None).unwrap();
        let acquired = Arc::new(AtomicBool::new(false));

        let handle = {
            let slot = Arc::clone(&slot);
            let acquired = Arc::clone(&acquired);
            thread::spawn(move || {
                let _g = slot.acquire(Some(Duration::from_secs(5))).unwrap();
                acquired.store(true, Ordering::SeqCst);
            })
        };

        thread::sleep(Duration::from_millis(20));
        assert!(!acquired.load(Ordering::SeqCst));
        drop(guard);
        handle.join().unwrap();
        assert!(acquired.load(Ordering::SeqCst));
    }

    #[test]
    fn test_removed_wakes_waiters_with_not_found() {
        let slot = slot();
        let guard = slot.acquire(None).unwrap();

        let handles: Vec<_> = (0..3)
            .map(|_| {
                let slot = Arc::clone(&slot);
                thread::spawn(move || slot.acquire(None).map(|_| ()))
            })
            .collect();

        thread::sleep(Duration::from_millis(20));
        guard.mark_removed();
        drop(guard);

        for h in handles {
            assert!(matches!(h.join().unwrap(), Err(Error::NotFound(_))));
        }
    }

    #[test]
    fn test_update_copies_on_write_for_readers() {
        let slot = slot();
        let before = slot.view();

        let guard = slot.acquire(None).unwrap();
        let op = FieldOp::append(guard.current().schema(), "hits", Value::from(1i64)).unwrap();
        guard.update(|data| data.apply(op)).unwrap();
        drop(guard);

        assert!(before.field("hits").is_none());
        assert_eq!(slot.view().field("hits").unwrap().len(), 1);
    }

    #[test]
    fn test_lease_released_on_panic() {
        let slot = slot();
        let inner = Arc::clone(&slot);
        let result = thread::spawn(move || {
            let _guard = inner.acquire(None).unwrap();
            panic!("boom");
        })
        .join();
        assert!(result.is_err());
        assert!(!slot.is_leased());
        assert!(slot.acquire(Some(Duration::from_millis(10))).is_ok());
    }
}
