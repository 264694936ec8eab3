//! Storage layer for CellDB
//!
//! This crate implements the Memory Store:
//! - MemoryStore: DashMap-indexed arena of cells, one slot per CellId
//! - CellSlot: committed cell state plus the per-cell exclusive lease
//! - CellData: fixed-offset field layout with amortized list growth
//! - FieldOp: a validated, coerced field mutation ready to apply

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cell;
pub mod lease;
pub mod sharded;

pub use cell::{CellData, CellLayout, CellView, FieldOp, ListBuffer, MIN_LIST_CAPACITY};
pub use lease::{CellSlot, LeaseGuard};
pub use sharded::{AllocMode, MemoryStore, StoreStats};
