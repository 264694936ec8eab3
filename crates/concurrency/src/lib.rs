//! Concurrency layer for CellDB
//!
//! This crate implements the Cell Accessor upsert protocol:
//! - CellAccessor: scoped, exclusive mutation handle on one cell
//! - UseOptions: fail-if-not-found / create-if-not-found, lease timeout
//! - CellManager: opens accessors and runs `with_cell` closures
//!
//! Mutations are staged inside the accessor and published in one step when
//! the scope closes. The per-cell lease is released on every exit path.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod accessor;
pub mod manager;
pub mod options;

pub use accessor::CellAccessor;
pub use manager::CellManager;
pub use options::{UseMode, UseOptions};
