//! Database engine for CellDB
//!
//! Wires the schema registry, memory store, accessor manager and checkpoint
//! manager into one [`Database`] handle, and adds the two ways of building
//! cells outside a scoped accessor:
//! - [`GenericCell`]: type resolved at runtime from a type name
//! - [`TypedCell`]: type fixed at compile time by a Rust struct

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod database;
pub mod generic;
pub mod typed;

pub use config::{DatabaseConfig, FieldConfig, SchemaConfig, DEFAULT_LEASE_TIMEOUT_MS};
pub use database::{Database, DatabaseBuilder};
pub use generic::GenericCell;
pub use typed::{CellWriter, TypedCell};
