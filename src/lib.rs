//! # CellDB
//!
//! Embedded in-memory cell store.
//!
//! A cell is a record with a 64-bit id, a type tag and named fields laid out
//! by a registered schema. Cells are written through scoped, exclusive
//! accessors (upsert protocol) or built detached from a type name resolved
//! at runtime, and the whole store is checkpointed to one snapshot file.
//!
//! ## Quick Start
//!
//! ```ignore
//! use celldb::prelude::*;
//!
//! let db = Database::open("./library")?;
//! db.register_schema(
//!     "Book",
//!     vec![
//!         FieldSpec::single("title", ValueKind::String),
//!         FieldSpec::list("readers", ValueKind::Int).optional(),
//!     ],
//! )?;
//!
//! // Scoped upsert: creates cell 1 if absent, commits on Ok
//! db.with_cell(CellId::new(1), &UseOptions::create_if_not_found("Book"), |book| {
//!     book.append_to_field("title", "Solaris")?;
//!     book.append_to_field("readers", "42")
//! })?;
//!
//! // Generic cell: type named at runtime, published in one write
//! let mut cell = db.new_generic(CellId::new(2), "Book")?;
//! cell.append_to_field("title", "Dune")?;
//! db.save_generic(&cell)?;
//!
//! db.save_storage()?;
//! db.close()?;
//! ```
//!
//! ## Crates
//!
//! - `celldb-core` - ids, values, schemas, errors
//! - `celldb-storage` - memory store and per-cell leases
//! - `celldb-concurrency` - scoped accessors
//! - `celldb-durability` - snapshots and checkpoints
//! - `celldb-engine` - the [`Database`] handle

#![warn(missing_docs)]

pub mod prelude;

// Re-export main entry points
pub use celldb_engine::{Database, DatabaseBuilder, DatabaseConfig, GenericCell, TypedCell};

// Re-export error handling
pub use celldb_core::{CheckpointError, Error, Result};
