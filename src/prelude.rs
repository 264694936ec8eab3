//! Convenient imports for CellDB.
//!
//! ```ignore
//! use celldb::prelude::*;
//!
//! let db = Database::ephemeral()?;
//! ```

// Main entry point
pub use celldb_engine::{Database, DatabaseBuilder, DatabaseConfig};

// Cells
pub use celldb_concurrency::{CellAccessor, UseMode, UseOptions};
pub use celldb_engine::{CellWriter, GenericCell, TypedCell};
pub use celldb_storage::CellView;

// Core types
pub use celldb_core::{CellId, FieldSpec, FieldValue, Scalar, Value, ValueKind};

// Error handling
pub use celldb_core::{CheckpointError, Error, Result};

// Checkpoints
pub use celldb_durability::{
    CheckpointConsistency, CheckpointInfo, CheckpointParticipant, ClusterCheckpoint,
};
