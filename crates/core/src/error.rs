//! Error types for CellDB
//!
//! Every fallible operation returns [`Result`]. Field-level and lookup errors
//! are reported to the immediate caller and never leave store state partially
//! modified. [`CheckpointError`] is kept as its own enum because a failed
//! checkpoint breaks the durability contract and callers must be able to
//! match on it separately.

use crate::types::{CellId, ValueKind};
use std::path::PathBuf;
use thiserror::Error;

/// All CellDB errors
#[derive(Debug, Error)]
pub enum Error {
    /// Type name already registered with a different layout
    #[error("schema conflict: type '{type_name}' is already registered with a different layout")]
    SchemaConflict {
        /// The conflicting type name
        type_name: String,
    },

    /// Type name not present in the registry
    #[error("unknown cell type '{0}'")]
    UnknownType(String),

    /// Write does not fit the declared field layout
    #[error("schema violation on {type_name}.{field}: {reason}")]
    SchemaViolation {
        /// Cell type
        type_name: String,
        /// Field name
        field: String,
        /// What was wrong
        reason: String,
    },

    /// Supplied value cannot be converted to the field's kind
    #[error("type mismatch on field '{field}': cannot convert {actual} to {expected}")]
    TypeMismatch {
        /// Field name
        field: String,
        /// Declared kind
        expected: ValueKind,
        /// Description of the supplied value
        actual: String,
    },

    /// Cell does not exist
    #[error("cell {0} not found")]
    NotFound(CellId),

    /// Cell already exists and creation was not requested
    #[error("cell {0} already exists")]
    DuplicateId(CellId),

    /// Lease acquisition gave up
    #[error("timed out after {waited_ms}ms waiting for lease on cell {id}")]
    LeaseTimeout {
        /// Cell being waited on
        id: CellId,
        /// Milliseconds spent waiting
        waited_ms: u64,
    },

    /// The calling thread already holds this cell's lease
    #[error("cell {0} is already leased by the current thread")]
    LeaseReentrant(CellId),

    /// Checkpoint failed; nothing since the last successful checkpoint is durable
    #[error("checkpoint failed: {0}")]
    Checkpoint(#[from] CheckpointError),

    /// Invalid configuration
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Build a [`Error::SchemaViolation`]
    pub fn violation(
        type_name: impl Into<String>,
        field: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Error::SchemaViolation {
            type_name: type_name.into(),
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Check if this is a not-found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }

    /// Check if retrying the same call may succeed
    ///
    /// Only lease timeouts qualify. Checkpoint failures are deliberately not
    /// retryable here: retry policy belongs to the caller.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::LeaseTimeout { .. })
    }

    /// Check if this error breaks the durability contract
    pub fn is_checkpoint_failure(&self) -> bool {
        matches!(self, Error::Checkpoint(_))
    }
}

/// Checkpoint and snapshot errors
#[derive(Debug, Error)]
pub enum CheckpointError {
    /// I/O failure while writing or reading a snapshot
    #[error("I/O error on {path}: {source}")]
    Io {
        /// File involved
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Database was opened without a storage directory
    #[error("no storage path configured (ephemeral database)")]
    NoStoragePath,

    /// Snapshot bytes are malformed or fail their checksum
    #[error("corrupt snapshot: {0}")]
    Corrupt(String),

    /// Snapshot format version is not readable by this build
    #[error("unsupported snapshot format version {found} (expected {expected})")]
    UnsupportedVersion {
        /// Version in the file
        found: u32,
        /// Version this build writes
        expected: u32,
    },

    /// Snapshot layout for a type differs from the registered one
    #[error("snapshot schema for '{type_name}' is incompatible with the registered schema")]
    SchemaMismatch {
        /// Offending type
        type_name: String,
    },

    /// Catalog encoding failed
    #[error("encoding error: {0}")]
    Encode(String),

    /// A cluster participant panicked before acknowledging
    #[error("participant {node} panicked during checkpoint")]
    ParticipantPanicked {
        /// Node that panicked
        node: String,
    },

    /// Distributed checkpoint acknowledged by only some participants
    #[error("partial checkpoint: {} durable, {} failed ({})", durable.len(), failed.len(), describe_failures(failed))]
    Partial {
        /// Nodes that acknowledged
        durable: Vec<String>,
        /// Nodes that failed, with their error text
        failed: Vec<(String, String)>,
    },
}

impl CheckpointError {
    /// Wrap an I/O error with the path it happened on
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CheckpointError::Io {
            path: path.into(),
            source,
        }
    }
}

fn describe_failures(failed: &[(String, String)]) -> String {
    failed
        .iter()
        .map(|(node, err)| format!("{}: {}", node, err))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Result type for CellDB operations
pub type Result<T> = std::result::Result<T, Error>;
