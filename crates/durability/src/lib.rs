//! Durability layer for CellDB
//!
//! This crate implements the Checkpoint Manager:
//! - Snapshot format: typed and tagged cell records with a CRC32 trailer
//! - SnapshotWriter: atomic replace of the previous snapshot
//! - CheckpointManager: save_storage / load with configurable consistency
//! - ClusterCheckpoint: fan-out checkpoint across store instances
//!
//! A checkpoint returns only once the snapshot is durable. Nothing committed
//! after the last successful checkpoint survives a restart.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod checkpoint;
pub mod cluster;
pub mod format;
pub mod snapshot;

pub use checkpoint::{CheckpointConsistency, CheckpointInfo, CheckpointManager, LoadInfo};
pub use cluster::{CheckpointParticipant, ClusterCheckpoint, ClusterCheckpointReport};
pub use format::{SnapshotHeader, FORMAT_VERSION, MAGIC};
pub use snapshot::{SnapshotReader, SnapshotWriter, DEFAULT_SNAPSHOT_FILE};
