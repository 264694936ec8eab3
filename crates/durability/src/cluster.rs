//! Distributed checkpoint
//!
//! Fans `save_storage` out to every participant on scoped threads and
//! collects one outcome per node. The cluster state is durable only when
//! every participant acknowledged; anything less is reported as partial,
//! naming the nodes on each side.
//!
//! Transport is not handled here. A remote node is represented by whatever
//! implements [`CheckpointParticipant`] for it.

use crate::checkpoint::{CheckpointInfo, CheckpointManager};
use celldb_core::CheckpointError;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// One store instance taking part in a cluster checkpoint
pub trait CheckpointParticipant: Send + Sync {
    /// Stable node identifier
    fn node_id(&self) -> &str;

    /// Durably checkpoint this node
    fn save_storage(&self) -> Result<CheckpointInfo, CheckpointError>;
}

impl CheckpointParticipant for CheckpointManager {
    fn node_id(&self) -> &str {
        CheckpointManager::node_id(self)
    }

    fn save_storage(&self) -> Result<CheckpointInfo, CheckpointError> {
        CheckpointManager::save_storage(self)
    }
}

/// Per-node outcomes of a cluster checkpoint
#[derive(Debug)]
pub struct ClusterCheckpointReport {
    /// Nodes that acknowledged, with their checkpoint info
    pub acknowledged: Vec<(String, CheckpointInfo)>,
    /// Nodes that failed, with their error
    pub failed: Vec<(String, CheckpointError)>,
    /// Wall time of the whole fan-out
    pub elapsed: Duration,
}

impl ClusterCheckpointReport {
    /// True when no participant failed
    pub fn is_durable(&self) -> bool {
        self.failed.is_empty()
    }

    /// Total cells written across acknowledged nodes
    pub fn total_cells(&self) -> usize {
        self.acknowledged.iter().map(|(_, info)| info.cells).sum()
    }

    /// Human-readable one-line summary
    pub fn summary(&self) -> String {
        format!(
            "{} of {} nodes durable, {} cells, {:?}",
            self.acknowledged.len(),
            self.acknowledged.len() + self.failed.len(),
            self.total_cells(),
            self.elapsed
        )
    }

    /// Convert to a result; any failure becomes `CheckpointError::Partial`
    pub fn into_result(self) -> Result<Vec<(String, CheckpointInfo)>, CheckpointError> {
        if self.failed.is_empty() {
            return Ok(self.acknowledged);
        }
        Err(CheckpointError::Partial {
            durable: self.acknowledged.into_iter().map(|(node, _)| node).collect(),
            failed: self
                .failed
                .into_iter()
                .map(|(node, e)| (node, e.to_string()))
                .collect(),
        })
    }
}

/// Checkpoint coordinator over a fixed set of participants
#[derive(Default, Clone)]
pub struct ClusterCheckpoint {
    participants: Vec<Arc<dyn CheckpointParticipant>>,
}

impl ClusterCheckpoint {
    /// Coordinator with no participants
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a participant
    pub fn add(&mut self, participant: Arc<dyn CheckpointParticipant>) {
        self.participants.push(participant);
    }

    /// Builder form of [`ClusterCheckpoint::add`]
    pub fn with(mut self, participant: Arc<dyn CheckpointParticipant>) -> Self {
        self.add(participant);
        self
    }

    /// Number of participants
    pub fn len(&self) -> usize {
        self.participants.len()
    }

    /// True if there are no participants
    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    /// Checkpoint every participant in parallel
    ///
    /// Waits for all of them, successful or not. A participant that panics
    /// is reported as failed.
    pub fn save_storage(&self) -> ClusterCheckpointReport {
        let started = Instant::now();
        let outcomes: Vec<(String, Result<CheckpointInfo, CheckpointError>)> =
            thread::scope(|scope| {
                let handles: Vec<_> = self
                    .participants
                    .iter()
                    .map(|p| {
                        let node = p.node_id().to_string();
                        (node, scope.spawn(move || p.save_storage()))
                    })
                    .collect();
                handles
                    .into_iter()
                    .map(|(node, handle)| {
                        let outcome = handle.join().unwrap_or_else(|_| {
                            Err(CheckpointError::ParticipantPanicked { node: node.clone() })
                        });
                        (node, outcome)
                    })
                    .collect()
            });

        let mut report = ClusterCheckpointReport {
            acknowledged: Vec::new(),
            failed: Vec::new(),
            elapsed: Duration::ZERO,
        };
        for (node, outcome) in outcomes {
            match outcome {
                Ok(info) => report.acknowledged.push((node, info)),
                Err(e) => {
                    warn!(node = %node, error = %e, "Participant checkpoint failed");
                    report.failed.push((node, e));
                }
            }
        }
        report.elapsed = started.elapsed();

        if report.is_durable() {
            info!(summary = %report.summary(), "Cluster checkpoint complete");
        } else {
            warn!(summary = %report.summary(), "Cluster checkpoint partial");
        }
        report
    }
}

impl std::fmt::Debug for ClusterCheckpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterCheckpoint")
            .field(
                "participants",
                &self
                    .participants
                    .iter()
                    .map(|p| p.node_id().to_string())
                    .collect::<Vec<_>>(),
            )
            .finish()
    }
}
