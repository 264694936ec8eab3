//! Options for opening a cell accessor

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// What to do when the target cell does not exist
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum UseMode {
    /// Fail with `NotFound`
    #[default]
    FailIfNotFound,
    /// Create an empty cell of the named type
    CreateIfNotFound(String),
}

/// Options for [`CellManager::use_cell`](crate::CellManager::use_cell)
///
/// # Examples
///
/// ```
/// use celldb_concurrency::{UseMode, UseOptions};
/// use std::time::Duration;
///
/// let opts = UseOptions::create_if_not_found("Book").with_timeout(Duration::from_secs(1));
/// assert_eq!(opts.mode, UseMode::CreateIfNotFound("Book".into()));
/// assert_eq!(opts.timeout, Some(Duration::from_secs(1)));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UseOptions {
    /// Behavior for a missing cell
    pub mode: UseMode,
    /// Lease wait bound; `None` falls back to the manager's default
    pub timeout: Option<Duration>,
}

impl UseOptions {
    /// Fail with `NotFound` if the cell is absent (the default)
    pub fn fail_if_not_found() -> Self {
        Self::default()
    }

    /// Create an empty cell of `type_name` if absent
    ///
    /// The empty cell is published when the accessor opens, not when it
    /// closes. It stays in the store even when the scope discards its
    /// staged writes, and a checkpoint taken while the scope is open
    /// includes it.
    pub fn create_if_not_found(type_name: impl Into<String>) -> Self {
        Self {
            mode: UseMode::CreateIfNotFound(type_name.into()),
            timeout: None,
        }
    }

    /// Bound how long to wait for the lease
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Type to create, if creation was requested
    pub fn create_type(&self) -> Option<&str> {
        match &self.mode {
            UseMode::CreateIfNotFound(name) => Some(name),
            UseMode::FailIfNotFound => None,
        }
    }
}
