//! Database configuration
//!
//! Loaded from TOML:
//!
//! ```toml
//! data_dir = "/var/lib/celldb"
//! lease_timeout_ms = 5000
//! consistency = "quiescent"
//!
//! [[schema]]
//! name = "Book"
//!
//! [[schema.field]]
//! name = "title"
//! kind = "String"
//!
//! [[schema.field]]
//! name = "tags"
//! kind = "String"
//! list = true
//! optional = true
//! ```
//!
//! Every key is optional. A config without `data_dir` opens an ephemeral
//! database.

use celldb_core::{CellSchema, Error, FieldSpec, Result, ValueKind};
use celldb_durability::{CheckpointConsistency, DEFAULT_SNAPSHOT_FILE};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Lease timeout applied when the config does not set one
pub const DEFAULT_LEASE_TIMEOUT_MS: u64 = 30_000;

/// Settings for opening a [`Database`](crate::Database)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DatabaseConfig {
    /// Snapshot directory; `None` means ephemeral
    pub data_dir: Option<PathBuf>,
    /// Lease wait bound in milliseconds; 0 waits indefinitely
    pub lease_timeout_ms: u64,
    /// Checkpoint consistency contract
    pub consistency: CheckpointConsistency,
    /// Snapshot file name inside `data_dir`
    pub snapshot_file: String,
    /// Node id reported in cluster checkpoints
    pub node_id: String,
    /// Write a final checkpoint in `Database::close`
    pub checkpoint_on_close: bool,
    /// Schemas registered at open, before the snapshot is reloaded
    #[serde(rename = "schema")]
    pub schemas: Vec<SchemaConfig>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            lease_timeout_ms: DEFAULT_LEASE_TIMEOUT_MS,
            consistency: CheckpointConsistency::default(),
            snapshot_file: DEFAULT_SNAPSHOT_FILE.to_string(),
            node_id: "local".to_string(),
            checkpoint_on_close: true,
            schemas: Vec::new(),
        }
    }
}

/// One `[[schema]]` table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchemaConfig {
    /// Type name
    pub name: String,
    /// Fields in declaration order
    #[serde(rename = "field", default)]
    pub fields: Vec<FieldConfig>,
}

/// One `[[schema.field]]` table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FieldConfig {
    /// Field name
    pub name: String,
    /// Scalar kind
    pub kind: ValueKind,
    /// List cardinality
    #[serde(default)]
    pub list: bool,
    /// Optional field
    #[serde(default)]
    pub optional: bool,
    /// Target type of a `Ref` field
    #[serde(default)]
    pub references: Option<String>,
}

impl From<&FieldConfig> for FieldSpec {
    fn from(config: &FieldConfig) -> Self {
        let mut spec = if config.list {
            FieldSpec::list(&config.name, config.kind)
        } else {
            FieldSpec::single(&config.name, config.kind)
        };
        if config.optional {
            spec = spec.optional();
        }
        if let Some(target) = &config.references {
            spec = spec.references(target);
        }
        spec
    }
}

impl SchemaConfig {
    /// Build the schema this table declares
    pub fn to_schema(&self) -> Result<CellSchema> {
        CellSchema::new(&self.name, self.fields.iter().map(FieldSpec::from).collect())
    }
}

impl DatabaseConfig {
    /// Parse a TOML document
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        toml::from_str(contents)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))
    }

    /// Read and parse a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("failed to read config file {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&contents)
    }

    /// Lease wait bound, `None` for indefinitely
    pub fn lease_timeout(&self) -> Option<Duration> {
        match self.lease_timeout_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }

    /// Validate settings and build the configured schemas
    pub fn schema_definitions(&self) -> Result<Vec<CellSchema>> {
        if self.snapshot_file.is_empty() {
            return Err(Error::Config("snapshot_file must not be empty".to_string()));
        }
        self.schemas.iter().map(SchemaConfig::to_schema).collect()
    }
}
