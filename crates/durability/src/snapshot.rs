//! Snapshot file I/O
//!
//! ## Atomic replace
//!
//! ```text
//! 1. write image to <name>.tmp
//! 2. fsync the temp file
//! 3. rename <name>.tmp -> <name>
//! 4. fsync the directory (unix)
//! ```
//!
//! A crash before step 3 leaves the previous snapshot intact. A crash after
//! step 3 leaves the new one. Readers never observe a partial file under the
//! final name.

use crate::format::{decode_snapshot, DecodedSnapshot};
use celldb_core::CheckpointError;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Snapshot file name used when none is configured
pub const DEFAULT_SNAPSHOT_FILE: &str = "snapshot.cdb";

const TMP_SUFFIX: &str = ".tmp";

/// Writes snapshot images with atomic replace
#[derive(Debug, Clone)]
pub struct SnapshotWriter {
    dir: PathBuf,
    file_name: String,
}

impl SnapshotWriter {
    /// Writer for `dir/file_name`
    pub fn new(dir: impl Into<PathBuf>, file_name: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            file_name: file_name.into(),
        }
    }

    /// Directory snapshots are written to
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Final snapshot path
    pub fn path(&self) -> PathBuf {
        self.dir.join(&self.file_name)
    }

    /// Temporary path used while writing
    pub fn tmp_path(&self) -> PathBuf {
        self.dir.join(format!("{}{}", self.file_name, TMP_SUFFIX))
    }

    /// Durably replace the snapshot with `image`
    ///
    /// Returns the number of bytes written. On error the previous snapshot,
    /// if any, is still in place.
    pub fn write(&self, image: &[u8]) -> Result<u64, CheckpointError> {
        fs::create_dir_all(&self.dir).map_err(|e| CheckpointError::io(&self.dir, e))?;

        let tmp = self.tmp_path();
        let path = self.path();

        let result = write_synced(&tmp, image).and_then(|()| {
            fs::rename(&tmp, &path).map_err(|e| CheckpointError::io(&path, e))
        });
        if let Err(e) = result {
            if let Err(cleanup) = fs::remove_file(&tmp) {
                if cleanup.kind() != io::ErrorKind::NotFound {
                    warn!(path = %tmp.display(), error = %cleanup, "Failed to remove temp snapshot");
                }
            }
            return Err(e);
        }

        sync_dir(&self.dir)?;
        debug!(path = %path.display(), bytes = image.len(), "Snapshot replaced");
        Ok(image.len() as u64)
    }
}

fn write_synced(path: &Path, image: &[u8]) -> Result<(), CheckpointError> {
    let mut file = File::create(path).map_err(|e| CheckpointError::io(path, e))?;
    file.write_all(image)
        .map_err(|e| CheckpointError::io(path, e))?;
    file.sync_all().map_err(|e| CheckpointError::io(path, e))
}

#[cfg(unix)]
fn sync_dir(dir: &Path) -> Result<(), CheckpointError> {
    File::open(dir)
        .and_then(|d| d.sync_all())
        .map_err(|e| CheckpointError::io(dir, e))
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> Result<(), CheckpointError> {
    Ok(())
}

/// Reads snapshot images
pub struct SnapshotReader;

impl SnapshotReader {
    /// Read and verify the snapshot at `path`
    ///
    /// Returns `Ok(None)` if no snapshot exists.
    pub fn read(path: &Path) -> Result<Option<DecodedSnapshot>, CheckpointError> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(CheckpointError::io(path, e)),
        };
        decode_snapshot(&bytes).map(Some)
    }
}
