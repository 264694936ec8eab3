//! Database Lifecycle Tests
//!
//! Tests for opening, closing, discarding and reopening databases.

use crate::*;

// ============================================================================
// Ephemeral Database
// ============================================================================

#[test]
fn ephemeral_database_is_functional() {
    let db = create_ephemeral_db();
    db.with_cell(CellId::new(1), &UseOptions::create_if_not_found("Book"), |book| {
        book.append_to_field("title", "Solaris")
    })
    .unwrap();

    assert_eq!(db.len(), 1);
    assert_eq!(
        db.fetch(CellId::new(1)).unwrap().string("title").as_deref(),
        Some("Solaris")
    );
}

#[test]
fn ephemeral_database_cannot_checkpoint() {
    let db = create_ephemeral_db();
    let err = db.save_storage().unwrap_err();
    assert!(err.is_checkpoint_failure());
    assert!(matches!(
        err,
        Error::Checkpoint(CheckpointError::NoStoragePath)
    ));
}

// ============================================================================
// Persistent Database
// ============================================================================

#[test]
fn persistent_database_creates_directory_on_checkpoint() {
    let temp_dir = tempfile::tempdir().unwrap();
    let db_path = temp_dir.path().join("library");

    let db = open_persistent_db(&db_path);
    assert!(!db_path.exists());
    db.save_storage().unwrap();
    assert!(db_path.join("snapshot.cdb").exists());
}

#[test]
fn reopen_restores_schemas_and_cells() {
    let temp_dir = tempfile::tempdir().unwrap();
    {
        let db = open_persistent_db(temp_dir.path());
        let mut book = db.new_generic(CellId::new(7), "Book").unwrap();
        book.append_to_field("title", "Roadside Picnic").unwrap();
        db.save_generic(&book).unwrap();
        db.close().unwrap();
    }

    // No schemas registered up front: they come back from the snapshot
    let db = Database::open(temp_dir.path()).unwrap();
    assert!(db.registry().contains("Book"));
    assert!(db.registry().contains("Shelf"));
    assert_eq!(
        db.fetch(CellId::new(7)).unwrap().string("title").as_deref(),
        Some("Roadside Picnic")
    );
}

#[test]
fn discard_keeps_previous_snapshot() {
    let temp_dir = tempfile::tempdir().unwrap();
    {
        let db = open_persistent_db(temp_dir.path());
        db.with_cell(CellId::new(1), &UseOptions::create_if_not_found("Book"), |b| {
            b.append_to_field("title", "kept")
        })
        .unwrap();
        db.close().unwrap();
    }
    {
        let db = open_persistent_db(temp_dir.path());
        db.with_cell(CellId::new(2), &UseOptions::create_if_not_found("Book"), |b| {
            b.append_to_field("title", "dropped")
        })
        .unwrap();
        db.discard();
    }

    let db = open_persistent_db(temp_dir.path());
    assert_eq!(db.len(), 1);
    assert!(db.contains(CellId::new(1)));
    assert!(!db.contains(CellId::new(2)));
}

#[test]
fn config_file_drives_open() {
    let temp_dir = tempfile::tempdir().unwrap();
    let config_path = temp_dir.path().join("celldb.toml");
    let data_dir = temp_dir.path().join("data");
    std::fs::write(
        &config_path,
        format!(
            r#"
data_dir = "{}"
lease_timeout_ms = 2000
consistency = "quiescent"
node_id = "node-a"

[[schema]]
name = "Book"
[[schema.field]]
name = "title"
kind = "String"
"#,
            data_dir.display().to_string().replace('\\', "\\\\")
        ),
    )
    .unwrap();

    let config = DatabaseConfig::from_file(&config_path).unwrap();
    let db = Database::from_config(config).unwrap();
    assert_eq!(db.path(), Some(data_dir.as_path()));
    assert_eq!(db.lease_timeout(), Some(Duration::from_secs(2)));
    assert_eq!(db.consistency(), CheckpointConsistency::Quiescent);
    assert_eq!(db.checkpoint_manager().node_id(), "node-a");
    assert!(db.registry().contains("Book"));
}
