//! Checkpoint Tests
//!
//! Snapshot durability, consistency modes, and cluster checkpoints.

use crate::*;
use std::sync::Arc;

fn write_titles(db: &Database, ids: std::ops::Range<u64>, prefix: &str) {
    let opts = UseOptions::create_if_not_found("Book");
    for i in ids {
        db.with_cell(CellId::new(i), &opts, |b| {
            b.set_field("title", format!("{} {}", prefix, i))
        })
        .unwrap();
    }
}

// ============================================================================
// Single Node
// ============================================================================

#[test]
fn reload_reproduces_cells_committed_before_checkpoint() {
    let temp_dir = tempfile::tempdir().unwrap();
    {
        let db = Database::builder()
            .path(temp_dir.path())
            .checkpoint_on_close(false)
            .open()
            .unwrap();
        register_library(&db);
        write_titles(&db, 0..20, "first");

        let info = db.save_storage().unwrap();
        assert_eq!(info.cells, 20);
        assert!(info.bytes > 0);

        // After the checkpoint: overwrite some, add some, remove one
        write_titles(&db, 10..30, "second");
        db.remove(CellId::new(0)).unwrap();
        db.close().unwrap();
    }

    let db = open_persistent_db(temp_dir.path());
    assert_eq!(db.len(), 20);
    for i in 0..20 {
        assert_eq!(
            db.fetch(CellId::new(i)).unwrap().string("title"),
            Some(format!("first {}", i))
        );
    }
    assert!(!db.contains(CellId::new(25)));
}

#[test]
fn checkpoint_replaces_previous_snapshot() {
    let temp_dir = tempfile::tempdir().unwrap();
    let db = open_persistent_db(temp_dir.path());
    write_titles(&db, 0..5, "v1");
    db.save_storage().unwrap();
    write_titles(&db, 0..5, "v2");
    let info = db.save_storage().unwrap();
    assert!(!temp_dir.path().join("snapshot.cdb.tmp").exists());
    db.discard();

    let db = open_persistent_db(temp_dir.path());
    assert_eq!(db.restored().unwrap().store_version, info.store_version);
    assert_eq!(
        db.fetch(CellId::new(3)).unwrap().string("title").as_deref(),
        Some("v2 3")
    );
}

#[test]
fn failed_checkpoint_keeps_previous_snapshot_readable() {
    let temp_dir = tempfile::tempdir().unwrap();
    let db = open_persistent_db(temp_dir.path());
    write_titles(&db, 0..5, "durable");
    let first = db.save_storage().unwrap();

    write_titles(&db, 0..8, "lost");
    let blocker = temp_dir.path().join("snapshot.cdb.tmp");
    std::fs::create_dir(&blocker).unwrap();
    assert!(matches!(
        db.save_storage(),
        Err(Error::Checkpoint(CheckpointError::Io { .. }))
    ));
    db.discard();
    std::fs::remove_dir(&blocker).unwrap();

    let db = open_persistent_db(temp_dir.path());
    assert_eq!(db.restored().unwrap().store_version, first.store_version);
    assert_eq!(db.len(), 5);
    for i in 0..5 {
        assert_eq!(
            db.fetch(CellId::new(i)).unwrap().string("title"),
            Some(format!("durable {}", i))
        );
    }
    assert!(!db.contains(CellId::new(7)));
}

#[test]
fn quiescent_checkpoint_is_an_exact_cut() {
    let temp_dir = tempfile::tempdir().unwrap();
    let db = Arc::new(
        Database::builder()
            .path(temp_dir.path())
            .consistency(CheckpointConsistency::Quiescent)
            .lease_timeout(Some(TEST_LEASE_TIMEOUT))
            .open()
            .unwrap(),
    );
    register_library(&db);

    let writer = {
        let db = Arc::clone(&db);
        std::thread::spawn(move || write_titles(&db, 0..500, "busy"))
    };
    let info = db.save_storage().unwrap();
    writer.join().unwrap();

    let db = match Arc::try_unwrap(db) {
        Ok(db) => db,
        Err(_) => panic!("database still shared"),
    };
    db.discard();

    let reopened = open_persistent_db(temp_dir.path());
    assert_eq!(reopened.len(), info.cells);
    assert_eq!(reopened.stats().version, info.store_version);
}

#[test]
fn corrupt_snapshot_fails_open() {
    let temp_dir = tempfile::tempdir().unwrap();
    {
        let db = open_persistent_db(temp_dir.path());
        write_titles(&db, 0..3, "x");
        db.close().unwrap();
    }
    let path = temp_dir.path().join("snapshot.cdb");
    let mut bytes = std::fs::read(&path).unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0xff;
    std::fs::write(&path, bytes).unwrap();

    let err = Database::open(temp_dir.path()).unwrap_err();
    assert!(matches!(
        err,
        Error::Checkpoint(CheckpointError::Corrupt(_))
    ));
}

// ============================================================================
// Cluster
// ============================================================================

#[test]
fn cluster_checkpoint_all_nodes_durable() {
    let temp_dir = tempfile::tempdir().unwrap();
    let nodes: Vec<Database> = ["a", "b", "c"]
        .iter()
        .map(|name| {
            let db = Database::builder()
                .path(temp_dir.path().join(name))
                .node_id(*name)
                .open()
                .unwrap();
            register_library(&db);
            db
        })
        .collect();
    for (n, db) in nodes.iter().enumerate() {
        write_titles(db, 0..(n as u64 + 1) * 10, "node");
    }

    let mut cluster = ClusterCheckpoint::new();
    for db in &nodes {
        cluster.add(db.checkpoint_manager());
    }
    let report = cluster.save_storage();
    assert!(report.is_durable());
    assert_eq!(report.total_cells(), 10 + 20 + 30);
    assert!(report.summary().starts_with("3 of 3 nodes durable"));
    for name in ["a", "b", "c"] {
        assert!(temp_dir.path().join(name).join("snapshot.cdb").exists());
    }
}

#[test]
fn cluster_checkpoint_reports_partial_acknowledgement() {
    let temp_dir = tempfile::tempdir().unwrap();
    let durable = Database::builder()
        .path(temp_dir.path().join("durable"))
        .node_id("durable")
        .open()
        .unwrap();
    let volatile = Database::builder().node_id("volatile").open().unwrap();

    let cluster = ClusterCheckpoint::new()
        .with(durable.checkpoint_manager())
        .with(volatile.checkpoint_manager());
    let report = cluster.save_storage();
    assert!(!report.is_durable());

    match report.into_result() {
        Err(CheckpointError::Partial { durable, failed }) => {
            assert_eq!(durable, vec!["durable".to_string()]);
            assert_eq!(failed.len(), 1);
            assert_eq!(failed[0].0, "volatile");
        }
        other => panic!("expected partial acknowledgement, got {:?}", other),
    }
}
