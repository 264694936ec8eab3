//! Upsert Protocol Tests
//!
//! Scoped accessors: creation options, append-or-overwrite semantics,
//! commit-on-exit, lease exclusivity and lost-update freedom.

use crate::*;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;

fn create(type_name: &str) -> UseOptions {
    UseOptions::create_if_not_found(type_name)
}

// ============================================================================
// Creation Options
// ============================================================================

#[test]
fn fail_if_not_found_is_default() {
    let db = create_ephemeral_db();
    let err = db
        .use_cell(CellId::new(1), &UseOptions::default())
        .unwrap_err();
    assert!(err.is_not_found());
    assert!(!db.contains(CellId::new(1)));
}

#[test]
fn create_if_not_found_then_plain_use() {
    let db = create_ephemeral_db();
    {
        let book = db.use_cell(CellId::new(1), &create("Book")).unwrap();
        assert!(book.was_created());
        assert_eq!(book.type_name(), "Book");
    }

    let view = db.fetch(CellId::new(1)).unwrap();
    assert_eq!(view.type_name(), "Book");
    assert_eq!(view.present_count(), 0);

    let book = db
        .use_cell(CellId::new(1), &UseOptions::fail_if_not_found())
        .unwrap();
    assert!(!book.was_created());
}

#[test]
fn create_with_unknown_type_leaves_id_absent() {
    let db = create_ephemeral_db();
    assert!(matches!(
        db.use_cell(CellId::new(1), &create("Magazine")),
        Err(Error::UnknownType(_))
    ));
    assert!(!db.contains(CellId::new(1)));
}

// ============================================================================
// Append-or-Overwrite Semantics
// ============================================================================

#[test]
fn committed_cell_round_trips() {
    let db = create_ephemeral_db();
    db.with_cell(CellId::new(1), &create("Book"), |book| {
        book.append_to_field("title", "The Cyberiad")?;
        book.append_to_field("author", "Lem")?;
        book.append_to_field("price", "12.50")
    })
    .unwrap();

    let view = db.fetch(CellId::new(1)).unwrap();
    assert_eq!(view.string("title").as_deref(), Some("The Cyberiad"));
    assert_eq!(view.string("author").as_deref(), Some("Lem"));
    assert_eq!(view.string("price").as_deref(), Some("12.50"));
    assert!(view.missing_required().is_empty());
}

#[test]
fn list_appends_and_scalar_overwrites() {
    let db = create_ephemeral_db();
    let shelf = CellId::new(100);
    db.with_cell(shelf, &create("Shelf"), |s| {
        s.append_to_field("books", CellId::new(1))?;
        s.append_to_field("capacity", 10)
    })
    .unwrap();
    db.with_cell(shelf, &create("Shelf"), |s| {
        s.append_to_field("books", "#2")?;
        s.append_to_field("capacity", "25")
    })
    .unwrap();

    let view = db.fetch(shelf).unwrap();
    let books: Vec<CellId> = view
        .field("books")
        .unwrap()
        .as_list()
        .unwrap()
        .iter()
        .filter_map(|s| s.as_ref_id())
        .collect();
    assert_eq!(books, vec![CellId::new(1), CellId::new(2)]);
    assert_eq!(view.field("capacity").unwrap().as_int(), Some(25));
}

#[test]
fn string_field_concatenates() {
    let db = create_ephemeral_db();
    db.with_cell(CellId::new(1), &create("Book"), |b| {
        b.append_to_field("title", "Memoirs Found")?;
        b.append_to_field("title", " in a Bathtub")
    })
    .unwrap();
    assert_eq!(
        strings_of(&db.fetch(CellId::new(1)).unwrap(), "title"),
        vec!["Memoirs Found in a Bathtub".to_string()]
    );
}

#[test]
fn set_field_overwrites_list() {
    let db = create_ephemeral_db();
    let shelf = CellId::new(100);
    db.with_cell(shelf, &create("Shelf"), |s| {
        s.append_to_field("books", vec![CellId::new(1), CellId::new(2)])
    })
    .unwrap();
    db.with_cell(shelf, &create("Shelf"), |s| {
        s.set_field("books", vec![CellId::new(3)])
    })
    .unwrap();
    assert_eq!(db.fetch(shelf).unwrap().field("books").unwrap().len(), 1);
}

#[test]
fn type_mismatch_leaves_field_unchanged() {
    let db = create_ephemeral_db();
    let shelf = CellId::new(100);
    db.with_cell(shelf, &create("Shelf"), |s| s.append_to_field("capacity", 5))
        .unwrap();

    let mut acc = db.use_cell(shelf, &create("Shelf")).unwrap();
    assert!(matches!(
        acc.append_to_field("capacity", "plenty"),
        Err(Error::TypeMismatch { .. })
    ));
    assert!(matches!(
        acc.append_to_field("colour", "red"),
        Err(Error::SchemaViolation { .. })
    ));
    assert!(!acc.is_dirty());
    acc.commit().unwrap();

    assert_eq!(db.fetch(shelf).unwrap().field("capacity").unwrap().as_int(), Some(5));
}

#[test]
fn reads_inside_scope_see_staged_writes() {
    let db = create_ephemeral_db();
    let mut book = db.use_cell(CellId::new(1), &create("Book")).unwrap();
    book.append_to_field("title", "Fiasco").unwrap();

    assert_eq!(book.get("title").unwrap().as_str(), Some("Fiasco"));
    assert!(book.committed("title").is_none());
    // Not visible outside until the scope closes
    assert!(db.fetch(CellId::new(1)).unwrap().field("title").is_none());

    drop(book);
    assert_eq!(
        db.fetch(CellId::new(1)).unwrap().string("title").as_deref(),
        Some("Fiasco")
    );
}

// ============================================================================
// Scope Exit Paths
// ============================================================================

#[test]
fn with_cell_error_discards_all_writes() {
    let db = create_ephemeral_db();
    let result: Result<()> = db.with_cell(CellId::new(1), &create("Book"), |b| {
        b.append_to_field("title", "half written")?;
        Err(Error::Config("importer gave up".to_string()))
    });
    assert!(result.is_err());
    assert!(db.fetch(CellId::new(1)).unwrap().field("title").is_none());
}

#[test]
fn abandon_discards_and_releases() {
    let db = create_ephemeral_db();
    let mut book = db.use_cell(CellId::new(1), &create("Book")).unwrap();
    book.append_to_field("title", "draft").unwrap();
    book.abandon();

    let mut again = db
        .use_cell(CellId::new(1), &UseOptions::fail_if_not_found())
        .unwrap();
    assert!(again.get("title").is_none());
}

#[test]
fn panic_inside_scope_discards_and_releases() {
    let db = create_ephemeral_db();
    db.with_cell(CellId::new(1), &create("Book"), |b| b.append_to_field("title", "before"))
        .unwrap();

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        let mut book = db.use_cell(CellId::new(1), &create("Book")).unwrap();
        book.append_to_field("title", " and after").unwrap();
        panic!("importer crashed");
    }));
    assert!(outcome.is_err());

    let book = db
        .use_cell(
            CellId::new(1),
            &UseOptions::fail_if_not_found().with_timeout(Duration::from_millis(100)),
        )
        .unwrap();
    assert_eq!(book.committed("title").unwrap().as_str(), Some("before"));
}

// ============================================================================
// Leases
// ============================================================================

#[test]
fn nested_use_of_same_cell_fails_fast() {
    let db = create_ephemeral_db();
    let _outer = db.use_cell(CellId::new(1), &create("Book")).unwrap();
    assert!(matches!(
        db.use_cell(CellId::new(1), &create("Book")),
        Err(Error::LeaseReentrant(_))
    ));
    // A different cell is fine while the first is held
    assert!(db.use_cell(CellId::new(2), &create("Book")).is_ok());
}

#[test]
fn lease_wait_times_out() {
    let db = create_ephemeral_db();
    let _held = db.use_cell(CellId::new(1), &create("Book")).unwrap();

    let err = thread::scope(|s| {
        s.spawn(|| {
            db.use_cell(
                CellId::new(1),
                &create("Book").with_timeout(Duration::from_millis(50)),
            )
            .map(|_| ())
        })
        .join()
        .unwrap()
    })
    .unwrap_err();
    assert!(err.is_retryable());
    assert!(matches!(err, Error::LeaseTimeout { id, .. } if id == CellId::new(1)));
}

#[test]
fn concurrent_scopes_lose_no_updates() {
    let db = Arc::new(create_ephemeral_db());
    let shelf = CellId::new(100);
    let writers = 32u64;

    let handles: Vec<_> = (0..writers)
        .map(|i| {
            let db = Arc::clone(&db);
            thread::spawn(move || {
                db.with_cell(shelf, &create("Shelf"), |s| {
                    s.append_to_field("books", CellId::new(i))
                })
                .unwrap();
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    let view = db.fetch(shelf).unwrap();
    let mut books: Vec<u64> = view
        .field("books")
        .unwrap()
        .as_list()
        .unwrap()
        .iter()
        .filter_map(|s| s.as_ref_id())
        .map(|id| id.as_u64())
        .collect();
    books.sort_unstable();
    assert_eq!(books, (0..writers).collect::<Vec<_>>());
}

#[test]
fn scopes_on_different_cells_run_in_parallel() {
    let db = create_ephemeral_db();
    let _held = db.use_cell(CellId::new(1), &create("Book")).unwrap();

    thread::scope(|s| {
        for i in 2..6u64 {
            let db = &db;
            s.spawn(move || {
                db.with_cell(
                    CellId::new(i),
                    &create("Book").with_timeout(Duration::from_millis(500)),
                    |b| b.append_to_field("title", format!("book {}", i)),
                )
                .unwrap();
            });
        }
    });
    assert_eq!(db.len(), 5);
}
