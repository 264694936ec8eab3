//! Generic Cell Tests
//!
//! Cells whose type is named at runtime, plus the typed-cell seam.

use crate::*;

// ============================================================================
// Resolution
// ============================================================================

#[test]
fn unknown_type_is_rejected_and_id_stays_absent() {
    let db = create_ephemeral_db();
    let err = db.new_generic(CellId::new(5), "NoSuchType").unwrap_err();
    assert!(matches!(err, Error::UnknownType(ref name) if name == "NoSuchType"));
    assert!(!db.contains(CellId::new(5)));
    assert!(db.fetch(CellId::new(5)).unwrap_err().is_not_found());
}

#[test]
fn book_scenario() {
    let db = Database::ephemeral().unwrap();
    db.register_schema("Book", book_fields()).unwrap();

    let mut book = db.new_generic(CellId::new(2), "Book").unwrap();
    book.append_to_field("title", "His Master's Voice").unwrap();
    book.append_to_field("author", "Stanislaw Lem").unwrap();
    book.append_to_field("price", "14.99").unwrap();
    db.save_generic(&book).unwrap();

    let view = db.fetch(CellId::new(2)).unwrap();
    assert_eq!(view.type_name(), "Book");
    assert_eq!(view.string("title").as_deref(), Some("His Master's Voice"));
    assert_eq!(view.string("author").as_deref(), Some("Stanislaw Lem"));
    assert_eq!(view.string("price").as_deref(), Some("14.99"));
}

#[test]
fn generic_writes_publish_in_one_step() {
    let db = create_ephemeral_db();
    let mut shelf = db.new_generic(CellId::new(9), "Shelf").unwrap();
    shelf.append_to_field("label", "sf").unwrap();
    for i in 0..10u64 {
        shelf.append_to_field("books", CellId::new(i)).unwrap();
    }
    assert!(!db.contains(CellId::new(9)));

    let before = db.stats().version;
    db.save_generic(&shelf).unwrap();
    assert_eq!(db.stats().version, before + 1);
    assert_eq!(db.fetch(CellId::new(9)).unwrap().field("books").unwrap().len(), 10);
}

#[test]
fn generic_and_scoped_writes_share_semantics() {
    let db = create_ephemeral_db();

    let mut generic = db.new_generic(CellId::new(1), "Shelf").unwrap();
    generic.append_to_field("capacity", "3").unwrap();
    generic.append_to_field("capacity", 4).unwrap();
    generic.append_to_field("label", "a").unwrap();
    generic.append_to_field("label", "b").unwrap();
    db.save_generic(&generic).unwrap();

    db.with_cell(CellId::new(2), &UseOptions::create_if_not_found("Shelf"), |s| {
        s.append_to_field("capacity", "3")?;
        s.append_to_field("capacity", 4)?;
        s.append_to_field("label", "a")?;
        s.append_to_field("label", "b")
    })
    .unwrap();

    let a = db.fetch(CellId::new(1)).unwrap();
    let b = db.fetch(CellId::new(2)).unwrap();
    assert_eq!(a.field("capacity"), b.field("capacity"));
    assert_eq!(a.field("label"), b.field("label"));
    assert_eq!(a.string("label").as_deref(), Some("ab"));
}

#[test]
fn saving_over_a_scoped_cell_waits_for_its_lease() {
    let db = create_ephemeral_db();
    let held = db
        .use_cell(CellId::new(1), &UseOptions::create_if_not_found("Book"))
        .unwrap();

    let mut replacement = db.new_generic(CellId::new(1), "Book").unwrap();
    replacement.append_to_field("title", "replaced").unwrap();

    std::thread::scope(|s| {
        let saver = s.spawn(|| db.save_generic(&replacement));
        std::thread::sleep(Duration::from_millis(30));
        assert!(!saver.is_finished());
        drop(held);
        saver.join().unwrap().unwrap();
    });
    assert_eq!(
        db.fetch(CellId::new(1)).unwrap().string("title").as_deref(),
        Some("replaced")
    );
}

// ============================================================================
// Typed Cells
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
struct Shelf {
    label: String,
    capacity: Option<i64>,
    books: Vec<CellId>,
}

impl TypedCell for Shelf {
    const TYPE_NAME: &'static str = "Shelf";

    fn fields() -> Vec<FieldSpec> {
        shelf_fields()
    }

    fn write_fields(&self, cell: &mut CellWriter<'_>) -> Result<()> {
        cell.set("label", self.label.as_str())?;
        cell.set_opt("capacity", self.capacity)?;
        if !self.books.is_empty() {
            cell.set("books", self.books.clone())?;
        }
        Ok(())
    }

    fn from_view(view: &CellView) -> Result<Self> {
        Ok(Shelf {
            label: view.string("label").unwrap_or_default(),
            capacity: view.field("capacity").and_then(|v| v.as_int()),
            books: view
                .field("books")
                .and_then(|v| {
                    v.as_list()
                        .map(|items| items.iter().filter_map(|s| s.as_ref_id()).collect())
                })
                .unwrap_or_default(),
        })
    }
}

#[test]
fn typed_cell_round_trip_and_generic_view() {
    let db = create_ephemeral_db();
    db.register_typed::<Shelf>().unwrap();

    let shelf = Shelf {
        label: "classics".to_string(),
        capacity: Some(40),
        books: vec![CellId::new(1), CellId::new(2)],
    };
    db.save_typed(CellId::new(50), &shelf).unwrap();
    assert_eq!(db.load_typed::<Shelf>(CellId::new(50)).unwrap(), shelf);

    // The same cell can be edited generically and read back typed
    let mut generic = db.load_generic(CellId::new(50)).unwrap();
    generic.append_to_field("books", CellId::new(3)).unwrap();
    db.save_generic(&generic).unwrap();

    let updated = db.load_typed::<Shelf>(CellId::new(50)).unwrap();
    assert_eq!(updated.books.len(), 3);
    assert_eq!(updated.capacity, Some(40));
}
