//! Cell API Comprehensive Test Suite
//!
//! End-to-end tests through the `celldb` facade: schema registration, the
//! scoped upsert protocol, generic cells, and checkpoint/reload.
//!
//! ## Running Tests
//!
//! ```bash
//! # Run the whole suite
//! cargo test --test cell_api_comprehensive
//!
//! # Run checkpoint tests only
//! cargo test --test cell_api_comprehensive checkpoint::
//! ```

pub use celldb::prelude::*;
pub use std::path::Path;
pub use std::time::Duration;

// Test modules
pub mod checkpoint;
pub mod generic_cells;
pub mod lifecycle;
pub mod upsert;

// =============================================================================
// SHARED TEST UTILITIES
// =============================================================================

/// Lease bound for tests; long enough to never fire on a healthy run
pub const TEST_LEASE_TIMEOUT: Duration = Duration::from_secs(10);

/// Fields of the `Book` type used throughout the suite
pub fn book_fields() -> Vec<FieldSpec> {
    vec![
        FieldSpec::single("title", ValueKind::String),
        FieldSpec::single("author", ValueKind::String),
        FieldSpec::single("price", ValueKind::String),
    ]
}

/// Fields of the `Shelf` type: a label, a count and book references
pub fn shelf_fields() -> Vec<FieldSpec> {
    vec![
        FieldSpec::single("label", ValueKind::String),
        FieldSpec::single("capacity", ValueKind::Int).optional(),
        FieldSpec::list("books", ValueKind::Ref)
            .optional()
            .references("Book"),
    ]
}

/// Register `Book` and `Shelf`
pub fn register_library(db: &Database) {
    db.register_schema("Book", book_fields())
        .expect("register Book");
    db.register_schema("Shelf", shelf_fields())
        .expect("register Shelf");
}

/// Ephemeral database with the library schemas
pub fn create_ephemeral_db() -> Database {
    let db = Database::builder()
        .lease_timeout(Some(TEST_LEASE_TIMEOUT))
        .open()
        .expect("Failed to create ephemeral database");
    register_library(&db);
    db
}

/// Persistent database under `path` with the library schemas
pub fn open_persistent_db(path: &Path) -> Database {
    let db = Database::builder()
        .path(path)
        .lease_timeout(Some(TEST_LEASE_TIMEOUT))
        .open()
        .expect("Failed to open persistent database");
    register_library(&db);
    db
}

/// String elements of a list field, or a single string field as one element
pub fn strings_of(view: &CellView, field: &str) -> Vec<String> {
    match view.field(field) {
        Some(FieldValue::List(items)) => items
            .iter()
            .filter_map(|s| s.as_str().map(str::to_string))
            .collect(),
        Some(FieldValue::Single(Scalar::String(s))) => vec![s],
        _ => Vec::new(),
    }
}
