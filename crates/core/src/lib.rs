//! Core types for CellDB
//!
//! This crate defines the vocabulary shared by every other layer:
//! - [`CellId`]: 64-bit cell identifier
//! - [`ValueKind`], [`Cardinality`], [`Optionality`]: field declarations
//! - [`Value`], [`Scalar`], [`FieldValue`]: input and stored value forms
//! - [`CellSchema`], [`SchemaRegistry`]: registered cell layouts
//! - [`Error`], [`CheckpointError`]: the error taxonomy

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod schema;
pub mod types;
pub mod value;

pub use error::{CheckpointError, Error, Result};
pub use schema::{CellSchema, FieldSpec, SchemaRegistry};
pub use types::{Cardinality, CellId, Optionality, ValueKind};
pub use value::{FieldValue, Scalar, Value};
