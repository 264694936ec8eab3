//! Schema Registry
//!
//! A [`CellSchema`] is the ordered field layout of one cell type. Field order
//! is significant: it fixes each field's ordinal, which the store uses as a
//! fixed offset and the snapshot format uses as the typed record layout.
//!
//! The [`SchemaRegistry`] is read-mostly, process-lifetime state. Lookups
//! take a shared lock and clone an `Arc`, so a caller resolves a type once per
//! cell and then works against the `Arc<CellSchema>` without touching the
//! registry again. Registration takes the exclusive lock.

use crate::error::{Error, Result};
use crate::types::{Cardinality, Optionality, ValueKind};
use crate::value::Value;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;
use xxhash_rust::xxh3::Xxh3;

/// Declaration of one field
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldSpec {
    /// Field name, unique within its schema
    pub name: String,
    /// Scalar kind
    pub kind: ValueKind,
    /// Single or list
    pub cardinality: Cardinality,
    /// Required or optional
    pub optionality: Optionality,
    /// For `Ref` fields, the cell type the reference is expected to point at
    pub target_type: Option<String>,
}

impl FieldSpec {
    /// Required single-value field
    ///
    /// # Examples
    ///
    /// ```
    /// use celldb_core::{FieldSpec, ValueKind};
    ///
    /// let title = FieldSpec::single("title", ValueKind::String);
    /// let tags = FieldSpec::list("tags", ValueKind::String).optional();
    /// assert!(title.is_required());
    /// assert!(!tags.is_required());
    /// ```
    pub fn single(name: impl Into<String>, kind: ValueKind) -> Self {
        FieldSpec {
            name: name.into(),
            kind,
            cardinality: Cardinality::Single,
            optionality: Optionality::Required,
            target_type: None,
        }
    }

    /// Required list field
    pub fn list(name: impl Into<String>, kind: ValueKind) -> Self {
        FieldSpec {
            cardinality: Cardinality::List,
            ..FieldSpec::single(name, kind)
        }
    }

    /// Mark the field optional
    pub fn optional(mut self) -> Self {
        self.optionality = Optionality::Optional;
        self
    }

    /// Record the cell type a `Ref` field points at
    pub fn references(mut self, type_name: impl Into<String>) -> Self {
        self.target_type = Some(type_name.into());
        self
    }

    /// True for list cardinality
    pub fn is_list(&self) -> bool {
        self.cardinality == Cardinality::List
    }

    /// True for required fields
    pub fn is_required(&self) -> bool {
        self.optionality == Optionality::Required
    }

    /// Whether an append to this field extends the stored value
    /// rather than replacing it: lists and strings append, everything else
    /// overwrites.
    pub fn appends(&self) -> bool {
        self.is_list() || self.kind == ValueKind::String
    }
}

/// Serialized form of a schema (without the lookup index)
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SchemaDef {
    name: String,
    fields: Vec<FieldSpec>,
}

/// Field layout of a cell type
///
/// Immutable after construction; shared between all cells of the type.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "SchemaDef", into = "SchemaDef")]
pub struct CellSchema {
    name: String,
    fields: Vec<FieldSpec>,
    index: HashMap<String, usize>,
}

impl CellSchema {
    /// Build a schema, rejecting empty or duplicate field names
    pub fn new(name: impl Into<String>, fields: Vec<FieldSpec>) -> Result<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(Error::violation("", "", "type name must not be empty"));
        }
        let mut index = HashMap::with_capacity(fields.len());
        for (ordinal, field) in fields.iter().enumerate() {
            if field.name.is_empty() {
                return Err(Error::violation(&name, "", "field name must not be empty"));
            }
            if index.insert(field.name.clone(), ordinal).is_some() {
                return Err(Error::violation(&name, &field.name, "duplicate field name"));
            }
        }
        Ok(CellSchema {
            name,
            fields,
            index,
        })
    }

    /// Type name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Fields in declaration order
    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    /// Number of declared fields
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// True if the schema declares no fields
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Ordinal of a field
    pub fn ordinal(&self, field: &str) -> Option<usize> {
        self.index.get(field).copied()
    }

    /// Field by name, with its ordinal
    pub fn field(&self, field: &str) -> Option<(usize, &FieldSpec)> {
        self.ordinal(field).map(|i| (i, &self.fields[i]))
    }

    /// Field by ordinal
    pub fn field_at(&self, ordinal: usize) -> Option<&FieldSpec> {
        self.fields.get(ordinal)
    }

    /// Resolve a field or fail with a schema violation
    pub fn require_field(&self, field: &str) -> Result<(usize, &FieldSpec)> {
        self.field(field)
            .ok_or_else(|| Error::violation(&self.name, field, "no such field"))
    }

    /// Check the shape of a value against a field
    ///
    /// A list value is accepted for a single-cardinality field only when it
    /// holds exactly one element. Nested lists are never accepted. Kind
    /// conversion is not checked here; that happens during coercion.
    pub fn check_shape(&self, field: &str, value: &Value) -> Result<(usize, &FieldSpec)> {
        let (ordinal, spec) = self.require_field(field)?;
        if let Value::List(items) = value {
            if !spec.is_list() && items.len() != 1 {
                return Err(Error::violation(
                    &self.name,
                    field,
                    format!(
                        "list of {} values written to a single-value field",
                        items.len()
                    ),
                ));
            }
            if items.iter().any(|v| matches!(v, Value::List(_))) {
                return Err(Error::violation(&self.name, field, "nested lists are not supported"));
            }
        }
        Ok((ordinal, spec))
    }

    /// Stable 64-bit fingerprint of the layout
    ///
    /// Two schemas have the same fingerprint exactly when their names and
    /// field declarations match. Strings are length-prefixed so adjacent
    /// names cannot run together.
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = Xxh3::new();
        hash_str(&mut hasher, &self.name);
        hasher.update(&(self.fields.len() as u64).to_le_bytes());
        for spec in &self.fields {
            hash_str(&mut hasher, &spec.name);
            let optional = match spec.optionality {
                Optionality::Required => 0u8,
                Optionality::Optional => 1,
            };
            hasher.update(&[spec.kind.tag(), spec.cardinality.tag(), optional]);
            match &spec.target_type {
                Some(target) => {
                    hasher.update(&[1]);
                    hash_str(&mut hasher, target);
                }
                None => hasher.update(&[0]),
            }
        }
        hasher.digest()
    }
}

fn hash_str(hasher: &mut Xxh3, s: &str) {
    hasher.update(&(s.len() as u64).to_le_bytes());
    hasher.update(s.as_bytes());
}

impl PartialEq for CellSchema {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.fields == other.fields
    }
}

impl Eq for CellSchema {}

impl TryFrom<SchemaDef> for CellSchema {
    type Error = Error;

    fn try_from(def: SchemaDef) -> Result<Self> {
        CellSchema::new(def.name, def.fields)
    }
}

impl From<CellSchema> for SchemaDef {
    fn from(schema: CellSchema) -> Self {
        SchemaDef {
            name: schema.name,
            fields: schema.fields,
        }
    }
}

/// Whether a value of kind `from` can ever convert to `to`
///
/// Text can always be attempted; whether a particular string parses is a
/// per-value question answered by coercion.
pub fn kinds_compatible(from: ValueKind, to: ValueKind) -> bool {
    use ValueKind::*;
    from == to
        || from == String
        || to == String
        || matches!(
            (from, to),
            (Int, Float) | (Int, Bool) | (Int, Ref) | (Bool, Int) | (Float, Int)
        )
}

/// Registry of all known cell types
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    schemas: RwLock<HashMap<String, Arc<CellSchema>>>,
}

impl SchemaRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a schema
    ///
    /// Re-registering an identical layout is a no-op that returns the
    /// existing `Arc`. A different layout under the same name fails with
    /// [`Error::SchemaConflict`].
    pub fn register(&self, schema: CellSchema) -> Result<Arc<CellSchema>> {
        let mut schemas = self.schemas.write();
        if let Some(existing) = schemas.get(schema.name()) {
            if **existing == schema {
                return Ok(Arc::clone(existing));
            }
            return Err(Error::SchemaConflict {
                type_name: schema.name().to_string(),
            });
        }
        debug!(type_name = schema.name(), fields = schema.len(), "Registered cell schema");
        let schema = Arc::new(schema);
        schemas.insert(schema.name().to_string(), Arc::clone(&schema));
        Ok(schema)
    }

    /// Build and register a schema from its parts
    pub fn register_type(
        &self,
        type_name: impl Into<String>,
        fields: Vec<FieldSpec>,
    ) -> Result<Arc<CellSchema>> {
        self.register(CellSchema::new(type_name, fields)?)
    }

    /// Look up a schema by type name
    pub fn lookup(&self, type_name: &str) -> Result<Arc<CellSchema>> {
        self.schemas
            .read()
            .get(type_name)
            .cloned()
            .ok_or_else(|| Error::UnknownType(type_name.to_string()))
    }

    /// Check if a type is registered
    pub fn contains(&self, type_name: &str) -> bool {
        self.schemas.read().contains_key(type_name)
    }

    /// Validate that a value of `kind` and `cardinality` may be written to a field
    ///
    /// Returns the field's ordinal. Fails with [`Error::UnknownType`] for an
    /// unregistered type and [`Error::SchemaViolation`] for a missing field,
    /// a list written to a single-value field, or a kind that can never
    /// convert to the declared one.
    pub fn validate_field(
        &self,
        type_name: &str,
        field: &str,
        kind: ValueKind,
        cardinality: Cardinality,
    ) -> Result<usize> {
        let schema = self.lookup(type_name)?;
        let (ordinal, spec) = schema.require_field(field)?;
        if cardinality == Cardinality::List && !spec.is_list() {
            return Err(Error::violation(
                type_name,
                field,
                "list value written to a single-value field",
            ));
        }
        if !kinds_compatible(kind, spec.kind) {
            return Err(Error::violation(
                type_name,
                field,
                format!("{} is not compatible with declared kind {}", kind, spec.kind),
            ));
        }
        Ok(ordinal)
    }

    /// All registered schemas, ordered by type name
    pub fn schemas(&self) -> Vec<Arc<CellSchema>> {
        let mut all: Vec<_> = self.schemas.read().values().cloned().collect();
        all.sort_by(|a, b| a.name().cmp(b.name()));
        all
    }

    /// Number of registered types
    pub fn len(&self) -> usize {
        self.schemas.read().len()
    }

    /// True if nothing is registered
    pub fn is_empty(&self) -> bool {
        self.schemas.read().is_empty()
    }
}
