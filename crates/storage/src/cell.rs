//! Cell layout and field mutation
//!
//! A cell stores one optional slot per schema field, indexed by the field's
//! ordinal. Absent slots are `None`; the engine does not fill defaults.
//!
//! ## List growth
//!
//! List fields keep spare capacity and grow by 1.5x (never below
//! [`MIN_LIST_CAPACITY`]) when an append overflows. Over n single appends
//! that is O(log n) reallocations instead of one per append. Spare capacity
//! survives copy-on-write clones of the cell.
//!
//! ## Append-or-overwrite
//!
//! [`FieldOp::append`] turns a raw value into the operation the field's
//! declaration calls for: list fields append, single string fields
//! concatenate, every other single field is overwritten. Coercion happens
//! while planning, so a failed plan never touches the cell.

use celldb_core::{
    CellId, CellSchema, Error, FieldSpec, FieldValue, Result, Scalar, Value, ValueKind,
};
use serde::{Deserialize, Serialize};
use std::ops::Deref;
use std::sync::Arc;

/// Smallest capacity a list field is given on first append
pub const MIN_LIST_CAPACITY: usize = 4;

/// Append-only scalar list with a multiplicative growth policy
#[derive(Debug, PartialEq)]
pub struct ListBuffer {
    items: Vec<Scalar>,
}

impl ListBuffer {
    /// Empty buffer with no allocation
    pub fn new() -> Self {
        Self { items: Vec::new() }
    }

    /// Append values, growing by 1.5x on overflow
    ///
    /// Returns true if the backing storage was reallocated.
    pub fn extend(&mut self, values: Vec<Scalar>) -> bool {
        let needed = self.items.len() + values.len();
        let reallocated = needed > self.items.capacity();
        if reallocated {
            let target = grown_capacity(self.items.capacity(), needed);
            self.items.reserve_exact(target - self.items.len());
        }
        self.items.extend(values);
        reallocated
    }

    /// Elements in append order
    pub fn as_slice(&self) -> &[Scalar] {
        &self.items
    }

    /// Number of elements
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// True if empty
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Allocated capacity
    pub fn capacity(&self) -> usize {
        self.items.capacity()
    }
}

impl Default for ListBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for ListBuffer {
    // Vec::clone trims capacity; keep the spare room
    fn clone(&self) -> Self {
        let mut items = Vec::with_capacity(self.items.capacity());
        items.extend_from_slice(&self.items);
        Self { items }
    }
}

fn grown_capacity(current: usize, needed: usize) -> usize {
    let mut cap = current.max(MIN_LIST_CAPACITY);
    while cap < needed {
        cap += (cap / 2).max(1);
    }
    cap
}

#[derive(Debug, Clone, PartialEq)]
enum Slot {
    Single(Scalar),
    List(ListBuffer),
}

impl Slot {
    fn to_value(&self) -> FieldValue {
        match self {
            Slot::Single(s) => FieldValue::Single(s.clone()),
            Slot::List(buf) => FieldValue::List(buf.as_slice().to_vec()),
        }
    }
}

/// How a cell is laid out in snapshots
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CellLayout {
    /// Schema-typed cell: compact fixed layout
    Typed,
    /// Generic cell resolved at ingestion time: tagged layout
    Generic,
}

/// A validated, coerced field mutation
#[derive(Debug, Clone, PartialEq)]
pub struct FieldOp {
    ordinal: usize,
    kind: OpKind,
}

#[derive(Debug, Clone, PartialEq)]
enum OpKind {
    Append(Vec<Scalar>),
    Concat(String),
    Overwrite(FieldValue),
}

impl FieldOp {
    /// Plan an append-or-overwrite write of `value` to `field`
    pub fn append(schema: &CellSchema, field: &str, value: Value) -> Result<Self> {
        let (ordinal, spec) = schema.check_shape(field, &value)?;
        let kind = if spec.is_list() {
            OpKind::Append(coerce_all(spec, value)?)
        } else {
            match coerce_one(spec, value)? {
                Scalar::String(s) => OpKind::Concat(s),
                scalar => OpKind::Overwrite(FieldValue::Single(scalar)),
            }
        };
        Ok(FieldOp { ordinal, kind })
    }

    /// Plan an unconditional overwrite of `field`
    ///
    /// For list fields the whole list is replaced by the supplied elements.
    pub fn set(schema: &CellSchema, field: &str, value: Value) -> Result<Self> {
        let (ordinal, spec) = schema.check_shape(field, &value)?;
        let value = if spec.is_list() {
            FieldValue::List(coerce_all(spec, value)?)
        } else {
            FieldValue::Single(coerce_one(spec, value)?)
        };
        Ok(FieldOp {
            ordinal,
            kind: OpKind::Overwrite(value),
        })
    }

    /// Ordinal of the targeted field
    pub fn ordinal(&self) -> usize {
        self.ordinal
    }
}

fn coerce_all(spec: &FieldSpec, value: Value) -> Result<Vec<Scalar>> {
    match value {
        Value::List(items) => items
            .iter()
            .map(|v| v.coerce(&spec.name, spec.kind))
            .collect(),
        single => Ok(vec![single.coerce(&spec.name, spec.kind)?]),
    }
}

fn coerce_one(spec: &FieldSpec, value: Value) -> Result<Scalar> {
    match value {
        // check_shape guarantees exactly one element here
        Value::List(mut items) if items.len() == 1 => {
            let only = items.remove(0);
            only.coerce(&spec.name, spec.kind)
        }
        single => single.coerce(&spec.name, spec.kind),
    }
}

/// Committed state of one cell
#[derive(Debug, Clone)]
pub struct CellData {
    id: CellId,
    schema: Arc<CellSchema>,
    layout: CellLayout,
    slots: Vec<Option<Slot>>,
}

impl CellData {
    /// Empty cell of the given schema
    pub fn new(id: CellId, schema: Arc<CellSchema>, layout: CellLayout) -> Self {
        let slots = vec![None; schema.len()];
        Self {
            id,
            schema,
            layout,
            slots,
        }
    }

    /// Cell identifier
    pub fn id(&self) -> CellId {
        self.id
    }

    /// Type tag
    pub fn type_name(&self) -> &str {
        self.schema.name()
    }

    /// Resolved schema
    pub fn schema(&self) -> &Arc<CellSchema> {
        &self.schema
    }

    /// Snapshot layout
    pub fn layout(&self) -> CellLayout {
        self.layout
    }

    /// Change the snapshot layout
    pub fn set_layout(&mut self, layout: CellLayout) {
        self.layout = layout;
    }

    /// Value of a field, if present
    pub fn get(&self, field: &str) -> Option<FieldValue> {
        self.schema.ordinal(field).and_then(|i| self.get_at(i))
    }

    /// Value of the field at `ordinal`, if present
    pub fn get_at(&self, ordinal: usize) -> Option<FieldValue> {
        self.slots
            .get(ordinal)
            .and_then(|slot| slot.as_ref())
            .map(Slot::to_value)
    }

    /// Check if a field holds a value
    pub fn has(&self, field: &str) -> bool {
        self.schema
            .ordinal(field)
            .map(|i| self.slots[i].is_some())
            .unwrap_or(false)
    }

    /// Present fields in schema order
    pub fn fields(&self) -> Vec<(&FieldSpec, FieldValue)> {
        self.schema
            .fields()
            .iter()
            .zip(self.slots.iter())
            .filter_map(|(spec, slot)| slot.as_ref().map(|s| (spec, s.to_value())))
            .collect()
    }

    /// Number of present fields
    pub fn present_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    /// Required fields that are still absent
    pub fn missing_required(&self) -> Vec<&str> {
        self.schema
            .fields()
            .iter()
            .zip(self.slots.iter())
            .filter(|(spec, slot)| spec.is_required() && slot.is_none())
            .map(|(spec, _)| spec.name.as_str())
            .collect()
    }

    /// Check that `op` fits this cell's schema
    ///
    /// Ops planned against a different schema can name an ordinal this
    /// cell lacks or a field of another cardinality.
    pub fn check_op(&self, op: &FieldOp) -> Result<()> {
        let spec = self.schema.field_at(op.ordinal).ok_or_else(|| {
            Error::violation(self.schema.name(), format!("#{}", op.ordinal), "no such field")
        })?;
        let fits = match &op.kind {
            OpKind::Append(values) | OpKind::Overwrite(FieldValue::List(values)) => {
                spec.is_list() && values.iter().all(|s| s.kind() == spec.kind)
            }
            OpKind::Concat(_) => !spec.is_list() && spec.kind == ValueKind::String,
            OpKind::Overwrite(FieldValue::Single(s)) => !spec.is_list() && s.kind() == spec.kind,
        };
        if fits {
            Ok(())
        } else {
            Err(Error::violation(
                self.schema.name(),
                &spec.name,
                "operation was planned against a different schema",
            ))
        }
    }

    /// Apply a planned mutation
    ///
    /// Returns true if a list field had to reallocate.
    ///
    /// # Errors
    ///
    /// `SchemaViolation` if the op does not fit this cell's schema; the cell
    /// is unchanged.
    pub fn apply(&mut self, op: FieldOp) -> Result<bool> {
        self.check_op(&op)?;
        let Some(slot) = self.slots.get_mut(op.ordinal) else {
            return Err(Error::violation(self.schema.name(), "", "slot out of range"));
        };
        let reallocated = match op.kind {
            OpKind::Append(values) => match slot {
                Some(Slot::List(buf)) => buf.extend(values),
                _ => {
                    let mut buf = ListBuffer::new();
                    buf.extend(values);
                    *slot = Some(Slot::List(buf));
                    true
                }
            },
            OpKind::Concat(s) => {
                match slot {
                    Some(Slot::Single(Scalar::String(current))) => current.push_str(&s),
                    _ => *slot = Some(Slot::Single(Scalar::String(s))),
                }
                false
            }
            OpKind::Overwrite(FieldValue::Single(s)) => {
                *slot = Some(Slot::Single(s));
                false
            }
            OpKind::Overwrite(FieldValue::List(items)) => {
                let mut buf = ListBuffer::new();
                buf.extend(items);
                *slot = Some(Slot::List(buf));
                true
            }
        };
        Ok(reallocated)
    }

    /// Place a decoded value directly into a slot
    ///
    /// Used when rebuilding cells from a snapshot. The value must match the
    /// field's declared kind and cardinality exactly; no coercion happens.
    pub fn put_decoded(&mut self, ordinal: usize, value: FieldValue) -> Result<()> {
        let spec = self.schema.field_at(ordinal).ok_or_else(|| {
            Error::violation(self.schema.name(), format!("#{}", ordinal), "no such field")
        })?;
        let slot = match value {
            FieldValue::Single(s) if !spec.is_list() && s.kind() == spec.kind => Slot::Single(s),
            FieldValue::List(items)
                if spec.is_list() && items.iter().all(|s| s.kind() == spec.kind) =>
            {
                let mut buf = ListBuffer::new();
                buf.extend(items);
                Slot::List(buf)
            }
            other => {
                return Err(Error::violation(
                    self.schema.name(),
                    &spec.name,
                    format!("decoded value {:?} does not match declaration", other),
                ))
            }
        };
        self.slots[ordinal] = Some(slot);
        Ok(())
    }

    /// Capacity of a list field's buffer (0 when absent or single)
    pub fn list_capacity(&self, field: &str) -> usize {
        match self.schema.ordinal(field).and_then(|i| self.slots[i].as_ref()) {
            Some(Slot::List(buf)) => buf.capacity(),
            _ => 0,
        }
    }
}

impl PartialEq for CellData {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.layout == other.layout
            && *self.schema == *other.schema
            && self.slots == other.slots
    }
}

/// Immutable view of a committed cell
///
/// Holds its own reference to the cell state it was taken from; later
/// commits do not change what the view shows.
#[derive(Debug, Clone)]
pub struct CellView {
    data: Arc<CellData>,
}

impl CellView {
    pub(crate) fn new(data: Arc<CellData>) -> Self {
        Self { data }
    }

    /// Shared handle to the underlying state
    pub fn data(&self) -> &Arc<CellData> {
        &self.data
    }

    /// Value of a field, or `None` if absent
    pub fn field(&self, field: &str) -> Option<FieldValue> {
        self.data.get(field)
    }

    /// Shorthand for a single string field
    pub fn string(&self, field: &str) -> Option<String> {
        self.field(field).and_then(|v| v.as_str().map(str::to_string))
    }

    /// Kind declared for a field
    pub fn kind_of(&self, field: &str) -> Option<ValueKind> {
        self.data.schema().field(field).map(|(_, spec)| spec.kind)
    }
}

impl Deref for CellView {
    type Target = CellData;

    fn deref(&self) -> &CellData {
        &self.data
    }
}
