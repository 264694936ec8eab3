//! Snapshot file format
//!
//! ## Layout
//!
//! All integers little-endian.
//!
//! ```text
//! magic          8 bytes  "CELLSNAP"
//! format version u32
//! created        u64      unix millis
//! store version  u64
//! catalog        u32 length + bincode(Vec<CellSchema>)
//! cell count     u64
//! records        cell count x record
//! crc32          u32      over every preceding byte
//! ```
//!
//! ## Records
//!
//! ```text
//! id             u64
//! layout         u8       0 = typed, 1 = generic
//! catalog index  u32
//! body length    u32
//! body
//! ```
//!
//! A typed body walks the schema's fields in order: one presence byte per
//! field, then the untagged value when present. A generic body carries its
//! own field names and tags: field count, then per present field the name,
//! kind tag, cardinality tag and value.
//!
//! Values are untagged: bool as u8, int as i64, float as f64, string as u32
//! length + UTF-8, ref as u64. Lists are a u32 count followed by elements.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use celldb_core::{
    Cardinality, CellId, CellSchema, CheckpointError, FieldValue, Scalar, ValueKind,
};
use celldb_storage::{CellData, CellLayout};
use std::collections::HashMap;
use std::io::{self, Cursor, Read, Write};
use std::sync::Arc;

/// File magic
pub const MAGIC: &[u8; 8] = b"CELLSNAP";

/// Format version written by this build
pub const FORMAT_VERSION: u32 = 1;

const LAYOUT_TYPED: u8 = 0;
const LAYOUT_GENERIC: u8 = 1;

// magic + version + created + store version + catalog length
const MIN_HEADER: usize = 8 + 4 + 8 + 8 + 4;
const CRC_LEN: usize = 4;

/// Decoded snapshot header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotHeader {
    /// Format version
    pub format_version: u32,
    /// Creation time, unix millis
    pub created_ms: u64,
    /// Store version at checkpoint time
    pub store_version: u64,
    /// Number of cell records
    pub cell_count: u64,
}

/// One undecoded cell record
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecord {
    /// Cell id
    pub id: CellId,
    /// Layout the body is in
    pub layout: CellLayout,
    /// Index into the snapshot catalog
    pub schema_index: u32,
    /// Encoded fields
    pub body: Vec<u8>,
}

/// Parsed but not yet materialized snapshot
#[derive(Debug)]
pub struct DecodedSnapshot {
    /// Header fields
    pub header: SnapshotHeader,
    /// Schemas the records refer to
    pub catalog: Vec<CellSchema>,
    /// Cell records in file order
    pub records: Vec<RawRecord>,
}

fn encode_err(e: impl std::fmt::Display) -> CheckpointError {
    CheckpointError::Encode(e.to_string())
}

fn corrupt(what: impl Into<String>) -> CheckpointError {
    CheckpointError::Corrupt(what.into())
}

// ============================================================================
// Encoding
// ============================================================================

/// Encode cells into a complete snapshot image
///
/// `catalog` must contain the schema of every cell.
pub fn encode_snapshot(
    cells: &[Arc<CellData>],
    catalog: &[Arc<CellSchema>],
    store_version: u64,
    created_ms: u64,
) -> Result<Vec<u8>, CheckpointError> {
    let index: HashMap<&str, u32> = catalog
        .iter()
        .enumerate()
        .map(|(i, s)| (s.name(), i as u32))
        .collect();
    let catalog_bytes = bincode::serialize(
        &catalog.iter().map(|s| s.as_ref()).collect::<Vec<&CellSchema>>(),
    )
    .map_err(encode_err)?;

    let mut out = Vec::with_capacity(MIN_HEADER + catalog_bytes.len() + cells.len() * 64);
    write_header(&mut out, store_version, created_ms, &catalog_bytes, cells.len())
        .map_err(encode_err)?;

    let mut body = Vec::new();
    for cell in cells {
        let schema_index = *index
            .get(cell.type_name())
            .ok_or_else(|| encode_err(format!("type '{}' missing from catalog", cell.type_name())))?;
        body.clear();
        let encoded = match cell.layout() {
            CellLayout::Typed => encode_typed(&mut body, cell),
            CellLayout::Generic => encode_generic(&mut body, cell),
        };
        encoded.map_err(encode_err)?;
        write_record(&mut out, cell, schema_index, &body).map_err(encode_err)?;
    }

    let crc = crc32fast::hash(&out);
    out.write_u32::<LittleEndian>(crc).map_err(encode_err)?;
    Ok(out)
}

fn write_header(
    out: &mut Vec<u8>,
    store_version: u64,
    created_ms: u64,
    catalog: &[u8],
    cells: usize,
) -> io::Result<()> {
    out.write_all(MAGIC)?;
    out.write_u32::<LittleEndian>(FORMAT_VERSION)?;
    out.write_u64::<LittleEndian>(created_ms)?;
    out.write_u64::<LittleEndian>(store_version)?;
    out.write_u32::<LittleEndian>(catalog.len() as u32)?;
    out.write_all(catalog)?;
    out.write_u64::<LittleEndian>(cells as u64)
}

fn write_record(out: &mut Vec<u8>, cell: &CellData, schema_index: u32, body: &[u8]) -> io::Result<()> {
    out.write_u64::<LittleEndian>(cell.id().as_u64())?;
    out.write_u8(match cell.layout() {
        CellLayout::Typed => LAYOUT_TYPED,
        CellLayout::Generic => LAYOUT_GENERIC,
    })?;
    out.write_u32::<LittleEndian>(schema_index)?;
    out.write_u32::<LittleEndian>(body.len() as u32)?;
    out.write_all(body)
}

fn encode_typed(out: &mut Vec<u8>, cell: &CellData) -> io::Result<()> {
    for ordinal in 0..cell.schema().len() {
        match cell.get_at(ordinal) {
            None => out.write_u8(0)?,
            Some(value) => {
                out.write_u8(1)?;
                write_field_value(out, &value)?;
            }
        }
    }
    Ok(())
}

fn encode_generic(out: &mut Vec<u8>, cell: &CellData) -> io::Result<()> {
    let fields = cell.fields();
    out.write_u32::<LittleEndian>(fields.len() as u32)?;
    for (spec, value) in fields {
        write_str(out, &spec.name)?;
        out.write_u8(spec.kind.tag())?;
        out.write_u8(spec.cardinality.tag())?;
        write_field_value(out, &value)?;
    }
    Ok(())
}

fn write_field_value(out: &mut Vec<u8>, value: &FieldValue) -> io::Result<()> {
    match value {
        FieldValue::Single(s) => write_scalar(out, s),
        FieldValue::List(items) => {
            out.write_u32::<LittleEndian>(items.len() as u32)?;
            items.iter().try_for_each(|s| write_scalar(out, s))
        }
    }
}

fn write_scalar(out: &mut Vec<u8>, scalar: &Scalar) -> io::Result<()> {
    match scalar {
        Scalar::Bool(b) => out.write_u8(u8::from(*b)),
        Scalar::Int(i) => out.write_i64::<LittleEndian>(*i),
        Scalar::Float(f) => out.write_f64::<LittleEndian>(*f),
        Scalar::String(s) => write_str(out, s),
        Scalar::Ref(id) => out.write_u64::<LittleEndian>(id.as_u64()),
    }
}

fn write_str(out: &mut Vec<u8>, s: &str) -> io::Result<()> {
    out.write_u32::<LittleEndian>(s.len() as u32)?;
    out.write_all(s.as_bytes())
}

// ============================================================================
// Decoding
// ============================================================================

/// Verify and split a snapshot image
///
/// Checks magic, format version and checksum, then parses the header,
/// catalog and record framing. Record bodies are left encoded.
pub fn decode_snapshot(bytes: &[u8]) -> Result<DecodedSnapshot, CheckpointError> {
    if bytes.len() < MIN_HEADER + CRC_LEN || &bytes[..8] != MAGIC {
        return Err(corrupt("not a cell snapshot (bad magic or truncated header)"));
    }
    let format_version = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]);
    if format_version != FORMAT_VERSION {
        return Err(CheckpointError::UnsupportedVersion {
            found: format_version,
            expected: FORMAT_VERSION,
        });
    }

    let (content, trailer) = bytes.split_at(bytes.len() - CRC_LEN);
    let stored = u32::from_le_bytes([trailer[0], trailer[1], trailer[2], trailer[3]]);
    let actual = crc32fast::hash(content);
    if stored != actual {
        return Err(corrupt(format!(
            "checksum mismatch (stored {:08x}, computed {:08x})",
            stored, actual
        )));
    }

    let mut cur = Cursor::new(&content[12..]);
    let truncated = |_: io::Error| corrupt("truncated snapshot");

    let created_ms = cur.read_u64::<LittleEndian>().map_err(truncated)?;
    let store_version = cur.read_u64::<LittleEndian>().map_err(truncated)?;
    let catalog_len = cur.read_u32::<LittleEndian>().map_err(truncated)? as usize;
    let catalog_bytes = read_bytes(&mut cur, catalog_len).map_err(truncated)?;
    let catalog: Vec<CellSchema> = bincode::deserialize(&catalog_bytes)
        .map_err(|e| corrupt(format!("schema catalog: {}", e)))?;
    let cell_count = cur.read_u64::<LittleEndian>().map_err(truncated)?;

    let mut records = Vec::with_capacity(cell_count.min(1 << 20) as usize);
    for _ in 0..cell_count {
        let id = CellId::new(cur.read_u64::<LittleEndian>().map_err(truncated)?);
        let layout = match cur.read_u8().map_err(truncated)? {
            LAYOUT_TYPED => CellLayout::Typed,
            LAYOUT_GENERIC => CellLayout::Generic,
            other => return Err(corrupt(format!("cell {}: unknown layout tag {}", id, other))),
        };
        let schema_index = cur.read_u32::<LittleEndian>().map_err(truncated)?;
        if schema_index as usize >= catalog.len() {
            return Err(corrupt(format!(
                "cell {}: catalog index {} out of range",
                id, schema_index
            )));
        }
        let body_len = cur.read_u32::<LittleEndian>().map_err(truncated)? as usize;
        let body = read_bytes(&mut cur, body_len).map_err(truncated)?;
        records.push(RawRecord {
            id,
            layout,
            schema_index,
            body,
        });
    }
    if (cur.position() as usize) != cur.get_ref().len() {
        return Err(corrupt("trailing bytes after last record"));
    }

    Ok(DecodedSnapshot {
        header: SnapshotHeader {
            format_version,
            created_ms,
            store_version,
            cell_count,
        },
        catalog,
        records,
    })
}

/// Materialize one record against its schema
///
/// Fails with `Corrupt` naming the cell if the body does not match the
/// schema's declarations.
pub fn decode_record(record: &RawRecord, schema: &Arc<CellSchema>) -> Result<CellData, CheckpointError> {
    let mut cell = CellData::new(record.id, Arc::clone(schema), record.layout);
    let mut cur = Cursor::new(record.body.as_slice());
    let bad = |what: String| corrupt(format!("cell {}: {}", record.id, what));

    match record.layout {
        CellLayout::Typed => {
            for (ordinal, spec) in schema.fields().iter().enumerate() {
                let present = cur.read_u8().map_err(|e| bad(e.to_string()))?;
                if present == 0 {
                    continue;
                }
                let value = read_field_value(&mut cur, spec.kind, spec.cardinality)
                    .map_err(|e| bad(format!("field '{}': {}", spec.name, e)))?;
                cell.put_decoded(ordinal, value)
                    .map_err(|e| bad(e.to_string()))?;
            }
        }
        CellLayout::Generic => {
            let count = cur.read_u32::<LittleEndian>().map_err(|e| bad(e.to_string()))?;
            for _ in 0..count {
                let name = read_str(&mut cur).map_err(|e| bad(e.to_string()))?;
                let kind = cur
                    .read_u8()
                    .ok()
                    .and_then(ValueKind::from_tag)
                    .ok_or_else(|| bad(format!("field '{}': bad kind tag", name)))?;
                let cardinality = cur
                    .read_u8()
                    .ok()
                    .and_then(Cardinality::from_tag)
                    .ok_or_else(|| bad(format!("field '{}': bad cardinality tag", name)))?;
                let (ordinal, spec) = schema
                    .field(&name)
                    .ok_or_else(|| bad(format!("field '{}' not in schema '{}'", name, schema.name())))?;
                if spec.kind != kind || spec.cardinality != cardinality {
                    return Err(bad(format!(
                        "field '{}' stored as {} but declared {}",
                        name, kind, spec.kind
                    )));
                }
                let value = read_field_value(&mut cur, kind, cardinality)
                    .map_err(|e| bad(format!("field '{}': {}", name, e)))?;
                cell.put_decoded(ordinal, value)
                    .map_err(|e| bad(e.to_string()))?;
            }
        }
    }

    if (cur.position() as usize) != record.body.len() {
        return Err(bad("trailing bytes in record body".to_string()));
    }
    Ok(cell)
}

fn read_field_value(
    cur: &mut Cursor<&[u8]>,
    kind: ValueKind,
    cardinality: Cardinality,
) -> io::Result<FieldValue> {
    match cardinality {
        Cardinality::Single => Ok(FieldValue::Single(read_scalar(cur, kind)?)),
        Cardinality::List => {
            let n = cur.read_u32::<LittleEndian>()? as usize;
            let remaining = cur.get_ref().len() - cur.position() as usize;
            // Every element takes at least one byte
            if n > remaining {
                return Err(io::Error::new(io::ErrorKind::InvalidData, "list count exceeds body"));
            }
            let mut items = Vec::with_capacity(n);
            for _ in 0..n {
                items.push(read_scalar(cur, kind)?);
            }
            Ok(FieldValue::List(items))
        }
    }
}

fn read_scalar(cur: &mut Cursor<&[u8]>, kind: ValueKind) -> io::Result<Scalar> {
    Ok(match kind {
        ValueKind::Bool => match cur.read_u8()? {
            0 => Scalar::Bool(false),
            1 => Scalar::Bool(true),
            other => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("bad bool byte {}", other),
                ))
            }
        },
        ValueKind::Int => Scalar::Int(cur.read_i64::<LittleEndian>()?),
        ValueKind::Float => Scalar::Float(cur.read_f64::<LittleEndian>()?),
        ValueKind::String => Scalar::String(read_str(cur)?),
        ValueKind::Ref => Scalar::Ref(CellId::new(cur.read_u64::<LittleEndian>()?)),
    })
}

fn read_str(cur: &mut Cursor<&[u8]>) -> io::Result<String> {
    let len = cur.read_u32::<LittleEndian>()? as usize;
    let bytes = read_bytes(cur, len)?;
    String::from_utf8(bytes).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

fn read_bytes(cur: &mut Cursor<&[u8]>, len: usize) -> io::Result<Vec<u8>> {
    let remaining = cur.get_ref().len().saturating_sub(cur.position() as usize);
    if len > remaining {
        return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "length exceeds input"));
    }
    let mut buf = vec![0u8; len];
    cur.read_exact(&mut buf)?;
    Ok(buf)
}
