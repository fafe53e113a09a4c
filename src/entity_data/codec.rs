//! Binary encoding of reflective records.
//!
//! Layout:
//!
//! ```text
//! "CAE1" | item | item | ... | table(root) | root offset (u32 LE)
//!
//! string := len (u32) | utf-8 bytes
//! table  := count (u16) | entry*
//! entry  := field id (u16) | tag (u8) | payload
//! ```
//!
//! Scalars are stored inline in the entry. Strings and nested tables are
//! stored as absolute offsets to items written earlier. The encoder walks the
//! record post-order (children, then strings, then the table), so every
//! offset points strictly before the table that holds it. The decoder checks
//! this, which both verifies the leaves-to-root order and guarantees decoding
//! terminates. Nesting depth and the total number of tables are bounded, and a
//! field id may appear only once per table.

use std::collections::BTreeSet;
use std::sync::Arc;

use super::record::{ReflectiveRecord, Value};
use super::schema::{FieldKind, Schema};
use crate::error::RecordError;

const MAGIC: &[u8; 4] = b"CAE1";

const MAX_DEPTH: usize = 64;
const MAX_TABLES: usize = 1 << 16;

const TAG_BOOL: u8 = 1;
const TAG_INT: u8 = 2;
const TAG_LONG: u8 = 3;
const TAG_FLOAT: u8 = 4;
const TAG_DOUBLE: u8 = 5;
const TAG_STRING: u8 = 6;
const TAG_TABLE: u8 = 7;

fn tag_kind(tag: u8) -> Option<FieldKind> {
    match tag {
        TAG_BOOL => Some(FieldKind::Bool),
        TAG_INT => Some(FieldKind::Int),
        TAG_LONG => Some(FieldKind::Long),
        TAG_FLOAT => Some(FieldKind::Float),
        TAG_DOUBLE => Some(FieldKind::Double),
        TAG_STRING => Some(FieldKind::String),
        TAG_TABLE => Some(FieldKind::Table),
        _ => None,
    }
}

pub(super) fn encode(record: &ReflectiveRecord) -> Vec<u8> {
    let mut writer = Writer { buf: MAGIC.to_vec() };
    let root = writer.table(record);
    writer.buf.extend_from_slice(&root.to_le_bytes());
    writer.buf
}

struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    fn offset(&self) -> u32 {
        self.buf.len() as u32
    }

    fn string(&mut self, s: &str) -> u32 {
        let at = self.offset();
        self.buf.extend_from_slice(&(s.len() as u32).to_le_bytes());
        self.buf.extend_from_slice(s.as_bytes());
        at
    }

    fn table(&mut self, record: &ReflectiveRecord) -> u32 {
        // Build all children before we can start with this table.
        let mut offsets: Vec<(u16, u8, u32)> = Vec::with_capacity(record.children().len());
        for (&id, child) in record.children() {
            offsets.push((id, TAG_TABLE, self.table(child)));
        }
        for (&id, value) in record.values() {
            if let Value::String(s) = value {
                offsets.push((id, TAG_STRING, self.string(s)));
            }
        }

        let at = self.offset();
        self.buf.extend_from_slice(&(record.values().len() as u16 + record.children().len() as u16).to_le_bytes());
        for (&id, value) in record.values() {
            let (tag, payload): (u8, Vec<u8>) = match value {
                Value::Bool(v) => (TAG_BOOL, vec![*v as u8]),
                Value::Int(v) => (TAG_INT, v.to_le_bytes().to_vec()),
                Value::Long(v) => (TAG_LONG, v.to_le_bytes().to_vec()),
                Value::Float(v) => (TAG_FLOAT, v.to_le_bytes().to_vec()),
                Value::Double(v) => (TAG_DOUBLE, v.to_le_bytes().to_vec()),
                Value::String(_) => continue,
            };
            self.entry(id, tag, &payload);
        }
        for (id, tag, offset) in offsets {
            self.entry(id, tag, &offset.to_le_bytes());
        }
        at
    }

    fn entry(&mut self, id: u16, tag: u8, payload: &[u8]) {
        self.buf.extend_from_slice(&id.to_le_bytes());
        self.buf.push(tag);
        self.buf.extend_from_slice(payload);
    }
}

pub(super) fn decode(schema: Arc<Schema>, object: usize, bytes: &[u8]) -> Result<ReflectiveRecord, RecordError> {
    if bytes.len() < MAGIC.len() + 4 || &bytes[..MAGIC.len()] != MAGIC {
        return Err(RecordError::Decode("missing entity data header".into()));
    }
    let body_end = bytes.len() - 4;
    let mut trailer = Reader { buf: &bytes[..], pos: body_end };
    let root = trailer.u32()? as usize;
    if root < MAGIC.len() || root >= body_end {
        return Err(RecordError::Decode(format!("root offset {root} out of bounds")));
    }
    let reader = Reader { buf: &bytes[..body_end], pos: root };
    Decoder { schema: &schema, tables: 0 }.table(object, reader, 1)
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], RecordError> {
        let end = self.pos.checked_add(n).filter(|&end| end <= self.buf.len());
        match end {
            Some(end) => {
                let slice = &self.buf[self.pos..end];
                self.pos = end;
                Ok(slice)
            }
            None => Err(RecordError::Decode(format!("truncated at offset {}", self.pos))),
        }
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], RecordError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8, RecordError> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16, RecordError> {
        Ok(u16::from_le_bytes(self.array()?))
    }

    fn u32(&mut self) -> Result<u32, RecordError> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    fn at(&self, pos: usize) -> Reader<'a> {
        Reader { buf: self.buf, pos }
    }
}

struct Decoder<'s> {
    schema: &'s Arc<Schema>,
    tables: usize,
}

impl Decoder<'_> {
    fn table(&mut self, object: usize, mut reader: Reader<'_>, depth: usize) -> Result<ReflectiveRecord, RecordError> {
        if depth > MAX_DEPTH {
            return Err(RecordError::Decode(format!("tables nested deeper than {MAX_DEPTH}")));
        }
        self.tables += 1;
        if self.tables > MAX_TABLES {
            return Err(RecordError::Decode(format!("more than {MAX_TABLES} tables")));
        }

        let schema = self.schema;
        let table_start = reader.pos;
        let mut record = ReflectiveRecord::new(Arc::clone(schema), object);
        let mut seen = BTreeSet::new();
        let count = reader.u16()?;

        for _ in 0..count {
            let id = reader.u16()?;
            let tag = reader.u8()?;
            let def = schema.object(object);
            let field = def
                .field_by_id(id)
                .ok_or_else(|| RecordError::Decode(format!("unknown field id {id} on `{}`", def.name)))?;
            if !seen.insert(id) {
                return Err(RecordError::Decode(format!("field id {id} repeated on `{}`", def.name)));
            }
            let kind = tag_kind(tag).ok_or_else(|| RecordError::Decode(format!("unknown value tag {tag}")))?;
            if kind != field.kind {
                return Err(RecordError::TypeMismatch { field: field.name.clone(), expected: field.kind, got: kind });
            }

            let value = match kind {
                FieldKind::Bool => Value::Bool(reader.u8()? != 0),
                FieldKind::Int => Value::Int(i32::from_le_bytes(reader.array()?)),
                FieldKind::Long => Value::Long(i64::from_le_bytes(reader.array()?)),
                FieldKind::Float => Value::Float(f32::from_le_bytes(reader.array()?)),
                FieldKind::Double => Value::Double(f64::from_le_bytes(reader.array()?)),
                FieldKind::String => {
                    let offset = backward_offset(&mut reader, table_start)?;
                    let mut item = reader.at(offset);
                    let len = item.u32()? as usize;
                    let raw = item.take(len)?;
                    let s = std::str::from_utf8(raw).map_err(|e| RecordError::Decode(e.to_string()))?;
                    Value::String(s.to_string())
                }
                FieldKind::Table => {
                    let offset = backward_offset(&mut reader, table_start)?;
                    // Table fields always resolve; `Schema::new` checked them.
                    let table = field.table.unwrap_or(object);
                    let child = self.table(table, reader.at(offset), depth + 1)?;
                    record.insert_child(id, child);
                    continue;
                }
            };
            record.insert_value(id, value);
        }

        Ok(record)
    }
}

fn backward_offset(reader: &mut Reader<'_>, table_start: usize) -> Result<usize, RecordError> {
    let offset = reader.u32()? as usize;
    if offset < MAGIC.len() || offset >= table_start {
        return Err(RecordError::Decode(format!("offset {offset} does not precede its table at {table_start}")));
    }
    Ok(offset)
}
