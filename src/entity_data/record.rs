//! Reflective records.
//!
//! A [`ReflectiveRecord`] is a mutable table bound to one object of a
//! [`Schema`]. Scalar and string values live in a field-id keyed map, nested
//! tables in a second map of child records:
//!
//! ```text
//! ReflectiveRecord(Entity)
//!   fields:   {0: String("5551234"), 3: Int(38)}
//!   children: {1: ReflectiveRecord(Contact)
//!                   fields: {0: String("Ada")}}
//! ```
//!
//! Values are never converted: an `Int` field only accepts `Value::Int`, a
//! `Long` field only `Value::Long`, and so on.

use std::collections::BTreeMap;
use std::sync::Arc;

use super::codec;
use super::schema::{Field, FieldKind, Object, Schema};
use crate::error::RecordError;

/// A scalar or string value stored in a record.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(String),
}

impl Value {
    pub fn kind(&self) -> FieldKind {
        match self {
            Value::Bool(_) => FieldKind::Bool,
            Value::Int(_) => FieldKind::Int,
            Value::Long(_) => FieldKind::Long,
            Value::Float(_) => FieldKind::Float,
            Value::Double(_) => FieldKind::Double,
            Value::String(_) => FieldKind::String,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Long(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

/// Creates records for the root table or any named table of a schema.
#[derive(Debug, Clone)]
pub struct RecordBuilder {
    schema: Arc<Schema>,
}

impl RecordBuilder {
    pub fn new(schema: Arc<Schema>) -> Self {
        RecordBuilder { schema }
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Start a new root table record.
    pub fn new_root(&self) -> ReflectiveRecord {
        ReflectiveRecord::new(Arc::clone(&self.schema), self.schema.root())
    }

    /// Start a new record for the table named `name`.
    pub fn new_table(&self, name: &str) -> Result<ReflectiveRecord, RecordError> {
        let idx = self.schema.object_index(name).ok_or_else(|| RecordError::UnknownTable(name.to_string()))?;
        Ok(ReflectiveRecord::new(Arc::clone(&self.schema), idx))
    }

    /// Decode a serialized root table.
    pub fn decode_root(&self, bytes: &[u8]) -> Result<ReflectiveRecord, RecordError> {
        ReflectiveRecord::decode(Arc::clone(&self.schema), self.schema.root(), bytes)
    }
}

/// A table under construction, typed by a schema object.
#[derive(Debug, Clone)]
pub struct ReflectiveRecord {
    schema: Arc<Schema>,
    object: usize,
    fields: BTreeMap<u16, Value>,
    children: BTreeMap<u16, ReflectiveRecord>,
}

impl ReflectiveRecord {
    pub(super) fn new(schema: Arc<Schema>, object: usize) -> Self {
        ReflectiveRecord { schema, object, fields: BTreeMap::new(), children: BTreeMap::new() }
    }

    /// Decode `bytes` as a table of the object at index `object`.
    pub fn decode(schema: Arc<Schema>, object: usize, bytes: &[u8]) -> Result<Self, RecordError> {
        codec::decode(schema, object, bytes)
    }

    pub fn object(&self) -> &Object {
        self.schema.object(self.object)
    }

    pub fn type_name(&self) -> &str {
        &self.object().name
    }

    /// Descriptor for `name`, or `None` if the field is not declared.
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.object().field(name)
    }

    /// True if no field has been set and no child has been created.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.children.is_empty()
    }

    /// Set a scalar or string field.
    ///
    /// Fails if the field is not declared or if the value kind does not match
    /// the declared kind exactly. On failure the record is left untouched.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> Result<(), RecordError> {
        let value = value.into();
        let field = self.field(name).ok_or_else(|| self.unknown_field(name))?;
        if field.kind != value.kind() {
            return Err(RecordError::TypeMismatch { field: name.to_string(), expected: field.kind, got: value.kind() });
        }
        let id = field.id;
        self.fields.insert(id, value);
        Ok(())
    }

    /// Child record for a table field, created on first access.
    pub fn mutable(&mut self, name: &str) -> Result<&mut ReflectiveRecord, RecordError> {
        let field = self.field(name).ok_or_else(|| self.unknown_field(name))?;
        let (id, table) = match field.table {
            Some(table) => (field.id, table),
            None => return Err(RecordError::NotATable(name.to_string())),
        };
        let schema = Arc::clone(&self.schema);
        Ok(self.children.entry(id).or_insert_with(|| ReflectiveRecord::new(schema, table)))
    }

    /// Set a field through a dotted path of table fields, e.g. `contact.phone_number`.
    pub fn set_path(&mut self, path: &str, value: impl Into<Value>) -> Result<(), RecordError> {
        let mut segments: Vec<&str> = path.split('.').collect();
        let last = match segments.pop() {
            Some(last) if !last.is_empty() => last,
            _ => return Err(RecordError::EmptyPath),
        };
        let value = value.into();

        // Resolve the whole path first so a bad leaf creates no children.
        let mut object = self.object;
        for segment in &segments {
            let def = self.schema.object(object);
            let field = def.field(segment).ok_or_else(|| RecordError::UnknownField {
                object: def.name.clone(),
                field: segment.to_string(),
            })?;
            object = field.table.ok_or_else(|| RecordError::NotATable(segment.to_string()))?;
        }
        let def = self.schema.object(object);
        let field = def
            .field(last)
            .ok_or_else(|| RecordError::UnknownField { object: def.name.clone(), field: last.to_string() })?;
        if field.kind != value.kind() {
            return Err(RecordError::TypeMismatch { field: last.to_string(), expected: field.kind, got: value.kind() });
        }

        let mut target = self;
        for segment in segments {
            target = target.mutable(segment)?;
        }
        target.set(last, value)
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        let field = self.field(name)?;
        self.fields.get(&field.id)
    }

    pub fn child(&self, name: &str) -> Option<&ReflectiveRecord> {
        let field = self.field(name)?;
        self.children.get(&field.id)
    }

    /// Merge the values of a serialized table of the same type into this one.
    ///
    /// Values present in `bytes` overwrite values already set here; child
    /// tables are merged recursively.
    pub fn merge_from_serialized(&mut self, bytes: &[u8]) -> Result<(), RecordError> {
        let other = codec::decode(Arc::clone(&self.schema), self.object, bytes)?;
        self.merge_from(other);
        Ok(())
    }

    fn merge_from(&mut self, other: ReflectiveRecord) {
        self.fields.extend(other.fields);
        for (id, child) in other.children {
            match self.children.get_mut(&id) {
                Some(existing) => existing.merge_from(child),
                None => {
                    self.children.insert(id, child);
                }
            }
        }
    }

    /// Fill fields from a JSON object, converting each value to the declared
    /// kind of its field. Nested JSON objects fill table fields.
    pub fn merge_json(&mut self, values: &serde_json::Map<String, serde_json::Value>) -> Result<(), RecordError> {
        for (name, json) in values {
            let field = self.field(name).ok_or_else(|| self.unknown_field(name))?;
            let kind = field.kind;
            if let serde_json::Value::Object(nested) = json {
                self.mutable(name)?.merge_json(nested)?;
                continue;
            }
            let value = json_to_value(name, kind, json)?;
            self.set(name, value)?;
        }
        Ok(())
    }

    /// Serialize the record, children first.
    pub fn serialize(&self) -> Vec<u8> {
        codec::encode(self)
    }

    pub(super) fn values(&self) -> &BTreeMap<u16, Value> {
        &self.fields
    }

    pub(super) fn children(&self) -> &BTreeMap<u16, ReflectiveRecord> {
        &self.children
    }

    pub(super) fn insert_value(&mut self, id: u16, value: Value) {
        self.fields.insert(id, value);
    }

    pub(super) fn insert_child(&mut self, id: u16, child: ReflectiveRecord) {
        self.children.insert(id, child);
    }

    fn unknown_field(&self, name: &str) -> RecordError {
        RecordError::UnknownField { object: self.type_name().to_string(), field: name.to_string() }
    }
}

impl PartialEq for ReflectiveRecord {
    fn eq(&self, other: &Self) -> bool {
        self.object == other.object
            && Arc::ptr_eq(&self.schema, &other.schema)
            && self.fields == other.fields
            && self.children == other.children
    }
}

fn json_to_value(name: &str, kind: FieldKind, json: &serde_json::Value) -> Result<Value, RecordError> {
    use serde_json::Value as Json;

    let value = match (kind, json) {
        (FieldKind::Bool, Json::Bool(b)) => Some(Value::Bool(*b)),
        (FieldKind::Int, Json::Number(n)) => n.as_i64().and_then(|v| i32::try_from(v).ok()).map(Value::Int),
        (FieldKind::Long, Json::Number(n)) => n.as_i64().map(Value::Long),
        (FieldKind::Float, Json::Number(n)) => n.as_f64().map(|v| Value::Float(v as f32)),
        (FieldKind::Double, Json::Number(n)) => n.as_f64().map(Value::Double),
        (FieldKind::String, Json::String(s)) => Some(Value::String(s.clone())),
        _ => None,
    };
    value.ok_or_else(|| RecordError::Decode(format!("value {json} does not fit {kind} field `{name}`")))
}
