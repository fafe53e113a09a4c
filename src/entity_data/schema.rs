//! Entity data schema.
//!
//! The configuration carries a [`SchemaDefinition`]; [`Schema::new`] verifies it
//! and builds the lookup tables the reflective records need at runtime.
//!
//! ## Invariants
//!
//! - Object names are unique; field names and field ids are unique per object.
//! - Every `table(...)` field type and the root table resolve to an object.
//! - `Field::table` is `Some` exactly when `Field::kind` is `FieldKind::Table`.
//!
//! Table references may form cycles; nothing here rejects them. Records are
//! only ever as deep as the fields actually touched, so a cycle in the schema
//! does not make serialization loop.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::SchemaError;

/// Serialized form of a schema, as found in the model configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchemaDefinition {
    pub root_table: String,
    pub objects: Vec<ObjectDefinition>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ObjectDefinition {
    pub name: String,
    #[serde(default)]
    pub fields: Vec<FieldDefinition>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FieldDefinition {
    pub name: String,
    /// Stable slot identifier written to the wire instead of the name.
    pub id: u16,
    #[serde(rename = "type")]
    pub ty: FieldType,
}

/// Declared type of a field.
///
/// In JSON, scalar types are plain strings (`"string"`, `"int"`, ...) and a
/// nested table is `{"table": "ContactInfo"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Bool,
    Int,
    Long,
    Float,
    Double,
    String,
    Table(String),
}

/// Runtime kind of a field or value, without the table name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    Bool,
    Int,
    Long,
    Float,
    Double,
    String,
    Table,
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldKind::Bool => "bool",
            FieldKind::Int => "int",
            FieldKind::Long => "long",
            FieldKind::Float => "float",
            FieldKind::Double => "double",
            FieldKind::String => "string",
            FieldKind::Table => "table",
        };
        f.write_str(name)
    }
}

/// A verified field descriptor.
#[derive(Debug, Clone)]
pub struct Field {
    pub name: String,
    pub id: u16,
    pub kind: FieldKind,
    /// Index of the referenced object for table fields.
    pub table: Option<usize>,
}

/// A verified object (table type) with its lookup tables.
#[derive(Debug, Clone)]
pub struct Object {
    pub name: String,
    pub fields: Vec<Field>,
    by_name: HashMap<String, usize>,
    by_id: HashMap<u16, usize>,
}

impl Object {
    /// Field descriptor for `name`, if declared.
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.by_name.get(name).map(|&idx| &self.fields[idx])
    }

    /// Field descriptor for the wire id `id`, if declared.
    pub fn field_by_id(&self, id: u16) -> Option<&Field> {
        self.by_id.get(&id).map(|&idx| &self.fields[idx])
    }
}

/// A verified schema.
#[derive(Debug, Clone)]
pub struct Schema {
    objects: Vec<Object>,
    root: usize,
    by_name: HashMap<String, usize>,
}

impl Schema {
    /// Verify `definition` and index it.
    pub fn new(definition: &SchemaDefinition) -> Result<Self, SchemaError> {
        let mut by_name = HashMap::with_capacity(definition.objects.len());
        for (idx, object) in definition.objects.iter().enumerate() {
            if by_name.insert(object.name.clone(), idx).is_some() {
                return Err(SchemaError::DuplicateObject(object.name.clone()));
            }
        }

        let mut objects = Vec::with_capacity(definition.objects.len());
        for object in &definition.objects {
            let mut fields = Vec::with_capacity(object.fields.len());
            let mut field_names = HashMap::with_capacity(object.fields.len());
            let mut field_ids = HashMap::with_capacity(object.fields.len());

            for (idx, field) in object.fields.iter().enumerate() {
                if field_names.insert(field.name.clone(), idx).is_some() {
                    return Err(SchemaError::DuplicateFieldName {
                        object: object.name.clone(),
                        field: field.name.clone(),
                    });
                }
                if field_ids.insert(field.id, idx).is_some() {
                    return Err(SchemaError::DuplicateFieldId { object: object.name.clone(), id: field.id });
                }

                let (kind, table) = match &field.ty {
                    FieldType::Bool => (FieldKind::Bool, None),
                    FieldType::Int => (FieldKind::Int, None),
                    FieldType::Long => (FieldKind::Long, None),
                    FieldType::Float => (FieldKind::Float, None),
                    FieldType::Double => (FieldKind::Double, None),
                    FieldType::String => (FieldKind::String, None),
                    FieldType::Table(table) => {
                        let idx = by_name.get(table).copied().ok_or_else(|| SchemaError::UnknownFieldTable {
                            object: object.name.clone(),
                            field: field.name.clone(),
                            table: table.clone(),
                        })?;
                        (FieldKind::Table, Some(idx))
                    }
                };
                fields.push(Field { name: field.name.clone(), id: field.id, kind, table });
            }

            objects.push(Object { name: object.name.clone(), fields, by_name: field_names, by_id: field_ids });
        }

        let root = by_name
            .get(&definition.root_table)
            .copied()
            .ok_or_else(|| SchemaError::UnknownRootTable(definition.root_table.clone()))?;

        Ok(Schema { objects, root, by_name })
    }

    /// Index of the root table.
    pub fn root(&self) -> usize {
        self.root
    }

    /// Index of the object named `name`.
    pub fn object_index(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    /// Object at `idx`.
    ///
    /// Indices come from this schema (`root`, `object_index`, `Field::table`),
    /// so they are always in range.
    pub fn object(&self, idx: usize) -> &Object {
        &self.objects[idx]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(name: &str, id: u16, ty: FieldType) -> FieldDefinition {
        FieldDefinition { name: name.to_string(), id, ty }
    }

    #[test]
    fn parses_json_field_types() {
        let def: SchemaDefinition = serde_json::from_str(
            r#"{
                "root_table": "Entity",
                "objects": [
                    {"name": "Entity", "fields": [
                        {"name": "phone_number", "id": 0, "type": "string"},
                        {"name": "contact", "id": 1, "type": {"table": "Contact"}}
                    ]},
                    {"name": "Contact", "fields": [{"name": "score", "id": 0, "type": "float"}]}
                ]
            }"#,
        )
        .unwrap();

        let schema = Schema::new(&def).unwrap();
        let root = schema.object(schema.root());
        assert_eq!(root.name, "Entity");
        assert_eq!(root.field("phone_number").unwrap().kind, FieldKind::String);

        let contact = root.field("contact").unwrap();
        assert_eq!(contact.kind, FieldKind::Table);
        assert_eq!(contact.table, schema.object_index("Contact"));
        assert!(root.field_by_id(1).is_some());
        assert!(root.field("missing").is_none());
    }

    #[test]
    fn rejects_unknown_root_table() {
        let def = SchemaDefinition { root_table: "Nope".into(), objects: vec![] };
        assert_eq!(Schema::new(&def).unwrap_err(), SchemaError::UnknownRootTable("Nope".into()));
    }

    #[test]
    fn rejects_duplicate_field_ids() {
        let def = SchemaDefinition {
            root_table: "Entity".into(),
            objects: vec![ObjectDefinition {
                name: "Entity".into(),
                fields: vec![field("a", 0, FieldType::Int), field("b", 0, FieldType::Long)],
            }],
        };
        assert!(matches!(Schema::new(&def), Err(SchemaError::DuplicateFieldId { id: 0, .. })));
    }

    #[test]
    fn rejects_unresolved_table_reference() {
        let def = SchemaDefinition {
            root_table: "Entity".into(),
            objects: vec![ObjectDefinition {
                name: "Entity".into(),
                fields: vec![field("flight", 0, FieldType::Table("Flight".into()))],
            }],
        };
        assert!(matches!(Schema::new(&def), Err(SchemaError::UnknownFieldTable { .. })));
    }
}
