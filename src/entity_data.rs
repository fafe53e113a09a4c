//! Schema-driven entity data.
//!
//! Entity data is the structured payload attached to a suggestion (a parsed
//! phone number, a flight code, ...). Its layout is not known at compile time:
//! it is described by a [`Schema`] shipped inside the model configuration, and
//! records are built field-by-field through reflection on that schema.
//!
//! ```text
//! SchemaDefinition (serde) ── Schema::new ──> Schema (verified, indexed)
//!                                               │
//!                    RecordBuilder::new_root ───┘
//!                               │
//!                               v
//!                 ReflectiveRecord ── set / mutable / set_path
//!                               │
//!                               v
//!                 serialize() ── post-order: children, strings, table
//! ```
//!
//! ## Responsibilities by module
//!
//! - `schema.rs`: schema definition (serde) and the verified, indexed form with
//!   name → field lookup tables per object.
//! - `record.rs`: the tagged-union value store (`Value`), `ReflectiveRecord`
//!   and `RecordBuilder`.
//! - `codec.rs`: the binary encoding. Every table only references data that
//!   was written before it, so a buffer is always laid out leaves-to-root.

#[path = "entity_data/codec.rs"]
mod codec;
#[path = "entity_data/record.rs"]
mod record;
#[path = "entity_data/schema.rs"]
mod schema;

pub use record::{RecordBuilder, ReflectiveRecord, Value};
pub use schema::{Field, FieldDefinition, FieldKind, FieldType, Object, ObjectDefinition, Schema, SchemaDefinition};
