//! Error types.
//!
//! Errors are split by the point at which they can happen:
//!
//! - [`ConfigError`]: the model configuration could not be turned into an
//!   engine. Fatal at construction time.
//! - [`SchemaError`] / [`RecordError`]: entity data schema verification and
//!   reflective record access.
//! - [`SuggestError`]: a single `suggest_actions` call failed. The engine
//!   itself stays usable.
//! - [`BackendError`]: the model backend failed. The orchestrator never
//!   surfaces this; a failing backend only removes the model contribution.

use thiserror::Error;

use crate::entity_data::FieldKind;

/// Errors raised while loading and validating a model configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read model configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("model configuration failed verification: {0}")]
    Verification(#[from] serde_json::Error),

    #[error("no preconditions specified")]
    MissingPreconditions,

    #[error("could not parse model supported locales `{0}`")]
    InvalidLocales(String),

    #[error("failed to compile pattern of {kind} rule #{index}: {source}")]
    RulePattern {
        kind: &'static str,
        index: usize,
        #[source]
        source: regex::Error,
    },

    #[error("rule #{rule} references unknown capturing group `{group}`")]
    UnknownCapturingGroup { rule: usize, group: String },

    #[error("could not load entity data schema: {0}")]
    Schema(#[from] SchemaError),

    #[error("entity data declared but no entity data schema configured")]
    MissingEntityDataSchema,

    #[error("invalid static entity data for action `{action}`: {reason}")]
    StaticEntityData { action: String, reason: String },

    #[error("a model spec is configured but no model backend was provided")]
    MissingModelBackend,

    #[error("model spec declares {0} for replies without its companion tensor")]
    IncompleteReplySpec(&'static str),
}

/// Errors raised while verifying an entity data schema.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SchemaError {
    #[error("root table `{0}` is not defined")]
    UnknownRootTable(String),

    #[error("object `{0}` is defined more than once")]
    DuplicateObject(String),

    #[error("object `{object}` declares field `{field}` more than once")]
    DuplicateFieldName { object: String, field: String },

    #[error("object `{object}` reuses field id {id}")]
    DuplicateFieldId { object: String, id: u16 },

    #[error("field `{object}.{field}` references unknown table `{table}`")]
    UnknownFieldTable { object: String, field: String, table: String },
}

/// Errors raised by [`ReflectiveRecord`](crate::entity_data::ReflectiveRecord) operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RecordError {
    #[error("unknown field `{field}` on `{object}`")]
    UnknownField { object: String, field: String },

    #[error("type mismatch for field `{field}`, expected: {expected}, got: {got}")]
    TypeMismatch { field: String, expected: FieldKind, got: FieldKind },

    #[error("field `{0}` is not a table")]
    NotATable(String),

    #[error("unknown table `{0}`")]
    UnknownTable(String),

    #[error("empty field path")]
    EmptyPath,

    #[error("malformed entity data: {0}")]
    Decode(String),
}

/// Failure of a single suggestion call.
#[derive(Debug, Error)]
pub enum SuggestError {
    #[error("no messages provided for actions suggestions")]
    NoInput,

    #[error("could not set entity data from capturing group of rule #{rule}: {source}")]
    RuleBinding {
        rule: usize,
        #[source]
        source: RecordError,
    },

    #[error("capturing group `{group}` of rule #{rule} did not capture any text")]
    EmptyCapture { rule: usize, group: String },

    #[error("could not rank actions: {0}")]
    Ranking(#[from] RankError),
}

/// Failure reported by a [`Ranker`](crate::Ranker).
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{0}")]
pub struct RankError(pub String);

/// Failure reported by a [`ModelBackend`](crate::ModelBackend) or its sessions.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BackendError {
    #[error("could not create model session: {0}")]
    Session(String),

    #[error("could not set input tensor `{name}`: {reason}")]
    Input { name: String, reason: String },

    #[error("model invocation failed: {0}")]
    Invoke(String),
}
