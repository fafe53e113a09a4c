//! Model configuration.
//!
//! The engine is driven entirely by one immutable configuration document: the
//! supported locales, gating thresholds, model tensor names, annotation
//! mappings, regex rules, the entity data schema and ranking options. It is
//! stored as JSON and verified on load:
//!
//! - structurally by `serde` (`deny_unknown_fields` everywhere, so a typo in a
//!   key is a verification failure rather than a silently ignored option);
//! - semantically by [`ModelConfig::validate`] and, for rules and schema, by
//!   the engine when it compiles them.
//!
//! Defaults follow the original model format: `-1` means "unbounded" for
//! history and input length limits.

use serde::{Deserialize, Serialize};

use crate::entity_data::SchemaDefinition;
use crate::error::ConfigError;
use crate::locale::{Locale, parse_locales};

fn default_true() -> bool {
    true
}

fn default_unbounded() -> i32 {
    -1
}

fn default_one() -> f32 {
    1.0
}

fn default_locale_fraction() -> f32 {
    0.75
}

fn default_reply_type() -> String {
    "text_reply".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelConfig {
    /// Comma-separated list of locales supported by the model.
    #[serde(default)]
    pub locales: String,

    /// Number of trailing messages considered; `-1` for the whole conversation.
    #[serde(default = "default_unbounded")]
    pub max_conversation_history_length: i32,

    /// Number of smart replies requested from the model.
    #[serde(default)]
    pub num_smart_replies: i32,

    /// Action type given to model smart replies.
    #[serde(default = "default_reply_type")]
    pub smart_reply_action_type: String,

    /// Action classes predicted by the model, in output order.
    #[serde(default)]
    pub action_types: Vec<ActionTypeOptions>,

    pub preconditions: Option<Preconditions>,

    pub model_spec: Option<ModelSpec>,

    pub annotation_actions_spec: Option<AnnotationActionsSpec>,

    pub rules: Option<RulesModel>,

    pub entity_data_schema: Option<SchemaDefinition>,

    #[serde(default)]
    pub ranking_options: RankingOptions,
}

impl ModelConfig {
    /// Parse and structurally verify a configuration buffer.
    pub fn from_buffer(buffer: &[u8]) -> Result<Self, ConfigError> {
        let config: ModelConfig = serde_json::from_slice(buffer)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that do not need compilation: required sections and the locale list.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.preconditions.is_none() {
            return Err(ConfigError::MissingPreconditions);
        }
        self.supported_locales()?;
        if let Some(spec) = &self.model_spec {
            match (&spec.output_replies, &spec.output_replies_scores) {
                (Some(_), None) => return Err(ConfigError::IncompleteReplySpec("output_replies")),
                (None, Some(_)) => return Err(ConfigError::IncompleteReplySpec("output_replies_scores")),
                _ => {}
            }
        }
        Ok(())
    }

    pub fn supported_locales(&self) -> Result<Vec<Locale>, ConfigError> {
        parse_locales(&self.locales).ok_or_else(|| ConfigError::InvalidLocales(self.locales.clone()))
    }
}

/// Options for one model action class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ActionTypeOptions {
    pub name: String,
    /// Disabled classes (such as a catch-all "other") never produce suggestions.
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub min_triggering_score: f32,
}

/// Gating conditions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Preconditions {
    #[serde(default)]
    pub min_smart_reply_triggering_score: f32,
    #[serde(default = "default_one")]
    pub max_sensitive_topic_score: f32,
    #[serde(default = "default_true")]
    pub suppress_on_sensitive_topic: bool,
    #[serde(default)]
    pub min_input_length: i32,
    #[serde(default = "default_unbounded")]
    pub max_input_length: i32,
    #[serde(default = "default_locale_fraction")]
    pub min_locale_match_fraction: f32,
    #[serde(default)]
    pub handle_missing_locale_as_supported: bool,
    #[serde(default)]
    pub handle_unknown_locale_as_supported: bool,
    #[serde(default)]
    pub suppress_on_low_confidence_input: bool,
    /// Patterns that mark the input as low confidence. Only the patterns are
    /// used; actions on these rules are ignored.
    pub low_confidence_rules: Option<RulesModel>,
}

impl Default for Preconditions {
    fn default() -> Self {
        Preconditions {
            min_smart_reply_triggering_score: 0.0,
            max_sensitive_topic_score: default_one(),
            suppress_on_sensitive_topic: true,
            min_input_length: 0,
            max_input_length: default_unbounded(),
            min_locale_match_fraction: default_locale_fraction(),
            handle_missing_locale_as_supported: false,
            handle_unknown_locale_as_supported: false,
            suppress_on_low_confidence_input: false,
            low_confidence_rules: None,
        }
    }
}

/// Names of the model's input and output tensors. An absent name means the
/// model does not use that input or produce that output.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelSpec {
    pub input_context: Option<String>,
    pub input_context_length: Option<String>,
    pub input_user_id: Option<String>,
    pub input_num_suggestions: Option<String>,
    pub input_time_diffs: Option<String>,
    pub output_replies: Option<String>,
    pub output_replies_scores: Option<String>,
    pub output_triggering_score: Option<String>,
    pub output_sensitive_topic_score: Option<String>,
    pub output_actions_scores: Option<String>,
}

/// Template for a suggestion produced by a mapping or a rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ActionSuggestionSpec {
    #[serde(rename = "type")]
    pub action_type: String,
    #[serde(default)]
    pub response_text: String,
    #[serde(default)]
    pub score: f32,
    /// Static entity data, encoded against the entity data schema when the
    /// engine is built.
    pub entity_data: Option<serde_json::Map<String, serde_json::Value>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AnnotationActionsSpec {
    #[serde(default)]
    pub annotation_mapping: Vec<AnnotationMapping>,
    #[serde(default = "default_true")]
    pub deduplicate_annotations: bool,
}

/// Maps an annotation collection (e.g. `phone`) to an action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AnnotationMapping {
    pub annotation_collection: String,
    pub action: ActionSuggestionSpec,
    /// Score the suggestion with the annotation score instead of `action.score`.
    #[serde(default = "default_true")]
    pub use_annotation_score: bool,
    #[serde(default)]
    pub min_annotation_score: f32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RulesModel {
    #[serde(default)]
    pub rules: Vec<RuleDefinition>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleDefinition {
    pub pattern: String,
    #[serde(default)]
    pub actions: Vec<RuleActionSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleActionSpec {
    pub action: ActionSuggestionSpec,
    #[serde(default)]
    pub capturing_groups: Vec<CapturingGroup>,
}

/// Binds a capturing group of a rule pattern to an entity data field path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CapturingGroup {
    pub group: GroupRef,
    /// Dotted field path, e.g. `phone_number` or `contact.phone_number`.
    pub entity_field: String,
}

/// A capturing group, by number or by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GroupRef {
    Index(usize),
    Name(String),
}

impl std::fmt::Display for GroupRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GroupRef::Index(idx) => write!(f, "{idx}"),
            GroupRef::Name(name) => f.write_str(name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RankingOptions {
    #[serde(default = "default_true")]
    pub deduplicate_suggestions: bool,
}

impl Default for RankingOptions {
    fn default() -> Self {
        RankingOptions { deduplicate_suggestions: true }
    }
}
