//! Rule compilation.
//!
//! This module holds the *static* side of the engine: everything derived once
//! from the configuration when the engine is built and shared read-only by
//! every call afterwards.
//!
//! - Rule patterns and low-confidence patterns are compiled to `Regex`es.
//! - Capturing-group references are checked against the compiled pattern, so a
//!   rule cannot name a group its pattern does not have.
//! - Static entity data (written as JSON in the configuration) is encoded
//!   against the entity data schema into its serialized form.
//!
//! ## Invariants
//!
//! - `CompiledRules::rules` keeps declaration order; `CompiledRule::index` is
//!   the position of the rule in the configuration.
//! - `CompiledAction::serialized_entity_data` is `Some` only if the action
//!   declared static entity data, and is always a valid encoding for the
//!   schema's root table.

use regex::Regex;

use crate::config::{ActionSuggestionSpec, CapturingGroup, GroupRef, ModelConfig};
use crate::entity_data::RecordBuilder;
use crate::error::ConfigError;

/// An action template with its static entity data already encoded.
#[derive(Debug, Clone)]
pub struct CompiledAction {
    pub action_type: String,
    pub response_text: String,
    pub score: f32,
    pub serialized_entity_data: Option<Vec<u8>>,
}

impl CompiledAction {
    pub fn new(spec: &ActionSuggestionSpec, entity_data: Option<&RecordBuilder>) -> Result<Self, ConfigError> {
        let serialized_entity_data = match (&spec.entity_data, entity_data) {
            (None, _) => None,
            (Some(_), None) => return Err(ConfigError::MissingEntityDataSchema),
            (Some(values), Some(builder)) => {
                let mut record = builder.new_root();
                record.merge_json(values).map_err(|err| ConfigError::StaticEntityData {
                    action: spec.action_type.clone(),
                    reason: err.to_string(),
                })?;
                Some(record.serialize())
            }
        };

        Ok(CompiledAction {
            action_type: spec.action_type.clone(),
            response_text: spec.response_text.clone(),
            score: spec.score,
            serialized_entity_data,
        })
    }
}

/// One action of a rule, with its capturing-group bindings.
#[derive(Debug, Clone)]
pub struct CompiledRuleAction {
    pub action: CompiledAction,
    pub capturing_groups: Vec<CapturingGroup>,
}

#[derive(Debug, Clone)]
pub struct CompiledRule {
    pub index: usize,
    pub pattern: Regex,
    pub actions: Vec<CompiledRuleAction>,
    /// Whether any action declares static entity data or capturing groups.
    pub has_entity_data: bool,
}

/// Pre-compiled rule set.
#[derive(Debug, Clone, Default)]
pub struct CompiledRules {
    pub rules: Vec<CompiledRule>,
    /// Patterns flagging low-confidence input; empty unless suppression is enabled.
    pub low_confidence: Vec<Regex>,
}

impl CompiledRules {
    pub fn new(config: &ModelConfig, entity_data: Option<&RecordBuilder>) -> Result<Self, ConfigError> {
        let mut rules = Vec::new();
        if let Some(model) = &config.rules {
            for (index, rule) in model.rules.iter().enumerate() {
                let pattern = compile("action", index, &rule.pattern)?;

                let mut actions = Vec::with_capacity(rule.actions.len());
                for spec in &rule.actions {
                    for group in &spec.capturing_groups {
                        check_group(&pattern, index, &group.group)?;
                    }
                    actions.push(CompiledRuleAction {
                        action: CompiledAction::new(&spec.action, entity_data)?,
                        capturing_groups: spec.capturing_groups.clone(),
                    });
                }

                if actions.iter().any(|a| !a.capturing_groups.is_empty()) && entity_data.is_none() {
                    return Err(ConfigError::MissingEntityDataSchema);
                }
                let has_entity_data =
                    actions.iter().any(|a| a.action.serialized_entity_data.is_some() || !a.capturing_groups.is_empty());

                rules.push(CompiledRule { index, pattern, actions, has_entity_data });
            }
        }

        let mut low_confidence = Vec::new();
        let low_confidence_rules = config
            .preconditions
            .as_ref()
            .filter(|p| p.suppress_on_low_confidence_input)
            .and_then(|p| p.low_confidence_rules.as_ref());
        if let Some(model) = low_confidence_rules {
            for (index, rule) in model.rules.iter().enumerate() {
                low_confidence.push(compile("low confidence", index, &rule.pattern)?);
            }
        }

        Ok(CompiledRules { rules, low_confidence })
    }
}

fn compile(kind: &'static str, index: usize, pattern: &str) -> Result<Regex, ConfigError> {
    Regex::new(pattern).map_err(|source| ConfigError::RulePattern { kind, index, source })
}

fn check_group(pattern: &Regex, rule: usize, group: &GroupRef) -> Result<(), ConfigError> {
    let known = match group {
        GroupRef::Index(idx) => *idx < pattern.captures_len(),
        GroupRef::Name(name) => pattern.capture_names().flatten().any(|n| n == name),
    };
    if known { Ok(()) } else { Err(ConfigError::UnknownCapturingGroup { rule, group: group.to_string() }) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity_data::{Schema, SchemaDefinition};
    use std::sync::Arc;

    fn builder() -> RecordBuilder {
        let def: SchemaDefinition = serde_json::from_value(serde_json::json!({
            "root_table": "Entity",
            "objects": [{"name": "Entity", "fields": [
                {"name": "phone_number", "id": 0, "type": "string"},
                {"name": "priority", "id": 1, "type": "int"}
            ]}]
        }))
        .unwrap();
        RecordBuilder::new(Arc::new(Schema::new(&def).unwrap()))
    }

    fn config(rules: serde_json::Value) -> ModelConfig {
        serde_json::from_value(serde_json::json!({"preconditions": {}, "rules": {"rules": rules}})).unwrap()
    }

    #[test]
    fn compiles_rules_in_declaration_order() {
        let config = config(serde_json::json!([
            {"pattern": "^hello", "actions": [{"action": {"type": "greet"}}]},
            {"pattern": "call (\\d+)", "actions": [{
                "action": {"type": "call_phone"},
                "capturing_groups": [{"group": 1, "entity_field": "phone_number"}]
            }]}
        ]));
        let builder = builder();
        let compiled = CompiledRules::new(&config, Some(&builder)).unwrap();

        assert_eq!(compiled.rules.len(), 2);
        assert_eq!(compiled.rules[0].index, 0);
        assert!(!compiled.rules[0].has_entity_data);
        assert!(compiled.rules[1].has_entity_data);
        assert!(compiled.low_confidence.is_empty());
    }

    #[test]
    fn invalid_pattern_is_a_config_error() {
        let config = config(serde_json::json!([{"pattern": "call (\\d+", "actions": []}]));
        let err = CompiledRules::new(&config, None).unwrap_err();
        assert!(matches!(err, ConfigError::RulePattern { index: 0, .. }));
    }

    #[test]
    fn unknown_capturing_group_is_a_config_error() {
        let config = config(serde_json::json!([{"pattern": "call (\\d+)", "actions": [{
            "action": {"type": "call_phone"},
            "capturing_groups": [{"group": "number", "entity_field": "phone_number"}]
        }]}]));
        let err = CompiledRules::new(&config, Some(&builder())).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownCapturingGroup { rule: 0, .. }));
    }

    #[test]
    fn static_entity_data_is_encoded_against_schema() {
        let builder = builder();
        let spec: ActionSuggestionSpec =
            serde_json::from_value(serde_json::json!({"type": "call_phone", "entity_data": {"priority": 2}})).unwrap();
        let action = CompiledAction::new(&spec, Some(&builder)).unwrap();
        let decoded = builder.decode_root(action.serialized_entity_data.as_deref().unwrap()).unwrap();
        assert_eq!(decoded.get("priority"), Some(&crate::entity_data::Value::Int(2)));

        let bad: ActionSuggestionSpec =
            serde_json::from_value(serde_json::json!({"type": "call_phone", "entity_data": {"priority": "high"}}))
                .unwrap();
        assert!(matches!(CompiledAction::new(&bad, Some(&builder)), Err(ConfigError::StaticEntityData { .. })));
        assert!(matches!(CompiledAction::new(&spec, None), Err(ConfigError::MissingEntityDataSchema)));
    }

    #[test]
    fn low_confidence_patterns_only_when_enabled() {
        let mut config: ModelConfig = serde_json::from_value(serde_json::json!({
            "preconditions": {
                "suppress_on_low_confidence_input": true,
                "low_confidence_rules": {"rules": [{"pattern": "(?i)\\bpassword\\b"}]}
            }
        }))
        .unwrap();
        assert_eq!(CompiledRules::new(&config, None).unwrap().low_confidence.len(), 1);

        if let Some(pre) = config.preconditions.as_mut() {
            pre.suppress_on_low_confidence_input = false;
        }
        assert!(CompiledRules::new(&config, None).unwrap().low_confidence.is_empty());
    }
}
