//! Rule-derived suggestions.
//!
//! Every compiled rule is run over the last message. Each non-overlapping
//! match emits one suggestion per action of the rule; capturing groups are
//! written into that suggestion's entity data.

use std::sync::Arc;

use tracing::{debug, error};

use super::compiled_rules::{CompiledRule, CompiledRuleAction, CompiledRules};
use crate::config::GroupRef;
use crate::entity_data::RecordBuilder;
use crate::error::{RecordError, SuggestError};
use crate::ActionSuggestion;

#[derive(Debug, Clone)]
pub(crate) struct RuleEngine {
    rules: Arc<CompiledRules>,
    entity_data: Option<RecordBuilder>,
}

impl RuleEngine {
    pub(crate) fn new(rules: Arc<CompiledRules>, entity_data: Option<RecordBuilder>) -> Self {
        RuleEngine { rules, entity_data }
    }

    pub(crate) fn suggest(&self, text: &str) -> Result<Vec<ActionSuggestion>, SuggestError> {
        let mut suggestions = Vec::new();
        for rule in &self.rules.rules {
            for caps in rule.pattern.captures_iter(text) {
                for action in &rule.actions {
                    let serialized_entity_data = if rule.has_entity_data {
                        self.entity_data_for(rule, action, &caps)?
                    } else {
                        Vec::new()
                    };
                    suggestions.push(ActionSuggestion {
                        response_text: action.action.response_text.clone(),
                        action_type: action.action.action_type.clone(),
                        score: action.action.score,
                        annotations: Vec::new(),
                        serialized_entity_data,
                    });
                }
            }
        }
        debug!(suggestions = suggestions.len(), "applied rules");
        Ok(suggestions)
    }

    fn entity_data_for(
        &self,
        rule: &CompiledRule,
        action: &CompiledRuleAction,
        caps: &regex::Captures<'_>,
    ) -> Result<Vec<u8>, SuggestError> {
        let binding = |source: RecordError| {
            error!(rule = rule.index, error = %source, "could not set entity data from rule capturing group");
            SuggestError::RuleBinding { rule: rule.index, source }
        };

        // Rules with entity data do not compile without a schema.
        let Some(builder) = &self.entity_data else {
            return Ok(Vec::new());
        };
        let mut record = builder.new_root();

        if let Some(baseline) = &action.action.serialized_entity_data {
            record.merge_from_serialized(baseline).map_err(binding)?;
        }

        for group in &action.capturing_groups {
            let matched = match &group.group {
                GroupRef::Index(idx) => caps.get(*idx),
                GroupRef::Name(name) => caps.name(name),
            };
            let text = match matched {
                Some(m) if !m.as_str().is_empty() => m.as_str(),
                _ => {
                    error!(rule = rule.index, group = %group.group, "capturing group did not capture any text");
                    return Err(SuggestError::EmptyCapture { rule: rule.index, group: group.group.to_string() });
                }
            };
            record.set_path(&group.entity_field, text).map_err(binding)?;
        }

        Ok(record.serialize())
    }
}
