//! Annotation-derived suggestions.
//!
//! Spans classified by an [`Annotator`] (or supplied with the message) are
//! turned into suggestions through the configured mapping table: a `phone`
//! span becomes a `call_phone` suggestion, an `address` span a `view_map`
//! one, and so on. Only the last message is considered.

use tracing::debug;

use super::compiled_rules::CompiledAction;
use super::dedup::deduplicate;
use crate::config::AnnotationActionsSpec;
use crate::entity_data::RecordBuilder;
use crate::error::ConfigError;
use crate::{ActionSuggestion, ActionSuggestionAnnotation, AnnotatedSpan, AnnotationOptions, ConversationMessage};

/// Text-span classifier.
///
/// Called at most once per `suggest_actions` call, for the last message, and
/// only if that message carries no annotations of its own.
pub trait Annotator: Send + Sync {
    fn annotate(&self, text: &str, options: &AnnotationOptions) -> Vec<AnnotatedSpan>;
}

#[derive(Debug, Clone)]
struct CompiledMapping {
    collection: String,
    action: CompiledAction,
    use_annotation_score: bool,
    min_annotation_score: f32,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct AnnotationMapper {
    mappings: Vec<CompiledMapping>,
    deduplicate: bool,
}

impl AnnotationMapper {
    pub(crate) fn new(spec: Option<&AnnotationActionsSpec>, entity_data: Option<&RecordBuilder>) -> Result<Self, ConfigError> {
        let Some(spec) = spec else {
            return Ok(AnnotationMapper::default());
        };

        let mappings = spec
            .annotation_mapping
            .iter()
            .map(|mapping| -> Result<CompiledMapping, ConfigError> {
                Ok(CompiledMapping {
                    collection: mapping.annotation_collection.clone(),
                    action: CompiledAction::new(&mapping.action, entity_data)?,
                    use_annotation_score: mapping.use_annotation_score,
                    min_annotation_score: mapping.min_annotation_score,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(AnnotationMapper { mappings, deduplicate: spec.deduplicate_annotations })
    }

    pub(crate) fn suggest(
        &self,
        messages: &[ConversationMessage],
        annotator: Option<&dyn Annotator>,
        options: &AnnotationOptions,
    ) -> Vec<ActionSuggestion> {
        if self.mappings.is_empty() {
            return Vec::new();
        }
        let Some(message) = messages.last() else {
            return Vec::new();
        };
        let message_index = messages.len() - 1;

        let computed;
        let spans: &[AnnotatedSpan] = match annotator {
            Some(annotator) if message.annotations.is_empty() => {
                computed = annotator.annotate(&message.text, options);
                &computed
            }
            _ => &message.annotations,
        };

        let annotations: Vec<ActionSuggestionAnnotation> = spans
            .iter()
            .filter_map(|span| {
                let top = span.classification.first()?;
                Some(ActionSuggestionAnnotation {
                    message_index,
                    span: span.span,
                    entity: top.clone(),
                    name: top.collection.clone(),
                    text: codepoint_substring(&message.text, span.span),
                })
            })
            .collect();

        let mut suggestions = Vec::new();
        if self.deduplicate {
            for idx in deduplicate(&annotations) {
                self.push_actions(&annotations[idx], &mut suggestions);
            }
        } else {
            for annotation in &annotations {
                self.push_actions(annotation, &mut suggestions);
            }
        }
        debug!(spans = spans.len(), suggestions = suggestions.len(), "mapped annotations");
        suggestions
    }

    fn push_actions(&self, annotation: &ActionSuggestionAnnotation, out: &mut Vec<ActionSuggestion>) {
        for mapping in self.mappings.iter().filter(|m| m.collection == annotation.entity.collection) {
            if annotation.entity.score < mapping.min_annotation_score {
                continue;
            }
            let score = if mapping.use_annotation_score { annotation.entity.score } else { mapping.action.score };
            out.push(ActionSuggestion {
                response_text: mapping.action.response_text.clone(),
                action_type: mapping.action.action_type.clone(),
                score,
                annotations: vec![annotation.clone()],
                serialized_entity_data: mapping.action.serialized_entity_data.clone().unwrap_or_default(),
            });
        }
    }
}

fn codepoint_substring(text: &str, (start, end): (usize, usize)) -> String {
    text.chars().skip(start).take(end.saturating_sub(start)).collect()
}
