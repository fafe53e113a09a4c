use serde::{Deserialize, Serialize};

/// One classification of an annotated span, e.g. `phone` with score `0.9`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub collection: String,
    pub score: f32,
}

impl ClassificationResult {
    pub fn new(collection: impl Into<String>, score: f32) -> Self {
        ClassificationResult { collection: collection.into(), score }
    }
}

/// A span of a message with its classifications, ordered by descending score.
///
/// `span` is a half-open range of codepoint (not byte) indices.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AnnotatedSpan {
    pub span: (usize, usize),
    #[serde(default)]
    pub classification: Vec<ClassificationResult>,
}

/// A single message in the conversation.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ConversationMessage {
    /// Distinguishes the author from the other participants.
    #[serde(default)]
    pub user_id: i32,
    pub text: String,
    #[serde(default)]
    pub reference_time_ms_utc: Option<i64>,
    /// Comma-separated BCP 47 tags for the text.
    #[serde(default)]
    pub locales: String,
    /// Precomputed annotations; when empty, an annotator may be asked instead.
    #[serde(default)]
    pub annotations: Vec<AnnotatedSpan>,
}

impl ConversationMessage {
    pub fn new(user_id: i32, text: impl Into<String>) -> Self {
        ConversationMessage { user_id, text: text.into(), ..Default::default() }
    }

    pub fn with_locales(mut self, locales: impl Into<String>) -> Self {
        self.locales = locales.into();
        self
    }

    pub fn with_reference_time(mut self, reference_time_ms_utc: i64) -> Self {
        self.reference_time_ms_utc = Some(reference_time_ms_utc);
        self
    }

    pub fn with_annotations(mut self, annotations: Vec<AnnotatedSpan>) -> Self {
        self.annotations = annotations;
        self
    }
}

/// Sequence of messages exchanged in a conversation, oldest first.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Conversation {
    pub messages: Vec<ConversationMessage>,
}

impl Conversation {
    pub fn new(messages: Vec<ConversationMessage>) -> Self {
        Conversation { messages }
    }
}

/// Options forwarded verbatim to an [`Annotator`](crate::Annotator).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AnnotationOptions {
    pub reference_time_ms_utc: Option<i64>,
    pub reference_timezone: String,
    pub locales: String,
}

/// Options for a single `suggest_actions` call.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ActionSuggestionOptions {
    pub annotation_options: AnnotationOptions,
    pub ignore_min_replies_triggering_threshold: bool,
}

/// An annotation a suggestion was derived from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionSuggestionAnnotation {
    /// Index of the referenced message in the conversation.
    pub message_index: usize,
    /// Codepoint span within the referenced message.
    pub span: (usize, usize),
    /// The top classification of the span.
    pub entity: ClassificationResult,
    /// Annotation name; the classification collection.
    pub name: String,
    /// Text covered by `span`.
    pub text: String,
}

/// A suggested action.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ActionSuggestion {
    pub response_text: String,
    #[serde(rename = "type")]
    pub action_type: String,
    pub score: f32,
    pub annotations: Vec<ActionSuggestionAnnotation>,
    /// Entity data encoded against the configured schema; empty if none.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub serialized_entity_data: Vec<u8>,
}

/// Suggested actions plus the gating and model signals behind them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionsSuggestionsResponse {
    /// `-1.0` if the model did not compute it.
    pub sensitivity_score: f32,
    /// `-1.0` if the model did not compute it.
    pub triggering_score: f32,
    pub output_filtered_sensitivity: bool,
    pub output_filtered_min_triggering_score: bool,
    pub output_filtered_low_confidence: bool,
    pub output_filtered_locale_mismatch: bool,
    pub actions: Vec<ActionSuggestion>,
}

impl Default for ActionsSuggestionsResponse {
    fn default() -> Self {
        ActionsSuggestionsResponse {
            sensitivity_score: -1.0,
            triggering_score: -1.0,
            output_filtered_sensitivity: false,
            output_filtered_min_triggering_score: false,
            output_filtered_low_confidence: false,
            output_filtered_locale_mismatch: false,
            actions: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_deserialize_with_defaults() {
        let conversation: Conversation = serde_json::from_str(
            r#"{"messages": [
                {"text": "hi"},
                {"user_id": 2, "text": "call 555", "locales": "en",
                 "annotations": [{"span": [5, 8], "classification": [{"collection": "phone", "score": 0.9}]}]}
            ]}"#,
        )
        .unwrap();

        assert_eq!(conversation.messages[0], ConversationMessage::new(0, "hi"));
        let last = &conversation.messages[1];
        assert_eq!(last.annotations[0].span, (5, 8));
        assert_eq!(last.annotations[0].classification[0], ClassificationResult::new("phone", 0.9));
    }

    #[test]
    fn fresh_response_has_no_scores() {
        let response = ActionsSuggestionsResponse::default();
        assert_eq!(response.sensitivity_score, -1.0);
        assert_eq!(response.triggering_score, -1.0);
        assert!(response.actions.is_empty());
    }
}
