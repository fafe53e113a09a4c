use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::*;
use crate::entity_data::Value;
use crate::error::{BackendError, ConfigError, RankError, SuggestError};
use crate::{
    ActionSuggestionOptions, ActionsSuggestionsResponse, AnnotatedSpan, AnnotationOptions, ClassificationResult,
    Conversation, ConversationMessage,
};

// --- Test doubles ------------------------------------------------------------

#[derive(Default)]
struct Calls {
    sessions: AtomicUsize,
    invocations: AtomicUsize,
}

struct ScriptedBackend {
    outputs: HashMap<String, Tensor>,
    calls: Arc<Calls>,
}

impl ScriptedBackend {
    fn new(outputs: Vec<(&str, Tensor)>) -> (Arc<Self>, Arc<Calls>) {
        let calls = Arc::new(Calls::default());
        let backend = ScriptedBackend {
            outputs: outputs.into_iter().map(|(k, v)| (k.to_string(), v)).collect(),
            calls: Arc::clone(&calls),
        };
        (Arc::new(backend), calls)
    }
}

struct ScriptedSession {
    outputs: HashMap<String, Tensor>,
    calls: Arc<Calls>,
}

impl ModelBackend for ScriptedBackend {
    fn new_session(&self) -> Result<Box<dyn ModelSession>, BackendError> {
        self.calls.sessions.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedSession { outputs: self.outputs.clone(), calls: Arc::clone(&self.calls) }))
    }
}

impl ModelSession for ScriptedSession {
    fn set_input(&mut self, _name: &str, _tensor: Tensor) -> Result<(), BackendError> {
        Ok(())
    }

    fn invoke(&mut self) -> Result<(), BackendError> {
        self.calls.invocations.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn output(&self, name: &str) -> Option<Tensor> {
        self.outputs.get(name).cloned()
    }
}

struct FailingRanker;

impl Ranker for FailingRanker {
    fn rank_actions(&self, _response: &mut ActionsSuggestionsResponse) -> Result<(), RankError> {
        Err(RankError("ranking snippet failed".into()))
    }
}

struct FixedAnnotator(Vec<AnnotatedSpan>);

impl Annotator for FixedAnnotator {
    fn annotate(&self, _text: &str, _options: &AnnotationOptions) -> Vec<AnnotatedSpan> {
        self.0.clone()
    }
}

// --- Helpers -----------------------------------------------------------------

fn base_config() -> serde_json::Value {
    serde_json::json!({
        "locales": "en",
        "preconditions": {
            "min_input_length": 0,
            "min_locale_match_fraction": 0.5,
            "max_sensitive_topic_score": 0.5,
            "min_smart_reply_triggering_score": 0.3
        },
        "action_types": [{"name": "view_calendar", "min_triggering_score": 0.5}],
        "model_spec": {
            "input_context": "context",
            "output_triggering_score": "triggering_score",
            "output_sensitive_topic_score": "sensitive_topic_score",
            "output_replies": "replies",
            "output_replies_scores": "replies_scores",
            "output_actions_scores": "actions_scores"
        },
        "annotation_actions_spec": {"annotation_mapping": [
            {"annotation_collection": "phone", "action": {"type": "call_phone"}}
        ]},
        "rules": {"rules": [
            {"pattern": "(?i)\\bconfirm\\b", "actions": [
                {"action": {"type": "text_reply", "response_text": "Confirmed", "score": 0.9}}
            ]},
            {"pattern": "call (\\d+)", "actions": [{
                "action": {"type": "call_phone", "score": 1.0},
                "capturing_groups": [{"group": 1, "entity_field": "phone_number"}]
            }]}
        ]},
        "entity_data_schema": {
            "root_table": "Entity",
            "objects": [{"name": "Entity", "fields": [
                {"name": "phone_number", "id": 0, "type": "string"},
                {"name": "priority", "id": 1, "type": "int"}
            ]}]
        }
    })
}

fn model_outputs(triggering: f32, sensitivity: f32) -> Vec<(&'static str, Tensor)> {
    vec![
        ("triggering_score", Tensor::f32(vec![triggering])),
        ("sensitive_topic_score", Tensor::F32 { dims: vec![1], data: vec![sensitivity] }),
        ("replies", Tensor::Str(vec!["Sounds good".into()])),
        ("replies_scores", Tensor::f32(vec![0.6])),
        ("actions_scores", Tensor::f32(vec![0.7])),
    ]
}

fn engine_with(config: serde_json::Value, backend: Arc<dyn ModelBackend>) -> ActionsEngine {
    let config = serde_json::from_value(config).unwrap();
    ActionsEngine::builder(config).model_backend(backend).build().unwrap()
}

fn conversation(text: &str) -> Conversation {
    Conversation::new(vec![ConversationMessage::new(1, text).with_locales("en")])
}

fn phone_span(start: usize, end: usize, score: f32) -> AnnotatedSpan {
    AnnotatedSpan { span: (start, end), classification: vec![ClassificationResult::new("phone", score)] }
}

fn suggest(engine: &ActionsEngine, conversation: &Conversation) -> ActionsSuggestionsResponse {
    engine.suggest_actions(conversation, None, &ActionSuggestionOptions::default()).unwrap()
}

// --- Scenarios ---------------------------------------------------------------

#[test]
fn empty_conversation_is_an_empty_success() {
    let (backend, calls) = ScriptedBackend::new(model_outputs(0.9, 0.0));
    let engine = engine_with(base_config(), backend);

    let result = engine
        .suggest_actions_with_metrics(&Conversation::default(), None, &ActionSuggestionOptions::default())
        .unwrap();
    assert!(result.response.actions.is_empty());
    assert_eq!(result.response.triggering_score, -1.0);
    assert_eq!(result.metrics.stage, Stage::EmptyConversation);
    assert_eq!(calls.sessions.load(Ordering::SeqCst), 0);
}

#[test]
fn zero_history_length_is_no_input() {
    let mut config = base_config();
    config["max_conversation_history_length"] = serde_json::json!(0);
    let (backend, _) = ScriptedBackend::new(Vec::new());
    let engine = engine_with(config, backend);

    let err = engine.suggest_actions(&conversation("hi"), None, &ActionSuggestionOptions::default()).unwrap_err();
    assert!(matches!(err, SuggestError::NoInput));
}

#[test]
fn passing_gate_reaches_model_and_rules() {
    let (backend, calls) = ScriptedBackend::new(model_outputs(0.9, 0.1));
    let engine = engine_with(base_config(), backend);

    let result = engine
        .suggest_actions_with_metrics(&conversation("please confirm"), None, &ActionSuggestionOptions::default())
        .unwrap();
    assert_eq!(calls.invocations.load(Ordering::SeqCst), 1);
    assert_eq!(result.metrics.stage, Stage::Completed);
    assert!(result.metrics.sources.contains(SourceSet::MODEL | SourceSet::RULES | SourceSet::RANKER));

    let response = result.response;
    assert_eq!(response.triggering_score, 0.9);
    assert_eq!(response.sensitivity_score, 0.1);
    let got: Vec<_> = response.actions.iter().map(|a| (a.action_type.as_str(), a.score)).collect();
    assert_eq!(got, vec![("text_reply", 0.9), ("view_calendar", 0.7), ("text_reply", 0.6)]);
}

#[test]
fn confirm_rule_end_to_end() {
    let config = serde_json::json!({
        "locales": "en",
        "preconditions": {},
        "rules": {"rules": [{"pattern": "(?i)\\bconfirm\\b", "actions": [
            {"action": {"type": "text_reply", "response_text": "Confirmed", "score": 0.9}}
        ]}]}
    });
    let engine = ActionsEngine::from_buffer(config.to_string().as_bytes()).unwrap();

    let response = suggest(&engine, &conversation("Can you confirm?"));
    assert_eq!(response.actions.len(), 1);
    assert_eq!(response.actions[0].response_text, "Confirmed");
    assert_eq!(response.actions[0].score, 0.9);
    assert!(!response.output_filtered_locale_mismatch);
}

#[test]
fn model_action_class_end_to_end() {
    let config = serde_json::json!({
        "locales": "en",
        "preconditions": {},
        "action_types": [{"name": "confirm", "min_triggering_score": 0.5}],
        "model_spec": {"input_context": "context", "output_actions_scores": "actions_scores"}
    });
    let (backend, calls) = ScriptedBackend::new(vec![("actions_scores", Tensor::f32(vec![0.9]))]);
    let engine = engine_with(config, backend);
    let conversation = Conversation::new(vec![
        ConversationMessage::new(2, "I'll call you tomorrow").with_locales("en"),
        ConversationMessage::new(1, "ok sounds good").with_locales("en"),
    ]);

    let result =
        engine.suggest_actions_with_metrics(&conversation, None, &ActionSuggestionOptions::default()).unwrap();
    assert_eq!(calls.invocations.load(Ordering::SeqCst), 1);
    assert_eq!(result.metrics.counts.rules, 0);
    let got: Vec<_> = result.response.actions.iter().map(|a| (a.action_type.as_str(), a.score)).collect();
    assert_eq!(got, vec![("confirm", 0.9)]);
    assert!(result.response.actions[0].response_text.is_empty());
}

#[test]
fn nan_model_score_keeps_other_suggestions() {
    let mut outputs = model_outputs(0.9, 0.1);
    outputs[4] = ("actions_scores", Tensor::f32(vec![f32::NAN]));
    let (backend, _) = ScriptedBackend::new(outputs);
    let engine = engine_with(base_config(), backend);

    let response = suggest(&engine, &conversation("please confirm"));
    let got: Vec<_> = response.actions.iter().map(|a| (a.action_type.as_str(), a.score)).collect();
    assert_eq!(got, vec![("text_reply", 0.9), ("text_reply", 0.6)]);
}

#[test]
fn call_rule_binds_phone_number() {
    let (backend, _) = ScriptedBackend::new(Vec::new());
    let engine = engine_with(base_config(), backend);

    let response = suggest(&engine, &conversation("call 5551234"));
    assert_eq!(response.actions.len(), 1);
    let record = engine.decode_entity_data(&response.actions[0].serialized_entity_data).unwrap();
    assert_eq!(record.get("phone_number"), Some(&Value::String("5551234".into())));
}

#[test]
fn duplicate_annotations_keep_highest_score() {
    let (backend, _) = ScriptedBackend::new(Vec::new());
    let engine = engine_with(base_config(), backend);

    let message = ConversationMessage::new(1, "555 or 555")
        .with_locales("en")
        .with_annotations(vec![phone_span(0, 3, 0.3), phone_span(7, 10, 0.8)]);
    let response = suggest(&engine, &Conversation::new(vec![message]));

    assert_eq!(response.actions.len(), 1);
    assert_eq!(response.actions[0].action_type, "call_phone");
    assert_eq!(response.actions[0].score, 0.8);
    assert_eq!(response.actions[0].annotations[0].span, (7, 10));
}

#[test]
fn input_below_min_length_keeps_annotation_suggestions() {
    let mut config = base_config();
    config["preconditions"]["min_input_length"] = serde_json::json!(20);
    let (backend, calls) = ScriptedBackend::new(model_outputs(0.9, 0.0));
    let engine = engine_with(config, backend);

    let message = ConversationMessage::new(1, "call 555").with_locales("en").with_annotations(vec![phone_span(5, 8, 0.9)]);
    let result = engine
        .suggest_actions_with_metrics(&Conversation::new(vec![message]), None, &ActionSuggestionOptions::default())
        .unwrap();

    assert_eq!(result.metrics.stage, Stage::InputLength);
    assert_eq!(calls.sessions.load(Ordering::SeqCst), 0);
    let response = result.response;
    assert!(!response.output_filtered_locale_mismatch && !response.output_filtered_low_confidence);
    assert_eq!(response.actions.len(), 1);
    assert!(!response.actions[0].annotations.is_empty());
}

#[test]
fn min_length_boundary_passes() {
    let mut config = base_config();
    config["preconditions"]["min_input_length"] = serde_json::json!(7);
    let (backend, calls) = ScriptedBackend::new(model_outputs(0.9, 0.0));
    let engine = engine_with(config, backend);

    suggest(&engine, &conversation("confirm"));
    assert_eq!(calls.invocations.load(Ordering::SeqCst), 1);
    suggest(&engine, &conversation("confir"));
    assert_eq!(calls.invocations.load(Ordering::SeqCst), 1);
}

#[test]
fn locale_mismatch_sets_flag_and_skips_model() {
    let (backend, calls) = ScriptedBackend::new(model_outputs(0.9, 0.0));
    let engine = engine_with(base_config(), backend);

    let conversation = Conversation::new(vec![ConversationMessage::new(1, "confirme").with_locales("fr")]);
    let response = suggest(&engine, &conversation);
    assert!(response.output_filtered_locale_mismatch);
    assert!(response.actions.is_empty());
    assert_eq!(calls.sessions.load(Ordering::SeqCst), 0);
}

#[test]
fn sensitive_topic_skips_rules() {
    let (backend, _) = ScriptedBackend::new(model_outputs(0.9, 0.9));
    let engine = engine_with(base_config(), backend);

    let result = engine
        .suggest_actions_with_metrics(&conversation("confirm"), None, &ActionSuggestionOptions::default())
        .unwrap();
    assert_eq!(result.metrics.stage, Stage::Sensitive);
    assert!(result.response.output_filtered_sensitivity);
    assert!(result.response.actions.is_empty());
}

#[test]
fn sensitive_topic_without_suppression_still_runs_rules() {
    let mut config = base_config();
    config["preconditions"]["suppress_on_sensitive_topic"] = serde_json::json!(false);
    let (backend, _) = ScriptedBackend::new(model_outputs(0.9, 0.9));
    let engine = engine_with(config, backend);

    let response = suggest(&engine, &conversation("confirm"));
    assert!(response.output_filtered_sensitivity);
    assert_eq!(response.actions.len(), 1);
    assert_eq!(response.actions[0].response_text, "Confirmed");
}

#[test]
fn binding_fault_fails_the_call_and_engine_stays_usable() {
    let mut config = base_config();
    config["rules"]["rules"][1]["actions"][0]["capturing_groups"][0]["entity_field"] = serde_json::json!("priority");
    let (backend, _) = ScriptedBackend::new(Vec::new());
    let engine = engine_with(config, backend);

    let err = engine.suggest_actions(&conversation("call 555"), None, &ActionSuggestionOptions::default()).unwrap_err();
    assert!(matches!(err, SuggestError::RuleBinding { rule: 1, .. }));
    assert_eq!(suggest(&engine, &conversation("confirm")).actions.len(), 1);
}

#[test]
fn ranker_failure_fails_the_call() {
    let config = serde_json::from_value(base_config()).unwrap();
    let (backend, _) = ScriptedBackend::new(Vec::new());
    let engine =
        ActionsEngine::builder(config).model_backend(backend).ranker(Arc::new(FailingRanker)).build().unwrap();

    let err = engine.suggest_actions(&conversation("confirm"), None, &ActionSuggestionOptions::default()).unwrap_err();
    assert!(matches!(err, SuggestError::Ranking(_)));
}

#[test]
fn builder_annotator_is_used_when_call_has_none() {
    let config = serde_json::from_value(base_config()).unwrap();
    let (backend, _) = ScriptedBackend::new(Vec::new());
    let engine = ActionsEngine::builder(config)
        .model_backend(backend)
        .annotator(Arc::new(FixedAnnotator(vec![phone_span(0, 3, 0.4)])))
        .build()
        .unwrap();

    let response = suggest(&engine, &conversation("555"));
    assert_eq!(response.actions.len(), 1);
    assert_eq!(response.actions[0].score, 0.4);

    let per_call = FixedAnnotator(vec![phone_span(0, 3, 0.7)]);
    let response =
        engine.suggest_actions(&conversation("555"), Some(&per_call), &ActionSuggestionOptions::default()).unwrap();
    assert_eq!(response.actions[0].score, 0.7);
}

#[test]
fn model_spec_without_backend_is_rejected() {
    let err = ActionsEngine::from_buffer(base_config().to_string().as_bytes()).unwrap_err();
    assert!(matches!(err, ConfigError::MissingModelBackend));
}

#[test]
fn engine_is_shareable_across_threads() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<ActionsEngine>();

    let (backend, calls) = ScriptedBackend::new(model_outputs(0.9, 0.0));
    let engine = engine_with(base_config(), backend);
    std::thread::scope(|scope| {
        for _ in 0..4 {
            let engine = engine.clone();
            scope.spawn(move || {
                assert!(!suggest(&engine, &conversation("confirm")).actions.is_empty());
            });
        }
    });
    assert_eq!(calls.sessions.load(Ordering::SeqCst), 4);
}

#[test]
fn loads_configuration_from_path() {
    use std::io::Write;

    let config = serde_json::json!({
        "locales": "en",
        "preconditions": {},
        "rules": {"rules": [{"pattern": "(?i)\\bconfirm\\b", "actions": [
            {"action": {"type": "text_reply", "response_text": "Confirmed", "score": 0.9}}
        ]}]}
    });
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(config.to_string().as_bytes()).unwrap();

    let engine = ActionsEngine::from_path(file.path()).unwrap();
    assert_eq!(suggest(&engine, &conversation("confirm")).actions.len(), 1);

    let missing = ActionsEngine::from_path(file.path().with_extension("missing")).unwrap_err();
    assert!(matches!(missing, ConfigError::Io(_)));
}
