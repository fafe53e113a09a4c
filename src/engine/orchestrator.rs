//! Engine construction and the per-call pipeline.
//!
//! ```text
//! conversation
//!     │ empty? ───────────────────────────────► empty response
//!     v
//! Gate::num_messages ── 0 ──────────────────────► Err(NoInput)
//!     v
//! AnnotationMapper (last message)
//!     v
//! Gate::evaluate ── length ─────────────────────► annotation suggestions only
//!     │          ── locale / low confidence ────► flag set
//!     v
//! ModelInvoker ── sensitive (and suppressed) ───► skip rules
//!     v
//! RuleEngine ── binding fault ──────────────────► Err(RuleBinding | EmptyCapture)
//!     v
//! Ranker ── failure ────────────────────────────► Err(Ranking)
//!     v
//! response
//! ```
//!
//! Every successful exit above is ranked before it is returned.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, error};

use super::annotations::{AnnotationMapper, Annotator};
use super::compiled_rules::CompiledRules;
use super::gate::{Gate, GateDecision};
use super::metrics::{RunMetrics, RunResult, SourceSet, Stage};
use super::model::{ModelBackend, ModelInvoker};
use super::ranker::{Ranker, ScoreRanker};
use super::rules::RuleEngine;
use crate::config::ModelConfig;
use crate::entity_data::{RecordBuilder, ReflectiveRecord, Schema};
use crate::error::{ConfigError, RecordError, SuggestError};
use crate::{ActionSuggestionOptions, ActionsSuggestionsResponse, Conversation};

/// Configures optional collaborators before building an [`ActionsEngine`].
pub struct EngineBuilder {
    config: ModelConfig,
    backend: Option<Arc<dyn ModelBackend>>,
    ranker: Option<Arc<dyn Ranker>>,
    annotator: Option<Arc<dyn Annotator>>,
}

impl EngineBuilder {
    pub fn new(config: ModelConfig) -> Self {
        EngineBuilder { config, backend: None, ranker: None, annotator: None }
    }

    pub fn from_buffer(buffer: &[u8]) -> Result<Self, ConfigError> {
        Ok(EngineBuilder::new(ModelConfig::from_buffer(buffer)?))
    }

    /// Backend running the model described by the configuration's `model_spec`.
    pub fn model_backend(mut self, backend: Arc<dyn ModelBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Replaces the default [`ScoreRanker`].
    pub fn ranker(mut self, ranker: Arc<dyn Ranker>) -> Self {
        self.ranker = Some(ranker);
        self
    }

    /// Annotator used when a call does not pass one.
    pub fn annotator(mut self, annotator: Arc<dyn Annotator>) -> Self {
        self.annotator = Some(annotator);
        self
    }

    pub fn build(self) -> Result<ActionsEngine, ConfigError> {
        let config = self.config;
        config.validate()?;

        let preconditions = config.preconditions.clone().ok_or(ConfigError::MissingPreconditions)?;
        let locales = config.supported_locales()?;

        let entity_data = match &config.entity_data_schema {
            Some(definition) => Some(RecordBuilder::new(Arc::new(Schema::new(definition)?))),
            None => None,
        };

        let rules = Arc::new(CompiledRules::new(&config, entity_data.as_ref())?);
        let annotations = AnnotationMapper::new(config.annotation_actions_spec.as_ref(), entity_data.as_ref())?;

        let model = match (&config.model_spec, self.backend) {
            (Some(spec), Some(backend)) => Some(ModelInvoker::new(
                backend,
                spec.clone(),
                preconditions.clone(),
                config.action_types.clone(),
                config.num_smart_replies,
                config.smart_reply_action_type.clone(),
            )),
            (Some(_), None) => return Err(ConfigError::MissingModelBackend),
            (None, Some(_)) => {
                debug!("model backend provided without a model spec; ignoring it");
                None
            }
            (None, None) => None,
        };

        let ranker = self
            .ranker
            .unwrap_or_else(|| Arc::new(ScoreRanker::new(config.ranking_options.deduplicate_suggestions)));

        let gate = Gate::new(
            preconditions,
            locales,
            Arc::clone(&rules),
            config.max_conversation_history_length,
        );

        debug!(
            rules = rules.rules.len(),
            low_confidence_rules = rules.low_confidence.len(),
            model = model.is_some(),
            "actions engine ready"
        );

        Ok(ActionsEngine {
            inner: Arc::new(EngineInner {
                rules: RuleEngine::new(rules, entity_data.clone()),
                gate,
                annotations,
                model,
                ranker,
                annotator: self.annotator,
                entity_data,
                config,
            }),
        })
    }
}

struct EngineInner {
    config: ModelConfig,
    gate: Gate,
    annotations: AnnotationMapper,
    model: Option<ModelInvoker>,
    rules: RuleEngine,
    ranker: Arc<dyn Ranker>,
    annotator: Option<Arc<dyn Annotator>>,
    entity_data: Option<RecordBuilder>,
}

/// Conversational action suggestion engine.
///
/// Immutable after construction and cheap to clone; calls from any number of
/// threads share the compiled state.
#[derive(Clone)]
pub struct ActionsEngine {
    inner: Arc<EngineInner>,
}

impl std::fmt::Debug for ActionsEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionsEngine")
            .field("locales", &self.inner.config.locales)
            .field("model", &self.inner.model.is_some())
            .field("annotator", &self.inner.annotator.is_some())
            .finish()
    }
}

impl ActionsEngine {
    /// Build an engine from a JSON model configuration, without a model backend.
    pub fn from_buffer(buffer: &[u8]) -> Result<Self, ConfigError> {
        EngineBuilder::from_buffer(buffer)?.build()
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let buffer = std::fs::read(path)?;
        Self::from_buffer(&buffer)
    }

    pub fn builder(config: ModelConfig) -> EngineBuilder {
        EngineBuilder::new(config)
    }

    pub fn config(&self) -> &ModelConfig {
        &self.inner.config
    }

    /// Builder for the configured entity data schema, if any.
    pub fn entity_data_builder(&self) -> Option<&RecordBuilder> {
        self.inner.entity_data.as_ref()
    }

    /// Decode a suggestion's `serialized_entity_data`.
    pub fn decode_entity_data(&self, bytes: &[u8]) -> Result<ReflectiveRecord, RecordError> {
        match &self.inner.entity_data {
            Some(builder) => builder.decode_root(bytes),
            None => Err(RecordError::Decode("no entity data schema configured".into())),
        }
    }

    pub fn min_replies_triggering_threshold(&self) -> f32 {
        self.inner.config.preconditions.as_ref().map_or(0.0, |p| p.min_smart_reply_triggering_score)
    }

    /// Suggest actions for the conversation.
    ///
    /// `annotator` overrides the annotator given to the builder. On failure no
    /// suggestions are returned; the engine stays usable.
    pub fn suggest_actions(
        &self,
        conversation: &Conversation,
        annotator: Option<&dyn Annotator>,
        options: &ActionSuggestionOptions,
    ) -> Result<ActionsSuggestionsResponse, SuggestError> {
        self.suggest_actions_with_metrics(conversation, annotator, options).map(|result| result.response)
    }

    /// Like [`ActionsEngine::suggest_actions`], also reporting timings and
    /// where the pipeline stopped.
    pub fn suggest_actions_with_metrics(
        &self,
        conversation: &Conversation,
        annotator: Option<&dyn Annotator>,
        options: &ActionSuggestionOptions,
    ) -> Result<RunResult, SuggestError> {
        let start = Instant::now();
        let mut response = ActionsSuggestionsResponse::default();
        let mut metrics = RunMetrics::default();

        if let Err(err) = self.gather(conversation, annotator, options, &mut response, &mut metrics) {
            error!(error = %err, "could not gather actions suggestions");
            return Err(err);
        }

        let ranking = Instant::now();
        if let Err(err) = self.inner.ranker.rank_actions(&mut response) {
            error!(error = %err, "could not rank actions");
            return Err(err.into());
        }
        metrics.ranking = ranking.elapsed();
        metrics.sources |= SourceSet::RANKER;
        metrics.total = start.elapsed();

        debug!(stage = metrics.stage.as_str(), actions = response.actions.len(), "suggested actions");
        Ok(RunResult { response, metrics })
    }

    fn gather(
        &self,
        conversation: &Conversation,
        annotator: Option<&dyn Annotator>,
        options: &ActionSuggestionOptions,
        response: &mut ActionsSuggestionsResponse,
        metrics: &mut RunMetrics,
    ) -> Result<(), SuggestError> {
        let inner = &*self.inner;
        let messages = &conversation.messages;
        if messages.is_empty() {
            metrics.stage = Stage::EmptyConversation;
            return Ok(());
        }

        let num_messages = inner.gate.num_messages(messages.len())?;
        let window = &messages[messages.len() - num_messages..];

        let annotator: Option<&dyn Annotator> = match annotator {
            Some(annotator) => Some(annotator),
            None => inner.annotator.as_deref(),
        };
        let started = Instant::now();
        let annotated = inner.annotations.suggest(messages, annotator, &options.annotation_options);
        metrics.annotations = started.elapsed();
        metrics.sources |= SourceSet::ANNOTATIONS;
        metrics.counts.annotations = annotated.len();
        response.actions.extend(annotated);

        match inner.gate.evaluate(window) {
            GateDecision::Proceed => {}
            GateDecision::InputLengthOutOfBounds => {
                metrics.stage = Stage::InputLength;
                return Ok(());
            }
            GateDecision::LocaleMismatch => {
                response.output_filtered_locale_mismatch = true;
                metrics.stage = Stage::LocaleMismatch;
                return Ok(());
            }
            GateDecision::LowConfidence => {
                response.output_filtered_low_confidence = true;
                metrics.stage = Stage::LowConfidence;
                return Ok(());
            }
        }

        if let Some(model) = &inner.model {
            let started = Instant::now();
            let output = model.suggest(window, options);
            metrics.model = started.elapsed();
            metrics.sources |= SourceSet::MODEL;
            metrics.counts.model = output.actions.len();

            if let Some(score) = output.triggering_score {
                response.triggering_score = score;
            }
            if let Some(score) = output.sensitivity_score {
                response.sensitivity_score = score;
            }
            response.output_filtered_min_triggering_score = output.filtered_min_triggering_score;
            response.output_filtered_sensitivity = output.filtered_sensitivity;
            response.actions.extend(output.actions);
        }

        let suppress = inner.config.preconditions.as_ref().is_some_and(|p| p.suppress_on_sensitive_topic);
        if suppress && response.output_filtered_sensitivity {
            debug!("sensitive topic, skipping rules");
            metrics.stage = Stage::Sensitive;
            return Ok(());
        }

        let started = Instant::now();
        let text = messages.last().map_or("", |m| m.text.as_str());
        let ruled = inner.rules.suggest(text)?;
        metrics.rules = started.elapsed();
        metrics.sources |= SourceSet::RULES;
        metrics.counts.rules = ruled.len();
        response.actions.extend(ruled);

        metrics.stage = Stage::Completed;
        Ok(())
    }
}
