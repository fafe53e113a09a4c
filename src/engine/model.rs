//! Model invocation.
//!
//! The neural model is opaque: the engine only knows the names of its input
//! and output tensors (from [`ModelSpec`]) and talks to it through a
//! [`ModelBackend`]. A call creates one session, sets the configured inputs,
//! runs it and reads back the configured outputs.
//!
//! ```text
//! window ──► context / context_length / user_id / num_suggestions / time_diffs
//!                               │ set_input
//!                               v
//!                         ModelSession::invoke
//!                               │ output
//!                               v
//! triggering_score, sensitive_topic_score, replies + replies_scores, actions_scores
//! ```
//!
//! Nothing here fails a call. A backend that cannot create a session or run,
//! or an output that is missing or has the wrong shape, is logged and the
//! affected part of the model contribution is left empty.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::{ActionTypeOptions, ModelSpec, Preconditions};
use crate::error::BackendError;
use crate::{ActionSuggestion, ActionSuggestionOptions, ConversationMessage};

/// A named tensor value exchanged with the model backend.
#[derive(Debug, Clone, PartialEq)]
pub enum Tensor {
    Str(Vec<String>),
    F32 { dims: Vec<usize>, data: Vec<f32> },
    I32 { dims: Vec<usize>, data: Vec<i32> },
    I64 { dims: Vec<usize>, data: Vec<i64> },
}

impl Tensor {
    /// One-dimensional `f32` tensor.
    pub fn f32(data: Vec<f32>) -> Self {
        Tensor::F32 { dims: vec![data.len()], data }
    }

    pub fn i32(data: Vec<i32>) -> Self {
        Tensor::I32 { dims: vec![data.len()], data }
    }

    /// Rank-0 `i64` tensor.
    pub fn i64_scalar(value: i64) -> Self {
        Tensor::I64 { dims: Vec::new(), data: vec![value] }
    }

    fn as_f32(&self) -> Option<(&[usize], &[f32])> {
        match self {
            Tensor::F32 { dims, data } => Some((dims.as_slice(), data.as_slice())),
            _ => None,
        }
    }

    fn as_strings(&self) -> Option<&[String]> {
        match self {
            Tensor::Str(values) => Some(values.as_slice()),
            _ => None,
        }
    }
}

/// One inference run. Sessions are created per call and never shared.
pub trait ModelSession {
    fn set_input(&mut self, name: &str, tensor: Tensor) -> Result<(), BackendError>;
    fn invoke(&mut self) -> Result<(), BackendError>;
    fn output(&self, name: &str) -> Option<Tensor>;
}

/// Factory for model sessions, shared by every call of an engine.
pub trait ModelBackend: Send + Sync {
    fn new_session(&self) -> Result<Box<dyn ModelSession>, BackendError>;
}

/// What the model contributed to a response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelOutput {
    pub triggering_score: Option<f32>,
    pub filtered_min_triggering_score: bool,
    pub sensitivity_score: Option<f32>,
    pub filtered_sensitivity: bool,
    /// Smart replies first, then action classes.
    pub actions: Vec<ActionSuggestion>,
}

#[derive(Clone)]
pub(crate) struct ModelInvoker {
    backend: Arc<dyn ModelBackend>,
    spec: ModelSpec,
    preconditions: Preconditions,
    action_types: Vec<ActionTypeOptions>,
    num_smart_replies: i32,
    smart_reply_action_type: String,
}

impl std::fmt::Debug for ModelInvoker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelInvoker")
            .field("spec", &self.spec)
            .field("backend", &"<backend>")
            .field("action_types", &self.action_types.len())
            .finish()
    }
}

impl ModelInvoker {
    pub(crate) fn new(
        backend: Arc<dyn ModelBackend>,
        spec: ModelSpec,
        preconditions: Preconditions,
        action_types: Vec<ActionTypeOptions>,
        num_smart_replies: i32,
        smart_reply_action_type: String,
    ) -> Self {
        ModelInvoker { backend, spec, preconditions, action_types, num_smart_replies, smart_reply_action_type }
    }

    /// Run the model over `window` (the trailing messages selected by the gate).
    pub(crate) fn suggest(&self, window: &[ConversationMessage], options: &ActionSuggestionOptions) -> ModelOutput {
        let mut session = match self.backend.new_session() {
            Ok(session) => session,
            Err(err) => {
                warn!(error = %err, "could not create model session");
                return ModelOutput::default();
            }
        };

        if let Err(err) = self.set_inputs(session.as_mut(), window) {
            warn!(error = %err, "could not set model inputs");
            return ModelOutput::default();
        }
        if let Err(err) = session.invoke() {
            warn!(error = %err, "failed to invoke model");
            return ModelOutput::default();
        }

        let output = self.read_outputs(session.as_ref(), options);
        debug!(
            triggering_score = ?output.triggering_score,
            sensitivity_score = ?output.sensitivity_score,
            actions = output.actions.len(),
            "model run finished"
        );
        output
    }

    fn set_inputs(&self, session: &mut dyn ModelSession, window: &[ConversationMessage]) -> Result<(), BackendError> {
        if let Some(name) = &self.spec.input_context {
            session.set_input(name, Tensor::Str(window.iter().map(|m| m.text.clone()).collect()))?;
        }
        if let Some(name) = &self.spec.input_context_length {
            session.set_input(name, Tensor::i64_scalar(window.len() as i64))?;
        }
        if let Some(name) = &self.spec.input_user_id {
            session.set_input(name, Tensor::i32(window.iter().map(|m| m.user_id).collect()))?;
        }
        if let Some(name) = &self.spec.input_num_suggestions {
            session.set_input(name, Tensor::i64_scalar(i64::from(self.num_smart_replies)))?;
        }
        if let Some(name) = &self.spec.input_time_diffs {
            session.set_input(name, Tensor::f32(time_diffs(window)))?;
        }
        Ok(())
    }

    fn read_outputs(&self, session: &dyn ModelSession, options: &ActionSuggestionOptions) -> ModelOutput {
        let mut out = ModelOutput::default();

        if let Some(name) = &self.spec.output_triggering_score {
            let score = session
                .output(name)
                .as_ref()
                .and_then(Tensor::as_f32)
                .and_then(|(_, data)| data.first().copied())
                .filter(|score| score.is_finite());
            match score {
                Some(score) => {
                    out.triggering_score = Some(score);
                    out.filtered_min_triggering_score = !options.ignore_min_replies_triggering_threshold
                        && score < self.preconditions.min_smart_reply_triggering_score;
                }
                None => warn!(tensor = %name, "could not compute triggering score"),
            }
        }

        if let Some(name) = &self.spec.output_sensitive_topic_score {
            let tensor = session.output(name);
            let score = tensor
                .as_ref()
                .and_then(Tensor::as_f32)
                .filter(|(dims, _)| dims.first() == Some(&1))
                .and_then(|(_, data)| data.first().copied())
                .filter(|score| score.is_finite());
            match score {
                Some(score) => {
                    out.sensitivity_score = Some(score);
                    out.filtered_sensitivity = score > self.preconditions.max_sensitive_topic_score;
                }
                None => warn!(tensor = %name, "could not compute sensitive topic score"),
            }
        }

        if out.filtered_sensitivity {
            return out;
        }

        if !out.filtered_min_triggering_score {
            if let (Some(replies), Some(scores)) = (&self.spec.output_replies, &self.spec.output_replies_scores) {
                self.read_replies(session, replies, scores, &mut out.actions);
            }
        }

        if let Some(name) = &self.spec.output_actions_scores {
            self.read_action_classes(session, name, &mut out.actions);
        }

        out
    }

    fn read_replies(&self, session: &dyn ModelSession, replies: &str, scores: &str, out: &mut Vec<ActionSuggestion>) {
        let replies_tensor = session.output(replies);
        let scores_tensor = session.output(scores);
        let (Some(texts), Some((_, values))) =
            (replies_tensor.as_ref().and_then(Tensor::as_strings), scores_tensor.as_ref().and_then(Tensor::as_f32))
        else {
            warn!(replies, scores, "could not read smart replies");
            return;
        };
        if texts.len() != values.len() {
            warn!(replies = texts.len(), scores = values.len(), "smart reply scores do not match replies");
            return;
        }

        for (text, score) in texts.iter().zip(values) {
            if text.is_empty() {
                continue;
            }
            if !score.is_finite() {
                warn!(reply = %text, "skipping smart reply without a finite score");
                continue;
            }
            out.push(ActionSuggestion {
                response_text: text.clone(),
                action_type: self.smart_reply_action_type.clone(),
                score: *score,
                ..Default::default()
            });
        }
    }

    fn read_action_classes(&self, session: &dyn ModelSession, name: &str, out: &mut Vec<ActionSuggestion>) {
        let tensor = session.output(name);
        let Some((_, scores)) = tensor.as_ref().and_then(Tensor::as_f32) else {
            warn!(tensor = %name, "could not read action scores");
            return;
        };
        if scores.len() < self.action_types.len() {
            warn!(scores = scores.len(), classes = self.action_types.len(), "too few action scores");
            return;
        }

        for (class, score) in self.action_types.iter().zip(scores) {
            if !score.is_finite() {
                warn!(class = %class.name, "skipping action class without a finite score");
                continue;
            }
            if !class.enabled || *score < class.min_triggering_score {
                continue;
            }
            out.push(ActionSuggestion { action_type: class.name.clone(), score: *score, ..Default::default() });
        }
    }
}

/// Seconds since the previous timestamped message; `0` when either side has
/// no timestamp. Never negative.
fn time_diffs(window: &[ConversationMessage]) -> Vec<f32> {
    let mut last: Option<i64> = None;
    window
        .iter()
        .map(|message| {
            let diff = match (message.reference_time_ms_utc, last) {
                (Some(now), Some(prev)) => (now.saturating_sub(prev) as f32 / 1000.0).max(0.0),
                _ => 0.0,
            };
            if message.reference_time_ms_utc.is_some() {
                last = message.reference_time_ms_utc;
            }
            diff
        })
        .collect()
}
