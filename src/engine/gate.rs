//! Precondition gate.
//!
//! Decides how far a call may proceed, based on the trailing window of the
//! conversation: total input length, how many messages are in a locale the
//! model supports, and whether any message trips a low-confidence pattern.
//!
//! The gate never fails a call except for an empty window; every other outcome
//! is a [`GateDecision`] the orchestrator turns into response flags.

use std::sync::Arc;

use tracing::{debug, info};

use super::compiled_rules::CompiledRules;
use crate::config::Preconditions;
use crate::error::SuggestError;
use crate::locale::{Locale, parse_locales};
use crate::ConversationMessage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Proceed,
    /// Too little or too much text. Halts silently, without a flag.
    InputLengthOutOfBounds,
    LocaleMismatch,
    LowConfidence,
}

#[derive(Debug, Clone)]
pub(crate) struct Gate {
    preconditions: Preconditions,
    locales: Vec<Locale>,
    rules: Arc<CompiledRules>,
    max_history: i32,
}

impl Gate {
    pub(crate) fn new(
        preconditions: Preconditions,
        locales: Vec<Locale>,
        rules: Arc<CompiledRules>,
        max_history: i32,
    ) -> Self {
        Gate { preconditions, locales, rules, max_history }
    }

    /// Size of the trailing window for a conversation of `len` messages.
    pub(crate) fn num_messages(&self, len: usize) -> Result<usize, SuggestError> {
        let num = match usize::try_from(self.max_history) {
            Ok(max) => len.min(max),
            Err(_) => len,
        };
        if num == 0 {
            info!("no messages provided for actions suggestions");
            return Err(SuggestError::NoInput);
        }
        Ok(num)
    }

    /// Evaluate the trailing window. Checks run in a fixed order: length,
    /// then locales, then low confidence; the first failing check decides.
    pub(crate) fn evaluate(&self, window: &[ConversationMessage]) -> GateDecision {
        let mut input_length = 0usize;
        let mut matching_locales = 0usize;
        for message in window {
            input_length += message.text.len();
            if let Some(locales) = parse_locales(&message.locales) {
                if self.any_locale_supported(&locales) {
                    matching_locales += 1;
                }
            }
        }

        if !self.length_in_bounds(input_length) {
            info!(input_length, "too much or not enough input for inference");
            return GateDecision::InputLengthOutOfBounds;
        }

        let fraction = matching_locales as f32 / window.len() as f32;
        if fraction < self.preconditions.min_locale_match_fraction {
            info!(fraction, "not enough locale matches");
            return GateDecision::LocaleMismatch;
        }

        if self.is_low_confidence(window) {
            info!("low confidence input");
            return GateDecision::LowConfidence;
        }

        debug!(input_length, fraction, "preconditions met");
        GateDecision::Proceed
    }

    fn length_in_bounds(&self, length: usize) -> bool {
        let min = usize::try_from(self.preconditions.min_input_length).unwrap_or(0);
        if length < min {
            return false;
        }
        match usize::try_from(self.preconditions.max_input_length) {
            Ok(max) => length <= max,
            Err(_) => true,
        }
    }

    fn any_locale_supported(&self, locales: &[Locale]) -> bool {
        if locales.is_empty() {
            return self.preconditions.handle_missing_locale_as_supported;
        }
        locales.iter().any(|locale| self.locale_supported(locale))
    }

    fn locale_supported(&self, locale: &Locale) -> bool {
        if locale.is_unknown() {
            return self.preconditions.handle_unknown_locale_as_supported;
        }
        self.locales.iter().any(|model| model.accepts(locale))
    }

    fn is_low_confidence(&self, window: &[ConversationMessage]) -> bool {
        if !self.preconditions.suppress_on_low_confidence_input {
            return false;
        }
        window
            .iter()
            .rev()
            .any(|message| self.rules.low_confidence.iter().any(|re| re.is_match(&message.text)))
    }
}
