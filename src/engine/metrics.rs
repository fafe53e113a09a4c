//! Engine run metrics.
//!
//! Opt-in timing and bookkeeping for a single call:
//!
//! - `ActionsEngine::suggest_actions` for normal operation.
//! - `ActionsEngine::suggest_actions_with_metrics` for profiling and for
//!   seeing where a call stopped and which sources contributed.
//!
//! Durations of stages that did not run stay zero.

use std::time::Duration;

use crate::ActionsSuggestionsResponse;

bitflags::bitflags! {
    /// Suggestion sources that ran during a call.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct SourceSet: u8 {
        const ANNOTATIONS = 1 << 0;
        const MODEL       = 1 << 1;
        const RULES       = 1 << 2;
        const RANKER      = 1 << 3;
    }
}

/// Where a call stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Stage {
    /// The conversation had no messages.
    #[default]
    EmptyConversation,
    /// Input length out of bounds; only annotation suggestions were gathered.
    InputLength,
    LocaleMismatch,
    LowConfidence,
    /// Sensitive topic; rules were skipped.
    Sensitive,
    Completed,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::EmptyConversation => "empty conversation",
            Stage::InputLength => "input length out of bounds",
            Stage::LocaleMismatch => "locale mismatch",
            Stage::LowConfidence => "low confidence input",
            Stage::Sensitive => "sensitive topic",
            Stage::Completed => "completed",
        }
    }
}

/// Suggestions contributed by each source, before ranking.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SourceCounts {
    pub annotations: usize,
    pub model: usize,
    pub rules: usize,
}

#[derive(Debug, Default, Clone)]
pub struct RunMetrics {
    /// Total elapsed time for the call.
    pub total: Duration,
    pub annotations: Duration,
    pub model: Duration,
    pub rules: Duration,
    pub ranking: Duration,
    pub stage: Stage,
    pub sources: SourceSet,
    pub counts: SourceCounts,
}

/// Engine output bundled with timing information.
#[derive(Debug, Clone)]
pub struct RunResult {
    pub response: ActionsSuggestionsResponse,
    pub metrics: RunMetrics,
}
