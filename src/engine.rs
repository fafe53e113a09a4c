//! Suggestion engine.
//!
//! This module is the *public entry point* for producing suggestions. It is
//! split into focused submodules under `src/engine/`, one per stage of the
//! pipeline, and re-exports the handful of types callers touch.
//!
//! ## How the parts work together
//!
//! ```text
//! ModelConfig ──┐
//!               │  EngineBuilder::build           (orchestrator.rs)
//!               │    - CompiledRules::new         (compiled_rules.rs)
//!               │    - AnnotationMapper::new      (annotations.rs)
//!               └───────────────┬──────────────
//!                               │
//! conversation ── Gate ─────────┼─ trailing window, length/locale/confidence
//!                 (gate.rs)     │
//!                               v
//!      AnnotationMapper  (annotations.rs, dedup.rs)  ─┐
//!      ModelInvoker      (model.rs)                   ├─► response.actions
//!      RuleEngine        (rules.rs)                  ─┘
//!                               │
//!                               v
//!                     Ranker::rank_actions (ranker.rs)
//!                               │
//!                               v
//!                  ActionsSuggestionsResponse
//! ```
//!
//! Sources append in a fixed order (annotations, model, rules), so before
//! ranking the response is fully deterministic for a given input.
//!
//! ## Responsibilities by module
//!
//! - `compiled_rules.rs`: compiles rule and low-confidence patterns and
//!   encodes static entity data once per engine.
//! - `gate.rs`: decides how far a call proceeds.
//! - `annotations.rs`: maps annotated spans of the last message to actions.
//! - `dedup.rs`: annotation deduplication keys.
//! - `model.rs`: backend traits and reading model outputs.
//! - `rules.rs`: regex rules with capturing-group entity data.
//! - `ranker.rs`: the `Ranker` seam and the default score ranker.
//! - `metrics.rs`: optional timing/debug data for a call.
//!
//! ## Debugging
//!
//! Stage decisions are logged with `tracing` at `debug`, gate bail-outs at
//! `info` and degraded model outputs at `warn`.

#[path = "engine/annotations.rs"]
mod annotations;
#[path = "engine/compiled_rules.rs"]
mod compiled_rules;
#[path = "engine/dedup.rs"]
mod dedup;
#[path = "engine/gate.rs"]
mod gate;
#[path = "engine/metrics.rs"]
mod metrics;
#[path = "engine/model.rs"]
mod model;
#[path = "engine/orchestrator.rs"]
mod orchestrator;
#[path = "engine/ranker.rs"]
mod ranker;
#[path = "engine/rules.rs"]
mod rules;

#[cfg(test)]
#[path = "engine/tests.rs"]
mod tests;

pub use annotations::Annotator;
pub use metrics::{RunMetrics, RunResult, SourceCounts, SourceSet, Stage};
pub use model::{ModelBackend, ModelOutput, ModelSession, Tensor};
pub use orchestrator::{ActionsEngine, EngineBuilder};
pub use ranker::{Ranker, ScoreRanker};
