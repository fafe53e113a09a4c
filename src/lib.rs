//! Conversational action suggestions.
//!
//! Given the last few messages of a chat, [`ActionsEngine`] suggests actions
//! such as calling a number, viewing a calendar entry or sending a smart
//! reply. Suggestions come from three sources run under one gate and ranked
//! together:
//!
//! - annotated spans of the last message, mapped through a declarative table;
//! - an opaque neural model behind [`ModelBackend`];
//! - regex rules whose capturing groups fill schema-typed entity data.
//!
//! ```no_run
//! use chatactions::{ActionSuggestionOptions, ActionsEngine, Conversation, ConversationMessage};
//!
//! let engine = ActionsEngine::from_path("actions.json")?;
//! let conversation = Conversation::new(vec![ConversationMessage::new(1, "call 5551234").with_locales("en")]);
//! let response = engine.suggest_actions(&conversation, None, &ActionSuggestionOptions::default())?;
//! for action in &response.actions {
//!     println!("{} {:.2}", action.action_type, action.score);
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#[macro_use]
mod macros;
mod api;
pub mod config;
mod engine;
pub mod entity_data;
pub mod error;
pub mod locale;

pub use api::{
    ActionSuggestion, ActionSuggestionAnnotation, ActionSuggestionOptions, ActionsSuggestionsResponse,
    AnnotatedSpan, AnnotationOptions, ClassificationResult, Conversation, ConversationMessage,
};
pub use config::ModelConfig;
pub use engine::{
    ActionsEngine, Annotator, EngineBuilder, ModelBackend, ModelOutput, ModelSession, Ranker, RunMetrics,
    RunResult, ScoreRanker, SourceCounts, SourceSet, Stage, Tensor,
};
pub use error::{BackendError, ConfigError, RankError, RecordError, SchemaError, SuggestError};

/// Well-known action types.
pub mod action_types {
    pub const VIEW_CALENDAR: &str = "view_calendar";
    pub const VIEW_MAP: &str = "view_map";
    pub const TRACK_FLIGHT: &str = "track_flight";
    pub const OPEN_URL: &str = "open_url";
    pub const SEND_SMS: &str = "send_sms";
    pub const CALL_PHONE: &str = "call_phone";
    pub const SEND_EMAIL: &str = "send_email";
    pub const SHARE_LOCATION: &str = "share_location";
    /// Default type of model smart replies.
    pub const TEXT_REPLY: &str = "text_reply";
}
