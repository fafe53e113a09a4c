//! Final ranking of a response.

use crate::error::RankError;
use crate::{ActionSuggestion, ActionSuggestionAnnotation, ActionsSuggestionsResponse};

/// Reorders and filters the gathered suggestions in place.
///
/// Runs once per successful call, after every source has contributed. A
/// failure fails the whole call.
pub trait Ranker: Send + Sync {
    fn rank_actions(&self, response: &mut ActionsSuggestionsResponse) -> Result<(), RankError>;
}

/// Default ranker: highest score first, optionally dropping suggestions that
/// repeat an earlier, better one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScoreRanker {
    pub deduplicate: bool,
}

impl ScoreRanker {
    pub fn new(deduplicate: bool) -> Self {
        ScoreRanker { deduplicate }
    }
}

impl Default for ScoreRanker {
    fn default() -> Self {
        ScoreRanker { deduplicate: true }
    }
}

impl Ranker for ScoreRanker {
    fn rank_actions(&self, response: &mut ActionsSuggestionsResponse) -> Result<(), RankError> {
        if let Some(bad) = response.actions.iter().find(|a| a.score.is_nan()) {
            return Err(RankError(format!("suggestion `{}` has no valid score", bad.action_type)));
        }
        // `sort_by` is stable: equal scores keep source order.
        response.actions.sort_by(|a, b| b.score.total_cmp(&a.score));

        if self.deduplicate {
            let mut kept: Vec<ActionSuggestion> = Vec::with_capacity(response.actions.len());
            for action in response.actions.drain(..) {
                if !kept.iter().any(|k| is_same_action(k, &action)) {
                    kept.push(action);
                }
            }
            response.actions = kept;
        }
        Ok(())
    }
}

fn is_same_action(a: &ActionSuggestion, b: &ActionSuggestion) -> bool {
    a.action_type == b.action_type
        && a.response_text == b.response_text
        && a.serialized_entity_data == b.serialized_entity_data
        && a.annotations.len() == b.annotations.len()
        && a.annotations.iter().zip(&b.annotations).all(|(x, y)| is_same_annotation(x, y))
}

fn is_same_annotation(a: &ActionSuggestionAnnotation, b: &ActionSuggestionAnnotation) -> bool {
    a.message_index == b.message_index
        && a.span == b.span
        && a.name == b.name
        && a.entity.collection == b.entity.collection
}
