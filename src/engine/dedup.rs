//! Deduplication keys for annotations.
//!
//! The annotator frequently reports the same entity more than once in a
//! message ("call me at 555-1234 or text 555-1234"). Mapping every occurrence
//! would produce duplicate suggestions, so annotations are grouped first.
//!
//! ## What counts as "the same annotation"
//!
//! The key combines:
//!
//! - The annotation name (the top classification's collection)
//! - The covered text
//!
//! Spans are deliberately not part of the key: two occurrences of the same
//! phone number at different offsets are one entity.
//!
//! Per key, the annotation with the highest score is kept; on ties the first
//! one seen wins. Survivors come out in key order, which keeps the output
//! deterministic regardless of annotator ordering.

use std::collections::BTreeMap;

use crate::ActionSuggestionAnnotation;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) struct AnnotationKey<'a> {
    pub(crate) name: &'a str,
    pub(crate) text: &'a str,
}

impl<'a> AnnotationKey<'a> {
    pub(crate) fn from_annotation(annotation: &'a ActionSuggestionAnnotation) -> Self {
        AnnotationKey { name: &annotation.name, text: &annotation.text }
    }
}

/// Indices of the annotations that survive deduplication, in key order.
pub(crate) fn deduplicate(annotations: &[ActionSuggestionAnnotation]) -> Vec<usize> {
    let mut best: BTreeMap<AnnotationKey<'_>, usize> = BTreeMap::new();

    for (idx, annotation) in annotations.iter().enumerate() {
        let key = AnnotationKey::from_annotation(annotation);
        match best.get_mut(&key) {
            Some(kept) => {
                if annotations[*kept].entity.score < annotation.entity.score {
                    *kept = idx;
                }
            }
            None => {
                best.insert(key, idx);
            }
        }
    }

    best.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ClassificationResult;

    fn annotation(name: &str, text: &str, score: f32, start: usize) -> ActionSuggestionAnnotation {
        ActionSuggestionAnnotation {
            message_index: 0,
            span: (start, start + text.chars().count()),
            entity: ClassificationResult::new(name, score),
            name: name.to_string(),
            text: text.to_string(),
        }
    }

    #[test]
    fn keeps_highest_score_per_key() {
        let annotations = vec![annotation("phone", "555", 0.3, 0), annotation("phone", "555", 0.8, 10)];
        assert_eq!(deduplicate(&annotations), vec![1]);
    }

    #[test]
    fn ties_keep_first_seen() {
        let annotations = vec![annotation("phone", "555", 0.5, 0), annotation("phone", "555", 0.5, 10)];
        assert_eq!(deduplicate(&annotations), vec![0]);
    }

    #[test]
    fn survivors_come_out_in_key_order() {
        let annotations = vec![
            annotation("phone", "555", 0.5, 0),
            annotation("email", "a@b.c", 0.5, 5),
            annotation("phone", "777", 0.5, 12),
        ];
        assert_eq!(deduplicate(&annotations), vec![1, 0, 2]);
    }
}
