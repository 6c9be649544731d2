use std::sync::Arc;

use serde_json::{json, Map, Value};
use shield_core::{
    classify_intent_rules, find_classification_code, normalize_text, parse_money, ChatMessage,
    Intent, IntentInference, ReferenceTables, ShipmentCase, ShipmentField,
};

use crate::{IntentClassifier, LlmError};

/// Offline classifier: keyword intent rules plus token extraction for the
/// classification code, a known destination and a `$` amount.
#[derive(Clone)]
pub struct KeywordIntentClassifier {
    tables: Arc<dyn ReferenceTables>,
}

impl KeywordIntentClassifier {
    pub fn new(tables: Arc<dyn ReferenceTables>) -> Self {
        Self { tables }
    }

    fn extract_updates(&self, text: &str) -> Map<String, Value> {
        let mut updates = Map::new();

        if let Some(code) = find_classification_code(text) {
            updates.insert(ShipmentField::Eccn.as_key().to_string(), json!(code));
        }

        let lower = text.to_lowercase();
        let destination = self
            .tables
            .destinations()
            .into_iter()
            .filter(|name| contains_word(&lower, &name.to_lowercase()))
            .max_by_key(|name| name.len());
        if let Some(destination) = destination {
            updates.insert(ShipmentField::Destination.as_key().to_string(), json!(destination));
        }

        if let Some(amount) = find_amount(text) {
            updates.insert(ShipmentField::Value.as_key().to_string(), json!(amount));
        }

        updates
    }
}

impl IntentClassifier for KeywordIntentClassifier {
    async fn classify(
        &self,
        history: &[ChatMessage],
        context: &ShipmentCase,
    ) -> Result<IntentInference, LlmError> {
        let Some(latest) = history.iter().rev().find(|m| m.role == "user") else {
            return Ok(IntentInference::general_qa());
        };
        let text = normalize_text(&latest.content);
        let updates = self.extract_updates(&text);

        let mut intent = classify_intent_rules(&text);
        if intent == Intent::GeneralQa && !updates.is_empty() {
            intent = Intent::LicenseCheck;
        }

        let known = context.merged(&updates);
        let wanted: &[ShipmentField] = match intent {
            Intent::LicenseCheck | Intent::FullCheck => &[
                ShipmentField::Eccn,
                ShipmentField::Destination,
                ShipmentField::Value,
            ],
            Intent::Screening => &[ShipmentField::EndUserName],
            Intent::GeneralQa | Intent::UpdateDetails => &[],
        };
        let missing_fields = wanted
            .iter()
            .filter(|field| !known.has(**field))
            .map(|field| field.as_key().to_string())
            .collect::<Vec<_>>();

        Ok(IntentInference {
            intent,
            needs_clarification: !missing_fields.is_empty(),
            field_updates: updates,
            missing_fields,
        })
    }
}

fn contains_word(haystack: &str, needle: &str) -> bool {
    haystack.match_indices(needle).any(|(start, _)| {
        let before = haystack[..start].chars().next_back();
        let after = haystack[start + needle.len()..].chars().next();
        !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
    })
}

/// First `$`-prefixed amount, e.g. `$2,500`.
fn find_amount(text: &str) -> Option<f64> {
    text.split_whitespace()
        .filter(|token| token.starts_with('$'))
        .map(|token| token.trim_end_matches(|ch: char| !ch.is_ascii_digit()))
        .map(|token| parse_money(&json!(token)))
        .find(|amount| *amount > 0.0)
}

#[cfg(test)]
mod tests {
    use shield_core::StaticReferenceTables;

    use super::*;

    fn classifier() -> KeywordIntentClassifier {
        KeywordIntentClassifier::new(StaticReferenceTables::shared())
    }

    #[tokio::test]
    async fn extracts_code_destination_and_value() {
        let inference = classifier()
            .classify(
                &[ChatMessage::user("Can I export 6A003 cameras to China for $2,500?")],
                &ShipmentCase::default(),
            )
            .await
            .unwrap();

        assert_eq!(inference.intent, Intent::LicenseCheck);
        assert_eq!(inference.field_updates["eccn"], "6A003");
        assert_eq!(inference.field_updates["destination"], "China");
        assert_eq!(inference.field_updates["value"], 2500.0);
        assert!(inference.missing_fields.is_empty());
    }

    #[tokio::test]
    async fn prefers_longest_destination_name() {
        let inference = classifier()
            .classify(
                &[ChatMessage::user("license for EAR99 goods to South Korea")],
                &ShipmentCase::default(),
            )
            .await
            .unwrap();
        assert_eq!(inference.field_updates["destination"], "South Korea");
        assert_eq!(inference.missing_fields, vec!["value".to_string()]);
    }

    #[tokio::test]
    async fn plain_question_stays_general() {
        let inference = classifier()
            .classify(&[ChatMessage::user("What does the EAR cover?")], &ShipmentCase::default())
            .await
            .unwrap();
        assert_eq!(inference.intent, Intent::GeneralQa);
        assert!(inference.field_updates.is_empty());
    }

    #[test]
    fn word_matching_respects_boundaries() {
        assert!(contains_word("ship to india now", "india"));
        assert!(!contains_word("shipping to indiana", "india"));
    }
}
