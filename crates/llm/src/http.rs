use reqwest::Client;
use serde_json::{json, Value};
use shield_core::{ChatMessage, IntentInference, ShipmentCase};
use tracing::debug;

use crate::config::LlmRuntimeConfig;
use crate::prompts::router_prompt;
use crate::{IntentClassifier, LlmError, TextGenerator};

/// `generateContent`-style HTTP client serving both collaborator roles.
#[derive(Clone)]
pub struct HttpLanguageModel {
    client: Client,
    runtime: LlmRuntimeConfig,
}

impl HttpLanguageModel {
    pub fn new(runtime: LlmRuntimeConfig) -> Result<Self, LlmError> {
        let client = Client::builder()
            .connect_timeout(runtime.connect_timeout)
            .timeout(runtime.timeout)
            .build()?;

        Ok(Self { client, runtime })
    }

    pub fn model(&self) -> &str {
        &self.runtime.model
    }

    async fn generate_content(&self, prompt: &str, json_output: bool) -> Result<String, LlmError> {
        let mut payload = json!({
            "contents": [
                { "role": "user", "parts": [ { "text": prompt } ] }
            ]
        });
        if json_output {
            payload["generationConfig"] = json!({ "responseMimeType": "application/json" });
        }

        let response = self
            .client
            .post(self.runtime.generate_url())
            .header("x-goog-api-key", self.runtime.api_key.as_str())
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body: Value = response.json().await?;
        extract_candidate_text(&body)
            .filter(|text| !text.trim().is_empty())
            .ok_or_else(|| LlmError::Parse("output text missing".to_string()))
    }
}

impl IntentClassifier for HttpLanguageModel {
    async fn classify(
        &self,
        history: &[ChatMessage],
        context: &ShipmentCase,
    ) -> Result<IntentInference, LlmError> {
        let prompt = router_prompt(history, context);
        debug!(model = %self.runtime.model, history = history.len(), "calling intent router");
        let text = self.generate_content(&prompt, true).await?;
        parse_inference(&text)
    }
}

impl TextGenerator for HttpLanguageModel {
    async fn generate(&self, prompt: &str) -> Result<String, LlmError> {
        let text = self.generate_content(prompt, false).await?;
        Ok(text.trim().to_string())
    }
}

fn extract_candidate_text(payload: &Value) -> Option<String> {
    let candidates = payload.get("candidates")?.as_array()?;
    let mut chunks = Vec::new();
    for candidate in candidates.iter().take(1) {
        if let Some(parts) = candidate
            .get("content")
            .and_then(|content| content.get("parts"))
            .and_then(|parts| parts.as_array())
        {
            for part in parts {
                if let Some(text) = part.get("text").and_then(|value| value.as_str()) {
                    chunks.push(text.to_string());
                }
            }
        }
    }
    if chunks.is_empty() {
        None
    } else {
        Some(chunks.join(""))
    }
}

/// Parses the router's JSON, tolerating a surrounding markdown fence.
pub(crate) fn parse_inference(text: &str) -> Result<IntentInference, LlmError> {
    serde_json::from_str(strip_code_fence(text)).map_err(|err| LlmError::Parse(err.to_string()))
}

fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

#[cfg(test)]
mod tests {
    use shield_core::Intent;

    use super::*;

    #[test]
    fn extracts_first_candidate_text() {
        let payload = json!({
            "candidates": [
                { "content": { "parts": [ { "text": "EAR99 items " }, { "text": "rarely need a license." } ] } },
                { "content": { "parts": [ { "text": "ignored" } ] } }
            ]
        });
        assert_eq!(
            extract_candidate_text(&payload).as_deref(),
            Some("EAR99 items rarely need a license.")
        );
        assert_eq!(extract_candidate_text(&json!({ "candidates": [] })), None);
    }

    #[test]
    fn parses_fenced_router_output() {
        let text = "```json\n{\"intent\": \"license_check\", \"shipment_updates\": {\"eccn\": \"5A002\"}, \"missing_fields\": [\"destination\"], \"needs_clarification\": true}\n```";
        let inference = parse_inference(text).unwrap();
        assert_eq!(inference.intent, Intent::LicenseCheck);
        assert_eq!(inference.field_updates["eccn"], "5A002");
        assert_eq!(inference.missing_fields, vec!["destination".to_string()]);
        assert!(inference.needs_clarification);
    }

    #[test]
    fn rejects_unknown_intent() {
        let err = parse_inference("{\"intent\": \"book_flight\"}").unwrap_err();
        assert!(matches!(err, LlmError::Parse(_)));
    }
}
