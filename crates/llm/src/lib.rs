//! Language-model collaborators: the intent classifier and the free-text
//! generator the orchestrator delegates to.
//!
//! Both are optional. Callers treat every `LlmError` as a degradation
//! signal, never as a hard failure.

mod config;
mod http;
mod keyword;
pub mod prompts;

use shield_core::{ChatMessage, IntentInference, ShipmentCase};
use thiserror::Error;

pub use config::LlmRuntimeConfig;
pub use http::HttpLanguageModel;
pub use keyword::KeywordIntentClassifier;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("language model is not configured")]
    NotConfigured,
    #[error("language model request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("language model returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("language model output could not be parsed: {0}")]
    Parse(String),
}

pub trait IntentClassifier: Send + Sync {
    /// `history` is the recent window only; the caller trims it.
    async fn classify(
        &self,
        history: &[ChatMessage],
        context: &ShipmentCase,
    ) -> Result<IntentInference, LlmError>;
}

pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, LlmError>;
}

/// Placeholder type for an agent built without a language model.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLanguageModel;

impl IntentClassifier for NoLanguageModel {
    async fn classify(
        &self,
        _history: &[ChatMessage],
        _context: &ShipmentCase,
    ) -> Result<IntentInference, LlmError> {
        Err(LlmError::NotConfigured)
    }
}

impl TextGenerator for NoLanguageModel {
    async fn generate(&self, _prompt: &str) -> Result<String, LlmError> {
        Err(LlmError::NotConfigured)
    }
}

/// Runtime-selected backend, so binaries can pick one without threading a
/// generic through every caller.
pub enum LanguageBackend {
    Http(HttpLanguageModel),
    Keyword(KeywordIntentClassifier),
}

impl LanguageBackend {
    pub fn name(&self) -> &'static str {
        match self {
            LanguageBackend::Http(_) => "http",
            LanguageBackend::Keyword(_) => "keyword",
        }
    }
}

impl IntentClassifier for LanguageBackend {
    async fn classify(
        &self,
        history: &[ChatMessage],
        context: &ShipmentCase,
    ) -> Result<IntentInference, LlmError> {
        match self {
            LanguageBackend::Http(model) => model.classify(history, context).await,
            LanguageBackend::Keyword(model) => model.classify(history, context).await,
        }
    }
}

impl TextGenerator for LanguageBackend {
    async fn generate(&self, prompt: &str) -> Result<String, LlmError> {
        match self {
            LanguageBackend::Http(model) => model.generate(prompt).await,
            LanguageBackend::Keyword(_) => Err(LlmError::NotConfigured),
        }
    }
}
