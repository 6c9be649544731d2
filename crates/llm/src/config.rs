use std::env;
use std::time::Duration;

const DEFAULT_MODEL: &str = "gemini-2.0-flash";
const DEFAULT_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Debug, Clone)]
pub struct LlmRuntimeConfig {
    pub api_key: String,
    pub model: String,
    pub endpoint: String,
    pub connect_timeout: Duration,
    pub timeout: Duration,
}

impl LlmRuntimeConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            connect_timeout: Duration::from_secs(6),
            timeout: Duration::from_secs(20),
        }
    }

    /// `None` when no API key is set; the agent then runs without a
    /// language model.
    pub fn from_env() -> Option<Self> {
        let api_key = env::var("SHIELD_LLM_API_KEY")
            .ok()
            .filter(|value| !value.trim().is_empty())?;
        let model = env::var("SHIELD_LLM_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        let endpoint =
            env::var("SHIELD_LLM_ENDPOINT").unwrap_or_else(|_| DEFAULT_ENDPOINT.to_string());

        Some(Self {
            model,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            ..Self::new(api_key)
        })
    }

    pub fn generate_url(&self) -> String {
        format!("{}/models/{}:generateContent", self.endpoint, self.model)
    }
}
