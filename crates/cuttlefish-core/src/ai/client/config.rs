//! Completion client configuration

use crate::constants;
use crate::settings::AppSettings;

/// Configuration for the completion client
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of an OpenAI-compatible API (without `/chat/completions`)
    pub api_base: String,
    pub api_key: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base: constants::ai::DEFAULT_API_BASE.to_string(),
            api_key: String::new(),
        }
    }
}

impl ClientConfig {
    /// Build from stored settings, letting the environment override them
    ///
    /// `OPENAI_API_KEY` replaces an empty stored key; `CUTTLEFISH_API_BASE`
    /// points the client at another OpenAI-compatible endpoint.
    pub fn from_settings(settings: &AppSettings) -> Self {
        let api_key = if settings.openai_api_key.is_empty() {
            std::env::var("OPENAI_API_KEY").unwrap_or_default()
        } else {
            settings.openai_api_key.clone()
        };
        let api_base = std::env::var("CUTTLEFISH_API_BASE")
            .unwrap_or_else(|_| constants::ai::DEFAULT_API_BASE.to_string());

        Self { api_base, api_key }
    }

    /// Full chat completions endpoint
    pub fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.api_base.trim_end_matches('/'))
    }

    /// Image generation endpoint
    pub fn images_url(&self) -> String {
        format!("{}/images/generations", self.api_base.trim_end_matches('/'))
    }
}
