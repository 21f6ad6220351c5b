//! LLM client implementations for ApexClaw.
//!
//! All clients implement the `apexclaw_core::LlmClient` trait. `build_from_config`
//! picks the endpoint and credentials from the application config.

pub mod openai_compat;

pub use openai_compat::OpenAiCompatClient;

use apexclaw_config::AppConfig;
use apexclaw_core::error::ProviderError;

/// Build the configured client. A missing API key is accepted for local
/// endpoints such as Ollama.
pub fn build_from_config(config: &AppConfig) -> Result<OpenAiCompatClient, ProviderError> {
    let name = if config.api_url.contains("openrouter.ai") {
        "openrouter"
    } else if config.api_url.contains("localhost:11434") {
        "ollama"
    } else {
        "openai_compat"
    };
    OpenAiCompatClient::new(
        name,
        config.api_url.clone(),
        config.api_key.clone().unwrap_or_default(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use apexclaw_core::LlmClient;

    #[test]
    fn default_config_builds_openrouter() {
        let client = build_from_config(&AppConfig::default()).unwrap();
        assert_eq!(client.name(), "openrouter");
    }

    #[test]
    fn local_endpoint_named_ollama() {
        let config = AppConfig {
            api_url: "http://localhost:11434/v1".into(),
            ..AppConfig::default()
        };
        assert_eq!(build_from_config(&config).unwrap().name(), "ollama");
    }
}
