//! # PulseBot Providers
//!
//! LLM backends behind the [`LlmProvider`] contract, selected by a string
//! tag at config load. Provider-specific options stay in the constructors;
//! the agent loop is provider-agnostic.

pub mod anthropic;
pub mod ollama;
pub mod openai_compat;
pub mod pricing;

pub use anthropic::AnthropicProvider;
pub use ollama::OllamaProvider;
pub use openai_compat::OpenAiCompatProvider;
pub use pricing::{ModelPricing, PricingTable};

use std::sync::Arc;

use pulsebot_config::Config;
use pulsebot_core::error::{Error, ProviderError};
use pulsebot_core::LlmProvider;

const NVIDIA_BASE_URL: &str = "https://integrate.api.nvidia.com";

/// Build the configured LLM provider.
pub fn create_provider(config: &Config) -> Result<Arc<dyn LlmProvider>, Error> {
    let name = config.agent.provider.as_str();
    let provider_config = config.provider(name);

    let model = provider_config
        .default_model
        .clone()
        .unwrap_or_else(|| config.agent.model.clone());

    let provider: Arc<dyn LlmProvider> = match name {
        "anthropic" => {
            let api_key = provider_config.api_key.clone().filter(|k| !k.is_empty()).ok_or(
                ProviderError::NotConfigured("providers.anthropic.api_key is not set".into()),
            )?;
            Arc::new(AnthropicProvider::new(api_key, model))
        }
        "openai" => {
            let api_key = provider_config.api_key.clone().filter(|k| !k.is_empty()).ok_or(
                ProviderError::NotConfigured("providers.openai.api_key is not set".into()),
            )?;
            Arc::new(OpenAiCompatProvider::new("openai", api_key, model))
        }
        "nvidia" => {
            let api_key = provider_config.api_key.clone().filter(|k| !k.is_empty()).ok_or(
                ProviderError::NotConfigured("providers.nvidia.api_key is not set".into()),
            )?;
            Arc::new(
                OpenAiCompatProvider::new("nvidia", api_key, model)
                    .with_base_url(provider_config.host.as_deref().unwrap_or(NVIDIA_BASE_URL)),
            )
        }
        "ollama" => {
            let host = provider_config
                .host
                .clone()
                .unwrap_or_else(|| "http://localhost:11434".into());
            Arc::new(OllamaProvider::new(host, model))
        }
        other => {
            return Err(ProviderError::NotConfigured(format!("unknown provider '{other}'")).into())
        }
    };

    Ok(provider)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn anthropic_requires_api_key() {
        let config = Config::default();
        assert!(create_provider(&config).is_err());
    }

    #[test]
    fn anthropic_created_with_key() {
        let raw = r#"
[agent]
provider = "anthropic"
model = "claude-sonnet-4-20250514"

[providers.anthropic]
api_key = "sk-ant-test"
"#;
        let config = Config::parse(raw, Path::new("t.toml")).unwrap();
        let provider = create_provider(&config).unwrap();
        assert_eq!(provider.provider_name(), "anthropic");
        assert_eq!(provider.model(), "claude-sonnet-4-20250514");
    }

    #[test]
    fn provider_model_falls_back_to_agent_model() {
        let raw = r#"
[agent]
provider = "ollama"
model = "llama3"
"#;
        let config = Config::parse(raw, Path::new("t.toml")).unwrap();
        let provider = create_provider(&config).unwrap();
        assert_eq!(provider.provider_name(), "ollama");
        assert_eq!(provider.model(), "llama3");
    }

    #[test]
    fn unknown_provider_rejected() {
        let raw = "[agent]\nprovider = \"mystery\"";
        let config = Config::parse(raw, Path::new("t.toml")).unwrap();
        assert!(create_provider(&config).is_err());
    }
}
