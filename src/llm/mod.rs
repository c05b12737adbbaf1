//! LLM backends, routing, and prompt construction.

pub mod anthropic;
pub mod openai_chat;
pub mod prompts;
pub mod provider;
pub mod router;

use std::sync::Arc;

use secrecy::ExposeSecret;

use crate::config::ModelConfig;
use crate::error::ConfigError;

pub use anthropic::AnthropicProvider;
pub use openai_chat::OpenAiChatProvider;
pub use prompts::{PromptInputs, RememberedFact, render_grounding, system_prompt};
pub use provider::{ChatMessage, CompletionRequest, CompletionResponse, LlmProvider, Role};
pub use router::{BackendKind, ModelRouter};

/// Wire protocol spoken by a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmBackend {
    Anthropic,
    OpenAiChat,
}

/// Construct a provider, failing fast on a blank credential so a
/// misconfigured backend surfaces at startup instead of mid-conversation.
pub fn create_provider(
    backend: LlmBackend,
    config: &ModelConfig,
    name: &str,
) -> Result<Arc<dyn LlmProvider>, ConfigError> {
    if config.api_key.expose_secret().trim().is_empty() {
        return Err(ConfigError::MissingCredential {
            backend: name.to_string(),
        });
    }
    Ok(match backend {
        LlmBackend::Anthropic => Arc::new(AnthropicProvider::new(config)),
        LlmBackend::OpenAiChat => Arc::new(OpenAiChatProvider::new(config)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;

    #[test]
    fn blank_key_fails_fast() {
        let config = ModelConfig {
            api_key: SecretString::from("  "),
            model: "m".into(),
            base_url: None,
        };
        let result = create_provider(LlmBackend::Anthropic, &config, "knowledge");
        assert!(matches!(result, Err(ConfigError::MissingCredential { .. })));
    }

    #[test]
    fn valid_key_builds_provider() {
        let config = ModelConfig {
            api_key: SecretString::from("sk-test"),
            model: "claude-sonnet-4-20250514".into(),
            base_url: None,
        };
        let provider = create_provider(LlmBackend::Anthropic, &config, "knowledge").unwrap();
        assert_eq!(provider.provider_name(), "anthropic");
    }
}
