use async_trait::async_trait;
use llm::builder::{LLMBackend, LLMBuilder};
use llm::chat::ChatMessage;

use archie_core::{AiSettings, Author, Turn};

use crate::{CompletionError, CompletionService};

fn map_backend(provider: &str) -> Result<LLMBackend, CompletionError> {
    match provider {
        "openai" => Ok(LLMBackend::OpenAI),
        "anthropic" => Ok(LLMBackend::Anthropic),
        "google" => Ok(LLMBackend::Google),
        "ollama" => Ok(LLMBackend::Ollama),
        "groq" => Ok(LLMBackend::Groq),
        "mistral" => Ok(LLMBackend::Mistral),
        "deepseek" => Ok(LLMBackend::DeepSeek),
        other => Err(CompletionError::UnknownProvider(other.to_string())),
    }
}

fn to_chat_message(turn: &Turn) -> ChatMessage {
    match turn.author {
        Author::User => ChatMessage::user().content(&turn.text).build(),
        Author::Assistant => ChatMessage::assistant().content(&turn.text).build(),
    }
}

/// Completion service backed by the `llm` crate.
#[derive(Debug, Clone)]
pub struct LlmCompletion {
    settings: AiSettings,
}

impl LlmCompletion {
    /// Fails early on a provider the engine cannot talk to.
    pub fn new(settings: AiSettings) -> Result<Self, CompletionError> {
        map_backend(&settings.provider)?;
        Ok(Self { settings })
    }

    pub fn settings(&self) -> &AiSettings {
        &self.settings
    }
}

#[async_trait]
impl CompletionService for LlmCompletion {
    async fn complete(&self, system: &str, turns: &[Turn]) -> Result<String, CompletionError> {
        let settings = &self.settings;
        let backend = map_backend(&settings.provider)?;

        let mut builder = LLMBuilder::new()
            .backend(backend)
            .model(&settings.model)
            .system(system);

        if !settings.api_key.is_empty() {
            builder = builder.api_key(&settings.api_key);
        }
        if let Some(url) = settings.base_url.as_deref().filter(|u| !u.is_empty()) {
            builder = builder.base_url(url);
        }

        let llm = builder
            .build()
            .map_err(|e| CompletionError::Build(e.to_string()))?;

        let messages: Vec<ChatMessage> = turns.iter().map(to_chat_message).collect();

        tracing::debug!(
            provider = %settings.provider,
            model = %settings.model,
            turns = messages.len(),
            "requesting completion"
        );

        let response = llm
            .chat(&messages)
            .await
            .map_err(|e| CompletionError::Request(e.to_string()))?;

        match response.text() {
            Some(text) if !text.trim().is_empty() => Ok(text),
            _ => Err(CompletionError::EmptyResponse),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_providers_map() {
        for provider in ["openai", "anthropic", "google", "ollama", "groq", "mistral", "deepseek"] {
            assert!(map_backend(provider).is_ok(), "{provider}");
        }
    }

    #[test]
    fn unknown_provider_is_rejected_up_front() {
        let settings = AiSettings {
            provider: "carrier-pigeon".into(),
            model: "v1".into(),
            ..Default::default()
        };
        assert!(matches!(
            LlmCompletion::new(settings),
            Err(CompletionError::UnknownProvider(p)) if p == "carrier-pigeon"
        ));
    }

    #[test]
    fn ollama_settings_are_accepted() {
        let settings = AiSettings {
            provider: "ollama".into(),
            model: "llama3".into(),
            base_url: Some("http://localhost:11434".into()),
            ..Default::default()
        };
        let engine = LlmCompletion::new(settings.clone()).unwrap();
        assert_eq!(engine.settings(), &settings);
    }
}
