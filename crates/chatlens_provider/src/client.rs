use std::time::Duration;

use async_trait::async_trait;
use chatlens_config::{ProviderConfig, ProviderId};
use chatlens_domain::{Analysis, AnnotationClient, AnnotationFailure, Conversation};
use url::Url;

use crate::{Error, Ollama, OpenAICompat, Result};

/// Connection settings shared by every backend.
#[derive(Clone)]
pub(crate) struct Settings {
    pub(crate) http: reqwest::Client,
    pub(crate) base_url: Url,
    pub(crate) api_key: Option<String>,
    pub(crate) model: String,
    pub(crate) temperature: f32,
    pub(crate) max_tokens: u32,
    pub(crate) char_budget: usize,
}

impl Settings {
    #[cfg(test)]
    pub(crate) fn test(base_url: &str, api_key: Option<&str>) -> Self {
        let base_url = if base_url.ends_with('/') { base_url.to_string() } else { format!("{base_url}/") };
        Self {
            http: reqwest::Client::new(),
            base_url: Url::parse(&base_url).unwrap(),
            api_key: api_key.map(String::from),
            model: "test-model".to_string(),
            temperature: 0.1,
            max_tokens: 256,
            char_budget: 800,
        }
    }
}

/// Oracle client selected from configuration.
#[derive(Clone)]
pub enum Client {
    OpenAICompat(OpenAICompat),
    Ollama(Ollama),
}

impl Client {
    /// Builds the backend named by `config`. `char_budget` caps the
    /// conversation text put into each prompt.
    ///
    /// # Errors
    /// Fails when the base URL is invalid, when a hosted provider has no API
    /// key, or when the HTTP client cannot be built.
    pub fn new(config: &ProviderConfig, char_budget: usize) -> Result<Self> {
        let api_key = config.resolve_api_key();
        if let (None, Some(env)) = (&api_key, config.id.api_key_env()) {
            return Err(Error::MissingApiKey { provider: config.id, env });
        }

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(5)
            .build()?;

        let settings = Settings {
            http,
            base_url: config.endpoint()?,
            api_key,
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            char_budget,
        };

        Ok(match config.id {
            ProviderId::OpenAI | ProviderId::Groq => {
                Client::OpenAICompat(OpenAICompat::new(config.id, settings))
            }
            ProviderId::Ollama => Client::Ollama(Ollama::new(settings)),
        })
    }
}

#[async_trait]
impl AnnotationClient for Client {
    async fn analyze(&self, conversation: &Conversation) -> std::result::Result<Analysis, AnnotationFailure> {
        match self {
            Client::OpenAICompat(backend) => backend.analyze(conversation).await,
            Client::Ollama(backend) => backend.analyze(conversation).await,
        }
    }

    fn provider(&self) -> &str {
        match self {
            Client::OpenAICompat(backend) => match backend.provider() {
                ProviderId::OpenAI => "openai",
                ProviderId::Groq => "groq",
                ProviderId::Ollama => "ollama",
            },
            Client::Ollama(_) => "ollama",
        }
    }

    fn model(&self) -> &str {
        match self {
            Client::OpenAICompat(backend) => backend.model(),
            Client::Ollama(backend) => backend.model(),
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn fixture(id: ProviderId) -> ProviderConfig {
        ProviderConfig {
            id,
            model: id.default_model().to_string(),
            base_url: None,
            api_key: None,
            timeout_secs: 30,
            temperature: 0.1,
            max_tokens: 512,
        }
    }

    #[test]
    fn test_ollama_needs_no_key() {
        let actual = Client::new(&fixture(ProviderId::Ollama), 800).unwrap();
        assert!(matches!(actual, Client::Ollama(_)));
        assert_eq!(actual.provider(), "ollama");
        assert_eq!(actual.model(), "llama3.1:8b");
    }

    #[test]
    fn test_groq_uses_openai_compatible_backend() {
        let actual = Client::new(&fixture(ProviderId::Groq).api_key("gsk-test"), 800).unwrap();
        assert!(matches!(actual, Client::OpenAICompat(_)));
        assert_eq!(actual.provider(), "groq");
    }

    #[test]
    fn test_invalid_base_url_is_rejected() {
        let fixture = fixture(ProviderId::Ollama).base_url("::not a url::");
        let actual = Client::new(&fixture, 800);
        assert!(matches!(actual, Err(Error::Config(_))));
    }
}
