use derive_setters::Setters;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString};
use url::Url;

use crate::{Error, Result};

/// Oracle backends the pipeline can talk to.
#[derive(
    Debug,
    Copy,
    Clone,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumIter,
    EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum ProviderId {
    #[serde(rename = "openai")]
    #[strum(serialize = "openai")]
    OpenAI,
    Groq,
    Ollama,
}

impl ProviderId {
    pub fn default_base_url(&self) -> &'static str {
        match self {
            ProviderId::OpenAI => "https://api.openai.com/v1/",
            ProviderId::Groq => "https://api.groq.com/openai/v1/",
            ProviderId::Ollama => "http://localhost:11434/",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            ProviderId::OpenAI => "gpt-4o-mini",
            ProviderId::Groq => "llama3-8b-8192",
            ProviderId::Ollama => "llama3.1:8b",
        }
    }

    /// Conventional environment variable holding the API key.
    pub fn api_key_env(&self) -> Option<&'static str> {
        match self {
            ProviderId::OpenAI => Some("OPENAI_API_KEY"),
            ProviderId::Groq => Some("GROQ_API_KEY"),
            ProviderId::Ollama => None,
        }
    }

    pub fn requires_api_key(&self) -> bool {
        self.api_key_env().is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Setters)]
#[setters(into)]
pub struct ProviderConfig {
    pub id: ProviderId,
    pub model: String,
    #[serde(default)]
    #[setters(strip_option)]
    pub base_url: Option<String>,
    #[serde(default, skip_serializing)]
    #[setters(strip_option)]
    pub api_key: Option<String>,
    pub timeout_secs: u64,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl ProviderConfig {
    /// Configured base URL, or the provider's well-known endpoint.
    pub fn endpoint(&self) -> Result<Url> {
        let raw = self.base_url.as_deref().unwrap_or(self.id.default_base_url());
        // Relative joins drop the last path segment without a trailing slash.
        let normalised = if raw.ends_with('/') { raw.to_string() } else { format!("{raw}/") };
        Url::parse(&normalised).map_err(|source| Error::InvalidUrl { url: raw.to_string(), source })
    }

    /// Configured key, falling back to the provider's conventional variable.
    pub fn resolve_api_key(&self) -> Option<String> {
        self.resolve_api_key_with(|name| std::env::var(name).ok())
    }

    pub fn resolve_api_key_with(&self, lookup: impl Fn(&str) -> Option<String>) -> Option<String> {
        let present = |key: &String| !key.trim().is_empty();
        self.api_key
            .clone()
            .filter(present)
            .or_else(|| self.id.api_key_env().and_then(lookup).filter(present))
    }
}
