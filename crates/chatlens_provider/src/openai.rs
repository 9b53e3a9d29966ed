use chatlens_config::ProviderId;
use chatlens_domain::{Analysis, AnnotationFailure, Conversation};
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::client::Settings;
use crate::failure::{post_json, url};
use crate::{SYSTEM_PROMPT, parse_analysis, user_prompt};

#[derive(Debug, Serialize)]
struct Request<'a> {
    model: &'a str,
    messages: Vec<Message>,
    temperature: f32,
    max_tokens: u32,
    response_format: ResponseFormat,
}

#[derive(Debug, Serialize, Deserialize)]
struct Message {
    role: String,
    #[serde(default)]
    content: Option<String>,
}

impl Message {
    fn new(role: &str, content: String) -> Self {
        Self { role: role.to_string(), content: Some(content) }
    }
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct Response {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Message,
}

/// Backend for OpenAI-compatible chat completion APIs (OpenAI, Groq).
#[derive(Clone)]
pub struct OpenAICompat {
    provider: ProviderId,
    settings: Settings,
}

impl OpenAICompat {
    pub(crate) fn new(provider: ProviderId, settings: Settings) -> Self {
        Self { provider, settings }
    }

    fn headers(&self) -> Result<HeaderMap, AnnotationFailure> {
        let mut headers = HeaderMap::new();
        if let Some(key) = &self.settings.api_key {
            let value = HeaderValue::from_str(&format!("Bearer {key}"))
                .map_err(|e| AnnotationFailure::other(format!("Invalid API key header: {e}")))?;
            headers.insert(AUTHORIZATION, value);
        }
        Ok(headers)
    }

    pub async fn analyze(&self, conversation: &Conversation) -> Result<Analysis, AnnotationFailure> {
        let url = url(&self.settings.base_url, "chat/completions")?;
        let body = Request {
            model: &self.settings.model,
            messages: vec![
                Message::new("system", SYSTEM_PROMPT.to_string()),
                Message::new("user", user_prompt(conversation, self.settings.char_budget)),
            ],
            temperature: self.settings.temperature,
            max_tokens: self.settings.max_tokens,
            response_format: ResponseFormat { kind: "json_object" },
        };
        debug!(provider = %self.provider, url = %url, dialogue_id = %conversation.dialogue_id, "Requesting analysis");

        let response: Response =
            post_json(self.settings.http.post(url).headers(self.headers()?), &body).await?;

        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| AnnotationFailure::other("Completion has no message content"))?;

        parse_analysis(&content)
    }

    pub fn provider(&self) -> ProviderId {
        self.provider
    }

    pub fn model(&self) -> &str {
        &self.settings.model
    }
}
