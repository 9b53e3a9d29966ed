use chatlens_domain::{Analysis, AnnotationFailure, Conversation};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::client::Settings;
use crate::failure::{post_json, url};
use crate::{SYSTEM_PROMPT, parse_analysis, user_prompt};

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    stream: bool,
    format: &'static str,
    options: Options,
}

#[derive(Debug, Serialize)]
struct Options {
    temperature: f32,
    num_predict: u32,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: Option<ChatMessage>,
    #[serde(default)]
    error: Option<String>,
}

/// Backend for a local Ollama server.
#[derive(Clone)]
pub struct Ollama {
    settings: Settings,
}

impl Ollama {
    pub(crate) fn new(settings: Settings) -> Self {
        Self { settings }
    }

    pub async fn analyze(&self, conversation: &Conversation) -> Result<Analysis, AnnotationFailure> {
        let url = url(&self.settings.base_url, "api/chat")?;
        let body = ChatRequest {
            model: &self.settings.model,
            messages: vec![
                ChatMessage { role: "system".into(), content: SYSTEM_PROMPT.into() },
                ChatMessage {
                    role: "user".into(),
                    content: user_prompt(conversation, self.settings.char_budget),
                },
            ],
            stream: false,
            format: "json",
            options: Options {
                temperature: self.settings.temperature,
                num_predict: self.settings.max_tokens,
            },
        };
        debug!(url = %url, dialogue_id = %conversation.dialogue_id, "Requesting analysis from Ollama");

        let response: ChatResponse = post_json(self.settings.http.post(url), &body).await?;
        if let Some(error) = response.error {
            return Err(AnnotationFailure::other(error));
        }
        let content = response
            .message
            .map(|message| message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| AnnotationFailure::other("Ollama reply has no message content"))?;

        parse_analysis(&content)
    }

    pub fn model(&self) -> &str {
        &self.settings.model
    }
}
