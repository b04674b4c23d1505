//! The vision-language model collaborator.
//!
//! The loop only ever sees [`VisionModel`]: conversation + image in, text out.
//! [`OpenAiModel`] speaks the OpenAI-compatible chat completions protocol,
//! which most hosted and self-hosted VLM servers expose.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::config::ModelConfig;
use crate::error::InferenceError;
use crate::types::Screenshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentPart {
    Text(String),
    /// Where the screenshot passed to [`VisionModel::infer`] goes.
    Image,
}

/// A message in the conversation sent to the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: Vec<ContentPart>,
}

impl ChatMessage {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: vec![ContentPart::Text(text.into())],
        }
    }

    pub fn user(content: Vec<ContentPart>) -> Self {
        Self {
            role: Role::User,
            content,
        }
    }

    /// Concatenated text parts, images skipped.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|part| match part {
                ContentPart::Text(text) => Some(text.as_str()),
                ContentPart::Image => None,
            })
            .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Conversation {
    pub messages: Vec<ChatMessage>,
}

impl Conversation {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self { messages }
    }

    /// All text of the conversation, for logging and tests.
    pub fn text(&self) -> String {
        self.messages
            .iter()
            .map(ChatMessage::text)
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn image_count(&self) -> usize {
        self.messages
            .iter()
            .flat_map(|m| &m.content)
            .filter(|part| matches!(part, ContentPart::Image))
            .count()
    }
}

/// Stateless per call; may be shared by several agents.
#[async_trait]
pub trait VisionModel: Send + Sync {
    async fn infer(
        &self,
        conversation: &Conversation,
        image: &Screenshot,
        max_tokens: u32,
    ) -> Result<String, InferenceError>;
}

pub struct OpenAiModel {
    client: Client,
    config: ModelConfig,
}

impl OpenAiModel {
    pub fn new(config: ModelConfig) -> Result<Self, InferenceError> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }

    /// Build the chat completions request body.
    pub fn request_body(
        &self,
        conversation: &Conversation,
        image: &Screenshot,
        max_tokens: u32,
    ) -> Value {
        let messages: Vec<Value> = conversation
            .messages
            .iter()
            .map(|message| message_json(message, image))
            .collect();

        json!({
            "model": self.config.model,
            "messages": messages,
            "temperature": self.config.temperature,
            "max_tokens": max_tokens,
        })
    }
}

fn message_json(message: &ChatMessage, image: &Screenshot) -> Value {
    // Plain string content for text-only turns keeps strict servers happy.
    if let [ContentPart::Text(text)] = message.content.as_slice() {
        return json!({"role": message.role.as_str(), "content": text});
    }

    let parts: Vec<Value> = message
        .content
        .iter()
        .map(|part| match part {
            ContentPart::Text(text) => json!({"type": "text", "text": text}),
            ContentPart::Image => json!({
                "type": "image_url",
                "image_url": {"url": image.data_url()}
            }),
        })
        .collect();

    json!({"role": message.role.as_str(), "content": parts})
}

#[async_trait]
impl VisionModel for OpenAiModel {
    async fn infer(
        &self,
        conversation: &Conversation,
        image: &Screenshot,
        max_tokens: u32,
    ) -> Result<String, InferenceError> {
        let body = self.request_body(conversation, image, max_tokens);

        let mut request = self.client.post(&self.config.endpoint).json(&body);
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();
        let json_resp: Value = response.json().await?;

        if !status.is_success() {
            let message = json_resp["error"]["message"]
                .as_str()
                .unwrap_or("Unknown API error")
                .to_string();
            warn!(status = status.as_u16(), %message, "model API error");
            return Err(InferenceError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let content = json_resp["choices"][0]["message"]["content"]
            .as_str()
            .map(str::trim)
            .filter(|content| !content.is_empty())
            .ok_or(InferenceError::EmptyResponse)?;

        debug!(%content, "model replied");
        Ok(content.to_string())
    }
}
