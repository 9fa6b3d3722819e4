//! Remote chat-completion client.
//!
//! [`ChatModel`] is the seam between the conversation engine and the hosted
//! model. [`OpenAIChat`] speaks the OpenAI chat completions protocol, so any
//! compatible endpoint works by changing `chat.base_url`.
//!
//! A call is made exactly once: there is no retry, and unless
//! `chat.timeout_secs` is set there is no timeout either.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::ChatConfig;
use crate::error::{DocChatError, Result};
use crate::models::Usage;

/// One message of a chat-completion request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PromptMessage {
    pub role: &'static str,
    pub content: String,
}

impl PromptMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system",
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user",
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant",
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChatCompletion {
    pub content: String,
    pub usage: Option<Usage>,
}

#[async_trait]
pub trait ChatModel: Send + Sync {
    fn model_name(&self) -> &str;

    /// Send `messages` and return the model's reply.
    async fn complete(&self, credential: &str, messages: &[PromptMessage]) -> Result<ChatCompletion>;
}

pub struct OpenAIChat {
    client: reqwest::Client,
    base_url: String,
    model: String,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [PromptMessage],
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<ResponseUsage>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ResponseUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
    #[serde(default)]
    total_tokens: u64,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: Option<serde_json::Value>,
}

impl OpenAIChat {
    pub fn new(config: &ChatConfig) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(secs) = config.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let client = builder
            .build()
            .with_context(|| "Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            temperature: config.temperature,
        })
    }
}

#[async_trait]
impl ChatModel for OpenAIChat {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, credential: &str, messages: &[PromptMessage]) -> Result<ChatCompletion> {
        let request = ChatRequest {
            model: &self.model,
            messages,
            temperature: self.temperature,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(credential)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DocChatError::Remote {
                status: status.as_u16(),
                message: remote_error_message(&body),
            });
        }

        let parsed: ChatResponse = response.json().await?;
        completion_from_response(parsed, status.as_u16())
    }
}

fn remote_error_message(body: &str) -> String {
    serde_json::from_str::<ErrorResponse>(body)
        .ok()
        .and_then(|e| e.error)
        .map(|e| match e.get("message").and_then(|m| m.as_str()) {
            Some(message) => message.to_string(),
            None => e.to_string(),
        })
        .unwrap_or_else(|| body.to_string())
}

fn completion_from_response(parsed: ChatResponse, status: u16) -> Result<ChatCompletion> {
    let content = parsed
        .choices
        .into_iter()
        .filter_map(|c| c.message.content)
        .collect::<Vec<_>>()
        .join("");

    if content.is_empty() {
        return Err(DocChatError::Remote {
            status,
            message: "chat service returned an empty response".to_string(),
        });
    }

    Ok(ChatCompletion {
        content,
        usage: parsed.usage.map(|u| Usage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        }),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openai_error_message_is_unwrapped() {
        let body = r#"{"error":{"message":"Incorrect API key provided","type":"invalid_request_error"}}"#;
        assert_eq!(remote_error_message(body), "Incorrect API key provided");
        assert_eq!(remote_error_message("gateway down"), "gateway down");
    }

    #[test]
    fn response_content_and_usage_are_read() {
        let parsed: ChatResponse = serde_json::from_str(
            r#"{"choices":[{"message":{"role":"assistant","content":"42"}}],
                "usage":{"prompt_tokens":10,"completion_tokens":1,"total_tokens":11}}"#,
        )
        .unwrap();
        let completion = completion_from_response(parsed, 200).unwrap();
        assert_eq!(completion.content, "42");
        assert_eq!(completion.usage.unwrap().total_tokens, 11);
    }

    #[test]
    fn empty_choices_are_a_remote_error() {
        let parsed: ChatResponse = serde_json::from_str(r#"{"choices":[]}"#).unwrap();
        let err = completion_from_response(parsed, 200).unwrap_err();
        assert!(matches!(err, DocChatError::Remote { .. }));
    }

    #[test]
    fn request_serializes_messages() {
        let messages = vec![PromptMessage::system("ctx"), PromptMessage::user("hi")];
        let request = ChatRequest {
            model: "gpt-3.5-turbo-16k",
            messages: &messages,
            temperature: 0.0,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["messages"][1]["role"], "user");
        assert_eq!(json["model"], "gpt-3.5-turbo-16k");
    }
}
