//! Chat completion clients

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::conversation::Message;
use crate::{Error, Result};

/// Default chat completions base URL
pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Reply substituted for the completion API when the debug bypass is active
pub const DEBUG_PLACEHOLDER: &str = "測試";

/// Generates an assistant reply for a prompt
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Request a completion for `messages` using `credential`
    ///
    /// # Errors
    ///
    /// Returns error on any transport, auth or API failure
    async fn complete(&self, messages: &[Message], credential: &str) -> Result<String>;
}

/// `OpenAI`-compatible chat completions client
pub struct OpenAiCompletion {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl OpenAiCompletion {
    /// Create a client for `model` against the public `OpenAI` API
    #[must_use]
    pub fn new(model: impl Into<String>) -> Self {
        Self::with_base_url(OPENAI_BASE_URL, model)
    }

    /// Create a client against an `OpenAI`-compatible endpoint
    #[must_use]
    pub fn with_base_url(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
        }
    }

    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl CompletionClient for OpenAiCompletion {
    async fn complete(&self, messages: &[Message], credential: &str) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            messages: messages
                .iter()
                .map(|m| WireMessage {
                    role: m.role().as_str(),
                    content: m.content(),
                    name: m.name(),
                })
                .collect(),
        };

        tracing::debug!(
            model = %self.model,
            messages = messages.len(),
            "requesting chat completion"
        );

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(credential)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Completion(format!("API error {status}: {body}")));
        }

        let body: ChatResponse = response.json().await?;
        let reply = body
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| Error::Completion("response contained no choices".to_string()))?;

        tracing::debug!(chars = reply.chars().count(), "completion received");

        Ok(reply)
    }
}

/// Answers every prompt with a fixed reply without calling out
#[derive(Debug, Clone)]
pub struct PlaceholderCompletion {
    reply: String,
}

impl PlaceholderCompletion {
    #[must_use]
    pub fn new(reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
        }
    }
}

impl Default for PlaceholderCompletion {
    fn default() -> Self {
        Self::new(DEBUG_PLACEHOLDER)
    }
}

#[async_trait]
impl CompletionClient for PlaceholderCompletion {
    async fn complete(&self, messages: &[Message], _credential: &str) -> Result<String> {
        tracing::debug!(messages = messages.len(), "debug bypass, returning placeholder");
        Ok(self.reply.clone())
    }
}
