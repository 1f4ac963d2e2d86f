use async_trait::async_trait;
use futures::Stream;
use recap_common::Result;
pub use recap_common::ChatRole;
use serde::{Deserialize, Serialize};
use std::pin::Pin;

/// Trait for streaming chat-completion backends.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider identifier (e.g. "openai-compatible").
    fn provider_id(&self) -> &str;

    /// Open a streaming completion.
    ///
    /// Failures before the body starts (connect errors, non-2xx status) are
    /// returned here; failures while reading are yielded by the stream.
    async fn stream_completion(&self, request: &LlmRequest) -> Result<TextStream>;

    /// Check if the provider is reachable and accepts our credentials.
    async fn health_check(&self) -> Result<bool>;
}

/// Ordered text fragments from one completion. Ends after the provider's
/// terminator, or with an error item.
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f64>,
}

impl LlmRequest {
    /// A single user turn carrying the whole composed prompt.
    pub fn single_turn(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            messages: vec![ChatMessage {
                role: ChatRole::User,
                content: prompt.into(),
            }],
            max_tokens: None,
            temperature: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}
