use async_trait::async_trait;
use futures::stream::BoxStream;
use serde_json::Value;
use thiserror::Error;

use geochat_core::domain::message::Message;

/// Incremental text deltas from a streaming completion.
pub type TextStream = BoxStream<'static, Result<String, LlmError>>;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("language model returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("language model transport error: {0}")]
    Transport(String),
    #[error("could not decode language model response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for LlmError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_decode() {
            Self::Decode(error.to_string())
        } else {
            Self::Transport(error.to_string())
        }
    }
}

/// A completion constrained to a JSON schema.
#[derive(Clone, Debug)]
pub struct StructuredRequest {
    pub model: String,
    pub system: String,
    pub messages: Vec<Message>,
    pub schema_name: String,
    pub schema: Value,
}

#[derive(Clone, Debug)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub temperature: f32,
    pub max_tokens: u32,
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete_structured(&self, request: StructuredRequest) -> Result<Value, LlmError>;

    /// Resolves once the upstream accepted the request; deltas follow on the stream.
    async fn stream_chat(&self, request: ChatRequest) -> Result<TextStream, LlmError>;
}
