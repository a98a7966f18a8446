//! Completion service access
//!
//! Turns a prompt window into a single generated reply. The wire client is
//! behind [`CompletionBackend`] so the orchestrator can be driven by a
//! scripted backend in tests.

mod gateway;
mod openai;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::Result;
use crate::conversation::{Message, Role};

pub use gateway::{CompletionGateway, SamplingParams};
pub use openai::{DEFAULT_API_BASE, OpenAiCompatClient};

/// One entry of the request message list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl From<&Message> for ChatMessage {
    fn from(message: &Message) -> Self {
        Self {
            role: message.role(),
            content: message.rendered(),
        }
    }
}

/// Request sent to the completion service
#[derive(Debug, Clone, Serialize)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
    pub temperature: f32,
    /// Opaque end-user tag
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
}

/// Remote completion service
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Generate the text of the first choice
    ///
    /// # Errors
    ///
    /// Returns `Error::Upstream` (or a transport error) when the service is
    /// unreachable, rejects the request, or answers with something unusable
    async fn complete(&self, request: &CompletionRequest) -> Result<String>;
}
