//! Prompt window to reply text

use std::sync::Arc;

use crate::conversation::{ConversationKey, ConversationStore, Message};
use crate::{Error, Result};

use super::{ChatMessage, CompletionBackend, CompletionRequest};

/// Fixed sampling parameters sent with every request
#[derive(Debug, Clone)]
pub struct SamplingParams {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            model: "deepseek-chat".to_string(),
            max_tokens: 1000,
            temperature: 0.7,
        }
    }
}

/// Builds prompt windows and asks the backend for a reply
///
/// Never writes to the store and never retries.
pub struct CompletionGateway {
    store: Arc<ConversationStore>,
    backend: Arc<dyn CompletionBackend>,
    params: SamplingParams,
}

impl CompletionGateway {
    #[must_use]
    pub fn new(
        store: Arc<ConversationStore>,
        backend: Arc<dyn CompletionBackend>,
        params: SamplingParams,
    ) -> Self {
        Self {
            store,
            backend,
            params,
        }
    }

    /// Store the window is read from
    #[must_use]
    pub const fn store(&self) -> &Arc<ConversationStore> {
        &self.store
    }

    /// Snapshot the prompt window for `message` without touching history
    #[must_use]
    pub fn window(&self, key: &ConversationKey, message: &Message) -> Vec<Message> {
        self.store.window_for(key, message)
    }

    /// Build the wire request for a window
    #[must_use]
    pub fn request_for(&self, window: &[Message]) -> CompletionRequest {
        CompletionRequest {
            model: self.params.model.clone(),
            messages: window.iter().map(ChatMessage::from).collect(),
            max_tokens: self.params.max_tokens,
            temperature: self.params.temperature,
            user: window.last().and_then(Message::speaker_tag),
        }
    }

    /// Send a prepared window and return the generated text
    ///
    /// # Errors
    ///
    /// Returns `Error::Upstream` if the call fails or the reply is blank
    pub async fn complete(&self, window: &[Message]) -> Result<String> {
        let request = self.request_for(window);
        tracing::debug!(
            model = %request.model,
            messages = request.messages.len(),
            "requesting completion"
        );

        let reply = self.backend.complete(&request).await.map_err(|e| match e {
            Error::Upstream(_) => e,
            other => Error::Upstream(other.to_string()),
        })?;

        let reply = reply.trim();
        if reply.is_empty() {
            return Err(Error::Upstream("empty completion".to_string()));
        }

        Ok(reply.to_string())
    }

    /// Window, then complete, for `message` on `key`
    ///
    /// # Errors
    ///
    /// Returns `Error::Upstream` if the call fails
    pub async fn generate(&self, key: &ConversationKey, message: &Message) -> Result<String> {
        let window = self.window(key, message);
        self.complete(&window).await
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use parking_lot::Mutex;

    use super::*;
    use crate::conversation::{Role, Speaker, SystemPrompts};

    struct Recording {
        reply: Result<String>,
        seen: Mutex<Vec<CompletionRequest>>,
    }

    #[async_trait]
    impl CompletionBackend for Recording {
        async fn complete(&self, request: &CompletionRequest) -> Result<String> {
            self.seen.lock().push(request.clone());
            match &self.reply {
                Ok(text) => Ok(text.clone()),
                Err(e) => Err(Error::Channel(e.to_string())),
            }
        }
    }

    fn gateway(reply: Result<String>) -> (CompletionGateway, Arc<Recording>) {
        let store = Arc::new(ConversationStore::new(5, SystemPrompts::new("S")));
        let backend = Arc::new(Recording {
            reply,
            seen: Mutex::new(Vec::new()),
        });
        let gateway = CompletionGateway::new(store, backend.clone(), SamplingParams::default());
        (gateway, backend)
    }

    #[tokio::test]
    async fn test_generate_sends_window() {
        let (gateway, backend) = gateway(Ok("  hi <@7>  ".to_string()));
        let key = ConversationKey::text(1, None);
        gateway
            .store()
            .append(&key, Message::user(Speaker::Mention(3), "earlier"));

        let reply = gateway
            .generate(&key, &Message::user(Speaker::Mention(7), "hello"))
            .await
            .unwrap();
        assert_eq!(reply, "hi <@7>");

        let seen = backend.seen.lock();
        let request = &seen[0];
        assert_eq!(request.model, "deepseek-chat");
        assert_eq!(request.max_tokens, 1000);
        assert_eq!(request.user.as_deref(), Some("7"));
        assert_eq!(request.messages.len(), 3);
        assert_eq!(request.messages[0].role, Role::System);
        assert_eq!(request.messages[2].content, "User <@7>: hello");
    }

    #[tokio::test]
    async fn test_generate_does_not_touch_store() {
        let (gateway, _) = gateway(Ok("reply".to_string()));
        let key = ConversationKey::voice(4);

        gateway
            .generate(&key, &Message::user(Speaker::Name("a".into()), "x"))
            .await
            .unwrap();
        assert!(gateway.store().is_empty(&key));
    }

    #[tokio::test]
    async fn test_failure_maps_to_upstream() {
        let (gateway, _) = gateway(Err(Error::Channel("boom".to_string())));
        let key = ConversationKey::text(1, None);

        let err = gateway
            .generate(&key, &Message::user(Speaker::Mention(1), "x"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Upstream(_)));
    }

    #[tokio::test]
    async fn test_blank_reply_is_upstream_error() {
        let (gateway, _) = gateway(Ok("   ".to_string()));
        let key = ConversationKey::text(1, None);

        let err = gateway
            .generate(&key, &Message::user(Speaker::Mention(1), "x"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Upstream(_)));
    }
}
