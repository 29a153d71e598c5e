pub mod openai;
pub mod vertex;
pub mod google_auth;

use std::sync::Arc;
use async_trait::async_trait;

use crate::error::ProviderError;
use crate::routing::Backend;
use crate::types::Message;

/// A generative backend that turns conversation context into a reply.
///
/// Implementations report every failure as a `ProviderError`; turning that
/// into something the user sees is the caller's job.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Generate a reply. `history` is the conversation window, oldest first,
    /// ending with the message being answered.
    async fn generate(&self, history: &[Message]) -> Result<String, ProviderError>;
}

/// The two configured backends, addressed by routing decision.
#[derive(Clone)]
pub struct Providers {
    chat: Arc<dyn LlmProvider>,
    predict: Arc<dyn LlmProvider>,
}

impl Providers {
    pub fn new(chat: Arc<dyn LlmProvider>, predict: Arc<dyn LlmProvider>) -> Self {
        Self { chat, predict }
    }

    pub fn get(&self, backend: Backend) -> &Arc<dyn LlmProvider> {
        match backend {
            Backend::Chat => &self.chat,
            Backend::Predict => &self.predict,
        }
    }
}

/// Text of the newest message, or empty when there is none.
pub(crate) fn latest_text(history: &[Message]) -> &str {
    history.last().map(|m| m.content.as_str()).unwrap_or("")
}
