use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use crate::config::CHANNEL_PREFIX;
use crate::error::{InboundError, ProviderError};
use crate::provider::Providers;
use crate::routing::{self, Backend};
use crate::session::{SharedConversationStore, UserLocks};
use crate::types::Message;
use crate::util::truncate_string;

pub const CHAT_ERROR_REPLY: &str = "Erro ao processar com ChatGPT.";
pub const PREDICT_ERROR_REPLY: &str = "Erro ao processar com Gemini.";
pub const PREDICT_EMPTY_REPLY: &str = "Não consegui gerar uma resposta com Gemini.";

/// The text sent to the user when a backend fails.
pub fn fallback_reply(backend: Backend, err: &ProviderError) -> &'static str {
    match (backend, err) {
        (Backend::Predict, ProviderError::EmptyResponse) => PREDICT_EMPTY_REPLY,
        (Backend::Predict, _) => PREDICT_ERROR_REPLY,
        (Backend::Chat, _) => CHAT_ERROR_REPLY,
    }
}

/// Strip the channel prefix from a sender address.
///
/// Returns `None` for senders on other channels and for a bare prefix.
pub fn user_id_from_sender(from: &str) -> Option<&str> {
    from.strip_prefix(CHANNEL_PREFIX).filter(|id| !id.is_empty())
}

/// Outcome of a handled inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayReply {
    pub user_id: String,
    pub backend: Backend,
    pub text: String,
    /// True when `text` is a fallback because the backend failed.
    pub fallback: bool,
}

/// Drives one inbound message through the store, the routing policy and a
/// backend, and records the exchange.
pub struct ConversationRelay {
    store: SharedConversationStore,
    locks: Arc<UserLocks>,
    providers: Providers,
    backend_timeout: Duration,
}

impl ConversationRelay {
    pub fn new(
        store: SharedConversationStore,
        locks: Arc<UserLocks>,
        providers: Providers,
        backend_timeout: Duration,
    ) -> Self {
        Self {
            store,
            locks,
            providers,
            backend_timeout,
        }
    }

    pub fn store(&self) -> &SharedConversationStore {
        &self.store
    }

    pub fn locks(&self) -> &Arc<UserLocks> {
        &self.locks
    }

    /// Handle a message `body` from sender address `from`.
    ///
    /// Only a sender outside the channel is an error, and in that case the
    /// store is not touched. Backend failures become fallback replies.
    pub async fn handle(&self, from: &str, body: &str) -> Result<RelayReply, InboundError> {
        let user_id = user_id_from_sender(from)
            .ok_or_else(|| InboundError::InvalidSource(from.to_string()))?;

        // Held until the assistant turn is stored.
        let _guard = self.locks.acquire(user_id).await;

        let history = {
            let mut store = self.store.lock().await;
            store.get_or_create(user_id, Utc::now());
            store.append(user_id, Message::user(body));
            store
                .get(user_id)
                .map(|conv| conv.snapshot())
                .unwrap_or_default()
        };

        let backend = routing::decide(body);
        let provider = self.providers.get(backend);
        info!(
            "Message from {} routed to {} ({}): {}",
            user_id,
            backend,
            provider.name(),
            truncate_string(body, 80, "...")
        );

        let result = match tokio::time::timeout(self.backend_timeout, provider.generate(&history)).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Timeout(self.backend_timeout.as_secs())),
        };

        let (text, fallback) = match result {
            Ok(text) => (text, false),
            Err(e) => {
                error!("{} backend failed for {}: {}", provider.name(), user_id, e);
                (fallback_reply(backend, &e).to_string(), true)
            }
        };

        self.store
            .lock()
            .await
            .append(user_id, Message::assistant(text.as_str()));

        Ok(RelayReply {
            user_id: user_id.to_string(),
            backend,
            text,
            fallback,
        })
    }
}
