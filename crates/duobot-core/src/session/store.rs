use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::session::Conversation;
use crate::types::Message;

/// Trait for conversation storage backends.
///
/// Callers share a store behind a single async mutex; the handler and the
/// sweeper both mutate it only while holding that lock.
pub trait ConversationStore: Send + Sync {
    /// Get an existing conversation or create an empty one. Always marks the
    /// conversation as active at `now`.
    fn get_or_create(&mut self, user_id: &str, now: DateTime<Utc>) -> &mut Conversation;

    /// Append a message to a user's history, keeping only the newest
    /// `MAX_HISTORY` entries. Recreates the conversation if it is gone.
    fn append(&mut self, user_id: &str, message: Message);

    /// Remove every conversation idle for longer than `ttl`. Returns how many
    /// were removed.
    fn sweep(&mut self, now: DateTime<Utc>, ttl: chrono::Duration) -> usize;

    fn get(&self, user_id: &str) -> Option<&Conversation>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The store as shared between the webhook handler and the sweeper.
pub type SharedConversationStore = Arc<Mutex<Box<dyn ConversationStore>>>;

/// Wrap a store for sharing.
pub fn shared(store: impl ConversationStore + 'static) -> SharedConversationStore {
    Arc::new(Mutex::new(Box::new(store)))
}
