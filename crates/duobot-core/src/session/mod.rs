pub mod store;
pub mod memory_store;
pub mod locks;

use chrono::{DateTime, Utc};
use std::collections::VecDeque;

use crate::config::MAX_HISTORY;
use crate::types::Message;

pub use locks::UserLocks;
pub use memory_store::MemoryConversationStore;
pub use store::{shared, ConversationStore, SharedConversationStore};

/// Conversation window for a single user.
#[derive(Debug, Clone)]
pub struct Conversation {
    pub user_id: String,
    history: VecDeque<Message>,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

impl Conversation {
    pub fn new(user_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            user_id: user_id.into(),
            history: VecDeque::with_capacity(MAX_HISTORY + 1),
            created_at: now,
            last_activity: now,
        }
    }

    /// Append a message, dropping the oldest entries beyond `MAX_HISTORY`.
    pub fn push(&mut self, message: Message) {
        self.history.push_back(message);
        while self.history.len() > MAX_HISTORY {
            self.history.pop_front();
        }
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_activity = now;
    }

    /// Messages in insertion order, oldest first.
    pub fn history(&self) -> impl ExactSizeIterator<Item = &Message> {
        self.history.iter()
    }

    /// Owned copy of the window for handing to a backend.
    pub fn snapshot(&self) -> Vec<Message> {
        self.history.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    /// True when the conversation has been idle for longer than `ttl`.
    pub fn is_expired(&self, now: DateTime<Utc>, ttl: chrono::Duration) -> bool {
        now - self.last_activity > ttl
    }
}
