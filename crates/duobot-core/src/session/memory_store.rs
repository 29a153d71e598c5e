use chrono::{DateTime, Utc};
use std::collections::HashMap;

use crate::types::Message;

use super::store::ConversationStore;
use super::Conversation;

/// Process-local conversation store. Nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryConversationStore {
    conversations: HashMap<String, Conversation>,
}

impl MemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ConversationStore for MemoryConversationStore {
    fn get_or_create(&mut self, user_id: &str, now: DateTime<Utc>) -> &mut Conversation {
        let conv = self
            .conversations
            .entry(user_id.to_string())
            .or_insert_with(|| Conversation::new(user_id, now));
        conv.touch(now);
        conv
    }

    fn append(&mut self, user_id: &str, message: Message) {
        self.conversations
            .entry(user_id.to_string())
            .or_insert_with(|| Conversation::new(user_id, Utc::now()))
            .push(message);
    }

    fn sweep(&mut self, now: DateTime<Utc>, ttl: chrono::Duration) -> usize {
        let before = self.conversations.len();
        self.conversations.retain(|_, conv| !conv.is_expired(now, ttl));
        before - self.conversations.len()
    }

    fn get(&self, user_id: &str) -> Option<&Conversation> {
        self.conversations.get(user_id)
    }

    fn len(&self) -> usize {
        self.conversations.len()
    }
}
