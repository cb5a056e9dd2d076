use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: ConversationRole,
    pub content: String,
}

/// A bounded, ordered ring buffer of recent turns. Lifetime is
/// process-local; nothing here is persisted to a table (§3 Conversation).
#[derive(Debug, Clone)]
pub struct Conversation {
    pub id: Uuid,
    capacity: usize,
    messages: VecDeque<Message>,
}

impl Conversation {
    pub fn new(capacity: usize) -> Self {
        Self {
            id: Uuid::new_v4(),
            capacity: capacity.max(1),
            messages: VecDeque::new(),
        }
    }

    pub fn append(&mut self, role: ConversationRole, content: impl Into<String>) {
        if self.messages.len() >= self.capacity {
            self.messages.pop_front();
        }
        self.messages.push_back(Message {
            role,
            content: content.into(),
        });
    }

    /// The last `n` messages, oldest first.
    pub fn recent(&self, n: usize) -> Vec<Message> {
        let skip = self.messages.len().saturating_sub(n);
        self.messages.iter().skip(skip).cloned().collect()
    }
}

/// In-memory store of conversations, keyed by id, each guarded by its own
/// lock so parallel turns on different conversations don't contend and
/// append order within one conversation is preserved (§5 shared resources).
#[derive(Clone, Default)]
pub struct ConversationStore {
    conversations: Arc<Mutex<HashMap<Uuid, Arc<Mutex<Conversation>>>>>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get_or_create(&self, id: Option<Uuid>, history_capacity: usize) -> Arc<Mutex<Conversation>> {
        let mut guard = self.conversations.lock().await;
        let id = id.unwrap_or_else(Uuid::new_v4);
        guard
            .entry(id)
            .or_insert_with(|| Arc::new(Mutex::new(Conversation::new(history_capacity))))
            .clone()
    }
}
