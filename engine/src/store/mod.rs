//! Conversation store
//!
//! Process-wide map from conversation id to conversation state, shared by
//! every connection and REST handler. Each conversation sits behind its own
//! async mutex: whoever mutates a conversation (a chat turn, a manual goal
//! edit, a reset) holds that mutex for the whole operation, so two
//! connections driving the same id take turns instead of interleaving.

use sdk::{Conversation, PipelineSettings};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

/// Shared handle to one conversation
pub type ConversationHandle = Arc<Mutex<Conversation>>;

#[derive(Clone, Default)]
pub struct ConversationStore {
    conversations: Arc<RwLock<HashMap<String, ConversationHandle>>>,
    default_settings: PipelineSettings,
}

impl ConversationStore {
    /// Create an empty store; new conversations start with `default_settings`
    pub fn new(default_settings: PipelineSettings) -> Self {
        Self {
            conversations: Arc::new(RwLock::new(HashMap::new())),
            default_settings,
        }
    }

    /// Get a conversation, creating an empty one on first reference
    pub async fn get_or_create(&self, id: &str) -> ConversationHandle {
        if let Some(existing) = self.get(id).await {
            return existing;
        }

        let mut map = self.conversations.write().await;
        let handle = map.entry(id.to_string()).or_insert_with(|| {
            tracing::debug!(conversation_id = id, "Conversation created");
            Arc::new(Mutex::new(Conversation::with_settings(
                id,
                self.default_settings,
            )))
        });
        Arc::clone(handle)
    }

    /// Get an existing conversation
    pub async fn get(&self, id: &str) -> Option<ConversationHandle> {
        self.conversations.read().await.get(id).map(Arc::clone)
    }

    /// Clear a conversation back to its initial state, creating it if absent.
    ///
    /// Waits for any turn in progress on the conversation to finish.
    pub async fn reset(&self, id: &str) -> ConversationHandle {
        let handle = self.get_or_create(id).await;
        {
            let mut conversation = handle.lock().await;
            *conversation = Conversation::with_settings(id, self.default_settings);
        }
        tracing::info!(conversation_id = id, "Conversation reset");
        handle
    }

    /// All known conversation ids, sorted
    pub async fn list_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.conversations.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// A point-in-time copy of a conversation
    pub async fn snapshot(&self, id: &str) -> Option<Conversation> {
        let handle = self.get(id).await?;
        let conversation = handle.lock().await;
        Some(conversation.clone())
    }

    pub fn default_settings(&self) -> PipelineSettings {
        self.default_settings
    }
}
