//! Conversation list for the history sidebar.

use crate::error::SessionError;
use crate::events::{EventSink, Notice, SessionEvent};
use crate::store::ConversationStore;
use crate::types::{Conversation, OwnerId};
use log::{debug, warn};
use parking_lot::RwLock;
use std::sync::Arc;

/// An owner's conversations, most recently updated first.
pub struct ConversationHistory {
    owner: OwnerId,
    store: Arc<dyn ConversationStore>,
    events: Arc<dyn EventSink>,
    conversations: RwLock<Vec<Conversation>>,
}

impl ConversationHistory {
    pub fn new(
        owner: OwnerId,
        store: Arc<dyn ConversationStore>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            owner,
            store,
            events,
            conversations: RwLock::new(Vec::new()),
        }
    }

    pub fn conversations(&self) -> Vec<Conversation> {
        self.conversations.read().clone()
    }

    /// Fetch the list; on failure the list is emptied.
    pub async fn load(&self) -> Result<Vec<Conversation>, SessionError> {
        match self.store.list_conversations(&self.owner).await {
            Ok(conversations) => {
                debug!(
                    "loaded conversations (owner={}, count={})",
                    self.owner,
                    conversations.len()
                );
                *self.conversations.write() = conversations.clone();
                self.events.emit(SessionEvent::ConversationsChanged {
                    count: conversations.len(),
                });
                Ok(conversations)
            }
            Err(err) => {
                warn!("failed to load conversations (owner={}, error={})", self.owner, err);
                self.conversations.write().clear();
                self.events
                    .emit(SessionEvent::ConversationsChanged { count: 0 });
                self.events.emit(SessionEvent::Notice(Notice::error(
                    "load conversations",
                    err.to_string(),
                )));
                Err(err.into())
            }
        }
    }

    /// Delete a conversation and its messages; the list changes only after
    /// the store confirms.
    pub async fn delete(&self, conversation_id: &str) -> Result<(), SessionError> {
        if let Err(err) = self.store.delete_conversation(conversation_id).await {
            warn!(
                "failed to delete conversation (conversation_id={}, error={})",
                conversation_id, err
            );
            self.events.emit(SessionEvent::Notice(Notice::error(
                "delete conversation",
                err.to_string(),
            )));
            return Err(err.into());
        }
        let count = {
            let mut conversations = self.conversations.write();
            conversations.retain(|conversation| conversation.id != conversation_id);
            conversations.len()
        };
        self.events.emit(SessionEvent::ConversationsChanged { count });
        self.events.emit(SessionEvent::Notice(Notice::info(
            "delete conversation",
            "conversation deleted",
        )));
        Ok(())
    }
}
