//! In-process store serving every entity family.

use super::{ConversationStore, EnhancementStore, MessageStore, StoreError, StoreResult};
use crate::types::{
    Conversation, DEFAULT_CONVERSATION_TITLE, Enhancement, Message, MessageId, NewEnhancement,
    OwnerId, Role,
};
use async_trait::async_trait;
use chrono::Utc;
use log::{debug, info};
use parking_lot::RwLock;
use std::collections::HashMap;
use uuid::Uuid;

/// Rows held by the memory store. Vectors keep insertion order.
#[derive(Default)]
struct Tables {
    conversations: Vec<Conversation>,
    messages: HashMap<String, Vec<Message>>,
    enhancements: Vec<Enhancement>,
}

/// Store that keeps all rows in memory behind a lock.
///
/// Lists follow the same ordering contract as the durable store: ties on
/// timestamps fall back to insertion order (oldest first for ascending
/// lists, newest first for descending lists).
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        info!("initialized memory store");
        Self::default()
    }

    fn new_id() -> String {
        Uuid::new_v4().to_string()
    }
}

#[async_trait]
impl ConversationStore for MemoryStore {
    async fn create_conversation(&self, owner: &OwnerId) -> StoreResult<Conversation> {
        let now = Utc::now();
        let conversation = Conversation {
            id: Self::new_id(),
            owner_id: owner.clone(),
            title: DEFAULT_CONVERSATION_TITLE.to_string(),
            summary: None,
            tags: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        debug!(
            "created conversation (conversation_id={}, owner={})",
            conversation.id, owner
        );
        let mut tables = self.tables.write();
        tables.messages.insert(conversation.id.clone(), Vec::new());
        tables.conversations.push(conversation.clone());
        Ok(conversation)
    }

    async fn list_conversations(&self, owner: &OwnerId) -> StoreResult<Vec<Conversation>> {
        let tables = self.tables.read();
        let mut conversations: Vec<Conversation> = tables
            .conversations
            .iter()
            .rev()
            .filter(|conversation| &conversation.owner_id == owner)
            .cloned()
            .collect();
        conversations.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(conversations)
    }

    async fn delete_conversation(&self, conversation_id: &str) -> StoreResult<()> {
        let mut tables = self.tables.write();
        let before = tables.conversations.len();
        tables
            .conversations
            .retain(|conversation| conversation.id != conversation_id);
        if tables.conversations.len() == before {
            return Err(StoreError::NotFound {
                entity: "conversation",
                id: conversation_id.to_string(),
            });
        }
        let removed = tables
            .messages
            .remove(conversation_id)
            .map(|messages| messages.len())
            .unwrap_or(0);
        info!(
            "deleted conversation (conversation_id={}, messages={})",
            conversation_id, removed
        );
        Ok(())
    }
}

#[async_trait]
impl MessageStore for MemoryStore {
    async fn list_messages(&self, conversation_id: &str) -> StoreResult<Vec<Message>> {
        let tables = self.tables.read();
        let mut messages = tables
            .messages
            .get(conversation_id)
            .cloned()
            .unwrap_or_default();
        messages.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(messages)
    }

    async fn append_message(
        &self,
        conversation_id: &str,
        role: Role,
        content: &str,
    ) -> StoreResult<()> {
        let mut tables = self.tables.write();
        let now = Utc::now();
        let conversation = tables
            .conversations
            .iter_mut()
            .find(|conversation| conversation.id == conversation_id)
            .ok_or_else(|| StoreError::NotFound {
                entity: "conversation",
                id: conversation_id.to_string(),
            })?;
        conversation.updated_at = now;
        let message = Message {
            id: MessageId::Settled(Self::new_id()),
            conversation_id: conversation_id.to_string(),
            role,
            content: content.to_string(),
            created_at: now,
        };
        debug!(
            "appended message (conversation_id={}, role={}, content_len={})",
            conversation_id,
            role,
            content.len()
        );
        tables
            .messages
            .entry(conversation_id.to_string())
            .or_default()
            .push(message);
        Ok(())
    }
}

#[async_trait]
impl EnhancementStore for MemoryStore {
    async fn list_enhancements(&self, owner: &OwnerId) -> StoreResult<Vec<Enhancement>> {
        let tables = self.tables.read();
        let mut enhancements: Vec<Enhancement> = tables
            .enhancements
            .iter()
            .rev()
            .filter(|enhancement| &enhancement.owner_id == owner)
            .cloned()
            .collect();
        enhancements.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(enhancements)
    }

    async fn create_enhancement(
        &self,
        owner: &OwnerId,
        input: NewEnhancement,
    ) -> StoreResult<Enhancement> {
        let enhancement = Enhancement {
            id: Self::new_id(),
            owner_id: owner.clone(),
            original_prompt: input.original_prompt,
            enhanced_prompt: input.enhanced_prompt,
            provider: input.provider,
            created_at: Utc::now(),
        };
        self.tables.write().enhancements.push(enhancement.clone());
        Ok(enhancement)
    }

    async fn delete_enhancement(&self, enhancement_id: &str, owner: &OwnerId) -> StoreResult<()> {
        let mut tables = self.tables.write();
        let before = tables.enhancements.len();
        tables.enhancements.retain(|enhancement| {
            !(enhancement.id == enhancement_id && &enhancement.owner_id == owner)
        });
        if tables.enhancements.len() == before {
            return Err(StoreError::NotFound {
                entity: "enhancement",
                id: enhancement_id.to_string(),
            });
        }
        Ok(())
    }
}
