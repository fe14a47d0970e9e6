//! Persistence gateway: uniform async access to conversations, messages and
//! enhancements, independent of which backend holds them.

mod local;
mod memory;

pub use local::{EnhancementCache, LocalEnhancementStore, MemoryEnhancementCache};
pub use memory::MemoryStore;

use crate::types::{Conversation, Enhancement, Message, NewEnhancement, OwnerId, Role};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Errors returned by a backing store. Every variant renders a human-readable cause.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The addressed row does not exist (or is not visible to the owner).
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },
    /// The request never produced a response.
    #[error("request failed: {0}")]
    Request(String),
    /// The store answered with an error.
    #[error("store rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },
    /// The store answered with data the client could not interpret.
    #[error("unexpected store response: {0}")]
    Decode(String),
    /// Local cache IO failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// Local cache serialization failure.
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Conversation headers owned by a user.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Create an empty conversation for `owner`.
    async fn create_conversation(&self, owner: &OwnerId) -> StoreResult<Conversation>;

    /// List the owner's conversations, most recently updated first.
    async fn list_conversations(&self, owner: &OwnerId) -> StoreResult<Vec<Conversation>>;

    /// Delete a conversation and, at the store, all of its messages.
    async fn delete_conversation(&self, conversation_id: &str) -> StoreResult<()>;
}

/// Messages of a conversation.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// List settled messages, oldest first.
    async fn list_messages(&self, conversation_id: &str) -> StoreResult<Vec<Message>>;

    /// Append a message; the store assigns its id and timestamp.
    async fn append_message(
        &self,
        conversation_id: &str,
        role: Role,
        content: &str,
    ) -> StoreResult<()>;
}

/// Prompt enhancement history.
#[async_trait]
pub trait EnhancementStore: Send + Sync {
    /// List the owner's enhancements, newest first.
    async fn list_enhancements(&self, owner: &OwnerId) -> StoreResult<Vec<Enhancement>>;

    /// Record a new enhancement and return the stored row.
    async fn create_enhancement(
        &self,
        owner: &OwnerId,
        input: NewEnhancement,
    ) -> StoreResult<Enhancement>;

    /// Delete one of the owner's enhancements.
    async fn delete_enhancement(&self, enhancement_id: &str, owner: &OwnerId) -> StoreResult<()>;
}

/// Bundle of the three store families used by the sessions.
///
/// Each family is a separate trait object so the enhancement history can be
/// served by a local cache while conversations stay on the durable store.
#[derive(Clone)]
pub struct PersistenceGateway {
    pub conversations: Arc<dyn ConversationStore>,
    pub messages: Arc<dyn MessageStore>,
    pub enhancements: Arc<dyn EnhancementStore>,
}

impl PersistenceGateway {
    pub fn new(
        conversations: Arc<dyn ConversationStore>,
        messages: Arc<dyn MessageStore>,
        enhancements: Arc<dyn EnhancementStore>,
    ) -> Self {
        Self {
            conversations,
            messages,
            enhancements,
        }
    }

    /// Serve every family from one store.
    pub fn from_store<S>(store: Arc<S>) -> Self
    where
        S: ConversationStore + MessageStore + EnhancementStore + 'static,
    {
        Self {
            conversations: store.clone(),
            messages: store.clone(),
            enhancements: store,
        }
    }

    /// Replace the enhancement family, keeping conversations and messages.
    pub fn with_enhancements(mut self, enhancements: Arc<dyn EnhancementStore>) -> Self {
        self.enhancements = enhancements;
        self
    }
}
