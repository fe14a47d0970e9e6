use async_trait::async_trait;
use parking_lot::Mutex;
use parley_core::{
    Conversation, ConversationStore, Enhancement, EnhancementStore, MemoryStore, Message,
    MessageStore, NewEnhancement, OwnerId, Role, StoreError, StoreResult,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Notify;

/// Gateway operations a [`FlakyStore`] can be told to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    CreateConversation,
    ListConversations,
    DeleteConversation,
    ListMessages,
    AppendUserMessage,
    AppendAssistantMessage,
    ListEnhancements,
    CreateEnhancement,
    DeleteEnhancement,
}

/// Memory store wrapper that fails selected operations and counts calls.
#[derive(Default)]
pub struct FlakyStore {
    inner: MemoryStore,
    failing: Mutex<HashSet<Operation>>,
    calls: Mutex<HashMap<Operation, usize>>,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every later call of `operation`.
    pub fn fail(&self, operation: Operation) {
        self.failing.lock().insert(operation);
    }

    pub fn recover(&self, operation: Operation) {
        self.failing.lock().remove(&operation);
    }

    pub fn calls(&self, operation: Operation) -> usize {
        self.calls.lock().get(&operation).copied().unwrap_or(0)
    }

    /// The wrapped store, for inspection without failure injection.
    pub fn inner(&self) -> &MemoryStore {
        &self.inner
    }

    fn check(&self, operation: Operation) -> StoreResult<()> {
        *self.calls.lock().entry(operation).or_default() += 1;
        if self.failing.lock().contains(&operation) {
            return Err(StoreError::Rejected {
                status: 503,
                message: format!("injected failure: {operation:?}"),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ConversationStore for FlakyStore {
    async fn create_conversation(&self, owner: &OwnerId) -> StoreResult<Conversation> {
        self.check(Operation::CreateConversation)?;
        self.inner.create_conversation(owner).await
    }

    async fn list_conversations(&self, owner: &OwnerId) -> StoreResult<Vec<Conversation>> {
        self.check(Operation::ListConversations)?;
        self.inner.list_conversations(owner).await
    }

    async fn delete_conversation(&self, conversation_id: &str) -> StoreResult<()> {
        self.check(Operation::DeleteConversation)?;
        self.inner.delete_conversation(conversation_id).await
    }
}

#[async_trait]
impl MessageStore for FlakyStore {
    async fn list_messages(&self, conversation_id: &str) -> StoreResult<Vec<Message>> {
        self.check(Operation::ListMessages)?;
        self.inner.list_messages(conversation_id).await
    }

    async fn append_message(
        &self,
        conversation_id: &str,
        role: Role,
        content: &str,
    ) -> StoreResult<()> {
        let operation = match role {
            Role::User => Operation::AppendUserMessage,
            Role::Assistant => Operation::AppendAssistantMessage,
        };
        self.check(operation)?;
        self.inner.append_message(conversation_id, role, content).await
    }
}

#[async_trait]
impl EnhancementStore for FlakyStore {
    async fn list_enhancements(&self, owner: &OwnerId) -> StoreResult<Vec<Enhancement>> {
        self.check(Operation::ListEnhancements)?;
        self.inner.list_enhancements(owner).await
    }

    async fn create_enhancement(
        &self,
        owner: &OwnerId,
        input: NewEnhancement,
    ) -> StoreResult<Enhancement> {
        self.check(Operation::CreateEnhancement)?;
        self.inner.create_enhancement(owner, input).await
    }

    async fn delete_enhancement(&self, enhancement_id: &str, owner: &OwnerId) -> StoreResult<()> {
        self.check(Operation::DeleteEnhancement)?;
        self.inner.delete_enhancement(enhancement_id, owner).await
    }
}

/// Enhancement store whose listings read the rows, then wait for
/// [`GatedEnhancementStore::release`] before answering.
#[derive(Default)]
pub struct GatedEnhancementStore {
    inner: MemoryStore,
    entered: Arc<Notify>,
    gate: Arc<Notify>,
}

impl GatedEnhancementStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until a listing has read its rows and is blocked on the gate.
    pub async fn entered(&self) {
        self.entered.notified().await;
    }

    /// Let one blocked listing answer.
    pub fn release(&self) {
        self.gate.notify_one();
    }
}

#[async_trait]
impl EnhancementStore for GatedEnhancementStore {
    async fn list_enhancements(&self, owner: &OwnerId) -> StoreResult<Vec<Enhancement>> {
        let records = self.inner.list_enhancements(owner).await?;
        self.entered.notify_one();
        self.gate.notified().await;
        Ok(records)
    }

    async fn create_enhancement(
        &self,
        owner: &OwnerId,
        input: NewEnhancement,
    ) -> StoreResult<Enhancement> {
        self.inner.create_enhancement(owner, input).await
    }

    async fn delete_enhancement(&self, enhancement_id: &str, owner: &OwnerId) -> StoreResult<()> {
        self.inner.delete_enhancement(enhancement_id, owner).await
    }
}
