//! Session management primitives for Parley.
//!
//! This crate owns the conversation and enhancement sessions, the persistence
//! gateway they talk to, the reveal scheduler, and the data model shared with
//! the backend and CLI crates.

pub mod error;
pub mod events;
pub mod ids;
pub mod reveal;
pub mod services;
pub mod session;
pub mod store;
pub mod types;

pub use error::SessionError;
pub use events::{EventBus, EventSink, Notice, NoticeLevel, SessionEvent};
pub use ids::{EntityKind, IdAllocator, LocalId, TEMP_PREFIX, is_temporary};
pub use reveal::{reveal, reveal_stream};
pub use services::{
    AssistantService, EchoAssistant, EnhancedPrompt, EnhancementService, ServiceError,
};
pub use session::{
    ConversationHistory, ConversationSession, ConversationState, ConversationView,
    EnhanceOutcome, EnhancementSession, EnhancementView, SendOutcome, SessionOptions, reconcile,
};
pub use store::{
    ConversationStore, EnhancementCache, EnhancementStore, LocalEnhancementStore,
    MemoryEnhancementCache, MemoryStore, MessageStore, PersistenceGateway, StoreError,
    StoreResult,
};
pub use types::{Conversation, Enhancement, Message, MessageId, NewEnhancement, OwnerId, Role};
