//! Session orchestration: conversations, enhancements and conversation history.

mod conversation;
mod enhancement;
mod history;
mod reconcile;

pub use conversation::{
    ConversationSession, ConversationState, ConversationView, SendOutcome, SessionOptions,
};
pub use enhancement::{EnhanceOutcome, EnhancementSession, EnhancementView};
pub use history::ConversationHistory;
pub use reconcile::reconcile;
