//! Events published by the sessions to the presentation layer.

use crate::ids::LocalId;
use crate::session::ConversationState;
use log::debug;
use serde::Serialize;
use tokio::sync::broadcast;

/// Severity of a user-facing notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeLevel {
    Error,
    Warning,
    Info,
}

/// User-facing notification naming the action it concerns.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notice {
    pub level: NoticeLevel,
    /// Action in user terms, e.g. "send message".
    pub action: String,
    pub message: String,
}

impl Notice {
    pub fn error(action: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            action: action.into(),
            message: message.into(),
        }
    }

    pub fn warning(action: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Warning,
            action: action.into(),
            message: message.into(),
        }
    }

    pub fn info(action: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            action: action.into(),
            message: message.into(),
        }
    }
}

/// Session event stream item.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// Conversation session moved to a new state.
    StateChanged { state: ConversationState },
    /// The session now shows another conversation (or none).
    ConversationOpened { conversation_id: Option<String> },
    /// The message list was replaced or edited.
    MessagesChanged {
        conversation_id: Option<String>,
        count: usize,
    },
    /// A pending assistant message grew during the reveal.
    MessageRevealed { id: LocalId, content: String },
    /// Enhancement history changed.
    EnhancementsChanged { count: usize },
    /// Conversation list changed.
    ConversationsChanged { count: usize },
    Notice(Notice),
}

/// Event sink interface used by the sessions.
pub trait EventSink: Send + Sync {
    /// Emit an event to downstream listeners.
    fn emit(&self, event: SessionEvent);
}

/// Broadcast-backed event bus.
#[derive(Clone, Debug)]
pub struct EventBus {
    sender: broadcast::Sender<SessionEvent>,
}

impl EventBus {
    /// Create a new event bus with the given channel buffer size.
    pub fn new(buffer: usize) -> Self {
        let (sender, _) = broadcast::channel(buffer.max(1));
        debug!("session event bus initialized (buffer={})", buffer);
        Self { sender }
    }

    /// Subscribe to the event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.sender.subscribe()
    }
}

impl EventSink for EventBus {
    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine.
        let _ = self.sender.send(event);
    }
}
