//! Core data types shared across sessions, stores and front ends.

use crate::ids::LocalId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identity of the authenticated user that owns conversations and enhancements.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(String);

impl OwnerId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for OwnerId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Title given to conversations created lazily by the first message.
pub const DEFAULT_CONVERSATION_TITLE: &str = "New Conversation";

/// Stored conversation header.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Conversation {
    /// Store-assigned identifier.
    pub id: String,
    /// Owner of the conversation.
    #[serde(rename = "user_id")]
    pub owner_id: OwnerId,
    /// Display title.
    pub title: String,
    /// Optional short summary.
    #[serde(default)]
    pub summary: Option<String>,
    /// Ordered, de-duplicated tags.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Timestamp of the most recent activity.
    pub updated_at: DateTime<Utc>,
}

/// Speaker role for a message.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// User-authored message.
    User,
    /// Assistant-authored message.
    Assistant,
}

impl Role {
    /// Return the role as a lowercase string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            other => Err(format!("unknown message role: {other}")),
        }
    }
}

/// Identity state of a message.
///
/// A message is pending until the store has acknowledged it, and settled once
/// it carries a store-assigned id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case", tag = "state", content = "id")]
pub enum MessageId {
    /// Temporary id from the identity allocator.
    Pending(LocalId),
    /// Durable id assigned by the store.
    Settled(String),
}

impl MessageId {
    pub fn as_str(&self) -> &str {
        match self {
            MessageId::Pending(local) => local.as_str(),
            MessageId::Settled(id) => id,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, MessageId::Pending(_))
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Message shown in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub id: MessageId,
    pub conversation_id: String,
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Build a view-only message that the store has not acknowledged yet.
    pub fn pending(
        id: LocalId,
        conversation_id: impl Into<String>,
        role: Role,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: MessageId::Pending(id),
            conversation_id: conversation_id.into(),
            role,
            content: content.into(),
            created_at: Utc::now(),
        }
    }

    pub fn is_pending(&self) -> bool {
        self.id.is_pending()
    }

    pub fn is_settled(&self) -> bool {
        !self.is_pending()
    }
}

/// Stored prompt enhancement.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Enhancement {
    pub id: String,
    #[serde(rename = "user_id")]
    pub owner_id: OwnerId,
    pub original_prompt: String,
    pub enhanced_prompt: String,
    /// Label of the service that produced the enhanced text.
    pub provider: String,
    pub created_at: DateTime<Utc>,
}

/// Input for recording a new enhancement.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewEnhancement {
    pub original_prompt: String,
    pub enhanced_prompt: String,
    pub provider: String,
}
