//! Temporary identifiers for entities the store has not acknowledged yet.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

/// Reserved prefix carried by every temporary id. Stores never assign it.
pub const TEMP_PREFIX: &str = "temp-";

/// Entity family a temporary id is issued for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Conversation,
    Message,
    Enhancement,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Conversation => "conversation",
            EntityKind::Message => "message",
            EntityKind::Enhancement => "enhancement",
        }
    }
}

/// Locally unique temporary identifier, always prefixed with [`TEMP_PREFIX`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocalId(String);

impl LocalId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LocalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Returns true when `id` was issued by an [`IdAllocator`].
pub fn is_temporary(id: &str) -> bool {
    id.starts_with(TEMP_PREFIX)
}

/// Issues temporary ids of the form `temp-<kind>-<nonce>-<n>`.
///
/// The nonce keeps ids from two allocators (for example two sessions) apart;
/// the counter keeps ids from one allocator apart.
#[derive(Debug)]
pub struct IdAllocator {
    nonce: String,
    next: AtomicU64,
}

impl IdAllocator {
    pub fn new() -> Self {
        let nonce = Uuid::new_v4().simple().to_string();
        Self {
            nonce: nonce[..8].to_string(),
            next: AtomicU64::new(1),
        }
    }

    /// Allocate a fresh temporary id for the given entity family.
    pub fn allocate(&self, kind: EntityKind) -> LocalId {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        LocalId(format!("{TEMP_PREFIX}{}-{}-{n}", kind.as_str(), self.nonce))
    }
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new()
    }
}
