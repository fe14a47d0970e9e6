//! Enhancement history served from an owner-scoped local cache.

use super::{EnhancementStore, StoreError, StoreResult};
use crate::types::{Enhancement, NewEnhancement, OwnerId};
use async_trait::async_trait;
use chrono::Utc;
use log::{debug, warn};
use parking_lot::RwLock;
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Owner-scoped get-all/set-all storage for enhancement records.
#[async_trait]
pub trait EnhancementCache: Send + Sync {
    /// Load every cached record for `owner`, newest first. Missing data is empty.
    async fn load(&self, owner: &OwnerId) -> StoreResult<Vec<Enhancement>>;

    /// Replace every cached record for `owner`.
    async fn save(&self, owner: &OwnerId, records: &[Enhancement]) -> StoreResult<()>;
}

/// Cache held in process memory.
#[derive(Default)]
pub struct MemoryEnhancementCache {
    entries: RwLock<HashMap<OwnerId, Vec<Enhancement>>>,
}

impl MemoryEnhancementCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EnhancementCache for MemoryEnhancementCache {
    async fn load(&self, owner: &OwnerId) -> StoreResult<Vec<Enhancement>> {
        Ok(self.entries.read().get(owner).cloned().unwrap_or_default())
    }

    async fn save(&self, owner: &OwnerId, records: &[Enhancement]) -> StoreResult<()> {
        self.entries.write().insert(owner.clone(), records.to_vec());
        Ok(())
    }
}

/// Degraded-mode enhancement store over an [`EnhancementCache`].
///
/// Every mutation is a serialized read-modify-write of the owner's whole list.
pub struct LocalEnhancementStore<C> {
    cache: C,
    write_lock: Mutex<()>,
}

impl<C: EnhancementCache> LocalEnhancementStore<C> {
    pub fn new(cache: C) -> Self {
        Self {
            cache,
            write_lock: Mutex::new(()),
        }
    }

    pub fn cache(&self) -> &C {
        &self.cache
    }
}

#[async_trait]
impl<C: EnhancementCache> EnhancementStore for LocalEnhancementStore<C> {
    async fn list_enhancements(&self, owner: &OwnerId) -> StoreResult<Vec<Enhancement>> {
        self.cache.load(owner).await
    }

    async fn create_enhancement(
        &self,
        owner: &OwnerId,
        input: NewEnhancement,
    ) -> StoreResult<Enhancement> {
        let enhancement = Enhancement {
            id: Uuid::new_v4().to_string(),
            owner_id: owner.clone(),
            original_prompt: input.original_prompt,
            enhanced_prompt: input.enhanced_prompt,
            provider: input.provider,
            created_at: Utc::now(),
        };
        let _guard = self.write_lock.lock().await;
        let mut records = self.cache.load(owner).await?;
        records.insert(0, enhancement.clone());
        self.cache.save(owner, &records).await?;
        debug!(
            "cached enhancement locally (owner={}, enhancement_id={}, total={})",
            owner,
            enhancement.id,
            records.len()
        );
        Ok(enhancement)
    }

    async fn delete_enhancement(&self, enhancement_id: &str, owner: &OwnerId) -> StoreResult<()> {
        let _guard = self.write_lock.lock().await;
        let mut records = self.cache.load(owner).await?;
        let before = records.len();
        records.retain(|record| record.id != enhancement_id);
        if records.len() == before {
            warn!(
                "local enhancement missing (owner={}, enhancement_id={})",
                owner, enhancement_id
            );
            return Err(StoreError::NotFound {
                entity: "enhancement",
                id: enhancement_id.to_string(),
            });
        }
        self.cache.save(owner, &records).await
    }
}
