//! Enhancement session: rewrite prompts and keep a browsable history.

use crate::error::SessionError;
use crate::events::{EventSink, Notice, SessionEvent};
use crate::services::{EnhancementService, ServiceError};
use crate::store::EnhancementStore;
use crate::types::{Enhancement, NewEnhancement, OwnerId};
use log::{debug, info, warn};
use parking_lot::RwLock;
use std::sync::Arc;

/// Snapshot of the enhancement history shown to the user.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnhancementView {
    /// Newest first.
    pub history: Vec<Enhancement>,
    pub loading: bool,
}

/// Result of a successful enhancement call.
#[derive(Debug, Clone, PartialEq)]
pub struct EnhanceOutcome {
    pub enhanced_prompt: String,
    pub provider: String,
    /// Stored record, or `None` when the result was not recorded.
    pub record: Option<Enhancement>,
}

struct Inner {
    view: EnhancementView,
    /// Latest history load; older loads discard their results.
    ticket: u64,
}

impl Inner {
    /// Discard any load in flight; its rows predate a local change.
    fn supersede_load(&mut self) {
        self.ticket += 1;
        self.view.loading = false;
    }
}

/// Orchestrates prompt enhancement and its history for one user.
///
/// Without an owner the session runs in degraded mode: history operations are
/// no-ops and enhancements are returned but never recorded.
pub struct EnhancementSession {
    owner: Option<OwnerId>,
    store: Arc<dyn EnhancementStore>,
    enhancer: Arc<dyn EnhancementService>,
    events: Arc<dyn EventSink>,
    default_provider: String,
    inner: RwLock<Inner>,
}

impl EnhancementSession {
    pub fn new(
        owner: Option<OwnerId>,
        store: Arc<dyn EnhancementStore>,
        enhancer: Arc<dyn EnhancementService>,
        events: Arc<dyn EventSink>,
        default_provider: impl Into<String>,
    ) -> Self {
        Self {
            owner,
            store,
            enhancer,
            events,
            default_provider: default_provider.into(),
            inner: RwLock::new(Inner {
                view: EnhancementView::default(),
                ticket: 0,
            }),
        }
    }

    pub fn snapshot(&self) -> EnhancementView {
        self.inner.read().view.clone()
    }

    pub fn history(&self) -> Vec<Enhancement> {
        self.inner.read().view.history.clone()
    }

    /// Look up a history entry, e.g. to load it back into the editor.
    pub fn find(&self, enhancement_id: &str) -> Option<Enhancement> {
        self.inner
            .read()
            .view
            .history
            .iter()
            .find(|record| record.id == enhancement_id)
            .cloned()
    }

    /// Fetch the owner's history. A later call supersedes an earlier one.
    pub async fn load_history(&self) -> Result<(), SessionError> {
        let Some(owner) = &self.owner else {
            return Ok(());
        };
        let ticket = {
            let mut inner = self.inner.write();
            inner.ticket += 1;
            inner.view.loading = true;
            inner.ticket
        };
        let result = self.store.list_enhancements(owner).await;

        let count = {
            let mut inner = self.inner.write();
            if inner.ticket != ticket {
                debug!("dropping stale enhancement history (owner={})", owner);
                return Ok(());
            }
            inner.view.loading = false;
            match &result {
                Ok(records) => inner.view.history = records.clone(),
                Err(_) => inner.view.history.clear(),
            }
            inner.view.history.len()
        };
        self.events.emit(SessionEvent::EnhancementsChanged { count });

        match result {
            Ok(_) => {
                debug!("loaded enhancement history (owner={}, count={})", owner, count);
                Ok(())
            }
            Err(err) => {
                warn!(
                    "failed to load enhancement history (owner={}, error={})",
                    owner, err
                );
                self.notify(Notice::error("load enhancement history", err.to_string()));
                Err(err.into())
            }
        }
    }

    /// Enhance a prompt and record the result in the history.
    ///
    /// A failure to record still returns the enhanced text.
    pub async fn enhance(&self, original_prompt: &str) -> Result<EnhanceOutcome, SessionError> {
        let original = original_prompt.trim();
        if original.is_empty() {
            self.notify(Notice::warning("enhance prompt", "prompt is empty"));
            return Err(SessionError::Validation("prompt is empty".to_string()));
        }

        let reply = match self.enhancer.enhance(original).await {
            Ok(reply) if reply.enhanced_prompt.trim().is_empty() => {
                Err(ServiceError::EmptyResponse)
            }
            other => other,
        };
        let reply = match reply {
            Ok(reply) => reply,
            Err(err) => {
                warn!("prompt enhancement failed (error={})", err);
                self.notify(Notice::error("enhance prompt", err.to_string()));
                return Err(err.into());
            }
        };
        let provider = reply
            .provider
            .filter(|label| !label.trim().is_empty())
            .unwrap_or_else(|| self.default_provider.clone());

        let Some(owner) = &self.owner else {
            return Ok(EnhanceOutcome {
                enhanced_prompt: reply.enhanced_prompt,
                provider,
                record: None,
            });
        };

        let input = NewEnhancement {
            original_prompt: original.to_string(),
            enhanced_prompt: reply.enhanced_prompt.clone(),
            provider: provider.clone(),
        };
        let record = match self.store.create_enhancement(owner, input).await {
            Ok(record) => {
                let count = {
                    let mut inner = self.inner.write();
                    inner.supersede_load();
                    inner.view.history.retain(|existing| existing.id != record.id);
                    inner.view.history.insert(0, record.clone());
                    inner.view.history.len()
                };
                info!(
                    "recorded enhancement (owner={}, enhancement_id={}, provider={})",
                    owner, record.id, record.provider
                );
                self.events.emit(SessionEvent::EnhancementsChanged { count });
                self.notify(Notice::info("enhance prompt", "prompt enhanced and saved"));
                Some(record)
            }
            Err(err) => {
                warn!("enhancement not recorded (owner={}, error={})", owner, err);
                self.notify(Notice::warning("save enhancement", err.to_string()));
                None
            }
        };

        Ok(EnhanceOutcome {
            enhanced_prompt: reply.enhanced_prompt,
            provider,
            record,
        })
    }

    /// Delete a history entry once the store confirms it.
    pub async fn delete(&self, enhancement_id: &str) -> Result<(), SessionError> {
        let Some(owner) = &self.owner else {
            return Ok(());
        };
        if let Err(err) = self.store.delete_enhancement(enhancement_id, owner).await {
            warn!(
                "failed to delete enhancement (owner={}, enhancement_id={}, error={})",
                owner, enhancement_id, err
            );
            self.notify(Notice::error("delete enhancement", err.to_string()));
            return Err(err.into());
        }
        let count = {
            let mut inner = self.inner.write();
            inner.supersede_load();
            inner.view.history.retain(|record| record.id != enhancement_id);
            inner.view.history.len()
        };
        self.events.emit(SessionEvent::EnhancementsChanged { count });
        Ok(())
    }

    fn notify(&self, notice: Notice) {
        self.events.emit(SessionEvent::Notice(notice));
    }
}
