//! Concrete persistence and service backends for Parley, assembled from config.

mod cache;
mod error;
mod functions;
mod rest;

pub use cache::FileEnhancementCache;
pub use error::BackendError;
pub use functions::{FunctionsClient, HttpAssistant, HttpEnhancer};
pub use rest::RestStore;

use log::info;
use parley_config::{AssistantKind, EnhancementStorage, ParleyConfig, StoreBackend};
use parley_core::{
    AssistantService, EchoAssistant, EnhancementService, LocalEnhancementStore, MemoryStore,
    PersistenceGateway,
};
use std::sync::Arc;

/// Build the persistence gateway selected by `config`.
pub fn open_gateway(config: &ParleyConfig) -> Result<PersistenceGateway, BackendError> {
    let gateway = match config.store.backend {
        StoreBackend::Memory => PersistenceGateway::from_store(Arc::new(MemoryStore::new())),
        StoreBackend::Rest => {
            let url = required(config.store.url.as_deref(), "store.url")?;
            let api_key = required(config.store.api_key.as_deref(), "store.api_key")?;
            let store = RestStore::new(url, api_key, config.store.timeout())?
                .with_default_provider(config.enhancements.default_provider.clone());
            PersistenceGateway::from_store(Arc::new(store))
        }
    };

    match config.enhancements.storage {
        EnhancementStorage::Remote => Ok(gateway),
        EnhancementStorage::Local => {
            let dir = config.enhancements.cache_path().ok_or_else(|| {
                BackendError::Config("no directory available for the enhancement cache".to_string())
            })?;
            info!("enhancement history uses local cache (dir={})", dir.display());
            let cache = FileEnhancementCache::new(dir);
            Ok(gateway.with_enhancements(Arc::new(LocalEnhancementStore::new(cache))))
        }
    }
}

/// Build the assistant selected by `config`.
pub fn open_assistant(config: &ParleyConfig) -> Result<Arc<dyn AssistantService>, BackendError> {
    match config.services.assistant {
        AssistantKind::Echo => Ok(Arc::new(EchoAssistant::new())),
        AssistantKind::Remote => Ok(Arc::new(HttpAssistant::new(functions_client(config)?))),
    }
}

/// Build the prompt enhancer. Requires `services.functions_url`.
pub fn open_enhancer(config: &ParleyConfig) -> Result<Arc<dyn EnhancementService>, BackendError> {
    Ok(Arc::new(HttpEnhancer::new(functions_client(config)?)))
}

fn functions_client(config: &ParleyConfig) -> Result<FunctionsClient, BackendError> {
    let url = required(config.services.functions_url.as_deref(), "services.functions_url")?;
    FunctionsClient::new(
        url,
        config.services_api_key().map(str::to_string),
        config.store.timeout(),
    )
}

fn required<'a>(value: Option<&'a str>, field: &str) -> Result<&'a str, BackendError> {
    value
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| BackendError::Config(format!("{field} is required")))
}
