//! Configuration schema for Parley.

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Root config for a Parley client.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ParleyConfig {
    #[serde(default, rename = "$schema")]
    pub schema: Option<String>,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub enhancements: EnhancementsConfig,
    #[serde(default)]
    pub reveal: RevealConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub services: ServicesConfig,
}

impl ParleyConfig {
    /// Start building a config programmatically with defaults applied.
    pub fn builder() -> ParleyConfigBuilder {
        ParleyConfigBuilder::new()
    }

    /// Bearer key for the hosted functions, falling back to the store key.
    pub fn services_api_key(&self) -> Option<&str> {
        self.services
            .api_key
            .as_deref()
            .or(self.store.api_key.as_deref())
            .filter(|key| !key.trim().is_empty())
    }
}

/// Builder for assembling a `ParleyConfig` in code.
#[derive(Debug, Default, Clone)]
pub struct ParleyConfigBuilder {
    config: ParleyConfig,
}

impl ParleyConfigBuilder {
    /// Create a new builder seeded with default config values.
    pub fn new() -> Self {
        Self {
            config: ParleyConfig::default(),
        }
    }

    /// Replace the backend store configuration.
    pub fn store(mut self, store: StoreConfig) -> Self {
        self.config.store = store;
        self
    }

    /// Replace the enhancement history configuration.
    pub fn enhancements(mut self, enhancements: EnhancementsConfig) -> Self {
        self.config.enhancements = enhancements;
        self
    }

    /// Replace the reveal pacing configuration.
    pub fn reveal(mut self, reveal: RevealConfig) -> Self {
        self.config.reveal = reveal;
        self
    }

    /// Replace the session tuning configuration.
    pub fn session(mut self, session: SessionConfig) -> Self {
        self.config.session = session;
        self
    }

    /// Replace the remote service configuration.
    pub fn services(mut self, services: ServicesConfig) -> Self {
        self.config.services = services;
        self
    }

    /// Finalize and return the built `ParleyConfig`.
    pub fn build(self) -> ParleyConfig {
        self.config
    }
}

/// Which backing store serves conversations and messages.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    /// In-process store; nothing survives the process.
    #[default]
    Memory,
    /// PostgREST-style HTTP store.
    Rest,
}

/// Backend store connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            url: None,
            api_key: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl StoreConfig {
    /// Request timeout as a `Duration`.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_timeout_secs() -> u64 {
    30
}

/// Where enhancement history is recorded.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EnhancementStorage {
    /// Same durable store as conversations.
    #[default]
    Remote,
    /// Owner-scoped local cache (degraded mode).
    Local,
}

/// Enhancement history settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnhancementsConfig {
    #[serde(default)]
    pub storage: EnhancementStorage,
    /// Directory for the local cache; defaults to the platform data dir.
    #[serde(default)]
    pub cache_dir: Option<String>,
    /// Label recorded when the enhancement service does not name itself.
    #[serde(default = "default_provider")]
    pub default_provider: String,
}

impl Default for EnhancementsConfig {
    fn default() -> Self {
        Self {
            storage: EnhancementStorage::default(),
            cache_dir: None,
            default_provider: default_provider(),
        }
    }
}

impl EnhancementsConfig {
    /// Directory holding the local enhancement cache.
    pub fn cache_path(&self) -> Option<PathBuf> {
        match &self.cache_dir {
            Some(dir) => Some(PathBuf::from(dir)),
            None => ProjectDirs::from("", "", "parley").map(|dirs| dirs.data_dir().to_path_buf()),
        }
    }
}

fn default_provider() -> String {
    "enhance-prompt".to_string()
}

/// Pacing for the simulated incremental reveal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevealConfig {
    #[serde(default = "default_step_delay_ms")]
    pub step_delay_ms: u64,
}

impl Default for RevealConfig {
    fn default() -> Self {
        Self {
            step_delay_ms: default_step_delay_ms(),
        }
    }
}

impl RevealConfig {
    /// Delay between two revealed characters.
    pub fn step_delay(&self) -> Duration {
        Duration::from_millis(self.step_delay_ms)
    }
}

fn default_step_delay_ms() -> u64 {
    20
}

/// Conversation session tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Maximum clock distance between a pending message and its stored copy.
    #[serde(default = "default_reconcile_window_secs")]
    pub reconcile_window_secs: u64,
    /// Capacity of the session event broadcast channel.
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            reconcile_window_secs: default_reconcile_window_secs(),
            event_buffer: default_event_buffer(),
        }
    }
}

impl SessionConfig {
    /// Reconciliation window as a `Duration`.
    pub fn reconcile_window(&self) -> Duration {
        Duration::from_secs(self.reconcile_window_secs)
    }
}

fn default_reconcile_window_secs() -> u64 {
    300
}

fn default_event_buffer() -> usize {
    1024
}

/// Assistant implementation selector.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AssistantKind {
    /// Canned local response, no network.
    #[default]
    Echo,
    /// Hosted `chat` function.
    Remote,
}

/// Remote text services (assistant replies and prompt enhancement).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ServicesConfig {
    #[serde(default)]
    pub assistant: AssistantKind,
    /// Base URL of the hosted functions, e.g. `https://x.example.co/functions/v1`.
    #[serde(default)]
    pub functions_url: Option<String>,
    /// Bearer key for the hosted functions; falls back to `store.api_key`.
    #[serde(default)]
    pub api_key: Option<String>,
}
