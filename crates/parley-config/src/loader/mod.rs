//! Finding, checking and stacking `parley.json5` layers.

mod layer_io;
mod merge;
mod schema;


use crate::{AssistantKind, ConfigError, ParleyConfig, StoreBackend};
use log::{debug, info};
use serde_json::Value;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

const DEFAULT_CONFIG_FILE: &str = "parley.json5";
const DEFAULT_CONFIG_DIR: &str = ".parley";

/// Result of stacking layers: the checked config and the files it came from.
#[derive(Debug, Clone)]
pub struct LayeredConfig {
    pub config: ParleyConfig,
    /// Files that were actually read, in precedence order.
    pub layers: Vec<ConfigLayer>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigLayerSource {
    /// `~/.parley/parley.json5`
    User,
    /// `parley.json5` in the working directory
    Cwd,
    /// Paths passed with `--config`; these win over everything else.
    Runtime,
}

#[derive(Debug, Clone)]
pub struct ConfigLayer {
    pub source: ConfigLayerSource,
    pub path: PathBuf,
}

/// Where to look for layers.
#[derive(Debug, Clone)]
pub struct LayeredConfigOptions {
    pub cwd: PathBuf,
    /// `None` skips the user layer.
    pub user_config_path: Option<PathBuf>,
    pub runtime_paths: Vec<PathBuf>,
}

impl LayeredConfigOptions {
    /// Look in `cwd` and the home directory, with no runtime paths.
    pub fn new(cwd: impl AsRef<Path>) -> Self {
        Self {
            cwd: cwd.as_ref().to_path_buf(),
            user_config_path: layer_io::default_user_config_path(),
            runtime_paths: Vec::new(),
        }
    }

    pub fn without_user_layer(self) -> Self {
        Self {
            user_config_path: None,
            ..self
        }
    }

    pub fn with_runtime_path(mut self, path: impl AsRef<Path>) -> Self {
        self.runtime_paths.push(path.as_ref().to_path_buf());
        self
    }
}

impl ParleyConfig {
    /// Read exactly one file, ignoring every other layer.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        info!("loading config from path: {}", path.display());
        let origin = path.display().to_string();
        let value = layer_io::parse_file(path, &origin)?;
        config_from_value(value, &origin)
    }

    /// Parse JSON5 text as a complete config.
    pub fn load_from_str(contents: &str) -> Result<Self, ConfigError> {
        debug!("loading config from raw contents (len={})", contents.len());
        let value = layer_io::parse_str(contents, "inline")?;
        config_from_value(value, "inline")
    }

    /// Stack the default layers for `cwd`.
    pub fn load_layered(cwd: impl AsRef<Path>) -> Result<LayeredConfig, ConfigError> {
        Self::load_layered_with_options(LayeredConfigOptions::new(cwd))
    }

    /// Stack the layers named by `options`, lowest precedence first: user,
    /// cwd, then each runtime path. Runtime paths must exist; the others are
    /// optional. A file reached twice is only read once.
    pub fn load_layered_with_options(
        options: LayeredConfigOptions,
    ) -> Result<LayeredConfig, ConfigError> {
        let LayeredConfigOptions {
            cwd,
            user_config_path,
            runtime_paths,
        } = options;
        let candidates = user_config_path
            .map(|path| (ConfigLayerSource::User, path))
            .into_iter()
            .chain([(ConfigLayerSource::Cwd, cwd.join(DEFAULT_CONFIG_FILE))])
            .chain(
                runtime_paths
                    .into_iter()
                    .map(|path| (ConfigLayerSource::Runtime, path)),
            );

        let mut document = Value::Object(serde_json::Map::new());
        let mut layers = Vec::new();
        let mut visited = HashSet::new();
        for (source, path) in candidates {
            let key = path.canonicalize().unwrap_or_else(|_| path.clone());
            if !visited.insert(key) {
                debug!("layer already read (path={})", path.display());
                continue;
            }
            let required = source == ConfigLayerSource::Runtime;
            if let Some((layer, value)) = layer_io::read_layer(source, &path, required)? {
                merge::overlay(&mut document, value);
                layers.push(layer);
            }
        }

        let config = config_from_value(document, "effective")?;
        info!("layered config loaded (layers={})", layers.len());
        Ok(LayeredConfig { config, layers })
    }

    /// Cross-field checks: a rest store needs a url and key, a remote
    /// assistant needs a functions url.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.store.backend == StoreBackend::Rest && is_blank(self.store.url.as_deref()) {
            return Err(ConfigError::Unusable(
                "store.url is required for the rest backend".to_string(),
            ));
        }
        if self.store.backend == StoreBackend::Rest && is_blank(self.store.api_key.as_deref()) {
            return Err(ConfigError::Unusable(
                "store.api_key is required for the rest backend".to_string(),
            ));
        }
        if self.services.assistant == AssistantKind::Remote
            && is_blank(self.services.functions_url.as_deref())
        {
            return Err(ConfigError::Unusable(
                "services.functions_url is required for the remote assistant".to_string(),
            ));
        }
        if self.session.event_buffer == 0 {
            return Err(ConfigError::Unusable(
                "session.event_buffer must be greater than zero".to_string(),
            ));
        }
        if self.enhancements.default_provider.trim().is_empty() {
            return Err(ConfigError::Unusable(
                "enhancements.default_provider cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

fn is_blank(value: Option<&str>) -> bool {
    value.map(|value| value.trim().is_empty()).unwrap_or(true)
}

fn config_from_value(value: Value, label: &str) -> Result<ParleyConfig, ConfigError> {
    schema::validate_layer_schema(&value, label)?;
    let config: ParleyConfig = serde_json::from_value(value)?;
    config.validate()?;
    Ok(config)
}
