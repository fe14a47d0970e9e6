//! Reading layer files from disk.

use super::{ConfigLayer, ConfigLayerSource, DEFAULT_CONFIG_DIR, DEFAULT_CONFIG_FILE, schema};
use crate::ConfigError;
use directories::UserDirs;
use log::debug;
use serde_json::Value;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

impl ConfigLayerSource {
    fn label(self) -> &'static str {
        match self {
            ConfigLayerSource::User => "user",
            ConfigLayerSource::Cwd => "cwd",
            ConfigLayerSource::Runtime => "runtime",
        }
    }
}

/// Read one layer. Missing files are skipped unless the layer is `required`.
pub(super) fn read_layer(
    source: ConfigLayerSource,
    path: &Path,
    required: bool,
) -> Result<Option<(ConfigLayer, Value)>, ConfigError> {
    let origin = format!("{}({})", source.label(), path.display());
    let value = match parse_file(path, &origin) {
        Ok(value) => value,
        Err(ConfigError::Read { source: err, .. })
            if !required && err.kind() == ErrorKind::NotFound =>
        {
            debug!("no config layer at {origin}");
            return Ok(None);
        }
        Err(err) => return Err(err),
    };
    schema::validate_layer_schema(&value, &origin)?;
    debug!("read config layer {origin}");
    let layer = ConfigLayer {
        source,
        path: path.to_path_buf(),
    };
    Ok(Some((layer, value)))
}

/// Parse a JSON5 file into a JSON value, naming `origin` on syntax errors.
pub(super) fn parse_file(path: &Path, origin: &str) -> Result<Value, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_str(&contents, origin)
}

pub(super) fn parse_str(contents: &str, origin: &str) -> Result<Value, ConfigError> {
    json5::from_str(contents).map_err(|source| ConfigError::Syntax {
        origin: origin.to_string(),
        source,
    })
}

/// `~/.parley/parley.json5`, when a home directory is known.
pub(super) fn default_user_config_path() -> Option<PathBuf> {
    let dirs = UserDirs::new()?;
    Some(
        dirs.home_dir()
            .join(DEFAULT_CONFIG_DIR)
            .join(DEFAULT_CONFIG_FILE),
    )
}
