//! Settings for Parley: the `ParleyConfig` model plus a loader that stacks
//! `parley.json5` layers from the home directory, the working directory and
//! explicit paths.

mod error;
mod loader;
mod model;

pub use error::ConfigError;
pub use loader::{ConfigLayer, ConfigLayerSource, LayeredConfig, LayeredConfigOptions};
pub use model::*;
