//! Entry points for building [`LoaderSettings`] from layered sources.

use super::merge::merge_policy::builder_with_defaults;
use super::sources::{environment, global_file};
use super::LoaderSettings;
use crate::error::SetupError;
use std::path::Path;
use tracing::debug;

pub struct ConfigLoader;

impl ConfigLoader {
    /// Defaults, then the global config file if present, then the environment.
    pub fn load() -> Result<LoaderSettings, SetupError> {
        let builder = global_file::add_to_builder(builder_with_defaults()?)?;
        let settings: LoaderSettings = environment::add_to_builder(builder)
            .build()?
            .try_deserialize()?;
        debug!(?settings, "Loaded loader settings");
        Ok(settings)
    }

    /// Defaults, then `path` (which must exist), then the environment.
    pub fn load_from_file(path: &Path) -> Result<LoaderSettings, SetupError> {
        if !path.exists() {
            return Err(SetupError::Config(format!(
                "Config file not found: {}",
                path.display()
            )));
        }
        let builder = global_file::add_file(builder_with_defaults()?, path, true)?;
        let settings: LoaderSettings = environment::add_to_builder(builder)
            .build()?
            .try_deserialize()?;
        debug!(config_path = %path.display(), "Loaded loader settings from file");
        Ok(settings)
    }

    /// Built-in defaults only.
    #[allow(clippy::should_implement_trait)]
    pub fn default() -> LoaderSettings {
        LoaderSettings::default()
    }
}
