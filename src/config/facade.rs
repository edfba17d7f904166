//! Entry point for loading configuration.

use super::merge::merge_policy;
use super::sources::{env_source, global_file, workspace_file};
use super::StoryloomConfig;
use config::{ConfigError, File};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Loads [`StoryloomConfig`] from the layered sources.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Defaults, global file, `<workspace>/storyloom.toml`, then environment.
    pub fn load(workspace_root: &Path) -> Result<StoryloomConfig, ConfigError> {
        let builder = merge_policy::builder_with_defaults()?;
        let builder = global_file::add_to_builder(builder)?;
        let builder = workspace_file::add_to_builder(builder, workspace_root)?;
        let builder = env_source::add_to_builder(builder);

        let config: StoryloomConfig = builder.build()?.try_deserialize()?;
        debug!(workspace = %workspace_root.display(), "configuration loaded");
        Ok(config)
    }

    /// Defaults overlaid with one explicit file. The environment still applies.
    pub fn load_from_file(path: &Path) -> Result<StoryloomConfig, ConfigError> {
        let builder = merge_policy::builder_with_defaults()?
            .add_source(File::from(path.to_path_buf()).required(true));
        let builder = env_source::add_to_builder(builder);
        builder.build()?.try_deserialize()
    }

    pub fn global_config_path() -> Option<PathBuf> {
        global_file::global_config_path()
    }
}
