//! Configuration System
//!
//! Layered configuration: built-in defaults, then the global file, then the workspace file,
//! then `STORYLOOM__SECTION__KEY` environment variables. Validation reports every problem at
//! once rather than stopping at the first.

use crate::error::ApiError;
use crate::generation::PipelineConfig;
use crate::logging::LoggingConfig;
use crate::story::StoryMode;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

mod facade;
mod merge;
mod sources;

pub use facade::ConfigLoader;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoryloomConfig {
    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub generation: GenerationSettings,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub sync: SyncConfig,
}

/// Where the sled database lives.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Database directory. Relative paths resolve against the workspace; unset means the
    /// platform data directory.
    #[serde(default)]
    pub store_path: Option<PathBuf>,
}

impl StorageConfig {
    pub fn resolve_store_path(&self, workspace_root: &Path) -> Result<PathBuf, ApiError> {
        match &self.store_path {
            Some(path) if path.is_absolute() => Ok(path.clone()),
            Some(path) => Ok(workspace_root.join(path)),
            None => ProjectDirs::from("", "", "storyloom")
                .map(|dirs| dirs.data_dir().join("store"))
                .ok_or_else(|| {
                    ApiError::ConfigError(
                        "No home directory found; set storage.store_path".to_string(),
                    )
                }),
        }
    }
}

/// Story sync between devices.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Token sync clients must present, either in full or as its connect code.
    #[serde(default)]
    pub token: Option<String>,
}

/// User-facing generation switches. Converted into a [`PipelineConfig`] per turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationSettings {
    pub story_mode: StoryMode,
    pub disable_suggestions: bool,
    pub interactive: bool,
    pub visual_prose: bool,
    pub translation_enabled: bool,
    pub target_language: Option<String>,
    pub background_images: bool,
    pub inline_images: bool,
    pub lore_management: bool,
    pub full_state_backup: bool,
    pub recent_entries: usize,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        let pipeline = PipelineConfig::default();
        Self {
            story_mode: StoryMode::default(),
            disable_suggestions: pipeline.disable_suggestions,
            interactive: pipeline.interactive,
            visual_prose: pipeline.visual_prose,
            translation_enabled: pipeline.translation_enabled,
            target_language: pipeline.target_language,
            background_images: pipeline.background_images,
            inline_images: pipeline.inline_images,
            lore_management: pipeline.lore_management,
            full_state_backup: pipeline.full_state_backup,
            recent_entries: pipeline.recent_entries,
        }
    }
}

impl From<&GenerationSettings> for PipelineConfig {
    fn from(settings: &GenerationSettings) -> Self {
        Self {
            disable_suggestions: settings.disable_suggestions,
            interactive: settings.interactive,
            visual_prose: settings.visual_prose,
            translation_enabled: settings.translation_enabled,
            target_language: settings.target_language.clone(),
            background_images: settings.background_images,
            inline_images: settings.inline_images,
            lore_management: settings.lore_management,
            full_state_backup: settings.full_state_backup,
            recent_entries: settings.recent_entries,
        }
    }
}

/// Configuration validation errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("storage: {0}")]
    Storage(String),

    #[error("generation: {0}")]
    Generation(String),

    #[error("logging: {0}")]
    Logging(String),

    #[error("sync: {0}")]
    Sync(String),
}

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error", "off"];
const LOG_FORMATS: &[&str] = &["text", "json"];
const LOG_OUTPUTS: &[&str] = &["stdout", "stderr", "file", "both"];

impl StoryloomConfig {
    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if let Some(path) = &self.storage.store_path {
            if path.as_os_str().is_empty() {
                errors.push(ValidationError::Storage(
                    "store_path cannot be empty".to_string(),
                ));
            }
        }

        let generation = &self.generation;
        if generation.translation_enabled
            && generation
                .target_language
                .as_deref()
                .map_or(true, str::is_empty)
        {
            errors.push(ValidationError::Generation(
                "translation_enabled requires target_language".to_string(),
            ));
        }
        if generation.recent_entries == 0 {
            errors.push(ValidationError::Generation(
                "recent_entries must be at least 1".to_string(),
            ));
        }

        let logging = &self.logging;
        if !LOG_LEVELS.contains(&logging.level.as_str()) {
            errors.push(ValidationError::Logging(format!(
                "unknown level '{}'",
                logging.level
            )));
        }
        if !LOG_FORMATS.contains(&logging.format.as_str()) {
            errors.push(ValidationError::Logging(format!(
                "unknown format '{}'",
                logging.format
            )));
        }
        if !LOG_OUTPUTS.contains(&logging.output.as_str()) {
            errors.push(ValidationError::Logging(format!(
                "unknown output '{}'",
                logging.output
            )));
        }

        if let Some(token) = &self.sync.token {
            if token.trim().is_empty() {
                errors.push(ValidationError::Sync("token cannot be empty".to_string()));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Validate and fold every problem into one `ApiError`.
    pub fn ensure_valid(&self) -> Result<(), ApiError> {
        self.validate().map_err(|errors| {
            let msgs: Vec<String> = errors.iter().map(ToString::to_string).collect();
            ApiError::ConfigError(format!(
                "Configuration validation failed:\n{}",
                msgs.join("\n")
            ))
        })
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig::from(&self.generation)
    }
}
