//! Merge rules: defaults first, later sources override earlier ones key by key.

use crate::generation::PipelineConfig;
use config::Config;
use config::ConfigBuilder;
use config::ConfigError;

/// Create a Config builder with merge policy defaults applied.
pub fn builder_with_defaults() -> Result<ConfigBuilder<config::builder::DefaultState>, ConfigError>
{
    let pipeline = PipelineConfig::default();
    Config::builder()
        .set_default("generation.story_mode", "adventure")?
        .set_default("generation.interactive", pipeline.interactive)?
        .set_default("generation.full_state_backup", pipeline.full_state_backup)?
        .set_default("generation.recent_entries", pipeline.recent_entries as u64)?
        .set_default("logging.level", "info")?
        .set_default("logging.format", "text")?
        .set_default("logging.output", "stderr")
}
