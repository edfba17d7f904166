//! Per-run inputs: what the turn is about and which phases are enabled.

use crate::abort::AbortSignal;
use crate::story::{StoryEntry, StoryMode};
use serde::{Deserialize, Serialize};

/// The turn being generated.
#[derive(Debug, Clone)]
pub struct GenerationContext {
    pub story_id: String,
    pub branch_id: Option<String>,
    pub mode: StoryMode,
    /// The persisted user action this turn responds to. Its position is the rollback
    /// watermark.
    pub user_action: StoryEntry,
    pub abort: AbortSignal,
}

impl GenerationContext {
    pub fn new(user_action: StoryEntry, mode: StoryMode) -> Self {
        Self {
            story_id: user_action.story_id.clone(),
            branch_id: user_action.branch_id.clone(),
            mode,
            user_action,
            abort: AbortSignal::new(),
        }
    }

    pub fn with_abort(mut self, abort: AbortSignal) -> Self {
        self.abort = abort;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub disable_suggestions: bool,
    pub interactive: bool,
    pub visual_prose: bool,
    pub translation_enabled: bool,
    pub target_language: Option<String>,
    pub background_images: bool,
    pub inline_images: bool,
    pub lore_management: bool,
    /// Keep a full in-memory snapshot for retry instead of the ID differential alone.
    pub full_state_backup: bool,
    /// How many of the latest timeline entries are handed to the narrative source.
    pub recent_entries: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            disable_suggestions: false,
            interactive: true,
            visual_prose: false,
            translation_enabled: false,
            target_language: None,
            background_images: false,
            inline_images: false,
            lore_management: false,
            full_state_backup: true,
            recent_entries: 20,
        }
    }
}

impl PipelineConfig {
    /// Target language when translation is enabled and configured.
    pub fn translation_target(&self) -> Option<&str> {
        if !self.translation_enabled {
            return None;
        }
        self.target_language.as_deref().filter(|l| !l.is_empty())
    }

    pub fn post_enabled(&self) -> bool {
        self.interactive && !self.disable_suggestions
    }
}
