//! Phase results and the assembled pipeline result.

use crate::retry::RetryBackup;
use crate::story::{EmbeddedImage, LorebookEntry, StoryEntry, TimeTracker};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq)]
pub struct PreGenerationResult {
    /// Held in memory for the caller's retry service. The persisted copy is always the
    /// ID-differential form.
    pub backup: RetryBackup,
    pub time_tracker: TimeTracker,
    pub visual_prose_mode: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LorebookContext {
    pub context: Option<String>,
    /// IDs of lorebook entries activated for this turn.
    pub activated: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrievalResult {
    pub memory_context: Option<String>,
    pub lorebook: Option<LorebookContext>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NarrativeResult {
    pub content: String,
    pub reasoning: Option<String>,
    pub chunk_count: usize,
    pub attempts: u32,
}

/// World-state changes detected in a narrative.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassificationResult {
    /// Names of characters present in the scene.
    #[serde(default)]
    pub present_characters: Vec<String>,
    #[serde(default)]
    pub new_characters: Vec<String>,
    #[serde(default)]
    pub new_locations: Vec<String>,
    #[serde(default)]
    pub new_items: Vec<String>,
    #[serde(default)]
    pub current_location: Option<String>,
    #[serde(default)]
    pub elapsed_minutes: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackgroundImage {
    pub prompt: String,
    pub image_data: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TranslationResult {
    pub language: String,
    pub narrative: String,
    pub preserved_markup: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageResult {
    pub images: Vec<EmbeddedImage>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostResult {
    pub suggestions: Vec<String>,
    pub action_choices: Vec<String>,
    pub lore_updates: Vec<LorebookEntry>,
}

/// Everything a run produced. Partial when `aborted` or `fatal_error` is set.
#[derive(Debug, Clone, Default)]
pub struct PipelineResult {
    pub pre: Option<PreGenerationResult>,
    pub retrieval: Option<RetrievalResult>,
    pub narrative: Option<NarrativeResult>,
    pub narration_entry: Option<StoryEntry>,
    pub classification: Option<ClassificationResult>,
    pub background_image: Option<BackgroundImage>,
    pub translation: Option<TranslationResult>,
    pub image: Option<ImageResult>,
    pub post: Option<PostResult>,
    pub aborted: bool,
    pub fatal_error: Option<String>,
}

impl PipelineResult {
    pub fn succeeded(&self) -> bool {
        !self.aborted && self.fatal_error.is_none() && self.narrative.is_some()
    }
}
