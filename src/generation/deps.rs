//! Dependency contracts
//!
//! The pipeline knows nothing about model providers, prompts or storage layouts. Each phase
//! talks to the host through one of these traits. Every call receives the run's
//! [`AbortSignal`]; implementations performing network I/O should stop when it fires.

use crate::abort::AbortSignal;
use crate::error::PipelineError;
use crate::generation::types::{
    BackgroundImage, ClassificationResult, LorebookContext, NarrativeResult, TranslationResult,
};
use crate::retry::{ActivationData, RetryBackup};
use crate::story::{
    Character, EmbeddedImage, LorebookEntry, StoryEntry, StoryMode, TimeTracker, WorldState,
};
use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;
use std::sync::Arc;

/// One streamed piece of narrative.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NarrativeChunk {
    pub content: String,
    pub reasoning: Option<String>,
}

impl NarrativeChunk {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            reasoning: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty() && self.reasoning.as_deref().map_or(true, str::is_empty)
    }
}

pub type NarrativeStream =
    Pin<Box<dyn Stream<Item = Result<NarrativeChunk, PipelineError>> + Send>>;

#[derive(Debug, Clone, PartialEq)]
pub struct NarrativeRequest {
    pub story_id: String,
    pub branch_id: Option<String>,
    pub mode: StoryMode,
    pub user_action: String,
    pub recent_entries: Vec<StoryEntry>,
    pub memory_context: Option<String>,
    pub lorebook_context: Option<String>,
    pub visual_prose: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImageRequest {
    pub story_id: String,
    pub branch_id: Option<String>,
    pub entry_id: String,
    pub narrative: String,
    pub translated_narrative: Option<String>,
    pub present_characters: Vec<Character>,
}

#[async_trait]
pub trait NarrativeSource: Send + Sync {
    async fn stream_narrative(
        &self,
        request: &NarrativeRequest,
        abort: &AbortSignal,
    ) -> Result<NarrativeStream, PipelineError>;
}

#[async_trait]
pub trait ContextRetriever: Send + Sync {
    async fn retrieve_memory(
        &self,
        world: &WorldState,
        user_action: &str,
        abort: &AbortSignal,
    ) -> Result<Option<String>, PipelineError>;

    async fn retrieve_lorebook(
        &self,
        world: &WorldState,
        user_action: &str,
        abort: &AbortSignal,
    ) -> Result<LorebookContext, PipelineError>;
}

#[async_trait]
pub trait WorldClassifier: Send + Sync {
    async fn classify(
        &self,
        world: &WorldState,
        narrative: &str,
        abort: &AbortSignal,
    ) -> Result<ClassificationResult, PipelineError>;
}

#[async_trait]
pub trait Translator: Send + Sync {
    /// `preserve_markup` is set when the narrative was written in visual-prose mode.
    async fn translate_narrative(
        &self,
        text: &str,
        language: &str,
        preserve_markup: bool,
        abort: &AbortSignal,
    ) -> Result<String, PipelineError>;

    async fn translate_ui_elements(
        &self,
        elements: &[String],
        language: &str,
        abort: &AbortSignal,
    ) -> Result<Vec<String>, PipelineError>;
}

#[async_trait]
pub trait ImageGenerator: Send + Sync {
    async fn generate_background(
        &self,
        narrative: &str,
        abort: &AbortSignal,
    ) -> Result<Option<BackgroundImage>, PipelineError>;

    async fn generate_images(
        &self,
        request: &ImageRequest,
        abort: &AbortSignal,
    ) -> Result<Vec<EmbeddedImage>, PipelineError>;
}

#[async_trait]
pub trait SuggestionGenerator: Send + Sync {
    async fn generate_suggestions(
        &self,
        world: &WorldState,
        narrative: &str,
        abort: &AbortSignal,
    ) -> Result<Vec<String>, PipelineError>;

    async fn generate_action_choices(
        &self,
        world: &WorldState,
        narrative: &str,
        abort: &AbortSignal,
    ) -> Result<Vec<String>, PipelineError>;

    async fn manage_lore(
        &self,
        world: &WorldState,
        narrative: &str,
        abort: &AbortSignal,
    ) -> Result<Vec<LorebookEntry>, PipelineError>;
}

/// Persistent state mutations the pipeline performs.
#[async_trait]
pub trait StateHooks: Send + Sync {
    async fn capture_world_state(
        &self,
        story_id: &str,
        branch_id: Option<&str>,
    ) -> Result<WorldState, PipelineError>;

    async fn activation_data(&self, story_id: &str) -> Result<ActivationData, PipelineError>;

    async fn save_retry_backup(&self, backup: &RetryBackup) -> Result<(), PipelineError>;

    /// The story's clock, created at zero when absent.
    async fn ensure_time_tracker(&self, story_id: &str) -> Result<TimeTracker, PipelineError>;

    /// Stamp lorebook entries as activated on the turn about to be written to `branch_id`.
    async fn record_activation(
        &self,
        story_id: &str,
        branch_id: Option<&str>,
        lorebook_ids: &[String],
    ) -> Result<(), PipelineError>;

    async fn append_narration(
        &self,
        story_id: &str,
        branch_id: Option<&str>,
        parent_id: &str,
        narrative: &NarrativeResult,
    ) -> Result<StoryEntry, PipelineError>;

    async fn apply_classification(
        &self,
        story_id: &str,
        branch_id: Option<&str>,
        result: &ClassificationResult,
    ) -> Result<(), PipelineError>;

    async fn save_translation(
        &self,
        story_id: &str,
        entry_id: &str,
        translation: &TranslationResult,
    ) -> Result<(), PipelineError>;

    async fn attach_images(&self, images: &[EmbeddedImage]) -> Result<(), PipelineError>;

    async fn save_lore(
        &self,
        story_id: &str,
        branch_id: Option<&str>,
        entries: &[LorebookEntry],
    ) -> Result<(), PipelineError>;
}

/// Everything the pipeline talks to. Optional collaborators disable their phases when absent.
#[derive(Clone)]
pub struct PipelineDependencies {
    pub state: Arc<dyn StateHooks>,
    pub narrative: Arc<dyn NarrativeSource>,
    pub retriever: Option<Arc<dyn ContextRetriever>>,
    pub classifier: Option<Arc<dyn WorldClassifier>>,
    pub translator: Option<Arc<dyn Translator>>,
    pub images: Option<Arc<dyn ImageGenerator>>,
    pub suggestions: Option<Arc<dyn SuggestionGenerator>>,
}

impl PipelineDependencies {
    pub fn new(state: Arc<dyn StateHooks>, narrative: Arc<dyn NarrativeSource>) -> Self {
        Self {
            state,
            narrative,
            retriever: None,
            classifier: None,
            translator: None,
            images: None,
            suggestions: None,
        }
    }

    pub fn with_retriever(mut self, retriever: Arc<dyn ContextRetriever>) -> Self {
        self.retriever = Some(retriever);
        self
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn WorldClassifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    pub fn with_translator(mut self, translator: Arc<dyn Translator>) -> Self {
        self.translator = Some(translator);
        self
    }

    pub fn with_images(mut self, images: Arc<dyn ImageGenerator>) -> Self {
        self.images = Some(images);
        self
    }

    pub fn with_suggestions(mut self, suggestions: Arc<dyn SuggestionGenerator>) -> Self {
        self.suggestions = Some(suggestions);
        self
    }
}
