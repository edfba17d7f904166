//! In-memory collaborators for pipeline tests.

use crate::abort::AbortSignal;
use crate::error::PipelineError;
use crate::generation::context::{GenerationContext, PipelineConfig};
use crate::generation::deps::{
    ImageGenerator, ImageRequest, NarrativeChunk, NarrativeRequest, NarrativeSource,
    NarrativeStream, PipelineDependencies, StateHooks, SuggestionGenerator, WorldClassifier,
};
use crate::generation::events::{EventEmitter, GenerationEvent};
use crate::generation::phases::PhaseEnv;
use crate::generation::types::{
    BackgroundImage, ClassificationResult, NarrativeResult, TranslationResult,
};
use crate::retry::{ActivationData, RetryBackup};
use crate::story::{
    Character, EmbeddedImage, EntryMetadata, EntryType, LorebookEntry, StoryEntry, StoryMode,
    TimeTracker, WorldState,
};
use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;

/// Replays one list of chunks per attempt.
pub struct ScriptedNarrative {
    script: Vec<Vec<&'static str>>,
    attempts: Mutex<usize>,
    abort_at: Option<(usize, AbortSignal)>,
}

impl ScriptedNarrative {
    pub fn new(script: Vec<Vec<&'static str>>) -> Self {
        Self {
            script,
            attempts: Mutex::new(0),
            abort_at: None,
        }
    }

    /// Fires `signal` just before chunk `index` of the first attempt is delivered.
    pub fn aborting_at(chunks: Vec<&'static str>, index: usize, signal: AbortSignal) -> Self {
        Self {
            script: vec![chunks],
            attempts: Mutex::new(0),
            abort_at: Some((index, signal)),
        }
    }

    pub fn attempts(&self) -> usize {
        *self.attempts.lock()
    }
}

#[async_trait]
impl NarrativeSource for ScriptedNarrative {
    async fn stream_narrative(
        &self,
        _request: &NarrativeRequest,
        _abort: &AbortSignal,
    ) -> Result<NarrativeStream, PipelineError> {
        let attempt = {
            let mut attempts = self.attempts.lock();
            *attempts += 1;
            *attempts - 1
        };
        let chunks = self.script.get(attempt).cloned().unwrap_or_default();
        let abort_at = self.abort_at.clone();
        let stream = futures::stream::iter(chunks.into_iter().enumerate()).map(move |(i, text)| {
            if let Some((index, signal)) = &abort_at {
                if *index == i {
                    signal.abort();
                }
            }
            Ok(NarrativeChunk::text(text))
        });
        Ok(Box::pin(stream))
    }
}

/// World state held in memory; records every hook call.
#[derive(Default)]
pub struct MemoryState {
    pub world: Mutex<WorldState>,
    pub calls: Mutex<Vec<String>>,
    pub backups: Mutex<Vec<RetryBackup>>,
}

impl MemoryState {
    fn record(&self, call: &str) {
        self.calls.lock().push(call.to_string());
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl StateHooks for MemoryState {
    async fn capture_world_state(
        &self,
        _story_id: &str,
        _branch_id: Option<&str>,
    ) -> Result<WorldState, PipelineError> {
        self.record("capture_world_state");
        Ok(self.world.lock().clone())
    }

    async fn activation_data(&self, _story_id: &str) -> Result<ActivationData, PipelineError> {
        Ok(ActivationData::new())
    }

    async fn save_retry_backup(&self, backup: &RetryBackup) -> Result<(), PipelineError> {
        self.record("save_retry_backup");
        self.backups.lock().push(backup.clone());
        Ok(())
    }

    async fn ensure_time_tracker(&self, _story_id: &str) -> Result<TimeTracker, PipelineError> {
        Ok(self.world.lock().time_tracker.unwrap_or_default())
    }

    async fn record_activation(
        &self,
        _story_id: &str,
        _branch_id: Option<&str>,
        _lorebook_ids: &[String],
    ) -> Result<(), PipelineError> {
        Ok(())
    }

    async fn append_narration(
        &self,
        story_id: &str,
        branch_id: Option<&str>,
        parent_id: &str,
        narrative: &NarrativeResult,
    ) -> Result<StoryEntry, PipelineError> {
        self.record("append_narration");
        let mut world = self.world.lock();
        let position = world.entries.last().map_or(0, |e| e.position + 1);
        let entry = StoryEntry {
            id: format!("narration-{position}"),
            story_id: story_id.to_string(),
            entry_type: EntryType::Narration,
            content: narrative.content.clone(),
            parent_id: Some(parent_id.to_string()),
            position,
            branch_id: branch_id.map(str::to_string),
            metadata: EntryMetadata::default(),
            translated_content: None,
            translation_language: None,
            created_at: 0,
        };
        world.entries.push(entry.clone());
        Ok(entry)
    }

    async fn apply_classification(
        &self,
        story_id: &str,
        _branch_id: Option<&str>,
        result: &ClassificationResult,
    ) -> Result<(), PipelineError> {
        self.record("apply_classification");
        let mut world = self.world.lock();
        for name in &result.new_characters {
            world.characters.push(Character::new(story_id, name.clone()));
        }
        Ok(())
    }

    async fn save_translation(
        &self,
        _story_id: &str,
        _entry_id: &str,
        _translation: &TranslationResult,
    ) -> Result<(), PipelineError> {
        self.record("save_translation");
        Ok(())
    }

    async fn attach_images(&self, _images: &[EmbeddedImage]) -> Result<(), PipelineError> {
        self.record("attach_images");
        Ok(())
    }

    async fn save_lore(
        &self,
        _story_id: &str,
        _branch_id: Option<&str>,
        _entries: &[LorebookEntry],
    ) -> Result<(), PipelineError> {
        self.record("save_lore");
        Ok(())
    }
}

pub struct StaticClassifier(pub ClassificationResult);

#[async_trait]
impl WorldClassifier for StaticClassifier {
    async fn classify(
        &self,
        _world: &WorldState,
        _narrative: &str,
        _abort: &AbortSignal,
    ) -> Result<ClassificationResult, PipelineError> {
        Ok(self.0.clone())
    }
}

/// Always fails, as a classifier whose structured output could not be parsed would.
pub struct FailingClassifier;

#[async_trait]
impl WorldClassifier for FailingClassifier {
    async fn classify(
        &self,
        _world: &WorldState,
        _narrative: &str,
        _abort: &AbortSignal,
    ) -> Result<ClassificationResult, PipelineError> {
        Err(PipelineError::Dependency(
            "classifier returned garbage".to_string(),
        ))
    }
}

/// Background succeeds; inline images always fail.
pub struct FailingImages;

#[async_trait]
impl ImageGenerator for FailingImages {
    async fn generate_background(
        &self,
        narrative: &str,
        _abort: &AbortSignal,
    ) -> Result<Option<BackgroundImage>, PipelineError> {
        Ok(Some(BackgroundImage {
            prompt: narrative.chars().take(20).collect(),
            image_data: None,
        }))
    }

    async fn generate_images(
        &self,
        _request: &ImageRequest,
        _abort: &AbortSignal,
    ) -> Result<Vec<EmbeddedImage>, PipelineError> {
        Err(PipelineError::Dependency(
            "image backend unavailable".to_string(),
        ))
    }
}

/// Records that it ran.
#[derive(Default)]
pub struct RecordingSuggestions {
    pub ran: Mutex<bool>,
}

#[async_trait]
impl SuggestionGenerator for RecordingSuggestions {
    async fn generate_suggestions(
        &self,
        _world: &WorldState,
        _narrative: &str,
        _abort: &AbortSignal,
    ) -> Result<Vec<String>, PipelineError> {
        *self.ran.lock() = true;
        Ok(vec!["Keep writing".to_string()])
    }

    async fn generate_action_choices(
        &self,
        _world: &WorldState,
        _narrative: &str,
        _abort: &AbortSignal,
    ) -> Result<Vec<String>, PipelineError> {
        *self.ran.lock() = true;
        Ok(vec!["Open the door".to_string(), "Walk away".to_string()])
    }

    async fn manage_lore(
        &self,
        _world: &WorldState,
        _narrative: &str,
        _abort: &AbortSignal,
    ) -> Result<Vec<LorebookEntry>, PipelineError> {
        Ok(Vec::new())
    }
}

pub fn user_action(position: u64) -> StoryEntry {
    StoryEntry {
        id: "action".to_string(),
        story_id: "s".to_string(),
        entry_type: EntryType::UserAction,
        content: "open the door".to_string(),
        parent_id: None,
        position,
        branch_id: None,
        metadata: EntryMetadata::default(),
        translated_content: None,
        translation_language: None,
        created_at: 0,
    }
}

pub struct Fixture {
    pub state: Arc<MemoryState>,
    pub deps: PipelineDependencies,
    pub ctx: GenerationContext,
    pub config: PipelineConfig,
}

impl Fixture {
    pub fn new(narrative: Arc<dyn NarrativeSource>) -> Self {
        let state = Arc::new(MemoryState::default());
        state.world.lock().entries.push(user_action(0));
        Self {
            deps: PipelineDependencies::new(state.clone(), narrative),
            state,
            ctx: GenerationContext::new(user_action(0), StoryMode::Adventure),
            config: PipelineConfig::default(),
        }
    }

    pub fn env<'a>(&'a self, events: &'a EventEmitter) -> PhaseEnv<'a> {
        PhaseEnv {
            deps: &self.deps,
            ctx: &self.ctx,
            config: &self.config,
            events,
        }
    }
}

pub fn drain(rx: &mut UnboundedReceiver<GenerationEvent>) -> Vec<GenerationEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

pub fn drain_names(rx: &mut UnboundedReceiver<GenerationEvent>) -> Vec<&'static str> {
    drain(rx).iter().map(GenerationEvent::name).collect()
}
