//! One full turn through the pipeline against a sled-backed world, then a retry.

use super::support::{contents, seed_story, temp_store};
use async_trait::async_trait;
use std::sync::Arc;
use storyloom::abort::AbortSignal;
use storyloom::branch::BranchManager;
use storyloom::error::PipelineError;
use storyloom::generation::{
    ClassificationResult, GenerationContext, GenerationEvent, GenerationPipeline,
    NarrativeChunk, NarrativeRequest, NarrativeSource, NarrativeStream, PipelineConfig,
    PipelineDependencies, SuggestionGenerator, WorldClassifier,
};
use storyloom::retry::RetryService;
use storyloom::store::StoryStore;
use storyloom::story::{LorebookEntry, StoryMode, WorldState};
use storyloom::world::StoryWorld;

struct Bell;

#[async_trait]
impl NarrativeSource for Bell {
    async fn stream_narrative(
        &self,
        request: &NarrativeRequest,
        _abort: &AbortSignal,
    ) -> Result<NarrativeStream, PipelineError> {
        assert_eq!(request.user_action, "ring the bell");
        let chunks = vec![
            Ok(NarrativeChunk::text("The bell ")),
            Ok(NarrativeChunk::text("tolls.")),
        ];
        Ok(Box::pin(futures::stream::iter(chunks)))
    }
}

struct Keeper;

#[async_trait]
impl WorldClassifier for Keeper {
    async fn classify(
        &self,
        _world: &WorldState,
        narrative: &str,
        _abort: &AbortSignal,
    ) -> Result<ClassificationResult, PipelineError> {
        assert_eq!(narrative, "The bell tolls.");
        Ok(ClassificationResult {
            new_characters: vec!["Keeper".to_string()],
            present_characters: vec!["Keeper".to_string()],
            new_locations: vec!["Bell Tower".to_string()],
            current_location: Some("Bell Tower".to_string()),
            elapsed_minutes: 30,
            ..ClassificationResult::default()
        })
    }
}

struct Choices;

#[async_trait]
impl SuggestionGenerator for Choices {
    async fn generate_suggestions(
        &self,
        _world: &WorldState,
        _narrative: &str,
        _abort: &AbortSignal,
    ) -> Result<Vec<String>, PipelineError> {
        Ok(Vec::new())
    }

    async fn generate_action_choices(
        &self,
        world: &WorldState,
        _narrative: &str,
        _abort: &AbortSignal,
    ) -> Result<Vec<String>, PipelineError> {
        // Post runs after classification has been applied.
        assert!(world.characters.iter().any(|c| c.name == "Keeper"));
        Ok(vec!["Climb".to_string(), "Listen".to_string()])
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

#[tokio::test]
async fn test_turn_persists_and_retry_undoes_it() {
    let world = Arc::new(StoryWorld::new(BranchManager::new(temp_store())));
    let (story, seeded) = seed_story(world.branches(), 2);

    let action = world.begin_turn(&story.id, "ring the bell").unwrap();
    let deps = PipelineDependencies::new(world.clone(), Arc::new(Bell))
        .with_classifier(Arc::new(Keeper))
        .with_suggestions(Arc::new(Choices));
    let pipeline = Arc::new(GenerationPipeline::new(deps));

    let ctx = GenerationContext::new(action.clone(), StoryMode::Adventure);
    let (mut rx, handle) = pipeline.spawn(ctx, PipelineConfig::default());
    let result = handle.await.unwrap();

    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }

    assert!(result.succeeded(), "{:?}", result.fatal_error);
    assert!(!events
        .iter()
        .any(|e| matches!(e, GenerationEvent::Error { .. })));
    let chunks = events
        .iter()
        .filter(|e| matches!(e, GenerationEvent::NarrativeChunk { .. }))
        .count();
    assert_eq!(chunks, 2);
    assert_eq!(
        result.post.as_ref().unwrap().action_choices,
        vec!["Climb".to_string(), "Listen".to_string()]
    );

    let branches = world.branches();
    let after = branches.world_state(&story.id, None).unwrap();
    assert_eq!(
        contents(&after.entries),
        ["main 0", "main 1", "ring the bell", "The bell tolls."]
    );
    let narration = result.narration_entry.as_ref().unwrap();
    assert_eq!(narration.parent_id.as_deref(), Some(action.id.as_str()));
    assert!(after.characters.iter().any(|c| c.name == "Keeper"));
    assert!(after
        .locations
        .iter()
        .any(|l| l.name == "Bell Tower" && l.current));
    let clock = branches
        .require_story(&story.id)
        .unwrap()
        .time_tracker
        .unwrap();
    assert_eq!(clock.minutes, 30);

    // The pipeline persisted an ID-differential backup keyed to the action.
    let backup = world.persisted_backup(&story.id).unwrap().unwrap();
    assert!(!backup.has_full_state());
    assert_eq!(backup.entry_count_before_action, action.position);

    let restored = RetryService::new()
        .handle_retry_last_message(&backup, world.as_ref())
        .await;
    assert!(restored.success, "{:?}", restored.error);

    let rolled_back = branches.world_state(&story.id, None).unwrap();
    assert_eq!(rolled_back.entries, seeded);
    assert!(rolled_back.characters.is_empty());
    assert!(rolled_back.locations.is_empty());
    assert!(branches
        .store()
        .get_retry_backup(&story.id)
        .unwrap()
        .is_some());
}
