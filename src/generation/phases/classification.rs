//! World-state classification of the new narrative.

use super::PhaseEnv;
use crate::error::PipelineError;
use crate::generation::events::{GenerationEvent, PhaseKind};
use crate::generation::types::{ClassificationResult, NarrativeResult};
use crate::story::WorldState;
use tracing::{debug, info};

const PHASE: PhaseKind = PhaseKind::Classification;

/// Classify and apply world-state changes. Failures are fatal: a half-applied
/// classification leaves the world inconsistent with the narrative.
pub async fn run(
    env: PhaseEnv<'_>,
    world: &WorldState,
    narrative: &NarrativeResult,
) -> Result<Option<ClassificationResult>, PipelineError> {
    if env.aborted() {
        return Ok(None);
    }
    let Some(classifier) = env.deps.classifier.as_deref() else {
        env.skip(PHASE, "no classifier configured");
        return Ok(None);
    };
    env.start(PHASE);
    let ctx = env.ctx;

    let result = classifier
        .classify(world, &narrative.content, &ctx.abort)
        .await?;
    if env.aborted() {
        debug!("Abort observed before applying classification");
        return Ok(None);
    }
    env.deps
        .state
        .apply_classification(&ctx.story_id, ctx.branch_id.as_deref(), &result)
        .await?;

    info!(
        present = result.present_characters.len(),
        new_characters = result.new_characters.len(),
        new_locations = result.new_locations.len(),
        new_items = result.new_items.len(),
        "Classification applied"
    );
    env.events.emit(GenerationEvent::ClassificationComplete {
        result: result.clone(),
    });
    env.complete(PHASE);
    Ok(Some(result))
}
