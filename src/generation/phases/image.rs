//! Inline images for the narration entry.

use super::PhaseEnv;
use crate::error::PipelineError;
use crate::generation::deps::ImageRequest;
use crate::generation::events::PhaseKind;
use crate::generation::types::{ClassificationResult, ImageResult, TranslationResult};
use crate::story::{Character, StoryEntry};
use tracing::debug;

const PHASE: PhaseKind = PhaseKind::Image;

/// Characters whose names appear in `names`, compared case-insensitively.
pub fn present_characters(characters: &[Character], names: &[String]) -> Vec<Character> {
    let wanted: Vec<String> = names.iter().map(|n| n.trim().to_lowercase()).collect();
    characters
        .iter()
        .filter(|c| wanted.contains(&c.name.trim().to_lowercase()))
        .cloned()
        .collect()
}

pub async fn run(
    env: PhaseEnv<'_>,
    entry: &StoryEntry,
    classification: Option<&ClassificationResult>,
    translation: Option<&TranslationResult>,
) -> Option<ImageResult> {
    if env.aborted() {
        return None;
    }
    if !env.config.inline_images {
        env.skip(PHASE, "inline images disabled");
        return None;
    }
    let Some(generator) = env.deps.images.as_deref() else {
        env.skip(PHASE, "no image generator configured");
        return None;
    };
    env.start(PHASE);

    let outcome: Result<ImageResult, PipelineError> = async {
        let ctx = env.ctx;
        // Reloaded so characters created by classification are matched too.
        let world = env
            .deps
            .state
            .capture_world_state(&ctx.story_id, ctx.branch_id.as_deref())
            .await?;
        let names = classification
            .map(|c| c.present_characters.as_slice())
            .unwrap_or_default();
        let request = ImageRequest {
            story_id: ctx.story_id.clone(),
            branch_id: ctx.branch_id.clone(),
            entry_id: entry.id.clone(),
            narrative: entry.content.clone(),
            translated_narrative: translation.map(|t| t.narrative.clone()),
            present_characters: present_characters(&world.characters, names),
        };
        debug!(
            present = request.present_characters.len(),
            "Requesting inline images"
        );

        let images = generator.generate_images(&request, &ctx.abort).await?;
        env.deps.state.attach_images(&images).await?;
        Ok(ImageResult { images })
    }
    .await;

    env.non_fatal(PHASE, outcome)
}
