//! Narrative translation.

use super::PhaseEnv;
use crate::error::PipelineError;
use crate::generation::events::PhaseKind;
use crate::generation::types::{NarrativeResult, PreGenerationResult, TranslationResult};
use crate::story::StoryEntry;

const PHASE: PhaseKind = PhaseKind::Translation;

/// Translate the narration entry into the configured language. Visual-prose narratives are
/// translated with their markup preserved.
pub async fn run(
    env: PhaseEnv<'_>,
    pre: &PreGenerationResult,
    narrative: &NarrativeResult,
    entry: &StoryEntry,
) -> Option<TranslationResult> {
    if env.aborted() {
        return None;
    }
    let Some(language) = env.config.translation_target() else {
        env.skip(PHASE, "translation disabled");
        return None;
    };
    let Some(translator) = env.deps.translator.as_deref() else {
        env.skip(PHASE, "no translator configured");
        return None;
    };
    env.start(PHASE);

    let outcome: Result<TranslationResult, PipelineError> = async {
        let translated = translator
            .translate_narrative(
                &narrative.content,
                language,
                pre.visual_prose_mode,
                &env.ctx.abort,
            )
            .await?;
        let result = TranslationResult {
            language: language.to_string(),
            narrative: translated,
            preserved_markup: pre.visual_prose_mode,
        };
        env.deps
            .state
            .save_translation(&env.ctx.story_id, &entry.id, &result)
            .await?;
        Ok(result)
    }
    .await;

    env.non_fatal(PHASE, outcome)
}
