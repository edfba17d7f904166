//! Post-generation: follow-up suggestions, action choices and lore management.

use super::PhaseEnv;
use crate::error::PipelineError;
use crate::generation::events::PhaseKind;
use crate::generation::types::{NarrativeResult, PostResult};
use crate::story::StoryMode;

const PHASE: PhaseKind = PhaseKind::Post;

/// Abort is polled between sub-steps; an aborted run keeps what was already produced.
pub async fn run(env: PhaseEnv<'_>, narrative: &NarrativeResult) -> Option<PostResult> {
    if env.aborted() {
        return None;
    }
    if !env.config.post_enabled() {
        let reason = if env.config.interactive {
            "suggestions disabled"
        } else {
            "non-interactive mode"
        };
        env.skip(PHASE, reason);
        return None;
    }
    let Some(generator) = env.deps.suggestions.as_deref() else {
        env.skip(PHASE, "no suggestion generator configured");
        return None;
    };
    env.start(PHASE);

    let outcome: Result<PostResult, PipelineError> = async {
        let ctx = env.ctx;
        let state = &env.deps.state;
        let world = state
            .capture_world_state(&ctx.story_id, ctx.branch_id.as_deref())
            .await?;
        let text = narrative.content.as_str();
        let mut result = PostResult::default();

        match ctx.mode {
            StoryMode::CreativeWriting => {
                result.suggestions = generator
                    .generate_suggestions(&world, text, &ctx.abort)
                    .await?;
            }
            StoryMode::Adventure => {
                result.action_choices = generator
                    .generate_action_choices(&world, text, &ctx.abort)
                    .await?;
            }
        }
        if env.aborted() {
            return Ok(result);
        }

        if let (Some(language), Some(translator)) =
            (env.config.translation_target(), env.deps.translator.as_deref())
        {
            if !result.suggestions.is_empty() {
                result.suggestions = translator
                    .translate_ui_elements(&result.suggestions, language, &ctx.abort)
                    .await?;
            }
            if !result.action_choices.is_empty() {
                result.action_choices = translator
                    .translate_ui_elements(&result.action_choices, language, &ctx.abort)
                    .await?;
            }
        }
        if env.aborted() || !env.config.lore_management {
            return Ok(result);
        }

        let lore = generator.manage_lore(&world, text, &ctx.abort).await?;
        if !lore.is_empty() {
            state
                .save_lore(&ctx.story_id, ctx.branch_id.as_deref(), &lore)
                .await?;
        }
        result.lore_updates = lore;
        Ok(result)
    }
    .await;

    env.non_fatal(PHASE, outcome)
}
