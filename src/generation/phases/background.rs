//! Scene background image.

use super::PhaseEnv;
use crate::error::PipelineError;
use crate::generation::events::PhaseKind;
use crate::generation::types::{BackgroundImage, NarrativeResult};

const PHASE: PhaseKind = PhaseKind::BackgroundImage;

/// Runs alongside classification. Generator failures are non-fatal; the `Result` return
/// exists so the merge can still fail this side on errors outside the generator.
pub async fn run(
    env: PhaseEnv<'_>,
    narrative: &NarrativeResult,
) -> Result<Option<BackgroundImage>, PipelineError> {
    if env.aborted() {
        return Ok(None);
    }
    if !env.config.background_images {
        env.skip(PHASE, "background images disabled");
        return Ok(None);
    }
    let Some(generator) = env.deps.images.as_deref() else {
        env.skip(PHASE, "no image generator configured");
        return Ok(None);
    };
    env.start(PHASE);

    let outcome = generator
        .generate_background(&narrative.content, &env.ctx.abort)
        .await;
    Ok(env.non_fatal(PHASE, outcome).flatten())
}
