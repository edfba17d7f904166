//! Pre-generation: retry backup and clock setup.

use super::PhaseEnv;
use crate::error::PipelineError;
use crate::generation::events::PhaseKind;
use crate::generation::types::PreGenerationResult;
use crate::retry::RetryBackup;
use crate::story::WorldState;
use tracing::debug;

const PHASE: PhaseKind = PhaseKind::Pre;

/// Back up the branch before anything is written. Failures are fatal: a turn without a
/// backup cannot be rolled back.
///
/// Returns the world state as it was before the action so later phases need not reload it.
pub async fn run(
    env: PhaseEnv<'_>,
) -> Result<Option<(PreGenerationResult, WorldState)>, PipelineError> {
    if env.aborted() {
        return Ok(None);
    }
    env.start(PHASE);
    let ctx = env.ctx;
    let state = &env.deps.state;

    let world = state
        .capture_world_state(&ctx.story_id, ctx.branch_id.as_deref())
        .await?;
    let activation = state.activation_data(&ctx.story_id).await?;
    let backup = RetryBackup::capture(
        &world,
        ctx.story_id.clone(),
        ctx.branch_id.clone(),
        ctx.user_action.position,
        ctx.user_action.content.clone(),
        env.config.full_state_backup,
    )
    .with_activation_data(activation);
    state.save_retry_backup(&backup.to_persistent()).await?;

    let time_tracker = state.ensure_time_tracker(&ctx.story_id).await?;
    debug!(
        story_id = %ctx.story_id,
        watermark = backup.entry_count_before_action,
        full_state = backup.has_full_state(),
        "Captured retry backup"
    );
    env.complete(PHASE);

    Ok(Some((
        PreGenerationResult {
            backup,
            time_tracker,
            visual_prose_mode: env.config.visual_prose,
        },
        world,
    )))
}
