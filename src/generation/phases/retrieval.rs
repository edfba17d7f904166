//! Memory and lorebook context retrieval.

use super::PhaseEnv;
use crate::error::PipelineError;
use crate::generation::events::PhaseKind;
use crate::generation::types::RetrievalResult;
use crate::story::WorldState;

const PHASE: PhaseKind = PhaseKind::Retrieval;

/// Gather context for the narrative prompt. Polls the abort signal between the memory and
/// lorebook lookups.
pub async fn run(env: PhaseEnv<'_>, world: &WorldState) -> Option<RetrievalResult> {
    if env.aborted() {
        return None;
    }
    let Some(retriever) = env.deps.retriever.as_deref() else {
        env.skip(PHASE, "no context retriever configured");
        return None;
    };
    env.start(PHASE);

    let outcome: Result<RetrievalResult, PipelineError> = async {
        let ctx = env.ctx;
        let action = ctx.user_action.content.as_str();
        let memory_context = retriever.retrieve_memory(world, action, &ctx.abort).await?;
        let mut result = RetrievalResult {
            memory_context,
            lorebook: None,
        };
        if env.aborted() {
            return Ok(result);
        }

        let lorebook = retriever.retrieve_lorebook(world, action, &ctx.abort).await?;
        if !lorebook.activated.is_empty() {
            env.deps
                .state
                .record_activation(
                    &ctx.story_id,
                    ctx.branch_id.as_deref(),
                    &lorebook.activated,
                )
                .await?;
        }
        result.lorebook = Some(lorebook);
        Ok(result)
    }
    .await;

    env.non_fatal(PHASE, outcome)
}
