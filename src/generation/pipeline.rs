//! Generation pipeline
//!
//! Runs one turn through the fixed phase order:
//! `pre → retrieval → narrative → {classification ∥ background image}`,
//! then `translation → image → post`.
//! The abort signal is checked after every phase; an aborted run returns its partial result
//! with `aborted` set and emits one `aborted` event. Any error escaping a phase is recorded as
//! `fatal_error`, reported through one fatal `error` event, and the partial result is kept.

use crate::error::PipelineError;
use crate::generation::context::{GenerationContext, PipelineConfig};
use crate::generation::deps::{NarrativeRequest, PipelineDependencies};
use crate::generation::events::{EventEmitter, GenerationEvent, PhaseKind};
use crate::generation::merge::merge_phases;
use crate::generation::phases::narrative::NarrativeOutcome;
use crate::generation::phases::{
    background, classification, image, narrative, post, pre, retrieval, translation, PhaseEnv,
};
use crate::generation::types::PipelineResult;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tracing::{error, info, instrument};

pub struct GenerationPipeline {
    deps: PipelineDependencies,
}

/// Bookkeeping for one run.
struct Run<'a> {
    env: PhaseEnv<'a>,
    phase: PhaseKind,
    result: PipelineResult,
}

impl Run<'_> {
    fn enter(&mut self, phase: PhaseKind) {
        self.phase = phase;
    }

    /// True when the run must stop after the current phase.
    fn stop_if_aborted(&mut self) -> bool {
        if !self.env.aborted() {
            return false;
        }
        info!(phase = %self.phase, "Generation aborted");
        self.env.events.emit(GenerationEvent::Aborted { phase: self.phase });
        self.result.aborted = true;
        true
    }
}

impl GenerationPipeline {
    pub fn new(deps: PipelineDependencies) -> Self {
        Self { deps }
    }

    /// Run every phase for `ctx`, streaming events to `events`. Never fails: errors end up in
    /// [`PipelineResult::fatal_error`].
    #[instrument(skip_all, fields(story_id = %ctx.story_id, branch_id = ?ctx.branch_id))]
    pub async fn execute(
        &self,
        ctx: &GenerationContext,
        config: &PipelineConfig,
        events: &EventEmitter,
    ) -> PipelineResult {
        let mut run = Run {
            env: PhaseEnv {
                deps: &self.deps,
                ctx,
                config,
                events,
            },
            phase: PhaseKind::Pre,
            result: PipelineResult::default(),
        };

        if let Err(err) = Self::run_phases(&mut run).await {
            error!(phase = %run.phase, error = %err, "Generation failed");
            events.emit(GenerationEvent::Error {
                phase: Some(run.phase),
                message: err.to_string(),
                fatal: true,
            });
            run.result.fatal_error = Some(err.to_string());
        }
        run.result
    }

    /// Run on a new task. Events arrive on the returned receiver; the handle yields the
    /// result.
    pub fn spawn(
        self: &Arc<Self>,
        ctx: GenerationContext,
        config: PipelineConfig,
    ) -> (UnboundedReceiver<GenerationEvent>, JoinHandle<PipelineResult>) {
        let (events, rx) = EventEmitter::channel();
        let pipeline = Arc::clone(self);
        let handle = tokio::spawn(async move {
            pipeline.execute(&ctx, &config, &events).await
        });
        (rx, handle)
    }

    async fn run_phases(run: &mut Run<'_>) -> Result<(), PipelineError> {
        let env = run.env;
        let ctx = env.ctx;

        run.enter(PhaseKind::Pre);
        let pre_outcome = pre::run(env).await?;
        if run.stop_if_aborted() {
            return Ok(());
        }
        let Some((pre_result, world)) = pre_outcome else {
            return Ok(());
        };
        run.result.pre = Some(pre_result);

        run.enter(PhaseKind::Retrieval);
        run.result.retrieval = retrieval::run(env, &world).await;
        if run.stop_if_aborted() {
            return Ok(());
        }

        run.enter(PhaseKind::Narrative);
        let retrieved = run.result.retrieval.as_ref();
        let recent_from = world
            .entries
            .len()
            .saturating_sub(env.config.recent_entries);
        let request = NarrativeRequest {
            story_id: ctx.story_id.clone(),
            branch_id: ctx.branch_id.clone(),
            mode: ctx.mode,
            user_action: ctx.user_action.content.clone(),
            recent_entries: world.entries[recent_from..].to_vec(),
            memory_context: retrieved.and_then(|r| r.memory_context.clone()),
            lorebook_context: retrieved
                .and_then(|r| r.lorebook.as_ref())
                .and_then(|l| l.context.clone()),
            visual_prose: env.config.visual_prose,
        };
        let narrative = match narrative::run(env, &request).await? {
            NarrativeOutcome::Complete(result) => result,
            NarrativeOutcome::Aborted => {
                run.stop_if_aborted();
                return Ok(());
            }
            NarrativeOutcome::Exhausted { attempts } => {
                run.result.fatal_error =
                    Some(format!("narrative was empty after {attempts} attempts"));
                return Ok(());
            }
        };
        let entry = env
            .deps
            .state
            .append_narration(
                &ctx.story_id,
                ctx.branch_id.as_deref(),
                &ctx.user_action.id,
                &narrative,
            )
            .await?;
        run.result.narrative = Some(narrative.clone());
        run.result.narration_entry = Some(entry.clone());
        if run.stop_if_aborted() {
            return Ok(());
        }

        run.enter(PhaseKind::Classification);
        let (classified, background) = merge_phases(
            classification::run(env, &world, &narrative),
            background::run(env, &narrative),
        )
        .await?;
        run.result.classification = classified;
        run.result.background_image = background;
        if run.stop_if_aborted() {
            return Ok(());
        }

        run.enter(PhaseKind::Translation);
        if let Some(pre_result) = run.result.pre.as_ref() {
            run.result.translation = translation::run(env, pre_result, &narrative, &entry).await;
        }
        if run.stop_if_aborted() {
            return Ok(());
        }

        run.enter(PhaseKind::Image);
        run.result.image = image::run(
            env,
            &entry,
            run.result.classification.as_ref(),
            run.result.translation.as_ref(),
        )
        .await;
        if run.stop_if_aborted() {
            return Ok(());
        }

        run.enter(PhaseKind::Post);
        run.result.post = post::run(env, &narrative).await;
        run.stop_if_aborted();
        Ok(())
    }
}
