//! Streamed narrative synthesis
//!
//! Streams chunks from the narrative source, forwarding each non-empty chunk as a
//! `narrative_chunk` event. A stream that completes with only whitespace is restarted from
//! scratch, up to [`MAX_ATTEMPTS`] streams in total. Abort is polled before each attempt,
//! before each chunk, and after each stream ends.

use super::PhaseEnv;
use crate::error::PipelineError;
use crate::generation::deps::NarrativeRequest;
use crate::generation::events::{GenerationEvent, PhaseKind, PhaseSummary};
use crate::generation::types::NarrativeResult;
use futures::StreamExt;
use tracing::{debug, error, info, warn};

pub const MAX_ATTEMPTS: u32 = 3;

const PHASE: PhaseKind = PhaseKind::Narrative;

#[derive(Debug, Clone, PartialEq)]
pub enum NarrativeOutcome {
    Complete(NarrativeResult),
    Aborted,
    /// Every attempt produced empty output. A fatal `error` event has been emitted.
    Exhausted { attempts: u32 },
}

pub async fn run(
    env: PhaseEnv<'_>,
    request: &NarrativeRequest,
) -> Result<NarrativeOutcome, PipelineError> {
    if env.aborted() {
        return Ok(NarrativeOutcome::Aborted);
    }
    env.start(PHASE);
    let abort = &env.ctx.abort;

    for attempt in 1..=MAX_ATTEMPTS {
        if abort.aborted() {
            return Ok(NarrativeOutcome::Aborted);
        }
        if attempt > 1 {
            warn!(
                attempt,
                max = MAX_ATTEMPTS,
                "Empty narrative; restarting stream"
            );
        }

        let mut stream = env.deps.narrative.stream_narrative(request, abort).await?;
        let mut content = String::new();
        let mut reasoning = String::new();
        let mut chunk_count = 0usize;

        while let Some(chunk) = stream.next().await {
            if abort.aborted() {
                debug!(chunk_count, "Abort observed mid-stream");
                return Ok(NarrativeOutcome::Aborted);
            }
            let chunk = chunk?;
            if chunk.is_empty() {
                continue;
            }
            content.push_str(&chunk.content);
            if let Some(r) = &chunk.reasoning {
                reasoning.push_str(r);
            }
            chunk_count += 1;
            env.events.emit(GenerationEvent::NarrativeChunk {
                content: chunk.content,
                reasoning: chunk.reasoning,
            });
        }

        if abort.aborted() {
            return Ok(NarrativeOutcome::Aborted);
        }
        if content.trim().is_empty() {
            continue;
        }

        let result = NarrativeResult {
            content,
            reasoning: (!reasoning.is_empty()).then_some(reasoning),
            chunk_count,
            attempts: attempt,
        };
        info!(
            attempt,
            chunk_count,
            chars = result.content.len(),
            "Narrative complete"
        );
        env.events.emit(GenerationEvent::NarrativeComplete {
            content: result.content.clone(),
        });
        env.events.emit(GenerationEvent::PhaseComplete {
            phase: PHASE,
            summary: PhaseSummary::Narrative {
                content: result.content.clone(),
                reasoning: result.reasoning.clone(),
                chunk_count,
            },
        });
        return Ok(NarrativeOutcome::Complete(result));
    }

    error!(
        attempts = MAX_ATTEMPTS,
        "Narrative stayed empty after every attempt"
    );
    env.events.emit(GenerationEvent::Error {
        phase: Some(PHASE),
        message: format!("narrative was empty after {MAX_ATTEMPTS} attempts"),
        fatal: true,
    });
    Ok(NarrativeOutcome::Exhausted { attempts: MAX_ATTEMPTS })
}
