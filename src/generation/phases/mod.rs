//! Phase implementations.
//!
//! Every phase checks the abort signal at entry and emits `phase_start` / `phase_complete`
//! around its work. Phases whose collaborator is missing or disabled emit a skipped
//! completion instead. Translation, image, background-image, retrieval and post failures are
//! reported as non-fatal `error` events and leave their result empty.

pub mod background;
pub mod classification;
pub mod image;
pub mod narrative;
pub mod post;
pub mod pre;
pub mod retrieval;
pub mod translation;

use crate::error::PipelineError;
use crate::generation::context::{GenerationContext, PipelineConfig};
use crate::generation::deps::PipelineDependencies;
use crate::generation::events::{EventEmitter, GenerationEvent, PhaseKind};
use tracing::{debug, warn};

/// What every phase can see.
#[derive(Clone, Copy)]
pub struct PhaseEnv<'a> {
    pub deps: &'a PipelineDependencies,
    pub ctx: &'a GenerationContext,
    pub config: &'a PipelineConfig,
    pub events: &'a EventEmitter,
}

impl PhaseEnv<'_> {
    pub fn aborted(&self) -> bool {
        self.ctx.abort.aborted()
    }

    pub(crate) fn start(&self, phase: PhaseKind) {
        self.events.emit(GenerationEvent::PhaseStart { phase });
    }

    pub(crate) fn complete(&self, phase: PhaseKind) {
        self.events.emit(GenerationEvent::complete(phase));
    }

    pub(crate) fn skip(&self, phase: PhaseKind, reason: &str) {
        debug!(phase = %phase, reason, "Phase skipped");
        self.events.emit(GenerationEvent::skipped(phase, reason));
    }

    /// Log and report a failure that must not stop the run.
    pub(crate) fn non_fatal<T>(
        &self,
        phase: PhaseKind,
        outcome: Result<T, PipelineError>,
    ) -> Option<T> {
        match outcome {
            Ok(value) => {
                self.complete(phase);
                Some(value)
            }
            Err(err) => {
                warn!(phase = %phase, error = %err, "Phase failed; continuing without its result");
                self.events.emit(GenerationEvent::Error {
                    phase: Some(phase),
                    message: err.to_string(),
                    fatal: false,
                });
                None
            }
        }
    }
}
