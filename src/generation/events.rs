//! Generation events: the observable output of a pipeline run.

use crate::generation::types::ClassificationResult;
use serde::Serialize;
use std::fmt;
use tokio::sync::mpsc;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseKind {
    Pre,
    Retrieval,
    Narrative,
    Classification,
    BackgroundImage,
    Translation,
    Image,
    Post,
}

impl PhaseKind {
    pub fn as_str(self) -> &'static str {
        match self {
            PhaseKind::Pre => "pre",
            PhaseKind::Retrieval => "retrieval",
            PhaseKind::Narrative => "narrative",
            PhaseKind::Classification => "classification",
            PhaseKind::BackgroundImage => "background_image",
            PhaseKind::Translation => "translation",
            PhaseKind::Image => "image",
            PhaseKind::Post => "post",
        }
    }
}

impl fmt::Display for PhaseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload of a `phase_complete` event.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PhaseSummary {
    Narrative {
        content: String,
        reasoning: Option<String>,
        chunk_count: usize,
    },
    Skipped {
        reason: String,
    },
    Done,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GenerationEvent {
    PhaseStart {
        phase: PhaseKind,
    },
    PhaseComplete {
        phase: PhaseKind,
        summary: PhaseSummary,
    },
    NarrativeChunk {
        content: String,
        reasoning: Option<String>,
    },
    NarrativeComplete {
        content: String,
    },
    ClassificationComplete {
        result: ClassificationResult,
    },
    Error {
        phase: Option<PhaseKind>,
        message: String,
        fatal: bool,
    },
    Aborted {
        phase: PhaseKind,
    },
}

impl GenerationEvent {
    pub fn name(&self) -> &'static str {
        match self {
            GenerationEvent::PhaseStart { .. } => "phase_start",
            GenerationEvent::PhaseComplete { .. } => "phase_complete",
            GenerationEvent::NarrativeChunk { .. } => "narrative_chunk",
            GenerationEvent::NarrativeComplete { .. } => "narrative_complete",
            GenerationEvent::ClassificationComplete { .. } => "classification_complete",
            GenerationEvent::Error { .. } => "error",
            GenerationEvent::Aborted { .. } => "aborted",
        }
    }

    pub fn is_fatal_error(&self) -> bool {
        matches!(self, GenerationEvent::Error { fatal: true, .. })
    }

    pub(crate) fn complete(phase: PhaseKind) -> Self {
        GenerationEvent::PhaseComplete {
            phase,
            summary: PhaseSummary::Done,
        }
    }

    pub(crate) fn skipped(phase: PhaseKind, reason: impl Into<String>) -> Self {
        GenerationEvent::PhaseComplete {
            phase,
            summary: PhaseSummary::Skipped {
                reason: reason.into(),
            },
        }
    }
}

/// Best-effort event sink. A dropped receiver never fails a pipeline run.
#[derive(Debug, Clone, Default)]
pub struct EventEmitter {
    tx: Option<mpsc::UnboundedSender<GenerationEvent>>,
}

impl EventEmitter {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<GenerationEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    /// An emitter that drops every event.
    pub fn discard() -> Self {
        Self::default()
    }

    pub fn emit(&self, event: GenerationEvent) {
        let Some(tx) = &self.tx else {
            return;
        };
        if let Err(err) = tx.send(event) {
            debug!(event = err.0.name(), "Event receiver dropped");
        }
    }
}
