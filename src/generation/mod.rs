//! Turn generation
//!
//! A turn is driven by [`GenerationPipeline`]: the caller builds a [`GenerationContext`] and a
//! [`PipelineConfig`], runs the pipeline, and consumes [`GenerationEvent`]s while the
//! pipeline mutates story state through [`StateHooks`].

pub mod context;
pub mod deps;
pub mod events;
pub mod merge;
pub mod phases;
pub mod pipeline;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use context::{GenerationContext, PipelineConfig};
pub use deps::{
    ContextRetriever, ImageGenerator, ImageRequest, NarrativeChunk, NarrativeRequest,
    NarrativeSource, NarrativeStream, PipelineDependencies, StateHooks, SuggestionGenerator,
    Translator, WorldClassifier,
};
pub use events::{EventEmitter, GenerationEvent, PhaseKind, PhaseSummary};
pub use phases::narrative::{NarrativeOutcome, MAX_ATTEMPTS};
pub use pipeline::GenerationPipeline;
pub use types::{
    BackgroundImage, ClassificationResult, ImageResult, LorebookContext, NarrativeResult,
    PipelineResult, PostResult, PreGenerationResult, RetrievalResult, TranslationResult,
};
