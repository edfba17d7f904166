//! Storyloom: turn orchestration for interactive fiction
//!
//! Runs the phases of one story turn (backup, retrieval, streamed narrative, classification,
//! images, translation, follow-ups), rolls a failed or aborted turn back, and keeps branching
//! timelines with sealed checkpoints and ID-remapping import.

pub mod abort;
pub mod branch;
pub mod cli;
pub mod config;
pub mod error;
pub mod generation;
pub mod import;
pub mod logging;
pub mod retry;
pub mod store;
pub mod story;
pub mod world;
