//! Integration tests for the Storyloom turn engine

mod branching;
mod import_roundtrip;
mod pipeline_turn;
mod retry_roundtrip;
mod support;
