//! Property-based tests for positions, ID remapping and the in-world clock

mod clock;
mod fork_positions;
mod id_remap;
