pub mod env_source;
pub mod global_file;
pub mod workspace_file;
