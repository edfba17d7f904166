//! CLI domain: parse, route, output, and presentation only.
//! No domain orchestration; single route table dispatches to the branch manager, importer
//! and retry service.

mod output;
mod parse;
mod presentation;
mod route;

pub use output::map_error;
pub use parse::{Cli, Commands, FormatArg, ModeArg};
pub use route::RunContext;
