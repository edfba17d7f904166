//! CLI parse: clap types for Storyloom. No behavior; definitions only.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Storyloom CLI - inspect and manage story timelines, branches and checkpoints
#[derive(Parser)]
#[command(name = "storyloom")]
#[command(about = "Branching timelines, checkpoints and retry rollback for interactive fiction")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Workspace root directory
    #[arg(long, default_value = ".")]
    pub workspace: PathBuf,

    /// Configuration file path (overrides default config loading)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging (default: off)
    #[arg(long, default_value = "false")]
    pub verbose: bool,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long)]
    pub log_format: Option<String>,

    /// Log output (stdout, stderr, file, both)
    #[arg(long)]
    pub log_output: Option<String>,

    /// Log file path (if output includes "file")
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    Adventure,
    CreativeWriting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum FormatArg {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List stories
    Stories {
        #[arg(long, value_enum, default_value_t)]
        format: FormatArg,
    },
    /// Create an empty story
    New {
        title: String,
        /// Story mode (defaults to generation.story_mode)
        #[arg(long, value_enum)]
        mode: Option<ModeArg>,
    },
    /// Show the visible timeline of a branch
    Entries {
        story: String,
        /// Branch ID (defaults to the story's current branch)
        #[arg(long)]
        branch: Option<String>,
        /// Show the main timeline even when another branch is current
        #[arg(long, conflicts_with = "branch")]
        main: bool,
        #[arg(long, value_enum, default_value_t)]
        format: FormatArg,
    },
    /// Append a user action to the story's current branch
    Act { story: String, text: String },
    /// List branches of a story
    Branches {
        story: String,
        #[arg(long, value_enum, default_value_t)]
        format: FormatArg,
    },
    /// Fork a branch at an entry, or from a checkpoint
    Fork {
        story: String,
        /// Entry to fork at
        #[arg(
            required_unless_present = "from_checkpoint",
            conflicts_with = "from_checkpoint"
        )]
        entry: Option<String>,
        /// Checkpoint to restore the new branch from
        #[arg(long)]
        from_checkpoint: Option<String>,
        #[arg(long)]
        name: String,
    },
    /// Make a branch current (omit --branch for the main timeline)
    Switch {
        story: String,
        #[arg(long)]
        branch: Option<String>,
    },
    /// Delete a branch and everything it owns
    DeleteBranch { story: String, branch: String },
    /// Snapshot a branch into a checkpoint
    Checkpoint {
        story: String,
        /// Branch ID (defaults to the story's current branch)
        #[arg(long)]
        branch: Option<String>,
        #[arg(long)]
        name: String,
    },
    /// List checkpoints of a story
    Checkpoints {
        story: String,
        #[arg(long, value_enum, default_value_t)]
        format: FormatArg,
    },
    /// Undo the last turn (an `act` and anything generated for it)
    Rollback { story: String },
    /// Export a story as JSON
    Export {
        story: String,
        /// Write to a file instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Import a story export; every ID is reassigned
    Import { file: PathBuf },
    /// Answer one sync request read from a JSON file and print the response
    Sync {
        request: PathBuf,
        /// Caller address, used to throttle repeated bad tokens
        #[arg(long, default_value = "local")]
        client: String,
    },
    /// Show the effective configuration
    Config {
        /// Only validate; print problems and exit non-zero on failure
        #[arg(long)]
        validate: bool,
    },
}
