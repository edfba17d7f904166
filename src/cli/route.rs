//! CLI route: single route table and run context. Dispatches to domain services and presentation.

use crate::branch::BranchManager;
use crate::cli::parse::{Commands, FormatArg, ModeArg};
use crate::cli::presentation::{
    format_branches_text, format_checkpoints_text, format_entries_text, format_import_report,
    format_restore_result, format_stories_text, to_json,
};
use crate::config::{ConfigLoader, StoryloomConfig};
use crate::error::{ApiError, ImportError, StorageError};
use crate::import::sync::connect_code;
use crate::import::{export_story, Importer, SyncHandler, SyncRequest};
use crate::retry::RetryService;
use crate::store::{SledStoryStore, StoryStore};
use crate::story::{Story, StoryMode};
use crate::world::StoryWorld;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// Runtime context for CLI execution: workspace, loaded config and the opened store.
/// Built from workspace path and optional config path using ConfigLoader only.
pub struct RunContext {
    workspace_root: PathBuf,
    config: StoryloomConfig,
    store_path: PathBuf,
    store: Arc<SledStoryStore>,
    branches: BranchManager<SledStoryStore>,
}

impl RunContext {
    /// Create run context from workspace root and optional config path. Uses ConfigLoader only.
    pub fn new(workspace_root: PathBuf, config_path: Option<PathBuf>) -> Result<Self, ApiError> {
        let config = load_config(&workspace_root, config_path.as_deref())?;
        config.ensure_valid()?;

        let store_path = config.storage.resolve_store_path(&workspace_root)?;
        std::fs::create_dir_all(&store_path)
            .map_err(|e| ApiError::StorageError(StorageError::IoError(e)))?;
        let store = Arc::new(SledStoryStore::new(&store_path)?);
        info!(store = %store_path.display(), "Opened story store");

        Ok(Self {
            workspace_root,
            config,
            store_path,
            branches: BranchManager::new(Arc::clone(&store)),
            store,
        })
    }

    pub fn config(&self) -> &StoryloomConfig {
        &self.config
    }

    /// Execute a CLI command via the single route table.
    pub fn execute(&self, command: &Commands) -> Result<String, ApiError> {
        let result = self.execute_inner(command);
        self.store.flush()?;
        result
    }

    fn execute_inner(&self, command: &Commands) -> Result<String, ApiError> {
        match command {
            Commands::Stories { format } => {
                let stories = self.store.list_stories()?;
                match format {
                    FormatArg::Json => to_json(&stories),
                    FormatArg::Text => Ok(format_stories_text(&stories)),
                }
            }
            Commands::New { title, mode } => self.handle_new(title, *mode),
            Commands::Entries {
                story,
                branch,
                main,
                format,
            } => self.handle_entries(story, branch.as_deref(), *main, *format),
            Commands::Act { story, text } => {
                let world = StoryWorld::new(self.branches.clone());
                let entry = world.begin_turn(story, text)?;
                Ok(format!(
                    "Appended entry {} at position {}",
                    entry.id, entry.position
                ))
            }
            Commands::Branches { story, format } => {
                let current = self.branches.require_story(story)?.current_branch_id;
                let branches = self.branches.list_branches(story)?;
                match format {
                    FormatArg::Json => to_json(&branches),
                    FormatArg::Text => {
                        Ok(format_branches_text(&branches, current.as_deref()))
                    }
                }
            }
            Commands::Fork {
                story,
                entry,
                from_checkpoint,
                name,
            } => {
                let branch = match (entry, from_checkpoint) {
                    (_, Some(checkpoint_id)) => {
                        self.branches.fork_from_checkpoint(story, checkpoint_id, name)?
                    }
                    (Some(entry_id), None) => self.branches.fork(story, entry_id, name)?,
                    (None, None) => {
                        return Err(ApiError::ConfigError(
                            "fork needs an entry or --from-checkpoint".to_string(),
                        ))
                    }
                };
                Ok(format!("Created branch {} ({})", branch.name, branch.id))
            }
            Commands::Switch { story, branch } => {
                let updated = self.branches.switch_branch(story, branch.as_deref())?;
                Ok(format!(
                    "Current branch: {}",
                    updated.current_branch_id.as_deref().unwrap_or("main")
                ))
            }
            Commands::DeleteBranch { story, branch } => {
                let removed = self.branches.delete_branch(story, branch)?;
                Ok(format!(
                    "Deleted branch {} ({} rows removed)",
                    branch, removed
                ))
            }
            Commands::Checkpoint {
                story,
                branch,
                name,
            } => {
                let branch_id = match branch {
                    Some(id) => Some(id.clone()),
                    None => self.branches.require_story(story)?.current_branch_id,
                };
                let checkpoint =
                    self.branches
                        .create_checkpoint(story, branch_id.as_deref(), name.as_str())?;
                Ok(format!(
                    "Created checkpoint {} ({}, {} entries)",
                    checkpoint.name, checkpoint.id, checkpoint.entry_count
                ))
            }
            Commands::Checkpoints { story, format } => {
                self.branches.require_story(story)?;
                let checkpoints = self.branches.list_checkpoints(story)?;
                match format {
                    FormatArg::Json => to_json(&checkpoints),
                    FormatArg::Text => Ok(format_checkpoints_text(&checkpoints)),
                }
            }
            Commands::Rollback { story } => self.handle_rollback(story),
            Commands::Export { story, output } => self.handle_export(story, output.as_deref()),
            Commands::Import { file } => {
                let json = std::fs::read_to_string(file)?;
                let report = Importer::new(self.branches.clone()).import_json(&json)?;
                Ok(format_import_report(&report))
            }
            Commands::Sync { request, client } => self.handle_sync(request, client),
            Commands::Config { validate } => self.handle_config(*validate),
        }
    }

    fn handle_new(&self, title: &str, mode: Option<ModeArg>) -> Result<String, ApiError> {
        let mode = match mode {
            Some(ModeArg::Adventure) => StoryMode::Adventure,
            Some(ModeArg::CreativeWriting) => StoryMode::CreativeWriting,
            None => self.config.generation.story_mode,
        };
        let story = Story::new(title, mode);
        self.store.put_story(&story)?;
        info!(story_id = %story.id, "Created story");
        Ok(format!("Created story {} ({})", story.title, story.id))
    }

    fn handle_entries(
        &self,
        story_id: &str,
        branch: Option<&str>,
        main: bool,
        format: FormatArg,
    ) -> Result<String, ApiError> {
        let story = self.branches.require_story(story_id)?;
        let branch_id = if main {
            None
        } else {
            branch
                .map(str::to_string)
                .or_else(|| story.current_branch_id.clone())
        };
        let branch_label = match branch_id.as_deref() {
            Some(id) => self.branches.require_branch(story_id, id)?.name,
            None => "main".to_string(),
        };
        let entries = self.branches.timeline(story_id, branch_id.as_deref())?;
        match format {
            FormatArg::Json => to_json(&entries),
            FormatArg::Text => Ok(format_entries_text(&story, &branch_label, &entries)),
        }
    }

    fn handle_rollback(&self, story_id: &str) -> Result<String, ApiError> {
        self.branches.require_story(story_id)?;
        let world = StoryWorld::new(self.branches.clone());
        let Some(backup) = world.persisted_backup(story_id)? else {
            return Ok(format!("Nothing to roll back for story {}", story_id));
        };
        let runtime = tokio::runtime::Builder::new_current_thread()
            .build()
            .map_err(ApiError::Io)?;
        let result = runtime.block_on(
            RetryService::new().handle_retry_last_message(&backup, &world),
        );
        if result.success {
            self.store.clear_retry_backup(story_id)?;
        }
        Ok(format_restore_result(&result))
    }

    fn handle_export(&self, story_id: &str, output: Option<&Path>) -> Result<String, ApiError> {
        let export = export_story(self.store.as_ref(), story_id)?;
        let json = export.to_json_pretty()?;
        match output {
            Some(path) => {
                std::fs::write(path, json)?;
                Ok(format!(
                    "Exported {} entries to {}",
                    export.entries.len(),
                    path.display()
                ))
            }
            None => Ok(json),
        }
    }

    fn handle_sync(&self, request: &Path, client: &str) -> Result<String, ApiError> {
        let token = self.config.sync.token.as_deref().ok_or_else(|| {
            ApiError::ConfigError("sync.token is not set; add it under [sync]".to_string())
        })?;
        let raw = std::fs::read_to_string(request)?;
        let request: SyncRequest = serde_json::from_str(&raw)
            .map_err(|e| {
                ImportError::MalformedJson(format!("sync request: {}", e))
            })?;
        let handler = SyncHandler::with_token(self.branches.clone(), token);
        to_json(&handler.handle(client, &request))
    }

    fn handle_config(&self, validate: bool) -> Result<String, ApiError> {
        if validate {
            self.config.ensure_valid()?;
            return Ok("Configuration is valid".to_string());
        }
        let mut out = toml::to_string_pretty(&self.config)
            .map_err(|e| {
                ApiError::ConfigError(format!("Failed to render config: {}", e))
            })?;
        out.push_str(&format!(
            "\n# workspace: {}\n# store: {}",
            self.workspace_root.display(),
            self.store_path.display()
        ));
        if let Some(token) = &self.config.sync.token {
            out.push_str(&format!("\n# sync connect code: {}", connect_code(token)));
        }
        Ok(out)
    }
}

fn load_config(
    workspace_root: &Path,
    config_path: Option<&Path>,
) -> Result<StoryloomConfig, ApiError> {
    let config = match config_path {
        Some(path) => ConfigLoader::load_from_file(path)?,
        None => ConfigLoader::load(workspace_root)?,
    };
    Ok(config)
}
