//! Export file format.

use crate::error::{BranchError, ImportError, StorageError};
use crate::store::{BranchScope, StoryStore};
use crate::story::{
    now_millis, Branch, Chapter, Character, Checkpoint, EmbeddedImage, Item, Location,
    LorebookEntry, Story, StoryBeat, StoryEntry,
};
use serde::{Deserialize, Serialize};

/// Newest export version this build reads and the version it writes.
pub const EXPORT_VERSION: u32 = 1;

fn default_version() -> u32 {
    EXPORT_VERSION
}

/// Every row belonging to one story.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoryExport {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub exported_at: i64,
    pub story: Story,
    pub entries: Vec<StoryEntry>,
    #[serde(default)]
    pub branches: Vec<Branch>,
    #[serde(default)]
    pub checkpoints: Vec<Checkpoint>,
    #[serde(default)]
    pub characters: Vec<Character>,
    #[serde(default)]
    pub locations: Vec<Location>,
    #[serde(default)]
    pub items: Vec<Item>,
    #[serde(default)]
    pub story_beats: Vec<StoryBeat>,
    #[serde(default)]
    pub chapters: Vec<Chapter>,
    #[serde(default)]
    pub lorebook_entries: Vec<LorebookEntry>,
    #[serde(default)]
    pub embedded_images: Vec<EmbeddedImage>,
}

impl StoryExport {
    /// Parse and structurally validate an export file.
    pub fn parse(json: &str) -> Result<Self, ImportError> {
        let value: serde_json::Value =
            serde_json::from_str(json).map_err(|e| ImportError::MalformedJson(e.to_string()))?;
        let object = value
            .as_object()
            .ok_or_else(|| {
                ImportError::MalformedJson("top level is not an object".to_string())
            })?;

        if let Some(found) = object.get("version").and_then(|v| v.as_u64()) {
            if found > u64::from(EXPORT_VERSION) {
                return Err(ImportError::UnsupportedVersion {
                    found: u32::try_from(found).unwrap_or(u32::MAX),
                    supported: EXPORT_VERSION,
                });
            }
        }
        if !object.contains_key("story") {
            return Err(ImportError::MissingField("story"));
        }
        match object.get("entries") {
            None => return Err(ImportError::MissingField("entries")),
            Some(serde_json::Value::Array(entries)) if entries.is_empty() => {
                return Err(ImportError::EmptyEntries)
            }
            Some(_) => {}
        }

        serde_json::from_value(value).map_err(|e| ImportError::MalformedJson(e.to_string()))
    }

    pub fn to_json_pretty(&self) -> Result<String, StorageError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Collect every row of a story, across all branches.
pub fn export_story<S: StoryStore>(store: &S, story_id: &str) -> Result<StoryExport, BranchError> {
    let story = store
        .get_story(story_id)?
        .ok_or_else(|| BranchError::StoryNotFound(story_id.to_string()))?;
    let mut entries: Vec<StoryEntry> = store.list_records(story_id, BranchScope::All)?;
    entries.sort_by(|a, b| {
        a.branch_id
            .cmp(&b.branch_id)
            .then(a.position.cmp(&b.position))
    });

    Ok(StoryExport {
        version: EXPORT_VERSION,
        exported_at: now_millis(),
        story,
        entries,
        branches: store.list_branches(story_id)?,
        checkpoints: store.list_checkpoints(story_id)?,
        characters: store.list_records(story_id, BranchScope::All)?,
        locations: store.list_records(story_id, BranchScope::All)?,
        items: store.list_records(story_id, BranchScope::All)?,
        story_beats: store.list_records(story_id, BranchScope::All)?,
        chapters: store.list_records(story_id, BranchScope::All)?,
        lorebook_entries: store.list_records(story_id, BranchScope::All)?,
        embedded_images: store.list_records(story_id, BranchScope::All)?,
    })
}
