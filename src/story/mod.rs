//! Story data model
//!
//! Stories, entries, branches and the branch-scoped world-state records. Every record that
//! lives in a world-state table implements [`WorldRecord`], which is what lets the store,
//! the branch manager and the importer treat all tables uniformly.

pub mod checkpoint;
pub mod entities;

pub use checkpoint::{Checkpoint, CheckpointSnapshot};
pub use entities::{
    BeatStatus, BeatType, Chapter, Character, CharacterStatus, EmbeddedImage, ImageStatus, Item,
    Location, LorebookEntry, StoryBeat,
};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Milliseconds since the Unix epoch.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Fresh random identifier for any record.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Item location value meaning "carried by the protagonist".
pub const INVENTORY: &str = "inventory";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoryMode {
    #[default]
    Adventure,
    CreativeWriting,
}

/// In-world clock advanced by classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TimeTracker {
    pub years: u32,
    pub days: u32,
    pub hours: u32,
    pub minutes: u32,
}

impl TimeTracker {
    /// Advance the clock, carrying minutes into hours and hours into days.
    pub fn advance(&mut self, minutes: u32) {
        let total = self.minutes + minutes;
        self.minutes = total % 60;
        let hours = self.hours + total / 60;
        self.hours = hours % 24;
        let days = self.days + hours / 24;
        self.days = days % 365;
        self.years += days / 365;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Story {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub genre: Option<String>,
    #[serde(default)]
    pub mode: StoryMode,
    /// Branch the reader is currently on; `None` is the main timeline.
    #[serde(default)]
    pub current_branch_id: Option<String>,
    #[serde(default)]
    pub time_tracker: Option<TimeTracker>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Story {
    pub fn new(title: impl Into<String>, mode: StoryMode) -> Self {
        let now = now_millis();
        Self {
            id: new_id(),
            title: title.into(),
            genre: None,
            mode,
            current_branch_id: None,
            time_tracker: None,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryType {
    UserAction,
    Narration,
    System,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<TimeTracker>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoryEntry {
    pub id: String,
    pub story_id: String,
    #[serde(rename = "type")]
    pub entry_type: EntryType,
    pub content: String,
    #[serde(default)]
    pub parent_id: Option<String>,
    /// Branch-relative sequence number, unique within `(story_id, branch_id)`.
    pub position: u64,
    #[serde(default)]
    pub branch_id: Option<String>,
    #[serde(default)]
    pub metadata: EntryMetadata,
    #[serde(default)]
    pub translated_content: Option<String>,
    #[serde(default)]
    pub translation_language: Option<String>,
    pub created_at: i64,
}

/// Entry content before a position has been assigned.
#[derive(Debug, Clone, PartialEq)]
pub struct NewEntry {
    pub story_id: String,
    pub branch_id: Option<String>,
    pub entry_type: EntryType,
    pub content: String,
    pub parent_id: Option<String>,
    pub metadata: EntryMetadata,
}

impl NewEntry {
    pub fn new(
        story_id: impl Into<String>,
        branch_id: Option<String>,
        entry_type: EntryType,
        content: impl Into<String>,
    ) -> Self {
        Self {
            story_id: story_id.into(),
            branch_id,
            entry_type,
            content: content.into(),
            parent_id: None,
            metadata: EntryMetadata::default(),
        }
    }

    pub fn with_parent(mut self, parent_id: Option<String>) -> Self {
        self.parent_id = parent_id;
        self
    }

    pub fn with_metadata(mut self, metadata: EntryMetadata) -> Self {
        self.metadata = metadata;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Branch {
    pub id: String,
    pub story_id: String,
    pub name: String,
    /// `None` means the branch was forked from the main timeline.
    #[serde(default)]
    pub parent_branch_id: Option<String>,
    pub fork_entry_id: String,
    /// Checkpoint this branch was restored from, if any. Not owned by the branch.
    #[serde(default)]
    pub checkpoint_id: Option<String>,
    pub created_at: i64,
}

/// World-state tables. Every table except branches and checkpoints is partitioned by branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Entries,
    Characters,
    Locations,
    Items,
    StoryBeats,
    Chapters,
    LorebookEntries,
    EmbeddedImages,
}

impl Table {
    pub const BRANCH_SCOPED: [Table; 8] = [
        Table::Entries,
        Table::Characters,
        Table::Locations,
        Table::Items,
        Table::StoryBeats,
        Table::Chapters,
        Table::LorebookEntries,
        Table::EmbeddedImages,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Table::Entries => "entries",
            Table::Characters => "characters",
            Table::Locations => "locations",
            Table::Items => "items",
            Table::StoryBeats => "story_beats",
            Table::Chapters => "chapters",
            Table::LorebookEntries => "lorebook_entries",
            Table::EmbeddedImages => "embedded_images",
        }
    }
}

/// A row in a branch-scoped world-state table.
pub trait WorldRecord: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    const TABLE: Table;

    fn id(&self) -> &str;
    fn story_id(&self) -> &str;
    fn branch_id(&self) -> Option<&str>;
    fn set_id(&mut self, id: String);
    fn set_story_id(&mut self, story_id: String);
    fn set_branch_id(&mut self, branch_id: Option<String>);
}

macro_rules! world_record {
    ($ty:ty, $table:expr) => {
        impl $crate::story::WorldRecord for $ty {
            const TABLE: $crate::story::Table = $table;

            fn id(&self) -> &str {
                &self.id
            }
            fn story_id(&self) -> &str {
                &self.story_id
            }
            fn branch_id(&self) -> Option<&str> {
                self.branch_id.as_deref()
            }
            fn set_id(&mut self, id: String) {
                self.id = id;
            }
            fn set_story_id(&mut self, story_id: String) {
                self.story_id = story_id;
            }
            fn set_branch_id(&mut self, branch_id: Option<String>) {
                self.branch_id = branch_id;
            }
        }
    };
}
pub(crate) use world_record;

world_record!(StoryEntry, Table::Entries);

/// Full world state of one branch at one moment.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorldState {
    pub entries: Vec<StoryEntry>,
    pub characters: Vec<Character>,
    pub locations: Vec<Location>,
    pub items: Vec<Item>,
    pub story_beats: Vec<StoryBeat>,
    pub chapters: Vec<Chapter>,
    pub lorebook_entries: Vec<LorebookEntry>,
    pub embedded_images: Vec<EmbeddedImage>,
    pub time_tracker: Option<TimeTracker>,
}
