//! World-state entities. Each row carries the branch that owns it.

use super::{world_record, Table};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CharacterStatus {
    #[default]
    Active,
    Inactive,
    Deceased,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Character {
    pub id: String,
    pub story_id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub relationship: Option<String>,
    #[serde(default)]
    pub traits: Vec<String>,
    #[serde(default)]
    pub visual_descriptors: Vec<String>,
    #[serde(default)]
    pub status: CharacterStatus,
    #[serde(default)]
    pub portrait: Option<String>,
    #[serde(default)]
    pub branch_id: Option<String>,
}

impl Character {
    pub fn new(story_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: super::new_id(),
            story_id: story_id.into(),
            name: name.into(),
            description: None,
            relationship: None,
            traits: Vec::new(),
            visual_descriptors: Vec::new(),
            status: CharacterStatus::Active,
            portrait: None,
            branch_id: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    pub id: String,
    pub story_id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub visited: bool,
    #[serde(default)]
    pub current: bool,
    /// IDs of adjacent locations.
    #[serde(default)]
    pub connections: Vec<String>,
    #[serde(default)]
    pub branch_id: Option<String>,
}

impl Location {
    pub fn new(story_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: super::new_id(),
            story_id: story_id.into(),
            name: name.into(),
            description: None,
            visited: false,
            current: false,
            connections: Vec::new(),
            branch_id: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub id: String,
    pub story_id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
    #[serde(default)]
    pub equipped: bool,
    /// Either [`super::INVENTORY`] or the ID of the location holding the item.
    pub location: String,
    #[serde(default)]
    pub branch_id: Option<String>,
}

fn default_quantity() -> u32 {
    1
}

impl Item {
    pub fn new(story_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: super::new_id(),
            story_id: story_id.into(),
            name: name.into(),
            description: None,
            quantity: 1,
            equipped: false,
            location: super::INVENTORY.to_string(),
            branch_id: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BeatType {
    Milestone,
    Quest,
    Revelation,
    #[default]
    Event,
    PlotPoint,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BeatStatus {
    #[default]
    Pending,
    Active,
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoryBeat {
    pub id: String,
    pub story_id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub beat_type: BeatType,
    #[serde(default)]
    pub status: BeatStatus,
    #[serde(default)]
    pub triggered_at: Option<i64>,
    #[serde(default)]
    pub resolved_at: Option<i64>,
    #[serde(default)]
    pub branch_id: Option<String>,
}

impl StoryBeat {
    pub fn new(story_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: super::new_id(),
            story_id: story_id.into(),
            title: title.into(),
            description: None,
            beat_type: BeatType::Event,
            status: BeatStatus::Pending,
            triggered_at: None,
            resolved_at: None,
            branch_id: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chapter {
    pub id: String,
    pub story_id: String,
    pub number: u32,
    #[serde(default)]
    pub title: Option<String>,
    pub summary: String,
    pub start_entry_id: String,
    pub end_entry_id: String,
    pub entry_count: usize,
    #[serde(default)]
    pub branch_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LorebookEntry {
    pub id: String,
    pub story_id: String,
    pub name: String,
    /// Free-form category (character, location, faction, concept, ...).
    pub entry_type: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    /// Entry in which this lore first appeared.
    #[serde(default)]
    pub first_mentioned: Option<String>,
    #[serde(default)]
    pub last_mentioned: Option<String>,
    #[serde(default)]
    pub mention_count: u32,
    #[serde(default)]
    pub branch_id: Option<String>,
}

impl LorebookEntry {
    pub fn new(
        story_id: impl Into<String>,
        name: impl Into<String>,
        entry_type: impl Into<String>,
    ) -> Self {
        Self {
            id: super::new_id(),
            story_id: story_id.into(),
            name: name.into(),
            entry_type: entry_type.into(),
            description: String::new(),
            keywords: Vec::new(),
            first_mentioned: None,
            last_mentioned: None,
            mention_count: 0,
            branch_id: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageStatus {
    #[default]
    Pending,
    Generating,
    Complete,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmbeddedImage {
    pub id: String,
    pub story_id: String,
    /// Entry the image illustrates.
    pub entry_id: String,
    pub prompt: String,
    #[serde(default)]
    pub image_data: Option<String>,
    #[serde(default)]
    pub status: ImageStatus,
    #[serde(default)]
    pub branch_id: Option<String>,
    pub created_at: i64,
}

world_record!(Character, Table::Characters);
world_record!(Location, Table::Locations);
world_record!(Item, Table::Items);
world_record!(StoryBeat, Table::StoryBeats);
world_record!(Chapter, Table::Chapters);
world_record!(LorebookEntry, Table::LorebookEntries);
world_record!(EmbeddedImage, Table::EmbeddedImages);
