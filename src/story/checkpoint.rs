//! Checkpoints: immutable full snapshots of a branch's world state.
//!
//! A checkpoint carries a blake3 digest of its snapshot computed at creation time. The store
//! recomputes it on every read, so a checkpoint that was altered after creation is reported as
//! corrupt instead of silently restoring different state.

use super::{
    Chapter, Character, Item, Location, LorebookEntry, StoryBeat, StoryEntry, TimeTracker,
    WorldState,
};
use crate::error::StorageError;
use serde::{Deserialize, Serialize};

/// Length of the preview text kept for the last entry.
pub const PREVIEW_CHARS: usize = 100;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckpointSnapshot {
    pub entries_snapshot: Vec<StoryEntry>,
    pub characters_snapshot: Vec<Character>,
    pub locations_snapshot: Vec<Location>,
    pub items_snapshot: Vec<Item>,
    pub story_beats_snapshot: Vec<StoryBeat>,
    pub chapters_snapshot: Vec<Chapter>,
    #[serde(default)]
    pub time_tracker_snapshot: Option<TimeTracker>,
    /// Absent in checkpoints written before lorebook snapshots existed.
    #[serde(default)]
    pub lorebook_entries_snapshot: Option<Vec<LorebookEntry>>,
}

impl CheckpointSnapshot {
    pub fn from_world(world: &WorldState) -> Self {
        Self {
            entries_snapshot: world.entries.clone(),
            characters_snapshot: world.characters.clone(),
            locations_snapshot: world.locations.clone(),
            items_snapshot: world.items.clone(),
            story_beats_snapshot: world.story_beats.clone(),
            chapters_snapshot: world.chapters.clone(),
            time_tracker_snapshot: world.time_tracker,
            lorebook_entries_snapshot: Some(world.lorebook_entries.clone()),
        }
    }

    /// Hex-encoded blake3 digest of the canonical JSON encoding.
    pub fn digest(&self) -> Result<String, StorageError> {
        let bytes = serde_json::to_vec(self)?;
        Ok(hex::encode(blake3::hash(&bytes).as_bytes()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Checkpoint {
    pub id: String,
    pub story_id: String,
    /// Branch the snapshot was taken from.
    #[serde(default)]
    pub branch_id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub last_entry_id: Option<String>,
    #[serde(default)]
    pub last_entry_preview: Option<String>,
    pub entry_count: usize,
    #[serde(flatten)]
    pub snapshot: CheckpointSnapshot,
    pub digest: String,
    pub created_at: i64,
}

impl Checkpoint {
    /// Seal a snapshot into a checkpoint, computing its digest.
    pub fn seal(
        story_id: impl Into<String>,
        branch_id: Option<String>,
        name: impl Into<String>,
        snapshot: CheckpointSnapshot,
    ) -> Result<Self, StorageError> {
        let last = snapshot.entries_snapshot.iter().max_by_key(|e| e.position);
        let last_entry_id = last.map(|e| e.id.clone());
        let last_entry_preview = last.map(|e| e.content.chars().take(PREVIEW_CHARS).collect());
        let digest = snapshot.digest()?;
        Ok(Self {
            id: super::new_id(),
            story_id: story_id.into(),
            branch_id,
            name: name.into(),
            last_entry_id,
            last_entry_preview,
            entry_count: snapshot.entries_snapshot.len(),
            snapshot,
            digest,
            created_at: super::now_millis(),
        })
    }

    /// Recompute the digest and compare with the sealed one.
    pub fn verify(&self) -> Result<(), StorageError> {
        let actual = self.snapshot.digest()?;
        if actual != self.digest {
            return Err(StorageError::DigestMismatch {
                checkpoint_id: self.id.clone(),
                expected: self.digest.clone(),
                actual,
            });
        }
        Ok(())
    }

    /// Re-seal after the importer rewrote IDs inside the snapshot.
    pub(crate) fn reseal(&mut self) -> Result<(), StorageError> {
        self.digest = self.snapshot.digest()?;
        Ok(())
    }

    pub fn to_world(&self) -> WorldState {
        WorldState {
            entries: self.snapshot.entries_snapshot.clone(),
            characters: self.snapshot.characters_snapshot.clone(),
            locations: self.snapshot.locations_snapshot.clone(),
            items: self.snapshot.items_snapshot.clone(),
            story_beats: self.snapshot.story_beats_snapshot.clone(),
            chapters: self.snapshot.chapters_snapshot.clone(),
            lorebook_entries: self
                .snapshot
                .lorebook_entries_snapshot
                .clone()
                .unwrap_or_default(),
            embedded_images: Vec::new(),
            time_tracker: self.snapshot.time_tracker_snapshot,
        }
    }
}
