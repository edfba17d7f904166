//! Retry backup data model.
//!
//! A backup is taken before a turn runs. It comes in two forms:
//! - full state: the branch's world state held in memory. Restoring it is a wholesale
//!   replacement and is only valid within the process that captured it.
//! - persistent: ID sets plus a few field-level snapshots. Keyed by persisted identifiers,
//!   so it can be written to the store and restored after a restart.

use crate::story::{
    Character, CharacterStatus, StoryEntry, TimeTracker, WorldRecord, WorldState,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Lorebook activation tracking: lorebook entry ID to the turn it was last activated on.
pub type ActivationData = BTreeMap<String, u64>;

/// IDs of every entity that existed before the action.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityIdSnapshot {
    pub character_ids: BTreeSet<String>,
    pub location_ids: BTreeSet<String>,
    pub item_ids: BTreeSet<String>,
    pub story_beat_ids: BTreeSet<String>,
    pub embedded_image_ids: BTreeSet<String>,
}

fn ids<T: WorldRecord>(records: &[T]) -> BTreeSet<String> {
    records.iter().map(|r| r.id().to_string()).collect()
}

impl EntityIdSnapshot {
    pub fn from_world(world: &WorldState) -> Self {
        Self {
            character_ids: ids(&world.characters),
            location_ids: ids(&world.locations),
            item_ids: ids(&world.items),
            story_beat_ids: ids(&world.story_beats),
            embedded_image_ids: ids(&world.embedded_images),
        }
    }
}

/// Character fields a turn is allowed to mutate in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CharacterFieldSnapshot {
    pub id: String,
    pub description: Option<String>,
    pub relationship: Option<String>,
    pub traits: Vec<String>,
    pub visual_descriptors: Vec<String>,
    pub status: CharacterStatus,
    pub portrait: Option<String>,
}

impl CharacterFieldSnapshot {
    pub fn capture(character: &Character) -> Self {
        Self {
            id: character.id.clone(),
            description: character.description.clone(),
            relationship: character.relationship.clone(),
            traits: character.traits.clone(),
            visual_descriptors: character.visual_descriptors.clone(),
            status: character.status,
            portrait: character.portrait.clone(),
        }
    }

    pub fn apply_to(&self, character: &mut Character) {
        character.description = self.description.clone();
        character.relationship = self.relationship.clone();
        character.traits = self.traits.clone();
        character.visual_descriptors = self.visual_descriptors.clone();
        character.status = self.status;
        character.portrait = self.portrait.clone();
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackupState {
    Full {
        world: WorldState,
    },
    Persistent {
        /// `None` when the backup was taken without entity tracking; entity cleanup is skipped.
        ids: Option<EntityIdSnapshot>,
        #[serde(default)]
        character_snapshots: Vec<CharacterFieldSnapshot>,
        #[serde(default)]
        time_tracker: Option<TimeTracker>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryBackup {
    pub story_id: String,
    pub branch_id: Option<String>,
    /// Position watermark: entries at or after this position on the branch are rolled back.
    pub entry_count_before_action: u64,
    pub user_action_content: String,
    #[serde(default)]
    pub activation_data: ActivationData,
    pub state: BackupState,
    pub created_at: i64,
}

impl RetryBackup {
    /// A persistent backup with no entity tracking yet.
    pub fn new(
        story_id: impl Into<String>,
        branch_id: Option<String>,
        entry_count_before_action: u64,
        user_action_content: impl Into<String>,
    ) -> Self {
        Self {
            story_id: story_id.into(),
            branch_id,
            entry_count_before_action,
            user_action_content: user_action_content.into(),
            activation_data: ActivationData::new(),
            state: BackupState::Persistent {
                ids: None,
                character_snapshots: Vec::new(),
                time_tracker: None,
            },
            created_at: crate::story::now_millis(),
        }
    }

    /// Back up `world` before an action, either wholesale or as an ID differential.
    pub fn capture(
        world: &WorldState,
        story_id: impl Into<String>,
        branch_id: Option<String>,
        watermark: u64,
        user_action_content: impl Into<String>,
        full_state: bool,
    ) -> Self {
        let backup = Self::new(story_id, branch_id, watermark, user_action_content);
        if full_state {
            backup.with_full_state(world)
        } else {
            backup.with_id_snapshot(world)
        }
    }

    /// Hold the full world state in memory. Entries at or past the watermark are dropped so
    /// the snapshot reflects the branch as it was before the action.
    pub fn with_full_state(mut self, world: &WorldState) -> Self {
        let mut world = world.clone();
        world
            .entries
            .retain(|e: &StoryEntry| e.position < self.entry_count_before_action);
        self.state = BackupState::Full { world };
        self
    }

    /// Track entity IDs and mutable character fields only.
    pub fn with_id_snapshot(mut self, world: &WorldState) -> Self {
        self.state = BackupState::Persistent {
            ids: Some(EntityIdSnapshot::from_world(world)),
            character_snapshots: world
                .characters
                .iter()
                .map(CharacterFieldSnapshot::capture)
                .collect(),
            time_tracker: world.time_tracker,
        };
        self
    }

    pub fn with_activation_data(mut self, data: ActivationData) -> Self {
        self.activation_data = data;
        self
    }

    pub fn has_full_state(&self) -> bool {
        matches!(self.state, BackupState::Full { .. })
    }

    /// The form of this backup that may be written to the store. Full snapshots are never
    /// persisted; they are reduced to their ID differential.
    pub fn to_persistent(&self) -> Self {
        match &self.state {
            BackupState::Full { world } => {
                let mut persistent = self.clone();
                persistent.state = BackupState::Persistent {
                    ids: Some(EntityIdSnapshot::from_world(world)),
                    character_snapshots: world
                        .characters
                        .iter()
                        .map(CharacterFieldSnapshot::capture)
                        .collect(),
                    time_tracker: world.time_tracker,
                };
                persistent
            }
            BackupState::Persistent { .. } => self.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::story::{Item, Location};

    fn world() -> WorldState {
        let mut hero = Character::new("s", "Hero");
        hero.traits = vec!["brave".to_string()];
        WorldState {
            characters: vec![hero],
            locations: vec![Location::new("s", "Gate")],
            items: vec![Item::new("s", "Lamp")],
            time_tracker: Some(TimeTracker {
                hours: 6,
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn to_persistent_keeps_ids_and_fields() {
        let world = world();
        let full = RetryBackup::new("s", None, 4, "open the gate").with_full_state(&world);
        assert!(full.has_full_state());

        let persistent = full.to_persistent();
        assert!(!persistent.has_full_state());
        match persistent.state {
            BackupState::Persistent {
                ids: Some(ids),
                character_snapshots,
                time_tracker,
            } => {
                assert!(ids.character_ids.contains(&world.characters[0].id));
                assert!(ids.location_ids.contains(&world.locations[0].id));
                assert_eq!(character_snapshots[0].traits, vec!["brave".to_string()]);
                assert_eq!(time_tracker, world.time_tracker);
            }
            other => panic!("unexpected state {:?}", other),
        }
    }

    #[test]
    fn persistent_backup_serializes_with_kind_tag() {
        let backup = RetryBackup::new("s", Some("b".to_string()), 2, "wait")
            .with_id_snapshot(&world());
        let value = serde_json::to_value(&backup).unwrap();
        assert_eq!(value["state"]["kind"], "persistent");
        assert_eq!(value["entryCountBeforeAction"], 2);
        let parsed: RetryBackup = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, backup);
    }

    #[test]
    fn character_snapshot_reapplies_mutated_fields() {
        let mut hero = Character::new("s", "Hero");
        let snapshot = CharacterFieldSnapshot::capture(&hero);
        hero.status = CharacterStatus::Deceased;
        hero.traits.push("cursed".to_string());
        snapshot.apply_to(&mut hero);
        assert_eq!(hero.status, CharacterStatus::Active);
        assert!(hero.traits.is_empty());
    }
}
