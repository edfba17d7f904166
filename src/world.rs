//! Store-backed story world
//!
//! [`StoryWorld`] is the host side of both seams: it implements the pipeline's
//! [`StateHooks`] and the retry service's [`RestoreCallbacks`] on top of a [`StoryStore`].
//! Lorebook activation tracking and transient UI state live in memory only.

use crate::branch::BranchManager;
use crate::error::{BranchError, PipelineError, StorageError};
use crate::generation::{ClassificationResult, NarrativeResult, StateHooks, TranslationResult};
use crate::retry::{
    ActivationData, CharacterFieldSnapshot, EntityIdSnapshot, RestoreCallbacks, RetryBackup,
};
use crate::store::{BranchScope, StoryStore};
use crate::story::{
    Character, EmbeddedImage, EntryMetadata, EntryType, Item, Location, LorebookEntry, NewEntry,
    StoryBeat, StoryEntry, TimeTracker, WorldRecord, WorldState,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, info};

/// Errors, suggestions and action choices shown for the latest turn.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransientUiState {
    pub last_error: Option<String>,
    pub suggestions: Vec<String>,
    pub action_choices: Vec<String>,
}

pub struct StoryWorld<S: StoryStore> {
    branches: BranchManager<S>,
    activation: Mutex<HashMap<String, ActivationData>>,
    transient: Mutex<HashMap<String, TransientUiState>>,
}

impl<S: StoryStore> StoryWorld<S> {
    pub fn new(branches: BranchManager<S>) -> Self {
        Self {
            branches,
            activation: Mutex::new(HashMap::new()),
            transient: Mutex::new(HashMap::new()),
        }
    }

    pub fn branches(&self) -> &BranchManager<S> {
        &self.branches
    }

    /// Persist the user's action on the story's current branch. The returned entry starts a
    /// turn. A persistent backup watermarked at the action is stored first, so the turn can
    /// be rolled back even when no pipeline runs for it.
    pub fn begin_turn(&self, story_id: &str, action: &str) -> Result<StoryEntry, BranchError> {
        let story = self.branches.require_story(story_id)?;
        let branch_id = story.current_branch_id;
        let before = self.branches.world_state(story_id, branch_id.as_deref())?;
        let watermark = self.branches.next_position(story_id, branch_id.as_deref())?;
        let backup = RetryBackup::capture(
            &before,
            story_id,
            branch_id.clone(),
            watermark,
            action,
            false,
        )
        .with_activation_data(self.activation(story_id));
        self.store().put_retry_backup(&backup)?;

        self.branches.append_entry(NewEntry::new(
            story_id,
            branch_id,
            EntryType::UserAction,
            action,
        ))
    }

    /// The persisted backup of the story's last turn, if any. Survives restarts.
    pub fn persisted_backup(&self, story_id: &str) -> Result<Option<RetryBackup>, StorageError> {
        self.branches.store().get_retry_backup(story_id)
    }

    pub fn activation(&self, story_id: &str) -> ActivationData {
        self.activation
            .lock()
            .get(story_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn set_transient(&self, story_id: &str, state: TransientUiState) {
        self.transient.lock().insert(story_id.to_string(), state);
    }

    pub fn transient(&self, story_id: &str) -> TransientUiState {
        self.transient
            .lock()
            .get(story_id)
            .cloned()
            .unwrap_or_default()
    }

    fn store(&self) -> &S {
        self.branches.store()
    }

    /// Delete every row of `T` on the branch and write `rows` in their place.
    fn replace_branch_rows<T: WorldRecord>(
        &self,
        story_id: &str,
        branch_id: Option<&str>,
        rows: &[T],
    ) -> Result<(), StorageError> {
        let existing: Vec<T> = self
            .store()
            .list_records(story_id, BranchScope::Exact(branch_id))?;
        for row in &existing {
            self.store().delete_record::<T>(story_id, row.id())?;
        }
        for row in rows.iter().filter(|r| r.branch_id() == branch_id) {
            self.store().put_record(row)?;
        }
        Ok(())
    }

    /// Delete rows of `T` on the branch whose IDs are not in `keep`.
    fn prune<T: WorldRecord>(
        &self,
        story_id: &str,
        branch_id: Option<&str>,
        keep: &BTreeSet<String>,
    ) -> Result<usize, StorageError> {
        let rows: Vec<T> = self
            .store()
            .list_records(story_id, BranchScope::Exact(branch_id))?;
        let mut removed = 0;
        for row in rows.iter().filter(|r| !keep.contains(r.id())) {
            if self.store().delete_record::<T>(story_id, row.id())? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    fn set_time_tracker(
        &self,
        story_id: &str,
        tracker: Option<TimeTracker>,
    ) -> Result<(), StorageError> {
        let Some(mut story) = self.store().get_story(story_id)? else {
            return Err(StorageError::NotFound {
                table: "stories",
                id: story_id.to_string(),
            });
        };
        story.time_tracker = tracker;
        self.store().put_story(&story)
    }
}

fn same_name(a: &str, b: &str) -> bool {
    a.trim().eq_ignore_ascii_case(b.trim())
}

#[async_trait]
impl<S: StoryStore> StateHooks for StoryWorld<S> {
    async fn capture_world_state(
        &self,
        story_id: &str,
        branch_id: Option<&str>,
    ) -> Result<WorldState, PipelineError> {
        Ok(self.branches.world_state(story_id, branch_id)?)
    }

    async fn activation_data(&self, story_id: &str) -> Result<ActivationData, PipelineError> {
        Ok(self.activation(story_id))
    }

    async fn save_retry_backup(&self, backup: &RetryBackup) -> Result<(), PipelineError> {
        self.store().put_retry_backup(&backup.to_persistent())?;
        Ok(())
    }

    async fn ensure_time_tracker(&self, story_id: &str) -> Result<TimeTracker, PipelineError> {
        let mut story = self.branches.require_story(story_id)?;
        if let Some(tracker) = story.time_tracker {
            return Ok(tracker);
        }
        let tracker = TimeTracker::default();
        story.time_tracker = Some(tracker);
        self.store().put_story(&story)?;
        debug!(story_id, "Initialized time tracker");
        Ok(tracker)
    }

    async fn record_activation(
        &self,
        story_id: &str,
        branch_id: Option<&str>,
        lorebook_ids: &[String],
    ) -> Result<(), PipelineError> {
        let turn = self.branches.next_position(story_id, branch_id)?;
        let mut activation = self.activation.lock();
        let data = activation.entry(story_id.to_string()).or_default();
        for id in lorebook_ids {
            data.insert(id.clone(), turn);
        }
        Ok(())
    }

    async fn append_narration(
        &self,
        story_id: &str,
        branch_id: Option<&str>,
        parent_id: &str,
        narrative: &NarrativeResult,
    ) -> Result<StoryEntry, PipelineError> {
        let story = self.branches.require_story(story_id)?;
        let entry = NewEntry::new(
            story_id,
            branch_id.map(str::to_string),
            EntryType::Narration,
            narrative.content.clone(),
        )
        .with_parent(Some(parent_id.to_string()))
        .with_metadata(EntryMetadata {
            reasoning: narrative.reasoning.clone(),
            chunk_count: Some(narrative.chunk_count),
            time: story.time_tracker,
        });
        Ok(self.branches.append_entry(entry)?)
    }

    async fn apply_classification(
        &self,
        story_id: &str,
        branch_id: Option<&str>,
        result: &ClassificationResult,
    ) -> Result<(), PipelineError> {
        let scope = BranchScope::Exact(branch_id);
        let owner = branch_id.map(str::to_string);
        let store = self.store();

        let characters: Vec<Character> = store.list_records(story_id, scope)?;
        for name in &result.new_characters {
            if characters.iter().any(|c| same_name(&c.name, name)) {
                continue;
            }
            let mut character = Character::new(story_id, name.trim());
            character.branch_id = owner.clone();
            store.put_record(&character)?;
        }

        let mut locations: Vec<Location> = store.list_records(story_id, scope)?;
        for name in result.new_locations.iter().chain(result.current_location.iter()) {
            if locations.iter().any(|l| same_name(&l.name, name)) {
                continue;
            }
            let mut location = Location::new(story_id, name.trim());
            location.branch_id = owner.clone();
            store.put_record(&location)?;
            locations.push(location);
        }
        if let Some(current) = &result.current_location {
            for location in &mut locations {
                let is_current = same_name(&location.name, current);
                if location.current != is_current || (is_current && !location.visited) {
                    location.current = is_current;
                    location.visited |= is_current;
                    store.put_record(location)?;
                }
            }
        }

        let items: Vec<Item> = store.list_records(story_id, scope)?;
        for name in &result.new_items {
            if items.iter().any(|i| same_name(&i.name, name)) {
                continue;
            }
            let mut item = Item::new(story_id, name.trim());
            item.branch_id = owner.clone();
            store.put_record(&item)?;
        }

        if result.elapsed_minutes > 0 {
            let mut story = self.branches.require_story(story_id)?;
            let mut tracker = story.time_tracker.unwrap_or_default();
            tracker.advance(result.elapsed_minutes);
            story.time_tracker = Some(tracker);
            store.put_story(&story)?;
        }
        Ok(())
    }

    async fn save_translation(
        &self,
        story_id: &str,
        entry_id: &str,
        translation: &TranslationResult,
    ) -> Result<(), PipelineError> {
        let mut entry = self.branches.require_entry(story_id, entry_id)?;
        entry.translated_content = Some(translation.narrative.clone());
        entry.translation_language = Some(translation.language.clone());
        self.store().put_record(&entry)?;
        Ok(())
    }

    async fn attach_images(&self, images: &[EmbeddedImage]) -> Result<(), PipelineError> {
        for image in images {
            self.store().put_record(image)?;
        }
        Ok(())
    }

    async fn save_lore(
        &self,
        story_id: &str,
        branch_id: Option<&str>,
        entries: &[LorebookEntry],
    ) -> Result<(), PipelineError> {
        for entry in entries {
            let mut entry = entry.clone();
            entry.story_id = story_id.to_string();
            entry.branch_id = branch_id.map(str::to_string);
            self.store().put_record(&entry)?;
        }
        Ok(())
    }
}

#[async_trait]
impl<S: StoryStore> RestoreCallbacks for StoryWorld<S> {
    async fn restore_full_state(
        &self,
        backup: &RetryBackup,
        world: &WorldState,
    ) -> Result<(), StorageError> {
        let story_id = backup.story_id.as_str();
        let branch_id = backup.branch_id.as_deref();
        self.replace_branch_rows(story_id, branch_id, &world.entries)?;
        self.replace_branch_rows(story_id, branch_id, &world.characters)?;
        self.replace_branch_rows(story_id, branch_id, &world.locations)?;
        self.replace_branch_rows(story_id, branch_id, &world.items)?;
        self.replace_branch_rows(story_id, branch_id, &world.story_beats)?;
        self.replace_branch_rows(story_id, branch_id, &world.embedded_images)?;
        self.set_time_tracker(story_id, world.time_tracker)?;
        info!(story_id, branch_id = ?branch_id, "Replaced branch state from snapshot");
        Ok(())
    }

    async fn clear_activation_data(&self, story_id: &str) -> Result<(), StorageError> {
        self.activation.lock().remove(story_id);
        Ok(())
    }

    async fn restore_activation_data(
        &self,
        story_id: &str,
        data: &ActivationData,
    ) -> Result<(), StorageError> {
        self.activation
            .lock()
            .insert(story_id.to_string(), data.clone());
        Ok(())
    }

    async fn delete_entries_from(
        &self,
        story_id: &str,
        branch_id: Option<&str>,
        position: u64,
    ) -> Result<usize, StorageError> {
        Ok(self
            .store()
            .delete_entries_from(story_id, branch_id, position)?
            .len())
    }

    async fn delete_entities_not_in(
        &self,
        story_id: &str,
        branch_id: Option<&str>,
        keep: &EntityIdSnapshot,
    ) -> Result<usize, StorageError> {
        let mut removed = 0;
        removed += self.prune::<Character>(story_id, branch_id, &keep.character_ids)?;
        removed += self.prune::<Location>(story_id, branch_id, &keep.location_ids)?;
        removed += self.prune::<Item>(story_id, branch_id, &keep.item_ids)?;
        removed += self.prune::<StoryBeat>(story_id, branch_id, &keep.story_beat_ids)?;
        removed += self.prune::<EmbeddedImage>(story_id, branch_id, &keep.embedded_image_ids)?;
        Ok(removed)
    }

    async fn apply_character_snapshots(
        &self,
        story_id: &str,
        branch_id: Option<&str>,
        snapshots: &[CharacterFieldSnapshot],
    ) -> Result<(), StorageError> {
        for snapshot in snapshots {
            let Some(mut character) = self
                .store()
                .get_record::<Character>(story_id, &snapshot.id)?
            else {
                continue;
            };
            if character.branch_id.as_deref() != branch_id {
                continue;
            }
            snapshot.apply_to(&mut character);
            self.store().put_record(&character)?;
        }
        Ok(())
    }

    async fn restore_time_tracker(
        &self,
        story_id: &str,
        tracker: Option<TimeTracker>,
    ) -> Result<(), StorageError> {
        self.set_time_tracker(story_id, tracker)
    }

    async fn clear_transient_ui_state(&self, story_id: &str) {
        self.transient.lock().remove(story_id);
    }
}
