//! Branches and checkpoints
//!
//! A branch is an alternate timeline forked at an entry of its parent. It inherits the parent's
//! entries up to and including the fork entry, numbers its own entries from
//! `fork_entry.position + 1`, and owns a private copy of the world-state entities taken at
//! fork time. Checkpoints are sealed snapshots with a lifecycle independent of branches.

use crate::error::BranchError;
use crate::import::{remap_record, IdRemap};
use crate::store::{entries_on_branch, BranchScope, StoryStore};
use crate::story::{
    now_millis, Branch, Chapter, Character, Checkpoint, CheckpointSnapshot, Item,
    Location, LorebookEntry, NewEntry, Story, StoryBeat, StoryEntry, WorldRecord, WorldState,
};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Outcome of inserting a batch of branches that may reference each other.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BulkInsertReport {
    pub inserted: usize,
    /// Branches whose parent never appeared; inserted with `parent_branch_id = None`.
    pub flattened: Vec<String>,
}

pub struct BranchManager<S: StoryStore> {
    store: Arc<S>,
}

impl<S: StoryStore> Clone for BranchManager<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: StoryStore> BranchManager<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn require_story(&self, story_id: &str) -> Result<Story, BranchError> {
        self.store
            .get_story(story_id)?
            .ok_or_else(|| BranchError::StoryNotFound(story_id.to_string()))
    }

    pub fn require_branch(&self, story_id: &str, branch_id: &str) -> Result<Branch, BranchError> {
        self.store
            .get_branch(story_id, branch_id)?
            .ok_or_else(|| BranchError::BranchNotFound(branch_id.to_string()))
    }

    pub fn require_entry(&self, story_id: &str, entry_id: &str) -> Result<StoryEntry, BranchError> {
        self.store
            .get_record(story_id, entry_id)?
            .ok_or_else(|| BranchError::EntryNotFound(entry_id.to_string()))
    }

    /// The entry `branch` was forked from. A missing fork entry is a corrupted reference.
    fn fork_entry(&self, branch: &Branch) -> Result<StoryEntry, BranchError> {
        self.store
            .get_record(&branch.story_id, &branch.fork_entry_id)?
            .ok_or_else(|| BranchError::ForkEntryMissing {
                branch_id: branch.id.clone(),
                fork_entry_id: branch.fork_entry_id.clone(),
            })
    }

    /// Position the next entry on `branch_id` will receive.
    ///
    /// Main timeline starts at 0. An empty branch starts right after its fork entry; after
    /// that it counts independently of its parent.
    pub fn next_position(
        &self,
        story_id: &str,
        branch_id: Option<&str>,
    ) -> Result<u64, BranchError> {
        let Some(branch_id) = branch_id else {
            let entries = entries_on_branch(&*self.store, story_id, None)?;
            return Ok(entries.last().map_or(0, |e| e.position + 1));
        };
        let branch = self.require_branch(story_id, branch_id)?;
        let fork = self.fork_entry(&branch)?;
        let entries = entries_on_branch(&*self.store, story_id, Some(branch_id))?;
        Ok(entries
            .last()
            .map_or(fork.position + 1, |e| e.position + 1))
    }

    /// Persist a new entry at the next position of its branch.
    pub fn append_entry(&self, new: NewEntry) -> Result<StoryEntry, BranchError> {
        let position = self.next_position(&new.story_id, new.branch_id.as_deref())?;
        let entry = StoryEntry {
            id: crate::story::new_id(),
            story_id: new.story_id,
            entry_type: new.entry_type,
            content: new.content,
            parent_id: new.parent_id,
            position,
            branch_id: new.branch_id,
            metadata: new.metadata,
            translated_content: None,
            translation_language: None,
            created_at: now_millis(),
        };
        self.store.put_record(&entry)?;
        if let Some(mut story) = self.store.get_story(&entry.story_id)? {
            story.updated_at = entry.created_at;
            self.store.put_story(&story)?;
        }
        debug!(entry_id = %entry.id, position, branch_id = ?entry.branch_id, "Appended entry");
        Ok(entry)
    }

    /// Visible entries of a branch: its own entries preceded by every ancestor's entries up to
    /// the relevant fork position.
    pub fn timeline(
        &self,
        story_id: &str,
        branch_id: Option<&str>,
    ) -> Result<Vec<StoryEntry>, BranchError> {
        let mut segments = vec![entries_on_branch(&*self.store, story_id, branch_id)?];
        let mut visited = HashSet::new();
        let mut current = match branch_id {
            Some(id) => Some(self.require_branch(story_id, id)?),
            None => None,
        };
        while let Some(branch) = current.take() {
            if !visited.insert(branch.id.clone()) {
                warn!(
                    branch_id = %branch.id,
                    "Branch ancestry cycle detected; truncating timeline"
                );
                break;
            }
            let cutoff = self.fork_entry(&branch)?.position;
            let parent_id = branch.parent_branch_id.as_deref();
            let mut inherited = entries_on_branch(&*self.store, story_id, parent_id)?;
            inherited.retain(|e| e.position <= cutoff);
            segments.push(inherited);
            current = match parent_id {
                Some(id) => Some(self.require_branch(story_id, id)?),
                None => None,
            };
        }
        Ok(segments.into_iter().rev().flatten().collect())
    }

    /// Timeline plus every entity owned by the branch.
    pub fn world_state(
        &self,
        story_id: &str,
        branch_id: Option<&str>,
    ) -> Result<WorldState, BranchError> {
        let scope = BranchScope::Exact(branch_id);
        let time_tracker = self.store.get_story(story_id)?.and_then(|s| s.time_tracker);
        Ok(WorldState {
            entries: self.timeline(story_id, branch_id)?,
            characters: self.store.list_records(story_id, scope)?,
            locations: self.store.list_records(story_id, scope)?,
            items: self.store.list_records(story_id, scope)?,
            story_beats: self.store.list_records(story_id, scope)?,
            chapters: self.store.list_records(story_id, scope)?,
            lorebook_entries: self.store.list_records(story_id, scope)?,
            embedded_images: self.store.list_records(story_id, scope)?,
            time_tracker,
        })
    }

    /// Fork a new branch at `fork_entry_id`, copying the parent's world state.
    pub fn fork(
        &self,
        story_id: &str,
        fork_entry_id: &str,
        name: impl Into<String>,
    ) -> Result<Branch, BranchError> {
        let fork = self.require_entry(story_id, fork_entry_id)?;
        let branch = Branch {
            id: crate::story::new_id(),
            story_id: story_id.to_string(),
            name: name.into(),
            parent_branch_id: fork.branch_id.clone(),
            fork_entry_id: fork.id.clone(),
            checkpoint_id: None,
            created_at: now_millis(),
        };
        let parent_world = self.world_state(story_id, fork.branch_id.as_deref())?;
        self.store.put_branch(&branch)?;
        let copied = self.copy_world_into(&branch, &parent_world, fork.position)?;
        info!(
            branch_id = %branch.id,
            parent = ?branch.parent_branch_id,
            fork_position = fork.position,
            copied,
            "Forked branch"
        );
        Ok(branch)
    }

    /// Fork a branch whose world state comes from a checkpoint rather than the live parent.
    pub fn fork_from_checkpoint(
        &self,
        story_id: &str,
        checkpoint_id: &str,
        name: impl Into<String>,
    ) -> Result<Branch, BranchError> {
        let checkpoint = self.get_checkpoint(story_id, checkpoint_id)?;
        let last_entry_id = checkpoint
            .last_entry_id
            .clone()
            .ok_or_else(|| {
                BranchError::EntryNotFound(format!("checkpoint {checkpoint_id} has no entries"))
            })?;
        let fork = self.require_entry(story_id, &last_entry_id)?;
        let branch = Branch {
            id: crate::story::new_id(),
            story_id: story_id.to_string(),
            name: name.into(),
            parent_branch_id: fork.branch_id.clone(),
            fork_entry_id: fork.id.clone(),
            checkpoint_id: Some(checkpoint.id.clone()),
            created_at: now_millis(),
        };
        self.store.put_branch(&branch)?;
        let copied = self.copy_world_into(&branch, &checkpoint.to_world(), fork.position)?;
        info!(branch_id = %branch.id, checkpoint_id, copied, "Forked branch from checkpoint");
        Ok(branch)
    }

    /// Give `branch` its own copy of `world`'s entities. Returns the number of rows written.
    ///
    /// Entries and their embedded images are inherited through the timeline, not copied.
    /// Chapters are copied only when they end at or before the fork.
    fn copy_world_into(
        &self,
        branch: &Branch,
        world: &WorldState,
        fork_position: u64,
    ) -> Result<usize, BranchError> {
        let entry_positions: HashMap<&str, u64> = world
            .entries
            .iter()
            .map(|e| (e.id.as_str(), e.position))
            .collect();
        let chapters: Vec<&Chapter> = world
            .chapters
            .iter()
            .filter(|c| {
                entry_positions
                    .get(c.end_entry_id.as_str())
                    .is_some_and(|p| *p <= fork_position)
            })
            .collect();

        let mut remap = IdRemap::default();
        remap.assign_all(&world.characters);
        remap.assign_all(&world.locations);
        remap.assign_all(&world.items);
        remap.assign_all(&world.story_beats);
        remap.assign_all(&world.lorebook_entries);
        for chapter in &chapters {
            remap.assign(chapter.id.as_str());
        }

        let story_id = branch.story_id.as_str();
        let owner = || Some(branch.id.clone());
        let characters: Vec<Character> = world
            .characters
            .iter()
            .map(|r| remap_record(r, &remap, story_id, owner()))
            .collect();
        let locations: Vec<Location> = world
            .locations
            .iter()
            .map(|r| remap_record(r, &remap, story_id, owner()))
            .collect();
        let items: Vec<Item> = world
            .items
            .iter()
            .map(|r| remap_record(r, &remap, story_id, owner()))
            .collect();
        let beats: Vec<StoryBeat> = world
            .story_beats
            .iter()
            .map(|r| remap_record(r, &remap, story_id, owner()))
            .collect();
        let lore: Vec<LorebookEntry> = world
            .lorebook_entries
            .iter()
            .map(|r| remap_record(r, &remap, story_id, owner()))
            .collect();
        let chapters: Vec<Chapter> = chapters
            .into_iter()
            .map(|r| remap_record(r, &remap, story_id, owner()))
            .collect();

        let mut written = 0;
        written += self.put_all(&characters)?;
        written += self.put_all(&locations)?;
        written += self.put_all(&items)?;
        written += self.put_all(&beats)?;
        written += self.put_all(&lore)?;
        written += self.put_all(&chapters)?;
        Ok(written)
    }

    fn put_all<T: WorldRecord>(&self, records: &[T]) -> Result<usize, BranchError> {
        for record in records {
            self.store.put_record(record)?;
        }
        Ok(records.len())
    }

    /// Seal a snapshot of the branch's current world state.
    pub fn create_checkpoint(
        &self,
        story_id: &str,
        branch_id: Option<&str>,
        name: impl Into<String>,
    ) -> Result<Checkpoint, BranchError> {
        let world = self.world_state(story_id, branch_id)?;
        let snapshot = CheckpointSnapshot::from_world(&world);
        let checkpoint = Checkpoint::seal(story_id, branch_id.map(str::to_string), name, snapshot)?;
        self.store.put_checkpoint(&checkpoint)?;
        info!(
            checkpoint_id = %checkpoint.id,
            branch_id = ?branch_id,
            entries = checkpoint.entry_count,
            "Created checkpoint"
        );
        Ok(checkpoint)
    }

    pub fn get_checkpoint(
        &self,
        story_id: &str,
        checkpoint_id: &str,
    ) -> Result<Checkpoint, BranchError> {
        self.store
            .get_checkpoint(story_id, checkpoint_id)?
            .ok_or_else(|| {
                BranchError::CheckpointNotFound(checkpoint_id.to_string())
            })
    }

    pub fn list_checkpoints(&self, story_id: &str) -> Result<Vec<Checkpoint>, BranchError> {
        Ok(self.store.list_checkpoints(story_id)?)
    }

    pub fn list_branches(&self, story_id: &str) -> Result<Vec<Branch>, BranchError> {
        Ok(self.store.list_branches(story_id)?)
    }

    /// Make `branch_id` the story's current branch (`None` = main timeline).
    pub fn switch_branch(
        &self,
        story_id: &str,
        branch_id: Option<&str>,
    ) -> Result<Story, BranchError> {
        if let Some(id) = branch_id {
            self.require_branch(story_id, id)?;
        }
        let mut story = self.require_story(story_id)?;
        story.current_branch_id = branch_id.map(str::to_string);
        story.updated_at = now_millis();
        self.store.put_story(&story)?;
        info!(story_id, branch_id = ?branch_id, "Switched branch");
        Ok(story)
    }

    /// Delete a branch and every world-state row it owns. Checkpoints and other branches are
    /// left alone. Returns the number of rows removed.
    pub fn delete_branch(&self, story_id: &str, branch_id: &str) -> Result<usize, BranchError> {
        let branch = self.require_branch(story_id, branch_id)?;
        let removed = self.store.delete_branch_rows(story_id, branch_id)?;
        self.store.delete_branch(story_id, branch_id)?;
        if let Some(mut story) = self.store.get_story(story_id)? {
            if story.current_branch_id.as_deref() == Some(branch_id) {
                story.current_branch_id = branch.parent_branch_id.clone();
                story.updated_at = now_millis();
                self.store.put_story(&story)?;
            }
        }
        info!(story_id, branch_id, removed, "Deleted branch");
        Ok(removed)
    }

    /// Insert branches that may arrive in any order and reference parents later in the list.
    ///
    /// Repeats passes over the pending set, inserting every branch whose parent is absent or
    /// already present, until a pass makes no progress. Whatever remains is inserted with its
    /// parent cleared, which flattens orphaned subtrees onto the main timeline.
    pub fn insert_branches(&self, branches: Vec<Branch>) -> Result<BulkInsertReport, BranchError> {
        let mut report = BulkInsertReport::default();
        let mut present: HashSet<String> = HashSet::new();
        let mut pending = branches;

        loop {
            let mut progressed = false;
            let mut deferred = Vec::new();
            for branch in pending {
                let ready = match branch.parent_branch_id.as_deref() {
                    None => true,
                    Some(parent) => {
                        present.contains(parent)
                            || self.store.get_branch(&branch.story_id, parent)?.is_some()
                    }
                };
                if ready {
                    self.store.put_branch(&branch)?;
                    present.insert(branch.id.clone());
                    report.inserted += 1;
                    progressed = true;
                } else {
                    deferred.push(branch);
                }
            }
            pending = deferred;
            if pending.is_empty() || !progressed {
                break;
            }
        }

        for mut branch in pending {
            warn!(
                branch_id = %branch.id,
                missing_parent = ?branch.parent_branch_id,
                "Parent branch never resolved; inserting as a root branch"
            );
            branch.parent_branch_id = None;
            self.store.put_branch(&branch)?;
            report.inserted += 1;
            report.flattened.push(branch.id);
        }
        Ok(report)
    }
}
