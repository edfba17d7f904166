//! Import with ID remapping
//!
//! Importing runs in two passes. The first walks the whole export and assigns a fresh ID to
//! every row it contains, producing an [`IdRemap`]. The second inserts rows, resolving every
//! cross-reference through that map with read-only access. References the map does not know
//! fall back to their original value so a single dangling reference never aborts an import.

pub mod export;
pub mod sync;

pub use export::{export_story, StoryExport, EXPORT_VERSION};
pub use sync::{SyncAction, SyncHandler, SyncRequest, SyncResponse, SyncStoryPreview};

use crate::branch::{BranchManager, BulkInsertReport};
use crate::error::ImportError;
use crate::store::StoryStore;
use crate::story::{
    new_id, now_millis, Branch, Chapter, Character, Checkpoint, EmbeddedImage, Item, Location,
    LorebookEntry, StoryBeat, StoryEntry, WorldRecord, INVENTORY,
};
use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, info};

/// Old-ID to new-ID table, queryable in both directions.
#[derive(Debug, Clone, Default)]
pub struct IdRemap {
    forward: HashMap<String, String>,
    backward: HashMap<String, String>,
}

impl IdRemap {
    /// Assign a fresh ID to `old` unless it already has one. Returns the new ID.
    pub fn assign(&mut self, old: &str) -> String {
        if let Some(existing) = self.forward.get(old) {
            return existing.clone();
        }
        let fresh = new_id();
        self.forward.insert(old.to_string(), fresh.clone());
        self.backward.insert(fresh.clone(), old.to_string());
        fresh
    }

    pub fn assign_all<T: WorldRecord>(&mut self, records: &[T]) {
        for record in records {
            self.assign(record.id());
        }
    }

    /// First pass: IDs for every row of the export, checkpoint snapshot contents included.
    pub fn for_export(export: &StoryExport) -> Self {
        let mut remap = Self::default();
        remap.assign(&export.story.id);
        remap.assign_all(&export.entries);
        for branch in &export.branches {
            remap.assign(&branch.id);
        }
        remap.assign_all(&export.characters);
        remap.assign_all(&export.locations);
        remap.assign_all(&export.items);
        remap.assign_all(&export.story_beats);
        remap.assign_all(&export.chapters);
        remap.assign_all(&export.lorebook_entries);
        remap.assign_all(&export.embedded_images);
        for checkpoint in &export.checkpoints {
            remap.assign(&checkpoint.id);
            let snapshot = &checkpoint.snapshot;
            remap.assign_all(&snapshot.entries_snapshot);
            remap.assign_all(&snapshot.characters_snapshot);
            remap.assign_all(&snapshot.locations_snapshot);
            remap.assign_all(&snapshot.items_snapshot);
            remap.assign_all(&snapshot.story_beats_snapshot);
            remap.assign_all(&snapshot.chapters_snapshot);
            if let Some(lore) = &snapshot.lorebook_entries_snapshot {
                remap.assign_all(lore);
            }
        }
        remap
    }

    pub fn get(&self, old: &str) -> Option<&str> {
        self.forward.get(old).map(String::as_str)
    }

    pub fn original(&self, new: &str) -> Option<&str> {
        self.backward.get(new).map(String::as_str)
    }

    /// New ID for `old`, or `old` itself when it was never assigned.
    pub fn resolve(&self, old: &str) -> String {
        match self.get(old) {
            Some(new) => new.to_string(),
            None => {
                debug!(id = old, "Unmapped reference kept as-is");
                old.to_string()
            }
        }
    }

    pub fn resolve_opt(&self, old: Option<&str>) -> Option<String> {
        old.map(|id| self.resolve(id))
    }

    pub fn len(&self) -> usize {
        self.forward.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }
}

/// Cross-reference fields a record carries besides its own ID, story and branch.
pub trait RemapRefs {
    fn remap_refs(&mut self, remap: &IdRemap);
}

impl RemapRefs for StoryEntry {
    fn remap_refs(&mut self, remap: &IdRemap) {
        self.parent_id = remap.resolve_opt(self.parent_id.as_deref());
    }
}

impl RemapRefs for Character {
    fn remap_refs(&mut self, _remap: &IdRemap) {}
}

impl RemapRefs for StoryBeat {
    fn remap_refs(&mut self, _remap: &IdRemap) {}
}

impl RemapRefs for Location {
    fn remap_refs(&mut self, remap: &IdRemap) {
        for connection in &mut self.connections {
            *connection = remap.resolve(connection);
        }
    }
}

impl RemapRefs for Item {
    fn remap_refs(&mut self, remap: &IdRemap) {
        if self.location != INVENTORY {
            self.location = remap.resolve(&self.location);
        }
    }
}

impl RemapRefs for Chapter {
    fn remap_refs(&mut self, remap: &IdRemap) {
        self.start_entry_id = remap.resolve(&self.start_entry_id);
        self.end_entry_id = remap.resolve(&self.end_entry_id);
    }
}

impl RemapRefs for LorebookEntry {
    fn remap_refs(&mut self, remap: &IdRemap) {
        self.first_mentioned = remap.resolve_opt(self.first_mentioned.as_deref());
        self.last_mentioned = remap.resolve_opt(self.last_mentioned.as_deref());
    }
}

impl RemapRefs for EmbeddedImage {
    fn remap_refs(&mut self, remap: &IdRemap) {
        self.entry_id = remap.resolve(&self.entry_id);
    }
}

/// Copy of `record` with its ID and references resolved through `remap`, placed in
/// `story_id` / `branch_id`.
pub fn remap_record<T: WorldRecord + RemapRefs>(
    record: &T,
    remap: &IdRemap,
    story_id: &str,
    branch_id: Option<String>,
) -> T {
    let mut copy = record.clone();
    copy.set_id(remap.resolve(record.id()));
    copy.set_story_id(story_id.to_string());
    copy.set_branch_id(branch_id);
    copy.remap_refs(remap);
    copy
}

fn remap_all<T: WorldRecord + RemapRefs>(records: &[T], remap: &IdRemap, story_id: &str) -> Vec<T> {
    records
        .iter()
        .map(|r| {
            remap_record(r, remap, story_id, remap.resolve_opt(r.branch_id()))
        })
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    pub story_id: String,
    pub entries: usize,
    pub entities: usize,
    pub checkpoints: usize,
    pub branches: BulkInsertReport,
}

pub struct Importer<S: StoryStore> {
    branches: BranchManager<S>,
}

impl<S: StoryStore> Importer<S> {
    pub fn new(branches: BranchManager<S>) -> Self {
        Self { branches }
    }

    pub fn import_json(&self, json: &str) -> Result<ImportReport, ImportError> {
        let export = StoryExport::parse(json)?;
        self.import(&export)
    }

    /// Insert `export` as a new story. The original story, if still present, is untouched.
    pub fn import(&self, export: &StoryExport) -> Result<ImportReport, ImportError> {
        if export.entries.is_empty() {
            return Err(ImportError::EmptyEntries);
        }
        let remap = IdRemap::for_export(export);
        let store = self.branches.store();

        let mut story = export.story.clone();
        story.id = remap.resolve(&export.story.id);
        story.current_branch_id = remap.resolve_opt(story.current_branch_id.as_deref());
        story.updated_at = now_millis();
        let story_id = story.id.clone();
        store.put_story(&story)?;

        let branches: Vec<Branch> = export
            .branches
            .iter()
            .map(|b| Branch {
                id: remap.resolve(&b.id),
                story_id: story_id.clone(),
                name: b.name.clone(),
                parent_branch_id: remap.resolve_opt(b.parent_branch_id.as_deref()),
                fork_entry_id: remap.resolve(&b.fork_entry_id),
                checkpoint_id: remap.resolve_opt(b.checkpoint_id.as_deref()),
                created_at: b.created_at,
            })
            .collect();
        let branch_report = self.branches.insert_branches(branches)?;

        let entries = remap_all(&export.entries, &remap, &story_id);
        put_all(store, &entries)?;

        let mut entities = 0;
        entities += put_all(store, &remap_all(&export.characters, &remap, &story_id))?;
        entities += put_all(store, &remap_all(&export.locations, &remap, &story_id))?;
        entities += put_all(store, &remap_all(&export.items, &remap, &story_id))?;
        entities += put_all(store, &remap_all(&export.story_beats, &remap, &story_id))?;
        entities += put_all(store, &remap_all(&export.chapters, &remap, &story_id))?;
        entities += put_all(
            store,
            &remap_all(&export.lorebook_entries, &remap, &story_id),
        )?;
        entities += put_all(
            store,
            &remap_all(&export.embedded_images, &remap, &story_id),
        )?;

        for checkpoint in &export.checkpoints {
            let remapped = remap_checkpoint(checkpoint, &remap, &story_id)?;
            store.put_checkpoint(&remapped)?;
        }
        store.flush()?;

        let report = ImportReport {
            story_id,
            entries: entries.len(),
            entities,
            checkpoints: export.checkpoints.len(),
            branches: branch_report,
        };
        info!(
            story_id = %report.story_id,
            original_id = %export.story.id,
            entries = report.entries,
            entities = report.entities,
            branches = report.branches.inserted,
            flattened = report.branches.flattened.len(),
            "Imported story"
        );
        Ok(report)
    }
}

fn put_all<S: StoryStore, T: WorldRecord>(store: &S, records: &[T]) -> Result<usize, ImportError> {
    for record in records {
        store.put_record(record)?;
    }
    Ok(records.len())
}

fn remap_checkpoint(
    checkpoint: &Checkpoint,
    remap: &IdRemap,
    story_id: &str,
) -> Result<Checkpoint, ImportError> {
    let mut copy = checkpoint.clone();
    copy.id = remap.resolve(&checkpoint.id);
    copy.story_id = story_id.to_string();
    copy.branch_id = remap.resolve_opt(checkpoint.branch_id.as_deref());
    copy.last_entry_id = remap.resolve_opt(checkpoint.last_entry_id.as_deref());

    let snapshot = &mut copy.snapshot;
    snapshot.entries_snapshot = remap_all(&snapshot.entries_snapshot, remap, story_id);
    snapshot.characters_snapshot = remap_all(&snapshot.characters_snapshot, remap, story_id);
    snapshot.locations_snapshot = remap_all(&snapshot.locations_snapshot, remap, story_id);
    snapshot.items_snapshot = remap_all(&snapshot.items_snapshot, remap, story_id);
    snapshot.story_beats_snapshot = remap_all(&snapshot.story_beats_snapshot, remap, story_id);
    snapshot.chapters_snapshot = remap_all(&snapshot.chapters_snapshot, remap, story_id);
    snapshot.lorebook_entries_snapshot = snapshot
        .lorebook_entries_snapshot
        .as_ref()
        .map(|lore| remap_all(lore, remap, story_id));
    copy.reseal()?;
    Ok(copy)
}
