//! Persistence layer for the Story Store

use crate::error::StorageError;
use crate::retry::RetryBackup;
use crate::store::{BranchScope, StoryStore};
use crate::story::{Branch, Checkpoint, Story, StoryEntry, Table, WorldRecord};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sled::{Db, Tree};
use std::collections::HashMap;
use std::path::Path;

const TREE_STORIES: &str = "stories";
const TREE_BRANCHES: &str = "branches";
const TREE_CHECKPOINTS: &str = "checkpoints";
const TREE_RETRY_BACKUPS: &str = "retry_backups";

/// Sled-based implementation of StoryStore
///
/// One sled tree per table. Rows are keyed `{story_id}/{id}` so every per-story listing is a
/// prefix scan; values are JSON.
#[derive(Clone)]
pub struct SledStoryStore {
    db: Db,
    stories: Tree,
    branches: Tree,
    checkpoints: Tree,
    retry_backups: Tree,
    world: HashMap<Table, Tree>,
}

impl SledStoryStore {
    /// Open (or create) a store at the given directory.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let db = sled::open(path).map_err(|e| {
            StorageError::IoError(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("Failed to open sled database: {}", e),
            ))
        })?;
        Self::from_db(db)
    }

    /// In-memory store that is discarded on drop.
    pub fn temporary() -> Result<Self, StorageError> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> Result<Self, StorageError> {
        let mut world = HashMap::new();
        for table in Table::BRANCH_SCOPED {
            world.insert(table, db.open_tree(table.name())?);
        }
        Ok(Self {
            stories: db.open_tree(TREE_STORIES)?,
            branches: db.open_tree(TREE_BRANCHES)?,
            checkpoints: db.open_tree(TREE_CHECKPOINTS)?,
            retry_backups: db.open_tree(TREE_RETRY_BACKUPS)?,
            world,
            db,
        })
    }

    fn table(&self, table: Table) -> Result<&Tree, StorageError> {
        self.world.get(&table).ok_or_else(|| StorageError::NotFound {
            table: table.name(),
            id: "<tree>".to_string(),
        })
    }
}

fn row_key(story_id: &str, id: &str) -> String {
    format!("{story_id}/{id}")
}

fn story_prefix(story_id: &str) -> String {
    format!("{story_id}/")
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, StorageError> {
    Ok(serde_json::to_vec(value)?)
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StorageError> {
    Ok(serde_json::from_slice(bytes)?)
}

fn get_json<T: DeserializeOwned>(tree: &Tree, key: &str) -> Result<Option<T>, StorageError> {
    match tree.get(key.as_bytes())? {
        Some(raw) => Ok(Some(decode(&raw)?)),
        None => Ok(None),
    }
}

fn scan_json<T: DeserializeOwned>(tree: &Tree, story_id: &str) -> Result<Vec<T>, StorageError> {
    let mut out = Vec::new();
    for item in tree.scan_prefix(story_prefix(story_id).as_bytes()) {
        let (_, value) = item?;
        out.push(decode(&value)?);
    }
    Ok(out)
}

fn clear_prefix(tree: &Tree, story_id: &str) -> Result<usize, StorageError> {
    let mut batch = sled::Batch::default();
    let mut removed = 0usize;
    for item in tree.scan_prefix(story_prefix(story_id).as_bytes()) {
        let (key, _) = item?;
        batch.remove(key);
        removed += 1;
    }
    tree.apply_batch(batch)?;
    Ok(removed)
}

/// Remove rows of one story whose decoded `branchId` equals `branch_id`.
fn delete_where_branch(
    tree: &Tree,
    story_id: &str,
    branch_id: &str,
) -> Result<usize, StorageError> {
    let mut batch = sled::Batch::default();
    let mut removed = 0usize;
    for item in tree.scan_prefix(story_prefix(story_id).as_bytes()) {
        let (key, value) = item?;
        let row: serde_json::Value = decode(&value)?;
        if row.get("branchId").and_then(|v| v.as_str()) == Some(branch_id) {
            batch.remove(key);
            removed += 1;
        }
    }
    tree.apply_batch(batch)?;
    Ok(removed)
}

impl StoryStore for SledStoryStore {
    fn get_story(&self, story_id: &str) -> Result<Option<Story>, StorageError> {
        get_json(&self.stories, story_id)
    }

    fn put_story(&self, story: &Story) -> Result<(), StorageError> {
        self.stories.insert(story.id.as_bytes(), encode(story)?)?;
        Ok(())
    }

    fn list_stories(&self) -> Result<Vec<Story>, StorageError> {
        let mut out: Vec<Story> = Vec::new();
        for item in self.stories.iter() {
            let (_, value) = item?;
            out.push(decode(&value)?);
        }
        out.sort_by_key(|s| std::cmp::Reverse(s.updated_at));
        Ok(out)
    }

    fn get_record<T: WorldRecord>(
        &self,
        story_id: &str,
        id: &str,
    ) -> Result<Option<T>, StorageError> {
        get_json(self.table(T::TABLE)?, &row_key(story_id, id))
    }

    fn put_record<T: WorldRecord>(&self, record: &T) -> Result<(), StorageError> {
        let key = row_key(record.story_id(), record.id());
        self.table(T::TABLE)?.insert(key.as_bytes(), encode(record)?)?;
        Ok(())
    }

    fn delete_record<T: WorldRecord>(
        &self,
        story_id: &str,
        id: &str,
    ) -> Result<bool, StorageError> {
        let removed = self
            .table(T::TABLE)?
            .remove(row_key(story_id, id).as_bytes())?;
        Ok(removed.is_some())
    }

    fn list_records<T: WorldRecord>(
        &self,
        story_id: &str,
        scope: BranchScope<'_>,
    ) -> Result<Vec<T>, StorageError> {
        let rows: Vec<T> = scan_json(self.table(T::TABLE)?, story_id)?;
        Ok(rows
            .into_iter()
            .filter(|row| scope.matches(row.branch_id()))
            .collect())
    }

    fn delete_branch_rows(&self, story_id: &str, branch_id: &str) -> Result<usize, StorageError> {
        let mut removed = 0usize;
        for table in Table::BRANCH_SCOPED {
            removed += delete_where_branch(self.table(table)?, story_id, branch_id)?;
        }
        Ok(removed)
    }

    fn delete_entries_from(
        &self,
        story_id: &str,
        branch_id: Option<&str>,
        position: u64,
    ) -> Result<Vec<String>, StorageError> {
        let entries: Vec<StoryEntry> =
            self.list_records(story_id, BranchScope::Exact(branch_id))?;
        let tree = self.table(Table::Entries)?;
        let mut batch = sled::Batch::default();
        let mut removed = Vec::new();
        for entry in entries.into_iter().filter(|e| e.position >= position) {
            batch.remove(row_key(story_id, &entry.id).as_bytes());
            removed.push(entry.id);
        }
        tree.apply_batch(batch)?;
        Ok(removed)
    }

    fn get_branch(&self, story_id: &str, branch_id: &str) -> Result<Option<Branch>, StorageError> {
        get_json(&self.branches, &row_key(story_id, branch_id))
    }

    fn put_branch(&self, branch: &Branch) -> Result<(), StorageError> {
        let key = row_key(&branch.story_id, &branch.id);
        self.branches.insert(key.as_bytes(), encode(branch)?)?;
        Ok(())
    }

    fn delete_branch(&self, story_id: &str, branch_id: &str) -> Result<bool, StorageError> {
        Ok(self
            .branches
            .remove(row_key(story_id, branch_id).as_bytes())?
            .is_some())
    }

    fn list_branches(&self, story_id: &str) -> Result<Vec<Branch>, StorageError> {
        let mut branches: Vec<Branch> = scan_json(&self.branches, story_id)?;
        branches.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then(a.id.cmp(&b.id))
        });
        Ok(branches)
    }

    fn get_checkpoint(
        &self,
        story_id: &str,
        checkpoint_id: &str,
    ) -> Result<Option<Checkpoint>, StorageError> {
        let checkpoint: Option<Checkpoint> =
            get_json(&self.checkpoints, &row_key(story_id, checkpoint_id))?;
        if let Some(checkpoint) = &checkpoint {
            checkpoint.verify()?;
        }
        Ok(checkpoint)
    }

    fn put_checkpoint(&self, checkpoint: &Checkpoint) -> Result<(), StorageError> {
        let key = row_key(&checkpoint.story_id, &checkpoint.id);
        self.checkpoints.insert(key.as_bytes(), encode(checkpoint)?)?;
        Ok(())
    }

    fn delete_checkpoint(
        &self,
        story_id: &str,
        checkpoint_id: &str,
    ) -> Result<bool, StorageError> {
        Ok(self
            .checkpoints
            .remove(row_key(story_id, checkpoint_id).as_bytes())?
            .is_some())
    }

    fn list_checkpoints(&self, story_id: &str) -> Result<Vec<Checkpoint>, StorageError> {
        let mut checkpoints: Vec<Checkpoint> = scan_json(&self.checkpoints, story_id)?;
        checkpoints.sort_by_key(|c| c.created_at);
        Ok(checkpoints)
    }

    fn get_retry_backup(&self, story_id: &str) -> Result<Option<RetryBackup>, StorageError> {
        get_json(&self.retry_backups, story_id)
    }

    fn put_retry_backup(&self, backup: &RetryBackup) -> Result<(), StorageError> {
        self.retry_backups
            .insert(backup.story_id.as_bytes(), encode(backup)?)?;
        Ok(())
    }

    fn clear_retry_backup(&self, story_id: &str) -> Result<(), StorageError> {
        self.retry_backups.remove(story_id.as_bytes())?;
        Ok(())
    }

    fn delete_story(&self, story_id: &str) -> Result<(), StorageError> {
        for table in Table::BRANCH_SCOPED {
            clear_prefix(self.table(table)?, story_id)?;
        }
        clear_prefix(&self.branches, story_id)?;
        clear_prefix(&self.checkpoints, story_id)?;
        self.retry_backups.remove(story_id.as_bytes())?;
        self.stories.remove(story_id.as_bytes())?;
        Ok(())
    }

    fn flush(&self) -> Result<(), StorageError> {
        self.db.flush().map_err(|e| {
            StorageError::IoError(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("Failed to flush database: {}", e),
            ))
        })?;
        Ok(())
    }
}
