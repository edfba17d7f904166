//! Story Store
//!
//! CRUD access to every story table. The branch manager, the importer, the retry callbacks
//! and the pipeline's state hooks all go through this interface; nothing above it knows
//! how rows are laid out on disk.

pub mod persistence;

pub use persistence::SledStoryStore;

use crate::error::StorageError;
use crate::retry::RetryBackup;
use crate::story::{Branch, Checkpoint, Story, StoryEntry, WorldRecord};

/// Which branch partition a listing reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchScope<'a> {
    /// Rows whose `branch_id` equals the given value exactly (`None` = main timeline).
    Exact(Option<&'a str>),
    /// Every row of the story regardless of branch.
    All,
}

impl BranchScope<'_> {
    pub fn matches(&self, branch_id: Option<&str>) -> bool {
        match self {
            BranchScope::Exact(expected) => *expected == branch_id,
            BranchScope::All => true,
        }
    }
}

/// Story store interface
pub trait StoryStore: Send + Sync {
    fn get_story(&self, story_id: &str) -> Result<Option<Story>, StorageError>;
    fn put_story(&self, story: &Story) -> Result<(), StorageError>;
    fn list_stories(&self) -> Result<Vec<Story>, StorageError>;

    fn get_record<T: WorldRecord>(
        &self,
        story_id: &str,
        id: &str,
    ) -> Result<Option<T>, StorageError>;
    fn put_record<T: WorldRecord>(&self, record: &T) -> Result<(), StorageError>;
    fn delete_record<T: WorldRecord>(&self, story_id: &str, id: &str)
        -> Result<bool, StorageError>;
    fn list_records<T: WorldRecord>(
        &self,
        story_id: &str,
        scope: BranchScope<'_>,
    ) -> Result<Vec<T>, StorageError>;

    /// Delete every row carrying `branch_id` in every branch-scoped table.
    fn delete_branch_rows(&self, story_id: &str, branch_id: &str) -> Result<usize, StorageError>;

    /// Delete entries at or after `position` on one branch. Returns the deleted IDs.
    fn delete_entries_from(
        &self,
        story_id: &str,
        branch_id: Option<&str>,
        position: u64,
    ) -> Result<Vec<String>, StorageError>;

    fn get_branch(&self, story_id: &str, branch_id: &str) -> Result<Option<Branch>, StorageError>;
    fn put_branch(&self, branch: &Branch) -> Result<(), StorageError>;
    fn delete_branch(&self, story_id: &str, branch_id: &str) -> Result<bool, StorageError>;
    fn list_branches(&self, story_id: &str) -> Result<Vec<Branch>, StorageError>;

    /// Returns the checkpoint after verifying its digest.
    fn get_checkpoint(
        &self,
        story_id: &str,
        checkpoint_id: &str,
    ) -> Result<Option<Checkpoint>, StorageError>;
    fn put_checkpoint(&self, checkpoint: &Checkpoint) -> Result<(), StorageError>;
    fn delete_checkpoint(&self, story_id: &str, checkpoint_id: &str)
        -> Result<bool, StorageError>;
    fn list_checkpoints(&self, story_id: &str) -> Result<Vec<Checkpoint>, StorageError>;

    /// Persisted ID-differential retry backup for a story.
    fn get_retry_backup(&self, story_id: &str) -> Result<Option<RetryBackup>, StorageError>;
    fn put_retry_backup(&self, backup: &RetryBackup) -> Result<(), StorageError>;
    fn clear_retry_backup(&self, story_id: &str) -> Result<(), StorageError>;

    /// Remove a story and every row belonging to it.
    fn delete_story(&self, story_id: &str) -> Result<(), StorageError>;

    fn flush(&self) -> Result<(), StorageError>;
}

/// Entries of one branch partition ordered by position.
pub fn entries_on_branch<S: StoryStore>(
    store: &S,
    story_id: &str,
    branch_id: Option<&str>,
) -> Result<Vec<StoryEntry>, StorageError> {
    let mut entries: Vec<StoryEntry> =
        store.list_records(story_id, BranchScope::Exact(branch_id))?;
    entries.sort_by_key(|e| e.position);
    Ok(entries)
}
