//! Shared fixtures: temporary stores and seeded stories.

use std::sync::Arc;
use storyloom::branch::BranchManager;
use storyloom::store::{SledStoryStore, StoryStore};
use storyloom::story::{EntryType, NewEntry, Story, StoryEntry, StoryMode};

pub fn temp_store() -> Arc<SledStoryStore> {
    Arc::new(SledStoryStore::temporary().unwrap())
}

pub fn manager() -> BranchManager<SledStoryStore> {
    BranchManager::new(temp_store())
}

/// A story whose main timeline alternates user actions and narration, `len` entries long.
pub fn seed_story(
    branches: &BranchManager<SledStoryStore>,
    len: usize,
) -> (Story, Vec<StoryEntry>) {
    let story = Story::new("The Drowned Bell", StoryMode::Adventure);
    branches.store().put_story(&story).unwrap();
    let entries = (0..len)
        .map(|i| {
            let entry_type = if i % 2 == 0 {
                EntryType::UserAction
            } else {
                EntryType::Narration
            };
            append_typed(branches, &story.id, None, entry_type, &format!("main {i}"))
        })
        .collect();
    (story, entries)
}

pub fn append(
    branches: &BranchManager<SledStoryStore>,
    story_id: &str,
    branch_id: Option<&str>,
    content: &str,
) -> StoryEntry {
    append_typed(branches, story_id, branch_id, EntryType::Narration, content)
}

pub fn append_typed(
    branches: &BranchManager<SledStoryStore>,
    story_id: &str,
    branch_id: Option<&str>,
    entry_type: EntryType,
    content: &str,
) -> StoryEntry {
    branches
        .append_entry(NewEntry::new(
            story_id,
            branch_id.map(str::to_string),
            entry_type,
            content,
        ))
        .unwrap()
}

pub fn contents(entries: &[StoryEntry]) -> Vec<String> {
    entries.iter().map(|e| e.content.clone()).collect()
}

pub fn positions(entries: &[StoryEntry]) -> Vec<u64> {
    entries.iter().map(|e| e.position).collect()
}
