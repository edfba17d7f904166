//! Branch positions continue from the fork and never collide with the visible timeline.

use proptest::prelude::*;
use std::sync::Arc;
use storyloom::branch::BranchManager;
use storyloom::store::{SledStoryStore, StoryStore};
use storyloom::story::{EntryType, NewEntry, Story, StoryMode};

fn append(branches: &BranchManager<SledStoryStore>, story_id: &str, branch: Option<&str>) -> u64 {
    branches
        .append_entry(NewEntry::new(
            story_id,
            branch.map(str::to_string),
            EntryType::Narration,
            "x",
        ))
        .unwrap()
        .position
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn fork_positions_continue_after_fork_point(
        main_len in 1usize..8,
        fork_seed in any::<prop::sample::Index>(),
        branch_len in 0usize..6,
        nested_len in 0usize..4,
    ) {
        let branches = BranchManager::new(Arc::new(SledStoryStore::temporary().unwrap()));
        let story = Story::new("prop", StoryMode::Adventure);
        branches.store().put_story(&story).unwrap();

        for expected in 0..main_len as u64 {
            prop_assert_eq!(append(&branches, &story.id, None), expected);
        }
        let main = branches.timeline(&story.id, None).unwrap();
        let fork_at = &main[fork_seed.index(main.len())];

        let branch = branches.fork(&story.id, &fork_at.id, "b").unwrap();
        for i in 0..branch_len as u64 {
            prop_assert_eq!(
                append(&branches, &story.id, Some(&branch.id)),
                fork_at.position + 1 + i
            );
        }

        let timeline = branches.timeline(&story.id, Some(&branch.id)).unwrap();
        let positions: Vec<u64> = timeline.iter().map(|e| e.position).collect();
        let expected: Vec<u64> = (0..=fork_at.position + branch_len as u64).collect();
        prop_assert_eq!(positions, expected);

        // A branch of the branch forks at its tip and continues from there.
        let tip = timeline.last().unwrap().clone();
        let nested = branches.fork(&story.id, &tip.id, "n").unwrap();
        for i in 0..nested_len as u64 {
            prop_assert_eq!(append(&branches, &story.id, Some(&nested.id)), tip.position + 1 + i);
        }
        let nested_timeline = branches.timeline(&story.id, Some(&nested.id)).unwrap();
        prop_assert_eq!(nested_timeline.len() as u64, tip.position + 1 + nested_len as u64);
    }
}
