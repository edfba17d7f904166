//! Branch and checkpoint behavior over a real sled store.

use super::support::{append, contents, manager, positions, seed_story};
use storyloom::error::BranchError;
use storyloom::store::{BranchScope, StoryStore};
use storyloom::story::{Character, WorldRecord};

#[test]
fn test_nested_branch_timelines_follow_fork_points() {
    let branches = manager();
    let (story, main) = seed_story(&branches, 5);

    let a = branches.fork(&story.id, &main[2].id, "harbor").unwrap();
    let a3 = append(&branches, &story.id, Some(&a.id), "a 3");
    append(&branches, &story.id, Some(&a.id), "a 4");

    let b = branches.fork(&story.id, &a3.id, "lighthouse").unwrap();
    assert_eq!(b.parent_branch_id.as_deref(), Some(a.id.as_str()));
    let b4 = append(&branches, &story.id, Some(&b.id), "b 4");
    assert_eq!(b4.position, 4);

    let a_timeline = branches.timeline(&story.id, Some(&a.id)).unwrap();
    assert_eq!(
        contents(&a_timeline),
        ["main 0", "main 1", "main 2", "a 3", "a 4"]
    );

    let b_timeline = branches.timeline(&story.id, Some(&b.id)).unwrap();
    assert_eq!(
        contents(&b_timeline),
        ["main 0", "main 1", "main 2", "a 3", "b 4"]
    );
    assert_eq!(positions(&b_timeline), [0, 1, 2, 3, 4]);

    // The main timeline never sees branch entries.
    let main_timeline = branches.timeline(&story.id, None).unwrap();
    assert_eq!(positions(&main_timeline), [0, 1, 2, 3, 4]);
    assert!(main_timeline.iter().all(|e| e.branch_id.is_none()));
}

#[test]
fn test_positions_are_unique_per_branch() {
    let branches = manager();
    let (story, main) = seed_story(&branches, 3);
    let fork = branches.fork(&story.id, &main[0].id, "early").unwrap();
    for i in 0..4 {
        append(&branches, &story.id, Some(&fork.id), &format!("f {i}"));
    }
    let own: Vec<_> = branches
        .store()
        .list_records::<storyloom::story::StoryEntry>(&story.id, BranchScope::Exact(Some(&fork.id)))
        .unwrap();
    let mut seen = positions(&own);
    seen.sort_unstable();
    assert_eq!(seen, [1, 2, 3, 4]);
}

#[test]
fn test_checkpoint_is_unaffected_by_later_turns() {
    let branches = manager();
    let (story, _) = seed_story(&branches, 2);
    let mira = Character::new(&story.id, "Mira");
    branches.store().put_record(&mira).unwrap();

    let checkpoint = branches
        .create_checkpoint(&story.id, None, "before the storm")
        .unwrap();
    assert_eq!(checkpoint.entry_count, 2);

    append(&branches, &story.id, None, "storm");
    let mut changed = mira.clone();
    changed.traits.push("soaked".to_string());
    branches.store().put_record(&changed).unwrap();

    let reread = branches.get_checkpoint(&story.id, &checkpoint.id).unwrap();
    assert_eq!(reread, checkpoint);
    assert!(reread.snapshot.characters_snapshot[0].traits.is_empty());

    let restored = branches
        .fork_from_checkpoint(&story.id, &checkpoint.id, "retry the storm")
        .unwrap();
    assert_eq!(
        restored.checkpoint_id.as_deref(),
        Some(checkpoint.id.as_str())
    );
    let world = branches.world_state(&story.id, Some(&restored.id)).unwrap();
    assert_eq!(contents(&world.entries), ["main 0", "main 1"]);
    assert_eq!(world.characters.len(), 1);
    assert_eq!(world.characters[0].name, "Mira");
    assert!(world.characters[0].traits.is_empty());
    assert_ne!(world.characters[0].id(), mira.id);
}

#[test]
fn test_deleting_parent_branch_surfaces_missing_fork_entry() {
    let branches = manager();
    let (story, main) = seed_story(&branches, 3);
    let parent = branches.fork(&story.id, &main[1].id, "parent").unwrap();
    let fork_point = append(&branches, &story.id, Some(&parent.id), "p 2");
    let child = branches.fork(&story.id, &fork_point.id, "child").unwrap();

    branches.switch_branch(&story.id, Some(&parent.id)).unwrap();
    branches.delete_branch(&story.id, &parent.id).unwrap();

    let story_after = branches.require_story(&story.id).unwrap();
    assert_eq!(story_after.current_branch_id, None);

    let err = branches
        .next_position(&story.id, Some(&child.id))
        .unwrap_err();
    match err {
        BranchError::ForkEntryMissing {
            branch_id,
            fork_entry_id,
        } => {
            assert_eq!(branch_id, child.id);
            assert_eq!(fork_entry_id, fork_point.id);
        }
        other => panic!("expected ForkEntryMissing, got {other:?}"),
    }
}

#[test]
fn test_switch_branch_rejects_unknown_branch() {
    let branches = manager();
    let (story, _) = seed_story(&branches, 1);
    let err = branches.switch_branch(&story.id, Some("nope")).unwrap_err();
    assert!(matches!(err, BranchError::BranchNotFound(_)));
}
