//! Retry rollback against a sled store, including a restart between turn and retry.

use super::support::{append, contents, seed_story};
use std::sync::Arc;
use storyloom::branch::BranchManager;
use storyloom::generation::StateHooks;
use storyloom::retry::{RestoreMode, RetryBackup, RetryService};
use storyloom::store::{BranchScope, SledStoryStore, StoryStore};
use storyloom::story::Character;
use storyloom::world::StoryWorld;
use tempfile::TempDir;

fn open(dir: &TempDir) -> StoryWorld<SledStoryStore> {
    let store = Arc::new(SledStoryStore::new(dir.path()).unwrap());
    StoryWorld::new(BranchManager::new(store))
}

#[tokio::test]
async fn test_persisted_backup_rolls_back_after_restart() {
    let dir = TempDir::new().unwrap();
    let story_id = {
        let world = open(&dir);
        let branches = world.branches();
        let (story, _) = seed_story(branches, 2);
        let mira = Character::new(&story.id, "Mira");
        branches.store().put_record(&mira).unwrap();

        let action = world.begin_turn(&story.id, "ring the bell").unwrap();
        let before = branches.world_state(&story.id, None).unwrap();
        let backup = RetryBackup::capture(
            &before,
            &story.id,
            None,
            action.position,
            "ring the bell",
            true,
        );
        world.save_retry_backup(&backup).await.unwrap();

        // The turn happens: narration, a newcomer, and a changed character.
        append(branches, &story.id, None, "the bell answers");
        branches
            .store()
            .put_record(&Character::new(&story.id, "Stranger"))
            .unwrap();
        let mut changed = mira;
        changed.traits.push("deafened".to_string());
        branches.store().put_record(&changed).unwrap();
        branches.store().flush().unwrap();
        story.id
    };

    let world = open(&dir);
    let backup = world.persisted_backup(&story_id).unwrap().unwrap();
    assert!(!backup.has_full_state());
    assert_eq!(backup.user_action_content, "ring the bell");

    let result = RetryService::new()
        .handle_retry_last_message(&backup, &world)
        .await;
    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.mode, RestoreMode::Persistent);
    assert_eq!(result.entries_removed, 2);
    assert_eq!(result.entities_removed, 1);

    let state = world.branches().world_state(&story_id, None).unwrap();
    assert_eq!(contents(&state.entries), ["main 0", "main 1"]);
    assert_eq!(state.characters.len(), 1);
    assert_eq!(state.characters[0].name, "Mira");
    assert!(state.characters[0].traits.is_empty());
}

#[tokio::test]
async fn test_full_state_backup_restores_branch_wholesale() {
    let dir = TempDir::new().unwrap();
    let world = open(&dir);
    let branches = world.branches();
    let (story, main) = seed_story(branches, 2);
    let fork = branches.fork(&story.id, &main[1].id, "side").unwrap();
    branches.switch_branch(&story.id, Some(&fork.id)).unwrap();
    branches
        .store()
        .put_record(&{
            let mut c = Character::new(&story.id, "Oren");
            c.branch_id = Some(fork.id.clone());
            c
        })
        .unwrap();

    let action = world.begin_turn(&story.id, "follow the gulls").unwrap();
    assert_eq!(action.branch_id.as_deref(), Some(fork.id.as_str()));
    let before = branches.world_state(&story.id, Some(&fork.id)).unwrap();
    let backup = RetryBackup::capture(
        &before,
        &story.id,
        Some(fork.id.clone()),
        action.position,
        "follow the gulls",
        true,
    );

    append(branches, &story.id, Some(&fork.id), "gulls scatter");
    let oren: Vec<Character> = branches
        .store()
        .list_records(&story.id, BranchScope::Exact(Some(&fork.id)))
        .unwrap();
    branches
        .store()
        .delete_record::<Character>(&story.id, &oren[0].id)
        .unwrap();

    let result = RetryService::new().restore_from_backup(&backup, &world).await;
    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.mode, RestoreMode::FullState);

    let state = branches.world_state(&story.id, Some(&fork.id)).unwrap();
    assert_eq!(contents(&state.entries), ["main 0", "main 1"]);
    assert_eq!(state.characters, oren);
    // The main timeline is untouched.
    assert_eq!(branches.timeline(&story.id, None).unwrap().len(), 2);
}
