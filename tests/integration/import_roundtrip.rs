//! Export then import: the copy is isomorphic to the source under a fresh set of IDs.

use super::support::{append, contents, manager, seed_story};
use std::collections::HashSet;
use storyloom::import::{export_story, Importer, StoryExport};
use storyloom::store::{BranchScope, StoryStore};
use storyloom::story::{Chapter, Item, Location, LorebookEntry, StoryEntry, WorldRecord};

fn main_rows<T: WorldRecord>(store: &impl StoryStore, story_id: &str) -> Vec<T> {
    store
        .list_records(story_id, BranchScope::Exact(None))
        .unwrap()
}

fn by_name<'a>(locations: &'a [Location], name: &str) -> &'a Location {
    locations.iter().find(|l| l.name == name).unwrap()
}

fn entry_content(entries: &[StoryEntry], id: &str) -> String {
    entries.iter().find(|e| e.id == id).unwrap().content.clone()
}

#[test]
fn test_export_import_is_isomorphic() {
    let branches = manager();
    let store = branches.store();
    let (story, main) = seed_story(&branches, 4);

    let mut quay = Location::new(&story.id, "Quay");
    let tower = Location::new(&story.id, "Bell Tower");
    quay.connections.push(tower.id.clone());
    store.put_record(&quay).unwrap();
    store.put_record(&tower).unwrap();

    let mut lantern = Item::new(&story.id, "Lantern");
    lantern.location = quay.id.clone();
    store.put_record(&lantern).unwrap();

    let mut lore = LorebookEntry::new(&story.id, "The Drowned Bell", "concept");
    lore.first_mentioned = Some(main[0].id.clone());
    lore.last_mentioned = Some(main[3].id.clone());
    store.put_record(&lore).unwrap();

    store
        .put_record(&Chapter {
            id: storyloom::story::new_id(),
            story_id: story.id.clone(),
            number: 1,
            title: Some("Arrival".to_string()),
            summary: "We land.".to_string(),
            start_entry_id: main[0].id.clone(),
            end_entry_id: main[1].id.clone(),
            entry_count: 2,
            branch_id: None,
        })
        .unwrap();

    let side = branches
        .fork(&story.id, &main[2].id, "up the tower")
        .unwrap();
    append(&branches, &story.id, Some(&side.id), "side 3");
    let checkpoint = branches
        .create_checkpoint(&story.id, None, "docked")
        .unwrap();

    let export = export_story(store, &story.id).unwrap();
    let json = export.to_json_pretty().unwrap();
    let report = Importer::new(branches.clone()).import_json(&json).unwrap();

    assert_ne!(report.story_id, story.id);
    assert_eq!(report.entries, export.entries.len());
    assert_eq!(report.checkpoints, 1);
    assert_eq!(report.branches.inserted, 1);
    assert!(report.branches.flattened.is_empty());

    let imported = branches.require_story(&report.story_id).unwrap();
    assert_eq!(imported.title, story.title);

    // Every imported ID is fresh.
    let original_ids: HashSet<String> = export.entries.iter().map(|e| e.id.clone()).collect();
    let new_export = export_story(store, &report.story_id).unwrap();
    assert!(new_export
        .entries
        .iter()
        .all(|e| !original_ids.contains(&e.id)));

    // Main timeline and references survive under new IDs.
    let new_main = branches.timeline(&report.story_id, None).unwrap();
    assert_eq!(contents(&new_main), contents(&main));

    let locations: Vec<Location> = main_rows(store, &report.story_id);
    let new_quay = by_name(&locations, "Quay");
    let new_tower = by_name(&locations, "Bell Tower");
    assert_ne!(new_quay.id, quay.id);
    assert_eq!(new_quay.connections, vec![new_tower.id.clone()]);

    let items: Vec<Item> = main_rows(store, &report.story_id);
    assert_eq!(items[0].location, new_quay.id);

    let lore_rows: Vec<LorebookEntry> = main_rows(store, &report.story_id);
    let first = lore_rows[0].first_mentioned.as_deref().unwrap();
    let last = lore_rows[0].last_mentioned.as_deref().unwrap();
    assert_eq!(entry_content(&new_main, first), "main 0");
    assert_eq!(entry_content(&new_main, last), "main 3");

    let chapters: Vec<Chapter> = main_rows(store, &report.story_id);
    assert_eq!(
        entry_content(&new_main, &chapters[0].start_entry_id),
        "main 0"
    );
    assert_eq!(
        entry_content(&new_main, &chapters[0].end_entry_id),
        "main 1"
    );

    // The branch forks at the copy of its original fork entry.
    let new_branches = branches.list_branches(&report.story_id).unwrap();
    assert_eq!(new_branches.len(), 1);
    let new_side = &new_branches[0];
    assert_eq!(entry_content(&new_main, &new_side.fork_entry_id), "main 2");
    assert_eq!(
        contents(
            &branches
                .timeline(&report.story_id, Some(&new_side.id))
                .unwrap()
        ),
        contents(&branches.timeline(&story.id, Some(&side.id)).unwrap())
    );

    // Checkpoints are resealed over remapped contents and still verify.
    let new_checkpoints = branches.list_checkpoints(&report.story_id).unwrap();
    let reread = branches
        .get_checkpoint(&report.story_id, &new_checkpoints[0].id)
        .unwrap();
    assert_ne!(reread.id, checkpoint.id);
    assert_ne!(reread.digest, checkpoint.digest);
    assert!(reread
        .snapshot
        .entries_snapshot
        .iter()
        .all(|e| !original_ids.contains(&e.id) && e.story_id == report.story_id));

    // The source story is untouched.
    assert_eq!(branches.timeline(&story.id, None).unwrap(), main);
}

#[test]
fn test_import_keeps_dangling_references_and_flattens_orphan_branches() {
    let branches = manager();
    let store = branches.store();
    let (story, main) = seed_story(&branches, 4);
    let side = branches.fork(&story.id, &main[2].id, "cellar").unwrap();
    let mut lamp = Item::new(&story.id, "Oil Lamp");
    lamp.location = "gone-location".to_string();
    store.put_record(&lamp).unwrap();

    // Damage the export the way a partial or hand-edited file would be.
    let mut export = export_story(store, &story.id).unwrap();
    export.entries.retain(|e| e.id != main[0].id);
    let second = export
        .entries
        .iter_mut()
        .find(|e| e.id == main[1].id)
        .unwrap();
    second.parent_id = Some(main[0].id.clone());
    export.branches[0].parent_branch_id = Some("missing-branch".to_string());
    let json = export.to_json_pretty().unwrap();

    let report = Importer::new(branches.clone())
        .import_json(&json)
        .unwrap();
    assert_eq!(report.entries, 3);
    assert_eq!(report.branches.inserted, 1);
    assert_eq!(report.branches.flattened.len(), 1);

    let new_main = branches.timeline(&report.story_id, None).unwrap();
    assert_eq!(contents(&new_main), ["main 1", "main 2", "main 3"]);
    assert_eq!(new_main[0].parent_id.as_deref(), Some(main[0].id.as_str()));

    let items: Vec<Item> = main_rows(store, &report.story_id);
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].location, "gone-location");

    let new_side = branches
        .require_branch(&report.story_id, &report.branches.flattened[0])
        .unwrap();
    assert_ne!(new_side.id, side.id);
    assert_eq!(new_side.parent_branch_id, None);
    assert_eq!(entry_content(&new_main, &new_side.fork_entry_id), "main 2");
    assert_eq!(
        branches
            .next_position(&report.story_id, Some(&new_side.id))
            .unwrap(),
        3
    );
}

#[test]
fn test_import_rejects_exports_without_entries() {
    let branches = manager();
    let (story, _) = seed_story(&branches, 1);
    let mut export: StoryExport = export_story(branches.store(), &story.id).unwrap();
    export.entries.clear();
    let json = export.to_json_pretty().unwrap();

    let err = Importer::new(branches.clone())
        .import_json(&json)
        .unwrap_err();
    assert!(matches!(err, storyloom::error::ImportError::EmptyEntries));
    assert_eq!(branches.store().list_stories().unwrap().len(), 1);
}
