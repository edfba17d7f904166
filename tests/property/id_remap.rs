//! ID remapping is a stable bijection between old and new IDs.

use proptest::prelude::*;
use std::collections::HashSet;
use storyloom::import::IdRemap;

proptest! {
    #[test]
    fn assign_is_idempotent_and_injective(ids in prop::collection::vec("[a-z0-9]{1,12}", 0..40)) {
        let mut remap = IdRemap::default();
        let first: Vec<String> = ids.iter().map(|id| remap.assign(id)).collect();
        let second: Vec<String> = ids.iter().map(|id| remap.assign(id)).collect();
        prop_assert_eq!(&first, &second);

        let distinct_old: HashSet<&String> = ids.iter().collect();
        let distinct_new: HashSet<&String> = first.iter().collect();
        prop_assert_eq!(distinct_old.len(), distinct_new.len());
        prop_assert_eq!(remap.len(), distinct_old.len());

        for (old, new) in ids.iter().zip(&first) {
            prop_assert_ne!(old, new);
            prop_assert_eq!(remap.original(new), Some(old.as_str()));
            prop_assert_eq!(remap.resolve(old), new.clone());
        }
    }

    #[test]
    fn resolve_leaves_unknown_ids_alone(known in "[a-z]{4}", unknown in "[0-9]{4}") {
        let mut remap = IdRemap::default();
        remap.assign(&known);
        prop_assert_eq!(remap.resolve(&unknown), unknown.clone());
        prop_assert_eq!(remap.resolve_opt(None), None);
    }
}
