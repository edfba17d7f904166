//! Advancing the in-world clock preserves total elapsed minutes.

use proptest::prelude::*;
use storyloom::story::TimeTracker;

fn total_minutes(t: &TimeTracker) -> u64 {
    ((u64::from(t.years) * 365 + u64::from(t.days)) * 24 + u64::from(t.hours)) * 60
        + u64::from(t.minutes)
}

proptest! {
    #[test]
    fn advance_carries_without_losing_time(steps in prop::collection::vec(0u32..100_000, 0..20)) {
        let mut clock = TimeTracker::default();
        for step in &steps {
            clock.advance(*step);
            prop_assert!(clock.minutes < 60);
            prop_assert!(clock.hours < 24);
            prop_assert!(clock.days < 365);
        }
        let expected: u64 = steps.iter().map(|s| u64::from(*s)).sum();
        prop_assert_eq!(total_minutes(&clock), expected);
    }
}
