//! Property tests for condition polling and matcher composition.

use std::cell::Cell;

use proptest::prelude::*;

use flicker_collector::hierarchy::entities::{Layer, LayersSnapshot};
use flicker_collector::hierarchy::tree::Hierarchy;
use flicker_collector::matchers::{ComponentMatcher, ComponentNameMatcher};
use flicker_collector::wait::condition::WaitCondition;

proptest! {
    /// A condition first satisfied on fetch `k` (0-based) within the limit
    /// fetches `k + 1` values, retries `k` times and succeeds.
    #[test]
    fn satisfied_within_limit(limit in 0u32..20, k in 0u32..20) {
        prop_assume!(k <= limit);
        let fetches = Cell::new(0u32);
        let retries = Cell::new(0u32);
        let successes = Cell::new(0u32);
        let failures = Cell::new(0u32);
        let ok = WaitCondition::builder(|| {
                let n = fetches.get();
                fetches.set(n + 1);
                n
            })
            .with_predicate("reached k", |v| *v >= k)
            .with_retry_limit(limit)
            .on_retry(|_| retries.set(retries.get() + 1))
            .on_success(|_| successes.set(successes.get() + 1))
            .on_failure(|_| failures.set(failures.get() + 1))
            .build()
            .wait_for();
        prop_assert!(ok);
        prop_assert_eq!(fetches.get(), k + 1);
        prop_assert_eq!(retries.get(), k);
        prop_assert_eq!(successes.get(), 1);
        prop_assert_eq!(failures.get(), 0);
    }

    /// A condition that never holds fetches `limit + 1` values, retries
    /// `limit` times and fails once with the last fetched value.
    #[test]
    fn never_satisfied_exhausts_limit(limit in 0u32..25) {
        let fetches = Cell::new(0u32);
        let retries = Cell::new(0u32);
        let last_failed = Cell::new(None);
        let ok = WaitCondition::builder(|| {
                let n = fetches.get();
                fetches.set(n + 1);
                n
            })
            .with_predicate("never", |_| false)
            .with_retry_limit(limit)
            .on_retry(|_| retries.set(retries.get() + 1))
            .on_failure(|v| last_failed.set(Some(*v)))
            .build()
            .wait_for();
        prop_assert!(!ok);
        prop_assert_eq!(fetches.get(), limit + 1);
        prop_assert_eq!(retries.get(), limit);
        prop_assert_eq!(last_failed.get(), Some(limit));
    }

    /// `A.or(B)` matches exactly when A or B matches on its own.
    #[test]
    fn or_matches_iff_either_side(
        names in prop::collection::vec("[a-c]{1,2}", 0..6),
        a in "[a-c]{1,2}",
        b in "[a-c]{1,2}",
    ) {
        let mut tree = Hierarchy::new();
        let root = tree.add_root(Layer::new("root"));
        for name in &names {
            tree.add_child(root, Layer::new(name.clone())).unwrap();
        }
        let snapshot = LayersSnapshot::new(0, tree);
        let layers = snapshot.all_layers();

        let left = ComponentNameMatcher::exact(a.clone());
        let right = ComponentNameMatcher::exact(b.clone());
        let expected = left.layer_matches_any_of(&layers).unwrap()
            || right.layer_matches_any_of(&layers).unwrap();
        let either = ComponentNameMatcher::exact(a).or(ComponentNameMatcher::exact(b));
        prop_assert_eq!(either.layer_matches_any_of(&layers).unwrap(), expected);
    }
}
