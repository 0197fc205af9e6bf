//! Property-based tests for version ordering.
//!
//! The resolver sorts and picks maxima with [`compare`], so it must be a
//! total order: reflexive, antisymmetric, transitive.

use proptest::prelude::*;
use std::cmp::Ordering;
use toolvm_core::version::{compare, filter_stable, resolve_latest_matching, sort_ascending};

// =============================================================================
// Strategies
// =============================================================================

/// Dotted numeric versions, optionally with a pre-release suffix.
fn version_strategy() -> impl Strategy<Value = String> {
    (
        prop::collection::vec(0u32..200, 1..4),
        prop_oneof![
            Just(String::new()),
            Just("-rc1".to_string()),
            Just("-beta.2".to_string()),
            Just("a1".to_string()),
            Just("-alpha".to_string()),
        ],
    )
        .prop_map(|(parts, suffix)| {
            let base = parts
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(".");
            format!("{base}{suffix}")
        })
}

/// Arbitrary short strings, to make sure odd input never breaks the order.
fn any_version() -> impl Strategy<Value = String> {
    prop_oneof![version_strategy(), "[0-9a-z.+_-]{0,12}"]
}

// =============================================================================
// Order laws
// =============================================================================

proptest! {
    #[test]
    fn compare_is_reflexive(v in any_version()) {
        prop_assert_eq!(compare(&v, &v), Ordering::Equal);
    }

    #[test]
    fn compare_is_antisymmetric(a in any_version(), b in any_version()) {
        prop_assert_eq!(compare(&a, &b), compare(&b, &a).reverse());
    }

    #[test]
    fn compare_is_transitive(a in any_version(), b in any_version(), c in any_version()) {
        let mut v = [a, b, c];
        sort_ascending(&mut v);
        prop_assert_ne!(compare(&v[0], &v[1]), Ordering::Greater);
        prop_assert_ne!(compare(&v[1], &v[2]), Ordering::Greater);
        prop_assert_ne!(compare(&v[0], &v[2]), Ordering::Greater);
    }

    #[test]
    fn equal_only_for_identical_strings(a in any_version(), b in any_version()) {
        prop_assert_eq!(compare(&a, &b) == Ordering::Equal, a == b);
    }

    #[test]
    fn release_sorts_after_its_prerelease(parts in prop::collection::vec(0u32..50, 1..4)) {
        let base = parts.iter().map(ToString::to_string).collect::<Vec<_>>().join(".");
        let pre = format!("{base}-rc1");
        prop_assert_eq!(compare(&pre, &base), Ordering::Less);
    }

    #[test]
    fn latest_is_a_stable_member(mut versions in prop::collection::vec(version_strategy(), 1..20)) {
        sort_ascending(&mut versions);
        let latest = resolve_latest_matching("tool", &versions, "", None).unwrap();
        prop_assert!(versions.contains(&latest));

        let stable = filter_stable(&versions, None);
        prop_assert!(stable.contains(&latest));
        for other in &stable {
            prop_assert_ne!(compare(other, &latest), Ordering::Greater);
        }
    }
}
