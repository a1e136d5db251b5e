//! Property-based tests for version ordering.

use lm_common::Version;
use proptest::prelude::*;
use std::cmp::Ordering;

fn dotted(segments: &[u32]) -> String {
    segments
        .iter()
        .map(|s| s.to_string())
        .collect::<Vec<_>>()
        .join(".")
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    /// Equal-length tuples compare exactly like element-wise numeric comparison.
    #[test]
    fn equal_length_matches_segment_comparison(
        pair in (1usize..6).prop_flat_map(|n| (
            prop::collection::vec(0u32..2000, n),
            prop::collection::vec(0u32..2000, n),
        ))
    ) {
        let (a, b) = pair;
        let va = Version::parse(&dotted(&a)).unwrap();
        let vb = Version::parse(&dotted(&b)).unwrap();
        prop_assert_eq!(va.cmp(&vb), a.cmp(&b));
    }

    /// Ordering is antisymmetric.
    #[test]
    fn ordering_antisymmetric(
        a in prop::collection::vec(0u32..100, 1..5),
        b in prop::collection::vec(0u32..100, 1..5),
    ) {
        let va = Version::parse(&dotted(&a)).unwrap();
        let vb = Version::parse(&dotted(&b)).unwrap();
        prop_assert_eq!(va.cmp(&vb), vb.cmp(&va).reverse());
    }

    /// Appending zero segments never changes the ordering position.
    #[test]
    fn trailing_zeros_are_neutral(
        a in prop::collection::vec(0u32..100, 1..5),
        zeros in 1usize..4,
    ) {
        let mut padded = a.clone();
        padded.extend(std::iter::repeat(0).take(zeros));
        let va = Version::parse(&dotted(&a)).unwrap();
        let vp = Version::parse(&dotted(&padded)).unwrap();
        prop_assert_eq!(va.cmp(&vp), Ordering::Equal);
    }

    /// Ordering is transitive over random triples.
    #[test]
    fn ordering_transitive(
        a in prop::collection::vec(0u32..20, 1..4),
        b in prop::collection::vec(0u32..20, 1..4),
        c in prop::collection::vec(0u32..20, 1..4),
    ) {
        let mut vs = vec![
            Version::parse(&dotted(&a)).unwrap(),
            Version::parse(&dotted(&b)).unwrap(),
            Version::parse(&dotted(&c)).unwrap(),
        ];
        vs.sort();
        prop_assert!(vs[0] <= vs[1]);
        prop_assert!(vs[1] <= vs[2]);
        prop_assert!(vs[0] <= vs[2]);
    }
}

#[test]
fn test_known_orderings() {
    let v = |s: &str| Version::parse(s).unwrap();
    assert!(v("2.1.0") > v("2.0.9"));
    assert!(v("1.10.0") > v("1.9.0"));
    // String comparison would get this one backwards.
    assert!("1.10.0" < "1.9.0");
}
