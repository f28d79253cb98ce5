//! Dotted-numeric schema versions.

use std::cmp::Ordering;

/// Schema version written by this build.
pub const CURRENT_VERSION: &str = "1.2.0";

/// Version assumed for payloads that carry no version field.
pub const BASELINE_VERSION: &str = "1.0.0";

fn parse_version(version: &str) -> Vec<u64> {
    version
        .split('.')
        .map(|segment| segment.trim().parse().unwrap_or(0))
        .collect()
}

/// Compare two version strings segment by segment. Missing trailing
/// segments count as zero, so `"1.2"` equals `"1.2.0"`.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let a = parse_version(a);
    let b = parse_version(b);
    let len = a.len().max(b.len());

    for i in 0..len {
        let left = a.get(i).copied().unwrap_or(0);
        let right = b.get(i).copied().unwrap_or(0);
        match left.cmp(&right) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    Ordering::Equal
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_basic_ordering() {
        assert_eq!(compare_versions("1.0.0", "1.1.0"), Ordering::Less);
        assert_eq!(compare_versions("1.10.0", "1.9.9"), Ordering::Greater);
        assert_eq!(compare_versions("2", "1.99"), Ordering::Greater);
    }

    #[test]
    fn test_differing_segment_counts() {
        assert_eq!(compare_versions("1.2", "1.2.0"), Ordering::Equal);
        assert_eq!(compare_versions("1.2.0.0", "1.2"), Ordering::Equal);
        assert_eq!(compare_versions("1.2", "1.2.1"), Ordering::Less);
    }

    #[test]
    fn test_non_numeric_segments_are_zero() {
        assert_eq!(compare_versions("1.x", "1.0"), Ordering::Equal);
        assert_eq!(compare_versions("", "0"), Ordering::Equal);
    }

    fn version() -> impl Strategy<Value = String> {
        prop::collection::vec(0u64..20, 1..5).prop_map(|segments| {
            segments
                .iter()
                .map(|s| s.to_string())
                .collect::<Vec<_>>()
                .join(".")
        })
    }

    proptest! {
        #[test]
        fn prop_reflexive(a in version()) {
            prop_assert_eq!(compare_versions(&a, &a), Ordering::Equal);
        }

        #[test]
        fn prop_antisymmetric(a in version(), b in version()) {
            prop_assert_eq!(compare_versions(&a, &b), compare_versions(&b, &a).reverse());
        }

        #[test]
        fn prop_transitive(a in version(), b in version(), c in version()) {
            let ab = compare_versions(&a, &b);
            let bc = compare_versions(&b, &c);
            if ab != Ordering::Greater && bc != Ordering::Greater {
                prop_assert_ne!(compare_versions(&a, &c), Ordering::Greater);
            }
        }

        #[test]
        fn prop_trailing_zero_is_equal(a in version()) {
            let padded = format!("{}.0", a);
            prop_assert_eq!(compare_versions(&a, &padded), Ordering::Equal);
        }
    }
}
