//! Property-based tests for drive-mirror
//!
//! These tests verify invariants that must hold for all inputs:
//! - Truncation is floor and idempotent
//! - Direction follows the truncated comparison
//! - Parsers never panic
//! - Written timestamps read back to the same whole second
//!
//! Run with: cargo test --test property_tests

use proptest::prelude::*;

// ============================================================================
// TRUNCATION TESTS
// ============================================================================

mod truncation_tests {
    use super::*;
    use drive_mirror::Timestamp;

    proptest! {
        /// Invariant: truncate(truncate(t)) == truncate(t)
        #[test]
        fn idempotent(t in 0.0f64..4_000_000_000.0) {
            let once = Timestamp::from_secs_f64(t).truncated();
            prop_assert_eq!(once.truncated(), once);
        }

        /// Invariant: truncation is floor, never round
        #[test]
        fn is_floor(secs in 0i64..4_000_000_000, frac in 0.0f64..0.999) {
            let t = Timestamp::from_secs_f64(secs as f64 + frac);
            prop_assert_eq!(t.truncated().whole_seconds(), secs);
        }

        /// Invariant: a truncated value never exceeds the raw value
        #[test]
        fn never_rounds_up(secs in 0u64..4_000_000_000, nanos in 0u32..1_000_000_000) {
            let time = std::time::UNIX_EPOCH + std::time::Duration::new(secs, nanos);
            let t = Timestamp::from_system_time(time);
            prop_assert!(t.truncated() <= t);
            prop_assert_eq!(t.truncated().whole_seconds(), secs as i64);
        }
    }
}

// ============================================================================
// DIRECTION TESTS
// ============================================================================

mod direction_tests {
    use super::*;
    use drive_mirror::{SyncDirection, Timestamp};

    proptest! {
        /// Invariant: direction is decided by truncated values only
        #[test]
        fn follows_truncated_order(
            local in 0.0f64..4_000_000_000.0,
            remote in 0.0f64..4_000_000_000.0,
        ) {
            let (l, r) = (Timestamp::from_secs_f64(local), Timestamp::from_secs_f64(remote));
            let expected = match l.truncated().whole_seconds().cmp(&r.truncated().whole_seconds()) {
                std::cmp::Ordering::Greater => SyncDirection::Upload,
                std::cmp::Ordering::Less => SyncDirection::Download,
                std::cmp::Ordering::Equal => SyncDirection::Unchanged,
            };
            prop_assert_eq!(SyncDirection::between(l, r), expected);
        }

        /// Invariant: same whole second is always unchanged
        #[test]
        fn same_second_unchanged(secs in 0i64..4_000_000_000, a in 0.0f64..0.999, b in 0.0f64..0.999) {
            let l = Timestamp::from_secs_f64(secs as f64 + a);
            let r = Timestamp::from_secs_f64(secs as f64 + b);
            prop_assert_eq!(SyncDirection::between(l, r), SyncDirection::Unchanged);
        }

        /// Invariant: swapping sides swaps upload and download
        #[test]
        fn antisymmetric(local in 0.0f64..4_000_000_000.0, remote in 0.0f64..4_000_000_000.0) {
            let (l, r) = (Timestamp::from_secs_f64(local), Timestamp::from_secs_f64(remote));
            let swapped = match SyncDirection::between(l, r) {
                SyncDirection::Upload => SyncDirection::Download,
                SyncDirection::Download => SyncDirection::Upload,
                SyncDirection::Unchanged => SyncDirection::Unchanged,
            };
            prop_assert_eq!(SyncDirection::between(r, l), swapped);
        }
    }
}

// ============================================================================
// CANONICAL FORMAT TESTS
// ============================================================================

mod canonical_tests {
    use super::*;
    use drive_mirror::Timestamp;

    proptest! {
        /// Invariant: parse_canonical never panics on any input
        #[test]
        fn never_panics(s in ".*") {
            let _ = Timestamp::parse_canonical(&s);
        }

        /// Invariant: near-misses of the pattern never panic either
        #[test]
        fn never_panics_on_digits(s in "[0-9]{4}-[0-9]{2}-[0-9]{2}T[0-9]{2}:[0-9]{2}:[0-9]{2}\\.[0-9]{1,6}Z") {
            let _ = Timestamp::parse_canonical(&s);
        }

        /// Invariant: non-ASCII digits anywhere are a pattern error, never a panic
        #[test]
        fn unicode_digits_rejected(s in "\\p{Nd}{4}-[0-9]{2}-[0-9]{2}T[0-9]{2}:[0-9]{2}:[0-9]{2}\\.\\p{Nd}{1,6}Z") {
            prop_assume!(!s.is_ascii());
            prop_assert!(matches!(
                Timestamp::parse_canonical(&s),
                Err(drive_mirror::timestamp::TimestampError::Pattern(_))
            ));
        }

        /// Invariant: a written timestamp reads back to the same whole second
        #[test]
        fn written_reads_back(secs in 0u64..253_402_300_799, nanos in 0u32..1_000_000_000) {
            let time = std::time::UNIX_EPOCH + std::time::Duration::new(secs, nanos);
            let t = Timestamp::from_system_time(time);
            let written = t.to_canonical().unwrap();
            let back = Timestamp::parse_canonical(&written).unwrap();
            prop_assert_eq!(back.truncated(), t.truncated());
        }

        /// Invariant: without the trailing Z nothing parses
        #[test]
        fn missing_zone_rejected(secs in 0i64..4_000_000_000) {
            let written = Timestamp::from_secs_f64(secs as f64).to_canonical().unwrap();
            let trimmed = written.trim_end_matches('Z');
            prop_assert!(Timestamp::parse_canonical(trimmed).is_err());
        }
    }
}

// ============================================================================
// PAIR SPEC TESTS
// ============================================================================

mod pair_spec_tests {
    use super::*;
    use drive_mirror::PairSpec;

    proptest! {
        /// Invariant: one comma with both sides present always parses
        #[test]
        fn one_comma_parses(local in "/[a-z0-9_/.]{1,40}", remote in "[A-Za-z0-9_-]{1,44}") {
            let spec = PairSpec::parse(&format!("{},{}", local, remote)).unwrap();
            prop_assert_eq!(spec.remote, remote);
            prop_assert_eq!(spec.local, std::path::PathBuf::from(local));
        }

        /// Invariant: more than one comma is rejected
        #[test]
        fn extra_comma_rejected(a in "[a-z]{1,10}", b in "[a-z]{1,10}", c in "[a-z]{1,10}") {
            let input = format!("{},{},{}", a, b, c);
            prop_assert!(PairSpec::parse(&input).is_err());
        }
    }
}
