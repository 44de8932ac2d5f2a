use proptest::prelude::*;

use crate::error::RoundError;
use crate::protocol::timesync::round::{RoundStage, RoundTimestamps, wire_micros};

// ===== Offset formula =====

#[test]
fn test_offset_reference_example() {
    let ts = RoundTimestamps::new(1000, 1050, 1060, 1005);
    // (1050 - 1000 - 1005 + 1060) / 2 = 105 / 2 = 52
    assert_eq!(ts.offset_micros(), Some(52));
}

#[test]
fn test_offset_symmetric_path_is_zero() {
    // 10us each way, follower and leader agree.
    let ts = RoundTimestamps::new(1_000, 1_010, 1_500, 1_510);
    assert_eq!(ts.offset_micros(), Some(0));
    assert_eq!(ts.path_delay_micros(), Some(10));
}

#[test]
fn test_offset_follower_ahead() {
    // Follower 5s ahead, 1ms path delay.
    let ts = RoundTimestamps::new(100_000_000, 105_001_000, 105_002_000, 100_003_000);
    assert_eq!(ts.offset_micros(), Some(5_000_000));
    assert_eq!(ts.path_delay_micros(), Some(1_000));
}

#[test]
fn test_offset_follower_behind_is_negative() {
    // Follower 2s behind, 1ms path delay.
    let ts = RoundTimestamps::new(100_000_000, 98_001_000, 98_002_000, 100_003_000);
    assert_eq!(ts.offset_micros(), Some(-2_000_000));
}

#[test]
fn test_offset_truncates_toward_zero() {
    // Numerator +3 -> 1
    assert_eq!(RoundTimestamps::new(0, 3, 0, 0).offset_micros(), Some(1));
    // Numerator -3 -> -1 (not -2)
    assert_eq!(RoundTimestamps::new(3, 0, 0, 0).offset_micros(), Some(-1));
    // Numerator -105 -> -52
    assert_eq!(RoundTimestamps::new(1050, 1000, 1005, 1060).offset_micros(), Some(-52));
}

#[test]
fn test_round_trip() {
    let ts = RoundTimestamps::new(0, 5, 10, 40);
    // (40 - 0) - (10 - 5) = 35
    assert_eq!(ts.round_trip_micros(), Some(35));
}

#[test]
fn test_extreme_timestamps_do_not_overflow() {
    let max = i64::MAX;
    // (1050 - MAX - MAX + 1060) / 2 still fits
    let ts = RoundTimestamps::new(max, 1050, 1060, max);
    assert_eq!(ts.offset_micros(), Some(1055 - max));
    assert_eq!(ts.path_delay_micros(), Some(-5));
    assert_eq!(ts.round_trip_micros(), Some(-10));
}

#[test]
fn test_offset_out_of_range_is_none() {
    let ts = RoundTimestamps::new(i64::MAX, -1_000_000, -1_000_000, i64::MAX);
    assert_eq!(ts.offset_micros(), None);
    assert_eq!(ts.path_delay_micros(), Some(0));

    let ts = RoundTimestamps::new(i64::MIN, 0, 0, i64::MIN);
    assert_eq!(ts.offset_micros(), None);
    assert_eq!(ts.round_trip_micros(), Some(0));

    let ts = RoundTimestamps::new(i64::MIN, 0, i64::MIN, i64::MAX);
    assert_eq!(ts.round_trip_micros(), None);
}

// ===== Wire conversion =====

#[test]
fn test_wire_micros_in_range() {
    assert_eq!(wire_micros(123, RoundStage::WaitFollowUp).unwrap(), 123);
    assert_eq!(
        wire_micros(i64::MAX as u64, RoundStage::WaitFollowUp).unwrap(),
        i64::MAX
    );
}

#[test]
fn test_wire_micros_out_of_range() {
    let err = wire_micros(u64::MAX, RoundStage::WaitDelayResponse).unwrap_err();
    assert!(matches!(
        err,
        RoundError::TimestampOutOfRange {
            stage: RoundStage::WaitDelayResponse,
            value: u64::MAX
        }
    ));
}

proptest! {
    #[test]
    fn test_offset_recovers_true_offset(
        base in 0i64..1_000_000_000_000,
        offset in -10_000_000i64..10_000_000,
        delay in 0i64..100_000,
        turnaround in 0i64..1_000_000
    ) {
        // Symmetric delay: the formula recovers the offset exactly.
        let t0 = base;
        let t1 = t0 + delay + offset;
        let t2 = t1 + turnaround;
        let t3 = t2 - offset + delay;
        let ts = RoundTimestamps::new(t0, t1, t2, t3);
        prop_assert_eq!(ts.offset_micros(), Some(offset));
        prop_assert_eq!(ts.path_delay_micros(), Some(delay));
        prop_assert_eq!(ts.round_trip_micros(), Some(2 * delay));
    }

    #[test]
    fn test_offset_matches_truncating_division(
        t0 in -1_000_000_000i64..1_000_000_000,
        t1 in -1_000_000_000i64..1_000_000_000,
        t2 in -1_000_000_000i64..1_000_000_000,
        t3 in -1_000_000_000i64..1_000_000_000
    ) {
        let ts = RoundTimestamps::new(t0, t1, t2, t3);
        let numerator = t1 - t0 - t3 + t2;
        let expected = numerator / 2;
        prop_assert_eq!(ts.offset_micros(), Some(expected));
        prop_assert!((ts.offset_micros() * 2 - numerator).abs() <= 1);
        prop_assert!(ts.offset_micros().abs() * 2 <= numerator.abs());
    }
}
