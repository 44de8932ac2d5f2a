use std::sync::Arc;
use std::time::{Duration, Instant};

use super::*;
use crate::protocol::timesync::{SyncMode, TimesyncPacket};
use crate::testing::{
    LoopbackLeader, ManualClock, ScriptedRound, ScriptedTransport, test_leader_addr,
};

fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    false
}

fn loopback_client(follower_ahead: i64) -> (Arc<ManualClock>, TimeSyncClient<LoopbackLeader>) {
    let clock = Arc::new(ManualClock::default());
    let leader = LoopbackLeader::new(Arc::clone(&clock), SyncMode::TwoStage, follower_ahead);
    let engine = SyncEngine::new(leader, OffsetEstimator::SystemOnly, clock.clone());
    (clock, TimeSyncClient::from_engine(engine, Duration::ZERO))
}

fn scripted_client() -> (ScriptedTransport, Arc<ManualClock>, TimeSyncClient<ScriptedTransport>) {
    let script = ScriptedTransport::new();
    let clock = Arc::new(ManualClock::aligned(2_000_000));
    let engine = SyncEngine::new(script.clone(), OffsetEstimator::SystemOnly, clock.clone());
    let client = TimeSyncClient::from_engine(engine, Duration::from_millis(1));
    (script, clock, client)
}

#[test]
fn test_now_before_sync_is_local_time() {
    let (_script, clock, client) = scripted_client();
    assert!(!client.is_running());
    assert!(!client.is_synchronized());
    assert_eq!(client.current_offset(), 0);
    assert_eq!(client.now(), 2_000_000);

    clock.advance(10);
    assert_eq!(client.now(), 2_000_010);
    assert!(client.local_addr().is_none());
}

#[test]
fn test_start_twice_is_noop() {
    let (_clock, client) = loopback_client(500);
    client.start().unwrap();
    client.start().unwrap();
    assert!(client.is_running());
    assert!(wait_for(|| client.is_synchronized()));
    client.stop().unwrap();
    assert!(!client.is_running());
}

#[test]
fn test_stop_twice_is_ok() {
    let (_clock, client) = loopback_client(0);
    client.stop().unwrap();
    client.start().unwrap();
    client.stop().unwrap();
    client.stop().unwrap();
    assert!(!client.is_running());
}

#[test]
fn test_now_in_leader_time_base() {
    let (clock, client) = loopback_client(1_500);
    client.start().unwrap();
    assert!(wait_for(|| client.current_offset() == 1_500));
    client.stop().unwrap();

    let expected = clock.monotonic_micros() - 1_500;
    assert_eq!(client.now(), u64::try_from(expected).unwrap());
}

#[test]
fn test_now_with_extreme_leader_timestamps() {
    let (script, _clock, client) = scripted_client();
    let max = i64::MAX.unsigned_abs();
    script.push_round(
        test_leader_addr(),
        ScriptedRound {
            sync_id: 3,
            t0: max,
            t1: 1050,
            t2: 1060,
            t3: max,
            mode: SyncMode::OneStage,
        },
    );
    client.start().unwrap();
    assert!(wait_for(|| client.is_synchronized()));
    assert_eq!(client.current_offset(), 1055 - i64::MAX);
    // 2_000_000 - (1055 - i64::MAX)
    assert_eq!(client.now(), max + 1_998_945);

    script.push_round(
        test_leader_addr(),
        ScriptedRound {
            sync_id: 40,
            t0: 1000,
            t1: 1050,
            t2: 1060,
            t3: 1005,
            mode: SyncMode::OneStage,
        },
    );
    assert!(wait_for(|| client.current_offset() == 52));
    assert!(client.is_running());
    client.stop().unwrap();
}

#[test]
fn test_stop_then_start_resumes() {
    let (_clock, client) = loopback_client(-42);
    client.start().unwrap();
    assert!(wait_for(|| client.is_synchronized()));
    client.stop().unwrap();
    let completed = client.stats().completed;

    client.start().unwrap();
    assert!(client.is_running());
    assert!(wait_for(|| client.stats().completed > completed));
    assert_eq!(client.current_offset(), -42);
    client.stop().unwrap();
}

#[test]
fn test_offset_stays_after_failed_rounds() {
    let (script, _clock, client) = scripted_client();
    script.push_round(
        test_leader_addr(),
        ScriptedRound {
            sync_id: 1,
            t0: 1000,
            t1: 1050,
            t2: 1060,
            t3: 1005,
            mode: SyncMode::TwoStage,
        },
    );
    // a sync, then a followup that breaks the sequence
    script.push_packet(TimesyncPacket::sync(10, None), test_leader_addr(), Some(2000));
    script.push_packet(TimesyncPacket::follow_up(13, 2000), test_leader_addr(), None);
    script.push_timeout();

    client.start().unwrap();
    assert!(wait_for(|| script.pending() == 0 && client.stats().failed >= 1));
    assert_eq!(client.current_offset(), 52);
    assert!(client.is_synchronized());
    client.stop().unwrap();

    let stats = client.stats();
    assert_eq!(stats.completed, 1);
    assert!(stats.timed_out >= 1);
}

#[test]
fn test_concurrent_readers() {
    let (_clock, client) = loopback_client(7);
    let client = Arc::new(client);
    client.start().unwrap();

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let client = Arc::clone(&client);
            std::thread::spawn(move || {
                for _ in 0..1_000 {
                    let offset = client.current_offset();
                    assert!(offset == 0 || offset == 7);
                }
            })
        })
        .collect();
    for reader in readers {
        reader.join().unwrap();
    }
    client.stop().unwrap();
}

#[test]
fn test_drop_stops_thread() {
    let (_clock, client) = loopback_client(0);
    client.start().unwrap();
    drop(client);
}

#[test]
fn test_new_rejects_invalid_config() {
    let config = TimeSyncConfig::builder().io_timeout(Duration::ZERO).build();
    let err = TimeSyncClient::new(config).unwrap_err();
    assert!(matches!(err, TimeSyncError::Config { .. }));
}

#[test]
fn test_new_fails_for_unknown_interface() {
    let config = TimeSyncConfig::builder()
        .interface("nosuchif0")
        .bind_addr("127.0.0.1:0".parse().unwrap())
        .build();
    let err = TimeSyncClient::new(config).unwrap_err();
    assert!(err.is_fatal());
}
