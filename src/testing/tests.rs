use std::sync::Arc;

use super::*;
use crate::clock::ClockSource;
use crate::error::SocketError;
use crate::net::PacketTransport;
use crate::protocol::timesync::{MessageKind, RoundStage, SyncMode, TimesyncPacket};

#[test]
fn test_manual_clock_advances_both() {
    let clock = ManualClock::new(10, 1_000);
    clock.advance(5);
    assert_eq!(clock.monotonic_micros(), 15);
    assert_eq!(clock.realtime_micros(), 1_005);
    assert_eq!(clock.system_to_application_micros(), -990);

    clock.set_monotonic(0);
    assert_eq!(clock.monotonic_micros(), 0);
    assert_eq!(ManualClock::aligned(42).system_to_application_micros(), 0);
}

#[test]
fn test_scripted_transport_replays_in_order() {
    let script = ScriptedTransport::new();
    let leader = test_leader_addr();
    script.push_packet(TimesyncPacket::sync(1, None), leader, Some(100));
    script.push_timeout();

    let mut transport = script.clone();
    let mut buf = [0u8; 32];
    let datagram = transport.recv_timestamped(&mut buf).unwrap();
    assert_eq!(datagram.len, TimesyncPacket::SIZE);
    assert_eq!(datagram.source, leader);
    assert_eq!(datagram.timestamp.unwrap().to_micros(), 100);

    assert!(matches!(transport.recv_from(&mut buf), Err(SocketError::WouldBlock)));
    // empty script also times out
    assert!(matches!(transport.recv_from(&mut buf), Err(SocketError::WouldBlock)));
    assert_eq!(script.pending(), 0);
}

#[test]
fn test_scripted_transport_records_sends() {
    let script = ScriptedTransport::new();
    let mut transport = script.clone();
    transport
        .send_to(&TimesyncPacket::delay_request(9).encode(), test_leader_addr())
        .unwrap();
    assert_eq!(script.sent().len(), 1);
    assert_eq!(script.sent_packets(), vec![TimesyncPacket::delay_request(9)]);
    assert!(matches!(transport.tx_timestamp(), Err(SocketError::WouldBlock)));
}

#[test]
fn test_scripted_round_ids() {
    let round = ScriptedRound {
        sync_id: 10,
        t0: 0,
        t1: 0,
        t2: 0,
        t3: 0,
        mode: SyncMode::TwoStage,
    };
    assert_eq!(round.request_id(), 12);
    let round = ScriptedRound {
        mode: SyncMode::OneStage,
        ..round
    };
    assert_eq!(round.request_id(), 11);
}

#[test]
fn test_loopback_leader_sequence() {
    let clock = Arc::new(ManualClock::aligned(1_000_000));
    let mut leader = LoopbackLeader::new(Arc::clone(&clock), SyncMode::TwoStage, 0);
    let mut buf = [0u8; 32];

    let datagram = leader.recv_timestamped(&mut buf).unwrap();
    let sync = TimesyncPacket::decode(&buf[..datagram.len]).unwrap();
    MessageKind::Sync.validate(&sync, RoundStage::WaitSync).unwrap();
    assert!(!sync.has_time());

    let (len, _) = leader.recv_from(&mut buf).unwrap();
    let follow_up = TimesyncPacket::decode(&buf[..len]).unwrap();
    assert_eq!(follow_up.packet_id, sync.packet_id + 1);

    leader
        .send_to(
            &TimesyncPacket::delay_request(follow_up.packet_id + 1).encode(),
            leader.address(),
        )
        .unwrap();
    assert!(leader.tx_timestamp().is_ok());
    let (len, _) = leader.recv_from(&mut buf).unwrap();
    let response = TimesyncPacket::decode(&buf[..len]).unwrap();
    assert_eq!(response.packet_id, follow_up.packet_id + 2);
    MessageKind::DelayResponse
        .validate(&response, RoundStage::WaitDelayResponse)
        .unwrap();
}

#[test]
fn test_network_simulator_presets() {
    let perfect = NetworkSimulator::perfect();
    assert!(!perfect.should_drop());
    assert_eq!(perfect.get_delay(), std::time::Duration::ZERO);

    assert!(NetworkSimulator::lossy(1.0).should_drop());
    assert!((NetworkSimulator::lossy(3.0).loss_rate - 1.0).abs() < f64::EPSILON);
    assert!(NetworkSimulator::congested().get_delay() >= std::time::Duration::from_millis(2));
}

#[tokio::test]
async fn test_mock_leader_answers_delay_request() {
    let follower = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let mut leader = MockLeader::new(MockLeaderConfig {
        two_stage: false,
        ..MockLeaderConfig::default()
    });
    let leader_addr = leader.start(follower.local_addr().unwrap()).await.unwrap();
    assert_eq!(leader.address(), Some(leader_addr));

    let mut buf = [0u8; 64];
    let sync = loop {
        let (len, from) = follower.recv_from(&mut buf).await.unwrap();
        assert_eq!(from, leader_addr);
        let packet = TimesyncPacket::decode(&buf[..len]).unwrap();
        if MessageKind::Sync.validate(&packet, RoundStage::WaitSync).is_ok() {
            break packet;
        }
    };
    assert!(sync.has_time());

    let request = TimesyncPacket::delay_request(sync.packet_id + 1);
    follower.send_to(&request.encode(), leader_addr).await.unwrap();
    let response = loop {
        let (len, _) = follower.recv_from(&mut buf).await.unwrap();
        let packet = TimesyncPacket::decode(&buf[..len]).unwrap();
        if MessageKind::DelayResponse
            .validate(&packet, RoundStage::WaitDelayResponse)
            .is_ok()
        {
            break packet;
        }
    };
    assert_eq!(response.packet_id, request.packet_id + 1);
    assert!(leader.responses_sent() >= 1);

    leader.stop().await;
}
