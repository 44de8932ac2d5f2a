use std::sync::Arc;

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use vision_timesync::clock::OffsetEstimator;
use vision_timesync::protocol::timesync::{MessageKind, RoundStage, RoundTimestamps, SyncMode};
use vision_timesync::sync::SyncEngine;
use vision_timesync::testing::{LoopbackLeader, ManualClock};
use vision_timesync::TimesyncPacket;

fn codec_benchmark(c: &mut Criterion) {
    let packet = TimesyncPacket::follow_up(0x00AB_CDEF, 1_704_067_200_123_456);
    let encoded = packet.encode();

    c.bench_function("timesync_encode", |b| b.iter(|| black_box(&packet).encode()));

    c.bench_function("timesync_decode", |b| {
        b.iter(|| TimesyncPacket::decode(black_box(&encoded)).unwrap())
    });

    c.bench_function("timesync_decode_validate", |b| {
        b.iter(|| {
            let decoded = TimesyncPacket::decode(black_box(&encoded)).unwrap();
            MessageKind::FollowUp
                .validate(&decoded, RoundStage::WaitFollowUp)
                .unwrap();
        })
    });
}

fn offset_benchmark(c: &mut Criterion) {
    let timestamps = RoundTimestamps::new(1000, 1050, 1060, 1005);
    c.bench_function("round_offset", |b| {
        b.iter(|| black_box(&timestamps).offset_micros())
    });

    let clock = Arc::new(ManualClock::default());
    let leader = LoopbackLeader::new(Arc::clone(&clock), SyncMode::TwoStage, 250);
    let mut engine = SyncEngine::new(leader, OffsetEstimator::SystemOnly, clock);
    c.bench_function("loopback_round", |b| b.iter(|| engine.run_round().unwrap()));
}

criterion_group!(benches, codec_benchmark, offset_benchmark);
criterion_main!(benches);
