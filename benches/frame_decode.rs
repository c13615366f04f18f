//! Benchmarks for the per-notification hot path
//!
//! Covers frame parsing with XOR and both checksums, fixed-layout record
//! decoding, tagged-field decoding, and a full adapter cycle.
//!
//! Platform: Cross-platform, synthetic frames from `test_utils`

use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use ef_ble_protocol::adapter::run_cycle;
use ef_ble_protocol::codec::{PacketCodec, decode_tagged_fields, encode_tagged_fields};
use ef_ble_protocol::devices::Delta2;
use ef_ble_protocol::projection::FieldProjection;
use ef_ble_protocol::test_utils::{FrameBuilder, battery_layout, battery_payload};
use std::hint::black_box;

fn bench_frame_parse(c: &mut Criterion) {
    let codec = PacketCodec::new(true);
    let legacy = FrameBuilder::new(0x03, 0x20, 0x32).seq(0x0A0B_0C0D).payload(battery_payload(80, 80.5)).build();
    let extended = FrameBuilder::new(0x02, 0xFE, 0x15)
        .version(0x13)
        .seq(0x55)
        .payload(encode_tagged_fields((1..40).map(|n| (n, u64::from(n) * 1000))))
        .build();

    let mut group = c.benchmark_group("frame_parse");
    group.throughput(Throughput::Bytes(legacy.len() as u64));
    group.bench_function("legacy_xor", |b| b.iter(|| codec.parse(black_box(&legacy))));
    group.bench_function("extended_xor", |b| b.iter(|| codec.parse(black_box(&extended))));
    group.finish();

    let packet = codec.parse(&legacy).expect("bench frame parses");
    c.bench_function("frame_serialize", |b| b.iter(|| codec.serialize(black_box(&packet))));
}

fn bench_record_decode(c: &mut Criterion) {
    let layout = battery_layout();
    let payload = battery_payload(64, 63.75);
    let truncated = &payload[..payload.len() / 2];

    let mut group = c.benchmark_group("record_decode");
    group.throughput(Throughput::Bytes(payload.len() as u64));
    group.bench_function("full_payload", |b| b.iter(|| layout.decode(black_box(&payload))));
    group.bench_function("truncated_payload", |b| b.iter(|| layout.decode(black_box(truncated))));
    group.finish();

    let tagged = encode_tagged_fields((1..64).map(|n| (n * 7, u64::from(n) << 20)));
    c.bench_function("tagged_decode", |b| b.iter(|| decode_tagged_fields(black_box(&tagged))));
}

fn bench_projection(c: &mut Criterion) {
    let layout = battery_layout();
    let mut projection = FieldProjection::new();
    for field in layout.fields() {
        projection.register_mapping(format!("pack_{}", field.name), "battery", field.name.as_str(), None);
    }
    let payloads = [battery_payload(50, 50.25), battery_payload(51, 51.0)];

    let mut index = 0;
    c.bench_function("projection_update_cycle", |b| {
        b.iter(|| {
            index ^= 1;
            projection.reset_updated();
            projection.update_from_bytes("battery", &layout, black_box(&payloads[index]));
            projection.finish_cycle();
            black_box(projection.updated_fields().len())
        })
    });
}

fn bench_adapter_cycle(c: &mut Criterion) {
    let _ = tracing_subscriber::fmt::try_init();
    let mut device = Delta2::new().expect("Delta 2 adapter builds");
    let mut inverter = vec![0; 9];
    inverter.extend_from_slice(&[0x78, 0x00, 0xC2, 0x01]);
    let frames = [
        FrameBuilder::new(0x04, 0x20, 0x02).seq(1).payload(inverter.clone()).build(),
        FrameBuilder::new(0x04, 0x20, 0x02).seq(2).payload([&inverter[..11], &[0xC3, 0x01]].concat()).build(),
    ];

    let mut index = 0;
    c.bench_function("delta2_inverter_cycle", |b| {
        b.iter(|| {
            index ^= 1;
            run_cycle(&mut device, black_box(&frames[index]))
        })
    });
}

criterion_group!(benches, bench_frame_parse, bench_record_decode, bench_projection, bench_adapter_cycle);
criterion_main!(benches);
