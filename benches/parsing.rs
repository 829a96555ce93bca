// benches/parsing.rs
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use pmu_core::acquisition::{SampleProducer, SyntheticSource};
use pmu_core::details::PmuDetails;
use pmu_core::ieee_c37_118::common::FrameType;
use pmu_core::ieee_c37_118::config::GlobalConfig;
use pmu_core::ieee_c37_118::data_frame::DataCodec;
use pmu_core::ieee_c37_118::random::random_configuration;
use pmu_core::ieee_c37_118::utils::calculate_crc;

fn benchmark_crc(c: &mut Criterion) {
    let buffer: Vec<u8> = (0..1024).map(|i| (i % 256) as u8).collect();
    c.bench_function("crc_1k", |b| b.iter(|| calculate_crc(black_box(&buffer))));
}

fn benchmark_config_serialization(c: &mut Criterion) {
    let stock = GlobalConfig::default_for(&PmuDetails::default()).unwrap();
    c.bench_function("serialize_cfg2_stock", |b| {
        b.iter(|| black_box(&stock).get_raw_data(FrameType::Config2).unwrap())
    });

    let large = random_configuration(50, true, false).unwrap();
    c.bench_function("serialize_cfg2_50_pmus", |b| {
        b.iter(|| black_box(&large).get_raw_data(FrameType::Config2).unwrap())
    });
}

fn benchmark_data_decode(c: &mut Criterion) {
    let config = random_configuration(10, false, true).unwrap();
    let mut source = SyntheticSource::seeded(&config, 1).unwrap();
    let sample = source.next_sample().unwrap();

    let mut codec = DataCodec::bind(&config).unwrap();
    codec.decode(&sample, false).unwrap();
    let frame = codec.encode(true).unwrap();

    // Concatenated frames, as read off a socket
    let mut stream = Vec::with_capacity(frame.len() * 1000);
    for _ in 0..1000 {
        stream.extend_from_slice(&frame);
    }

    c.bench_function("decode_data_frame", |b| {
        b.iter(|| codec.decode(black_box(&frame), true).unwrap())
    });

    c.bench_function("decode_1000_frames", |b| {
        b.iter(|| {
            let mut offset = 0;
            while offset < stream.len() {
                offset += codec.decode(black_box(&stream[offset..]), true).unwrap();
            }
        })
    });

    c.bench_function("encode_data_frame", |b| b.iter(|| codec.encode(true).unwrap()));
}

criterion_group!(
    benches,
    benchmark_crc,
    benchmark_config_serialization,
    benchmark_data_decode
);
criterion_main!(benches);
