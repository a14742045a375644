//! Throughput of the hot paths: feature extraction, conditioning, DRBG
//! output and bounded draws. Inputs are fixed so runs are comparable.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use aleamaris::capture::{FrameSource, SyntheticSource};
use aleamaris::conditioning::{Conditioner, ConditionerConfig, ConditioningAlgorithm};
use aleamaris::drbg::{DrbgAlgorithm, DrbgConfig, DrbgEngine, SeedMaterial, SeedOrigin};
use aleamaris::extraction::{ExtractorConfig, FeatureExtractor, RawSample};
use aleamaris::sampler::RejectionSampler;

fn seeded_engine(algorithm: DrbgAlgorithm) -> DrbgEngine {
    let engine = DrbgEngine::new(DrbgConfig {
        algorithm,
        max_bytes_per_seed: u64::MAX,
    });
    engine
        .seed(SeedMaterial::new(vec![0x5a; 64], SeedOrigin::External))
        .expect("seed");
    engine
}

fn bench_extraction(c: &mut Criterion) {
    let mut group = c.benchmark_group("extraction");
    let mut source = SyntheticSource::new(640, 480, 1);
    let frames: Vec<_> = (0..4).map(|_| source.next_frame().expect("frame")).collect();

    for resize in [0u32, 64] {
        group.bench_with_input(BenchmarkId::new("frame_640x480", resize), &resize, |b, &resize| {
            let mut extractor = FeatureExtractor::new(ExtractorConfig {
                resize,
                ..ExtractorConfig::default()
            });
            let mut i = 0;
            b.iter(|| {
                i = (i + 1) % frames.len();
                black_box(extractor.extract(&frames[i]).expect("extract"))
            })
        });
    }
    group.finish();
}

fn bench_conditioning(c: &mut Criterion) {
    let mut group = c.benchmark_group("conditioning");
    let sample = RawSample::from_bytes((0..12_288u32).map(|i| (i * 31) as u8).collect(), 0);
    group.throughput(Throughput::Bytes(sample.len() as u64));

    for algorithm in [
        ConditioningAlgorithm::Sha256,
        ConditioningAlgorithm::Shake256,
        ConditioningAlgorithm::Blake3,
    ] {
        let conditioner = Conditioner::new(ConditionerConfig {
            algorithm,
            ..ConditionerConfig::default()
        })
        .expect("conditioner");
        group.bench_function(algorithm.as_str(), |b| {
            b.iter(|| black_box(conditioner.condition(std::slice::from_ref(&sample)).expect("block")))
        });
    }
    group.finish();
}

fn bench_drbg(c: &mut Criterion) {
    let mut group = c.benchmark_group("drbg");
    group.throughput(Throughput::Bytes(4096));

    for algorithm in [DrbgAlgorithm::ChaCha20, DrbgAlgorithm::KeyedHash] {
        let engine = seeded_engine(algorithm);
        let mut buf = vec![0u8; 4096];
        group.bench_function(algorithm.as_str(), |b| {
            b.iter(|| {
                engine.fill(&mut buf).expect("fill");
                black_box(buf[0])
            })
        });
    }
    group.finish();
}

fn bench_sampler(c: &mut Criterion) {
    let mut group = c.benchmark_group("sampler");
    let sampler = RejectionSampler::new(seeded_engine(DrbgAlgorithm::ChaCha20));

    group.bench_function("dice_6", |b| b.iter(|| black_box(sampler.dice(6).expect("dice"))));
    group.bench_function("roulette", |b| b.iter(|| black_box(sampler.roulette().expect("spin"))));
    // Worst case for rejection: just over a power of two.
    group.bench_function("range_257", |b| {
        b.iter(|| black_box(sampler.uniform_int(0, 256).expect("draw")))
    });
    group.finish();
}

criterion_group!(benches, bench_extraction, bench_conditioning, bench_drbg, bench_sampler);
criterion_main!(benches);
