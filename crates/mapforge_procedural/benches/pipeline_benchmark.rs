//! Benchmark for the full generation pipeline.
//!
//! TARGET: 512x512 default map in under 1 second on 8 cores
//!
//! Run with: cargo bench --package mapforge_procedural --bench pipeline_benchmark

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use mapforge_core::WorkerPool;
use mapforge_procedural::{Eroder, ErosionParams, GenerationConfig, HeightmapGenerator, MapGenerator, NoiseParams, WorldSeed};

fn benchmark_full_pipeline(c: &mut Criterion) {
    let mut group = c.benchmark_group("pipeline");
    group.sample_size(10);

    for size in [128u32, 256, 512] {
        let config = GenerationConfig {
            width: size,
            height: size,
            ..GenerationConfig::default()
        };
        let generator = MapGenerator::for_config(&config);
        group.throughput(Throughput::Elements(u64::from(size) * u64::from(size)));
        group.bench_with_input(BenchmarkId::from_parameter(size), &config, |b, config| {
            b.iter(|| {
                // Every iteration must do the work, not hit the cache.
                generator.clear_cache();
                black_box(generator.generate(config))
            });
        });
    }

    group.finish();
}

fn benchmark_erosion(c: &mut Criterion) {
    let pool = WorkerPool::new(0);
    let base = HeightmapGenerator::new(WorldSeed::new(7))
        .generate(&pool, 256, 256, &NoiseParams::default())
        .expect("valid heightmap");
    let params = ErosionParams::default();

    let mut group = c.benchmark_group("erosion_256");
    group.throughput(Throughput::Elements(256 * 256));
    group.sample_size(10);
    group.bench_function("5_iterations", |b| {
        b.iter(|| {
            let mut field = base.clone();
            Eroder::new(&params).apply(&pool, &mut field);
            black_box(field)
        });
    });
    group.finish();
}

fn benchmark_cache_hit(c: &mut Criterion) {
    let config = GenerationConfig {
        width: 128,
        height: 128,
        ..GenerationConfig::default()
    };
    let generator = MapGenerator::for_config(&config);
    let _ = generator.generate(&config);

    c.bench_function("cache_hit_128", |b| {
        b.iter(|| black_box(generator.generate(black_box(&config))));
    });
}

criterion_group!(benches, benchmark_full_pipeline, benchmark_erosion, benchmark_cache_hit);
criterion_main!(benches);
