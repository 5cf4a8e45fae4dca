//! Ranking latency benchmarks.
//!
//! # Benchmarks
//!
//! - `embedding_scan`: linear scan of the primary space for one query vector
//! - `rescore_two_stages`: full rescore with temporal alignment over two stages
//! - `feedback`: relevance feedback over a uniform result
//!
//! # Running
//!
//! ```bash
//! cargo bench --bench ranking_benchmark
//! ```

use std::hint::black_box;
use std::sync::Arc;

use criterion::{Criterion, criterion_group, criterion_main};
use framehunter_core::{
    EmbeddingRanker, EngineConfig, FeatureSpace, FeatureStore, FrameHunter, FrameMeta, NoExtractor,
    Query, Ranker, SpaceConfig, StageQuery,
};

const DIM: usize = 128;

/// Random unit vectors, 50 frames per video.
fn corpus(frames: usize) -> Arc<FeatureStore> {
    let mut rng = fastrand::Rng::with_seed(42);
    let mut data = Vec::with_capacity(frames * DIM);
    for _ in 0..frames {
        let row: Vec<f32> = (0..DIM).map(|_| rng.f32() - 0.5).collect();
        let norm = row.iter().map(|v| v * v).sum::<f32>().sqrt();
        data.extend(row.iter().map(|v| v / norm));
    }
    let meta = (0..frames as u32)
        .map(|i| FrameMeta::new(i / 50, i % 50, i64::from(i)))
        .collect();
    Arc::new(
        FeatureStore::builder()
            .frames(meta)
            .space(FeatureSpace::Primary, DIM, data)
            .build()
            .unwrap(),
    )
}

fn query_vector(seed: u64) -> Vec<f32> {
    let mut rng = fastrand::Rng::with_seed(seed);
    (0..DIM).map(|_| rng.f32() - 0.5).collect()
}

fn bench_embedding_scan(c: &mut Criterion) {
    let store = corpus(50_000);
    let ranker = EmbeddingRanker::new(store, &SpaceConfig::new(FeatureSpace::Primary, DIM)).unwrap();
    let query = query_vector(1);
    c.bench_function("embedding_scan", |b| {
        b.iter(|| black_box(ranker.rank(&query, None).unwrap()));
    });
}

fn bench_rescore(c: &mut Criterion) {
    let mut config = EngineConfig::default();
    config.som.enabled = false;
    let hunter = FrameHunter::new(corpus(20_000), config, Arc::new(NoExtractor)).unwrap();
    let temporal = Query::builder()
        .stage(StageQuery::embedding(query_vector(2)))
        .stage(StageQuery::embedding(query_vector(3)))
        .build();
    c.bench_function("rescore_two_stages", |b| {
        b.iter(|| black_box(hunter.rescore(&temporal).unwrap()));
    });

    let feedback = Query::builder()
        .likes([10, 500, 7_000])
        .shown((0..60).collect::<Vec<u32>>())
        .build();
    c.bench_function("feedback", |b| {
        b.iter(|| black_box(hunter.rescore(&feedback).unwrap()));
    });
}

criterion_group!(benches, bench_embedding_scan, bench_rescore);
criterion_main!(benches);
