//! Benchmark suite for kt-algo
//!
//! Run with: cargo bench

use std::collections::HashMap;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use kt_algo::forgetting::ForgettingCurve;
use kt_algo::recommender::rank;
use kt_algo::{bkt, CandidateQuestion, ModelParameters, RecommenderConfig, SkillSnapshot};

fn bench_bkt_update(c: &mut Criterion) {
    let params = ModelParameters::default();
    c.bench_function("bkt::update_mastery", |b| {
        b.iter(|| bkt::update_mastery(black_box(0.42), black_box(true), &params))
    });
}

fn bench_decay(c: &mut Criterion) {
    let curve = ForgettingCurve::new(0.01, 0.2).unwrap();
    c.bench_function("ForgettingCurve::decay", |b| {
        b.iter(|| curve.decay(black_box(0.8), 0, black_box(86_400_000)))
    });
}

fn bench_rank(c: &mut Criterion) {
    let mut group = c.benchmark_group("rank");
    let config = RecommenderConfig::default();

    let mut skills = HashMap::new();
    for i in 0..50 {
        skills.insert(
            format!("skill-{i}"),
            SkillSnapshot {
                mastery: (i as f64 / 50.0),
                elapsed_ms: Some(i as i64 * 3_600_000),
                observation_count: (i % 6) as u32,
                target_band: (0.4, 0.8),
            },
        );
    }

    for size in [100usize, 1_000, 10_000] {
        let candidates: Vec<CandidateQuestion> = (0..size)
            .map(|i| CandidateQuestion {
                question_id: format!("q{i:06}"),
                skill_id: format!("skill-{}", i % 50),
                difficulty: (i % 11) as f64 / 10.0,
                attempts: (i % 4) as u32,
            })
            .collect();

        group.bench_with_input(BenchmarkId::new("top10", size), &size, |b, _| {
            b.iter(|| {
                let ranking = rank(candidates.clone(), &skills, &config).unwrap();
                black_box(ranking.question_ids(10))
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_bkt_update, bench_decay, bench_rank);
criterion_main!(benches);
