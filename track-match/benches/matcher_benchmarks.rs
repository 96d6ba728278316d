use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use track_core::{Descriptors, DistanceMetric, MatcherConfig};
use track_match::Matcher;

fn binary_set(n: usize, seed: u64) -> Descriptors {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    Descriptors::Binary((0..n).map(|_| (0..32).map(|_| rng.gen()).collect()).collect())
}

fn float_set(n: usize, seed: u64) -> Descriptors {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    Descriptors::Float(
        (0..n)
            .map(|_| (0..128).map(|_| rng.gen_range(0.0..255.0)).collect())
            .collect(),
    )
}

fn bench_binary(c: &mut Criterion) {
    let mut group = c.benchmark_group("match_binary");
    for n in [100, 500, 1500] {
        let (query, train) = (binary_set(n, 1), binary_set(n, 2));
        let nn = Matcher::new(MatcherConfig::nearest_neighbor(), DistanceMetric::Hamming)
            .unwrap();
        let knn = Matcher::new(MatcherConfig::k_nearest(2), DistanceMetric::Hamming).unwrap();
        group.bench_with_input(BenchmarkId::new("nn", n), &n, |b, _| {
            b.iter(|| nn.match_descriptors(black_box(&query), black_box(&train)))
        });
        group.bench_with_input(BenchmarkId::new("knn", n), &n, |b, _| {
            b.iter(|| knn.match_descriptors(black_box(&query), black_box(&train)))
        });
    }
    group.finish();
}

fn bench_float(c: &mut Criterion) {
    let mut group = c.benchmark_group("match_float");
    group.sample_size(20);
    for n in [100, 500] {
        let (query, train) = (float_set(n, 3), float_set(n, 4));
        let checked = Matcher::new(MatcherConfig::cross_checked(), DistanceMetric::L2).unwrap();
        group.bench_with_input(BenchmarkId::new("cross_check", n), &n, |b, _| {
            b.iter(|| checked.match_descriptors(black_box(&query), black_box(&train)))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_binary, bench_float);
criterion_main!(benches);
