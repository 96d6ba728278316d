use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use image::{GrayImage, Luma};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use track_core::{DetectorKind, Keypoint, Region};
use track_detect::filter::{limit, Ranking};
use track_detect::{create_detector, RegionFilter};

/// Gradient background with random rectangles, roughly the texture of a road scene
fn create_benchmark_image(width: u32, height: u32, seed: u64) -> GrayImage {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut img = GrayImage::from_fn(width, height, |x, y| {
        Luma([(60 + (x * 80 / width) + ((x + y) % 7)) as u8])
    });
    for _ in 0..(width * height / 2000) {
        let (x0, y0) = (rng.gen_range(0..width), rng.gen_range(0..height));
        let (bw, bh) = (rng.gen_range(4..30), rng.gen_range(4..30));
        let v: u8 = rng.gen_range(0..=255);
        for y in y0..(y0 + bh).min(height) {
            for x in x0..(x0 + bw).min(width) {
                img.put_pixel(x, y, Luma([v]));
            }
        }
    }
    img
}

fn bench_detectors(c: &mut Criterion) {
    let img = create_benchmark_image(621, 188, 42);
    let mut group = c.benchmark_group("detect");
    group.sample_size(10);
    for kind in DetectorKind::ALL {
        let detector = create_detector(kind);
        group.bench_with_input(BenchmarkId::from_parameter(kind), &img, |b, img| {
            b.iter(|| detector.detect(black_box(img)))
        });
    }
    group.finish();
}

fn bench_post_filters(c: &mut Criterion) {
    let mut rng = ChaCha8Rng::seed_from_u64(7);
    let keypoints: Vec<Keypoint> = (0..5000)
        .map(|_| {
            Keypoint::new(rng.gen_range(0.0..1242.0), rng.gen_range(0.0..375.0), 7.0)
                .with_response(rng.gen_range(0.0..100.0))
        })
        .collect();

    c.bench_function("region_filter_5000", |b| {
        let filter = RegionFilter::new(true, Region::default());
        b.iter(|| filter.apply(black_box(keypoints.clone())))
    });
    c.bench_function("limit_by_response_5000", |b| {
        b.iter(|| limit(black_box(keypoints.clone()), 50, Ranking::ByResponse))
    });
}

criterion_group!(benches, bench_detectors, bench_post_filters);
criterion_main!(benches);
