use image::GrayImage;
use log::debug;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use track_core::{DescriptorKind, Descriptors, IntegralImage, Keypoint};

use crate::sampling::{
    count_clamped, pack_bits, pair_gradient_angle, ring_pattern, rotate, PatternPoint,
};
use crate::DescriptorExtractor;

pub const DESCRIPTOR_SIZE: usize = 64;
const N_BITS: usize = DESCRIPTOR_SIZE * 8;
const POINTS_PER_RING: usize = 6;
/// Pattern extent in pixels for a keypoint of size 1; small keypoints are
/// widened to `MIN_PATTERN_SIZE`
const MIN_PATTERN_SIZE: f32 = 22.0;
const PAIR_SEED: u64 = 0xf4ea_0043;

/// Retina-inspired pattern: 7 rings of 6 overlapping fields plus the centre,
/// with field size growing towards the periphery
#[derive(Debug, Clone)]
pub struct FreakExtractor {
    pattern: Vec<PatternPoint>,
    pairs: Vec<(usize, usize)>,
    orientation_pairs: Vec<(usize, usize)>,
}

impl Default for FreakExtractor {
    fn default() -> Self {
        let big_r = 2.0 / 3.0;
        let small_r = 2.0 / 24.0;
        let unit = (big_r - small_r) / 21.0;
        let radii = [
            big_r,
            big_r - 6.0 * unit,
            big_r - 11.0 * unit,
            big_r - 15.0 * unit,
            big_r - 18.0 * unit,
            big_r - 20.0 * unit,
            small_r,
            0.0,
        ];
        let sigmas = [
            radii[0] / 2.0,
            radii[1] / 2.0,
            radii[2] / 2.0,
            radii[3] / 2.0,
            radii[4] / 2.0,
            radii[5] / 2.0,
            radii[6] / 2.0,
            radii[6] / 2.0,
        ];
        let counts = [POINTS_PER_RING; 7]
            .into_iter()
            .chain([1])
            .collect::<Vec<_>>();
        let pattern = ring_pattern(&radii, &counts, &sigmas);

        // Fixed pseudo-random subset of all point pairs
        let mut all_pairs: Vec<(usize, usize)> = (0..pattern.len())
            .flat_map(|i| (0..i).map(move |j| (i, j)))
            .collect();
        let mut rng = ChaCha8Rng::seed_from_u64(PAIR_SEED);
        all_pairs.shuffle(&mut rng);
        all_pairs.truncate(N_BITS);

        // Diametrically opposite points of each ring
        let orientation_pairs = (0..7)
            .flat_map(|ring| {
                let base = ring * POINTS_PER_RING;
                (0..POINTS_PER_RING / 2).map(move |k| (base + k, base + k + POINTS_PER_RING / 2))
            })
            .collect();

        Self {
            pattern,
            pairs: all_pairs,
            orientation_pairs,
        }
    }
}

impl FreakExtractor {
    pub fn pattern_len(&self) -> usize {
        self.pattern.len()
    }

    fn sample(&self, ii: &IntegralImage, kp: &Keypoint, extent: f32, angle: f32) -> (Vec<(f32, f32)>, Vec<f32>) {
        let (s, c) = angle.sin_cos();
        let points: Vec<(f32, f32)> = self
            .pattern
            .iter()
            .map(|p| rotate(p.x * extent, p.y * extent, s, c))
            .collect();
        let values = points
            .iter()
            .zip(&self.pattern)
            .map(|(&(dx, dy), p)| ii.box_mean(kp.x + dx, kp.y + dy, (p.sigma * extent).max(0.5)))
            .collect();
        (points, values)
    }
}

impl DescriptorExtractor for FreakExtractor {
    fn kind(&self) -> DescriptorKind {
        DescriptorKind::Freak
    }

    fn describe(&self, img: &GrayImage, keypoints: &[Keypoint]) -> Descriptors {
        if keypoints.is_empty() {
            return Descriptors::Binary(Vec::new());
        }
        let clamped = count_clamped(img, keypoints, |kp| kp.size.max(MIN_PATTERN_SIZE));
        debug!(
            "FREAK: describing {} keypoints, {} sampled past the border",
            keypoints.len(),
            clamped
        );
        let ii = IntegralImage::new(img);

        let rows = keypoints
            .par_iter()
            .map(|kp| {
                let extent = kp.size.max(MIN_PATTERN_SIZE);
                let angle = match kp.angle {
                    Some(angle) => angle,
                    None => {
                        let (points, values) = self.sample(&ii, kp, extent, 0.0);
                        pair_gradient_angle(&points, &values, &self.orientation_pairs)
                    }
                };
                let (_, values) = self.sample(&ii, kp, extent, angle);
                let bits = self.pairs.iter().map(|&(i, j)| values[i] > values[j]);
                pack_bits(bits, DESCRIPTOR_SIZE)
            })
            .collect();
        Descriptors::Binary(rows)
    }
}
