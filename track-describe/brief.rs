use image::GrayImage;
use log::debug;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::StandardNormal;
use rayon::prelude::*;
use track_core::{DescriptorKind, Descriptors, Keypoint};

use crate::sampling::{count_clamped, pack_bits, smoothed};
use crate::DescriptorExtractor;

pub const DESCRIPTOR_SIZE: usize = 32;
const N_PAIRS: usize = DESCRIPTOR_SIZE * 8;
/// Side of the square sampling patch
const PATCH_SIZE: f32 = 48.0;
const SMOOTHING_SIGMA: f32 = 2.0;
const PATTERN_SEED: u64 = 0x0b81_ef00;

/// Point-pair offsets drawn i.i.d. from an isotropic Gaussian of sigma
/// `patch / 5`, clamped to the patch; seeded so every run shares a pattern.
pub fn gaussian_pairs(n_pairs: usize, patch_size: f32, seed: u64) -> Vec<(f32, f32, f32, f32)> {
    let half = patch_size / 2.0;
    let sigma = patch_size / 5.0;
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut sample = || {
        let z: f32 = rng.sample(StandardNormal);
        (z * sigma).clamp(-half, half).round()
    };
    (0..n_pairs)
        .map(|_| (sample(), sample(), sample(), sample()))
        .collect()
}

/// Upright BRIEF-256 on a Gaussian-smoothed image
#[derive(Debug, Clone)]
pub struct BriefExtractor {
    pairs: Vec<(f32, f32, f32, f32)>,
}

impl Default for BriefExtractor {
    fn default() -> Self {
        Self {
            pairs: gaussian_pairs(N_PAIRS, PATCH_SIZE, PATTERN_SEED),
        }
    }
}

impl DescriptorExtractor for BriefExtractor {
    fn kind(&self) -> DescriptorKind {
        DescriptorKind::Brief
    }

    fn describe(&self, img: &GrayImage, keypoints: &[Keypoint]) -> Descriptors {
        if keypoints.is_empty() {
            return Descriptors::Binary(Vec::new());
        }
        let clamped = count_clamped(img, keypoints, |_| PATCH_SIZE / 2.0);
        debug!(
            "BRIEF: describing {} keypoints, {} sampled past the border",
            keypoints.len(),
            clamped
        );
        let smooth = smoothed(img, SMOOTHING_SIGMA);
        let (w, h) = (smooth.width() as i64, smooth.height() as i64);
        let raw = smooth.as_raw();
        let at = |x: f32, y: f32| -> u8 {
            let xx = (x.round() as i64).clamp(0, w - 1);
            let yy = (y.round() as i64).clamp(0, h - 1);
            raw[(yy * w + xx) as usize]
        };

        let rows = keypoints
            .par_iter()
            .map(|kp| {
                let bits = self.pairs.iter().map(|&(x1, y1, x2, y2)| {
                    at(kp.x + x1, kp.y + y1) < at(kp.x + x2, kp.y + y2)
                });
                pack_bits(bits, DESCRIPTOR_SIZE)
            })
            .collect();
        Descriptors::Binary(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    #[test]
    fn test_pairs_are_reproducible_and_bounded() {
        let a = gaussian_pairs(N_PAIRS, PATCH_SIZE, PATTERN_SEED);
        let b = gaussian_pairs(N_PAIRS, PATCH_SIZE, PATTERN_SEED);
        assert_eq!(a, b);
        assert!(a
            .iter()
            .all(|p| [p.0, p.1, p.2, p.3].iter().all(|v| v.abs() <= 24.0)));
    }

    #[test]
    fn test_one_row_per_keypoint() {
        let img = GrayImage::from_fn(64, 64, |x, y| Luma([((x * 7 + y * 3) % 256) as u8]));
        let kps = vec![
            Keypoint::new(0.0, 0.0, 7.0),
            Keypoint::new(32.0, 32.0, 7.0),
            Keypoint::new(63.0, 63.0, 7.0),
        ];
        match BriefExtractor::default().describe(&img, &kps) {
            Descriptors::Binary(rows) => {
                assert_eq!(rows.len(), 3);
                assert!(rows.iter().all(|r| r.len() == DESCRIPTOR_SIZE));
            }
            other => panic!("unexpected {:?}", other.element_type()),
        }
    }

    #[test]
    fn test_flat_image_gives_zero_descriptor() {
        let img = GrayImage::from_pixel(40, 40, Luma([90]));
        let d = BriefExtractor::default().describe(&img, &[Keypoint::new(20.0, 20.0, 7.0)]);
        assert_eq!(d, Descriptors::Binary(vec![vec![0u8; DESCRIPTOR_SIZE]]));
    }
}
