use std::f32::consts::SQRT_2;

use image::GrayImage;
use log::debug;
use rayon::prelude::*;
use track_core::float_image::intensity_centroid_angle;
use track_core::{DescriptorKind, Descriptors, Keypoint};

use crate::brief::gaussian_pairs;
use crate::sampling::{bilinear_sample, count_clamped, pack_bits, rotate, smoothed};
use crate::DescriptorExtractor;

pub const DESCRIPTOR_SIZE: usize = 32;
const PATCH_SIZE: f32 = 31.0;
const SMOOTHING_SIGMA: f32 = 2.0;
const PATTERN_SEED: u64 = 0x0b81_ef31;

/// Steered BRIEF: the test pattern follows the keypoint orientation and scale
#[derive(Debug, Clone)]
pub struct OrbExtractor {
    pairs: Vec<(f32, f32, f32, f32)>,
}

impl Default for OrbExtractor {
    fn default() -> Self {
        Self {
            pairs: gaussian_pairs(DESCRIPTOR_SIZE * 8, PATCH_SIZE, PATTERN_SEED),
        }
    }
}

impl DescriptorExtractor for OrbExtractor {
    fn kind(&self) -> DescriptorKind {
        DescriptorKind::Orb
    }

    fn describe(&self, img: &GrayImage, keypoints: &[Keypoint]) -> Descriptors {
        if keypoints.is_empty() {
            return Descriptors::Binary(Vec::new());
        }
        let clamped = count_clamped(img, keypoints, |kp| {
            PATCH_SIZE / 2.0 * (kp.size / PATCH_SIZE).max(1.0) * SQRT_2
        });
        debug!(
            "ORB: describing {} keypoints, {} sampled past the border",
            keypoints.len(),
            clamped
        );
        let smooth = smoothed(img, SMOOTHING_SIGMA);
        let half_patch = (PATCH_SIZE / 2.0) as i32;

        let rows = keypoints
            .par_iter()
            .map(|kp| {
                let angle = kp
                    .angle
                    .unwrap_or_else(|| intensity_centroid_angle(img, kp.x, kp.y, half_patch));
                let scale = (kp.size / PATCH_SIZE).max(1.0);
                let (s, c) = angle.sin_cos();
                let bits = self.pairs.iter().map(|&(x1, y1, x2, y2)| {
                    let (rx1, ry1) = rotate(x1 * scale, y1 * scale, s, c);
                    let (rx2, ry2) = rotate(x2 * scale, y2 * scale, s, c);
                    bilinear_sample(&smooth, kp.x + rx1, kp.y + ry1)
                        < bilinear_sample(&smooth, kp.x + rx2, kp.y + ry2)
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
    use image::imageops;
    use image::Luma;

    fn pattern_image() -> GrayImage {
        GrayImage::from_fn(81, 81, |x, y| {
            let (dx, dy) = (x as f32 - 40.0, y as f32 - 40.0);
            let v = 128.0 + 60.0 * (dx * 0.3).sin() + 40.0 * (dy * 0.17 + dx * 0.05).cos();
            Luma([v.clamp(0.0, 255.0) as u8])
        })
    }

    fn hamming(a: &[u8], b: &[u8]) -> u32 {
        a.iter().zip(b).map(|(x, y)| (x ^ y).count_ones()).sum()
    }

    #[test]
    fn test_rotation_invariance_on_quarter_turn() {
        let img = pattern_image();
        let rotated = imageops::rotate90(&img);
        let extractor = OrbExtractor::default();
        let kp = Keypoint::new(40.0, 40.0, 31.0);

        let a = extractor.describe(&img, &[kp]);
        let b = extractor.describe(&rotated, &[kp]);
        let (Descriptors::Binary(a), Descriptors::Binary(b)) = (a, b) else {
            panic!("expected binary descriptors");
        };
        // Unrelated patterns differ in about half of the 256 bits
        assert!(hamming(&a[0], &b[0]) < 64, "distance {}", hamming(&a[0], &b[0]));
    }

    #[test]
    fn test_uses_given_angle() {
        let img = pattern_image();
        let extractor = OrbExtractor::default();
        let a = extractor.describe(&img, &[Keypoint::new(40.0, 40.0, 31.0).with_angle(0.0)]);
        let b = extractor.describe(&img, &[Keypoint::new(40.0, 40.0, 31.0).with_angle(1.0)]);
        assert_ne!(a, b);
    }
}
