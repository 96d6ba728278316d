use image::GrayImage;
use log::debug;
use rayon::prelude::*;
use track_core::{DescriptorKind, Descriptors, IntegralImage, Keypoint};

use crate::sampling::{
    count_clamped, pack_bits, pair_gradient_angle, ring_pattern, rotate, PatternPoint,
};
use crate::DescriptorExtractor;

pub const DESCRIPTOR_SIZE: usize = 64;
const N_BITS: usize = DESCRIPTOR_SIZE * 8;

const RADII: [f32; 5] = [0.0, 2.9, 4.9, 7.4, 10.8];
const COUNTS: [usize; 5] = [1, 10, 14, 15, 20];
const SIGMAS: [f32; 5] = [0.5, 0.9, 1.1, 1.5, 1.7];
/// Pattern distance limits at unit scale
const SHORT_MAX: f32 = 9.75;
const LONG_MIN: f32 = 13.67;
/// Keypoint size corresponding to unit pattern scale
const BASIC_SIZE: f32 = 12.0;

/// 60-point ring pattern: long pairs give the orientation, short pairs the bits
#[derive(Debug, Clone)]
pub struct BriskExtractor {
    pattern: Vec<PatternPoint>,
    short_pairs: Vec<(usize, usize)>,
    long_pairs: Vec<(usize, usize)>,
}

impl Default for BriskExtractor {
    fn default() -> Self {
        let pattern = ring_pattern(&RADII, &COUNTS, &SIGMAS);
        let mut short_pairs = Vec::new();
        let mut long_pairs = Vec::new();
        for i in 0..pattern.len() {
            for j in 0..i {
                let d = ((pattern[i].x - pattern[j].x).powi(2) + (pattern[i].y - pattern[j].y).powi(2))
                    .sqrt();
                if d < SHORT_MAX {
                    short_pairs.push((i, j));
                } else if d > LONG_MIN {
                    long_pairs.push((i, j));
                }
            }
        }
        short_pairs.truncate(N_BITS);
        Self {
            pattern,
            short_pairs,
            long_pairs,
        }
    }
}

impl BriskExtractor {
    pub fn pattern_len(&self) -> usize {
        self.pattern.len()
    }

    pub fn short_pair_count(&self) -> usize {
        self.short_pairs.len()
    }

    pub fn long_pair_count(&self) -> usize {
        self.long_pairs.len()
    }

    /// Box-smoothed intensities of the pattern scaled by `scale` and rotated by `angle`
    fn sample(&self, ii: &IntegralImage, kp: &Keypoint, scale: f32, angle: f32) -> (Vec<(f32, f32)>, Vec<f32>) {
        let (s, c) = angle.sin_cos();
        let points: Vec<(f32, f32)> = self
            .pattern
            .iter()
            .map(|p| rotate(p.x * scale, p.y * scale, s, c))
            .collect();
        let values = points
            .iter()
            .zip(&self.pattern)
            .map(|(&(dx, dy), p)| ii.box_mean(kp.x + dx, kp.y + dy, (p.sigma * scale).max(0.5)))
            .collect();
        (points, values)
    }
}

impl DescriptorExtractor for BriskExtractor {
    fn kind(&self) -> DescriptorKind {
        DescriptorKind::Brisk
    }

    fn describe(&self, img: &GrayImage, keypoints: &[Keypoint]) -> Descriptors {
        if keypoints.is_empty() {
            return Descriptors::Binary(Vec::new());
        }
        let clamped = count_clamped(img, keypoints, |kp| {
            (RADII[4] + SIGMAS[4]) * (kp.size / BASIC_SIZE).max(0.5)
        });
        debug!(
            "BRISK: describing {} keypoints, {} sampled past the border",
            keypoints.len(),
            clamped
        );
        let ii = IntegralImage::new(img);

        let rows = keypoints
            .par_iter()
            .map(|kp| {
                let scale = (kp.size / BASIC_SIZE).max(0.5);
                let (points, values) = self.sample(&ii, kp, scale, 0.0);
                let angle = pair_gradient_angle(&points, &values, &self.long_pairs);
                let (_, values) = self.sample(&ii, kp, scale, angle);
                let bits = self.short_pairs.iter().map(|&(i, j)| values[i] > values[j]);
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
    fn test_pattern_shape() {
        let extractor = BriskExtractor::default();
        assert_eq!(extractor.pattern_len(), 60);
        assert!(extractor.short_pair_count() > 256);
        assert!(extractor.short_pair_count() <= N_BITS);
        assert!(extractor.long_pair_count() > 100);
    }

    #[test]
    fn test_describe_near_border() {
        let img = GrayImage::from_fn(50, 40, |x, y| Luma([((x * 5) ^ (y * 3)) as u8]));
        let kps = [Keypoint::new(0.0, 0.0, 12.0), Keypoint::new(49.0, 39.0, 40.0)];
        let d = BriskExtractor::default().describe(&img, &kps);
        assert_eq!(d.len(), 2);
        assert_eq!(d.dimension(), Some(DESCRIPTOR_SIZE));
    }

    #[test]
    fn test_same_patch_same_descriptor() {
        let img = GrayImage::from_fn(80, 80, |x, y| Luma([((x * 13 + y * 7) % 200) as u8]));
        let shifted = GrayImage::from_fn(90, 90, |x, y| {
            if x >= 10 && y >= 10 {
                *img.get_pixel(x - 10, y - 10)
            } else {
                Luma([0])
            }
        });
        let extractor = BriskExtractor::default();
        let a = extractor.describe(&img, &[Keypoint::new(40.0, 40.0, 12.0)]);
        let b = extractor.describe(&shifted, &[Keypoint::new(50.0, 50.0, 12.0)]);
        assert_eq!(a, b);
    }
}
