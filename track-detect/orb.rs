use image::GrayImage;
use log::debug;
use rayon::prelude::*;
use track_core::float_image::intensity_centroid_angle;
use track_core::{DetectorKind, Keypoint};

use crate::fast::FastDetector;
use crate::harris::harris_score_at;
use crate::pyramid::ImagePyramid;
use crate::KeypointDetector;

/// Oriented FAST keypoints over a scale pyramid, ranked by Harris score
#[derive(Debug, Clone)]
pub struct OrbDetector {
    n_features: usize,
    scale_factor: f32,
    n_levels: usize,
    fast_threshold: u8,
    edge_threshold: usize,
    patch_size: usize,
    harris_k: f32,
}

impl Default for OrbDetector {
    fn default() -> Self {
        Self {
            n_features: 500,
            scale_factor: 1.2,
            n_levels: 8,
            fast_threshold: 20,
            edge_threshold: 31,
            patch_size: 31,
            harris_k: 0.04,
        }
    }
}

impl OrbDetector {
    pub fn with_features(mut self, n_features: usize) -> Self {
        self.n_features = n_features;
        self
    }

    /// Per-level feature quotas following a geometric series in the scale factor
    pub fn features_per_level(&self, n_levels: usize) -> Vec<usize> {
        if n_levels == 0 {
            return Vec::new();
        }
        let factor = 1.0 / self.scale_factor;
        let mut desired = self.n_features as f32 * (1.0 - factor)
            / (1.0 - factor.powi(n_levels as i32));

        let mut quotas = Vec::with_capacity(n_levels);
        let mut assigned = 0usize;
        for _ in 0..n_levels - 1 {
            let n = (desired.round() as usize).min(self.n_features - assigned);
            quotas.push(n);
            assigned += n;
            desired *= factor;
        }
        quotas.push(self.n_features - assigned);
        quotas
    }
}

impl KeypointDetector for OrbDetector {
    fn kind(&self) -> DetectorKind {
        DetectorKind::Orb
    }

    fn detect(&self, img: &GrayImage) -> Vec<Keypoint> {
        let (w, h) = (img.width() as usize, img.height() as usize);
        let min_size = 2 * self.edge_threshold + 1;
        let levels =
            ImagePyramid::generate_scale_levels(w, h, self.scale_factor, self.n_levels, min_size);
        let quotas = self.features_per_level(levels.len());
        let pyramid = ImagePyramid::build(img, &levels);
        let fast = FastDetector::new(self.fast_threshold);
        let border = self.edge_threshold;
        let half_patch = (self.patch_size / 2) as i32;

        let per_level: Vec<Vec<Keypoint>> = levels
            .par_iter()
            .zip(pyramid.par_iter())
            .zip(quotas.par_iter())
            .map(|((level, layer), &quota)| {
                let mut corners: Vec<_> = fast
                    .detect_corners(layer)
                    .into_iter()
                    .filter(|c| {
                        c.x >= border
                            && c.y >= border
                            && c.x + border < level.width
                            && c.y + border < level.height
                    })
                    .collect();

                // Pre-trim by FAST score, then rank the survivors by Harris score
                corners.sort_by(|a, b| b.score.total_cmp(&a.score));
                corners.truncate(2 * quota);
                let mut ranked: Vec<_> = corners
                    .into_iter()
                    .map(|c| (c, harris_score_at(layer, c.x, c.y, 3, self.harris_k)))
                    .collect();
                ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
                ranked.truncate(quota);

                ranked
                    .into_iter()
                    .map(|(c, score)| {
                        let angle = intensity_centroid_angle(layer, c.x as f32, c.y as f32, half_patch);
                        Keypoint::new(
                            c.x as f32 * level.scale,
                            c.y as f32 * level.scale,
                            self.patch_size as f32 * level.scale,
                        )
                        .with_response(score)
                        .with_angle(angle.rem_euclid(std::f32::consts::TAU))
                        .with_octave(level.level)
                    })
                    .collect()
            })
            .collect();

        for (level, kps) in per_level.iter().enumerate() {
            debug!("ORB level {}: {} keypoints", level, kps.len());
        }
        per_level.into_iter().flatten().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    fn blocks_image(seed: u64) -> GrayImage {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut img = GrayImage::from_pixel(200, 160, Luma([60]));
        for _ in 0..40 {
            let (x0, y0) = (rng.gen_range(0..180u32), rng.gen_range(0..140u32));
            let (bw, bh) = (rng.gen_range(6..20u32), rng.gen_range(6..20u32));
            let v = rng.gen_range(120..255u32) as u8;
            for y in y0..(y0 + bh).min(160) {
                for x in x0..(x0 + bw).min(200) {
                    img.put_pixel(x, y, Luma([v]));
                }
            }
        }
        img
    }

    #[test]
    fn test_quotas_sum_to_feature_count() {
        let detector = OrbDetector::default();
        let quotas = detector.features_per_level(8);
        assert_eq!(quotas.iter().sum::<usize>(), 500);
        assert!(quotas.windows(2).all(|q| q[0] >= q[1]));
    }

    #[test]
    fn test_respects_feature_budget() {
        let detector = OrbDetector::default().with_features(60);
        let kps = detector.detect(&blocks_image(7));
        assert!(!kps.is_empty());
        assert!(kps.len() <= 60);
    }

    #[test]
    fn test_keypoints_carry_scale_metadata() {
        let kps = OrbDetector::default().detect(&blocks_image(11));
        for kp in &kps {
            let scale = 1.2f32.powi(kp.octave as i32);
            assert!((kp.size - 31.0 * scale).abs() < 1e-3);
            assert!(kp.angle.is_some());
            assert!(kp.response.is_some());
            assert!(kp.x >= 0.0 && kp.x < 200.0 && kp.y >= 0.0 && kp.y < 160.0);
        }
    }

    #[test]
    fn test_tiny_image_yields_nothing() {
        let img = GrayImage::from_pixel(40, 40, Luma([10]));
        assert!(OrbDetector::default().detect(&img).is_empty());
    }
}
