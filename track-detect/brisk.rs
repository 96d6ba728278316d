use image::GrayImage;
use log::debug;
use rayon::prelude::*;
use track_core::{DetectorKind, Keypoint};

use crate::fast::FastDetector;
use crate::nms::local_maxima_3x3;
use crate::pyramid::ImagePyramid;
use crate::types::{ScaleLevel, ScoredCorner};
use crate::KeypointDetector;

/// Pattern diameter at scale 1
const BASIC_SIZE: f32 = 12.0;

/// FAST score maps over octaves and intra-octaves with scale-space suppression
#[derive(Debug, Clone)]
pub struct BriskDetector {
    threshold: u8,
    octaves: usize,
}

impl Default for BriskDetector {
    fn default() -> Self {
        Self {
            threshold: 30,
            octaves: 3,
        }
    }
}

struct Layer {
    level: ScaleLevel,
    scores: Vec<f32>,
}

impl Layer {
    /// Largest score in the 3x3 neighbourhood of the point mapped into this layer
    fn neighbourhood_max(&self, x: f32, y: f32) -> f32 {
        let (w, h) = (self.level.width as i64, self.level.height as i64);
        let cx = (x / self.level.scale).round() as i64;
        let cy = (y / self.level.scale).round() as i64;
        let mut best = 0.0f32;
        for dy in -1..=1 {
            for dx in -1..=1 {
                let (nx, ny) = (cx + dx, cy + dy);
                if nx >= 0 && ny >= 0 && nx < w && ny < h {
                    best = best.max(self.scores[(ny * w + nx) as usize]);
                }
            }
        }
        best
    }
}

impl BriskDetector {
    /// Octave scales 2^i interleaved with intra-octave scales 1.5 * 2^i
    pub fn layer_scales(&self) -> Vec<f32> {
        (0..self.octaves)
            .flat_map(|i| {
                let octave = 2f32.powi(i as i32);
                [octave, 1.5 * octave]
            })
            .collect()
    }
}

impl KeypointDetector for BriskDetector {
    fn kind(&self) -> DetectorKind {
        DetectorKind::Brisk
    }

    fn detect(&self, img: &GrayImage) -> Vec<Keypoint> {
        let (w, h) = (img.width() as usize, img.height() as usize);
        let levels = ImagePyramid::levels_for_scales(w, h, self.layer_scales(), 7);
        let pyramid = ImagePyramid::build(img, &levels);
        let fast = FastDetector::new(self.threshold);

        let layers: Vec<Layer> = levels
            .par_iter()
            .zip(pyramid.par_iter())
            .map(|(level, layer)| Layer {
                level: *level,
                scores: fast.score_map(layer),
            })
            .collect();

        let per_layer: Vec<Vec<Keypoint>> = layers
            .par_iter()
            .enumerate()
            .map(|(i, layer)| {
                let level = &layer.level;
                let maxima: Vec<ScoredCorner> =
                    local_maxima_3x3(&layer.scores, level.width, level.height, 3, 0.0);

                maxima
                    .into_iter()
                    .filter_map(|c| {
                        let x = c.x as f32 * level.scale;
                        let y = c.y as f32 * level.scale;
                        let below = i.checked_sub(1).map(|j| layers[j].neighbourhood_max(x, y));
                        let above = layers.get(i + 1).map(|l| l.neighbourhood_max(x, y));
                        let dominated = below.into_iter().chain(above).any(|s| s > c.score);
                        if dominated {
                            return None;
                        }
                        Some(
                            Keypoint::new(x, y, BASIC_SIZE * level.scale)
                                .with_response(c.score)
                                .with_octave(i),
                        )
                    })
                    .collect()
            })
            .collect();

        debug!(
            "BRISK: {} layers, {} keypoints per layer",
            layers.len(),
            per_layer.iter().map(|l| l.len().to_string()).collect::<Vec<_>>().join("/")
        );
        per_layer.into_iter().flatten().collect()
    }
}
