use image::GrayImage;
use imageproc::gradients::{horizontal_sobel, vertical_sobel};
use log::debug;
use rayon::prelude::*;
use track_core::{DetectorKind, Keypoint};

use crate::nms::{local_maxima_3x3, suppress_within_radius};
use crate::KeypointDetector;

/// Harris corner detector with min-max normalised responses
#[derive(Debug, Clone)]
pub struct HarrisDetector {
    /// Half size of the structure-tensor window (1 means 3x3)
    block_radius: usize,
    k: f32,
    /// Threshold on the response normalised to [0, 255]
    min_response: f32,
    /// Keypoint diameter, twice the Sobel aperture
    keypoint_size: f32,
    /// Allowed fractional overlap between kept keypoints
    max_overlap: f32,
}

impl Default for HarrisDetector {
    fn default() -> Self {
        Self {
            block_radius: 1,
            k: 0.04,
            min_response: 100.0,
            keypoint_size: 6.0,
            max_overlap: 0.0,
        }
    }
}

impl HarrisDetector {
    /// Raw Harris response `det(M) - k * trace(M)^2` for every pixel
    pub fn response_map(&self, img: &GrayImage) -> Vec<f32> {
        let (w, h) = (img.width() as usize, img.height() as usize);
        let gx = horizontal_sobel(img);
        let gy = vertical_sobel(img);

        let mut ixx = vec![0.0f32; w * h];
        let mut iyy = vec![0.0f32; w * h];
        let mut ixy = vec![0.0f32; w * h];
        for (i, (dx, dy)) in gx.as_raw().iter().zip(gy.as_raw()).enumerate() {
            let (dx, dy) = (*dx as f32, *dy as f32);
            ixx[i] = dx * dx;
            iyy[i] = dy * dy;
            ixy[i] = dx * dy;
        }

        let r = self.block_radius as i64;
        let k = self.k;
        let mut response = vec![0.0f32; w * h];
        response.par_chunks_mut(w).enumerate().for_each(|(y, row)| {
            for (x, out) in row.iter_mut().enumerate() {
                let (mut a, mut b, mut c) = (0.0f32, 0.0f32, 0.0f32);
                for dy in -r..=r {
                    let yy = (y as i64 + dy).clamp(0, h as i64 - 1) as usize;
                    for dx in -r..=r {
                        let xx = (x as i64 + dx).clamp(0, w as i64 - 1) as usize;
                        let idx = yy * w + xx;
                        a += ixx[idx];
                        b += iyy[idx];
                        c += ixy[idx];
                    }
                }
                let trace = a + b;
                *out = a * b - c * c - k * trace * trace;
            }
        });
        response
    }
}

/// Min-max normalisation to [0, 255]; `None` for a constant map
fn normalize_minmax(values: &[f32]) -> Option<Vec<f32>> {
    let min = values.iter().copied().fold(f32::INFINITY, f32::min);
    let max = values.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let range = max - min;
    if !range.is_finite() || range <= f32::EPSILON {
        return None;
    }
    Some(values.iter().map(|v| (v - min) / range * 255.0).collect())
}

/// Harris score of a single location over a `2 * radius + 1` block, used by
/// ORB to rank FAST corners
pub fn harris_score_at(img: &GrayImage, x: usize, y: usize, radius: i64, k: f32) -> f32 {
    let (w, h) = (img.width() as i64, img.height() as i64);
    let raw = img.as_raw();
    let px = |xx: i64, yy: i64| -> f32 {
        raw[(yy.clamp(0, h - 1) * w + xx.clamp(0, w - 1)) as usize] as f32
    };

    let (mut a, mut b, mut c) = (0.0f32, 0.0f32, 0.0f32);
    for dy in -radius..=radius {
        for dx in -radius..=radius {
            let (cx, cy) = (x as i64 + dx, y as i64 + dy);
            let gx = (px(cx + 1, cy - 1) + 2.0 * px(cx + 1, cy) + px(cx + 1, cy + 1))
                - (px(cx - 1, cy - 1) + 2.0 * px(cx - 1, cy) + px(cx - 1, cy + 1));
            let gy = (px(cx - 1, cy + 1) + 2.0 * px(cx, cy + 1) + px(cx + 1, cy + 1))
                - (px(cx - 1, cy - 1) + 2.0 * px(cx, cy - 1) + px(cx + 1, cy - 1));
            a += gx * gx;
            b += gy * gy;
            c += gx * gy;
        }
    }
    let trace = a + b;
    a * b - c * c - k * trace * trace
}

impl KeypointDetector for HarrisDetector {
    fn kind(&self) -> DetectorKind {
        DetectorKind::Harris
    }

    fn detect(&self, img: &GrayImage) -> Vec<Keypoint> {
        let (w, h) = (img.width() as usize, img.height() as usize);
        if w < 3 || h < 3 {
            return Vec::new();
        }
        let Some(normalized) = normalize_minmax(&self.response_map(img)) else {
            return Vec::new();
        };

        let candidates = local_maxima_3x3(&normalized, w, h, 1, self.min_response);
        let min_distance = self.keypoint_size * (1.0 - self.max_overlap);
        let kept = suppress_within_radius(&candidates, min_distance);
        debug!("Harris: {} candidates, {} after overlap suppression", candidates.len(), kept.len());

        kept.into_iter()
            .map(|c| Keypoint::new(c.x as f32, c.y as f32, self.keypoint_size).with_response(c.score))
            .collect()
    }
}
