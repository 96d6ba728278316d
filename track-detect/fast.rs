use image::GrayImage;
use log::debug;
use rayon::prelude::*;
use track_core::{DetectorKind, Keypoint};

use crate::nms::local_maxima_3x3;
use crate::types::ScoredCorner;
use crate::utils::has_consecutive_pixels;
use crate::KeypointDetector;

/// Bresenham circle of radius 3, clockwise from the top
pub const FAST_OFFSETS: [(i32, i32); 16] = [
    (0, -3), (1, -3), (2, -2), (3, -1),
    (3, 0), (3, 1), (2, 2), (1, 3),
    (0, 3), (-1, 3), (-2, 2), (-3, 1),
    (-3, 0), (-3, -1), (-2, -2), (-1, -3),
];

/// Contiguous arc length required for a corner (FAST-9)
const ARC_LENGTH: usize = 9;
const KEYPOINT_DIAMETER: f32 = 7.0;

/// FAST-9/16 segment test detector
#[derive(Debug, Clone)]
pub struct FastDetector {
    threshold: u8,
    nonmax_suppression: bool,
}

impl Default for FastDetector {
    fn default() -> Self {
        Self::new(30)
    }
}

impl FastDetector {
    pub fn new(threshold: u8) -> Self {
        Self {
            threshold,
            nonmax_suppression: true,
        }
    }

    pub fn with_nonmax_suppression(mut self, enabled: bool) -> Self {
        self.nonmax_suppression = enabled;
        self
    }

    pub fn threshold(&self) -> u8 {
        self.threshold
    }

    /// Dense corner score map, zero for pixels that fail the segment test
    pub fn score_map(&self, img: &GrayImage) -> Vec<f32> {
        let (w, h) = (img.width() as usize, img.height() as usize);
        let mut scores = vec![0.0f32; w * h];
        if w < 7 || h < 7 {
            return scores;
        }
        let raw = img.as_raw();
        let t = self.threshold as i16;

        scores
            .par_chunks_mut(w)
            .enumerate()
            .filter(|(y, _)| *y >= 3 && *y < h - 3)
            .for_each(|(y, row)| {
                for (x, score) in row.iter_mut().enumerate().take(w - 3).skip(3) {
                    *score = corner_score(raw, w, x, y, t);
                }
            });
        scores
    }

    /// Segment-test corners, optionally thinned by 3x3 non-max suppression
    pub fn detect_corners(&self, img: &GrayImage) -> Vec<ScoredCorner> {
        let (w, h) = (img.width() as usize, img.height() as usize);
        let scores = self.score_map(img);
        if self.nonmax_suppression {
            local_maxima_3x3(&scores, w, h, 3, 0.0)
        } else {
            scores
                .iter()
                .enumerate()
                .filter(|&(_, &s)| s > 0.0)
                .map(|(i, &s)| ScoredCorner {
                    x: i % w,
                    y: i / w,
                    score: s,
                })
                .collect()
        }
    }
}

/// Sum of absolute differences beyond the threshold along the winning arc,
/// or 0 when no arc of `ARC_LENGTH` exists
fn corner_score(raw: &[u8], w: usize, x: usize, y: usize, t: i16) -> f32 {
    let p = raw[y * w + x] as i16;
    let sample = |i: usize| {
        let (dx, dy) = FAST_OFFSETS[i];
        raw[(y as i32 + dy) as usize * w + (x as i32 + dx) as usize] as i16
    };

    // Any arc of 9 covers at least two of the four compass points
    let (mut bright_compass, mut dark_compass) = (0, 0);
    for i in [0, 4, 8, 12] {
        let q = sample(i);
        if q > p + t {
            bright_compass += 1;
        } else if q < p - t {
            dark_compass += 1;
        }
    }
    if bright_compass < 2 && dark_compass < 2 {
        return 0.0;
    }

    let mut bright = [false; 16];
    let mut dark = [false; 16];
    let (mut bright_sum, mut dark_sum) = (0i32, 0i32);
    for i in 0..16 {
        let q = sample(i);
        if q > p + t {
            bright[i] = true;
            bright_sum += (q - p - t) as i32;
        } else if q < p - t {
            dark[i] = true;
            dark_sum += (p - q - t) as i32;
        }
    }

    let mut score = 0;
    if has_consecutive_pixels(&bright, ARC_LENGTH) {
        score = bright_sum;
    }
    if has_consecutive_pixels(&dark, ARC_LENGTH) {
        score = score.max(dark_sum);
    }
    score as f32
}

impl KeypointDetector for FastDetector {
    fn kind(&self) -> DetectorKind {
        DetectorKind::Fast
    }

    fn detect(&self, img: &GrayImage) -> Vec<Keypoint> {
        let corners = self.detect_corners(img);
        debug!("FAST: {} corners at threshold {}", corners.len(), self.threshold);
        corners
            .into_iter()
            .map(|c| Keypoint::new(c.x as f32, c.y as f32, KEYPOINT_DIAMETER).with_response(c.score))
            .collect()
    }
}
