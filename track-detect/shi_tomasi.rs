use image::GrayImage;
use imageproc::gradients::{horizontal_sobel, vertical_sobel};
use log::debug;
use rayon::prelude::*;
use track_core::{DetectorKind, Keypoint};

use crate::nms::{local_maxima_3x3, suppress_within_radius};
use crate::KeypointDetector;

/// Good-features-to-track: minimum eigenvalue of the structure tensor.
///
/// Keypoints come out strongest first and carry no response, so callers rely
/// on the order alone.
#[derive(Debug, Clone)]
pub struct ShiTomasiDetector {
    block_size: usize,
    min_distance: f32,
    quality_level: f32,
}

impl Default for ShiTomasiDetector {
    fn default() -> Self {
        Self {
            block_size: 4,
            min_distance: 4.0,
            quality_level: 0.01,
        }
    }
}

impl ShiTomasiDetector {
    /// Upper bound on returned corners: image area over the squared min distance
    pub fn max_corners(&self, width: usize, height: usize) -> usize {
        let cell = (self.min_distance * self.min_distance).max(1.0) as usize;
        width * height / cell
    }

    /// Smaller eigenvalue of the structure tensor at every pixel
    pub fn min_eigenvalue_map(&self, img: &GrayImage) -> Vec<f32> {
        let (w, h) = (img.width() as usize, img.height() as usize);
        let gx = horizontal_sobel(img);
        let gy = vertical_sobel(img);
        let (gx, gy) = (gx.as_raw(), gy.as_raw());

        // Window of block_size samples with the anchor at (block_size - 1) / 2
        let lo = -(((self.block_size.max(1) - 1) / 2) as i64);
        let hi = lo + self.block_size.max(1) as i64 - 1;

        let mut eig = vec![0.0f32; w * h];
        eig.par_chunks_mut(w).enumerate().for_each(|(y, row)| {
            for (x, out) in row.iter_mut().enumerate() {
                let (mut a, mut b, mut c) = (0.0f32, 0.0f32, 0.0f32);
                for dy in lo..=hi {
                    let yy = (y as i64 + dy).clamp(0, h as i64 - 1) as usize;
                    for dx in lo..=hi {
                        let xx = (x as i64 + dx).clamp(0, w as i64 - 1) as usize;
                        let (ix, iy) = (gx[yy * w + xx] as f32, gy[yy * w + xx] as f32);
                        a += ix * ix;
                        b += iy * iy;
                        c += ix * iy;
                    }
                }
                let half_diff = (a - b) * 0.5;
                *out = (a + b) * 0.5 - (half_diff * half_diff + c * c).sqrt();
            }
        });
        eig
    }
}

impl KeypointDetector for ShiTomasiDetector {
    fn kind(&self) -> DetectorKind {
        DetectorKind::ShiTomasi
    }

    fn detect(&self, img: &GrayImage) -> Vec<Keypoint> {
        let (w, h) = (img.width() as usize, img.height() as usize);
        if w < 3 || h < 3 {
            return Vec::new();
        }
        let eig = self.min_eigenvalue_map(img);
        let max_eig = eig.iter().copied().fold(0.0f32, f32::max);
        if max_eig <= 0.0 {
            return Vec::new();
        }

        let candidates = local_maxima_3x3(&eig, w, h, 1, self.quality_level * max_eig);
        let mut corners = suppress_within_radius(&candidates, self.min_distance);
        corners.truncate(self.max_corners(w, h));
        debug!("ShiTomasi: {} candidates, {} corners", candidates.len(), corners.len());

        corners
            .into_iter()
            .map(|c| Keypoint::new(c.x as f32, c.y as f32, self.block_size as f32))
            .collect()
    }
}
