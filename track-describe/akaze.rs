use std::f32::consts::SQRT_2;

use image::GrayImage;
use log::debug;
use rayon::prelude::*;
use track_core::{DescriptorKind, Descriptors, IntegralImage, Keypoint};

use crate::sampling::{count_clamped, pack_bits, rotate};
use crate::DescriptorExtractor;

/// 486 comparison bits rounded up to whole bytes
pub const DESCRIPTOR_SIZE: usize = 61;
pub const N_BITS: usize = 486;
const GRIDS: [usize; 3] = [2, 3, 4];
/// Half extent of the sampled square in units of the keypoint scale
const PATTERN_SIZE: f32 = 10.0;

/// Modified local difference binary: grid cells compared on mean intensity
/// and mean x/y derivatives at three grid resolutions
#[derive(Debug, Clone, Default)]
pub struct AkazeExtractor;

/// (intensity, dx, dy) of one grid cell in the keypoint frame
type CellStats = [f32; 3];

impl AkazeExtractor {
    fn cell_stats(
        ii: &IntegralImage,
        kp: &Keypoint,
        grid: usize,
        half_extent: f32,
        sin: f32,
        cos: f32,
    ) -> Vec<CellStats> {
        let cell = 2.0 * half_extent / grid as f32;
        let half_cell = (cell / 2.0).max(1.0);
        let side = (2.0 * half_cell).round().max(2.0) as i64;
        let half_side = side / 2;

        let mut stats = Vec::with_capacity(grid * grid);
        for row in 0..grid {
            for col in 0..grid {
                let u = -half_extent + (col as f32 + 0.5) * cell;
                let v = -half_extent + (row as f32 + 0.5) * cell;
                let (dx, dy) = rotate(u, v, sin, cos);
                let cx = (kp.x + dx).round() as i64;
                let cy = (kp.y + dy).round() as i64;
                let x0 = cx - half_side;
                let y0 = cy - half_side;
                let area = (side * side) as f32;

                let intensity = ii.box_sum(x0, y0, side, side) / area;
                let gx = (ii.box_sum(cx, y0, half_side, side) - ii.box_sum(x0, y0, half_side, side)) / area;
                let gy = (ii.box_sum(x0, cy, side, half_side) - ii.box_sum(x0, y0, side, half_side)) / area;
                // Derivatives expressed along the keypoint axes
                let lx = cos * gx + sin * gy;
                let ly = -sin * gx + cos * gy;
                stats.push([intensity, lx, ly]);
            }
        }
        stats
    }
}

impl DescriptorExtractor for AkazeExtractor {
    fn kind(&self) -> DescriptorKind {
        DescriptorKind::Akaze
    }

    fn describe(&self, img: &GrayImage, keypoints: &[Keypoint]) -> Descriptors {
        if keypoints.is_empty() {
            return Descriptors::Binary(Vec::new());
        }
        let clamped = count_clamped(img, keypoints, |kp| {
            PATTERN_SIZE * (0.5 * kp.size).round().max(1.0) * SQRT_2
        });
        debug!(
            "AKAZE: describing {} keypoints, {} sampled past the border",
            keypoints.len(),
            clamped
        );
        let ii = IntegralImage::new(img);

        let rows = keypoints
            .par_iter()
            .map(|kp| {
                let scale = (0.5 * kp.size).round().max(1.0);
                let half_extent = PATTERN_SIZE * scale;
                let (s, c) = kp.angle.unwrap_or(0.0).sin_cos();

                let mut bits = Vec::with_capacity(N_BITS);
                for grid in GRIDS {
                    let stats = Self::cell_stats(&ii, kp, grid, half_extent, s, c);
                    for i in 0..stats.len() {
                        for j in i + 1..stats.len() {
                            for k in 0..3 {
                                bits.push(stats[i][k] > stats[j][k]);
                            }
                        }
                    }
                }
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
    fn test_bit_budget() {
        let comparisons: usize = GRIDS
            .iter()
            .map(|g| {
                let cells = g * g;
                cells * (cells - 1) / 2 * 3
            })
            .sum();
        assert_eq!(comparisons, N_BITS);
        assert_eq!((N_BITS + 7) / 8, DESCRIPTOR_SIZE);
    }

    #[test]
    fn test_padding_bits_are_zero() {
        let img = GrayImage::from_fn(64, 64, |x, y| Luma([((x * 31 + y * 17) % 256) as u8]));
        let kp = Keypoint::new(32.0, 32.0, 2.4).with_angle(0.3);
        let Descriptors::Binary(rows) = AkazeExtractor.describe(&img, &[kp]) else {
            panic!("expected binary descriptors");
        };
        assert_eq!(rows[0].len(), DESCRIPTOR_SIZE);
        assert_eq!(rows[0][DESCRIPTOR_SIZE - 1] & 0b1100_0000, 0);
    }

    #[test]
    fn test_horizontal_ramp_sets_gradient_bits() {
        let img = GrayImage::from_fn(80, 80, |x, _| Luma([(x * 3) as u8]));
        let kp = Keypoint::new(40.0, 40.0, 2.0).with_angle(0.0);
        let Descriptors::Binary(rows) = AkazeExtractor.describe(&img, &[kp]) else {
            panic!("expected binary descriptors");
        };
        // First 2x2 comparison: cell 0 (top-left) against cell 1 (top-right)
        let intensity_bit = rows[0][0] & 1;
        assert_eq!(intensity_bit, 0);
    }
}
