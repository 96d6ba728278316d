use std::f32::consts::SQRT_2;

use image::GrayImage;
use log::debug;
use rayon::prelude::*;
use track_core::{DescriptorKind, Descriptors, IntegralImage, Keypoint};

use crate::sampling::{count_clamped, rotate};
use crate::DescriptorExtractor;

pub const DESCRIPTOR_SIZE: usize = 64;
/// Ratio between keypoint size and the SURF scale s
const SIZE_TO_SCALE: f32 = 1.0 / 10.0;

/// Haar-wavelet sums over a 4x4 grid of 5x5 samples in a 20 s window
#[derive(Debug, Clone, Default)]
pub struct SurfExtractor;

impl SurfExtractor {
    fn descriptor(ii: &IntegralImage, kp: &Keypoint) -> Vec<f32> {
        let s = (kp.size * SIZE_TO_SCALE).max(1.0);
        let haar = ((2.0 * s).round() as i64).max(2);
        let (sin, cos) = kp.angle.unwrap_or(0.0).sin_cos();
        let gauss_sigma = 3.3 * s;

        let mut desc = Vec::with_capacity(DESCRIPTOR_SIZE);
        for sub_y in 0..4 {
            for sub_x in 0..4 {
                let (mut sum_dx, mut sum_dy, mut abs_dx, mut abs_dy) = (0.0f32, 0.0f32, 0.0f32, 0.0f32);
                for k in 0..5 {
                    for l in 0..5 {
                        // Sample centre in the keypoint frame, in units of s
                        let u = (-10 + sub_x * 5 + l) as f32 + 0.5;
                        let v = (-10 + sub_y * 5 + k) as f32 + 0.5;
                        let (ox, oy) = rotate(u * s, v * s, sin, cos);
                        let px = (kp.x + ox).round() as i64;
                        let py = (kp.y + oy).round() as i64;

                        let weight = (-(u * u + v * v) * s * s / (2.0 * gauss_sigma * gauss_sigma)).exp();
                        let rx = ii.haar_x(px, py, haar);
                        let ry = ii.haar_y(px, py, haar);
                        // Responses along the keypoint axes
                        let dx = weight * (cos * rx + sin * ry);
                        let dy = weight * (-sin * rx + cos * ry);
                        sum_dx += dx;
                        sum_dy += dy;
                        abs_dx += dx.abs();
                        abs_dy += dy.abs();
                    }
                }
                desc.extend_from_slice(&[sum_dx, sum_dy, abs_dx, abs_dy]);
            }
        }

        let norm = desc.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > f32::EPSILON {
            desc.iter_mut().for_each(|v| *v /= norm);
        }
        desc
    }
}

impl DescriptorExtractor for SurfExtractor {
    fn kind(&self) -> DescriptorKind {
        DescriptorKind::Surf
    }

    fn describe(&self, img: &GrayImage, keypoints: &[Keypoint]) -> Descriptors {
        if keypoints.is_empty() {
            return Descriptors::Float(Vec::new());
        }
        let clamped = count_clamped(img, keypoints, |kp| {
            10.0 * (kp.size * SIZE_TO_SCALE).max(1.0) * SQRT_2
        });
        debug!(
            "SURF: describing {} keypoints, {} sampled past the border",
            keypoints.len(),
            clamped
        );
        let ii = IntegralImage::new(img);
        let rows = keypoints
            .par_iter()
            .map(|kp| Self::descriptor(&ii, kp))
            .collect();
        Descriptors::Float(rows)
    }
}
