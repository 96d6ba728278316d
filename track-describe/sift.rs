use std::f32::consts::{SQRT_2, TAU};

use image::GrayImage;
use log::debug;
use rayon::prelude::*;
use track_core::{DescriptorKind, Descriptors, FloatImage, Keypoint};

use crate::sampling::count_clamped;
use crate::DescriptorExtractor;

const GRID: usize = 4;
const ORI_BINS: usize = 8;
pub const DESCRIPTOR_SIZE: usize = GRID * GRID * ORI_BINS;
/// Spatial bin width in units of the keypoint sigma
const BIN_SCALE: f32 = 3.0;
const MAG_CLIP: f32 = 0.2;
const INT_FACTOR: f32 = 512.0;
/// Sigma of the base level assumed when picking a sampling step
const BASE_SIGMA: f32 = 1.6;

/// 4x4 spatial x 8 orientation gradient histograms with trilinear voting
#[derive(Debug, Clone, Default)]
pub struct SiftExtractor;

impl SiftExtractor {
    fn descriptor(img: &FloatImage, kp: &Keypoint) -> Vec<f32> {
        let sigma = (kp.size * 0.5).max(0.8);
        // Coarser keypoints sample a sparser grid, as if read from their octave
        let step = (sigma / BASE_SIGMA).floor().max(1.0);
        let sigma_step = sigma / step;
        let hist_width = BIN_SCALE * sigma_step;
        let (w, h) = (img.width() as f32, img.height() as f32);
        let radius = ((hist_width * std::f32::consts::SQRT_2 * (GRID as f32 + 1.0) * 0.5).round())
            .min((w * w + h * h).sqrt() / step) as i64;

        let angle = kp.angle.unwrap_or(0.0);
        let (sin, cos) = angle.sin_cos();
        let (cos_t, sin_t) = (cos / hist_width, sin / hist_width);
        let exp_scale = -1.0 / (GRID as f32 * GRID as f32 * 0.5);
        let bins_per_rad = ORI_BINS as f32 / TAU;

        let d = GRID + 2;
        let mut hist = vec![0.0f32; d * d * (ORI_BINS + 2)];
        for i in -radius..=radius {
            for j in -radius..=radius {
                // Rotate the sample offset into the keypoint frame
                let c_rot = j as f32 * cos_t + i as f32 * sin_t;
                let r_rot = -(j as f32) * sin_t + i as f32 * cos_t;
                let rbin = r_rot + GRID as f32 / 2.0 - 0.5;
                let cbin = c_rot + GRID as f32 / 2.0 - 0.5;
                if rbin <= -1.0 || rbin >= GRID as f32 || cbin <= -1.0 || cbin >= GRID as f32 {
                    continue;
                }

                let px = (kp.x + j as f32 * step).round() as i64;
                let py = (kp.y + i as f32 * step).round() as i64;
                let s = step as i64;
                let dx = img.get_clamped(px + s, py) - img.get_clamped(px - s, py);
                let dy = img.get_clamped(px, py + s) - img.get_clamped(px, py - s);
                let mag = (dx * dx + dy * dy).sqrt();
                if mag == 0.0 {
                    continue;
                }
                let ori = (dy.atan2(dx) - angle).rem_euclid(TAU);
                let weight = ((c_rot * c_rot + r_rot * r_rot) * exp_scale).exp();
                let obin = ori * bins_per_rad;

                let (r0, c0, o0) = (rbin.floor(), cbin.floor(), obin.floor());
                let (fr, fc, fo) = (rbin - r0, cbin - c0, obin - o0);
                let (r0, c0) = (r0 as i64, c0 as i64);
                let o0 = (o0 as i64).rem_euclid(ORI_BINS as i64);
                let v = mag * weight;

                for (dr, wr) in [(0, 1.0 - fr), (1, fr)] {
                    for (dc, wc) in [(0, 1.0 - fc), (1, fc)] {
                        for (dob, wo) in [(0, 1.0 - fo), (1, fo)] {
                            let r = (r0 + 1 + dr) as usize;
                            let c = (c0 + 1 + dc) as usize;
                            let o = ((o0 + dob) % ORI_BINS as i64) as usize;
                            hist[(r * d + c) * (ORI_BINS + 2) + o] += v * wr * wc * wo;
                        }
                    }
                }
            }
        }

        let mut desc = Vec::with_capacity(DESCRIPTOR_SIZE);
        for r in 0..GRID {
            for c in 0..GRID {
                let base = ((r + 1) * d + c + 1) * (ORI_BINS + 2);
                desc.extend_from_slice(&hist[base..base + ORI_BINS]);
            }
        }
        normalize(&mut desc);
        desc
    }
}

/// Unit-normalise, clip large components, renormalise and quantise to [0, 255]
fn normalize(desc: &mut [f32]) {
    let norm = desc.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm <= f32::EPSILON {
        return;
    }
    let clip = norm * MAG_CLIP;
    desc.iter_mut().for_each(|v| *v = v.min(clip));
    let norm = desc.iter().map(|v| v * v).sum::<f32>().sqrt().max(f32::EPSILON);
    desc.iter_mut()
        .for_each(|v| *v = (*v * INT_FACTOR / norm).round().clamp(0.0, 255.0));
}

impl DescriptorExtractor for SiftExtractor {
    fn kind(&self) -> DescriptorKind {
        DescriptorKind::Sift
    }

    fn describe(&self, img: &GrayImage, keypoints: &[Keypoint]) -> Descriptors {
        if keypoints.is_empty() {
            return Descriptors::Float(Vec::new());
        }
        let clamped = count_clamped(img, keypoints, |kp| {
            BIN_SCALE * (kp.size * 0.5).max(0.8) * SQRT_2 * (GRID as f32 + 1.0) * 0.5
        });
        debug!(
            "SIFT: describing {} keypoints, {} sampled past the border",
            keypoints.len(),
            clamped
        );
        let base = FloatImage::from_gray(img).gaussian_blur(1.0);
        let rows = keypoints
            .par_iter()
            .map(|kp| Self::descriptor(&base, kp))
            .collect();
        Descriptors::Float(rows)
    }
}
