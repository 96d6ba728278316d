use std::f32::consts::TAU;

use image::GrayImage;
use log::debug;
use nalgebra::{Matrix3, Vector3};
use rayon::prelude::*;
use track_core::{DetectorKind, FloatImage, Keypoint};

use crate::KeypointDetector;

const IMG_BORDER: usize = 5;
const MAX_INTERP_STEPS: usize = 5;
const INIT_SIGMA: f32 = 0.5;
const ORI_HIST_BINS: usize = 36;
const ORI_SIG_FCTR: f32 = 1.5;
const ORI_RADIUS: f32 = 3.0 * ORI_SIG_FCTR;
const ORI_PEAK_RATIO: f32 = 0.8;

/// Difference-of-Gaussians extrema with quadratic localisation
#[derive(Debug, Clone)]
pub struct SiftDetector {
    n_octave_layers: usize,
    contrast_threshold: f32,
    edge_threshold: f32,
    sigma: f32,
}

impl Default for SiftDetector {
    fn default() -> Self {
        Self {
            n_octave_layers: 3,
            contrast_threshold: 0.04,
            edge_threshold: 10.0,
            sigma: 1.6,
        }
    }
}

/// Gaussian and DoG stacks for one octave
struct Octave {
    gaussians: Vec<FloatImage>,
    dogs: Vec<FloatImage>,
}

/// Extremum refined to subpixel accuracy in (x, y, layer)
struct Extremum {
    x: usize,
    y: usize,
    layer: usize,
    offset: Vector3<f32>,
    contrast: f32,
}

impl SiftDetector {
    /// Number of octaves so the smallest one still holds the 5 pixel border
    pub fn octave_count(&self, width: usize, height: usize) -> usize {
        let min_dim = width.min(height) as f32;
        if min_dim < (2 * IMG_BORDER + 3) as f32 {
            return 0;
        }
        ((min_dim.log2().floor() as i32) - 3).clamp(1, 8) as usize
    }

    /// Incremental blur sigmas so layer i of an octave has total blur sigma * k^i
    fn layer_sigmas(&self) -> Vec<f32> {
        let s = self.n_octave_layers;
        let k = 2f32.powf(1.0 / s as f32);
        let mut sigmas = vec![self.sigma];
        for i in 1..s + 3 {
            let prev = self.sigma * k.powi(i as i32 - 1);
            let total = prev * k;
            sigmas.push((total * total - prev * prev).sqrt());
        }
        sigmas
    }

    fn build_octaves(&self, img: &GrayImage, n_octaves: usize) -> Vec<Octave> {
        // The input is assumed to carry INIT_SIGMA of blur already
        let base_sigma = (self.sigma * self.sigma - INIT_SIGMA * INIT_SIGMA)
            .max(0.01)
            .sqrt();
        let sigmas = self.layer_sigmas();
        let mut octaves: Vec<Octave> = Vec::with_capacity(n_octaves);

        for o in 0..n_octaves {
            let first = match octaves.last() {
                None => FloatImage::from_gray(img).gaussian_blur(base_sigma),
                Some(prev) => prev.gaussians[self.n_octave_layers].downsample_half(),
            };
            let mut gaussians = vec![first];
            for sigma in sigmas.iter().skip(1) {
                let next = gaussians[gaussians.len() - 1].gaussian_blur(*sigma);
                gaussians.push(next);
            }
            let dogs = gaussians
                .windows(2)
                .map(|pair| {
                    let data = pair[1]
                        .data()
                        .iter()
                        .zip(pair[0].data())
                        .map(|(b, a)| b - a)
                        .collect();
                    FloatImage::from_vec(pair[0].width(), pair[0].height(), data)
                })
                .collect();
            debug!("SIFT octave {}: {}x{}", o, gaussians[0].width(), gaussians[0].height());
            octaves.push(Octave { gaussians, dogs });
        }
        octaves
    }

    /// 26-neighbour extremum test in DoG space
    fn is_extremum(dogs: &[FloatImage], layer: usize, x: usize, y: usize) -> bool {
        let v = dogs[layer].get(x, y);
        let is_max = v > 0.0;
        for img in &dogs[layer - 1..=layer + 1] {
            for ny in y - 1..=y + 1 {
                for nx in x - 1..=x + 1 {
                    let n = img.get(nx, ny);
                    if (is_max && n > v) || (!is_max && n < v) {
                        return false;
                    }
                }
            }
        }
        true
    }

    /// Iterative quadratic fit; rejects unstable, low-contrast and edge-like points
    fn localize(&self, dogs: &[FloatImage], x: usize, y: usize, layer: usize) -> Option<Extremum> {
        let s = self.n_octave_layers as i64;
        let (w, h) = (dogs[0].width() as i64, dogs[0].height() as i64);
        let border = IMG_BORDER as i64;
        let (mut xi, mut yi, mut li) = (x as i64, y as i64, layer as i64);

        for _ in 0..MAX_INTERP_STEPS {
            let (c, p, n) = (
                &dogs[li as usize],
                &dogs[li as usize - 1],
                &dogs[li as usize + 1],
            );
            let at = |img: &FloatImage, dx: i64, dy: i64| img.get((xi + dx) as usize, (yi + dy) as usize);

            let grad = Vector3::new(
                (at(c, 1, 0) - at(c, -1, 0)) * 0.5,
                (at(c, 0, 1) - at(c, 0, -1)) * 0.5,
                (at(n, 0, 0) - at(p, 0, 0)) * 0.5,
            );
            let v2 = at(c, 0, 0) * 2.0;
            let dxx = at(c, 1, 0) + at(c, -1, 0) - v2;
            let dyy = at(c, 0, 1) + at(c, 0, -1) - v2;
            let dss = at(n, 0, 0) + at(p, 0, 0) - v2;
            let dxy = (at(c, 1, 1) - at(c, -1, 1) - at(c, 1, -1) + at(c, -1, -1)) * 0.25;
            let dxs = (at(n, 1, 0) - at(n, -1, 0) - at(p, 1, 0) + at(p, -1, 0)) * 0.25;
            let dys = (at(n, 0, 1) - at(n, 0, -1) - at(p, 0, 1) + at(p, 0, -1)) * 0.25;
            let hessian = Matrix3::new(dxx, dxy, dxs, dxy, dyy, dys, dxs, dys, dss);

            let offset = -hessian.lu().solve(&grad)?;
            if offset.iter().all(|o| o.abs() < 0.5) {
                let contrast = at(c, 0, 0) + grad.dot(&offset) * 0.5;
                if contrast.abs() * (s as f32) < self.contrast_threshold {
                    return None;
                }
                // Principal curvature ratio check
                let trace = dxx + dyy;
                let det = dxx * dyy - dxy * dxy;
                let e = self.edge_threshold;
                if det <= 0.0 || trace * trace * e >= (e + 1.0) * (e + 1.0) * det {
                    return None;
                }
                return Some(Extremum {
                    x: xi as usize,
                    y: yi as usize,
                    layer: li as usize,
                    offset,
                    contrast,
                });
            }
            if offset.iter().any(|o| !o.is_finite() || o.abs() > 1e6) {
                return None;
            }

            xi += offset[0].round() as i64;
            yi += offset[1].round() as i64;
            li += offset[2].round() as i64;
            if li < 1 || li > s || xi < border || xi >= w - border || yi < border || yi >= h - border {
                return None;
            }
        }
        None
    }

    /// Peaks of a smoothed 36-bin gradient orientation histogram, in radians
    fn orientations(img: &FloatImage, x: usize, y: usize, scale: f32) -> Vec<f32> {
        let radius = (ORI_RADIUS * scale).round() as i64;
        let sigma = ORI_SIG_FCTR * scale;
        let denom = 2.0 * sigma * sigma;
        let (w, h) = (img.width() as i64, img.height() as i64);
        let n = ORI_HIST_BINS;

        let mut hist = vec![0.0f32; n];
        for i in -radius..=radius {
            let py = y as i64 + i;
            if py <= 0 || py >= h - 1 {
                continue;
            }
            for j in -radius..=radius {
                let px = x as i64 + j;
                if px <= 0 || px >= w - 1 {
                    continue;
                }
                let (pxu, pyu) = (px as usize, py as usize);
                let dx = img.get(pxu + 1, pyu) - img.get(pxu - 1, pyu);
                let dy = img.get(pxu, pyu + 1) - img.get(pxu, pyu - 1);
                let weight = (-((i * i + j * j) as f32) / denom).exp();
                let angle = dy.atan2(dx).rem_euclid(TAU);
                let bin = ((angle / TAU * n as f32).round() as usize) % n;
                hist[bin] += weight * (dx * dx + dy * dy).sqrt();
            }
        }

        let smoothed: Vec<f32> = (0..n)
            .map(|i| {
                let at = |k: isize| hist[(i as isize + k).rem_euclid(n as isize) as usize];
                (at(-2) + at(2)) / 16.0 + (at(-1) + at(1)) * 4.0 / 16.0 + at(0) * 6.0 / 16.0
            })
            .collect();

        let max = smoothed.iter().copied().fold(0.0f32, f32::max);
        if max <= 0.0 {
            return vec![0.0];
        }
        let threshold = max * ORI_PEAK_RATIO;
        (0..n)
            .filter_map(|j| {
                let left = smoothed[(j + n - 1) % n];
                let right = smoothed[(j + 1) % n];
                let c = smoothed[j];
                if c > left && c > right && c >= threshold {
                    let shift = 0.5 * (left - right) / (left - 2.0 * c + right);
                    let bin = (j as f32 + shift).rem_euclid(n as f32);
                    Some((bin / n as f32 * TAU).rem_euclid(TAU))
                } else {
                    None
                }
            })
            .collect()
    }
}

impl KeypointDetector for SiftDetector {
    fn kind(&self) -> DetectorKind {
        DetectorKind::Sift
    }

    fn detect(&self, img: &GrayImage) -> Vec<Keypoint> {
        let n_octaves = self.octave_count(img.width() as usize, img.height() as usize);
        if n_octaves == 0 {
            return Vec::new();
        }
        let octaves = self.build_octaves(img, n_octaves);
        let s = self.n_octave_layers;
        let prefilter = 0.5 * self.contrast_threshold / s as f32;

        let mut keypoints = Vec::new();
        for (o, octave) in octaves.iter().enumerate() {
            let (w, h) = (octave.dogs[0].width(), octave.dogs[0].height());
            if w <= 2 * IMG_BORDER || h <= 2 * IMG_BORDER {
                break;
            }
            let octave_scale = 2f32.powi(o as i32);
            for layer in 1..=s {
                let found: Vec<Keypoint> = (IMG_BORDER..h - IMG_BORDER)
                    .into_par_iter()
                    .flat_map_iter(|y| {
                        let dogs = &octave.dogs;
                        (IMG_BORDER..w - IMG_BORDER)
                            .filter(move |&x| {
                                dogs[layer].get(x, y).abs() > prefilter
                                    && Self::is_extremum(dogs, layer, x, y)
                            })
                            .filter_map(move |x| self.localize(dogs, x, y, layer))
                            .flat_map(move |e| {
                                let scale_octv = self.sigma
                                    * 2f32.powf((e.layer as f32 + e.offset[2]) / s as f32);
                                let kx = (e.x as f32 + e.offset[0]) * octave_scale;
                                let ky = (e.y as f32 + e.offset[1]) * octave_scale;
                                let size = scale_octv * octave_scale * 2.0;
                                let response = e.contrast.abs();
                                Self::orientations(&octave.gaussians[e.layer], e.x, e.y, scale_octv)
                                    .into_iter()
                                    .map(move |angle| {
                                        Keypoint::new(kx, ky, size)
                                            .with_angle(angle)
                                            .with_response(response)
                                            .with_octave(o)
                                    })
                            })
                    })
                    .collect();
                keypoints.extend(found);
            }
        }
        debug!("SIFT: {} keypoints over {} octaves", keypoints.len(), n_octaves);
        keypoints
    }
}
