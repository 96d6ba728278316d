use image::GrayImage;
use log::{debug, warn};
use nalgebra::{Matrix2, Vector2};
use rayon::prelude::*;
use track_core::{DetectorKind, FloatImage, Keypoint};

use crate::orientation::{dominant_orientation, gaussian_weight};
use crate::KeypointDetector;

/// Fallback contrast factor when the gradient histogram is empty
const DEFAULT_CONTRAST: f32 = 0.03;
/// Explicit diffusion is stable for steps up to 1/4 on a 4-neighbour stencil
const MAX_TAU: f32 = 0.25;

/// Hessian-determinant extrema in a nonlinear diffusion scale space
#[derive(Debug, Clone)]
pub struct AkazeDetector {
    n_octaves: usize,
    n_sublevels: usize,
    threshold: f32,
    base_sigma: f32,
    contrast_percentile: f32,
    contrast_bins: usize,
    derivative_factor: f32,
}

impl Default for AkazeDetector {
    fn default() -> Self {
        Self {
            n_octaves: 4,
            n_sublevels: 4,
            threshold: 0.001,
            base_sigma: 1.6,
            contrast_percentile: 0.7,
            contrast_bins: 300,
            derivative_factor: 1.5,
        }
    }
}

/// One level of the nonlinear scale space
struct Evolution {
    image: FloatImage,
    octave: usize,
    /// Scale in base image pixels
    sigma: f32,
    /// Diffusion time sigma^2 / 2
    time: f32,
    /// Derivative step in this octave's pixels
    step: usize,
    det: FloatImage,
}

impl Evolution {
    fn ratio(&self) -> f32 {
        2f32.powi(self.octave as i32)
    }
}

impl AkazeDetector {
    /// Gradient magnitude at the given percentile of non-zero gradients
    pub fn contrast_factor(&self, img: &FloatImage) -> f32 {
        let (gx, gy) = img.gaussian_blur(1.0).gradients();
        let (w, h) = (img.width(), img.height());
        let mags: Vec<f32> = (1..h.saturating_sub(1))
            .flat_map(|y| (1..w.saturating_sub(1)).map(move |x| (x, y)))
            .map(|(x, y)| (gx.get(x, y).powi(2) + gy.get(x, y).powi(2)).sqrt())
            .collect();
        let hmax = mags.iter().copied().fold(0.0f32, f32::max);
        if hmax <= 0.0 {
            return DEFAULT_CONTRAST;
        }

        let bins = self.contrast_bins;
        let mut hist = vec![0usize; bins];
        let mut npoints = 0usize;
        for m in mags.iter().filter(|&&m| m > 0.0) {
            let bin = ((m / hmax * bins as f32).floor() as usize).min(bins - 1);
            hist[bin] += 1;
            npoints += 1;
        }
        let target = (npoints as f32 * self.contrast_percentile) as usize;
        let mut cumulative = 0usize;
        let mut k = bins;
        for (i, count) in hist.iter().enumerate() {
            cumulative += count;
            if cumulative >= target {
                k = i;
                break;
            }
        }
        let factor = hmax * k as f32 / bins as f32;
        if factor > 0.0 {
            factor
        } else {
            DEFAULT_CONTRAST
        }
    }

    /// (octave, sublevel, sigma) for every level whose octave image stays usable
    fn level_schedule(&self, width: usize, height: usize) -> Vec<(usize, f32)> {
        let mut schedule = Vec::new();
        for o in 0..self.n_octaves {
            if width.min(height) >> o < 16 {
                break;
            }
            for s in 0..self.n_sublevels {
                let sigma =
                    self.base_sigma * 2f32.powf(s as f32 / self.n_sublevels as f32 + o as f32);
                schedule.push((o, sigma));
            }
        }
        schedule
    }

    fn build_evolutions(&self, img: &GrayImage) -> Vec<Evolution> {
        let (w, h) = (img.width() as usize, img.height() as usize);
        let schedule = self.level_schedule(w, h);
        if schedule.is_empty() {
            return Vec::new();
        }
        let base = FloatImage::from_gray(img).gaussian_blur(self.base_sigma);
        let mut contrast = self.contrast_factor(&base);
        debug!("AKAZE: contrast factor {:.5}", contrast);

        let mut evolutions: Vec<Evolution> = Vec::with_capacity(schedule.len());
        for (octave, sigma) in schedule {
            let time = 0.5 * sigma * sigma;
            let image = match evolutions.last() {
                None => base.clone(),
                Some(prev) => {
                    let mut current = if octave > prev.octave {
                        contrast *= 0.75;
                        prev.image.downsample_half()
                    } else {
                        prev.image.clone()
                    };
                    let dt = (time - prev.time) / 4f32.powi(octave as i32);
                    let steps = (dt / MAX_TAU).ceil().max(1.0) as usize;
                    let tau = dt / steps as f32;
                    let conductance = conductance_g2(&current, contrast);
                    for _ in 0..steps {
                        current = diffusion_step(&current, &conductance, tau);
                    }
                    current
                }
            };
            let ratio = 2f32.powi(octave as i32);
            let step = ((sigma * self.derivative_factor / ratio).round() as usize).max(1);
            let det = hessian_determinant(&image, step);
            evolutions.push(Evolution {
                image,
                octave,
                sigma,
                time,
                step,
                det,
            });
        }
        evolutions
    }

    /// Candidate extrema of one level, in base image coordinates
    fn level_extrema(&self, evolutions: &[Evolution], i: usize) -> Vec<Keypoint> {
        let ev = &evolutions[i];
        let (w, h) = (ev.det.width(), ev.det.height());
        let border = 2 * ev.step + 1;
        if w <= 2 * border || h <= 2 * border {
            return Vec::new();
        }
        let ratio = ev.ratio();
        let neighbours: Vec<&Evolution> = [i.checked_sub(1), Some(i + 1)]
            .into_iter()
            .flatten()
            .filter_map(|j| evolutions.get(j))
            .collect();

        (border..h - border)
            .into_par_iter()
            .flat_map_iter(|y| {
                let neighbours = &neighbours;
                (border..w - border).filter_map(move |x| {
                    let v = ev.det.get(x, y);
                    if v <= self.threshold {
                        return None;
                    }
                    for ny in y - 1..=y + 1 {
                        for nx in x - 1..=x + 1 {
                            if (nx, ny) != (x, y) && ev.det.get(nx, ny) >= v {
                                return None;
                            }
                        }
                    }
                    // Across levels the point must beat the mapped 3x3 neighbourhood
                    let (bx, by) = (x as f32 * ratio, y as f32 * ratio);
                    for other in neighbours.iter() {
                        let r = other.ratio();
                        let (ox, oy) = ((bx / r).round() as i64, (by / r).round() as i64);
                        for dy in -1..=1 {
                            for dx in -1..=1 {
                                if other.det.get_clamped(ox + dx, oy + dy) > v {
                                    return None;
                                }
                            }
                        }
                    }

                    let (sx, sy) = subpixel_offset(&ev.det, x, y);
                    let size = ev.sigma * self.derivative_factor;
                    let angle = self.orientation(ev, x as f32 + sx, y as f32 + sy, size);
                    Some(
                        Keypoint::new((x as f32 + sx) * ratio, (y as f32 + sy) * ratio, size)
                            .with_response(v)
                            .with_angle(angle)
                            .with_octave(ev.octave),
                    )
                })
            })
            .collect()
    }

    /// Sliding-window orientation over scaled first derivatives, radius 6 scale
    fn orientation(&self, ev: &Evolution, x: f32, y: f32, size: f32) -> f32 {
        let scale = ((0.5 * size / ev.ratio()).round()).max(1.0);
        let sigma_local = ev.sigma / ev.ratio();
        let mut samples = Vec::with_capacity(113);
        for j in -6i32..=6 {
            for i in -6i32..=6 {
                if i * i + j * j >= 36 {
                    continue;
                }
                let px = (x + i as f32 * scale).round() as i64;
                let py = (y + j as f32 * scale).round() as i64;
                let lx = (ev.image.get_clamped(px + 1, py) - ev.image.get_clamped(px - 1, py)) * 0.5;
                let ly = (ev.image.get_clamped(px, py + 1) - ev.image.get_clamped(px, py - 1)) * 0.5;
                let g = gaussian_weight(i, j, 2.5) * sigma_local;
                samples.push((g * lx, g * ly));
            }
        }
        dominant_orientation(&samples).unwrap_or(0.0)
    }
}

/// Perona-Malik g2 conductance 1 / (1 + |grad L|^2 / k^2) on the smoothed image
fn conductance_g2(img: &FloatImage, k: f32) -> FloatImage {
    let (gx, gy) = img.gaussian_blur(1.0).gradients();
    let inv_k2 = 1.0 / (k * k);
    let data = gx
        .data()
        .iter()
        .zip(gy.data())
        .map(|(dx, dy)| 1.0 / (1.0 + (dx * dx + dy * dy) * inv_k2))
        .collect();
    FloatImage::from_vec(img.width(), img.height(), data)
}

/// One explicit step of L_t = div(c grad L) with reflecting borders
fn diffusion_step(img: &FloatImage, c: &FloatImage, tau: f32) -> FloatImage {
    let (w, h) = (img.width(), img.height());
    let mut out = vec![0.0f32; w * h];
    out.par_chunks_mut(w).enumerate().for_each(|(y, row)| {
        let yi = y as i64;
        for (x, v) in row.iter_mut().enumerate() {
            let xi = x as i64;
            let l = img.get(x, y);
            let cp = c.get(x, y);
            let mut flux = 0.0f32;
            for (dx, dy) in [(1i64, 0i64), (-1, 0), (0, 1), (0, -1)] {
                let ln = img.get_clamped(xi + dx, yi + dy);
                let cn = c.get_clamped(xi + dx, yi + dy);
                flux += 0.5 * (cp + cn) * (ln - l);
            }
            *v = l + tau * flux;
        }
    });
    FloatImage::from_vec(w, h, out)
}

/// Scale-normalised determinant of the Hessian with derivative step `step`
fn hessian_determinant(img: &FloatImage, step: usize) -> FloatImage {
    let (w, h) = (img.width(), img.height());
    let s = step as i64;
    let mut out = vec![0.0f32; w * h];
    out.par_chunks_mut(w).enumerate().for_each(|(y, row)| {
        let yi = y as i64;
        for (x, v) in row.iter_mut().enumerate() {
            let xi = x as i64;
            let at = |dx: i64, dy: i64| img.get_clamped(xi + dx, yi + dy);
            // Differences over the step already carry the sigma^2 normalisation
            let dxx = at(s, 0) - 2.0 * at(0, 0) + at(-s, 0);
            let dyy = at(0, s) - 2.0 * at(0, 0) + at(0, -s);
            let dxy = (at(s, s) - at(-s, s) - at(s, -s) + at(-s, -s)) * 0.25;
            *v = dxx * dyy - dxy * dxy;
        }
    });
    FloatImage::from_vec(w, h, out)
}

/// Quadratic fit of the response around (x, y); offsets beyond one pixel are dropped
fn subpixel_offset(det: &FloatImage, x: usize, y: usize) -> (f32, f32) {
    let at = |dx: i64, dy: i64| det.get_clamped(x as i64 + dx, y as i64 + dy);
    let dx = (at(1, 0) - at(-1, 0)) * 0.5;
    let dy = (at(0, 1) - at(0, -1)) * 0.5;
    let dxx = at(1, 0) + at(-1, 0) - 2.0 * at(0, 0);
    let dyy = at(0, 1) + at(0, -1) - 2.0 * at(0, 0);
    let dxy = (at(1, 1) - at(-1, 1) - at(1, -1) + at(-1, -1)) * 0.25;

    match Matrix2::new(dxx, dxy, dxy, dyy).try_inverse() {
        Some(inv) => {
            let offset = -(inv * Vector2::new(dx, dy));
            if offset[0].abs() <= 1.0 && offset[1].abs() <= 1.0 {
                (offset[0], offset[1])
            } else {
                (0.0, 0.0)
            }
        }
        None => (0.0, 0.0),
    }
}

impl KeypointDetector for AkazeDetector {
    fn kind(&self) -> DetectorKind {
        DetectorKind::Akaze
    }

    fn detect(&self, img: &GrayImage) -> Vec<Keypoint> {
        let evolutions = self.build_evolutions(img);
        if evolutions.is_empty() {
            warn!(
                "AKAZE: image {}x{} too small for a scale space",
                img.width(),
                img.height()
            );
            return Vec::new();
        }
        let keypoints: Vec<Keypoint> = (0..evolutions.len())
            .flat_map(|i| self.level_extrema(&evolutions, i))
            .collect();
        debug!("AKAZE: {} levels, {} keypoints", evolutions.len(), keypoints.len());
        keypoints
    }
}
