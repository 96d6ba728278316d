use image::GrayImage;
use log::debug;
use rayon::prelude::*;
use track_core::{DetectorKind, IntegralImage, Keypoint};

use crate::orientation::{dominant_orientation, gaussian_weight};
use crate::KeypointDetector;

/// Fast-Hessian blob detector on box-filter approximations
#[derive(Debug, Clone)]
pub struct SurfDetector {
    hessian_threshold: f32,
    n_octaves: usize,
    n_octave_layers: usize,
}

impl Default for SurfDetector {
    fn default() -> Self {
        Self {
            hessian_threshold: 100.0,
            n_octaves: 4,
            n_octave_layers: 3,
        }
    }
}

/// Determinant-of-Hessian responses for one filter size on a sampling grid
struct ResponseLayer {
    filter_size: i64,
    cols: usize,
    rows: usize,
    det: Vec<f32>,
}

impl ResponseLayer {
    fn compute(ii: &IntegralImage, filter_size: i64, step: i64) -> Self {
        let cols = ii.width() / step as usize;
        let rows = ii.height() / step as usize;
        let lobe = filter_size / 3;
        let border = (filter_size - 1) / 2;
        let inv_area = 1.0 / (filter_size * filter_size) as f32;

        let mut det = vec![0.0f32; cols * rows];
        det.par_chunks_mut(cols.max(1)).enumerate().for_each(|(r, row)| {
            let y = r as i64 * step;
            for (c, out) in row.iter_mut().enumerate() {
                let x = c as i64 * step;
                let dxx = ii.box_sum(x - border, y - lobe + 1, filter_size, 2 * lobe - 1)
                    - 3.0 * ii.box_sum(x - lobe / 2, y - lobe + 1, lobe, 2 * lobe - 1);
                let dyy = ii.box_sum(x - lobe + 1, y - border, 2 * lobe - 1, filter_size)
                    - 3.0 * ii.box_sum(x - lobe + 1, y - lobe / 2, 2 * lobe - 1, lobe);
                let dxy = ii.box_sum(x + 1, y - lobe, lobe, lobe)
                    + ii.box_sum(x - lobe, y + 1, lobe, lobe)
                    - ii.box_sum(x - lobe, y - lobe, lobe, lobe)
                    - ii.box_sum(x + 1, y + 1, lobe, lobe);
                let (dxx, dyy, dxy) = (dxx * inv_area, dyy * inv_area, dxy * inv_area);
                *out = dxx * dyy - 0.81 * dxy * dxy;
            }
        });

        Self {
            filter_size,
            cols,
            rows,
            det,
        }
    }

    #[inline]
    fn at(&self, c: usize, r: usize) -> f32 {
        self.det[r * self.cols + c]
    }
}

impl SurfDetector {
    /// Filter side lengths for an octave: (9 + 6 i) << octave
    pub fn filter_sizes(&self, octave: usize) -> Vec<i64> {
        (0..self.n_octave_layers + 2)
            .map(|i| (9 + 6 * i as i64) << octave)
            .collect()
    }

    /// Haar-wavelet orientation in a radius of 6 s around the point
    fn orientation(ii: &IntegralImage, x: f32, y: f32, s: f32) -> f32 {
        let haar = ((4.0 * s).round() as i64).max(2);
        let mut samples = Vec::with_capacity(113);
        for j in -6i32..=6 {
            for i in -6i32..=6 {
                if i * i + j * j >= 36 {
                    continue;
                }
                let px = (x + i as f32 * s).round() as i64;
                let py = (y + j as f32 * s).round() as i64;
                let g = gaussian_weight(i, j, 2.5);
                samples.push((g * ii.haar_x(px, py, haar), g * ii.haar_y(px, py, haar)));
            }
        }
        dominant_orientation(&samples).unwrap_or(0.0)
    }
}

impl KeypointDetector for SurfDetector {
    fn kind(&self) -> DetectorKind {
        DetectorKind::Surf
    }

    fn detect(&self, img: &GrayImage) -> Vec<Keypoint> {
        let ii = &IntegralImage::new(img);
        let mut keypoints = Vec::new();

        for octave in 0..self.n_octaves {
            let step = 1i64 << octave;
            let sizes = self.filter_sizes(octave);
            if sizes[sizes.len() - 1] as usize > img.width().min(img.height()) as usize {
                break;
            }
            let layers: Vec<ResponseLayer> = sizes
                .iter()
                .map(|&size| ResponseLayer::compute(ii, size, step))
                .collect();

            for l in 1..layers.len() - 1 {
                let (below, mid, above) = (&layers[l - 1], &layers[l], &layers[l + 1]);
                let margin = ((above.filter_size / 2) / step + 1) as usize;
                if mid.rows <= 2 * margin || mid.cols <= 2 * margin {
                    continue;
                }
                let found: Vec<Keypoint> = (margin..mid.rows - margin)
                    .into_par_iter()
                    .flat_map_iter(|r| {
                        (margin..mid.cols - margin).filter_map(move |c| {
                            let v = mid.at(c, r);
                            if v <= self.hessian_threshold {
                                return None;
                            }
                            for layer in [below, mid, above] {
                                for nr in r - 1..=r + 1 {
                                    for nc in c - 1..=c + 1 {
                                        let is_center = std::ptr::eq(layer, mid) && nr == r && nc == c;
                                        if !is_center && layer.at(nc, nr) >= v {
                                            return None;
                                        }
                                    }
                                }
                            }
                            let x = (c as i64 * step) as f32;
                            let y = (r as i64 * step) as f32;
                            // 1.2 / 9 of the filter size is the blob scale s; size is 10 s
                            let size = mid.filter_size as f32 * 1.2 / 9.0 * 10.0;
                            let angle = Self::orientation(ii, x, y, size / 10.0);
                            Some(
                                Keypoint::new(x, y, size)
                                    .with_response(v)
                                    .with_angle(angle)
                                    .with_octave(octave),
                            )
                        })
                    })
                    .collect();
                keypoints.extend(found);
            }
        }
        debug!("SURF: {} keypoints", keypoints.len());
        keypoints
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn disc_image(radius: f32) -> GrayImage {
        GrayImage::from_fn(128, 128, |x, y| {
            let d = ((x as f32 - 64.0).powi(2) + (y as f32 - 64.0).powi(2)).sqrt();
            if d <= radius {
                Luma([230])
            } else {
                Luma([30])
            }
        })
    }

    #[test]
    fn test_filter_sizes() {
        let detector = SurfDetector::default();
        assert_eq!(detector.filter_sizes(0), vec![9, 15, 21, 27, 33]);
        assert_eq!(detector.filter_sizes(1), vec![18, 30, 42, 54, 66]);
    }

    #[test]
    fn test_disc_detected_at_center() {
        let kps = SurfDetector::default().detect(&disc_image(6.0));
        assert!(!kps.is_empty());
        let best = kps
            .iter()
            .max_by(|a, b| a.response.unwrap_or(0.0).total_cmp(&b.response.unwrap_or(0.0)))
            .unwrap();
        assert!((best.x - 64.0).abs() <= 2.0 && (best.y - 64.0).abs() <= 2.0);
    }

    #[test]
    fn test_flat_image() {
        let img = GrayImage::from_pixel(64, 64, Luma([140]));
        assert!(SurfDetector::default().detect(&img).is_empty());
    }

    #[test]
    fn test_keypoints_inside_image() {
        for kp in SurfDetector::default().detect(&disc_image(10.0)) {
            assert!(kp.x >= 0.0 && kp.x < 128.0 && kp.y >= 0.0 && kp.y < 128.0);
            assert!(kp.angle.is_some());
        }
    }
}
