use std::f32::consts::{PI, TAU};

/// Width of the sliding orientation window
const WINDOW: f32 = PI / 3.0;
/// Angular step between window positions
const STEP: f32 = 0.15;

/// Dominant direction of weighted gradient samples `(dx, dy)`.
///
/// A pi/3 window slides around the circle; the window whose summed response
/// vector is longest gives the orientation, in radians within [0, 2pi).
/// Returns `None` when every sample is zero.
pub fn dominant_orientation(samples: &[(f32, f32)]) -> Option<f32> {
    let angled: Vec<(f32, f32, f32)> = samples
        .iter()
        .filter(|(dx, dy)| *dx != 0.0 || *dy != 0.0)
        .map(|&(dx, dy)| (dx, dy, dy.atan2(dx).rem_euclid(TAU)))
        .collect();
    if angled.is_empty() {
        return None;
    }

    let mut best = (0.0f32, 0.0f32, 0.0f32);
    let mut start = 0.0f32;
    while start < TAU {
        let (mut sx, mut sy) = (0.0f32, 0.0f32);
        for &(dx, dy, angle) in &angled {
            if (angle - start).rem_euclid(TAU) < WINDOW {
                sx += dx;
                sy += dy;
            }
        }
        let magnitude = sx * sx + sy * sy;
        if magnitude > best.0 {
            best = (magnitude, sx, sy);
        }
        start += STEP;
    }

    Some(best.2.atan2(best.1).rem_euclid(TAU))
}

/// Gaussian weight for a sample offset measured in grid units
#[inline]
pub fn gaussian_weight(i: i32, j: i32, sigma: f32) -> f32 {
    (-((i * i + j * j) as f32) / (2.0 * sigma * sigma)).exp()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_direction() {
        let samples = vec![(0.0, 1.0); 10];
        let angle = dominant_orientation(&samples).unwrap();
        assert!((angle - PI / 2.0).abs() < 1e-5);
    }

    #[test]
    fn test_wraps_across_zero() {
        let samples = [(1.0, -0.1), (1.0, 0.1), (1.0, 0.0)];
        let angle = dominant_orientation(&samples).unwrap();
        assert!(angle < 0.01 || angle > TAU - 0.01, "angle {}", angle);
    }

    #[test]
    fn test_zero_samples() {
        assert_eq!(dominant_orientation(&[(0.0, 0.0)]), None);
    }

    #[test]
    fn test_weight_peaks_at_center() {
        assert_eq!(gaussian_weight(0, 0, 2.5), 1.0);
        assert!(gaussian_weight(3, 4, 2.5) < gaussian_weight(1, 1, 2.5));
    }
}
