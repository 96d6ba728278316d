use image::GrayImage;
use imageproc::filter::gaussian_blur_f32;
use track_core::Keypoint;

/// Pack bits LSB-first into bytes; a partial last byte is zero padded
pub fn pack_bits(bits: impl IntoIterator<Item = bool>, n_bytes: usize) -> Vec<u8> {
    let mut d = vec![0u8; n_bytes];
    for (i, bit) in bits.into_iter().enumerate().take(n_bytes * 8) {
        d[i / 8] |= (bit as u8) << (i % 8);
    }
    d
}

/// Keypoints whose sampling window of the given radius reaches past the image
/// border; their samples are clamped to edge pixels
pub fn count_clamped(
    img: &GrayImage,
    keypoints: &[Keypoint],
    radius: impl Fn(&Keypoint) -> f32,
) -> usize {
    let (max_x, max_y) = (img.width() as f32 - 1.0, img.height() as f32 - 1.0);
    keypoints
        .iter()
        .filter(|kp| {
            let r = radius(kp);
            kp.x - r < 0.0 || kp.y - r < 0.0 || kp.x + r > max_x || kp.y + r > max_y
        })
        .count()
}

/// Offset (u, v) in the keypoint frame rotated into image coordinates
#[inline]
pub fn rotate(u: f32, v: f32, sin: f32, cos: f32) -> (f32, f32) {
    (cos * u - sin * v, sin * u + cos * v)
}

/// Gaussian-smoothed copy used for noise-robust intensity tests
pub fn smoothed(img: &GrayImage, sigma: f32) -> GrayImage {
    gaussian_blur_f32(img, sigma)
}

/// Bilinear sample at subpixel coordinates, clamped at the border
pub fn bilinear_sample(img: &GrayImage, x: f32, y: f32) -> f32 {
    let (w, h) = (img.width() as usize, img.height() as usize);
    let raw = img.as_raw();
    let x = x.clamp(0.0, (w - 1) as f32);
    let y = y.clamp(0.0, (h - 1) as f32);
    let x0 = x.floor() as usize;
    let y0 = y.floor() as usize;
    let x1 = (x0 + 1).min(w - 1);
    let y1 = (y0 + 1).min(h - 1);
    let dx = x - x0 as f32;
    let dy = y - y0 as f32;

    let p00 = raw[y0 * w + x0] as f32;
    let p10 = raw[y0 * w + x1] as f32;
    let p01 = raw[y1 * w + x0] as f32;
    let p11 = raw[y1 * w + x1] as f32;

    let top = p00 * (1.0 - dx) + p10 * dx;
    let bottom = p01 * (1.0 - dx) + p11 * dx;
    top * (1.0 - dy) + bottom * dy
}

/// Sample point of a ring pattern in keypoint-frame units
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PatternPoint {
    pub x: f32,
    pub y: f32,
    /// Half side of the smoothing box
    pub sigma: f32,
}

/// Concentric rings of evenly spaced points; odd rings are rotated by half a step
pub fn ring_pattern(radii: &[f32], counts: &[usize], sigmas: &[f32]) -> Vec<PatternPoint> {
    let mut points = Vec::with_capacity(counts.iter().sum());
    for (ring, ((&r, &n), &sigma)) in radii.iter().zip(counts).zip(sigmas).enumerate() {
        let offset = if ring % 2 == 1 { std::f32::consts::PI / n as f32 } else { 0.0 };
        for k in 0..n {
            let theta = offset + std::f32::consts::TAU * k as f32 / n as f32;
            points.push(PatternPoint {
                x: r * theta.cos(),
                y: r * theta.sin(),
                sigma,
            });
        }
    }
    points
}

/// Orientation from intensity differences of point pairs, weighted by their offset
pub fn pair_gradient_angle(
    points: &[(f32, f32)],
    intensities: &[f32],
    pairs: &[(usize, usize)],
) -> f32 {
    let (mut gx, mut gy) = (0.0f32, 0.0f32);
    for &(i, j) in pairs {
        let (dx, dy) = (points[j].0 - points[i].0, points[j].1 - points[i].1);
        let d2 = dx * dx + dy * dy;
        if d2 <= 0.0 {
            continue;
        }
        let diff = intensities[j] - intensities[i];
        gx += diff * dx / d2;
        gy += diff * dy / d2;
    }
    if gx == 0.0 && gy == 0.0 {
        0.0
    } else {
        gy.atan2(gx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    #[test]
    fn test_pack_bits_lsb_first() {
        let bits = [true, false, false, false, false, false, false, false, false, true];
        assert_eq!(pack_bits(bits, 2), vec![0b0000_0001, 0b0000_0010]);
    }

    #[test]
    fn test_pack_bits_ignores_overflow() {
        assert_eq!(pack_bits(std::iter::repeat(true).take(20), 1), vec![0xFF]);
    }

    #[test]
    fn test_count_clamped_windows() {
        let img = GrayImage::new(100, 80);
        let kps = [
            Keypoint::new(50.0, 40.0, 10.0),
            Keypoint::new(5.0, 40.0, 10.0),
            Keypoint::new(50.0, 75.0, 10.0),
            Keypoint::new(50.0, 40.0, 90.0),
        ];
        assert_eq!(count_clamped(&img, &kps, |kp| kp.size / 2.0), 3);
        assert_eq!(count_clamped(&img, &kps[..1], |_| 39.0), 0);
        assert_eq!(count_clamped(&img, &kps[..1], |_| 40.0), 1);
        assert_eq!(count_clamped(&img, &[], |_| 1.0), 0);
    }

    #[test]
    fn test_rotate_quarter_turn() {
        let (s, c) = std::f32::consts::FRAC_PI_2.sin_cos();
        let (x, y) = rotate(1.0, 0.0, s, c);
        assert!(x.abs() < 1e-6 && (y - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_bilinear_clamps() {
        let img = GrayImage::from_fn(2, 2, |x, _| Luma([(x * 100) as u8]));
        assert_eq!(bilinear_sample(&img, 0.5, 0.0), 50.0);
        assert_eq!(bilinear_sample(&img, -4.0, 9.0), 0.0);
    }

    #[test]
    fn test_ring_pattern_counts() {
        let pattern = ring_pattern(&[0.0, 2.0], &[1, 6], &[0.5, 1.0]);
        assert_eq!(pattern.len(), 7);
        for p in &pattern[1..] {
            assert!(((p.x * p.x + p.y * p.y).sqrt() - 2.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_pair_gradient_points_to_brighter_side() {
        let points = [(-1.0, 0.0), (1.0, 0.0)];
        let angle = pair_gradient_angle(&points, &[10.0, 50.0], &[(0, 1)]);
        assert!(angle.abs() < 1e-6);
    }
}
