use image::GrayImage;
use rayon::prelude::*;

/// Row-major single-channel f32 image used for scale-space work
#[derive(Debug, Clone, PartialEq)]
pub struct FloatImage {
    w: usize,
    h: usize,
    data: Vec<f32>,
}

impl FloatImage {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            w: width,
            h: height,
            data: vec![0.0; width * height],
        }
    }

    pub fn from_vec(width: usize, height: usize, data: Vec<f32>) -> Self {
        assert_eq!(data.len(), width * height);
        Self { w: width, h: height, data }
    }

    /// Intensities scaled to [0, 1]
    pub fn from_gray(img: &GrayImage) -> Self {
        let (w, h) = img.dimensions();
        let data = img.as_raw().iter().map(|&p| p as f32 / 255.0).collect();
        Self {
            w: w as usize,
            h: h as usize,
            data,
        }
    }

    pub fn width(&self) -> usize {
        self.w
    }

    pub fn height(&self) -> usize {
        self.h
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> f32 {
        self.data[y * self.w + x]
    }

    #[inline]
    pub fn set(&mut self, x: usize, y: usize, v: f32) {
        self.data[y * self.w + x] = v;
    }

    /// Replicates edge pixels outside the image
    #[inline]
    pub fn get_clamped(&self, x: i64, y: i64) -> f32 {
        let xx = x.clamp(0, self.w as i64 - 1) as usize;
        let yy = y.clamp(0, self.h as i64 - 1) as usize;
        self.data[yy * self.w + xx]
    }

    /// Bilinear interpolation for subpixel sampling, clamped at the border
    pub fn sample_bilinear(&self, x: f32, y: f32) -> f32 {
        let x = x.clamp(0.0, (self.w - 1) as f32);
        let y = y.clamp(0.0, (self.h - 1) as f32);
        let x0 = x.floor() as usize;
        let y0 = y.floor() as usize;
        let x1 = (x0 + 1).min(self.w - 1);
        let y1 = (y0 + 1).min(self.h - 1);
        let dx = x - x0 as f32;
        let dy = y - y0 as f32;

        let top = self.get(x0, y0) * (1.0 - dx) + self.get(x1, y0) * dx;
        let bottom = self.get(x0, y1) * (1.0 - dx) + self.get(x1, y1) * dx;
        top * (1.0 - dy) + bottom * dy
    }

    /// Separable Gaussian blur with replicated borders
    pub fn gaussian_blur(&self, sigma: f32) -> Self {
        if sigma <= 0.0 || self.data.is_empty() {
            return self.clone();
        }
        let kernel = gaussian_kernel(sigma);
        let half = (kernel.len() / 2) as i64;
        let (w, h) = (self.w, self.h);

        let mut rows = vec![0.0f32; w * h];
        rows.par_chunks_mut(w).enumerate().for_each(|(y, row)| {
            for (x, out) in row.iter_mut().enumerate() {
                let mut acc = 0.0;
                for (ki, &kv) in kernel.iter().enumerate() {
                    acc += kv * self.get_clamped(x as i64 + ki as i64 - half, y as i64);
                }
                *out = acc;
            }
        });
        let rows = FloatImage::from_vec(w, h, rows);

        let mut out = vec![0.0f32; w * h];
        out.par_chunks_mut(w).enumerate().for_each(|(y, row)| {
            for (x, v) in row.iter_mut().enumerate() {
                let mut acc = 0.0;
                for (ki, &kv) in kernel.iter().enumerate() {
                    acc += kv * rows.get_clamped(x as i64, y as i64 + ki as i64 - half);
                }
                *v = acc;
            }
        });
        FloatImage::from_vec(w, h, out)
    }

    /// Keep every second pixel in both directions
    pub fn downsample_half(&self) -> Self {
        let w = (self.w / 2).max(1);
        let h = (self.h / 2).max(1);
        let mut out = FloatImage::new(w, h);
        for y in 0..h {
            for x in 0..w {
                out.set(x, y, self.get((2 * x).min(self.w - 1), (2 * y).min(self.h - 1)));
            }
        }
        out
    }

    /// Central-difference derivatives (Lx, Ly)
    pub fn gradients(&self) -> (FloatImage, FloatImage) {
        let mut gx = FloatImage::new(self.w, self.h);
        let mut gy = FloatImage::new(self.w, self.h);
        for y in 0..self.h as i64 {
            for x in 0..self.w as i64 {
                let dx = (self.get_clamped(x + 1, y) - self.get_clamped(x - 1, y)) * 0.5;
                let dy = (self.get_clamped(x, y + 1) - self.get_clamped(x, y - 1)) * 0.5;
                gx.set(x as usize, y as usize, dx);
                gy.set(x as usize, y as usize, dy);
            }
        }
        (gx, gy)
    }

    pub fn max_value(&self) -> f32 {
        self.data.iter().copied().fold(f32::MIN, f32::max)
    }
}

/// Normalized 1D Gaussian kernel of radius ceil(3 sigma)
pub fn gaussian_kernel(sigma: f32) -> Vec<f32> {
    let radius = (3.0 * sigma).ceil().max(1.0) as i32;
    let denom = 2.0 * sigma * sigma;
    let mut kernel: Vec<f32> = (-radius..=radius)
        .map(|i| (-((i * i) as f32) / denom).exp())
        .collect();
    let sum: f32 = kernel.iter().sum();
    kernel.iter_mut().for_each(|k| *k /= sum);
    kernel
}

/// Orientation (radians) by intensity centroid over a circular patch
pub fn intensity_centroid_angle(img: &GrayImage, x: f32, y: f32, radius: i32) -> f32 {
    let (w, h) = (img.width() as i32, img.height() as i32);
    let raw = img.as_raw();
    let (cx, cy) = (x.round() as i32, y.round() as i32);
    let r2 = radius * radius;

    let mut m10 = 0i64; // i64 keeps large patches from overflowing
    let mut m01 = 0i64;
    for dy in -radius..=radius {
        let yy = (cy + dy).clamp(0, h - 1) as usize;
        for dx in -radius..=radius {
            if dx * dx + dy * dy > r2 {
                continue;
            }
            let xx = (cx + dx).clamp(0, w - 1) as usize;
            let val = raw[yy * w as usize + xx] as i64;
            m10 += dx as i64 * val;
            m01 += dy as i64 * val;
        }
    }

    if m10 == 0 && m01 == 0 {
        0.0
    } else {
        (m01 as f32).atan2(m10 as f32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kernel_is_normalized() {
        for sigma in [0.5f32, 1.0, 1.6, 3.2] {
            let k = gaussian_kernel(sigma);
            assert_eq!(k.len() % 2, 1);
            let sum: f32 = k.iter().sum();
            assert!((sum - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_blur_preserves_constant_image() {
        let img = FloatImage::from_vec(9, 7, vec![0.5; 63]);
        let blurred = img.gaussian_blur(1.6);
        for v in blurred.data() {
            assert!((v - 0.5).abs() < 1e-5);
        }
    }

    #[test]
    fn test_bilinear_midpoint() {
        let img = FloatImage::from_vec(2, 1, vec![0.0, 1.0]);
        assert!((img.sample_bilinear(0.5, 0.0) - 0.5).abs() < 1e-6);
        // Out of range samples clamp to the edge
        assert_eq!(img.sample_bilinear(-3.0, 0.0), 0.0);
        assert_eq!(img.sample_bilinear(5.0, 2.0), 1.0);
    }

    #[test]
    fn test_downsample_dimensions() {
        let img = FloatImage::new(11, 8);
        let half = img.downsample_half();
        assert_eq!((half.width(), half.height()), (5, 4));
    }

    #[test]
    fn test_gradient_of_ramp() {
        let data = (0..25).map(|i| (i % 5) as f32).collect();
        let img = FloatImage::from_vec(5, 5, data);
        let (gx, gy) = img.gradients();
        assert!((gx.get(2, 2) - 1.0).abs() < 1e-6);
        assert!(gy.get(2, 2).abs() < 1e-6);
    }

    #[test]
    fn test_centroid_points_to_bright_side() {
        let mut img = GrayImage::new(31, 31);
        for y in 0..31 {
            for x in 16..31 {
                img.put_pixel(x, y, image::Luma([255]));
            }
        }
        let angle = intensity_centroid_angle(&img, 15.0, 15.0, 7);
        assert!(angle.abs() < 1e-3, "angle {}", angle);
    }
}
