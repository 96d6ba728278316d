use image::{GrayImage, ImageBuffer, Luma};
use imageproc::integral_image::integral_image;

/// Summed-area table over an 8-bit image, backed by `imageproc`.
///
/// The table is `(w + 1) x (h + 1)` with a zero first row and column, so a
/// box sum is four lookups regardless of its size.
#[derive(Debug, Clone)]
pub struct IntegralImage {
    table: ImageBuffer<Luma<u32>, Vec<u32>>,
    w: i64,
    h: i64,
}

impl IntegralImage {
    pub fn new(img: &GrayImage) -> Self {
        let table: ImageBuffer<Luma<u32>, Vec<u32>> = integral_image::<_, u32>(img);
        Self {
            table,
            w: img.width() as i64,
            h: img.height() as i64,
        }
    }

    pub fn width(&self) -> usize {
        self.w as usize
    }

    pub fn height(&self) -> usize {
        self.h as usize
    }

    #[inline]
    fn at(&self, x: i64, y: i64) -> i64 {
        self.table.as_raw()[(y * (self.w + 1) + x) as usize] as i64
    }

    /// Sum of pixels in `[x, x + width) x [y, y + height)`, clipped to the image
    pub fn box_sum(&self, x: i64, y: i64, width: i64, height: i64) -> f32 {
        let x0 = x.clamp(0, self.w);
        let y0 = y.clamp(0, self.h);
        let x1 = (x + width).clamp(0, self.w);
        let y1 = (y + height).clamp(0, self.h);
        if x1 <= x0 || y1 <= y0 {
            return 0.0;
        }
        (self.at(x1, y1) - self.at(x0, y1) - self.at(x1, y0) + self.at(x0, y0)) as f32
    }

    /// Mean intensity of a square box centred on (cx, cy); the box is shifted
    /// inside the image when it would cross the border so it never shrinks.
    pub fn box_mean(&self, cx: f32, cy: f32, half: f32) -> f32 {
        let side = ((2.0 * half).round() as i64).max(1);
        let side_x = side.min(self.w);
        let side_y = side.min(self.h);
        let x0 = ((cx - half).round() as i64).clamp(0, self.w - side_x);
        let y0 = ((cy - half).round() as i64).clamp(0, self.h - side_y);
        self.box_sum(x0, y0, side_x, side_y) / (side_x * side_y) as f32
    }

    /// Haar wavelet response in x (right half minus left half) of a square of side `s`
    pub fn haar_x(&self, x: i64, y: i64, s: i64) -> f32 {
        let half = (s / 2).max(1);
        self.box_sum(x, y - half, half, 2 * half) - self.box_sum(x - half, y - half, half, 2 * half)
    }

    /// Haar wavelet response in y (lower half minus upper half), image rows grow downward
    pub fn haar_y(&self, x: i64, y: i64, s: i64) -> f32 {
        let half = (s / 2).max(1);
        self.box_sum(x - half, y, 2 * half, half) - self.box_sum(x - half, y - half, 2 * half, half)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(w: u32, h: u32) -> GrayImage {
        GrayImage::from_fn(w, h, |x, _| Luma([(x * 10) as u8]))
    }

    #[test]
    fn test_box_sum_matches_direct_sum() {
        let img = ramp(12, 9);
        let ii = IntegralImage::new(&img);
        let mut direct = 0u32;
        for y in 2..6 {
            for x in 3..8 {
                direct += img.get_pixel(x, y)[0] as u32;
            }
        }
        assert_eq!(ii.box_sum(3, 2, 5, 4), direct as f32);
    }

    #[test]
    fn test_box_sum_clips_outside() {
        let img = GrayImage::from_pixel(4, 4, Luma([1]));
        let ii = IntegralImage::new(&img);
        assert_eq!(ii.box_sum(-2, -2, 4, 4), 4.0);
        assert_eq!(ii.box_sum(10, 10, 3, 3), 0.0);
    }

    #[test]
    fn test_box_mean_near_border_keeps_size() {
        let img = GrayImage::from_pixel(8, 8, Luma([50]));
        let ii = IntegralImage::new(&img);
        assert!((ii.box_mean(0.0, 0.0, 2.0) - 50.0).abs() < 1e-4);
    }

    #[test]
    fn test_haar_sign_follows_gradient() {
        let img = ramp(20, 20);
        let ii = IntegralImage::new(&img);
        assert!(ii.haar_x(10, 10, 4) > 0.0);
        assert_eq!(ii.haar_y(10, 10, 4), 0.0);
    }
}
