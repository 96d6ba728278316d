use image::imageops::{self, FilterType};
use image::GrayImage;

use crate::types::ScaleLevel;

/// Image pyramid operations for multi-scale feature detection
pub struct ImagePyramid;

impl ImagePyramid {
    /// Geometric scale levels `scale_factor^i`, stopping at `max_levels` or
    /// when a level would be smaller than `min_size` on either side.
    pub fn generate_scale_levels(
        width: usize,
        height: usize,
        scale_factor: f32,
        max_levels: usize,
        min_size: usize,
    ) -> Vec<ScaleLevel> {
        let scales = (0..max_levels).map(|i| scale_factor.powi(i as i32));
        Self::levels_for_scales(width, height, scales, min_size)
    }

    /// One level per requested scale, in the given order, truncated at the
    /// first scale whose image would be smaller than `min_size`.
    pub fn levels_for_scales(
        width: usize,
        height: usize,
        scales: impl IntoIterator<Item = f32>,
        min_size: usize,
    ) -> Vec<ScaleLevel> {
        let mut levels = Vec::new();
        for (level, scale) in scales.into_iter().enumerate() {
            let scaled_width = ((width as f32) / scale).round() as usize;
            let scaled_height = ((height as f32) / scale).round() as usize;

            if scaled_width < min_size || scaled_height < min_size {
                break;
            }

            levels.push(ScaleLevel {
                level,
                scale,
                width: scaled_width,
                height: scaled_height,
            });
        }
        levels
    }

    /// Resample the base image for every level; level scale 1.0 is a plain copy
    pub fn build(img: &GrayImage, levels: &[ScaleLevel]) -> Vec<GrayImage> {
        levels
            .iter()
            .map(|level| {
                if level.width == img.width() as usize && level.height == img.height() as usize {
                    img.clone()
                } else {
                    imageops::resize(
                        img,
                        level.width as u32,
                        level.height as u32,
                        FilterType::Triangle,
                    )
                }
            })
            .collect()
    }
}
