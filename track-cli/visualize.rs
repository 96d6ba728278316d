use std::path::{Path, PathBuf};

use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_circle_mut, draw_line_segment_mut};
use log::info;
use track_core::{Frame, GrayImage, TrackError, TrackResult};

/// Consumer of a matched frame pair
pub trait MatchVisualizer {
    /// `current.matches` index `previous.keypoints` (query) and `current.keypoints` (train)
    fn show(&mut self, previous: &Frame, current: &Frame) -> TrackResult<()>;
}

/// Discards every frame pair
#[derive(Debug, Default, Clone, Copy)]
pub struct NoVisualization;

impl MatchVisualizer for NoVisualization {
    fn show(&mut self, _previous: &Frame, _current: &Frame) -> TrackResult<()> {
        Ok(())
    }
}

/// Writes one side-by-side correspondence image per frame pair
#[derive(Debug, Clone)]
pub struct MatchImageWriter {
    out_dir: PathBuf,
}

impl MatchImageWriter {
    pub fn new(out_dir: impl Into<PathBuf>) -> TrackResult<Self> {
        let out_dir = out_dir.into();
        std::fs::create_dir_all(&out_dir)?;
        Ok(Self { out_dir })
    }

    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }

    pub fn path_for(&self, previous: &Frame, current: &Frame) -> PathBuf {
        self.out_dir
            .join(format!("matches_{:04}_{:04}.png", previous.index, current.index))
    }
}

impl MatchVisualizer for MatchImageWriter {
    fn show(&mut self, previous: &Frame, current: &Frame) -> TrackResult<()> {
        let canvas = render_matches(previous, current);
        let path = self.path_for(previous, current);
        canvas
            .save(&path)
            .map_err(|source| TrackError::ImageWrite {
                path: path.clone(),
                source,
            })?;
        info!(
            "Wrote {} matches between frames {} and {} to {}",
            current.matches.len(),
            previous.index,
            current.index,
            path.display()
        );
        Ok(())
    }
}

const PALETTE: [Rgb<u8>; 6] = [
    Rgb([255, 64, 64]),
    Rgb([64, 255, 64]),
    Rgb([64, 128, 255]),
    Rgb([255, 255, 64]),
    Rgb([255, 64, 255]),
    Rgb([64, 255, 255]),
];

const KEYPOINT_COLOR: Rgb<u8> = Rgb([255, 160, 0]);

/// Previous image on the left, current on the right, matches joined by lines
pub fn render_matches(previous: &Frame, current: &Frame) -> RgbImage {
    let (w1, h1) = previous.image.dimensions();
    let (w2, h2) = current.image.dimensions();
    let mut canvas = RgbImage::new(w1 + w2, h1.max(h2));
    blit_gray(&mut canvas, &previous.image, 0);
    blit_gray(&mut canvas, &current.image, w1);

    let offset = w1 as f32;
    for kp in &previous.keypoints {
        draw_hollow_circle_mut(
            &mut canvas,
            circle_center(kp.x, kp.y),
            radius(kp.size),
            KEYPOINT_COLOR,
        );
    }
    for kp in &current.keypoints {
        draw_hollow_circle_mut(
            &mut canvas,
            circle_center(kp.x + offset, kp.y),
            radius(kp.size),
            KEYPOINT_COLOR,
        );
    }

    for (i, m) in current.matches.iter().enumerate() {
        let (Some(q), Some(t)) = (
            previous.keypoints.get(m.query_idx),
            current.keypoints.get(m.train_idx),
        ) else {
            continue;
        };
        draw_line_segment_mut(
            &mut canvas,
            (q.x, q.y),
            (t.x + offset, t.y),
            PALETTE[i % PALETTE.len()],
        );
    }
    canvas
}

fn blit_gray(canvas: &mut RgbImage, img: &GrayImage, x_offset: u32) {
    for (x, y, p) in img.enumerate_pixels() {
        let v = p.0[0];
        canvas.put_pixel(x + x_offset, y, Rgb([v, v, v]));
    }
}

fn circle_center(x: f32, y: f32) -> (i32, i32) {
    (x.round() as i32, y.round() as i32)
}

fn radius(size: f32) -> i32 {
    ((size * 0.5).round() as i32).max(2)
}
