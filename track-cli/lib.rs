//! Frame-to-frame feature tracking over an image sequence.
//!
//! [`Pipeline`] owns the frame buffer and the strategies chosen once from a
//! [`TrackingConfig`]. Every image goes through the same stages: push into the
//! buffer, detect, restrict to the region, limit, describe, and once two frames
//! are buffered, match the previous frame against the current one.

pub mod sequence;
pub mod settings;
pub mod visualize;

use std::time::{Duration, Instant};

use log::{debug, info};
use serde::Serialize;
use track_core::{Frame, FrameBuffer, GrayImage, Match, TrackError, TrackResult, TrackingConfig};
use track_describe::{create_extractor, DescriptorExtractor};
use track_detect::{create_detector, KeypointDetector, KeypointLimiter, RegionFilter};
use track_match::Matcher;

pub use sequence::{load_gray, ImageSequence};
pub use settings::RunSettings;
pub use visualize::{render_matches, MatchImageWriter, MatchVisualizer, NoVisualization};

/// What happened to one frame on its way through the pipeline
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrameStats {
    pub index: usize,
    /// Keypoints straight from the detector
    pub detected: usize,
    /// Keypoints left after the region filter and the limiter
    pub kept: usize,
    pub descriptors: usize,
    /// `None` until the buffer holds a frame pair
    pub matches: Option<usize>,
    pub detect_ms: f64,
    pub describe_ms: f64,
    pub match_ms: Option<f64>,
}

impl FrameStats {
    pub fn summary_line(&self) -> String {
        let matches = match (self.matches, self.match_ms) {
            (Some(n), Some(ms)) => format!("{} matches in {:.2} ms", n, ms),
            _ => "no previous frame".to_string(),
        };
        format!(
            "frame {:>4}: detected {:>5}, kept {:>5} ({:.2} ms), described {:>5} ({:.2} ms), {}",
            self.index,
            self.detected,
            self.kept,
            self.detect_ms,
            self.descriptors,
            self.describe_ms,
            matches
        )
    }
}

/// Totals over a run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub frames: usize,
    pub mean_kept: f64,
    pub mean_matches: f64,
    pub total_detect_ms: f64,
    pub total_describe_ms: f64,
    pub total_match_ms: f64,
}

impl RunSummary {
    pub fn from_stats(stats: &[FrameStats]) -> Self {
        let frames = stats.len();
        let pairs: Vec<usize> = stats.iter().filter_map(|s| s.matches).collect();
        let mean = |sum: usize, n: usize| if n == 0 { 0.0 } else { sum as f64 / n as f64 };
        Self {
            frames,
            mean_kept: mean(stats.iter().map(|s| s.kept).sum(), frames),
            mean_matches: mean(pairs.iter().sum(), pairs.len()),
            total_detect_ms: stats.iter().map(|s| s.detect_ms).sum(),
            total_describe_ms: stats.iter().map(|s| s.describe_ms).sum(),
            total_match_ms: stats.iter().filter_map(|s| s.match_ms).sum(),
        }
    }
}

fn millis(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

pub struct Pipeline {
    config: TrackingConfig,
    buffer: FrameBuffer,
    detector: Box<dyn KeypointDetector>,
    extractor: Box<dyn DescriptorExtractor>,
    region: RegionFilter,
    limiter: KeypointLimiter,
    matcher: Matcher,
    visualizer: Box<dyn MatchVisualizer>,
    next_index: usize,
}

impl Pipeline {
    /// Fix every strategy for the run; the configuration is validated first.
    pub fn new(config: TrackingConfig) -> TrackResult<Self> {
        config.validate()?;
        let detector = create_detector(config.detector);
        let extractor = create_extractor(config.descriptor);
        let region = RegionFilter::new(config.restrict_to_region, config.region);
        let limiter = KeypointLimiter::for_detector(
            config.limit_keypoints,
            config.max_keypoints,
            detector.provides_response(),
        );
        let matcher = Matcher::for_descriptor(config.matcher, config.descriptor)?;
        info!("{}", config.summary());
        Ok(Self {
            buffer: FrameBuffer::new(config.buffer_capacity)?,
            config,
            detector,
            extractor,
            region,
            limiter,
            matcher,
            visualizer: Box::new(NoVisualization),
            next_index: 0,
        })
    }

    /// Consumer of matched frame pairs, used only when `visualize` is set
    pub fn with_visualizer(mut self, visualizer: Box<dyn MatchVisualizer>) -> Self {
        self.visualizer = visualizer;
        self
    }

    pub fn config(&self) -> &TrackingConfig {
        &self.config
    }

    pub fn buffer(&self) -> &FrameBuffer {
        &self.buffer
    }

    pub fn matcher(&self) -> &Matcher {
        &self.matcher
    }

    /// Run every stage on one image
    pub fn process_image(&mut self, image: GrayImage) -> TrackResult<FrameStats> {
        let index = self.push_image(image);

        let start = Instant::now();
        let (detected, kept) = self.detect_current()?;
        let detect_ms = millis(start.elapsed());

        let start = Instant::now();
        let descriptors = self.describe_current()?;
        let describe_ms = millis(start.elapsed());

        let (matches, match_ms) = if self.buffer.len() >= 2 {
            let start = Instant::now();
            let n = self.match_latest()?.len();
            let ms = millis(start.elapsed());
            self.report_matches(self.config.visualize)?;
            (Some(n), Some(ms))
        } else {
            (None, None)
        };

        Ok(FrameStats {
            index,
            detected,
            kept,
            descriptors,
            matches,
            detect_ms,
            describe_ms,
            match_ms,
        })
    }

    /// Load and process every image of the sequence in index order.
    ///
    /// The first image that fails to load aborts the run.
    pub fn run(&mut self, sequence: &ImageSequence) -> TrackResult<Vec<FrameStats>> {
        sequence.validate()?;
        // The range can name far more files than exist; grow as images load
        let mut stats = Vec::new();
        for path in sequence.paths() {
            let image = load_gray(&path)?;
            debug!("Loaded {} ({}x{})", path.display(), image.width(), image.height());
            let frame_stats = self.process_image(image)?;
            info!("{}", frame_stats.summary_line());
            stats.push(frame_stats);
        }
        Ok(stats)
    }

    /// Stage 1: wrap the image in a new frame and buffer it
    pub fn push_image(&mut self, image: GrayImage) -> usize {
        let index = self.next_index;
        self.next_index += 1;
        if let Some(evicted) = self.buffer.push(Frame::new(index, image)) {
            debug!("Evicted frame {} from the buffer", evicted.index);
        }
        info!(
            "#1: LOAD IMAGE INTO BUFFER done. Number of elements in the buffer: {}",
            self.buffer.len()
        );
        index
    }

    /// Stage 2: detect, restrict to the region and limit on the current frame.
    ///
    /// Returns the detected and kept keypoint counts.
    pub fn detect_current(&mut self) -> TrackResult<(usize, usize)> {
        let frame = self.buffer.current_mut()?;
        let mut keypoints = self.detector.detect(&frame.image);
        let detected = keypoints.len();
        debug!("{} detector found {} keypoints", self.config.detector, detected);

        if self.region.is_enabled() {
            keypoints = self.region.apply(keypoints);
            info!(
                "Total detected keypoints: {}, keypoints inside the region: {}",
                detected,
                keypoints.len()
            );
        }
        if self.limiter.is_enabled() {
            keypoints = self.limiter.apply(keypoints);
            info!("Keypoints limited to {}", self.limiter.max_count());
        }

        let kept = keypoints.len();
        frame.keypoints = keypoints;
        frame.descriptors = None;
        info!("#2: DETECT KEYPOINTS done");
        Ok((detected, kept))
    }

    /// Stage 3: describe the current frame's keypoints
    pub fn describe_current(&mut self) -> TrackResult<usize> {
        let frame = self.buffer.current_mut()?;
        let descriptors = self.extractor.describe(&frame.image, &frame.keypoints);
        if descriptors.len() != frame.keypoints.len() {
            return Err(TrackError::IncompatibleDescriptors(format!(
                "{} extractor returned {} rows for {} keypoints",
                self.config.descriptor,
                descriptors.len(),
                frame.keypoints.len()
            )));
        }
        let n = descriptors.len();
        debug!("{} extractor described {} keypoints", self.config.descriptor, n);
        frame.descriptors = Some(descriptors);
        info!("#3: EXTRACT DESCRIPTORS done");
        Ok(n)
    }

    /// Stage 4: match the previous frame (query) against the current frame (train)
    /// and store the result on the current frame.
    pub fn match_latest(&mut self) -> TrackResult<&[Match]> {
        let (previous, current) = self.buffer.latest_pair_mut()?;
        let matches = self.matcher.match_frames(
            &previous.keypoints,
            &current.keypoints,
            previous.descriptors()?,
            current.descriptors()?,
        )?;
        current.matches = matches;
        info!("#4: MATCH KEYPOINT DESCRIPTORS done");
        Ok(&current.matches)
    }

    /// Hand the latest frame pair to the visualizer when `visualize` is set
    pub fn report_matches(&mut self, visualize: bool) -> TrackResult<()> {
        if !visualize {
            return Ok(());
        }
        let previous = self.buffer.previous()?;
        let current = self.buffer.current()?;
        self.visualizer.show(previous, current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;
    use track_core::{DescriptorKind, DetectorKind};

    fn scene(shift: u32) -> GrayImage {
        GrayImage::from_fn(120, 90, |x, y| {
            let x = x + shift;
            if (5..15).contains(&(x % 20)) && (5..15).contains(&(y % 20)) {
                Luma([(120 + ((x / 20) * 20 + (y / 20) * 10) % 130) as u8])
            } else {
                Luma([30])
            }
        })
    }

    struct Counting(std::rc::Rc<std::cell::Cell<usize>>);

    impl MatchVisualizer for Counting {
        fn show(&mut self, _previous: &Frame, _current: &Frame) -> TrackResult<()> {
            self.0.set(self.0.get() + 1);
            Ok(())
        }
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = TrackingConfig::default();
        config.descriptor = DescriptorKind::Akaze;
        assert!(matches!(Pipeline::new(config), Err(TrackError::Configuration(_))));
    }

    #[test]
    fn test_first_frame_has_no_matches() {
        let mut pipeline = Pipeline::new(TrackingConfig::default()).unwrap();
        let stats = pipeline.process_image(scene(0)).unwrap();
        assert_eq!(stats.index, 0);
        assert!(stats.detected > 0);
        assert_eq!(stats.kept, stats.detected);
        assert_eq!(stats.descriptors, stats.kept);
        assert_eq!(stats.matches, None);
        assert!(pipeline.buffer().current().unwrap().matches.is_empty());
    }

    #[test]
    fn test_buffer_stays_at_capacity() {
        let mut pipeline = Pipeline::new(TrackingConfig::default()).unwrap();
        for i in 0..4 {
            let stats = pipeline.process_image(scene(i)).unwrap();
            assert_eq!(stats.index, i as usize);
            assert!(pipeline.buffer().len() <= 2);
        }
        assert_eq!(pipeline.buffer().previous().unwrap().index, 2);
        assert_eq!(pipeline.buffer().current().unwrap().index, 3);
    }

    #[test]
    fn test_limit_applies_to_every_frame() {
        let config =
            TrackingConfig::new(DetectorKind::Fast, DescriptorKind::Orb).with_keypoint_limit(10);
        let mut pipeline = Pipeline::new(config).unwrap();
        for i in 0..3 {
            let stats = pipeline.process_image(scene(i)).unwrap();
            assert_eq!(stats.kept, stats.detected.min(10));
            if let Some(n) = stats.matches {
                assert!(n <= 10);
            }
        }
    }

    #[test]
    fn test_visualizer_follows_flag() {
        let calls = std::rc::Rc::new(std::cell::Cell::new(0));
        let mut quiet = Pipeline::new(TrackingConfig::default())
            .unwrap()
            .with_visualizer(Box::new(Counting(calls.clone())));
        for i in 0..3 {
            quiet.process_image(scene(i)).unwrap();
        }
        assert_eq!(calls.get(), 0);

        let mut shown = Pipeline::new(TrackingConfig::default().with_visualization(true))
            .unwrap()
            .with_visualizer(Box::new(Counting(calls.clone())));
        for i in 0..3 {
            shown.process_image(scene(i)).unwrap();
        }
        // One call per frame pair, the flag stays on after the first
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn test_run_summary() {
        let stats = vec![
            FrameStats {
                index: 0,
                detected: 10,
                kept: 8,
                descriptors: 8,
                matches: None,
                detect_ms: 1.0,
                describe_ms: 2.0,
                match_ms: None,
            },
            FrameStats {
                index: 1,
                detected: 12,
                kept: 6,
                descriptors: 6,
                matches: Some(4),
                detect_ms: 1.5,
                describe_ms: 2.5,
                match_ms: Some(0.5),
            },
        ];
        let summary = RunSummary::from_stats(&stats);
        assert_eq!(summary.frames, 2);
        assert_eq!(summary.mean_kept, 7.0);
        assert_eq!(summary.mean_matches, 4.0);
        assert_eq!(summary.total_detect_ms, 2.5);
        assert_eq!(summary.total_match_ms, 0.5);
        assert!(stats[0].summary_line().contains("no previous frame"));
        assert!(stats[1].summary_line().contains("4 matches"));
    }
}
