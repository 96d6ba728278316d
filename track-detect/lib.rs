//! Keypoint detectors for the tracking pipeline.
//!
//! Every detector implements [`KeypointDetector`] and is chosen once per run
//! through [`create_detector`]. Region and count limiting live in [`filter`].

pub mod akaze;
pub mod brisk;
pub mod fast;
pub mod filter;
pub mod harris;
pub mod nms;
pub mod orb;
pub mod orientation;
pub mod pyramid;
pub mod shi_tomasi;
pub mod sift;
pub mod surf;
pub mod types;
pub mod utils;

use image::GrayImage;
use track_core::{DetectorKind, Keypoint};

pub use akaze::AkazeDetector;
pub use brisk::BriskDetector;
pub use fast::FastDetector;
pub use filter::{KeypointLimiter, Ranking, RegionFilter};
pub use harris::HarrisDetector;
pub use orb::OrbDetector;
pub use shi_tomasi::ShiTomasiDetector;
pub use sift::SiftDetector;
pub use surf::SurfDetector;
pub use types::{ScaleLevel, ScoredCorner};

/// A keypoint detection strategy with a fixed parameter set.
///
/// Implementations never modify the image and are deterministic for a given
/// input. Returned keypoints lie inside the image.
pub trait KeypointDetector: Send + Sync {
    fn kind(&self) -> DetectorKind;

    fn detect(&self, img: &GrayImage) -> Vec<Keypoint>;

    /// Whether keypoints carry a comparable `response`
    fn provides_response(&self) -> bool {
        self.kind().provides_response()
    }
}

/// Detector for the given variant with its default parameters
pub fn create_detector(kind: DetectorKind) -> Box<dyn KeypointDetector> {
    match kind {
        DetectorKind::ShiTomasi => Box::new(ShiTomasiDetector::default()),
        DetectorKind::Harris => Box::new(HarrisDetector::default()),
        DetectorKind::Fast => Box::new(FastDetector::default()),
        DetectorKind::Brisk => Box::new(BriskDetector::default()),
        DetectorKind::Orb => Box::new(OrbDetector::default()),
        DetectorKind::Akaze => Box::new(AkazeDetector::default()),
        DetectorKind::Sift => Box::new(SiftDetector::default()),
        DetectorKind::Surf => Box::new(SurfDetector::default()),
    }
}
