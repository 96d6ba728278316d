pub mod config;
pub mod error;
pub mod frame;
pub mod float_image;
pub mod integral;

pub use config::{
    DescriptorKind, DetectorKind, DistanceMetric, ElementType, MatcherConfig, Region,
    SelectorKind, TrackingConfig,
};
pub use error::{TrackError, TrackResult};
pub use frame::{Frame, FrameBuffer};
pub use float_image::FloatImage;
pub use integral::IntegralImage;

/// Row-major 8-bit grayscale image
pub type GrayImage = ::image::GrayImage;

/// Detected salient location with scale, orientation and quality metadata.
///
/// `angle` is in radians and `None` for detectors that do not estimate one.
/// `response` is `None` for detectors without a usable quality score
/// (ShiTomasi); their output order already encodes quality.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Keypoint {
    pub x: f32,
    pub y: f32,
    pub size: f32,
    pub angle: Option<f32>,
    pub response: Option<f32>,
    pub octave: usize,
}

impl Keypoint {
    pub fn new(x: f32, y: f32, size: f32) -> Self {
        Self {
            x,
            y,
            size,
            angle: None,
            response: None,
            octave: 0,
        }
    }

    pub fn with_response(mut self, response: f32) -> Self {
        self.response = Some(response);
        self
    }

    pub fn with_angle(mut self, angle: f32) -> Self {
        self.angle = Some(angle);
        self
    }

    pub fn with_octave(mut self, octave: usize) -> Self {
        self.octave = octave;
        self
    }
}

/// Descriptor rows for one frame, aligned index-for-index with its keypoints.
#[derive(Debug, Clone, PartialEq)]
pub enum Descriptors {
    /// Bit-packed rows, compared with Hamming distance
    Binary(Vec<Vec<u8>>),
    /// Floating-point rows, compared with Euclidean distance
    Float(Vec<Vec<f32>>),
}

impl Descriptors {
    pub fn empty(element: ElementType) -> Self {
        match element {
            ElementType::Binary => Descriptors::Binary(Vec::new()),
            ElementType::Float => Descriptors::Float(Vec::new()),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Descriptors::Binary(rows) => rows.len(),
            Descriptors::Float(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn element_type(&self) -> ElementType {
        match self {
            Descriptors::Binary(_) => ElementType::Binary,
            Descriptors::Float(_) => ElementType::Float,
        }
    }

    /// Row length in elements (bytes for binary rows), `None` when empty.
    pub fn dimension(&self) -> Option<usize> {
        match self {
            Descriptors::Binary(rows) => rows.first().map(Vec::len),
            Descriptors::Float(rows) => rows.first().map(Vec::len),
        }
    }
}

/// Correspondence from a query keypoint to a train keypoint
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Match {
    pub query_idx: usize,
    pub train_idx: usize,
    pub distance: f32,
}

/// Initialize Rayon thread pool with the specified number of threads
pub fn init_thread_pool(n_threads: usize) -> Result<(), rayon::ThreadPoolBuildError> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(n_threads)
        .build_global()
}
