use crate::error::{TrackError, TrackResult};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Keypoint detector variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum DetectorKind {
    Akaze,
    Brisk,
    Fast,
    Harris,
    Orb,
    ShiTomasi,
    Sift,
    Surf,
}

impl DetectorKind {
    pub const ALL: [DetectorKind; 8] = [
        DetectorKind::Akaze,
        DetectorKind::Brisk,
        DetectorKind::Fast,
        DetectorKind::Harris,
        DetectorKind::Orb,
        DetectorKind::ShiTomasi,
        DetectorKind::Sift,
        DetectorKind::Surf,
    ];

    /// ShiTomasi corners carry no response; their order is the quality order.
    pub fn provides_response(self) -> bool {
        !matches!(self, DetectorKind::ShiTomasi)
    }

    pub fn name(self) -> &'static str {
        match self {
            DetectorKind::Akaze => "AKAZE",
            DetectorKind::Brisk => "BRISK",
            DetectorKind::Fast => "FAST",
            DetectorKind::Harris => "Harris",
            DetectorKind::Orb => "ORB",
            DetectorKind::ShiTomasi => "ShiTomasi",
            DetectorKind::Sift => "SIFT",
            DetectorKind::Surf => "SURF",
        }
    }
}

impl std::fmt::Display for DetectorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for DetectorKind {
    type Err = TrackError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DetectorKind::ALL
            .into_iter()
            .find(|kind| kind.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| TrackError::Configuration(format!("unknown detector '{}'", s)))
    }
}

/// Descriptor extractor variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum DescriptorKind {
    Akaze,
    Brief,
    Brisk,
    Freak,
    Orb,
    Sift,
    Surf,
}

impl DescriptorKind {
    pub const ALL: [DescriptorKind; 7] = [
        DescriptorKind::Akaze,
        DescriptorKind::Brief,
        DescriptorKind::Brisk,
        DescriptorKind::Freak,
        DescriptorKind::Orb,
        DescriptorKind::Sift,
        DescriptorKind::Surf,
    ];

    pub fn element_type(self) -> ElementType {
        match self {
            DescriptorKind::Sift | DescriptorKind::Surf => ElementType::Float,
            _ => ElementType::Binary,
        }
    }

    pub fn metric(self) -> DistanceMetric {
        DistanceMetric::for_element(self.element_type())
    }

    pub fn name(self) -> &'static str {
        match self {
            DescriptorKind::Akaze => "AKAZE",
            DescriptorKind::Brief => "BRIEF",
            DescriptorKind::Brisk => "BRISK",
            DescriptorKind::Freak => "FREAK",
            DescriptorKind::Orb => "ORB",
            DescriptorKind::Sift => "SIFT",
            DescriptorKind::Surf => "SURF",
        }
    }
}

impl std::fmt::Display for DescriptorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for DescriptorKind {
    type Err = TrackError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DescriptorKind::ALL
            .into_iter()
            .find(|kind| kind.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| TrackError::Configuration(format!("unknown descriptor '{}'", s)))
    }
}

/// Storage type of descriptor rows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementType {
    Binary,
    Float,
}

/// Distance used to compare descriptor rows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistanceMetric {
    /// Number of differing bits
    Hamming,
    /// Euclidean norm of the difference
    L2,
}

impl DistanceMetric {
    pub fn for_element(element: ElementType) -> Self {
        match element {
            ElementType::Binary => DistanceMetric::Hamming,
            ElementType::Float => DistanceMetric::L2,
        }
    }

    pub fn element_type(self) -> ElementType {
        match self {
            DistanceMetric::Hamming => ElementType::Binary,
            DistanceMetric::L2 => ElementType::Float,
        }
    }
}

/// Match selection policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum SelectorKind {
    /// Best train descriptor for every query descriptor
    #[cfg_attr(feature = "serde", serde(rename = "nn"))]
    NearestNeighbor,
    /// k nearest candidates followed by the distance-ratio test
    #[cfg_attr(feature = "serde", serde(rename = "knn"))]
    KNearestNeighbor,
}

/// Closed-open rectangle in pixel coordinates: x in [x, x + width), y in [y, y + height)
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Region {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Region {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    pub fn contains(&self, px: f32, py: f32) -> bool {
        px >= self.x && px < self.x + self.width && py >= self.y && py < self.y + self.height
    }
}

impl Default for Region {
    /// Preceding vehicle in the KITTI sequence
    fn default() -> Self {
        Self::new(535.0, 180.0, 180.0, 150.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct MatcherConfig {
    pub selector: SelectorKind,
    pub cross_check: bool,
    pub k: usize,
    pub ratio: f32,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            selector: SelectorKind::NearestNeighbor,
            cross_check: false,
            k: 2,
            ratio: 0.8,
        }
    }
}

impl MatcherConfig {
    pub fn nearest_neighbor() -> Self {
        Self::default()
    }

    /// KNN selection with the ratio test; `k` candidates per query descriptor.
    pub fn k_nearest(k: usize) -> Self {
        Self {
            selector: SelectorKind::KNearestNeighbor,
            k,
            ..Self::default()
        }
    }

    /// Symmetric matching; forces the nearest-neighbor selector.
    pub fn cross_checked() -> Self {
        Self {
            selector: SelectorKind::NearestNeighbor,
            cross_check: true,
            ..Self::default()
        }
    }

    /// Switch selector; choosing KNN turns cross-check off.
    pub fn set_selector(&mut self, selector: SelectorKind) {
        if selector == SelectorKind::KNearestNeighbor {
            self.cross_check = false;
        }
        self.selector = selector;
    }

    pub fn validate(&self) -> TrackResult<()> {
        if self.cross_check && self.selector == SelectorKind::KNearestNeighbor {
            return Err(TrackError::Configuration(
                "cross-check requires the nearest-neighbor selector".to_string(),
            ));
        }
        if self.k == 0 {
            return Err(TrackError::Configuration("k must be at least 1".to_string()));
        }
        if !(self.ratio > 0.0 && self.ratio <= 1.0) {
            return Err(TrackError::Configuration(format!(
                "ratio {} outside (0, 1]",
                self.ratio
            )));
        }
        Ok(())
    }
}

/// Descriptor used when nothing else is requested
const DEFAULT_DESCRIPTOR: DescriptorKind = DescriptorKind::Brief;

/// Immutable run configuration handed to the pipeline
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct TrackingConfig {
    pub detector: DetectorKind,
    pub descriptor: DescriptorKind,
    pub restrict_to_region: bool,
    pub limit_keypoints: bool,
    pub max_keypoints: usize,
    pub buffer_capacity: usize,
    pub visualize: bool,
    pub n_threads: usize,
    pub region: Region,
    pub matcher: MatcherConfig,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            detector: DetectorKind::Fast,
            descriptor: DEFAULT_DESCRIPTOR,
            restrict_to_region: false,
            limit_keypoints: false,
            max_keypoints: 50,
            buffer_capacity: 2,
            visualize: false,
            n_threads: num_cpus::get().max(1),
            region: Region::default(),
            matcher: MatcherConfig::default(),
        }
    }
}

impl TrackingConfig {
    /// Configuration for a detector/descriptor pair, AKAZE detection forcing AKAZE description.
    pub fn new(detector: DetectorKind, descriptor: DescriptorKind) -> Self {
        let descriptor = if detector == DetectorKind::Akaze {
            DescriptorKind::Akaze
        } else {
            descriptor
        };
        Self {
            detector,
            descriptor,
            ..Self::default()
        }
    }

    /// Switch detector, keeping the AKAZE pairing intact in both directions:
    /// entering AKAZE forces the AKAZE descriptor, leaving it restores the default one.
    pub fn set_detector(&mut self, detector: DetectorKind) {
        if detector == DetectorKind::Akaze {
            self.descriptor = DescriptorKind::Akaze;
        } else if self.descriptor == DescriptorKind::Akaze {
            self.descriptor = DEFAULT_DESCRIPTOR;
        }
        self.detector = detector;
    }

    pub fn with_region(mut self, region: Region) -> Self {
        self.restrict_to_region = true;
        self.region = region;
        self
    }

    pub fn with_keypoint_limit(mut self, max_keypoints: usize) -> Self {
        self.limit_keypoints = true;
        self.max_keypoints = max_keypoints;
        self
    }

    pub fn with_matcher(mut self, matcher: MatcherConfig) -> Self {
        self.matcher = matcher;
        self
    }

    pub fn with_visualization(mut self, visualize: bool) -> Self {
        self.visualize = visualize;
        self
    }

    /// Generate human-readable summary
    pub fn summary(&self) -> String {
        let region = if self.restrict_to_region {
            format!(
                "({}, {}, {}x{})",
                self.region.x, self.region.y, self.region.width, self.region.height
            )
        } else {
            "off".to_string()
        };
        let limit = if self.limit_keypoints {
            self.max_keypoints.to_string()
        } else {
            "off".to_string()
        };
        let selector = match self.matcher.selector {
            SelectorKind::NearestNeighbor => "NN".to_string(),
            SelectorKind::KNearestNeighbor => format!("KNN(k={})", self.matcher.k),
        };
        format!(
            "TrackingConfig: detector={}, descriptor={}, region={}, limit={}, selector={}, cross_check={}, buffer={}",
            self.detector,
            self.descriptor,
            region,
            limit,
            selector,
            self.matcher.cross_check,
            self.buffer_capacity
        )
    }

    /// Validate the detector/descriptor pairing and matcher policy
    pub fn validate(&self) -> TrackResult<()> {
        let akaze_detector = self.detector == DetectorKind::Akaze;
        let akaze_descriptor = self.descriptor == DescriptorKind::Akaze;
        if akaze_detector != akaze_descriptor {
            return Err(TrackError::Configuration(format!(
                "{} detector cannot be paired with {} descriptor; AKAZE detection and description go together",
                self.detector, self.descriptor
            )));
        }
        self.matcher.validate()?;
        if self.matcher.cross_check && self.descriptor.element_type() != ElementType::Float {
            return Err(TrackError::Configuration(format!(
                "cross-check is only available for SIFT and SURF descriptors, got {}",
                self.descriptor
            )));
        }
        if self.buffer_capacity < 2 {
            return Err(TrackError::Configuration(format!(
                "buffer capacity {} cannot hold a frame pair",
                self.buffer_capacity
            )));
        }
        if self.n_threads == 0 {
            return Err(TrackError::Configuration("n_threads must be positive".to_string()));
        }
        Ok(())
    }

    /// Serialize to TOML string
    #[cfg(feature = "serde")]
    pub fn to_toml(&self) -> TrackResult<String> {
        toml::to_string_pretty(self).map_err(|e| TrackError::ConfigFormat(e.to_string()))
    }

    /// Deserialize from TOML string
    #[cfg(feature = "serde")]
    pub fn from_toml(toml_str: &str) -> TrackResult<Self> {
        let config: Self =
            toml::from_str(toml_str).map_err(|e| TrackError::ConfigFormat(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to JSON string
    #[cfg(feature = "serde")]
    pub fn to_json(&self) -> TrackResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| TrackError::ConfigFormat(e.to_string()))
    }

    /// Deserialize from JSON string
    #[cfg(feature = "serde")]
    pub fn from_json(json: &str) -> TrackResult<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| TrackError::ConfigFormat(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    #[cfg(feature = "serde")]
    pub fn load_toml<P: AsRef<std::path::Path>>(path: P) -> TrackResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Save configuration to a TOML file
    #[cfg(feature = "serde")]
    pub fn save_toml<P: AsRef<std::path::Path>>(&self, path: P) -> TrackResult<()> {
        std::fs::write(path, self.to_toml()?)?;
        Ok(())
    }

    /// Load configuration from a JSON file
    #[cfg(feature = "serde")]
    pub fn load_json<P: AsRef<std::path::Path>>(path: P) -> TrackResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Save configuration to a JSON file
    #[cfg(feature = "serde")]
    pub fn save_json<P: AsRef<std::path::Path>>(&self, path: P) -> TrackResult<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }
}
