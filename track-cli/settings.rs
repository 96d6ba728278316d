use std::path::Path;

use serde::{Deserialize, Serialize};
use track_core::{TrackError, TrackResult, TrackingConfig};

use crate::sequence::ImageSequence;

/// Settings file for one run: a `[tracking]` table and a `[sequence]` table
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RunSettings {
    pub tracking: TrackingConfig,
    pub sequence: ImageSequence,
}

impl RunSettings {
    pub fn validate(&self) -> TrackResult<()> {
        self.tracking.validate()?;
        self.sequence.validate()
    }

    pub fn from_toml(toml_str: &str) -> TrackResult<Self> {
        let settings: Self =
            toml::from_str(toml_str).map_err(|e| TrackError::ConfigFormat(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn to_toml(&self) -> TrackResult<String> {
        toml::to_string_pretty(self).map_err(|e| TrackError::ConfigFormat(e.to_string()))
    }

    pub fn load(path: &Path) -> TrackResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn save(&self, path: &Path) -> TrackResult<()> {
        std::fs::write(path, self.to_toml()?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use track_core::{DescriptorKind, DetectorKind, MatcherConfig, SelectorKind};

    #[test]
    fn test_toml_round_trip() {
        let mut settings = RunSettings {
            tracking: TrackingConfig::new(DetectorKind::Sift, DescriptorKind::Surf)
                .with_matcher(MatcherConfig::cross_checked())
                .with_keypoint_limit(50),
            sequence: ImageSequence::new("data/", "img_", ".png").with_range(2, 5),
        };
        settings.tracking.n_threads = 3;
        let text = settings.to_toml().unwrap();
        assert!(text.contains("[tracking]"));
        assert!(text.contains("[sequence]"));
        assert_eq!(RunSettings::from_toml(&text).unwrap(), settings);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let settings = RunSettings::from_toml(
            r#"
            [tracking]
            detector = "shitomasi"
            descriptor = "brisk"

            [tracking.matcher]
            selector = "knn"
            k = 2

            [sequence]
            end_index = 3
            "#,
        )
        .unwrap();
        assert_eq!(settings.tracking.detector, DetectorKind::ShiTomasi);
        assert_eq!(settings.tracking.descriptor, DescriptorKind::Brisk);
        assert_eq!(settings.tracking.matcher.selector, SelectorKind::KNearestNeighbor);
        assert_eq!(settings.tracking.buffer_capacity, 2);
        assert_eq!(settings.sequence.len(), 4);
        assert_eq!(settings.sequence.fill_width, 4);
    }

    #[test]
    fn test_invalid_pairing_rejected_on_load() {
        let err = RunSettings::from_toml(
            r#"
            [tracking]
            detector = "akaze"
            descriptor = "orb"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, TrackError::Configuration(_)));
    }

    #[test]
    fn test_malformed_file_is_format_error() {
        let err = RunSettings::from_toml("[tracking\ndetector =").unwrap_err();
        assert!(matches!(err, TrackError::ConfigFormat(_)));
    }
}
