use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use track_core::{GrayImage, TrackError, TrackResult};

/// Numbered image files: `base_path + prefix + zero-padded index + extension`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageSequence {
    pub base_path: PathBuf,
    pub prefix: String,
    pub extension: String,
    pub start_index: usize,
    /// Inclusive
    pub end_index: usize,
    pub fill_width: usize,
}

impl Default for ImageSequence {
    fn default() -> Self {
        Self {
            base_path: PathBuf::from("../media/"),
            prefix: "KITTI/2011_09_26/image_00/data/000000".to_string(),
            extension: ".png".to_string(),
            start_index: 0,
            end_index: 9,
            fill_width: 4,
        }
    }
}

impl ImageSequence {
    pub fn new(
        base_path: impl Into<PathBuf>,
        prefix: impl Into<String>,
        extension: impl Into<String>,
    ) -> Self {
        Self {
            base_path: base_path.into(),
            prefix: prefix.into(),
            extension: extension.into(),
            ..Self::default()
        }
    }

    pub fn with_range(mut self, start_index: usize, end_index: usize) -> Self {
        self.start_index = start_index;
        self.end_index = end_index;
        self
    }

    pub fn with_fill_width(mut self, fill_width: usize) -> Self {
        self.fill_width = fill_width;
        self
    }

    /// Number of indices in the range, saturating for a range covering all of `usize`
    pub fn len(&self) -> usize {
        if self.end_index < self.start_index {
            return 0;
        }
        (self.end_index - self.start_index).saturating_add(1)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn validate(&self) -> TrackResult<()> {
        if self.end_index < self.start_index {
            return Err(TrackError::Configuration(format!(
                "image sequence ends at {} before it starts at {}",
                self.end_index, self.start_index
            )));
        }
        Ok(())
    }

    /// File path of the image with absolute index `index`
    pub fn path_for(&self, index: usize) -> PathBuf {
        let name = format!(
            "{}{:0width$}{}",
            self.prefix,
            index,
            self.extension,
            width = self.fill_width
        );
        self.base_path.join(name)
    }

    /// Paths in index order
    pub fn paths(&self) -> impl Iterator<Item = PathBuf> + '_ {
        (self.start_index..=self.end_index).map(|i| self.path_for(i))
    }
}

/// Decode an image file and convert it to 8-bit grayscale
pub fn load_gray(path: &Path) -> TrackResult<GrayImage> {
    let img = image::open(path).map_err(|source| TrackError::ImageLoad {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(img.to_luma8())
}
