use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TrackError {
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Failed to load image {path}: {source}")]
    ImageLoad {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("Failed to write image {path}: {source}")]
    ImageWrite {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("Frame buffer is empty")]
    EmptyBuffer,

    #[error("Frame buffer holds {available} frame(s), at least 2 are required for matching")]
    InsufficientFrames { available: usize },

    #[error("Frame {index} has no descriptors")]
    UndescribedFrame { index: usize },

    #[error("Incompatible descriptors: {0}")]
    IncompatibleDescriptors(String),

    #[error("Thread pool error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration format error: {0}")]
    ConfigFormat(String),
}

pub type TrackResult<T> = Result<T, TrackError>;
