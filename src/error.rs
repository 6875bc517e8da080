// src/error.rs
//
// Error types for the cyclist posture analysis pipeline.

use std::path::PathBuf;

use thiserror::Error;

/// Reasons the orientation of a frame could not be determined.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OrientationError {
    #[error("no keypoints detected")]
    NoKeypoints,

    #[error("no centerline points (left/right pairs, Neck, Nose) detected")]
    NoCenterline,

    #[error("keypoint bounding box has zero width")]
    DegenerateBoundingBox,

    #[error("side disambiguation needs {0}, which was not detected")]
    MissingLandmarks(&'static str),
}

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Image error on {path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("Invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Video error: {0}")]
    Video(String),

    #[error("No keypoints available for frame {frame}")]
    MissingKeypoints { frame: usize },

    #[error("Undetermined orientation: {0}")]
    Orientation(#[from] OrientationError),

    #[error("No frames were processed")]
    NoData,

    #[error("Unsupported sample {0}")]
    UnsupportedSample(String),
}

impl AnalysisError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn image(path: impl Into<PathBuf>, source: image::ImageError) -> Self {
        Self::Image {
            path: path.into(),
            source,
        }
    }

    pub fn json(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Self::Json {
            path: path.into(),
            source,
        }
    }

    /// Configuration errors abort the whole run; everything else is local to one sample.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Config(_))
    }
}

pub type Result<T> = std::result::Result<T, AnalysisError>;
