// src/lib.rs

pub mod analysis;
pub mod config;
pub mod error;
pub mod geometry;
pub mod keypoints;
pub mod orientation;
pub mod pipeline;
pub mod policy;
pub mod providers;
pub mod types;
pub mod video_processor;
pub mod visualization;

pub use error::{AnalysisError, OrientationError, Result};
pub use types::Config;
