use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub dataset: DatasetConfig,
    #[serde(default)]
    pub sources: SourcesConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub visualization: VisualizationConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetConfig {
    pub input_dir: PathBuf,
    /// Restrict the run to these sample names (file stems). Empty means all.
    #[serde(default)]
    pub include: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    /// Precomputed keypoints; `None` means they come from a pose estimator.
    pub pose_dir: Option<PathBuf>,
    /// Precomputed masks; `None` means they come from a segmentation estimator.
    pub segmentation_dir: Option<PathBuf>,
    pub mask_interest_dir: Option<PathBuf>,
    /// Write-through cache for estimator output.
    pub cache_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Frames per second sampled from videos.
    pub analyse_rate: f64,
    /// Centerline spread (% of box width) below which a rider faces the camera.
    pub front_threshold: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub output_dir: PathBuf,
    pub visualize: bool,
    pub report_file: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VisualizationConfig {
    /// TTF/OTF font for text labels; labels are skipped without one.
    pub font_path: Option<PathBuf>,
    pub mask_opacity: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

/// One decoded frame of a sample.
#[derive(Debug, Clone)]
pub struct Frame {
    pub index: usize,
    pub image: RgbImage,
    pub timestamp_ms: f64,
}
