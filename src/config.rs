use crate::orientation::DEFAULT_FRONT_THRESHOLD;
use crate::types::{
    AnalysisConfig, Config, LoggingConfig, OutputConfig, SourcesConfig, VisualizationConfig,
};
use anyhow::{bail, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_ANALYSE_RATE: f64 = 10.0;

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: Config = serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.analysis.analyse_rate.is_finite() || self.analysis.analyse_rate <= 0.0 {
            bail!(
                "analysis.analyse_rate must be positive, got {}",
                self.analysis.analyse_rate
            );
        }
        if !self.analysis.front_threshold.is_finite() || self.analysis.front_threshold <= 0.0 {
            bail!(
                "analysis.front_threshold must be positive, got {}",
                self.analysis.front_threshold
            );
        }
        if !(0.0..=1.0).contains(&self.visualization.mask_opacity) {
            bail!(
                "visualization.mask_opacity must be within [0, 1], got {}",
                self.visualization.mask_opacity
            );
        }
        if self.output.report_file.is_empty() {
            bail!("output.report_file must not be empty");
        }
        Ok(())
    }

    pub fn report_path(&self) -> PathBuf {
        self.output.output_dir.join(&self.output.report_file)
    }
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            pose_dir: None,
            segmentation_dir: None,
            mask_interest_dir: None,
            cache_dir: PathBuf::from("cache"),
        }
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            analyse_rate: DEFAULT_ANALYSE_RATE,
            front_threshold: DEFAULT_FRONT_THRESHOLD,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("plots/analysis"),
            visualize: true,
            report_file: "report.json".to_string(),
        }
    }
}

impl Default for VisualizationConfig {
    fn default() -> Self {
        Self {
            font_path: None,
            mask_opacity: 0.2,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}
