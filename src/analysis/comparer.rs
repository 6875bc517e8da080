// src/analysis/comparer.rs
//
// Runs the analyzer over a dataset and groups the per-sample results by
// orientation so riders can be compared against each other.

use super::analyzer::{FrameStreamAnalyzer, SampleAnalysis};
use super::reducer::{AreaSummary, KeypointTrack};
use crate::error::{AnalysisError, Result};
use crate::keypoints::Keypoint;
use crate::orientation::Orientation;
use crate::pipeline::{PipelineMetrics, RunSummary};
use crate::policy::JointAngle;
use crate::providers::Providers;
use crate::video_processor::{open_source, Sample, SampleKind};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

#[derive(Debug, Clone, Serialize)]
pub struct SampleSummary {
    pub file: String,
    pub kind: SampleKind,
    pub orientation: Orientation,
    pub frames_processed: usize,
    pub stride: usize,
    pub elapsed_secs: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub area: Option<AreaSummary>,
    pub tracks: Vec<KeypointTrack>,
    pub angles: BTreeMap<JointAngle, Vec<Option<f64>>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SampleFailure {
    pub sample: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ComparisonReport {
    pub area: BTreeMap<Orientation, BTreeMap<String, AreaSummary>>,
    /// Standard deviation of each tracked keypoint's distance to its centroid.
    pub stability: BTreeMap<Orientation, BTreeMap<String, BTreeMap<Keypoint, f64>>>,
    pub samples: BTreeMap<String, SampleSummary>,
    pub failures: Vec<SampleFailure>,
    pub run: RunSummary,
}

impl ComparisonReport {
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| AnalysisError::io(parent, e))?;
            }
        }
        let json = serde_json::to_string_pretty(self).map_err(|e| AnalysisError::json(path, e))?;
        fs::write(path, json).map_err(|e| AnalysisError::io(path, e))?;
        info!("Report written to {}", path.display());
        Ok(())
    }
}

pub struct Comparer {
    analyzer: FrameStreamAnalyzer,
    providers: Providers,
    /// Where `vis_<file>` and `<name>.jpg` go; `None` disables visual output.
    output_dir: Option<PathBuf>,
}

impl Comparer {
    pub fn new(analyzer: FrameStreamAnalyzer, providers: Providers) -> Self {
        Self {
            analyzer,
            providers,
            output_dir: None,
        }
    }

    pub fn with_visualization(mut self, output_dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(output_dir.into());
        self
    }

    /// Analyse every sample in name order. A failing sample is recorded and skipped.
    pub fn compare(&mut self, samples: &[Sample]) -> ComparisonReport {
        let mut ordered: Vec<&Sample> = samples.iter().collect();
        ordered.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.path.cmp(&b.path)));

        let mut metrics = PipelineMetrics::new();
        let mut area: BTreeMap<Orientation, BTreeMap<String, AreaSummary>> = BTreeMap::new();
        let mut stability: BTreeMap<Orientation, BTreeMap<String, BTreeMap<Keypoint, f64>>> =
            BTreeMap::new();
        let mut summaries = BTreeMap::new();
        let mut failures = Vec::new();
        let mut claimed: HashMap<&str, String> = HashMap::new();

        for (idx, sample) in ordered.iter().enumerate() {
            info!(
                "Processing sample {}/{}: {}",
                idx + 1,
                ordered.len(),
                sample.file_name()
            );
            // Results are keyed by sample name; a second file with the same stem is rejected.
            if let Some(first) = claimed.get(sample.name.as_str()) {
                warn!(
                    "✗ {} skipped: sample name {} already used by {}",
                    sample.file_name(),
                    sample.name,
                    first
                );
                metrics.record_failure(Duration::ZERO);
                failures.push(SampleFailure {
                    sample: sample.name.clone(),
                    reason: format!(
                        "duplicate sample name: {} and {}",
                        first,
                        sample.file_name()
                    ),
                });
                continue;
            }
            claimed.insert(sample.name.as_str(), sample.file_name());
            let started = Instant::now();

            match self.run_sample(sample) {
                Ok(analysis) => {
                    let elapsed = started.elapsed();
                    metrics.record_success(analysis.frames_processed(), elapsed);
                    info!(
                        "✓ {}: {} in {:.2}s",
                        sample.name,
                        analysis.orientation,
                        elapsed.as_secs_f64()
                    );

                    let orientation = analysis.orientation;
                    if let Some(summary) = &analysis.reduction.area {
                        area.entry(orientation)
                            .or_default()
                            .insert(sample.name.clone(), summary.clone());
                    }
                    let spread: BTreeMap<Keypoint, f64> = analysis
                        .reduction
                        .tracks
                        .iter()
                        .filter_map(|t| t.stability.as_ref().map(|s| (t.keypoint, s.std_distance)))
                        .collect();
                    stability
                        .entry(orientation)
                        .or_default()
                        .insert(sample.name.clone(), spread);

                    summaries.insert(
                        sample.name.clone(),
                        summarize(sample, analysis, elapsed.as_secs_f64()),
                    );
                }
                Err(e) => {
                    metrics.record_failure(started.elapsed());
                    error!("✗ {} failed: {}", sample.file_name(), e);
                    failures.push(SampleFailure {
                        sample: sample.name.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        let run = metrics.summary();
        info!(
            "Analysed {}/{} samples, {} frames, {:.2}s total",
            run.samples_analysed, run.samples_total, run.frames_processed, run.elapsed_secs
        );

        ComparisonReport {
            area,
            stability,
            samples: summaries,
            failures,
            run,
        }
    }

    fn run_sample(&mut self, sample: &Sample) -> Result<SampleAnalysis> {
        let mut source = open_source(sample)?;
        let vis_path = self
            .output_dir
            .as_ref()
            .map(|dir| dir.join(format!("vis_{}", sample.file_name())));

        let analysis = self.analyzer.analyze(
            sample,
            source.as_mut(),
            &mut self.providers,
            vis_path.as_deref(),
        )?;

        if let Some(dir) = &self.output_dir {
            let path = dir.join(format!("{}.jpg", sample.name));
            self.analyzer
                .renderer()
                .render(&analysis.summary)
                .save(&path)
                .map_err(|e| AnalysisError::image(&path, e))?;
        }
        Ok(analysis)
    }
}

fn summarize(sample: &Sample, analysis: SampleAnalysis, elapsed_secs: f64) -> SampleSummary {
    let frames_processed = analysis.frames_processed();
    SampleSummary {
        file: sample.file_name(),
        kind: sample.kind,
        orientation: analysis.orientation,
        frames_processed,
        stride: analysis.stride,
        elapsed_secs,
        area: analysis.reduction.area,
        tracks: analysis.reduction.tracks,
        angles: analysis.reduction.angles,
    }
}
