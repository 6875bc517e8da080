// src/analysis/mod.rs
//
// Posture analysis pipeline.
//
// Signal flow:
//   FrameSource → analyzer (keypoints, mask, angles per frame) → reducer → SampleAnalysis
//   Samples     → comparer → ComparisonReport (grouped by orientation)

pub mod analyzer;
pub mod comparer;
pub mod reducer;

pub use analyzer::{FrameStreamAnalyzer, SampleAnalysis};
pub use comparer::{ComparisonReport, Comparer, SampleFailure, SampleSummary};
pub use reducer::{AreaSummary, FrameMeasurement, InterestSummary, KeypointTrack, Reduction, Stability};
