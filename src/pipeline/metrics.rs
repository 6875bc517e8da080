// src/pipeline/metrics.rs
//
// Run-level counters and timing, logged at the end and stored in the report.

use serde::Serialize;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct PipelineMetrics {
    pub samples_total: u64,
    pub samples_analysed: u64,
    pub samples_failed: u64,
    pub frames_processed: u64,
    pub analysis_time: Duration,
    pub started_at: Instant,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self {
            samples_total: 0,
            samples_analysed: 0,
            samples_failed: 0,
            frames_processed: 0,
            analysis_time: Duration::ZERO,
            started_at: Instant::now(),
        }
    }

    pub fn record_success(&mut self, frames: usize, elapsed: Duration) {
        self.samples_total += 1;
        self.samples_analysed += 1;
        self.frames_processed += frames as u64;
        self.analysis_time += elapsed;
    }

    pub fn record_failure(&mut self, elapsed: Duration) {
        self.samples_total += 1;
        self.samples_failed += 1;
        self.analysis_time += elapsed;
    }

    /// Analysed frames per second of analysis time.
    pub fn fps(&self) -> f64 {
        let secs = self.analysis_time.as_secs_f64();
        if secs > 0.01 {
            self.frames_processed as f64 / secs
        } else {
            0.0
        }
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary {
            samples_total: self.samples_total,
            samples_analysed: self.samples_analysed,
            samples_failed: self.samples_failed,
            frames_processed: self.frames_processed,
            fps: self.fps(),
            elapsed_secs: self.started_at.elapsed().as_secs_f64(),
        }
    }
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub samples_total: u64,
    pub samples_analysed: u64,
    pub samples_failed: u64,
    pub frames_processed: u64,
    pub fps: f64,
    pub elapsed_secs: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts() {
        let mut metrics = PipelineMetrics::new();
        metrics.record_success(3, Duration::from_secs(1));
        metrics.record_success(1, Duration::from_secs(1));
        metrics.record_failure(Duration::ZERO);

        let summary = metrics.summary();
        assert_eq!(summary.samples_total, 3);
        assert_eq!(summary.samples_analysed, 2);
        assert_eq!(summary.samples_failed, 1);
        assert_eq!(summary.frames_processed, 4);
        assert_eq!(summary.fps, 2.0);
    }
}
