// src/pipeline/mod.rs

pub mod frame_context;
pub mod metrics;

pub use frame_context::FrameContext;
pub use metrics::{RunSummary, PipelineMetrics};
