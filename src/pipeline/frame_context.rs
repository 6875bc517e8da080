// src/pipeline/frame_context.rs
//
// Everything known about one analysed frame. Providers fill it, the
// measurement step and the annotators read from it.

use crate::geometry::Mask;
use crate::keypoints::{Keypoint, KeypointSet, Point};
use crate::types::Frame;

#[derive(Debug, Clone)]
pub struct FrameContext {
    pub frame: Frame,
    pub keypoints: Option<KeypointSet>,
    pub mask: Option<Mask>,
}

impl FrameContext {
    pub fn new(frame: Frame) -> Self {
        Self {
            frame,
            keypoints: None,
            mask: None,
        }
    }

    pub fn index(&self) -> usize {
        self.frame.index
    }

    pub fn timestamp_ms(&self) -> f64 {
        self.frame.timestamp_ms
    }

    pub fn keypoint(&self, keypoint: Keypoint) -> Option<Point> {
        self.keypoints.as_ref().and_then(|k| k.get(keypoint))
    }
}
