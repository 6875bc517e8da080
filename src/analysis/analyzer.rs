// src/analysis/analyzer.rs
//
// Walks the frames of one sample at the analysis rate, measures what the
// orientation's policy asks for and reduces the sequence.

use super::reducer::{self, FrameMeasurement, Reduction};
use crate::error::{AnalysisError, Result};
use crate::geometry::Mask;
use crate::orientation::{self, Orientation};
use crate::pipeline::FrameContext;
use crate::policy::TrackingPolicy;
use crate::providers::Providers;
use crate::types::{AnalysisConfig, Frame};
use crate::video_processor::{frame_stride, FrameSource, Sample};
use crate::visualization::{open_sink, AnnotatedFrame, Annotation, Renderer, LABEL_COLOR, STATS_COLOR};
use std::path::Path;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct SampleAnalysis {
    pub sample: String,
    pub orientation: Orientation,
    pub reduction: Reduction,
    pub measurements: Vec<FrameMeasurement>,
    pub stride: usize,
    /// Frame 0 with overlays and statistics, ready to render.
    pub summary: AnnotatedFrame,
}

impl SampleAnalysis {
    pub fn frames_processed(&self) -> usize {
        self.measurements.len()
    }
}

pub struct FrameStreamAnalyzer {
    config: AnalysisConfig,
    renderer: Renderer,
}

impl FrameStreamAnalyzer {
    pub fn new(config: AnalysisConfig, renderer: Renderer) -> Self {
        Self { config, renderer }
    }

    pub fn renderer(&self) -> &Renderer {
        &self.renderer
    }

    /// Analyse one sample. With `vis_path`, every processed frame is annotated
    /// and written there. Provider caches are flushed whether or not the
    /// analysis succeeds.
    pub fn analyze(
        &self,
        sample: &Sample,
        source: &mut dyn FrameSource,
        providers: &mut Providers,
        vis_path: Option<&Path>,
    ) -> Result<SampleAnalysis> {
        let result = self.analyze_frames(sample, source, providers, vis_path);
        let flushed = providers.keypoints.finish_sample(sample);
        match (result, flushed) {
            (Ok(analysis), Ok(())) => Ok(analysis),
            (Ok(_), Err(e)) => Err(e),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(flush_err)) => {
                warn!("{}: keypoint cache not saved: {}", sample.name, flush_err);
                Err(e)
            }
        }
    }

    fn analyze_frames(
        &self,
        sample: &Sample,
        source: &mut dyn FrameSource,
        providers: &mut Providers,
        vis_path: Option<&Path>,
    ) -> Result<SampleAnalysis> {
        let stride = match source.fps() {
            Some(fps) => frame_stride(fps, self.config.analyse_rate),
            None => 1,
        };
        debug!("{}: stride {}", sample.name, stride);

        let first = source.read_frame(0)?.ok_or(AnalysisError::NoData)?;
        let mut ctx = FrameContext::new(first);
        ctx.keypoints = providers.keypoints.keypoints(sample, &ctx.frame)?;
        let first_keypoints = ctx
            .keypoints
            .clone()
            .ok_or(AnalysisError::MissingKeypoints { frame: 0 })?;

        let orientation = orientation::classify(&first_keypoints, self.config.front_threshold)?;
        let policy = TrackingPolicy::for_orientation(orientation);
        info!("{}: orientation {}", sample.name, orientation);

        let mask_of_interest = match providers.mask_of_interest.as_mut() {
            Some(p) => p.mask_of_interest(orientation)?,
            None => None,
        };
        if policy.computes_area {
            ctx.mask = providers.masks.mask(sample, &ctx.frame)?;
        }

        let mut summary = AnnotatedFrame::new(ctx.frame.image.clone());
        if let Some(mask) = &ctx.mask {
            summary.push(Annotation::MaskOverlay(mask.clone()));
        }
        if let Some(mask) = &mask_of_interest {
            summary.push(Annotation::MaskOverlay(mask.clone()));
        }
        summary.push(Annotation::Skeleton(first_keypoints));

        let mut sink = match vis_path {
            Some(path) => Some(open_sink(
                path,
                source.is_still(),
                source.dimensions(),
                self.config.analyse_rate,
            )?),
            None => None,
        };

        let mut measurements = Vec::new();
        let mut current = Some(ctx);
        while let Some(ctx) = current.take() {
            let measurement = measure_frame(&ctx, policy, mask_of_interest.as_ref());
            if let Some(sink) = sink.as_mut() {
                let annotated = annotate_frame(sample, &ctx, policy);
                sink.push(&self.renderer.render(&annotated))?;
            }
            measurements.push(measurement);

            let next_index = ctx.index() + stride;
            current = match source.read_frame(next_index)? {
                Some(frame) => Some(self.load_context(sample, frame, policy, providers)?),
                None => None,
            };
        }

        if let Some(sink) = sink.as_mut() {
            sink.finish()?;
        }

        let reduction = reducer::reduce(orientation, policy, &measurements)?;
        annotate_summary(&mut summary, sample, &reduction);
        info!(
            "{}: {} frames analysed (stride {})",
            sample.name,
            measurements.len(),
            stride
        );

        Ok(SampleAnalysis {
            sample: sample.name.clone(),
            orientation,
            reduction,
            measurements,
            stride,
            summary,
        })
    }

    fn load_context(
        &self,
        sample: &Sample,
        frame: Frame,
        policy: &TrackingPolicy,
        providers: &mut Providers,
    ) -> Result<FrameContext> {
        let mut ctx = FrameContext::new(frame);
        ctx.keypoints = providers.keypoints.keypoints(sample, &ctx.frame)?;
        if policy.computes_area {
            ctx.mask = providers.masks.mask(sample, &ctx.frame)?;
        }
        Ok(ctx)
    }
}

fn measure_frame(
    ctx: &FrameContext,
    policy: &TrackingPolicy,
    mask_of_interest: Option<&Mask>,
) -> FrameMeasurement {
    let index = ctx.index();
    debug!("Frame {} at {:.0} ms", index, ctx.timestamp_ms());
    if ctx.keypoints.is_none() {
        warn!("Frame {}: no keypoints", index);
    }

    let area = match (&ctx.mask, policy.computes_area) {
        (Some(mask), true) => Some(mask.area()),
        (None, true) => {
            warn!("Frame {}: no mask, area skipped", index);
            None
        }
        _ => None,
    };
    let area_of_interest = match (&ctx.mask, mask_of_interest, policy.computes_area) {
        (Some(mask), Some(interest), true) => {
            let overlap = mask.intersection_area(interest);
            if overlap.is_none() {
                warn!(
                    "Frame {}: mask of interest is {}x{}, frame mask is {}x{}",
                    index,
                    interest.width(),
                    interest.height(),
                    mask.width(),
                    mask.height()
                );
            }
            overlap
        }
        _ => None,
    };

    let positions = policy
        .keypoints
        .iter()
        .map(|kp| {
            let p = ctx.keypoint(*kp).map(|p| p.rounded());
            if p.is_none() && ctx.keypoints.is_some() {
                debug!("Frame {}: {} not detected", index, kp);
            }
            p
        })
        .collect();

    let angles = policy
        .angles
        .iter()
        .map(|angle| {
            let value = ctx.keypoints.as_ref().and_then(|k| angle.measure(k));
            if value.is_none() && ctx.keypoints.is_some() {
                debug!("Frame {}: {} undefined", index, angle);
            }
            value
        })
        .collect();

    FrameMeasurement {
        index,
        area,
        area_of_interest,
        positions,
        angles,
    }
}

fn annotate_frame(sample: &Sample, ctx: &FrameContext, policy: &TrackingPolicy) -> AnnotatedFrame {
    let mut annotated = AnnotatedFrame::new(ctx.frame.image.clone());
    annotated.label(sample.name.clone(), 10, 20, LABEL_COLOR);
    if let Some(keypoints) = &ctx.keypoints {
        for angle in policy.angles {
            let [a, b, c] = angle.points();
            if let (Some(a), Some(b), Some(c), Some(degrees)) = (
                keypoints.get(a),
                keypoints.get(b),
                keypoints.get(c),
                angle.measure(keypoints),
            ) {
                annotated.push(Annotation::Angle {
                    points: [a, b, c],
                    degrees,
                });
            }
        }
    }
    annotated
}

fn annotate_summary(summary: &mut AnnotatedFrame, sample: &Sample, reduction: &Reduction) {
    if let Some(area) = &reduction.area {
        summary.label(format!("Area Mean:   {:7}", area.mean as i64), 10, 70, STATS_COLOR);
        summary.label(format!("Area STD:    {:7}", area.std as i64), 10, 120, STATS_COLOR);
        if let Some(interest) = &area.interest {
            summary.label(format!("Area I Mean: {:7}", interest.mean), 10, 170, STATS_COLOR);
            summary.label(
                format!("Area I STD:  {:7}", interest.std as i64),
                10,
                220,
                STATS_COLOR,
            );
        }
    }
    for track in &reduction.tracks {
        if let Some(stability) = &track.stability {
            summary.push(Annotation::StabilityCircle {
                center: stability.centroid.rounded(),
                radius: stability.max_distance,
            });
        }
        summary.push(Annotation::TrackPoints(track.detected().collect()));
    }
    summary.label(sample.name.clone(), 10, 20, LABEL_COLOR);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keypoints::{Keypoint, KeypointSet, Point};
    use crate::orientation::tests::{front_rider, side_rider};
    use crate::policy::JointAngle;
    use crate::providers::{KeypointProvider, MaskOfInterestProvider, MaskProvider};
    use crate::video_processor::{SampleKind, StillImageSource};
    use image::RgbImage;
    use std::cell::RefCell;
    use std::path::PathBuf;
    use std::rc::Rc;

    /// Synthetic video: `frames` frames at `fps`.
    struct SyntheticVideo {
        fps: f64,
        frames: usize,
    }

    impl FrameSource for SyntheticVideo {
        fn fps(&self) -> Option<f64> {
            Some(self.fps)
        }

        fn dimensions(&self) -> (u32, u32) {
            (8, 8)
        }

        fn read_frame(&mut self, index: usize) -> Result<Option<Frame>> {
            if index >= self.frames {
                return Ok(None);
            }
            Ok(Some(Frame {
                index,
                image: RgbImage::new(8, 8),
                timestamp_ms: index as f64 / self.fps * 1000.0,
            }))
        }
    }

    /// Same keypoints for every frame, recording which frames were asked for.
    struct FixedKeypoints {
        keypoints: Option<KeypointSet>,
        requested: Rc<RefCell<Vec<usize>>>,
        finished: Rc<RefCell<bool>>,
    }

    impl KeypointProvider for FixedKeypoints {
        fn keypoints(&mut self, _sample: &Sample, frame: &Frame) -> Result<Option<KeypointSet>> {
            self.requested.borrow_mut().push(frame.index);
            Ok(self.keypoints.clone())
        }

        fn finish_sample(&mut self, _sample: &Sample) -> Result<()> {
            *self.finished.borrow_mut() = true;
            Ok(())
        }
    }

    struct FixedMask(Option<Mask>);

    impl MaskProvider for FixedMask {
        fn mask(&mut self, _sample: &Sample, _frame: &Frame) -> Result<Option<Mask>> {
            Ok(self.0.clone())
        }
    }

    struct FixedInterest(Mask);

    impl MaskOfInterestProvider for FixedInterest {
        fn mask_of_interest(&mut self, _orientation: Orientation) -> Result<Option<Mask>> {
            Ok(Some(self.0.clone()))
        }
    }

    struct Harness {
        providers: Providers,
        requested: Rc<RefCell<Vec<usize>>>,
        finished: Rc<RefCell<bool>>,
    }

    fn harness(keypoints: Option<KeypointSet>, mask: Option<Mask>) -> Harness {
        let requested = Rc::new(RefCell::new(Vec::new()));
        let finished = Rc::new(RefCell::new(false));
        Harness {
            providers: Providers {
                keypoints: Box::new(FixedKeypoints {
                    keypoints,
                    requested: requested.clone(),
                    finished: finished.clone(),
                }),
                masks: Box::new(FixedMask(mask)),
                mask_of_interest: None,
            },
            requested,
            finished,
        }
    }

    fn analyzer() -> FrameStreamAnalyzer {
        FrameStreamAnalyzer::new(AnalysisConfig::default(), Renderer::without_text(0.2))
    }

    fn sample(name: &str, kind: SampleKind) -> Sample {
        Sample {
            name: name.to_string(),
            path: PathBuf::from(format!("{}.bin", name)),
            kind,
        }
    }

    /// Left-side rider with the hip at the origin.
    fn left_rider_at_origin() -> KeypointSet {
        KeypointSet::new()
            .with(Keypoint::LHip, 0.0, 0.0)
            .with(Keypoint::LShoulder, 10.0, -50.0)
            .with(Keypoint::LKnee, 20.0, 40.0)
            .with(Keypoint::LAnkle, 10.0, 80.0)
            .with(Keypoint::LElbow, -20.0, -30.0)
            .with(Keypoint::LWrist, -50.0, -20.0)
            .with(Keypoint::RHip, 5.0, 0.0)
            .with(Keypoint::RWrist, -45.0, -20.0)
            .with(Keypoint::Neck, 12.0, -55.0)
    }

    #[test]
    fn test_identical_side_frames_are_perfectly_stable() {
        let kps = left_rider_at_origin();
        let mut h = harness(Some(kps.clone()), None);
        let mut source = SyntheticVideo { fps: 10.0, frames: 3 };

        let result = analyzer()
            .analyze(&sample("vid_side", SampleKind::Video), &mut source, &mut h.providers, None)
            .unwrap();

        assert_eq!(result.orientation, Orientation::LeftSide);
        assert_eq!(result.frames_processed(), 3);
        assert!(result.reduction.area.is_none());
        for track in &result.reduction.tracks {
            let s = track.stability.as_ref().unwrap();
            assert_eq!(s.mean_distance, 0.0);
            assert_eq!(s.std_distance, 0.0);
        }
        let hip_track = &result.reduction.tracks[0];
        assert_eq!(hip_track.keypoint, Keypoint::LHip);
        assert_eq!(hip_track.points, vec![Some(Point::new(0.0, 0.0)); 3]);

        let expected_hip = JointAngle::LeftHip.measure(&kps).unwrap();
        let hip_angles = &result.reduction.angles[&JointAngle::LeftHip];
        assert_eq!(hip_angles, &vec![Some(expected_hip); 3]);
        assert_eq!(result.reduction.angles.len(), 4);
        assert!(*h.finished.borrow());
    }

    #[test]
    fn test_stride_follows_analyse_rate() {
        let mut h = harness(Some(side_rider(100.0)), None);
        let mut source = SyntheticVideo { fps: 30.0, frames: 9 };

        let result = analyzer()
            .analyze(&sample("vid", SampleKind::Video), &mut source, &mut h.providers, None)
            .unwrap();

        assert_eq!(result.stride, 3);
        assert_eq!(*h.requested.borrow(), vec![0, 3, 6]);
        let indices: Vec<usize> = result.measurements.iter().map(|m| m.index).collect();
        assert_eq!(indices, vec![0, 3, 6]);
        assert_eq!(result.orientation, Orientation::RightSide);
    }

    #[test]
    fn test_front_still_measures_area() {
        let mut h = harness(Some(front_rider()), Some(Mask::filled(100, 100, 255)));
        let mut interest = Mask::filled(100, 100, 0);
        for x in 0..10 {
            interest.set(x, 0, true);
        }
        h.providers.mask_of_interest = Some(Box::new(FixedInterest(interest)));
        let mut source = StillImageSource::from_image(RgbImage::new(100, 100));

        let result = analyzer()
            .analyze(&sample("front_000", SampleKind::Image), &mut source, &mut h.providers, None)
            .unwrap();

        assert_eq!(result.orientation, Orientation::Front);
        assert_eq!(result.frames_processed(), 1);
        let area = result.reduction.area.unwrap();
        assert_eq!(area.mean, 10000.0);
        assert_eq!(area.std, 0.0);
        assert_eq!(area.interest.unwrap().mean, 10);
        assert_eq!(result.reduction.tracks.len(), 5);
        assert!(result.reduction.angles.is_empty());
        assert!(result
            .summary
            .ops()
            .iter()
            .any(|op| matches!(op, Annotation::StabilityCircle { .. })));
    }

    #[test]
    fn test_missing_mask_leaves_area_absent() {
        let mut h = harness(Some(front_rider()), None);
        let mut source = StillImageSource::from_image(RgbImage::new(10, 10));
        let result = analyzer()
            .analyze(&sample("front", SampleKind::Image), &mut source, &mut h.providers, None)
            .unwrap();
        assert_eq!(result.measurements[0].area, None);
        assert!(result.reduction.area.is_none());
    }

    #[test]
    fn test_first_frame_without_keypoints_fails() {
        let mut h = harness(None, None);
        let mut source = SyntheticVideo { fps: 10.0, frames: 3 };
        let err = analyzer()
            .analyze(&sample("vid", SampleKind::Video), &mut source, &mut h.providers, None)
            .unwrap_err();
        assert!(matches!(err, AnalysisError::MissingKeypoints { frame: 0 }));
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_unclassifiable_first_frame_fails() {
        let kps = KeypointSet::new()
            .with(Keypoint::Neck, 50.0, 10.0)
            .with(Keypoint::Nose, 50.0, 0.0);
        let mut h = harness(Some(kps), None);
        let mut source = SyntheticVideo { fps: 10.0, frames: 1 };
        let err = analyzer()
            .analyze(&sample("vid", SampleKind::Video), &mut source, &mut h.providers, None)
            .unwrap_err();
        assert!(matches!(err, AnalysisError::Orientation(_)));
        assert!(*h.finished.borrow());
    }

    #[test]
    fn test_empty_video_is_no_data() {
        let mut h = harness(Some(front_rider()), None);
        let mut source = SyntheticVideo { fps: 10.0, frames: 0 };
        let err = analyzer()
            .analyze(&sample("vid", SampleKind::Video), &mut source, &mut h.providers, None)
            .unwrap_err();
        assert!(matches!(err, AnalysisError::NoData));
    }

    #[test]
    fn test_still_visualization_written() {
        let dir = tempfile::tempdir().unwrap();
        let vis = dir.path().join("vis_side.jpg");
        let mut h = harness(Some(left_rider_at_origin()), None);
        let mut source = StillImageSource::from_image(RgbImage::new(16, 16));
        analyzer()
            .analyze(&sample("side", SampleKind::Image), &mut source, &mut h.providers, Some(&vis))
            .unwrap();
        assert!(vis.exists());
    }
    struct KeypointsByFrame(fn(usize) -> Option<KeypointSet>);

    impl KeypointProvider for KeypointsByFrame {
        fn keypoints(&mut self, _sample: &Sample, frame: &Frame) -> Result<Option<KeypointSet>> {
            Ok((self.0)(frame.index))
        }
    }

    struct MaskByFrame(fn(usize) -> Option<Mask>);

    impl MaskProvider for MaskByFrame {
        fn mask(&mut self, _sample: &Sample, frame: &Frame) -> Result<Option<Mask>> {
            Ok((self.0)(frame.index))
        }
    }

    #[test]
    fn test_gap_in_later_frame_is_absent() {
        let mut providers = Providers {
            keypoints: Box::new(KeypointsByFrame(|i| (i != 3).then(front_rider))),
            masks: Box::new(MaskByFrame(|i| match i {
                0 => Some(Mask::filled(8, 8, 255)),
                6 => Some(Mask::filled(8, 8, 0)),
                _ => None,
            })),
            mask_of_interest: None,
        };
        let mut source = SyntheticVideo { fps: 30.0, frames: 9 };

        let result = analyzer()
            .analyze(&sample("vid_front", SampleKind::Video), &mut source, &mut providers, None)
            .unwrap();

        assert_eq!(result.frames_processed(), 3);
        let gap = &result.measurements[1];
        assert_eq!(gap.index, 3);
        assert!(gap.positions.iter().all(Option::is_none));
        assert_eq!(gap.area, None);

        let area = result.reduction.area.unwrap();
        assert_eq!(area.mean, 32.0);
        assert_eq!(area.std, 32.0);
        for track in &result.reduction.tracks {
            assert_eq!(track.points.len(), 3);
            assert_eq!(track.points[1], None);
            assert_eq!(track.stability.as_ref().unwrap().mean_distance, 0.0);
        }
    }

    #[test]
    fn test_mismatched_mask_of_interest_gives_no_interest_area() {
        let mut h = harness(Some(front_rider()), Some(Mask::filled(100, 100, 255)));
        h.providers.mask_of_interest = Some(Box::new(FixedInterest(Mask::filled(50, 50, 255))));
        let mut source = StillImageSource::from_image(RgbImage::new(100, 100));

        let result = analyzer()
            .analyze(&sample("front", SampleKind::Image), &mut source, &mut h.providers, None)
            .unwrap();

        assert_eq!(result.measurements[0].area, Some(10000));
        assert_eq!(result.measurements[0].area_of_interest, None);
        assert!(result.reduction.area.unwrap().interest.is_none());
    }

    #[test]
    fn test_vertical_left_leg_repeated_over_three_frames() {
        let kps = KeypointSet::new()
            .with(Keypoint::LHip, 0.0, 0.0)
            .with(Keypoint::LShoulder, 0.0, 10.0)
            .with(Keypoint::LKnee, 0.0, -10.0)
            .with(Keypoint::RHip, 4.0, 0.0)
            .with(Keypoint::LWrist, -40.0, 10.0)
            .with(Keypoint::RWrist, -36.0, 10.0);
        let mut h = harness(Some(kps), None);
        let mut source = SyntheticVideo { fps: 10.0, frames: 3 };

        let result = analyzer()
            .analyze(&sample("vid_side", SampleKind::Video), &mut source, &mut h.providers, None)
            .unwrap();

        assert_eq!(result.orientation, Orientation::LeftSide);
        let hip = &result.reduction.tracks[0];
        assert_eq!(hip.keypoint, Keypoint::LHip);
        let s = hip.stability.as_ref().unwrap();
        assert_eq!(s.mean_distance, 0.0);
        assert_eq!(s.std_distance, 0.0);

        let hip_angles = &result.reduction.angles[&JointAngle::LeftHip];
        assert_eq!(hip_angles.len(), 3);
        for angle in hip_angles {
            approx::assert_abs_diff_eq!(angle.unwrap(), 180.0, epsilon = 1e-9);
        }
        assert_eq!(result.reduction.angles[&JointAngle::LeftKnee], vec![None; 3]);
    }

    /// Estimator whose only detection cannot be classified.
    struct DegeneratePose;

    impl crate::providers::PoseEstimator for DegeneratePose {
        fn predict_keypoints(&mut self, _frame: &RgbImage) -> Result<Option<KeypointSet>> {
            Ok(Some(
                KeypointSet::new()
                    .with(Keypoint::Neck, 50.0, 10.0)
                    .with(Keypoint::Nose, 50.0, 0.0),
            ))
        }
    }

    #[test]
    fn test_failed_sample_still_saves_keypoint_cache() {
        let dir = tempfile::tempdir().unwrap();
        let mut providers = Providers {
            keypoints: Box::new(crate::providers::CachedPoseProvider::new(
                Box::new(DegeneratePose),
                dir.path(),
            )),
            masks: Box::new(FixedMask(None)),
            mask_of_interest: None,
        };
        let mut source = StillImageSource::from_image(RgbImage::new(8, 8));

        let err = analyzer()
            .analyze(&sample("rider", SampleKind::Image), &mut source, &mut providers, None)
            .unwrap_err();

        assert!(matches!(err, AnalysisError::Orientation(_)));
        let cached = std::fs::read_to_string(dir.path().join("rider.json")).unwrap();
        let entries: crate::keypoints::KeypointCacheFile = serde_json::from_str(&cached).unwrap();
        assert!(entries["0000000000"].is_some());
    }
}
