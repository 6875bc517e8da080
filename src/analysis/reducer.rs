// src/analysis/reducer.rs
//
// Turns the per-frame measurements of one sample into area and keypoint
// stability statistics.

use crate::error::{AnalysisError, Result};
use crate::geometry::mean_std;
use crate::keypoints::{Keypoint, Point};
use crate::orientation::Orientation;
use crate::policy::{JointAngle, TrackingPolicy};
use ndarray::{Array1, Array2, Axis};
use serde::Serialize;
use std::collections::BTreeMap;

/// Everything measured on one analysed frame, aligned with the tracking policy:
/// `positions[i]` belongs to `policy.keypoints[i]`, `angles[j]` to `policy.angles[j]`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrameMeasurement {
    pub index: usize,
    pub area: Option<u64>,
    pub area_of_interest: Option<u64>,
    pub positions: Vec<Option<Point>>,
    pub angles: Vec<Option<f64>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InterestSummary {
    #[serde(rename = "AREA_INTEREST_MEAN")]
    pub mean: i64,
    #[serde(rename = "AREA_INTEREST_STD")]
    pub std: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AreaSummary {
    #[serde(rename = "AREA_MEAN")]
    pub mean: f64,
    #[serde(rename = "AREA_STD")]
    pub std: f64,
    #[serde(flatten, skip_serializing_if = "Option::is_none")]
    pub interest: Option<InterestSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Stability {
    pub centroid: Point,
    pub mean_distance: f64,
    pub std_distance: f64,
    pub max_distance: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KeypointTrack {
    pub keypoint: Keypoint,
    /// One entry per analysed frame, `None` where the keypoint was not detected.
    pub points: Vec<Option<Point>>,
    /// `None` when the keypoint was never detected.
    pub stability: Option<Stability>,
}

impl KeypointTrack {
    pub fn detected(&self) -> impl Iterator<Item = Point> + '_ {
        self.points.iter().flatten().copied()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reduction {
    pub orientation: Orientation,
    pub area: Option<AreaSummary>,
    pub tracks: Vec<KeypointTrack>,
    pub angles: BTreeMap<JointAngle, Vec<Option<f64>>>,
}

pub fn reduce(
    orientation: Orientation,
    policy: &TrackingPolicy,
    measurements: &[FrameMeasurement],
) -> Result<Reduction> {
    if measurements.is_empty() {
        return Err(AnalysisError::NoData);
    }

    let area = if policy.computes_area {
        reduce_area(measurements)
    } else {
        None
    };

    let tracks = policy
        .keypoints
        .iter()
        .enumerate()
        .map(|(i, kp)| {
            let points: Vec<Option<Point>> = measurements
                .iter()
                .map(|m| m.positions.get(i).copied().flatten())
                .collect();
            let stability = stability(&points);
            KeypointTrack {
                keypoint: *kp,
                points,
                stability,
            }
        })
        .collect();

    let angles = policy
        .angles
        .iter()
        .enumerate()
        .map(|(j, angle)| {
            let series = measurements
                .iter()
                .map(|m| m.angles.get(j).copied().flatten())
                .collect();
            (*angle, series)
        })
        .collect();

    Ok(Reduction {
        orientation,
        area,
        tracks,
        angles,
    })
}

fn reduce_area(measurements: &[FrameMeasurement]) -> Option<AreaSummary> {
    let areas: Vec<f64> = measurements
        .iter()
        .filter_map(|m| m.area)
        .map(|a| a as f64)
        .collect();
    let (mean, std) = mean_std(&areas)?;

    let interest_values: Vec<f64> = measurements
        .iter()
        .filter_map(|m| m.area_of_interest)
        .map(|a| a as f64)
        .collect();
    let interest = mean_std(&interest_values).map(|(mean, std)| InterestSummary {
        mean: mean.round_ties_even() as i64,
        std,
    });

    Some(AreaSummary {
        mean,
        std,
        interest,
    })
}

/// Centroid of the detected positions and the spread of distances around it.
pub fn stability(points: &[Option<Point>]) -> Option<Stability> {
    let detected: Vec<f64> = points.iter().flatten().flat_map(|p| [p.x, p.y]).collect();
    let n = detected.len() / 2;
    let positions = Array2::from_shape_vec((n, 2), detected).ok()?;
    let centroid: Array1<f64> = positions.mean_axis(Axis(0))?;

    let distances: Vec<f64> = positions
        .axis_iter(Axis(0))
        .map(|row| {
            let d = &row - &centroid;
            d.dot(&d).sqrt()
        })
        .collect();
    let (mean_distance, std_distance) = mean_std(&distances)?;
    let max_distance = distances.iter().copied().fold(0.0, f64::max);

    Some(Stability {
        centroid: Point::new(centroid[0], centroid[1]),
        mean_distance,
        std_distance,
        max_distance,
    })
}
