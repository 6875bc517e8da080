// src/orientation.rs
//
// Camera-relative facing of the rider, decided from one frame's keypoints.
//
// A rider facing the camera has left/right landmark pairs stacked on the
// body's centerline, so their midpoints barely spread horizontally. Seen from
// the side the pairs separate and the spread grows. The handlebars are in
// front of the hips, so the wrist-vs-hip offset tells which side we see.

use crate::error::OrientationError;
use crate::geometry::{mean_std, BoundingBox};
use crate::keypoints::{Keypoint, KeypointSet, Point};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

pub const DEFAULT_FRONT_THRESHOLD: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Orientation {
    #[serde(rename = "FRONT")]
    Front,
    #[serde(rename = "L-SIDE")]
    LeftSide,
    #[serde(rename = "R-SIDE")]
    RightSide,
}

impl Orientation {
    pub const ALL: [Orientation; 3] = [
        Orientation::Front,
        Orientation::LeftSide,
        Orientation::RightSide,
    ];

    /// Persisted identifier, also the file stem of the orientation's mask of interest.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Front => "FRONT",
            Self::LeftSide => "L-SIDE",
            Self::RightSide => "R-SIDE",
        }
    }
}

impl fmt::Display for Orientation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Orientation {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL.iter().copied().find(|o| o.name() == s).ok_or(())
    }
}

/// Horizontal spread of the centerline points, as a percentage of the keypoint box width.
pub fn centerline_spread(keypoints: &KeypointSet) -> Result<f64, OrientationError> {
    if keypoints.is_empty() {
        return Err(OrientationError::NoKeypoints);
    }

    let mut center_points: Vec<Point> = Keypoint::LEFT
        .iter()
        .zip(Keypoint::RIGHT.iter())
        .filter_map(|(l, r)| match (keypoints.get(*l), keypoints.get(*r)) {
            (Some(a), Some(b)) => Some(a.midpoint(&b)),
            _ => None,
        })
        .collect();
    center_points.extend(Keypoint::CENTER.iter().filter_map(|c| keypoints.get(*c)));

    let xs: Vec<f64> = center_points.iter().map(|p| p.x).collect();
    let (_, std) = mean_std(&xs).ok_or(OrientationError::NoCenterline)?;

    let width = BoundingBox::from_points(&keypoints.points())
        .map(|b| b.width())
        .unwrap_or(0.0);
    if width <= 0.0 {
        return Err(OrientationError::DegenerateBoundingBox);
    }

    Ok(std * 100.0 / width)
}

/// Classify FRONT / L-SIDE / R-SIDE.
pub fn classify(keypoints: &KeypointSet, front_threshold: f64) -> Result<Orientation, OrientationError> {
    let spread = centerline_spread(keypoints)?;
    debug!("Centerline spread {:.2}% (threshold {:.2})", spread, front_threshold);

    if spread < front_threshold {
        return Ok(Orientation::Front);
    }

    let need = |kp: Keypoint| {
        keypoints
            .get(kp)
            .ok_or(OrientationError::MissingLandmarks(kp.name()))
    };
    let wrists = need(Keypoint::LWrist)?.midpoint(&need(Keypoint::RWrist)?);
    let hips = need(Keypoint::LHip)?.midpoint(&need(Keypoint::RHip)?);

    if wrists.x - hips.x < 0.0 {
        Ok(Orientation::LeftSide)
    } else {
        Ok(Orientation::RightSide)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Rider facing the camera, centerline at x = 100.
    pub(crate) fn front_rider() -> KeypointSet {
        KeypointSet::new()
            .with(Keypoint::Nose, 100.0, 20.0)
            .with(Keypoint::Neck, 100.0, 40.0)
            .with(Keypoint::LShoulder, 130.0, 45.0)
            .with(Keypoint::RShoulder, 70.0, 45.0)
            .with(Keypoint::LElbow, 140.0, 80.0)
            .with(Keypoint::RElbow, 60.0, 80.0)
            .with(Keypoint::LWrist, 125.0, 110.0)
            .with(Keypoint::RWrist, 75.0, 110.0)
            .with(Keypoint::LHip, 115.0, 130.0)
            .with(Keypoint::RHip, 85.0, 130.0)
            .with(Keypoint::LKnee, 120.0, 180.0)
            .with(Keypoint::RKnee, 80.0, 180.0)
    }

    /// Rider seen from the side with the handlebars at smaller x than the hips.
    pub(crate) fn side_rider(handlebar_dx: f64) -> KeypointSet {
        KeypointSet::new()
            .with(Keypoint::Nose, 200.0 + handlebar_dx * 0.8, 30.0)
            .with(Keypoint::Neck, 200.0 + handlebar_dx * 0.5, 50.0)
            .with(Keypoint::LShoulder, 200.0 + handlebar_dx * 0.5, 55.0)
            .with(Keypoint::RShoulder, 205.0 + handlebar_dx * 0.5, 55.0)
            .with(Keypoint::LWrist, 200.0 + handlebar_dx, 100.0)
            .with(Keypoint::RWrist, 205.0 + handlebar_dx, 100.0)
            .with(Keypoint::LHip, 200.0, 120.0)
            .with(Keypoint::RHip, 205.0, 120.0)
            .with(Keypoint::LKnee, 200.0 + handlebar_dx * 0.6, 170.0)
            .with(Keypoint::RKnee, 205.0 + handlebar_dx * 0.3, 175.0)
    }

    #[test]
    fn test_front_when_pairs_share_centerline() {
        assert_eq!(
            classify(&front_rider(), DEFAULT_FRONT_THRESHOLD),
            Ok(Orientation::Front)
        );
    }

    #[test]
    fn test_front_tolerates_small_jitter() {
        let jittered = front_rider()
            .with(Keypoint::Nose, 101.0, 20.0)
            .with(Keypoint::Neck, 99.5, 40.0);
        assert_eq!(
            classify(&jittered, DEFAULT_FRONT_THRESHOLD),
            Ok(Orientation::Front)
        );
    }

    #[test]
    fn test_left_side_when_wrists_before_hips() {
        assert_eq!(
            classify(&side_rider(-100.0), DEFAULT_FRONT_THRESHOLD),
            Ok(Orientation::LeftSide)
        );
    }

    #[test]
    fn test_right_side_mirror() {
        assert_eq!(
            classify(&side_rider(100.0), DEFAULT_FRONT_THRESHOLD),
            Ok(Orientation::RightSide)
        );
    }

    #[test]
    fn test_degenerate_box_is_undetermined() {
        let set = KeypointSet::new()
            .with(Keypoint::Neck, 50.0, 10.0)
            .with(Keypoint::Nose, 50.0, 0.0);
        assert_eq!(
            classify(&set, DEFAULT_FRONT_THRESHOLD),
            Err(OrientationError::DegenerateBoundingBox)
        );
    }

    #[test]
    fn test_no_centerline_points() {
        let set = KeypointSet::new()
            .with(Keypoint::LKnee, 10.0, 10.0)
            .with(Keypoint::RAnkle, 50.0, 30.0);
        assert_eq!(
            classify(&set, DEFAULT_FRONT_THRESHOLD),
            Err(OrientationError::NoCenterline)
        );
    }

    #[test]
    fn test_side_needs_wrists_and_hips() {
        let mut set = side_rider(-100.0);
        set.remove(Keypoint::RWrist);
        assert_eq!(
            classify(&set, DEFAULT_FRONT_THRESHOLD),
            Err(OrientationError::MissingLandmarks("RWrist"))
        );
    }

    #[test]
    fn test_empty_set() {
        assert_eq!(
            classify(&KeypointSet::new(), DEFAULT_FRONT_THRESHOLD),
            Err(OrientationError::NoKeypoints)
        );
    }

    #[test]
    fn test_orientation_names_roundtrip() {
        for o in Orientation::ALL {
            assert_eq!(o.name().parse::<Orientation>(), Ok(o));
        }
        assert_eq!(
            serde_json::to_string(&Orientation::LeftSide).unwrap(),
            "\"L-SIDE\""
        );
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        fn mirrored(keypoints: &KeypointSet) -> KeypointSet {
            let mut out = KeypointSet::new();
            for (kp, p) in keypoints.iter() {
                out.insert(kp, Point::new(-p.x, p.y));
            }
            out
        }

        proptest! {
            #[test]
            fn prop_coincident_midpoints_are_front(
                cx in -500.0f64..500.0,
                half_widths in prop::collection::vec(1.0f64..200.0, 8),
                ys in prop::collection::vec(-500.0f64..500.0, 8),
            ) {
                let mut set = KeypointSet::new()
                    .with(Keypoint::Neck, cx, -600.0)
                    .with(Keypoint::Nose, cx, -650.0);
                for (i, (l, r)) in Keypoint::LEFT.iter().zip(Keypoint::RIGHT.iter()).enumerate() {
                    set.insert(*l, Point::new(cx + half_widths[i], ys[i]));
                    set.insert(*r, Point::new(cx - half_widths[i], ys[i]));
                }
                prop_assert_eq!(classify(&set, DEFAULT_FRONT_THRESHOLD), Ok(Orientation::Front));
            }

            #[test]
            fn prop_mirror_swaps_sides(dx in 20.0f64..200.0) {
                let left = side_rider(-dx);
                prop_assert_eq!(classify(&left, DEFAULT_FRONT_THRESHOLD), Ok(Orientation::LeftSide));
                prop_assert_eq!(
                    classify(&mirrored(&left), DEFAULT_FRONT_THRESHOLD),
                    Ok(Orientation::RightSide)
                );
                let right = side_rider(dx);
                prop_assert_eq!(classify(&right, DEFAULT_FRONT_THRESHOLD), Ok(Orientation::RightSide));
                prop_assert_eq!(
                    classify(&mirrored(&right), DEFAULT_FRONT_THRESHOLD),
                    Ok(Orientation::LeftSide)
                );
            }
        }
    }
}
