// src/policy.rs

use crate::geometry;
use crate::keypoints::{Keypoint, KeypointSet};
use crate::orientation::Orientation;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Joint angles measured from three keypoints, the vertex in the middle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum JointAngle {
    #[serde(rename = "LHip_Angle")]
    LeftHip,
    #[serde(rename = "LKnee_Angle")]
    LeftKnee,
    #[serde(rename = "LShoulder_Angle")]
    LeftShoulder,
    #[serde(rename = "LElbow_Angle")]
    LeftElbow,
    #[serde(rename = "RHip_Angle")]
    RightHip,
    #[serde(rename = "RKnee_Angle")]
    RightKnee,
    #[serde(rename = "RShoulder_Angle")]
    RightShoulder,
    #[serde(rename = "RElbow_Angle")]
    RightElbow,
}

impl JointAngle {
    pub const ALL: [JointAngle; 8] = [
        JointAngle::LeftHip,
        JointAngle::LeftKnee,
        JointAngle::LeftShoulder,
        JointAngle::LeftElbow,
        JointAngle::RightHip,
        JointAngle::RightKnee,
        JointAngle::RightShoulder,
        JointAngle::RightElbow,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::LeftHip => "LHip_Angle",
            Self::LeftKnee => "LKnee_Angle",
            Self::LeftShoulder => "LShoulder_Angle",
            Self::LeftElbow => "LElbow_Angle",
            Self::RightHip => "RHip_Angle",
            Self::RightKnee => "RKnee_Angle",
            Self::RightShoulder => "RShoulder_Angle",
            Self::RightElbow => "RElbow_Angle",
        }
    }

    /// `[end, vertex, end]`
    pub fn points(&self) -> [Keypoint; 3] {
        use Keypoint::*;
        match self {
            Self::LeftHip => [LKnee, LHip, LShoulder],
            Self::LeftKnee => [LAnkle, LKnee, LHip],
            Self::LeftShoulder => [LHip, LShoulder, LElbow],
            Self::LeftElbow => [LShoulder, LElbow, LWrist],
            Self::RightHip => [RKnee, RHip, RShoulder],
            Self::RightKnee => [RAnkle, RKnee, RHip],
            Self::RightShoulder => [RHip, RShoulder, RElbow],
            Self::RightElbow => [RShoulder, RElbow, RWrist],
        }
    }

    /// Degrees, or `None` if a point is missing or coincides with the vertex.
    pub fn measure(&self, keypoints: &KeypointSet) -> Option<f64> {
        let [a, vertex, c] = self.points();
        geometry::angle(&keypoints.get(a)?, &keypoints.get(vertex)?, &keypoints.get(c)?)
    }
}

impl fmt::Display for JointAngle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What gets measured for a given orientation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackingPolicy {
    pub keypoints: &'static [Keypoint],
    pub angles: &'static [JointAngle],
    pub computes_area: bool,
}

const FRONT: TrackingPolicy = TrackingPolicy {
    keypoints: &[
        Keypoint::Neck,
        Keypoint::LShoulder,
        Keypoint::RShoulder,
        Keypoint::RKnee,
        Keypoint::LKnee,
    ],
    angles: &[],
    computes_area: true,
};

const LEFT_SIDE: TrackingPolicy = TrackingPolicy {
    keypoints: &[Keypoint::LHip, Keypoint::LShoulder, Keypoint::LKnee],
    angles: &[
        JointAngle::LeftHip,
        JointAngle::LeftKnee,
        JointAngle::LeftShoulder,
        JointAngle::LeftElbow,
    ],
    computes_area: false,
};

const RIGHT_SIDE: TrackingPolicy = TrackingPolicy {
    keypoints: &[Keypoint::RHip, Keypoint::RShoulder, Keypoint::RKnee],
    angles: &[
        JointAngle::RightHip,
        JointAngle::RightKnee,
        JointAngle::RightShoulder,
        JointAngle::RightElbow,
    ],
    computes_area: false,
};

impl TrackingPolicy {
    pub fn for_orientation(orientation: Orientation) -> &'static TrackingPolicy {
        match orientation {
            Orientation::Front => &FRONT,
            Orientation::LeftSide => &LEFT_SIDE,
            Orientation::RightSide => &RIGHT_SIDE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_front_tracks_area_not_angles() {
        let policy = TrackingPolicy::for_orientation(Orientation::Front);
        assert!(policy.computes_area);
        assert!(policy.angles.is_empty());
        assert_eq!(policy.keypoints.len(), 5);
        assert_eq!(policy.keypoints[0], Keypoint::Neck);
    }

    #[test]
    fn test_sides_track_three_points_four_angles() {
        for o in [Orientation::LeftSide, Orientation::RightSide] {
            let policy = TrackingPolicy::for_orientation(o);
            assert!(!policy.computes_area);
            assert_eq!(policy.keypoints.len(), 3);
            assert_eq!(policy.angles.len(), 4);
        }
        let left = TrackingPolicy::for_orientation(Orientation::LeftSide);
        assert!(left
            .angles
            .iter()
            .all(|a| a.points().iter().all(|kp| kp.name().starts_with('L'))));
    }

    #[test]
    fn test_measure_angle() {
        let kps = KeypointSet::new()
            .with(Keypoint::LKnee, 0.0, -10.0)
            .with(Keypoint::LHip, 0.0, 0.0)
            .with(Keypoint::LShoulder, 10.0, 0.0);
        let deg = JointAngle::LeftHip.measure(&kps).unwrap();
        assert!((deg - 90.0).abs() < 1e-9);
        assert!(JointAngle::LeftKnee.measure(&kps).is_none());
    }

    #[test]
    fn test_angle_names_serialize() {
        assert_eq!(
            serde_json::to_string(&JointAngle::RightElbow).unwrap(),
            "\"RElbow_Angle\""
        );
        assert_eq!(JointAngle::ALL.len(), 8);
    }
}
