// src/keypoints.rs
//
// Named body landmarks and the JSON formats they travel in.

use crate::error::{AnalysisError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// The 18-landmark body vocabulary used by every pose feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Keypoint {
    Nose,
    Neck,
    RShoulder,
    RElbow,
    RWrist,
    LShoulder,
    LElbow,
    LWrist,
    RHip,
    RKnee,
    RAnkle,
    LHip,
    LKnee,
    LAnkle,
    REye,
    LEye,
    REar,
    LEar,
}

impl Keypoint {
    pub const ALL: [Keypoint; 18] = [
        Keypoint::Nose,
        Keypoint::Neck,
        Keypoint::RShoulder,
        Keypoint::RElbow,
        Keypoint::RWrist,
        Keypoint::LShoulder,
        Keypoint::LElbow,
        Keypoint::LWrist,
        Keypoint::RHip,
        Keypoint::RKnee,
        Keypoint::RAnkle,
        Keypoint::LHip,
        Keypoint::LKnee,
        Keypoint::LAnkle,
        Keypoint::REye,
        Keypoint::LEye,
        Keypoint::REar,
        Keypoint::LEar,
    ];

    /// Left/right counterparts, zipped index by index.
    pub const LEFT: [Keypoint; 8] = [
        Keypoint::LWrist,
        Keypoint::LElbow,
        Keypoint::LShoulder,
        Keypoint::LAnkle,
        Keypoint::LKnee,
        Keypoint::LHip,
        Keypoint::LEar,
        Keypoint::LEye,
    ];
    pub const RIGHT: [Keypoint; 8] = [
        Keypoint::RWrist,
        Keypoint::RElbow,
        Keypoint::RShoulder,
        Keypoint::RAnkle,
        Keypoint::RKnee,
        Keypoint::RHip,
        Keypoint::REar,
        Keypoint::REye,
    ];
    pub const CENTER: [Keypoint; 2] = [Keypoint::Neck, Keypoint::Nose];

    /// Limb chains drawn as the skeleton overlay.
    pub const SKELETON: [[Keypoint; 4]; 6] = [
        [Keypoint::LWrist, Keypoint::LElbow, Keypoint::LShoulder, Keypoint::Neck],
        [Keypoint::RWrist, Keypoint::RElbow, Keypoint::RShoulder, Keypoint::Neck],
        [Keypoint::LAnkle, Keypoint::LKnee, Keypoint::LHip, Keypoint::Neck],
        [Keypoint::RAnkle, Keypoint::RKnee, Keypoint::RHip, Keypoint::Neck],
        [Keypoint::LEar, Keypoint::LEye, Keypoint::Nose, Keypoint::Neck],
        [Keypoint::REar, Keypoint::REye, Keypoint::Nose, Keypoint::Neck],
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Nose => "Nose",
            Self::Neck => "Neck",
            Self::RShoulder => "RShoulder",
            Self::RElbow => "RElbow",
            Self::RWrist => "RWrist",
            Self::LShoulder => "LShoulder",
            Self::LElbow => "LElbow",
            Self::LWrist => "LWrist",
            Self::RHip => "RHip",
            Self::RKnee => "RKnee",
            Self::RAnkle => "RAnkle",
            Self::LHip => "LHip",
            Self::LKnee => "LKnee",
            Self::LAnkle => "LAnkle",
            Self::REye => "REye",
            Self::LEye => "LEye",
            Self::REar => "REar",
            Self::LEar => "LEar",
        }
    }
}

impl fmt::Display for Keypoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Keypoint {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::ALL.iter().copied().find(|kp| kp.name() == s).ok_or(())
    }
}

/// 2D pixel position.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn midpoint(&self, other: &Point) -> Point {
        Point::new((self.x + other.x) / 2.0, (self.y + other.y) / 2.0)
    }

    /// Round to whole pixels, ties to even.
    pub fn rounded(&self) -> Point {
        Point::new(self.x.round_ties_even(), self.y.round_ties_even())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub point: Point,
    pub confidence: Option<f64>,
}

/// Detected landmarks of one person in one frame.
///
/// A landmark that is absent from the set is "not detected". Feeds that encode
/// missing landmarks as `[0, 0]` are normalised on load, so an in-memory point at
/// the origin is a genuine detection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KeypointSet {
    observations: BTreeMap<Keypoint, Observation>,
}

impl KeypointSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, keypoint: Keypoint, point: Point) {
        self.observations.insert(
            keypoint,
            Observation {
                point,
                confidence: None,
            },
        );
    }

    pub fn insert_with_confidence(&mut self, keypoint: Keypoint, point: Point, confidence: f64) {
        self.observations.insert(
            keypoint,
            Observation {
                point,
                confidence: Some(confidence),
            },
        );
    }

    /// Builder-style insert, handy for fixtures.
    pub fn with(mut self, keypoint: Keypoint, x: f64, y: f64) -> Self {
        self.insert(keypoint, Point::new(x, y));
        self
    }

    pub fn remove(&mut self, keypoint: Keypoint) -> Option<Observation> {
        self.observations.remove(&keypoint)
    }

    pub fn get(&self, keypoint: Keypoint) -> Option<Point> {
        self.observations.get(&keypoint).map(|o| o.point)
    }

    pub fn observation(&self, keypoint: Keypoint) -> Option<&Observation> {
        self.observations.get(&keypoint)
    }

    pub fn contains(&self, keypoint: Keypoint) -> bool {
        self.observations.contains_key(&keypoint)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Keypoint, Point)> + '_ {
        self.observations.iter().map(|(kp, o)| (*kp, o.point))
    }

    pub fn points(&self) -> Vec<Point> {
        self.observations.values().map(|o| o.point).collect()
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    /// Parse one person's `name -> [x, y, confidence?]` map from a pose feed.
    /// Unknown names, malformed values and `[0, 0]` placeholders are dropped.
    pub fn from_feed_map(map: &HashMap<String, serde_json::Value>) -> Self {
        let parsed: Vec<(&str, Vec<f64>)> = map
            .iter()
            .filter_map(|(name, value)| {
                let coords = value.as_array()?;
                let x = coords.first()?.as_f64()?;
                let y = coords.get(1)?.as_f64()?;
                let mut numbers = vec![x, y];
                numbers.extend(coords.get(2).and_then(|c| c.as_f64()));
                Some((name.as_str(), numbers))
            })
            .collect();
        Self::from_coords(parsed.iter().map(|(name, c)| (*name, c.as_slice())))
    }

    pub fn from_coords<'a>(entries: impl IntoIterator<Item = (&'a str, &'a [f64])>) -> Self {
        let mut set = Self::new();
        for (name, numbers) in entries {
            let Ok(keypoint) = name.parse::<Keypoint>() else {
                continue;
            };
            if numbers.len() < 2 || (numbers[0] == 0.0 && numbers[1] == 0.0) {
                continue;
            }
            let point = Point::new(numbers[0], numbers[1]);
            match numbers.get(2) {
                Some(c) => set.insert_with_confidence(keypoint, point, *c),
                None => set.insert(keypoint, point),
            }
        }
        set
    }

    /// Inverse of [`KeypointSet::from_feed_map`], used by the keypoint cache.
    pub fn to_feed_map(&self) -> BTreeMap<String, Vec<f64>> {
        self.observations
            .iter()
            .map(|(kp, o)| {
                let mut values = vec![o.point.x, o.point.y];
                if let Some(c) = o.confidence {
                    values.push(c);
                }
                (kp.name().to_string(), values)
            })
            .collect()
    }
}

#[derive(Debug, Deserialize)]
struct PoseFeed {
    #[serde(default)]
    people: Vec<HashMap<String, serde_json::Value>>,
}

/// Read a per-frame pose file (`{"people": [{...}, ...]}`) and return the first person.
pub fn load_pose_file(path: &Path) -> Result<Option<KeypointSet>> {
    let contents = std::fs::read_to_string(path).map_err(|e| AnalysisError::io(path, e))?;
    parse_pose_feed(&contents).map_err(|e| AnalysisError::json(path, e))
}

pub fn parse_pose_feed(contents: &str) -> std::result::Result<Option<KeypointSet>, serde_json::Error> {
    let feed: PoseFeed = serde_json::from_str(contents)?;
    Ok(feed.people.first().map(KeypointSet::from_feed_map))
}

/// Cache file layout: zero-padded frame index -> keypoint map, `null` when nothing was detected.
pub type KeypointCacheFile = BTreeMap<String, Option<BTreeMap<String, Vec<f64>>>>;

/// Ten-digit, zero-padded frame key shared by the keypoint cache and mask files.
pub fn frame_key(index: usize) -> String {
    format!("{:010}", index)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_first_person_only() {
        let json = r#"{"people": [
            {"Nose": [10.0, 20.0, 0.9], "LHip": [5, 6]},
            {"Nose": [99.0, 99.0, 0.9]}
        ]}"#;
        let set = parse_pose_feed(json).unwrap().unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(set.get(Keypoint::Nose), Some(Point::new(10.0, 20.0)));
        assert_eq!(set.observation(Keypoint::Nose).unwrap().confidence, Some(0.9));
        assert_eq!(set.observation(Keypoint::LHip).unwrap().confidence, None);
    }

    #[test]
    fn test_zero_placeholder_is_not_detected() {
        let json = r#"{"people": [{"Neck": [0, 0, 0.0], "RHip": [0.0, 12.0, 0.4]}]}"#;
        let set = parse_pose_feed(json).unwrap().unwrap();
        assert!(!set.contains(Keypoint::Neck));
        assert_eq!(set.get(Keypoint::RHip), Some(Point::new(0.0, 12.0)));
    }

    #[test]
    fn test_non_numeric_coordinate_drops_entry() {
        let json = r#"{"people": [{
            "Nose": [10.0, null, 0.9],
            "Neck": ["a", 4.0],
            "LKnee": [4.0, 5.0, "high"],
            "RKnee": [7.0]
        }]}"#;
        let set = parse_pose_feed(json).unwrap().unwrap();
        assert!(!set.contains(Keypoint::Nose));
        assert!(!set.contains(Keypoint::Neck));
        assert!(!set.contains(Keypoint::RKnee));
        let knee = set.observation(Keypoint::LKnee).unwrap();
        assert_eq!(knee.point, Point::new(4.0, 5.0));
        assert_eq!(knee.confidence, None);
    }

    #[test]
    fn test_unknown_names_are_dropped() {
        let json = r#"{"people": [{"Head": [1, 2], "person_id": 3, "LKnee": [4, 5]}]}"#;
        let set = parse_pose_feed(json).unwrap().unwrap();
        assert_eq!(set.len(), 1);
        assert!(set.contains(Keypoint::LKnee));
    }

    #[test]
    fn test_no_people() {
        assert!(parse_pose_feed(r#"{"people": []}"#).unwrap().is_none());
    }

    #[test]
    fn test_in_memory_origin_is_detected() {
        let set = KeypointSet::new().with(Keypoint::LHip, 0.0, 0.0);
        assert_eq!(set.get(Keypoint::LHip), Some(Point::new(0.0, 0.0)));
    }

    #[test]
    fn test_feed_map_roundtrip_keeps_confidence() {
        let mut set = KeypointSet::new();
        set.insert_with_confidence(Keypoint::RKnee, Point::new(3.0, 4.0), 0.5);
        set.insert(Keypoint::Neck, Point::new(1.0, 2.0));

        let map: HashMap<String, serde_json::Value> = set
            .to_feed_map()
            .into_iter()
            .map(|(k, v)| (k, serde_json::json!(v)))
            .collect();
        assert_eq!(KeypointSet::from_feed_map(&map), set);
    }

    #[test]
    fn test_frame_key_padding() {
        assert_eq!(frame_key(42), "0000000042");
    }

    #[test]
    fn test_point_rounding() {
        assert_eq!(Point::new(1.5, -2.4).rounded(), Point::new(2.0, -2.0));
        assert_eq!(Point::new(2.5, 7.6).rounded(), Point::new(2.0, 8.0));
    }
}
