// src/geometry.rs
//
// Geometric primitives over 2D keypoints and binary masks.

use crate::error::{AnalysisError, Result};
use crate::keypoints::Point;
use image::{GrayImage, Luma};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Axis-aligned box around a set of points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_x: f64,
    pub max_x: f64,
    pub min_y: f64,
    pub max_y: f64,
}

impl BoundingBox {
    pub fn from_points(points: &[Point]) -> Option<Self> {
        if points.is_empty() {
            return None;
        }

        let mut bbox = Self {
            min_x: f64::INFINITY,
            max_x: f64::NEG_INFINITY,
            min_y: f64::INFINITY,
            max_y: f64::NEG_INFINITY,
        };
        for p in points {
            bbox.min_x = bbox.min_x.min(p.x);
            bbox.max_x = bbox.max_x.max(p.x);
            bbox.min_y = bbox.min_y.min(p.y);
            bbox.max_y = bbox.max_y.max(p.y);
        }
        Some(bbox)
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    pub fn diagonal(&self) -> f64 {
        self.width().hypot(self.height())
    }

    pub fn area(&self) -> f64 {
        self.width() * self.height()
    }
}

pub fn distance(a: &Point, b: &Point) -> f64 {
    (a.x - b.x).hypot(a.y - b.y)
}

/// Angle at `vertex` between the rays towards `a` and `c`, in degrees [0, 180].
///
/// Returns `None` when either ray has zero length.
pub fn angle(a: &Point, vertex: &Point, c: &Point) -> Option<f64> {
    let (v1x, v1y) = (a.x - vertex.x, a.y - vertex.y);
    let (v2x, v2y) = (c.x - vertex.x, c.y - vertex.y);
    let norms = v1x.hypot(v1y) * v2x.hypot(v2y);
    if norms == 0.0 {
        return None;
    }
    let cosine = ((v1x * v2x + v1y * v2y) / norms).clamp(-1.0, 1.0);
    Some(cosine.acos().to_degrees())
}

/// Population mean and standard deviation. `None` for an empty slice.
pub fn mean_std(values: &[f64]) -> Option<(f64, f64)> {
    if values.is_empty() {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    Some((mean, variance.sqrt()))
}

pub const MASK_ON: u8 = 255;
const MASK_THRESHOLD: u8 = 127;

/// Single-channel binary image: 255 is foreground (the rider), 0 background.
#[derive(Debug, Clone, PartialEq)]
pub struct Mask {
    pixels: GrayImage,
}

impl Mask {
    /// Binarise an arbitrary grayscale image (values above 127 become foreground).
    pub fn from_gray(gray: GrayImage) -> Self {
        let pixels = GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
            if gray.get_pixel(x, y)[0] > MASK_THRESHOLD {
                Luma([MASK_ON])
            } else {
                Luma([0])
            }
        });
        Self { pixels }
    }

    pub fn filled(width: u32, height: u32, value: u8) -> Self {
        Self::from_gray(GrayImage::from_pixel(width, height, Luma([value])))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let img = image::open(path).map_err(|e| AnalysisError::image(path, e))?;
        Ok(Self::from_gray(img.into_luma8()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        self.pixels
            .save(path)
            .map_err(|e| AnalysisError::image(path, e))
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn is_set(&self, x: u32, y: u32) -> bool {
        self.pixels.get_pixel(x, y)[0] == MASK_ON
    }

    pub fn set(&mut self, x: u32, y: u32, on: bool) {
        self.pixels
            .put_pixel(x, y, Luma([if on { MASK_ON } else { 0 }]));
    }

    pub fn as_gray(&self) -> &GrayImage {
        &self.pixels
    }

    /// Number of foreground pixels.
    pub fn area(&self) -> u64 {
        self.pixels.pixels().filter(|p| p[0] == MASK_ON).count() as u64
    }

    /// Foreground pixel count of `self AND other`. `None` when the sizes differ.
    pub fn intersection_area(&self, other: &Mask) -> Option<u64> {
        if self.pixels.dimensions() != other.pixels.dimensions() {
            return None;
        }
        let count = self
            .pixels
            .pixels()
            .zip(other.pixels.pixels())
            .filter(|(a, b)| a[0] == MASK_ON && b[0] == MASK_ON)
            .count();
        Some(count as u64)
    }
}
