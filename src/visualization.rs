// src/visualization.rs
//
// Annotated output. A frame is an immutable base image plus an ordered list of
// drawing operations; nothing touches pixels until `Renderer::render`.

use crate::error::{AnalysisError, Result};
use crate::geometry::Mask;
use crate::keypoints::{Keypoint, KeypointSet, Point};
use crate::types::VisualizationConfig;
use ab_glyph::{FontVec, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{
    draw_filled_circle_mut, draw_hollow_circle_mut, draw_line_segment_mut, draw_text_mut,
};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const SKELETON_COLOR: Rgb<u8> = Rgb([0, 0, 255]);
pub const JOINT_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
pub const LABEL_COLOR: Rgb<u8> = Rgb([255, 0, 255]);
pub const ANGLE_TEXT_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
pub const TRACK_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
pub const STATS_COLOR: Rgb<u8> = Rgb([255, 255, 255]);

const TEXT_SCALE: f32 = 28.0;

#[derive(Debug, Clone, PartialEq)]
pub enum Annotation {
    /// Whole-frame blend with the mask rendered as gray.
    MaskOverlay(Mask),
    Skeleton(KeypointSet),
    /// Two limb segments meeting at `points[1]`, labelled with the angle.
    Angle { points: [Point; 3], degrees: f64 },
    StabilityCircle { center: Point, radius: f64 },
    TrackPoints(Vec<Point>),
    Text {
        text: String,
        x: i32,
        y: i32,
        color: Rgb<u8>,
    },
}

#[derive(Debug, Clone)]
pub struct AnnotatedFrame {
    base: RgbImage,
    ops: Vec<Annotation>,
}

impl AnnotatedFrame {
    pub fn new(base: RgbImage) -> Self {
        Self {
            base,
            ops: Vec::new(),
        }
    }

    pub fn push(&mut self, op: Annotation) {
        self.ops.push(op);
    }

    pub fn label(&mut self, text: impl Into<String>, x: i32, y: i32, color: Rgb<u8>) {
        self.push(Annotation::Text {
            text: text.into(),
            x,
            y,
            color,
        });
    }

    pub fn base(&self) -> &RgbImage {
        &self.base
    }

    pub fn ops(&self) -> &[Annotation] {
        &self.ops
    }
}

/// Applies annotation ops onto a copy of the base image.
pub struct Renderer {
    font: Option<FontVec>,
    mask_opacity: f32,
}

impl Renderer {
    pub fn new(config: &VisualizationConfig) -> Result<Self> {
        let font = match &config.font_path {
            Some(path) => {
                let bytes = fs::read(path).map_err(|e| AnalysisError::io(path, e))?;
                let font = FontVec::try_from_vec(bytes).map_err(|_| {
                    AnalysisError::Config(format!("{} is not a valid font", path.display()))
                })?;
                Some(font)
            }
            None => {
                info!("No font configured, text labels will be skipped");
                None
            }
        };
        Ok(Self {
            font,
            mask_opacity: config.mask_opacity,
        })
    }

    pub fn without_text(mask_opacity: f32) -> Self {
        Self {
            font: None,
            mask_opacity,
        }
    }

    pub fn render(&self, frame: &AnnotatedFrame) -> RgbImage {
        let mut canvas = frame.base.clone();
        for op in &frame.ops {
            self.apply(&mut canvas, op);
        }
        canvas
    }

    fn apply(&self, canvas: &mut RgbImage, op: &Annotation) {
        match op {
            Annotation::MaskOverlay(mask) => blend_mask(canvas, mask, self.mask_opacity),
            Annotation::Skeleton(keypoints) => draw_skeleton(canvas, keypoints),
            Annotation::Angle { points, degrees } => {
                let [a, b, c] = points.map(|p| to_pixel(&p));
                draw_thick_line(canvas, a, b, 2, SKELETON_COLOR);
                draw_thick_line(canvas, b, c, 2, SKELETON_COLOR);
                for p in [a, b, c] {
                    draw_filled_circle_mut(canvas, p, 4, JOINT_COLOR);
                }
                self.text(
                    canvas,
                    &format!("{:.1}", degrees),
                    b.0 + 10,
                    b.1,
                    ANGLE_TEXT_COLOR,
                );
            }
            Annotation::StabilityCircle { center, radius } => {
                let c = to_pixel(center);
                let r = radius.ceil() as i32;
                draw_hollow_circle_mut(canvas, c, r, STATS_COLOR);
                if r > 0 {
                    draw_hollow_circle_mut(canvas, c, r + 1, STATS_COLOR);
                }
            }
            Annotation::TrackPoints(points) => {
                for p in points {
                    draw_filled_circle_mut(canvas, to_pixel(p), 2, TRACK_COLOR);
                }
            }
            Annotation::Text { text, x, y, color } => self.text(canvas, text, *x, *y, *color),
        }
    }

    fn text(&self, canvas: &mut RgbImage, text: &str, x: i32, y: i32, color: Rgb<u8>) {
        if let Some(font) = &self.font {
            draw_text_mut(canvas, color, x, y, PxScale::from(TEXT_SCALE), font, text);
        }
    }
}

fn to_pixel(p: &Point) -> (i32, i32) {
    (p.x as i32, p.y as i32)
}

fn blend_mask(canvas: &mut RgbImage, mask: &Mask, opacity: f32) {
    if mask.width() != canvas.width() || mask.height() != canvas.height() {
        warn!(
            "Mask {}x{} does not match frame {}x{}, overlay skipped",
            mask.width(),
            mask.height(),
            canvas.width(),
            canvas.height()
        );
        return;
    }
    let keep = 1.0 - opacity;
    for (x, y, px) in canvas.enumerate_pixels_mut() {
        let m = mask.as_gray().get_pixel(x, y)[0] as f32;
        for channel in px.0.iter_mut() {
            *channel = (*channel as f32 * keep + m * opacity).round().clamp(0.0, 255.0) as u8;
        }
    }
}

fn draw_skeleton(canvas: &mut RgbImage, keypoints: &KeypointSet) {
    for chain in Keypoint::SKELETON.iter() {
        for pair in chain.windows(2) {
            if let (Some(a), Some(b)) = (keypoints.get(pair[0]), keypoints.get(pair[1])) {
                draw_line_segment_mut(
                    canvas,
                    (a.x as f32, a.y as f32),
                    (b.x as f32, b.y as f32),
                    SKELETON_COLOR,
                );
            }
        }
    }
    for (_, p) in keypoints.iter() {
        draw_filled_circle_mut(canvas, to_pixel(&p), 2, JOINT_COLOR);
    }
}

fn draw_thick_line(
    canvas: &mut RgbImage,
    a: (i32, i32),
    b: (i32, i32),
    thickness: i32,
    color: Rgb<u8>,
) {
    for d in 0..thickness.max(1) {
        for (dx, dy) in [(d, 0), (0, d)] {
            draw_line_segment_mut(
                canvas,
                ((a.0 + dx) as f32, (a.1 + dy) as f32),
                ((b.0 + dx) as f32, (b.1 + dy) as f32),
                color,
            );
        }
    }
}

/// Destination of the per-frame annotated output of one sample.
pub trait FrameSink {
    fn push(&mut self, image: &RgbImage) -> Result<()>;

    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Writes each pushed frame to the same path; the last one wins.
pub struct ImageFileSink {
    path: PathBuf,
}

impl ImageFileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl FrameSink for ImageFileSink {
    fn push(&mut self, image: &RgbImage) -> Result<()> {
        image
            .save(&self.path)
            .map_err(|e| AnalysisError::image(&self.path, e))?;
        debug!("Wrote {}", self.path.display());
        Ok(())
    }
}

#[cfg(feature = "video")]
pub use self::opencv_sink::VideoFileSink;

#[cfg(feature = "video")]
mod opencv_sink {
    use super::FrameSink;
    use crate::error::{AnalysisError, Result};
    use image::RgbImage;
    use opencv::{
        core::{self, Mat},
        imgproc,
        prelude::*,
        videoio::VideoWriter,
    };
    use std::path::Path;
    use tracing::info;

    fn video_err(e: opencv::Error) -> AnalysisError {
        AnalysisError::Video(e.to_string())
    }

    pub struct VideoFileSink {
        writer: VideoWriter,
    }

    impl VideoFileSink {
        pub fn create(path: &Path, width: u32, height: u32, fps: f64) -> Result<Self> {
            let path_str = path
                .to_str()
                .ok_or_else(|| AnalysisError::Video(format!("non UTF-8 path {}", path.display())))?;
            info!("Output video: {}", path.display());

            let fourcc = VideoWriter::fourcc('m', 'p', '4', 'v').map_err(video_err)?;
            let writer = VideoWriter::new(
                path_str,
                fourcc,
                fps,
                core::Size::new(width as i32, height as i32),
                true,
            )
            .map_err(video_err)?;
            Ok(Self { writer })
        }
    }

    impl FrameSink for VideoFileSink {
        fn push(&mut self, image: &RgbImage) -> Result<()> {
            let mat = Mat::from_slice(image.as_raw()).map_err(video_err)?;
            let mat = mat.reshape(3, image.height() as i32).map_err(video_err)?;
            let mut bgr = Mat::default();
            imgproc::cvt_color(&mat, &mut bgr, imgproc::COLOR_RGB2BGR, 0).map_err(video_err)?;
            self.writer.write(&bgr).map_err(video_err)
        }

        fn finish(&mut self) -> Result<()> {
            self.writer.release().map_err(video_err)
        }
    }
}

/// Pick the sink for a sample: a single image for stills, a video at
/// `fps` for video samples.
pub fn open_sink(
    path: &Path,
    is_still: bool,
    dimensions: (u32, u32),
    fps: f64,
) -> Result<Box<dyn FrameSink>> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| AnalysisError::io(parent, e))?;
        }
    }
    if is_still {
        return Ok(Box::new(ImageFileSink::new(path)));
    }
    open_video_sink(path, dimensions, fps)
}

#[cfg(feature = "video")]
fn open_video_sink(path: &Path, dimensions: (u32, u32), fps: f64) -> Result<Box<dyn FrameSink>> {
    Ok(Box::new(VideoFileSink::create(
        path,
        dimensions.0,
        dimensions.1,
        fps,
    )?))
}

#[cfg(not(feature = "video"))]
fn open_video_sink(path: &Path, _dimensions: (u32, u32), _fps: f64) -> Result<Box<dyn FrameSink>> {
    Err(AnalysisError::UnsupportedSample(format!(
        "{}: video encoding needs the `video` feature",
        path.display()
    )))
}
