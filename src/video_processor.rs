// src/video_processor.rs
//
// Dataset discovery and frame decoding. Stills are read with `image`; videos
// go through OpenCV when the `video` feature is enabled.

use crate::error::{AnalysisError, Result};
use crate::types::{DatasetConfig, Frame};
use image::RgbImage;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

pub const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];
pub const VIDEO_EXTENSIONS: [&str; 4] = ["mp4", "mov", "avi", "mkv"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SampleKind {
    Image,
    Video,
}

/// One dataset entry: a still image or a video of a single rider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample {
    /// File name up to the first dot; keys every per-sample artefact.
    pub name: String,
    pub path: PathBuf,
    pub kind: SampleKind,
}

impl Sample {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_lowercase();
        let kind = if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
            SampleKind::Image
        } else if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
            SampleKind::Video
        } else {
            return None;
        };
        let file_name = path.file_name()?.to_str()?;
        let name = file_name.split('.').next().unwrap_or(file_name).to_string();
        Some(Self {
            name,
            path: path.to_path_buf(),
            kind,
        })
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.name.clone())
    }

    pub fn is_still(&self) -> bool {
        self.kind == SampleKind::Image
    }
}

pub struct VideoProcessor {
    config: DatasetConfig,
}

impl VideoProcessor {
    pub fn new(config: DatasetConfig) -> Self {
        Self { config }
    }

    /// Samples directly inside the input directory, sorted by file name.
    pub fn find_samples(&self) -> Result<Vec<Sample>> {
        let input_dir = &self.config.input_dir;
        if !input_dir.is_dir() {
            return Err(AnalysisError::Config(format!(
                "dataset directory {} does not exist",
                input_dir.display()
            )));
        }

        let mut samples = Vec::new();
        for entry in WalkDir::new(input_dir)
            .min_depth(1)
            .max_depth(1)
            .follow_links(true)
            .sort_by_file_name()
        {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Skipping unreadable dataset entry: {}", e);
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let Some(sample) = Sample::from_path(entry.path()) else {
                debug!("Ignoring {}", entry.path().display());
                continue;
            };
            if !self.config.include.is_empty() && !self.config.include.contains(&sample.name) {
                continue;
            }
            samples.push(sample);
        }

        info!("Found {} samples in {}", samples.len(), input_dir.display());
        Ok(samples)
    }
}

/// `max(1, round(native_fps / analyse_rate))`, ties to even.
pub fn frame_stride(native_fps: f64, analyse_rate: f64) -> usize {
    if !native_fps.is_finite() || native_fps <= 0.0 || analyse_rate <= 0.0 {
        return 1;
    }
    ((native_fps / analyse_rate).round_ties_even() as usize).max(1)
}

/// Random access to the frames of one sample.
pub trait FrameSource {
    /// Native frame rate, `None` for still images.
    fn fps(&self) -> Option<f64>;

    fn dimensions(&self) -> (u32, u32);

    /// Decode frame `index`; `Ok(None)` once the source is exhausted.
    fn read_frame(&mut self, index: usize) -> Result<Option<Frame>>;

    fn is_still(&self) -> bool {
        self.fps().is_none()
    }
}

pub struct StillImageSource {
    image: RgbImage,
}

impl StillImageSource {
    pub fn open(path: &Path) -> Result<Self> {
        let image = image::open(path)
            .map_err(|e| AnalysisError::image(path, e))?
            .into_rgb8();
        Ok(Self { image })
    }

    pub fn from_image(image: RgbImage) -> Self {
        Self { image }
    }
}

impl FrameSource for StillImageSource {
    fn fps(&self) -> Option<f64> {
        None
    }

    fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    fn read_frame(&mut self, index: usize) -> Result<Option<Frame>> {
        if index > 0 {
            return Ok(None);
        }
        Ok(Some(Frame {
            index: 0,
            image: self.image.clone(),
            timestamp_ms: 0.0,
        }))
    }
}

#[cfg(feature = "video")]
pub use self::opencv_video::VideoFileSource;

#[cfg(feature = "video")]
mod opencv_video {
    use super::FrameSource;
    use crate::error::{AnalysisError, Result};
    use crate::types::Frame;
    use image::RgbImage;
    use opencv::{
        core::Mat,
        imgproc,
        prelude::*,
        videoio::{self, VideoCapture},
    };
    use std::path::Path;
    use tracing::info;

    fn video_err(e: opencv::Error) -> AnalysisError {
        AnalysisError::Video(e.to_string())
    }

    pub struct VideoFileSource {
        cap: VideoCapture,
        fps: f64,
        width: u32,
        height: u32,
    }

    impl VideoFileSource {
        pub fn open(path: &Path) -> Result<Self> {
            let path_str = path
                .to_str()
                .ok_or_else(|| AnalysisError::Video(format!("non UTF-8 path {}", path.display())))?;
            let cap = VideoCapture::from_file(path_str, videoio::CAP_ANY).map_err(video_err)?;
            if !cap.is_opened().map_err(video_err)? {
                return Err(AnalysisError::Video(format!(
                    "failed to open video {}",
                    path.display()
                )));
            }

            let fps = cap.get(videoio::CAP_PROP_FPS).map_err(video_err)?;
            let width = cap.get(videoio::CAP_PROP_FRAME_WIDTH).map_err(video_err)? as u32;
            let height = cap.get(videoio::CAP_PROP_FRAME_HEIGHT).map_err(video_err)? as u32;
            let total = cap.get(videoio::CAP_PROP_FRAME_COUNT).map_err(video_err)?;
            info!(
                "Video properties: {}x{} @ {:.1} FPS, {} frames",
                width, height, fps, total as i64
            );

            Ok(Self {
                cap,
                fps,
                width,
                height,
            })
        }
    }

    impl FrameSource for VideoFileSource {
        fn fps(&self) -> Option<f64> {
            Some(self.fps)
        }

        fn dimensions(&self) -> (u32, u32) {
            (self.width, self.height)
        }

        fn read_frame(&mut self, index: usize) -> Result<Option<Frame>> {
            self.cap
                .set(videoio::CAP_PROP_POS_FRAMES, index as f64)
                .map_err(video_err)?;

            let mut mat = Mat::default();
            if !self.cap.read(&mut mat).map_err(video_err)? || mat.empty() {
                return Ok(None);
            }

            let mut rgb = Mat::default();
            imgproc::cvt_color(&mat, &mut rgb, imgproc::COLOR_BGR2RGB, 0).map_err(video_err)?;
            let (cols, rows) = (rgb.cols() as u32, rgb.rows() as u32);
            let data = rgb.data_bytes().map_err(video_err)?.to_vec();
            let image = RgbImage::from_raw(cols, rows, data).ok_or_else(|| {
                AnalysisError::Video(format!("frame {} has an unexpected buffer size", index))
            })?;

            Ok(Some(Frame {
                index,
                image,
                timestamp_ms: index as f64 / self.fps * 1000.0,
            }))
        }
    }
}

/// Open the right decoder for a sample.
pub fn open_source(sample: &Sample) -> Result<Box<dyn FrameSource>> {
    match sample.kind {
        SampleKind::Image => Ok(Box::new(StillImageSource::open(&sample.path)?)),
        #[cfg(feature = "video")]
        SampleKind::Video => Ok(Box::new(VideoFileSource::open(&sample.path)?)),
        #[cfg(not(feature = "video"))]
        SampleKind::Video => Err(AnalysisError::UnsupportedSample(format!(
            "{}: video decoding needs the `video` feature",
            sample.file_name()
        ))),
    }
}
