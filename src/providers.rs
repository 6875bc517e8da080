// src/providers.rs
//
// Where per-frame keypoints and masks come from. The analyzer only asks
// "give me frame N of sample S"; whether that is a precomputed file, a cache
// hit or a fresh model prediction is decided here.

use crate::error::{AnalysisError, Result};
use crate::geometry::Mask;
use crate::keypoints::{frame_key, load_pose_file, KeypointCacheFile, KeypointSet};
use crate::orientation::Orientation;
use crate::types::{Frame, SourcesConfig};
use crate::video_processor::Sample;
use image::RgbImage;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub trait KeypointProvider {
    /// Keypoints of the first person in `frame`, `None` when not available.
    fn keypoints(&mut self, sample: &Sample, frame: &Frame) -> Result<Option<KeypointSet>>;

    /// Called once after the last frame of a sample.
    fn finish_sample(&mut self, _sample: &Sample) -> Result<()> {
        Ok(())
    }
}

pub trait MaskProvider {
    /// Binary rider mask for `frame`, `None` when not available.
    fn mask(&mut self, sample: &Sample, frame: &Frame) -> Result<Option<Mask>>;
}

pub trait MaskOfInterestProvider {
    fn mask_of_interest(&mut self, orientation: Orientation) -> Result<Option<Mask>>;
}

/// Pose model inference, plugged in when keypoints are not precomputed.
pub trait PoseEstimator {
    fn predict_keypoints(&mut self, frame: &RgbImage) -> Result<Option<KeypointSet>>;
}

/// Segmentation model inference, plugged in when masks are not precomputed.
pub trait SegmentationEstimator {
    fn predict_mask(&mut self, frame: &RgbImage) -> Result<Option<Mask>>;
}

/// Precomputed pose files:
/// stills `<root>/<name>.json`, videos `<root>/<name>/<index>.json`.
pub struct PoseFolderProvider {
    root: PathBuf,
}

impl PoseFolderProvider {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path_for(&self, sample: &Sample, index: usize) -> PathBuf {
        if sample.is_still() {
            self.root.join(format!("{}.json", sample.name))
        } else {
            self.root.join(&sample.name).join(format!("{}.json", index))
        }
    }
}

impl KeypointProvider for PoseFolderProvider {
    fn keypoints(&mut self, sample: &Sample, frame: &Frame) -> Result<Option<KeypointSet>> {
        let path = self.path_for(sample, frame.index);
        if !path.exists() {
            warn!("No pose file {}", path.display());
            return Ok(None);
        }
        load_pose_file(&path)
    }
}

/// Precomputed masks:
/// stills `<root>/<name>.jpg`, videos `<root>/<name>/frame<index:010>.jpg`.
pub struct MaskFolderProvider {
    root: PathBuf,
}

impl MaskFolderProvider {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path_for(&self, sample: &Sample, index: usize) -> PathBuf {
        if sample.is_still() {
            self.root.join(format!("{}.jpg", sample.name))
        } else {
            self.root
                .join(&sample.name)
                .join(format!("frame{}.jpg", frame_key(index)))
        }
    }
}

impl MaskProvider for MaskFolderProvider {
    fn mask(&mut self, sample: &Sample, frame: &Frame) -> Result<Option<Mask>> {
        let path = self.path_for(sample, frame.index);
        if !path.exists() {
            warn!("No mask file {}", path.display());
            return Ok(None);
        }
        Mask::load(&path).map(Some)
    }
}

/// `<root>/<ORIENTATION>.jpg`, e.g. `FRONT.jpg`.
pub struct MaskOfInterestFolder {
    root: PathBuf,
}

impl MaskOfInterestFolder {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl MaskOfInterestProvider for MaskOfInterestFolder {
    fn mask_of_interest(&mut self, orientation: Orientation) -> Result<Option<Mask>> {
        let path = self.root.join(format!("{}.jpg", orientation.name()));
        if !path.exists() {
            debug!("No mask of interest for {}", orientation);
            return Ok(None);
        }
        Mask::load(&path).map(Some)
    }
}

struct OpenCache {
    sample: String,
    path: PathBuf,
    entries: KeypointCacheFile,
    dirty: bool,
}

/// Pose estimator with a per-sample JSON cache at `<dir>/<name>.json`,
/// keyed by zero-padded frame index. The file is rewritten when the sample finishes.
pub struct CachedPoseProvider {
    estimator: Box<dyn PoseEstimator>,
    dir: PathBuf,
    open: Option<OpenCache>,
}

impl CachedPoseProvider {
    pub fn new(estimator: Box<dyn PoseEstimator>, dir: impl Into<PathBuf>) -> Self {
        Self {
            estimator,
            dir: dir.into(),
            open: None,
        }
    }

    fn cache_for(&mut self, sample: &Sample) -> Result<&mut OpenCache> {
        match self.open.take() {
            Some(cache) if cache.sample == sample.name => Ok(self.open.insert(cache)),
            previous => {
                if let Some(previous) = previous {
                    write_cache(&previous)?;
                }
                let cache = OpenCache::load(&self.dir, sample)?;
                Ok(self.open.insert(cache))
            }
        }
    }
}

impl OpenCache {
    fn load(dir: &Path, sample: &Sample) -> Result<Self> {
        let path = dir.join(format!("{}.json", sample.name));
        let entries = if path.exists() {
            let contents = fs::read_to_string(&path).map_err(|e| AnalysisError::io(&path, e))?;
            serde_json::from_str(&contents).map_err(|e| AnalysisError::json(&path, e))?
        } else {
            KeypointCacheFile::new()
        };
        debug!("Keypoint cache {} has {} entries", path.display(), entries.len());
        Ok(Self {
            sample: sample.name.clone(),
            path,
            entries,
            dirty: false,
        })
    }
}

fn write_cache(cache: &OpenCache) -> Result<()> {
    if !cache.dirty {
        return Ok(());
    }
    if let Some(parent) = cache.path.parent() {
        fs::create_dir_all(parent).map_err(|e| AnalysisError::io(parent, e))?;
    }
    let json = serde_json::to_string(&cache.entries).map_err(|e| AnalysisError::json(&cache.path, e))?;
    fs::write(&cache.path, json).map_err(|e| AnalysisError::io(&cache.path, e))?;
    info!("Saved keypoint cache {}", cache.path.display());
    Ok(())
}

impl KeypointProvider for CachedPoseProvider {
    fn keypoints(&mut self, sample: &Sample, frame: &Frame) -> Result<Option<KeypointSet>> {
        let key = frame_key(frame.index);
        if let Some(entry) = self.cache_for(sample)?.entries.get(&key) {
            return Ok(entry.as_ref().map(|map| {
                KeypointSet::from_coords(map.iter().map(|(name, c)| (name.as_str(), c.as_slice())))
            }));
        }

        let predicted = self.estimator.predict_keypoints(&frame.image)?;
        let cache = self.cache_for(sample)?;
        cache
            .entries
            .insert(key, predicted.as_ref().map(KeypointSet::to_feed_map));
        cache.dirty = true;
        Ok(predicted)
    }

    fn finish_sample(&mut self, sample: &Sample) -> Result<()> {
        match self.open.take() {
            Some(cache) if cache.sample == sample.name => write_cache(&cache),
            other => {
                self.open = other;
                Ok(())
            }
        }
    }
}

/// Segmentation estimator with masks cached as `<dir>/<name>/<index:010>.png`.
pub struct CachedMaskProvider {
    estimator: Box<dyn SegmentationEstimator>,
    dir: PathBuf,
}

impl CachedMaskProvider {
    pub fn new(estimator: Box<dyn SegmentationEstimator>, dir: impl Into<PathBuf>) -> Self {
        Self {
            estimator,
            dir: dir.into(),
        }
    }

    pub fn path_for(&self, sample: &Sample, index: usize) -> PathBuf {
        self.dir
            .join(&sample.name)
            .join(format!("{}.png", frame_key(index)))
    }
}

impl MaskProvider for CachedMaskProvider {
    fn mask(&mut self, sample: &Sample, frame: &Frame) -> Result<Option<Mask>> {
        let path = self.path_for(sample, frame.index);
        if path.exists() {
            return Mask::load(&path).map(Some);
        }

        let Some(mask) = self.estimator.predict_mask(&frame.image)? else {
            return Ok(None);
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| AnalysisError::io(parent, e))?;
        }
        mask.save(&path)?;
        Ok(Some(mask))
    }
}

/// The three collaborators the analyzer needs for one run.
pub struct Providers {
    pub keypoints: Box<dyn KeypointProvider>,
    pub masks: Box<dyn MaskProvider>,
    pub mask_of_interest: Option<Box<dyn MaskOfInterestProvider>>,
}

impl Providers {
    /// Precomputed folders win; otherwise the matching estimator is wrapped in a cache.
    /// A source with neither is a configuration error.
    pub fn from_config(
        sources: &SourcesConfig,
        pose_estimator: Option<Box<dyn PoseEstimator>>,
        segmentation_estimator: Option<Box<dyn SegmentationEstimator>>,
    ) -> Result<Self> {
        let keypoints: Box<dyn KeypointProvider> = match (&sources.pose_dir, pose_estimator) {
            (Some(dir), _) => {
                require_dir(dir, "sources.pose_dir")?;
                Box::new(PoseFolderProvider::new(dir))
            }
            (None, Some(estimator)) => Box::new(CachedPoseProvider::new(
                estimator,
                sources.cache_dir.join("pose_estimation"),
            )),
            (None, None) => {
                return Err(AnalysisError::Config(
                    "no pose folder configured and no pose estimator available".to_string(),
                ))
            }
        };

        let masks: Box<dyn MaskProvider> = match (&sources.segmentation_dir, segmentation_estimator) {
            (Some(dir), _) => {
                require_dir(dir, "sources.segmentation_dir")?;
                Box::new(MaskFolderProvider::new(dir))
            }
            (None, Some(estimator)) => Box::new(CachedMaskProvider::new(
                estimator,
                sources.cache_dir.join("segmentation"),
            )),
            (None, None) => {
                return Err(AnalysisError::Config(
                    "no segmentation folder configured and no segmentation estimator available"
                        .to_string(),
                ))
            }
        };

        let mask_of_interest = match &sources.mask_interest_dir {
            Some(dir) => {
                require_dir(dir, "sources.mask_interest_dir")?;
                Some(Box::new(MaskOfInterestFolder::new(dir)) as Box<dyn MaskOfInterestProvider>)
            }
            None => None,
        };

        Ok(Self {
            keypoints,
            masks,
            mask_of_interest,
        })
    }
}

fn require_dir(dir: &Path, key: &str) -> Result<()> {
    if dir.is_dir() {
        Ok(())
    } else {
        Err(AnalysisError::Config(format!(
            "{} {} is not a directory",
            key,
            dir.display()
        )))
    }
}
