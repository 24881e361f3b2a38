use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::cascade_face_detector::CascadeFaceDetector;
use super::haar_cascade::HaarCascade;
use super::model_resolver::{self, ProgressFn};
use crate::detection::domain::detection_params::DetectionParams;
use crate::detection::domain::face_detector::{ClassifierLoader, FaceDetector};
use crate::shared::constants::{BUNDLED_CASCADE_DIR, CASCADE_MODEL_NAME, CASCADE_MODEL_URL};

enum CascadeSource {
    File(PathBuf),
    Resolved {
        name: String,
        url: String,
        bundled_dir: Option<PathBuf>,
    },
}

/// Builds a [`CascadeFaceDetector`] from an OpenCV Haar cascade file.
pub struct CascadeLoader {
    source: CascadeSource,
    params: DetectionParams,
    progress: Option<fn(u64, u64)>,
}

impl CascadeLoader {
    /// Loads the frontal-face cascade from the model cache, the bundled
    /// directory, or the network, in that order.
    pub fn frontal_face(params: DetectionParams) -> Self {
        Self {
            source: CascadeSource::Resolved {
                name: CASCADE_MODEL_NAME.to_string(),
                url: CASCADE_MODEL_URL.to_string(),
                bundled_dir: Some(PathBuf::from(BUNDLED_CASCADE_DIR)),
            },
            params,
            progress: None,
        }
    }

    pub fn from_file(path: &Path, params: DetectionParams) -> Self {
        Self {
            source: CascadeSource::File(path.to_path_buf()),
            params,
            progress: None,
        }
    }

    /// Report download progress as `(bytes_downloaded, total_bytes)`.
    pub fn with_progress(mut self, progress: fn(u64, u64)) -> Self {
        self.progress = Some(progress);
        self
    }

    fn cascade_path(&self) -> Result<PathBuf, Box<dyn std::error::Error>> {
        match &self.source {
            CascadeSource::File(path) => Ok(path.clone()),
            CascadeSource::Resolved {
                name,
                url,
                bundled_dir,
            } => {
                let progress = self.progress.map(|p| Box::new(p) as ProgressFn);
                Ok(model_resolver::resolve(
                    name,
                    url,
                    bundled_dir.as_deref(),
                    progress,
                )?)
            }
        }
    }
}

impl ClassifierLoader for CascadeLoader {
    fn load(&self) -> Result<Box<dyn FaceDetector>, Box<dyn std::error::Error>> {
        let path = self.cascade_path()?;
        log::info!("Loading cascade classifier from {}", path.display());
        let cascade = HaarCascade::load(&path)?;
        log::debug!(
            "cascade window {:?}, {} stages",
            cascade.window(),
            cascade.stage_count()
        );
        Ok(Box::new(CascadeFaceDetector::new(
            Arc::new(cascade),
            self.params.clone(),
        )))
    }
}
