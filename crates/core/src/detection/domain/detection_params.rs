use thiserror::Error;

/// Ratio between successive window sizes of the detection pyramid.
pub const DEFAULT_SCALE_FACTOR: f64 = 1.1;

/// Raw overlapping hits required before a face is confirmed.
pub const DEFAULT_MIN_NEIGHBORS: usize = 5;

/// Smallest face considered, in pixels per side.
pub const DEFAULT_MIN_SIZE: u32 = 100;

/// Largest face considered, in pixels per side.
pub const DEFAULT_MAX_SIZE: u32 = 500;

/// Relative edge tolerance when clustering raw hits.
pub const DEFAULT_GROUP_EPS: f64 = 0.2;

#[derive(Error, Debug, PartialEq)]
pub enum DetectionParamsError {
    #[error("scale factor must be greater than 1.0, got {0}")]
    ScaleFactor(f64),
    #[error("minimum size {min:?} exceeds maximum size {max:?}")]
    SizeBounds { min: (u32, u32), max: (u32, u32) },
    #[error("grouping eps must be positive, got {0}")]
    GroupEps(f64),
}

/// Tuning for multi-scale cascade detection.
#[derive(Clone, Debug, PartialEq)]
pub struct DetectionParams {
    scale_factor: f64,
    min_neighbors: usize,
    min_size: (u32, u32),
    max_size: (u32, u32),
    group_eps: f64,
}

impl DetectionParams {
    pub fn new(
        scale_factor: f64,
        min_neighbors: usize,
        min_size: (u32, u32),
        max_size: (u32, u32),
    ) -> Result<Self, DetectionParamsError> {
        if !(scale_factor > 1.0) {
            return Err(DetectionParamsError::ScaleFactor(scale_factor));
        }
        if min_size.0 > max_size.0 || min_size.1 > max_size.1 {
            return Err(DetectionParamsError::SizeBounds {
                min: min_size,
                max: max_size,
            });
        }
        Ok(Self {
            scale_factor,
            min_neighbors,
            min_size,
            max_size,
            group_eps: DEFAULT_GROUP_EPS,
        })
    }

    pub fn with_group_eps(mut self, eps: f64) -> Result<Self, DetectionParamsError> {
        if !(eps > 0.0) {
            return Err(DetectionParamsError::GroupEps(eps));
        }
        self.group_eps = eps;
        Ok(self)
    }

    pub fn scale_factor(&self) -> f64 {
        self.scale_factor
    }

    pub fn min_neighbors(&self) -> usize {
        self.min_neighbors
    }

    pub fn min_size(&self) -> (u32, u32) {
        self.min_size
    }

    pub fn max_size(&self) -> (u32, u32) {
        self.max_size
    }

    pub fn group_eps(&self) -> f64 {
        self.group_eps
    }
}

impl Default for DetectionParams {
    fn default() -> Self {
        Self {
            scale_factor: DEFAULT_SCALE_FACTOR,
            min_neighbors: DEFAULT_MIN_NEIGHBORS,
            min_size: (DEFAULT_MIN_SIZE, DEFAULT_MIN_SIZE),
            max_size: (DEFAULT_MAX_SIZE, DEFAULT_MAX_SIZE),
            group_eps: DEFAULT_GROUP_EPS,
        }
    }
}
