use crate::shared::bounding_box::DetectionSet;
use crate::shared::frame::Frame;

/// Domain interface for face detection.
///
/// Detection is pure with respect to its input: the same frame bytes must
/// always produce the same [`DetectionSet`], and nothing is carried over
/// between frames.
pub trait FaceDetector: Send {
    fn detect(&self, frame: &Frame) -> Result<DetectionSet, Box<dyn std::error::Error>>;
}

/// Loads the pretrained classifier and binds it to a detector.
///
/// Called once before the capture loop starts; a failure here must stop the
/// pipeline rather than let it run without a working detector.
pub trait ClassifierLoader: Send {
    fn load(&self) -> Result<Box<dyn FaceDetector>, Box<dyn std::error::Error>>;
}
