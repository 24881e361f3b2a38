use crate::shared::bounding_box::BoundingBox;
use crate::shared::frame::Frame;

/// Draws detections onto a frame.
///
/// Implementations modify the frame in-place (`&mut Frame`) and only read the
/// detections.
pub trait FrameAnnotator: Send {
    fn annotate(
        &self,
        frame: &mut Frame,
        detections: &[BoundingBox],
    ) -> Result<(), Box<dyn std::error::Error>>;
}
