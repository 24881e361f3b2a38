use std::time::Duration;

use crate::shared::frame::Frame;

/// Surface the pipeline renders annotated frames to and polls for keys.
pub trait FrameDisplay: Send {
    fn open(&mut self, title: &str) -> Result<(), Box<dyn std::error::Error>>;

    fn render(&mut self, frame: &Frame) -> Result<(), Box<dyn std::error::Error>>;

    /// Waits at most `timeout` for a key press.
    fn wait_key(&mut self, timeout: Duration) -> Option<char>;

    /// Idempotent.
    fn close(&mut self);
}
