use crate::shared::frame::Frame;

/// A live or recorded stream of frames.
///
/// `open` and `close` are idempotent: opening an already-open source keeps
/// the existing handle, and closing a closed source does nothing.
pub trait FrameSource: Send {
    /// Acquires the capture device with the given index.
    fn open(&mut self, device_index: u32) -> Result<(), Box<dyn std::error::Error>>;

    fn is_open(&self) -> bool;

    /// Blocks until the next frame is available. `Ok(None)` means the stream
    /// has ended. A frame with zero dimensions may be returned while a device
    /// warms up.
    fn read_frame(&mut self) -> Result<Option<Frame>, Box<dyn std::error::Error>>;

    /// Releases the device.
    fn close(&mut self);
}
