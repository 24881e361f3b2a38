use std::path::PathBuf;

use ffmpeg_next::format::context::{Context, Input};
use ffmpeg_next::format::Pixel;
use ffmpeg_next::Format;
use ffmpeg_next::software::scaling;
use ffmpeg_next::util::frame::video::Video;
use thiserror::Error;

use crate::capture::domain::frame_source::FrameSource;
use crate::shared::frame::Frame;

#[derive(Error, Debug)]
pub enum FrameSourceError {
    #[error("capture device {device} unavailable: {reason}")]
    DeviceUnavailable { device: String, reason: String },
    #[error("no video stream in {0}")]
    NoVideoStream(String),
    #[error("frame source is not open")]
    NotOpen,
    #[error("decode failed: {0}")]
    Decode(#[from] ffmpeg_next::Error),
}

/// What an [`FfmpegFrameSource`] reads from.
#[derive(Clone, Debug, PartialEq)]
pub enum CaptureTarget {
    /// The platform camera with the index passed to `open`.
    Camera,
    /// A recorded video, replayed once. The device index is ignored.
    File(PathBuf),
}

/// Decodes frames from a camera or video file via ffmpeg-next and converts
/// them to packed RGB24.
pub struct FfmpegFrameSource {
    target: CaptureTarget,
    session: Option<DecodeSession>,
    next_index: usize,
}

// Safety: FfmpegFrameSource is only used from a single thread at a time.
// The raw pointers inside ffmpeg types are not shared across threads.
unsafe impl Send for FfmpegFrameSource {}

impl FfmpegFrameSource {
    pub fn new(target: CaptureTarget) -> Self {
        Self {
            target,
            session: None,
            next_index: 0,
        }
    }

    fn open_input(&self, device_index: u32) -> Result<(Input, String), FrameSourceError> {
        match &self.target {
            CaptureTarget::File(path) => {
                let label = path.display().to_string();
                let ictx = ffmpeg_next::format::input(path).map_err(|e| {
                    FrameSourceError::DeviceUnavailable {
                        device: label.clone(),
                        reason: e.to_string(),
                    }
                })?;
                Ok((ictx, label))
            }
            CaptureTarget::Camera => {
                ffmpeg_next::device::register_all();
                let (format_name, url) = camera_url(device_index);
                let unavailable = |reason: String| FrameSourceError::DeviceUnavailable {
                    device: format!("{format_name}:{url}"),
                    reason,
                };
                let format: Format = ffmpeg_next::device::input::video()
                    .find(|f| f.name() == format_name)
                    .ok_or_else(|| unavailable(format!("input format {format_name} not available")))?;
                let ctx = ffmpeg_next::format::open_with(&url, &format, capture_options())
                    .map_err(|e| unavailable(e.to_string()))?;
                match ctx {
                    Context::Input(ictx) => Ok((ictx, url)),
                    Context::Output(_) => Err(unavailable("opened as output".to_string())),
                }
            }
        }
    }
}

impl FrameSource for FfmpegFrameSource {
    fn open(&mut self, device_index: u32) -> Result<(), Box<dyn std::error::Error>> {
        if self.session.is_some() {
            return Ok(());
        }
        ffmpeg_next::init()?;

        let (ictx, label) = self.open_input(device_index)?;
        let stream = ictx
            .streams()
            .best(ffmpeg_next::media::Type::Video)
            .ok_or_else(|| FrameSourceError::NoVideoStream(label.clone()))?;
        let stream_index = stream.index();
        let codec_ctx = ffmpeg_next::codec::context::Context::from_parameters(stream.parameters())?;
        let decoder = codec_ctx.decoder().video()?;

        log::info!(
            "Opened {label}: {}x{} {:?}",
            decoder.width(),
            decoder.height(),
            decoder.format()
        );

        self.session = Some(DecodeSession {
            ictx,
            decoder,
            scaler: None,
            stream_index,
            flushing: false,
            done: false,
        });
        self.next_index = 0;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.session.is_some()
    }

    fn read_frame(&mut self) -> Result<Option<Frame>, Box<dyn std::error::Error>> {
        let session = self.session.as_mut().ok_or(FrameSourceError::NotOpen)?;
        let frame = session.next_frame(self.next_index)?;
        if frame.is_some() {
            self.next_index += 1;
        }
        Ok(frame)
    }

    fn close(&mut self) {
        if self.session.take().is_some() {
            log::debug!("Frame source closed after {} frames", self.next_index);
        }
    }
}

/// Scaler cached with the input geometry it was built for.
struct Rgb24Scaler {
    context: scaling::Context,
    format: Pixel,
    width: u32,
    height: u32,
}

struct DecodeSession {
    ictx: Input,
    decoder: ffmpeg_next::decoder::Video,
    scaler: Option<Rgb24Scaler>,
    stream_index: usize,
    flushing: bool,
    done: bool,
}

impl DecodeSession {
    fn next_frame(&mut self, index: usize) -> Result<Option<Frame>, FrameSourceError> {
        if self.done {
            return Ok(None);
        }

        if let Some(frame) = self.try_receive(index)? {
            return Ok(Some(frame));
        }

        if self.flushing {
            self.done = true;
            return Ok(None);
        }

        loop {
            let Some((stream, packet)) = self.ictx.packets().next() else {
                let _ = self.decoder.send_eof();
                self.flushing = true;
                if let Some(frame) = self.try_receive(index)? {
                    return Ok(Some(frame));
                }
                self.done = true;
                return Ok(None);
            };

            if stream.index() != self.stream_index {
                continue;
            }

            if self.decoder.send_packet(&packet).is_err() {
                continue;
            }

            if let Some(frame) = self.try_receive(index)? {
                return Ok(Some(frame));
            }
        }
    }

    fn try_receive(&mut self, index: usize) -> Result<Option<Frame>, FrameSourceError> {
        let mut decoded = Video::empty();
        if self.decoder.receive_frame(&mut decoded).is_err() {
            return Ok(None);
        }

        let (width, height) = (decoded.width(), decoded.height());
        if width == 0 || height == 0 {
            return Ok(Some(Frame::empty(index)));
        }

        let scaler = self.scaler_for(&decoded)?;
        let mut rgb = Video::empty();
        scaler.run(&decoded, &mut rgb)?;

        let pixels = extract_rgb_pixels(&rgb, width, height);
        Ok(Some(Frame::new(pixels, width, height, 3, index)))
    }

    /// Scaler for the decoded geometry, rebuilt when the camera mode changes.
    fn scaler_for(&mut self, decoded: &Video) -> Result<&mut scaling::Context, FrameSourceError> {
        let (format, width, height) = (decoded.format(), decoded.width(), decoded.height());
        let stale = match &self.scaler {
            Some(s) => s.format != format || s.width != width || s.height != height,
            None => true,
        };
        if stale {
            let context = scaling::Context::get(
                format,
                width,
                height,
                Pixel::RGB24,
                width,
                height,
                scaling::Flags::BILINEAR,
            )?;
            self.scaler = Some(Rgb24Scaler {
                context,
                format,
                width,
                height,
            });
        }
        match self.scaler.as_mut() {
            Some(s) => Ok(&mut s.context),
            None => Err(FrameSourceError::NotOpen),
        }
    }
}

/// Input format and URL of the platform camera with the given index.
fn camera_url(index: u32) -> (&'static str, String) {
    #[cfg(target_os = "linux")]
    {
        ("v4l2", format!("/dev/video{index}"))
    }
    #[cfg(target_os = "macos")]
    {
        ("avfoundation", index.to_string())
    }
    #[cfg(target_os = "windows")]
    {
        ("vfwcap", index.to_string())
    }
    #[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
    {
        ("v4l2", format!("/dev/video{index}"))
    }
}

fn capture_options() -> ffmpeg_next::Dictionary<'static> {
    let mut options = ffmpeg_next::Dictionary::new();
    // avfoundation rejects the default 29.97 fps on most built-in cameras.
    if cfg!(target_os = "macos") {
        options.set("framerate", "30");
    }
    options
}

/// Copies an RGB24 frame into a tightly packed buffer, dropping row padding.
fn extract_rgb_pixels(rgb: &Video, width: u32, height: u32) -> Vec<u8> {
    let stride = rgb.stride(0);
    let data = rgb.data(0);
    let row_len = width as usize * 3;

    let mut pixels = Vec::with_capacity(row_len * height as usize);
    for row in 0..height as usize {
        let start = row * stride;
        pixels.extend_from_slice(&data[start..start + row_len]);
    }
    pixels
}
