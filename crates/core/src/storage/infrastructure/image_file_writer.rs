use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, GrayImage, ImageFormat, RgbImage};

use crate::shared::frame::Frame;
use crate::storage::domain::image_writer::ImageWriter;

pub const DEFAULT_JPEG_QUALITY: u8 = 95;

/// Writes a single frame to an image file using the `image` crate.
///
/// JPEG output uses an explicit quality; other extensions fall back to the
/// `image` crate's defaults. The image is encoded into a `.part` sibling and
/// renamed over `path`, so a failed write never leaves a partial file.
pub struct ImageFileWriter {
    jpeg_quality: u8,
}

impl ImageFileWriter {
    pub fn new() -> Self {
        Self {
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }

    pub fn with_jpeg_quality(mut self, quality: u8) -> Self {
        self.jpeg_quality = quality.clamp(1, 100);
        self
    }
}

impl Default for ImageFileWriter {
    fn default() -> Self {
        Self::new()
    }
}

fn to_image(frame: &Frame) -> Result<DynamicImage, Box<dyn std::error::Error>> {
    let (w, h) = (frame.width(), frame.height());
    let img = match frame.channels() {
        3 => RgbImage::from_raw(w, h, frame.data().to_vec()).map(DynamicImage::ImageRgb8),
        1 => GrayImage::from_raw(w, h, frame.data().to_vec()).map(DynamicImage::ImageLuma8),
        _ => None,
    };
    img.ok_or_else(|| {
        format!(
            "cannot encode {w}x{h} frame with {} channels",
            frame.channels()
        )
        .into()
    })
}

fn is_jpeg(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| matches!(ext.to_ascii_lowercase().as_str(), "jpg" | "jpeg"))
        .unwrap_or(false)
}

fn temp_sibling(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    path.with_file_name(name)
}

impl ImageFileWriter {
    fn encode(
        &self,
        img: &DynamicImage,
        format: ImageFormat,
        dest: &Path,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let mut file = BufWriter::new(File::create(dest)?);
        if format == ImageFormat::Jpeg {
            let encoder = JpegEncoder::new_with_quality(&mut file, self.jpeg_quality);
            img.write_with_encoder(encoder)?;
        } else {
            img.write_to(&mut file, format)?;
        }
        file.flush()?;
        Ok(())
    }
}

impl ImageWriter for ImageFileWriter {
    fn write(&self, path: &Path, frame: &Frame) -> Result<(), Box<dyn std::error::Error>> {
        if frame.is_empty() {
            return Err("cannot write an empty frame".into());
        }
        let img = to_image(frame)?;
        let format = if is_jpeg(path) {
            ImageFormat::Jpeg
        } else {
            ImageFormat::from_path(path)?
        };

        let temp_path = temp_sibling(path);
        let result = self
            .encode(&img, format, &temp_path)
            .and_then(|()| fs::rename(&temp_path, path).map_err(Into::into));
        if result.is_err() {
            let _ = fs::remove_file(&temp_path);
        }
        result
    }
}
