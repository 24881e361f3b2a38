use image::{Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;

use super::bitmap_font::{draw_text_mut, text_size};
use crate::annotation::domain::frame_annotator::FrameAnnotator;
use crate::shared::bounding_box::BoundingBox;
use crate::shared::constants::DETECTION_LABEL;
use crate::shared::frame::Frame;

pub const DEFAULT_BOX_COLOR: Rgb<u8> = Rgb([0, 0, 255]);
pub const DEFAULT_THICKNESS: u32 = 3;
pub const DEFAULT_LABEL_SCALE: u32 = 2;

/// Gap between the label's bottom edge and the outer edge of the box outline.
const LABEL_GAP: i32 = 2;

/// Outlines each detection and writes a fixed label above it.
pub struct BoxAnnotator {
    color: Rgb<u8>,
    thickness: u32,
    label: String,
    label_scale: u32,
}

impl BoxAnnotator {
    pub fn new() -> Self {
        Self {
            color: DEFAULT_BOX_COLOR,
            thickness: DEFAULT_THICKNESS,
            label: DETECTION_LABEL.to_string(),
            label_scale: DEFAULT_LABEL_SCALE,
        }
    }

    pub fn with_color(mut self, color: Rgb<u8>) -> Self {
        self.color = color;
        self
    }

    pub fn with_label(mut self, label: &str) -> Self {
        self.label = label.to_string();
        self
    }

    /// Concentric one-pixel outlines centred on the box edge.
    fn draw_box(&self, img: &mut RgbImage, b: &BoundingBox) {
        let half = (self.thickness / 2) as i32;
        for d in -half..=(self.thickness as i32 - 1 - half) {
            let w = b.width - 2 * d;
            let h = b.height - 2 * d;
            if w <= 0 || h <= 0 {
                continue;
            }
            let rect = Rect::at(b.x + d, b.y + d).of_size(w as u32, h as u32);
            draw_hollow_rect_mut(img, rect, self.color);
        }
    }

    /// Left-aligned with the box, just above its outline, kept inside the
    /// image.
    fn draw_label(&self, img: &mut RgbImage, b: &BoundingBox) {
        let (text_w, text_h) = text_size(&self.label, self.label_scale);
        let outline = (self.thickness / 2) as i32;
        let max_x = (img.width() as i32 - text_w as i32).max(0);
        let x = b.x.clamp(0, max_x);
        let y = (b.y - outline - LABEL_GAP - text_h as i32).max(0);
        draw_text_mut(img, &self.label, x, y, self.label_scale, self.color);
    }
}

impl Default for BoxAnnotator {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameAnnotator for BoxAnnotator {
    fn annotate(
        &self,
        frame: &mut Frame,
        detections: &[BoundingBox],
    ) -> Result<(), Box<dyn std::error::Error>> {
        if detections.is_empty() {
            return Ok(());
        }
        let channels = frame.channels();
        frame
            .with_rgb_image(|img| {
                for b in detections {
                    self.draw_box(img, b);
                    self.draw_label(img, b);
                }
            })
            .ok_or_else(|| format!("annotation needs an RGB frame, got {channels} channels"))?;
        Ok(())
    }
}
