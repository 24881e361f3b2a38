use std::sync::Arc;

use image::imageops::{self, FilterType};
use image::GrayImage;

use super::haar_cascade::HaarCascade;
use super::integral_image::IntegralImage;
use crate::detection::domain::detection_params::DetectionParams;
use crate::detection::domain::face_detector::FaceDetector;
use crate::detection::domain::rect_grouper::group_rectangles;
use crate::shared::bounding_box::{BoundingBox, DetectionSet};
use crate::shared::frame::Frame;

/// Multi-scale sliding-window detector driven by a Haar cascade.
///
/// The frame is converted to luma and shrunk by `scale_factor` per level
/// while the cascade window stays fixed, so each level finds faces of one
/// size. Raw hits are mapped back to frame coordinates and merged by
/// [`group_rectangles`].
pub struct CascadeFaceDetector {
    cascade: Arc<HaarCascade>,
    params: DetectionParams,
}

impl CascadeFaceDetector {
    pub fn new(cascade: Arc<HaarCascade>, params: DetectionParams) -> Self {
        Self { cascade, params }
    }

    pub fn params(&self) -> &DetectionParams {
        &self.params
    }

    /// All windows the cascade accepts, before grouping.
    pub fn raw_hits(&self, gray: &GrayImage) -> Vec<BoundingBox> {
        let (win_w, win_h) = self.cascade.window();
        let (img_w, img_h) = gray.dimensions();
        let (min_w, min_h) = self.params.min_size();
        let (max_w, max_h) = self.params.max_size();
        let with_tilted = self.cascade.has_tilted_features();

        let mut hits = Vec::new();
        let mut factor = 1.0f64;
        loop {
            let window_w = (win_w as f64 * factor).round() as u32;
            let window_h = (win_h as f64 * factor).round() as u32;
            let scaled_w = (img_w as f64 / factor).round() as u32;
            let scaled_h = (img_h as f64 / factor).round() as u32;
            if scaled_w <= win_w || scaled_h <= win_h {
                break;
            }
            if window_w > max_w || window_h > max_h {
                break;
            }
            if window_w >= min_w && window_h >= min_h {
                let level = if scaled_w == img_w && scaled_h == img_h {
                    gray.clone()
                } else {
                    imageops::resize(gray, scaled_w, scaled_h, FilterType::Triangle)
                };
                let ii = IntegralImage::new(&level, with_tilted);
                self.scan_level(
                    &ii,
                    (scaled_w - win_w, scaled_h - win_h),
                    factor,
                    (window_w as i32, window_h as i32),
                    &mut hits,
                );
            }
            factor *= self.params.scale_factor();
        }
        hits
    }

    fn scan_level(
        &self,
        ii: &IntegralImage,
        positions: (u32, u32),
        factor: f64,
        window: (i32, i32),
        hits: &mut Vec<BoundingBox>,
    ) {
        let (win_w, win_h) = self.cascade.window();
        // Variance is measured one pixel in from the window border.
        let (norm_w, norm_h) = (win_w as usize - 2, win_h as usize - 2);
        let norm_area = (norm_w * norm_h) as f64;
        let step = if factor > 2.0 { 1 } else { 2 };

        for y in (0..positions.1 as usize).step_by(step) {
            for x in (0..positions.0 as usize).step_by(step) {
                let sum = ii.rect_sum(x + 1, y + 1, norm_w, norm_h);
                let sq_sum = ii.rect_sq_sum(x + 1, y + 1, norm_w, norm_h);
                let nf = norm_area * sq_sum - sum * sum;
                let nf = if nf > 0.0 { nf.sqrt() } else { 1.0 };

                if self.cascade.evaluate(ii, x, y, 1.0 / nf) {
                    hits.push(BoundingBox::new(
                        (x as f64 * factor).round() as i32,
                        (y as f64 * factor).round() as i32,
                        window.0,
                        window.1,
                    ));
                }
            }
        }
    }
}

impl FaceDetector for CascadeFaceDetector {
    fn detect(&self, frame: &Frame) -> Result<DetectionSet, Box<dyn std::error::Error>> {
        if frame.is_empty() {
            return Ok(DetectionSet::new());
        }
        let gray = frame.to_gray().ok_or_else(|| {
            format!(
                "cannot convert {}-channel frame {} to grayscale",
                frame.channels(),
                frame.index()
            )
        })?;
        let hits = self.raw_hits(&gray);
        let faces = group_rectangles(&hits, self.params.min_neighbors(), self.params.group_eps());
        log::debug!(
            "frame {}: {} raw hits, {} faces",
            frame.index(),
            hits.len(),
            faces.len()
        );
        Ok(faces)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::infrastructure::haar_cascade::tests::{
        bright_square_features, bright_square_stages, cascade_xml, BRIGHT_SQUARE_CASCADE,
        BRIGHT_SQUARE_LEGACY_CASCADE,
    };

    fn detector_for(xml: &str) -> CascadeFaceDetector {
        let cascade = HaarCascade::from_xml_str(xml).unwrap();
        CascadeFaceDetector::new(Arc::new(cascade), DetectionParams::default())
    }

    fn detector() -> CascadeFaceDetector {
        detector_for(BRIGHT_SQUARE_CASCADE)
    }

    /// Black RGB frame with bright squares given as `(cx, cy, side)`.
    fn frame_with_squares(w: u32, h: u32, squares: &[(u32, u32, u32)]) -> Frame {
        let mut data = vec![0u8; (w * h * 3) as usize];
        for &(cx, cy, side) in squares {
            for y in cy - side / 2..cy + side / 2 {
                for x in cx - side / 2..cx + side / 2 {
                    let i = ((y * w + x) * 3) as usize;
                    data[i..i + 3].copy_from_slice(&[255, 255, 255]);
                }
            }
        }
        Frame::new(data, w, h, 3, 0)
    }

    fn assert_centered_near(b: &BoundingBox, cx: f64, cy: f64) {
        let (bx, by) = b.center();
        assert!(
            (bx - cx).abs() <= 30.0 && (by - cy).abs() <= 30.0,
            "box {b:?} centred at ({bx}, {by}), expected near ({cx}, {cy})"
        );
    }

    #[test]
    fn test_uniform_frames_have_no_faces() {
        let d = detector();
        for value in [0u8, 128, 255] {
            let frame = Frame::new(vec![value; 400 * 400 * 3], 400, 400, 3, 0);
            assert!(d.detect(&frame).unwrap().is_empty());
        }
    }

    #[test]
    fn test_single_square_gives_one_face() {
        let d = detector();
        let frame = frame_with_squares(400, 400, &[(200, 200, 60)]);
        let faces = d.detect(&frame).unwrap();
        assert_eq!(faces.len(), 1);
        assert_centered_near(&faces[0], 200.0, 200.0);
    }

    #[test]
    fn test_detection_is_deterministic() {
        let d = detector();
        let frame = frame_with_squares(400, 400, &[(200, 200, 60)]);
        let first = d.detect(&frame).unwrap();
        assert_eq!(d.detect(&frame).unwrap(), first);
        assert_eq!(d.detect(&frame.clone()).unwrap(), first);
    }

    #[test]
    fn test_annotating_a_copy_does_not_affect_detection() {
        use crate::annotation::domain::frame_annotator::FrameAnnotator;
        use crate::annotation::infrastructure::box_annotator::BoxAnnotator;

        let d = detector();
        let original = frame_with_squares(400, 400, &[(200, 200, 60)]);
        let faces = d.detect(&original).unwrap();

        let mut annotated = original.clone();
        BoxAnnotator::new().annotate(&mut annotated, &faces).unwrap();
        assert_ne!(annotated.data(), original.data());

        assert_eq!(d.detect(&original.clone()).unwrap(), faces);
    }

    #[test]
    fn test_two_squares_give_two_faces_top_first() {
        let d = detector();
        let frame = frame_with_squares(400, 400, &[(120, 120, 50), (300, 290, 50)]);
        let faces = d.detect(&frame).unwrap();
        assert_eq!(faces.len(), 2);
        assert_centered_near(&faces[0], 120.0, 120.0);
        assert_centered_near(&faces[1], 300.0, 290.0);
    }

    #[test]
    fn test_raw_hits_respect_size_bounds() {
        let cascade = HaarCascade::from_xml_str(BRIGHT_SQUARE_CASCADE).unwrap();
        let params = DetectionParams::new(1.1, 5, (120, 120), (160, 160)).unwrap();
        let d = CascadeFaceDetector::new(Arc::new(cascade), params);
        let frame = frame_with_squares(400, 400, &[(200, 200, 60)]);
        let hits = d.raw_hits(&frame.to_gray().unwrap());
        assert!(!hits.is_empty());
        for hit in hits {
            assert!((120..=160).contains(&hit.width), "{hit:?}");
            assert_eq!(hit.width, hit.height);
        }
    }

    #[test]
    fn test_legacy_layout_detects_the_same_faces() {
        let legacy = detector_for(BRIGHT_SQUARE_LEGACY_CASCADE);
        let frame = frame_with_squares(400, 400, &[(120, 120, 50), (300, 290, 50)]);
        let faces = legacy.detect(&frame).unwrap();
        assert_eq!(faces.len(), 2);
        assert_eq!(faces, detector().detect(&frame).unwrap());
    }

    /// Bright-square stages plus one stage on a tilted diamond over the
    /// window centre. `leaves` holds the dark and lit votes.
    fn with_tilted_stage(leaves: &'static str) -> CascadeFaceDetector {
        let mut stages = bright_square_stages();
        stages.push((0.0, vec![("0 -1 2 1e-9", leaves)]));
        let mut features = bright_square_features();
        features.push(("10 5 5 5 1", true));
        detector_for(&cascade_xml(&stages, &features))
    }

    #[test]
    fn test_passing_tilted_stage_keeps_detections() {
        let d = with_tilted_stage("-1 1");
        let frame = frame_with_squares(400, 400, &[(200, 200, 60)]);
        let faces = d.detect(&frame).unwrap();
        assert_eq!(faces.len(), 1);
        assert_eq!(faces, detector().detect(&frame).unwrap());
    }

    #[test]
    fn test_rejecting_tilted_stage_removes_detections() {
        let d = with_tilted_stage("1 -1");
        let frame = frame_with_squares(400, 400, &[(200, 200, 60)]);
        assert!(d.raw_hits(&frame.to_gray().unwrap()).is_empty());
        assert!(d.detect(&frame).unwrap().is_empty());
    }

    /// Twenty stages: the two bright-square stages repeated, then `last`.
    fn twenty_stage_xml(last: (f64, Vec<(&'static str, &'static str)>)) -> String {
        let base = bright_square_stages();
        let mut stages: Vec<_> = (0..19).map(|i| base[i % 2].clone()).collect();
        stages.push(last);
        cascade_xml(&stages, &bright_square_features())
    }

    #[test]
    fn test_twenty_stage_cascade_matches_its_two_stage_core() {
        let xml = twenty_stage_xml((0.0, vec![("0 -1 0 0.2", "-1 1")]));
        assert_eq!(HaarCascade::from_xml_str(&xml).unwrap().stage_count(), 20);
        let frame = frame_with_squares(400, 400, &[(200, 200, 60)]);
        assert_eq!(
            detector_for(&xml).detect(&frame).unwrap(),
            detector().detect(&frame).unwrap()
        );
    }

    #[test]
    fn test_twenty_stage_cascade_rejects_at_last_stage() {
        let d = detector_for(&twenty_stage_xml((1e9, vec![("0 -1 0 0.2", "-1 1")])));
        let frame = frame_with_squares(400, 400, &[(200, 200, 60)]);
        assert!(d.detect(&frame).unwrap().is_empty());
    }

    #[test]
    #[ignore] // Requires crates/core/cascades/haarcascade_frontalface_alt2.xml
    fn test_bundled_frontal_face_cascade() {
        use crate::shared::constants::{BUNDLED_CASCADE_DIR, CASCADE_MODEL_NAME};

        let path = std::path::Path::new(BUNDLED_CASCADE_DIR).join(CASCADE_MODEL_NAME);
        let cascade = HaarCascade::load(&path).unwrap();
        assert_eq!(cascade.window(), (20, 20));
        assert_eq!(cascade.stage_count(), 20);

        let d = CascadeFaceDetector::new(Arc::new(cascade), DetectionParams::default());
        for value in [0u8, 128, 255] {
            let frame = Frame::new(vec![value; 320 * 240 * 3], 320, 240, 3, 0);
            assert!(d.detect(&frame).unwrap().is_empty());
        }

        let textured: Vec<u8> = (0..320 * 240 * 3).map(|i| ((i * 37) % 251) as u8).collect();
        let frame = Frame::new(textured, 320, 240, 3, 0);
        let first = d.detect(&frame).unwrap();
        assert_eq!(d.detect(&frame).unwrap(), first);
    }

    #[test]
    fn test_frame_smaller_than_window_has_no_faces() {
        let d = detector();
        let frame = Frame::new(vec![255u8; 10 * 10 * 3], 10, 10, 3, 0);
        assert!(d.detect(&frame).unwrap().is_empty());
    }

    #[test]
    fn test_empty_frame_has_no_faces() {
        assert!(detector().detect(&Frame::empty(3)).unwrap().is_empty());
    }

    #[test]
    fn test_unsupported_channel_layout_is_error() {
        let frame = Frame::new(vec![0u8; 40 * 40 * 4], 40, 40, 4, 0);
        assert!(detector().detect(&frame).is_err());
    }
}
