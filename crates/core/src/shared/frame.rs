use image::{GrayImage, ImageBuffer, Rgb, RgbImage};

/// A single captured frame: contiguous pixel bytes in row-major order.
///
/// Three-channel frames are RGB, single-channel frames are luma. A frame
/// with zero width or height is "empty": camera drivers emit these while
/// warming up and the pipeline skips them.
#[derive(Clone, Debug)]
pub struct Frame {
    data: Vec<u8>,
    width: u32,
    height: u32,
    channels: u8,
    index: usize,
}

impl Frame {
    pub fn new(data: Vec<u8>, width: u32, height: u32, channels: u8, index: usize) -> Self {
        debug_assert_eq!(
            data.len(),
            (width as usize) * (height as usize) * (channels as usize),
            "data length must equal width * height * channels"
        );
        Self {
            data,
            width,
            height,
            channels,
            index,
        }
    }

    /// A zero-sized frame carrying only its sequence index.
    pub fn empty(index: usize) -> Self {
        Self::new(Vec::new(), 0, 0, 3, index)
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// 8-bit luma copy of the frame, used as detector input.
    pub fn to_gray(&self) -> Option<GrayImage> {
        match self.channels {
            1 => GrayImage::from_raw(self.width, self.height, self.data.clone()),
            3 => {
                let view: ImageBuffer<Rgb<u8>, &[u8]> =
                    ImageBuffer::from_raw(self.width, self.height, self.data.as_slice())?;
                Some(image::imageops::grayscale(&view))
            }
            _ => None,
        }
    }

    /// Runs `f` on the frame's pixels viewed as an owned RGB image without
    /// copying. Returns `None` if the frame is not three-channel.
    pub fn with_rgb_image<R>(&mut self, f: impl FnOnce(&mut RgbImage) -> R) -> Option<R> {
        if self.channels != 3 || self.data.len() != self.expected_len() {
            return None;
        }
        let data = std::mem::take(&mut self.data);
        let mut img = RgbImage::from_raw(self.width, self.height, data)?;
        let result = f(&mut img);
        self.data = img.into_raw();
        Some(result)
    }

    fn expected_len(&self) -> usize {
        self.width as usize * self.height as usize * self.channels as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn luma_at(img: &GrayImage, x: u32, y: u32) -> u8 {
        let Luma([v]) = *img.get_pixel(x, y);
        v
    }

    #[test]
    fn test_construction_and_accessors() {
        let data = vec![0u8; 12]; // 2x2x3
        let frame = Frame::new(data.clone(), 2, 2, 3, 5);
        assert_eq!(frame.width(), 2);
        assert_eq!(frame.height(), 2);
        assert_eq!(frame.channels(), 3);
        assert_eq!(frame.index(), 5);
        assert_eq!(frame.data(), &data[..]);
        assert!(!frame.is_empty());
    }

    #[test]
    fn test_empty_frame() {
        let frame = Frame::empty(7);
        assert!(frame.is_empty());
        assert_eq!(frame.index(), 7);
        assert!(frame.data().is_empty());
    }

    #[test]
    fn test_clone_is_independent() {
        let data = vec![100u8; 12];
        let frame = Frame::new(data, 2, 2, 3, 0);
        let mut cloned = frame.clone();
        cloned.data_mut()[0] = 0;
        assert_eq!(frame.data()[0], 100);
        assert_eq!(cloned.data()[0], 0);
    }

    #[test]
    #[should_panic(expected = "data length must equal width * height * channels")]
    fn test_mismatched_data_length_panics_in_debug() {
        let data = vec![0u8; 10]; // wrong size for 2x2x3
        Frame::new(data, 2, 2, 3, 0);
    }

    #[test]
    fn test_to_gray_from_rgb() {
        let frame = Frame::new(vec![255u8; 4 * 3 * 3], 4, 3, 3, 0);
        let gray = frame.to_gray().unwrap();
        assert_eq!(gray.dimensions(), (4, 3));
        assert_eq!(luma_at(&gray, 0, 0), 255);
    }

    #[test]
    fn test_to_gray_from_luma_is_copy() {
        let frame = Frame::new(vec![9u8, 8, 7, 6], 2, 2, 1, 0);
        let gray = frame.to_gray().unwrap();
        assert_eq!(gray.into_raw(), vec![9, 8, 7, 6]);
    }

    #[test]
    fn test_to_gray_rejects_unknown_layout() {
        let frame = Frame::new(vec![0u8; 8], 1, 2, 4, 0);
        assert!(frame.to_gray().is_none());
    }

    #[test]
    fn test_with_rgb_image_writes_back() {
        let mut frame = Frame::new(vec![0u8; 12], 2, 2, 3, 0);
        frame
            .with_rgb_image(|img| img.put_pixel(1, 1, Rgb([1, 2, 3])))
            .unwrap();
        assert_eq!(&frame.data()[9..12], &[1, 2, 3]);
        assert_eq!(frame.data().len(), 12);
    }

    #[test]
    fn test_with_rgb_image_requires_three_channels() {
        let mut frame = Frame::new(vec![0u8; 4], 2, 2, 1, 0);
        assert!(frame.with_rgb_image(|_| ()).is_none());
    }
}
