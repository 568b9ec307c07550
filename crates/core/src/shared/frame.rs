use image::RgbImage;

/// One decoded RGB picture and its position in decode order.
///
/// Readers hand out frames; validation and debug rendering only read them.
#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    image: RgbImage,
    index: usize,
}

impl Frame {
    pub fn new(image: RgbImage, index: usize) -> Self {
        Self { image, index }
    }

    /// Wraps tightly packed RGB24 bytes. `None` if the buffer holds fewer
    /// than `width * height * 3` bytes.
    pub fn from_rgb(data: Vec<u8>, width: u32, height: u32, index: usize) -> Option<Self> {
        RgbImage::from_raw(width, height, data).map(|image| Self::new(image, index))
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub fn data(&self) -> &[u8] {
        self.image.as_raw()
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Reference length for relative face size.
    pub fn longest_side(&self) -> u32 {
        self.width().max(self.height())
    }

    pub fn same_dimensions(&self, other: &Frame) -> bool {
        self.image.dimensions() == other.image.dimensions()
    }
}
