//! Flat RGBA8 raster passed between pipeline stages.

use image::RgbaImage;

use crate::error::Error;

/// A `width × height` RGBA8 raster stored row-major.
///
/// Cloning performs a deep copy; buffers handed to the background worker
/// are always cloned so neither side aliases the other's pixels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl PixelBuffer {
    /// Wrap raw RGBA bytes.
    ///
    /// # Errors
    /// Returns [`Error::BufferSize`] if `pixels.len() != width * height * 4`.
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self, Error> {
        let expected = byte_len(width, height);
        if pixels.len() != expected {
            return Err(Error::BufferSize {
                expected,
                actual: pixels.len(),
            });
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    /// Fully transparent buffer of the given size.
    #[must_use]
    pub fn blank(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![0; byte_len(width, height)],
        }
    }

    #[must_use]
    pub fn from_image(image: RgbaImage) -> Self {
        let (width, height) = image.dimensions();
        Self {
            width,
            height,
            pixels: image.into_raw(),
        }
    }

    /// Convert into an `image` buffer for drawing or encoding.
    #[must_use]
    pub fn into_image(self) -> RgbaImage {
        // Length invariant is upheld by every constructor.
        RgbaImage::from_raw(self.width, self.height, self.pixels)
            .unwrap_or_else(|| RgbaImage::new(0, 0))
    }

    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    #[must_use]
    pub const fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    #[must_use]
    pub fn as_raw(&self) -> &[u8] {
        &self.pixels
    }

    pub fn as_raw_mut(&mut self) -> &mut [u8] {
        &mut self.pixels
    }

    #[must_use]
    pub fn into_raw(self) -> Vec<u8> {
        self.pixels
    }

    /// Whether the buffer holds no pixels at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }

    /// Byte offset of pixel `(x, y)`.
    #[must_use]
    pub const fn offset(&self, x: u32, y: u32) -> usize {
        ((y as usize) * (self.width as usize) + (x as usize)) * 4
    }

    /// Copy of the RGBA samples at `(x, y)`.
    ///
    /// # Panics
    /// Panics if the coordinate lies outside the buffer.
    #[must_use]
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let i = self.offset(x, y);
        [
            self.pixels[i],
            self.pixels[i + 1],
            self.pixels[i + 2],
            self.pixels[i + 3],
        ]
    }
}

const fn byte_len(width: u32, height: u32) -> usize {
    (width as usize) * (height as usize) * 4
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_mismatched_length() {
        let err = PixelBuffer::new(2, 2, vec![0; 15]).unwrap_err();
        assert!(matches!(
            err,
            Error::BufferSize {
                expected: 16,
                actual: 15
            }
        ));
    }

    #[test]
    fn image_conversion_keeps_layout() {
        let buf = PixelBuffer::new(2, 1, vec![1, 2, 3, 4, 5, 6, 7, 8]).unwrap();
        let img = buf.clone().into_image();
        assert_eq!(img.get_pixel(1, 0).0, [5, 6, 7, 8]);
        assert_eq!(PixelBuffer::from_image(img), buf);
        assert_eq!(buf.pixel(1, 0), [5, 6, 7, 8]);
    }
}
