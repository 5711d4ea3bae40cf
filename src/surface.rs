//! Platform-agnostic drawing surface and the sources it can rasterize.

use std::borrow::Cow;
use std::path::PathBuf;

use image::RgbaImage;
use tracing::debug;

use crate::buffer::PixelBuffer;
use crate::error::Error;
use crate::processing::transform::Affine;

/// Something that can be rasterized into a pixel buffer.
#[derive(Debug, Clone)]
pub enum Source {
    /// Already decoded bitmap.
    Bitmap(RgbaImage),
    /// Encoded image bytes (PNG, JPEG, GIF, WebP).
    Blob(Vec<u8>),
    /// Encoded image on disk.
    Path(PathBuf),
}

impl Source {
    /// Decode to RGBA8. No partial image is ever returned.
    ///
    /// # Errors
    /// Returns [`Error::Decode`] if the data cannot be decoded or is empty.
    pub fn decode(&self) -> Result<Cow<'_, RgbaImage>, Error> {
        let image = match self {
            Self::Bitmap(image) => Cow::Borrowed(image),
            Self::Blob(bytes) => Cow::Owned(
                image::load_from_memory(bytes)
                    .map_err(|err| Error::Decode(err.to_string()))?
                    .to_rgba8(),
            ),
            Self::Path(path) => {
                let reader = image::ImageReader::open(path)
                    .and_then(|r| r.with_guessed_format())
                    .map_err(|err| Error::Decode(format!("{}: {err}", path.display())))?;
                let decoded = reader
                    .decode()
                    .map_err(|err| Error::Decode(format!("{}: {err}", path.display())))?;
                Cow::Owned(decoded.to_rgba8())
            }
        };
        if image.width() == 0 || image.height() == 0 {
            return Err(Error::Decode("source has no pixels".into()));
        }
        Ok(image)
    }
}

impl From<RgbaImage> for Source {
    fn from(image: RgbaImage) -> Self {
        Self::Bitmap(image)
    }
}

impl From<PixelBuffer> for Source {
    fn from(buffer: PixelBuffer) -> Self {
        Self::Bitmap(buffer.into_image())
    }
}

/// Drawing target owned by a single processor.
///
/// Resizing discards existing contents, so callers must resize before drawing.
pub trait PixelSurface {
    /// Reallocate to `width × height`, clearing everything to transparent.
    fn resize(&mut self, width: u32, height: u32);

    fn dimensions(&self) -> (u32, u32);

    /// Clear to transparent without changing size.
    fn clear(&mut self);

    /// Draw `image` through `transform`; areas it does not cover are left as is.
    fn draw(&mut self, image: &RgbaImage, transform: &Affine);

    /// Copy the current contents out.
    fn read_buffer(&self) -> PixelBuffer;

    /// Size the surface to the source's natural dimensions, draw it, read it back.
    ///
    /// # Errors
    /// Returns [`Error::Decode`] when the source cannot be decoded.
    fn rasterize(&mut self, source: &Source) -> Result<PixelBuffer, Error> {
        let image = source.decode()?;
        let (width, height) = image.dimensions();
        // Resize first: resizing after drawing would wipe the drawn pixels.
        self.resize(width, height);
        self.draw(&image, &Affine::IDENTITY);
        debug!(width, height, "rasterized source");
        Ok(self.read_buffer())
    }
}

/// CPU surface backed by an `RgbaImage`.
#[derive(Debug, Clone, Default)]
pub struct SoftwareSurface {
    canvas: RgbaImage,
}

impl SoftwareSurface {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl PixelSurface for SoftwareSurface {
    fn resize(&mut self, width: u32, height: u32) {
        self.canvas = RgbaImage::new(width, height);
    }

    fn dimensions(&self) -> (u32, u32) {
        self.canvas.dimensions()
    }

    fn clear(&mut self) {
        self.canvas.fill(0);
    }

    fn draw(&mut self, image: &RgbaImage, transform: &Affine) {
        if transform.is_identity() && image.dimensions() == self.canvas.dimensions() {
            self.canvas.copy_from_slice(image.as_raw());
            return;
        }
        let Some(inverse) = transform.invert() else {
            return;
        };
        let (src_w, src_h) = image.dimensions();
        if src_w == 0 || src_h == 0 {
            return;
        }
        for (x, y, pixel) in self.canvas.enumerate_pixels_mut() {
            let (u, v) = inverse.apply(f64::from(x) + 0.5, f64::from(y) + 0.5);
            // Back to sample space, where integer coordinates are pixel centers.
            let (u, v) = (u - 0.5, v - 0.5);
            if u < -0.5 || v < -0.5 || u >= f64::from(src_w) - 0.5 || v >= f64::from(src_h) - 0.5
            {
                continue;
            }
            pixel.0 = sample_bilinear(image, u, v);
        }
    }

    fn read_buffer(&self) -> PixelBuffer {
        PixelBuffer::from_image(self.canvas.clone())
    }
}

fn sample_bilinear(image: &RgbaImage, u: f64, v: f64) -> [u8; 4] {
    let max_x = f64::from(image.width() - 1);
    let max_y = f64::from(image.height() - 1);
    let u = u.clamp(0.0, max_x);
    let v = v.clamp(0.0, max_y);
    let x0 = u.floor();
    let y0 = v.floor();
    let tx = u - x0;
    let ty = v - y0;
    let x0 = x0 as u32;
    let y0 = y0 as u32;
    let x1 = (x0 + 1).min(image.width() - 1);
    let y1 = (y0 + 1).min(image.height() - 1);
    let p00 = image.get_pixel(x0, y0).0;
    let p10 = image.get_pixel(x1, y0).0;
    let p01 = image.get_pixel(x0, y1).0;
    let p11 = image.get_pixel(x1, y1).0;
    let mut out = [0u8; 4];
    for c in 0..4 {
        let top = f64::from(p00[c]) * (1.0 - tx) + f64::from(p10[c]) * tx;
        let bottom = f64::from(p01[c]) * (1.0 - tx) + f64::from(p11[c]) * tx;
        out[c] = (top * (1.0 - ty) + bottom * ty).round().clamp(0.0, 255.0) as u8;
    }
    out
}
