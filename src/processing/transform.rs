use std::ops::Mul;

use crate::buffer::PixelBuffer;
use crate::config::TransformOptions;
use crate::surface::PixelSurface;

/// 2D affine matrix in canvas order: `x' = a·x + c·y + e`, `y' = b·x + d·y + f`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Affine {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub e: f64,
    pub f: f64,
}

impl Affine {
    pub const IDENTITY: Self = Self {
        a: 1.0,
        b: 0.0,
        c: 0.0,
        d: 1.0,
        e: 0.0,
        f: 0.0,
    };

    #[must_use]
    pub const fn translate(x: f64, y: f64) -> Self {
        Self {
            e: x,
            f: y,
            ..Self::IDENTITY
        }
    }

    #[must_use]
    pub const fn scale(x: f64, y: f64) -> Self {
        Self {
            a: x,
            d: y,
            ..Self::IDENTITY
        }
    }

    /// Clockwise rotation in screen space (y axis pointing down).
    #[must_use]
    pub fn rotate_degrees(degrees: f64) -> Self {
        let (sin, cos) = degrees.to_radians().sin_cos();
        Self {
            a: cos,
            b: sin,
            c: -sin,
            d: cos,
            ..Self::IDENTITY
        }
    }

    /// Shear with tangent factors, matching `transform(1, y, x, 1, 0, 0)`.
    #[must_use]
    pub const fn skew(x: f64, y: f64) -> Self {
        Self {
            b: y,
            c: x,
            ..Self::IDENTITY
        }
    }

    #[must_use]
    pub fn apply(&self, x: f64, y: f64) -> (f64, f64) {
        (
            self.a * x + self.c * y + self.e,
            self.b * x + self.d * y + self.f,
        )
    }

    #[must_use]
    pub fn is_identity(&self) -> bool {
        *self == Self::IDENTITY
    }

    /// Inverse matrix, or `None` when the transform collapses the plane.
    #[must_use]
    pub fn invert(&self) -> Option<Self> {
        let det = self.a * self.d - self.b * self.c;
        if det.abs() < f64::EPSILON || !det.is_finite() {
            return None;
        }
        let inv = det.recip();
        Some(Self {
            a: self.d * inv,
            b: -self.b * inv,
            c: -self.c * inv,
            d: self.a * inv,
            e: (self.c * self.f - self.d * self.e) * inv,
            f: (self.b * self.e - self.a * self.f) * inv,
        })
    }
}

impl Default for Affine {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// `lhs * rhs` applies `rhs` first, like successive canvas transform calls.
impl Mul for Affine {
    type Output = Self;

    fn mul(self, rhs: Self) -> Self {
        Self {
            a: self.a * rhs.a + self.c * rhs.b,
            b: self.b * rhs.a + self.d * rhs.b,
            c: self.a * rhs.c + self.c * rhs.d,
            d: self.b * rhs.c + self.d * rhs.d,
            e: self.a * rhs.e + self.c * rhs.f + self.e,
            f: self.b * rhs.e + self.d * rhs.f + self.f,
        }
    }
}

/// Compose all transform options into one matrix about the image center:
/// translate to center, rotate, scale, skew, flip, translate back.
#[must_use]
pub fn compose(options: &TransformOptions, width: u32, height: u32) -> Affine {
    let cx = f64::from(width) / 2.0;
    let cy = f64::from(height) / 2.0;
    let mut m = Affine::translate(cx, cy);
    if let Some(degrees) = options.rotate {
        m = m * Affine::rotate_degrees(f64::from(degrees));
    }
    if let Some(s) = options.scale {
        m = m * Affine::scale(f64::from(s), f64::from(s));
    }
    if options.skew_x.is_some() || options.skew_y.is_some() {
        m = m * Affine::skew(
            f64::from(options.skew_x.unwrap_or(0.0)),
            f64::from(options.skew_y.unwrap_or(0.0)),
        );
    }
    if options.flip_x || options.flip_y {
        m = m * Affine::scale(
            if options.flip_x { -1.0 } else { 1.0 },
            if options.flip_y { -1.0 } else { 1.0 },
        );
    }
    m * Affine::translate(-cx, -cy)
}

/// Redraw `buffer` once through the composed matrix.
///
/// Output keeps the input dimensions; content pushed outside is clipped and
/// uncovered pixels become transparent.
pub fn apply_transform<S: PixelSurface + ?Sized>(
    surface: &mut S,
    buffer: PixelBuffer,
    options: &TransformOptions,
) -> PixelBuffer {
    if options.is_noop() {
        return buffer;
    }
    let (width, height) = buffer.dimensions();
    let matrix = compose(options, width, height);
    let image = buffer.into_image();
    if surface.dimensions() == (width, height) {
        surface.clear();
    } else {
        surface.resize(width, height);
    }
    surface.draw(&image, &matrix);
    surface.read_buffer()
}
