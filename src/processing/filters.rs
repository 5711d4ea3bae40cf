use crate::buffer::PixelBuffer;
use crate::config::FilterOptions;

use super::{clamp_u8, luma};

const SEPIA: [[f32; 3]; 3] = [
    [0.393, 0.769, 0.189],
    [0.349, 0.686, 0.168],
    [0.272, 0.534, 0.131],
];

/// Apply the per-pixel color filters in place.
///
/// Enabled filters run in a fixed order (brightness, contrast, grayscale,
/// invert, sepia) and each one sees the stored output of the previous one.
/// Alpha is never touched.
pub fn apply_filters(buffer: &mut PixelBuffer, options: &FilterOptions) {
    if buffer.is_empty() || options.is_noop() {
        return;
    }
    for pixel in buffer.as_raw_mut().chunks_exact_mut(4) {
        let mut rgb = [pixel[0], pixel[1], pixel[2]];
        if let Some(k) = options.brightness {
            rgb = rgb.map(|v| brightness(v, k));
        }
        if let Some(k) = options.contrast {
            rgb = rgb.map(|v| contrast(v, k));
        }
        if options.grayscale {
            rgb = [luma(rgb[0], rgb[1], rgb[2]); 3];
        }
        if options.invert {
            rgb = rgb.map(|v| 255 - v);
        }
        if options.sepia {
            rgb = sepia(rgb);
        }
        pixel[..3].copy_from_slice(&rgb);
    }
}

fn brightness(value: u8, k: f32) -> u8 {
    clamp_u8((f32::from(value) * k).min(255.0))
}

/// `((v/255 - 0.5)·k + 0.5)·255`, expanded around 127.5 so `k = 1` is exact.
fn contrast(value: u8, k: f32) -> u8 {
    clamp_u8((f32::from(value) - 127.5) * k + 127.5)
}

fn sepia(rgb: [u8; 3]) -> [u8; 3] {
    let [r, g, b] = rgb.map(f32::from);
    SEPIA.map(|row| clamp_u8((row[0] * r + row[1] * g + row[2] * b).min(255.0)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quad() -> PixelBuffer {
        PixelBuffer::new(
            2,
            2,
            vec![
                255, 0, 0, 255, 0, 255, 0, 255, 0, 0, 255, 255, 255, 255, 255, 255,
            ],
        )
        .unwrap()
    }

    fn gradient() -> PixelBuffer {
        let pixels = (0..16u32 * 16)
            .flat_map(|i| {
                [
                    (i % 256) as u8,
                    (i * 7 % 256) as u8,
                    (i * 13 % 256) as u8,
                    (i % 200) as u8,
                ]
            })
            .collect();
        PixelBuffer::new(16, 16, pixels).unwrap()
    }

    #[test]
    fn grayscale_uses_floored_luma() {
        let mut buf = quad();
        apply_filters(
            &mut buf,
            &FilterOptions {
                grayscale: true,
                ..FilterOptions::default()
            },
        );
        assert_eq!(buf.pixel(0, 0), [76, 76, 76, 255]);
        assert_eq!(buf.pixel(1, 0), [149, 149, 149, 255]);
        assert_eq!(buf.pixel(0, 1), [29, 29, 29, 255]);
        assert_eq!(buf.pixel(1, 1), [255, 255, 255, 255]);
    }

    #[test]
    fn grayscale_is_idempotent() {
        let options = FilterOptions {
            grayscale: true,
            ..FilterOptions::default()
        };
        let mut once = gradient();
        apply_filters(&mut once, &options);
        let mut twice = once.clone();
        apply_filters(&mut twice, &options);
        assert_eq!(once, twice);
    }

    #[test]
    fn invert_is_self_inverse() {
        let options = FilterOptions {
            invert: true,
            ..FilterOptions::default()
        };
        let original = gradient();
        let mut buf = original.clone();
        apply_filters(&mut buf, &options);
        assert_ne!(buf, original);
        apply_filters(&mut buf, &options);
        assert_eq!(buf, original);
    }

    #[test]
    fn brightness_stays_in_range_and_keeps_alpha() {
        let original = gradient();
        for k in [-3.0, 0.0, 0.5, 1.0, 2.5, 1000.0] {
            let mut buf = original.clone();
            apply_filters(
                &mut buf,
                &FilterOptions {
                    brightness: Some(k),
                    ..FilterOptions::default()
                },
            );
            let pairs = buf
                .as_raw()
                .chunks_exact(4)
                .zip(original.as_raw().chunks_exact(4));
            for (out, src) in pairs {
                assert_eq!(out[3], src[3]);
            }
        }
        let mut buf = original.clone();
        apply_filters(
            &mut buf,
            &FilterOptions {
                brightness: Some(1000.0),
                ..FilterOptions::default()
            },
        );
        assert_eq!(buf.pixel(1, 0)[0], 255);
        assert_eq!(buf.pixel(0, 0)[0], 0);
    }

    #[test]
    fn contrast_one_is_identity() {
        let greys = (0..=255u8).flat_map(|v| [v, v, v, 255]).collect();
        let original = PixelBuffer::new(16, 16, greys).unwrap();
        let mut buf = original.clone();
        apply_filters(
            &mut buf,
            &FilterOptions {
                contrast: Some(1.0),
                ..FilterOptions::default()
            },
        );
        assert_eq!(buf, original);

        let mut buf = gradient();
        apply_filters(
            &mut buf,
            &FilterOptions {
                contrast: Some(1.0),
                ..FilterOptions::default()
            },
        );
        assert_eq!(buf, gradient());
    }

    #[test]
    fn contrast_spreads_around_mid_grey() {
        let pixels = vec![0, 0, 0, 255, 100, 100, 100, 255, 200, 200, 200, 255];
        let mut buf = PixelBuffer::new(3, 1, pixels).unwrap();
        apply_filters(
            &mut buf,
            &FilterOptions {
                contrast: Some(2.0),
                ..FilterOptions::default()
            },
        );
        // (100 - 127.5) * 2 + 127.5 = 72.5; (200 - 127.5) * 2 + 127.5 = 272.5 clamps.
        assert_eq!(buf.pixel(0, 0), [0, 0, 0, 255]);
        assert_eq!(buf.pixel(1, 0), [72, 72, 72, 255]);
        assert_eq!(buf.pixel(2, 0), [255, 255, 255, 255]);
    }

    #[test]
    fn sepia_clamps_white() {
        let mut buf = quad();
        apply_filters(
            &mut buf,
            &FilterOptions {
                sepia: true,
                ..FilterOptions::default()
            },
        );
        assert_eq!(buf.pixel(1, 1), [255, 255, 238, 255]);
    }

    #[test]
    fn later_filters_see_earlier_output() {
        let mut buf = PixelBuffer::new(1, 1, vec![100, 100, 100, 10]).unwrap();
        apply_filters(
            &mut buf,
            &FilterOptions {
                brightness: Some(2.0),
                invert: true,
                ..FilterOptions::default()
            },
        );
        assert_eq!(buf.pixel(0, 0), [55, 55, 55, 10]);
    }
}
