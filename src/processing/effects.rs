use rand::Rng;

use crate::buffer::PixelBuffer;
use crate::config::EffectOptions;

use super::clamp_u8;

const MAX_GLITCH_LINES: u32 = 9;
const MAX_GLITCH_SHIFT: i32 = 10;

/// Apply spatial effects in the fixed order glitch, pixelate, noise.
pub fn apply_effects<R: Rng + ?Sized>(
    buffer: &mut PixelBuffer,
    options: &EffectOptions,
    rng: &mut R,
) {
    if buffer.is_empty() {
        return;
    }
    if options.glitch {
        apply_glitch(buffer, rng);
    }
    if let Some(size) = options.pixelate {
        apply_pixelate(buffer, size);
    }
    if let Some(intensity) = options.noise {
        apply_noise(buffer, intensity, rng);
    }
}

/// Rotate a handful of random scanlines horizontally, wrapping at the row edge.
pub fn apply_glitch<R: Rng + ?Sized>(buffer: &mut PixelBuffer, rng: &mut R) {
    let (width, height) = buffer.dimensions();
    if width == 0 || height == 0 {
        return;
    }
    let row_len = width as usize * 4;
    let mut scratch = vec![0u8; row_len];
    let lines = rng.random_range(0..=MAX_GLITCH_LINES);
    for _ in 0..lines {
        let y = rng.random_range(0..height) as usize;
        let offset = rng.random_range(-MAX_GLITCH_SHIFT..=MAX_GLITCH_SHIFT);
        let shift = offset.rem_euclid(width as i32) as usize * 4;
        if shift == 0 {
            continue;
        }
        let row = &mut buffer.as_raw_mut()[y * row_len..(y + 1) * row_len];
        // Source and destination overlap, so read from a copy.
        scratch.copy_from_slice(row);
        row[shift..].copy_from_slice(&scratch[..row_len - shift]);
        row[..shift].copy_from_slice(&scratch[row_len - shift..]);
    }
}

/// Replace each `size × size` block with its mean color. Edge blocks are clipped.
pub fn apply_pixelate(buffer: &mut PixelBuffer, size: u32) {
    let (width, height) = buffer.dimensions();
    if size == 0 || width == 0 || height == 0 {
        return;
    }
    let stride = width as usize * 4;
    let pixels = buffer.as_raw_mut();
    for by in (0..height).step_by(size as usize) {
        let y_end = (by + size).min(height);
        for bx in (0..width).step_by(size as usize) {
            let x_end = (bx + size).min(width);
            let mut sum = [0u64; 3];
            let mut count = 0u64;
            for y in by..y_end {
                for x in bx..x_end {
                    let i = y as usize * stride + x as usize * 4;
                    for c in 0..3 {
                        sum[c] += u64::from(pixels[i + c]);
                    }
                    count += 1;
                }
            }
            let mean = sum.map(|s| (s / count) as u8);
            for y in by..y_end {
                for x in bx..x_end {
                    let i = y as usize * stride + x as usize * 4;
                    pixels[i..i + 3].copy_from_slice(&mean);
                }
            }
        }
    }
}

/// Add uniform noise of `±intensity/2 * 255` to each color channel.
pub fn apply_noise<R: Rng + ?Sized>(buffer: &mut PixelBuffer, intensity: f32, rng: &mut R) {
    if intensity <= 0.0 {
        return;
    }
    let amplitude = intensity * 255.0;
    for pixel in buffer.as_raw_mut().chunks_exact_mut(4) {
        for channel in &mut pixel[..3] {
            let delta = (rng.random::<f32>() - 0.5) * amplitude;
            *channel = clamp_u8(f32::from(*channel) + delta);
        }
    }
}
