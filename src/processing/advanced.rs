//! Foreground algorithms that need whole-image or wide-neighborhood access.
//!
//! These run after the background kernels return, in the fixed order
//! edge detection, oil painting, crystallize, displacement, liquify.

use rand::Rng;
use tracing::trace;

use crate::buffer::PixelBuffer;
use crate::config::{AdvancedOptions, LiquifyPoint};

use super::luma;

const OIL_RADIUS: i64 = 4;
const OIL_LEVELS: usize = 20;
const DISPLACEMENT_SCALE: f32 = 20.0;

const SOBEL_X: [[i32; 3]; 3] = [[-1, 0, 1], [-2, 0, 2], [-1, 0, 1]];
const SOBEL_Y: [[i32; 3]; 3] = [[-1, -2, -1], [0, 0, 0], [1, 2, 1]];

pub fn apply_advanced<R: Rng + ?Sized>(
    buffer: &mut PixelBuffer,
    options: &AdvancedOptions,
    rng: &mut R,
) {
    if buffer.is_empty() {
        return;
    }
    if options.edge_detection {
        edge_detection(buffer);
    }
    if options.oil_painting {
        oil_painting(buffer);
    }
    if let Some(cell) = options.crystallize {
        crystallize(buffer, cell, rng);
    }
    if options.displacement {
        displacement(buffer);
    }
    if !options.liquify.is_empty() {
        liquify(buffer, &options.liquify);
    }
}

/// Sobel gradient magnitude over luma. Border pixels are left as they were.
pub fn edge_detection(buffer: &mut PixelBuffer) {
    let (width, height) = dims(buffer);
    if width < 3 || height < 3 {
        return;
    }
    let lum: Vec<i32> = buffer
        .as_raw()
        .chunks_exact(4)
        .map(|p| i32::from(luma(p[0], p[1], p[2])))
        .collect();
    let pixels = buffer.as_raw_mut();
    for y in 1..height - 1 {
        for x in 1..width - 1 {
            let mut gx = 0i32;
            let mut gy = 0i32;
            for ky in 0..3 {
                for kx in 0..3 {
                    let l = lum[(y + ky - 1) * width + (x + kx - 1)];
                    gx += l * SOBEL_X[ky][kx];
                    gy += l * SOBEL_Y[ky][kx];
                }
            }
            let magnitude = f64::from(gx * gx + gy * gy).sqrt().min(255.0) as u8;
            let i = (y * width + x) * 4;
            pixels[i..i + 3].fill(magnitude);
        }
    }
}

/// Mode filter over a fixed 9×9 window, bucketed into 21 intensity bins.
///
/// Cost is `O(W·H·r²)` with a histogram per pixel; this is the slowest pass.
pub fn oil_painting(buffer: &mut PixelBuffer) {
    let (width, height) = dims(buffer);
    let r = OIL_RADIUS as usize;
    if width <= 2 * r || height <= 2 * r {
        return;
    }
    let source = buffer.as_raw().to_vec();
    let pixels = buffer.as_raw_mut();
    let mut counts = [0u32; OIL_LEVELS + 1];
    let mut sums = [[0u32; 3]; OIL_LEVELS + 1];
    for y in r..height - r {
        for x in r..width - r {
            counts.fill(0);
            sums.fill([0; 3]);
            for ny in y - r..=y + r {
                for nx in x - r..=x + r {
                    let i = (ny * width + nx) * 4;
                    let (red, green, blue) = (source[i], source[i + 1], source[i + 2]);
                    let bin = usize::from(luma(red, green, blue)) * OIL_LEVELS / 255;
                    counts[bin] += 1;
                    sums[bin][0] += u32::from(red);
                    sums[bin][1] += u32::from(green);
                    sums[bin][2] += u32::from(blue);
                }
            }
            // First bin with the highest count wins ties.
            let mut best = 0;
            for bin in 1..counts.len() {
                if counts[bin] > counts[best] {
                    best = bin;
                }
            }
            let count = counts[best];
            let i = (y * width + x) * 4;
            for c in 0..3 {
                pixels[i + c] = (sums[best][c] / count) as u8;
            }
        }
    }
}

/// Transient Voronoi site used while crystallizing.
#[derive(Debug, Clone, Copy)]
pub struct VoronoiCell {
    pub x: f32,
    pub y: f32,
    pub sum: [u64; 3],
    pub count: u64,
}

impl VoronoiCell {
    fn at(x: f32, y: f32) -> Self {
        Self {
            x,
            y,
            sum: [0; 3],
            count: 0,
        }
    }

    fn average(&self) -> Option<[u8; 3]> {
        (self.count > 0).then(|| self.sum.map(|s| (s / self.count) as u8))
    }
}

/// Scatter one jittered seed per grid cell, then paint each pixel with the
/// mean color of its nearest seed.
pub fn crystallize<R: Rng + ?Sized>(buffer: &mut PixelBuffer, cell_size: u32, rng: &mut R) {
    let (width, height) = dims(buffer);
    if cell_size == 0 || width == 0 || height == 0 {
        return;
    }
    let cell = cell_size as usize;
    let max_x = (width - 1) as f32;
    let max_y = (height - 1) as f32;
    let mut cells = Vec::new();
    for gy in (0..height).step_by(cell) {
        for gx in (0..width).step_by(cell) {
            let x = (gx as f32 + rng.random::<f32>() * cell as f32).min(max_x);
            let y = (gy as f32 + rng.random::<f32>() * cell as f32).min(max_y);
            cells.push(VoronoiCell::at(x, y));
        }
    }
    trace!(sites = cells.len(), "crystallize seeds scattered");

    let pixels = buffer.as_raw_mut();
    // Pass 1: assign and accumulate. Averages are unknown until every pixel is counted.
    let mut owner = vec![0usize; width * height];
    for y in 0..height {
        for x in 0..width {
            let nearest = nearest_cell(&cells, x as f32, y as f32);
            let i = (y * width + x) * 4;
            let site = &mut cells[nearest];
            for c in 0..3 {
                site.sum[c] += u64::from(pixels[i + c]);
            }
            site.count += 1;
            owner[y * width + x] = nearest;
        }
    }
    // Pass 2: paint.
    let averages: Vec<Option<[u8; 3]>> = cells.iter().map(VoronoiCell::average).collect();
    for (idx, site) in owner.into_iter().enumerate() {
        if let Some(rgb) = averages[site] {
            pixels[idx * 4..idx * 4 + 3].copy_from_slice(&rgb);
        }
    }
}

fn nearest_cell(cells: &[VoronoiCell], x: f32, y: f32) -> usize {
    let mut best = 0;
    let mut best_dist = f32::INFINITY;
    for (i, cell) in cells.iter().enumerate() {
        let dx = cell.x - x;
        let dy = cell.y - y;
        let dist = dx * dx + dy * dy;
        if dist < best_dist {
            best_dist = dist;
            best = i;
        }
    }
    best
}

/// Self-displacement: the red channel drives a diagonal offset of ±10 pixels.
pub fn displacement(buffer: &mut PixelBuffer) {
    let (width, height) = dims(buffer);
    let source = buffer.as_raw().to_vec();
    let pixels = buffer.as_raw_mut();
    for y in 0..height {
        for x in 0..width {
            let i = (y * width + x) * 4;
            let d = (f32::from(source[i]) / 255.0 - 0.5) * DISPLACEMENT_SCALE;
            let sx = clamp_coord(x as f32 + d, width);
            let sy = clamp_coord(y as f32 + d, height);
            let s = (sy * width + sx) * 4;
            pixels[i..i + 4].copy_from_slice(&source[s..s + 4]);
        }
    }
}

/// Radial warp: offsets from every point whose radius covers a pixel add up
/// before the single clamped sample.
pub fn liquify(buffer: &mut PixelBuffer, points: &[LiquifyPoint]) {
    if points.is_empty() {
        return;
    }
    let (width, height) = dims(buffer);
    let source = buffer.as_raw().to_vec();
    let pixels = buffer.as_raw_mut();
    for y in 0..height {
        for x in 0..width {
            let (mut ox, mut oy) = (0.0f32, 0.0f32);
            for point in points {
                let dx = x as f32 - point.x;
                let dy = y as f32 - point.y;
                let dist = (dx * dx + dy * dy).sqrt();
                if dist < point.radius {
                    let force = (1.0 - dist / point.radius) * point.strength;
                    ox += dx * force;
                    oy += dy * force;
                }
            }
            if ox == 0.0 && oy == 0.0 {
                continue;
            }
            let sx = clamp_coord(x as f32 - ox, width);
            let sy = clamp_coord(y as f32 - oy, height);
            let i = (y * width + x) * 4;
            let s = (sy * width + sx) * 4;
            pixels[i..i + 4].copy_from_slice(&source[s..s + 4]);
        }
    }
}

fn dims(buffer: &PixelBuffer) -> (usize, usize) {
    (buffer.width() as usize, buffer.height() as usize)
}

/// Round and clamp a sample coordinate into `[0, len)`; never wraps.
fn clamp_coord(value: f32, len: usize) -> usize {
    if len == 0 || !value.is_finite() {
        return 0;
    }
    value.round().clamp(0.0, (len - 1) as f32) as usize
}
