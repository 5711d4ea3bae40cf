pub mod advanced;
pub mod effects;
pub mod filters;
pub mod transform;

use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::buffer::PixelBuffer;
use crate::config::ProcessingOptions;

/// Run the kernels that belong to the background worker: filters, then effects.
///
/// Pure with respect to its inputs; the same seed reproduces the same output.
pub fn apply_background(buffer: &mut PixelBuffer, options: &ProcessingOptions, seed: u64) {
    if let Some(filters) = &options.filters {
        filters::apply_filters(buffer, filters);
    }
    if let Some(effects) = &options.effects {
        let mut rng = StdRng::seed_from_u64(seed);
        effects::apply_effects(buffer, effects, &mut rng);
    }
}

/// Store a computed channel value, clamping to `[0, 255]` and truncating.
#[inline]
pub(crate) fn clamp_u8(value: f32) -> u8 {
    value.clamp(0.0, 255.0) as u8
}

/// Integer BT.601 luma; exact for grey inputs.
#[inline]
pub(crate) fn luma(r: u8, g: u8, b: u8) -> u8 {
    ((299 * u32::from(r) + 587 * u32::from(g) + 114 * u32::from(b)) / 1000) as u8
}
