use std::path::Path;
use std::time::Duration;

use anyhow::{Context, ensure};
use serde::Deserialize;
use serde_yaml::Value;
use tracing::warn;

use crate::error::Error;

/// Per-call processing knobs, grouped the way the pipeline stages consume them.
///
/// Every group and every key is optional; an absent group or key is a no-op.
/// Unknown keys are rejected at deserialization time.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct ProcessingOptions {
    pub filters: Option<FilterOptions>,
    pub effects: Option<EffectOptions>,
    pub transforms: Option<TransformOptions>,
    pub advanced: Option<AdvancedOptions>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct FilterOptions {
    /// Channel multiplier, capped at 255.
    pub brightness: Option<f32>,
    /// Contrast multiplier around mid-grey.
    pub contrast: Option<f32>,
    #[serde(default)]
    pub grayscale: bool,
    #[serde(default)]
    pub invert: bool,
    #[serde(default)]
    pub sepia: bool,
    pub blur: Option<Value>,
    pub saturation: Option<Value>,
    pub hue: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct EffectOptions {
    #[serde(default)]
    pub glitch: bool,
    /// Block edge length in pixels.
    pub pixelate: Option<u32>,
    /// Noise intensity in `[0, 1]`.
    pub noise: Option<f32>,
    pub vignette: Option<Value>,
    pub chromatic: Option<Value>,
    pub kaleidoscope: Option<Value>,
    pub datamosh: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct TransformOptions {
    /// Uniform scale factor.
    pub scale: Option<f32>,
    /// Clockwise rotation in degrees.
    pub rotate: Option<f32>,
    pub skew_x: Option<f32>,
    pub skew_y: Option<f32>,
    #[serde(default)]
    pub flip_x: bool,
    #[serde(default)]
    pub flip_y: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct AdvancedOptions {
    #[serde(default)]
    pub edge_detection: bool,
    #[serde(default)]
    pub oil_painting: bool,
    /// Voronoi cell size in pixels.
    pub crystallize: Option<u32>,
    #[serde(default)]
    pub displacement: bool,
    #[serde(default)]
    pub liquify: Vec<LiquifyPoint>,
    pub mosaic: Option<Value>,
}

/// A local radial displacement influence used by liquify.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LiquifyPoint {
    pub x: f32,
    pub y: f32,
    pub radius: f32,
    pub strength: f32,
}

impl FilterOptions {
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.brightness.is_none()
            && self.contrast.is_none()
            && !self.grayscale
            && !self.invert
            && !self.sepia
    }

    fn validate(&self) -> anyhow::Result<()> {
        if let Some(k) = self.brightness {
            ensure!(k.is_finite(), "filters.brightness must be finite");
        }
        if let Some(k) = self.contrast {
            ensure!(k.is_finite(), "filters.contrast must be finite");
        }
        Ok(())
    }
}

impl EffectOptions {
    #[must_use]
    pub fn is_noop(&self) -> bool {
        !self.glitch && self.pixelate.is_none() && self.noise.is_none()
    }

    fn validate(&self) -> anyhow::Result<()> {
        if let Some(size) = self.pixelate {
            ensure!(size > 0, "effects.pixelate block size must be positive");
        }
        if let Some(intensity) = self.noise {
            ensure!(
                (0.0..=1.0).contains(&intensity),
                "effects.noise must be within [0, 1], got {intensity}"
            );
        }
        Ok(())
    }
}

impl TransformOptions {
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.scale.is_none()
            && self.rotate.is_none()
            && self.skew_x.is_none()
            && self.skew_y.is_none()
            && !self.flip_x
            && !self.flip_y
    }

    fn validate(&self) -> anyhow::Result<()> {
        for (name, value) in [
            ("scale", self.scale),
            ("rotate", self.rotate),
            ("skew-x", self.skew_x),
            ("skew-y", self.skew_y),
        ] {
            if let Some(v) = value {
                ensure!(v.is_finite(), "transforms.{name} must be finite");
            }
        }
        Ok(())
    }
}

impl AdvancedOptions {
    #[must_use]
    pub fn is_noop(&self) -> bool {
        !self.edge_detection
            && !self.oil_painting
            && self.crystallize.is_none()
            && !self.displacement
            && self.liquify.is_empty()
    }

    fn validate(&self) -> anyhow::Result<()> {
        if let Some(cell) = self.crystallize {
            ensure!(cell > 0, "advanced.crystallize cell size must be positive");
        }
        for (i, point) in self.liquify.iter().enumerate() {
            ensure!(
                point.x.is_finite() && point.y.is_finite() && point.strength.is_finite(),
                "advanced.liquify[{i}] must have finite coordinates and strength"
            );
            ensure!(
                point.radius.is_finite() && point.radius > 0.0,
                "advanced.liquify[{i}].radius must be positive"
            );
        }
        Ok(())
    }
}

impl ProcessingOptions {
    /// Reject option values the kernels cannot handle. Runs before any pixel loop.
    ///
    /// # Errors
    /// Returns [`Error::InvalidOptions`] describing the first offending key.
    pub fn validate(&self) -> Result<(), Error> {
        self.validate_groups()
            .map_err(|err| Error::InvalidOptions(format!("{err:#}")))
    }

    fn validate_groups(&self) -> anyhow::Result<()> {
        if let Some(filters) = &self.filters {
            filters.validate()?;
        }
        if let Some(effects) = &self.effects {
            effects.validate()?;
        }
        if let Some(transforms) = &self.transforms {
            transforms.validate()?;
        }
        if let Some(advanced) = &self.advanced {
            advanced.validate()?;
        }
        Ok(())
    }

    /// Whether the background kernels have anything to do.
    #[must_use]
    pub fn has_background_work(&self) -> bool {
        self.filters.as_ref().is_some_and(|f| !f.is_noop())
            || self.effects.as_ref().is_some_and(|e| !e.is_noop())
    }

    /// Keys that are accepted in configuration but have no pixel algorithm.
    #[must_use]
    pub fn unsupported_keys(&self) -> Vec<&'static str> {
        let mut keys = Vec::new();
        if let Some(f) = &self.filters {
            push_if(&mut keys, "filters.blur", &f.blur);
            push_if(&mut keys, "filters.saturation", &f.saturation);
            push_if(&mut keys, "filters.hue", &f.hue);
        }
        if let Some(e) = &self.effects {
            push_if(&mut keys, "effects.vignette", &e.vignette);
            push_if(&mut keys, "effects.chromatic", &e.chromatic);
            push_if(&mut keys, "effects.kaleidoscope", &e.kaleidoscope);
            push_if(&mut keys, "effects.datamosh", &e.datamosh);
        }
        if let Some(a) = &self.advanced {
            push_if(&mut keys, "advanced.mosaic", &a.mosaic);
        }
        keys
    }
}

fn push_if(keys: &mut Vec<&'static str>, name: &'static str, value: &Option<Value>) {
    if value.is_some() {
        keys.push(name);
    }
}

/// What the dispatcher does when no background worker is available.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WorkerFallback {
    /// Run the filter/effect kernels on the caller's thread.
    #[default]
    Inline,
    /// Return the buffer without applying filters or effects.
    Skip,
}

/// Top-level configuration for the CLI and long-running adapters.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Behaviour when the background worker cannot be used.
    pub worker_fallback: WorkerFallback,
    /// Optional deterministic seed for every random kernel.
    pub seed: Option<u64>,
    /// Delay between processed video frames.
    #[serde(with = "humantime_serde")]
    pub frame_interval: Duration,
    /// Options applied to every image.
    pub options: ProcessingOptions,
}

impl PipelineConfig {
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, Error> {
        let s = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&s)?)
    }

    /// Validate runtime invariants that cannot be expressed via serde defaults alone.
    pub fn validated(self) -> Result<Self, Error> {
        if self.frame_interval.is_zero() {
            return Err(Error::InvalidOptions(
                "frame-interval must be positive".into(),
            ));
        }
        self.options
            .validate_groups()
            .context("invalid processing options")
            .map_err(|err| Error::InvalidOptions(format!("{err:#}")))?;
        for key in self.options.unsupported_keys() {
            warn!(key, "option has no pixel algorithm and is ignored");
        }
        Ok(self)
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            worker_fallback: WorkerFallback::default(),
            seed: None,
            frame_interval: Duration::from_millis(33),
            options: ProcessingOptions::default(),
        }
    }
}
