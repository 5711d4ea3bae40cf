use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::{debug, instrument};

use crate::buffer::PixelBuffer;
use crate::config::{PipelineConfig, ProcessingOptions};
use crate::error::Error;
use crate::processing::advanced::apply_advanced;
use crate::processing::transform::apply_transform;
use crate::surface::{PixelSurface, SoftwareSurface, Source};
use crate::tasks::dispatch::{DispatchConfig, Dispatcher};

/// Runs the full pipeline: rasterize, transform, background kernels, advanced pass.
///
/// The surface is owned exclusively and reused between calls, which is why
/// processing takes `&mut self`; run separate processors for parallelism.
#[derive(Debug)]
pub struct ImageProcessor<S = SoftwareSurface> {
    surface: S,
    dispatcher: Dispatcher,
    rng: StdRng,
}

impl ImageProcessor<SoftwareSurface> {
    /// Software surface plus a freshly spawned background worker.
    pub fn new(config: &PipelineConfig) -> Self {
        let dispatcher = Dispatcher::spawn(DispatchConfig {
            fallback: config.worker_fallback,
            seed: config.seed,
        });
        Self::with_parts(SoftwareSurface::new(), dispatcher, config.seed)
    }
}

impl<S: PixelSurface> ImageProcessor<S> {
    pub fn with_parts(surface: S, dispatcher: Dispatcher, seed: Option<u64>) -> Self {
        // Offset so the foreground stream differs from the dispatcher's.
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(1)),
            None => StdRng::from_os_rng(),
        };
        Self {
            surface,
            dispatcher,
            rng,
        }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Rasterize `source` and run every enabled stage.
    ///
    /// # Errors
    /// Fails with [`Error::InvalidOptions`] before decoding anything, with
    /// [`Error::Decode`] if the source cannot be rasterized, or with
    /// [`Error::WorkerUnavailable`] if the worker dies mid-request.
    #[instrument(level = "debug", skip_all)]
    pub async fn process(
        &mut self,
        source: &Source,
        options: &ProcessingOptions,
    ) -> Result<PixelBuffer, Error> {
        options.validate()?;
        let buffer = self.surface.rasterize(source)?;
        self.run_stages(buffer, options).await
    }

    /// Same as [`process`](Self::process) for an already rasterized buffer.
    pub async fn process_buffer(
        &mut self,
        buffer: PixelBuffer,
        options: &ProcessingOptions,
    ) -> Result<PixelBuffer, Error> {
        options.validate()?;
        self.run_stages(buffer, options).await
    }

    async fn run_stages(
        &mut self,
        mut buffer: PixelBuffer,
        options: &ProcessingOptions,
    ) -> Result<PixelBuffer, Error> {
        for key in options.unsupported_keys() {
            debug!(key, "ignoring option without pixel algorithm");
        }
        if let Some(transforms) = &options.transforms {
            buffer = apply_transform(&mut self.surface, buffer, transforms);
        }
        if options.has_background_work() {
            buffer = self.dispatcher.process(&buffer, options).await?;
        }
        if let Some(advanced) = &options.advanced {
            apply_advanced(&mut buffer, advanced, &mut self.rng);
        }
        debug!(
            width = buffer.width(),
            height = buffer.height(),
            "pipeline finished"
        );
        Ok(buffer)
    }
}
