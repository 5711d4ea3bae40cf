use std::io::Cursor;
use std::path::Path;
use std::time::Duration;

use image::codecs::gif::GifDecoder;
use image::{AnimationDecoder, RgbaImage};
use tokio::select;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::buffer::PixelBuffer;
use crate::config::ProcessingOptions;
use crate::error::Error;
use crate::pipeline::ImageProcessor;
use crate::surface::{PixelSurface, Source};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Playback {
    Playing,
    Paused,
    Ended,
}

/// A playing media element the adapter can pull frames from.
pub trait FrameSource {
    fn playback(&self) -> Playback;

    /// Grab the frame currently on screen.
    fn current_frame(&mut self) -> Option<RgbaImage>;
}

/// Run the pipeline on every scheduled frame while `source` is playing.
///
/// Playback state is checked at the start of each frame; a paused or ended
/// source, or `cancel`, stops the loop. Returns the number of frames delivered.
pub async fn run<S, F, C>(
    processor: &mut ImageProcessor<S>,
    source: &mut F,
    options: &ProcessingOptions,
    frame_interval: Duration,
    cancel: CancellationToken,
    mut on_frame: C,
) -> Result<u64, Error>
where
    S: PixelSurface,
    F: FrameSource + ?Sized,
    C: FnMut(u64, PixelBuffer),
{
    options.validate()?;
    if frame_interval.is_zero() {
        return Err(Error::InvalidOptions(
            "frame interval must be positive".into(),
        ));
    }
    let mut ticker = interval(frame_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut frames = 0u64;
    loop {
        select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("video loop cancelled");
                break;
            }
            _ = ticker.tick() => {}
        }
        let state = source.playback();
        if state != Playback::Playing {
            debug!(?state, "playback stopped");
            break;
        }
        let Some(frame) = source.current_frame() else {
            break;
        };
        let processed = processor.process(&Source::Bitmap(frame), options).await?;
        on_frame(frames, processed);
        frames += 1;
    }
    info!(frames, "video processing finished");
    Ok(frames)
}

/// Frames of a decoded animation, played once from the first frame.
#[derive(Debug, Clone, Default)]
pub struct AnimationFrames {
    frames: Vec<RgbaImage>,
    position: usize,
    paused: bool,
}

impl AnimationFrames {
    #[must_use]
    pub fn new(frames: Vec<RgbaImage>) -> Self {
        Self {
            frames,
            position: 0,
            paused: false,
        }
    }

    /// Decode every frame of an animated GIF.
    ///
    /// # Errors
    /// Returns [`Error::Decode`] if the bytes are not a readable GIF.
    pub fn from_gif_bytes(bytes: &[u8]) -> Result<Self, Error> {
        let decoder =
            GifDecoder::new(Cursor::new(bytes)).map_err(|err| Error::Decode(err.to_string()))?;
        let frames = decoder
            .into_frames()
            .collect_frames()
            .map_err(|err| Error::Decode(err.to_string()))?
            .into_iter()
            .map(image::Frame::into_buffer)
            .collect();
        Ok(Self::new(frames))
    }

    pub fn open(path: &Path) -> Result<Self, Error> {
        let bytes = std::fs::read(path)?;
        Self::from_gif_bytes(&bytes)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn pause(&mut self) {
        self.paused = true;
    }

    pub fn resume(&mut self) {
        self.paused = false;
    }
}

impl FrameSource for AnimationFrames {
    fn playback(&self) -> Playback {
        if self.position >= self.frames.len() {
            Playback::Ended
        } else if self.paused {
            Playback::Paused
        } else {
            Playback::Playing
        }
    }

    fn current_frame(&mut self) -> Option<RgbaImage> {
        let frame = self.frames.get(self.position).cloned();
        self.position += 1;
        frame
    }
}
