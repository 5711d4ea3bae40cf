pub mod buffer;
pub mod config;
pub mod error;
pub mod events;
pub mod pipeline;
pub mod processing;
pub mod surface;
pub mod tasks {
    pub mod batch;
    pub mod dispatch;
    pub mod video;
}

pub use buffer::PixelBuffer;
pub use config::{PipelineConfig, ProcessingOptions};
pub use error::{Error, Result};
pub use pipeline::ImageProcessor;
pub use surface::Source;
