use crate::buffer::PixelBuffer;
use crate::config::ProcessingOptions;

/// One round trip to the background worker.
#[derive(Debug)]
pub struct ProcessingRequest {
    /// Correlation id echoed back in the reply.
    pub id: u64,
    /// Snapshot of the caller's pixels; never shared with the caller.
    pub buffer: PixelBuffer,
    pub options: ProcessingOptions,
    /// Seed for the effect kernel's random source.
    pub seed: u64,
}

#[derive(Debug)]
pub struct ProcessingReply {
    pub id: u64,
    pub buffer: PixelBuffer,
}
