pub mod ffmpeg;
pub mod jpeg;

use slidereel_common::frame::Frame;

pub use ffmpeg::FfmpegSampler;

/// Pull-based producer of candidate frames in non-decreasing time order.
#[allow(async_fn_in_trait)]
pub trait FrameSource {
    /// Returns the next candidate, or `None` once the source is exhausted.
    async fn next_frame(&mut self) -> Result<Option<Frame>, SamplerError>;
}

#[derive(Debug, thiserror::Error)]
pub enum SamplerError {
    #[error("failed to spawn ffmpeg: {0}")]
    Spawn(String),
    #[error("start offset {0}s is not a valid duration")]
    InvalidStart(f64),
    #[error("failed to read frames from ffmpeg: {0}")]
    Read(String),
    #[error("failed to wait for ffmpeg: {0}")]
    Wait(String),
    #[error("ffmpeg exited with {status}: {stderr}")]
    FfmpegFailed { status: String, stderr: String },
}
