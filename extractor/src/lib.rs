//! Slide extraction: sample candidate frames from a video, drop
//! near-duplicates by perceptual hash and export what remains.

pub mod export;
pub mod filter;
pub mod pipeline;
pub mod sampler;
pub mod source;
pub mod tools;
