//! Camera input and the background capture loop.
//!
//! The camera is a source of raw optical noise, not of entropy directly.
//! Frames flow from a [`FrameSource`] through the [`EntropyPipeline`]
//! (extractor then collector) on a producer task that the session pauses,
//! resumes and stops through [`CaptureControl`].

mod camera;
mod config;
mod control;
mod frame;
mod pipeline;

pub use camera::{FrameSource, MockCamera, SourceError};
pub use config::CaptureConfig;
pub use control::{spawn_capture_loop, CaptureControl, CaptureState};
pub use frame::Frame;
pub use pipeline::{lock_pipeline, EntropyPipeline, SharedPipeline};
