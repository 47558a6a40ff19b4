//! Top-level wiring: capture channels and the tracking pipeline loop.

pub mod capture;
pub mod pipeline;

pub use capture::LatestSlot;
pub use pipeline::{Pipeline, PipelineInputs, StampedPose};
