//! Map-relative 6-DoF camera pose tracking.
//!
//! Estimates the pose of a moving camera against a pre-built 3D map by
//! rendering a virtual view of the map at the current pose hypothesis and
//! refining the hypothesis until the live and virtual views agree. The
//! engine is a small state machine that escalates between edge-based fine
//! tracking, feature-based PnP refinement, and coarse global
//! (re-)initialization as tracking quality degrades.

pub mod camera;
pub mod config;
pub mod edges;
pub mod features;
pub mod geometry;
pub mod imgproc;
pub mod init;
pub mod render;
pub mod system;
pub mod tracking;

pub use camera::Intrinsics;
pub use config::TrackingConfig;
pub use geometry::SE3;
pub use tracking::{RefineFailure, TrackingContext, TrackingState, TrackingStateMachine};
