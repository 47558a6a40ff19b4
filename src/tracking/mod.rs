//! Pose tracking against rendered virtual views.

pub mod context;
pub mod edge_refiner;
pub mod frame;
pub mod mask;
pub mod pnp_refiner;
pub mod result;
pub mod state;
pub mod tracker;

pub use context::TrackingContext;
pub use frame::Frame;
pub use result::{RefineFailure, TrackingMetrics, TrackingResult};
pub use state::TrackingState;
pub use tracker::TrackingStateMachine;
