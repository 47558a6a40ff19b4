//! Per-frame tracking outcomes and diagnostics.
//!
//! These types describe what happened while processing a single frame:
//! - which phase the tracker is in and whether the pose was updated
//! - correspondence counts and reprojection statistics
//! - timing information for profiling
//! - a structured failure reason when refinement did not produce a pose

use thiserror::Error;

use crate::geometry::SE3;
use crate::tracking::TrackingState;

/// Why a refinement attempt produced no pose.
#[derive(Debug, Error)]
pub enum RefineFailure {
    #[error("virtual view rendering failed: {0}")]
    RenderFailure(#[source] anyhow::Error),
    #[error("no keypoints found in virtual view")]
    NoKeypoints,
    #[error("only {found} correspondences, need {needed}")]
    InsufficientMatches { found: usize, needed: usize },
    #[error("pose solver found no consensus")]
    PoseSolveFailure,
    #[error("edge alignment diverged: {samples} samples, mean error {mean_px:.1} px")]
    EdgeDivergence { samples: usize, mean_px: f64 },
    #[error("initializer found no pose")]
    InitializerFailure,
}

/// Summary of tracking for a single frame.
#[derive(Debug)]
pub struct TrackingResult {
    pub state: TrackingState,
    /// Pose published for this frame, camera-to-world. `None` until the
    /// tracker has ever localized.
    pub pose: Option<SE3>,
    /// Whether this frame's refinement updated the pose.
    pub updated: bool,
    pub failure: Option<RefineFailure>,
    pub metrics: TrackingMetrics,
    pub timing: TimingStats,
}

/// Scalar metrics useful for debugging tracking quality.
#[derive(Debug, Default, Clone)]
pub struct TrackingMetrics {
    pub n_virtual_features: usize,
    pub n_matches: usize,
    pub n_inliers: usize,
    pub reproj_error_px: f64,
}

/// Timing breakdown for a frame.
#[derive(Debug, Default, Clone)]
pub struct TimingStats {
    pub total_ms: f64,
    pub render_ms: f64,
    pub extract_ms: f64,
    pub match_ms: f64,
    pub solve_ms: f64,
}
