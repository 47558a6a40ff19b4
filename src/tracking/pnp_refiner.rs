//! Feature-based pose refinement against a rendered virtual view.
//!
//! The refiner renders the map from the current pose hypothesis, matches
//! live features against virtual ones, lifts the virtual matches to 3D
//! through the rendered depth and solves a robust PnP seeded from the
//! hypothesis. Because the virtual keypoints come with exact depth, no
//! triangulation or map-point bookkeeping is needed.

use std::time::Instant;

use nalgebra::{Vector2, Vector3};
use tracing::{debug, warn};

use crate::camera::Intrinsics;
use crate::features::{match_descriptors, FeatureExtractor, FeatureSet};
use crate::geometry::{solve_pnp_ransac, RansacParams, SE3, MIN_CORRESPONDENCES};
use crate::render::{VirtualView, VirtualViewRenderer};
use crate::tracking::mask::reprojected_feature_mask;
use crate::tracking::result::{RefineFailure, TimingStats, TrackingMetrics};
use crate::tracking::Frame;

/// A successful refinement.
#[derive(Debug, Clone)]
pub struct PnpRefinement {
    /// Refined camera-to-world pose.
    pub pose_wc: SE3,
    /// Mean reprojection error over PnP inliers, pixels.
    pub reproj_error_px: f64,
    pub n_matches: usize,
    pub n_inliers: usize,
}

pub struct VirtualPnPRefiner {
    extractor: Box<dyn FeatureExtractor>,
    live_intrinsics: Intrinsics,
    ransac: RansacParams,
    /// Dilation applied to the reprojected live-image mask. Masking is
    /// skipped entirely when `mask_live` is false.
    mask_dilate_radius: u32,
    mask_live: bool,
}

impl VirtualPnPRefiner {
    pub fn new(
        extractor: Box<dyn FeatureExtractor>,
        live_intrinsics: Intrinsics,
        ransac: RansacParams,
        mask_dilate_radius: u32,
        mask_live: bool,
    ) -> Self {
        Self {
            extractor,
            live_intrinsics,
            ransac,
            mask_dilate_radius,
            mask_live,
        }
    }

    /// Lifts matched virtual keypoints to world coordinates through the
    /// rendered depth. Matches landing on invalid depth are dropped.
    fn correspondences(
        &self,
        matches: &[crate::features::FeatureMatch],
        live: &FeatureSet,
        virt: &FeatureSet,
        view: &VirtualView,
        view_pose_wc: &SE3,
    ) -> (Vec<Vector3<f64>>, Vec<Vector2<f64>>) {
        let mut world = Vec::with_capacity(matches.len());
        let mut pixels = Vec::with_capacity(matches.len());
        for m in matches {
            let vkp = &virt.keypoints[m.train_idx];
            let depth = view.depth.at_point(vkp) as f64;
            if !depth.is_finite() || depth <= 0.0 {
                continue;
            }
            let p_cam = view.intrinsics.unproject(vkp, depth);
            world.push(view_pose_wc.transform_point(&p_cam));
            pixels.push(live.keypoints[m.query_idx]);
        }
        (world, pixels)
    }

    /// One refinement pass at `pose_wc`.
    ///
    /// `renderer` is handed in per call so the same refiner can serve both
    /// the init-verification and steady-state phases, which share a
    /// renderer but differ in extractor and masking.
    pub fn refine(
        &self,
        frame: &Frame,
        renderer: &mut dyn VirtualViewRenderer,
        pose_wc: &SE3,
        metrics: &mut TrackingMetrics,
        timing: &mut TimingStats,
    ) -> Result<PnpRefinement, RefineFailure> {
        let start = Instant::now();
        let view = renderer
            .render(pose_wc)
            .map_err(RefineFailure::RenderFailure)?;
        timing.render_ms = start.elapsed().as_secs_f64() * 1e3;

        let start = Instant::now();
        let virt = self.extractor.extract(&view.image, Some(&view.mask));
        metrics.n_virtual_features = virt.len();
        if virt.is_empty() {
            warn!("no keypoints found in virtual view");
            return Err(RefineFailure::NoKeypoints);
        }

        let live_mask = self.mask_live.then(|| {
            reprojected_feature_mask(
                &view.mask,
                &view.depth,
                &view.intrinsics,
                &self.live_intrinsics,
                frame.image.width(),
                frame.image.height(),
                self.mask_dilate_radius,
            )
        });
        let live = self.extractor.extract(&frame.image, live_mask.as_ref());
        timing.extract_ms = start.elapsed().as_secs_f64() * 1e3;

        let start = Instant::now();
        let matches = match_descriptors(&live, &virt, self.extractor.kind());
        timing.match_ms = start.elapsed().as_secs_f64() * 1e3;

        let (world, pixels) = self.correspondences(&matches, &live, &virt, &view, pose_wc);
        metrics.n_matches = world.len();
        if world.len() < MIN_CORRESPONDENCES {
            return Err(RefineFailure::InsufficientMatches {
                found: world.len(),
                needed: MIN_CORRESPONDENCES,
            });
        }

        let start = Instant::now();
        let prior_cw = pose_wc.inverse();
        let solution = solve_pnp_ransac(&world, &pixels, &self.live_intrinsics, &prior_cw, &self.ransac)
            .ok_or(RefineFailure::PoseSolveFailure)?;
        timing.solve_ms = start.elapsed().as_secs_f64() * 1e3;

        let n_inliers = solution.inliers.iter().filter(|&&i| i).count();
        metrics.n_inliers = n_inliers;
        metrics.reproj_error_px = solution.mean_reproj_px;
        debug!(
            n_matches = world.len(),
            n_inliers,
            reproj_error_px = solution.mean_reproj_px,
            "virtual PnP converged"
        );

        Ok(PnpRefinement {
            pose_wc: solution.pose_cw.inverse(),
            reproj_error_px: solution.mean_reproj_px,
            n_matches: world.len(),
            n_inliers,
        })
    }
}
