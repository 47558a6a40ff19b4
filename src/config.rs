//! Runtime configuration.
//!
//! Everything tunable about the tracker lives here and deserializes from a
//! single document, so deployments swap behavior without recompiling.

use serde::Deserialize;

use crate::features::DescriptorKind;
use crate::render::RendererBackend;

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TrackingConfig {
    /// Descriptor family used by the steady-state PnP refiner.
    pub pnp_descriptor: DescriptorKind,
    /// Descriptor family used during (re)initialization, where affine
    /// robustness matters more than speed.
    pub init_descriptor: DescriptorKind,
    /// Which virtual-view renderer to construct at startup.
    pub renderer: RendererBackend,
    /// Uniform downscale applied to incoming images before tracking.
    pub image_scale: f64,
    /// Dilation radius for the reprojected occlusion mask, pixels.
    pub mask_dilate_radius: u32,
    /// RANSAC inlier threshold, pixels.
    pub ransac_reproj_px: f64,
    pub ransac_iterations: usize,
    /// PnP failures tolerated before falling back to local initialization.
    pub max_pnp_retries: u32,
    /// Local initialization failures tolerated before a full restart.
    pub max_localize_retries: u32,
    /// Whether to hand off to edge-based refinement once PnP converges.
    pub edge_tracking: bool,
    /// Mean reprojection error below which PnP is considered converged
    /// enough to enter edge tracking, pixels.
    pub edge_entry_reproj_px: f64,
    /// Minimum edge correspondences for a usable refinement.
    pub edge_min_samples: usize,
    /// Mean edge match distance above which edge tracking is abandoned.
    pub edge_max_mean_px: f64,
    /// Gradient threshold for seeding edges from the rendered view.
    pub edge_high_thresh: f64,
    /// Gradient threshold for accepting matches in the live image.
    pub edge_low_thresh: f64,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            pnp_descriptor: DescriptorKind::Orb,
            init_descriptor: DescriptorKind::ASurf,
            renderer: RendererBackend::PointCloud,
            image_scale: 1.0,
            mask_dilate_radius: 15,
            ransac_reproj_px: 8.0,
            ransac_iterations: 100,
            max_pnp_retries: 1,
            max_localize_retries: 3,
            edge_tracking: false,
            edge_entry_reproj_px: 1.0,
            edge_min_samples: 15,
            edge_max_mean_px: 15.0,
            edge_high_thresh: 200.0,
            edge_low_thresh: 80.0,
        }
    }
}
