//! Edge-based fine pose alignment.
//!
//! Entered only after feature PnP has converged tightly. A fresh virtual
//! view is rendered at the hypothesis, edge correspondences are gathered by
//! the configured matcher and the pose is polished with an iteratively
//! reweighted least-squares solve. Divergence drops the tracker back to
//! feature PnP rather than failing hard.

use std::time::Instant;

use tracing::{debug, info};

use crate::camera::Intrinsics;
use crate::edges::EdgeMatcher;
use crate::geometry::{irls_pose, SE3};
use crate::render::VirtualViewRenderer;
use crate::tracking::result::{RefineFailure, TimingStats, TrackingMetrics};
use crate::tracking::Frame;

const IRLS_OUTER_ITERATIONS: usize = 4;
const HUBER_PX: f64 = 3.0;

pub struct EdgeRefiner {
    matcher: Box<dyn EdgeMatcher>,
    live_intrinsics: Intrinsics,
    /// Fewer correspondences than this is a divergence.
    min_samples: usize,
    /// Mean match distance above this is a divergence, pixels.
    max_mean_px: f64,
}

impl EdgeRefiner {
    pub fn new(
        matcher: Box<dyn EdgeMatcher>,
        live_intrinsics: Intrinsics,
        min_samples: usize,
        max_mean_px: f64,
    ) -> Self {
        Self {
            matcher,
            live_intrinsics,
            min_samples,
            max_mean_px,
        }
    }

    pub fn refine(
        &self,
        frame: &Frame,
        renderer: &mut dyn VirtualViewRenderer,
        pose_wc: &SE3,
        metrics: &mut TrackingMetrics,
        timing: &mut TimingStats,
    ) -> Result<SE3, RefineFailure> {
        let start = Instant::now();
        let view = renderer
            .render(pose_wc)
            .map_err(RefineFailure::RenderFailure)?;
        timing.render_ms = start.elapsed().as_secs_f64() * 1e3;

        let start = Instant::now();
        let samples = self.matcher.match_edges(&frame.image, &view, pose_wc);
        timing.match_ms = start.elapsed().as_secs_f64() * 1e3;
        metrics.n_matches = samples.len();

        let mean_px = if samples.is_empty() {
            f64::INFINITY
        } else {
            samples.iter().map(|s| s.distance).sum::<f64>() / samples.len() as f64
        };
        if samples.len() < self.min_samples || mean_px > self.max_mean_px {
            info!(
                samples = samples.len(),
                mean_px, "edge alignment diverged, falling back to PnP"
            );
            return Err(RefineFailure::EdgeDivergence {
                samples: samples.len(),
                mean_px,
            });
        }
        metrics.reproj_error_px = mean_px;

        let world: Vec<_> = samples.iter().map(|s| s.world_point).collect();
        let pixels: Vec<_> = samples.iter().map(|s| s.image_point).collect();

        let start = Instant::now();
        let pose_cw = irls_pose(
            &pose_wc.inverse(),
            &world,
            &pixels,
            &self.live_intrinsics,
            IRLS_OUTER_ITERATIONS,
            HUBER_PX,
        )
        .ok_or(RefineFailure::PoseSolveFailure)?;
        timing.solve_ms = start.elapsed().as_secs_f64() * 1e3;

        debug!(samples = samples.len(), mean_px, "edge alignment converged");
        Ok(pose_cw.inverse())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edges::{EdgeSample, GradientEdgeMatcher};
    use crate::render::{DepthMap, VirtualView};
    use image::{GrayImage, Luma};
    use nalgebra::{Vector2, Vector3};

    struct FixedMatcher(Vec<EdgeSample>);

    impl EdgeMatcher for FixedMatcher {
        fn match_edges(
            &self,
            _image: &GrayImage,
            _view: &VirtualView,
            _pose: &SE3,
        ) -> Vec<EdgeSample> {
            self.0.clone()
        }
    }

    struct CannedRenderer(Option<VirtualView>);

    impl VirtualViewRenderer for CannedRenderer {
        fn render(&mut self, _pose_wc: &SE3) -> anyhow::Result<VirtualView> {
            self.0.take().ok_or_else(|| anyhow::anyhow!("exhausted"))
        }
    }

    fn empty_view(k: Intrinsics) -> VirtualView {
        let depth = DepthMap::new(32, 24);
        VirtualView {
            image: GrayImage::new(32, 24),
            mask: depth.finite_mask(),
            depth,
            intrinsics: k,
        }
    }

    #[test]
    fn test_too_few_samples_is_divergence() {
        let k = Intrinsics::new(100.0, 100.0, 16.0, 12.0);
        let samples = vec![
            EdgeSample {
                world_point: Vector3::new(0.0, 0.0, 2.0),
                image_point: Vector2::new(16.0, 12.0),
                distance: 0.5,
            };
            5
        ];
        let refiner = EdgeRefiner::new(Box::new(FixedMatcher(samples)), k, 15, 15.0);
        let mut renderer = CannedRenderer(Some(empty_view(k)));

        let err = refiner
            .refine(
                &Frame::new(0, GrayImage::new(32, 24)),
                &mut renderer,
                &SE3::identity(),
                &mut TrackingMetrics::default(),
                &mut TimingStats::default(),
            )
            .unwrap_err();
        assert!(matches!(
            err,
            RefineFailure::EdgeDivergence { samples: 5, .. }
        ));
    }

    #[test]
    fn test_large_mean_distance_is_divergence() {
        let k = Intrinsics::new(100.0, 100.0, 16.0, 12.0);
        let samples = vec![
            EdgeSample {
                world_point: Vector3::new(0.0, 0.0, 2.0),
                image_point: Vector2::new(16.0, 12.0),
                distance: 30.0,
            };
            20
        ];
        let refiner = EdgeRefiner::new(Box::new(FixedMatcher(samples)), k, 15, 15.0);
        let mut renderer = CannedRenderer(Some(empty_view(k)));

        let err = refiner
            .refine(
                &Frame::new(0, GrayImage::new(32, 24)),
                &mut renderer,
                &SE3::identity(),
                &mut TrackingMetrics::default(),
                &mut TimingStats::default(),
            )
            .unwrap_err();
        assert!(matches!(err, RefineFailure::EdgeDivergence { .. }));
    }

    #[test]
    fn test_aligned_synthetic_scene_converges() {
        // Plane of edge points at z = 2 observed at the identity pose. The
        // gradient matcher sees the same edge in both images, so IRLS keeps
        // the pose at the identity.
        let k = Intrinsics::new(60.0, 60.0, 20.0, 15.0);
        let mut depth = DepthMap::new(40, 30);
        for y in 0..30 {
            for x in 0..40 {
                depth.set(x, y, 2.0);
            }
        }
        // Quadrant pattern gives both vertical and horizontal edges so the
        // correspondences are not collinear.
        let image = GrayImage::from_fn(40, 30, |x, y| {
            if (x >= 20) ^ (y >= 15) {
                Luma([220u8])
            } else {
                Luma([20u8])
            }
        });
        let view = VirtualView {
            image: image.clone(),
            mask: depth.finite_mask(),
            depth,
            intrinsics: k,
        };

        let refiner = EdgeRefiner::new(
            Box::new(GradientEdgeMatcher::new(100.0, 50.0)),
            k,
            5,
            15.0,
        );
        let mut renderer = CannedRenderer(Some(view));
        let pose = refiner
            .refine(
                &Frame::new(0, image),
                &mut renderer,
                &SE3::identity(),
                &mut TrackingMetrics::default(),
                &mut TimingStats::default(),
            )
            .unwrap();
        assert!(pose.translation.norm() < 0.05);
    }
}
