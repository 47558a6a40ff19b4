//! The tracking state machine.
//!
//! Orchestrates initialization, PnP refinement and edge alignment over a
//! stream of frames. Transitions follow a simple retry discipline: steady
//! PnP tolerates a bounded number of consecutive failures before falling
//! back to pose-biased initialization, and initialization itself falls back
//! to a full restart when it keeps failing.

use std::time::Instant;

use anyhow::Result;
use tracing::{info, warn};

use crate::camera::Intrinsics;
use crate::config::TrackingConfig;
use crate::edges::{EdgeMatcher, GradientEdgeMatcher};
use crate::features::{build_extractor, FeatureExtractor};
use crate::geometry::RansacParams;
use crate::init::Initializer;
use crate::render::VirtualViewRenderer;
use crate::tracking::edge_refiner::EdgeRefiner;
use crate::tracking::pnp_refiner::VirtualPnPRefiner;
use crate::tracking::result::{RefineFailure, TimingStats, TrackingMetrics, TrackingResult};
use crate::tracking::{Frame, TrackingContext, TrackingState};

pub struct TrackingStateMachine {
    config: TrackingConfig,
    renderer: Box<dyn VirtualViewRenderer>,
    initializer: Box<dyn Initializer>,
    /// Steady-state refiner: fast descriptors, live image masked to the
    /// reprojected map footprint.
    pnp_refiner: VirtualPnPRefiner,
    /// Verification refiner for freshly initialized poses: affine-robust
    /// descriptors, no masking since the hypothesis is still coarse.
    init_refiner: VirtualPnPRefiner,
    edge_refiner: EdgeRefiner,
    intrinsics: Intrinsics,
    context: TrackingContext,
}

impl TrackingStateMachine {
    pub fn new(
        config: TrackingConfig,
        intrinsics: Intrinsics,
        renderer: Box<dyn VirtualViewRenderer>,
        initializer: Box<dyn Initializer>,
        pnp_extractor: Box<dyn FeatureExtractor>,
        init_extractor: Box<dyn FeatureExtractor>,
        edge_matcher: Box<dyn EdgeMatcher>,
    ) -> Self {
        let ransac = RansacParams {
            iterations: config.ransac_iterations,
            reproj_threshold_px: config.ransac_reproj_px,
        };
        let pnp_refiner = VirtualPnPRefiner::new(
            pnp_extractor,
            intrinsics,
            ransac,
            config.mask_dilate_radius,
            true,
        );
        let init_refiner = VirtualPnPRefiner::new(
            init_extractor,
            intrinsics,
            ransac,
            config.mask_dilate_radius,
            false,
        );
        let edge_refiner = EdgeRefiner::new(
            edge_matcher,
            intrinsics,
            config.edge_min_samples,
            config.edge_max_mean_px,
        );
        Self {
            config,
            renderer,
            initializer,
            pnp_refiner,
            init_refiner,
            edge_refiner,
            intrinsics,
            context: TrackingContext::new(),
        }
    }

    /// Convenience constructor using the built-in extractors and gradient
    /// edge matcher named in the config.
    pub fn from_config(
        config: TrackingConfig,
        intrinsics: Intrinsics,
        renderer: Box<dyn VirtualViewRenderer>,
        initializer: Box<dyn Initializer>,
    ) -> Result<Self> {
        let pnp_extractor = build_extractor(config.pnp_descriptor)?;
        let init_extractor = build_extractor(config.init_descriptor)?;
        let edge_matcher = Box::new(GradientEdgeMatcher::new(
            config.edge_high_thresh,
            config.edge_low_thresh,
        ));
        Ok(Self::new(
            config,
            intrinsics,
            renderer,
            initializer,
            pnp_extractor,
            init_extractor,
            edge_matcher,
        ))
    }

    pub fn context(&self) -> &TrackingContext {
        &self.context
    }

    /// Processes one frame and advances the state machine.
    pub fn tick(&mut self, frame: &Frame) -> TrackingResult {
        let total = Instant::now();
        let mut metrics = TrackingMetrics::default();
        let mut timing = TimingStats::default();

        let (updated, failure) = match self.context.state {
            TrackingState::Edges => self.tick_edges(frame, &mut metrics, &mut timing),
            TrackingState::Pnp => self.tick_pnp(frame, &mut metrics, &mut timing),
            TrackingState::InitPnp => self.tick_init_pnp(frame, &mut metrics, &mut timing),
            TrackingState::Init | TrackingState::LocalInit => self.tick_init(frame),
        };

        timing.total_ms = total.elapsed().as_secs_f64() * 1e3;
        TrackingResult {
            state: self.context.state,
            pose: self.context.pose.clone(),
            updated,
            failure,
            metrics,
            timing,
        }
    }

    fn tick_edges(
        &mut self,
        frame: &Frame,
        metrics: &mut TrackingMetrics,
        timing: &mut TimingStats,
    ) -> (bool, Option<RefineFailure>) {
        let pose = self
            .context
            .pose
            .clone()
            .expect("edge tracking requires a pose");
        match self
            .edge_refiner
            .refine(frame, self.renderer.as_mut(), &pose, metrics, timing)
        {
            Ok(refined) => {
                self.context.pose = Some(refined);
                (true, None)
            }
            Err(err) => {
                self.context.state = TrackingState::Pnp;
                (false, Some(err))
            }
        }
    }

    fn tick_pnp(
        &mut self,
        frame: &Frame,
        metrics: &mut TrackingMetrics,
        timing: &mut TimingStats,
    ) -> (bool, Option<RefineFailure>) {
        let pose = self
            .context
            .pose
            .clone()
            .expect("PnP tracking requires a pose");
        match self
            .pnp_refiner
            .refine(frame, self.renderer.as_mut(), &pose, metrics, timing)
        {
            Ok(refined) => {
                self.context.pnp_retries = 0;
                if self.config.edge_tracking
                    && refined.reproj_error_px < self.config.edge_entry_reproj_px
                {
                    info!(
                        reproj_error_px = refined.reproj_error_px,
                        "PnP converged, switching to edge tracking"
                    );
                    self.context.state = TrackingState::Edges;
                }
                self.context.pose = Some(refined.pose_wc);
                (true, None)
            }
            Err(err) => {
                self.context.pnp_retries += 1;
                if self.context.pnp_retries > self.config.max_pnp_retries {
                    warn!("PnP failed, reinitializing from last known pose");
                    self.context.pnp_retries = 0;
                    self.context.state = TrackingState::LocalInit;
                }
                (false, Some(err))
            }
        }
    }

    fn tick_init_pnp(
        &mut self,
        frame: &Frame,
        metrics: &mut TrackingMetrics,
        timing: &mut TimingStats,
    ) -> (bool, Option<RefineFailure>) {
        let pose = self
            .context
            .pose
            .clone()
            .expect("init verification requires a pose");
        match self
            .init_refiner
            .refine(frame, self.renderer.as_mut(), &pose, metrics, timing)
        {
            Ok(refined) => {
                self.context.pnp_retries = 0;
                self.context.state = TrackingState::Pnp;
                self.context.pose = Some(refined.pose_wc);
                (true, None)
            }
            Err(err) => {
                warn!("initialization pose failed PnP verification");
                self.context.state = TrackingState::LocalInit;
                (false, Some(err))
            }
        }
    }

    fn tick_init(&mut self, frame: &Frame) -> (bool, Option<RefineFailure>) {
        let prior = match self.context.state {
            TrackingState::LocalInit => self.context.pose.clone(),
            _ => None,
        };
        match self
            .initializer
            .localize(&frame.image, &self.intrinsics, prior.as_ref())
        {
            Some(pose) => {
                info!("initializer found a pose, verifying with PnP");
                self.context.state = TrackingState::InitPnp;
                self.context.localize_retries = 0;
                self.context.pose = Some(pose);
                (true, None)
            }
            None => {
                self.context.localize_retries += 1;
                if self.context.localize_retries > self.config.max_localize_retries
                    && self.context.state == TrackingState::LocalInit
                {
                    warn!("initialization keeps failing, restarting from scratch");
                    self.context.state = TrackingState::Init;
                }
                (false, Some(RefineFailure::InitializerFailure))
            }
        }
    }
}
