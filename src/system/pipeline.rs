//! The tracking pipeline loop.
//!
//! Consumes the newest camera frame each tick, runs the tracker and
//! publishes stamped pose estimates. Frames arriving faster than ticks are
//! simply overwritten in their capture slot, so the tracker always works on
//! the freshest image and never builds a backlog.

use std::time::{Duration, Instant};

use anyhow::Result;
use crossbeam_channel::{Receiver, Sender, TrySendError};
use image::GrayImage;
use tracing::{debug, info};

use crate::camera::{resize_image, undistort_image, Intrinsics};
use crate::config::TrackingConfig;
use crate::system::LatestSlot;
use crate::tracking::{Frame, TrackingStateMachine};

const TICK: Duration = Duration::from_millis(10);

/// A pose estimate tied to the frame it was computed from.
#[derive(Debug, Clone)]
pub struct StampedPose {
    pub pose: crate::geometry::SE3,
    pub timestamp_ns: u64,
}

/// Capture-side inputs to the pipeline.
pub struct PipelineInputs {
    /// Newest camera frame, stamped in nanoseconds.
    pub images: LatestSlot<(u64, GrayImage)>,
    /// Camera calibration; the pipeline blocks until the first one arrives.
    pub calibration: LatestSlot<Intrinsics>,
}

pub struct Pipeline {
    inputs: PipelineInputs,
    config: TrackingConfig,
    pose_tx: Sender<StampedPose>,
    shutdown: Receiver<()>,
}

impl Pipeline {
    pub fn new(
        inputs: PipelineInputs,
        config: TrackingConfig,
        pose_tx: Sender<StampedPose>,
        shutdown: Receiver<()>,
    ) -> Self {
        Self {
            inputs,
            config,
            pose_tx,
            shutdown,
        }
    }

    /// Blocks until calibration is published, returning the intrinsics
    /// rescaled to the working image size.
    fn wait_for_calibration(&self) -> Option<Intrinsics> {
        info!("waiting for camera calibration");
        loop {
            if let Some(k) = self.inputs.calibration.take() {
                return Some(k.scaled(self.config.image_scale));
            }
            if self.shutdown_requested() {
                return None;
            }
            std::thread::sleep(TICK);
        }
    }

    fn shutdown_requested(&self) -> bool {
        match self.shutdown.try_recv() {
            Ok(()) => true,
            Err(crossbeam_channel::TryRecvError::Disconnected) => true,
            Err(crossbeam_channel::TryRecvError::Empty) => false,
        }
    }

    /// One pipeline step: preprocess the newest frame, tick the tracker and
    /// publish the pose if it was updated. Returns false when no frame was
    /// waiting.
    fn step(&mut self, tracker: &mut TrackingStateMachine, k: &Intrinsics) -> Result<bool> {
        let Some((timestamp_ns, raw)) = self.inputs.images.take() else {
            return Ok(false);
        };

        let mut image = if (self.config.image_scale - 1.0).abs() > f64::EPSILON {
            resize_image(&raw, self.config.image_scale)
        } else {
            raw
        };
        if k.has_distortion() {
            image = undistort_image(&image, k);
        }

        let frame = Frame::new(timestamp_ns, image);
        let result = tracker.tick(&frame);
        debug!(
            state = ?result.state,
            updated = result.updated,
            n_matches = result.metrics.n_matches,
            total_ms = result.timing.total_ms,
            "processed frame"
        );

        if result.updated {
            if let Some(pose) = result.pose {
                // A consumer that stopped listening ends the pipeline.
                match self.pose_tx.try_send(StampedPose { pose, timestamp_ns }) {
                    Ok(()) | Err(TrySendError::Full(_)) => {}
                    Err(TrySendError::Disconnected(_)) => {
                        anyhow::bail!("pose consumer disconnected")
                    }
                }
            }
        }
        Ok(true)
    }

    /// Runs until shutdown is requested or the pose consumer goes away.
    ///
    /// The tracker is built lazily once calibration is known, via
    /// `make_tracker`, since its refiners need the working intrinsics.
    pub fn run<F>(mut self, make_tracker: F) -> Result<()>
    where
        F: FnOnce(Intrinsics) -> Result<TrackingStateMachine>,
    {
        let Some(k) = self.wait_for_calibration() else {
            return Ok(());
        };
        info!(fx = k.fx, fy = k.fy, "calibration received, tracking started");
        let mut tracker = make_tracker(k)?;

        loop {
            let started = Instant::now();
            if self.shutdown_requested() {
                info!("pipeline shutting down");
                return Ok(());
            }
            if self.step(&mut tracker, &k).is_err() {
                return Ok(());
            }
            if let Some(remaining) = TICK.checked_sub(started.elapsed()) {
                std::thread::sleep(remaining);
            }
        }
    }
}
