//! Live simulated-sensor renderer.
//!
//! Instead of rasterizing the map itself, this backend commands an external
//! simulator to move its virtual sensor to the pose hypothesis, then waits
//! for the paired virtual image and depth buffer to arrive on single-slot
//! capture channels. The validity mask is derived from finite depth values.

use std::time::Duration;

use anyhow::{ensure, Result};
use crossbeam_channel::Sender;
use image::GrayImage;

use crate::camera::Intrinsics;
use crate::geometry::SE3;
use crate::system::capture::LatestSlot;

use super::{DepthMap, VirtualView, VirtualViewRenderer};

/// Channel ends wired to the external simulator.
pub struct SensorFeedChannels {
    /// Pose commands out to the simulator (camera-to-world).
    pub pose_tx: Sender<SE3>,
    /// Latest virtual image from the simulator.
    pub image_slot: LatestSlot<GrayImage>,
    /// Latest virtual depth from the simulator.
    pub depth_slot: LatestSlot<DepthMap>,
}

pub struct SensorFeedRenderer {
    channels: SensorFeedChannels,
    intrinsics: Intrinsics,
    poll_interval: Duration,
}

impl SensorFeedRenderer {
    pub fn new(channels: SensorFeedChannels, intrinsics: Intrinsics) -> Self {
        Self {
            channels,
            intrinsics,
            poll_interval: Duration::from_millis(1),
        }
    }
}

impl VirtualViewRenderer for SensorFeedRenderer {
    /// Command the simulator to `pose_wc` and wait for the paired image and
    /// depth to arrive.
    ///
    /// The wait is unbounded; a simulator that never answers blocks the
    /// whole tick, matching the pipeline's no-cancellation model.
    fn render(&mut self, pose_wc: &SE3) -> Result<VirtualView> {
        self.channels.pose_tx.send(pose_wc.clone())?;

        let (image, depth) = loop {
            if self.channels.image_slot.is_ready() && self.channels.depth_slot.is_ready() {
                // Both streams are ready; consume them together so the pair
                // stays consistent.
                let image = self.channels.image_slot.take().expect("checked ready");
                let depth = self.channels.depth_slot.take().expect("checked ready");
                break (image, depth);
            }
            std::thread::sleep(self.poll_interval);
        };

        ensure!(
            image.dimensions() == (depth.width(), depth.height()),
            "virtual image {}x{} does not match depth {}x{}",
            image.width(),
            image.height(),
            depth.width(),
            depth.height(),
        );

        let mask = depth.finite_mask();
        Ok(VirtualView {
            image,
            depth,
            mask,
            intrinsics: self.intrinsics,
        })
    }
}
