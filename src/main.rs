use std::thread;
use std::time::Duration;

use anyhow::Result;
use crossbeam_channel::unbounded;
use image::GrayImage;
use nalgebra::Vector3;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use tracing_subscriber::EnvFilter;

use map_localize::camera::Intrinsics;
use map_localize::config::TrackingConfig;
use map_localize::features::DescriptorKind;
use map_localize::geometry::SE3;
use map_localize::init::Initializer;
use map_localize::render::{MapPoint, PointCloudRenderer, VirtualViewRenderer};
use map_localize::system::{LatestSlot, Pipeline, PipelineInputs};
use map_localize::tracking::TrackingStateMachine;

const WIDTH: u32 = 320;
const HEIGHT: u32 = 240;
const N_FRAMES: usize = 60;

/// Coarse localizer for the synthetic scene: it knows the rough starting
/// pose and hands back the tracker's own prior on relocalization.
struct DemoInitializer {
    start: SE3,
}

impl Initializer for DemoInitializer {
    fn localize(
        &mut self,
        _image: &GrayImage,
        _intrinsics: &Intrinsics,
        prior: Option<&SE3>,
    ) -> Option<SE3> {
        Some(prior.cloned().unwrap_or_else(|| self.start.clone()))
    }
}

/// Random star-field point cloud with enough texture for feature tracking.
fn synthetic_cloud(n: usize) -> Vec<MapPoint> {
    let mut rng = SmallRng::seed_from_u64(42);
    (0..n)
        .map(|_| MapPoint {
            position: Vector3::new(
                rng.gen_range(-4.0..4.0),
                rng.gen_range(-3.0..3.0),
                rng.gen_range(5.0..12.0),
            ),
            intensity: rng.gen_range(80u8..=255u8),
        })
        .collect()
}

/// Camera trajectory: slow lateral drift through the star field.
fn trajectory_pose(i: usize) -> SE3 {
    let mut pose = SE3::identity();
    pose.translation = Vector3::new(0.01 * i as f64, 0.005 * i as f64, 0.0);
    pose
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let n_points: usize = std::env::args()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .unwrap_or(1500);
    let cloud = synthetic_cloud(n_points);
    let intrinsics = Intrinsics::new(260.0, 260.0, WIDTH as f64 / 2.0, HEIGHT as f64 / 2.0);

    println!(
        "Tracking a simulated camera through a {} point cloud ({} frames)",
        cloud.len(),
        N_FRAMES
    );

    let inputs = PipelineInputs {
        images: LatestSlot::new(),
        calibration: LatestSlot::new(),
    };
    let images = inputs.images.clone();
    inputs.calibration.publish(intrinsics);

    let (pose_tx, pose_rx) = unbounded();
    let (stop_tx, stop_rx) = unbounded::<()>();

    let config = TrackingConfig {
        init_descriptor: DescriptorKind::Orb,
        ..TrackingConfig::default()
    };
    let tracker_cloud = cloud.clone();
    let pipeline = Pipeline::new(inputs, config.clone(), pose_tx, stop_rx);
    let pipeline_thread = thread::spawn(move || {
        pipeline.run(move |k| {
            let renderer = PointCloudRenderer::new(tracker_cloud, k, WIDTH, HEIGHT)?;
            TrackingStateMachine::from_config(
                config,
                k,
                Box::new(renderer),
                Box::new(DemoInitializer {
                    start: SE3::identity(),
                }),
            )
        })
    });

    // Simulated camera: render the ground-truth view and feed it in as the
    // live image.
    let camera_thread = thread::spawn(move || -> Result<()> {
        let mut camera = PointCloudRenderer::new(cloud, intrinsics, WIDTH, HEIGHT)?;
        for i in 0..N_FRAMES {
            let view = camera.render(&trajectory_pose(i))?;
            images.publish((i as u64 * 33_000_000, view.image));
            thread::sleep(Duration::from_millis(33));
        }
        Ok(())
    });

    let mut n_poses = 0usize;
    loop {
        match pose_rx.recv_timeout(Duration::from_millis(200)) {
            Ok(stamped) => {
                n_poses += 1;
                let t = stamped.pose.translation;
                println!(
                    "t={:>6.3}s  pose=[{:+.3}, {:+.3}, {:+.3}]",
                    stamped.timestamp_ns as f64 / 1e9,
                    t.x,
                    t.y,
                    t.z
                );
            }
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => {
                if camera_thread.is_finished() {
                    break;
                }
            }
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
        }
    }

    drop(stop_tx);
    camera_thread.join().expect("camera thread panicked")?;
    pipeline_thread.join().expect("pipeline thread panicked")?;
    println!("Tracked {} poses", n_poses);
    Ok(())
}
