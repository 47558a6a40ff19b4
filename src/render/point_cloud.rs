//! Point-cloud rasterizing renderer.
//!
//! Projects an intensity point cloud through the virtual camera with a
//! z-buffer, splatting each point over a small neighborhood so the rendered
//! image is dense enough for feature extraction.

use anyhow::{ensure, Result};
use image::GrayImage;
use nalgebra::Vector3;

use crate::camera::Intrinsics;
use crate::geometry::SE3;

use super::{DepthMap, VirtualView, VirtualViewRenderer};

/// One map point: world position plus intensity.
#[derive(Debug, Clone, Copy)]
pub struct MapPoint {
    pub position: Vector3<f64>,
    pub intensity: u8,
}

pub struct PointCloudRenderer {
    points: Vec<MapPoint>,
    intrinsics: Intrinsics,
    width: u32,
    height: u32,
    /// Splat half-extent in pixels.
    splat_radius: i32,
}

impl PointCloudRenderer {
    pub fn new(
        points: Vec<MapPoint>,
        intrinsics: Intrinsics,
        width: u32,
        height: u32,
    ) -> Result<Self> {
        ensure!(!points.is_empty(), "map point cloud is empty");
        ensure!(width > 0 && height > 0, "virtual image dimensions are zero");
        Ok(Self {
            points,
            intrinsics,
            width,
            height,
            splat_radius: 1,
        })
    }

    pub fn intrinsics(&self) -> Intrinsics {
        self.intrinsics
    }

    pub fn num_points(&self) -> usize {
        self.points.len()
    }
}

impl VirtualViewRenderer for PointCloudRenderer {
    fn render(&mut self, pose_wc: &SE3) -> Result<VirtualView> {
        let pose_cw = pose_wc.inverse();
        let mut image = GrayImage::new(self.width, self.height);
        let mut depth = DepthMap::new(self.width, self.height);
        let mut mask = GrayImage::new(self.width, self.height);

        for point in &self.points {
            let p_cam = pose_cw.transform_point(&point.position);
            if p_cam.z <= 0.0 {
                continue;
            }
            let px = self.intrinsics.project(&p_cam);
            let cx = px.x.round() as i64;
            let cy = px.y.round() as i64;

            for dy in -(self.splat_radius as i64)..=(self.splat_radius as i64) {
                for dx in -(self.splat_radius as i64)..=(self.splat_radius as i64) {
                    let x = cx + dx;
                    let y = cy + dy;
                    if x < 0 || y < 0 || x >= self.width as i64 || y >= self.height as i64 {
                        continue;
                    }
                    let (x, y) = (x as u32, y as u32);
                    let existing = depth.get(x, y);
                    if existing.is_nan() || (p_cam.z as f32) < existing {
                        depth.set(x, y, p_cam.z as f32);
                        image.put_pixel(x, y, image::Luma([point.intensity]));
                        mask.put_pixel(x, y, image::Luma([255]));
                    }
                }
            }
        }

        Ok(VirtualView {
            image,
            depth,
            mask,
            intrinsics: self.intrinsics,
        })
    }
}
