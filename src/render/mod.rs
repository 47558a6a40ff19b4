//! Virtual view rendering: the data model and the renderer capability.
//!
//! A renderer evaluates the pre-built map at a pose hypothesis and returns a
//! color/intensity image, a per-pixel depth buffer, and a validity mask.
//! Backends are interchangeable and selected once at construction; an
//! unknown or unconfigured backend is a startup error.

pub mod point_cloud;
pub mod sensor_feed;

use anyhow::{bail, Result};
use image::GrayImage;
use nalgebra::Vector2;
use serde::Deserialize;

use crate::camera::Intrinsics;
use crate::geometry::SE3;

pub use point_cloud::{MapPoint, PointCloudRenderer};
pub use sensor_feed::{SensorFeedChannels, SensorFeedRenderer};

/// Per-pixel scene depth in the virtual camera's frame. Pixels without map
/// geometry carry NaN.
#[derive(Debug, Clone)]
pub struct DepthMap {
    width: u32,
    height: u32,
    data: Vec<f32>,
}

impl DepthMap {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![f32::NAN; (width * height) as usize],
        }
    }

    pub fn from_data(width: u32, height: u32, data: Vec<f32>) -> Self {
        debug_assert_eq!(data.len(), (width * height) as usize);
        Self {
            width,
            height,
            data,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn get(&self, x: u32, y: u32) -> f32 {
        self.data[(y * self.width + x) as usize]
    }

    pub fn set(&mut self, x: u32, y: u32, depth: f32) {
        self.data[(y * self.width + x) as usize] = depth;
    }

    /// Depth under a sub-pixel coordinate (nearest pixel); NaN outside the
    /// buffer.
    pub fn at_point(&self, p: &Vector2<f64>) -> f32 {
        let x = p.x.round();
        let y = p.y.round();
        if x < 0.0 || y < 0.0 || x >= self.width as f64 || y >= self.height as f64 {
            return f32::NAN;
        }
        self.get(x as u32, y as u32)
    }

    /// Validity mask derived from finite depth values.
    pub fn finite_mask(&self) -> GrayImage {
        let mut mask = GrayImage::new(self.width, self.height);
        for y in 0..self.height {
            for x in 0..self.width {
                if self.get(x, y).is_finite() {
                    mask.put_pixel(x, y, image::Luma([255]));
                }
            }
        }
        mask
    }
}

/// Renderer output for one pose hypothesis.
pub struct VirtualView {
    pub image: GrayImage,
    pub depth: DepthMap,
    /// 255 where the pixel is backed by real map geometry.
    pub mask: GrayImage,
    /// The renderer's own intrinsics; may differ from the live camera's.
    pub intrinsics: Intrinsics,
}

/// Synthesizes a virtual view of the map at a camera-to-world pose
/// hypothesis (`T_wc`).
///
/// Rendering is synchronous; there is no cancellation, so a stuck backend
/// blocks the tick that requested it.
pub trait VirtualViewRenderer: Send {
    fn render(&mut self, pose_wc: &SE3) -> Result<VirtualView>;
}

/// Virtual view source, selectable by configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RendererBackend {
    /// Z-buffered rasterization of an intensity point cloud.
    PointCloud,
    /// Mesh-engine rendering; requires an injected implementation.
    Mesh,
    /// Live simulated sensor feed over capture channels.
    SensorFeed,
}

/// Sources available for backend construction. Only the source matching the
/// selected backend needs to be present.
#[derive(Default)]
pub struct RendererSources {
    pub point_cloud: Option<PointCloudRenderer>,
    pub sensor_feed: Option<SensorFeedRenderer>,
}

/// Resolve the configured backend to a concrete renderer.
///
/// Misconfiguration (backend selected without its source) fails loudly at
/// startup instead of degrading into per-frame render failures.
pub fn build_renderer(
    backend: RendererBackend,
    sources: RendererSources,
) -> Result<Box<dyn VirtualViewRenderer>> {
    match backend {
        RendererBackend::PointCloud => match sources.point_cloud {
            Some(r) => Ok(Box::new(r)),
            None => bail!("point_cloud backend selected but no map point cloud was provided"),
        },
        RendererBackend::SensorFeed => match sources.sensor_feed {
            Some(r) => Ok(Box::new(r)),
            None => bail!("sensor_feed backend selected but no capture channels were provided"),
        },
        RendererBackend::Mesh => {
            bail!("mesh backend has no built-in renderer; inject a VirtualViewRenderer")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_depth_map_starts_invalid() {
        let d = DepthMap::new(4, 3);
        assert!(d.get(0, 0).is_nan());
        assert!(d.at_point(&Vector2::new(1.2, 0.8)).is_nan());
    }

    #[test]
    fn test_at_point_rounds_and_bounds() {
        let mut d = DepthMap::new(4, 3);
        d.set(2, 1, 5.0);
        assert_eq!(d.at_point(&Vector2::new(1.6, 1.4)), 5.0);
        assert!(d.at_point(&Vector2::new(-0.6, 0.0)).is_nan());
        assert!(d.at_point(&Vector2::new(3.6, 0.0)).is_nan());
    }

    #[test]
    fn test_finite_mask_tracks_valid_pixels() {
        let mut d = DepthMap::new(3, 3);
        d.set(1, 1, 2.0);
        let mask = d.finite_mask();
        assert_eq!(mask.get_pixel(1, 1)[0], 255);
        assert_eq!(mask.get_pixel(0, 0)[0], 0);
    }

    #[test]
    fn test_unconfigured_backend_is_startup_error() {
        assert!(build_renderer(RendererBackend::PointCloud, RendererSources::default()).is_err());
        assert!(build_renderer(RendererBackend::Mesh, RendererSources::default()).is_err());
    }
}
