//! Edge correspondence extraction for fine pose alignment.
//!
//! Once feature-based tracking has converged, pose refinement can switch to
//! dense-ish edge alignment: strong gradients in the rendered view are
//! back-projected to 3D through the virtual depth and paired with nearby
//! strong gradients in the live image. The matcher is a trait so model-aware
//! implementations (CAD wireframes, learned edge maps) can replace the
//! built-in gradient search.

use image::GrayImage;
use nalgebra::{Vector2, Vector3};

use crate::geometry::SE3;
use crate::render::VirtualView;

/// One 3D-to-2D edge correspondence.
#[derive(Debug, Clone)]
pub struct EdgeSample {
    /// Edge point in world coordinates.
    pub world_point: Vector3<f64>,
    /// Matched edge location in the live image, pixels.
    pub image_point: Vector2<f64>,
    /// Pixel distance between the rendered edge and its match.
    pub distance: f64,
}

/// Produces edge correspondences between a live image and a rendered view.
///
/// `view_pose_wc` is the camera-to-world pose the view was rendered from and
/// anchors the back-projection of virtual edge pixels into world space.
pub trait EdgeMatcher: Send {
    fn match_edges(
        &self,
        image: &GrayImage,
        view: &VirtualView,
        view_pose_wc: &SE3,
    ) -> Vec<EdgeSample>;
}

/// Built-in matcher based on Sobel gradient magnitude.
///
/// Virtual pixels whose gradient exceeds `high_thresh` (and whose depth is
/// valid) are back-projected to world space, then matched to the nearest
/// live-image pixel within `search_radius` whose gradient exceeds
/// `low_thresh`. The asymmetric thresholds keep the rendered seed edges
/// sparse and confident while tolerating the softer gradients of a real
/// sensor image.
pub struct GradientEdgeMatcher {
    pub high_thresh: f64,
    pub low_thresh: f64,
    pub search_radius: u32,
}

impl GradientEdgeMatcher {
    pub fn new(high_thresh: f64, low_thresh: f64) -> Self {
        Self {
            high_thresh,
            low_thresh,
            search_radius: 8,
        }
    }
}

/// Sobel gradient magnitude at (x, y). Border pixels report zero.
fn gradient_magnitude(image: &GrayImage, x: u32, y: u32) -> f64 {
    let (w, h) = image.dimensions();
    if x == 0 || y == 0 || x + 1 >= w || y + 1 >= h {
        return 0.0;
    }
    let p = |dx: i32, dy: i32| -> f64 {
        image.get_pixel((x as i32 + dx) as u32, (y as i32 + dy) as u32)[0] as f64
    };
    let gx = (p(1, -1) + 2.0 * p(1, 0) + p(1, 1)) - (p(-1, -1) + 2.0 * p(-1, 0) + p(-1, 1));
    let gy = (p(-1, 1) + 2.0 * p(0, 1) + p(1, 1)) - (p(-1, -1) + 2.0 * p(0, -1) + p(1, -1));
    (gx * gx + gy * gy).sqrt()
}

impl EdgeMatcher for GradientEdgeMatcher {
    fn match_edges(
        &self,
        image: &GrayImage,
        view: &VirtualView,
        view_pose_wc: &SE3,
    ) -> Vec<EdgeSample> {
        let (vw, vh) = view.image.dimensions();
        let (iw, ih) = image.dimensions();
        let r = self.search_radius as i32;
        let mut samples = Vec::new();

        for y in 0..vh {
            for x in 0..vw {
                if view.mask.get_pixel(x, y)[0] == 0 {
                    continue;
                }
                if gradient_magnitude(&view.image, x, y) < self.high_thresh {
                    continue;
                }
                let depth = view.depth.get(x, y);
                if !depth.is_finite() || depth <= 0.0 {
                    continue;
                }

                let p_cam = view
                    .intrinsics
                    .unproject(&Vector2::new(x as f64, y as f64), depth as f64);
                let world_point = view_pose_wc.transform_point(&p_cam);

                // Nearest strong gradient in the live image, scanning a
                // square window around the rendered location.
                let mut best: Option<(f64, Vector2<f64>)> = None;
                for dy in -r..=r {
                    for dx in -r..=r {
                        let ix = x as i32 + dx;
                        let iy = y as i32 + dy;
                        if ix < 0 || iy < 0 || ix >= iw as i32 || iy >= ih as i32 {
                            continue;
                        }
                        if gradient_magnitude(image, ix as u32, iy as u32) < self.low_thresh {
                            continue;
                        }
                        let dist = ((dx * dx + dy * dy) as f64).sqrt();
                        if best.map_or(true, |(d, _)| dist < d) {
                            best = Some((dist, Vector2::new(ix as f64, iy as f64)));
                        }
                    }
                }

                if let Some((distance, image_point)) = best {
                    samples.push(EdgeSample {
                        world_point,
                        image_point,
                        distance,
                    });
                }
            }
        }
        samples
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::Intrinsics;
    use crate::render::DepthMap;
    use approx::assert_relative_eq;

    /// Grayscale image with a bright right half, giving one vertical edge.
    fn vertical_edge_image(w: u32, h: u32, edge_x: u32) -> GrayImage {
        GrayImage::from_fn(w, h, |x, _| {
            if x >= edge_x {
                image::Luma([220u8])
            } else {
                image::Luma([20u8])
            }
        })
    }

    fn flat_view(w: u32, h: u32, edge_x: u32, depth: f32) -> VirtualView {
        let mut d = DepthMap::new(w, h);
        for y in 0..h {
            for x in 0..w {
                d.set(x, y, depth);
            }
        }
        VirtualView {
            image: vertical_edge_image(w, h, edge_x),
            mask: d.finite_mask(),
            depth: d,
            intrinsics: Intrinsics::new(50.0, 50.0, w as f64 / 2.0, h as f64 / 2.0),
        }
    }

    #[test]
    fn test_aligned_edges_match_at_zero_distance() {
        let view = flat_view(40, 30, 20, 2.0);
        let live = vertical_edge_image(40, 30, 20);
        let matcher = GradientEdgeMatcher::new(100.0, 50.0);
        let samples = matcher.match_edges(&live, &view, &SE3::identity());

        assert!(!samples.is_empty());
        for s in &samples {
            assert_relative_eq!(s.distance, 0.0);
            // Depth 2.0 along the optical axis puts every edge point on the
            // z = 2 plane in front of the identity camera.
            assert_relative_eq!(s.world_point.z, 2.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_shifted_edge_reports_offset_distance() {
        let view = flat_view(40, 30, 20, 2.0);
        let live = vertical_edge_image(40, 30, 23);
        let matcher = GradientEdgeMatcher::new(100.0, 50.0);
        let samples = matcher.match_edges(&live, &view, &SE3::identity());

        assert!(!samples.is_empty());
        let mean: f64 = samples.iter().map(|s| s.distance).sum::<f64>() / samples.len() as f64;
        assert!(mean >= 2.0 && mean <= 4.0, "mean distance {mean}");
    }

    #[test]
    fn test_no_live_gradient_yields_no_samples() {
        let view = flat_view(40, 30, 20, 2.0);
        let live = GrayImage::from_pixel(40, 30, image::Luma([128u8]));
        let matcher = GradientEdgeMatcher::new(100.0, 50.0);
        assert!(matcher.match_edges(&live, &view, &SE3::identity()).is_empty());
    }
}
