//! Occlusion mask reprojection.
//!
//! The renderer reports which virtual pixels actually contain map content.
//! Because the virtual view is rendered at the current pose hypothesis, that
//! validity map transfers to the live image by pure intrinsics reprojection
//! through the virtual depth: no pose change is involved. The warped mask
//! restricts live feature extraction to regions the map can explain, so
//! foreground obstructions and unmapped areas do not feed the matcher.

use image::{GrayImage, Luma};
use nalgebra::Vector2;

use crate::camera::Intrinsics;
use crate::imgproc::{dilate_mask, median_filter_mask};
use crate::render::DepthMap;

const VALID: u8 = 255;

/// Warps a virtual-view validity mask into live image coordinates.
///
/// Each valid source pixel is lifted to 3D through `src_depth`, reprojected
/// with the live intrinsics and written into a `dst_width` x `dst_height`
/// mask. Forward warping leaves pinholes, so the result is cleaned with a
/// 3x3 median before being returned.
pub fn reproject_mask(
    src_mask: &GrayImage,
    src_depth: &DepthMap,
    src_k: &Intrinsics,
    dst_k: &Intrinsics,
    dst_width: u32,
    dst_height: u32,
) -> GrayImage {
    let mut dst = GrayImage::new(dst_width, dst_height);

    for y in 0..src_mask.height() {
        for x in 0..src_mask.width() {
            if src_mask.get_pixel(x, y)[0] != VALID {
                continue;
            }
            let depth = src_depth.get(x, y) as f64;
            if !depth.is_finite() || depth <= 0.0 {
                continue;
            }
            let p_cam = src_k.unproject(&Vector2::new(x as f64, y as f64), depth);
            let dst_px = dst_k.project(&p_cam);
            let dx = dst_px.x.floor();
            let dy = dst_px.y.floor();
            if dx < 0.0 || dy < 0.0 || dx >= dst_width as f64 || dy >= dst_height as f64 {
                continue;
            }
            dst.put_pixel(dx as u32, dy as u32, Luma([VALID]));
        }
    }

    median_filter_mask(&dst)
}

/// Full mask pipeline for live feature extraction: reproject, then dilate
/// so features that shifted slightly between hypothesis and reality are not
/// masked away.
pub fn reprojected_feature_mask(
    src_mask: &GrayImage,
    src_depth: &DepthMap,
    src_k: &Intrinsics,
    dst_k: &Intrinsics,
    dst_width: u32,
    dst_height: u32,
    dilate_radius: u32,
) -> GrayImage {
    let warped = reproject_mask(src_mask, src_depth, src_k, dst_k, dst_width, dst_height);
    dilate_mask(&warped, dilate_radius)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uniform_depth(w: u32, h: u32, depth: f32) -> DepthMap {
        let mut d = DepthMap::new(w, h);
        for y in 0..h {
            for x in 0..w {
                d.set(x, y, depth);
            }
        }
        d
    }

    #[test]
    fn test_identity_intrinsics_preserve_interior_regions() {
        let k = Intrinsics::new(60.0, 60.0, 20.0, 15.0);
        let depth = uniform_depth(40, 30, 3.0);
        let mut mask = GrayImage::new(40, 30);
        for y in 8..22 {
            for x in 10..30 {
                mask.put_pixel(x, y, Luma([VALID]));
            }
        }

        let out = reproject_mask(&mask, &depth, &k, &k, 40, 30);
        // Interior of the block survives the warp and the median.
        assert_eq!(out.get_pixel(20, 15)[0], VALID);
        assert_eq!(out.get_pixel(12, 10)[0], VALID);
        // Far corners stay invalid.
        assert_eq!(out.get_pixel(0, 0)[0], 0);
        assert_eq!(out.get_pixel(39, 29)[0], 0);
    }

    #[test]
    fn test_invalid_depth_pixels_do_not_transfer() {
        let k = Intrinsics::new(60.0, 60.0, 20.0, 15.0);
        let depth = DepthMap::new(40, 30);
        let mask = GrayImage::from_pixel(40, 30, Luma([VALID]));

        let out = reproject_mask(&mask, &depth, &k, &k, 40, 30);
        assert!(out.pixels().all(|p| p[0] == 0));
    }

    #[test]
    fn test_dilation_grows_the_warped_region() {
        let k = Intrinsics::new(60.0, 60.0, 20.0, 15.0);
        let depth = uniform_depth(40, 30, 3.0);
        let mut mask = GrayImage::new(40, 30);
        for y in 12..18 {
            for x in 16..24 {
                mask.put_pixel(x, y, Luma([VALID]));
            }
        }

        let out = reprojected_feature_mask(&mask, &depth, &k, &k, 40, 30, 5);
        // Five pixels outside the original block are valid after dilation.
        assert_eq!(out.get_pixel(12, 15)[0], VALID);
        assert_eq!(out.get_pixel(27, 15)[0], VALID);
    }
}
