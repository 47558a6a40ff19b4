//! Binary-mask morphology used by occlusion-mask reprojection.
//!
//! Masks are `GrayImage`s where 255 marks a valid pixel and 0 invalid;
//! intermediate values never occur.

use image::GrayImage;

/// Dilate a binary mask with a rectangular structuring element of half-width
/// `radius` (kernel side `2*radius + 1`).
pub fn dilate_mask(mask: &GrayImage, radius: u32) -> GrayImage {
    if radius == 0 {
        return mask.clone();
    }

    let (width, height) = mask.dimensions();
    let r = radius as i32;
    let mut out = GrayImage::new(width, height);

    for y in 0..height as i32 {
        for x in 0..width as i32 {
            let mut hit = false;
            'kernel: for dy in -r..=r {
                for dx in -r..=r {
                    let px = x + dx;
                    let py = y + dy;
                    if px >= 0
                        && py >= 0
                        && px < width as i32
                        && py < height as i32
                        && mask.get_pixel(px as u32, py as u32)[0] != 0
                    {
                        hit = true;
                        break 'kernel;
                    }
                }
            }
            if hit {
                out.put_pixel(x as u32, y as u32, image::Luma([255]));
            }
        }
    }
    out
}

/// 3x3 median filter on a binary mask; removes isolated speckle left by
/// point-wise warping. Out-of-bounds neighbors count as invalid.
pub fn median_filter_mask(mask: &GrayImage) -> GrayImage {
    let (width, height) = mask.dimensions();
    let mut out = GrayImage::new(width, height);

    for y in 0..height as i32 {
        for x in 0..width as i32 {
            let mut valid = 0u32;
            for dy in -1..=1 {
                for dx in -1..=1 {
                    let px = x + dx;
                    let py = y + dy;
                    if px >= 0
                        && py >= 0
                        && px < width as i32
                        && py < height as i32
                        && mask.get_pixel(px as u32, py as u32)[0] != 0
                    {
                        valid += 1;
                    }
                }
            }
            // Median of 9 binary samples: majority wins.
            if valid >= 5 {
                out.put_pixel(x as u32, y as u32, image::Luma([255]));
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dilate_grows_single_pixel() {
        let mut mask = GrayImage::new(9, 9);
        mask.put_pixel(4, 4, image::Luma([255]));

        let out = dilate_mask(&mask, 2);
        for y in 2..=6 {
            for x in 2..=6 {
                assert_eq!(out.get_pixel(x, y)[0], 255);
            }
        }
        assert_eq!(out.get_pixel(1, 4)[0], 0);
    }

    #[test]
    fn test_dilate_zero_radius_is_identity() {
        let mut mask = GrayImage::new(5, 5);
        mask.put_pixel(2, 2, image::Luma([255]));
        assert_eq!(dilate_mask(&mask, 0), mask);
    }

    #[test]
    fn test_median_removes_speckle() {
        let mut mask = GrayImage::new(9, 9);
        mask.put_pixel(4, 4, image::Luma([255]));
        let out = median_filter_mask(&mask);
        assert!(out.pixels().all(|p| p[0] == 0));
    }

    #[test]
    fn test_median_keeps_solid_region() {
        let mask = GrayImage::from_pixel(9, 9, image::Luma([255]));
        let out = median_filter_mask(&mask);
        // Interior stays valid; only image corners (with 4 in-bounds
        // neighbors) can flip.
        assert_eq!(out.get_pixel(4, 4)[0], 255);
        assert_eq!(out.get_pixel(1, 1)[0], 255);
    }
}
