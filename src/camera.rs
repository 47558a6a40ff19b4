//! Pinhole camera intrinsics, lens distortion, and image rectification.

use image::GrayImage;
use nalgebra::{Matrix3, Vector2, Vector3};
use serde::Deserialize;

/// Pinhole intrinsics with a 5-coefficient distortion vector
/// (radial k1, k2, k3 and tangential p1, p2). Off-diagonal terms of the
/// calibration matrix are assumed zero.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct Intrinsics {
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
    /// [k1, k2, p1, p2, k3]
    #[serde(default)]
    pub distortion: [f64; 5],
}

impl Intrinsics {
    pub fn new(fx: f64, fy: f64, cx: f64, cy: f64) -> Self {
        Self {
            fx,
            fy,
            cx,
            cy,
            distortion: [0.0; 5],
        }
    }

    pub fn from_matrix(k: &Matrix3<f64>) -> Self {
        Self::new(k[(0, 0)], k[(1, 1)], k[(0, 2)], k[(1, 2)])
    }

    pub fn matrix(&self) -> Matrix3<f64> {
        Matrix3::new(
            self.fx, 0.0, self.cx, //
            0.0, self.fy, self.cy, //
            0.0, 0.0, 1.0,
        )
    }

    /// Intrinsics after a uniform image resize by `scale`. The homogeneous
    /// bottom-right term stays 1; distortion coefficients are unchanged
    /// (they act on normalized coordinates).
    pub fn scaled(&self, scale: f64) -> Self {
        Self {
            fx: self.fx * scale,
            fy: self.fy * scale,
            cx: self.cx * scale,
            cy: self.cy * scale,
            distortion: self.distortion,
        }
    }

    /// Project a camera-frame point (z > 0) to pixel coordinates.
    pub fn project(&self, p_cam: &Vector3<f64>) -> Vector2<f64> {
        Vector2::new(
            self.fx * p_cam.x / p_cam.z + self.cx,
            self.fy * p_cam.y / p_cam.z + self.cy,
        )
    }

    /// Back-project a pixel at the given scene depth into the camera frame.
    pub fn unproject(&self, pixel: &Vector2<f64>, depth: f64) -> Vector3<f64> {
        Vector3::new(
            (pixel.x - self.cx) / self.fx * depth,
            (pixel.y - self.cy) / self.fy * depth,
            depth,
        )
    }

    /// Apply the distortion model to normalized image coordinates.
    fn distort_normalized(&self, x: f64, y: f64) -> (f64, f64) {
        let [k1, k2, p1, p2, k3] = self.distortion;
        let r2 = x * x + y * y;
        let radial = 1.0 + k1 * r2 + k2 * r2 * r2 + k3 * r2 * r2 * r2;
        let xd = x * radial + 2.0 * p1 * x * y + p2 * (r2 + 2.0 * x * x);
        let yd = y * radial + p1 * (r2 + 2.0 * y * y) + 2.0 * p2 * x * y;
        (xd, yd)
    }

    pub fn has_distortion(&self) -> bool {
        self.distortion.iter().any(|&c| c != 0.0)
    }
}

/// Undistort an image by inverse mapping: for each output pixel, distort its
/// normalized coordinates forward to find the source sample.
///
/// Returns the input unchanged when all distortion coefficients are zero.
pub fn undistort_image(image: &GrayImage, intrinsics: &Intrinsics) -> GrayImage {
    if !intrinsics.has_distortion() {
        return image.clone();
    }

    let (width, height) = image.dimensions();
    let mut out = GrayImage::new(width, height);
    for y in 0..height {
        for x in 0..width {
            let xn = (x as f64 - intrinsics.cx) / intrinsics.fx;
            let yn = (y as f64 - intrinsics.cy) / intrinsics.fy;
            let (xd, yd) = intrinsics.distort_normalized(xn, yn);
            let src_x = intrinsics.fx * xd + intrinsics.cx;
            let src_y = intrinsics.fy * yd + intrinsics.cy;
            let v = sample_bilinear(image, src_x, src_y).unwrap_or(0);
            out.put_pixel(x, y, image::Luma([v]));
        }
    }
    out
}

/// Uniformly resize an image by `scale` with bilinear sampling.
pub fn resize_image(image: &GrayImage, scale: f64) -> GrayImage {
    if scale == 1.0 {
        return image.clone();
    }

    let (width, height) = image.dimensions();
    let new_w = ((width as f64 * scale).round() as u32).max(1);
    let new_h = ((height as f64 * scale).round() as u32).max(1);
    let mut out = GrayImage::new(new_w, new_h);
    for y in 0..new_h {
        for x in 0..new_w {
            let src_x = x as f64 / scale;
            let src_y = y as f64 / scale;
            let v = sample_bilinear(image, src_x, src_y).unwrap_or(0);
            out.put_pixel(x, y, image::Luma([v]));
        }
    }
    out
}

/// Bilinear sample; `None` outside the image.
pub fn sample_bilinear(image: &GrayImage, x: f64, y: f64) -> Option<u8> {
    let (width, height) = image.dimensions();
    if x < 0.0 || y < 0.0 || x > (width - 1) as f64 || y > (height - 1) as f64 {
        return None;
    }

    let x0 = x.floor() as u32;
    let y0 = y.floor() as u32;
    let x1 = (x0 + 1).min(width - 1);
    let y1 = (y0 + 1).min(height - 1);
    let fx = x - x0 as f64;
    let fy = y - y0 as f64;

    let p00 = image.get_pixel(x0, y0)[0] as f64;
    let p10 = image.get_pixel(x1, y0)[0] as f64;
    let p01 = image.get_pixel(x0, y1)[0] as f64;
    let p11 = image.get_pixel(x1, y1)[0] as f64;

    let top = p00 * (1.0 - fx) + p10 * fx;
    let bottom = p01 * (1.0 - fx) + p11 * fx;
    Some((top * (1.0 - fy) + bottom * fy).round() as u8)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_project_unproject_roundtrip() {
        let k = Intrinsics::new(500.0, 510.0, 320.0, 240.0);
        let p_cam = Vector3::new(0.3, -0.2, 2.5);

        let px = k.project(&p_cam);
        let back = k.unproject(&px, p_cam.z);

        assert_relative_eq!(back, p_cam, epsilon = 1e-12);
    }

    #[test]
    fn test_scaled_keeps_homogeneous_term() {
        let k = Intrinsics::new(800.0, 800.0, 400.0, 300.0);
        let s = k.scaled(0.5);

        assert_relative_eq!(s.fx, 400.0);
        assert_relative_eq!(s.cx, 200.0);
        assert_relative_eq!(s.matrix()[(2, 2)], 1.0);
    }

    #[test]
    fn test_undistort_identity_with_zero_coeffs() {
        let k = Intrinsics::new(100.0, 100.0, 32.0, 24.0);
        let mut img = GrayImage::new(64, 48);
        img.put_pixel(10, 20, image::Luma([200]));

        let out = undistort_image(&img, &k);
        assert_eq!(out.get_pixel(10, 20)[0], 200);
    }

    #[test]
    fn test_resize_halves_dimensions() {
        let img = GrayImage::new(64, 48);
        let out = resize_image(&img, 0.5);
        assert_eq!(out.dimensions(), (32, 24));
    }
}
