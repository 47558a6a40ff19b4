//! Live camera frames as the tracker consumes them.

use image::GrayImage;

/// One preprocessed (rescaled, undistorted) camera frame.
pub struct Frame {
    pub timestamp_ns: u64,
    pub image: GrayImage,
}

impl Frame {
    pub fn new(timestamp_ns: u64, image: GrayImage) -> Self {
        Self {
            timestamp_ns,
            image,
        }
    }
}
