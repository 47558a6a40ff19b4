//! Global and local initialization seam.
//!
//! Initialization recovers a pose with no usable prior (or only a coarse
//! one). How that happens is deployment-specific, so the tracker only
//! depends on this trait and callers plug in whatever localizer fits
//! their map format.

use image::GrayImage;

use crate::camera::Intrinsics;
use crate::geometry::SE3;

/// Pose recovery without a trusted prior.
///
/// `prior` is `None` for a global (from-scratch) attempt and `Some` when the
/// tracker still has a rough pose worth biasing the search with. Returning
/// `None` means the attempt failed and the tracker will retry on a later
/// frame.
pub trait Initializer: Send {
    fn localize(
        &mut self,
        image: &GrayImage,
        intrinsics: &Intrinsics,
        prior: Option<&SE3>,
    ) -> Option<SE3>;
}
