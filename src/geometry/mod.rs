//! Geometry utilities: SE3 transforms, robust PnP solving.

pub mod pnp;
pub mod se3;

pub use pnp::{irls_pose, solve_pnp_ransac, PnPSolution, RansacParams, MIN_CORRESPONDENCES};
pub use se3::SE3;
