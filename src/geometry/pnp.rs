//! Robust 2D-3D pose solving.
//!
//! The solver follows the shape of the original pipeline: an iterative
//! Gauss-Newton pose solve seeded from a prior (the caller always has a pose
//! hypothesis), wrapped in a RANSAC loop over minimal 4-point samples, with a
//! final refit over the consensus set. An IRLS variant with Huber
//! reweighting is exposed for the edge refiner.
//!
//! All poses here are world-to-camera (`T_cw`); callers invert at the
//! boundary.

use nalgebra::{Matrix2x3, Matrix3, Matrix3x6, Matrix6, Vector2, Vector3, Vector6};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::camera::Intrinsics;
use crate::geometry::SE3;

/// Minimum correspondences for a pose solve.
pub const MIN_CORRESPONDENCES: usize = 4;

/// RANSAC tuning knobs.
#[derive(Debug, Clone, Copy)]
pub struct RansacParams {
    pub iterations: usize,
    pub reproj_threshold_px: f64,
}

impl Default for RansacParams {
    fn default() -> Self {
        Self {
            iterations: 100,
            reproj_threshold_px: 8.0,
        }
    }
}

/// Result of a robust pose solve.
#[derive(Debug, Clone)]
pub struct PnPSolution {
    /// Estimated world-to-camera transform.
    pub pose_cw: SE3,
    /// Inlier flag per input correspondence.
    pub inliers: Vec<bool>,
    /// Mean reprojection error over the inlier set, in pixels.
    pub mean_reproj_px: f64,
}

/// Skew-symmetric matrix [v]x with [v]x u = v x u.
#[inline]
pub fn skew(v: &Vector3<f64>) -> Matrix3<f64> {
    Matrix3::new(
        0.0, -v.z, v.y, //
        v.z, 0.0, -v.x, //
        -v.y, v.x, 0.0,
    )
}

/// Reprojection error in pixels; infinite when the point is behind the camera.
pub fn reprojection_error_px(
    pose_cw: &SE3,
    k: &Intrinsics,
    p_world: &Vector3<f64>,
    observed_px: &Vector2<f64>,
) -> f64 {
    let p_cam = pose_cw.transform_point(p_world);
    if p_cam.z <= 1e-9 {
        return f64::INFINITY;
    }
    (k.project(&p_cam) - observed_px).norm()
}

/// Gauss-Newton pose refinement from an initial guess.
///
/// Minimizes the (optionally weighted) sum of squared reprojection residuals
/// over a left-multiplicative se(3) perturbation. Returns `None` when the
/// normal equations become singular or fewer than 4 points are usable.
pub fn optimize_pose(
    initial_cw: &SE3,
    points_world: &[Vector3<f64>],
    points_px: &[Vector2<f64>],
    k: &Intrinsics,
    weights: Option<&[f64]>,
    iterations: usize,
) -> Option<SE3> {
    debug_assert_eq!(points_world.len(), points_px.len());

    let mut pose = initial_cw.clone();
    for _ in 0..iterations {
        let mut h = Matrix6::<f64>::zeros();
        let mut b = Vector6::<f64>::zeros();
        let mut usable = 0usize;

        for (i, (pw, obs)) in points_world.iter().zip(points_px.iter()).enumerate() {
            let w = weights.map_or(1.0, |ws| ws[i]);
            if w <= 0.0 {
                continue;
            }
            let p_cam = pose.transform_point(pw);
            if p_cam.z <= 1e-9 {
                continue;
            }
            usable += 1;

            let r = k.project(&p_cam) - obs;
            let z_inv = 1.0 / p_cam.z;
            let dpi = Matrix2x3::new(
                k.fx * z_inv,
                0.0,
                -k.fx * p_cam.x * z_inv * z_inv,
                0.0,
                k.fy * z_inv,
                -k.fy * p_cam.y * z_inv * z_inv,
            );
            // p_cam = R p + t, perturbed as R <- exp(dtheta) R, t <- t + dt.
            let mut dp = Matrix3x6::<f64>::zeros();
            dp.fixed_view_mut::<3, 3>(0, 0)
                .copy_from(&(-skew(&(p_cam - pose.translation))));
            dp.fixed_view_mut::<3, 3>(0, 3)
                .copy_from(&Matrix3::identity());
            let j = dpi * dp;

            h += w * j.transpose() * j;
            b += w * j.transpose() * r;
        }

        if usable < MIN_CORRESPONDENCES {
            return None;
        }

        let delta = h.cholesky()?.solve(&(-b));
        let dtheta = Vector3::new(delta[0], delta[1], delta[2]);
        let dt = Vector3::new(delta[3], delta[4], delta[5]);
        pose.rotation = nalgebra::UnitQuaternion::from_scaled_axis(dtheta) * pose.rotation;
        pose.translation += dt;

        if delta.norm() < 1e-12 {
            break;
        }
    }
    pose.renormalize();
    Some(pose)
}

/// Robust pose solve over 2D-3D correspondences, seeded from a prior.
///
/// Minimal samples of 4 are refined by Gauss-Newton from `prior_cw` and
/// scored by inlier consensus under `params.reproj_threshold_px`; the best
/// model is refit over its inliers. Returns `None` when no consistent model
/// is found.
pub fn solve_pnp_ransac(
    points_world: &[Vector3<f64>],
    points_px: &[Vector2<f64>],
    k: &Intrinsics,
    prior_cw: &SE3,
    params: &RansacParams,
) -> Option<PnPSolution> {
    let n = points_world.len();
    if n < MIN_CORRESPONDENCES || points_px.len() != n {
        return None;
    }

    let mut best_pose: Option<SE3> = None;
    let mut best_inliers = vec![false; n];
    let mut best_count = 0usize;
    let mut best_error = f64::INFINITY;

    for iter in 0..params.iterations {
        // Deterministic per-iteration seeding keeps the solver reproducible.
        let mut rng = SmallRng::seed_from_u64(0x9E37_79B9 ^ (iter as u64));
        let idx = sample_unique(&mut rng, n, MIN_CORRESPONDENCES);
        let sample_pw: Vec<Vector3<f64>> = idx.iter().map(|&i| points_world[i]).collect();
        let sample_px: Vec<Vector2<f64>> = idx.iter().map(|&i| points_px[i]).collect();

        let Some(pose) = optimize_pose(prior_cw, &sample_pw, &sample_px, k, None, 10) else {
            continue;
        };

        let mut inliers = vec![false; n];
        let mut count = 0usize;
        let mut err_sum = 0.0;
        for i in 0..n {
            let e = reprojection_error_px(&pose, k, &points_world[i], &points_px[i]);
            if e <= params.reproj_threshold_px {
                inliers[i] = true;
                count += 1;
                err_sum += e;
            }
        }
        if count < MIN_CORRESPONDENCES {
            continue;
        }
        let mean_err = err_sum / count as f64;
        if count > best_count || (count == best_count && mean_err < best_error) {
            best_pose = Some(pose);
            best_inliers = inliers;
            best_count = count;
            best_error = mean_err;
        }
    }

    let pose = best_pose?;

    // Refit over the consensus set.
    let inlier_pw: Vec<Vector3<f64>> = points_world
        .iter()
        .zip(&best_inliers)
        .filter_map(|(p, &ok)| ok.then_some(*p))
        .collect();
    let inlier_px: Vec<Vector2<f64>> = points_px
        .iter()
        .zip(&best_inliers)
        .filter_map(|(p, &ok)| ok.then_some(*p))
        .collect();
    let refined = optimize_pose(&pose, &inlier_pw, &inlier_px, k, None, 20).unwrap_or(pose);

    let mut inliers = vec![false; n];
    let mut count = 0usize;
    let mut err_sum = 0.0;
    for i in 0..n {
        let e = reprojection_error_px(&refined, k, &points_world[i], &points_px[i]);
        if e <= params.reproj_threshold_px {
            inliers[i] = true;
            count += 1;
            err_sum += e;
        }
    }
    if count < MIN_CORRESPONDENCES {
        return None;
    }

    Some(PnPSolution {
        pose_cw: refined,
        inliers,
        mean_reproj_px: err_sum / count as f64,
    })
}

/// Iteratively reweighted least squares pose refinement with Huber weights.
///
/// High-residual correspondences are down-weighted each outer iteration, so
/// a handful of bad samples do not drag the solution.
pub fn irls_pose(
    initial_cw: &SE3,
    points_world: &[Vector3<f64>],
    points_px: &[Vector2<f64>],
    k: &Intrinsics,
    outer_iterations: usize,
    huber_px: f64,
) -> Option<SE3> {
    let n = points_world.len();
    if n < MIN_CORRESPONDENCES || points_px.len() != n {
        return None;
    }

    let mut pose = initial_cw.clone();
    let mut weights = vec![1.0f64; n];
    for _ in 0..outer_iterations {
        pose = optimize_pose(&pose, points_world, points_px, k, Some(&weights), 5)?;
        for i in 0..n {
            let e = reprojection_error_px(&pose, k, &points_world[i], &points_px[i]);
            weights[i] = if !e.is_finite() {
                0.0
            } else if e > huber_px {
                huber_px / e
            } else {
                1.0
            };
        }
    }
    Some(pose)
}

fn sample_unique(rng: &mut SmallRng, n: usize, count: usize) -> Vec<usize> {
    let mut idx = Vec::with_capacity(count);
    while idx.len() < count {
        let candidate = rng.gen_range(0..n);
        if !idx.contains(&candidate) {
            idx.push(candidate);
        }
    }
    idx
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::UnitQuaternion;

    fn test_camera() -> Intrinsics {
        Intrinsics::new(500.0, 500.0, 320.0, 240.0)
    }

    fn ground_truth_cw() -> SE3 {
        SE3 {
            rotation: UnitQuaternion::from_scaled_axis(Vector3::new(0.05, -0.02, 0.1)),
            translation: Vector3::new(0.2, -0.1, 0.4),
        }
    }

    fn synthetic_scene(n: usize) -> (Vec<Vector3<f64>>, Vec<Vector2<f64>>) {
        let gt = ground_truth_cw();
        let k = test_camera();
        let mut rng = SmallRng::seed_from_u64(7);
        let mut pw = Vec::new();
        let mut px = Vec::new();
        while pw.len() < n {
            let p = Vector3::new(
                rng.gen_range(-2.0..2.0),
                rng.gen_range(-1.5..1.5),
                rng.gen_range(3.0..8.0),
            );
            let p_cam = gt.transform_point(&p);
            let proj = k.project(&p_cam);
            if proj.x >= 0.0 && proj.x < 640.0 && proj.y >= 0.0 && proj.y < 480.0 {
                pw.push(p);
                px.push(proj);
            }
        }
        (pw, px)
    }

    #[test]
    fn test_recovers_pose_from_clean_correspondences() {
        let (pw, px) = synthetic_scene(30);
        let sol = solve_pnp_ransac(
            &pw,
            &px,
            &test_camera(),
            &SE3::identity(),
            &RansacParams::default(),
        )
        .expect("solve should succeed");

        let gt = ground_truth_cw();
        assert_relative_eq!(sol.pose_cw.translation, gt.translation, epsilon = 1e-3);
        assert!(sol.pose_cw.rotation_angle_to(&gt) < 1e-3);
        assert!(sol.mean_reproj_px < 1e-3);
        assert!(sol.inliers.iter().all(|&b| b));
    }

    #[test]
    fn test_tolerates_outliers() {
        let (pw, mut px) = synthetic_scene(40);
        // Corrupt a quarter of the observations.
        for i in 0..10 {
            px[i] += Vector2::new(80.0 + i as f64, -60.0);
        }
        let sol = solve_pnp_ransac(
            &pw,
            &px,
            &test_camera(),
            &SE3::identity(),
            &RansacParams::default(),
        )
        .expect("solve should succeed");

        let gt = ground_truth_cw();
        assert_relative_eq!(sol.pose_cw.translation, gt.translation, epsilon = 1e-2);
        assert_eq!(sol.inliers.iter().filter(|&&b| !b).count(), 10);
    }

    #[test]
    fn test_too_few_points_is_none() {
        let (pw, px) = synthetic_scene(3);
        assert!(solve_pnp_ransac(
            &pw,
            &px,
            &test_camera(),
            &SE3::identity(),
            &RansacParams::default(),
        )
        .is_none());
    }

    #[test]
    fn test_irls_downweights_bad_samples() {
        let (pw, mut px) = synthetic_scene(25);
        for i in 0..4 {
            px[i] += Vector2::new(40.0, 40.0);
        }
        let pose = irls_pose(&SE3::identity(), &pw, &px, &test_camera(), 10, 2.0)
            .expect("irls should converge");

        let gt = ground_truth_cw();
        assert_relative_eq!(pose.translation, gt.translation, epsilon = 5e-2);
        assert!(pose.rotation_angle_to(&gt) < 5e-2);
    }

    #[test]
    fn test_skew_is_cross_product() {
        let v = Vector3::new(1.0, 2.0, 3.0);
        let u = Vector3::new(-0.5, 0.4, 2.0);
        assert_relative_eq!(skew(&v) * u, v.cross(&u), epsilon = 1e-12);
    }
}
