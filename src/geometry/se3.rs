//! Rigid transforms in SE(3).
//!
//! Two conventions coexist in this crate and are kept explicit everywhere:
//! the tracked pose is camera-to-world (`T_wc`), while pose solvers operate
//! on world-to-camera (`T_cw`). Functions document which they take/return;
//! callers invert at the boundary.

use nalgebra::{Matrix3, Matrix4, Rotation3, UnitQuaternion, Vector3};

/// A rigid transform: rotation (unit quaternion) + translation.
#[derive(Debug, Clone, PartialEq)]
pub struct SE3 {
    pub rotation: UnitQuaternion<f64>,
    pub translation: Vector3<f64>,
}

impl SE3 {
    pub fn identity() -> Self {
        Self {
            rotation: UnitQuaternion::identity(),
            translation: Vector3::zeros(),
        }
    }

    /// Build from a rotation matrix and translation vector.
    ///
    /// The rotation block is re-orthonormalized through the quaternion
    /// conversion, so numeric drift accumulated by upstream composition is
    /// corrected here.
    pub fn from_rt(rotation: Matrix3<f64>, translation: Vector3<f64>) -> Self {
        let rot = Rotation3::from_matrix(&rotation);
        Self {
            rotation: UnitQuaternion::from_rotation_matrix(&rot),
            translation,
        }
    }

    /// Build from a 4x4 homogeneous transform.
    pub fn from_matrix(m: &Matrix4<f64>) -> Self {
        let r = m.fixed_view::<3, 3>(0, 0).into_owned();
        let t = m.fixed_view::<3, 1>(0, 3).into_owned();
        Self::from_rt(r, t)
    }

    /// The 4x4 homogeneous form of this transform.
    pub fn to_matrix(&self) -> Matrix4<f64> {
        let mut m = Matrix4::identity();
        m.fixed_view_mut::<3, 3>(0, 0)
            .copy_from(&self.rotation.to_rotation_matrix().into_inner());
        m.fixed_view_mut::<3, 1>(0, 3).copy_from(&self.translation);
        m
    }

    pub fn inverse(&self) -> Self {
        let rot_inv = self.rotation.inverse();
        Self {
            rotation: rot_inv,
            translation: -(rot_inv * self.translation),
        }
    }

    /// Apply the transform to a point: `p' = R p + t`.
    pub fn transform_point(&self, p: &Vector3<f64>) -> Vector3<f64> {
        self.rotation * p + self.translation
    }

    /// Compose with another transform: `self ∘ other` (other applied first).
    pub fn compose(&self, other: &SE3) -> Self {
        Self {
            rotation: self.rotation * other.rotation,
            translation: self.rotation * other.translation + self.translation,
        }
    }

    /// Renormalize the rotation quaternion in place. Cheap no-op when the
    /// quaternion is already unit length.
    pub fn renormalize(&mut self) {
        self.rotation.renormalize();
    }

    /// Rotation angle (radians) between this pose and another.
    pub fn rotation_angle_to(&self, other: &SE3) -> f64 {
        (self.rotation.inverse() * other.rotation).angle()
    }
}

impl std::ops::Mul for &SE3 {
    type Output = SE3;

    fn mul(self, rhs: &SE3) -> SE3 {
        self.compose(rhs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn sample_pose() -> SE3 {
        SE3 {
            rotation: UnitQuaternion::from_scaled_axis(Vector3::new(0.3, -0.2, 0.5)),
            translation: Vector3::new(1.0, -2.0, 3.5),
        }
    }

    #[test]
    fn test_inverse_roundtrip() {
        let pose = sample_pose();
        let id = pose.compose(&pose.inverse());

        assert_relative_eq!(id.translation, Vector3::zeros(), epsilon = 1e-12);
        assert_relative_eq!(id.rotation.angle(), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_matrix_roundtrip() {
        let pose = sample_pose();
        let back = SE3::from_matrix(&pose.to_matrix());

        assert_relative_eq!(back.translation, pose.translation, epsilon = 1e-12);
        assert_relative_eq!(pose.rotation_angle_to(&back), 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_transform_point_matches_matrix() {
        let pose = sample_pose();
        let p = Vector3::new(0.4, 0.5, 2.0);

        let via_struct = pose.transform_point(&p);
        let via_matrix = (pose.to_matrix() * p.push(1.0)).xyz();

        assert_relative_eq!(via_struct, via_matrix, epsilon = 1e-12);
    }

    #[test]
    fn test_from_rt_reorthonormalizes() {
        // Perturb a valid rotation slightly off the manifold.
        let r = Rotation3::from_scaled_axis(Vector3::new(0.1, 0.2, 0.3)).into_inner()
            + Matrix3::from_element(1e-4);
        let pose = SE3::from_rt(r, Vector3::zeros());
        let rm = pose.rotation.to_rotation_matrix().into_inner();

        assert_relative_eq!(rm * rm.transpose(), Matrix3::identity(), epsilon = 1e-9);
    }
}
