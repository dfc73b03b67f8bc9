//! Math types
//!
//! nalgebra aliases plus the few projection helpers the renderer needs.
//! All matrices are column-major, right-handed, with Vulkan's 0..1 depth.

pub use nalgebra::{Matrix3, Matrix4, Quaternion, Unit, UnitQuaternion, Vector2, Vector3, Vector4};

/// 2D vector type
pub type Vec2 = Vector2<f32>;

/// 3D vector type
pub type Vec3 = Vector3<f32>;

/// 4D vector type
pub type Vec4 = Vector4<f32>;

/// 3x3 matrix type
pub type Mat3 = Matrix3<f32>;

/// 4x4 matrix type
pub type Mat4 = Matrix4<f32>;

/// Quaternion type for rotations
pub type Quat = UnitQuaternion<f32>;

/// Position, rotation and scale of an entity
#[derive(Debug, Clone, PartialEq)]
pub struct Transform {
    /// Position in world space
    pub position: Vec3,

    /// Rotation
    pub rotation: Quat,

    /// Per-axis scale
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::zeros(),
            rotation: Quat::identity(),
            scale: Vec3::new(1.0, 1.0, 1.0),
        }
    }
}

impl Transform {
    /// Create a transform with only a position
    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Default::default()
        }
    }

    /// Set the rotation from Euler angles in radians (roll, pitch, yaw about X, Y, Z)
    #[must_use]
    pub fn with_euler(mut self, euler: Vec3) -> Self {
        self.rotation = Quat::from_euler_angles(euler.x, euler.y, euler.z);
        self
    }

    /// Set a uniform scale
    #[must_use]
    pub fn with_uniform_scale(mut self, scale: f32) -> Self {
        self.scale = Vec3::new(scale, scale, scale);
        self
    }

    /// Model matrix: translate * rotate * scale
    pub fn to_matrix(&self) -> Mat4 {
        Mat4::new_translation(&self.position)
            * self.rotation.to_homogeneous()
            * Mat4::new_nonuniform_scaling(&self.scale)
    }
}

/// Inverse-transpose of the model matrix's upper 3x3, widened back to 4x4.
///
/// A singular model matrix (zero scale) yields identity rather than NaNs.
pub fn normal_matrix(model: &Mat4) -> Mat4 {
    let upper: Mat3 = model.fixed_view::<3, 3>(0, 0).into_owned();
    let normal = upper.try_inverse().map_or_else(Mat3::identity, |inverse| inverse.transpose());
    normal.to_homogeneous()
}

/// Right-handed perspective projection with 0..1 depth and Y pointing down
/// in clip space, matching Vulkan's conventions.
pub fn perspective_vulkan(fov_y_radians: f32, aspect: f32, near: f32, far: f32) -> Mat4 {
    let focal = 1.0 / (fov_y_radians * 0.5).tan();
    let mut proj = Mat4::zeros();
    proj[(0, 0)] = focal / aspect;
    proj[(1, 1)] = -focal;
    proj[(2, 2)] = far / (near - far);
    proj[(2, 3)] = (near * far) / (near - far);
    proj[(3, 2)] = -1.0;
    proj
}

/// Column-major float array suitable for GPU upload
pub fn to_cols_array(matrix: &Mat4) -> [[f32; 4]; 4] {
    (*matrix).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_transform_matrix_order() {
        let transform = Transform::from_position(Vec3::new(1.0, 2.0, 3.0)).with_uniform_scale(2.0);
        let point = transform.to_matrix().transform_point(&nalgebra::Point3::new(1.0, 0.0, 0.0));
        assert_relative_eq!(point.x, 3.0);
        assert_relative_eq!(point.y, 2.0);
        assert_relative_eq!(point.z, 3.0);
    }

    #[test]
    fn test_normal_matrix_undoes_non_uniform_scale() {
        let transform = Transform {
            scale: Vec3::new(2.0, 1.0, 1.0),
            ..Default::default()
        };
        let normal = normal_matrix(&transform.to_matrix());
        assert_relative_eq!(normal[(0, 0)], 0.5);
        assert_relative_eq!(normal[(1, 1)], 1.0);
        assert_relative_eq!(normal[(3, 3)], 1.0);
    }

    #[test]
    fn test_normal_matrix_of_singular_model_is_identity() {
        let model = Mat4::new_nonuniform_scaling(&Vec3::new(0.0, 1.0, 1.0));
        assert_eq!(normal_matrix(&model), Mat4::identity());
    }

    #[test]
    fn test_perspective_depth_range() {
        let proj = perspective_vulkan(70f32.to_radians(), 1.0, 0.1, 100.0);
        let near = proj * Vec4::new(0.0, 0.0, -0.1, 1.0);
        let far = proj * Vec4::new(0.0, 0.0, -100.0, 1.0);
        assert_relative_eq!(near.z / near.w, 0.0, epsilon = 1e-5);
        assert_relative_eq!(far.z / far.w, 1.0, epsilon = 1e-5);
    }

    #[test]
    fn test_perspective_flips_y() {
        let proj = perspective_vulkan(90f32.to_radians(), 1.0, 0.1, 100.0);
        let up = proj * Vec4::new(0.0, 1.0, -1.0, 1.0);
        assert!(up.y / up.w < 0.0);
    }

    #[test]
    fn test_cols_array_is_column_major() {
        let m = Mat4::new_translation(&Vec3::new(4.0, 5.0, 6.0));
        let cols = to_cols_array(&m);
        assert_relative_eq!(cols[3][0], 4.0);
        assert_relative_eq!(cols[3][1], 5.0);
        assert_relative_eq!(cols[3][2], 6.0);
    }
}
