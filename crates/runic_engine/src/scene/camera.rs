//! First-person camera
//!
//! Orientation is yaw about world Y then pitch about the camera's X axis,
//! both in degrees. Matrices are rebuilt on every call.

use crate::foundation::math::{perspective_vulkan, Mat4, Vec3};

/// Pitch is kept inside this range so the view never flips
pub const PITCH_LIMIT_DEGREES: f32 = 89.0;

/// Perspective camera with yaw/pitch orientation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    /// World position
    pub position: Vec3,
    /// Rotation about world Y in degrees; 0 looks down -Z
    pub yaw: f32,
    /// Rotation about the camera X axis in degrees; positive looks up
    pub pitch: f32,
    /// Vertical field of view in degrees
    pub fov_degrees: f32,
    /// Near clip distance
    pub near: f32,
    /// Far clip distance
    pub far: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: Vec3::zeros(),
            yaw: 0.0,
            pitch: 0.0,
            fov_degrees: 70.0,
            near: 0.1,
            far: 1000.0,
        }
    }
}

impl Camera {
    /// Camera at `position` with default lens settings
    pub fn new(position: Vec3) -> Self {
        Self {
            position,
            ..Default::default()
        }
    }

    /// Replace field of view and clip planes
    #[must_use]
    pub const fn with_lens(mut self, fov_degrees: f32, near: f32, far: f32) -> Self {
        self.fov_degrees = fov_degrees;
        self.near = near;
        self.far = far;
        self
    }

    fn orientation(&self) -> Mat4 {
        Mat4::from_axis_angle(&Vec3::y_axis(), self.yaw.to_radians())
            * Mat4::from_axis_angle(&Vec3::x_axis(), self.pitch.to_radians())
    }

    /// World to view
    pub fn view_matrix(&self) -> Mat4 {
        Mat4::from_axis_angle(&Vec3::x_axis(), -self.pitch.to_radians())
            * Mat4::from_axis_angle(&Vec3::y_axis(), -self.yaw.to_radians())
            * Mat4::new_translation(&(-self.position))
    }

    /// View to clip for a target of the given aspect ratio
    pub fn projection_matrix(&self, aspect: f32) -> Mat4 {
        perspective_vulkan(self.fov_degrees.to_radians(), aspect, self.near, self.far)
    }

    /// Unit vector the camera looks along
    pub fn forward(&self) -> Vec3 {
        self.orientation().transform_vector(&Vec3::new(0.0, 0.0, -1.0))
    }

    /// Unit vector to the camera's right, always horizontal
    pub fn right(&self) -> Vec3 {
        Mat4::from_axis_angle(&Vec3::y_axis(), self.yaw.to_radians()).transform_vector(&Vec3::x())
    }

    /// Move along the view direction, the right vector and world up
    pub fn translate_local(&mut self, forward: f32, right: f32, up: f32) {
        self.position += self.forward() * forward + self.right() * right + Vec3::y() * up;
    }

    /// Turn by the given deltas in degrees, clamping pitch
    pub fn rotate(&mut self, yaw_delta: f32, pitch_delta: f32) {
        self.yaw = (self.yaw + yaw_delta).rem_euclid(360.0);
        self.pitch = (self.pitch + pitch_delta).clamp(-PITCH_LIMIT_DEGREES, PITCH_LIMIT_DEGREES);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Point3;

    #[test]
    fn test_default_looks_down_negative_z() {
        let camera = Camera::default();
        assert_relative_eq!(camera.forward(), Vec3::new(0.0, 0.0, -1.0), epsilon = 1e-6);
        assert_relative_eq!(camera.view_matrix(), Mat4::identity(), epsilon = 1e-6);
    }

    #[test]
    fn test_view_maps_forward_point_onto_axis() {
        let mut camera = Camera::new(Vec3::new(3.0, 1.0, -2.0));
        camera.rotate(90.0, 30.0);

        let target = camera.position + camera.forward() * 5.0;
        let in_view = camera.view_matrix().transform_point(&Point3::from(target));
        assert_relative_eq!(in_view, Point3::new(0.0, 0.0, -5.0), epsilon = 1e-4);
    }

    #[test]
    fn test_yaw_ninety_looks_down_negative_x() {
        let mut camera = Camera::default();
        camera.rotate(90.0, 0.0);
        assert_relative_eq!(camera.forward(), Vec3::new(-1.0, 0.0, 0.0), epsilon = 1e-6);
        assert_relative_eq!(camera.right(), Vec3::new(0.0, 0.0, -1.0), epsilon = 1e-6);
    }

    #[test]
    fn test_pitch_is_clamped() {
        let mut camera = Camera::default();
        camera.rotate(0.0, 200.0);
        assert_relative_eq!(camera.pitch, PITCH_LIMIT_DEGREES);
        camera.rotate(0.0, -500.0);
        assert_relative_eq!(camera.pitch, -PITCH_LIMIT_DEGREES);
    }

    #[test]
    fn test_translate_local() {
        let mut camera = Camera::default();
        camera.translate_local(2.0, 1.0, 0.5);
        assert_relative_eq!(camera.position, Vec3::new(1.0, 0.5, -2.0), epsilon = 1e-6);
    }

    #[test]
    fn test_projection_flips_y() {
        let proj = Camera::default().projection_matrix(1700.0 / 900.0);
        assert!(proj[(1, 1)] < 0.0);
        assert_relative_eq!(proj[(0, 0)] * 1700.0 / 900.0, -proj[(1, 1)], epsilon = 1e-5);
    }
}
