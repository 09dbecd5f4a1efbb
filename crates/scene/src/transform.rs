//! Placement of a scene object.
//!
//! Transforms are flat: each object is placed directly in world space.

use glam::{Mat3, Mat4, Quat, Vec3};

/// Translation, rotation and scale of an object in world space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transform {
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            translation: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }
}

impl Transform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_translation(mut self, translation: Vec3) -> Self {
        self.translation = translation;
        self
    }

    pub fn with_rotation(mut self, rotation: Quat) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn with_scale(mut self, scale: Vec3) -> Self {
        self.scale = scale;
        self
    }

    /// Model matrix: scale, then rotate, then translate.
    pub fn matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.translation)
    }

    /// Inverse transpose of the upper 3x3 of [`matrix`](Self::matrix), for
    /// transforming normals under non-uniform scale.
    ///
    /// # Non-invertible transforms
    ///
    /// A zero scale on any axis yields the identity rather than NaN/Inf values.
    pub fn normal_matrix(&self) -> Mat3 {
        const EPSILON: f32 = 1e-6;

        let linear = Mat3::from_mat4(self.matrix());
        if linear.determinant().abs() < EPSILON {
            Mat3::IDENTITY
        } else {
            linear.inverse().transpose()
        }
    }

    /// Get the forward direction vector.
    pub fn forward(&self) -> Vec3 {
        self.rotation * Vec3::NEG_Z
    }
}
