//! Draw-time scene data.
//!
//! This crate provides what render systems consume each frame:
//! - Camera and projection
//! - Object transforms
//! - Scene objects with shared drawables

pub mod camera;
pub mod object;
pub mod transform;

pub use camera::{Camera, Projection};
pub use object::{Drawable, ObjectId, ObjectMap, SceneObject, insert_object};
pub use transform::Transform;
