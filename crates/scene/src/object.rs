//! Scene objects handed to render systems at draw time.
//!
//! Geometry is owned elsewhere; an object only holds a shared [`Drawable`]
//! that knows how to bind and draw itself on a command buffer.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use glam::Vec3;

use framechain_rhi::CommandBufferHandle;

use crate::transform::Transform;

/// Identifier of a scene object, unique for the lifetime of the process.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(pub u64);

impl ObjectId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(0);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// Something that can be recorded into an open render pass.
///
/// `B` is the backend that owns the command buffer. Implementations record
/// their vertex/index bindings in `bind` and the draw call in `draw`.
pub trait Drawable<B: ?Sized>: Send + Sync {
    fn bind(&self, backend: &B, cmd: CommandBufferHandle);
    fn draw(&self, backend: &B, cmd: CommandBufferHandle);
}

/// An object placed in the scene.
pub struct SceneObject<B: ?Sized> {
    id: ObjectId,
    pub transform: Transform,
    pub color: Vec3,
    pub drawable: Option<Arc<dyn Drawable<B>>>,
}

impl<B: ?Sized> SceneObject<B> {
    /// A new object with a fresh id, identity transform and nothing to draw.
    pub fn new() -> Self {
        Self {
            id: ObjectId::next(),
            transform: Transform::default(),
            color: Vec3::ONE,
            drawable: None,
        }
    }

    pub fn with_drawable(mut self, drawable: Arc<dyn Drawable<B>>) -> Self {
        self.drawable = Some(drawable);
        self
    }

    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = transform;
        self
    }

    pub fn with_color(mut self, color: Vec3) -> Self {
        self.color = color;
        self
    }

    #[inline]
    pub fn id(&self) -> ObjectId {
        self.id
    }
}

impl<B: ?Sized> Default for SceneObject<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: ?Sized> fmt::Debug for SceneObject<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SceneObject")
            .field("id", &self.id)
            .field("transform", &self.transform)
            .field("color", &self.color)
            .field("drawable", &self.drawable.is_some())
            .finish()
    }
}

/// Scene objects keyed by id. Iteration follows id order, so draw order is
/// stable from frame to frame.
pub type ObjectMap<B> = BTreeMap<ObjectId, SceneObject<B>>;

/// Inserts `object` under its own id and returns the id.
pub fn insert_object<B: ?Sized>(objects: &mut ObjectMap<B>, object: SceneObject<B>) -> ObjectId {
    let id = object.id();
    objects.insert(id, object);
    id
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    struct RecordingDrawable {
        calls: Mutex<Vec<(&'static str, u64)>>,
    }

    impl Drawable<()> for RecordingDrawable {
        fn bind(&self, _backend: &(), cmd: CommandBufferHandle) {
            self.calls.lock().unwrap().push(("bind", cmd.raw()));
        }

        fn draw(&self, _backend: &(), cmd: CommandBufferHandle) {
            self.calls.lock().unwrap().push(("draw", cmd.raw()));
        }
    }

    #[test]
    fn test_ids_are_unique() {
        let a = SceneObject::<()>::new();
        let b = SceneObject::<()>::new();
        assert_ne!(a.id(), b.id());
        assert!(a.id() < b.id());
    }

    #[test]
    fn test_map_iterates_in_id_order() {
        let mut objects = ObjectMap::<()>::new();
        let first = SceneObject::new();
        let second = SceneObject::new();
        let (first_id, second_id) = (first.id(), second.id());

        insert_object(&mut objects, second);
        insert_object(&mut objects, first);

        let ids: Vec<ObjectId> = objects.keys().copied().collect();
        assert_eq!(ids, vec![first_id, second_id]);
    }

    #[test]
    fn test_shared_drawable() {
        let drawable = Arc::new(RecordingDrawable::default());
        let a = SceneObject::<()>::new().with_drawable(drawable.clone());
        let b = SceneObject::<()>::new().with_drawable(drawable.clone());

        let cmd = CommandBufferHandle::from_raw(7);
        for object in [&a, &b] {
            let d = object.drawable.as_ref().unwrap();
            d.bind(&(), cmd);
            d.draw(&(), cmd);
        }

        assert_eq!(drawable.calls.lock().unwrap().len(), 4);
        assert_eq!(Arc::strong_count(&drawable), 3);
    }
}
