//! Render-system plugins and the per-frame snapshot they consume.

use framechain_core::Extent;
use framechain_rhi::{
    CommandBufferHandle, DescriptorSetHandle, FramebufferHandle, PresentBackend, RenderPassHandle,
};
use framechain_scene::{Camera, ObjectMap};

/// Everything a render system may look at while the render pass is open.
///
/// Borrowed from the orchestrator for the duration of one dispatch, so it
/// cannot outlive the frame it describes.
pub struct FrameSnapshot<'a, B: PresentBackend> {
    /// Active frame slot, for indexing per-slot resources such as uniform
    /// buffers.
    pub frame_index: usize,
    /// Seconds since the previous frame began.
    pub frame_time: f32,
    /// The open command buffer, inside the open render pass.
    pub command_buffer: CommandBufferHandle,
    pub render_pass: RenderPassHandle,
    pub framebuffer: FramebufferHandle,
    pub extent: Extent,
    pub camera: &'a Camera,
    /// Global resources bound by the caller (camera uniforms and the like).
    pub global_set: DescriptorSetHandle,
    pub objects: &'a ObjectMap<B>,
    /// Backend that owns `command_buffer`, for recording.
    pub backend: &'a B,
}

/// Records drawing work into an open render pass.
///
/// Systems are invoked in registration order, once per drawn frame. They may
/// only record commands; the chain and the frame state are out of reach.
pub trait RenderSystem<B: PresentBackend> {
    fn render(&mut self, frame: &FrameSnapshot<'_, B>);

    /// Name used in logs.
    fn name(&self) -> &str {
        "render system"
    }
}

/// Binds and draws every object that has a drawable, in id order.
#[derive(Debug, Default)]
pub struct ObjectRenderSystem {
    drawn_last_frame: usize,
}

impl ObjectRenderSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of objects drawn by the most recent frame.
    pub fn drawn_last_frame(&self) -> usize {
        self.drawn_last_frame
    }
}

impl<B: PresentBackend> RenderSystem<B> for ObjectRenderSystem {
    fn render(&mut self, frame: &FrameSnapshot<'_, B>) {
        let mut drawn = 0;
        for object in frame.objects.values() {
            let Some(drawable) = &object.drawable else {
                continue;
            };
            drawable.bind(frame.backend, frame.command_buffer);
            drawable.draw(frame.backend, frame.command_buffer);
            drawn += 1;
        }
        self.drawn_last_frame = drawn;
    }

    fn name(&self) -> &str {
        "objects"
    }
}
