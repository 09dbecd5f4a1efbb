//! The device/context seam used by the present chain.
//!
//! [`PresentBackend`] is everything the presentation core needs from the GPU:
//! surface capability queries, creation and destruction of the resources that
//! make up a chain generation, the per-frame synchronization primitives, and
//! the handful of queue and recording operations around a render pass.
//!
//! The Vulkan implementation lives in [`crate::vulkan`]. Plain `vk` data types
//! (formats, extents, capabilities) appear in the signatures; native object
//! handles do not.

use ash::vk;

use crate::error::RhiResult;
use crate::handle::{
    AttachmentImage, CommandBufferHandle, FenceHandle, FramebufferHandle, ImageHandle,
    ImageViewHandle, RenderPassHandle, SemaphoreHandle, SwapchainHandle,
};
use crate::swapchain::SwapchainSupportDetails;

/// Parameters for a new swapchain, already resolved against the surface.
#[derive(Clone, Copy, Debug)]
pub struct SwapchainDesc {
    pub surface_format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
    pub extent: vk::Extent2D,
    pub image_count: u32,
    pub pre_transform: vk::SurfaceTransformFlagsKHR,
}

/// What an attachment image is used for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AttachmentKind {
    /// Multisampled color target, resolved into a presentable image.
    Color,
    /// Depth (and possibly stencil) target.
    Depth,
}

#[derive(Clone, Copy, Debug)]
pub struct AttachmentDesc {
    pub kind: AttachmentKind,
    pub format: vk::Format,
    pub extent: vk::Extent2D,
    pub samples: vk::SampleCountFlags,
}

/// The three-attachment forward pass: multisampled color (0), depth (1) and a
/// single-sampled resolve target (2) that ends in the present layout.
#[derive(Clone, Copy, Debug)]
pub struct RenderPassDesc {
    pub color_format: vk::Format,
    pub depth_format: vk::Format,
    pub samples: vk::SampleCountFlags,
}

/// Arguments for beginning a render pass on a command buffer.
#[derive(Clone, Copy, Debug)]
pub struct RenderPassBegin {
    pub render_pass: RenderPassHandle,
    pub framebuffer: FramebufferHandle,
    pub extent: vk::Extent2D,
    pub clear_color: [f32; 4],
    pub clear_depth: f32,
    pub clear_stencil: u32,
}

/// Result of asking the presentation engine for the next image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// An image is available. `suboptimal` means it can still be presented
    /// but the chain no longer matches the surface exactly.
    Image { index: u32, suboptimal: bool },
    /// The surface changed and the chain must be recreated before use.
    OutOfDate,
}

/// State of the surface as reported by a present request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SurfaceStatus {
    Optimal,
    Suboptimal,
    OutOfDate,
}

impl SurfaceStatus {
    /// True for both out-of-date and suboptimal surfaces.
    #[inline]
    pub fn needs_recreation(self) -> bool {
        !matches!(self, SurfaceStatus::Optimal)
    }
}

/// GPU device and presentation surface, as seen by the present chain.
///
/// All methods take `&self`; implementations synchronize internally where the
/// native API requires it. `destroy_*` methods never fail: they are called
/// during teardown where there is no sensible recovery.
pub trait PresentBackend: Send + Sync {
    /// Formats, present modes and capabilities of the surface right now.
    fn surface_support(&self) -> RhiResult<SwapchainSupportDetails>;

    /// First supported depth format usable as an optimal-tiling depth attachment.
    fn depth_format(&self) -> RhiResult<vk::Format>;

    /// Highest sample count supported by both color and depth framebuffer attachments.
    fn max_sample_count(&self) -> vk::SampleCountFlags;

    /// Create a swapchain. `old` is the swapchain it replaces, if any; it
    /// remains valid and must still be destroyed by the caller.
    fn create_swapchain(
        &self,
        desc: &SwapchainDesc,
        old: Option<SwapchainHandle>,
    ) -> RhiResult<SwapchainHandle>;
    fn swapchain_images(&self, swapchain: SwapchainHandle) -> RhiResult<Vec<ImageHandle>>;
    fn destroy_swapchain(&self, swapchain: SwapchainHandle);

    /// 2D color view over a whole image.
    fn create_image_view(&self, image: ImageHandle, format: vk::Format)
    -> RhiResult<ImageViewHandle>;
    fn destroy_image_view(&self, view: ImageViewHandle);

    fn create_attachment(&self, desc: &AttachmentDesc) -> RhiResult<AttachmentImage>;
    fn destroy_attachment(&self, attachment: AttachmentImage);

    fn create_render_pass(&self, desc: &RenderPassDesc) -> RhiResult<RenderPassHandle>;
    fn destroy_render_pass(&self, render_pass: RenderPassHandle);

    fn create_framebuffer(
        &self,
        render_pass: RenderPassHandle,
        attachments: &[ImageViewHandle],
        extent: vk::Extent2D,
    ) -> RhiResult<FramebufferHandle>;
    fn destroy_framebuffer(&self, framebuffer: FramebufferHandle);

    fn create_fence(&self, signaled: bool) -> RhiResult<FenceHandle>;
    fn destroy_fence(&self, fence: FenceHandle);
    fn create_semaphore(&self) -> RhiResult<SemaphoreHandle>;
    fn destroy_semaphore(&self, semaphore: SemaphoreHandle);

    /// Block until `fence` signals or `timeout` nanoseconds pass.
    fn wait_for_fence(&self, fence: FenceHandle, timeout: u64) -> RhiResult<()>;
    fn reset_fence(&self, fence: FenceHandle) -> RhiResult<()>;
    /// Block until every queue is idle.
    fn wait_idle(&self) -> RhiResult<()>;

    fn allocate_command_buffers(&self, count: u32) -> RhiResult<Vec<CommandBufferHandle>>;
    fn free_command_buffers(&self, buffers: &[CommandBufferHandle]);
    /// Reset and begin recording a one-time-submit command buffer.
    fn begin_command_buffer(&self, buffer: CommandBufferHandle) -> RhiResult<()>;
    fn end_command_buffer(&self, buffer: CommandBufferHandle) -> RhiResult<()>;
    fn cmd_begin_render_pass(&self, buffer: CommandBufferHandle, begin: &RenderPassBegin);
    /// Viewport and scissor covering `extent`; both are dynamic pipeline state.
    fn cmd_set_viewport_and_scissor(&self, buffer: CommandBufferHandle, extent: vk::Extent2D);
    fn cmd_end_render_pass(&self, buffer: CommandBufferHandle);

    /// Request the next presentable image, signaling `signal` once it is ready.
    fn acquire_next_image(
        &self,
        swapchain: SwapchainHandle,
        signal: SemaphoreHandle,
    ) -> RhiResult<AcquireOutcome>;

    /// Submit `buffer` to the graphics queue. Execution waits on `wait` at the
    /// color-attachment-output stage, then signals `signal` and `fence`.
    fn submit(
        &self,
        buffer: CommandBufferHandle,
        wait: SemaphoreHandle,
        signal: SemaphoreHandle,
        fence: FenceHandle,
    ) -> RhiResult<()>;

    /// Queue `image_index` for presentation once `wait` is signaled.
    fn present(
        &self,
        swapchain: SwapchainHandle,
        image_index: u32,
        wait: SemaphoreHandle,
    ) -> RhiResult<SurfaceStatus>;
}
