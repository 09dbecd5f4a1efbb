//! Render Hardware Interface.
//!
//! The frame-presentation core talks to the GPU only through the
//! [`PresentBackend`] trait and the opaque handles in [`handle`]. This crate
//! provides:
//! - The backend trait and its descriptors
//! - Surface policy (format, present mode, extent, image count, samples)
//! - Per-slot synchronization sets
//! - The Vulkan implementation on `ash`

mod error;

pub mod backend;
pub mod handle;
pub mod swapchain;
pub mod sync;
pub mod vulkan;

pub use backend::{
    AcquireOutcome, AttachmentDesc, AttachmentKind, PresentBackend, RenderPassBegin,
    RenderPassDesc, SurfaceStatus, SwapchainDesc,
};
pub use error::{RhiError, RhiResult};
pub use handle::{
    AttachmentImage, CommandBufferHandle, DescriptorSetHandle, FenceHandle, FramebufferHandle,
    ImageHandle, ImageViewHandle, RenderPassHandle, SemaphoreHandle, SwapchainHandle,
};
pub use swapchain::SwapchainSupportDetails;
pub use sync::FrameSync;
pub use vulkan::VulkanBackend;

// Re-export ash types that users might need
pub use ash::vk;
