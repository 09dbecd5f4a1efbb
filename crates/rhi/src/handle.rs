//! Opaque resource handles.
//!
//! Every resource the presentation backend hands out is identified by a thin
//! `u64` newtype. Callers never see the native API type, which keeps the
//! renderer testable against a fake backend and stops native handles from
//! leaking across component boundaries.

macro_rules! define_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(u64);

        impl $name {
            /// A handle that refers to nothing.
            pub const NULL: Self = Self(0);

            /// Wraps a raw backend value.
            #[inline]
            pub const fn from_raw(raw: u64) -> Self {
                Self(raw)
            }

            /// The raw backend value.
            #[inline]
            pub const fn raw(self) -> u64 {
                self.0
            }

            #[inline]
            pub const fn is_null(self) -> bool {
                self.0 == 0
            }
        }
    };
}

define_handle!(
    /// A chain of presentable images owned by the presentation engine.
    SwapchainHandle
);
define_handle!(
    /// A GPU image, either owned by a swapchain or by an attachment.
    ImageHandle
);
define_handle!(
    /// A view onto an [`ImageHandle`].
    ImageViewHandle
);
define_handle!(RenderPassHandle);
define_handle!(FramebufferHandle);
define_handle!(
    /// CPU-waitable completion signal.
    FenceHandle
);
define_handle!(
    /// GPU-internal ordering signal, never waited on by the CPU.
    SemaphoreHandle
);
define_handle!(CommandBufferHandle);
define_handle!(
    /// A bindable set of global resources (camera uniforms and the like),
    /// built outside the presentation core.
    DescriptorSetHandle
);

/// A memory-backed render target created by the backend (multisampled color
/// or depth). Destroy it with `PresentBackend::destroy_attachment`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct AttachmentImage {
    pub image: ImageHandle,
    pub view: ImageViewHandle,
}

impl AttachmentImage {
    pub const NULL: Self = Self {
        image: ImageHandle::NULL,
        view: ImageViewHandle::NULL,
    };

    #[inline]
    pub const fn is_null(&self) -> bool {
        self.image.is_null()
    }
}
