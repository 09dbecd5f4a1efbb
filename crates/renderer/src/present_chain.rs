//! The present chain: one generation of presentable images and everything
//! drawn into them.
//!
//! A [`PresentChain`] owns, for a single surface size:
//!
//! - the swapchain, its images and one view per image
//! - the multisampled color target and the depth target, shared by every
//!   framebuffer of the generation
//! - the three-attachment render pass
//! - one framebuffer per image (color, depth, resolve = that image)
//! - one [`FrameSync`] set per frame slot
//!
//! A resize never mutates a chain. The orchestrator builds a new generation
//! from the drawable extent, handing it the outgoing one so the old swapchain
//! can be retired, and then drops the old generation.
//!
//! # Resource Destruction
//!
//! [`PresentChain::destroy`] releases, in order:
//! 1. Framebuffers
//! 2. Render pass
//! 3. Depth and color targets
//! 4. Image views
//! 5. Swapchain
//! 6. Synchronization primitives of every frame slot

use std::sync::Arc;

use tracing::{debug, info, trace};

use framechain_core::{Extent, RendererSettings};
use framechain_rhi::swapchain::{
    choose_extent, choose_image_count, choose_present_mode, choose_sample_count,
    choose_surface_format, preferred_surface_format,
};
use framechain_rhi::{
    AcquireOutcome, AttachmentDesc, AttachmentImage, AttachmentKind, CommandBufferHandle,
    FenceHandle, FrameSync, FramebufferHandle, ImageHandle, ImageViewHandle, PresentBackend,
    RenderPassDesc, RenderPassHandle, RhiError, SurfaceStatus, SwapchainDesc, SwapchainHandle, vk,
};

use crate::error::{RendererError, RendererResult};

/// One image of the chain with the objects built on it.
#[derive(Debug, Clone, Copy)]
struct PresentableImage {
    image: ImageHandle,
    view: ImageViewHandle,
    framebuffer: FramebufferHandle,
}

/// A generation of presentable images, targets and per-slot sync.
pub struct PresentChain<B: PresentBackend> {
    backend: Arc<B>,
    generation: u64,
    swapchain: SwapchainHandle,
    image_format: vk::Format,
    depth_format: vk::Format,
    samples: vk::SampleCountFlags,
    extent: vk::Extent2D,
    images: Vec<PresentableImage>,
    color_target: AttachmentImage,
    depth_target: AttachmentImage,
    render_pass: RenderPassHandle,
    /// Sync set per frame slot.
    frame_sync: Vec<FrameSync>,
    /// Fence of the submission that last rendered into each image.
    images_in_flight: Vec<Option<FenceHandle>>,
    destroyed: bool,
}

impl<B: PresentBackend> PresentChain<B> {
    /// Builds a chain for `drawable`.
    ///
    /// `previous` is the generation being replaced, if any. Its swapchain is
    /// handed to the driver as the old swapchain and its generation id is
    /// incremented; nothing else of it is used, and it must be destroyed by
    /// the caller afterwards.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `drawable` or the surface's current extent has a zero dimension
    /// - The surface offers no formats or present modes
    /// - Any create call is rejected by the driver
    ///
    /// Objects created before a failure are destroyed.
    pub fn new(
        backend: Arc<B>,
        settings: &RendererSettings,
        drawable: Extent,
        previous: Option<&PresentChain<B>>,
    ) -> RendererResult<Self> {
        if drawable.is_zero() {
            return Err(RendererError::ZeroExtent(drawable));
        }

        let mut chain = Self {
            backend,
            generation: previous.map_or(0, |p| p.generation + 1),
            swapchain: SwapchainHandle::NULL,
            image_format: vk::Format::UNDEFINED,
            depth_format: vk::Format::UNDEFINED,
            samples: vk::SampleCountFlags::TYPE_1,
            extent: vk::Extent2D::default(),
            images: Vec::new(),
            color_target: AttachmentImage::NULL,
            depth_target: AttachmentImage::NULL,
            render_pass: RenderPassHandle::NULL,
            frame_sync: Vec::new(),
            images_in_flight: Vec::new(),
            destroyed: false,
        };
        // On error, `chain` is dropped and whatever was created is destroyed.
        chain.build(settings, drawable, previous.map(|p| p.swapchain))?;

        info!(
            "Present chain generation {} created: {}x{}, {} image(s), {:?}, depth {:?}, {:?}",
            chain.generation,
            chain.extent.width,
            chain.extent.height,
            chain.images.len(),
            chain.image_format,
            chain.depth_format,
            chain.samples
        );

        Ok(chain)
    }

    fn build(
        &mut self,
        settings: &RendererSettings,
        drawable: Extent,
        old_swapchain: Option<SwapchainHandle>,
    ) -> RendererResult<()> {
        let backend = Arc::clone(&self.backend);

        let support = backend.surface_support()?;
        if !support.is_adequate() {
            return Err(RhiError::SwapchainError(
                "surface offers no formats or present modes".to_string(),
            )
            .into());
        }

        let surface_format = choose_surface_format(
            &support.formats,
            preferred_surface_format(settings.surface_format),
        )
        .ok_or_else(|| RhiError::UnsupportedFormat("surface offers no formats".to_string()))?;
        let present_mode = choose_present_mode(&support.present_modes, settings.present_mode);
        let extent = choose_extent(
            &support.capabilities,
            vk::Extent2D {
                width: drawable.width,
                height: drawable.height,
            },
        );
        if extent.width == 0 || extent.height == 0 {
            return Err(RendererError::ZeroExtent(Extent::new(
                extent.width,
                extent.height,
            )));
        }
        let image_count = choose_image_count(&support.capabilities, settings.image_count);

        self.image_format = surface_format.format;
        self.extent = extent;

        self.swapchain = backend.create_swapchain(
            &SwapchainDesc {
                surface_format,
                present_mode,
                extent,
                image_count,
                pre_transform: support.capabilities.current_transform,
            },
            old_swapchain,
        )?;

        for image in backend.swapchain_images(self.swapchain)? {
            let view = backend.create_image_view(image, self.image_format)?;
            self.images.push(PresentableImage {
                image,
                view,
                framebuffer: FramebufferHandle::NULL,
            });
        }
        self.images_in_flight = vec![None; self.images.len()];

        self.depth_format = backend.depth_format()?;
        self.samples = sample_count(settings.msaa_samples, backend.max_sample_count());

        self.render_pass = backend.create_render_pass(&RenderPassDesc {
            color_format: self.image_format,
            depth_format: self.depth_format,
            samples: self.samples,
        })?;

        self.color_target = backend.create_attachment(&AttachmentDesc {
            kind: AttachmentKind::Color,
            format: self.image_format,
            extent,
            samples: self.samples,
        })?;
        self.depth_target = backend.create_attachment(&AttachmentDesc {
            kind: AttachmentKind::Depth,
            format: self.depth_format,
            extent,
            samples: self.samples,
        })?;

        for image in &mut self.images {
            image.framebuffer = backend.create_framebuffer(
                self.render_pass,
                &[self.color_target.view, self.depth_target.view, image.view],
                extent,
            )?;
        }

        for slot in 0..settings.frames_in_flight {
            self.frame_sync.push(FrameSync::new(backend.as_ref())?);
            trace!("Created sync set for frame slot {}", slot);
        }

        Ok(())
    }

    /// Waits for `slot`'s previous submission, then requests the next image,
    /// signaling the slot's image-available semaphore.
    ///
    /// # Errors
    ///
    /// Returns an error for any driver failure other than an out-of-date
    /// surface, which is reported as [`AcquireOutcome::OutOfDate`].
    pub fn acquire_next(&self, slot: usize) -> RendererResult<AcquireOutcome> {
        let sync = self.frame_sync[slot];
        self.backend.wait_for_fence(sync.in_flight(), u64::MAX)?;

        let outcome = self
            .backend
            .acquire_next_image(self.swapchain, sync.image_available())?;
        trace!("Slot {} acquired {:?}", slot, outcome);
        Ok(outcome)
    }

    /// Submits `buffer` for `slot` and queues `image_index` for presentation.
    ///
    /// Images can come back out of round-robin order, so if another slot's
    /// submission is still rendering into the image, that fence is waited on
    /// first.
    ///
    /// # Errors
    ///
    /// Returns an error for any driver failure other than an out-of-date or
    /// suboptimal surface, which are reported through [`SurfaceStatus`].
    pub fn submit_and_present(
        &mut self,
        slot: usize,
        buffer: CommandBufferHandle,
        image_index: u32,
    ) -> RendererResult<SurfaceStatus> {
        let sync = self.frame_sync[slot];
        let image = image_index as usize;

        if let Some(fence) = self.images_in_flight[image]
            && fence != sync.in_flight()
        {
            self.backend.wait_for_fence(fence, u64::MAX)?;
        }
        self.images_in_flight[image] = Some(sync.in_flight());

        // Reset only once work is certain to be submitted, so the fence
        // always signals again.
        self.backend.reset_fence(sync.in_flight())?;
        self.backend.submit(
            buffer,
            sync.image_available(),
            sync.render_finished(),
            sync.in_flight(),
        )?;

        let status = self
            .backend
            .present(self.swapchain, image_index, sync.render_finished())?;
        if status != SurfaceStatus::Optimal {
            debug!("Present of image {} reported {:?}", image_index, status);
        }
        Ok(status)
    }

    /// True when both chains use the same color and depth formats.
    pub fn formats_match(&self, other: &PresentChain<B>) -> bool {
        self.image_format == other.image_format && self.depth_format == other.depth_format
    }

    /// Monotonic generation id; 0 for the first chain, previous + 1 after.
    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    #[inline]
    pub fn extent(&self) -> Extent {
        Extent::new(self.extent.width, self.extent.height)
    }

    #[inline]
    pub fn vk_extent(&self) -> vk::Extent2D {
        self.extent
    }

    #[inline]
    pub fn image_format(&self) -> vk::Format {
        self.image_format
    }

    #[inline]
    pub fn depth_format(&self) -> vk::Format {
        self.depth_format
    }

    /// Sample count of the color and depth targets.
    #[inline]
    pub fn samples(&self) -> vk::SampleCountFlags {
        self.samples
    }

    #[inline]
    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    #[inline]
    pub fn frame_slot_count(&self) -> usize {
        self.frame_sync.len()
    }

    #[inline]
    pub fn render_pass(&self) -> RenderPassHandle {
        self.render_pass
    }

    /// Framebuffer targeting presentable image `index`.
    #[inline]
    pub fn framebuffer(&self, index: u32) -> FramebufferHandle {
        self.images[index as usize].framebuffer
    }

    #[inline]
    pub fn swapchain(&self) -> SwapchainHandle {
        self.swapchain
    }

    /// Releases every object of the chain. Safe to call more than once; the
    /// GPU must no longer use any of them.
    pub fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.destroyed = true;
        let backend = Arc::clone(&self.backend);

        for image in &self.images {
            if !image.framebuffer.is_null() {
                backend.destroy_framebuffer(image.framebuffer);
            }
        }
        if !self.render_pass.is_null() {
            backend.destroy_render_pass(self.render_pass);
        }
        for target in [self.depth_target, self.color_target] {
            if !target.is_null() {
                backend.destroy_attachment(target);
            }
        }
        for image in self.images.drain(..) {
            backend.destroy_image_view(image.view);
        }
        if !self.swapchain.is_null() {
            backend.destroy_swapchain(self.swapchain);
        }
        for sync in self.frame_sync.drain(..) {
            sync.destroy(backend.as_ref());
        }

        self.render_pass = RenderPassHandle::NULL;
        self.color_target = AttachmentImage::NULL;
        self.depth_target = AttachmentImage::NULL;
        self.swapchain = SwapchainHandle::NULL;
        self.images_in_flight.clear();

        debug!("Present chain generation {} destroyed", self.generation);
    }
}

impl<B: PresentBackend> Drop for PresentChain<B> {
    fn drop(&mut self) {
        self.destroy();
    }
}

/// Requested MSAA sample count limited to what the device supports up to
/// `max`.
fn sample_count(requested: u32, max: vk::SampleCountFlags) -> vk::SampleCountFlags {
    // Every count from 1 up to the maximum.
    let supported = vk::SampleCountFlags::from_raw((max.as_raw() << 1).wrapping_sub(1));
    choose_sample_count(requested, supported)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockBackend;

    fn settings() -> RendererSettings {
        RendererSettings {
            msaa_samples: 4,
            ..RendererSettings::default()
        }
    }

    fn new_chain(backend: &Arc<MockBackend>) -> PresentChain<MockBackend> {
        PresentChain::new(backend.clone(), &settings(), Extent::new(800, 600), None).unwrap()
    }

    #[test]
    fn test_sample_count_limited_by_device() {
        assert_eq!(
            sample_count(8, vk::SampleCountFlags::TYPE_4),
            vk::SampleCountFlags::TYPE_4
        );
        assert_eq!(
            sample_count(2, vk::SampleCountFlags::TYPE_8),
            vk::SampleCountFlags::TYPE_2
        );
    }

    #[test]
    fn test_new_chain_shape() {
        let backend = Arc::new(MockBackend::new());
        let chain = new_chain(&backend);

        assert_eq!(chain.generation(), 0);
        assert_eq!(chain.extent(), Extent::new(800, 600));
        // min_image_count 2 on the mock surface, so min + 1.
        assert_eq!(chain.image_count(), 3);
        assert_eq!(chain.frame_slot_count(), 2);
        assert_eq!(chain.image_format(), vk::Format::B8G8R8A8_SRGB);
        assert_eq!(chain.depth_format(), vk::Format::D32_SFLOAT);
        assert_eq!(chain.samples(), vk::SampleCountFlags::TYPE_4);

        let framebuffers: Vec<FramebufferHandle> =
            (0..3).map(|i| chain.framebuffer(i)).collect();
        assert!(framebuffers.iter().all(|f| !f.is_null()));
        assert_ne!(framebuffers[0], framebuffers[1]);
        assert_ne!(framebuffers[1], framebuffers[2]);
    }

    #[test]
    fn test_framebuffers_share_targets() {
        let backend = Arc::new(MockBackend::new());
        let chain = new_chain(&backend);

        let attachments = backend.framebuffer_attachments();
        assert_eq!(attachments.len(), 3);
        for (image, views) in attachments.iter().enumerate() {
            assert_eq!(views.len(), 3);
            assert_eq!(views[0], attachments[0][0], "color target shared");
            assert_eq!(views[1], attachments[0][1], "depth target shared");
            if image > 0 {
                assert_ne!(views[2], attachments[image - 1][2], "resolve is per image");
            }
        }
        drop(chain);
    }

    #[test]
    fn test_zero_extent_is_rejected_without_allocating() {
        let backend = Arc::new(MockBackend::new());
        let result = PresentChain::new(backend.clone(), &settings(), Extent::new(0, 600), None);

        assert!(matches!(result, Err(RendererError::ZeroExtent(_))));
        assert_eq!(backend.swapchains_created(), 0);
        assert_eq!(backend.live_count(), 0);
    }

    #[test]
    fn test_destroy_releases_everything_once() {
        let backend = Arc::new(MockBackend::new());
        let mut chain = new_chain(&backend);
        assert!(backend.live_count() > 0);

        chain.destroy();
        assert_eq!(backend.live_count(), 0);

        // Second destroy and the drop are no-ops; the mock panics on a
        // double destroy.
        chain.destroy();
        drop(chain);
        assert_eq!(backend.live_count(), 0);
    }

    #[test]
    fn test_teardown_order() {
        let backend = Arc::new(MockBackend::new());
        let chain = new_chain(&backend);
        backend.clear_destroy_log();
        drop(chain);

        let kinds = backend.destroy_log();
        let last = |kind: &str| kinds.iter().rposition(|k| *k == kind).unwrap();
        let first = |kind: &str| kinds.iter().position(|k| *k == kind).unwrap();

        assert!(last("framebuffer") < first("render_pass"));
        assert!(first("render_pass") < first("attachment"));
        assert!(last("attachment") < first("image_view"));
        assert!(last("image_view") < first("swapchain"));
        assert!(first("swapchain") < first("fence"));
        assert!(first("swapchain") < first("semaphore"));
    }

    #[test]
    fn test_next_generation_retires_old_swapchain() {
        let backend = Arc::new(MockBackend::new());
        let first = new_chain(&backend);
        let second = PresentChain::new(
            backend.clone(),
            &settings(),
            Extent::new(1024, 768),
            Some(&first),
        )
        .unwrap();

        assert_eq!(second.generation(), 1);
        assert_eq!(backend.last_old_swapchain(), Some(first.swapchain()));
        assert!(second.formats_match(&first));
        assert_eq!(second.extent(), Extent::new(1024, 768));
    }

    #[test]
    fn test_failed_build_cleans_up() {
        let backend = Arc::new(MockBackend::new());
        backend.fail_next_render_pass();

        let result = PresentChain::new(backend.clone(), &settings(), Extent::new(800, 600), None);
        assert!(matches!(result, Err(RendererError::Rhi(_))));
        assert_eq!(backend.live_count(), 0);
    }

    #[test]
    fn test_image_fence_waited_when_reused_by_other_slot() {
        let backend = Arc::new(MockBackend::new());
        let mut chain = new_chain(&backend);
        let cmd = CommandBufferHandle::from_raw(1);

        // Slot 0 renders image 1, then slot 1 gets image 1 back out of order.
        backend.push_acquire(AcquireOutcome::Image {
            index: 1,
            suboptimal: false,
        });
        backend.push_acquire(AcquireOutcome::Image {
            index: 1,
            suboptimal: false,
        });

        chain.acquire_next(0).unwrap();
        chain.submit_and_present(0, cmd, 1).unwrap();
        let slot0_fence = chain.frame_sync[0].in_flight();

        chain.acquire_next(1).unwrap();
        backend.clear_fence_waits();
        chain.submit_and_present(1, cmd, 1).unwrap();

        assert_eq!(backend.fence_waits(), vec![slot0_fence]);
    }

    #[test]
    fn test_submit_orders_semaphores() {
        let backend = Arc::new(MockBackend::new());
        let mut chain = new_chain(&backend);
        let cmd = CommandBufferHandle::from_raw(9);
        let sync = chain.frame_sync[1];

        chain.acquire_next(1).unwrap();
        chain.submit_and_present(1, cmd, 0).unwrap();

        let submit = backend.last_submit().unwrap();
        assert_eq!(submit.buffer, cmd);
        assert_eq!(submit.wait, sync.image_available());
        assert_eq!(submit.signal, sync.render_finished());
        assert_eq!(submit.fence, sync.in_flight());

        let present = backend.last_present().unwrap();
        assert_eq!(present.image_index, 0);
        assert_eq!(present.wait, sync.render_finished());
    }
}
