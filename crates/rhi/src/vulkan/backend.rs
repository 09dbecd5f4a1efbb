//! [`PresentBackend`] on Vulkan.

use std::collections::HashMap;
use std::mem::ManuallyDrop;
use std::sync::{Arc, Mutex};

use ash::vk::{self, Handle};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use tracing::{debug, info, warn};

use crate::backend::{
    AcquireOutcome, AttachmentDesc, PresentBackend, RenderPassBegin, RenderPassDesc,
    SurfaceStatus, SwapchainDesc,
};
use crate::error::{RhiError, RhiResult};
use crate::handle::{
    AttachmentImage, CommandBufferHandle, DescriptorSetHandle, FenceHandle, FramebufferHandle,
    ImageHandle, ImageViewHandle, RenderPassHandle, SemaphoreHandle, SwapchainHandle,
};
use crate::swapchain::{SwapchainSupportDetails, choose_sample_count};
use crate::vulkan::attachment::{GpuAttachment, find_depth_format};
use crate::vulkan::command::CommandPool;
use crate::vulkan::device::Device;
use crate::vulkan::instance::Instance;
use crate::vulkan::physical_device::{PhysicalDeviceInfo, select_physical_device};
use crate::vulkan::render_pass;
use crate::vulkan::surface::Surface;

/// Vulkan device, surface and queues behind the [`PresentBackend`] seam.
///
/// Command recording is externally synchronized: drive the frame loop from a
/// single thread.
pub struct VulkanBackend {
    /// Attachments by image handle; the allocation has to be kept until destroy.
    attachments: Mutex<HashMap<u64, GpuAttachment>>,
    swapchain_loader: ash::khr::swapchain::Device,
    physical_device: PhysicalDeviceInfo,
    // Dropped in declaration order from `Drop`.
    command_pool: ManuallyDrop<CommandPool>,
    device: ManuallyDrop<Arc<Device>>,
    surface: ManuallyDrop<Surface>,
    instance: ManuallyDrop<Instance>,
}

impl VulkanBackend {
    /// Initializes Vulkan for presenting to `window`.
    ///
    /// # Safety
    ///
    /// `window` must outlive the returned backend: the surface refers to the
    /// native window without owning it.
    ///
    /// # Errors
    ///
    /// Returns an error if the window handles are unavailable or any step of
    /// instance, surface, device or command pool creation fails.
    pub unsafe fn new<W>(window: &W, app_name: &str, enable_validation: bool) -> RhiResult<Self>
    where
        W: HasDisplayHandle + HasWindowHandle + ?Sized,
    {
        let display = window
            .display_handle()
            .map_err(|e| RhiError::SurfaceError(format!("Failed to get display handle: {e}")))?
            .as_raw();
        let native_window = window
            .window_handle()
            .map_err(|e| RhiError::SurfaceError(format!("Failed to get window handle: {e}")))?
            .as_raw();

        let instance = Instance::new(app_name, display, enable_validation)?;
        let surface =
            unsafe { Surface::new(instance.entry(), instance.handle(), display, native_window)? };
        let physical_device = select_physical_device(instance.handle(), &surface)?;
        let device = Device::new(&instance, &physical_device)?;

        let graphics_family = device
            .queue_families()
            .graphics_family
            .ok_or(RhiError::NoSuitableGpu)?;
        let command_pool = CommandPool::new(device.clone(), graphics_family)?;
        let swapchain_loader = ash::khr::swapchain::Device::new(instance.handle(), device.handle());

        info!("Vulkan backend ready on '{}'", physical_device.device_name());

        Ok(Self {
            attachments: Mutex::new(HashMap::new()),
            swapchain_loader,
            physical_device,
            command_pool: ManuallyDrop::new(command_pool),
            device: ManuallyDrop::new(device),
            surface: ManuallyDrop::new(surface),
            instance: ManuallyDrop::new(instance),
        })
    }

    /// The logical device, for collaborators that build pipelines and buffers.
    #[inline]
    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    #[inline]
    pub fn physical_device(&self) -> &PhysicalDeviceInfo {
        &self.physical_device
    }

    /// Native command buffer behind a handle, for recording draw commands.
    #[inline]
    pub fn command_buffer(&self, buffer: CommandBufferHandle) -> vk::CommandBuffer {
        vk::CommandBuffer::from_raw(buffer.raw())
    }

    /// Native render pass behind a handle, for pipeline creation.
    #[inline]
    pub fn render_pass(&self, render_pass: RenderPassHandle) -> vk::RenderPass {
        vk::RenderPass::from_raw(render_pass.raw())
    }

    /// Wraps a descriptor set built elsewhere so it can travel in a frame snapshot.
    #[inline]
    pub fn descriptor_set_handle(&self, set: vk::DescriptorSet) -> DescriptorSetHandle {
        DescriptorSetHandle::from_raw(set.as_raw())
    }

    /// Native descriptor set behind a handle.
    #[inline]
    pub fn descriptor_set(&self, set: DescriptorSetHandle) -> vk::DescriptorSet {
        vk::DescriptorSet::from_raw(set.raw())
    }

    fn raw(&self) -> &ash::Device {
        self.device.handle()
    }

    fn lock_attachments(&self) -> RhiResult<std::sync::MutexGuard<'_, HashMap<u64, GpuAttachment>>> {
        self.attachments
            .lock()
            .map_err(|_| RhiError::InvalidHandle("attachment table lock poisoned".to_string()))
    }
}

impl PresentBackend for VulkanBackend {
    fn surface_support(&self) -> RhiResult<SwapchainSupportDetails> {
        self.surface.support(self.physical_device.device)
    }

    fn depth_format(&self) -> RhiResult<vk::Format> {
        find_depth_format(self.instance.handle(), self.physical_device.device).ok_or_else(|| {
            RhiError::UnsupportedFormat("no depth format usable as an attachment".to_string())
        })
    }

    fn max_sample_count(&self) -> vk::SampleCountFlags {
        choose_sample_count(64, self.physical_device.framebuffer_sample_counts())
    }

    fn create_swapchain(
        &self,
        desc: &SwapchainDesc,
        old: Option<SwapchainHandle>,
    ) -> RhiResult<SwapchainHandle> {
        let queue_families = self.device.queue_families();
        let (Some(graphics_family), Some(present_family)) =
            (queue_families.graphics_family, queue_families.present_family)
        else {
            return Err(RhiError::NoSuitableGpu);
        };
        let family_indices = [graphics_family, present_family];

        let (sharing_mode, family_indices) = if graphics_family != present_family {
            debug!(
                "Using CONCURRENT sharing mode between graphics ({}) and present ({}) queues",
                graphics_family, present_family
            );
            (vk::SharingMode::CONCURRENT, &family_indices[..])
        } else {
            (vk::SharingMode::EXCLUSIVE, &[][..])
        };

        let old_swapchain = old.map_or(vk::SwapchainKHR::null(), |handle| {
            vk::SwapchainKHR::from_raw(handle.raw())
        });

        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(self.surface.handle())
            .min_image_count(desc.image_count)
            .image_format(desc.surface_format.format)
            .image_color_space(desc.surface_format.color_space)
            .image_extent(desc.extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_DST)
            .image_sharing_mode(sharing_mode)
            .queue_family_indices(family_indices)
            .pre_transform(desc.pre_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(desc.present_mode)
            .clipped(true)
            .old_swapchain(old_swapchain);

        let swapchain = unsafe { self.swapchain_loader.create_swapchain(&create_info, None)? };
        Ok(SwapchainHandle::from_raw(swapchain.as_raw()))
    }

    fn swapchain_images(&self, swapchain: SwapchainHandle) -> RhiResult<Vec<ImageHandle>> {
        let images = unsafe {
            self.swapchain_loader
                .get_swapchain_images(vk::SwapchainKHR::from_raw(swapchain.raw()))?
        };
        Ok(images
            .into_iter()
            .map(|image| ImageHandle::from_raw(image.as_raw()))
            .collect())
    }

    fn destroy_swapchain(&self, swapchain: SwapchainHandle) {
        unsafe {
            self.swapchain_loader
                .destroy_swapchain(vk::SwapchainKHR::from_raw(swapchain.raw()), None);
        }
    }

    fn create_image_view(
        &self,
        image: ImageHandle,
        format: vk::Format,
    ) -> RhiResult<ImageViewHandle> {
        let create_info = vk::ImageViewCreateInfo::default()
            .image(vk::Image::from_raw(image.raw()))
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .components(vk::ComponentMapping {
                r: vk::ComponentSwizzle::IDENTITY,
                g: vk::ComponentSwizzle::IDENTITY,
                b: vk::ComponentSwizzle::IDENTITY,
                a: vk::ComponentSwizzle::IDENTITY,
            })
            .subresource_range(
                vk::ImageSubresourceRange::default()
                    .aspect_mask(vk::ImageAspectFlags::COLOR)
                    .base_mip_level(0)
                    .level_count(1)
                    .base_array_layer(0)
                    .layer_count(1),
            );

        let view = unsafe { self.raw().create_image_view(&create_info, None)? };
        Ok(ImageViewHandle::from_raw(view.as_raw()))
    }

    fn destroy_image_view(&self, view: ImageViewHandle) {
        unsafe {
            self.raw()
                .destroy_image_view(vk::ImageView::from_raw(view.raw()), None);
        }
    }

    fn create_attachment(&self, desc: &AttachmentDesc) -> RhiResult<AttachmentImage> {
        let attachment = GpuAttachment::new(&self.device, desc)?;
        let handle = AttachmentImage {
            image: ImageHandle::from_raw(attachment.image.as_raw()),
            view: ImageViewHandle::from_raw(attachment.view.as_raw()),
        };

        match self.lock_attachments() {
            Ok(mut attachments) => {
                attachments.insert(handle.image.raw(), attachment);
                Ok(handle)
            }
            Err(e) => {
                attachment.destroy(&self.device);
                Err(e)
            }
        }
    }

    fn destroy_attachment(&self, attachment: AttachmentImage) {
        let removed = self
            .lock_attachments()
            .ok()
            .and_then(|mut attachments| attachments.remove(&attachment.image.raw()));
        match removed {
            Some(attachment) => attachment.destroy(&self.device),
            None => warn!("Attempted to destroy unknown attachment {:?}", attachment.image),
        }
    }

    fn create_render_pass(&self, desc: &RenderPassDesc) -> RhiResult<RenderPassHandle> {
        let render_pass = render_pass::create_render_pass(self.raw(), desc)?;
        Ok(RenderPassHandle::from_raw(render_pass.as_raw()))
    }

    fn destroy_render_pass(&self, render_pass: RenderPassHandle) {
        unsafe {
            self.raw()
                .destroy_render_pass(vk::RenderPass::from_raw(render_pass.raw()), None);
        }
    }

    fn create_framebuffer(
        &self,
        render_pass: RenderPassHandle,
        attachments: &[ImageViewHandle],
        extent: vk::Extent2D,
    ) -> RhiResult<FramebufferHandle> {
        let views: Vec<vk::ImageView> = attachments
            .iter()
            .map(|view| vk::ImageView::from_raw(view.raw()))
            .collect();
        let framebuffer = render_pass::create_framebuffer(
            self.raw(),
            vk::RenderPass::from_raw(render_pass.raw()),
            &views,
            extent,
        )?;
        Ok(FramebufferHandle::from_raw(framebuffer.as_raw()))
    }

    fn destroy_framebuffer(&self, framebuffer: FramebufferHandle) {
        unsafe {
            self.raw()
                .destroy_framebuffer(vk::Framebuffer::from_raw(framebuffer.raw()), None);
        }
    }

    fn create_fence(&self, signaled: bool) -> RhiResult<FenceHandle> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };
        let create_info = vk::FenceCreateInfo::default().flags(flags);
        let fence = unsafe { self.raw().create_fence(&create_info, None)? };
        Ok(FenceHandle::from_raw(fence.as_raw()))
    }

    fn destroy_fence(&self, fence: FenceHandle) {
        unsafe {
            self.raw()
                .destroy_fence(vk::Fence::from_raw(fence.raw()), None);
        }
    }

    fn create_semaphore(&self) -> RhiResult<SemaphoreHandle> {
        let create_info = vk::SemaphoreCreateInfo::default();
        let semaphore = unsafe { self.raw().create_semaphore(&create_info, None)? };
        Ok(SemaphoreHandle::from_raw(semaphore.as_raw()))
    }

    fn destroy_semaphore(&self, semaphore: SemaphoreHandle) {
        unsafe {
            self.raw()
                .destroy_semaphore(vk::Semaphore::from_raw(semaphore.raw()), None);
        }
    }

    fn wait_for_fence(&self, fence: FenceHandle, timeout: u64) -> RhiResult<()> {
        let fences = [vk::Fence::from_raw(fence.raw())];
        unsafe { self.raw().wait_for_fences(&fences, true, timeout)? };
        Ok(())
    }

    fn reset_fence(&self, fence: FenceHandle) -> RhiResult<()> {
        let fences = [vk::Fence::from_raw(fence.raw())];
        unsafe { self.raw().reset_fences(&fences)? };
        Ok(())
    }

    fn wait_idle(&self) -> RhiResult<()> {
        self.device.wait_idle()
    }

    fn allocate_command_buffers(&self, count: u32) -> RhiResult<Vec<CommandBufferHandle>> {
        let buffers = self.command_pool.allocate(count)?;
        debug!("Allocated {} command buffer(s)", buffers.len());
        Ok(buffers
            .into_iter()
            .map(|buffer| CommandBufferHandle::from_raw(buffer.as_raw()))
            .collect())
    }

    fn free_command_buffers(&self, buffers: &[CommandBufferHandle]) {
        let buffers: Vec<vk::CommandBuffer> = buffers
            .iter()
            .map(|buffer| self.command_buffer(*buffer))
            .collect();
        self.command_pool.free(&buffers);
    }

    fn begin_command_buffer(&self, buffer: CommandBufferHandle) -> RhiResult<()> {
        let buffer = self.command_buffer(buffer);
        let begin_info =
            vk::CommandBufferBeginInfo::default().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        unsafe {
            self.raw()
                .reset_command_buffer(buffer, vk::CommandBufferResetFlags::empty())?;
            self.raw().begin_command_buffer(buffer, &begin_info)?;
        }
        Ok(())
    }

    fn end_command_buffer(&self, buffer: CommandBufferHandle) -> RhiResult<()> {
        unsafe { self.raw().end_command_buffer(self.command_buffer(buffer))? };
        Ok(())
    }

    fn cmd_begin_render_pass(&self, buffer: CommandBufferHandle, begin: &RenderPassBegin) {
        let clear_values = [
            vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: begin.clear_color,
                },
            },
            vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth: begin.clear_depth,
                    stencil: begin.clear_stencil,
                },
            },
        ];

        let begin_info = vk::RenderPassBeginInfo::default()
            .render_pass(self.render_pass(begin.render_pass))
            .framebuffer(vk::Framebuffer::from_raw(begin.framebuffer.raw()))
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent: begin.extent,
            })
            .clear_values(&clear_values);

        unsafe {
            self.raw().cmd_begin_render_pass(
                self.command_buffer(buffer),
                &begin_info,
                vk::SubpassContents::INLINE,
            );
        }
    }

    fn cmd_set_viewport_and_scissor(&self, buffer: CommandBufferHandle, extent: vk::Extent2D) {
        let buffer = self.command_buffer(buffer);
        let viewport = vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: extent.width as f32,
            height: extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        };
        let scissor = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent,
        };
        unsafe {
            self.raw().cmd_set_viewport(buffer, 0, &[viewport]);
            self.raw().cmd_set_scissor(buffer, 0, &[scissor]);
        }
    }

    fn cmd_end_render_pass(&self, buffer: CommandBufferHandle) {
        unsafe { self.raw().cmd_end_render_pass(self.command_buffer(buffer)) };
    }

    fn acquire_next_image(
        &self,
        swapchain: SwapchainHandle,
        signal: SemaphoreHandle,
    ) -> RhiResult<AcquireOutcome> {
        let result = unsafe {
            self.swapchain_loader.acquire_next_image(
                vk::SwapchainKHR::from_raw(swapchain.raw()),
                u64::MAX,
                vk::Semaphore::from_raw(signal.raw()),
                vk::Fence::null(),
            )
        };

        match result {
            Ok((index, suboptimal)) => Ok(AcquireOutcome::Image { index, suboptimal }),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(AcquireOutcome::OutOfDate),
            Err(e) => Err(RhiError::VulkanError(e)),
        }
    }

    fn submit(
        &self,
        buffer: CommandBufferHandle,
        wait: SemaphoreHandle,
        signal: SemaphoreHandle,
        fence: FenceHandle,
    ) -> RhiResult<()> {
        let wait_semaphores = [vk::Semaphore::from_raw(wait.raw())];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let signal_semaphores = [vk::Semaphore::from_raw(signal.raw())];
        let command_buffers = [self.command_buffer(buffer)];

        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        unsafe {
            self.raw().queue_submit(
                self.device.graphics_queue(),
                &[submit_info],
                vk::Fence::from_raw(fence.raw()),
            )?;
        }
        Ok(())
    }

    fn present(
        &self,
        swapchain: SwapchainHandle,
        image_index: u32,
        wait: SemaphoreHandle,
    ) -> RhiResult<SurfaceStatus> {
        let wait_semaphores = [vk::Semaphore::from_raw(wait.raw())];
        let swapchains = [vk::SwapchainKHR::from_raw(swapchain.raw())];
        let image_indices = [image_index];

        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        let result = unsafe {
            self.swapchain_loader
                .queue_present(self.device.present_queue(), &present_info)
        };

        match result {
            Ok(false) => Ok(SurfaceStatus::Optimal),
            Ok(true) | Err(vk::Result::SUBOPTIMAL_KHR) => Ok(SurfaceStatus::Suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(SurfaceStatus::OutOfDate),
            Err(e) => Err(RhiError::VulkanError(e)),
        }
    }
}

impl Drop for VulkanBackend {
    fn drop(&mut self) {
        if let Err(e) = self.device.wait_idle() {
            warn!("Failed to wait for device idle during backend drop: {:?}", e);
        }

        let leaked: Vec<GpuAttachment> = match self.attachments.get_mut() {
            Ok(attachments) => attachments.drain().map(|(_, attachment)| attachment).collect(),
            Err(poisoned) => poisoned
                .into_inner()
                .drain()
                .map(|(_, attachment)| attachment)
                .collect(),
        };
        if !leaked.is_empty() {
            warn!("{} attachment(s) still alive at backend drop", leaked.len());
        }
        for attachment in leaked {
            attachment.destroy(&self.device);
        }

        // Reverse order of creation: pool, device, surface, instance.
        unsafe {
            ManuallyDrop::drop(&mut self.command_pool);
            ManuallyDrop::drop(&mut self.device);
            ManuallyDrop::drop(&mut self.surface);
            ManuallyDrop::drop(&mut self.instance);
        }
        info!("Vulkan backend destroyed");
    }
}
