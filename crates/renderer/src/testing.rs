//! Test doubles for the backend and the window.
//!
//! [`MockBackend`] hands out handles from a counter, completes GPU work
//! instantly, and checks the synchronization protocol as it goes: it panics
//! on waiting for a fence that was reset and never submitted, on submitting
//! with a signaled fence, on waiting for a semaphore nothing signaled, and on
//! destroying a handle twice or with the wrong kind.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard};

use framechain_core::Extent;
use framechain_platform::DrawableWindow;
use framechain_rhi::{
    AcquireOutcome, AttachmentDesc, AttachmentImage, CommandBufferHandle, FenceHandle,
    FramebufferHandle, ImageHandle, ImageViewHandle, PresentBackend, RenderPassBegin,
    RenderPassDesc, RenderPassHandle, RhiError, RhiResult, SemaphoreHandle, SurfaceStatus,
    SwapchainDesc, SwapchainHandle, SwapchainSupportDetails, vk,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Submit {
    pub buffer: CommandBufferHandle,
    pub wait: SemaphoreHandle,
    pub signal: SemaphoreHandle,
    pub fence: FenceHandle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Present {
    pub swapchain: SwapchainHandle,
    pub image_index: u32,
    pub wait: SemaphoreHandle,
}

struct SwapchainState {
    images: Vec<ImageHandle>,
    next_image: u32,
}

struct MockState {
    next_handle: u64,
    /// Live handle → kind.
    live: HashMap<u64, &'static str>,
    destroy_log: Vec<&'static str>,
    surface_formats: Vec<vk::SurfaceFormatKHR>,
    depth_format: vk::Format,
    swapchains: HashMap<u64, SwapchainState>,
    swapchain_descs: Vec<SwapchainDesc>,
    last_old_swapchain: Option<SwapchainHandle>,
    framebuffer_attachments: Vec<Vec<ImageViewHandle>>,
    fail_next_render_pass: bool,
    /// Fence → signaled.
    fences: HashMap<u64, bool>,
    fence_waits: Vec<FenceHandle>,
    signaled_semaphores: HashSet<u64>,
    recording: HashSet<u64>,
    acquire_script: VecDeque<AcquireOutcome>,
    present_script: VecDeque<SurfaceStatus>,
    submits: Vec<Submit>,
    presents: Vec<Present>,
    render_pass_begins: Vec<(CommandBufferHandle, RenderPassBegin)>,
    viewports: Vec<vk::Extent2D>,
    wait_idle_calls: usize,
}

/// A [`PresentBackend`] that records what it is asked to do.
pub struct MockBackend {
    state: Mutex<MockState>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState {
                next_handle: 1,
                live: HashMap::new(),
                destroy_log: Vec::new(),
                surface_formats: vec![vk::SurfaceFormatKHR {
                    format: vk::Format::B8G8R8A8_SRGB,
                    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
                }],
                depth_format: vk::Format::D32_SFLOAT,
                swapchains: HashMap::new(),
                swapchain_descs: Vec::new(),
                last_old_swapchain: None,
                framebuffer_attachments: Vec::new(),
                fail_next_render_pass: false,
                fences: HashMap::new(),
                fence_waits: Vec::new(),
                signaled_semaphores: HashSet::new(),
                recording: HashSet::new(),
                acquire_script: VecDeque::new(),
                present_script: VecDeque::new(),
                submits: Vec::new(),
                presents: Vec::new(),
                render_pass_begins: Vec::new(),
                viewports: Vec::new(),
                wait_idle_calls: 0,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }

    /// Outcome of the next acquire instead of the round-robin default.
    pub fn push_acquire(&self, outcome: AcquireOutcome) {
        self.state().acquire_script.push_back(outcome);
    }

    /// Status of the next present instead of `Optimal`.
    pub fn push_present(&self, status: SurfaceStatus) {
        self.state().present_script.push_back(status);
    }

    pub fn set_surface_format(&self, format: vk::Format) {
        self.state().surface_formats = vec![vk::SurfaceFormatKHR {
            format,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }];
    }

    pub fn fail_next_render_pass(&self) {
        self.state().fail_next_render_pass = true;
    }

    pub fn live_count(&self) -> usize {
        self.state().live.len()
    }

    pub fn swapchains_created(&self) -> usize {
        self.state().swapchain_descs.len()
    }

    pub fn swapchain_extents(&self) -> Vec<vk::Extent2D> {
        self.state().swapchain_descs.iter().map(|d| d.extent).collect()
    }

    pub fn last_old_swapchain(&self) -> Option<SwapchainHandle> {
        self.state().last_old_swapchain
    }

    pub fn framebuffer_attachments(&self) -> Vec<Vec<ImageViewHandle>> {
        self.state().framebuffer_attachments.clone()
    }

    pub fn destroy_log(&self) -> Vec<&'static str> {
        self.state().destroy_log.clone()
    }

    pub fn clear_destroy_log(&self) {
        self.state().destroy_log.clear();
    }

    pub fn fence_waits(&self) -> Vec<FenceHandle> {
        self.state().fence_waits.clone()
    }

    pub fn clear_fence_waits(&self) {
        self.state().fence_waits.clear();
    }

    pub fn submits(&self) -> Vec<Submit> {
        self.state().submits.clone()
    }

    pub fn last_submit(&self) -> Option<Submit> {
        self.state().submits.last().copied()
    }

    pub fn presents(&self) -> Vec<Present> {
        self.state().presents.clone()
    }

    pub fn last_present(&self) -> Option<Present> {
        self.state().presents.last().copied()
    }

    pub fn render_pass_begins(&self) -> Vec<(CommandBufferHandle, RenderPassBegin)> {
        self.state().render_pass_begins.clone()
    }

    pub fn viewports(&self) -> Vec<vk::Extent2D> {
        self.state().viewports.clone()
    }

    pub fn wait_idle_calls(&self) -> usize {
        self.state().wait_idle_calls
    }
}

impl MockState {
    fn create(&mut self, kind: &'static str) -> u64 {
        let handle = self.next_handle;
        self.next_handle += 1;
        self.live.insert(handle, kind);
        handle
    }

    fn destroy(&mut self, handle: u64, kind: &'static str) {
        match self.live.remove(&handle) {
            Some(live_kind) if live_kind == kind => self.destroy_log.push(kind),
            Some(live_kind) => panic!("destroyed {live_kind} {handle} as a {kind}"),
            None => panic!("destroyed unknown or already destroyed {kind} {handle}"),
        }
    }
}

impl PresentBackend for MockBackend {
    fn surface_support(&self) -> RhiResult<SwapchainSupportDetails> {
        let state = self.state();
        Ok(SwapchainSupportDetails {
            capabilities: vk::SurfaceCapabilitiesKHR {
                min_image_count: 2,
                max_image_count: 0,
                current_extent: vk::Extent2D {
                    width: u32::MAX,
                    height: u32::MAX,
                },
                min_image_extent: vk::Extent2D {
                    width: 1,
                    height: 1,
                },
                max_image_extent: vk::Extent2D {
                    width: 4096,
                    height: 4096,
                },
                current_transform: vk::SurfaceTransformFlagsKHR::IDENTITY,
                ..Default::default()
            },
            formats: state.surface_formats.clone(),
            present_modes: vec![vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX],
        })
    }

    fn depth_format(&self) -> RhiResult<vk::Format> {
        Ok(self.state().depth_format)
    }

    fn max_sample_count(&self) -> vk::SampleCountFlags {
        vk::SampleCountFlags::TYPE_8
    }

    fn create_swapchain(
        &self,
        desc: &SwapchainDesc,
        old: Option<SwapchainHandle>,
    ) -> RhiResult<SwapchainHandle> {
        let mut state = self.state();
        assert!(
            desc.extent.width > 0 && desc.extent.height > 0,
            "zero-sized swapchain requested"
        );
        if let Some(old) = old {
            assert!(state.live.contains_key(&old.raw()), "old swapchain is not live");
        }

        let handle = state.create("swapchain");
        let images = (0..desc.image_count)
            .map(|_| {
                let image = state.next_handle;
                state.next_handle += 1;
                ImageHandle::from_raw(image)
            })
            .collect();
        state.swapchains.insert(
            handle,
            SwapchainState {
                images,
                next_image: 0,
            },
        );
        state.swapchain_descs.push(*desc);
        state.last_old_swapchain = old;
        Ok(SwapchainHandle::from_raw(handle))
    }

    fn swapchain_images(&self, swapchain: SwapchainHandle) -> RhiResult<Vec<ImageHandle>> {
        let state = self.state();
        state
            .swapchains
            .get(&swapchain.raw())
            .map(|s| s.images.clone())
            .ok_or_else(|| RhiError::InvalidHandle(format!("swapchain {}", swapchain.raw())))
    }

    fn destroy_swapchain(&self, swapchain: SwapchainHandle) {
        let mut state = self.state();
        state.destroy(swapchain.raw(), "swapchain");
        state.swapchains.remove(&swapchain.raw());
    }

    fn create_image_view(
        &self,
        _image: ImageHandle,
        _format: vk::Format,
    ) -> RhiResult<ImageViewHandle> {
        Ok(ImageViewHandle::from_raw(self.state().create("image_view")))
    }

    fn destroy_image_view(&self, view: ImageViewHandle) {
        self.state().destroy(view.raw(), "image_view");
    }

    fn create_attachment(&self, desc: &AttachmentDesc) -> RhiResult<AttachmentImage> {
        assert!(desc.extent.width > 0 && desc.extent.height > 0);
        let mut state = self.state();
        let image = state.create("attachment");
        let view = state.next_handle;
        state.next_handle += 1;
        Ok(AttachmentImage {
            image: ImageHandle::from_raw(image),
            view: ImageViewHandle::from_raw(view),
        })
    }

    fn destroy_attachment(&self, attachment: AttachmentImage) {
        self.state().destroy(attachment.image.raw(), "attachment");
    }

    fn create_render_pass(&self, _desc: &RenderPassDesc) -> RhiResult<RenderPassHandle> {
        let mut state = self.state();
        if std::mem::take(&mut state.fail_next_render_pass) {
            return Err(RhiError::VulkanError(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY));
        }
        Ok(RenderPassHandle::from_raw(state.create("render_pass")))
    }

    fn destroy_render_pass(&self, render_pass: RenderPassHandle) {
        self.state().destroy(render_pass.raw(), "render_pass");
    }

    fn create_framebuffer(
        &self,
        _render_pass: RenderPassHandle,
        attachments: &[ImageViewHandle],
        _extent: vk::Extent2D,
    ) -> RhiResult<FramebufferHandle> {
        let mut state = self.state();
        state.framebuffer_attachments.push(attachments.to_vec());
        Ok(FramebufferHandle::from_raw(state.create("framebuffer")))
    }

    fn destroy_framebuffer(&self, framebuffer: FramebufferHandle) {
        self.state().destroy(framebuffer.raw(), "framebuffer");
    }

    fn create_fence(&self, signaled: bool) -> RhiResult<FenceHandle> {
        let mut state = self.state();
        let fence = state.create("fence");
        state.fences.insert(fence, signaled);
        Ok(FenceHandle::from_raw(fence))
    }

    fn destroy_fence(&self, fence: FenceHandle) {
        let mut state = self.state();
        state.destroy(fence.raw(), "fence");
        state.fences.remove(&fence.raw());
    }

    fn create_semaphore(&self) -> RhiResult<SemaphoreHandle> {
        Ok(SemaphoreHandle::from_raw(self.state().create("semaphore")))
    }

    fn destroy_semaphore(&self, semaphore: SemaphoreHandle) {
        let mut state = self.state();
        state.destroy(semaphore.raw(), "semaphore");
        state.signaled_semaphores.remove(&semaphore.raw());
    }

    fn wait_for_fence(&self, fence: FenceHandle, _timeout: u64) -> RhiResult<()> {
        let mut state = self.state();
        match state.fences.get(&fence.raw()) {
            Some(true) => {}
            Some(false) => panic!("waited on fence {} that can never signal", fence.raw()),
            None => panic!("waited on unknown fence {}", fence.raw()),
        }
        state.fence_waits.push(fence);
        Ok(())
    }

    fn reset_fence(&self, fence: FenceHandle) -> RhiResult<()> {
        let mut state = self.state();
        let signaled = state
            .fences
            .get_mut(&fence.raw())
            .unwrap_or_else(|| panic!("reset unknown fence {}", fence.raw()));
        *signaled = false;
        Ok(())
    }

    fn wait_idle(&self) -> RhiResult<()> {
        self.state().wait_idle_calls += 1;
        Ok(())
    }

    fn allocate_command_buffers(&self, count: u32) -> RhiResult<Vec<CommandBufferHandle>> {
        let mut state = self.state();
        Ok((0..count)
            .map(|_| CommandBufferHandle::from_raw(state.create("command_buffer")))
            .collect())
    }

    fn free_command_buffers(&self, buffers: &[CommandBufferHandle]) {
        let mut state = self.state();
        for buffer in buffers {
            state.destroy(buffer.raw(), "command_buffer");
        }
    }

    fn begin_command_buffer(&self, buffer: CommandBufferHandle) -> RhiResult<()> {
        let inserted = self.state().recording.insert(buffer.raw());
        assert!(inserted, "command buffer {} already recording", buffer.raw());
        Ok(())
    }

    fn end_command_buffer(&self, buffer: CommandBufferHandle) -> RhiResult<()> {
        let removed = self.state().recording.remove(&buffer.raw());
        assert!(removed, "command buffer {} was not recording", buffer.raw());
        Ok(())
    }

    fn cmd_begin_render_pass(&self, buffer: CommandBufferHandle, begin: &RenderPassBegin) {
        let mut state = self.state();
        assert!(state.recording.contains(&buffer.raw()));
        assert!(state.live.contains_key(&begin.framebuffer.raw()), "stale framebuffer");
        state.render_pass_begins.push((buffer, *begin));
    }

    fn cmd_set_viewport_and_scissor(&self, buffer: CommandBufferHandle, extent: vk::Extent2D) {
        let mut state = self.state();
        assert!(state.recording.contains(&buffer.raw()));
        state.viewports.push(extent);
    }

    fn cmd_end_render_pass(&self, buffer: CommandBufferHandle) {
        assert!(self.state().recording.contains(&buffer.raw()));
    }

    fn acquire_next_image(
        &self,
        swapchain: SwapchainHandle,
        signal: SemaphoreHandle,
    ) -> RhiResult<AcquireOutcome> {
        let mut state = self.state();
        let outcome = match state.acquire_script.pop_front() {
            Some(outcome) => outcome,
            None => {
                let chain = state
                    .swapchains
                    .get_mut(&swapchain.raw())
                    .unwrap_or_else(|| panic!("acquire on dead swapchain {}", swapchain.raw()));
                let index = chain.next_image;
                chain.next_image = (index + 1) % chain.images.len() as u32;
                AcquireOutcome::Image {
                    index,
                    suboptimal: false,
                }
            }
        };

        if let AcquireOutcome::Image { .. } = outcome {
            let fresh = state.signaled_semaphores.insert(signal.raw());
            assert!(fresh, "acquire signaled semaphore {} twice", signal.raw());
        }
        Ok(outcome)
    }

    fn submit(
        &self,
        buffer: CommandBufferHandle,
        wait: SemaphoreHandle,
        signal: SemaphoreHandle,
        fence: FenceHandle,
    ) -> RhiResult<()> {
        let mut state = self.state();
        assert!(
            !state.recording.contains(&buffer.raw()),
            "submitted a command buffer that is still recording"
        );
        assert!(
            state.signaled_semaphores.remove(&wait.raw()),
            "submit waits on semaphore {} that nothing signaled",
            wait.raw()
        );
        match state.fences.get_mut(&fence.raw()) {
            Some(signaled) if !*signaled => *signaled = true,
            Some(_) => panic!("submitted with fence {} still signaled", fence.raw()),
            None => panic!("submitted with unknown fence {}", fence.raw()),
        }
        state.signaled_semaphores.insert(signal.raw());
        state.submits.push(Submit {
            buffer,
            wait,
            signal,
            fence,
        });
        Ok(())
    }

    fn present(
        &self,
        swapchain: SwapchainHandle,
        image_index: u32,
        wait: SemaphoreHandle,
    ) -> RhiResult<SurfaceStatus> {
        let mut state = self.state();
        assert!(state.live.contains_key(&swapchain.raw()), "present on dead swapchain");
        assert!(
            state.signaled_semaphores.remove(&wait.raw()),
            "present waits on semaphore {} that nothing signaled",
            wait.raw()
        );
        state.presents.push(Present {
            swapchain,
            image_index,
            wait,
        });
        Ok(state
            .present_script
            .pop_front()
            .unwrap_or(SurfaceStatus::Optimal))
    }
}

/// A window whose size changes are scripted by the test.
pub struct MockWindow {
    extent: Extent,
    /// Extents taken, one per `wait_events` call.
    scripted: VecDeque<Extent>,
    resize_pending: bool,
    closing: bool,
    pub wait_calls: usize,
}

impl MockWindow {
    pub fn new(extent: Extent) -> Self {
        Self {
            extent,
            scripted: VecDeque::new(),
            resize_pending: false,
            closing: false,
            wait_calls: 0,
        }
    }

    /// Resize now, as a window event would.
    pub fn resize(&mut self, extent: Extent) {
        self.extent = extent;
        self.resize_pending = true;
    }

    /// Extents reported after each subsequent `wait_events`.
    pub fn script_extents(&mut self, extents: impl IntoIterator<Item = Extent>) {
        self.scripted.extend(extents);
    }

    pub fn close(&mut self) {
        self.closing = true;
    }
}

impl DrawableWindow for MockWindow {
    fn drawable_extent(&self) -> Extent {
        self.extent
    }

    fn resize_pending(&self) -> bool {
        self.resize_pending
    }

    fn clear_resize_pending(&mut self) {
        self.resize_pending = false;
    }

    fn should_close(&self) -> bool {
        self.closing
    }

    fn wait_events(&mut self) {
        self.wait_calls += 1;
        match self.scripted.pop_front() {
            Some(next) => {
                if next != self.extent {
                    self.resize_pending = true;
                }
                self.extent = next;
            }
            None => assert!(
                !self.extent.is_zero() || self.closing,
                "wait_events would block forever"
            ),
        }
    }
}
