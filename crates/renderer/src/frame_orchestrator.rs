//! Frame orchestration.
//!
//! The [`FrameOrchestrator`] drives one frame at a time through
//! acquire → record → submit → present, owns the per-slot command buffers,
//! and rebuilds the [`PresentChain`] whenever the surface goes stale, turns
//! suboptimal or the window is resized.
//!
//! # Frame States
//!
//! ```text
//!          begin_frame            begin_render_pass
//!   Idle ──────────────▶ FrameOpen ─────────────────▶ RenderPassOpen
//!    ▲                    │     ▲                           │
//!    └────── end_frame ───┘     └───── end_render_pass ─────┘
//! ```
//!
//! Calls out of this order, or with a command buffer that does not belong to
//! the active slot, are contract violations and panic in debug builds.
//!
//! # Example
//!
//! ```no_run
//! use framechain_renderer::FrameOrchestrator;
//! use framechain_rhi::{DescriptorSetHandle, PresentBackend};
//! use framechain_platform::DrawableWindow;
//! use framechain_scene::{Camera, ObjectMap};
//!
//! # fn example<B: PresentBackend, W: DrawableWindow>(
//! #     orchestrator: &mut FrameOrchestrator<B, W>,
//! #     camera: &Camera,
//! #     objects: &ObjectMap<B>,
//! # ) -> Result<(), framechain_renderer::RendererError> {
//! if let Some(cmd) = orchestrator.begin_frame()? {
//!     orchestrator.begin_render_pass(cmd);
//!     orchestrator.record_render_systems(camera, DescriptorSetHandle::NULL, objects);
//!     orchestrator.end_render_pass(cmd);
//!     orchestrator.end_frame()?;
//! }
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use tracing::{debug, info, warn};

use framechain_core::{Extent, RendererSettings, Timer};
use framechain_platform::DrawableWindow;
use framechain_rhi::{
    AcquireOutcome, CommandBufferHandle, DescriptorSetHandle, PresentBackend, RenderPassBegin,
    RenderPassHandle,
};
use framechain_scene::{Camera, ObjectMap};

use crate::error::{RendererError, RendererResult};
use crate::present_chain::PresentChain;
use crate::render_system::{FrameSnapshot, RenderSystem};
use crate::slot::SlotCursor;

/// Where the orchestrator is within a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameState {
    Idle,
    FrameOpen,
    RenderPassOpen,
}

/// Drives frames through the present chain.
///
/// # Thread Safety
///
/// Recording is single-threaded: the orchestrator must be driven from one
/// thread, the one that owns the window.
pub struct FrameOrchestrator<B: PresentBackend, W: DrawableWindow> {
    // Dropped in declaration order: the backend must go before the window
    // its surface was created from.
    chain: PresentChain<B>,
    render_systems: Vec<Box<dyn RenderSystem<B>>>,
    backend: Arc<B>,
    window: W,
    settings: RendererSettings,
    /// One command buffer per frame slot.
    command_buffers: Vec<CommandBufferHandle>,
    cursor: SlotCursor,
    state: FrameState,
    /// Set by a suboptimal acquire; the chain is rebuilt after the frame.
    recreate_after_frame: bool,
    timer: Timer,
    frame_time: f32,
}

impl<B: PresentBackend, W: DrawableWindow> FrameOrchestrator<B, W> {
    /// Creates the first present chain and the per-slot command buffers.
    ///
    /// Blocks on window events while the drawable extent is zero.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `settings` are invalid
    /// - The window closes before it has a drawable extent
    /// - Chain or command buffer creation fails
    pub fn new(backend: Arc<B>, mut window: W, settings: RendererSettings) -> RendererResult<Self> {
        settings.validate()?;

        let chain = loop {
            let extent = wait_for_drawable(&mut window)?;
            match PresentChain::new(backend.clone(), &settings, extent, None) {
                Err(RendererError::ZeroExtent(_)) => window.wait_events(),
                result => break result?,
            }
        };
        window.clear_resize_pending();

        let command_buffers = backend.allocate_command_buffers(settings.frames_in_flight as u32)?;

        info!(
            "Frame orchestrator created with {} frame(s) in flight",
            settings.frames_in_flight
        );

        Ok(Self {
            backend,
            window,
            cursor: SlotCursor::new(settings.frames_in_flight),
            settings,
            chain,
            command_buffers,
            render_systems: Vec::new(),
            state: FrameState::Idle,
            recreate_after_frame: false,
            timer: Timer::new(),
            frame_time: 0.0,
        })
    }

    /// Acquires an image and opens the active slot's command buffer.
    ///
    /// Returns `Ok(None)` when there is no frame this tick: the surface was
    /// out of date (the chain has been rebuilt) or the window is closing while
    /// minimized. The caller must skip drawing.
    ///
    /// # Errors
    ///
    /// Returns an error for driver failures and when a rebuilt chain changes
    /// formats.
    pub fn begin_frame(&mut self) -> RendererResult<Option<CommandBufferHandle>> {
        debug_assert_eq!(
            self.state,
            FrameState::Idle,
            "begin_frame called while a frame is in progress"
        );

        if self.window.resize_pending() {
            debug!("Resize pending, recreating present chain before acquire");
            if !self.recreate_chain()? {
                return Ok(None);
            }
        }

        let slot = self.cursor.current_slot();
        match self.chain.acquire_next(slot)? {
            AcquireOutcome::OutOfDate => {
                debug!("Present chain out of date on acquire, skipping frame");
                self.recreate_chain()?;
                Ok(None)
            }
            AcquireOutcome::Image { index, suboptimal } => {
                if suboptimal {
                    debug!("Acquired image {} is suboptimal, recreating after frame", index);
                    self.recreate_after_frame = true;
                }
                self.cursor.set_image_index(index);

                let cmd = self.command_buffers[slot];
                self.backend.begin_command_buffer(cmd)?;

                self.frame_time = self.timer.delta_secs();
                self.state = FrameState::FrameOpen;
                Ok(Some(cmd))
            }
        }
    }

    /// Begins the render pass on the acquired image's framebuffer, clearing
    /// color to the configured clear color and depth to 1.0, and sets the
    /// viewport and scissor to the chain extent.
    ///
    /// # Panics
    ///
    /// In debug builds, if no frame is open or `cmd` is not the active slot's
    /// command buffer.
    pub fn begin_render_pass(&mut self, cmd: CommandBufferHandle) {
        debug_assert_eq!(
            self.state,
            FrameState::FrameOpen,
            "begin_render_pass called without an open frame"
        );
        self.debug_assert_active_buffer(cmd);

        let image_index = self.cursor.image_index().unwrap_or_default();
        let extent = self.chain.vk_extent();
        self.backend.cmd_begin_render_pass(
            cmd,
            &RenderPassBegin {
                render_pass: self.chain.render_pass(),
                framebuffer: self.chain.framebuffer(image_index),
                extent,
                clear_color: self.settings.clear_color,
                clear_depth: 1.0,
                clear_stencil: 0,
            },
        );
        self.backend.cmd_set_viewport_and_scissor(cmd, extent);
        self.state = FrameState::RenderPassOpen;
    }

    /// Dispatches every registered render system, in registration order, into
    /// the open render pass.
    pub fn record_render_systems(
        &mut self,
        camera: &Camera,
        global_set: DescriptorSetHandle,
        objects: &ObjectMap<B>,
    ) {
        debug_assert_eq!(
            self.state,
            FrameState::RenderPassOpen,
            "render systems dispatched outside a render pass"
        );

        let image_index = self.cursor.image_index().unwrap_or_default();
        let frame = FrameSnapshot {
            frame_index: self.cursor.current_slot(),
            frame_time: self.frame_time,
            command_buffer: self.command_buffers[self.cursor.current_slot()],
            render_pass: self.chain.render_pass(),
            framebuffer: self.chain.framebuffer(image_index),
            extent: self.chain.extent(),
            camera,
            global_set,
            objects,
            backend: self.backend.as_ref(),
        };

        for system in &mut self.render_systems {
            system.render(&frame);
        }
    }

    /// Ends the render pass.
    ///
    /// # Panics
    ///
    /// In debug builds, if no render pass is open or `cmd` is not the active
    /// slot's command buffer.
    pub fn end_render_pass(&mut self, cmd: CommandBufferHandle) {
        debug_assert_eq!(
            self.state,
            FrameState::RenderPassOpen,
            "end_render_pass called without an open render pass"
        );
        self.debug_assert_active_buffer(cmd);

        self.backend.cmd_end_render_pass(cmd);
        self.state = FrameState::FrameOpen;
    }

    /// Ends recording, submits and presents, then advances to the next slot.
    ///
    /// The chain is rebuilt afterwards if presentation reported a stale or
    /// suboptimal surface, the acquire was suboptimal, or the window was
    /// resized.
    ///
    /// # Errors
    ///
    /// Returns an error for driver failures and when a rebuilt chain changes
    /// formats.
    pub fn end_frame(&mut self) -> RendererResult<()> {
        debug_assert_eq!(
            self.state,
            FrameState::FrameOpen,
            "end_frame called without an open frame or with the render pass still open"
        );

        let slot = self.cursor.current_slot();
        let cmd = self.command_buffers[slot];
        let image_index = self.cursor.image_index().unwrap_or_default();

        self.backend.end_command_buffer(cmd)?;
        let status = self.chain.submit_and_present(slot, cmd, image_index)?;

        self.state = FrameState::Idle;
        self.cursor.advance();

        if status.needs_recreation() || self.recreate_after_frame || self.window.resize_pending()
        {
            debug!(
                "Recreating present chain after frame (present: {:?}, resize pending: {})",
                status,
                self.window.resize_pending()
            );
            self.recreate_chain()?;
        }

        Ok(())
    }

    /// Runs one whole frame: begin, render pass, every render system, end.
    ///
    /// Returns `false` when the frame was skipped.
    pub fn draw_frame(
        &mut self,
        camera: &Camera,
        global_set: DescriptorSetHandle,
        objects: &ObjectMap<B>,
    ) -> RendererResult<bool> {
        let Some(cmd) = self.begin_frame()? else {
            return Ok(false);
        };

        self.begin_render_pass(cmd);
        self.record_render_systems(camera, global_set, objects);
        self.end_render_pass(cmd);
        self.end_frame()?;
        Ok(true)
    }

    /// Registers a render system after those already registered. Returns its
    /// position in dispatch order.
    pub fn add_render_system(&mut self, system: Box<dyn RenderSystem<B>>) -> usize {
        debug!("Registered render system '{}'", system.name());
        self.render_systems.push(system);
        self.render_systems.len() - 1
    }

    /// Waits for the device to go idle and replaces the chain with a new
    /// generation sized to the window.
    ///
    /// While the drawable extent is zero this blocks on window events.
    /// Returns `false`, keeping the current chain, if the window closes
    /// during that wait.
    ///
    /// # Errors
    ///
    /// Returns [`RendererError::FormatChanged`] if the new generation picked
    /// different formats; the current chain is kept in that case.
    pub fn recreate_chain(&mut self) -> RendererResult<bool> {
        self.backend.wait_idle()?;

        let chain = loop {
            let extent = match wait_for_drawable(&mut self.window) {
                Ok(extent) => extent,
                Err(RendererError::WindowClosed) => {
                    debug!("Window closed while minimized, keeping present chain");
                    return Ok(false);
                }
                Err(e) => return Err(e),
            };

            match PresentChain::new(
                self.backend.clone(),
                &self.settings,
                extent,
                Some(&self.chain),
            ) {
                Err(RendererError::ZeroExtent(extent)) => {
                    debug!("Surface reports zero extent {}, waiting", extent);
                    self.window.wait_events();
                }
                result => break result?,
            }
        };

        if !chain.formats_match(&self.chain) {
            return Err(RendererError::FormatChanged {
                old_color: self.chain.image_format(),
                old_depth: self.chain.depth_format(),
                new_color: chain.image_format(),
                new_depth: chain.depth_format(),
            });
        }

        // The outgoing generation is dropped here, after the new swapchain
        // has replaced it.
        self.chain = chain;
        self.window.clear_resize_pending();
        self.recreate_after_frame = false;

        info!(
            "Present chain recreated: generation {}, {}",
            self.chain.generation(),
            self.chain.extent()
        );
        Ok(true)
    }

    fn debug_assert_active_buffer(&self, cmd: CommandBufferHandle) {
        debug_assert_eq!(
            cmd,
            self.command_buffers[self.cursor.current_slot()],
            "command buffer does not belong to the active frame slot {}",
            self.cursor.current_slot()
        );
    }

    /// Render pass of the current chain, for pipeline creation.
    #[inline]
    pub fn render_pass(&self) -> RenderPassHandle {
        self.chain.render_pass()
    }

    /// Width over height of the current chain.
    #[inline]
    pub fn aspect_ratio(&self) -> f32 {
        self.chain.extent().aspect_ratio()
    }

    #[inline]
    pub fn extent(&self) -> Extent {
        self.chain.extent()
    }

    /// Generation id of the current chain.
    #[inline]
    pub fn generation(&self) -> u64 {
        self.chain.generation()
    }

    #[inline]
    pub fn active_slot(&self) -> usize {
        self.cursor.current_slot()
    }

    /// Image acquired for the open frame.
    #[inline]
    pub fn image_index(&self) -> Option<u32> {
        self.cursor.image_index()
    }

    #[inline]
    pub fn state(&self) -> FrameState {
        self.state
    }

    #[inline]
    pub fn is_frame_in_progress(&self) -> bool {
        self.state != FrameState::Idle
    }

    /// Command buffer of the open frame.
    pub fn current_command_buffer(&self) -> Option<CommandBufferHandle> {
        self.is_frame_in_progress()
            .then(|| self.command_buffers[self.cursor.current_slot()])
    }

    #[inline]
    pub fn render_system_count(&self) -> usize {
        self.render_systems.len()
    }

    #[inline]
    pub fn frames_in_flight(&self) -> usize {
        self.cursor.slot_count()
    }

    #[inline]
    pub fn chain(&self) -> &PresentChain<B> {
        &self.chain
    }

    #[inline]
    pub fn window(&self) -> &W {
        &self.window
    }

    #[inline]
    pub fn window_mut(&mut self) -> &mut W {
        &mut self.window
    }

    #[inline]
    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }
}

impl<B: PresentBackend, W: DrawableWindow> Drop for FrameOrchestrator<B, W> {
    fn drop(&mut self) {
        if self.is_frame_in_progress() {
            warn!("Frame orchestrator dropped with a frame in progress");
        }
        if let Err(e) = self.backend.wait_idle() {
            warn!("Failed to wait for device idle during drop: {:?}", e);
        }

        self.backend.free_command_buffers(&self.command_buffers);
        self.command_buffers.clear();
        self.chain.destroy();

        info!("Frame orchestrator destroyed");
    }
}

/// The window's drawable extent, pumping events until it is non-zero.
fn wait_for_drawable<W: DrawableWindow>(window: &mut W) -> RendererResult<Extent> {
    let mut extent = window.drawable_extent();
    while extent.is_zero() {
        if window.should_close() {
            return Err(RendererError::WindowClosed);
        }
        window.wait_events();
        extent = window.drawable_extent();
    }
    Ok(extent)
}
