//! Window management using winit.
//!
//! [`Window`] owns the winit event loop and drives it with the pump-events
//! extension, so the application keeps its own frame loop instead of handing
//! control to `EventLoop::run_app`.

use std::time::Duration;

use raw_window_handle::{
    DisplayHandle, HandleError, HasDisplayHandle, HasWindowHandle, WindowHandle,
};
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, KeyEvent, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::platform::pump_events::{EventLoopExtPumpEvents, PumpStatus};
use winit::window::{Window as WinitWindow, WindowAttributes, WindowId};

use framechain_core::{Error, Extent, Result, WindowConfig};

use crate::drawable::DrawableWindow;

/// Upper bound on one pump while waiting for the native window to appear.
const STARTUP_PUMP_TIMEOUT: Duration = Duration::from_millis(16);

/// Event handler state shared with winit during a pump.
struct WindowState {
    attributes: WindowAttributes,
    window: Option<WinitWindow>,
    extent: Extent,
    resize_pending: bool,
    close_requested: bool,
    creation_error: Option<String>,
}

impl ApplicationHandler for WindowState {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        match event_loop.create_window(self.attributes.clone()) {
            Ok(window) => {
                let size = window.inner_size();
                self.extent = Extent::new(size.width, size.height);
                tracing::info!("Window created: {}", self.extent);
                self.window = Some(window);
            }
            Err(e) => {
                tracing::error!("Failed to create window: {}", e);
                self.creation_error = Some(e.to_string());
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                tracing::info!("Close requested");
                self.close_requested = true;
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                let extent = Extent::new(size.width, size.height);
                if extent != self.extent {
                    tracing::debug!("Window resized: {} -> {}", self.extent, extent);
                    self.extent = extent;
                    self.resize_pending = true;
                }
            }
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(KeyCode::Escape),
                        state: ElementState::Pressed,
                        ..
                    },
                ..
            } => {
                tracing::info!("Escape pressed, closing");
                self.close_requested = true;
                event_loop.exit();
            }
            _ => {}
        }
    }
}

/// A native window plus the event loop that feeds it.
pub struct Window {
    event_loop: EventLoop<()>,
    state: WindowState,
}

impl Window {
    /// Opens a window as described by `config` and pumps events until the
    /// native window exists.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Window`] if the event loop cannot be created, the
    /// window cannot be created, or the loop exits before the window appears.
    pub fn new(config: &WindowConfig) -> Result<Self> {
        let event_loop = EventLoop::new().map_err(|e| Error::Window(e.to_string()))?;
        event_loop.set_control_flow(ControlFlow::Poll);

        let attributes = WindowAttributes::default()
            .with_title(config.title.clone())
            .with_inner_size(PhysicalSize::new(config.width, config.height))
            .with_resizable(true);

        let mut window = Self {
            event_loop,
            state: WindowState {
                attributes,
                window: None,
                extent: Extent::new(config.width, config.height),
                resize_pending: false,
                close_requested: false,
                creation_error: None,
            },
        };

        while window.state.window.is_none() {
            let status = window.pump(Some(STARTUP_PUMP_TIMEOUT));
            if let Some(message) = window.state.creation_error.take() {
                return Err(Error::Window(message));
            }
            if let PumpStatus::Exit(code) = status {
                return Err(Error::Window(format!(
                    "event loop exited with code {code} before the window was created"
                )));
            }
        }

        Ok(window)
    }

    fn pump(&mut self, timeout: Option<Duration>) -> PumpStatus {
        self.event_loop.pump_app_events(timeout, &mut self.state)
    }

    /// Processes pending events without blocking. Returns false once the
    /// event loop has exited.
    pub fn poll_events(&mut self) -> bool {
        matches!(self.pump(Some(Duration::ZERO)), PumpStatus::Continue)
    }

    /// The underlying winit window.
    pub fn inner(&self) -> Option<&WinitWindow> {
        self.state.window.as_ref()
    }

    pub fn request_redraw(&self) {
        if let Some(window) = &self.state.window {
            window.request_redraw();
        }
    }
}

impl DrawableWindow for Window {
    fn drawable_extent(&self) -> Extent {
        match &self.state.window {
            Some(window) => {
                let size = window.inner_size();
                Extent::new(size.width, size.height)
            }
            None => self.state.extent,
        }
    }

    fn resize_pending(&self) -> bool {
        self.state.resize_pending
    }

    fn clear_resize_pending(&mut self) {
        self.state.resize_pending = false;
    }

    /// True after the close button or Escape was pressed.
    fn should_close(&self) -> bool {
        self.state.close_requested
    }

    fn wait_events(&mut self) {
        self.event_loop.set_control_flow(ControlFlow::Wait);
        let status = self.pump(None);
        self.event_loop.set_control_flow(ControlFlow::Poll);

        if let PumpStatus::Exit(code) = status {
            tracing::debug!("Event loop exited with code {} while waiting", code);
        }
    }
}

impl HasWindowHandle for Window {
    fn window_handle(&self) -> std::result::Result<WindowHandle<'_>, HandleError> {
        self.state
            .window
            .as_ref()
            .ok_or(HandleError::Unavailable)?
            .window_handle()
    }
}

impl HasDisplayHandle for Window {
    fn display_handle(&self) -> std::result::Result<DisplayHandle<'_>, HandleError> {
        self.event_loop.display_handle()
    }
}
