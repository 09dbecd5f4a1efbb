//! Per-frame synchronization primitives.
//!
//! Each frame slot owns three signals:
//! - **image available** (semaphore): signaled by the presentation engine
//!   once the acquired image may be written
//! - **render finished** (semaphore): signaled by the graphics queue once the
//!   frame's work is done, and waited on by presentation
//! - **in flight** (fence): signaled with the submission, waited on by the
//!   CPU before the slot is reused
//!
//! # Usage Pattern
//!
//! ```text
//! 1. Wait for in_flight (CPU waits for the slot's previous submission)
//! 2. Acquire an image (signals image_available)
//! 3. Reset in_flight
//! 4. Submit: wait image_available, signal render_finished + in_flight
//! 5. Present: wait render_finished
//! ```

use tracing::debug;

use crate::backend::PresentBackend;
use crate::error::RhiResult;
use crate::handle::{FenceHandle, SemaphoreHandle};

/// Synchronization primitives of one frame slot.
///
/// Handles are plain values; call [`FrameSync::destroy`] with the backend
/// that created them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSync {
    image_available: SemaphoreHandle,
    render_finished: SemaphoreHandle,
    in_flight: FenceHandle,
}

impl FrameSync {
    /// Creates a new set of frame synchronization primitives.
    ///
    /// The in-flight fence is created in the signaled state so the first
    /// wait on a fresh slot returns immediately.
    ///
    /// # Errors
    ///
    /// Returns an error if any synchronization object creation fails. Objects
    /// created before the failure are destroyed.
    pub fn new<B: PresentBackend + ?Sized>(backend: &B) -> RhiResult<Self> {
        let image_available = backend.create_semaphore()?;
        let render_finished = match backend.create_semaphore() {
            Ok(semaphore) => semaphore,
            Err(e) => {
                backend.destroy_semaphore(image_available);
                return Err(e);
            }
        };
        let in_flight = match backend.create_fence(true) {
            Ok(fence) => fence,
            Err(e) => {
                backend.destroy_semaphore(render_finished);
                backend.destroy_semaphore(image_available);
                return Err(e);
            }
        };

        debug!("Created frame synchronization primitives");

        Ok(Self {
            image_available,
            render_finished,
            in_flight,
        })
    }

    /// Signaled when the acquired image may be written.
    #[inline]
    pub fn image_available(&self) -> SemaphoreHandle {
        self.image_available
    }

    /// Signaled when the slot's rendering work has completed on the GPU.
    #[inline]
    pub fn render_finished(&self) -> SemaphoreHandle {
        self.render_finished
    }

    /// Signaled when the slot's submission has finished executing.
    #[inline]
    pub fn in_flight(&self) -> FenceHandle {
        self.in_flight
    }

    /// Destroys all three primitives. The GPU must no longer use them.
    pub fn destroy<B: PresentBackend + ?Sized>(self, backend: &B) {
        backend.destroy_fence(self.in_flight);
        backend.destroy_semaphore(self.render_finished);
        backend.destroy_semaphore(self.image_available);
        debug!("Destroyed frame synchronization primitives");
    }
}
