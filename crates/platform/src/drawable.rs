//! What the frame-presentation core needs from a window.

use framechain_core::Extent;

/// The windowing side of the presentation contract.
///
/// The present chain is sized from [`drawable_extent`](Self::drawable_extent);
/// the frame orchestrator reads the sticky resize flag after each frame and
/// clears it once the chain has been rebuilt.
pub trait DrawableWindow {
    /// Current size of the drawable area in physical pixels. Either dimension
    /// may be zero while the window is minimized.
    fn drawable_extent(&self) -> Extent;

    /// True once the drawable size changed since the flag was last cleared.
    fn resize_pending(&self) -> bool;

    fn clear_resize_pending(&mut self);

    /// True once the user asked for the window to close.
    fn should_close(&self) -> bool;

    /// Block until at least one window event has been processed.
    ///
    /// Only used while the drawable extent is zero, so the caller does not
    /// spin while the window is minimized.
    fn wait_events(&mut self);
}
