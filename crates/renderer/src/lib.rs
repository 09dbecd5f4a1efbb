//! Frame-presentation core.
//!
//! This crate drives frames onto the screen:
//! - The present chain and its recreation on resize or stale surfaces
//! - Frame orchestration across frames in flight
//! - Render-system plugins recorded into the open render pass

mod error;
mod slot;

pub mod frame_orchestrator;
pub mod present_chain;
pub mod render_system;

#[cfg(test)]
mod testing;

pub use error::{RendererError, RendererResult};
pub use frame_orchestrator::{FrameOrchestrator, FrameState};
pub use present_chain::PresentChain;
pub use render_system::{FrameSnapshot, ObjectRenderSystem, RenderSystem};
pub use slot::SlotCursor;
