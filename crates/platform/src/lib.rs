//! Platform abstraction layer for the framechain renderer.
//!
//! This crate provides:
//! - The [`DrawableWindow`] contract consumed by the frame orchestrator
//! - A winit window driven by pumped events
//! - Raw window handles for Vulkan surface creation

mod drawable;
mod window;

pub use drawable::DrawableWindow;
pub use window::Window;
