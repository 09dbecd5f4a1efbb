//! Vulkan implementation of the presentation backend.

pub mod attachment;
pub mod command;
pub mod device;
pub mod instance;
pub mod physical_device;
pub mod render_pass;
pub mod surface;

mod backend;

pub use backend::VulkanBackend;
