//! Window surface.

use ash::vk;
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};
use tracing::{debug, info};

use crate::error::{RhiError, RhiResult};
use crate::swapchain::SwapchainSupportDetails;

/// RAII wrapper for a Vulkan surface.
///
/// The instance that created the surface must outlive it, and every swapchain
/// built on it must be destroyed first.
pub struct Surface {
    handle: vk::SurfaceKHR,
    loader: ash::khr::surface::Instance,
}

impl Surface {
    /// Create a surface for a native window.
    ///
    /// # Safety
    ///
    /// `display` and `window` must refer to a live window that outlives the
    /// returned surface.
    pub unsafe fn new(
        entry: &ash::Entry,
        instance: &ash::Instance,
        display: RawDisplayHandle,
        window: RawWindowHandle,
    ) -> RhiResult<Self> {
        let handle = unsafe {
            ash_window::create_surface(entry, instance, display, window, None).map_err(|e| {
                RhiError::SurfaceError(format!("Failed to create Vulkan surface: {e}"))
            })?
        };
        let loader = ash::khr::surface::Instance::new(entry, instance);

        info!("Vulkan surface created");

        Ok(Self { handle, loader })
    }

    #[inline]
    pub fn handle(&self) -> vk::SurfaceKHR {
        self.handle
    }

    /// Whether queue family `family` of `device` can present to this surface.
    pub fn supports_queue_family(&self, device: vk::PhysicalDevice, family: u32) -> bool {
        unsafe {
            self.loader
                .get_physical_device_surface_support(device, family, self.handle)
                .unwrap_or(false)
        }
    }

    /// Queries formats, present modes and capabilities for `device`.
    pub fn support(&self, device: vk::PhysicalDevice) -> RhiResult<SwapchainSupportDetails> {
        let capabilities = unsafe {
            self.loader
                .get_physical_device_surface_capabilities(device, self.handle)?
        };
        let formats = unsafe {
            self.loader
                .get_physical_device_surface_formats(device, self.handle)?
        };
        let present_modes = unsafe {
            self.loader
                .get_physical_device_surface_present_modes(device, self.handle)?
        };

        debug!(
            "Surface support: {} formats, {} present modes, image count {}-{}",
            formats.len(),
            present_modes.len(),
            capabilities.min_image_count,
            if capabilities.max_image_count == 0 {
                "unlimited".to_string()
            } else {
                capabilities.max_image_count.to_string()
            }
        );

        Ok(SwapchainSupportDetails {
            capabilities,
            formats,
            present_modes,
        })
    }
}

impl Drop for Surface {
    fn drop(&mut self) {
        unsafe {
            self.loader.destroy_surface(self.handle, None);
        }
        debug!("Vulkan surface destroyed");
    }
}
