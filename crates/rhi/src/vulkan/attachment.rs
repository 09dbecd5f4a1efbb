//! Memory-backed render targets.
//!
//! The present chain needs two images of its own per generation: the
//! multisampled color target and the depth target. Both live in GPU-only
//! memory from gpu-allocator.

use ash::vk;
use gpu_allocator::MemoryLocation;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use tracing::{debug, error};

use crate::backend::{AttachmentDesc, AttachmentKind};
use crate::error::{RhiError, RhiResult};
use crate::vulkan::device::Device;

/// Depth formats tried in order of preference.
pub const DEPTH_FORMAT_CANDIDATES: [vk::Format; 3] = [
    vk::Format::D32_SFLOAT,
    vk::Format::D32_SFLOAT_S8_UINT,
    vk::Format::D24_UNORM_S8_UINT,
];

/// An image, its memory and its view.
///
/// # Resource Destruction
///
/// [`GpuAttachment::destroy`] releases, in order:
/// 1. Image view
/// 2. Image
/// 3. Memory allocation
pub struct GpuAttachment {
    pub image: vk::Image,
    pub view: vk::ImageView,
    allocation: Allocation,
}

impl GpuAttachment {
    /// Creates an attachment image as described by `desc`.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The extent has a zero dimension
    /// - Image creation fails
    /// - Memory allocation fails
    /// - Image view creation fails
    pub fn new(device: &Device, desc: &AttachmentDesc) -> RhiResult<Self> {
        let vk::Extent2D { width, height } = desc.extent;
        if width == 0 || height == 0 {
            return Err(RhiError::InvalidHandle(
                "Attachment dimensions must be greater than 0".to_string(),
            ));
        }

        let (usage, aspect, name) = match desc.kind {
            AttachmentKind::Color => (
                vk::ImageUsageFlags::TRANSIENT_ATTACHMENT | vk::ImageUsageFlags::COLOR_ATTACHMENT,
                vk::ImageAspectFlags::COLOR,
                "msaa_color_target",
            ),
            AttachmentKind::Depth => (
                vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
                depth_aspect(desc.format),
                "depth_target",
            ),
        };

        let image_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(desc.format)
            .extent(vk::Extent3D {
                width,
                height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .samples(desc.samples)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let image = unsafe { device.handle().create_image(&image_info, None)? };
        let requirements = unsafe { device.handle().get_image_memory_requirements(image) };

        let allocation = device.allocator().and_then(|mut allocator| {
            allocator
                .allocate(&AllocationCreateDesc {
                    name,
                    requirements,
                    location: MemoryLocation::GpuOnly,
                    linear: false,
                    allocation_scheme: AllocationScheme::GpuAllocatorManaged,
                })
                .map_err(RhiError::from)
        });
        let allocation = match allocation {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { device.handle().destroy_image(image, None) };
                return Err(e);
            }
        };

        let view = unsafe {
            device
                .handle()
                .bind_image_memory(image, allocation.memory(), allocation.offset())
                .and_then(|()| {
                    let view_info = vk::ImageViewCreateInfo::default()
                        .image(image)
                        .view_type(vk::ImageViewType::TYPE_2D)
                        .format(desc.format)
                        .subresource_range(
                            vk::ImageSubresourceRange::default()
                                .aspect_mask(aspect)
                                .base_mip_level(0)
                                .level_count(1)
                                .base_array_layer(0)
                                .layer_count(1),
                        );
                    device.handle().create_image_view(&view_info, None)
                })
        };
        let view = match view {
            Ok(view) => view,
            Err(e) => {
                unsafe { device.handle().destroy_image(image, None) };
                free_allocation(device, allocation);
                return Err(e.into());
            }
        };

        debug!(
            "Created {}: {}x{} ({:?}, {:?})",
            name, width, height, desc.format, desc.samples
        );

        Ok(Self {
            image,
            view,
            allocation,
        })
    }

    /// Destroys the view, the image and frees the memory.
    pub fn destroy(self, device: &Device) {
        unsafe {
            device.handle().destroy_image_view(self.view, None);
            device.handle().destroy_image(self.image, None);
        }
        free_allocation(device, self.allocation);
    }
}

fn free_allocation(device: &Device, allocation: Allocation) {
    let result = device
        .allocator()
        .and_then(|mut allocator| allocator.free(allocation).map_err(RhiError::from));
    if let Err(e) = result {
        error!("Failed to free attachment allocation: {:?}", e);
    }
}

fn depth_aspect(format: vk::Format) -> vk::ImageAspectFlags {
    match format {
        vk::Format::D32_SFLOAT_S8_UINT | vk::Format::D24_UNORM_S8_UINT => {
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        }
        _ => vk::ImageAspectFlags::DEPTH,
    }
}

/// First format in [`DEPTH_FORMAT_CANDIDATES`] whose optimal-tiling features
/// include depth/stencil attachment use.
pub fn find_depth_format(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
) -> Option<vk::Format> {
    DEPTH_FORMAT_CANDIDATES.into_iter().find(|&format| {
        let properties =
            unsafe { instance.get_physical_device_format_properties(physical_device, format) };
        properties
            .optimal_tiling_features
            .contains(vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_depth_candidates_are_depth_formats() {
        assert_eq!(DEPTH_FORMAT_CANDIDATES[0], vk::Format::D32_SFLOAT);
        assert!(DEPTH_FORMAT_CANDIDATES.iter().all(|format| matches!(
            *format,
            vk::Format::D32_SFLOAT | vk::Format::D32_SFLOAT_S8_UINT | vk::Format::D24_UNORM_S8_UINT
        )));
    }

    #[test]
    fn test_depth_aspect_includes_stencil() {
        assert_eq!(depth_aspect(vk::Format::D32_SFLOAT), vk::ImageAspectFlags::DEPTH);
        assert!(depth_aspect(vk::Format::D24_UNORM_S8_UINT).contains(vk::ImageAspectFlags::STENCIL));
    }
}
