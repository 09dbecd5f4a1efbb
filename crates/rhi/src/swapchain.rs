//! Swapchain selection policy.
//!
//! Pure functions that turn what a surface supports into the parameters of a
//! new swapchain. They only look at plain data, so they are unit tested
//! without a GPU.

use ash::vk;
use tracing::{debug, warn};

use framechain_core::{ColorFormat, PresentPreference};

/// Swapchain surface support details.
///
/// Contains information about what the surface supports for swapchain creation.
#[derive(Debug, Clone)]
pub struct SwapchainSupportDetails {
    /// Surface capabilities (min/max image count, extents, transforms, etc.)
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    /// Supported surface formats (format and color space combinations)
    pub formats: Vec<vk::SurfaceFormatKHR>,
    /// Supported present modes (FIFO, MAILBOX, IMMEDIATE, etc.)
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SwapchainSupportDetails {
    /// Checks if the swapchain support is adequate for rendering.
    ///
    /// Returns true if at least one format and one present mode are available.
    #[inline]
    pub fn is_adequate(&self) -> bool {
        !self.formats.is_empty() && !self.present_modes.is_empty()
    }
}

/// The (format, color space) pair a configured [`ColorFormat`] stands for.
pub fn preferred_surface_format(format: ColorFormat) -> vk::SurfaceFormatKHR {
    let format = match format {
        ColorFormat::Bgra8Srgb => vk::Format::B8G8R8A8_SRGB,
        ColorFormat::Bgra8Unorm => vk::Format::B8G8R8A8_UNORM,
        ColorFormat::Rgba8Srgb => vk::Format::R8G8B8A8_SRGB,
        ColorFormat::Rgba8Unorm => vk::Format::R8G8B8A8_UNORM,
    };
    vk::SurfaceFormatKHR {
        format,
        color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
    }
}

/// Chooses the surface format of the presentable images.
///
/// Picks the exact `preferred` pair when offered, otherwise the first
/// available format. A single `UNDEFINED` entry means the surface accepts
/// anything. Returns `None` if `available` is empty.
pub fn choose_surface_format(
    available: &[vk::SurfaceFormatKHR],
    preferred: vk::SurfaceFormatKHR,
) -> Option<vk::SurfaceFormatKHR> {
    if let [only] = available
        && only.format == vk::Format::UNDEFINED
    {
        return Some(preferred);
    }

    if available
        .iter()
        .any(|f| f.format == preferred.format && f.color_space == preferred.color_space)
    {
        debug!(
            "Selected preferred surface format: {:?} / {:?}",
            preferred.format, preferred.color_space
        );
        return Some(preferred);
    }

    let first = available.first().copied()?;
    warn!(
        "Preferred surface format {:?} unavailable, using {:?} / {:?}",
        preferred.format, first.format, first.color_space
    );
    Some(first)
}

/// Chooses the present mode.
///
/// MAILBOX (no tearing, low latency) when low latency is preferred and the
/// surface offers it, otherwise FIFO, which every surface supports.
pub fn choose_present_mode(
    available: &[vk::PresentModeKHR],
    preference: PresentPreference,
) -> vk::PresentModeKHR {
    if preference == PresentPreference::LowLatency
        && available.contains(&vk::PresentModeKHR::MAILBOX)
    {
        debug!("Selected MAILBOX present mode");
        return vk::PresentModeKHR::MAILBOX;
    }

    debug!("Selected FIFO present mode (vsync)");
    vk::PresentModeKHR::FIFO
}

/// Chooses the swapchain extent (resolution).
///
/// If the current extent is not set (width/height are u32::MAX),
/// clamps the drawable size to the surface's min/max extents.
pub fn choose_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    drawable: vk::Extent2D,
) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }

    let extent = vk::Extent2D {
        width: drawable.width.clamp(
            capabilities.min_image_extent.width,
            capabilities.max_image_extent.width,
        ),
        height: drawable.height.clamp(
            capabilities.min_image_extent.height,
            capabilities.max_image_extent.height,
        ),
    };

    debug!(
        "Calculated extent: {}x{} (drawable: {}x{}, min: {}x{}, max: {}x{})",
        extent.width,
        extent.height,
        drawable.width,
        drawable.height,
        capabilities.min_image_extent.width,
        capabilities.min_image_extent.height,
        capabilities.max_image_extent.width,
        capabilities.max_image_extent.height
    );

    extent
}

/// Determines the number of presentable images to request.
///
/// Defaults to one more than the minimum. Any request is clamped to
/// `[min + 1, max]`; a `max_image_count` of 0 means there is no maximum.
pub fn choose_image_count(capabilities: &vk::SurfaceCapabilitiesKHR, requested: Option<u32>) -> u32 {
    let lower = capabilities.min_image_count + 1;
    let wanted = requested.unwrap_or(lower).max(lower);

    if capabilities.max_image_count > 0 {
        wanted.min(capabilities.max_image_count)
    } else {
        wanted
    }
}

/// The highest sample count not above `requested` that `supported` contains.
pub fn choose_sample_count(
    requested: u32,
    supported: vk::SampleCountFlags,
) -> vk::SampleCountFlags {
    const COUNTS: [vk::SampleCountFlags; 6] = [
        vk::SampleCountFlags::TYPE_64,
        vk::SampleCountFlags::TYPE_32,
        vk::SampleCountFlags::TYPE_16,
        vk::SampleCountFlags::TYPE_8,
        vk::SampleCountFlags::TYPE_4,
        vk::SampleCountFlags::TYPE_2,
    ];

    COUNTS
        .into_iter()
        .filter(|count| count.as_raw() <= requested)
        .find(|&count| supported.contains(count))
        .unwrap_or(vk::SampleCountFlags::TYPE_1)
}
