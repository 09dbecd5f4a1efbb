//! The forward render pass and its framebuffers.

use ash::vk;
use tracing::debug;

use crate::backend::RenderPassDesc;
use crate::error::RhiResult;

/// Attachment slots of the forward pass.
pub const COLOR_ATTACHMENT: u32 = 0;
pub const DEPTH_ATTACHMENT: u32 = 1;
pub const RESOLVE_ATTACHMENT: u32 = 2;

/// The attachment descriptions of the forward pass, indexed by the slot
/// constants above.
pub fn attachment_descriptions(desc: &RenderPassDesc) -> [vk::AttachmentDescription; 3] {
    let color = vk::AttachmentDescription::default()
        .format(desc.color_format)
        .samples(desc.samples)
        .load_op(vk::AttachmentLoadOp::CLEAR)
        .store_op(vk::AttachmentStoreOp::STORE)
        .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
        .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
        .initial_layout(vk::ImageLayout::UNDEFINED)
        .final_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);

    let depth = vk::AttachmentDescription::default()
        .format(desc.depth_format)
        .samples(desc.samples)
        .load_op(vk::AttachmentLoadOp::CLEAR)
        .store_op(vk::AttachmentStoreOp::DONT_CARE)
        .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
        .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
        .initial_layout(vk::ImageLayout::UNDEFINED)
        .final_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL);

    let resolve = vk::AttachmentDescription::default()
        .format(desc.color_format)
        .samples(vk::SampleCountFlags::TYPE_1)
        .load_op(vk::AttachmentLoadOp::DONT_CARE)
        .store_op(vk::AttachmentStoreOp::STORE)
        .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
        .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
        .initial_layout(vk::ImageLayout::UNDEFINED)
        .final_layout(vk::ImageLayout::PRESENT_SRC_KHR);

    [color, depth, resolve]
}

/// Creates the single-subpass pass: multisampled color and depth, resolved
/// into the presentable image.
pub fn create_render_pass(device: &ash::Device, desc: &RenderPassDesc) -> RhiResult<vk::RenderPass> {
    let attachments = attachment_descriptions(desc);

    let color_refs = [vk::AttachmentReference {
        attachment: COLOR_ATTACHMENT,
        layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
    }];
    let depth_ref = vk::AttachmentReference {
        attachment: DEPTH_ATTACHMENT,
        layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
    };
    let resolve_refs = [vk::AttachmentReference {
        attachment: RESOLVE_ATTACHMENT,
        layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
    }];

    let subpasses = [vk::SubpassDescription::default()
        .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
        .color_attachments(&color_refs)
        .resolve_attachments(&resolve_refs)
        .depth_stencil_attachment(&depth_ref)];

    // Color and depth writes wait for the previous frame's use of the shared
    // targets and for the image-available semaphore at color output.
    let dependencies = [vk::SubpassDependency::default()
        .src_subpass(vk::SUBPASS_EXTERNAL)
        .dst_subpass(0)
        .src_stage_mask(
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
                | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS,
        )
        .src_access_mask(vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE)
        .dst_stage_mask(
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
                | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
        )
        .dst_access_mask(
            vk::AccessFlags::COLOR_ATTACHMENT_WRITE
                | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
        )];

    let create_info = vk::RenderPassCreateInfo::default()
        .attachments(&attachments)
        .subpasses(&subpasses)
        .dependencies(&dependencies);

    let render_pass = unsafe { device.create_render_pass(&create_info, None)? };

    debug!(
        "Render pass created: color {:?}, depth {:?}, {:?}",
        desc.color_format, desc.depth_format, desc.samples
    );

    Ok(render_pass)
}

/// Creates a framebuffer over `attachments` (color, depth, resolve).
pub fn create_framebuffer(
    device: &ash::Device,
    render_pass: vk::RenderPass,
    attachments: &[vk::ImageView],
    extent: vk::Extent2D,
) -> RhiResult<vk::Framebuffer> {
    let create_info = vk::FramebufferCreateInfo::default()
        .render_pass(render_pass)
        .attachments(attachments)
        .width(extent.width)
        .height(extent.height)
        .layers(1);

    let framebuffer = unsafe { device.create_framebuffer(&create_info, None)? };
    Ok(framebuffer)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn desc() -> RenderPassDesc {
        RenderPassDesc {
            color_format: vk::Format::B8G8R8A8_SRGB,
            depth_format: vk::Format::D32_SFLOAT,
            samples: vk::SampleCountFlags::TYPE_4,
        }
    }

    #[test]
    fn test_resolve_attachment_ends_presentable() {
        let attachments = attachment_descriptions(&desc());
        let resolve = attachments[RESOLVE_ATTACHMENT as usize];
        assert_eq!(resolve.samples, vk::SampleCountFlags::TYPE_1);
        assert_eq!(resolve.final_layout, vk::ImageLayout::PRESENT_SRC_KHR);
        assert_eq!(resolve.store_op, vk::AttachmentStoreOp::STORE);
    }

    #[test]
    fn test_multisampled_attachments_are_cleared() {
        let attachments = attachment_descriptions(&desc());
        for slot in [COLOR_ATTACHMENT, DEPTH_ATTACHMENT] {
            let attachment = attachments[slot as usize];
            assert_eq!(attachment.samples, vk::SampleCountFlags::TYPE_4);
            assert_eq!(attachment.load_op, vk::AttachmentLoadOp::CLEAR);
        }
        assert_eq!(
            attachments[DEPTH_ATTACHMENT as usize].store_op,
            vk::AttachmentStoreOp::DONT_CARE
        );
    }
}
