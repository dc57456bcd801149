// Render passes

use anyhow::{Context, Result};
use ash::vk;
use std::sync::Arc;

use super::device::Device;
use super::handle::{impl_as_raw, Handle};
use super::refs::{RawRef, Refable};
use super::structs::{AttachmentDescription, SubpassDescription};

#[derive(Debug, Clone, Default)]
pub struct RenderPassCreateInfo {
    attachments: Vec<vk::AttachmentDescription>,
    subpasses: Vec<SubpassDescription>,
    dependencies: Vec<vk::SubpassDependency>,
}

impl RenderPassCreateInfo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_attachment(mut self, attachment: AttachmentDescription) -> Self {
        self.attachments.push(attachment.raw());
        self
    }

    pub fn add_subpass(mut self, subpass: SubpassDescription) -> Self {
        self.subpasses.push(subpass);
        self
    }

    pub fn add_dependency(mut self, dependency: vk::SubpassDependency) -> Self {
        self.dependencies.push(dependency);
        self
    }

    pub fn subpass_count(&self) -> usize {
        self.subpasses.len()
    }
}

pub struct RenderPass {
    handle: Handle<vk::RenderPass>,
    device: Arc<Device>,
    view: Refable<vk::RenderPass>,
}

impl RenderPass {
    pub fn create(device: &Arc<Device>, info: &RenderPassCreateInfo) -> Result<Self> {
        if info.subpasses.is_empty() {
            anyhow::bail!("Render pass needs at least one subpass");
        }

        let subpasses: Vec<vk::SubpassDescription> =
            info.subpasses.iter().map(SubpassDescription::raw).collect();

        let create_info = vk::RenderPassCreateInfo::builder()
            .attachments(&info.attachments)
            .subpasses(&subpasses)
            .dependencies(&info.dependencies);

        let raw = unsafe { device.raw().create_render_pass(&create_info, None) }
            .context("Failed to create render pass")?;

        log::debug!(
            "Created render pass: {} attachments, {} subpasses",
            info.attachments.len(),
            subpasses.len()
        );

        Ok(Self {
            handle: Handle::new(raw),
            device: device.clone(),
            view: Refable::new(raw),
        })
    }

    pub fn raw(&self) -> vk::RenderPass {
        self.handle.raw()
    }

    pub fn reference(&self) -> RawRef<vk::RenderPass> {
        self.view.reference()
    }
}

impl_as_raw!(RenderPass, vk::RenderPass);

impl Drop for RenderPass {
    fn drop(&mut self) {
        self.view.invalidate();
        if let Some(raw) = self.handle.take() {
            unsafe { self.device.raw().destroy_render_pass(raw, None) };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn color_pass() -> RenderPassCreateInfo {
        RenderPassCreateInfo::new()
            .add_attachment(
                AttachmentDescription::new(vk::Format::B8G8R8A8_SRGB)
                    .color_depth(vk::AttachmentLoadOp::CLEAR, vk::AttachmentStoreOp::STORE)
                    .final_layout(vk::ImageLayout::PRESENT_SRC_KHR),
            )
            .add_attachment(
                AttachmentDescription::new(vk::Format::D32_SFLOAT)
                    .final_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL),
            )
            .add_subpass(
                SubpassDescription::new()
                    .color(0, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
                    .depth_stencil(1, vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL),
            )
    }

    #[test]
    fn attachments_keep_their_settings() {
        let info = color_pass();
        assert_eq!(info.attachments.len(), 2);
        assert_eq!(info.attachments[0].format, vk::Format::B8G8R8A8_SRGB);
        assert_eq!(info.attachments[0].load_op, vk::AttachmentLoadOp::CLEAR);
        assert_eq!(info.attachments[0].final_layout, vk::ImageLayout::PRESENT_SRC_KHR);
        assert_eq!(info.attachments[1].load_op, vk::AttachmentLoadOp::DONT_CARE);
    }

    #[test]
    fn subpasses_and_dependencies() {
        let dependency = vk::SubpassDependency {
            src_subpass: vk::SUBPASS_EXTERNAL,
            dst_subpass: 0,
            dst_stage_mask: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            ..Default::default()
        };
        let info = color_pass()
            .add_subpass(
                SubpassDescription::new().input(0, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL),
            )
            .add_dependency(dependency);

        assert_eq!(info.subpass_count(), 2);
        assert_eq!(info.dependencies.len(), 1);
        assert_eq!(info.dependencies[0].src_subpass, vk::SUBPASS_EXTERNAL);

        let first = info.subpasses[0].raw();
        assert_eq!(first.color_attachment_count, 1);
        assert!(!first.p_depth_stencil_attachment.is_null());
        assert_eq!(info.subpasses[1].raw().input_attachment_count, 1);
    }

    #[test]
    fn empty_info() {
        let info = RenderPassCreateInfo::new();
        assert_eq!(info.subpass_count(), 0);
        assert!(info.attachments.is_empty());
    }
}
