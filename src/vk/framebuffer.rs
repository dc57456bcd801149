// Framebuffers

use anyhow::{Context, Result};
use ash::vk;
use std::sync::Arc;

use super::device::Device;
use super::handle::{impl_as_raw, AsRaw, Handle};
use super::refs::{RawRef, Refable};

#[derive(Debug, Clone)]
pub struct FramebufferCreateInfo {
    render_pass: vk::RenderPass,
    attachments: Vec<vk::ImageView>,
    width: u32,
    height: u32,
    layers: u32,
}

impl FramebufferCreateInfo {
    pub fn new(render_pass: &impl AsRaw<vk::RenderPass>, width: u32, height: u32) -> Self {
        Self {
            render_pass: render_pass.as_raw(),
            attachments: Vec::new(),
            width,
            height,
            layers: 1,
        }
    }

    pub fn from_extent(render_pass: &impl AsRaw<vk::RenderPass>, extent: vk::Extent2D) -> Self {
        Self::new(render_pass, extent.width, extent.height)
    }

    pub fn add_attachment(mut self, view: &impl AsRaw<vk::ImageView>) -> Self {
        self.attachments.push(view.as_raw());
        self
    }

    pub fn add_attachments<V: AsRaw<vk::ImageView>>(mut self, views: &[&V]) -> Self {
        self.attachments.extend(views.iter().map(|v| v.as_raw()));
        self
    }

    pub fn set_attachments(mut self, views: &[vk::ImageView]) -> Self {
        self.attachments = views.to_vec();
        self
    }

    pub fn set_layers(mut self, layers: u32) -> Self {
        self.layers = layers;
        self
    }

    fn raw(&self) -> vk::FramebufferCreateInfoBuilder<'_> {
        vk::FramebufferCreateInfo::builder()
            .render_pass(self.render_pass)
            .attachments(&self.attachments)
            .width(self.width)
            .height(self.height)
            .layers(self.layers)
    }
}

pub struct Framebuffer {
    handle: Handle<vk::Framebuffer>,
    device: Arc<Device>,
    extent: vk::Extent2D,
    view: Refable<vk::Framebuffer>,
}

impl Framebuffer {
    pub fn create(device: &Arc<Device>, info: &FramebufferCreateInfo) -> Result<Self> {
        let raw = unsafe { device.raw().create_framebuffer(&info.raw(), None) }
            .context("Failed to create framebuffer")?;
        Ok(Self {
            handle: Handle::new(raw),
            device: device.clone(),
            extent: vk::Extent2D {
                width: info.width,
                height: info.height,
            },
            view: Refable::new(raw),
        })
    }

    pub fn raw(&self) -> vk::Framebuffer {
        self.handle.raw()
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    pub fn reference(&self) -> RawRef<vk::Framebuffer> {
        self.view.reference()
    }
}

impl_as_raw!(Framebuffer, vk::Framebuffer);

impl Drop for Framebuffer {
    fn drop(&mut self) {
        self.view.invalidate();
        if let Some(raw) = self.handle.take() {
            unsafe { self.device.raw().destroy_framebuffer(raw, None) };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle as _;

    #[test]
    fn attachments_and_layers() {
        let pass = Handle::new(vk::RenderPass::from_raw(3));
        let color = Handle::new(vk::ImageView::from_raw(10));
        let depth = Handle::new(vk::ImageView::from_raw(11));
        let extent = vk::Extent2D {
            width: 640,
            height: 480,
        };
        let info = FramebufferCreateInfo::from_extent(&pass, extent)
            .add_attachment(&color)
            .add_attachments(&[&depth]);
        let raw = info.raw();
        assert_eq!(raw.attachment_count, 2);
        assert_eq!(raw.layers, 1);
        assert_eq!(raw.width, 640);
        assert_eq!(raw.render_pass, vk::RenderPass::from_raw(3));

        let info = info.set_attachments(&[vk::ImageView::from_raw(12)]);
        assert_eq!(info.raw().attachment_count, 1);
    }
}
