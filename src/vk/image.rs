// Images and image views
//
// Swapchain images are wrapped without ownership; images made through
// Image::create own their handle and may be bound to DeviceMemory.

use anyhow::{Context, Result};
use ash::vk;
use std::sync::Arc;

use super::device::Device;
use super::error::BindError;
use super::handle::{impl_as_raw, Handle};
use super::memory::{DeviceMemory, MemoryView};
use super::refs::RawRef;
use super::size::Offset;

/// 2D image create info
#[derive(Debug, Clone)]
pub struct ImageCreateInfo {
    format: vk::Format,
    extent: vk::Extent2D,
    usage: vk::ImageUsageFlags,
    mip_levels: u32,
    array_layers: u32,
    samples: vk::SampleCountFlags,
    tiling: vk::ImageTiling,
}

impl ImageCreateInfo {
    pub fn new(format: vk::Format, extent: vk::Extent2D, usage: vk::ImageUsageFlags) -> Self {
        Self {
            format,
            extent,
            usage,
            mip_levels: 1,
            array_layers: 1,
            samples: vk::SampleCountFlags::TYPE_1,
            tiling: vk::ImageTiling::OPTIMAL,
        }
    }

    pub fn mip_levels(mut self, levels: u32) -> Self {
        self.mip_levels = levels;
        self
    }

    pub fn array_layers(mut self, layers: u32) -> Self {
        self.array_layers = layers;
        self
    }

    pub fn samples(mut self, samples: vk::SampleCountFlags) -> Self {
        self.samples = samples;
        self
    }

    pub fn tiling(mut self, tiling: vk::ImageTiling) -> Self {
        self.tiling = tiling;
        self
    }

    fn raw(&self) -> vk::ImageCreateInfoBuilder<'_> {
        vk::ImageCreateInfo::builder()
            .image_type(vk::ImageType::TYPE_2D)
            .format(self.format)
            .extent(vk::Extent3D {
                width: self.extent.width,
                height: self.extent.height,
                depth: 1,
            })
            .mip_levels(self.mip_levels)
            .array_layers(self.array_layers)
            .samples(self.samples)
            .tiling(self.tiling)
            .usage(self.usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED)
    }
}

pub struct Image {
    handle: Handle<vk::Image>,
    device: Arc<Device>,
    format: vk::Format,
    extent: vk::Extent2D,
    owned: bool,
    memory: RawRef<MemoryView>,
}

impl Image {
    /// Wrap an image owned elsewhere (swapchain images)
    pub fn from_handle(
        device: &Arc<Device>,
        raw: vk::Image,
        format: vk::Format,
        extent: vk::Extent2D,
    ) -> Self {
        Self {
            handle: Handle::new(raw),
            device: device.clone(),
            format,
            extent,
            owned: false,
            memory: RawRef::empty(),
        }
    }

    pub fn create(device: &Arc<Device>, info: &ImageCreateInfo) -> Result<Self> {
        let raw = unsafe { device.raw().create_image(&info.raw(), None) }
            .context("Failed to create image")?;
        Ok(Self {
            handle: Handle::new(raw),
            device: device.clone(),
            format: info.format,
            extent: info.extent,
            owned: true,
            memory: RawRef::empty(),
        })
    }

    pub fn raw(&self) -> vk::Image {
        self.handle.raw()
    }

    pub fn format(&self) -> vk::Format {
        self.format
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    pub fn memory_requirements(&self) -> vk::MemoryRequirements {
        unsafe { self.device.raw().get_image_memory_requirements(self.raw()) }
    }

    pub fn is_bound(&self) -> bool {
        !self.owned || self.memory.has_value()
    }

    pub fn bind(&mut self, memory: &DeviceMemory, offset: u64) -> Result<(), BindError> {
        if !self.owned || self.memory.has_value() {
            return Err(BindError::AlreadyBound);
        }
        let view = memory.reference();
        let Some(view) = view.raw() else {
            return Err(BindError::MemoryDestroyed);
        };
        let reqs = self.memory_requirements();
        if !Offset::new(offset).is_aligned(reqs.alignment) {
            return Err(BindError::AlignmentMismatch {
                offset,
                alignment: reqs.alignment,
            });
        }
        if offset + reqs.size > view.size {
            return Err(BindError::MemoryTooSmall {
                required: reqs.size,
                offset,
                available: view.size,
            });
        }
        unsafe { self.device.raw().bind_image_memory(self.raw(), view.handle, offset) }
            .map_err(BindError::from)?;
        self.memory = memory.reference();
        Ok(())
    }
}

impl_as_raw!(Image, vk::Image);

impl Drop for Image {
    fn drop(&mut self) {
        if let Some(raw) = self.handle.take() {
            if self.owned {
                unsafe { self.device.raw().destroy_image(raw, None) };
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ImageViewCreateInfo {
    image: vk::Image,
    view_type: vk::ImageViewType,
    format: vk::Format,
    components: vk::ComponentMapping,
    subresource_range: vk::ImageSubresourceRange,
}

impl ImageViewCreateInfo {
    pub fn new(image: vk::Image, format: vk::Format) -> Self {
        Self {
            image,
            view_type: vk::ImageViewType::TYPE_2D,
            format,
            components: vk::ComponentMapping {
                r: vk::ComponentSwizzle::IDENTITY,
                g: vk::ComponentSwizzle::IDENTITY,
                b: vk::ComponentSwizzle::IDENTITY,
                a: vk::ComponentSwizzle::IDENTITY,
            },
            subresource_range: vk::ImageSubresourceRange {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            },
        }
    }

    pub fn for_image(image: &Image) -> Self {
        Self::new(image.raw(), image.format())
    }

    pub fn set_image(mut self, image: vk::Image) -> Self {
        self.image = image;
        self
    }

    pub fn set_view_type(mut self, view_type: vk::ImageViewType) -> Self {
        self.view_type = view_type;
        self
    }

    pub fn set_format(mut self, format: vk::Format) -> Self {
        self.format = format;
        self
    }

    pub fn set_components(mut self, components: vk::ComponentMapping) -> Self {
        self.components = components;
        self
    }

    pub fn set_subresource_range(mut self, range: vk::ImageSubresourceRange) -> Self {
        self.subresource_range = range;
        self
    }

    pub fn set_aspect(mut self, aspect: vk::ImageAspectFlags) -> Self {
        self.subresource_range.aspect_mask = aspect;
        self
    }

    fn raw(&self) -> vk::ImageViewCreateInfoBuilder<'_> {
        vk::ImageViewCreateInfo::builder()
            .image(self.image)
            .view_type(self.view_type)
            .format(self.format)
            .components(self.components)
            .subresource_range(self.subresource_range)
    }
}

pub struct ImageView {
    handle: Handle<vk::ImageView>,
    device: Arc<Device>,
    format: vk::Format,
}

impl ImageView {
    pub fn create(device: &Arc<Device>, info: &ImageViewCreateInfo) -> Result<Self> {
        let raw = unsafe { device.raw().create_image_view(&info.raw(), None) }
            .context("Failed to create image view")?;
        Ok(Self {
            handle: Handle::new(raw),
            device: device.clone(),
            format: info.format,
        })
    }

    pub fn raw(&self) -> vk::ImageView {
        self.handle.raw()
    }

    pub fn format(&self) -> vk::Format {
        self.format
    }
}

impl_as_raw!(ImageView, vk::ImageView);

impl Drop for ImageView {
    fn drop(&mut self) {
        if let Some(raw) = self.handle.take() {
            unsafe { self.device.raw().destroy_image_view(raw, None) };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle as _;

    #[test]
    fn view_defaults() {
        let info = ImageViewCreateInfo::new(vk::Image::from_raw(1), vk::Format::R8G8B8A8_UNORM);
        let raw = info.raw();
        assert_eq!(raw.view_type, vk::ImageViewType::TYPE_2D);
        assert_eq!(raw.components.r, vk::ComponentSwizzle::IDENTITY);
        assert_eq!(raw.subresource_range.aspect_mask, vk::ImageAspectFlags::COLOR);
        assert_eq!(raw.subresource_range.level_count, 1);
        assert_eq!(raw.subresource_range.layer_count, 1);
    }

    #[test]
    fn depth_view_aspect() {
        let info = ImageViewCreateInfo::new(vk::Image::from_raw(1), vk::Format::D32_SFLOAT)
            .set_aspect(vk::ImageAspectFlags::DEPTH);
        assert_eq!(info.raw().subresource_range.aspect_mask, vk::ImageAspectFlags::DEPTH);
    }

    #[test]
    fn image_info_is_2d_single_level() {
        let info = ImageCreateInfo::new(
            vk::Format::D32_SFLOAT,
            vk::Extent2D { width: 8, height: 4 },
            vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
        );
        let raw = info.raw();
        assert_eq!(raw.image_type, vk::ImageType::TYPE_2D);
        assert_eq!(raw.extent.depth, 1);
        assert_eq!(raw.mip_levels, 1);
        assert_eq!(raw.initial_layout, vk::ImageLayout::UNDEFINED);
    }
}
