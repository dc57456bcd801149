// Swapchain - Window presentation
//
// Manages the chain of images we render to and present to the screen.
// SwapchainCreateInfo only accepts values the surface reports as supported.

use anyhow::{Context, Result};
use ash::prelude::VkResult;
use ash::vk;
use std::sync::Arc;

use super::device::Device;
use super::framebuffer::{Framebuffer, FramebufferCreateInfo};
use super::handle::{impl_as_raw, AsRaw, Handle};
use super::image::{Image, ImageView, ImageViewCreateInfo};
use super::render_pass::RenderPass;
use super::sync::{Fence, Semaphore};
use super::surface::SurfaceAttributes;

#[derive(Debug, Clone)]
pub struct SwapchainCreateInfo {
    attributes: SurfaceAttributes,
    surface: vk::SurfaceKHR,
    image_count: u32,
    format: vk::Format,
    color_space: vk::ColorSpaceKHR,
    extent: vk::Extent2D,
    array_layers: u32,
    usage: vk::ImageUsageFlags,
    sharing_mode: vk::SharingMode,
    queue_family_indices: Vec<u32>,
    pre_transform: vk::SurfaceTransformFlagsKHR,
    composite_alpha: vk::CompositeAlphaFlagsKHR,
    present_mode: vk::PresentModeKHR,
    clipped: bool,
    old_swapchain: vk::SwapchainKHR,
}

impl SwapchainCreateInfo {
    /// Start from the first supported format and present mode.
    /// `share` lists the queue families that use the images.
    pub fn new(
        attributes: SurfaceAttributes,
        surface: &impl AsRaw<vk::SurfaceKHR>,
        share: &[u32],
    ) -> Result<Self> {
        let format = *attributes
            .formats
            .first()
            .context("Surface reports no formats")?;
        let present_mode = *attributes
            .present_modes
            .first()
            .context("Surface reports no present modes")?;
        let caps = attributes.capabilities;

        let extent = if caps.current_extent.width != u32::MAX {
            caps.current_extent
        } else {
            caps.min_image_extent
        };

        let info = Self {
            surface: surface.as_raw(),
            image_count: caps.min_image_count.max(1),
            format: format.format,
            color_space: format.color_space,
            extent,
            array_layers: 1,
            usage: vk::ImageUsageFlags::COLOR_ATTACHMENT,
            sharing_mode: vk::SharingMode::EXCLUSIVE,
            queue_family_indices: Vec::new(),
            pre_transform: caps.current_transform,
            composite_alpha: vk::CompositeAlphaFlagsKHR::OPAQUE,
            present_mode,
            clipped: true,
            old_swapchain: vk::SwapchainKHR::null(),
            attributes,
        };
        Ok(info.set_queue_family_indices(share))
    }

    fn caps(&self) -> &vk::SurfaceCapabilitiesKHR {
        &self.attributes.capabilities
    }

    pub fn set_image_count(mut self, count: u32) -> Self {
        let caps = self.caps();
        let too_many = caps.max_image_count != 0 && count > caps.max_image_count;
        if count < caps.min_image_count || too_many {
            log::debug!(
                "Image count {} outside {}..={}, keeping {}",
                count,
                caps.min_image_count,
                caps.max_image_count,
                self.image_count
            );
            return self;
        }
        self.image_count = count;
        self
    }

    pub fn set_image_format(mut self, format: vk::Format) -> Self {
        if self.attributes.formats.iter().any(|f| f.format == format) {
            self.format = format;
        } else {
            log::debug!("Surface format {:?} not supported", format);
        }
        self
    }

    /// First supported format from `formats`, with the color space it is reported in
    pub fn prefer_format(mut self, formats: &[vk::Format]) -> Self {
        let found = formats.iter().find_map(|&format| {
            self.attributes
                .formats
                .iter()
                .find(|f| f.format == format)
                .copied()
        });
        match found {
            Some(surface_format) => {
                self.format = surface_format.format;
                self.color_space = surface_format.color_space;
            }
            None => log::debug!("None of {:?} supported, keeping {:?}", formats, self.format),
        }
        self
    }

    /// Only accepted when paired with the current format
    pub fn set_image_color_space(mut self, color_space: vk::ColorSpaceKHR) -> Self {
        let supported = self
            .attributes
            .formats
            .iter()
            .any(|f| f.format == self.format && f.color_space == color_space);
        if supported {
            self.color_space = color_space;
        } else {
            log::debug!("Color space {:?} not supported with {:?}", color_space, self.format);
        }
        self
    }

    pub fn set_image_extent(mut self, extent: vk::Extent2D) -> Self {
        if extent.width == 0 || extent.height == 0 {
            log::debug!("Ignoring zero swapchain extent {:?}", extent);
            return self;
        }
        let (min, max) = (self.caps().min_image_extent, self.caps().max_image_extent);
        self.extent = vk::Extent2D {
            width: extent.width.clamp(min.width, max.width.max(min.width)),
            height: extent.height.clamp(min.height, max.height.max(min.height)),
        };
        self
    }

    pub fn set_image_array_layers(mut self, layers: u32) -> Self {
        if layers == 0 || layers > self.caps().max_image_array_layers {
            log::debug!("Array layer count {} not supported", layers);
            return self;
        }
        self.array_layers = layers;
        self
    }

    pub fn set_image_usage(mut self, usage: vk::ImageUsageFlags) -> Self {
        if self.caps().supported_usage_flags.contains(usage) {
            self.usage = usage;
        } else {
            log::debug!("Image usage {:?} not supported", usage);
        }
        self
    }

    pub fn set_image_sharing_mode(mut self, mode: vk::SharingMode) -> Self {
        self.sharing_mode = mode;
        self
    }

    /// More than one distinct family switches to CONCURRENT sharing
    pub fn set_queue_family_indices(mut self, indices: &[u32]) -> Self {
        let mut unique = Vec::with_capacity(indices.len());
        for &index in indices {
            if !unique.contains(&index) {
                unique.push(index);
            }
        }
        self.sharing_mode = if unique.len() > 1 {
            vk::SharingMode::CONCURRENT
        } else {
            vk::SharingMode::EXCLUSIVE
        };
        self.queue_family_indices = unique;
        self
    }

    pub fn set_present_mode(mut self, mode: vk::PresentModeKHR) -> Self {
        if self.attributes.present_modes.contains(&mode) {
            self.present_mode = mode;
        } else {
            log::debug!("Present mode {:?} not supported", mode);
        }
        self
    }

    /// First supported mode from `modes`, in order
    pub fn prefer_present_mode(mut self, modes: &[vk::PresentModeKHR]) -> Self {
        match modes
            .iter()
            .find(|mode| self.attributes.present_modes.contains(*mode))
        {
            Some(&mode) => self.present_mode = mode,
            None => log::debug!("None of {:?} supported, keeping {:?}", modes, self.present_mode),
        }
        self
    }

    pub fn set_clipped(mut self, clipped: bool) -> Self {
        self.clipped = clipped;
        self
    }

    pub fn set_old_swapchain(mut self, old: &impl AsRaw<vk::SwapchainKHR>) -> Self {
        self.old_swapchain = old.as_raw();
        self
    }

    pub fn image_count(&self) -> u32 {
        self.image_count
    }

    pub fn format(&self) -> vk::Format {
        self.format
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    pub fn present_mode(&self) -> vk::PresentModeKHR {
        self.present_mode
    }

    fn raw(&self) -> vk::SwapchainCreateInfoKHRBuilder<'_> {
        vk::SwapchainCreateInfoKHR::builder()
            .surface(self.surface)
            .min_image_count(self.image_count)
            .image_format(self.format)
            .image_color_space(self.color_space)
            .image_extent(self.extent)
            .image_array_layers(self.array_layers)
            .image_usage(self.usage)
            .image_sharing_mode(self.sharing_mode)
            .queue_family_indices(&self.queue_family_indices)
            .pre_transform(self.pre_transform)
            .composite_alpha(self.composite_alpha)
            .present_mode(self.present_mode)
            .clipped(self.clipped)
            .old_swapchain(self.old_swapchain)
    }
}

/// Result of acquiring the next image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapchainImage {
    pub index: u32,
    pub suboptimal: bool,
}

pub struct Swapchain {
    handle: Handle<vk::SwapchainKHR>,
    device: Arc<Device>,
    images: Vec<Image>,
    image_views: Vec<ImageView>,
    format: vk::Format,
    extent: vk::Extent2D,
}

impl Swapchain {
    pub fn create(device: &Arc<Device>, info: &SwapchainCreateInfo) -> Result<Self> {
        log::info!(
            "Creating swapchain: {}x{} {:?} {:?}",
            info.extent.width,
            info.extent.height,
            info.format,
            info.present_mode
        );
        let loader = device.swapchain_loader();
        let raw = unsafe { loader.create_swapchain(&info.raw(), None) }
            .context("Failed to create swapchain")?;

        // From here on Drop cleans up whatever was created
        let mut swapchain = Self {
            handle: Handle::new(raw),
            device: device.clone(),
            images: Vec::new(),
            image_views: Vec::new(),
            format: info.format,
            extent: info.extent,
        };

        let raws = unsafe { loader.get_swapchain_images(raw) }
            .context("Failed to get swapchain images")?;
        swapchain.images = raws
            .into_iter()
            .map(|image| Image::from_handle(device, image, info.format, info.extent))
            .collect();

        for image in &swapchain.images {
            let view = ImageView::create(device, &ImageViewCreateInfo::for_image(image))
                .context("Failed to create swapchain image view")?;
            swapchain.image_views.push(view);
        }

        log::info!("Created swapchain with {} images", swapchain.images.len());
        Ok(swapchain)
    }

    pub fn raw(&self) -> vk::SwapchainKHR {
        self.handle.raw()
    }

    pub fn images(&self) -> &[Image] {
        &self.images
    }

    pub fn image_views(&self) -> &[ImageView] {
        &self.image_views
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    pub fn format(&self) -> vk::Format {
        self.format
    }

    /// One framebuffer per image view
    pub fn create_framebuffers(&self, render_pass: &RenderPass) -> Result<Vec<Framebuffer>> {
        self.image_views
            .iter()
            .map(|view| {
                let info = FramebufferCreateInfo::from_extent(render_pass, self.extent)
                    .add_attachment(view);
                Framebuffer::create(&self.device, &info)
            })
            .collect()
    }

    /// Acquire the next image. OUT_OF_DATE comes back as an error.
    pub fn next_image(
        &self,
        semaphore: Option<&Semaphore>,
        fence: Option<&Fence>,
        timeout: u64,
    ) -> VkResult<SwapchainImage> {
        let (index, suboptimal) = unsafe {
            self.device.swapchain_loader().acquire_next_image(
                self.raw(),
                timeout,
                semaphore.map(Semaphore::raw).unwrap_or_default(),
                fence.map(Fence::raw).unwrap_or_default(),
            )
        }?;
        Ok(SwapchainImage { index, suboptimal })
    }
}

impl_as_raw!(Swapchain, vk::SwapchainKHR);

impl Drop for Swapchain {
    fn drop(&mut self) {
        self.image_views.clear();
        self.images.clear();
        if let Some(raw) = self.handle.take() {
            unsafe { self.device.swapchain_loader().destroy_swapchain(raw, None) };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle as _;

    fn attributes() -> SurfaceAttributes {
        SurfaceAttributes {
            capabilities: vk::SurfaceCapabilitiesKHR {
                min_image_count: 2,
                max_image_count: 4,
                current_extent: vk::Extent2D { width: 800, height: 600 },
                min_image_extent: vk::Extent2D { width: 1, height: 1 },
                max_image_extent: vk::Extent2D { width: 4096, height: 4096 },
                max_image_array_layers: 1,
                supported_usage_flags: vk::ImageUsageFlags::COLOR_ATTACHMENT
                    | vk::ImageUsageFlags::TRANSFER_DST,
                current_transform: vk::SurfaceTransformFlagsKHR::IDENTITY,
                ..Default::default()
            },
            formats: vec![
                vk::SurfaceFormatKHR {
                    format: vk::Format::B8G8R8A8_UNORM,
                    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
                },
                vk::SurfaceFormatKHR {
                    format: vk::Format::B8G8R8A8_SRGB,
                    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
                },
            ],
            present_modes: vec![vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX],
        }
    }

    fn surface() -> Handle<vk::SurfaceKHR> {
        Handle::new(vk::SurfaceKHR::from_raw(1))
    }

    #[test]
    fn defaults_from_surface() {
        let info = SwapchainCreateInfo::new(attributes(), &surface(), &[0]).unwrap();
        assert_eq!(info.format(), vk::Format::B8G8R8A8_UNORM);
        assert_eq!(info.present_mode(), vk::PresentModeKHR::FIFO);
        assert_eq!(info.image_count(), 2);
        assert_eq!(info.extent(), vk::Extent2D { width: 800, height: 600 });
        assert!(info.clipped);
        assert_eq!(info.composite_alpha, vk::CompositeAlphaFlagsKHR::OPAQUE);
        assert_eq!(info.sharing_mode, vk::SharingMode::EXCLUSIVE);
    }

    #[test]
    fn requires_formats_and_modes() {
        let mut attrs = attributes();
        attrs.formats.clear();
        assert!(SwapchainCreateInfo::new(attrs, &surface(), &[]).is_err());

        let mut attrs = attributes();
        attrs.present_modes.clear();
        assert!(SwapchainCreateInfo::new(attrs, &surface(), &[]).is_err());
    }

    #[test]
    fn image_count_bounds() {
        let info = SwapchainCreateInfo::new(attributes(), &surface(), &[]).unwrap();
        assert_eq!(info.clone().set_image_count(3).image_count(), 3);
        assert_eq!(info.clone().set_image_count(1).image_count(), 2);
        assert_eq!(info.set_image_count(5).image_count(), 2);

        let mut attrs = attributes();
        attrs.capabilities.max_image_count = 0;
        let info = SwapchainCreateInfo::new(attrs, &surface(), &[]).unwrap();
        assert_eq!(info.set_image_count(16).image_count(), 16);
    }

    #[test]
    fn unsupported_values_ignored() {
        let info = SwapchainCreateInfo::new(attributes(), &surface(), &[])
            .unwrap()
            .set_image_format(vk::Format::R8G8B8A8_UNORM)
            .set_present_mode(vk::PresentModeKHR::IMMEDIATE)
            .set_image_color_space(vk::ColorSpaceKHR::DISPLAY_P3_NONLINEAR_EXT)
            .set_image_array_layers(2);
        assert_eq!(info.format(), vk::Format::B8G8R8A8_UNORM);
        assert_eq!(info.present_mode(), vk::PresentModeKHR::FIFO);
        assert_eq!(info.color_space, vk::ColorSpaceKHR::SRGB_NONLINEAR);
        assert_eq!(info.array_layers, 1);

        let info = info.set_image_format(vk::Format::B8G8R8A8_SRGB);
        assert_eq!(info.format(), vk::Format::B8G8R8A8_SRGB);
    }

    #[test]
    fn prefer_present_mode_picks_first_supported() {
        let info = SwapchainCreateInfo::new(attributes(), &surface(), &[])
            .unwrap()
            .prefer_present_mode(&[vk::PresentModeKHR::IMMEDIATE, vk::PresentModeKHR::MAILBOX]);
        assert_eq!(info.present_mode(), vk::PresentModeKHR::MAILBOX);

        let info = info.prefer_present_mode(&[vk::PresentModeKHR::IMMEDIATE]);
        assert_eq!(info.present_mode(), vk::PresentModeKHR::MAILBOX);
    }

    #[test]
    fn prefer_format_picks_first_supported() {
        let info = SwapchainCreateInfo::new(attributes(), &surface(), &[])
            .unwrap()
            .prefer_format(&[vk::Format::R8G8B8A8_SRGB, vk::Format::B8G8R8A8_SRGB]);
        assert_eq!(info.format(), vk::Format::B8G8R8A8_SRGB);
        assert_eq!(info.color_space, vk::ColorSpaceKHR::SRGB_NONLINEAR);

        let info = info.prefer_format(&[vk::Format::R16G16B16A16_SFLOAT]);
        assert_eq!(info.format(), vk::Format::B8G8R8A8_SRGB);
    }

    #[test]
    fn extent_clamped_and_zero_ignored() {
        let info = SwapchainCreateInfo::new(attributes(), &surface(), &[]).unwrap();
        let info = info.set_image_extent(vk::Extent2D { width: 0, height: 100 });
        assert_eq!(info.extent(), vk::Extent2D { width: 800, height: 600 });

        let info = info.set_image_extent(vk::Extent2D { width: 10_000, height: 300 });
        assert_eq!(info.extent(), vk::Extent2D { width: 4096, height: 300 });
    }

    #[test]
    fn queue_families_dedup() {
        let info = SwapchainCreateInfo::new(attributes(), &surface(), &[2, 0, 2, 0]).unwrap();
        assert_eq!(info.queue_family_indices, vec![2, 0]);
        assert_eq!(info.sharing_mode, vk::SharingMode::CONCURRENT);

        let info = info.set_queue_family_indices(&[1, 1]);
        assert_eq!(info.queue_family_indices, vec![1]);
        assert_eq!(info.sharing_mode, vk::SharingMode::EXCLUSIVE);
        assert_eq!(info.raw().surface, vk::SurfaceKHR::from_raw(1));
    }
}
