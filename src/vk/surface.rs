// Surface (VK_KHR_surface) - platform window connection

use anyhow::{Context, Result};
use ash::vk;
use std::sync::Arc;

use super::handle::{impl_as_raw, Handle};
use super::instance::Instance;
use super::physical::PhysicalDevice;
use super::window::Window;

pub struct Surface {
    handle: Handle<vk::SurfaceKHR>,
    instance: Arc<Instance>,
}

impl Surface {
    pub fn create(instance: &Arc<Instance>, window: &Window) -> Result<Self> {
        let raw = unsafe {
            ash_window::create_surface(
                instance.entry(),
                instance.raw(),
                window.raw_display_handle(),
                window.raw_window_handle(),
                None,
            )
        }
        .context("Failed to create window surface")?;

        log::debug!("Created surface {:?}", raw);
        Ok(Self {
            handle: Handle::new(raw),
            instance: instance.clone(),
        })
    }

    pub fn raw(&self) -> vk::SurfaceKHR {
        self.handle.raw()
    }

    pub fn instance(&self) -> &Arc<Instance> {
        &self.instance
    }
}

impl_as_raw!(Surface, vk::SurfaceKHR);

impl Drop for Surface {
    fn drop(&mut self) {
        if let Some(raw) = self.handle.take() {
            unsafe { self.instance.surface_loader().destroy_surface(raw, None) };
        }
    }
}

/// What a physical device can do with a surface
#[derive(Debug, Clone, Default)]
pub struct SurfaceAttributes {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SurfaceAttributes {
    pub fn query(physical: &PhysicalDevice, surface: &Surface) -> Result<Self> {
        let loader = surface.instance().surface_loader();
        let pdev = physical.raw();
        let raw = surface.raw();

        unsafe {
            Ok(Self {
                capabilities: loader
                    .get_physical_device_surface_capabilities(pdev, raw)
                    .context("Failed to query surface capabilities")?,
                formats: loader
                    .get_physical_device_surface_formats(pdev, raw)
                    .context("Failed to query surface formats")?,
                present_modes: loader
                    .get_physical_device_surface_present_modes(pdev, raw)
                    .context("Failed to query present modes")?,
            })
        }
    }

    /// A swapchain needs at least one format and one present mode
    pub fn can_present(&self) -> bool {
        !self.formats.is_empty() && !self.present_modes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attributes(formats: usize, present_modes: usize) -> SurfaceAttributes {
        SurfaceAttributes {
            capabilities: vk::SurfaceCapabilitiesKHR::default(),
            formats: vec![
                vk::SurfaceFormatKHR {
                    format: vk::Format::B8G8R8A8_SRGB,
                    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
                };
                formats
            ],
            present_modes: vec![vk::PresentModeKHR::FIFO; present_modes],
        }
    }

    #[test]
    fn present_needs_formats_and_modes() {
        assert!(attributes(1, 1).can_present());
        assert!(attributes(2, 3).can_present());
        assert!(!attributes(0, 1).can_present());
        assert!(!attributes(1, 0).can_present());
        assert!(!SurfaceAttributes::default().can_present());
    }
}
