// Window - winit window plus the extent math swapchains need

use anyhow::{Context, Result};
use ash::vk;
use raw_window_handle::{HasRawDisplayHandle, HasRawWindowHandle, RawDisplayHandle, RawWindowHandle};
use std::sync::Arc;
use winit::dpi::PhysicalSize;
use winit::event_loop::ActiveEventLoop;
use winit::window::WindowAttributes;

#[derive(Clone)]
pub struct Window {
    inner: Arc<winit::window::Window>,
}

impl Window {
    pub fn create(
        event_loop: &ActiveEventLoop,
        title: &str,
        width: u32,
        height: u32,
        resizable: bool,
    ) -> Result<Self> {
        let attributes = WindowAttributes::default()
            .with_title(title)
            .with_inner_size(PhysicalSize::new(width, height))
            .with_resizable(resizable);

        let inner = event_loop
            .create_window(attributes)
            .context("Failed to create window")?;

        log::info!("Created window '{}' {}x{}", title, width, height);
        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    pub fn winit(&self) -> &winit::window::Window {
        &self.inner
    }

    /// Framebuffer size in pixels
    pub fn extent(&self) -> vk::Extent2D {
        let size = self.inner.inner_size();
        vk::Extent2D {
            width: size.width,
            height: size.height,
        }
    }

    /// Swapchain extent for these surface capabilities
    pub fn extent_for(&self, capabilities: &vk::SurfaceCapabilitiesKHR) -> vk::Extent2D {
        clamp_extent(capabilities, self.extent())
    }

    pub fn is_minimized(&self) -> bool {
        let extent = self.extent();
        extent.width == 0 || extent.height == 0
    }

    pub fn raw_display_handle(&self) -> RawDisplayHandle {
        self.inner.raw_display_handle()
    }

    pub fn raw_window_handle(&self) -> RawWindowHandle {
        self.inner.raw_window_handle()
    }

    pub fn request_redraw(&self) {
        self.inner.request_redraw();
    }
}

/// `current_extent` wins unless the surface leaves it to the window (u32::MAX)
pub fn clamp_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    window: vk::Extent2D,
) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }
    vk::Extent2D {
        width: window.width.clamp(
            capabilities.min_image_extent.width,
            capabilities.max_image_extent.width,
        ),
        height: window.height.clamp(
            capabilities.min_image_extent.height,
            capabilities.max_image_extent.height,
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(current: (u32, u32)) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: current.0,
                height: current.1,
            },
            min_image_extent: vk::Extent2D {
                width: 64,
                height: 64,
            },
            max_image_extent: vk::Extent2D {
                width: 1024,
                height: 1024,
            },
            ..Default::default()
        }
    }

    #[test]
    fn current_extent_is_used() {
        let extent = clamp_extent(&caps((800, 600)), vk::Extent2D { width: 10, height: 10 });
        assert_eq!((extent.width, extent.height), (800, 600));
    }

    #[test]
    fn window_size_is_clamped() {
        let extent = clamp_extent(
            &caps((u32::MAX, u32::MAX)),
            vk::Extent2D {
                width: 4000,
                height: 10,
            },
        );
        assert_eq!((extent.width, extent.height), (1024, 64));
    }
}
