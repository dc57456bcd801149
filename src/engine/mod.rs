// Engine - process-wide setup and physical device selection
//
// init() sets up logging once. PhysicalDeviceSelector narrows the device
// list down by extension and surface support, then ranks what is left.

use anyhow::Result;
use std::ffi::CStr;
use std::sync::Arc;

use crate::config::Config;
use crate::vk::{Instance, PhysicalDevice, Surface, SurfaceAttributes};

/// Initialize logging. RUST_LOG overrides the configured level.
/// Later calls are no-ops.
pub fn init(config: &Config) {
    let mut builder = env_logger::Builder::new();
    builder.filter_level(config.log_filter());
    builder.parse_default_env();
    if builder.try_init().is_err() {
        log::debug!("Logger already initialized");
    }
}

/// What the selector needs to know about a device
pub trait SelectableDevice {
    type Surface: ?Sized;

    fn supports_extension(&self, extension: &CStr) -> bool;
    fn can_present_to(&self, surface: &Self::Surface) -> bool;
    fn is_discrete(&self) -> bool;
}

impl SelectableDevice for PhysicalDevice {
    type Surface = Surface;

    fn supports_extension(&self, extension: &CStr) -> bool {
        PhysicalDevice::supports_extension(self, extension)
    }

    fn can_present_to(&self, surface: &Surface) -> bool {
        match SurfaceAttributes::query(self, surface) {
            Ok(attributes) => attributes.can_present(),
            Err(e) => {
                log::error!("Surface query failed on {}: {:#}", self.name(), e);
                false
            }
        }
    }

    fn is_discrete(&self) -> bool {
        PhysicalDevice::is_discrete(self)
    }
}

#[derive(Debug, Clone)]
pub struct DeviceRating<D> {
    pub device: D,
    pub rating: u32,
}

pub struct PhysicalDeviceSelector<D> {
    devices: Vec<D>,
}

impl PhysicalDeviceSelector<PhysicalDevice> {
    pub fn from_instance(instance: &Arc<Instance>) -> Result<Self> {
        Ok(Self::new(instance.physical_devices()?))
    }
}

impl<D: SelectableDevice> PhysicalDeviceSelector<D> {
    pub fn new(devices: Vec<D>) -> Self {
        Self { devices }
    }

    pub fn has_device(&self) -> bool {
        !self.devices.is_empty()
    }

    pub fn devices(&self) -> &[D] {
        &self.devices
    }

    pub fn require_extension(mut self, extension: &CStr) -> Self {
        self.devices.retain(|d| d.supports_extension(extension));
        log::debug!("{} device(s) support {:?}", self.devices.len(), extension);
        self
    }

    pub fn require_extensions(self, extensions: &[&CStr]) -> Self {
        extensions
            .iter()
            .fold(self, |selector, ext| selector.require_extension(ext))
    }

    /// Keep devices that report at least one format and present mode
    pub fn can_present_to(mut self, surface: &D::Surface) -> Self {
        self.devices.retain(|d| d.can_present_to(surface));
        self
    }

    /// Rate every device, dropping zero ratings. Highest first.
    pub fn rate_devices<F>(self, rate: F) -> Vec<DeviceRating<D>>
    where
        F: Fn(&D) -> u32,
    {
        let mut ratings: Vec<_> = self
            .devices
            .into_iter()
            .map(|device| {
                let rating = rate(&device);
                DeviceRating { device, rating }
            })
            .filter(|r| r.rating > 0)
            .collect();
        // Stable, so equal ratings keep enumeration order
        ratings.sort_by(|a, b| b.rating.cmp(&a.rating));
        ratings
    }
}

/// Discrete GPUs first, anything else after
pub fn prefer_discrete<D: SelectableDevice>(selector: PhysicalDeviceSelector<D>) -> Option<D> {
    selector
        .rate_devices(|d| if d.is_discrete() { 1000 } else { 1 })
        .into_iter()
        .next()
        .map(|r| r.device)
}

/// Hooks an application implements on top of the wrapper
pub trait App {
    fn select_physical_device(
        &self,
        selector: PhysicalDeviceSelector<PhysicalDevice>,
    ) -> Option<PhysicalDevice> {
        prefer_discrete(selector)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct MockDevice {
        name: &'static str,
        extensions: Vec<&'static CStr>,
        surfaces: Vec<u32>,
        discrete: bool,
    }

    impl SelectableDevice for MockDevice {
        type Surface = u32;

        fn supports_extension(&self, extension: &CStr) -> bool {
            self.extensions.iter().any(|e| *e == extension)
        }

        fn can_present_to(&self, surface: &u32) -> bool {
            self.surfaces.contains(surface)
        }

        fn is_discrete(&self) -> bool {
            self.discrete
        }
    }

    const SWAPCHAIN: &CStr = c"VK_KHR_swapchain";
    const RAY_QUERY: &CStr = c"VK_KHR_ray_query";

    fn devices() -> Vec<MockDevice> {
        vec![
            MockDevice {
                name: "integrated",
                extensions: vec![SWAPCHAIN],
                surfaces: vec![1],
                discrete: false,
            },
            MockDevice {
                name: "discrete",
                extensions: vec![SWAPCHAIN, RAY_QUERY],
                surfaces: vec![1, 2],
                discrete: true,
            },
            MockDevice {
                name: "headless",
                extensions: vec![],
                surfaces: vec![],
                discrete: true,
            },
        ]
    }

    fn names(selector: &PhysicalDeviceSelector<MockDevice>) -> Vec<&'static str> {
        selector.devices().iter().map(|d| d.name).collect()
    }

    #[test]
    fn require_extension_filters() {
        let selector = PhysicalDeviceSelector::new(devices()).require_extension(SWAPCHAIN);
        assert_eq!(names(&selector), vec!["integrated", "discrete"]);

        let selector = selector.require_extensions(&[RAY_QUERY]);
        assert_eq!(names(&selector), vec!["discrete"]);

        let selector = selector.require_extension(c"VK_EXT_missing");
        assert!(!selector.has_device());
    }

    #[test]
    fn present_filter() {
        let selector = PhysicalDeviceSelector::new(devices()).can_present_to(&2);
        assert_eq!(names(&selector), vec!["discrete"]);
    }

    #[test]
    fn ratings_sorted_and_zero_dropped() {
        let ratings = PhysicalDeviceSelector::new(devices()).rate_devices(|d| match d.name {
            "integrated" => 5,
            "discrete" => 10,
            _ => 0,
        });
        let order: Vec<_> = ratings.iter().map(|r| (r.device.name, r.rating)).collect();
        assert_eq!(order, vec![("discrete", 10), ("integrated", 5)]);
    }

    #[test]
    fn default_prefers_discrete() {
        let picked = prefer_discrete(PhysicalDeviceSelector::new(devices()).can_present_to(&1));
        assert_eq!(picked.map(|d| d.name), Some("discrete"));

        let selector = PhysicalDeviceSelector::new(devices())
            .require_extension(RAY_QUERY)
            .can_present_to(&3);
        let picked = prefer_discrete(selector);
        assert!(picked.is_none());
    }

    #[test]
    fn init_twice_is_noop() {
        let config = Config::default();
        init(&config);
        init(&config);
    }
}
