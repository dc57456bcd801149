// Physical devices and their queue families

use anyhow::{Context, Result};
use ash::vk;
use std::ffi::{CStr, CString};
use std::ops::Index;
use std::sync::Arc;

use super::instance::Instance;
use super::surface::Surface;

/// Chosen memory type
#[derive(Debug, Clone, Copy)]
pub struct MemoryTypeInfo {
    pub index: u32,
    pub memory_type: vk::MemoryType,
}

/// First memory type allowed by `type_filter` whose flags contain `properties`
pub fn find_memory_type_in(
    memory: &vk::PhysicalDeviceMemoryProperties,
    type_filter: u32,
    properties: vk::MemoryPropertyFlags,
) -> Option<MemoryTypeInfo> {
    memory.memory_types[..memory.memory_type_count as usize]
        .iter()
        .enumerate()
        .find(|(i, ty)| type_filter & (1 << i) != 0 && ty.property_flags.contains(properties))
        .map(|(i, ty)| MemoryTypeInfo {
            index: i as u32,
            memory_type: *ty,
        })
}

#[derive(Clone)]
pub struct PhysicalDevice {
    raw: vk::PhysicalDevice,
    instance: Arc<Instance>,
    properties: vk::PhysicalDeviceProperties,
    memory_properties: vk::PhysicalDeviceMemoryProperties,
}

impl PhysicalDevice {
    pub fn all(instance: &Arc<Instance>) -> Result<Vec<Self>> {
        let devices = unsafe { instance.raw().enumerate_physical_devices() }
            .context("Failed to enumerate physical devices")?;

        if devices.is_empty() {
            log::warn!("No Vulkan-capable GPU found");
        }

        Ok(devices
            .into_iter()
            .map(|raw| Self::new(instance, raw))
            .collect())
    }

    pub fn new(instance: &Arc<Instance>, raw: vk::PhysicalDevice) -> Self {
        let (properties, memory_properties) = unsafe {
            (
                instance.raw().get_physical_device_properties(raw),
                instance.raw().get_physical_device_memory_properties(raw),
            )
        };
        Self {
            raw,
            instance: instance.clone(),
            properties,
            memory_properties,
        }
    }

    pub fn raw(&self) -> vk::PhysicalDevice {
        self.raw
    }

    pub fn instance(&self) -> &Arc<Instance> {
        &self.instance
    }

    pub fn properties(&self) -> &vk::PhysicalDeviceProperties {
        &self.properties
    }

    pub fn limits(&self) -> &vk::PhysicalDeviceLimits {
        &self.properties.limits
    }

    pub fn memory_properties(&self) -> &vk::PhysicalDeviceMemoryProperties {
        &self.memory_properties
    }

    pub fn features(&self) -> vk::PhysicalDeviceFeatures {
        unsafe { self.instance.raw().get_physical_device_features(self.raw) }
    }

    pub fn name(&self) -> String {
        unsafe { CStr::from_ptr(self.properties.device_name.as_ptr()) }
            .to_string_lossy()
            .into_owned()
    }

    pub fn is_discrete(&self) -> bool {
        self.properties.device_type == vk::PhysicalDeviceType::DISCRETE_GPU
    }

    pub fn extensions(&self) -> Vec<CString> {
        match unsafe { self.instance.raw().enumerate_device_extension_properties(self.raw) } {
            Ok(props) => props
                .iter()
                .map(|p| unsafe { CStr::from_ptr(p.extension_name.as_ptr()) }.to_owned())
                .collect(),
            Err(e) => {
                log::error!("Failed to enumerate extensions of {}: {}", self.name(), e);
                Vec::new()
            }
        }
    }

    pub fn supports_extension(&self, extension: &CStr) -> bool {
        self.supports_extensions(&[extension])
    }

    pub fn supports_extensions(&self, extensions: &[&CStr]) -> bool {
        let available = self.extensions();
        extensions
            .iter()
            .all(|ext| available.iter().any(|a| a.as_c_str() == *ext))
    }

    pub fn queues(&self) -> QueueFamilies {
        let props = unsafe {
            self.instance
                .raw()
                .get_physical_device_queue_family_properties(self.raw)
        };
        QueueFamilies(
            props
                .into_iter()
                .enumerate()
                .map(|(index, properties)| QueueFamily {
                    instance: self.instance.clone(),
                    physical: self.raw,
                    index: index as u32,
                    properties,
                })
                .collect(),
        )
    }

    pub fn find_memory_type(
        &self,
        type_filter: u32,
        properties: vk::MemoryPropertyFlags,
    ) -> Option<MemoryTypeInfo> {
        find_memory_type_in(&self.memory_properties, type_filter, properties)
    }
}

impl std::fmt::Debug for PhysicalDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhysicalDevice")
            .field("name", &self.name())
            .field("type", &self.properties.device_type)
            .finish()
    }
}

#[derive(Clone)]
pub struct QueueFamily {
    instance: Arc<Instance>,
    physical: vk::PhysicalDevice,
    index: u32,
    properties: vk::QueueFamilyProperties,
}

impl QueueFamily {
    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn properties(&self) -> &vk::QueueFamilyProperties {
        &self.properties
    }

    pub fn queue_count(&self) -> u32 {
        self.properties.queue_count
    }

    pub fn queue_flags(&self) -> vk::QueueFlags {
        self.properties.queue_flags
    }

    pub fn has_graphics(&self) -> bool {
        self.queue_flags().contains(vk::QueueFlags::GRAPHICS)
    }

    pub fn is_compute(&self) -> bool {
        self.queue_flags().contains(vk::QueueFlags::COMPUTE)
    }

    pub fn can_present_to(&self, surface: &Surface) -> bool {
        let supported = unsafe {
            self.instance
                .surface_loader()
                .get_physical_device_surface_support(self.physical, self.index, surface.raw())
        };
        supported.unwrap_or_else(|e| {
            log::error!("Surface support query failed for family {}: {}", self.index, e);
            false
        })
    }
}

pub struct QueueFamilies(Vec<QueueFamily>);

impl QueueFamilies {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &QueueFamily> {
        self.0.iter()
    }

    pub fn graphics(&self) -> Option<&QueueFamily> {
        self.0.iter().find(|f| f.has_graphics())
    }

    pub fn present(&self, surface: &Surface) -> Option<&QueueFamily> {
        self.0.iter().find(|f| f.can_present_to(surface))
    }

    pub fn graphics_present(&self, surface: &Surface) -> Option<&QueueFamily> {
        self.0
            .iter()
            .find(|f| f.has_graphics() && f.can_present_to(surface))
    }
}

impl Index<usize> for QueueFamilies {
    type Output = QueueFamily;

    fn index(&self, index: usize) -> &QueueFamily {
        &self.0[index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_props(types: &[vk::MemoryPropertyFlags]) -> vk::PhysicalDeviceMemoryProperties {
        let mut props = vk::PhysicalDeviceMemoryProperties {
            memory_type_count: types.len() as u32,
            ..Default::default()
        };
        for (i, flags) in types.iter().enumerate() {
            props.memory_types[i].property_flags = *flags;
        }
        props
    }

    #[test]
    fn picks_first_matching_type() {
        let props = memory_props(&[
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            vk::MemoryPropertyFlags::HOST_VISIBLE,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        ]);
        let found = find_memory_type_in(&props, 0b111, vk::MemoryPropertyFlags::HOST_VISIBLE);
        assert_eq!(found.map(|t| t.index), Some(1));

        let coherent =
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;
        let found = find_memory_type_in(&props, 0b111, coherent);
        assert_eq!(found.map(|t| t.index), Some(2));
    }

    #[test]
    fn respects_type_filter() {
        let props = memory_props(&[
            vk::MemoryPropertyFlags::HOST_VISIBLE,
            vk::MemoryPropertyFlags::HOST_VISIBLE,
        ]);
        let found = find_memory_type_in(&props, 0b10, vk::MemoryPropertyFlags::HOST_VISIBLE);
        assert_eq!(found.map(|t| t.index), Some(1));
    }

    #[test]
    fn no_match_is_none() {
        let props = memory_props(&[vk::MemoryPropertyFlags::DEVICE_LOCAL]);
        assert!(find_memory_type_in(&props, 0b1, vk::MemoryPropertyFlags::HOST_VISIBLE).is_none());
        // Types beyond memory_type_count are never considered
        assert!(find_memory_type_in(&props, !0, vk::MemoryPropertyFlags::HOST_CACHED).is_none());
    }
}
