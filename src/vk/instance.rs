// Vulkan Instance - loader entry, instance, debug messenger
//
// Responsibilities:
// - Application info and layer/extension requests
// - Dropping requested layers the loader doesn't have
// - Validation messages routed into the log crate
// - Surface creation for a window

use anyhow::{Context, Result};
use ash::extensions::{ext::DebugUtils, khr};
use ash::{vk, Entry};
use raw_window_handle::RawDisplayHandle;
use std::ffi::{CStr, CString};
use std::sync::Arc;

use super::enums::ValidationType;
use super::physical::PhysicalDevice;
use super::surface::Surface;
use super::window::Window;

pub const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

#[derive(Debug, Clone)]
pub struct ApplicationInfo {
    pub name: String,
    pub version: u32,
    pub engine_name: String,
    pub engine_version: u32,
    pub api_version: u32,
}

impl Default for ApplicationInfo {
    fn default() -> Self {
        Self {
            name: "Vulkan App".to_string(),
            version: vk::make_api_version(0, 1, 0, 0),
            engine_name: "No Engine".to_string(),
            engine_version: vk::make_api_version(0, 1, 0, 0),
            api_version: vk::API_VERSION_1_0,
        }
    }
}

impl ApplicationInfo {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn set_name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn set_version(mut self, major: u32, minor: u32, patch: u32) -> Self {
        self.version = vk::make_api_version(0, major, minor, patch);
        self
    }

    pub fn set_engine_name(mut self, name: &str) -> Self {
        self.engine_name = name.to_string();
        self
    }

    pub fn set_engine_version(mut self, major: u32, minor: u32, patch: u32) -> Self {
        self.engine_version = vk::make_api_version(0, major, minor, patch);
        self
    }

    pub fn set_api_version(mut self, api_version: u32) -> Self {
        self.api_version = api_version;
        self
    }
}

#[derive(Debug, Clone)]
pub struct InstanceCreateInfo {
    app: ApplicationInfo,
    layers: Vec<CString>,
    extensions: Vec<CString>,
}

impl InstanceCreateInfo {
    pub fn new(app: ApplicationInfo, validation: ValidationType) -> Self {
        let info = Self {
            app,
            layers: Vec::new(),
            extensions: Vec::new(),
        };
        if validation.enabled() {
            info.enable_validation_layers()
        } else {
            info
        }
    }

    pub fn add_layer(mut self, layer: &CStr) -> Self {
        if !self.layers.iter().any(|l| l.as_c_str() == layer) {
            self.layers.push(layer.to_owned());
        }
        self
    }

    pub fn add_extension(mut self, extension: &CStr) -> Self {
        if !self.extensions.iter().any(|e| e.as_c_str() == extension) {
            self.extensions.push(extension.to_owned());
        }
        self
    }

    pub fn enable_validation_layers(self) -> Self {
        self.add_layer(VALIDATION_LAYER).enable_debug_utils()
    }

    pub fn enable_debug_utils(self) -> Self {
        self.add_extension(DebugUtils::name())
    }

    /// Add the surface extensions the platform's window system needs
    pub fn enable_window_extensions(mut self, display: RawDisplayHandle) -> Result<Self> {
        let required = ash_window::enumerate_required_extensions(display)
            .context("Failed to query window extensions")?;
        for &ext in required {
            let name = unsafe { CStr::from_ptr(ext) };
            log::info!("Window extension: {}", name.to_string_lossy());
            self = self.add_extension(name);
        }
        Ok(self)
    }

    pub fn layers(&self) -> &[CString] {
        &self.layers
    }

    pub fn extensions(&self) -> &[CString] {
        &self.extensions
    }
}

/// Drop requested layers the loader doesn't report.
/// An empty `available` list means the loader reported nothing; keep the request.
pub fn resolve_layers(requested: &[CString], available: &[CString]) -> Vec<CString> {
    if available.is_empty() {
        return requested.to_vec();
    }
    let mut layers = requested.to_vec();
    while let Some(missing) = layers.iter().position(|l| !available.contains(l)) {
        let layer = layers.remove(missing);
        log::error!("Layer {} is not available, skipping", layer.to_string_lossy());
    }
    layers
}

/// Vulkan instance with automatic cleanup
pub struct Instance {
    raw: ash::Instance,
    entry: Entry,
    debug_utils: Option<(DebugUtils, vk::DebugUtilsMessengerEXT)>,
    surface_loader: khr::Surface,
    layers: Vec<CString>,
    extensions: Vec<CString>,
}

impl Instance {
    pub fn create(info: &InstanceCreateInfo) -> Result<Arc<Self>> {
        log::info!("Creating Vulkan instance: {}", info.app.name);

        // Step 1: Load Vulkan library
        let entry = unsafe { Entry::load() }
            .context("Failed to load Vulkan library. Is Vulkan installed?")?;

        // Step 2: Filter layers against what the loader has
        let available: Vec<CString> = unsafe { entry.enumerate_instance_layer_properties() }
            .context("Failed to enumerate instance layers")?
            .iter()
            .map(|props| unsafe { CStr::from_ptr(props.layer_name.as_ptr()) }.to_owned())
            .collect();
        let layers = resolve_layers(&info.layers, &available);
        let validation = layers.iter().any(|l| l.as_c_str() == VALIDATION_LAYER);

        let mut extensions = info.extensions.clone();
        if !validation {
            extensions.retain(|e| e.as_c_str() != DebugUtils::name());
        }

        // Step 3: Create instance
        let app_name = CString::new(info.app.name.as_str())?;
        let engine_name = CString::new(info.app.engine_name.as_str())?;
        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name)
            .application_version(info.app.version)
            .engine_name(&engine_name)
            .engine_version(info.app.engine_version)
            .api_version(info.app.api_version);

        let layer_ptrs: Vec<_> = layers.iter().map(|l| l.as_ptr()).collect();
        let extension_ptrs: Vec<_> = extensions.iter().map(|e| e.as_ptr()).collect();

        let create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_layer_names(&layer_ptrs)
            .enabled_extension_names(&extension_ptrs);

        let raw = unsafe { entry.create_instance(&create_info, None) }
            .context("Failed to create Vulkan instance")?;

        // Step 4: Setup debug messenger if validation survived filtering
        let debug_utils = if validation {
            match Self::setup_debug_messenger(&entry, &raw) {
                Ok(messenger) => Some(messenger),
                Err(e) => {
                    log::warn!("Failed to create debug messenger: {:?}", e);
                    None
                }
            }
        } else {
            None
        };

        let surface_loader = khr::Surface::new(&entry, &raw);

        log::info!(
            "Instance created ({} layers, {} extensions)",
            layers.len(),
            extensions.len()
        );

        Ok(Arc::new(Self {
            raw,
            entry,
            debug_utils,
            surface_loader,
            layers,
            extensions,
        }))
    }

    fn setup_debug_messenger(
        entry: &Entry,
        instance: &ash::Instance,
    ) -> Result<(DebugUtils, vk::DebugUtilsMessengerEXT)> {
        let debug_utils = DebugUtils::new(entry, instance);

        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::builder()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::INFO
                    | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(debug_callback));

        let messenger = unsafe { debug_utils.create_debug_utils_messenger(&create_info, None) }?;

        Ok((debug_utils, messenger))
    }

    pub fn raw(&self) -> &ash::Instance {
        &self.raw
    }

    pub fn entry(&self) -> &Entry {
        &self.entry
    }

    pub fn surface_loader(&self) -> &khr::Surface {
        &self.surface_loader
    }

    pub fn layers(&self) -> &[CString] {
        &self.layers
    }

    pub fn extensions(&self) -> &[CString] {
        &self.extensions
    }

    pub fn validation_enabled(&self) -> bool {
        self.debug_utils.is_some()
    }

    pub fn physical_devices(self: &Arc<Self>) -> Result<Vec<PhysicalDevice>> {
        PhysicalDevice::all(self)
    }

    pub fn create_surface(self: &Arc<Self>, window: &Window) -> Result<Surface> {
        Surface::create(self, window)
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        log::info!("Destroying Vulkan instance...");
        unsafe {
            if let Some((debug_utils, messenger)) = self.debug_utils.take() {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
            }
            self.raw.destroy_instance(None);
        }
    }
}

// Debug callback for validation layers
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    _message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _p_user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    if p_callback_data.is_null() || (*p_callback_data).p_message.is_null() {
        return vk::FALSE;
    }
    let message = CStr::from_ptr((*p_callback_data).p_message);

    match message_severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => {
            log::error!("[Vulkan] {}", message.to_string_lossy());
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => {
            log::warn!("[Vulkan] {}", message.to_string_lossy());
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::INFO => {
            log::info!("[Vulkan] {}", message.to_string_lossy());
        }
        _ => {
            log::debug!("[Vulkan] {}", message.to_string_lossy());
        }
    }

    vk::FALSE
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<CString> {
        list.iter().map(|s| CString::new(*s).unwrap()).collect()
    }

    #[test]
    fn unavailable_layers_are_dropped() {
        let requested = names(&["VK_LAYER_A", "VK_LAYER_B", "VK_LAYER_C"]);
        let available = names(&["VK_LAYER_C", "VK_LAYER_A"]);
        assert_eq!(resolve_layers(&requested, &available), names(&["VK_LAYER_A", "VK_LAYER_C"]));
    }

    #[test]
    fn empty_loader_list_keeps_request() {
        let requested = names(&["VK_LAYER_A"]);
        assert_eq!(resolve_layers(&requested, &[]), requested);
    }

    #[test]
    fn validation_adds_layer_and_debug_utils() {
        let info = InstanceCreateInfo::new(ApplicationInfo::default(), ValidationType::Always);
        assert_eq!(info.layers(), &[VALIDATION_LAYER.to_owned()]);
        assert!(info.extensions().iter().any(|e| e.as_c_str() == DebugUtils::name()));

        let info = InstanceCreateInfo::new(ApplicationInfo::default(), ValidationType::None);
        assert!(info.layers().is_empty());
        assert!(info.extensions().is_empty());
    }

    #[test]
    fn duplicate_requests_are_ignored() {
        let info = InstanceCreateInfo::new(ApplicationInfo::default(), ValidationType::None)
            .add_extension(khr::Surface::name())
            .add_extension(khr::Surface::name())
            .add_layer(VALIDATION_LAYER)
            .enable_validation_layers();
        assert_eq!(info.extensions().len(), 2);
        assert_eq!(info.layers().len(), 1);
    }

    #[test]
    fn application_defaults() {
        let app = ApplicationInfo::default();
        assert_eq!(app.name, "Vulkan App");
        assert_eq!(app.engine_name, "No Engine");
        assert_eq!(app.api_version, vk::API_VERSION_1_0);

        let app = ApplicationInfo::new("demo").set_version(2, 1, 0);
        assert_eq!(vk::api_version_major(app.version), 2);
        assert_eq!(vk::api_version_minor(app.version), 1);
    }
}
