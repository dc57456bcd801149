// Vulkan Device - logical device and resource factory
//
// Responsibilities:
// - Queue and extension requests
// - Logical device creation
// - Factory methods for every device-owned resource
//
// Resources keep an Arc<Device>, so the device outlives everything it made.

use anyhow::{Context, Result};
use ash::extensions::khr;
use ash::vk;
use std::ffi::{CStr, CString};
use std::path::Path;
use std::sync::Arc;

use super::buffer::{
    check_binding, Buffer, BufferCreateInfo, IndexBuffer, IndexBufferCreateInfo, UniformBuffer,
    UniformBufferCreateInfo, VertexBuffer, VertexBufferCreateInfo,
};
use super::command::{CommandPool, CommandPoolCreateInfo};
use super::descriptors::{
    DescriptorPool, DescriptorPoolCreateInfo, DescriptorSetLayout, DescriptorSetLayoutCreateInfo,
};
use super::enums::ShaderStage;
use super::error::BindError;
use super::framebuffer::{Framebuffer, FramebufferCreateInfo};
use super::image::{Image, ImageCreateInfo, ImageView, ImageViewCreateInfo};
use super::memory::{DeviceMemory, MemoryAllocateInfo};
use super::physical::{PhysicalDevice, QueueFamily};
use super::pipeline::{
    ComputePipeline, ComputePipelineCreateInfo, GraphicsPipeline, GraphicsPipelineCreateInfo,
    PipelineLayout, PipelineLayoutCreateInfo,
};
use super::queue::Queue;
use super::render_pass::{RenderPass, RenderPassCreateInfo};
use super::shader::{Shader, ShaderModule};
use super::size::align_up;
use super::swapchain::{Swapchain, SwapchainCreateInfo};
use super::sync::{Fence, Semaphore};

#[derive(Debug, Clone)]
pub struct DeviceQueueCreateInfo {
    family_index: u32,
    priorities: Vec<f32>,
}

impl DeviceQueueCreateInfo {
    /// One queue at priority 1.0
    pub fn new(family_index: u32) -> Self {
        Self::with_priority(family_index, 1.0)
    }

    pub fn with_priority(family_index: u32, priority: f32) -> Self {
        Self {
            family_index,
            priorities: vec![priority],
        }
    }

    pub fn with_priorities(family_index: u32, priorities: &[f32]) -> Self {
        Self {
            family_index,
            priorities: priorities.to_vec(),
        }
    }

    pub fn for_family(family: &QueueFamily) -> Self {
        Self::new(family.index())
    }

    pub fn set_queue_priorities(mut self, priorities: &[f32]) -> Self {
        self.priorities = priorities.to_vec();
        self
    }

    pub fn add_queue(mut self, priority: f32) -> Self {
        self.priorities.push(priority);
        self
    }

    pub fn family_index(&self) -> u32 {
        self.family_index
    }

    pub fn queue_count(&self) -> usize {
        self.priorities.len()
    }

    fn raw(&self) -> vk::DeviceQueueCreateInfo {
        vk::DeviceQueueCreateInfo::builder()
            .queue_family_index(self.family_index)
            .queue_priorities(&self.priorities)
            .build()
    }
}

#[derive(Clone, Default)]
pub struct DeviceCreateInfo {
    queues: Vec<DeviceQueueCreateInfo>,
    extensions: Vec<CString>,
    features: vk::PhysicalDeviceFeatures,
}

impl DeviceCreateInfo {
    pub fn new(features: vk::PhysicalDeviceFeatures) -> Self {
        Self {
            features,
            ..Default::default()
        }
    }

    /// A family that already has a queue request is left alone
    pub fn add_queue(mut self, queue: DeviceQueueCreateInfo) -> Self {
        if self
            .queues
            .iter()
            .any(|q| q.family_index == queue.family_index)
        {
            log::debug!("Queue family {} already requested", queue.family_index);
            return self;
        }
        self.queues.push(queue);
        self
    }

    pub fn enable_extension(mut self, extension: &CStr) -> Self {
        if !self.extensions.iter().any(|e| e.as_c_str() == extension) {
            self.extensions.push(extension.to_owned());
        }
        self
    }

    pub fn enable_extensions(self, extensions: &[&CStr]) -> Self {
        extensions
            .iter()
            .fold(self, |info, ext| info.enable_extension(ext))
    }

    pub fn set_features(mut self, features: vk::PhysicalDeviceFeatures) -> Self {
        self.features = features;
        self
    }

    pub fn queues(&self) -> &[DeviceQueueCreateInfo] {
        &self.queues
    }

    pub fn extensions(&self) -> &[CString] {
        &self.extensions
    }
}

/// Memory requirement for several resources sharing one allocation.
/// Each resource starts at the next offset aligned to its own alignment.
pub fn combine_requirements(reqs: &[vk::MemoryRequirements]) -> Option<vk::MemoryRequirements> {
    let first = reqs.first()?;
    let mut combined = vk::MemoryRequirements {
        size: 0,
        alignment: first.alignment,
        memory_type_bits: !0,
    };
    for req in reqs {
        combined.size = align_up(combined.size, req.alignment) + req.size;
        combined.alignment = combined.alignment.max(req.alignment);
        combined.memory_type_bits &= req.memory_type_bits;
    }
    Some(combined)
}

/// Offsets for binding resources back to back into `memory_size` bytes,
/// each at its own alignment. Fails before anything is bound.
pub fn plan_bindings(
    reqs: &[vk::MemoryRequirements],
    memory_size: u64,
) -> Result<Vec<u64>, BindError> {
    let mut next = 0;
    reqs.iter()
        .map(|req| {
            let offset = check_binding(req, memory_size, next, true)?;
            next = offset + req.size;
            Ok(offset)
        })
        .collect()
}

/// Logical device with automatic cleanup
pub struct Device {
    raw: ash::Device,
    physical: PhysicalDevice,
    swapchain_loader: khr::Swapchain,
}

impl Device {
    pub fn create(physical: &PhysicalDevice, info: &DeviceCreateInfo) -> Result<Arc<Self>> {
        log::info!("Creating logical device on {}", physical.name());

        if info.queues.is_empty() {
            anyhow::bail!("Device needs at least one queue");
        }

        let queue_infos: Vec<_> = info.queues.iter().map(DeviceQueueCreateInfo::raw).collect();
        let extension_ptrs: Vec<_> = info.extensions.iter().map(|e| e.as_ptr()).collect();

        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_infos)
            .enabled_extension_names(&extension_ptrs)
            .enabled_features(&info.features);

        let raw = unsafe {
            physical
                .instance()
                .raw()
                .create_device(physical.raw(), &create_info, None)
        }
        .context("Failed to create logical device")?;

        let swapchain_loader = khr::Swapchain::new(physical.instance().raw(), &raw);

        for ext in &info.extensions {
            log::debug!("Device extension: {}", ext.to_string_lossy());
        }

        Ok(Arc::new(Self {
            raw,
            physical: physical.clone(),
            swapchain_loader,
        }))
    }

    pub fn raw(&self) -> &ash::Device {
        &self.raw
    }

    pub fn physical(&self) -> &PhysicalDevice {
        &self.physical
    }

    pub fn swapchain_loader(&self) -> &khr::Swapchain {
        &self.swapchain_loader
    }

    pub fn non_coherent_atom_size(&self) -> u64 {
        self.physical.limits().non_coherent_atom_size
    }

    /// Wait for device to be idle (e.g., before cleanup)
    pub fn wait_idle(&self) -> Result<()> {
        unsafe { self.raw.device_wait_idle() }.context("Failed to wait for device idle")?;
        Ok(())
    }

    pub fn queue(self: &Arc<Self>, family_index: u32, queue_index: u32) -> Queue {
        Queue::get(self, family_index, queue_index)
    }

    pub fn create_command_pool(
        self: &Arc<Self>,
        info: &CommandPoolCreateInfo,
    ) -> Result<CommandPool> {
        CommandPool::create(self, info)
    }

    pub fn create_swapchain(self: &Arc<Self>, info: &SwapchainCreateInfo) -> Result<Swapchain> {
        Swapchain::create(self, info)
    }

    pub fn create_semaphore(self: &Arc<Self>) -> Result<Semaphore> {
        Semaphore::create(self)
    }

    pub fn create_fence(self: &Arc<Self>, signaled: bool) -> Result<Fence> {
        Fence::create(self, signaled)
    }

    pub fn create_buffer(self: &Arc<Self>, info: &BufferCreateInfo) -> Result<Buffer> {
        Buffer::create(self, info)
    }

    pub fn create_vertex_buffer(
        self: &Arc<Self>,
        info: &VertexBufferCreateInfo,
    ) -> Result<VertexBuffer> {
        VertexBuffer::create(self, info)
    }

    pub fn create_index_buffer(
        self: &Arc<Self>,
        info: &IndexBufferCreateInfo,
    ) -> Result<IndexBuffer> {
        IndexBuffer::create(self, info)
    }

    pub fn create_uniform_buffer(
        self: &Arc<Self>,
        info: &UniformBufferCreateInfo,
    ) -> Result<UniformBuffer> {
        UniformBuffer::create(self, info)
    }

    pub fn allocate_memory(
        self: &Arc<Self>,
        reqs: &vk::MemoryRequirements,
        properties: vk::MemoryPropertyFlags,
    ) -> Result<DeviceMemory> {
        let memory_type = self
            .physical
            .find_memory_type(reqs.memory_type_bits, properties)
            .with_context(|| format!("No memory type with {:?}", properties))?;
        DeviceMemory::allocate(self, &MemoryAllocateInfo::new(reqs.size, memory_type.index))
    }

    pub fn allocate_memory_for(
        self: &Arc<Self>,
        buffer: &Buffer,
        properties: vk::MemoryPropertyFlags,
    ) -> Result<DeviceMemory> {
        self.allocate_memory(&buffer.memory_requirements(), properties)
    }

    /// One allocation large enough for all buffers, see [`combine_requirements`]
    pub fn allocate_memory_for_buffers(
        self: &Arc<Self>,
        buffers: &[&Buffer],
        properties: vk::MemoryPropertyFlags,
    ) -> Result<DeviceMemory> {
        let reqs: Vec<_> = buffers.iter().map(|b| b.memory_requirements()).collect();
        let combined = combine_requirements(&reqs).context("No buffers to allocate for")?;
        self.allocate_memory(&combined, properties)
    }

    /// Bind buffers back to back, each at its own alignment. Offsets and
    /// sizes are checked for the whole batch first; only a driver failure
    /// can leave earlier buffers bound.
    pub fn bind_buffer_memory(
        &self,
        buffers: &mut [&mut Buffer],
        memory: &DeviceMemory,
    ) -> Result<(), BindError> {
        if buffers.iter().any(|b| b.is_bound()) {
            return Err(BindError::AlreadyBound);
        }
        let reqs: Vec<_> = buffers.iter().map(|b| b.memory_requirements()).collect();
        let offsets = plan_bindings(&reqs, memory.size())?;
        for (buffer, offset) in buffers.iter_mut().zip(offsets) {
            buffer.bind(memory, offset, false)?;
        }
        Ok(())
    }

    pub fn create_descriptor_set_layout(
        self: &Arc<Self>,
        info: &DescriptorSetLayoutCreateInfo,
    ) -> Result<DescriptorSetLayout> {
        DescriptorSetLayout::create(self, info)
    }

    pub fn create_descriptor_pool(
        self: &Arc<Self>,
        info: &DescriptorPoolCreateInfo,
    ) -> Result<DescriptorPool> {
        DescriptorPool::create(self, info)
    }

    pub fn create_render_pass(self: &Arc<Self>, info: &RenderPassCreateInfo) -> Result<RenderPass> {
        RenderPass::create(self, info)
    }

    pub fn create_pipeline_layout(
        self: &Arc<Self>,
        info: &PipelineLayoutCreateInfo,
    ) -> Result<PipelineLayout> {
        PipelineLayout::create(self, info)
    }

    pub fn create_graphics_pipeline(
        self: &Arc<Self>,
        info: &GraphicsPipelineCreateInfo,
    ) -> Result<GraphicsPipeline> {
        GraphicsPipeline::create(self, info)
    }

    pub fn create_compute_pipeline(
        self: &Arc<Self>,
        info: &ComputePipelineCreateInfo,
    ) -> Result<ComputePipeline> {
        ComputePipeline::create(self, info)
    }

    pub fn create_shader_module(self: &Arc<Self>, code: &[u8]) -> Result<ShaderModule> {
        ShaderModule::from_code(self, code)
    }

    pub fn load_shader<P: AsRef<Path>>(
        self: &Arc<Self>,
        path: P,
        stage: ShaderStage,
    ) -> Result<Shader> {
        Shader::from_file(self, path, stage)
    }

    pub fn create_framebuffer(
        self: &Arc<Self>,
        info: &FramebufferCreateInfo,
    ) -> Result<Framebuffer> {
        Framebuffer::create(self, info)
    }

    pub fn create_image(self: &Arc<Self>, info: &ImageCreateInfo) -> Result<Image> {
        Image::create(self, info)
    }

    pub fn create_image_view(self: &Arc<Self>, info: &ImageViewCreateInfo) -> Result<ImageView> {
        ImageView::create(self, info)
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        log::info!("Destroying Vulkan device...");

        // Wait for device to finish
        if let Err(e) = self.wait_idle() {
            log::warn!("{:?}", e);
        }
        unsafe { self.raw.destroy_device(None) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req(size: u64, alignment: u64, bits: u32) -> vk::MemoryRequirements {
        vk::MemoryRequirements {
            size,
            alignment,
            memory_type_bits: bits,
        }
    }

    #[test]
    fn combined_requirements_pack_with_alignment() {
        let combined = combine_requirements(&[req(100, 16, 0b111), req(64, 256, 0b110)]).unwrap();
        // 100 rounded up to 256, then 64 more
        assert_eq!(combined.size, 320);
        assert_eq!(combined.alignment, 256);
        assert_eq!(combined.memory_type_bits, 0b110);
    }

    #[test]
    fn bindings_planned_for_whole_batch() {
        let reqs = [req(100, 16, 0b1), req(64, 256, 0b1)];
        assert_eq!(plan_bindings(&reqs, 320), Ok(vec![0, 256]));

        // Second buffer does not fit: nothing is planned
        assert_eq!(
            plan_bindings(&reqs, 300),
            Err(BindError::MemoryTooSmall {
                required: 64,
                offset: 256,
                available: 300,
            })
        );
        assert_eq!(plan_bindings(&[], 0), Ok(vec![]));
    }

    #[test]
    fn combined_requirements_empty() {
        assert!(combine_requirements(&[]).is_none());
    }

    #[test]
    fn combined_requirements_single() {
        let combined = combine_requirements(&[req(48, 16, 0b1)]).unwrap();
        assert_eq!(combined.size, 48);
        assert_eq!(combined.alignment, 16);
    }

    #[test]
    fn queue_requests_dedup_by_family() {
        let info = DeviceCreateInfo::default()
            .add_queue(DeviceQueueCreateInfo::new(0))
            .add_queue(DeviceQueueCreateInfo::with_priority(0, 0.5))
            .add_queue(DeviceQueueCreateInfo::new(2).add_queue(0.25));
        assert_eq!(info.queues().len(), 2);
        assert_eq!(info.queues()[0].queue_count(), 1);
        assert_eq!(info.queues()[1].family_index(), 2);
        assert_eq!(info.queues()[1].queue_count(), 2);
    }

    #[test]
    fn queue_raw_points_at_priorities() {
        let queue = DeviceQueueCreateInfo::with_priorities(1, &[1.0, 0.5]);
        let raw = queue.raw();
        assert_eq!(raw.queue_family_index, 1);
        assert_eq!(raw.queue_count, 2);
    }

    #[test]
    fn extensions_dedup() {
        let info = DeviceCreateInfo::default()
            .enable_extension(khr::Swapchain::name())
            .enable_extensions(&[khr::Swapchain::name()]);
        assert_eq!(info.extensions().len(), 1);
    }
}
