// Descriptor set layouts, pools, sets and buffer writes

use anyhow::{Context, Result};
use ash::vk;
use std::sync::Arc;

use super::buffer::{Buffer, UniformBuffer};
use super::device::Device;
use super::enums::check_shader_stages;
use super::handle::{impl_as_raw, Handle};
use super::refs::{RawRef, Refable};
use super::size::WHOLE_SIZE;

#[derive(Debug, Clone, Copy)]
pub struct DescriptorSetLayoutBinding(vk::DescriptorSetLayoutBinding);

impl DescriptorSetLayoutBinding {
    pub fn new(binding: u32, ty: vk::DescriptorType, stages: vk::ShaderStageFlags) -> Self {
        Self::with_count(binding, ty, stages, 1)
    }

    pub fn with_count(
        binding: u32,
        ty: vk::DescriptorType,
        stages: vk::ShaderStageFlags,
        count: u32,
    ) -> Self {
        Self(
            vk::DescriptorSetLayoutBinding::builder()
                .binding(binding)
                .descriptor_type(ty)
                .descriptor_count(count)
                .stage_flags(check_shader_stages(stages))
                .build(),
        )
    }

    pub fn raw(&self) -> vk::DescriptorSetLayoutBinding {
        self.0
    }
}

#[derive(Debug, Clone, Default)]
pub struct DescriptorSetLayoutCreateInfo {
    bindings: Vec<vk::DescriptorSetLayoutBinding>,
}

impl DescriptorSetLayoutCreateInfo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_binding(mut self, binding: DescriptorSetLayoutBinding) -> Self {
        self.bindings.push(binding.raw());
        self
    }

    pub fn bindings(&self) -> &[vk::DescriptorSetLayoutBinding] {
        &self.bindings
    }
}

pub struct DescriptorSetLayout {
    handle: Handle<vk::DescriptorSetLayout>,
    device: Arc<Device>,
    view: Refable<vk::DescriptorSetLayout>,
}

impl DescriptorSetLayout {
    pub fn create(device: &Arc<Device>, info: &DescriptorSetLayoutCreateInfo) -> Result<Self> {
        let create_info = vk::DescriptorSetLayoutCreateInfo::builder().bindings(&info.bindings);
        let raw = unsafe { device.raw().create_descriptor_set_layout(&create_info, None) }
            .context("Failed to create descriptor set layout")?;
        Ok(Self {
            handle: Handle::new(raw),
            device: device.clone(),
            view: Refable::new(raw),
        })
    }

    pub fn raw(&self) -> vk::DescriptorSetLayout {
        self.handle.raw()
    }

    pub fn reference(&self) -> RawRef<vk::DescriptorSetLayout> {
        self.view.reference()
    }
}

impl_as_raw!(DescriptorSetLayout, vk::DescriptorSetLayout);

impl Drop for DescriptorSetLayout {
    fn drop(&mut self) {
        self.view.invalidate();
        if let Some(raw) = self.handle.take() {
            unsafe { self.device.raw().destroy_descriptor_set_layout(raw, None) };
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DescriptorPoolSize(vk::DescriptorPoolSize);

impl DescriptorPoolSize {
    pub fn new(ty: vk::DescriptorType, count: u32) -> Self {
        Self(vk::DescriptorPoolSize {
            ty,
            descriptor_count: count,
        })
    }

    pub fn set_count(mut self, count: u32) -> Self {
        self.0.descriptor_count = count;
        self
    }

    pub fn set_type(mut self, ty: vk::DescriptorType) -> Self {
        self.0.ty = ty;
        self
    }

    pub fn raw(&self) -> vk::DescriptorPoolSize {
        self.0
    }
}

#[derive(Debug, Clone)]
pub struct DescriptorPoolCreateInfo {
    max_sets: u32,
    flags: vk::DescriptorPoolCreateFlags,
    pool_sizes: Vec<vk::DescriptorPoolSize>,
}

impl DescriptorPoolCreateInfo {
    pub fn new(max_sets: u32) -> Self {
        Self {
            max_sets,
            flags: vk::DescriptorPoolCreateFlags::empty(),
            pool_sizes: Vec::new(),
        }
    }

    pub fn add_pool_size(mut self, size: DescriptorPoolSize) -> Self {
        self.pool_sizes.push(size.raw());
        self
    }

    pub fn set_max_sets(mut self, max_sets: u32) -> Self {
        self.max_sets = max_sets;
        self
    }

    /// Allow sets to be freed individually
    pub fn free_descriptor_set(mut self) -> Self {
        self.flags |= vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET;
        self
    }

    fn raw(&self) -> vk::DescriptorPoolCreateInfoBuilder<'_> {
        vk::DescriptorPoolCreateInfo::builder()
            .flags(self.flags)
            .max_sets(self.max_sets)
            .pool_sizes(&self.pool_sizes)
    }
}

/// Layouts to allocate sets for; layouts must still be alive at allocation time
#[derive(Debug, Clone, Default)]
pub struct DescriptorSetAllocateInfo {
    layouts: Vec<RawRef<vk::DescriptorSetLayout>>,
}

impl DescriptorSetAllocateInfo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_layout(mut self, layout: &DescriptorSetLayout) -> Self {
        self.layouts.push(layout.reference());
        self
    }

    pub fn add_layouts(mut self, layout: &DescriptorSetLayout, count: usize) -> Self {
        self.layouts
            .extend(std::iter::repeat_with(|| layout.reference()).take(count));
        self
    }

    fn resolve(&self) -> Result<Vec<vk::DescriptorSetLayout>> {
        if self.layouts.is_empty() {
            anyhow::bail!("No descriptor set layouts to allocate");
        }
        self.layouts
            .iter()
            .enumerate()
            .map(|(i, layout)| {
                layout
                    .raw()
                    .with_context(|| format!("Descriptor set layout {} has been destroyed", i))
            })
            .collect()
    }
}

pub struct DescriptorPool {
    handle: Handle<vk::DescriptorPool>,
    device: Arc<Device>,
    flags: vk::DescriptorPoolCreateFlags,
}

impl DescriptorPool {
    pub fn create(device: &Arc<Device>, info: &DescriptorPoolCreateInfo) -> Result<Self> {
        let raw = unsafe { device.raw().create_descriptor_pool(&info.raw(), None) }
            .context("Failed to create descriptor pool")?;
        Ok(Self {
            handle: Handle::new(raw),
            device: device.clone(),
            flags: info.flags,
        })
    }

    pub fn raw(&self) -> vk::DescriptorPool {
        self.handle.raw()
    }

    pub fn allocate_sets(&self, info: &DescriptorSetAllocateInfo) -> Result<Vec<DescriptorSet>> {
        let layouts = info.resolve()?;
        let allocate_info = vk::DescriptorSetAllocateInfo::builder()
            .descriptor_pool(self.raw())
            .set_layouts(&layouts);

        let sets = unsafe { self.device.raw().allocate_descriptor_sets(&allocate_info) }
            .context("Failed to allocate descriptor sets")?;

        Ok(sets
            .into_iter()
            .map(|raw| DescriptorSet {
                raw,
                device: self.device.clone(),
            })
            .collect())
    }

    pub fn allocate_sets_for(
        &self,
        layout: &DescriptorSetLayout,
        count: usize,
    ) -> Result<Vec<DescriptorSet>> {
        self.allocate_sets(&DescriptorSetAllocateInfo::new().add_layouts(layout, count))
    }

    /// Return a set to the pool; needs `free_descriptor_set` on the pool
    pub fn free_set(&self, set: DescriptorSet) -> Result<()> {
        if !self.flags.contains(vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET) {
            anyhow::bail!("Pool was created without FREE_DESCRIPTOR_SET");
        }
        unsafe { self.device.raw().free_descriptor_sets(self.raw(), &[set.raw]) }
            .context("Failed to free descriptor set")?;
        Ok(())
    }

    pub fn reset(&self) -> Result<()> {
        unsafe {
            self.device
                .raw()
                .reset_descriptor_pool(self.raw(), vk::DescriptorPoolResetFlags::empty())
        }
        .context("Failed to reset descriptor pool")
    }
}

impl_as_raw!(DescriptorPool, vk::DescriptorPool);

impl Drop for DescriptorPool {
    fn drop(&mut self) {
        if let Some(raw) = self.handle.take() {
            unsafe { self.device.raw().destroy_descriptor_pool(raw, None) };
        }
    }
}

/// Freed together with its pool
pub struct DescriptorSet {
    raw: vk::DescriptorSet,
    device: Arc<Device>,
}

impl DescriptorSet {
    pub fn raw(&self) -> vk::DescriptorSet {
        self.raw
    }

    /// Apply a write aimed at this set. Writes with no buffers are skipped.
    pub fn update(&self, write: &DescriptorSetWriteBuffer) -> Result<()> {
        if !write.targets(self.raw) {
            anyhow::bail!(
                "Descriptor write targets {:?}, not this set {:?}",
                write.set,
                self.raw
            );
        }
        let Some(raw) = write.raw() else {
            log::warn!("Descriptor write for binding {} has no buffers", write.binding);
            return Ok(());
        };
        unsafe { self.device.raw().update_descriptor_sets(&[raw], &[]) };
        Ok(())
    }
}

impl super::handle::AsRaw<vk::DescriptorSet> for DescriptorSet {
    fn as_raw(&self) -> vk::DescriptorSet {
        self.raw
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DescriptorBufferInfo {
    info: vk::DescriptorBufferInfo,
    ty: vk::DescriptorType,
}

impl DescriptorBufferInfo {
    pub fn new(buffer: &Buffer, ty: vk::DescriptorType) -> Self {
        Self {
            info: vk::DescriptorBufferInfo {
                buffer: buffer.raw(),
                offset: 0,
                range: WHOLE_SIZE,
            },
            ty,
        }
    }

    pub fn uniform(buffer: &UniformBuffer) -> Self {
        Self::new(buffer, vk::DescriptorType::UNIFORM_BUFFER)
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.info.offset = offset;
        self
    }

    pub fn range(mut self, range: u64) -> Self {
        self.info.range = range;
        self
    }

    pub fn descriptor_type(&self) -> vk::DescriptorType {
        self.ty
    }

    pub fn raw(&self) -> vk::DescriptorBufferInfo {
        self.info
    }
}

/// Target of a descriptor write
#[derive(Debug, Clone, Copy)]
pub struct DescriptorSetWrite {
    pub set: vk::DescriptorSet,
    pub binding: u32,
    pub array_element: u32,
}

impl DescriptorSetWrite {
    pub fn new(set: &DescriptorSet, binding: u32) -> Self {
        Self {
            set: set.raw(),
            binding,
            array_element: 0,
        }
    }

    pub fn array_element(mut self, element: u32) -> Self {
        self.array_element = element;
        self
    }
}

/// Buffer descriptor write; the descriptor type comes from the first buffer
#[derive(Debug, Clone)]
pub struct DescriptorSetWriteBuffer {
    set: vk::DescriptorSet,
    binding: u32,
    array_element: u32,
    ty: Option<vk::DescriptorType>,
    buffers: Vec<vk::DescriptorBufferInfo>,
}

impl DescriptorSetWriteBuffer {
    pub fn new(target: DescriptorSetWrite) -> Self {
        Self {
            set: target.set,
            binding: target.binding,
            array_element: target.array_element,
            ty: None,
            buffers: Vec::new(),
        }
    }

    pub fn uniform(set: &DescriptorSet, binding: u32, buffer: &UniformBuffer) -> Self {
        Self::new(DescriptorSetWrite::new(set, binding))
            .add_buffer(DescriptorBufferInfo::uniform(buffer))
    }

    pub fn targets(&self, set: vk::DescriptorSet) -> bool {
        self.set == set
    }

    pub fn add_buffer(mut self, info: DescriptorBufferInfo) -> Self {
        match self.ty {
            None => self.ty = Some(info.descriptor_type()),
            Some(ty) if ty != info.descriptor_type() => {
                log::warn!(
                    "Descriptor type {:?} differs from write type {:?}",
                    info.descriptor_type(),
                    ty
                );
            }
            Some(_) => {}
        }
        self.buffers.push(info.raw());
        self
    }

    pub fn descriptor_type(&self) -> Option<vk::DescriptorType> {
        self.ty
    }

    fn raw(&self) -> Option<vk::WriteDescriptorSet> {
        let ty = self.ty?;
        Some(
            vk::WriteDescriptorSet::builder()
                .dst_set(self.set)
                .dst_binding(self.binding)
                .dst_array_element(self.array_element)
                .descriptor_type(ty)
                .buffer_info(&self.buffers)
                .build(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle as _;

    fn write_target() -> DescriptorSetWrite {
        DescriptorSetWrite {
            set: vk::DescriptorSet::from_raw(5),
            binding: 1,
            array_element: 0,
        }
    }

    fn buffer_info(raw: u64, ty: vk::DescriptorType) -> DescriptorBufferInfo {
        DescriptorBufferInfo {
            info: vk::DescriptorBufferInfo {
                buffer: vk::Buffer::from_raw(raw),
                offset: 0,
                range: WHOLE_SIZE,
            },
            ty,
        }
    }

    #[test]
    fn write_type_from_first_buffer() {
        let write = DescriptorSetWriteBuffer::new(write_target())
            .add_buffer(buffer_info(1, vk::DescriptorType::STORAGE_BUFFER))
            .add_buffer(buffer_info(2, vk::DescriptorType::UNIFORM_BUFFER));
        assert_eq!(write.descriptor_type(), Some(vk::DescriptorType::STORAGE_BUFFER));

        let raw = write.raw().unwrap();
        assert_eq!(raw.descriptor_count, 2);
        assert_eq!(raw.dst_binding, 1);
        assert_eq!(raw.descriptor_type, vk::DescriptorType::STORAGE_BUFFER);
    }

    #[test]
    fn write_targets_only_its_set() {
        let write = DescriptorSetWriteBuffer::new(write_target());
        assert!(write.targets(vk::DescriptorSet::from_raw(5)));
        assert!(!write.targets(vk::DescriptorSet::from_raw(6)));
    }

    #[test]
    fn empty_write_has_no_raw() {
        let write = DescriptorSetWriteBuffer::new(write_target());
        assert!(write.raw().is_none());
    }

    #[test]
    fn buffer_info_range_defaults_to_whole() {
        let info = buffer_info(1, vk::DescriptorType::UNIFORM_BUFFER).offset(16);
        assert_eq!(info.raw().range, WHOLE_SIZE);
        assert_eq!(info.raw().offset, 16);
        assert_eq!(info.range(64).raw().range, 64);
    }

    #[test]
    fn pool_info_flags_and_sizes() {
        let info = DescriptorPoolCreateInfo::new(2)
            .add_pool_size(
                DescriptorPoolSize::new(vk::DescriptorType::UNIFORM_BUFFER, 1).set_count(4),
            )
            .set_max_sets(3)
            .free_descriptor_set();
        let raw = info.raw();
        assert_eq!(raw.max_sets, 3);
        assert_eq!(raw.pool_size_count, 1);
        assert!(raw.flags.contains(vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET));
    }

    #[test]
    fn allocate_info_needs_live_layouts() {
        assert!(DescriptorSetAllocateInfo::new().resolve().is_err());

        let layout = Refable::new(vk::DescriptorSetLayout::from_raw(9));
        let info = DescriptorSetAllocateInfo {
            layouts: vec![layout.reference(), layout.reference()],
        };
        assert_eq!(info.resolve().unwrap().len(), 2);

        drop(layout);
        assert!(info.resolve().is_err());
    }

    #[test]
    fn layout_binding_defaults_to_one() {
        let binding = DescriptorSetLayoutBinding::new(
            0,
            vk::DescriptorType::UNIFORM_BUFFER,
            vk::ShaderStageFlags::VERTEX,
        )
        .raw();
        assert_eq!(binding.descriptor_count, 1);
        let info =
            DescriptorSetLayoutCreateInfo::new().add_binding(DescriptorSetLayoutBinding::with_count(
                1,
                vk::DescriptorType::STORAGE_BUFFER,
                vk::ShaderStageFlags::COMPUTE,
                3,
            ));
        assert_eq!(info.bindings()[0].descriptor_count, 3);
    }
}
