// Buffers - creation, memory binding and typed buffer flavours
//
// A buffer remembers the memory it was bound to through a RawRef, so
// is_bound() turns false when that memory is freed.

use anyhow::{Context, Result};
use ash::vk;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use super::device::Device;
use super::enums::{check_buffer_usage, IndexType};
use super::error::BindError;
use super::handle::{impl_as_raw, Handle};
use super::memory::{DeviceMemory, MemoryView};
use super::refs::RawRef;
use super::size::Offset;

#[derive(Debug, Clone, Copy, Default)]
pub struct BufferCopy(vk::BufferCopy);

impl BufferCopy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn src_offset(mut self, offset: u64) -> Self {
        self.0.src_offset = offset;
        self
    }

    pub fn dst_offset(mut self, offset: u64) -> Self {
        self.0.dst_offset = offset;
        self
    }

    pub fn size(mut self, size: u64) -> Self {
        self.0.size = size;
        self
    }

    pub fn raw(&self) -> vk::BufferCopy {
        self.0
    }
}

#[derive(Debug, Clone)]
pub struct BufferCreateInfo {
    size: u64,
    usage: vk::BufferUsageFlags,
    sharing_mode: vk::SharingMode,
    queue_family_indices: Vec<u32>,
}

impl Default for BufferCreateInfo {
    fn default() -> Self {
        Self {
            size: 0,
            usage: vk::BufferUsageFlags::empty(),
            sharing_mode: vk::SharingMode::EXCLUSIVE,
            queue_family_indices: Vec::new(),
        }
    }
}

impl BufferCreateInfo {
    pub fn new(size: u64, usage: vk::BufferUsageFlags, sharing_mode: vk::SharingMode) -> Self {
        Self {
            size,
            usage,
            sharing_mode,
            queue_family_indices: Vec::new(),
        }
    }

    pub fn set_size(mut self, size: u64) -> Self {
        self.size = size;
        self
    }

    pub fn add_usage(mut self, usage: vk::BufferUsageFlags) -> Self {
        self.usage |= usage;
        self
    }

    pub fn queue_family_indices(mut self, indices: &[u32]) -> Self {
        self.queue_family_indices = indices.to_vec();
        self
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn usage(&self) -> vk::BufferUsageFlags {
        self.usage
    }

    fn raw(&self) -> vk::BufferCreateInfoBuilder<'_> {
        let builder = vk::BufferCreateInfo::builder()
            .size(self.size)
            .usage(self.usage)
            .sharing_mode(self.sharing_mode);
        if self.sharing_mode == vk::SharingMode::CONCURRENT {
            builder.queue_family_indices(&self.queue_family_indices)
        } else {
            builder
        }
    }
}

/// Create info that always carries one usage bit
macro_rules! typed_buffer_create_info {
    ($name:ident, $usage:expr) => {
        #[derive(Debug, Clone)]
        pub struct $name(BufferCreateInfo);

        impl $name {
            pub fn new(size: u64) -> Self {
                Self::with_usage(size, vk::BufferUsageFlags::empty(), vk::SharingMode::EXCLUSIVE)
            }

            pub fn with_usage(
                size: u64,
                usage: vk::BufferUsageFlags,
                sharing_mode: vk::SharingMode,
            ) -> Self {
                Self(BufferCreateInfo::new(size, usage | $usage, sharing_mode))
            }

            pub fn info(&self) -> &BufferCreateInfo {
                &self.0
            }
        }
    };
}

typed_buffer_create_info!(VertexBufferCreateInfo, vk::BufferUsageFlags::VERTEX_BUFFER);
typed_buffer_create_info!(UniformBufferCreateInfo, vk::BufferUsageFlags::UNIFORM_BUFFER);

#[derive(Debug, Clone)]
pub struct IndexBufferCreateInfo {
    info: BufferCreateInfo,
    index_type: IndexType,
}

impl IndexBufferCreateInfo {
    /// Room for `count` indices of `index_type`
    pub fn new(index_type: IndexType, count: u64) -> Self {
        Self::with_usage(
            index_type,
            count * index_type.size_bytes(),
            vk::BufferUsageFlags::empty(),
            vk::SharingMode::EXCLUSIVE,
        )
    }

    pub fn with_usage(
        index_type: IndexType,
        size: u64,
        usage: vk::BufferUsageFlags,
        sharing_mode: vk::SharingMode,
    ) -> Self {
        Self {
            info: BufferCreateInfo::new(
                size,
                usage | vk::BufferUsageFlags::INDEX_BUFFER,
                sharing_mode,
            ),
            index_type,
        }
    }

    pub fn info(&self) -> &BufferCreateInfo {
        &self.info
    }

    pub fn index_type(&self) -> IndexType {
        self.index_type
    }
}

/// Validate a bind of `requirements` at `offset` into memory of `memory_size` bytes.
/// Returns the offset actually used.
pub fn check_binding(
    requirements: &vk::MemoryRequirements,
    memory_size: u64,
    offset: u64,
    align: bool,
) -> Result<u64, BindError> {
    let mut offset = Offset::new(offset);
    if !offset.is_aligned(requirements.alignment) {
        if !align {
            return Err(BindError::AlignmentMismatch {
                offset: offset.get(),
                alignment: requirements.alignment,
            });
        }
        offset.align_to(requirements.alignment);
    }
    match offset.get().checked_add(requirements.size) {
        Some(end) if end <= memory_size => Ok(offset.get()),
        _ => Err(BindError::MemoryTooSmall {
            required: requirements.size,
            offset: offset.get(),
            available: memory_size,
        }),
    }
}

pub struct Buffer {
    handle: Handle<vk::Buffer>,
    device: Arc<Device>,
    size: u64,
    usage: vk::BufferUsageFlags,
    requirements: vk::MemoryRequirements,
    memory: RawRef<MemoryView>,
    memory_offset: u64,
}

impl Buffer {
    pub fn create(device: &Arc<Device>, info: &BufferCreateInfo) -> Result<Self> {
        if info.size == 0 {
            anyhow::bail!("Buffer size must be non-zero");
        }
        check_buffer_usage(info.usage);

        let raw = unsafe { device.raw().create_buffer(&info.raw(), None) }
            .context("Failed to create buffer")?;
        let requirements = unsafe { device.raw().get_buffer_memory_requirements(raw) };

        log::debug!("Created buffer {:?}: {} bytes, {:?}", raw, info.size, info.usage);

        Ok(Self {
            handle: Handle::new(raw),
            device: device.clone(),
            size: info.size,
            usage: info.usage,
            requirements,
            memory: RawRef::empty(),
            memory_offset: 0,
        })
    }

    pub fn raw(&self) -> vk::Buffer {
        self.handle.raw()
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn usage(&self) -> vk::BufferUsageFlags {
        self.usage
    }

    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    pub fn memory_requirements(&self) -> vk::MemoryRequirements {
        self.requirements
    }

    pub fn memory_offset(&self) -> u64 {
        self.memory_offset
    }

    /// Bind to `memory` at `offset`. With `align` a misaligned offset is
    /// rounded up instead of rejected. Returns the offset used.
    pub fn bind(
        &mut self,
        memory: &DeviceMemory,
        offset: u64,
        align: bool,
    ) -> Result<u64, BindError> {
        if self.is_bound() {
            return Err(BindError::AlreadyBound);
        }
        let view = memory.reference();
        let Some(view) = view.raw() else {
            return Err(BindError::MemoryDestroyed);
        };
        let offset = check_binding(&self.requirements, view.size, offset, align)?;

        unsafe {
            self.device
                .raw()
                .bind_buffer_memory(self.raw(), view.handle, offset)
        }
        .map_err(BindError::from)?;

        self.memory = memory.reference();
        self.memory_offset = offset;
        Ok(offset)
    }

    /// Bound, and the memory is still alive
    pub fn is_bound(&self) -> bool {
        self.memory.has_value()
    }

    pub fn can_map(&self) -> bool {
        self.memory
            .raw()
            .map(|view| view.host_visible())
            .unwrap_or(false)
    }

    pub fn can_copy_from(&self) -> bool {
        self.is_bound() && self.usage.contains(vk::BufferUsageFlags::TRANSFER_SRC)
    }

    pub fn can_copy_to(&self) -> bool {
        self.is_bound() && self.usage.contains(vk::BufferUsageFlags::TRANSFER_DST)
    }

    pub fn buffer_type_name(&self) -> &'static str {
        buffer_type_name(self.usage)
    }
}

impl_as_raw!(Buffer, vk::Buffer);

impl Drop for Buffer {
    fn drop(&mut self) {
        if let Some(raw) = self.handle.take() {
            unsafe { self.device.raw().destroy_buffer(raw, None) };
        }
    }
}

pub fn buffer_type_name(usage: vk::BufferUsageFlags) -> &'static str {
    if usage.contains(vk::BufferUsageFlags::VERTEX_BUFFER) {
        "VertexBuffer"
    } else if usage.contains(vk::BufferUsageFlags::INDEX_BUFFER) {
        "IndexBuffer"
    } else if usage.contains(vk::BufferUsageFlags::UNIFORM_BUFFER) {
        "UniformBuffer"
    } else if usage.contains(vk::BufferUsageFlags::STORAGE_BUFFER) {
        "StorageBuffer"
    } else {
        "Buffer"
    }
}

pub struct VertexBuffer(Buffer);

impl VertexBuffer {
    pub fn create(device: &Arc<Device>, info: &VertexBufferCreateInfo) -> Result<Self> {
        Ok(Self(Buffer::create(device, info.info())?))
    }
}

pub struct UniformBuffer(Buffer);

impl UniformBuffer {
    pub fn create(device: &Arc<Device>, info: &UniformBufferCreateInfo) -> Result<Self> {
        Ok(Self(Buffer::create(device, info.info())?))
    }
}

pub struct IndexBuffer {
    buffer: Buffer,
    index_type: IndexType,
}

impl IndexBuffer {
    pub fn create(device: &Arc<Device>, info: &IndexBufferCreateInfo) -> Result<Self> {
        Ok(Self {
            buffer: Buffer::create(device, info.info())?,
            index_type: info.index_type(),
        })
    }

    pub fn index_type(&self) -> IndexType {
        self.index_type
    }

    pub fn index_count(&self) -> u64 {
        self.buffer.size() / self.index_type.size_bytes()
    }
}

macro_rules! deref_to_buffer {
    ($ty:ty, $field:tt) => {
        impl Deref for $ty {
            type Target = Buffer;
            fn deref(&self) -> &Buffer {
                &self.$field
            }
        }

        impl DerefMut for $ty {
            fn deref_mut(&mut self) -> &mut Buffer {
                &mut self.$field
            }
        }
    };
}

deref_to_buffer!(VertexBuffer, 0);
deref_to_buffer!(UniformBuffer, 0);
deref_to_buffer!(IndexBuffer, buffer);

#[cfg(test)]
mod tests {
    use super::*;

    fn reqs(size: u64, alignment: u64) -> vk::MemoryRequirements {
        vk::MemoryRequirements {
            size,
            alignment,
            memory_type_bits: !0,
        }
    }

    #[test]
    fn binding_fits() {
        assert_eq!(check_binding(&reqs(256, 256), 1024, 512, false), Ok(512));
        assert_eq!(check_binding(&reqs(1024, 256), 1024, 0, false), Ok(0));
    }

    #[test]
    fn binding_too_small() {
        assert_eq!(
            check_binding(&reqs(256, 256), 1024, 1024, false),
            Err(BindError::MemoryTooSmall {
                required: 256,
                offset: 1024,
                available: 1024
            })
        );
    }

    #[test]
    fn misaligned_binding_rejected_or_aligned() {
        assert_eq!(
            check_binding(&reqs(16, 64), 1024, 10, false),
            Err(BindError::AlignmentMismatch {
                offset: 10,
                alignment: 64
            })
        );
        assert_eq!(check_binding(&reqs(16, 64), 1024, 10, true), Ok(64));
    }

    #[test]
    fn aligning_can_push_past_end() {
        assert!(matches!(
            check_binding(&reqs(64, 64), 128, 65, true),
            Err(BindError::MemoryTooSmall { offset: 128, .. })
        ));
    }

    #[test]
    fn typed_infos_carry_usage() {
        let info = VertexBufferCreateInfo::with_usage(
            64,
            vk::BufferUsageFlags::TRANSFER_DST,
            vk::SharingMode::EXCLUSIVE,
        );
        assert!(info.info().usage().contains(vk::BufferUsageFlags::VERTEX_BUFFER));
        assert!(info.info().usage().contains(vk::BufferUsageFlags::TRANSFER_DST));

        let index = IndexBufferCreateInfo::new(IndexType::U16, 6);
        assert_eq!(index.info().size(), 12);
        assert!(index.info().usage().contains(vk::BufferUsageFlags::INDEX_BUFFER));

        let uniform = UniformBufferCreateInfo::new(64);
        assert_eq!(uniform.info().usage(), vk::BufferUsageFlags::UNIFORM_BUFFER);
    }

    #[test]
    fn type_names() {
        assert_eq!(buffer_type_name(vk::BufferUsageFlags::VERTEX_BUFFER), "VertexBuffer");
        assert_eq!(buffer_type_name(vk::BufferUsageFlags::INDEX_BUFFER), "IndexBuffer");
        assert_eq!(buffer_type_name(vk::BufferUsageFlags::TRANSFER_SRC), "Buffer");
    }

    #[test]
    fn concurrent_sharing_passes_families() {
        let info = BufferCreateInfo::new(
            16,
            vk::BufferUsageFlags::STORAGE_BUFFER,
            vk::SharingMode::CONCURRENT,
        )
        .queue_family_indices(&[0, 1]);
        assert_eq!(info.raw().queue_family_index_count, 2);

        let info = BufferCreateInfo::default().set_size(4);
        assert_eq!(info.raw().queue_family_index_count, 0);
    }

    #[test]
    fn buffer_copy_builder() {
        let copy = BufferCopy::new().src_offset(4).dst_offset(8).size(16).raw();
        assert_eq!((copy.src_offset, copy.dst_offset, copy.size), (4, 8, 16));
    }
}
