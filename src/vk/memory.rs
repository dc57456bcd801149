// Device memory and host mappings
//
// DeviceMemory publishes a MemoryView through a Refable so buffers can tell
// whether their memory is still alive. A Mapping owns the mapped region; a
// MappingSegment is a weak window into it.
//
// Non-coherent memory: writes are logged and flushed in nonCoherentAtomSize
// units, relative to the start of the allocation.

use anyhow::{Context, Result};
use ash::vk;
use parking_lot::Mutex;
use std::sync::{Arc, Weak};

use super::device::Device;
use super::enums::{check_memory_map, check_memory_properties};
use super::error::MapError;
use super::handle::{impl_as_raw, Handle};
use super::refs::{RawRef, Refable};
use super::size::{align_down, align_up, WHOLE_SIZE};

#[derive(Debug, Clone, Copy)]
pub struct MemoryAllocateInfo {
    pub size: u64,
    pub memory_type_index: u32,
}

impl MemoryAllocateInfo {
    pub fn new(size: u64, memory_type_index: u32) -> Self {
        Self {
            size,
            memory_type_index,
        }
    }
}

/// What observers of a DeviceMemory can see
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryView {
    pub handle: vk::DeviceMemory,
    pub flags: vk::MemoryPropertyFlags,
    pub size: u64,
}

impl MemoryView {
    pub fn host_visible(&self) -> bool {
        self.flags.contains(vk::MemoryPropertyFlags::HOST_VISIBLE)
    }
}

pub struct DeviceMemory {
    handle: Handle<vk::DeviceMemory>,
    device: Arc<Device>,
    size: u64,
    memory_type: vk::MemoryType,
    view: Refable<MemoryView>,
    active_mapping: Mutex<Weak<Mutex<MappedRegion>>>,
}

impl DeviceMemory {
    pub fn allocate(device: &Arc<Device>, info: &MemoryAllocateInfo) -> Result<Self> {
        let memory_props = device.physical().memory_properties();
        if info.memory_type_index >= memory_props.memory_type_count {
            anyhow::bail!("Invalid memory type index {}", info.memory_type_index);
        }
        let memory_type = memory_props.memory_types[info.memory_type_index as usize];
        check_memory_properties(memory_type.property_flags);

        let allocate_info = vk::MemoryAllocateInfo::builder()
            .allocation_size(info.size)
            .memory_type_index(info.memory_type_index);

        let raw = unsafe { device.raw().allocate_memory(&allocate_info, None) }
            .with_context(|| format!("Failed to allocate {} bytes of device memory", info.size))?;

        log::debug!(
            "Allocated {} bytes (type {}, {:?})",
            info.size,
            info.memory_type_index,
            memory_type.property_flags
        );

        Ok(Self {
            handle: Handle::new(raw),
            device: device.clone(),
            size: info.size,
            memory_type,
            view: Refable::new(MemoryView {
                handle: raw,
                flags: memory_type.property_flags,
                size: info.size,
            }),
            active_mapping: Mutex::new(Weak::new()),
        })
    }

    pub fn raw(&self) -> vk::DeviceMemory {
        self.handle.raw()
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn flags(&self) -> vk::MemoryPropertyFlags {
        self.memory_type.property_flags
    }

    pub fn is_coherent(&self) -> bool {
        self.flags().contains(vk::MemoryPropertyFlags::HOST_COHERENT)
    }

    pub fn mappable(&self) -> bool {
        self.flags().contains(vk::MemoryPropertyFlags::HOST_VISIBLE)
    }

    pub fn reference(&self) -> RawRef<MemoryView> {
        self.view.reference()
    }

    pub fn is_mapped(&self) -> bool {
        self.active_mapping
            .lock()
            .upgrade()
            .map(|region| region.lock().is_valid())
            .unwrap_or(false)
    }

    /// Map `size` bytes (or WHOLE_SIZE) starting at `offset`
    pub fn map(
        &self,
        size: u64,
        offset: u64,
        flags: vk::MemoryMapFlags,
    ) -> Result<Mapping, MapError> {
        if !self.mappable() {
            return Err(MapError::NotMappable);
        }
        let size = resolve_map_range(self.size, size, offset)?;
        let (map_offset, map_size) = map_window(
            offset,
            size,
            self.size,
            self.device.non_coherent_atom_size(),
            self.is_coherent(),
        );
        let mut active = self.active_mapping.lock();
        if active.upgrade().map(|r| r.lock().is_valid()).unwrap_or(false) {
            return Err(MapError::AlreadyMapped);
        }

        let ptr = unsafe {
            self.device
                .raw()
                .map_memory(self.raw(), map_offset, map_size, check_memory_map(flags))
        }
        .map_err(MapError::Vulkan)?;

        let map_end = if map_size == WHOLE_SIZE { self.size } else { map_offset + map_size };
        // The caller's window starts `offset - map_offset` bytes into the native mapping
        let ptr = unsafe { ptr.cast::<u8>().add((offset - map_offset) as usize) };
        let region = MappedRegion::new(ptr, size as usize, offset, self.is_coherent())
            .with_window(map_offset, map_end);
        let region = Arc::new(Mutex::new(region));
        *active = Arc::downgrade(&region);

        Ok(Mapping {
            region,
            memory: self.reference(),
            device: self.device.clone(),
        })
    }
}

impl_as_raw!(DeviceMemory, vk::DeviceMemory);

impl Drop for DeviceMemory {
    fn drop(&mut self) {
        // Freeing unmaps implicitly; stop writes through a live Mapping
        if let Some(region) = self.active_mapping.lock().upgrade() {
            region.lock().invalidate();
        }
        self.view.invalidate();
        if let Some(raw) = self.handle.take() {
            unsafe { self.device.raw().free_memory(raw, None) };
        }
    }
}

/// Resolved mapping size, checked against the allocation
fn resolve_map_range(memory_size: u64, size: u64, offset: u64) -> Result<u64, MapError> {
    let out_of_bounds = MapError::OutOfBounds {
        offset,
        size,
        limit: memory_size,
    };
    if offset > memory_size {
        return Err(out_of_bounds);
    }
    let size = if size == WHOLE_SIZE { memory_size - offset } else { size };
    match offset.checked_add(size) {
        Some(end) if end <= memory_size && size > 0 => Ok(size),
        _ => Err(out_of_bounds),
    }
}

/// Native (offset, size) to map so atom-widened flushes stay inside the mapping.
/// Coherent memory is mapped as requested; an end that reaches the allocation
/// end maps WHOLE_SIZE.
fn map_window(offset: u64, size: u64, memory_size: u64, atom: u64, coherent: bool) -> (u64, u64) {
    if coherent {
        return (offset, size);
    }
    let begin = align_down(offset, atom);
    let end = align_up(offset + size, atom);
    if end >= memory_size {
        (begin, WHOLE_SIZE)
    } else {
        (begin, end - begin)
    }
}

/// Bookkeeping for one mapped range of host-visible memory
pub struct MappedRegion {
    ptr: *mut u8,
    size: usize,
    memory_offset: u64,
    coherent: bool,
    /// Natively mapped [begin, end) in allocation bytes
    window: (u64, u64),
    writes: Vec<(usize, usize)>,
}

// The pointer is into driver-owned host memory, usable from any thread
unsafe impl Send for MappedRegion {}

impl MappedRegion {
    pub fn new(ptr: *mut u8, size: usize, memory_offset: u64, coherent: bool) -> Self {
        Self {
            ptr,
            size,
            memory_offset,
            coherent,
            window: (memory_offset, memory_offset + size as u64),
            writes: Vec::new(),
        }
    }

    /// Native mapping around the region, when it was widened
    pub fn with_window(mut self, begin: u64, end: u64) -> Self {
        self.window = (begin, end);
        self
    }

    pub fn is_valid(&self) -> bool {
        !self.ptr.is_null()
    }

    pub fn invalidate(&mut self) {
        self.ptr = std::ptr::null_mut();
        self.writes.clear();
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn write(&mut self, data: &[u8], offset: usize) -> Result<(), MapError> {
        if !self.is_valid() {
            return Err(MapError::MappingInvalid);
        }
        match offset.checked_add(data.len()) {
            Some(end) if end <= self.size => {}
            _ => {
                return Err(MapError::OutOfBounds {
                    offset: offset as u64,
                    size: data.len() as u64,
                    limit: self.size as u64,
                })
            }
        }
        unsafe { self.write_unchecked(data, offset) };
        Ok(())
    }

    /// # Safety
    /// `offset + data.len()` must be within the region and the region valid.
    pub unsafe fn write_unchecked(&mut self, data: &[u8], offset: usize) {
        std::ptr::copy_nonoverlapping(data.as_ptr(), self.ptr.add(offset), data.len());
        if !self.coherent && !data.is_empty() {
            self.writes.push((offset, data.len()));
        }
    }

    pub fn needs_flush(&self) -> bool {
        !self.coherent && !self.writes.is_empty()
    }

    /// Pending writes as (offset, size) ranges relative to the allocation,
    /// expanded to `atom` and kept inside the native mapping. Ranges reaching
    /// the mapping end use WHOLE_SIZE.
    pub fn flush_ranges(&self, atom: u64) -> Vec<(u64, u64)> {
        let (window_begin, window_end) = self.window;
        self.writes
            .iter()
            .map(|&(start, len)| {
                let begin = self.memory_offset + start as u64;
                let end = begin + len as u64;
                let aligned_begin = align_down(begin, atom).max(window_begin);
                let aligned_end = align_up(end, atom);
                if aligned_end >= window_end {
                    (aligned_begin, WHOLE_SIZE)
                } else {
                    (aligned_begin, aligned_end - aligned_begin)
                }
            })
            .collect()
    }

    pub fn clear_writes(&mut self) {
        self.writes.clear();
    }
}

/// Live host mapping of a DeviceMemory
pub struct Mapping {
    region: Arc<Mutex<MappedRegion>>,
    memory: RawRef<MemoryView>,
    device: Arc<Device>,
}

impl Mapping {
    pub fn size(&self) -> usize {
        self.region.lock().size()
    }

    pub fn ptr(&self) -> *mut u8 {
        self.region.lock().ptr
    }

    /// False once the memory is freed
    pub fn is_valid(&self) -> bool {
        self.memory.has_value() && self.region.lock().is_valid()
    }

    pub fn write<T: bytemuck::Pod>(&self, data: &[T], offset: usize) -> Result<(), MapError> {
        self.write_bytes(bytemuck::cast_slice(data), offset)
    }

    pub fn write_bytes(&self, data: &[u8], offset: usize) -> Result<(), MapError> {
        if !self.memory.has_value() {
            return Err(MapError::MemoryDestroyed);
        }
        self.region.lock().write(data, offset)
    }

    /// # Safety
    /// `offset + data.len()` must not exceed the mapping and the memory must be alive.
    pub unsafe fn write_unchecked(&self, data: &[u8], offset: usize) {
        self.region.lock().write_unchecked(data, offset);
    }

    pub fn needs_flush(&self) -> bool {
        self.region.lock().needs_flush()
    }

    pub fn flush(&self) -> Result<()> {
        let Some(view) = self.memory.raw() else {
            return Err(MapError::MemoryDestroyed.into());
        };
        let mut region = self.region.lock();
        if !region.needs_flush() {
            return Ok(());
        }

        let ranges: Vec<vk::MappedMemoryRange> = region
            .flush_ranges(self.device.non_coherent_atom_size())
            .into_iter()
            .map(|(offset, size)| {
                vk::MappedMemoryRange::builder()
                    .memory(view.handle)
                    .offset(offset)
                    .size(size)
                    .build()
            })
            .collect();

        unsafe { self.device.raw().flush_mapped_memory_ranges(&ranges) }
            .context("Failed to flush mapped memory")?;
        region.clear_writes();
        Ok(())
    }

    pub fn segment(&self, offset: usize, size: usize) -> Result<MappingSegment, MapError> {
        let limit = self.size();
        match offset.checked_add(size) {
            Some(end) if end <= limit => Ok(MappingSegment {
                region: Arc::downgrade(&self.region),
                offset,
                size,
            }),
            _ => Err(MapError::OutOfBounds {
                offset: offset as u64,
                size: size as u64,
                limit: limit as u64,
            }),
        }
    }
}

impl Drop for Mapping {
    fn drop(&mut self) {
        let Some(view) = self.memory.raw() else {
            return;
        };
        if !self.region.lock().is_valid() {
            return;
        }
        if let Err(e) = self.flush() {
            log::error!("Flush on unmap failed: {:?}", e);
        }
        self.region.lock().invalidate();
        unsafe { self.device.raw().unmap_memory(view.handle) };
    }
}

/// Weak window into a Mapping
#[derive(Clone)]
pub struct MappingSegment {
    region: Weak<Mutex<MappedRegion>>,
    offset: usize,
    size: usize,
}

impl MappingSegment {
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_valid(&self) -> bool {
        self.region
            .upgrade()
            .map(|r| r.lock().is_valid())
            .unwrap_or(false)
    }

    pub fn write(&self, data: &[u8], offset: usize) -> Result<(), MapError> {
        let region = self.region.upgrade().ok_or(MapError::MappingInvalid)?;
        match offset.checked_add(data.len()) {
            Some(end) if end <= self.size => {}
            _ => {
                return Err(MapError::OutOfBounds {
                    offset: offset as u64,
                    size: data.len() as u64,
                    limit: self.size as u64,
                })
            }
        }
        let mut region = region.lock();
        region.write(data, self.offset + offset)
    }

    pub fn write_pod<T: bytemuck::Pod>(&self, data: &[T], offset: usize) -> Result<(), MapError> {
        self.write(bytemuck::cast_slice(data), offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn region_over(buf: &mut [u8], memory_offset: u64, coherent: bool) -> MappedRegion {
        MappedRegion::new(buf.as_mut_ptr(), buf.len(), memory_offset, coherent)
    }

    fn segment_of(region: &Arc<Mutex<MappedRegion>>, offset: usize, size: usize) -> MappingSegment {
        MappingSegment {
            region: Arc::downgrade(region),
            offset,
            size,
        }
    }

    #[test]
    fn write_copies_into_region() {
        let mut buf = vec![0u8; 8];
        let mut region = region_over(&mut buf, 0, true);
        region.write(&[1, 2, 3], 2).unwrap();
        assert!(!region.needs_flush());
        drop(region);
        assert_eq!(buf, [0, 0, 1, 2, 3, 0, 0, 0]);
    }

    #[test]
    fn write_out_of_bounds_fails() {
        let mut buf = vec![0u8; 4];
        let mut region = region_over(&mut buf, 0, true);
        assert!(matches!(
            region.write(&[0; 3], 2),
            Err(MapError::OutOfBounds { offset: 2, size: 3, limit: 4 })
        ));
        assert!(region.write(&[0; 4], 0).is_ok());
    }

    #[test]
    fn invalid_region_rejects_writes() {
        let mut buf = vec![0u8; 4];
        let mut region = region_over(&mut buf, 0, false);
        region.invalidate();
        assert_eq!(region.write(&[1], 0), Err(MapError::MappingInvalid));
    }

    #[test]
    fn non_coherent_writes_need_flush() {
        let mut buf = vec![0u8; 64];
        let mut region = region_over(&mut buf, 0, false);
        assert!(!region.needs_flush());
        region.write(&[1; 4], 0).unwrap();
        assert!(region.needs_flush());
        region.clear_writes();
        assert!(!region.needs_flush());
    }

    #[test]
    fn flush_ranges_include_mapping_offset_and_atom() {
        let mut buf = vec![0u8; 256];
        let mut region = region_over(&mut buf, 512, false);
        region.write(&[1; 10], 70).unwrap();
        // 512 + 70 = 582 .. 592, widened to 576 .. 640
        assert_eq!(region.flush_ranges(64), vec![(576, 64)]);
    }

    #[test]
    fn flush_range_past_end_uses_whole_size() {
        let mut buf = vec![0u8; 100];
        let mut region = region_over(&mut buf, 0, false);
        region.write(&[1; 4], 96).unwrap();
        assert_eq!(region.flush_ranges(64), vec![(64, WHOLE_SIZE)]);
    }

    #[test]
    fn flush_stays_inside_partial_mapping() {
        // 0..100 of a 4096 byte allocation, natively mapped as 0..128
        assert_eq!(map_window(0, 100, 4096, 64, false), (0, 128));
        let mut buf = vec![0u8; 100];
        let mut region = region_over(&mut buf, 0, false).with_window(0, 128);
        region.write(&[1; 4], 96).unwrap();
        assert_eq!(region.flush_ranges(64), vec![(64, WHOLE_SIZE)]);

        // Without widening the range is still cut at the mapping end
        let mut region = region_over(&mut buf, 0, false);
        region.write(&[1; 4], 96).unwrap();
        assert_eq!(region.flush_ranges(64), vec![(64, WHOLE_SIZE)]);
    }

    #[test]
    fn flush_does_not_start_before_mapping() {
        // 100..356 natively mapped as 64..384
        assert_eq!(map_window(100, 256, 4096, 64, false), (64, 320));
        let mut buf = vec![0u8; 256];
        let mut region = region_over(&mut buf, 100, false).with_window(64, 384);
        region.write(&[1; 4], 0).unwrap();
        assert_eq!(region.flush_ranges(64), vec![(64, 64)]);

        let mut region = region_over(&mut buf, 100, false);
        region.write(&[1; 4], 0).unwrap();
        let ranges = region.flush_ranges(64);
        assert_eq!(ranges[0].0, 100);
    }

    #[test]
    fn map_window_widening() {
        assert_eq!(map_window(100, 256, 4096, 64, true), (100, 256));
        assert_eq!(map_window(4000, 96, 4096, 64, false), (3968, WHOLE_SIZE));
        assert_eq!(map_window(128, 64, 4096, 64, false), (128, 64));
    }

    #[test]
    fn map_range_resolution() {
        assert_eq!(resolve_map_range(1024, WHOLE_SIZE, 0), Ok(1024));
        assert_eq!(resolve_map_range(1024, WHOLE_SIZE, 24), Ok(1000));
        assert_eq!(resolve_map_range(1024, 24, 1000), Ok(24));
        assert!(resolve_map_range(1024, 25, 1000).is_err());
        assert!(resolve_map_range(1024, WHOLE_SIZE, 2048).is_err());
        assert!(resolve_map_range(1024, WHOLE_SIZE, 1024).is_err());
    }

    #[test]
    fn segment_writes_are_offset_and_bounded() {
        let mut buf = vec![0u8; 16];
        let region = Arc::new(Mutex::new(region_over(&mut buf, 0, true)));
        let segment = segment_of(&region, 8, 4);
        segment.write(&[9, 9], 1).unwrap();
        assert!(matches!(segment.write(&[0; 4], 1), Err(MapError::OutOfBounds { .. })));
        drop(region);
        assert_eq!(&buf[8..12], &[0, 9, 9, 0]);
    }

    #[test]
    fn segment_outliving_mapping_is_invalid() {
        let mut buf = vec![0u8; 16];
        let region = Arc::new(Mutex::new(region_over(&mut buf, 0, true)));
        let segment = segment_of(&region, 0, 16);
        assert!(segment.is_valid());
        drop(region);
        assert!(!segment.is_valid());
        assert_eq!(segment.write(&[1], 0), Err(MapError::MappingInvalid));
    }
}
