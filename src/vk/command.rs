// Command pools, command buffers and the recording encoders
//
// Recording is scoped:
//   CommandBuffer::begin()        -> Encoder           (ends on end()/drop)
//   Encoder::begin_render_pass()  -> RenderPassEncoder (ends on end()/drop)
// Each encoder mutably borrows its parent, so a second encoder or transfer
// commands inside a render pass don't type-check.

use anyhow::{Context, Result};
use ash::vk;
use bytemuck::Pod;
use std::sync::Arc;

use super::buffer::{Buffer, BufferCopy, BufferCreateInfo, IndexBuffer};
use super::descriptors::DescriptorSet;
use super::device::Device;
use super::error::EncoderError;
use super::framebuffer::Framebuffer;
use super::handle::{impl_as_raw, AsRaw, Handle};
use super::memory::DeviceMemory;
use super::pipeline::Pipeline;
use super::refs::{RawRef, Refable};
use super::render_pass::RenderPass;
use super::structs::clear;

#[derive(Debug, Clone, Copy)]
pub struct CommandPoolCreateInfo {
    flags: vk::CommandPoolCreateFlags,
    queue_family_index: u32,
}

impl CommandPoolCreateInfo {
    pub fn new(queue_family_index: u32, resetable: bool, transient: bool) -> Self {
        let mut flags = vk::CommandPoolCreateFlags::empty();
        if resetable {
            flags |= vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER;
        }
        if transient {
            flags |= vk::CommandPoolCreateFlags::TRANSIENT;
        }
        Self {
            flags,
            queue_family_index,
        }
    }

    pub fn set_flags(mut self, flags: vk::CommandPoolCreateFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn set_queue_family_index(mut self, index: u32) -> Self {
        self.queue_family_index = index;
        self
    }

    pub fn resetable(&self) -> bool {
        self.flags.contains(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
    }

    pub fn transient(&self) -> bool {
        self.flags.contains(vk::CommandPoolCreateFlags::TRANSIENT)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CommandBufferAllocateInfo {
    pub count: u32,
    pub secondary: bool,
}

impl CommandBufferAllocateInfo {
    pub fn new(count: u32, secondary: bool) -> Self {
        Self { count, secondary }
    }

    fn level(&self) -> vk::CommandBufferLevel {
        if self.secondary {
            vk::CommandBufferLevel::SECONDARY
        } else {
            vk::CommandBufferLevel::PRIMARY
        }
    }
}

/// What command buffers see of their pool. `generation` bumps on every pool reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolView {
    pub raw: vk::CommandPool,
    pub generation: u64,
}

/// Recording state of a buffer last begun at `generation`, given its pool's
/// current view. A pool reset since then puts the buffer back in Initial.
pub fn pool_tracked_state(
    tracked: RecordingState,
    generation: u64,
    pool: Option<PoolView>,
) -> RecordingState {
    match pool {
        Some(view) if view.generation != generation => tracked.reset(),
        _ => tracked,
    }
}

pub struct CommandPool {
    handle: Handle<vk::CommandPool>,
    device: Arc<Device>,
    resetable: bool,
    view: Refable<PoolView>,
}

impl CommandPool {
    pub fn create(device: &Arc<Device>, info: &CommandPoolCreateInfo) -> Result<Self> {
        let create_info = vk::CommandPoolCreateInfo::builder()
            .flags(info.flags)
            .queue_family_index(info.queue_family_index);
        let raw = unsafe { device.raw().create_command_pool(&create_info, None) }
            .context("Failed to create command pool")?;
        Ok(Self {
            handle: Handle::new(raw),
            device: device.clone(),
            resetable: info.resetable(),
            view: Refable::new(PoolView { raw, generation: 0 }),
        })
    }

    pub fn raw(&self) -> vk::CommandPool {
        self.handle.raw()
    }

    pub fn alloc_buffer(&self, secondary: bool) -> Result<CommandBuffer> {
        self.alloc_buffers(1, secondary)?
            .pop()
            .context("Command buffer allocation returned nothing")
    }

    pub fn alloc_buffers(&self, count: u32, secondary: bool) -> Result<Vec<CommandBuffer>> {
        self.alloc_buffers_with(&CommandBufferAllocateInfo::new(count, secondary))
    }

    pub fn alloc_buffers_with(
        &self,
        info: &CommandBufferAllocateInfo,
    ) -> Result<Vec<CommandBuffer>> {
        let allocate_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(self.raw())
            .level(info.level())
            .command_buffer_count(info.count);

        let raws = unsafe { self.device.raw().allocate_command_buffers(&allocate_info) }
            .context("Failed to allocate command buffers")?;

        if raws.len() != info.count as usize
            || raws.iter().any(|&cb| cb == vk::CommandBuffer::null())
        {
            anyhow::bail!(
                "Expected {} command buffers, driver returned {}",
                info.count,
                raws.len()
            );
        }

        let generation = self.view.get().map(|view| view.generation).unwrap_or_default();
        Ok(raws
            .into_iter()
            .map(|raw| CommandBuffer {
                raw,
                device: self.device.clone(),
                pool: self.view.reference(),
                generation,
                resetable: self.resetable,
                secondary: info.secondary,
                state: RecordingState::Initial,
            })
            .collect())
    }

    /// Reset every buffer allocated from this pool back to Initial
    pub fn reset(&self) -> Result<()> {
        unsafe {
            self.device
                .raw()
                .reset_command_pool(self.raw(), vk::CommandPoolResetFlags::empty())
        }
        .context("Failed to reset command pool")?;
        if let Some(view) = self.view.get() {
            self.view.set(PoolView {
                generation: view.generation + 1,
                ..view
            });
        }
        Ok(())
    }
}

impl_as_raw!(CommandPool, vk::CommandPool);

impl Drop for CommandPool {
    fn drop(&mut self) {
        // Destroying the pool frees its buffers
        self.view.invalidate();
        if let Some(raw) = self.handle.take() {
            unsafe { self.device.raw().destroy_command_pool(raw, None) };
        }
    }
}

/// Where a command buffer is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordingState {
    Initial,
    Recording,
    Executable,
}

impl RecordingState {
    /// Executable buffers may be begun again (implicit reset)
    pub fn begin(self) -> Result<Self> {
        match self {
            RecordingState::Initial | RecordingState::Executable => Ok(RecordingState::Recording),
            RecordingState::Recording => anyhow::bail!("Command buffer is already recording"),
        }
    }

    pub fn end(self) -> Result<Self> {
        match self {
            RecordingState::Recording => Ok(RecordingState::Executable),
            other => anyhow::bail!("Command buffer is not recording ({:?})", other),
        }
    }

    pub fn reset(self) -> Self {
        RecordingState::Initial
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CommandBufferBeginInfo {
    flags: vk::CommandBufferUsageFlags,
}

impl CommandBufferBeginInfo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn one_time(mut self) -> Self {
        self.flags |= vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT;
        self
    }

    pub fn render_pass_continue(mut self) -> Self {
        self.flags |= vk::CommandBufferUsageFlags::RENDER_PASS_CONTINUE;
        self
    }

    pub fn simultaneous_use(mut self) -> Self {
        self.flags |= vk::CommandBufferUsageFlags::SIMULTANEOUS_USE;
        self
    }

    pub fn flags(&self) -> vk::CommandBufferUsageFlags {
        self.flags
    }
}

pub struct CommandBuffer {
    raw: vk::CommandBuffer,
    device: Arc<Device>,
    pool: RawRef<PoolView>,
    generation: u64,
    resetable: bool,
    secondary: bool,
    state: RecordingState,
}

impl CommandBuffer {
    pub fn raw(&self) -> vk::CommandBuffer {
        self.raw
    }

    pub fn state(&self) -> RecordingState {
        pool_tracked_state(self.state, self.generation, self.pool.raw())
    }

    pub fn is_executable(&self) -> bool {
        self.state() == RecordingState::Executable
    }

    pub fn is_secondary(&self) -> bool {
        self.secondary
    }

    pub fn begin(&mut self) -> Result<Encoder<'_>> {
        self.begin_with(&CommandBufferBeginInfo::new())
    }

    pub fn begin_with(&mut self, info: &CommandBufferBeginInfo) -> Result<Encoder<'_>> {
        let Some(pool) = self.pool.raw() else {
            anyhow::bail!("Command pool has been destroyed");
        };
        let state = self.state();
        if state == RecordingState::Executable && !self.resetable {
            anyhow::bail!("Command buffer pool does not allow re-recording individual buffers");
        }
        let next = state.begin()?;

        let begin_info = vk::CommandBufferBeginInfo::builder().flags(info.flags);
        unsafe { self.device.raw().begin_command_buffer(self.raw, &begin_info) }
            .context("Failed to begin command buffer")?;
        self.state = next;
        self.generation = pool.generation;

        Ok(Encoder {
            command_buffer: self,
            ended: false,
        })
    }

    pub fn reset(&mut self, flags: vk::CommandBufferResetFlags) -> Result<()> {
        if !self.resetable {
            anyhow::bail!("Command buffer pool was created without RESET_COMMAND_BUFFER");
        }
        unsafe { self.device.raw().reset_command_buffer(self.raw, flags) }
            .context("Failed to reset command buffer")?;
        self.state = self.state.reset();
        if let Some(pool) = self.pool.raw() {
            self.generation = pool.generation;
        }
        Ok(())
    }

    fn end_recording(&mut self) -> Result<()> {
        let next = self.state().end()?;
        unsafe { self.device.raw().end_command_buffer(self.raw) }
            .context("Failed to end command buffer")?;
        self.state = next;
        Ok(())
    }
}

impl AsRaw<vk::CommandBuffer> for CommandBuffer {
    fn as_raw(&self) -> vk::CommandBuffer {
        self.raw
    }
}

impl Drop for CommandBuffer {
    fn drop(&mut self) {
        if let Some(pool) = self.pool.raw() {
            unsafe { self.device.raw().free_command_buffers(pool.raw, &[self.raw]) };
        }
    }
}

#[derive(Clone)]
pub struct RenderPassBeginInfo {
    render_pass: RawRef<vk::RenderPass>,
    framebuffer: RawRef<vk::Framebuffer>,
    area: vk::Rect2D,
    clear_values: Vec<vk::ClearValue>,
}

impl RenderPassBeginInfo {
    pub fn new(render_pass: &RenderPass, framebuffer: &Framebuffer, area: vk::Rect2D) -> Self {
        Self {
            render_pass: render_pass.reference(),
            framebuffer: framebuffer.reference(),
            area,
            clear_values: Vec::new(),
        }
    }

    pub fn add_clear_value(mut self, value: vk::ClearValue) -> Self {
        self.clear_values.push(value);
        self
    }

    pub fn add_clear_color(self, rgba: [f32; 4]) -> Self {
        self.add_clear_value(clear::color(rgba))
    }

    /// Fails once the render pass or framebuffer has been destroyed
    fn raw(&self) -> Result<vk::RenderPassBeginInfoBuilder<'_>, EncoderError> {
        let render_pass = self.render_pass.raw().ok_or(EncoderError::RenderPassDestroyed)?;
        let framebuffer = self.framebuffer.raw().ok_or(EncoderError::FramebufferDestroyed)?;
        Ok(vk::RenderPassBeginInfo::builder()
            .render_pass(render_pass)
            .framebuffer(framebuffer)
            .render_area(self.area)
            .clear_values(&self.clear_values))
    }
}

/// Whether `size` bytes at `offset` fit in `limit` bytes
fn fits_within(offset: u64, size: u64, limit: u64) -> bool {
    offset.checked_add(size).is_some_and(|end| end <= limit)
}

/// Staging resources that must outlive the submission that reads them
pub struct TemporaryStaging {
    pub buffer: Buffer,
    pub memory: DeviceMemory,
}

/// Records commands outside render passes
pub struct Encoder<'a> {
    command_buffer: &'a mut CommandBuffer,
    ended: bool,
}

impl<'a> Encoder<'a> {
    pub fn raw(&self) -> vk::CommandBuffer {
        self.command_buffer.raw
    }

    fn device(&self) -> &ash::Device {
        self.command_buffer.device.raw()
    }

    pub fn begin_render_pass(
        &mut self,
        info: &RenderPassBeginInfo,
        contents: vk::SubpassContents,
    ) -> Result<RenderPassEncoder<'_>, EncoderError> {
        let begin_info = info.raw()?;
        unsafe {
            self.device()
                .cmd_begin_render_pass(self.raw(), &begin_info, contents)
        };
        Ok(RenderPassEncoder {
            device: self.command_buffer.device.clone(),
            raw: self.raw(),
            bound: None,
            ended: false,
            _encoder: std::marker::PhantomData,
        })
    }

    pub fn copy_buffer(&mut self, src: &Buffer, dst: &Buffer, region: BufferCopy) {
        self.copy_buffer_regions(src, dst, &[region]);
    }

    pub fn copy_buffer_regions(&mut self, src: &Buffer, dst: &Buffer, regions: &[BufferCopy]) {
        if !src.can_copy_from() {
            log::warn!("Copy source {:?} is not bound or lacks TRANSFER_SRC", src.raw());
        }
        if !dst.can_copy_to() {
            log::warn!("Copy destination {:?} is not bound or lacks TRANSFER_DST", dst.raw());
        }
        let raws: Vec<_> = regions.iter().map(BufferCopy::raw).collect();
        unsafe { self.device().cmd_copy_buffer(self.raw(), src.raw(), dst.raw(), &raws) };
    }

    /// Copy `data` into `dst` at `offset` through a host-visible staging buffer
    pub fn write_buffer_with_staging<T: Pod>(
        &mut self,
        data: &[T],
        dst: &Buffer,
        offset: u64,
    ) -> Result<TemporaryStaging> {
        let bytes: &[u8] = bytemuck::cast_slice(data);
        let size = bytes.len() as u64;
        if size == 0 {
            anyhow::bail!("Nothing to write");
        }
        if !dst.can_copy_to() {
            anyhow::bail!("{} is not a bound transfer destination", dst.buffer_type_name());
        }
        if !fits_within(offset, size, dst.size()) {
            anyhow::bail!(
                "Write of {} bytes at {} exceeds {} of size {}",
                size,
                offset,
                dst.buffer_type_name(),
                dst.size()
            );
        }

        let device = self.command_buffer.device.clone();
        let mut buffer = device.create_buffer(&BufferCreateInfo::new(
            size,
            vk::BufferUsageFlags::TRANSFER_SRC,
            vk::SharingMode::EXCLUSIVE,
        ))?;
        let memory = device.allocate_memory_for(
            &buffer,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )?;
        buffer.bind(&memory, 0, false)?;
        {
            let mapping = memory.map(size, 0, vk::MemoryMapFlags::empty())?;
            mapping.write_bytes(bytes, 0)?;
        }

        self.copy_buffer(&buffer, dst, BufferCopy::new().dst_offset(offset).size(size));
        Ok(TemporaryStaging { buffer, memory })
    }

    pub fn bind_compute_pipeline(&mut self, pipeline: &impl Pipeline) {
        if pipeline.bind_point() != vk::PipelineBindPoint::COMPUTE {
            log::error!("bind_compute_pipeline called with a {:?} pipeline", pipeline.bind_point());
            return;
        }
        unsafe {
            self.device()
                .cmd_bind_pipeline(self.raw(), vk::PipelineBindPoint::COMPUTE, pipeline.raw())
        };
    }

    pub fn bind_compute_descriptor_set(
        &mut self,
        pipeline: &impl Pipeline,
        set: &DescriptorSet,
    ) -> Result<(), EncoderError> {
        let bound = BoundPipeline::of(pipeline);
        let layout = bound.layout()?;
        unsafe {
            self.device().cmd_bind_descriptor_sets(
                self.raw(),
                vk::PipelineBindPoint::COMPUTE,
                layout,
                0,
                &[set.raw()],
                &[],
            )
        };
        Ok(())
    }

    pub fn dispatch(&mut self, x: u32, y: u32, z: u32) {
        unsafe { self.device().cmd_dispatch(self.raw(), x, y, z) };
    }

    /// Finish recording; the command buffer becomes executable
    pub fn end(mut self) -> Result<()> {
        self.ended = true;
        self.command_buffer.end_recording()
    }
}

impl Drop for Encoder<'_> {
    fn drop(&mut self) {
        if !self.ended {
            if let Err(e) = self.command_buffer.end_recording() {
                log::error!("Failed to end command buffer: {:?}", e);
            }
        }
    }
}

/// Pipeline last bound in a render pass
#[derive(Debug, Clone)]
pub struct BoundPipeline {
    pipeline: RawRef<vk::Pipeline>,
    layout: RawRef<vk::PipelineLayout>,
    bind_point: vk::PipelineBindPoint,
}

impl BoundPipeline {
    pub fn of(pipeline: &impl Pipeline) -> Self {
        Self {
            pipeline: pipeline.reference(),
            layout: pipeline.layout(),
            bind_point: pipeline.bind_point(),
        }
    }

    /// Layout for descriptor binds, if pipeline and layout are still alive
    pub fn layout(&self) -> Result<vk::PipelineLayout, EncoderError> {
        if !self.pipeline.has_value() {
            return Err(EncoderError::PipelineDestroyed);
        }
        self.layout.raw().ok_or(EncoderError::LayoutDestroyed)
    }
}

/// Resolve the layout for a descriptor bind inside a render pass
pub fn descriptor_layout(
    bound: Option<&BoundPipeline>,
) -> Result<(vk::PipelineLayout, vk::PipelineBindPoint), EncoderError> {
    let bound = bound.ok_or(EncoderError::NoPipelineBound)?;
    Ok((bound.layout()?, bound.bind_point))
}

/// Records commands inside one render pass
pub struct RenderPassEncoder<'a> {
    device: Arc<Device>,
    raw: vk::CommandBuffer,
    bound: Option<BoundPipeline>,
    ended: bool,
    _encoder: std::marker::PhantomData<&'a mut ()>,
}

impl RenderPassEncoder<'_> {
    fn cmd(&self) -> &ash::Device {
        self.device.raw()
    }

    pub fn bind_pipeline(&mut self, pipeline: &impl Pipeline) {
        unsafe {
            self.cmd()
                .cmd_bind_pipeline(self.raw, pipeline.bind_point(), pipeline.raw())
        };
        self.bound = Some(BoundPipeline::of(pipeline));
    }

    pub fn set_viewport(&mut self, viewport: vk::Viewport) {
        unsafe { self.cmd().cmd_set_viewport(self.raw, 0, &[viewport]) };
    }

    pub fn set_scissor(&mut self, scissor: vk::Rect2D) {
        unsafe { self.cmd().cmd_set_scissor(self.raw, 0, &[scissor]) };
    }

    pub fn bind_vertex_buffer(&mut self, binding: u32, buffer: &Buffer, offset: u64) {
        self.bind_vertex_buffers(binding, &[(buffer, offset)]);
    }

    pub fn bind_vertex_buffers(&mut self, first_binding: u32, buffers: &[(&Buffer, u64)]) {
        let raws: Vec<_> = buffers.iter().map(|(b, _)| b.raw()).collect();
        let offsets: Vec<_> = buffers.iter().map(|(_, o)| *o).collect();
        unsafe {
            self.cmd()
                .cmd_bind_vertex_buffers(self.raw, first_binding, &raws, &offsets)
        };
    }

    pub fn bind_index_buffer(&mut self, buffer: &IndexBuffer, offset: u64) {
        unsafe {
            self.cmd().cmd_bind_index_buffer(
                self.raw,
                buffer.raw(),
                offset,
                buffer.index_type().into(),
            )
        };
    }

    pub fn bind_descriptor_set(
        &mut self,
        set: &DescriptorSet,
        dynamic_offsets: &[u32],
    ) -> Result<(), EncoderError> {
        self.bind_descriptor_sets(&[set], 0, dynamic_offsets)
    }

    pub fn bind_descriptor_sets(
        &mut self,
        sets: &[&DescriptorSet],
        first_set: u32,
        dynamic_offsets: &[u32],
    ) -> Result<(), EncoderError> {
        let (layout, bind_point) = descriptor_layout(self.bound.as_ref()).map_err(|e| {
            log::error!("Cannot bind descriptor sets: {}", e);
            e
        })?;
        let raws: Vec<_> = sets.iter().map(|s| s.raw()).collect();
        unsafe {
            self.cmd().cmd_bind_descriptor_sets(
                self.raw,
                bind_point,
                layout,
                first_set,
                &raws,
                dynamic_offsets,
            )
        };
        Ok(())
    }

    pub fn push_constants<T: Pod>(
        &mut self,
        stages: vk::ShaderStageFlags,
        offset: u32,
        data: &T,
    ) -> Result<(), EncoderError> {
        let (layout, _) = descriptor_layout(self.bound.as_ref())?;
        unsafe {
            self.cmd().cmd_push_constants(
                self.raw,
                layout,
                stages,
                offset,
                bytemuck::bytes_of(data),
            )
        };
        Ok(())
    }

    pub fn draw(
        &mut self,
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    ) {
        unsafe {
            self.cmd()
                .cmd_draw(self.raw, vertex_count, instance_count, first_vertex, first_instance)
        };
    }

    pub fn draw_indexed(
        &mut self,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    ) {
        unsafe {
            self.cmd().cmd_draw_indexed(
                self.raw,
                index_count,
                instance_count,
                first_index,
                vertex_offset,
                first_instance,
            )
        };
    }

    pub fn end(mut self) {
        self.finish();
    }

    fn finish(&mut self) {
        if !self.ended {
            self.ended = true;
            unsafe { self.cmd().cmd_end_render_pass(self.raw) };
        }
    }
}

impl Drop for RenderPassEncoder<'_> {
    fn drop(&mut self) {
        self.finish();
    }
}
