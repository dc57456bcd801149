// Queues - submission and presentation

use ash::prelude::VkResult;
use ash::vk;
use std::sync::Arc;

use super::command::CommandBuffer;
use super::device::Device;
use super::error::SubmitError;
use super::handle::AsRaw;
use super::sync::{Fence, Semaphore};

/// Owned submit description; wait semaphores and stage masks stay paired
#[derive(Debug, Clone, Default)]
pub struct SubmitInfo {
    command_buffers: Vec<vk::CommandBuffer>,
    wait_semaphores: Vec<vk::Semaphore>,
    wait_stages: Vec<vk::PipelineStageFlags>,
    signal_semaphores: Vec<vk::Semaphore>,
}

impl SubmitInfo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_command_buffer(mut self, command_buffer: &CommandBuffer) -> Self {
        self.command_buffers.push(command_buffer.raw());
        self
    }

    pub fn add_wait_semaphore(
        mut self,
        semaphore: &impl AsRaw<vk::Semaphore>,
        stage: vk::PipelineStageFlags,
    ) -> Self {
        self.wait_semaphores.push(semaphore.as_raw());
        self.wait_stages.push(stage);
        self
    }

    pub fn add_signal_semaphore(mut self, semaphore: &impl AsRaw<vk::Semaphore>) -> Self {
        self.signal_semaphores.push(semaphore.as_raw());
        self
    }

    pub fn command_buffer_count(&self) -> usize {
        self.command_buffers.len()
    }

    fn raw(&self) -> vk::SubmitInfo {
        vk::SubmitInfo::builder()
            .command_buffers(&self.command_buffers)
            .wait_semaphores(&self.wait_semaphores)
            .wait_dst_stage_mask(&self.wait_stages)
            .signal_semaphores(&self.signal_semaphores)
            .build()
    }
}

#[derive(Debug, Clone, Default)]
pub struct PresentInfo {
    swapchains: Vec<vk::SwapchainKHR>,
    image_indices: Vec<u32>,
    wait_semaphores: Vec<vk::Semaphore>,
}

impl PresentInfo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_swapchain(
        mut self,
        swapchain: &impl AsRaw<vk::SwapchainKHR>,
        image_index: u32,
    ) -> Self {
        self.swapchains.push(swapchain.as_raw());
        self.image_indices.push(image_index);
        self
    }

    /// Image index for a single swapchain
    pub fn set_image_index(mut self, index: u32) -> Self {
        self.image_indices = vec![index];
        self
    }

    pub fn set_image_indices(mut self, indices: &[u32]) -> Self {
        self.image_indices = indices.to_vec();
        self
    }

    pub fn add_wait_semaphore(mut self, semaphore: &impl AsRaw<vk::Semaphore>) -> Self {
        self.wait_semaphores.push(semaphore.as_raw());
        self
    }

    /// One image index per swapchain, and at least one swapchain
    fn check(&self) -> VkResult<()> {
        if self.swapchains.is_empty() || self.swapchains.len() != self.image_indices.len() {
            log::error!(
                "Present info has {} swapchain(s) but {} image index(es)",
                self.swapchains.len(),
                self.image_indices.len()
            );
            return Err(vk::Result::ERROR_INITIALIZATION_FAILED);
        }
        Ok(())
    }

    fn raw(&self) -> vk::PresentInfoKHRBuilder<'_> {
        vk::PresentInfoKHR::builder()
            .wait_semaphores(&self.wait_semaphores)
            .swapchains(&self.swapchains)
            .image_indices(&self.image_indices)
    }
}

pub struct Queue {
    raw: vk::Queue,
    device: Arc<Device>,
    family_index: u32,
}

impl Queue {
    pub fn get(device: &Arc<Device>, family_index: u32, queue_index: u32) -> Self {
        let raw = unsafe { device.raw().get_device_queue(family_index, queue_index) };
        Self {
            raw,
            device: device.clone(),
            family_index,
        }
    }

    pub fn raw(&self) -> vk::Queue {
        self.raw
    }

    pub fn family_index(&self) -> u32 {
        self.family_index
    }

    pub fn submit(&self, info: &SubmitInfo, fence: Option<&Fence>) -> Result<(), SubmitError> {
        self.submit_raw(&[info.raw()], fence)
    }

    /// Empty batches are a no-op
    pub fn submit_all(
        &self,
        infos: &[SubmitInfo],
        fence: Option<&Fence>,
    ) -> Result<(), SubmitError> {
        if infos.is_empty() {
            return Ok(());
        }
        let raws: Vec<_> = infos.iter().map(SubmitInfo::raw).collect();
        self.submit_raw(&raws, fence)
    }

    pub fn submit_command_buffer(
        &self,
        command_buffer: &CommandBuffer,
        fence: Option<&Fence>,
    ) -> Result<(), SubmitError> {
        if !command_buffer.is_executable() {
            log::warn!("Submitting command buffer in state {:?}", command_buffer.state());
        }
        self.submit(&SubmitInfo::new().add_command_buffer(command_buffer), fence)
    }

    /// Submit one command buffer waiting on `wait` and signaling `signal`
    pub fn submit_frame(
        &self,
        command_buffer: &CommandBuffer,
        wait: &Semaphore,
        stage: vk::PipelineStageFlags,
        signal: &Semaphore,
        fence: &Fence,
    ) -> Result<(), SubmitError> {
        let info = SubmitInfo::new()
            .add_wait_semaphore(wait, stage)
            .add_command_buffer(command_buffer)
            .add_signal_semaphore(signal);
        self.submit(&info, Some(fence))
    }

    fn submit_raw(
        &self,
        infos: &[vk::SubmitInfo],
        fence: Option<&Fence>,
    ) -> Result<(), SubmitError> {
        let fence = fence.map(Fence::raw).unwrap_or_default();
        unsafe { self.device.raw().queue_submit(self.raw, infos, fence) }.map_err(SubmitError::from)
    }

    pub fn wait_idle(&self) -> Result<(), SubmitError> {
        unsafe { self.device.raw().queue_wait_idle(self.raw) }.map_err(SubmitError::from)
    }
}

/// A queue whose family can present to the target surface
pub struct PresentQueue(Queue);

impl PresentQueue {
    pub fn new(queue: Queue) -> Self {
        Self(queue)
    }

    pub fn queue(&self) -> &Queue {
        &self.0
    }

    /// Returns true when the swapchain is suboptimal
    pub fn present(&self, info: &PresentInfo) -> VkResult<bool> {
        info.check()?;
        unsafe {
            self.0
                .device
                .swapchain_loader()
                .queue_present(self.0.raw, &info.raw())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vk::handle::Handle;
    use ash::vk::Handle as _;

    fn semaphore(raw: u64) -> Handle<vk::Semaphore> {
        Handle::new(vk::Semaphore::from_raw(raw))
    }

    #[test]
    fn wait_semaphores_pair_with_stages() {
        let info = SubmitInfo::new()
            .add_wait_semaphore(&semaphore(1), vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
            .add_wait_semaphore(&semaphore(2), vk::PipelineStageFlags::TRANSFER)
            .add_signal_semaphore(&semaphore(3));
        let raw = info.raw();
        assert_eq!(raw.wait_semaphore_count, 2);
        assert_eq!(raw.signal_semaphore_count, 1);
        assert_eq!(raw.command_buffer_count, 0);
        assert_eq!(info.wait_stages.len(), info.wait_semaphores.len());
        assert_eq!(info.wait_stages[1], vk::PipelineStageFlags::TRANSFER);
    }

    #[test]
    fn present_info_indices() {
        let swapchain = Handle::new(vk::SwapchainKHR::from_raw(7));
        let info = PresentInfo::new()
            .add_swapchain(&swapchain, 2)
            .add_wait_semaphore(&semaphore(1));
        let raw = info.raw();
        assert_eq!(raw.swapchain_count, 1);
        assert_eq!(raw.wait_semaphore_count, 1);
        assert_eq!(info.image_indices, vec![2]);

        let info = info.set_image_index(0);
        assert_eq!(info.image_indices, vec![0]);
        let info = info.set_image_indices(&[1]);
        assert_eq!(info.image_indices, vec![1]);
        assert!(info.check().is_ok());
    }

    #[test]
    fn present_info_rejects_count_mismatch() {
        let swapchain = Handle::new(vk::SwapchainKHR::from_raw(7));
        let info = PresentInfo::new().add_swapchain(&swapchain, 0).set_image_indices(&[0, 1]);
        assert_eq!(info.check(), Err(vk::Result::ERROR_INITIALIZATION_FAILED));

        let info = info.set_image_indices(&[]);
        assert_eq!(info.check(), Err(vk::Result::ERROR_INITIALIZATION_FAILED));

        assert_eq!(
            PresentInfo::new().set_image_index(0).check(),
            Err(vk::Result::ERROR_INITIALIZATION_FAILED)
        );
    }
}
