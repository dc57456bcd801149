// Synchronization primitives
//
// Fences for GPU-CPU sync, semaphores for GPU-GPU sync

use anyhow::{Context, Result};
use ash::vk;
use std::sync::Arc;

use super::device::Device;
use super::handle::{impl_as_raw, Handle};

#[derive(Debug, Clone, Copy, Default)]
pub struct FenceCreateInfo {
    pub signaled: bool,
}

impl FenceCreateInfo {
    pub fn new(signaled: bool) -> Self {
        Self { signaled }
    }

    fn flags(&self) -> vk::FenceCreateFlags {
        if self.signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        }
    }
}

pub struct Fence {
    handle: Handle<vk::Fence>,
    device: Arc<Device>,
}

impl Fence {
    pub fn create(device: &Arc<Device>, signaled: bool) -> Result<Self> {
        Self::create_with(device, &FenceCreateInfo::new(signaled))
    }

    pub fn create_with(device: &Arc<Device>, info: &FenceCreateInfo) -> Result<Self> {
        let create_info = vk::FenceCreateInfo::builder().flags(info.flags());
        let raw = unsafe { device.raw().create_fence(&create_info, None) }
            .context("Failed to create fence")?;
        Ok(Self {
            handle: Handle::new(raw),
            device: device.clone(),
        })
    }

    pub fn raw(&self) -> vk::Fence {
        self.handle.raw()
    }

    /// Wait up to `timeout` ns. Returns false on timeout.
    /// With `auto_reset` a signaled fence is reset before returning.
    pub fn wait(&self, auto_reset: bool, timeout: u64) -> Result<bool> {
        match unsafe { self.device.raw().wait_for_fences(&[self.raw()], true, timeout) } {
            Ok(()) => {
                if auto_reset {
                    self.reset()?;
                }
                Ok(true)
            }
            Err(vk::Result::TIMEOUT) => Ok(false),
            Err(e) => Err(e).context("Failed to wait for fence"),
        }
    }

    pub fn reset(&self) -> Result<()> {
        unsafe { self.device.raw().reset_fences(&[self.raw()]) }.context("Failed to reset fence")
    }

    pub fn is_signaled(&self) -> Result<bool> {
        unsafe { self.device.raw().get_fence_status(self.raw()) }.context("Failed to query fence")
    }
}

impl_as_raw!(Fence, vk::Fence);

impl Drop for Fence {
    fn drop(&mut self) {
        if let Some(raw) = self.handle.take() {
            unsafe { self.device.raw().destroy_fence(raw, None) };
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SemaphoreCreateInfo;

pub struct Semaphore {
    handle: Handle<vk::Semaphore>,
    device: Arc<Device>,
}

impl Semaphore {
    pub fn create(device: &Arc<Device>) -> Result<Self> {
        Self::create_with(device, &SemaphoreCreateInfo)
    }

    pub fn create_with(device: &Arc<Device>, _info: &SemaphoreCreateInfo) -> Result<Self> {
        let create_info = vk::SemaphoreCreateInfo::builder();
        let raw = unsafe { device.raw().create_semaphore(&create_info, None) }
            .context("Failed to create semaphore")?;
        Ok(Self {
            handle: Handle::new(raw),
            device: device.clone(),
        })
    }

    pub fn raw(&self) -> vk::Semaphore {
        self.handle.raw()
    }
}

impl_as_raw!(Semaphore, vk::Semaphore);

impl Drop for Semaphore {
    fn drop(&mut self) {
        if let Some(raw) = self.handle.take() {
            unsafe { self.device.raw().destroy_semaphore(raw, None) };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fence_flags() {
        assert_eq!(FenceCreateInfo::new(true).flags(), vk::FenceCreateFlags::SIGNALED);
        assert!(FenceCreateInfo::default().flags().is_empty());
    }
}
