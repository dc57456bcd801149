// Typed errors for operations with a closed set of failure kinds
//
// Everything else returns anyhow::Result with context. These enums convert
// into anyhow::Error through `?`.

use ash::vk;
use thiserror::Error;

/// Binding memory to a buffer or image
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindError {
    #[error("Out of host memory")]
    OutOfHostMemory,
    #[error("Out of device memory")]
    OutOfDeviceMemory,
    #[error("Invalid opaque capture address")]
    InvalidOpaqueCaptureAddress,
    #[error("Memory too small: need {required} bytes at offset {offset}, memory has {available}")]
    MemoryTooSmall { required: u64, offset: u64, available: u64 },
    #[error("Offset {offset} is not aligned to {alignment}")]
    AlignmentMismatch { offset: u64, alignment: u64 },
    #[error("Memory has been freed")]
    MemoryDestroyed,
    #[error("Resource is already bound to memory")]
    AlreadyBound,
    #[error("Bind failed: {0}")]
    Other(vk::Result),
}

impl From<vk::Result> for BindError {
    fn from(result: vk::Result) -> Self {
        match result {
            vk::Result::ERROR_OUT_OF_HOST_MEMORY => BindError::OutOfHostMemory,
            vk::Result::ERROR_OUT_OF_DEVICE_MEMORY => BindError::OutOfDeviceMemory,
            vk::Result::ERROR_INVALID_OPAQUE_CAPTURE_ADDRESS => {
                BindError::InvalidOpaqueCaptureAddress
            }
            other => BindError::Other(other),
        }
    }
}

/// Queue submission and queue waits
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitError {
    #[error("Out of host memory")]
    OutOfHostMemory,
    #[error("Out of device memory")]
    OutOfDeviceMemory,
    #[error("Device lost")]
    DeviceLost,
    #[error("Submit failed: {0}")]
    Other(vk::Result),
}

pub type QueueWaitError = SubmitError;

impl From<vk::Result> for SubmitError {
    fn from(result: vk::Result) -> Self {
        match result {
            vk::Result::ERROR_OUT_OF_HOST_MEMORY => SubmitError::OutOfHostMemory,
            vk::Result::ERROR_OUT_OF_DEVICE_MEMORY => SubmitError::OutOfDeviceMemory,
            vk::Result::ERROR_DEVICE_LOST => SubmitError::DeviceLost,
            other => SubmitError::Other(other),
        }
    }
}

/// Mapping device memory and writing through a mapping
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapError {
    #[error("Memory has been freed")]
    MemoryDestroyed,
    #[error("Memory is not host visible")]
    NotMappable,
    #[error("Memory is already mapped")]
    AlreadyMapped,
    #[error("Range {offset}+{size} exceeds {limit} bytes")]
    OutOfBounds { offset: u64, size: u64, limit: u64 },
    #[error("Mapping is no longer valid")]
    MappingInvalid,
    #[error("Map failed: {0}")]
    Vulkan(vk::Result),
}

/// Recording inside a render pass
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncoderError {
    #[error("No pipeline bound")]
    NoPipelineBound,
    #[error("Bound pipeline has been destroyed")]
    PipelineDestroyed,
    #[error("Pipeline layout has been destroyed")]
    LayoutDestroyed,
    #[error("Render pass has been destroyed")]
    RenderPassDestroyed,
    #[error("Framebuffer has been destroyed")]
    FramebufferDestroyed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_error_from_native() {
        assert_eq!(
            BindError::from(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY),
            BindError::OutOfDeviceMemory
        );
        assert_eq!(
            BindError::from(vk::Result::ERROR_INVALID_OPAQUE_CAPTURE_ADDRESS),
            BindError::InvalidOpaqueCaptureAddress
        );
        assert_eq!(
            BindError::from(vk::Result::ERROR_UNKNOWN),
            BindError::Other(vk::Result::ERROR_UNKNOWN)
        );
    }

    #[test]
    fn submit_error_from_native() {
        assert_eq!(SubmitError::from(vk::Result::ERROR_DEVICE_LOST), SubmitError::DeviceLost);
        assert_eq!(
            SubmitError::from(vk::Result::ERROR_OUT_OF_HOST_MEMORY),
            SubmitError::OutOfHostMemory
        );
    }

    #[test]
    fn errors_convert_to_anyhow() {
        let err: anyhow::Error = MapError::AlreadyMapped.into();
        assert_eq!(err.to_string(), "Memory is already mapped");
    }
}
