// Vulkan wrapper layer
//
// Thin RAII wrappers over ash. Every object owns its handle and keeps its
// parent (Arc<Device> / Arc<Instance>) alive; create infos are builders that
// own their data and produce the ash struct only when the object is created.

pub mod buffer;
pub mod command;
pub mod descriptors;
pub mod device;
pub mod enums;
pub mod error;
pub mod framebuffer;
pub mod handle;
pub mod image;
pub mod instance;
pub mod memory;
pub mod physical;
pub mod pipeline;
pub mod queue;
pub mod refs;
pub mod render_pass;
pub mod shader;
pub mod size;
pub mod structs;
pub mod surface;
pub mod swapchain;
pub mod sync;
pub mod window;

pub use buffer::{
    Buffer, BufferCopy, BufferCreateInfo, IndexBuffer, IndexBufferCreateInfo, UniformBuffer,
    UniformBufferCreateInfo, VertexBuffer, VertexBufferCreateInfo,
};
pub use command::{
    CommandBuffer, CommandBufferBeginInfo, CommandPool, CommandPoolCreateInfo, Encoder,
    RecordingState, RenderPassBeginInfo, RenderPassEncoder, TemporaryStaging,
};
pub use descriptors::{
    DescriptorBufferInfo, DescriptorPool, DescriptorPoolCreateInfo, DescriptorPoolSize,
    DescriptorSet, DescriptorSetAllocateInfo, DescriptorSetLayout, DescriptorSetLayoutBinding,
    DescriptorSetLayoutCreateInfo, DescriptorSetWriteBuffer,
};
pub use device::{Device, DeviceCreateInfo, DeviceQueueCreateInfo};
pub use enums::{IndexType, ShaderStage, ValidationType};
pub use error::{BindError, EncoderError, MapError, SubmitError};
pub use framebuffer::{Framebuffer, FramebufferCreateInfo};
pub use handle::{AsRaw, Handle};
pub use image::{Image, ImageCreateInfo, ImageView, ImageViewCreateInfo};
pub use instance::{ApplicationInfo, Instance, InstanceCreateInfo};
pub use memory::{DeviceMemory, Mapping, MappingSegment};
pub use physical::{PhysicalDevice, QueueFamily, QueueFamilies};
pub use pipeline::{
    ComputePipeline, ComputePipelineCreateInfo, GraphicsPipeline, GraphicsPipelineCreateInfo,
    Pipeline, PipelineLayout, PipelineLayoutCreateInfo,
};
pub use queue::{PresentInfo, PresentQueue, Queue, SubmitInfo};
pub use refs::{RawRef, Refable, Reference};
pub use render_pass::{RenderPass, RenderPassCreateInfo};
pub use shader::{Shader, ShaderModule};
pub use size::{Offset, Size, WHOLE_SIZE};
pub use surface::{Surface, SurfaceAttributes};
pub use swapchain::{Swapchain, SwapchainCreateInfo, SwapchainImage};
pub use sync::{Fence, Semaphore};
pub use window::Window;
