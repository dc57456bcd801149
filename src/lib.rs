// vkwrap - RAII and builder layer over Vulkan
//
// Design: Thin wrapper around ash with ownership and liveness tracking
// Every wrapper owns exactly one native handle and destroys it on drop.
//
// LAYOUT:
// ┌─────────────────────────────────────────────────────────────────┐
// │  engine (logging init, device selection, App trait)             │
// │    └── vk::Instance / PhysicalDevice / Device (factories)       │
// │          └── Buffer, DeviceMemory, Image, Pipeline, Swapchain   │
// │                └── CommandBuffer -> Encoder -> RenderPass       │
// │                      └── Queue submission + sync                │
// └─────────────────────────────────────────────────────────────────┘

pub mod config;
pub mod engine;
pub mod vk;

pub use config::Config;
