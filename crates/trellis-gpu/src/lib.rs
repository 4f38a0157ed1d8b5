//! Vulkan abstraction layer for the Trellis sandbox.
//!
//! This crate provides:
//! - Vulkan instance creation and validation-layer logging
//! - Adapter (physical device) selection and logical device creation
//! - Surface queries and swapchain creation/destruction
//! - The frame synchronization ring (semaphores, fences, command buffers)
//! - Memory allocation via gpu-allocator
//! - Render pass, framebuffer, pipeline and descriptor helpers
//!
//! Every Vulkan object is wrapped in a type that releases it on drop and
//! holds an `Arc<GpuContext>`, so the device always outlives its children.

pub mod adapter;
pub mod command;
pub mod context;
pub mod depth;
pub mod descriptors;
pub mod error;
pub mod instance;
pub mod memory;
pub mod pipeline;
pub mod surface;
pub mod swapchain;
pub mod sync;
pub mod texture;

pub use adapter::{Adapter, GpuVendor, QueueFamilyIndices};
pub use command::CommandPool;
pub use context::{GpuContext, GpuContextBuilder};
pub use depth::DepthResources;
pub use descriptors::{DescriptorPool, DescriptorSetLayout, DescriptorSetLayoutBuilder};
pub use error::{GpuError, Result, VkResultExt};
pub use memory::{GpuAllocator, GpuBuffer, GpuImage};
pub use pipeline::{Framebuffers, GraphicsPipeline, GraphicsPipelineConfig, RenderPass};
pub use surface::{SurfaceContext, SurfaceSupport};
pub use swapchain::{AcquireStatus, PresentStatus, Swapchain};
pub use sync::{Fence, FrameSlot, FrameSync, FrameSyncRing, Semaphore};
pub use texture::Texture;

pub use ash::vk;
