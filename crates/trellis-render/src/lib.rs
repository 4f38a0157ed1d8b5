//! Frame loop and forward renderer for the Trellis sandbox.
//!
//! This crate provides:
//! - The backend-agnostic frame loop controller and swapchain recreation
//!   state machine ([`FrameLoop`])
//! - A Vulkan backend for it ([`VulkanRenderer`])
//! - Per-frame command recording for drawable objects
//! - Camera uniforms and indexed meshes

pub mod camera;
pub mod drawable;
pub mod frame_loop;
pub mod mesh;
pub mod recorder;
pub mod vulkan;

pub use camera::{Camera, CameraUniforms};
pub use drawable::{Drawable, Scene, StaticScene};
pub use frame_loop::{
    FrameBackend, FrameLoop, FrameOutcome, FrameStats, LoopState, PresentationWindow,
};
pub use mesh::{Mesh, MeshData, Vertex};
pub use recorder::{plan_draws, CommandRecorder, DrawCommand, RecordTarget};
pub use vulkan::{RendererConfig, VulkanRenderer};
