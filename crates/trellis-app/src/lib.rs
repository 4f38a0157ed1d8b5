//! Application framework for Trellis sandboxes.
//!
//! This crate provides a trait-based application framework that handles
//! common boilerplate like:
//! - Window creation and event pumping
//! - GPU context and renderer initialization
//! - Driving the frame loop, including swapchain recreation on resize
//! - Frame pacing and FPS statistics
//!
//! # Example
//!
//! ```no_run
//! use trellis_app::{run_app, AppConfig, AppContext, SandboxApp};
//! use trellis_render::{Scene, StaticScene};
//!
//! struct Empty {
//!     scene: StaticScene,
//! }
//!
//! impl SandboxApp for Empty {
//!     fn init(_ctx: &mut AppContext) -> anyhow::Result<Self> {
//!         Ok(Self {
//!             scene: StaticScene::default(),
//!         })
//!     }
//!
//!     fn update(&mut self, _ctx: &AppContext, _dt: f32) {}
//!
//!     fn scene(&self) -> &dyn Scene {
//!         &self.scene
//!     }
//! }
//!
//! fn main() -> anyhow::Result<()> {
//!     run_app::<Empty>(AppConfig::default())
//! }
//! ```

mod app;
mod context;
mod runner;
mod window;

pub use app::SandboxApp;
pub use context::AppContext;
pub use runner::{run_app, AppConfig, FpsStats};
pub use window::AppWindow;

// Re-export commonly used types for convenience
pub use trellis_gpu::{GpuContext, GpuContextBuilder};
pub use trellis_render::Camera;
pub use winit::event::WindowEvent;
