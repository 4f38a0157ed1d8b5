//! `SandboxApp` trait definition.

use trellis_render::Scene;
use winit::event::WindowEvent;

use crate::context::AppContext;

/// Trait for Trellis sandboxes.
///
/// The runner owns the window, the renderer and the frame loop; an app only
/// provides its state, how it changes over time, and the scene to draw.
pub trait SandboxApp: Sized {
    /// Initialize the application.
    ///
    /// Called once after the window, GPU context and renderer exist. Upload
    /// meshes and textures here.
    fn init(ctx: &mut AppContext) -> anyhow::Result<Self>;

    /// Update application state.
    ///
    /// Called every iteration before the frame is rendered.
    ///
    /// # Arguments
    /// * `ctx` - Application context with renderer and window access
    /// * `dt` - Delta time in seconds since the last iteration
    fn update(&mut self, ctx: &AppContext, dt: f32);

    /// The scene the next frame draws.
    fn scene(&self) -> &dyn Scene;

    /// Handle a swapchain rebuild at a new size.
    ///
    /// Default implementation does nothing.
    #[allow(unused_variables)]
    fn on_resize(&mut self, ctx: &mut AppContext, width: u32, height: u32) -> anyhow::Result<()> {
        Ok(())
    }

    /// Handle a window event.
    ///
    /// Default implementation does nothing.
    #[allow(unused_variables)]
    fn on_event(&mut self, event: &WindowEvent) {}

    /// Cleanup resources before shutdown.
    ///
    /// The GPU is idle when this is called, so it is safe to drop GPU
    /// resources.
    #[allow(unused_variables)]
    fn cleanup(&mut self, ctx: &mut AppContext) {}
}
