//! Application context.

use std::sync::Arc;
use std::time::Instant;

use ash::vk;
use trellis_gpu::GpuContext;
use trellis_render::{FrameBackend, VulkanRenderer};
use winit::window::Window;

/// Application context shared across all app methods.
pub struct AppContext {
    /// Renderer driving the swapchain. Declared first so it is dropped
    /// before the window.
    pub renderer: VulkanRenderer,
    /// The window handle.
    pub window: Arc<Window>,
    /// Frames presented so far.
    pub frame_count: u64,
    last_frame_time: Instant,
}

impl AppContext {
    pub(crate) fn new(window: Arc<Window>, renderer: VulkanRenderer) -> Self {
        Self {
            renderer,
            window,
            frame_count: 0,
            last_frame_time: Instant::now(),
        }
    }

    /// GPU context.
    pub fn gpu(&self) -> &Arc<GpuContext> {
        self.renderer.gpu()
    }

    /// Current swapchain extent.
    pub fn extent(&self) -> vk::Extent2D {
        self.renderer.extent()
    }

    /// Aspect ratio of the current swapchain, or 1 when it has no area.
    pub fn aspect_ratio(&self) -> f32 {
        let extent = self.extent();
        if extent.width == 0 || extent.height == 0 {
            1.0
        } else {
            extent.width as f32 / extent.height as f32
        }
    }

    /// Seconds since the previous call.
    pub(crate) fn tick(&mut self) -> f32 {
        let now = Instant::now();
        let dt = now.duration_since(self.last_frame_time).as_secs_f32();
        self.last_frame_time = now;
        dt
    }
}
