//! What the frame loop draws.

use ash::vk;
use glam::Mat4;

use crate::camera::CameraUniforms;

/// One object to draw. The frame loop only reads these; the buffers and the
/// descriptor set belong to whoever built the drawable.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Drawable {
    pub transform: Mat4,
    pub vertex_buffer: vk::Buffer,
    pub index_buffer: vk::Buffer,
    pub index_count: u32,
    /// Material set bound at set 1.
    pub descriptor_set: vk::DescriptorSet,
}

/// Per-frame provider of camera data and drawables.
pub trait Scene {
    /// Camera for a frame rendered at `extent`.
    fn camera(&self, extent: vk::Extent2D) -> CameraUniforms;

    /// Objects to draw this frame, in draw order.
    fn drawables(&self) -> &[Drawable];
}

/// A scene with a fixed camera and drawable list.
#[derive(Debug, Clone, Default)]
pub struct StaticScene {
    pub camera: CameraUniforms,
    pub drawables: Vec<Drawable>,
}

impl Scene for StaticScene {
    fn camera(&self, _extent: vk::Extent2D) -> CameraUniforms {
        self.camera
    }

    fn drawables(&self) -> &[Drawable] {
        &self.drawables
    }
}
