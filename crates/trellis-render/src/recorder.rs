//! Per-frame command buffer recording.
//!
//! Recording is split in two: [`plan_draws`] turns the drawable list into a
//! flat command stream with redundant binds removed, and
//! [`CommandRecorder::record`] replays that stream into a Vulkan command
//! buffer inside the forward render pass.

use ash::vk;
use glam::Mat4;
use trellis_gpu::command::{begin_command_buffer, end_command_buffer};
use trellis_gpu::Result;

use crate::drawable::Drawable;

/// Descriptor set index of the per-frame camera uniforms.
pub const CAMERA_SET: u32 = 0;
/// Descriptor set index of the per-drawable material.
pub const MATERIAL_SET: u32 = 1;

/// One step of a recorded frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DrawCommand {
    BindVertexBuffer(vk::Buffer),
    BindIndexBuffer(vk::Buffer),
    BindMaterial(vk::DescriptorSet),
    PushTransform(Mat4),
    DrawIndexed { index_count: u32 },
}

/// Flatten drawables into draw commands.
///
/// Drawables with no indices are skipped. A buffer or material is only
/// rebound when it differs from the one currently bound.
pub fn plan_draws(drawables: &[Drawable]) -> Vec<DrawCommand> {
    let mut commands = Vec::with_capacity(drawables.len() * 2);
    let mut vertex_buffer = None;
    let mut index_buffer = None;
    let mut material = None;

    for drawable in drawables.iter().filter(|d| d.index_count > 0) {
        if vertex_buffer != Some(drawable.vertex_buffer) {
            vertex_buffer = Some(drawable.vertex_buffer);
            commands.push(DrawCommand::BindVertexBuffer(drawable.vertex_buffer));
        }
        if index_buffer != Some(drawable.index_buffer) {
            index_buffer = Some(drawable.index_buffer);
            commands.push(DrawCommand::BindIndexBuffer(drawable.index_buffer));
        }
        if material != Some(drawable.descriptor_set) {
            material = Some(drawable.descriptor_set);
            commands.push(DrawCommand::BindMaterial(drawable.descriptor_set));
        }
        commands.push(DrawCommand::PushTransform(drawable.transform));
        commands.push(DrawCommand::DrawIndexed {
            index_count: drawable.index_count,
        });
    }

    commands
}

/// Everything a frame's recording targets, borrowed from the current
/// swapchain resources.
#[derive(Debug, Clone, Copy)]
pub struct RecordTarget {
    pub render_pass: vk::RenderPass,
    pub framebuffer: vk::Framebuffer,
    pub extent: vk::Extent2D,
    pub pipeline: vk::Pipeline,
    pub pipeline_layout: vk::PipelineLayout,
    pub camera_set: vk::DescriptorSet,
    pub clear_color: [f32; 4],
}

/// Records the forward pass for one frame.
pub struct CommandRecorder;

impl CommandRecorder {
    /// Record `drawables` into `cmd`.
    ///
    /// # Safety
    /// `cmd` must have been reset and must not be pending execution. Every
    /// handle in `target` and `drawables` must be valid.
    pub unsafe fn record(
        device: &ash::Device,
        cmd: vk::CommandBuffer,
        target: &RecordTarget,
        drawables: &[Drawable],
    ) -> Result<()> {
        unsafe {
            begin_command_buffer(device, cmd, vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT)?;
        }

        let clear_values = [
            vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: target.clear_color,
                },
            },
            vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth: 1.0,
                    stencil: 0,
                },
            },
        ];

        let render_pass_info = vk::RenderPassBeginInfo::default()
            .render_pass(target.render_pass)
            .framebuffer(target.framebuffer)
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent: target.extent,
            })
            .clear_values(&clear_values);

        unsafe {
            device.cmd_begin_render_pass(cmd, &render_pass_info, vk::SubpassContents::INLINE);
            device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, target.pipeline);
            device.cmd_bind_descriptor_sets(
                cmd,
                vk::PipelineBindPoint::GRAPHICS,
                target.pipeline_layout,
                CAMERA_SET,
                &[target.camera_set],
                &[],
            );

            for command in plan_draws(drawables) {
                match command {
                    DrawCommand::BindVertexBuffer(buffer) => {
                        device.cmd_bind_vertex_buffers(cmd, 0, &[buffer], &[0]);
                    }
                    DrawCommand::BindIndexBuffer(buffer) => {
                        device.cmd_bind_index_buffer(cmd, buffer, 0, vk::IndexType::UINT32);
                    }
                    DrawCommand::BindMaterial(set) => {
                        device.cmd_bind_descriptor_sets(
                            cmd,
                            vk::PipelineBindPoint::GRAPHICS,
                            target.pipeline_layout,
                            MATERIAL_SET,
                            &[set],
                            &[],
                        );
                    }
                    DrawCommand::PushTransform(transform) => {
                        device.cmd_push_constants(
                            cmd,
                            target.pipeline_layout,
                            vk::ShaderStageFlags::VERTEX,
                            0,
                            bytemuck::bytes_of(&transform),
                        );
                    }
                    DrawCommand::DrawIndexed { index_count } => {
                        device.cmd_draw_indexed(cmd, index_count, 1, 0, 0, 0);
                    }
                }
            }

            device.cmd_end_render_pass(cmd);
            end_command_buffer(device, cmd)
        }
    }
}

/// Push constant range for the per-drawable model matrix.
pub fn transform_push_constant_range() -> vk::PushConstantRange {
    vk::PushConstantRange::default()
        .stage_flags(vk::ShaderStageFlags::VERTEX)
        .offset(0)
        .size(std::mem::size_of::<Mat4>() as u32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    fn drawable(vb: u64, ib: u64, set: u64, index_count: u32) -> Drawable {
        Drawable {
            transform: Mat4::IDENTITY,
            vertex_buffer: vk::Buffer::from_raw(vb),
            index_buffer: vk::Buffer::from_raw(ib),
            index_count,
            descriptor_set: vk::DescriptorSet::from_raw(set),
        }
    }

    #[test]
    fn empty_scene_records_nothing() {
        assert!(plan_draws(&[]).is_empty());
    }

    #[test]
    fn single_drawable() {
        let commands = plan_draws(&[drawable(1, 2, 3, 36)]);
        assert_eq!(
            commands,
            vec![
                DrawCommand::BindVertexBuffer(vk::Buffer::from_raw(1)),
                DrawCommand::BindIndexBuffer(vk::Buffer::from_raw(2)),
                DrawCommand::BindMaterial(vk::DescriptorSet::from_raw(3)),
                DrawCommand::PushTransform(Mat4::IDENTITY),
                DrawCommand::DrawIndexed { index_count: 36 },
            ]
        );
    }

    #[test]
    fn shared_buffers_bind_once() {
        let mut second = drawable(1, 2, 3, 36);
        second.transform = Mat4::from_translation(glam::Vec3::X);
        let commands = plan_draws(&[drawable(1, 2, 3, 36), second]);

        let binds = commands
            .iter()
            .filter(|c| {
                !matches!(
                    c,
                    DrawCommand::PushTransform(_) | DrawCommand::DrawIndexed { .. }
                )
            })
            .count();
        assert_eq!(binds, 3);
        assert_eq!(
            commands.last(),
            Some(&DrawCommand::DrawIndexed { index_count: 36 })
        );
        assert_eq!(
            commands[commands.len() - 2],
            DrawCommand::PushTransform(second.transform)
        );
    }

    #[test]
    fn material_change_rebinds_only_material() {
        let commands = plan_draws(&[drawable(1, 2, 3, 6), drawable(1, 2, 4, 6)]);
        assert_eq!(commands.len(), 8);
        assert_eq!(
            commands[5],
            DrawCommand::BindMaterial(vk::DescriptorSet::from_raw(4))
        );
    }

    #[test]
    fn empty_drawables_are_skipped() {
        let commands = plan_draws(&[drawable(1, 2, 3, 0), drawable(5, 6, 7, 12)]);
        assert_eq!(
            commands[0],
            DrawCommand::BindVertexBuffer(vk::Buffer::from_raw(5))
        );
        let draws = commands
            .iter()
            .filter(|c| matches!(c, DrawCommand::DrawIndexed { .. }))
            .count();
        assert_eq!(draws, 1);
    }

    #[test]
    fn push_range_holds_a_matrix() {
        assert_eq!(transform_push_constant_range().size, 64);
    }
}
