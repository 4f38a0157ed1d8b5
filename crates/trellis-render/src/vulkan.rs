//! Vulkan implementation of [`FrameBackend`]: a forward renderer drawing
//! textured meshes into the swapchain.

use std::sync::Arc;

use ash::vk;
use gpu_allocator::MemoryLocation;
use trellis_core::constants::{DEFAULT_MATERIAL_CAPACITY, FENCE_TIMEOUT_NS, MAX_FRAMES_IN_FLIGHT};
use trellis_gpu::command::{reset_command_buffer, submit_command_buffers};
use trellis_gpu::depth::supported_depth_format;
use trellis_gpu::descriptors::{write_combined_image_sampler, write_uniform_buffer};
use trellis_gpu::{
    AcquireStatus, CommandPool, DepthResources, DescriptorPool, DescriptorSetLayout,
    DescriptorSetLayoutBuilder, Framebuffers, FrameSyncRing, GpuBuffer, GpuContext, GpuError,
    GraphicsPipeline, GraphicsPipelineConfig, PresentStatus, RenderPass, Result, Swapchain,
    Texture,
};

use crate::camera::CameraUniforms;
use crate::drawable::Drawable;
use crate::frame_loop::FrameBackend;
use crate::mesh::{Mesh, MeshData, Vertex};
use crate::recorder::{transform_push_constant_range, CommandRecorder, RecordTarget};

/// Renderer configuration.
#[derive(Debug, Clone)]
pub struct RendererConfig {
    /// Prefer FIFO presentation over MAILBOX.
    pub vsync: bool,
    /// Number of material descriptor sets; the pool never grows past it.
    pub material_capacity: u32,
    pub clear_color: [f32; 4],
    pub frames_in_flight: usize,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            vsync: true,
            material_capacity: DEFAULT_MATERIAL_CAPACITY,
            clear_color: [0.02, 0.02, 0.04, 1.0],
            frames_in_flight: MAX_FRAMES_IN_FLIGHT,
        }
    }
}

/// Everything rebuilt with the swapchain.
///
/// Field order is drop order: framebuffers go before the depth and swapchain
/// views they reference, the pipeline before its render pass.
struct SwapchainResources {
    camera_sets: Vec<vk::DescriptorSet>,
    _camera_pool: DescriptorPool,
    framebuffers: Framebuffers,
    pipeline: GraphicsPipeline,
    render_pass: RenderPass,
    _depth: DepthResources,
    swapchain: Swapchain,
}

impl SwapchainResources {
    fn new(
        gpu: &Arc<GpuContext>,
        width: u32,
        height: u32,
        config: &RendererConfig,
        depth_format: vk::Format,
        layouts: &Layouts,
        uniform_buffers: &[GpuBuffer],
    ) -> Result<Self> {
        let swapchain = Swapchain::new(gpu, width, height, config.vsync)?;
        let extent = swapchain.extent();

        let depth = DepthResources::new(gpu, extent, depth_format)?;
        let render_pass = RenderPass::new(gpu, swapchain.format(), depth_format)?;
        let framebuffers = Framebuffers::new(
            gpu,
            &render_pass,
            swapchain.image_views(),
            depth.view(),
            extent,
        )?;

        let pipeline_config = GraphicsPipelineConfig {
            vertex_shader: trellis_shaders::mesh_vertex_shader(),
            fragment_shader: trellis_shaders::mesh_fragment_shader(),
            vertex_bindings: Vertex::binding_descriptions(),
            vertex_attributes: Vertex::attribute_descriptions(),
            extent,
            ..Default::default()
        };
        let pipeline = GraphicsPipeline::new(
            gpu,
            &pipeline_config,
            &render_pass,
            &[layouts.camera.handle(), layouts.material.handle()],
            &[transform_push_constant_range()],
        )?;

        let sets = uniform_buffers.len();
        let mut camera_pool = DescriptorPool::for_layout(gpu, &layouts.camera, sets as u32)?;
        let camera_sets = camera_pool.allocate_many(layouts.camera.handle(), sets)?;
        for (&set, buffer) in camera_sets.iter().zip(uniform_buffers) {
            unsafe {
                write_uniform_buffer(gpu.device(), set, 0, buffer.handle(), 0, buffer.size());
            }
        }

        tracing::info!(
            "Swapchain resources ready: {}x{}, {} images, {:?}",
            extent.width,
            extent.height,
            swapchain.image_count(),
            swapchain.present_mode()
        );

        Ok(Self {
            camera_sets,
            _camera_pool: camera_pool,
            framebuffers,
            pipeline,
            render_pass,
            _depth: depth,
            swapchain,
        })
    }
}

struct Layouts {
    camera: DescriptorSetLayout,
    material: DescriptorSetLayout,
}

/// Forward renderer over the frame sync ring.
pub struct VulkanRenderer {
    config: RendererConfig,
    depth_format: vk::Format,
    resources: Option<SwapchainResources>,
    ring: FrameSyncRing,
    uniform_buffers: Vec<GpuBuffer>,
    material_pool: DescriptorPool,
    layouts: Layouts,
    upload_pool: CommandPool,
    gpu: Arc<GpuContext>,
}

impl VulkanRenderer {
    /// Create the renderer and its first swapchain at `width`x`height`.
    pub fn new(
        gpu: &Arc<GpuContext>,
        width: u32,
        height: u32,
        config: RendererConfig,
    ) -> Result<Self> {
        let depth_format = supported_depth_format(gpu)?;

        let layouts = Layouts {
            camera: DescriptorSetLayoutBuilder::new()
                .uniform_buffer(0, vk::ShaderStageFlags::VERTEX)
                .build(gpu)?,
            material: DescriptorSetLayoutBuilder::new()
                .combined_image_sampler(0, vk::ShaderStageFlags::FRAGMENT)
                .build(gpu)?,
        };
        let material_pool =
            DescriptorPool::for_layout(gpu, &layouts.material, config.material_capacity)?;

        let ring = FrameSyncRing::new(gpu, config.frames_in_flight)?;
        let uniform_buffers = (0..ring.frames_in_flight())
            .map(|slot| {
                GpuBuffer::new(
                    gpu,
                    std::mem::size_of::<CameraUniforms>() as u64,
                    vk::BufferUsageFlags::UNIFORM_BUFFER,
                    MemoryLocation::CpuToGpu,
                    &format!("camera_uniforms_{slot}"),
                )
            })
            .collect::<Result<Vec<_>>>()?;

        let upload_pool = CommandPool::new(
            gpu,
            gpu.graphics_queue_family(),
            vk::CommandPoolCreateFlags::TRANSIENT,
        )?;

        let resources = SwapchainResources::new(
            gpu,
            width,
            height,
            &config,
            depth_format,
            &layouts,
            &uniform_buffers,
        )?;

        tracing::info!(
            "Renderer initialized: {} frames in flight, {} material slots, depth {:?}",
            ring.frames_in_flight(),
            config.material_capacity,
            depth_format
        );

        Ok(Self {
            config,
            depth_format,
            resources: Some(resources),
            ring,
            uniform_buffers,
            material_pool,
            layouts,
            upload_pool,
            gpu: gpu.clone(),
        })
    }

    pub fn gpu(&self) -> &Arc<GpuContext> {
        &self.gpu
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    /// Material descriptor sets still available.
    pub fn remaining_materials(&self) -> u32 {
        self.material_pool.remaining()
    }

    /// Upload RGBA8 pixels as a sampled texture.
    pub fn create_texture(&self, width: u32, height: u32, pixels: &[u8]) -> Result<Texture> {
        Texture::from_rgba8(
            &self.gpu,
            &self.upload_pool,
            self.gpu.graphics_queue(),
            width,
            height,
            pixels,
        )
    }

    /// Allocate a material set sampling `texture`.
    ///
    /// Fails with [`GpuError::DescriptorPoolExhausted`] once the configured
    /// capacity is used up. The texture must outlive every frame drawing
    /// with the returned set.
    pub fn create_material(&mut self, texture: &Texture) -> Result<vk::DescriptorSet> {
        let set = self
            .material_pool
            .allocate(&[self.layouts.material.handle()])?
            .into_iter()
            .next()
            .ok_or_else(|| GpuError::InvalidState("No material set allocated".to_string()))?;

        unsafe {
            write_combined_image_sampler(
                self.gpu.device(),
                set,
                0,
                texture.view(),
                texture.sampler(),
            );
        }

        Ok(set)
    }

    /// Upload mesh geometry.
    pub fn upload_mesh(&self, data: &MeshData) -> Result<Mesh> {
        Mesh::upload(&self.gpu, data)
    }

    fn resources(&self) -> Result<&SwapchainResources> {
        self.resources
            .as_ref()
            .ok_or_else(|| GpuError::InvalidState("Swapchain resources destroyed".to_string()))
    }
}

impl FrameBackend for VulkanRenderer {
    fn frames_in_flight(&self) -> usize {
        self.ring.frames_in_flight()
    }

    fn extent(&self) -> vk::Extent2D {
        self.resources
            .as_ref()
            .map(|r| r.swapchain.extent())
            .unwrap_or_default()
    }

    fn wait_for_slot(&mut self, slot: usize) -> Result<()> {
        self.ring.wait(slot, FENCE_TIMEOUT_NS)
    }

    fn acquire_image(&mut self, slot: usize) -> Result<AcquireStatus> {
        let semaphore = self.ring.slot(slot)?.image_available;
        self.resources()?.swapchain.acquire_next_image(semaphore)
    }

    fn update_frame_data(&mut self, slot: usize, camera: &CameraUniforms) -> Result<()> {
        let buffer = self.uniform_buffers.get(slot).ok_or_else(|| {
            GpuError::InvalidState(format!("No uniform buffer for frame slot {slot}"))
        })?;
        buffer.write(std::slice::from_ref(camera))
    }

    fn reset_slot(&mut self, slot: usize) -> Result<()> {
        self.ring.reset(slot)
    }

    fn record(&mut self, slot: usize, image_index: u32, drawables: &[Drawable]) -> Result<()> {
        let frame = self.ring.slot(slot)?;
        let resources = self.resources()?;
        let camera_set = *resources.camera_sets.get(slot).ok_or_else(|| {
            GpuError::InvalidState(format!("No camera set for frame slot {slot}"))
        })?;

        let target = RecordTarget {
            render_pass: resources.render_pass.handle(),
            framebuffer: resources.framebuffers.get(image_index)?,
            extent: resources.swapchain.extent(),
            pipeline: resources.pipeline.handle(),
            pipeline_layout: resources.pipeline.layout(),
            camera_set,
            clear_color: self.config.clear_color,
        };

        let device = self.gpu.device();
        unsafe {
            reset_command_buffer(device, frame.command_buffer)?;
            CommandRecorder::record(device, frame.command_buffer, &target, drawables)
        }
    }

    fn submit(&mut self, slot: usize) -> Result<()> {
        let frame = self.ring.slot(slot)?;
        unsafe {
            submit_command_buffers(
                self.gpu.device(),
                self.gpu.graphics_queue(),
                &[frame.command_buffer],
                &[frame.image_available],
                &[vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT],
                &[frame.render_finished],
                frame.in_flight,
            )
        }
    }

    fn present(&mut self, slot: usize, image_index: u32) -> Result<PresentStatus> {
        let frame = self.ring.slot(slot)?;
        self.resources()?.swapchain.present(
            self.gpu.present_queue(),
            image_index,
            &[frame.render_finished],
        )
    }

    fn wait_idle(&mut self) -> Result<()> {
        self.gpu.wait_idle()
    }

    fn destroy_swapchain_resources(&mut self) {
        self.ring.destroy_sync_objects();
        if self.resources.take().is_some() {
            tracing::debug!("Swapchain resources destroyed");
        }
    }

    fn create_swapchain_resources(&mut self, width: u32, height: u32) -> Result<()> {
        let resources = SwapchainResources::new(
            &self.gpu,
            width,
            height,
            &self.config,
            self.depth_format,
            &self.layouts,
            &self.uniform_buffers,
        )?;
        self.resources = Some(resources);

        self.ring.reallocate_command_buffers()?;
        self.ring.create_sync_objects(&self.gpu)
    }
}

impl Drop for VulkanRenderer {
    fn drop(&mut self) {
        if let Err(e) = self.gpu.wait_idle() {
            tracing::error!("Failed to wait for device idle during renderer teardown: {e}");
        }
        self.destroy_swapchain_resources();
    }
}
