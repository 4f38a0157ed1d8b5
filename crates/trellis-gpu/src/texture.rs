//! Sampled 2D textures uploaded through a staging buffer.

use std::sync::Arc;

use ash::vk;
use gpu_allocator::MemoryLocation;

use crate::command::{execute_single_time_commands, CommandPool};
use crate::context::GpuContext;
use crate::error::{GpuError, Result, VkResultExt};
use crate::memory::{create_image_view, GpuBuffer, GpuImage};

/// Upper bound on requested anisotropy; clamped further by the adapter limit.
const MAX_ANISOTROPY: f32 = 16.0;

/// A shader-readable RGBA texture with its view and sampler.
pub struct Texture {
    gpu: Arc<GpuContext>,
    sampler: vk::Sampler,
    view: vk::ImageView,
    image: GpuImage,
}

impl Texture {
    /// Upload tightly packed RGBA8 sRGB pixels.
    ///
    /// Blocks until the copy has completed on `queue`.
    pub fn from_rgba8(
        gpu: &Arc<GpuContext>,
        pool: &CommandPool,
        queue: vk::Queue,
        width: u32,
        height: u32,
        pixels: &[u8],
    ) -> Result<Self> {
        let expected = width as usize * height as usize * 4;
        if width == 0 || height == 0 || pixels.len() != expected {
            return Err(GpuError::InvalidState(format!(
                "Texture {width}x{height} needs {expected} bytes, got {}",
                pixels.len()
            )));
        }

        let staging = GpuBuffer::with_data(
            gpu,
            pixels,
            vk::BufferUsageFlags::TRANSFER_SRC,
            "texture_staging",
        )?;

        let format = vk::Format::R8G8B8A8_SRGB;
        let extent = vk::Extent3D {
            width,
            height,
            depth: 1,
        };
        let image_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(format)
            .extent(extent)
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);
        let image = GpuImage::new(gpu, &image_info, MemoryLocation::GpuOnly, "texture")?;

        execute_single_time_commands(gpu, pool, queue, |device, cmd| unsafe {
            transition_layout(
                device,
                cmd,
                image.handle(),
                vk::ImageLayout::UNDEFINED,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            );

            let region = vk::BufferImageCopy::default()
                .image_subresource(
                    vk::ImageSubresourceLayers::default()
                        .aspect_mask(vk::ImageAspectFlags::COLOR)
                        .mip_level(0)
                        .base_array_layer(0)
                        .layer_count(1),
                )
                .image_extent(extent);
            device.cmd_copy_buffer_to_image(
                cmd,
                staging.handle(),
                image.handle(),
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[region],
            );

            transition_layout(
                device,
                cmd,
                image.handle(),
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            );
        })?;

        let view = unsafe {
            create_image_view(gpu.device(), image.handle(), format, vk::ImageAspectFlags::COLOR)
        }?;

        let anisotropy = gpu.adapter().max_sampler_anisotropy.min(MAX_ANISOTROPY);
        let sampler_info = vk::SamplerCreateInfo::default()
            .mag_filter(vk::Filter::LINEAR)
            .min_filter(vk::Filter::LINEAR)
            .address_mode_u(vk::SamplerAddressMode::REPEAT)
            .address_mode_v(vk::SamplerAddressMode::REPEAT)
            .address_mode_w(vk::SamplerAddressMode::REPEAT)
            .anisotropy_enable(true)
            .max_anisotropy(anisotropy)
            .border_color(vk::BorderColor::INT_OPAQUE_BLACK)
            .unnormalized_coordinates(false)
            .compare_enable(false)
            .mipmap_mode(vk::SamplerMipmapMode::LINEAR);

        let sampler = match unsafe { gpu.device().create_sampler(&sampler_info, None) }
            .check("vkCreateSampler")
        {
            Ok(sampler) => sampler,
            Err(e) => {
                unsafe { gpu.device().destroy_image_view(view, None) };
                return Err(e);
            }
        };

        tracing::debug!("Uploaded {width}x{height} texture");

        Ok(Self {
            gpu: gpu.clone(),
            sampler,
            view,
            image,
        })
    }

    /// Image view for sampling.
    pub fn view(&self) -> vk::ImageView {
        self.view
    }

    pub fn sampler(&self) -> vk::Sampler {
        self.sampler
    }

    pub fn extent(&self) -> vk::Extent3D {
        self.image.extent()
    }
}

impl Drop for Texture {
    fn drop(&mut self) {
        unsafe {
            self.gpu.device().destroy_sampler(self.sampler, None);
            self.gpu.device().destroy_image_view(self.view, None);
        }
    }
}

/// Record a colour image layout transition for the upload path.
unsafe fn transition_layout(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    image: vk::Image,
    old_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
) {
    let (src_access, dst_access, src_stage, dst_stage) = match new_layout {
        vk::ImageLayout::TRANSFER_DST_OPTIMAL => (
            vk::AccessFlags::empty(),
            vk::AccessFlags::TRANSFER_WRITE,
            vk::PipelineStageFlags::TOP_OF_PIPE,
            vk::PipelineStageFlags::TRANSFER,
        ),
        _ => (
            vk::AccessFlags::TRANSFER_WRITE,
            vk::AccessFlags::SHADER_READ,
            vk::PipelineStageFlags::TRANSFER,
            vk::PipelineStageFlags::FRAGMENT_SHADER,
        ),
    };

    let barrier = vk::ImageMemoryBarrier::default()
        .old_layout(old_layout)
        .new_layout(new_layout)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(image)
        .subresource_range(
            vk::ImageSubresourceRange::default()
                .aspect_mask(vk::ImageAspectFlags::COLOR)
                .base_mip_level(0)
                .level_count(1)
                .base_array_layer(0)
                .layer_count(1),
        )
        .src_access_mask(src_access)
        .dst_access_mask(dst_access);

    unsafe {
        device.cmd_pipeline_barrier(
            cmd,
            src_stage,
            dst_stage,
            vk::DependencyFlags::empty(),
            &[],
            &[],
            &[barrier],
        );
    }
}

/// RGBA8 checkerboard of `size`x`size` pixels with square cells of `cell` pixels.
pub fn checkerboard(size: u32, cell: u32, light: [u8; 4], dark: [u8; 4]) -> Vec<u8> {
    let cell = cell.max(1);
    let mut pixels = Vec::with_capacity(size as usize * size as usize * 4);
    for y in 0..size {
        for x in 0..size {
            let texel = if ((x / cell) + (y / cell)) % 2 == 0 {
                light
            } else {
                dark
            };
            pixels.extend_from_slice(&texel);
        }
    }
    pixels
}

#[cfg(test)]
mod tests {
    use super::*;

    const WHITE: [u8; 4] = [255, 255, 255, 255];
    const BLACK: [u8; 4] = [0, 0, 0, 255];

    fn texel(pixels: &[u8], size: u32, x: u32, y: u32) -> [u8; 4] {
        let i = ((y * size + x) * 4) as usize;
        [pixels[i], pixels[i + 1], pixels[i + 2], pixels[i + 3]]
    }

    #[test]
    fn checkerboard_size() {
        assert_eq!(checkerboard(64, 8, WHITE, BLACK).len(), 64 * 64 * 4);
    }

    #[test]
    fn checkerboard_alternates_cells() {
        let pixels = checkerboard(8, 2, WHITE, BLACK);
        assert_eq!(texel(&pixels, 8, 0, 0), WHITE);
        assert_eq!(texel(&pixels, 8, 1, 1), WHITE);
        assert_eq!(texel(&pixels, 8, 2, 0), BLACK);
        assert_eq!(texel(&pixels, 8, 0, 2), BLACK);
        assert_eq!(texel(&pixels, 8, 2, 2), WHITE);
        assert_eq!(texel(&pixels, 8, 6, 4), BLACK);
    }

    #[test]
    fn zero_cell_size_is_treated_as_one() {
        let pixels = checkerboard(2, 0, WHITE, BLACK);
        assert_eq!(texel(&pixels, 2, 0, 0), WHITE);
        assert_eq!(texel(&pixels, 2, 1, 0), BLACK);
    }
}
