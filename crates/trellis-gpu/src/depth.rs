//! Depth buffer sized to the swapchain.

use std::sync::Arc;

use ash::vk;
use gpu_allocator::MemoryLocation;

use crate::context::GpuContext;
use crate::error::{GpuError, Result};
use crate::memory::{create_image_view, GpuImage};

/// Depth formats in order of preference.
pub const DEPTH_FORMAT_CANDIDATES: [vk::Format; 3] = [
    vk::Format::D32_SFLOAT,
    vk::Format::D32_SFLOAT_S8_UINT,
    vk::Format::D24_UNORM_S8_UINT,
];

/// First candidate whose optimal-tiling features include depth attachment.
pub fn find_depth_format(
    candidates: &[vk::Format],
    mut optimal_features: impl FnMut(vk::Format) -> vk::FormatFeatureFlags,
) -> Option<vk::Format> {
    candidates.iter().copied().find(|&format| {
        optimal_features(format).contains(vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT)
    })
}

/// Whether the format carries a stencil component.
pub fn has_stencil_component(format: vk::Format) -> bool {
    matches!(
        format,
        vk::Format::D32_SFLOAT_S8_UINT | vk::Format::D24_UNORM_S8_UINT
    )
}

/// Pick the depth format supported by the context's adapter.
pub fn supported_depth_format(gpu: &GpuContext) -> Result<vk::Format> {
    find_depth_format(&DEPTH_FORMAT_CANDIDATES, |format| unsafe {
        gpu.instance()
            .get_physical_device_format_properties(gpu.physical_device(), format)
            .optimal_tiling_features
    })
    .ok_or_else(|| GpuError::InvalidState("No supported depth format".to_string()))
}

/// Depth image and view.
pub struct DepthResources {
    gpu: Arc<GpuContext>,
    view: vk::ImageView,
    // Dropped after the view.
    image: GpuImage,
    extent: vk::Extent2D,
}

impl DepthResources {
    /// Create a depth buffer of `extent` in `format`.
    pub fn new(gpu: &Arc<GpuContext>, extent: vk::Extent2D, format: vk::Format) -> Result<Self> {
        if extent.width == 0 || extent.height == 0 {
            return Err(GpuError::InvalidState(
                "Depth buffer dimensions must be greater than 0".to_string(),
            ));
        }

        let image_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(format)
            .extent(vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let image = GpuImage::new(gpu, &image_info, MemoryLocation::GpuOnly, "depth_buffer")?;
        let view = unsafe {
            create_image_view(
                gpu.device(),
                image.handle(),
                format,
                vk::ImageAspectFlags::DEPTH,
            )
        }?;

        tracing::debug!(
            "Created depth buffer: {}x{} ({:?})",
            extent.width,
            extent.height,
            format
        );

        Ok(Self {
            gpu: gpu.clone(),
            view,
            image,
            extent,
        })
    }

    /// Image view used as the depth attachment.
    pub fn view(&self) -> vk::ImageView {
        self.view
    }

    /// Depth format.
    pub fn format(&self) -> vk::Format {
        self.image.format()
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }
}

impl Drop for DepthResources {
    fn drop(&mut self) {
        unsafe { self.gpu.device().destroy_image_view(self.view, None) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn picks_first_supported_candidate() {
        let format = find_depth_format(&DEPTH_FORMAT_CANDIDATES, |format| {
            if format == vk::Format::D32_SFLOAT {
                vk::FormatFeatureFlags::SAMPLED_IMAGE
            } else {
                vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT
            }
        });
        assert_eq!(format, Some(vk::Format::D32_SFLOAT_S8_UINT));
    }

    #[test]
    fn prefers_d32() {
        let format = find_depth_format(&DEPTH_FORMAT_CANDIDATES, |_| {
            vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT
        });
        assert_eq!(format, Some(vk::Format::D32_SFLOAT));
    }

    #[test]
    fn none_when_unsupported() {
        let format =
            find_depth_format(&DEPTH_FORMAT_CANDIDATES, |_| vk::FormatFeatureFlags::empty());
        assert_eq!(format, None);
    }

    #[test]
    fn stencil_formats() {
        assert!(!has_stencil_component(vk::Format::D32_SFLOAT));
        assert!(has_stencil_component(vk::Format::D24_UNORM_S8_UINT));
    }
}
