//! Swapchain management.

use std::sync::Arc;

use ash::vk;
use trellis_core::constants::FENCE_TIMEOUT_NS;

use crate::context::GpuContext;
use crate::error::{GpuError, Result, VkResultExt};
use crate::memory::create_image_view;

/// Preferred surface format.
pub const PREFERRED_SURFACE_FORMAT: vk::SurfaceFormatKHR = vk::SurfaceFormatKHR {
    format: vk::Format::B8G8R8A8_SRGB,
    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
};

/// Outcome of asking the presentation engine for an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireStatus {
    /// An image was acquired. It may still be suboptimal for the surface.
    Acquired { image_index: u32, suboptimal: bool },
    /// The swapchain no longer matches the surface; no image was acquired.
    OutOfDate,
}

/// Outcome of handing an image back to the presentation engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentStatus {
    Presented,
    Suboptimal,
    OutOfDate,
}

impl PresentStatus {
    /// Whether the swapchain should be recreated.
    pub fn needs_recreation(self) -> bool {
        !matches!(self, Self::Presented)
    }
}

/// Swapchain wrapper. Owns the image views; the images belong to the
/// presentation engine.
pub struct Swapchain {
    gpu: Arc<GpuContext>,
    swapchain: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    image_views: Vec<vk::ImageView>,
    format: vk::SurfaceFormatKHR,
    present_mode: vk::PresentModeKHR,
    extent: vk::Extent2D,
}

impl Swapchain {
    /// Create a swapchain for the context's surface at the given window size.
    ///
    /// Fails with [`GpuError::SurfaceUnsupported`] if the surface reports no
    /// formats or no present modes.
    pub fn new(gpu: &Arc<GpuContext>, width: u32, height: u32, vsync: bool) -> Result<Self> {
        let support = gpu.surface().support(gpu.physical_device())?;

        let format = select_surface_format(&support.formats)
            .ok_or(GpuError::SurfaceUnsupported("no surface formats"))?;
        if support.present_modes.is_empty() {
            return Err(GpuError::SurfaceUnsupported("no present modes"));
        }
        let present_mode = select_present_mode(&support.present_modes, vsync);
        let extent = choose_extent(&support.capabilities, width, height);
        let image_count = choose_image_count(&support.capabilities);

        let queue_families = [gpu.graphics_queue_family(), gpu.present_queue_family()];
        let mut create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(gpu.surface().handle())
            .min_image_count(image_count)
            .image_format(format.format)
            .image_color_space(format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .pre_transform(support.capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true);

        create_info = if queue_families[0] == queue_families[1] {
            create_info.image_sharing_mode(vk::SharingMode::EXCLUSIVE)
        } else {
            create_info
                .image_sharing_mode(vk::SharingMode::CONCURRENT)
                .queue_family_indices(&queue_families)
        };

        let loader = gpu.swapchain_loader();
        let swapchain = unsafe { loader.create_swapchain(&create_info, None) }
            .check("vkCreateSwapchainKHR")?;

        // From here on, drop destroys whatever has been created.
        let mut this = Self {
            gpu: gpu.clone(),
            swapchain,
            images: Vec::new(),
            image_views: Vec::new(),
            format,
            present_mode,
            extent,
        };

        this.images = unsafe { loader.get_swapchain_images(swapchain) }
            .check("vkGetSwapchainImagesKHR")?;

        for &image in &this.images {
            let view = unsafe {
                create_image_view(
                    gpu.device(),
                    image,
                    format.format,
                    vk::ImageAspectFlags::COLOR,
                )
            }?;
            this.image_views.push(view);
        }

        tracing::info!(
            "Swapchain created: {}x{}, {} images, {:?}, {:?}",
            extent.width,
            extent.height,
            this.images.len(),
            format.format,
            present_mode
        );

        Ok(this)
    }

    /// Raw swapchain handle.
    pub fn handle(&self) -> vk::SwapchainKHR {
        self.swapchain
    }

    /// Chosen extent.
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// Chosen image format.
    pub fn format(&self) -> vk::Format {
        self.format.format
    }

    /// Chosen format and colour space.
    pub fn surface_format(&self) -> vk::SurfaceFormatKHR {
        self.format
    }

    /// Chosen present mode.
    pub fn present_mode(&self) -> vk::PresentModeKHR {
        self.present_mode
    }

    /// Presentable images, in swapchain order.
    pub fn images(&self) -> &[vk::Image] {
        &self.images
    }

    /// One view per presentable image.
    pub fn image_views(&self) -> &[vk::ImageView] {
        &self.image_views
    }

    /// Number of presentable images.
    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    /// Request the next image, signalling `semaphore` once it is ready.
    pub fn acquire_next_image(&self, semaphore: vk::Semaphore) -> Result<AcquireStatus> {
        let result = unsafe {
            self.gpu.swapchain_loader().acquire_next_image(
                self.swapchain,
                FENCE_TIMEOUT_NS,
                semaphore,
                vk::Fence::null(),
            )
        };

        match result {
            Ok((image_index, suboptimal)) => Ok(AcquireStatus::Acquired {
                image_index,
                suboptimal,
            }),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(AcquireStatus::OutOfDate),
            Err(e) => Err::<AcquireStatus, _>(e).check("vkAcquireNextImageKHR"),
        }
    }

    /// Present `image_index` on `queue` after `wait_semaphores` signal.
    pub fn present(
        &self,
        queue: vk::Queue,
        image_index: u32,
        wait_semaphores: &[vk::Semaphore],
    ) -> Result<PresentStatus> {
        let swapchains = [self.swapchain];
        let image_indices = [image_index];

        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        let result = unsafe {
            self.gpu
                .swapchain_loader()
                .queue_present(queue, &present_info)
        };

        match result {
            Ok(false) => Ok(PresentStatus::Presented),
            Ok(true) => Ok(PresentStatus::Suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(PresentStatus::OutOfDate),
            Err(e) => Err::<PresentStatus, _>(e).check("vkQueuePresentKHR"),
        }
    }

    /// Destroy image views then the swapchain. A no-op once destroyed.
    ///
    /// The caller must ensure the GPU no longer uses the images.
    pub fn destroy(&mut self) {
        let device = self.gpu.device();
        for view in self.image_views.drain(..) {
            unsafe { device.destroy_image_view(view, None) };
        }
        self.images.clear();

        if let Some(swapchain) = take_handle(&mut self.swapchain) {
            unsafe {
                self.gpu
                    .swapchain_loader()
                    .destroy_swapchain(swapchain, None);
            }
            tracing::debug!("Swapchain destroyed");
        }
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        self.destroy();
    }
}

/// Null out `handle`, returning the previous value if it was live.
pub(crate) fn take_handle<H: vk::Handle + Default + Copy>(handle: &mut H) -> Option<H> {
    let taken = std::mem::take(handle);
    (taken.as_raw() != 0).then_some(taken)
}

/// Select a surface format: the preferred sRGB pair if present, else the first.
pub fn select_surface_format(available: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    available
        .iter()
        .copied()
        .find(|f| {
            f.format == PREFERRED_SURFACE_FORMAT.format
                && f.color_space == PREFERRED_SURFACE_FORMAT.color_space
        })
        .or_else(|| available.first().copied())
}

/// Select a present mode.
///
/// With vsync, FIFO. Without, MAILBOX when available, else FIFO (always supported).
pub fn select_present_mode(available: &[vk::PresentModeKHR], vsync: bool) -> vk::PresentModeKHR {
    if !vsync && available.contains(&vk::PresentModeKHR::MAILBOX) {
        vk::PresentModeKHR::MAILBOX
    } else {
        vk::PresentModeKHR::FIFO
    }
}

/// Calculate swapchain extent.
pub fn choose_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    desired_width: u32,
    desired_height: u32,
) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        capabilities.current_extent
    } else {
        vk::Extent2D {
            width: desired_width.clamp(
                capabilities.min_image_extent.width,
                capabilities.max_image_extent.width,
            ),
            height: desired_height.clamp(
                capabilities.min_image_extent.height,
                capabilities.max_image_extent.height,
            ),
        }
    }
}

/// Image count: one more than the minimum, clamped to the maximum when the
/// maximum is non-zero (zero means unbounded).
pub fn choose_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let preferred = capabilities.min_image_count.saturating_add(1);
    if capabilities.max_image_count > 0 {
        preferred.min(capabilities.max_image_count)
    } else {
        preferred
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    #[test]
    fn take_handle_yields_live_handle_once() {
        let mut swapchain = vk::SwapchainKHR::from_raw(0x42);
        assert_eq!(take_handle(&mut swapchain), Some(vk::SwapchainKHR::from_raw(0x42)));
        assert_eq!(swapchain, vk::SwapchainKHR::null());
        assert_eq!(take_handle(&mut swapchain), None);
    }

    #[test]
    fn take_handle_ignores_null() {
        let mut swapchain = vk::SwapchainKHR::null();
        assert_eq!(take_handle(&mut swapchain), None);
        assert_eq!(swapchain, vk::SwapchainKHR::null());
    }

    fn caps(min: u32, max: u32) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: min,
            max_image_count: max,
            ..Default::default()
        }
    }

    fn format(format: vk::Format, color_space: vk::ColorSpaceKHR) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR {
            format,
            color_space,
        }
    }

    #[test]
    fn preferred_format_wins() {
        let available = [
            format(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            PREFERRED_SURFACE_FORMAT,
        ];
        assert_eq!(
            select_surface_format(&available),
            Some(PREFERRED_SURFACE_FORMAT)
        );
    }

    #[test]
    fn falls_back_to_first_format() {
        let available = [
            format(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            // Right format, wrong colour space.
            format(
                vk::Format::B8G8R8A8_SRGB,
                vk::ColorSpaceKHR::DISPLAY_P3_NONLINEAR_EXT,
            ),
        ];
        assert_eq!(select_surface_format(&available), Some(available[0]));
    }

    #[test]
    fn no_formats_is_unsupported() {
        assert_eq!(select_surface_format(&[]), None);
    }

    #[test]
    fn present_mode_selection() {
        let all = [
            vk::PresentModeKHR::IMMEDIATE,
            vk::PresentModeKHR::MAILBOX,
            vk::PresentModeKHR::FIFO,
        ];
        assert_eq!(select_present_mode(&all, false), vk::PresentModeKHR::MAILBOX);
        assert_eq!(select_present_mode(&all, true), vk::PresentModeKHR::FIFO);

        let fifo_only = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::IMMEDIATE];
        assert_eq!(
            select_present_mode(&fifo_only, false),
            vk::PresentModeKHR::FIFO
        );
    }

    #[test]
    fn image_count_unbounded_max() {
        assert_eq!(choose_image_count(&caps(2, 0)), 3);
    }

    #[test]
    fn image_count_clamped_to_max() {
        assert_eq!(choose_image_count(&caps(2, 2)), 2);
        assert_eq!(choose_image_count(&caps(2, 8)), 3);
    }

    #[test]
    fn extent_uses_current_when_fixed() {
        let mut capabilities = caps(2, 0);
        capabilities.current_extent = vk::Extent2D {
            width: 800,
            height: 600,
        };
        assert_eq!(
            choose_extent(&capabilities, 1920, 1080),
            vk::Extent2D {
                width: 800,
                height: 600
            }
        );
    }

    #[test]
    fn extent_clamped_when_window_decides() {
        let mut capabilities = caps(2, 0);
        capabilities.current_extent = vk::Extent2D {
            width: u32::MAX,
            height: u32::MAX,
        };
        capabilities.min_image_extent = vk::Extent2D {
            width: 16,
            height: 16,
        };
        capabilities.max_image_extent = vk::Extent2D {
            width: 1024,
            height: 768,
        };
        assert_eq!(
            choose_extent(&capabilities, 4000, 8),
            vk::Extent2D {
                width: 1024,
                height: 16
            }
        );
    }

    #[test]
    fn present_status_recreation() {
        assert!(!PresentStatus::Presented.needs_recreation());
        assert!(PresentStatus::Suboptimal.needs_recreation());
        assert!(PresentStatus::OutOfDate.needs_recreation());
    }
}
