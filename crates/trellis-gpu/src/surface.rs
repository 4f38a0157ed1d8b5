//! Surface management for windowed rendering.
//!
//! Hides the raw-window-handle plumbing from the rest of the crate and
//! answers the per-adapter questions swapchain creation needs.

use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};

use crate::error::{GpuError, Result, VkResultExt};

/// Surface context for windowed rendering.
pub struct SurfaceContext {
    /// The Vulkan surface handle.
    pub(crate) surface: vk::SurfaceKHR,
    /// Surface extension loader.
    pub(crate) surface_loader: ash::khr::surface::Instance,
}

impl SurfaceContext {
    /// Create a surface for a window.
    ///
    /// # Safety
    /// The entry and instance must be valid and the window must outlive the surface.
    pub unsafe fn from_window<W>(
        entry: &ash::Entry,
        instance: &ash::Instance,
        window: &W,
    ) -> Result<Self>
    where
        W: HasDisplayHandle + HasWindowHandle,
    {
        let display = window
            .display_handle()
            .map_err(|e| GpuError::SurfaceCreation(format!("Failed to get display handle: {e}")))?;
        let window_handle = window
            .window_handle()
            .map_err(|e| GpuError::SurfaceCreation(format!("Failed to get window handle: {e}")))?;

        let surface = unsafe {
            ash_window::create_surface(
                entry,
                instance,
                display.as_raw(),
                window_handle.as_raw(),
                None,
            )
        }
        .check("vkCreateSurfaceKHR")?;

        let surface_loader = ash::khr::surface::Instance::new(entry, instance);

        Ok(Self {
            surface,
            surface_loader,
        })
    }

    /// Get the raw surface handle.
    pub fn handle(&self) -> vk::SurfaceKHR {
        self.surface
    }

    /// Whether a queue family of `physical_device` can present to this surface.
    pub fn supports_present(
        &self,
        physical_device: vk::PhysicalDevice,
        queue_family: u32,
    ) -> Result<bool> {
        unsafe {
            self.surface_loader.get_physical_device_surface_support(
                physical_device,
                queue_family,
                self.surface,
            )
        }
        .check("vkGetPhysicalDeviceSurfaceSupportKHR")
    }

    /// Query capabilities, formats and present modes for an adapter.
    pub fn support(&self, physical_device: vk::PhysicalDevice) -> Result<SurfaceSupport> {
        unsafe {
            let capabilities = self
                .surface_loader
                .get_physical_device_surface_capabilities(physical_device, self.surface)
                .check("vkGetPhysicalDeviceSurfaceCapabilitiesKHR")?;

            let formats = self
                .surface_loader
                .get_physical_device_surface_formats(physical_device, self.surface)
                .check("vkGetPhysicalDeviceSurfaceFormatsKHR")?;

            let present_modes = self
                .surface_loader
                .get_physical_device_surface_present_modes(physical_device, self.surface)
                .check("vkGetPhysicalDeviceSurfacePresentModesKHR")?;

            Ok(SurfaceSupport {
                capabilities,
                formats,
                present_modes,
            })
        }
    }

    /// Destroy the surface. Safe to call twice.
    ///
    /// # Safety
    /// No swapchain created from this surface may still exist.
    pub unsafe fn destroy(&mut self) {
        if self.surface != vk::SurfaceKHR::null() {
            unsafe { self.surface_loader.destroy_surface(self.surface, None) };
            self.surface = vk::SurfaceKHR::null();
        }
    }
}

/// Surface support query result.
#[derive(Debug, Clone)]
pub struct SurfaceSupport {
    /// Raw surface capabilities.
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    /// Supported surface formats.
    pub formats: Vec<vk::SurfaceFormatKHR>,
    /// Supported present modes.
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SurfaceSupport {
    /// An adapter/surface pair is usable only if both lists are non-empty.
    pub fn is_adequate(&self) -> bool {
        !self.formats.is_empty() && !self.present_modes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn support(formats: usize, modes: usize) -> SurfaceSupport {
        SurfaceSupport {
            capabilities: vk::SurfaceCapabilitiesKHR::default(),
            formats: vec![vk::SurfaceFormatKHR::default(); formats],
            present_modes: vec![vk::PresentModeKHR::FIFO; modes],
        }
    }

    #[test]
    fn adequacy_requires_formats_and_modes() {
        assert!(support(1, 1).is_adequate());
        assert!(!support(0, 1).is_adequate());
        assert!(!support(2, 0).is_adequate());
    }
}
