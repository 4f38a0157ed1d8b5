//! GPU context management.

use std::sync::Arc;

use ash::vk;
use parking_lot::Mutex;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};

use crate::adapter::{required_device_extensions, select_adapter, Adapter};
use crate::error::{GpuError, Result, VkResultExt};
use crate::instance::{create_instance, DebugMessenger};
use crate::memory::GpuAllocator;
use crate::surface::SurfaceContext;

/// Main GPU context holding the Vulkan instance, surface, device and queues.
///
/// Every resource wrapper in this crate keeps an `Arc<GpuContext>`, so the
/// device is destroyed only after the last of them is gone.
pub struct GpuContext {
    // Entry must be kept alive for the lifetime of the context
    #[allow(dead_code)]
    pub(crate) entry: ash::Entry,
    pub(crate) instance: ash::Instance,
    pub(crate) debug_messenger: Option<DebugMessenger>,
    pub(crate) surface: SurfaceContext,
    pub(crate) adapter: Adapter,
    pub(crate) device: Arc<ash::Device>,
    pub(crate) swapchain_loader: ash::khr::swapchain::Device,
    pub(crate) allocator: Mutex<GpuAllocator>,

    pub(crate) graphics_queue: vk::Queue,
    pub(crate) present_queue: vk::Queue,
}

impl GpuContext {
    /// Get the Vulkan device handle.
    pub fn device(&self) -> &ash::Device {
        &self.device
    }

    /// Get the Vulkan instance handle.
    pub fn instance(&self) -> &ash::Instance {
        &self.instance
    }

    /// Get the selected adapter.
    pub fn adapter(&self) -> &Adapter {
        &self.adapter
    }

    /// Get the physical device handle.
    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.adapter.physical_device
    }

    /// Get the presentation surface.
    pub fn surface(&self) -> &SurfaceContext {
        &self.surface
    }

    /// Get the swapchain extension loader.
    pub fn swapchain_loader(&self) -> &ash::khr::swapchain::Device {
        &self.swapchain_loader
    }

    /// Get the graphics queue.
    pub fn graphics_queue(&self) -> vk::Queue {
        self.graphics_queue
    }

    /// Get the present queue.
    pub fn present_queue(&self) -> vk::Queue {
        self.present_queue
    }

    /// Get the graphics queue family index.
    pub fn graphics_queue_family(&self) -> u32 {
        self.adapter.queue_families.graphics
    }

    /// Get the present queue family index.
    pub fn present_queue_family(&self) -> u32 {
        self.adapter.queue_families.present
    }

    /// Get access to the GPU allocator.
    pub fn allocator(&self) -> &Mutex<GpuAllocator> {
        &self.allocator
    }

    /// Wait for device to be idle.
    pub fn wait_idle(&self) -> Result<()> {
        unsafe { self.device.device_wait_idle() }.check("vkDeviceWaitIdle")
    }
}

impl Drop for GpuContext {
    fn drop(&mut self) {
        unsafe {
            if let Err(e) = self.device.device_wait_idle() {
                tracing::error!("vkDeviceWaitIdle failed during shutdown: {e}");
            }

            // Allocator first: it owns VkDeviceMemory
            self.allocator.lock().shutdown();

            self.device.destroy_device(None);
            self.surface.destroy();
            if let Some(mut messenger) = self.debug_messenger.take() {
                messenger.destroy();
            }
            self.instance.destroy_instance(None);
        }
        tracing::info!("GPU context destroyed");
    }
}

/// Builder for creating a GPU context.
pub struct GpuContextBuilder {
    app_name: String,
    enable_validation: bool,
}

impl Default for GpuContextBuilder {
    fn default() -> Self {
        Self {
            app_name: "Trellis".to_string(),
            enable_validation: cfg!(debug_assertions),
        }
    }
}

impl GpuContextBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the application name.
    pub fn app_name(mut self, name: impl Into<String>) -> Self {
        self.app_name = name.into();
        self
    }

    /// Enable or disable validation layers.
    pub fn validation(mut self, enable: bool) -> Self {
        self.enable_validation = enable;
        self
    }

    /// Build the GPU context for a window.
    ///
    /// Creates the instance, the window surface, selects an adapter able to
    /// present to that surface, and creates the logical device and queues.
    pub fn build<W>(self, window: &W) -> Result<Arc<GpuContext>>
    where
        W: HasDisplayHandle + HasWindowHandle,
    {
        let entry = unsafe { ash::Entry::load() }?;

        let display = window
            .display_handle()
            .map_err(|e| GpuError::SurfaceCreation(format!("Failed to get display handle: {e}")))?
            .as_raw();

        let instance =
            unsafe { create_instance(&entry, &self.app_name, display, self.enable_validation) }?;

        let debug_messenger = if self.enable_validation {
            match unsafe { DebugMessenger::new(&entry, &instance) } {
                Ok(messenger) => Some(messenger),
                Err(e) => {
                    tracing::warn!("Validation messenger unavailable: {e}");
                    None
                }
            }
        } else {
            None
        };

        let surface = unsafe { SurfaceContext::from_window(&entry, &instance, window) }?;

        let adapter = unsafe { select_adapter(&instance, &surface) }?;
        tracing::info!("Selected GPU: {}", adapter.summary());

        let (device, graphics_queue, present_queue) =
            unsafe { create_device(&instance, &adapter) }?;
        let device = Arc::new(device);

        let swapchain_loader = ash::khr::swapchain::Device::new(&instance, &device);

        let allocator =
            unsafe { GpuAllocator::new(&instance, device.clone(), adapter.physical_device) }?;

        Ok(Arc::new(GpuContext {
            entry,
            instance,
            debug_messenger,
            surface,
            adapter,
            device,
            swapchain_loader,
            allocator: Mutex::new(allocator),
            graphics_queue,
            present_queue,
        }))
    }
}

/// Create the logical device and retrieve queues.
///
/// # Safety
/// The instance and adapter must be valid.
unsafe fn create_device(
    instance: &ash::Instance,
    adapter: &Adapter,
) -> Result<(ash::Device, vk::Queue, vk::Queue)> {
    let families = adapter.queue_families;

    let queue_priority = 1.0_f32;
    let queue_create_infos: Vec<vk::DeviceQueueCreateInfo> = families
        .unique()
        .into_iter()
        .map(|family| {
            vk::DeviceQueueCreateInfo::default()
                .queue_family_index(family)
                .queue_priorities(std::slice::from_ref(&queue_priority))
        })
        .collect();

    let extension_names: Vec<*const std::ffi::c_char> = required_device_extensions()
        .iter()
        .map(|ext| ext.as_ptr())
        .collect();

    let features = vk::PhysicalDeviceFeatures::default().sampler_anisotropy(true);

    let device_create_info = vk::DeviceCreateInfo::default()
        .queue_create_infos(&queue_create_infos)
        .enabled_extension_names(&extension_names)
        .enabled_features(&features);

    let device =
        unsafe { instance.create_device(adapter.physical_device, &device_create_info, None) }
            .check("vkCreateDevice")?;

    let graphics_queue = unsafe { device.get_device_queue(families.graphics, 0) };
    let present_queue = unsafe { device.get_device_queue(families.present, 0) };

    Ok((device, graphics_queue, present_queue))
}
