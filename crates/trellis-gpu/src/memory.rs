//! GPU memory management.

use std::sync::Arc;

use ash::vk;
use gpu_allocator::vulkan::{
    Allocation, AllocationCreateDesc, AllocationScheme, Allocator, AllocatorCreateDesc,
};
use gpu_allocator::MemoryLocation;

use crate::context::GpuContext;
use crate::error::{GpuError, Result, VkResultExt};

/// GPU memory allocator wrapper.
pub struct GpuAllocator {
    allocator: Option<Allocator>,
}

impl GpuAllocator {
    /// Create a new allocator.
    ///
    /// # Safety
    /// The instance, device, and physical device must be valid.
    pub unsafe fn new(
        instance: &ash::Instance,
        device: Arc<ash::Device>,
        physical_device: vk::PhysicalDevice,
    ) -> Result<Self> {
        let allocator = Allocator::new(&AllocatorCreateDesc {
            instance: instance.clone(),
            device: (*device).clone(),
            physical_device,
            debug_settings: gpu_allocator::AllocatorDebugSettings {
                log_memory_information: cfg!(debug_assertions),
                log_leaks_on_shutdown: true,
                store_stack_traces: false,
                log_allocations: false,
                log_frees: false,
                log_stack_traces: false,
            },
            buffer_device_address: false,
            allocation_sizes: Default::default(),
        })
        .map_err(|e| GpuError::AllocationFailed(e.to_string()))?;

        Ok(Self {
            allocator: Some(allocator),
        })
    }

    /// Allocate memory satisfying `requirements`.
    pub fn allocate(
        &mut self,
        name: &str,
        requirements: vk::MemoryRequirements,
        location: MemoryLocation,
        linear: bool,
    ) -> Result<Allocation> {
        self.allocator
            .as_mut()
            .ok_or_else(|| GpuError::InvalidState("Allocator already shut down".to_string()))?
            .allocate(&AllocationCreateDesc {
                name,
                requirements,
                location,
                linear,
                allocation_scheme: AllocationScheme::GpuAllocatorManaged,
            })
            .map_err(|e| GpuError::AllocationFailed(e.to_string()))
    }

    /// Return an allocation to the allocator.
    pub fn free(&mut self, allocation: Allocation) -> Result<()> {
        self.allocator
            .as_mut()
            .ok_or_else(|| GpuError::InvalidState("Allocator already shut down".to_string()))?
            .free(allocation)
            .map_err(|e| GpuError::AllocationFailed(e.to_string()))
    }

    /// Shutdown the allocator, freeing all GPU memory.
    ///
    /// This must be called before the Vulkan device is destroyed.
    /// Any remaining allocations will be freed (and logged as leaks).
    pub fn shutdown(&mut self) {
        if let Some(allocator) = self.allocator.take() {
            drop(allocator);
        }
    }
}

impl Drop for GpuAllocator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// A GPU buffer with its allocation. Released on drop.
pub struct GpuBuffer {
    gpu: Arc<GpuContext>,
    buffer: vk::Buffer,
    allocation: Option<Allocation>,
    size: u64,
}

impl GpuBuffer {
    /// Create a buffer and bind fresh memory to it.
    pub fn new(
        gpu: &Arc<GpuContext>,
        size: u64,
        usage: vk::BufferUsageFlags,
        location: MemoryLocation,
        name: &str,
    ) -> Result<Self> {
        let device = gpu.device();
        let buffer_info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe { device.create_buffer(&buffer_info, None) }.check("vkCreateBuffer")?;
        let requirements = unsafe { device.get_buffer_memory_requirements(buffer) };

        let allocation = match gpu
            .allocator()
            .lock()
            .allocate(name, requirements, location, true)
        {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { device.destroy_buffer(buffer, None) };
                return Err(e);
            }
        };

        let gpu_buffer = Self {
            gpu: gpu.clone(),
            buffer,
            allocation: Some(allocation),
            size,
        };

        // From here on, drop cleans up on failure.
        let allocation = gpu_buffer
            .allocation
            .as_ref()
            .ok_or_else(|| GpuError::InvalidState("Allocation missing".to_string()))?;
        unsafe { device.bind_buffer_memory(buffer, allocation.memory(), allocation.offset()) }
            .check("vkBindBufferMemory")?;

        Ok(gpu_buffer)
    }

    /// Create a host-visible buffer initialised with `data`.
    pub fn with_data<T: bytemuck::Pod>(
        gpu: &Arc<GpuContext>,
        data: &[T],
        usage: vk::BufferUsageFlags,
        name: &str,
    ) -> Result<Self> {
        let bytes: &[u8] = bytemuck::cast_slice(data);
        let buffer = Self::new(
            gpu,
            bytes.len() as u64,
            usage,
            MemoryLocation::CpuToGpu,
            name,
        )?;
        buffer.write_bytes(0, bytes)?;
        Ok(buffer)
    }

    /// Get the raw buffer handle.
    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    /// Size in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Map the buffer memory for CPU access.
    pub fn mapped_ptr(&self) -> Option<*mut u8> {
        self.allocation
            .as_ref()
            .and_then(Allocation::mapped_ptr)
            .map(|p| p.as_ptr().cast::<u8>())
    }

    /// Write typed data at the start of the buffer (must be host-visible).
    pub fn write<T: bytemuck::Pod>(&self, data: &[T]) -> Result<()> {
        self.write_bytes(0, bytemuck::cast_slice(data))
    }

    /// Write raw bytes to the buffer at the given offset (must be host-visible).
    pub fn write_bytes(&self, offset: u64, data: &[u8]) -> Result<()> {
        let ptr = self
            .mapped_ptr()
            .ok_or_else(|| GpuError::InvalidState("Buffer not mapped".to_string()))?;

        let end = offset
            .checked_add(data.len() as u64)
            .ok_or_else(|| GpuError::InvalidState("Offset overflow".to_string()))?;
        if end > self.size {
            return Err(GpuError::InvalidState(format!(
                "Write of {} bytes at {offset} exceeds buffer size {}",
                data.len(),
                self.size
            )));
        }

        unsafe {
            std::ptr::copy_nonoverlapping(data.as_ptr(), ptr.add(offset as usize), data.len());
        }

        Ok(())
    }
}

impl Drop for GpuBuffer {
    fn drop(&mut self) {
        if let Some(allocation) = self.allocation.take() {
            if let Err(e) = self.gpu.allocator().lock().free(allocation) {
                tracing::error!("Failed to free buffer memory: {e}");
            }
        }
        if self.buffer != vk::Buffer::null() {
            unsafe { self.gpu.device().destroy_buffer(self.buffer, None) };
            self.buffer = vk::Buffer::null();
        }
    }
}

/// A GPU image with its allocation. Released on drop.
pub struct GpuImage {
    gpu: Arc<GpuContext>,
    image: vk::Image,
    allocation: Option<Allocation>,
    format: vk::Format,
    extent: vk::Extent3D,
}

impl GpuImage {
    /// Create an image and bind fresh memory to it.
    pub fn new(
        gpu: &Arc<GpuContext>,
        create_info: &vk::ImageCreateInfo<'_>,
        location: MemoryLocation,
        name: &str,
    ) -> Result<Self> {
        let device = gpu.device();
        let image = unsafe { device.create_image(create_info, None) }.check("vkCreateImage")?;
        let requirements = unsafe { device.get_image_memory_requirements(image) };

        let allocation = match gpu
            .allocator()
            .lock()
            .allocate(name, requirements, location, false)
        {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { device.destroy_image(image, None) };
                return Err(e);
            }
        };

        let gpu_image = Self {
            gpu: gpu.clone(),
            image,
            allocation: Some(allocation),
            format: create_info.format,
            extent: create_info.extent,
        };

        if let Some(allocation) = gpu_image.allocation.as_ref() {
            unsafe { device.bind_image_memory(image, allocation.memory(), allocation.offset()) }
                .check("vkBindImageMemory")?;
        }

        Ok(gpu_image)
    }

    /// Get the raw image handle.
    pub fn handle(&self) -> vk::Image {
        self.image
    }

    /// Image format.
    pub fn format(&self) -> vk::Format {
        self.format
    }

    /// Image extent.
    pub fn extent(&self) -> vk::Extent3D {
        self.extent
    }
}

impl Drop for GpuImage {
    fn drop(&mut self) {
        if let Some(allocation) = self.allocation.take() {
            if let Err(e) = self.gpu.allocator().lock().free(allocation) {
                tracing::error!("Failed to free image memory: {e}");
            }
        }
        if self.image != vk::Image::null() {
            unsafe { self.gpu.device().destroy_image(self.image, None) };
            self.image = vk::Image::null();
        }
    }
}

/// Create a 2D view covering the first mip level and layer of `image`.
///
/// # Safety
/// The device and image must be valid.
pub unsafe fn create_image_view(
    device: &ash::Device,
    image: vk::Image,
    format: vk::Format,
    aspect_mask: vk::ImageAspectFlags,
) -> Result<vk::ImageView> {
    let view_info = vk::ImageViewCreateInfo::default()
        .image(image)
        .view_type(vk::ImageViewType::TYPE_2D)
        .format(format)
        .subresource_range(
            vk::ImageSubresourceRange::default()
                .aspect_mask(aspect_mask)
                .base_mip_level(0)
                .level_count(1)
                .base_array_layer(0)
                .layer_count(1),
        );

    unsafe { device.create_image_view(&view_info, None) }.check("vkCreateImageView")
}
