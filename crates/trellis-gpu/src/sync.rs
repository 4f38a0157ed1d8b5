//! Synchronization primitives and the per-frame synchronization ring.

use std::sync::Arc;

use ash::vk;

use crate::command::CommandPool;
use crate::context::GpuContext;
use crate::error::{GpuError, Result, VkResultExt};

/// A binary semaphore. Destroyed on drop.
pub struct Semaphore {
    gpu: Arc<GpuContext>,
    handle: vk::Semaphore,
}

impl Semaphore {
    /// Create an unsignaled semaphore.
    pub fn new(gpu: &Arc<GpuContext>) -> Result<Self> {
        let create_info = vk::SemaphoreCreateInfo::default();
        let handle = unsafe { gpu.device().create_semaphore(&create_info, None) }
            .check("vkCreateSemaphore")?;

        Ok(Self {
            gpu: gpu.clone(),
            handle,
        })
    }

    /// Raw handle.
    pub fn handle(&self) -> vk::Semaphore {
        self.handle
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        unsafe { self.gpu.device().destroy_semaphore(self.handle, None) };
    }
}

/// A CPU-waitable fence. Destroyed on drop.
pub struct Fence {
    gpu: Arc<GpuContext>,
    handle: vk::Fence,
}

impl Fence {
    /// Create a fence, optionally already signaled.
    pub fn new(gpu: &Arc<GpuContext>, signaled: bool) -> Result<Self> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };

        let create_info = vk::FenceCreateInfo::default().flags(flags);
        let handle =
            unsafe { gpu.device().create_fence(&create_info, None) }.check("vkCreateFence")?;

        Ok(Self {
            gpu: gpu.clone(),
            handle,
        })
    }

    /// Raw handle.
    pub fn handle(&self) -> vk::Fence {
        self.handle
    }

    /// Block until the fence is signaled.
    pub fn wait(&self, timeout_ns: u64) -> Result<()> {
        unsafe {
            self.gpu
                .device()
                .wait_for_fences(&[self.handle], true, timeout_ns)
        }
        .check("vkWaitForFences")
    }

    /// Reset to unsignaled.
    pub fn reset(&self) -> Result<()> {
        unsafe { self.gpu.device().reset_fences(&[self.handle]) }.check("vkResetFences")
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        unsafe { self.gpu.device().destroy_fence(self.handle, None) };
    }
}

/// Synchronization primitives for one frame slot.
pub struct FrameSync {
    /// Signaled by the presentation engine when the acquired image is ready.
    pub image_available: Semaphore,
    /// Signaled when the slot's submission finishes; waited on by present.
    pub render_finished: Semaphore,
    /// Signaled when the GPU has finished the slot's work.
    pub in_flight: Fence,
}

impl FrameSync {
    /// Create the slot's primitives: both semaphores unsignaled, the fence
    /// signaled so the first wait returns immediately.
    pub fn new(gpu: &Arc<GpuContext>) -> Result<Self> {
        Ok(Self {
            image_available: Semaphore::new(gpu)?,
            render_finished: Semaphore::new(gpu)?,
            in_flight: Fence::new(gpu, true)?,
        })
    }
}

/// Raw handles of one frame slot, valid until the ring's sync objects or
/// command buffers are recreated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSlot {
    pub index: usize,
    pub command_buffer: vk::CommandBuffer,
    pub image_available: vk::Semaphore,
    pub render_finished: vk::Semaphore,
    pub in_flight: vk::Fence,
}

/// N frame slots: their semaphores, fences and command buffers.
///
/// Command buffers come from a single resettable pool and are re-recorded
/// rather than reallocated every frame. Field order makes the sync objects
/// drop before the pool.
pub struct FrameSyncRing {
    frames_in_flight: usize,
    sync: Vec<FrameSync>,
    command_buffers: Vec<vk::CommandBuffer>,
    command_pool: CommandPool,
}

impl FrameSyncRing {
    /// Create the pool, allocate N command buffers and create the sync objects.
    pub fn new(gpu: &Arc<GpuContext>, frames_in_flight: usize) -> Result<Self> {
        if frames_in_flight == 0 {
            return Err(GpuError::InvalidState(
                "At least one frame in flight is required".to_string(),
            ));
        }

        let command_pool = CommandPool::new(
            gpu,
            gpu.graphics_queue_family(),
            vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
        )?;

        let mut ring = Self {
            frames_in_flight,
            sync: Vec::with_capacity(frames_in_flight),
            command_buffers: Vec::new(),
            command_pool,
        };
        ring.allocate_command_buffers()?;
        ring.create_sync_objects(gpu)?;

        Ok(ring)
    }

    /// Number of slots.
    pub fn frames_in_flight(&self) -> usize {
        self.frames_in_flight
    }

    /// Whether the sync objects currently exist.
    pub fn has_sync_objects(&self) -> bool {
        !self.sync.is_empty()
    }

    /// Create all N slots' primitives. Any existing ones are destroyed first.
    pub fn create_sync_objects(&mut self, gpu: &Arc<GpuContext>) -> Result<()> {
        self.destroy_sync_objects();

        for index in 0..self.frames_in_flight {
            self.sync.push(FrameSync::new(gpu)?);
            tracing::debug!("Created sync objects for frame slot {index}");
        }

        Ok(())
    }

    /// Destroy all N slots' primitives. A no-op when already destroyed.
    ///
    /// The caller must ensure no submitted work still references them.
    pub fn destroy_sync_objects(&mut self) {
        if self.has_sync_objects() {
            self.sync.clear();
            tracing::debug!("Destroyed sync objects for {} frame slots", self.frames_in_flight);
        }
    }

    /// Free and reallocate the N command buffers.
    ///
    /// The caller must ensure none are pending execution.
    pub fn reallocate_command_buffers(&mut self) -> Result<()> {
        let old = std::mem::take(&mut self.command_buffers);
        unsafe { self.command_pool.free_command_buffers(&old) };
        self.allocate_command_buffers()
    }

    fn allocate_command_buffers(&mut self) -> Result<()> {
        let count = self.frames_in_flight as u32;
        self.command_buffers = self
            .command_pool
            .allocate_command_buffers(vk::CommandBufferLevel::PRIMARY, count)?;
        Ok(())
    }

    /// Handles for slot `index`.
    pub fn slot(&self, index: usize) -> Result<FrameSlot> {
        let sync = self.sync.get(index).ok_or_else(|| {
            GpuError::InvalidState(format!("Frame slot {index} has no sync objects"))
        })?;
        let command_buffer = *self.command_buffers.get(index).ok_or_else(|| {
            GpuError::InvalidState(format!("Frame slot {index} has no command buffer"))
        })?;

        Ok(FrameSlot {
            index,
            command_buffer,
            image_available: sync.image_available.handle(),
            render_finished: sync.render_finished.handle(),
            in_flight: sync.in_flight.handle(),
        })
    }

    /// Primitives for slot `index`.
    pub fn sync(&self, index: usize) -> Result<&FrameSync> {
        self.sync.get(index).ok_or_else(|| {
            GpuError::InvalidState(format!("Frame slot {index} has no sync objects"))
        })
    }

    /// Block until slot `index`'s previous submission has completed.
    pub fn wait(&self, index: usize, timeout_ns: u64) -> Result<()> {
        self.sync(index)?.in_flight.wait(timeout_ns)
    }

    /// Reset slot `index`'s in-flight fence before resubmitting.
    pub fn reset(&self, index: usize) -> Result<()> {
        self.sync(index)?.in_flight.reset()
    }
}
