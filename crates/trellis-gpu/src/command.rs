//! Command buffer management.

use std::sync::Arc;

use ash::vk;

use crate::context::GpuContext;
use crate::error::{GpuError, Result, VkResultExt};

/// Command pool for allocating command buffers. Destroyed on drop, which
/// frees every buffer allocated from it.
pub struct CommandPool {
    gpu: Arc<GpuContext>,
    pool: vk::CommandPool,
    queue_family: u32,
}

impl CommandPool {
    /// Create a new command pool.
    pub fn new(
        gpu: &Arc<GpuContext>,
        queue_family: u32,
        flags: vk::CommandPoolCreateFlags,
    ) -> Result<Self> {
        let create_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(queue_family)
            .flags(flags);

        let pool = unsafe { gpu.device().create_command_pool(&create_info, None) }
            .check("vkCreateCommandPool")?;

        Ok(Self {
            gpu: gpu.clone(),
            pool,
            queue_family,
        })
    }

    /// Get the raw pool handle.
    pub fn handle(&self) -> vk::CommandPool {
        self.pool
    }

    /// Get the queue family index.
    pub fn queue_family(&self) -> u32 {
        self.queue_family
    }

    /// Allocate a single command buffer.
    pub fn allocate_command_buffer(
        &self,
        level: vk::CommandBufferLevel,
    ) -> Result<vk::CommandBuffer> {
        self.allocate_command_buffers(level, 1)?
            .pop()
            .ok_or_else(|| GpuError::InvalidState("No command buffer allocated".to_string()))
    }

    /// Allocate multiple command buffers.
    pub fn allocate_command_buffers(
        &self,
        level: vk::CommandBufferLevel,
        count: u32,
    ) -> Result<Vec<vk::CommandBuffer>> {
        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(self.pool)
            .level(level)
            .command_buffer_count(count);

        unsafe { self.gpu.device().allocate_command_buffers(&alloc_info) }
            .check("vkAllocateCommandBuffers")
    }

    /// Return command buffers to the pool.
    ///
    /// # Safety
    /// The buffers must come from this pool and must not be pending execution.
    pub unsafe fn free_command_buffers(&self, command_buffers: &[vk::CommandBuffer]) {
        if !command_buffers.is_empty() {
            unsafe {
                self.gpu
                    .device()
                    .free_command_buffers(self.pool, command_buffers);
            }
        }
    }
}

impl Drop for CommandPool {
    fn drop(&mut self) {
        unsafe { self.gpu.device().destroy_command_pool(self.pool, None) };
    }
}

/// Begin recording a command buffer.
///
/// # Safety
/// The device and command buffer must be valid.
pub unsafe fn begin_command_buffer(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    flags: vk::CommandBufferUsageFlags,
) -> Result<()> {
    let begin_info = vk::CommandBufferBeginInfo::default().flags(flags);
    unsafe { device.begin_command_buffer(cmd, &begin_info) }.check("vkBeginCommandBuffer")
}

/// End recording a command buffer.
///
/// # Safety
/// The device and command buffer must be valid.
pub unsafe fn end_command_buffer(device: &ash::Device, cmd: vk::CommandBuffer) -> Result<()> {
    unsafe { device.end_command_buffer(cmd) }.check("vkEndCommandBuffer")
}

/// Reset a command buffer so it can be re-recorded.
///
/// # Safety
/// The buffer's pool must allow individual resets and the buffer must not
/// be pending execution.
pub unsafe fn reset_command_buffer(device: &ash::Device, cmd: vk::CommandBuffer) -> Result<()> {
    unsafe { device.reset_command_buffer(cmd, vk::CommandBufferResetFlags::empty()) }
        .check("vkResetCommandBuffer")
}

/// Submit command buffers to a queue.
///
/// # Safety
/// All handles must be valid.
pub unsafe fn submit_command_buffers(
    device: &ash::Device,
    queue: vk::Queue,
    command_buffers: &[vk::CommandBuffer],
    wait_semaphores: &[vk::Semaphore],
    wait_stages: &[vk::PipelineStageFlags],
    signal_semaphores: &[vk::Semaphore],
    fence: vk::Fence,
) -> Result<()> {
    let submit_info = vk::SubmitInfo::default()
        .command_buffers(command_buffers)
        .wait_semaphores(wait_semaphores)
        .wait_dst_stage_mask(wait_stages)
        .signal_semaphores(signal_semaphores);

    unsafe { device.queue_submit(queue, &[submit_info], fence) }.check("vkQueueSubmit")
}

/// Record, submit and wait for a one-shot command buffer.
pub fn execute_single_time_commands<F>(
    gpu: &GpuContext,
    pool: &CommandPool,
    queue: vk::Queue,
    f: F,
) -> Result<()>
where
    F: FnOnce(&ash::Device, vk::CommandBuffer),
{
    let device = gpu.device();
    let cmd = pool.allocate_command_buffer(vk::CommandBufferLevel::PRIMARY)?;

    let result = unsafe { record_and_wait(device, cmd, queue, |cmd| f(device, cmd)) };

    unsafe { pool.free_command_buffers(&[cmd]) };
    result
}

unsafe fn record_and_wait(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    queue: vk::Queue,
    f: impl FnOnce(vk::CommandBuffer),
) -> Result<()> {
    unsafe {
        begin_command_buffer(device, cmd, vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT)?;
        f(cmd);
        end_command_buffer(device, cmd)?;
        submit_command_buffers(device, queue, &[cmd], &[], &[], &[], vk::Fence::null())?;
        device.queue_wait_idle(queue).check("vkQueueWaitIdle")
    }
}
