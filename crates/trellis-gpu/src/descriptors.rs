//! Descriptor set management.

use std::sync::Arc;

use ash::vk;

use crate::context::GpuContext;
use crate::error::{GpuError, Result, VkResultExt};

/// Descriptor set layout builder.
#[derive(Default)]
pub struct DescriptorSetLayoutBuilder {
    bindings: Vec<vk::DescriptorSetLayoutBinding<'static>>,
}

impl DescriptorSetLayoutBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a binding.
    pub fn binding(
        mut self,
        binding: u32,
        descriptor_type: vk::DescriptorType,
        count: u32,
        stage_flags: vk::ShaderStageFlags,
    ) -> Self {
        self.bindings.push(
            vk::DescriptorSetLayoutBinding::default()
                .binding(binding)
                .descriptor_type(descriptor_type)
                .descriptor_count(count)
                .stage_flags(stage_flags),
        );
        self
    }

    /// Add a uniform buffer binding.
    pub fn uniform_buffer(self, binding: u32, stage_flags: vk::ShaderStageFlags) -> Self {
        self.binding(binding, vk::DescriptorType::UNIFORM_BUFFER, 1, stage_flags)
    }

    /// Add a combined image sampler binding.
    pub fn combined_image_sampler(self, binding: u32, stage_flags: vk::ShaderStageFlags) -> Self {
        self.binding(
            binding,
            vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            1,
            stage_flags,
        )
    }

    /// Build the descriptor set layout.
    pub fn build(self, gpu: &Arc<GpuContext>) -> Result<DescriptorSetLayout> {
        let layout_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&self.bindings);

        let layout = unsafe { gpu.device().create_descriptor_set_layout(&layout_info, None) }
            .check("vkCreateDescriptorSetLayout")?;

        Ok(DescriptorSetLayout {
            gpu: gpu.clone(),
            layout,
            binding_types: self
                .bindings
                .iter()
                .map(|b| (b.descriptor_type, b.descriptor_count))
                .collect(),
        })
    }
}

/// A descriptor set layout. Destroyed on drop.
pub struct DescriptorSetLayout {
    gpu: Arc<GpuContext>,
    layout: vk::DescriptorSetLayout,
    binding_types: Vec<(vk::DescriptorType, u32)>,
}

impl DescriptorSetLayout {
    /// Raw handle.
    pub fn handle(&self) -> vk::DescriptorSetLayout {
        self.layout
    }

    /// Pool sizes needed to allocate `sets` sets of this layout.
    pub fn pool_sizes(&self, sets: u32) -> Vec<vk::DescriptorPoolSize> {
        pool_sizes(&self.binding_types, sets)
    }
}

impl Drop for DescriptorSetLayout {
    fn drop(&mut self) {
        unsafe {
            self.gpu
                .device()
                .destroy_descriptor_set_layout(self.layout, None);
        }
    }
}

/// Sum descriptor counts per type for `sets` sets with the given bindings.
///
/// Types keep the order of their first appearance.
pub fn pool_sizes(
    bindings: &[(vk::DescriptorType, u32)],
    sets: u32,
) -> Vec<vk::DescriptorPoolSize> {
    let mut sizes: Vec<vk::DescriptorPoolSize> = Vec::new();
    for &(ty, count) in bindings {
        let total = count.saturating_mul(sets);
        match sizes.iter_mut().find(|s| s.ty == ty) {
            Some(size) => size.descriptor_count = size.descriptor_count.saturating_add(total),
            None => sizes.push(vk::DescriptorPoolSize {
                ty,
                descriptor_count: total,
            }),
        }
    }
    sizes
}

/// Account for `requested` more sets in a pool of `capacity` holding
/// `allocated`, returning the new allocated count.
pub fn reserve(capacity: u32, allocated: u32, requested: u32) -> Result<u32> {
    allocated
        .checked_add(requested)
        .filter(|&total| total <= capacity)
        .ok_or(GpuError::DescriptorPoolExhausted {
            capacity,
            requested,
        })
}

/// A fixed-capacity descriptor pool.
///
/// The pool never grows: once `capacity` sets have been allocated, further
/// allocations fail with [`GpuError::DescriptorPoolExhausted`].
pub struct DescriptorPool {
    gpu: Arc<GpuContext>,
    pool: vk::DescriptorPool,
    capacity: u32,
    allocated: u32,
}

impl DescriptorPool {
    /// Create a pool that can hold `capacity` sets drawn from `pool_sizes`.
    pub fn new(
        gpu: &Arc<GpuContext>,
        capacity: u32,
        pool_sizes: &[vk::DescriptorPoolSize],
    ) -> Result<Self> {
        let create_info = vk::DescriptorPoolCreateInfo::default()
            .max_sets(capacity)
            .pool_sizes(pool_sizes);

        let pool = unsafe { gpu.device().create_descriptor_pool(&create_info, None) }
            .check("vkCreateDescriptorPool")?;

        Ok(Self {
            gpu: gpu.clone(),
            pool,
            capacity,
            allocated: 0,
        })
    }

    /// Create a pool sized for `capacity` sets of a single layout.
    pub fn for_layout(
        gpu: &Arc<GpuContext>,
        layout: &DescriptorSetLayout,
        capacity: u32,
    ) -> Result<Self> {
        Self::new(gpu, capacity, &layout.pool_sizes(capacity))
    }

    /// Get the raw pool handle.
    pub fn handle(&self) -> vk::DescriptorPool {
        self.pool
    }

    /// Maximum number of sets.
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Sets allocated so far.
    pub fn allocated(&self) -> u32 {
        self.allocated
    }

    /// Sets still available.
    pub fn remaining(&self) -> u32 {
        self.capacity - self.allocated
    }

    /// Allocate one set per layout.
    pub fn allocate(
        &mut self,
        layouts: &[vk::DescriptorSetLayout],
    ) -> Result<Vec<vk::DescriptorSet>> {
        let requested = layouts.len() as u32;
        let allocated = reserve(self.capacity, self.allocated, requested)?;

        let alloc_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(self.pool)
            .set_layouts(layouts);

        let sets = match unsafe { self.gpu.device().allocate_descriptor_sets(&alloc_info) } {
            Ok(sets) => sets,
            Err(vk::Result::ERROR_OUT_OF_POOL_MEMORY | vk::Result::ERROR_FRAGMENTED_POOL) => {
                return Err(GpuError::DescriptorPoolExhausted {
                    capacity: self.capacity,
                    requested,
                });
            }
            Err(e) => {
                return Err::<Vec<vk::DescriptorSet>, _>(e).check("vkAllocateDescriptorSets");
            }
        };

        self.allocated = allocated;
        Ok(sets)
    }

    /// Allocate `count` sets of the same layout.
    pub fn allocate_many(
        &mut self,
        layout: vk::DescriptorSetLayout,
        count: usize,
    ) -> Result<Vec<vk::DescriptorSet>> {
        self.allocate(&vec![layout; count])
    }
}

impl Drop for DescriptorPool {
    fn drop(&mut self) {
        unsafe { self.gpu.device().destroy_descriptor_pool(self.pool, None) };
    }
}

/// Write a uniform buffer descriptor.
///
/// # Safety
/// Device and buffer must be valid.
pub unsafe fn write_uniform_buffer(
    device: &ash::Device,
    dst_set: vk::DescriptorSet,
    binding: u32,
    buffer: vk::Buffer,
    offset: u64,
    range: u64,
) {
    let buffer_info = vk::DescriptorBufferInfo::default()
        .buffer(buffer)
        .offset(offset)
        .range(range);

    let write = vk::WriteDescriptorSet::default()
        .dst_set(dst_set)
        .dst_binding(binding)
        .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
        .buffer_info(std::slice::from_ref(&buffer_info));

    unsafe { device.update_descriptor_sets(&[write], &[]) };
}

/// Write a combined image sampler descriptor.
///
/// # Safety
/// Device, image view and sampler must be valid.
pub unsafe fn write_combined_image_sampler(
    device: &ash::Device,
    dst_set: vk::DescriptorSet,
    binding: u32,
    image_view: vk::ImageView,
    sampler: vk::Sampler,
) {
    let image_info = vk::DescriptorImageInfo::default()
        .image_view(image_view)
        .sampler(sampler)
        .image_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);

    let write = vk::WriteDescriptorSet::default()
        .dst_set(dst_set)
        .dst_binding(binding)
        .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
        .image_info(std::slice::from_ref(&image_info));

    unsafe { device.update_descriptor_sets(&[write], &[]) };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_sizes_scale_with_set_count() {
        let sizes = pool_sizes(&[(vk::DescriptorType::UNIFORM_BUFFER, 1)], 3);
        assert_eq!(sizes.len(), 1);
        assert_eq!(sizes[0].ty, vk::DescriptorType::UNIFORM_BUFFER);
        assert_eq!(sizes[0].descriptor_count, 3);
    }

    #[test]
    fn pool_sizes_merge_repeated_types() {
        let sizes = pool_sizes(
            &[
                (vk::DescriptorType::COMBINED_IMAGE_SAMPLER, 1),
                (vk::DescriptorType::UNIFORM_BUFFER, 1),
                (vk::DescriptorType::COMBINED_IMAGE_SAMPLER, 2),
            ],
            100,
        );
        assert_eq!(sizes.len(), 2);
        assert_eq!(sizes[0].ty, vk::DescriptorType::COMBINED_IMAGE_SAMPLER);
        assert_eq!(sizes[0].descriptor_count, 300);
        assert_eq!(sizes[1].descriptor_count, 100);
    }

    #[test]
    fn reserve_fills_pool_exactly() {
        assert_eq!(reserve(100, 99, 1).unwrap(), 100);
        assert_eq!(reserve(3, 0, 3).unwrap(), 3);
    }

    #[test]
    fn reserve_fails_one_past_capacity() {
        assert!(matches!(
            reserve(100, 100, 1),
            Err(GpuError::DescriptorPoolExhausted {
                capacity: 100,
                requested: 1
            })
        ));
    }

    #[test]
    fn reserve_rejects_batch_crossing_capacity() {
        assert!(matches!(
            reserve(10, 8, 3),
            Err(GpuError::DescriptorPoolExhausted {
                capacity: 10,
                requested: 3
            })
        ));
        assert!(reserve(u32::MAX, u32::MAX - 1, 2).is_err());
    }

    #[test]
    fn builder_collects_bindings() {
        let builder = DescriptorSetLayoutBuilder::new()
            .uniform_buffer(0, vk::ShaderStageFlags::VERTEX)
            .combined_image_sampler(1, vk::ShaderStageFlags::FRAGMENT);
        assert_eq!(builder.bindings.len(), 2);
        assert_eq!(builder.bindings[1].binding, 1);
        assert_eq!(
            builder.bindings[1].descriptor_type,
            vk::DescriptorType::COMBINED_IMAGE_SAMPLER
        );
    }
}
