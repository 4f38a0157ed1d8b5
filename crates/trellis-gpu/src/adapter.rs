//! Adapter (physical device) selection.
//!
//! An adapter qualifies when it has a graphics queue family, a family that
//! can present to the target surface, the swapchain extension, a non-empty
//! set of surface formats and present modes, and anisotropic sampling.
//! Qualifying adapters are ranked by device type, then by device-local memory.

use std::ffi::CStr;

use ash::vk;

use crate::error::{GpuError, Result, VkResultExt};
use crate::surface::SurfaceContext;

/// GPU vendor identification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GpuVendor {
    Nvidia,
    Amd,
    Intel,
    Apple,
    Other(u32),
}

impl GpuVendor {
    /// Identify vendor from PCI vendor ID.
    pub fn from_vendor_id(id: u32) -> Self {
        match id {
            0x10DE => Self::Nvidia,
            0x1002 => Self::Amd,
            0x8086 => Self::Intel,
            0x106B => Self::Apple,
            other => Self::Other(other),
        }
    }
}

/// Queue family indices used by the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    /// Family used for command submission.
    pub graphics: u32,
    /// Family used for presentation.
    pub present: u32,
}

impl QueueFamilyIndices {
    /// Distinct families, graphics first.
    pub fn unique(&self) -> Vec<u32> {
        if self.graphics == self.present {
            vec![self.graphics]
        } else {
            vec![self.graphics, self.present]
        }
    }
}

/// Pick graphics and present queue families.
///
/// A family supporting both is preferred so submission and presentation
/// share a queue; otherwise the first graphics family and the first
/// present-capable family are used.
pub fn find_queue_families(
    families: &[vk::QueueFamilyProperties],
    mut supports_present: impl FnMut(u32) -> Result<bool>,
) -> Result<Option<QueueFamilyIndices>> {
    let mut graphics = None;
    let mut present = None;

    for (i, family) in families.iter().enumerate() {
        let index = i as u32;
        let has_graphics =
            family.queue_count > 0 && family.queue_flags.contains(vk::QueueFlags::GRAPHICS);
        let has_present = family.queue_count > 0 && supports_present(index)?;

        if has_graphics && has_present {
            return Ok(Some(QueueFamilyIndices {
                graphics: index,
                present: index,
            }));
        }

        if has_graphics && graphics.is_none() {
            graphics = Some(index);
        }
        if has_present && present.is_none() {
            present = Some(index);
        }
    }

    Ok(graphics
        .zip(present)
        .map(|(graphics, present)| QueueFamilyIndices { graphics, present }))
}

/// Rank a qualifying adapter. Higher is better.
pub fn score_adapter(device_type: vk::PhysicalDeviceType, device_local_memory_mb: u64) -> u64 {
    let type_score = match device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => 3,
        vk::PhysicalDeviceType::INTEGRATED_GPU => 2,
        vk::PhysicalDeviceType::VIRTUAL_GPU => 1,
        _ => 0,
    };

    // Memory only breaks ties between adapters of the same type.
    (type_score << 40) + device_local_memory_mb.min((1 << 40) - 1)
}

/// Device extensions every adapter must expose.
pub fn required_device_extensions() -> Vec<&'static CStr> {
    vec![
        ash::khr::swapchain::NAME,
        #[cfg(target_os = "macos")]
        ash::khr::portability_subset::NAME,
    ]
}

/// A selected physical device and what the renderer needs to know about it.
#[derive(Debug, Clone)]
pub struct Adapter {
    /// Raw physical device handle.
    pub physical_device: vk::PhysicalDevice,
    /// Queue families for graphics and presentation.
    pub queue_families: QueueFamilyIndices,
    /// Vendor.
    pub vendor: GpuVendor,
    /// Human readable device name.
    pub device_name: String,
    /// Device type reported by the driver.
    pub device_type: vk::PhysicalDeviceType,
    /// Vulkan API version supported by the device.
    pub api_version: u32,
    /// Total device-local memory in MB.
    pub device_local_memory_mb: u64,
    /// Maximum sampler anisotropy.
    pub max_sampler_anisotropy: f32,
}

impl Adapter {
    /// Get a human-readable summary.
    pub fn summary(&self) -> String {
        format!(
            "{} ({:?}, {:?}) - Vulkan {}.{}.{} - {} MB VRAM",
            self.device_name,
            self.vendor,
            self.device_type,
            vk::api_version_major(self.api_version),
            vk::api_version_minor(self.api_version),
            vk::api_version_patch(self.api_version),
            self.device_local_memory_mb,
        )
    }
}

/// Select the best adapter able to render and present to `surface`.
///
/// # Safety
/// The instance and surface must be valid.
pub unsafe fn select_adapter(
    instance: &ash::Instance,
    surface: &SurfaceContext,
) -> Result<Adapter> {
    let devices =
        unsafe { instance.enumerate_physical_devices() }.check("vkEnumeratePhysicalDevices")?;

    if devices.is_empty() {
        return Err(GpuError::NoSuitableDevice);
    }

    let mut best: Option<(u64, Adapter)> = None;
    for device in devices {
        let Some(candidate) = (unsafe { evaluate_adapter(instance, surface, device) })? else {
            continue;
        };

        let score = score_adapter(candidate.device_type, candidate.device_local_memory_mb);
        tracing::debug!("Adapter candidate {} scored {}", candidate.device_name, score);

        if best.as_ref().map_or(true, |(best_score, _)| score > *best_score) {
            best = Some((score, candidate));
        }
    }

    best.map(|(_, adapter)| adapter)
        .ok_or(GpuError::NoSuitableDevice)
}

/// Check a single physical device, returning `None` if it does not qualify.
unsafe fn evaluate_adapter(
    instance: &ash::Instance,
    surface: &SurfaceContext,
    device: vk::PhysicalDevice,
) -> Result<Option<Adapter>> {
    let properties = unsafe { instance.get_physical_device_properties(device) };
    let features = unsafe { instance.get_physical_device_features(device) };
    let device_name = properties
        .device_name_as_c_str()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "<unnamed>".to_string());

    let families = unsafe { instance.get_physical_device_queue_family_properties(device) };
    let Some(queue_families) =
        find_queue_families(&families, |index| surface.supports_present(device, index))?
    else {
        tracing::debug!("{device_name}: no graphics/present queue family");
        return Ok(None);
    };

    let extensions = unsafe { instance.enumerate_device_extension_properties(device) }
        .check("vkEnumerateDeviceExtensionProperties")?;
    let has_extensions = required_device_extensions().iter().all(|required| {
        extensions
            .iter()
            .any(|ext| ext.extension_name_as_c_str().is_ok_and(|name| name == *required))
    });
    if !has_extensions {
        tracing::debug!("{device_name}: missing required device extensions");
        return Ok(None);
    }

    if !surface.support(device)?.is_adequate() {
        tracing::debug!("{device_name}: no surface formats or present modes");
        return Ok(None);
    }

    if features.sampler_anisotropy != vk::TRUE {
        tracing::debug!("{device_name}: sampler anisotropy unsupported");
        return Ok(None);
    }

    let memory = unsafe { instance.get_physical_device_memory_properties(device) };
    let device_local_memory_mb: u64 = memory
        .memory_heaps
        .iter()
        .take(memory.memory_heap_count as usize)
        .filter(|heap| heap.flags.contains(vk::MemoryHeapFlags::DEVICE_LOCAL))
        .map(|heap| heap.size / (1024 * 1024))
        .sum();

    Ok(Some(Adapter {
        physical_device: device,
        queue_families,
        vendor: GpuVendor::from_vendor_id(properties.vendor_id),
        device_name,
        device_type: properties.device_type,
        api_version: properties.api_version,
        device_local_memory_mb,
        max_sampler_anisotropy: properties.limits.max_sampler_anisotropy,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family(flags: vk::QueueFlags) -> vk::QueueFamilyProperties {
        vk::QueueFamilyProperties {
            queue_flags: flags,
            queue_count: 1,
            ..Default::default()
        }
    }

    #[test]
    fn vendor_identification() {
        assert_eq!(GpuVendor::from_vendor_id(0x10DE), GpuVendor::Nvidia);
        assert_eq!(GpuVendor::from_vendor_id(0x1002), GpuVendor::Amd);
        assert_eq!(GpuVendor::from_vendor_id(0x8086), GpuVendor::Intel);
        assert_eq!(GpuVendor::from_vendor_id(0x1234), GpuVendor::Other(0x1234));
    }

    #[test]
    fn prefers_family_with_graphics_and_present() {
        let families = [
            family(vk::QueueFlags::GRAPHICS),
            family(vk::QueueFlags::TRANSFER),
            family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE),
        ];
        // Family 0 cannot present, family 1 and 2 can.
        let indices = find_queue_families(&families, |i| Ok(i != 0))
            .unwrap()
            .unwrap();
        assert_eq!(indices, QueueFamilyIndices { graphics: 2, present: 2 });
        assert_eq!(indices.unique(), vec![2]);
    }

    #[test]
    fn falls_back_to_separate_families() {
        let families = [
            family(vk::QueueFlags::GRAPHICS),
            family(vk::QueueFlags::TRANSFER),
        ];
        let indices = find_queue_families(&families, |i| Ok(i == 1))
            .unwrap()
            .unwrap();
        assert_eq!(indices, QueueFamilyIndices { graphics: 0, present: 1 });
        assert_eq!(indices.unique(), vec![0, 1]);
    }

    #[test]
    fn no_present_family_disqualifies() {
        let families = [family(vk::QueueFlags::GRAPHICS)];
        assert!(find_queue_families(&families, |_| Ok(false))
            .unwrap()
            .is_none());
    }

    #[test]
    fn empty_families_are_skipped() {
        let mut empty = family(vk::QueueFlags::GRAPHICS);
        empty.queue_count = 0;
        let families = [empty, family(vk::QueueFlags::GRAPHICS)];
        let indices = find_queue_families(&families, |_| Ok(true))
            .unwrap()
            .unwrap();
        assert_eq!(indices.graphics, 1);
    }

    #[test]
    fn present_query_errors_propagate() {
        let families = [family(vk::QueueFlags::GRAPHICS)];
        let result = find_queue_families(&families, |_| {
            Err::<bool, _>(vk::Result::ERROR_SURFACE_LOST_KHR)
                .check("vkGetPhysicalDeviceSurfaceSupportKHR")
        });
        assert!(result.is_err());
    }

    #[test]
    fn discrete_beats_integrated_regardless_of_memory() {
        let discrete = score_adapter(vk::PhysicalDeviceType::DISCRETE_GPU, 2048);
        let integrated = score_adapter(vk::PhysicalDeviceType::INTEGRATED_GPU, 64 * 1024);
        let virtual_gpu = score_adapter(vk::PhysicalDeviceType::VIRTUAL_GPU, 64 * 1024);
        let cpu = score_adapter(vk::PhysicalDeviceType::CPU, 64 * 1024);
        assert!(discrete > integrated);
        assert!(integrated > virtual_gpu);
        assert!(virtual_gpu > cpu);
    }

    #[test]
    fn memory_breaks_ties() {
        let small = score_adapter(vk::PhysicalDeviceType::DISCRETE_GPU, 4096);
        let large = score_adapter(vk::PhysicalDeviceType::DISCRETE_GPU, 8192);
        assert!(large > small);
    }
}
