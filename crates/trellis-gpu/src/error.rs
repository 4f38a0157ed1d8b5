//! GPU error types.

use std::panic::Location;

use ash::prelude::VkResult;
use ash::vk;
use thiserror::Error;

/// GPU-related errors.
#[derive(Error, Debug)]
pub enum GpuError {
    /// A Vulkan entry point returned a failure code.
    #[error("{op} failed with {result} at {location}")]
    Vulkan {
        /// Name of the Vulkan entry point.
        op: &'static str,
        /// The raw result code.
        result: vk::Result,
        /// Source location of the call.
        location: &'static Location<'static>,
    },

    /// The Vulkan loader could not be found.
    #[error("Failed to load Vulkan: {0}")]
    Loading(#[from] ash::LoadingError),

    /// No suitable GPU found.
    #[error("No suitable GPU found")]
    NoSuitableDevice,

    /// Surface creation failed.
    #[error("Surface creation failed: {0}")]
    SurfaceCreation(String),

    /// The surface reports no usable formats or present modes.
    #[error("Surface is unusable: {0}")]
    SurfaceUnsupported(&'static str),

    /// Memory allocation failed.
    #[error("Memory allocation failed: {0}")]
    AllocationFailed(String),

    /// A fixed-capacity descriptor pool ran out of sets.
    #[error("Descriptor pool exhausted: capacity {capacity}, requested {requested} more")]
    DescriptorPoolExhausted {
        /// Maximum number of sets the pool was created for.
        capacity: u32,
        /// Number of sets the failing call asked for.
        requested: u32,
    },

    /// Invalid state.
    #[error("Invalid state: {0}")]
    InvalidState(String),
}

impl GpuError {
    /// The raw Vulkan result code, if this error came from a Vulkan call.
    pub fn vk_result(&self) -> Option<vk::Result> {
        match self {
            Self::Vulkan { result, .. } => Some(*result),
            _ => None,
        }
    }
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, GpuError>;

/// Inspect a raw Vulkan result at its call site.
///
/// Failures are logged with the operation name and the caller's location and
/// turned into [`GpuError::Vulkan`].
pub trait VkResultExt<T> {
    /// Convert the result, tagging failures with `op` and the caller location.
    #[must_use = "Vulkan results must be inspected"]
    fn check(self, op: &'static str) -> Result<T>;
}

impl<T> VkResultExt<T> for VkResult<T> {
    #[track_caller]
    fn check(self, op: &'static str) -> Result<T> {
        let location = Location::caller();
        self.map_err(|result| {
            tracing::error!(op, %result, %location, "Vulkan call failed");
            GpuError::Vulkan {
                op,
                result,
                location,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_passes_through_success() {
        let ok: VkResult<u32> = Ok(7);
        assert_eq!(ok.check("vkTest").unwrap(), 7);
    }

    #[test]
    fn check_records_operation_and_location() {
        let failed: VkResult<()> = Err(vk::Result::ERROR_DEVICE_LOST);
        let line = line!() + 1;
        let err = failed.check("vkQueueSubmit").unwrap_err();

        match &err {
            GpuError::Vulkan {
                op,
                result,
                location,
            } => {
                assert_eq!(*op, "vkQueueSubmit");
                assert_eq!(*result, vk::Result::ERROR_DEVICE_LOST);
                assert_eq!(location.line(), line);
                assert!(location.file().ends_with("error.rs"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(err.vk_result(), Some(vk::Result::ERROR_DEVICE_LOST));
        assert!(err.to_string().starts_with("vkQueueSubmit failed"));
    }
}
