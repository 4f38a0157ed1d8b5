//! Core types and utilities for the Trellis Vulkan sandbox.
//!
//! This crate provides the foundational pieces shared by every other crate:
//! - Engine-wide constants (frames in flight, descriptor capacity)
//! - The configuration error type
//! - Logging initialization

pub mod error;
pub mod logging;

pub use error::{Error, Result};
pub use logging::init_logging;

/// Engine-wide constants
pub mod constants {
    /// Number of frame slots cycled by the frame loop.
    ///
    /// Independent of the swapchain image count.
    pub const MAX_FRAMES_IN_FLIGHT: usize = 3;

    /// Default number of material descriptor sets the material pool can hold.
    pub const DEFAULT_MATERIAL_CAPACITY: u32 = 100;

    /// Timeout used when waiting on in-flight fences (effectively forever).
    pub const FENCE_TIMEOUT_NS: u64 = u64::MAX;
}
