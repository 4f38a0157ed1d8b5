//! Frame loop controller and swapchain recreation state machine.
//!
//! [`FrameLoop`] owns only the ordering: which slot is current, when to
//! wait, when to abandon, when to rebuild. The device work behind each step
//! is done by a [`FrameBackend`], and the window is reached through
//! [`PresentationWindow`], so the controller runs unchanged against Vulkan
//! or an in-memory test double.

use ash::vk;
use trellis_gpu::{AcquireStatus, PresentStatus, Result};

use crate::camera::CameraUniforms;
use crate::drawable::{Drawable, Scene};

/// Device side of one loop iteration, addressed by frame slot.
pub trait FrameBackend {
    /// Number of frame slots.
    fn frames_in_flight(&self) -> usize;

    /// Current swapchain extent.
    fn extent(&self) -> vk::Extent2D;

    /// Block until the slot's in-flight fence is signaled.
    fn wait_for_slot(&mut self, slot: usize) -> Result<()>;

    /// Acquire the next swapchain image, signalling the slot's
    /// image-available semaphore.
    fn acquire_image(&mut self, slot: usize) -> Result<AcquireStatus>;

    /// Write the slot's per-frame uniforms.
    fn update_frame_data(&mut self, slot: usize, camera: &CameraUniforms) -> Result<()>;

    /// Reset the slot's in-flight fence to unsignaled.
    fn reset_slot(&mut self, slot: usize) -> Result<()>;

    /// Reset and re-record the slot's command buffer for `image_index`.
    fn record(&mut self, slot: usize, image_index: u32, drawables: &[Drawable]) -> Result<()>;

    /// Submit the slot's command buffer: wait on image-available, signal
    /// render-finished and the in-flight fence.
    fn submit(&mut self, slot: usize) -> Result<()>;

    /// Present `image_index` once the slot's render-finished semaphore signals.
    fn present(&mut self, slot: usize, image_index: u32) -> Result<PresentStatus>;

    /// Block until the device is idle.
    fn wait_idle(&mut self) -> Result<()>;

    /// Destroy the swapchain, everything sized by it, and the frame sync
    /// objects. A no-op when already destroyed.
    fn destroy_swapchain_resources(&mut self);

    /// Create the swapchain at `width`x`height`, everything sized by it,
    /// the command buffers and the frame sync objects (fences signaled).
    fn create_swapchain_resources(&mut self, width: u32, height: u32) -> Result<()>;
}

/// Window side of the loop.
pub trait PresentationWindow {
    /// Current drawable size in pixels.
    fn drawable_size(&self) -> (u32, u32);

    /// Return and clear the resize flag.
    fn take_resized(&mut self) -> bool;

    /// Block until at least one window event has been handled.
    ///
    /// Returns `false` once the window is closing.
    fn wait_events(&mut self) -> bool;
}

/// Swapchain lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Active,
    /// The swapchain must be rebuilt before the next frame.
    Recreating,
}

/// Result of one [`FrameLoop::run_frame`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// The frame was submitted and handed to the presentation engine.
    Presented { image_index: u32 },
    /// Acquire reported out-of-date or suboptimal, or the window was
    /// resized; nothing was recorded and the frame index did not move.
    Abandoned,
    /// The window closed while waiting for a drawable size.
    WindowClosed,
}

/// Running counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Iterations that reached present.
    pub presented: u64,
    pub abandoned: u64,
    pub recreations: u64,
}

/// Drives acquire, record, submit and present across the frame slots.
///
/// After any `Err` the loop must not be driven further: the error is fatal.
#[derive(Debug)]
pub struct FrameLoop {
    state: LoopState,
    frame_index: usize,
    frames_in_flight: usize,
    stats: FrameStats,
}

impl FrameLoop {
    /// Create a loop over `frames_in_flight` slots, starting at slot 0.
    pub fn new(frames_in_flight: usize) -> Self {
        Self {
            state: LoopState::Active,
            frame_index: 0,
            frames_in_flight: frames_in_flight.max(1),
            stats: FrameStats::default(),
        }
    }

    /// Create a loop sized for `backend`.
    pub fn for_backend<B: FrameBackend + ?Sized>(backend: &B) -> Self {
        Self::new(backend.frames_in_flight())
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    /// Slot used by the next frame.
    pub fn frame_index(&self) -> usize {
        self.frame_index
    }

    pub fn frames_in_flight(&self) -> usize {
        self.frames_in_flight
    }

    pub fn stats(&self) -> FrameStats {
        self.stats
    }

    /// Whether the next call rebuilds the swapchain first.
    pub fn needs_recreation(&self) -> bool {
        self.state == LoopState::Recreating
    }

    /// Run one iteration of the loop.
    ///
    /// A pending recreation is carried out first. The frame index advances
    /// only when the frame reaches present.
    pub fn run_frame<B, W, S>(
        &mut self,
        backend: &mut B,
        window: &mut W,
        scene: &S,
    ) -> Result<FrameOutcome>
    where
        B: FrameBackend + ?Sized,
        W: PresentationWindow + ?Sized,
        S: Scene + ?Sized,
    {
        if self.state == LoopState::Recreating && !self.recreate(backend, window)? {
            return Ok(FrameOutcome::WindowClosed);
        }

        let slot = self.frame_index;

        backend.wait_for_slot(slot)?;

        let status = backend.acquire_image(slot)?;
        let resized = window.take_resized();
        let image_index = match status {
            AcquireStatus::Acquired {
                image_index,
                suboptimal: false,
            } if !resized => image_index,
            status => {
                tracing::debug!(?status, resized, slot, "Abandoning frame");
                self.stats.abandoned += 1;
                self.state = LoopState::Recreating;
                return Ok(FrameOutcome::Abandoned);
            }
        };

        backend.update_frame_data(slot, &scene.camera(backend.extent()))?;

        // The fence wait above guarantees the slot's command buffer is idle.
        backend.reset_slot(slot)?;
        backend.record(slot, image_index, scene.drawables())?;

        backend.submit(slot)?;

        let present = backend.present(slot, image_index)?;
        self.stats.presented += 1;
        if present.needs_recreation() || window.take_resized() {
            tracing::debug!(?present, slot, "Swapchain recreation requested after present");
            self.state = LoopState::Recreating;
        }

        self.frame_index = (self.frame_index + 1) % self.frames_in_flight;

        Ok(FrameOutcome::Presented { image_index })
    }

    /// Rebuild the swapchain and everything that depends on it.
    ///
    /// Blocks while the window has a zero-sized drawable (minimized).
    /// Returns `Ok(false)` if the window closed during that wait; the loop
    /// then stays in [`LoopState::Recreating`].
    pub fn recreate<B, W>(&mut self, backend: &mut B, window: &mut W) -> Result<bool>
    where
        B: FrameBackend + ?Sized,
        W: PresentationWindow + ?Sized,
    {
        self.state = LoopState::Recreating;

        let (mut width, mut height) = window.drawable_size();
        while width == 0 || height == 0 {
            if !window.wait_events() {
                return Ok(false);
            }
            (width, height) = window.drawable_size();
        }

        backend.wait_idle()?;
        backend.destroy_swapchain_resources();
        backend.create_swapchain_resources(width, height)?;

        // Resizes seen so far are covered by this rebuild.
        window.take_resized();

        self.frames_in_flight = backend.frames_in_flight().max(1);
        self.frame_index = 0;
        self.state = LoopState::Active;
        self.stats.recreations += 1;

        tracing::info!("Swapchain recreated at {width}x{height}");
        Ok(true)
    }
}
