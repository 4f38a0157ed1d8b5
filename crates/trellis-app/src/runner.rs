//! Application runner.

use std::thread;
use std::time::{Duration, Instant};

use tracing::{error, info};
use trellis_core::constants::DEFAULT_MATERIAL_CAPACITY;
use trellis_core::{init_logging, Error as ConfigError};
use trellis_gpu::GpuContextBuilder;
use trellis_render::{
    FrameLoop, FrameOutcome, FrameStats, PresentationWindow, RendererConfig, VulkanRenderer,
};

use crate::app::SandboxApp;
use crate::context::AppContext;
use crate::window::AppWindow;

/// Application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Window title.
    pub title: String,
    /// Initial window width.
    pub width: u32,
    /// Initial window height.
    pub height: u32,
    /// Target frames per second (None for unlimited).
    pub target_fps: Option<u32>,
    /// Enable vsync.
    pub vsync: bool,
    /// Enable Vulkan validation layers (default: debug builds only).
    pub validation: bool,
    /// Number of materials the renderer can hold.
    pub material_capacity: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            title: "Trellis".to_string(),
            width: 1280,
            height: 720,
            target_fps: None,
            vsync: false,
            validation: cfg!(debug_assertions),
            material_capacity: DEFAULT_MATERIAL_CAPACITY,
        }
    }
}

impl AppConfig {
    /// Create a new config with the given title.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    /// Set the window dimensions.
    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Set the target FPS.
    pub fn with_target_fps(mut self, fps: u32) -> Self {
        self.target_fps = Some(fps);
        self
    }

    /// Enable or disable vsync.
    pub fn with_vsync(mut self, vsync: bool) -> Self {
        self.vsync = vsync;
        self
    }

    /// Enable or disable validation layers.
    pub fn with_validation(mut self, validation: bool) -> Self {
        self.validation = validation;
        self
    }

    /// Set the material descriptor capacity.
    pub fn with_material_capacity(mut self, capacity: u32) -> Self {
        self.material_capacity = capacity;
        self
    }

    /// Minimum duration of one iteration, if frame pacing is enabled.
    pub fn target_frame_time(&self) -> Option<Duration> {
        self.target_fps
            .filter(|&fps| fps > 0)
            .map(|fps| Duration::from_nanos(1_000_000_000 / u64::from(fps)))
    }

    /// Reject settings that cannot produce a running loop.
    pub fn validate(&self) -> trellis_core::Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(ConfigError::EmptyWindow {
                width: self.width,
                height: self.height,
            });
        }
        if self.material_capacity == 0 {
            return Err(ConfigError::ZeroCapacity {
                what: "Material capacity",
            });
        }
        if self.target_fps == Some(0) {
            return Err(ConfigError::Config(
                "target FPS must be positive, leave it unset for unlimited".to_string(),
            ));
        }
        Ok(())
    }

    fn renderer_config(&self) -> RendererConfig {
        RendererConfig {
            vsync: self.vsync,
            material_capacity: self.material_capacity,
            ..Default::default()
        }
    }
}

/// Minimum, maximum and average frame rate over a run.
#[derive(Debug, Clone, Copy)]
pub struct FpsStats {
    min: f64,
    max: f64,
    sum: f64,
    samples: u64,
}

impl Default for FpsStats {
    fn default() -> Self {
        Self {
            min: f64::MAX,
            max: 0.0,
            sum: 0.0,
            samples: 0,
        }
    }
}

impl FpsStats {
    /// Record one frame that took `dt` seconds. Zero durations are ignored.
    pub fn record(&mut self, dt: f32) {
        if dt <= 0.0 {
            return;
        }
        let fps = 1.0 / f64::from(dt);
        self.min = self.min.min(fps);
        self.max = self.max.max(fps);
        self.sum += fps;
        self.samples += 1;
    }

    pub fn min(&self) -> Option<f64> {
        (self.samples > 0).then_some(self.min)
    }

    pub fn max(&self) -> Option<f64> {
        (self.samples > 0).then_some(self.max)
    }

    pub fn average(&self) -> Option<f64> {
        (self.samples > 0).then(|| self.sum / self.samples as f64)
    }

    fn log(&self, frames: FrameStats) {
        if let (Some(min), Some(max), Some(avg)) = (self.min(), self.max(), self.average()) {
            info!("FPS Statistics:");
            info!("  Min: {min:.1}");
            info!("  Max: {max:.1}");
            info!("  Avg: {avg:.1}");
        }
        info!("  Presented frames: {}", frames.presented);
        info!("  Abandoned frames: {}", frames.abandoned);
        info!("  Swapchain recreations: {}", frames.recreations);
    }
}

/// Run a `SandboxApp` with the given configuration.
///
/// Initializes logging, creates the window, GPU context and renderer, and
/// drives the frame loop until the window closes. A fatal frame error ends
/// the loop; everything including the window is released before it is
/// returned.
pub fn run_app<A: SandboxApp>(config: AppConfig) -> anyhow::Result<()> {
    init_logging();
    config.validate()?;
    info!("{} starting...", config.title);

    let mut window = AppWindow::new(&config.title, config.width, config.height)?;
    let handle = window.handle();

    let gpu = GpuContextBuilder::new()
        .app_name(&config.title)
        .validation(config.validation)
        .build(handle.as_ref())?;

    let (width, height) = window.drawable_size();
    let renderer =
        VulkanRenderer::new(&gpu, width.max(1), height.max(1), config.renderer_config())?;
    drop(gpu);

    let mut ctx = AppContext::new(handle, renderer);
    let mut app = A::init(&mut ctx)?;
    info!("Application ready!");

    let mut frame_loop = FrameLoop::for_backend(&ctx.renderer);
    let mut fps = FpsStats::default();

    let result = run_loop(
        &mut window,
        &mut ctx,
        &mut app,
        &mut frame_loop,
        &mut fps,
        config.target_frame_time(),
    );
    if let Err(e) = &result {
        error!("Frame loop failed: {e:#}");
    }

    fps.log(frame_loop.stats());

    info!("Starting cleanup...");
    if let Err(e) = ctx.gpu().wait_idle() {
        error!("Failed to wait idle: {e}");
    }
    app.cleanup(&mut ctx);
    drop(app);
    drop(ctx);
    drop(window);
    info!("Cleanup complete");

    result
}

fn run_loop<A: SandboxApp>(
    window: &mut AppWindow,
    ctx: &mut AppContext,
    app: &mut A,
    frame_loop: &mut FrameLoop,
    fps: &mut FpsStats,
    target_frame_time: Option<Duration>,
) -> anyhow::Result<()> {
    while window.poll_events() {
        let frame_start = Instant::now();

        for event in window.drain_events() {
            app.on_event(&event);
        }

        let dt = ctx.tick();
        fps.record(dt);
        app.update(ctx, dt);

        let recreations = frame_loop.stats().recreations;
        match frame_loop.run_frame(&mut ctx.renderer, window, app.scene())? {
            FrameOutcome::Presented { .. } => ctx.frame_count += 1,
            FrameOutcome::Abandoned => {}
            FrameOutcome::WindowClosed => break,
        }

        if frame_loop.stats().recreations > recreations {
            let extent = ctx.extent();
            app.on_resize(ctx, extent.width, extent.height)?;
        }

        if let Some(target) = target_frame_time {
            let elapsed = frame_start.elapsed();
            if elapsed < target {
                thread::sleep(target - elapsed);
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn config_builder() {
        let config = AppConfig::new("Test")
            .with_size(640, 480)
            .with_vsync(true)
            .with_validation(false)
            .with_target_fps(60)
            .with_material_capacity(8);

        assert_eq!(config.title, "Test");
        assert_eq!((config.width, config.height), (640, 480));
        assert!(config.vsync);
        assert!(!config.validation);
        assert_eq!(config.material_capacity, 8);
        assert_eq!(config.renderer_config().material_capacity, 8);
        assert!(config.renderer_config().vsync);
    }

    #[test]
    fn default_material_capacity() {
        assert_eq!(AppConfig::default().material_capacity, 100);
    }

    #[test]
    fn default_config_is_valid() {
        assert_eq!(AppConfig::default().validate(), Ok(()));
        assert_eq!(AppConfig::default().with_target_fps(144).validate(), Ok(()));
    }

    #[test]
    fn zero_sized_window_is_rejected() {
        assert_eq!(
            AppConfig::default().with_size(0, 720).validate(),
            Err(ConfigError::EmptyWindow {
                width: 0,
                height: 720
            })
        );
        assert!(AppConfig::default().with_size(1280, 0).validate().is_err());
    }

    #[test]
    fn zero_material_capacity_is_rejected() {
        let err = AppConfig::default()
            .with_material_capacity(0)
            .validate()
            .unwrap_err();
        assert!(matches!(err, ConfigError::ZeroCapacity { .. }));
        assert_eq!(err.to_string(), "Material capacity must be at least 1");
    }

    #[test]
    fn zero_target_fps_is_rejected() {
        assert!(matches!(
            AppConfig::default().with_target_fps(0).validate(),
            Err(ConfigError::Config(_))
        ));
    }

    #[test]
    fn frame_time_from_target_fps() {
        let config = AppConfig::default().with_target_fps(50);
        assert_eq!(config.target_frame_time(), Some(Duration::from_millis(20)));
        assert_eq!(AppConfig::default().target_frame_time(), None);
        assert_eq!(AppConfig::default().with_target_fps(0).target_frame_time(), None);
    }

    #[test]
    fn fps_stats() {
        let mut stats = FpsStats::default();
        assert_eq!(stats.average(), None);

        stats.record(0.5);
        stats.record(0.25);
        stats.record(0.0);

        assert_relative_eq!(stats.min().unwrap(), 2.0);
        assert_relative_eq!(stats.max().unwrap(), 4.0);
        assert_relative_eq!(stats.average().unwrap(), 3.0);
    }
}
