//! Frame loop behaviour against an in-memory backend and window.
//!
//! The backend models each slot's in-flight fence as a CPU-visible state.
//! Submitted work stays pending until the fence is waited on or the device
//! is idled, so every frame still in flight is visible to the assertions.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use glam::Mat4;
use trellis_gpu::vk::{self, Handle};
use trellis_gpu::{AcquireStatus, GpuError, PresentStatus, Result, VkResultExt};
use trellis_render::{
    CameraUniforms, Drawable, FrameBackend, FrameLoop, FrameOutcome, LoopState,
    PresentationWindow, StaticScene,
};

const FRAMES_IN_FLIGHT: usize = 3;

type Log = Rc<RefCell<Vec<String>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FenceState {
    Signaled,
    /// Reset with nothing submitted.
    Unsignaled,
    /// Submitted and not yet complete.
    Pending,
}

struct MockBackend {
    log: Log,
    /// Empty while the sync objects are destroyed.
    fences: Vec<FenceState>,
    extent: vk::Extent2D,
    image_count: u32,
    next_image: u32,
    acquire_script: VecDeque<Result<AcquireStatus>>,
    present_script: VecDeque<PresentStatus>,
    fail_create: bool,
    waits: [usize; FRAMES_IN_FLIGHT],
    max_unsignaled: usize,
    uniforms: [Option<CameraUniforms>; FRAMES_IN_FLIGHT],
}

impl MockBackend {
    fn new(log: &Log) -> Self {
        Self {
            log: log.clone(),
            fences: vec![FenceState::Signaled; FRAMES_IN_FLIGHT],
            extent: vk::Extent2D {
                width: 800,
                height: 600,
            },
            image_count: 3,
            next_image: 0,
            acquire_script: VecDeque::new(),
            present_script: VecDeque::new(),
            fail_create: false,
            waits: [0; FRAMES_IN_FLIGHT],
            max_unsignaled: 0,
            uniforms: [None; FRAMES_IN_FLIGHT],
        }
    }

    fn note(&self, entry: String) {
        self.log.borrow_mut().push(entry);
    }

    fn fence(&self, slot: usize) -> Result<FenceState> {
        self.fences
            .get(slot)
            .copied()
            .ok_or_else(|| GpuError::InvalidState(format!("slot {slot} has no sync objects")))
    }

    fn unsignaled(&self) -> usize {
        self.fences
            .iter()
            .filter(|&&f| f != FenceState::Signaled)
            .count()
    }
}

impl FrameBackend for MockBackend {
    fn frames_in_flight(&self) -> usize {
        FRAMES_IN_FLIGHT
    }

    fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    fn wait_for_slot(&mut self, slot: usize) -> Result<()> {
        self.note(format!("wait({slot})"));
        match self.fence(slot)? {
            FenceState::Unsignaled => {
                return Err(GpuError::InvalidState(format!(
                    "slot {slot} waits on a fence nothing will signal"
                )));
            }
            FenceState::Pending | FenceState::Signaled => {
                self.fences[slot] = FenceState::Signaled;
            }
        }
        self.waits[slot] += 1;
        Ok(())
    }

    fn acquire_image(&mut self, slot: usize) -> Result<AcquireStatus> {
        self.note(format!("acquire({slot})"));
        self.fence(slot)?;
        if let Some(scripted) = self.acquire_script.pop_front() {
            return scripted;
        }
        let image_index = self.next_image;
        self.next_image = (self.next_image + 1) % self.image_count;
        Ok(AcquireStatus::Acquired {
            image_index,
            suboptimal: false,
        })
    }

    fn update_frame_data(&mut self, slot: usize, camera: &CameraUniforms) -> Result<()> {
        self.note(format!("update({slot})"));
        assert_ne!(
            self.fence(slot)?,
            FenceState::Pending,
            "uniforms of slot {slot} written while in flight"
        );
        self.uniforms[slot] = Some(*camera);
        Ok(())
    }

    fn reset_slot(&mut self, slot: usize) -> Result<()> {
        self.note(format!("reset({slot})"));
        assert_eq!(
            self.fence(slot)?,
            FenceState::Signaled,
            "fence of slot {slot} reset before it was waited on"
        );
        self.fences[slot] = FenceState::Unsignaled;
        Ok(())
    }

    fn record(&mut self, slot: usize, image_index: u32, drawables: &[Drawable]) -> Result<()> {
        self.note(format!(
            "record({slot}, image {image_index}, {} drawables)",
            drawables.len()
        ));
        assert_ne!(
            self.fence(slot)?,
            FenceState::Pending,
            "command buffer of slot {slot} re-recorded while in flight"
        );
        Ok(())
    }

    fn submit(&mut self, slot: usize) -> Result<()> {
        self.note(format!("submit({slot})"));
        assert_eq!(self.fence(slot)?, FenceState::Unsignaled);
        self.fences[slot] = FenceState::Pending;
        self.max_unsignaled = self.max_unsignaled.max(self.unsignaled());
        Ok(())
    }

    fn present(&mut self, slot: usize, image_index: u32) -> Result<PresentStatus> {
        self.note(format!("present({slot}, image {image_index})"));
        Ok(self
            .present_script
            .pop_front()
            .unwrap_or(PresentStatus::Presented))
    }

    fn wait_idle(&mut self) -> Result<()> {
        self.note("wait_idle".to_string());
        for fence in &mut self.fences {
            if *fence == FenceState::Pending {
                *fence = FenceState::Signaled;
            }
        }
        Ok(())
    }

    fn destroy_swapchain_resources(&mut self) {
        self.note("destroy".to_string());
        assert!(
            !self.fences.contains(&FenceState::Pending),
            "resources destroyed while the GPU still uses them"
        );
        self.fences.clear();
    }

    fn create_swapchain_resources(&mut self, width: u32, height: u32) -> Result<()> {
        self.note(format!("create({width}x{height})"));
        if self.fail_create {
            return Err::<(), _>(vk::Result::ERROR_INITIALIZATION_FAILED)
                .check("vkCreateSwapchainKHR");
        }
        self.extent = vk::Extent2D { width, height };
        self.next_image = 0;
        self.fences = vec![FenceState::Signaled; FRAMES_IN_FLIGHT];
        Ok(())
    }
}

struct MockWindow {
    log: Log,
    size: (u32, u32),
    resized: bool,
    /// Extra resize reports, consumed one per check.
    resize_checks: VecDeque<bool>,
    /// Size reported after each successive event wait. The window closes
    /// once these run out.
    upcoming_sizes: VecDeque<(u32, u32)>,
}

impl MockWindow {
    fn new(log: &Log) -> Self {
        Self {
            log: log.clone(),
            size: (800, 600),
            resized: false,
            resize_checks: VecDeque::new(),
            upcoming_sizes: VecDeque::new(),
        }
    }
}

impl PresentationWindow for MockWindow {
    fn drawable_size(&self) -> (u32, u32) {
        self.size
    }

    fn take_resized(&mut self) -> bool {
        let scripted = self.resize_checks.pop_front().unwrap_or(false);
        std::mem::take(&mut self.resized) || scripted
    }

    fn wait_events(&mut self) -> bool {
        self.log.borrow_mut().push("wait_events".to_string());
        match self.upcoming_sizes.pop_front() {
            Some(size) => {
                self.size = size;
                self.resized = true;
                true
            }
            None => false,
        }
    }
}

struct Harness {
    log: Log,
    backend: MockBackend,
    window: MockWindow,
    scene: StaticScene,
    frame_loop: FrameLoop,
}

impl Harness {
    fn new() -> Self {
        let log = Log::default();
        let backend = MockBackend::new(&log);
        let window = MockWindow::new(&log);
        let frame_loop = FrameLoop::for_backend(&backend);

        let cube = |x: f32, set: u64| Drawable {
            transform: Mat4::from_translation(glam::Vec3::new(x, 0.0, 0.0)),
            vertex_buffer: vk::Buffer::from_raw(1),
            index_buffer: vk::Buffer::from_raw(2),
            index_count: 36,
            descriptor_set: vk::DescriptorSet::from_raw(set),
        };
        let scene = StaticScene {
            camera: CameraUniforms {
                position: [1.0, 2.0, 3.0, 1.0],
                ..Default::default()
            },
            drawables: vec![cube(-1.0, 10), cube(1.0, 11)],
        };

        Self {
            log,
            backend,
            window,
            scene,
            frame_loop,
        }
    }

    fn frame(&mut self) -> Result<FrameOutcome> {
        self.frame_loop
            .run_frame(&mut self.backend, &mut self.window, &self.scene)
    }

    fn take_log(&self) -> Vec<String> {
        std::mem::take(&mut *self.log.borrow_mut())
    }

    fn position(&self, entry: &str) -> Option<usize> {
        self.log.borrow().iter().position(|e| e == entry)
    }
}

#[test]
fn one_iteration_runs_steps_in_order() {
    let mut h = Harness::new();

    let outcome = h.frame().unwrap();

    assert_eq!(outcome, FrameOutcome::Presented { image_index: 0 });
    insta::assert_snapshot!(h.take_log().join("\n"), @r"
    wait(0)
    acquire(0)
    update(0)
    reset(0)
    record(0, image 0, 2 drawables)
    submit(0)
    present(0, image 0)
    ");
    assert_eq!(h.backend.uniforms[0], Some(h.scene.camera));
}

#[test]
fn frame_index_cycles_through_slots() {
    let mut h = Harness::new();
    let mut indices = vec![h.frame_loop.frame_index()];

    for _ in 0..3 {
        assert!(matches!(h.frame().unwrap(), FrameOutcome::Presented { .. }));
        indices.push(h.frame_loop.frame_index());
    }

    assert_eq!(indices, vec![0, 1, 2, 0]);
    assert_eq!(h.backend.waits, [1, 1, 1]);

    for _ in 0..3 {
        h.frame().unwrap();
    }
    assert_eq!(h.frame_loop.frame_index(), 0);
    assert_eq!(h.backend.waits, [2, 2, 2]);
    assert_eq!(h.frame_loop.stats().presented, 6);
}

#[test]
fn frames_in_flight_never_exceed_slot_count() {
    let mut h = Harness::new();

    for _ in 0..10 {
        h.frame().unwrap();
        assert!(h.backend.unsignaled() <= FRAMES_IN_FLIGHT);
    }

    // Nothing is waited on early, so the pipeline fills up completely.
    assert_eq!(h.backend.max_unsignaled, FRAMES_IN_FLIGHT);
}

#[test]
fn slots_are_waited_on_before_reuse() {
    let mut h = Harness::new();
    for _ in 0..7 {
        h.frame().unwrap();
    }

    let mut busy = [false; FRAMES_IN_FLIGHT];
    for entry in h.take_log() {
        let (call, args) = entry.split_once('(').unwrap();
        let slot: usize = args[..1].parse().unwrap();
        match call {
            "submit" => busy[slot] = true,
            "wait" => busy[slot] = false,
            "reset" | "record" | "update" => {
                assert!(!busy[slot], "{entry} while slot {slot} is in flight");
            }
            _ => {}
        }
    }
}

#[test]
fn out_of_date_acquire_abandons_without_advancing() {
    let mut h = Harness::new();
    h.frame().unwrap();
    assert_eq!(h.frame_loop.frame_index(), 1);
    h.take_log();

    h.backend
        .acquire_script
        .push_back(Ok(AcquireStatus::OutOfDate));
    let outcome = h.frame().unwrap();

    assert_eq!(outcome, FrameOutcome::Abandoned);
    assert_eq!(h.frame_loop.frame_index(), 1);
    assert_eq!(h.frame_loop.state(), LoopState::Recreating);
    assert_eq!(h.take_log(), vec!["wait(1)", "acquire(1)"]);

    let outcome = h.frame().unwrap();
    assert_eq!(outcome, FrameOutcome::Presented { image_index: 0 });
    assert_eq!(
        h.take_log()[..4],
        ["wait_idle", "destroy", "create(800x600)", "wait(0)"]
    );
    assert_eq!(h.frame_loop.state(), LoopState::Active);
    assert_eq!(h.frame_loop.frame_index(), 1);

    let stats = h.frame_loop.stats();
    assert_eq!(stats.abandoned, 1);
    assert_eq!(stats.recreations, 1);
    assert_eq!(stats.presented, 2);
}

#[test]
fn suboptimal_acquire_abandons() {
    let mut h = Harness::new();
    h.backend
        .acquire_script
        .push_back(Ok(AcquireStatus::Acquired {
            image_index: 2,
            suboptimal: true,
        }));

    assert_eq!(h.frame().unwrap(), FrameOutcome::Abandoned);
    assert_eq!(h.frame_loop.frame_index(), 0);
    assert!(h.frame_loop.needs_recreation());
    assert!(h.position("record(0, image 2, 2 drawables)").is_none());
}

#[test]
fn resize_flag_abandons_and_rebuilds_at_new_size() {
    let mut h = Harness::new();
    h.window.size = (1280, 720);
    h.window.resized = true;

    assert_eq!(h.frame().unwrap(), FrameOutcome::Abandoned);
    assert!(!h.window.resized);

    h.take_log();
    h.frame().unwrap();
    assert!(h.position("create(1280x720)").is_some());
    assert_eq!(
        h.backend.extent,
        vk::Extent2D {
            width: 1280,
            height: 720
        }
    );
}

#[test]
fn present_out_of_date_advances_then_recreates() {
    let mut h = Harness::new();
    h.frame().unwrap();
    h.backend.present_script.push_back(PresentStatus::OutOfDate);

    let outcome = h.frame().unwrap();

    assert!(matches!(outcome, FrameOutcome::Presented { .. }));
    assert_eq!(h.frame_loop.frame_index(), 2);
    assert_eq!(h.frame_loop.state(), LoopState::Recreating);

    h.take_log();
    h.frame().unwrap();
    assert_eq!(h.take_log()[..3], ["wait_idle", "destroy", "create(800x600)"]);
    assert_eq!(h.frame_loop.frame_index(), 1);
}

#[test]
fn resize_seen_after_present_schedules_recreation() {
    let mut h = Harness::new();
    // Not yet resized when acquire returns, resized by the time present has.
    h.window.resize_checks = VecDeque::from([false, true]);
    h.window.size = (640, 480);

    assert_eq!(h.frame().unwrap(), FrameOutcome::Presented { image_index: 0 });
    assert_eq!(h.frame_loop.frame_index(), 1);
    assert_eq!(h.frame_loop.state(), LoopState::Recreating);

    h.frame().unwrap();
    assert!(h.position("create(640x480)").is_some());
    assert_eq!(h.frame_loop.frame_index(), 1);
}

#[test]
fn recreation_resets_index_and_signals_every_fence() {
    let mut h = Harness::new();
    h.frame().unwrap();
    h.frame().unwrap();
    assert_eq!(h.backend.unsignaled(), 2);

    assert!(h
        .frame_loop
        .recreate(&mut h.backend, &mut h.window)
        .unwrap());

    assert_eq!(h.frame_loop.frame_index(), 0);
    assert_eq!(h.frame_loop.state(), LoopState::Active);
    assert_eq!(h.backend.fences, vec![FenceState::Signaled; FRAMES_IN_FLIGHT]);
}

#[test]
fn recreation_waits_for_nonzero_size() {
    let mut h = Harness::new();
    h.window.size = (0, 0);
    h.window.upcoming_sizes = VecDeque::from([(0, 0), (1024, 0), (1024, 768)]);
    h.backend
        .acquire_script
        .push_back(Ok(AcquireStatus::OutOfDate));

    assert_eq!(h.frame().unwrap(), FrameOutcome::Abandoned);
    h.take_log();

    let outcome = h.frame().unwrap();

    assert!(matches!(outcome, FrameOutcome::Presented { .. }));
    let log = h.take_log();
    assert_eq!(
        log[..6],
        [
            "wait_events",
            "wait_events",
            "wait_events",
            "wait_idle",
            "destroy",
            "create(1024x768)"
        ]
    );
}

#[test]
fn window_closed_while_minimized_skips_recreation() {
    let mut h = Harness::new();
    h.window.size = (0, 0);
    h.backend
        .acquire_script
        .push_back(Ok(AcquireStatus::OutOfDate));
    h.frame().unwrap();
    h.take_log();

    assert_eq!(h.frame().unwrap(), FrameOutcome::WindowClosed);
    assert_eq!(h.take_log(), vec!["wait_events"]);
    assert_eq!(h.frame_loop.state(), LoopState::Recreating);
    assert_eq!(h.frame_loop.stats().recreations, 0);
}

#[test]
fn hard_acquire_failure_is_fatal() {
    let mut h = Harness::new();
    h.backend
        .acquire_script
        .push_back(Err::<AcquireStatus, _>(vk::Result::ERROR_DEVICE_LOST).check("vkAcquire"));

    let err = h.frame().unwrap_err();

    assert_eq!(err.vk_result(), Some(vk::Result::ERROR_DEVICE_LOST));
    assert_eq!(h.frame_loop.frame_index(), 0);
    assert!(h.position("submit(0)").is_none());
}

#[test]
fn recreation_failure_is_fatal() {
    let mut h = Harness::new();
    h.backend
        .acquire_script
        .push_back(Ok(AcquireStatus::OutOfDate));
    h.frame().unwrap();
    h.backend.fail_create = true;

    let err = h.frame().unwrap_err();

    assert_eq!(
        err.vk_result(),
        Some(vk::Result::ERROR_INITIALIZATION_FAILED)
    );
    assert_eq!(h.frame_loop.state(), LoopState::Recreating);
    assert_eq!(h.frame_loop.stats().recreations, 0);
}

/// Backend contract seen by the controller: a second destroy leaves nothing
/// to release and a following create restores a drivable loop. The Vulkan
/// null-handle check is covered by `take_handle` in `trellis-gpu`.
#[test]
fn destroy_is_a_no_op_when_already_destroyed() {
    let mut h = Harness::new();
    h.backend.destroy_swapchain_resources();
    h.backend.destroy_swapchain_resources();
    assert!(h.backend.fences.is_empty());

    h.backend.create_swapchain_resources(800, 600).unwrap();
    assert!(h.frame().is_ok());
}
