//! Window ownership and event pumping.
//!
//! The runner drives winit itself instead of handing control to
//! `EventLoop::run_app`: events are pumped without blocking once per frame,
//! and blocking only while the frame loop waits out a minimized window.

use std::mem;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::{debug, info};
use trellis_render::PresentationWindow;
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::platform::pump_events::{EventLoopExtPumpEvents, PumpStatus};
use winit::window::{Window, WindowId};

/// Event handler state updated while events are pumped.
struct WindowState {
    title: String,
    initial_size: PhysicalSize<u32>,
    window: Option<Arc<Window>>,
    creation_error: Option<winit::error::OsError>,
    size: PhysicalSize<u32>,
    resized: bool,
    close_requested: bool,
    events: Vec<WindowEvent>,
}

impl ApplicationHandler for WindowState {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        event_loop.set_control_flow(ControlFlow::Wait);

        let attributes = Window::default_attributes()
            .with_title(&self.title)
            .with_inner_size(self.initial_size);

        match event_loop.create_window(attributes) {
            Ok(window) => {
                self.size = window.inner_size();
                self.window = Some(Arc::new(window));
            }
            Err(e) => {
                self.creation_error = Some(e);
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, _event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested");
                self.close_requested = true;
            }
            WindowEvent::Resized(size) => {
                debug!("Window resized to {}x{}", size.width, size.height);
                self.size = size;
                self.resized = true;
            }
            _ => {}
        }
        self.events.push(event);
    }
}

/// The application window and its event loop.
pub struct AppWindow {
    // Dropped before the event loop.
    window: Arc<Window>,
    state: WindowState,
    event_loop: EventLoop<()>,
    exited: bool,
}

impl AppWindow {
    /// Create the event loop and open a window.
    pub fn new(title: &str, width: u32, height: u32) -> anyhow::Result<Self> {
        let mut event_loop = EventLoop::new().context("Failed to create event loop")?;

        let mut state = WindowState {
            title: title.to_string(),
            initial_size: PhysicalSize::new(width, height),
            window: None,
            creation_error: None,
            size: PhysicalSize::new(width, height),
            resized: false,
            close_requested: false,
            events: Vec::new(),
        };

        // The window is created from `resumed`, which arrives on the first pumps.
        let window = loop {
            let status = event_loop.pump_app_events(Some(Duration::ZERO), &mut state);
            if let Some(e) = state.creation_error.take() {
                return Err(e).context("Failed to create window");
            }
            if let Some(window) = &state.window {
                break window.clone();
            }
            if let PumpStatus::Exit(code) = status {
                anyhow::bail!("Event loop exited with code {code} before a window was created");
            }
        };

        info!(
            "Window created: {}x{}",
            state.size.width, state.size.height
        );

        Ok(Self {
            window,
            state,
            event_loop,
            exited: false,
        })
    }

    /// Shared window handle.
    pub fn handle(&self) -> Arc<Window> {
        self.window.clone()
    }

    /// Handle pending events without blocking.
    ///
    /// Returns `false` once the window should close.
    pub fn poll_events(&mut self) -> bool {
        self.pump(Some(Duration::ZERO))
    }

    /// Events handled since the last call.
    pub fn drain_events(&mut self) -> Vec<WindowEvent> {
        mem::take(&mut self.state.events)
    }

    /// Whether the window has been asked to close.
    pub fn is_closing(&self) -> bool {
        self.exited || self.state.close_requested
    }

    fn pump(&mut self, timeout: Option<Duration>) -> bool {
        if self.is_closing() {
            return false;
        }
        if let PumpStatus::Exit(code) = self.event_loop.pump_app_events(timeout, &mut self.state) {
            debug!("Event loop exited with code {code}");
            self.exited = true;
        }
        !self.is_closing()
    }
}

impl PresentationWindow for AppWindow {
    fn drawable_size(&self) -> (u32, u32) {
        (self.state.size.width, self.state.size.height)
    }

    fn take_resized(&mut self) -> bool {
        mem::take(&mut self.state.resized)
    }

    fn wait_events(&mut self) -> bool {
        self.pump(None)
    }
}
