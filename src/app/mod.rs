mod fps;

use super::renderer::{FrameOutcome, RenderConfig, Renderer, SharedExtent};
use color_eyre::{Report, Result};
use std::sync::Arc;
use std::time::{Duration, Instant};
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, KeyEvent, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{Key, NamedKey};
use winit::window::{Window, WindowId};
use crate::app::fps::{title_with_fps, FpsCounter};

const WINDOW_TITLE: &str = "Cadence";
const INITIAL_WINDOW_SIZE: PhysicalSize<u32> = PhysicalSize::new(900, 600);
// How long to sleep between event loop wakeups while nothing can be drawn
const SUSPENDED_POLL_INTERVAL: Duration = Duration::from_millis(100);

pub struct App {
    window: Option<Arc<Window>>,
    renderer: Option<Renderer>,
    config: RenderConfig,

    // State
    live_extent: SharedExtent,
    fps: FpsCounter,
    occluded: bool,
    error: Option<Report>,
}

impl App {
    pub fn new(config: RenderConfig) -> Self {
        Self {
            window: None,
            renderer: None,
            config,

            live_extent: SharedExtent::new(INITIAL_WINDOW_SIZE.width, INITIAL_WINDOW_SIZE.height),
            fps: FpsCounter::new(Duration::from_secs(1), Instant::now()),
            occluded: false,
            error: None,
        }
    }

    /// Runs the event loop until the window closes or a frame fails
    pub fn run(mut self) -> Result<()> {
        let event_loop = EventLoop::new()?;
        event_loop.set_control_flow(ControlFlow::Poll);
        event_loop.run_app(&mut self)?;

        // Waits for the device before anything else is released
        drop(self.renderer.take());

        match self.error.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn is_suspended(&self) -> bool {
        self.occluded || self.live_extent.is_zero()
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, err: Report) {
        log::error!("Stopping event loop: {}", err);
        self.error = Some(err);
        event_loop.exit();
    }

    fn init(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let attributes = Window::default_attributes()
            .with_title(WINDOW_TITLE)
            .with_inner_size(INITIAL_WINDOW_SIZE)
            .with_resizable(true);
        let window = Arc::new(event_loop.create_window(attributes)?);

        let size = window.inner_size();
        self.live_extent.set(size.width, size.height);

        self.renderer = Some(Renderer::new(
            window.clone(),
            &self.config,
            self.live_extent.clone(),
        )?);
        self.window = Some(window);

        Ok(())
    }

    fn redraw(&mut self) -> Result<()> {
        let Some(renderer) = self.renderer.as_mut() else {
            return Ok(());
        };

        if renderer.draw()? == FrameOutcome::Presented {
            if let (Some(fps), Some(window)) = (self.fps.tick(Instant::now()), &self.window) {
                window.set_title(&title_with_fps(WINDOW_TITLE, fps));
            }
        }
        Ok(())
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        if let Err(err) = self.init(event_loop) {
            self.fail(event_loop, err);
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        window_id: WindowId,
        event: WindowEvent,
    ) {
        if self.window.as_ref().map(|window| window.id()) != Some(window_id) {
            return;
        }

        match event {
            WindowEvent::CloseRequested => {
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                log::debug!("Window resized to {}x{}", size.width, size.height);
                self.live_extent.set(size.width, size.height);
            }
            WindowEvent::Occluded(occluded) => {
                self.occluded = occluded;
            }
            WindowEvent::RedrawRequested => {
                if self.is_suspended() {
                    return;
                }
                if let Err(err) = self.redraw() {
                    self.fail(event_loop, err);
                }
            }
            WindowEvent::KeyboardInput {
                event:
                KeyEvent {
                    logical_key: Key::Named(NamedKey::Escape),
                    state: ElementState::Pressed,
                    ..
                },
                ..
            } => {
                event_loop.exit();
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if event_loop.exiting() {
            return;
        }

        if self.is_suspended() {
            event_loop.set_control_flow(ControlFlow::WaitUntil(
                Instant::now() + SUSPENDED_POLL_INTERVAL,
            ));
        } else {
            event_loop.set_control_flow(ControlFlow::Poll);
            if let Some(window) = self.window.as_ref() {
                window.request_redraw();
            }
        }
    }
}
