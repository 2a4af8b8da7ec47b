pub mod camera;
pub mod config;
pub mod error;

mod contexts;
mod internals;
mod resources;
mod shader_data;

pub use config::RenderConfig;
pub use contexts::device_ctx::target::SharedExtent;
pub use contexts::frame_ctx::scheduler::FrameOutcome;

use std::sync::Arc;
use color_eyre::Result;
use winit::window::Window;
use crate::renderer::contexts::device_ctx::RenderDeviceContext;
use crate::renderer::contexts::frame_ctx::backend::VulkanFrameBackend;
use crate::renderer::contexts::frame_ctx::scheduler::FrameScheduler;
use crate::renderer::contexts::frame_ctx::FramePool;

pub struct Renderer {
    // Dropped before the device context it was built from
    scheduler: FrameScheduler<VulkanFrameBackend>,
    dev: RenderDeviceContext,
}

impl Renderer {
    pub fn new(
        window: Arc<Window>,
        config: &RenderConfig,
        live_extent: SharedExtent,
    ) -> Result<Self> {
        let dev = RenderDeviceContext::new(window)?;
        let backend = VulkanFrameBackend::new(&dev, config)?;
        let pool = FramePool::new(config.frames_in_flight, |_| backend.create_slot())?;
        let scheduler = FrameScheduler::new(
            backend,
            pool,
            live_extent,
            config.zero_extent_backoff,
        )?;

        log::info!("Renderer ready with {} frames in flight", config.frames_in_flight);

        Ok(Self {
            scheduler,
            dev,
        })
    }

    pub fn draw(&mut self) -> Result<FrameOutcome> {
        let outcome = self.scheduler.draw_frame()?;
        if outcome == FrameOutcome::Recreated {
            if let Some(chain) = self.scheduler.chain() {
                log::debug!(
                    "Drawing to {}x{} ({:?}) from frame slot {}",
                    chain.extent.width,
                    chain.extent.height,
                    chain.present_mode,
                    self.scheduler.frame_index(),
                );
            }
        }
        log::trace!("{:?}, scheduler {:?}", outcome, self.scheduler.state());

        Ok(outcome)
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        // Every slot may still be in flight
        if let Err(err) = self.dev.device.wait_idle() {
            log::error!("Failed to wait for device idle on shutdown: {}", err);
        }
    }
}
