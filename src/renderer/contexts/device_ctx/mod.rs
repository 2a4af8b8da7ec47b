pub mod instance;
pub mod device;
pub mod queue;
pub mod target;
pub mod transfer_ctx;

use std::sync::Arc;
use color_eyre::Result;
use winit::window::Window;
use crate::renderer::contexts::device_ctx::device::RenderDevice;
use crate::renderer::contexts::device_ctx::instance::RenderInstance;
use crate::renderer::contexts::device_ctx::target::RenderSurface;

/// Responsibilities:
/// - Manage the Vulkan instance, surface, device, and queues
/// - Own the memory allocator and the upload context
///
/// Fields drop in declaration order: device, then surface, then instance.
pub struct RenderDeviceContext {
    pub device: Arc<RenderDevice>,
    pub surface: Arc<RenderSurface>,
    pub instance: RenderInstance,
}

impl RenderDeviceContext {
    pub fn new(window: Arc<Window>) -> Result<Self> {
        let instance = RenderInstance::new(&window)?;
        let surface = instance.create_surface(window)?;
        let device = RenderDevice::new(&instance, &surface)?;

        Ok(Self {
            device: Arc::new(device),
            surface: Arc::new(surface),
            instance,
        })
    }
}
