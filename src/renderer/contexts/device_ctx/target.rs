use std::sync::{Arc, Mutex, PoisonError};
use ash::vk;
use winit::window::Window;

/// Presentation target of the renderer: the window and the Vulkan surface created for it
pub struct RenderSurface {
    pub window: Arc<Window>,
    pub handle: vk::SurfaceKHR,
    pub loader: ash::khr::surface::Instance,
}

impl RenderSurface {
    pub fn new(
        window: Arc<Window>,
        handle: vk::SurfaceKHR,
        loader: ash::khr::surface::Instance,
    ) -> Self {
        Self {
            window,
            handle,
            loader,
        }
    }

    pub fn supports_present(
        &self,
        physical_device: vk::PhysicalDevice,
        queue_family_index: u32,
    ) -> bool {
        unsafe {
            self.loader
                .get_physical_device_surface_support(physical_device, queue_family_index, self.handle)
                .unwrap_or(false)
        }
    }
}

impl Drop for RenderSurface {
    fn drop(&mut self) {
        unsafe {
            self.loader.destroy_surface(self.handle, None);
        }
    }
}

/// Live pixel size of the window.
///
/// Written by the event loop on resize and read by the frame scheduler, so
/// a read is a snapshot and may change between two reads in the same frame.
#[derive(Debug, Clone)]
pub struct SharedExtent(Arc<Mutex<vk::Extent2D>>);

impl SharedExtent {
    pub fn new(width: u32, height: u32) -> Self {
        Self(Arc::new(Mutex::new(vk::Extent2D { width, height })))
    }

    pub fn get(&self) -> vk::Extent2D {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set(&self, width: u32, height: u32) {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner) = vk::Extent2D { width, height };
    }

    pub fn is_zero(&self) -> bool {
        let extent = self.get();
        extent.width == 0 || extent.height == 0
    }
}
