use std::ffi::{c_char, CStr};
use std::mem::ManuallyDrop;
use std::sync::{Arc, Mutex};
use ash::vk;
use color_eyre::Result;
use gpu_allocator::vulkan::{Allocator, AllocatorCreateDesc};
use crate::renderer::contexts::device_ctx::instance::RenderInstance;
use crate::renderer::contexts::device_ctx::queue::{Queue, QueueFamilies};
use crate::renderer::contexts::device_ctx::target::RenderSurface;
use crate::renderer::contexts::device_ctx::transfer_ctx::TransferContext;
use crate::renderer::error::RenderError;
use crate::renderer::resources::image::Image;
use crate::renderer::resources::mesh::Mesh;
use crate::renderer::shader_data::Vertex;

/// Logical device, its queues and the memory allocator
pub struct RenderDevice {
    pub logical: Arc<ash::Device>,
    pub physical: vk::PhysicalDevice,
    pub queue_families: QueueFamilies,

    pub graphics_queue: Arc<Queue>,
    pub present_queue: Arc<Queue>,
    pub swapchain_loader: ash::khr::swapchain::Device,

    // Released before the logical device in `Drop`
    memory_allocator: ManuallyDrop<Arc<Mutex<Allocator>>>,
    transfer_context: ManuallyDrop<TransferContext>,
}

impl RenderDevice {
    pub fn new(
        instance: &RenderInstance,
        surface: &RenderSurface,
    ) -> Result<Self> {
        let (physical_device, queue_families) = Self::select_physical_device(
            &instance.instance,
            surface,
        )?;

        let logical_device = Self::create_logical_device(
            &instance.instance,
            physical_device,
            queue_families,
        )?;

        let memory_allocator = Allocator::new(&AllocatorCreateDesc {
            instance: instance.instance.clone(),
            device: logical_device.clone(),
            physical_device,
            debug_settings: gpu_allocator::AllocatorDebugSettings {
                log_memory_information: true,
                log_leaks_on_shutdown: true,
                store_stack_traces: false,
                log_allocations: false,
                log_frees: false,
                log_stack_traces: false,
            },
            buffer_device_address: true,
            allocation_sizes: Default::default(),
        });
        let memory_allocator = match memory_allocator {
            Ok(allocator) => allocator,
            Err(err) => {
                unsafe {
                    logical_device.destroy_device(None);
                }
                return Err(err.into());
            }
        };

        let logical_device = Arc::new(logical_device);
        let graphics_queue = Arc::new(unsafe {
            let queue = logical_device.get_device_queue(queue_families.graphics, 0);
            Queue::new(queue_families.graphics, queue)
        });
        let present_queue = Arc::new(unsafe {
            let queue = logical_device.get_device_queue(queue_families.present, 0);
            Queue::new(queue_families.present, queue)
        });

        let transfer_context = match TransferContext::new(
            graphics_queue.clone(),
            logical_device.clone(),
        ) {
            Ok(ctx) => ctx,
            Err(err) => {
                drop(memory_allocator);
                unsafe {
                    logical_device.destroy_device(None);
                }
                return Err(err);
            }
        };

        let swapchain_loader = ash::khr::swapchain::Device::new(
            &instance.instance,
            &logical_device,
        );

        Ok(Self {
            logical: logical_device,
            physical: physical_device,
            queue_families,

            graphics_queue,
            present_queue,
            swapchain_loader,

            memory_allocator: ManuallyDrop::new(Arc::new(Mutex::new(memory_allocator))),
            transfer_context: ManuallyDrop::new(transfer_context),
        })
    }

    pub fn create_draw_image(
        &self,
        extent: vk::Extent2D,
        format: vk::Format,
    ) -> Result<Image> {
        Image::new_draw_image(
            extent,
            format,
            (*self.memory_allocator).clone(),
            self.logical.clone(),
        )
    }

    pub fn create_depth_image(
        &self,
        instance: &ash::Instance,
        extent: vk::Extent2D,
    ) -> Result<Image> {
        let format = Image::pick_depth_format(|format| unsafe {
            instance
                .get_physical_device_format_properties(self.physical, format)
                .optimal_tiling_features
        })?;
        Image::new_depth_image(
            extent,
            format,
            (*self.memory_allocator).clone(),
            self.logical.clone(),
        )
    }

    pub fn create_mesh(&self, vertices: &[Vertex]) -> Result<Mesh> {
        Mesh::new(
            vertices,
            (*self.memory_allocator).clone(),
            self.logical.clone(),
            &self.transfer_context,
        )
    }

    pub fn wait_idle(&self) -> Result<()> {
        unsafe {
            self.logical.device_wait_idle()?;
        }
        Ok(())
    }

    fn select_physical_device(
        instance: &ash::Instance,
        surface: &RenderSurface,
    ) -> Result<(vk::PhysicalDevice, QueueFamilies)> {
        let capable = unsafe { instance.enumerate_physical_devices()? }
            .into_iter()
            .filter(|device| {
                let props = unsafe { instance.get_physical_device_properties(*device) };
                let name = props
                    .device_name_as_c_str()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_default();

                if props.api_version < vk::API_VERSION_1_3 {
                    log::debug!("Skipping {}: Vulkan 1.3 not supported", name);
                    return false;
                }
                if let Some(ext) = Self::missing_device_extension(instance, *device) {
                    log::debug!("Skipping {}: device extension {:?} not supported", name, ext);
                    return false;
                }
                let missing = Self::missing_device_features(instance, *device);
                if !missing.is_empty() {
                    log::debug!("Skipping {}: missing features {:?}", name, missing);
                    return false;
                }
                true
            })
            .collect::<Vec<_>>();

        if capable.is_empty() {
            return Err(RenderError::NoSuitableDevice.into());
        }

        let (device, families) = capable
            .into_iter()
            .filter_map(|device| {
                let props = unsafe {
                    instance.get_physical_device_queue_family_properties(device)
                };
                QueueFamilies::pick(&props, |index| surface.supports_present(device, index))
                    .map(|families| (device, families))
            })
            .min_by_key(|(device, _)| {
                let props = unsafe { instance.get_physical_device_properties(*device) };
                match props.device_type {
                    vk::PhysicalDeviceType::DISCRETE_GPU => 0,
                    vk::PhysicalDeviceType::INTEGRATED_GPU => 1,
                    vk::PhysicalDeviceType::VIRTUAL_GPU => 2,
                    vk::PhysicalDeviceType::CPU => 3,
                    vk::PhysicalDeviceType::OTHER => 4,
                    _ => 5,
                }
            })
            .ok_or(RenderError::NoPresentQueue)?;

        let props = unsafe { instance.get_physical_device_properties(device) };
        log::info!(
            "Selected {:?} ({:?}), graphics family {}, present family {}",
            props.device_name_as_c_str().unwrap_or(c"<unnamed>"),
            props.device_type,
            families.graphics,
            families.present,
        );

        Ok((device, families))
    }

    fn missing_device_extension(
        instance: &ash::Instance,
        device: vk::PhysicalDevice,
    ) -> Option<&'static CStr> {
        let supported = unsafe {
            instance
                .enumerate_device_extension_properties(device)
                .unwrap_or_default()
        };
        Self::get_required_device_extensions()
            .into_iter()
            .find(|required| {
                !supported
                    .iter()
                    .any(|ext| ext.extension_name_as_c_str() == Ok(*required))
            })
    }

    fn missing_device_features(
        instance: &ash::Instance,
        device: vk::PhysicalDevice,
    ) -> Vec<&'static str> {
        let mut features12 = vk::PhysicalDeviceVulkan12Features::default();
        let mut features13 = vk::PhysicalDeviceVulkan13Features::default();
        {
            let mut features2 = vk::PhysicalDeviceFeatures2::default()
                .push_next(&mut features12)
                .push_next(&mut features13);
            unsafe {
                instance.get_physical_device_features2(device, &mut features2);
            }
        }
        missing_features(&features12, &features13)
    }

    fn create_logical_device(
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
        queue_families: QueueFamilies,
    ) -> Result<ash::Device> {
        let queue_priorities = [1.0];
        let queue_create_infos = queue_families
            .unique()
            .into_iter()
            .map(|index| {
                vk::DeviceQueueCreateInfo::default()
                    .queue_family_index(index)
                    .queue_priorities(&queue_priorities)
            })
            .collect::<Vec<_>>();

        let enabled_extension_names = Self::get_required_device_extensions()
            .iter()
            .map(|ext| ext.as_ptr())
            .collect::<Vec<*const c_char>>();

        let mut features12 = vk::PhysicalDeviceVulkan12Features::default()
            .buffer_device_address(true)
            .descriptor_indexing(true);
        let mut features13 = vk::PhysicalDeviceVulkan13Features::default()
            .dynamic_rendering(true)
            .synchronization2(true);

        let device_create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&enabled_extension_names)
            .push_next(&mut features12)
            .push_next(&mut features13);

        Ok(unsafe {
            instance.create_device(physical_device, &device_create_info, None)?
        })
    }

    fn get_required_device_extensions() -> Vec<&'static CStr> {
        vec![
            ash::khr::swapchain::NAME,

            #[cfg(target_os = "macos")]
            ash::khr::portability_subset::NAME,
        ]
    }
}

impl Drop for RenderDevice {
    fn drop(&mut self) {
        unsafe {
            ManuallyDrop::drop(&mut self.transfer_context);
            ManuallyDrop::drop(&mut self.memory_allocator);
            self.logical.destroy_device(None);
        }
    }
}

fn missing_features(
    features12: &vk::PhysicalDeviceVulkan12Features,
    features13: &vk::PhysicalDeviceVulkan13Features,
) -> Vec<&'static str> {
    [
        ("bufferDeviceAddress", features12.buffer_device_address),
        ("descriptorIndexing", features12.descriptor_indexing),
        ("dynamicRendering", features13.dynamic_rendering),
        ("synchronization2", features13.synchronization2),
    ]
    .into_iter()
    .filter(|(_, supported)| *supported != vk::TRUE)
    .map(|(name, _)| name)
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_required_features_present() {
        let features12 = vk::PhysicalDeviceVulkan12Features::default()
            .buffer_device_address(true)
            .descriptor_indexing(true);
        let features13 = vk::PhysicalDeviceVulkan13Features::default()
            .dynamic_rendering(true)
            .synchronization2(true);
        assert!(missing_features(&features12, &features13).is_empty());
    }

    #[test]
    fn reports_each_missing_feature() {
        let features12 = vk::PhysicalDeviceVulkan12Features::default()
            .buffer_device_address(true);
        let features13 = vk::PhysicalDeviceVulkan13Features::default()
            .dynamic_rendering(true);
        assert_eq!(
            missing_features(&features12, &features13),
            vec!["descriptorIndexing", "synchronization2"],
        );
    }
}
