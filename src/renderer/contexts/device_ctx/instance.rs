use std::ffi::{c_char, c_void, CStr};
use std::sync::Arc;
use ash::vk;
use color_eyre::eyre::eyre;
use color_eyre::Result;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use winit::window::Window;
use crate::renderer::contexts::device_ctx::target::RenderSurface;

const APPLICATION_NAME: &CStr = c"cadence";
const VALIDATION_LAYERS: [&CStr; 1] = [c"VK_LAYER_KHRONOS_validation"];

/// Vulkan entry and instance, plus the validation message forwarder in debug builds
pub struct RenderInstance {
    pub entry: ash::Entry,
    pub instance: ash::Instance,
    messenger: Option<DebugMessenger>,
}

impl RenderInstance {
    const VALIDATE: bool = cfg!(debug_assertions);

    pub fn new(window: &Window) -> Result<Self> {
        let entry = ash::Entry::linked();

        if Self::VALIDATE {
            let available = unsafe { entry.enumerate_instance_layer_properties()? };
            let missing = missing_layers(&available, &VALIDATION_LAYERS);
            if !missing.is_empty() {
                return Err(eyre!("Validation layers not available: {:?}", missing));
            }
        }

        let mut extensions = ash_window::enumerate_required_extensions(
            window.display_handle()?.as_raw(),
        )?
        .to_vec();
        if Self::VALIDATE {
            extensions.push(ash::ext::debug_utils::NAME.as_ptr());
        }
        #[cfg(target_os = "macos")]
        {
            extensions.push(ash::khr::portability_enumeration::NAME.as_ptr());
            extensions.push(ash::khr::get_physical_device_properties2::NAME.as_ptr());
        }

        let layers: Vec<*const c_char> = if Self::VALIDATE {
            VALIDATION_LAYERS.iter().map(|layer| layer.as_ptr()).collect()
        } else {
            Vec::new()
        };

        let application_info = vk::ApplicationInfo::default()
            .application_name(APPLICATION_NAME)
            .application_version(vk::make_api_version(0, 0, 1, 0))
            .api_version(vk::API_VERSION_1_3);

        // Chained so that instance creation and destruction are validated too
        let mut messenger_info = DebugMessenger::create_info();
        let mut instance_info = vk::InstanceCreateInfo::default()
            .application_info(&application_info)
            .enabled_layer_names(&layers)
            .enabled_extension_names(&extensions);
        if Self::VALIDATE {
            instance_info = instance_info.push_next(&mut messenger_info);
        }
        #[cfg(target_os = "macos")]
        let instance_info = instance_info.flags(vk::InstanceCreateFlags::ENUMERATE_PORTABILITY_KHR);

        let instance = unsafe { entry.create_instance(&instance_info, None)? };

        let messenger = if Self::VALIDATE {
            match DebugMessenger::new(&entry, &instance) {
                Ok(messenger) => Some(messenger),
                Err(err) => {
                    unsafe {
                        instance.destroy_instance(None);
                    }
                    return Err(err);
                }
            }
        } else {
            None
        };

        Ok(Self {
            entry,
            instance,
            messenger,
        })
    }

    pub fn create_surface(&self, window: Arc<Window>) -> Result<RenderSurface> {
        let handle = unsafe {
            ash_window::create_surface(
                &self.entry,
                &self.instance,
                window.display_handle()?.as_raw(),
                window.window_handle()?.as_raw(),
                None,
            )?
        };
        let loader = ash::khr::surface::Instance::new(&self.entry, &self.instance);
        Ok(RenderSurface::new(window, handle, loader))
    }
}

impl Drop for RenderInstance {
    fn drop(&mut self) {
        // The messenger must go before the instance it was created from
        drop(self.messenger.take());
        unsafe {
            self.instance.destroy_instance(None);
        }
    }
}

struct DebugMessenger {
    loader: ash::ext::debug_utils::Instance,
    handle: vk::DebugUtilsMessengerEXT,
}

impl DebugMessenger {
    fn new(entry: &ash::Entry, instance: &ash::Instance) -> Result<Self> {
        let loader = ash::ext::debug_utils::Instance::new(entry, instance);
        let handle = unsafe {
            loader.create_debug_utils_messenger(&Self::create_info(), None)?
        };
        Ok(Self { loader, handle })
    }

    fn create_info() -> vk::DebugUtilsMessengerCreateInfoEXT<'static> {
        vk::DebugUtilsMessengerCreateInfoEXT::default()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
                    | vk::DebugUtilsMessageSeverityFlagsEXT::INFO
                    | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(forward_to_log))
    }
}

impl Drop for DebugMessenger {
    fn drop(&mut self) {
        unsafe {
            self.loader.destroy_debug_utils_messenger(self.handle, None);
        }
    }
}

fn missing_layers(available: &[vk::LayerProperties], required: &[&'static CStr]) -> Vec<&'static CStr> {
    required
        .iter()
        .copied()
        .filter(|layer| {
            !available
                .iter()
                .any(|props| props.layer_name_as_c_str() == Ok(*layer))
        })
        .collect()
}

fn log_level(severity: vk::DebugUtilsMessageSeverityFlagsEXT) -> log::Level {
    if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        log::Level::Error
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        log::Level::Warn
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO) {
        // Loader chatter, far too noisy for info
        log::Level::Debug
    } else {
        log::Level::Trace
    }
}

unsafe extern "system" fn forward_to_log(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _user_data: *mut c_void,
) -> vk::Bool32 {
    let message = unsafe {
        callback_data
            .as_ref()
            .filter(|data| !data.p_message.is_null())
            .map(|data| CStr::from_ptr(data.p_message).to_string_lossy())
    };
    log::log!(
        target: "vulkan",
        log_level(severity),
        "{:?} {}",
        message_type,
        message.as_deref().unwrap_or("<no message>"),
    );

    vk::FALSE
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layer(name: &CStr) -> vk::LayerProperties {
        let mut props = vk::LayerProperties::default();
        for (dst, src) in props.layer_name.iter_mut().zip(name.to_bytes()) {
            *dst = *src as c_char;
        }
        props
    }

    #[test]
    fn reports_layers_that_are_not_installed() {
        let available = [layer(c"VK_LAYER_MESA_device_select")];
        assert_eq!(missing_layers(&available, &VALIDATION_LAYERS), VALIDATION_LAYERS.to_vec());

        let available = [layer(c"VK_LAYER_MESA_device_select"), layer(VALIDATION_LAYERS[0])];
        assert!(missing_layers(&available, &VALIDATION_LAYERS).is_empty());
    }

    #[test]
    fn severities_map_to_log_levels() {
        use vk::DebugUtilsMessageSeverityFlagsEXT as Severity;
        assert_eq!(log_level(Severity::ERROR), log::Level::Error);
        assert_eq!(log_level(Severity::WARNING), log::Level::Warn);
        assert_eq!(log_level(Severity::INFO), log::Level::Debug);
        assert_eq!(log_level(Severity::VERBOSE), log::Level::Trace);
    }
}
