//! Instance creation, physical device selection, and surface plumbing.

use crate::{map_vk_error, vk_check};
use ash::extensions::{ext, khr};
use ash::vk;
use ember_render::error::{DeviceError, DeviceResult};
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};
use std::ffi::{c_void, CStr, CString};

#[derive(Clone, Debug)]
pub struct InstanceConfig {
    pub app_name: String,
    pub enable_validation: bool,
}

impl Default for InstanceConfig {
    fn default() -> InstanceConfig {
        InstanceConfig {
            app_name: "ember".to_owned(),
            enable_validation: cfg!(debug_assertions),
        }
    }
}

/// The instance-level state shared by every device created from it.
pub struct VulkanInstance {
    pub(crate) entry: ash::Entry,
    pub(crate) instance: ash::Instance,
    pub(crate) surface_loader: khr::Surface,
    debug_utils: Option<(ext::DebugUtils, vk::DebugUtilsMessengerEXT)>,
}

unsafe extern "system" fn debug_callback(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    _types: vk::DebugUtilsMessageTypeFlagsEXT,
    data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _user_data: *mut c_void,
) -> vk::Bool32 {
    let message = if data.is_null() {
        String::new()
    } else {
        CStr::from_ptr((*data).p_message)
            .to_string_lossy()
            .into_owned()
    };
    let level = match severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => log::Level::Error,
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => log::Level::Warn,
        vk::DebugUtilsMessageSeverityFlagsEXT::INFO => log::Level::Info,
        _ => log::Level::Debug,
    };
    log::log!(level, "(vulkan) {}", message);
    vk::FALSE
}

impl VulkanInstance {
    /// Creates the instance with the surface extensions the window system
    /// needs.
    pub fn new(
        config: &InstanceConfig,
        display_handle: RawDisplayHandle,
    ) -> DeviceResult<VulkanInstance> {
        let entry = unsafe { ash::Entry::load() }
            .map_err(|err| DeviceError::BackendUnavailable(err.to_string()))?;
        let app_name = CString::new(config.app_name.as_str())
            .map_err(|_| DeviceError::InvalidSpec("application name contains NUL".into()))?;
        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name)
            .application_version(vk::make_api_version(0, 0, 1, 0))
            .engine_name(&app_name)
            .api_version(vk::API_VERSION_1_1);

        let mut extensions: Vec<*const i8> =
            vk_check(ash_window::enumerate_required_extensions(display_handle))?.to_vec();
        if config.enable_validation {
            extensions.push(ext::DebugUtils::name().as_ptr());
        }

        let validation_layer =
            CStr::from_bytes_with_nul(b"VK_LAYER_KHRONOS_validation\0").unwrap();
        let mut layers: Vec<*const i8> = Vec::new();
        if config.enable_validation {
            layers.push(validation_layer.as_ptr());
        }

        let create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layers);
        let instance = unsafe {
            entry
                .create_instance(&create_info, None)
                .map_err(map_vk_error)?
        };

        let debug_utils = if config.enable_validation {
            let loader = ext::DebugUtils::new(&entry, &instance);
            let messenger_info = vk::DebugUtilsMessengerCreateInfoEXT::builder()
                .message_severity(
                    vk::DebugUtilsMessageSeverityFlagsEXT::ERROR
                        | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                        | vk::DebugUtilsMessageSeverityFlagsEXT::INFO,
                )
                .message_type(
                    vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                        | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                        | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
                )
                .pfn_user_callback(Some(debug_callback));
            let messenger = unsafe {
                loader
                    .create_debug_utils_messenger(&messenger_info, None)
                    .map_err(map_vk_error)?
            };
            Some((loader, messenger))
        } else {
            None
        };

        let surface_loader = khr::Surface::new(&entry, &instance);
        Ok(VulkanInstance {
            entry,
            instance,
            surface_loader,
            debug_utils,
        })
    }

    /// Creates a window surface from raw handles.
    pub fn create_surface(
        &self,
        display_handle: RawDisplayHandle,
        window_handle: RawWindowHandle,
    ) -> DeviceResult<vk::SurfaceKHR> {
        unsafe {
            ash_window::create_surface(
                &self.entry,
                &self.instance,
                display_handle,
                window_handle,
                None,
            )
            .map_err(map_vk_error)
        }
    }

    /// Picks a physical device with a graphics queue that can present to
    /// `surface`, preferring discrete GPUs.
    pub(crate) fn pick_physical_device(
        &self,
        surface: vk::SurfaceKHR,
    ) -> DeviceResult<(vk::PhysicalDevice, u32)> {
        let devices = unsafe {
            self.instance
                .enumerate_physical_devices()
                .map_err(map_vk_error)?
        };
        let mut best: Option<(vk::PhysicalDevice, u32, bool)> = None;
        for device in devices {
            let families = unsafe {
                self.instance
                    .get_physical_device_queue_family_properties(device)
            };
            for (index, family) in families.iter().enumerate() {
                if !family.queue_flags.contains(vk::QueueFlags::GRAPHICS) {
                    continue;
                }
                let present_supported = unsafe {
                    self.surface_loader
                        .get_physical_device_surface_support(device, index as u32, surface)
                        .unwrap_or(false)
                };
                if !present_supported {
                    continue;
                }
                let props = unsafe { self.instance.get_physical_device_properties(device) };
                let discrete = props.device_type == vk::PhysicalDeviceType::DISCRETE_GPU;
                let better = match best {
                    Some((_, _, best_discrete)) => discrete && !best_discrete,
                    None => true,
                };
                if better {
                    best = Some((device, index as u32, discrete));
                }
                break;
            }
        }
        best.map(|(device, family, _)| (device, family))
            .ok_or(DeviceError::SurfaceLost)
    }

    pub(crate) fn destroy(&mut self) {
        unsafe {
            if let Some((loader, messenger)) = self.debug_utils.take() {
                loader.destroy_debug_utils_messenger(messenger, None);
            }
            self.instance.destroy_instance(None);
        }
    }
}
