//! Vulkan backend for the ember rendering core.
//!
//! Implements [`ember_render::RenderDevice`] and
//! [`ember_render::CommandContext`] on top of `ash`. The backend owns the
//! instance, the logical device, one graphics queue, and the object tables
//! that resolve the core's handles into Vulkan objects.

mod commands;
mod convert;
mod device;
mod instance;
mod pipeline;
mod resources;
mod swapchain;

pub use crate::device::VulkanDevice;
pub use crate::instance::{InstanceConfig, VulkanInstance};

use ash::vk;
use ember_render::error::DeviceError;

/// Maps a Vulkan result into the portable error taxonomy.
pub(crate) fn map_vk_error(result: vk::Result) -> DeviceError {
    match result {
        vk::Result::ERROR_OUT_OF_DEVICE_MEMORY => DeviceError::OutOfDeviceMemory,
        vk::Result::ERROR_OUT_OF_HOST_MEMORY => DeviceError::OutOfHostMemory,
        vk::Result::ERROR_SURFACE_LOST_KHR => DeviceError::SurfaceLost,
        vk::Result::ERROR_OUT_OF_DATE_KHR => DeviceError::OutOfDate,
        vk::Result::SUBOPTIMAL_KHR => DeviceError::Suboptimal,
        vk::Result::ERROR_DEVICE_LOST => DeviceError::DeviceLost,
        vk::Result::TIMEOUT => DeviceError::Timeout,
        other => DeviceError::InvalidSpec(format!("vulkan error: {:?}", other)),
    }
}

pub(crate) fn vk_check<T>(result: Result<T, vk::Result>) -> Result<T, DeviceError> {
    result.map_err(map_vk_error)
}
