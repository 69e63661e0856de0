//! Backend-side object records behind the core's handle tables, plus the
//! device-memory helpers.

use crate::map_vk_error;
use ash::vk;
use ember_render::buffer::MemoryPlacement;
use ember_render::error::{DeviceError, DeviceResult};
use ember_render::handle::CommandBufferHandle;
use ember_render::shader::{ShaderGroupInfo, ShaderStage};
use ember_render::texture::{Extent2d, TextureSpec};
use std::ffi::CString;

pub(crate) struct VkBuffer {
    pub raw: vk::Buffer,
    pub memory: vk::DeviceMemory,
    pub size: u64,
    pub placement: MemoryPlacement,
    /// Host address of the persistent mapping; 0 for device-local buffers.
    pub mapped: usize,
}

pub(crate) struct VkTexture {
    pub image: vk::Image,
    /// `None` for swapchain images, which the swapchain owns.
    pub memory: Option<vk::DeviceMemory>,
    pub view: vk::ImageView,
    pub spec: TextureSpec,
    pub owned: bool,
}

pub(crate) struct VkShader {
    pub info: ShaderGroupInfo,
    pub modules: Vec<VkShaderModule>,
}

pub(crate) struct VkShaderModule {
    pub stage: ShaderStage,
    pub module: vk::ShaderModule,
    pub entry_point: CString,
}

pub(crate) struct VkPipeline {
    pub raw: vk::Pipeline,
    pub layout: vk::PipelineLayout,
    pub bind_point: vk::PipelineBindPoint,
}

/// One pipeline layout per shader group hash. The set layout objects it was
/// built from stay owned by the device's dedup map.
pub(crate) struct VkPipelineLayout {
    pub layout: vk::PipelineLayout,
}

pub(crate) struct VkCommandPool {
    pub raw: vk::CommandPool,
    /// Buffers allocated from the pool, recycled in order after each reset.
    pub allocated: Vec<CommandBufferHandle>,
    pub next: usize,
}

pub(crate) struct VkSwapchain {
    pub raw: vk::SwapchainKHR,
    pub surface: vk::SurfaceKHR,
    pub format: vk::Format,
    pub extent: Extent2d,
    pub vsync: bool,
    pub images: Vec<ember_render::handle::TextureHandle>,
}

/// Finds a memory type matching the requirement mask and properties.
pub(crate) fn find_memory_type(
    props: &vk::PhysicalDeviceMemoryProperties,
    type_bits: u32,
    required: vk::MemoryPropertyFlags,
) -> Option<u32> {
    (0..props.memory_type_count).find(|&index| {
        (type_bits & (1 << index)) != 0
            && props.memory_types[index as usize]
                .property_flags
                .contains(required)
    })
}

pub(crate) fn memory_properties(placement: MemoryPlacement) -> vk::MemoryPropertyFlags {
    match placement {
        MemoryPlacement::DeviceLocal => vk::MemoryPropertyFlags::DEVICE_LOCAL,
        MemoryPlacement::HostVisibleSequentialWrite | MemoryPlacement::HostVisibleRandom => {
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT
        }
    }
}

/// Allocates and binds memory for the given requirements; falls back to any
/// host-visible type when the preferred properties are unavailable.
pub(crate) fn allocate_memory(
    device: &ash::Device,
    props: &vk::PhysicalDeviceMemoryProperties,
    requirements: vk::MemoryRequirements,
    placement: MemoryPlacement,
) -> DeviceResult<vk::DeviceMemory> {
    let preferred = memory_properties(placement);
    let type_index = find_memory_type(props, requirements.memory_type_bits, preferred)
        .or_else(|| {
            find_memory_type(
                props,
                requirements.memory_type_bits,
                vk::MemoryPropertyFlags::empty(),
            )
        })
        .ok_or(DeviceError::OutOfDeviceMemory)?;
    let info = vk::MemoryAllocateInfo::builder()
        .allocation_size(requirements.size)
        .memory_type_index(type_index);
    unsafe { device.allocate_memory(&info, None).map_err(map_vk_error) }
}
