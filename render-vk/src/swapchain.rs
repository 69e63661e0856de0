//! Swapchain creation, resize, acquisition, and present.

use crate::convert;
use crate::device::VulkanDevice;
use crate::map_vk_error;
use crate::resources::{VkSwapchain, VkTexture};
use ash::vk;
use ember_render::device::{AcquiredImage, SurfaceCapabilities, WAIT_FOREVER};
use ember_render::error::{DeviceError, DeviceResult};
use ember_render::handle::{SemaphoreHandle, SurfaceHandle, SwapchainHandle, TextureHandle};
use ember_render::texture::{Dimensions, Extent2d, TextureSpec, TextureUsage};

fn pick_surface_format(formats: &[vk::SurfaceFormatKHR]) -> vk::SurfaceFormatKHR {
    formats
        .iter()
        .copied()
        .find(|f| {
            f.format == vk::Format::B8G8R8A8_SRGB
                && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        })
        .or_else(|| {
            formats
                .iter()
                .copied()
                .find(|f| f.format == vk::Format::B8G8R8A8_UNORM)
        })
        .unwrap_or(vk::SurfaceFormatKHR {
            format: vk::Format::B8G8R8A8_UNORM,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        })
}

fn pick_present_mode(modes: &[vk::PresentModeKHR], vsync: bool) -> vk::PresentModeKHR {
    if vsync {
        vk::PresentModeKHR::FIFO
    } else {
        modes
            .iter()
            .copied()
            .find(|&m| m == vk::PresentModeKHR::MAILBOX)
            .or_else(|| {
                modes
                    .iter()
                    .copied()
                    .find(|&m| m == vk::PresentModeKHR::IMMEDIATE)
            })
            .unwrap_or(vk::PresentModeKHR::FIFO)
    }
}

fn build_swapchain(
    device: &VulkanDevice,
    surface: vk::SurfaceKHR,
    vsync: bool,
    requested_extent: Option<Extent2d>,
    old_swapchain: vk::SwapchainKHR,
) -> DeviceResult<VkSwapchain> {
    let caps = unsafe {
        device
            .instance
            .surface_loader
            .get_physical_device_surface_capabilities(device.physical_device, surface)
            .map_err(map_vk_error)?
    };
    let formats = unsafe {
        device
            .instance
            .surface_loader
            .get_physical_device_surface_formats(device.physical_device, surface)
            .map_err(map_vk_error)?
    };
    let present_modes = unsafe {
        device
            .instance
            .surface_loader
            .get_physical_device_surface_present_modes(device.physical_device, surface)
            .map_err(map_vk_error)?
    };

    let surface_format = pick_surface_format(&formats);
    let present_mode = pick_present_mode(&present_modes, vsync);

    let extent = match requested_extent {
        Some(extent) => vk::Extent2D {
            width: extent
                .width
                .clamp(caps.min_image_extent.width, caps.max_image_extent.width),
            height: extent
                .height
                .clamp(caps.min_image_extent.height, caps.max_image_extent.height),
        },
        None => caps.current_extent,
    };

    let mut image_count = caps.min_image_count + 1;
    if caps.max_image_count > 0 {
        image_count = image_count.min(caps.max_image_count);
    }

    let info = vk::SwapchainCreateInfoKHR::builder()
        .surface(surface)
        .min_image_count(image_count)
        .image_format(surface_format.format)
        .image_color_space(surface_format.color_space)
        .image_extent(extent)
        .image_array_layers(1)
        .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_DST)
        .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
        .pre_transform(caps.current_transform)
        .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
        .present_mode(present_mode)
        .clipped(true)
        .old_swapchain(old_swapchain);
    let raw = unsafe {
        device
            .swapchain_loader
            .create_swapchain(&info, None)
            .map_err(map_vk_error)?
    };

    let vk_images = unsafe {
        device
            .swapchain_loader
            .get_swapchain_images(raw)
            .map_err(map_vk_error)?
    };
    let portable_extent = Extent2d {
        width: extent.width,
        height: extent.height,
    };
    let spec = TextureSpec {
        format: convert::from_vk_format(surface_format.format),
        dimensions: Dimensions::Dim2d {
            width: extent.width,
            height: extent.height,
        },
        mip_levels: 1,
        samples: 1,
        usage: TextureUsage::COLOR_ATTACHMENT | TextureUsage::TRANSFER_DST,
    };
    let mut images = Vec::with_capacity(vk_images.len());
    for image in vk_images {
        let view =
            crate::pipeline::create_image_view(device, image, &spec, vk::ImageViewType::TYPE_2D)?;
        let handle = device.textures.insert(VkTexture {
            image,
            memory: None,
            view,
            spec,
            owned: false,
        });
        images.push(TextureHandle::from_raw(handle).unwrap_or(TextureHandle::NULL));
    }
    log::info!(
        "swapchain {}x{} ({} images, {:?})",
        extent.width,
        extent.height,
        images.len(),
        present_mode
    );

    Ok(VkSwapchain {
        raw,
        surface,
        format: surface_format.format,
        extent: portable_extent,
        vsync,
        images,
    })
}

fn release_swapchain_images(device: &VulkanDevice, swapchain: &VkSwapchain) {
    for &texture in &swapchain.images {
        if let Some(t) = device.textures.remove(texture.raw()) {
            unsafe { device.device.destroy_image_view(t.view, None) };
            // the images themselves belong to the swapchain
        }
    }
}

pub(crate) fn create_swapchain(
    device: &VulkanDevice,
    surface: SurfaceHandle,
    vsync: bool,
) -> DeviceResult<SwapchainHandle> {
    let vk_surface = device
        .surfaces
        .get(surface.raw())
        .ok_or(DeviceError::SurfaceLost)?;
    let swapchain = build_swapchain(device, vk_surface, vsync, None, vk::SwapchainKHR::null())?;
    Ok(SwapchainHandle::from_raw(device.swapchains.insert(swapchain))
        .unwrap_or(SwapchainHandle::NULL))
}

pub(crate) fn resize_swapchain(
    device: &VulkanDevice,
    handle: SwapchainHandle,
    extent: Extent2d,
) -> DeviceResult<()> {
    let (surface, vsync, old_raw) = device
        .swapchains
        .with(handle.raw(), |sc| (sc.surface, sc.vsync, sc.raw))
        .ok_or(DeviceError::HandleInvalid(handle.raw()))?;
    let new_swapchain = build_swapchain(device, surface, vsync, Some(extent), old_raw)?;
    device
        .swapchains
        .with_mut(handle.raw(), |sc| {
            release_swapchain_images(device, sc);
            unsafe { device.swapchain_loader.destroy_swapchain(sc.raw, None) };
            *sc = new_swapchain;
        })
        .ok_or(DeviceError::HandleInvalid(handle.raw()))
}

pub(crate) fn destroy_swapchain(device: &VulkanDevice, handle: SwapchainHandle) {
    if let Some(sc) = device.swapchains.remove(handle.raw()) {
        release_swapchain_images(device, &sc);
        unsafe { device.swapchain_loader.destroy_swapchain(sc.raw, None) };
    }
}

pub(crate) fn surface_capabilities(
    device: &VulkanDevice,
    surface: SurfaceHandle,
) -> DeviceResult<SurfaceCapabilities> {
    let vk_surface = device
        .surfaces
        .get(surface.raw())
        .ok_or(DeviceError::SurfaceLost)?;
    let caps = unsafe {
        device
            .instance
            .surface_loader
            .get_physical_device_surface_capabilities(device.physical_device, vk_surface)
            .map_err(map_vk_error)?
    };
    let current_extent = if caps.current_extent.width == u32::MAX {
        None
    } else {
        Some(Extent2d {
            width: caps.current_extent.width,
            height: caps.current_extent.height,
        })
    };
    Ok(SurfaceCapabilities {
        current_extent,
        min_extent: Extent2d {
            width: caps.min_image_extent.width,
            height: caps.min_image_extent.height,
        },
        max_extent: Extent2d {
            width: caps.max_image_extent.width,
            height: caps.max_image_extent.height,
        },
    })
}

pub(crate) fn acquire_next_image(
    device: &VulkanDevice,
    handle: SwapchainHandle,
    signal: SemaphoreHandle,
) -> DeviceResult<AcquiredImage> {
    let raw = device
        .swapchains
        .with(handle.raw(), |sc| sc.raw)
        .ok_or(DeviceError::HandleInvalid(handle.raw()))?;
    let semaphore = device
        .vk_semaphore(signal)
        .ok_or(DeviceError::HandleInvalid(signal.raw()))?;
    let (image_index, suboptimal) = unsafe {
        device
            .swapchain_loader
            .acquire_next_image(raw, WAIT_FOREVER, semaphore, vk::Fence::null())
            .map_err(map_vk_error)?
    };
    Ok(AcquiredImage {
        image_index,
        suboptimal,
    })
}

pub(crate) fn present(
    device: &VulkanDevice,
    handle: SwapchainHandle,
    image_index: u32,
    wait: SemaphoreHandle,
) -> DeviceResult<()> {
    let raw = device
        .swapchains
        .with(handle.raw(), |sc| sc.raw)
        .ok_or(DeviceError::HandleInvalid(handle.raw()))?;
    let semaphore = device
        .vk_semaphore(wait)
        .ok_or(DeviceError::HandleInvalid(wait.raw()))?;
    let wait_semaphores = [semaphore];
    let swapchains = [raw];
    let indices = [image_index];
    let info = vk::PresentInfoKHR::builder()
        .wait_semaphores(&wait_semaphores)
        .swapchains(&swapchains)
        .image_indices(&indices);
    let _guard = device.queue_lock.lock();
    let suboptimal = unsafe {
        device
            .swapchain_loader
            .queue_present(device.graphics_queue, &info)
            .map_err(map_vk_error)?
    };
    if suboptimal {
        return Err(DeviceError::Suboptimal);
    }
    Ok(())
}
