//! Frame pacing: the acquire → record → submit → present cycle, staging
//! uploads, and swapchain resize.

mod common;

use common::{MockDevice, Op};
use ember_render::context::{ContextConfig, RenderContext};
use ember_render::device::{CommandPoolResetMode, RenderDevice};
use ember_render::error::{DeviceError, FrameError};
use ember_render::texture::{
    BufferTextureCopyRegion, Extent2d, Extent3d, TextureLayout, TextureSpec, TextureUsage,
};
use ember_render::Format;

fn make_context(device: &MockDevice) -> RenderContext {
    let surface = device.create_surface();
    RenderContext::new(device, surface, ContextConfig::default()).unwrap()
}

#[test]
fn sixty_noop_frames_produce_sixty_presents() {
    let device = MockDevice::new();
    let mut ctx = make_context(&device);

    for _ in 0..60 {
        let _cmd = ctx
            .start_frame(&device, CommandPoolResetMode::ResetPool)
            .unwrap();
        ctx.end_frame(&device).unwrap();
    }

    let stats = device.stats.lock();
    assert_eq!(stats.presents, 60);
    assert_eq!(stats.submits, 60);
    // each frame transitions its swapchain image for present
    drop(stats);
    assert_eq!(
        device.op_count(|op| matches!(
            op,
            Op::TextureTransition {
                layout: TextureLayout::PresentSrc,
                ..
            }
        )),
        60
    );
}

#[test]
fn staging_upload_advances_and_resets_cursor() {
    let device = MockDevice::new();
    let mut ctx = make_context(&device);

    let cmd = ctx
        .start_frame(&device, CommandPoolResetMode::ResetPool)
        .unwrap();

    // 1024x1024 RGBA = 4 MiB
    let pixels = vec![0u8; 1024 * 1024 * 4];
    let texture = device
        .create_texture(
            &TextureSpec::new_2d(
                Format::R8G8B8A8_UNORM,
                1024,
                1024,
                TextureUsage::SAMPLED | TextureUsage::TRANSFER_DST,
            ),
        )
        .unwrap();
    let region = BufferTextureCopyRegion {
        buffer_offset: 0,
        mip_level: 0,
        base_array_layer: 0,
        layer_count: 1,
        texture_offset: Extent3d::default(),
        texture_extent: Extent3d {
            width: 1024,
            height: 1024,
            depth: 1,
        },
    };
    let allocation = ctx
        .upload_to_texture(&device, cmd, &pixels, texture, region)
        .unwrap();
    assert_eq!(allocation.offset, 0);
    assert_eq!(allocation.size, 4 * 1024 * 1024);
    assert_eq!(ctx.active_frame().staging_cursor(), 4 * 1024 * 1024);

    // exactly one copy region targeting mip 0 / layer 0
    let copies: Vec<_> = device
        .ops
        .lock()
        .iter()
        .filter_map(|op| match op {
            Op::CopyBufferToTexture { regions, .. } => Some(regions.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(copies.len(), 1);
    assert_eq!(copies[0].len(), 1);
    assert_eq!(copies[0][0].mip_level, 0);
    assert_eq!(copies[0][0].base_array_layer, 0);

    let waits_before = device.stats.lock().fence_waits;
    let upload_cmd = ctx.get_command_buffer(&device).unwrap();
    ctx.submit_immediate(&device, upload_cmd).unwrap();
    assert_eq!(device.stats.lock().fence_waits, waits_before + 1);

    // the cursor resets with the frame, before the next start_frame
    ctx.end_frame(&device).unwrap();
    assert_eq!(ctx.active_frame().staging_cursor(), 0);
}

#[test]
fn staging_exhaustion_is_reported() {
    let device = MockDevice::new();
    let mut ctx = RenderContext::new(
        &device,
        device.create_surface(),
        ContextConfig {
            staging_size: 1024,
            ..ContextConfig::default()
        },
    )
    .unwrap();
    let cmd = ctx
        .start_frame(&device, CommandPoolResetMode::ResetPool)
        .unwrap();
    let buffer = device
        .create_buffer(&ember_render::BufferSpec::vertex(4096))
        .unwrap();
    let err = ctx
        .upload_to_buffer(&device, cmd, &[0u8; 2048], buffer, 0)
        .unwrap_err();
    assert!(matches!(err, FrameError::StagingExhausted { .. }));
}

#[test]
fn out_of_date_acquire_discards_frame_and_resize_recovers() {
    let device = MockDevice::new();
    let mut ctx = make_context(&device);

    // the window grew; the next acquire fails with OutOfDate
    device
        .acquire_script
        .lock()
        .push_back(Err(DeviceError::OutOfDate));
    *device.surface_caps.lock() = ember_render::SurfaceCapabilities {
        current_extent: Some(Extent2d::new(1920, 1080)),
        min_extent: Extent2d::new(1, 1),
        max_extent: Extent2d::new(16384, 16384),
    };

    let err = ctx
        .start_frame(&device, CommandPoolResetMode::ResetPool)
        .unwrap_err();
    assert!(matches!(err, FrameError::Device(DeviceError::OutOfDate)));
    // the discarded frame never submitted or presented
    assert_eq!(device.stats.lock().presents, 0);

    ctx.recreate_swapchain(&device, 1920, 1080).unwrap();
    {
        let stats = device.stats.lock();
        assert_eq!(stats.wait_idles, 1);
        assert_eq!(stats.swapchain_resizes, 1);
    }
    assert_eq!(
        ctx.swapchain_extent(&device).unwrap(),
        Extent2d::new(1920, 1080)
    );

    // the rebuilt swapchain acquires and presents again
    let _cmd = ctx
        .start_frame(&device, CommandPoolResetMode::ResetPool)
        .unwrap();
    ctx.end_frame(&device).unwrap();
    assert_eq!(device.stats.lock().presents, 1);
}

#[test]
fn resize_with_sentinel_extent_is_a_no_op() {
    let device = MockDevice::new();
    let mut ctx = make_context(&device);
    device.surface_caps.lock().current_extent = None;
    ctx.recreate_swapchain(&device, 800, 600).unwrap();
    assert_eq!(device.stats.lock().swapchain_resizes, 0);
}

#[test]
fn resize_clamps_to_surface_limits() {
    let device = MockDevice::new();
    let mut ctx = make_context(&device);
    *device.surface_caps.lock() = ember_render::SurfaceCapabilities {
        current_extent: Some(Extent2d::new(4000, 4000)),
        min_extent: Extent2d::new(64, 64),
        max_extent: Extent2d::new(2048, 2048),
    };
    ctx.recreate_swapchain(&device, 4000, 4000).unwrap();
    assert_eq!(
        ctx.swapchain_extent(&device).unwrap(),
        Extent2d::new(2048, 2048)
    );
}
