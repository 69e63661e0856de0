//! The whole loop: pacer + graph + cache against the mock device.

mod common;

use common::{spirv, MockDevice, Op};
use ember_render::cache::ResourceCache;
use ember_render::context::{ContextConfig, RenderContext};
use ember_render::device::{CommandPoolResetMode, RenderDevice};
use ember_render::graph::{QueueFlags, RdgImageInfo, RenderGraph};
use ember_render::shader::ShaderGroupSpec;
use ember_render::Format;

#[test]
fn triangle_through_the_frame_loop() {
    let device = MockDevice::new();
    let cache = ResourceCache::new();
    let surface = device.create_surface();
    let mut ctx = RenderContext::new(&device, surface, ContextConfig::default()).unwrap();
    let extent = ctx.swapchain_extent(&device).unwrap();

    let shader = device
        .create_shader(&ShaderGroupSpec::graphics(
            spirv::vertex_position_only(),
            spirv::fragment_constant_color(),
        ))
        .unwrap();

    let mut graph = RenderGraph::new();
    graph.set_back_buffer_size(extent.width, extent.height);
    {
        let mut pass = graph.add_pass("triangle", QueueFlags::GRAPHICS);
        pass.write_color_image(
            "backbuffer",
            RdgImageInfo::swapchain_relative(Format::R8G8B8A8_SRGB),
        );
        pass.set_shader(shader);
        pass.set_on_execute(Box::new(|ctx| {
            ctx.draw(3, 1, 0, 0);
        }));
    }
    graph.set_back_buffer_tag("backbuffer");
    graph.compile(&device, &cache).unwrap();

    for _ in 0..60 {
        let cmd = ctx
            .start_frame(&device, CommandPoolResetMode::ResetPool)
            .unwrap();
        let target = ctx.active_frame().swapchain_texture();
        graph.execute(&device, cmd, target).unwrap();
        ctx.end_frame(&device).unwrap();
    }

    let stats = device.stats.lock();
    assert_eq!(stats.presents, 60);
    assert_eq!(stats.submits, 60);
    drop(stats);
    assert_eq!(device.op_count(|op| matches!(op, Op::Draw { .. })), 60);
    assert_eq!(device.op_count(|op| matches!(op, Op::Blit { .. })), 60);

    // every frame presents into a swapchain image the graph just blitted
    let ops = device.take_ops();
    let mut last_blit_dst = None;
    for op in &ops {
        match op {
            Op::Blit { dst, .. } => last_blit_dst = Some(*dst),
            Op::TextureTransition { texture, .. } => {
                assert_eq!(Some(*texture), last_blit_dst);
            }
            _ => {}
        }
    }
}
