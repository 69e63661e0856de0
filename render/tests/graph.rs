//! Render graph compilation and execution against the mock device.

mod common;

use common::{spirv, MockDevice, Op};
use ember_render::cache::ResourceCache;
use ember_render::command::{CommandArena, DeferredCommandList};
use ember_render::device::{CommandBufferLevel, CommandPoolResetMode, QueueClass, RenderDevice};
use ember_render::error::GraphError;
use ember_render::graph::{QueueFlags, RdgImageInfo, RenderGraph};
use ember_render::handle::{CommandBufferHandle, TextureHandle};
use ember_render::shader::ShaderGroupSpec;
use ember_render::texture::{TextureSpec, TextureUsage};
use ember_render::Format;

fn command_buffer(device: &MockDevice) -> CommandBufferHandle {
    let pool = device
        .create_command_pool(QueueClass::Graphics, CommandPoolResetMode::ResetPool)
        .unwrap();
    device
        .get_or_create_command_buffer(pool, CommandBufferLevel::Primary)
        .unwrap()
}

fn present_target(device: &MockDevice) -> TextureHandle {
    device
        .create_texture(&TextureSpec::new_2d(
            Format::B8G8R8A8_SRGB,
            1280,
            720,
            TextureUsage::TRANSFER_DST,
        ))
        .unwrap()
}

fn graphics_shader(device: &MockDevice) -> ember_render::handle::ShaderHandle {
    device
        .create_shader(&ShaderGroupSpec::graphics(
            spirv::vertex_position_only(),
            spirv::fragment_constant_color(),
        ))
        .unwrap()
}

#[test]
fn hello_triangle_sixty_frames() {
    let device = MockDevice::new();
    let cache = ResourceCache::new();
    let shader = graphics_shader(&device);

    let mut graph = RenderGraph::new();
    graph.set_back_buffer_size(1280, 720);
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
    assert_eq!(graph.execution_order(), vec!["triangle"]);

    let cmd = command_buffer(&device);
    let target = present_target(&device);
    for _ in 0..60 {
        graph.execute(&device, cmd, target).unwrap();
    }

    let draws = device.op_count(|op| {
        matches!(
            op,
            Op::Draw {
                vertex_count: 3,
                instance_count: 1,
                first_vertex: 0,
                first_instance: 0,
            }
        )
    });
    assert_eq!(draws, 60);
    assert_eq!(device.op_count(|op| matches!(op, Op::Blit { .. })), 60);
    assert_eq!(
        device.op_count(|op| matches!(
            op,
            Op::BeginRendering {
                color_count: 1,
                has_depth: false,
                ..
            }
        )),
        60
    );
    // no descriptors declared, so none written
    assert_eq!(device.total_descriptor_writes(), 0);
}

#[test]
fn gbuffer_lighting_order_and_barriers() {
    let device = MockDevice::new();
    let cache = ResourceCache::new();
    let gbuffer_shader = graphics_shader(&device);
    let lighting_shader = device
        .create_shader(&ShaderGroupSpec::graphics(
            spirv::vertex_position_only(),
            spirv::fragment_sampling(&[
                (0, 0, "albedo_tex"),
                (0, 1, "normal_tex"),
                (0, 2, "depth_tex"),
            ]),
        ))
        .unwrap();
    let sampler = device.create_sampler(&Default::default()).unwrap();

    let mut graph = RenderGraph::new();
    graph.set_back_buffer_size(1280, 720);
    {
        let mut pass = graph.add_pass("gbuffer", QueueFlags::GRAPHICS);
        pass.write_color_image(
            "gbuf_albedo",
            RdgImageInfo::swapchain_relative(Format::R8G8B8A8_SRGB),
        )
        .write_color_image(
            "gbuf_normal",
            RdgImageInfo::swapchain_relative(Format::R10G10B10A2_UNORM),
        )
        .write_depth_stencil_image(
            "gbuf_depth",
            RdgImageInfo::swapchain_relative(Format::D32_SFLOAT),
        )
        .set_shader(gbuffer_shader)
        .set_on_execute(Box::new(|ctx| {
            ctx.draw(3, 1, 0, 0);
        }));
    }
    {
        let mut pass = graph.add_pass("lighting", QueueFlags::GRAPHICS);
        pass.read_image("gbuf_albedo", TextureUsage::SAMPLED)
            .read_image("gbuf_normal", TextureUsage::SAMPLED)
            .read_image("gbuf_depth", TextureUsage::SAMPLED)
            .write_color_image(
                "backbuffer",
                RdgImageInfo::swapchain_relative(Format::R8G8B8A8_SRGB),
            )
            .set_shader(lighting_shader)
            .bind_sampler("gbuf_albedo", sampler)
            .bind_sampler("gbuf_normal", sampler)
            .bind_sampler("gbuf_depth", sampler)
            .bind_shader_resource("gbuf_albedo", "albedo_tex")
            .bind_shader_resource("gbuf_normal", "normal_tex")
            .bind_shader_resource("gbuf_depth", "depth_tex")
            .set_on_execute(Box::new(|ctx| {
                ctx.draw(3, 1, 0, 0);
            }));
    }
    graph.set_back_buffer_tag("backbuffer");
    graph.compile(&device, &cache).unwrap();
    assert_eq!(graph.execution_order(), vec!["gbuffer", "lighting"]);

    let cmd = command_buffer(&device);
    let target = present_target(&device);
    graph.execute(&device, cmd, target).unwrap();

    let ops = device.take_ops();
    // no compute work in this frame
    assert_eq!(
        ops.iter().filter(|op| matches!(op, Op::Dispatch)).count(),
        0
    );
    assert_eq!(
        ops.iter().filter(|op| matches!(op, Op::Draw { .. })).count(),
        2
    );

    // the barrier before the lighting pass transitions all three targets
    // from their attachment usages to sampled (the back buffer's own write
    // entry rides along in the same barrier)
    let lighting_barrier = ops
        .iter()
        .filter_map(|op| match op {
            Op::Transitions { textures, .. } => Some(textures),
            _ => None,
        })
        .find(|textures| {
            let sampled: Vec<_> = textures
                .iter()
                .filter(|&&(_, _, dst)| dst == TextureUsage::SAMPLED)
                .collect();
            // three reads transitioning out of real usages (the one-time
            // layout seeding also targets SAMPLED, but from Undefined)
            sampled.len() == 3 && sampled.iter().all(|&&(_, src, _)| !src.is_empty())
        })
        .expect("missing lighting barrier");
    let sampled_sources: Vec<TextureUsage> = lighting_barrier
        .iter()
        .filter(|&&(_, _, dst)| dst == TextureUsage::SAMPLED)
        .map(|&(_, src, _)| src)
        .collect();
    assert!(sampled_sources.contains(&TextureUsage::COLOR_ATTACHMENT));
    assert!(sampled_sources.contains(&TextureUsage::DEPTH_STENCIL_ATTACHMENT));
}

#[test]
fn layout_ring_closes_across_frames() {
    let device = MockDevice::new();
    let cache = ResourceCache::new();
    let shader = graphics_shader(&device);

    let mut graph = RenderGraph::new();
    graph.set_back_buffer_size(640, 480);
    {
        let mut pass = graph.add_pass("draw", QueueFlags::GRAPHICS);
        pass.write_color_image(
            "color",
            RdgImageInfo::swapchain_relative(Format::R8G8B8A8_SRGB),
        );
        pass.set_shader(shader);
    }
    {
        let mut pass = graph.add_pass("post", QueueFlags::GRAPHICS);
        pass.read_image("color", TextureUsage::SAMPLED).write_color_image(
            "backbuffer",
            RdgImageInfo::swapchain_relative(Format::R8G8B8A8_SRGB),
        );
    }
    graph.set_back_buffer_tag("backbuffer");
    graph.compile(&device, &cache).unwrap();

    // the first-use transition's source equals the resource's last usage of
    // the previous frame, closing the ring
    let first = graph.image_transition("draw", "color").unwrap();
    assert_eq!(first.src, TextureUsage::SAMPLED);
    assert_eq!(first.dst, TextureUsage::COLOR_ATTACHMENT);
    let last = graph.image_transition("post", "color").unwrap();
    assert_eq!(last.dst, TextureUsage::SAMPLED);
}

#[test]
fn compile_is_idempotent() {
    let device = MockDevice::new();
    let cache = ResourceCache::new();
    let mut graph = RenderGraph::new();
    graph.set_back_buffer_size(640, 480);
    graph
        .add_pass("draw", QueueFlags::GRAPHICS)
        .write_color_image(
            "backbuffer",
            RdgImageInfo::swapchain_relative(Format::R8G8B8A8_SRGB),
        );
    graph.set_back_buffer_tag("backbuffer");

    graph.compile(&device, &cache).unwrap();
    let order: Vec<String> = graph.execution_order().into_iter().map(String::from).collect();
    let textures = device.live_textures();
    let backbuffer = graph.physical_texture("backbuffer");

    graph.compile(&device, &cache).unwrap();
    assert_eq!(graph.execution_order(), order);
    assert_eq!(device.live_textures(), textures);
    assert_eq!(graph.physical_texture("backbuffer"), backbuffer);
}

#[test]
fn descriptor_sets_written_once_over_many_frames() {
    let device = MockDevice::new();
    let cache = ResourceCache::new();
    let producer_shader = graphics_shader(&device);
    let sampling_shader = device
        .create_shader(&ShaderGroupSpec::graphics(
            spirv::vertex_position_only(),
            spirv::fragment_sampling(&[(0, 0, "albedo_tex")]),
        ))
        .unwrap();
    let sampler = device.create_sampler(&Default::default()).unwrap();

    let mut graph = RenderGraph::new();
    graph.set_back_buffer_size(1280, 720);
    graph
        .add_pass("produce", QueueFlags::GRAPHICS)
        .write_color_image(
            "albedo",
            RdgImageInfo::swapchain_relative(Format::R8G8B8A8_SRGB),
        )
        .set_shader(producer_shader);
    graph
        .add_pass("consume", QueueFlags::GRAPHICS)
        .read_image("albedo", TextureUsage::SAMPLED)
        .write_color_image(
            "backbuffer",
            RdgImageInfo::swapchain_relative(Format::R8G8B8A8_SRGB),
        )
        .set_shader(sampling_shader)
        .bind_sampler("albedo", sampler)
        .bind_shader_resource("albedo", "albedo_tex");
    graph.set_back_buffer_tag("backbuffer");
    graph.compile(&device, &cache).unwrap();

    let cmd = command_buffer(&device);
    let target = present_target(&device);
    for _ in 0..120 {
        graph.execute(&device, cmd, target).unwrap();
    }
    // one WriteDescriptorSet per binding, on the first execute only
    assert_eq!(device.total_descriptor_writes(), 1);
}

#[test]
fn replayed_command_lists_feed_the_pass() {
    let device = MockDevice::new();
    let cache = ResourceCache::new();

    let arena = CommandArena::new();
    let mut graph = RenderGraph::new();
    graph.set_back_buffer_size(640, 480);
    {
        let mut pass = graph.add_pass("draw", QueueFlags::GRAPHICS);
        pass.write_color_image(
            "backbuffer",
            RdgImageInfo::swapchain_relative(Format::R8G8B8A8_SRGB),
        );
        pass.set_on_execute(Box::new(move |ctx| {
            // the canonical callback shape: record deferred, replay once
            let list = DeferredCommandList::new(&arena);
            list.bind_vertex_buffer(ember_render::handle::BufferHandle::NULL, 0);
            list.draw(3, 1, 0, 0);
            list.replay(ctx);
        }));
    }
    graph.set_back_buffer_tag("backbuffer");
    graph.compile(&device, &cache).unwrap();

    let cmd = command_buffer(&device);
    let target = present_target(&device);
    graph.execute(&device, cmd, target).unwrap();

    let ops = device.take_ops();
    let bind_index = ops
        .iter()
        .position(|op| matches!(op, Op::BindVertexBuffer))
        .unwrap();
    let draw_index = ops
        .iter()
        .position(|op| matches!(op, Op::Draw { .. }))
        .unwrap();
    assert!(bind_index < draw_index);
}

#[test]
fn write_after_write_in_one_pass_is_an_error() {
    let device = MockDevice::new();
    let cache = ResourceCache::new();
    let mut graph = RenderGraph::new();
    graph.set_back_buffer_size(640, 480);
    graph
        .add_pass("broken", QueueFlags::GRAPHICS)
        .write_color_image(
            "backbuffer",
            RdgImageInfo::swapchain_relative(Format::R8G8B8A8_SRGB),
        )
        .write_color_image(
            "backbuffer",
            RdgImageInfo::swapchain_relative(Format::R8G8B8A8_SRGB),
        );
    graph.set_back_buffer_tag("backbuffer");
    assert!(matches!(
        graph.compile(&device, &cache),
        Err(GraphError::WriteAfterWrite { .. })
    ));
}

#[test]
fn dependency_cycles_are_detected() {
    let device = MockDevice::new();
    let cache = ResourceCache::new();
    let mut graph = RenderGraph::new();
    graph.set_back_buffer_size(640, 480);
    graph
        .add_pass("a", QueueFlags::GRAPHICS)
        .write_color_image("img_a", RdgImageInfo::swapchain_relative(Format::R8G8B8A8_SRGB));
    graph
        .add_pass("b", QueueFlags::GRAPHICS)
        .read_image("img_a", TextureUsage::SAMPLED)
        .write_color_image("img_b", RdgImageInfo::swapchain_relative(Format::R8G8B8A8_SRGB));
    // close the loop: a also reads b's output
    graph
        .add_pass("a", QueueFlags::GRAPHICS)
        .read_image("img_b", TextureUsage::SAMPLED);
    graph
        .add_pass("present", QueueFlags::GRAPHICS)
        .read_image("img_b", TextureUsage::SAMPLED)
        .write_color_image(
            "backbuffer",
            RdgImageInfo::swapchain_relative(Format::R8G8B8A8_SRGB),
        );
    graph.set_back_buffer_tag("backbuffer");
    assert!(matches!(
        graph.compile(&device, &cache),
        Err(GraphError::CycleDetected)
    ));
}

#[test]
fn missing_back_buffer_is_an_error() {
    let device = MockDevice::new();
    let cache = ResourceCache::new();
    let mut graph = RenderGraph::new();
    graph.set_back_buffer_size(640, 480);
    graph
        .add_pass("draw", QueueFlags::GRAPHICS)
        .write_color_image("color", RdgImageInfo::swapchain_relative(Format::R8G8B8A8_SRGB));
    graph.set_back_buffer_tag("missing");
    assert!(matches!(
        graph.compile(&device, &cache),
        Err(GraphError::MissingBackBuffer(_))
    ));
}

#[test]
fn unwritten_back_buffer_is_an_error() {
    let device = MockDevice::new();
    let cache = ResourceCache::new();
    let mut graph = RenderGraph::new();
    graph.set_back_buffer_size(640, 480);
    // the tag exists but nothing ever writes it
    graph.declare_image(
        "backbuffer",
        RdgImageInfo::swapchain_relative(Format::R8G8B8A8_SRGB),
    );
    graph
        .add_pass("reader", QueueFlags::GRAPHICS)
        .read_image("backbuffer", TextureUsage::SAMPLED);
    graph.set_back_buffer_tag("backbuffer");
    assert!(matches!(
        graph.compile(&device, &cache),
        Err(GraphError::NoBackBufferWriter(_))
    ));
}

#[test]
fn reading_an_undeclared_resource_is_an_error() {
    let device = MockDevice::new();
    let cache = ResourceCache::new();
    let mut graph = RenderGraph::new();
    graph.set_back_buffer_size(640, 480);
    graph
        .add_pass("draw", QueueFlags::GRAPHICS)
        .write_color_image(
            "backbuffer",
            RdgImageInfo::swapchain_relative(Format::R8G8B8A8_SRGB),
        )
        .read_image("nothing_wrote_this", TextureUsage::SAMPLED);
    graph.set_back_buffer_tag("backbuffer");
    assert!(matches!(
        graph.compile(&device, &cache),
        Err(GraphError::UnknownResource { .. })
    ));
}
