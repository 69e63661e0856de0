//! Cache deduplication, including under concurrent callers.

mod common;

use common::{spirv, MockDevice};
use ember_render::cache::ResourceCache;
use ember_render::device::RenderDevice;
use ember_render::renderpass::{
    AttachmentDescription, AttachmentReference, RenderPassSpec, SubpassSpec,
};
use ember_render::shader::ShaderGroupSpec;
use ember_render::texture::TextureLayout;
use ember_render::Format;
use std::sync::Arc;

fn simple_pass_spec() -> RenderPassSpec {
    RenderPassSpec {
        attachments: vec![AttachmentDescription::cleared(
            Format::R8G8B8A8_SRGB,
            1,
            TextureLayout::ColorAttachment,
        )],
        subpasses: vec![SubpassSpec {
            color_refs: vec![AttachmentReference {
                attachment: 0,
                layout: TextureLayout::ColorAttachment,
            }],
            input_refs: Vec::new(),
            depth_stencil_ref: None,
        }],
        dependencies: Vec::new(),
    }
}

#[test]
fn identical_specs_share_one_object() {
    let device = MockDevice::new();
    let cache = ResourceCache::new();
    let spec = simple_pass_spec();
    let a = cache.request_render_pass(&device, &spec).unwrap();
    let b = cache.request_render_pass(&device, &spec).unwrap();
    assert_eq!(a, b);
    let stats = cache.render_pass_stats();
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.hits, 1);
}

#[test]
fn different_specs_do_not_collide() {
    let device = MockDevice::new();
    let cache = ResourceCache::new();
    let a = cache.request_render_pass(&device, &simple_pass_spec()).unwrap();
    let mut other = simple_pass_spec();
    other.attachments[0].format = Format::R16G16B16A16_SFLOAT;
    let b = cache.request_render_pass(&device, &other).unwrap();
    assert_ne!(a, b);
}

#[test]
fn concurrent_requests_converge_on_one_entry() {
    let device = Arc::new(MockDevice::new());
    let cache = Arc::new(ResourceCache::new());
    let spec = simple_pass_spec();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let device = device.clone();
            let cache = cache.clone();
            let spec = spec.clone();
            std::thread::spawn(move || cache.request_render_pass(&*device, &spec).unwrap())
        })
        .map(|t| t.join().unwrap())
        .collect();

    for window in handles.windows(2) {
        assert_eq!(window[0], window[1]);
    }
}

#[test]
fn pipeline_layout_deduped_by_shader_group_hash() {
    let device = MockDevice::new();
    let cache = ResourceCache::new();
    let make_spec = || {
        ShaderGroupSpec::graphics(
            spirv::vertex_position_only(),
            spirv::fragment_sampling(&[(0, 0, "albedo_tex")]),
        )
    };
    // two shader objects with identical bytecode share one layout
    let shader_a = device.create_shader(&make_spec()).unwrap();
    let shader_b = device.create_shader(&make_spec()).unwrap();

    let layout_a = cache.request_pipeline_layout(&device, shader_a).unwrap();
    let layout_b = cache.request_pipeline_layout(&device, shader_b).unwrap();
    assert_eq!(layout_a.group_hash, layout_b.group_hash);
    assert_eq!(layout_a.set_layouts.len(), 1);
    // the second request hit the cache
    let stats = cache.pipeline_layout_stats();
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.hits, 1);
    // set layouts are deduped by identity too
    assert!(Arc::ptr_eq(
        &layout_a.set_layouts[0],
        &layout_b.set_layouts[0]
    ));
}
