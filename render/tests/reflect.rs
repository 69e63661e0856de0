//! Shader-group reflection against hand-assembled SPIR-V.

mod common;

use common::spirv;
use ember_render::error::ReflectError;
use ember_render::shader::{
    reflect_shader_group, ShaderGroupSpec, ShaderResourceType, ShaderStage, ShaderStageFlags,
    SpecConstantValue,
};
use ember_render::Format;

#[test]
fn vertex_inputs_sorted_and_packed() {
    let spec = ShaderGroupSpec::new()
        .with_stage(ShaderStage::Vertex, spirv::vertex_position_uv(), "main")
        .with_stage(ShaderStage::Fragment, spirv::fragment_constant_color(), "main");
    let info = reflect_shader_group(&spec).unwrap();

    // declared uv-first, reflected location order, offsets running sums
    assert_eq!(info.vertex_input_attributes.len(), 2);
    let position = &info.vertex_input_attributes[0];
    assert_eq!(position.name, "position");
    assert_eq!(position.location, 0);
    assert_eq!(position.binding, 0);
    assert_eq!(position.offset, 0);
    assert_eq!(position.format, Format::R32G32B32_SFLOAT);
    let uv = &info.vertex_input_attributes[1];
    assert_eq!(uv.location, 1);
    assert_eq!(uv.offset, 12);
    assert_eq!(uv.format, Format::R32G32_SFLOAT);
    assert_eq!(info.vertex_binding_stride, 20);
}

#[test]
fn builtins_are_not_vertex_inputs() {
    let spec = ShaderGroupSpec::new().with_stage(
        ShaderStage::Vertex,
        spirv::vertex_position_only(),
        "main",
    );
    let info = reflect_shader_group(&spec).unwrap();
    assert_eq!(info.vertex_input_attributes.len(), 1);
    assert_eq!(info.vertex_input_attributes[0].name, "position");
    assert_eq!(info.vertex_binding_stride, 12);
}

#[test]
fn descriptor_bindings_with_block_size() {
    let spec = ShaderGroupSpec::new().with_stage(
        ShaderStage::Vertex,
        spirv::stage_with_uniform_block(spirv::SC_UNIFORM, 0, 0, "CameraData"),
        "main",
    );
    let info = reflect_shader_group(&spec).unwrap();
    assert_eq!(info.descriptor_sets.len(), 1);
    let binding = &info.descriptor_sets[0][0];
    assert_eq!(binding.name, "CameraData");
    assert_eq!(binding.ty, ShaderResourceType::UniformBuffer);
    // mat4 at 0 + vec4 at 64
    assert_eq!(binding.block_size, 80);
    assert!(!binding.writable);
    assert_eq!(binding.stage_flags, ShaderStageFlags::VERTEX);
}

#[test]
fn storage_buffer_is_writable() {
    let spec = ShaderGroupSpec::new().with_stage(
        ShaderStage::Compute,
        spirv::stage_with_storage_buffer(0, 2, "Particles"),
        "main",
    );
    let info = reflect_shader_group(&spec).unwrap();
    let binding = &info.descriptor_sets[0][0];
    assert_eq!(binding.ty, ShaderResourceType::StorageBuffer);
    assert!(binding.writable);
    assert_eq!(binding.binding, 2);
}

#[test]
fn same_binding_across_stages_merges_stage_flags() {
    let spec = ShaderGroupSpec::new()
        .with_stage(
            ShaderStage::Vertex,
            spirv::stage_with_uniform_block(spirv::SC_UNIFORM, 0, 0, "CameraData"),
            "main",
        )
        .with_stage(
            ShaderStage::Fragment,
            spirv::stage_with_uniform_block(spirv::SC_UNIFORM, 0, 0, "CameraData"),
            "main",
        );
    let info = reflect_shader_group(&spec).unwrap();
    assert_eq!(info.descriptor_sets[0].len(), 1);
    assert_eq!(
        info.descriptor_sets[0][0].stage_flags,
        ShaderStageFlags::VERTEX | ShaderStageFlags::FRAGMENT
    );
}

#[test]
fn conflicting_binding_types_are_rejected() {
    // (set 0, binding 0) is a uniform block in the vertex stage and a
    // combined image sampler in the fragment stage
    let spec = ShaderGroupSpec::new()
        .with_stage(
            ShaderStage::Vertex,
            spirv::stage_with_uniform_block(spirv::SC_UNIFORM, 0, 0, "CameraData"),
            "main",
        )
        .with_stage(
            ShaderStage::Fragment,
            spirv::fragment_sampling(&[(0, 0, "albedo_tex")]),
            "main",
        );
    let err = reflect_shader_group(&spec).unwrap_err();
    match err {
        ReflectError::BindingConflict {
            stage,
            set,
            binding,
            existing,
            incoming,
            ..
        } => {
            assert_eq!(stage, ShaderStage::Fragment);
            assert_eq!(set, 0);
            assert_eq!(binding, 0);
            assert_eq!(existing, ShaderResourceType::UniformBuffer);
            assert_eq!(incoming, ShaderResourceType::SamplerWithTexture);
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[test]
fn push_constants_merge_across_stages() {
    let spec = ShaderGroupSpec::new()
        .with_stage(
            ShaderStage::Vertex,
            spirv::stage_with_push_constants("PushData"),
            "main",
        )
        .with_stage(
            ShaderStage::Fragment,
            spirv::stage_with_push_constants("PushData"),
            "main",
        );
    let info = reflect_shader_group(&spec).unwrap();
    let range = info.push_constants.unwrap();
    assert_eq!(range.name, "PushData");
    assert_eq!(range.size, 16);
    assert_eq!(
        range.stage_flags,
        ShaderStageFlags::VERTEX | ShaderStageFlags::FRAGMENT
    );
}

#[test]
fn mismatched_push_constants_are_rejected() {
    let spec = ShaderGroupSpec::new()
        .with_stage(
            ShaderStage::Vertex,
            spirv::stage_with_push_constants("PushData"),
            "main",
        )
        .with_stage(
            ShaderStage::Fragment,
            spirv::stage_with_push_constants("OtherPush"),
            "main",
        );
    assert!(matches!(
        reflect_shader_group(&spec),
        Err(ReflectError::PushConstantMismatch { .. })
    ));
}

#[test]
fn spec_constants_accumulate_stages() {
    let spec = ShaderGroupSpec::new()
        .with_stage(
            ShaderStage::Vertex,
            spirv::stage_with_spec_constant(3, 8, "LIGHT_COUNT"),
            "main",
        )
        .with_stage(
            ShaderStage::Fragment,
            spirv::stage_with_spec_constant(3, 8, "LIGHT_COUNT"),
            "main",
        );
    let info = reflect_shader_group(&spec).unwrap();
    assert_eq!(info.specialization_constants.len(), 1);
    let constant = &info.specialization_constants[0];
    assert_eq!(constant.constant_id, 3);
    assert_eq!(constant.default, SpecConstantValue::Int(8));
    assert_eq!(
        constant.stage_flags,
        ShaderStageFlags::VERTEX | ShaderStageFlags::FRAGMENT
    );
}

#[test]
fn reflection_is_deterministic() {
    let make = || {
        ShaderGroupSpec::new()
            .with_stage(ShaderStage::Vertex, spirv::vertex_position_uv(), "main")
            .with_stage(
                ShaderStage::Fragment,
                spirv::fragment_sampling(&[(0, 1, "albedo_tex"), (0, 0, "normal_tex")]),
                "main",
            )
    };
    let a = reflect_shader_group(&make()).unwrap();
    let b = reflect_shader_group(&make()).unwrap();
    assert_eq!(format!("{:?}", a), format!("{:?}", b));
    // canonical ordering within a set is by binding index
    assert_eq!(a.descriptor_sets[0][0].binding, 0);
    assert_eq!(a.descriptor_sets[0][1].binding, 1);
    assert_eq!(a.group_hash, b.group_hash);
}
