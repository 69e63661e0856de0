//! Builds a [`ShaderGroupInfo`] from a shader group's SPIR-V.
//!
//! Reflection runs per stage and merges the results: descriptor bindings
//! merge by (set, binding), the push constant block merges by identity,
//! specialization constants merge by constant id. Vertex inputs come from
//! the vertex stage only.

use super::*;
use crate::error::ReflectError;
use ember_spirv::ast::{ModuleAst, SpecConstantDefault, VariableInfo};
use ember_spirv::{
    block_byte_size, BlockLayout, Decoration, Dim, Module, PrimitiveType, StorageClass, TypeDesc,
};

/// Reflects every stage of `spec` and merges them into one group description.
pub fn reflect_shader_group(spec: &ShaderGroupSpec) -> Result<ShaderGroupInfo, ReflectError> {
    let mut info = ShaderGroupInfo {
        group_hash: spec.group_hash(),
        ..ShaderGroupInfo::default()
    };

    for stage in ShaderStage::ALL {
        let Some(spirv) = spec.stage(stage) else {
            continue;
        };
        info.stage_flags |= stage.flag();

        let module = Module::from_bytes(&spirv.code)
            .map_err(|source| ReflectError::Parse { stage, source })?;
        let ast = ModuleAst::build(&module);

        for var in ast.variables() {
            match var.storage_class {
                StorageClass::UniformConstant
                | StorageClass::Uniform
                | StorageClass::StorageBuffer => {
                    if let Some(resource) = reflect_binding(stage, &ast, var)? {
                        merge_or_add_resource(stage, resource, &mut info.descriptor_sets)?;
                    }
                }
                StorageClass::PushConstant => {
                    reflect_push_constants(stage, &ast, var, &mut info.push_constants)?;
                }
                _ => {}
            }
        }

        if stage == ShaderStage::Vertex {
            reflect_vertex_inputs(&ast, &mut info);
        }

        reflect_spec_constants(stage, &ast, &mut info.specialization_constants);
    }

    // canonical ordering, so identical bytecode reflects byte-identically
    for set in &mut info.descriptor_sets {
        set.sort_by_key(|r| r.binding);
    }
    info.specialization_constants
        .sort_by_key(|c| c.constant_id);

    Ok(info)
}

/// Classifies one interface variable into a descriptor binding, or `None`
/// for variables that are not descriptors at all.
fn reflect_binding(
    stage: ShaderStage,
    ast: &ModuleAst,
    var: &VariableInfo,
) -> Result<Option<ShaderResource>, ReflectError> {
    let set = ast
        .decoration(var.id, Decoration::DescriptorSet)
        .and_then(|p| p.first().copied())
        .unwrap_or(0);
    let binding = ast
        .decoration(var.id, Decoration::Binding)
        .and_then(|p| p.first().copied())
        .unwrap_or(0);

    let pointee_id = ast.pointee_type_id(var.type_id);
    let (base, array_size) = var.ty.deref().strip_arrays();

    let (ty, writable) = match base {
        TypeDesc::Sampler => (ShaderResourceType::Sampler, false),
        TypeDesc::SampledImage(image) => match &**image {
            TypeDesc::Image {
                dim: Dim::DimBuffer,
                ..
            } => (ShaderResourceType::UniformTexelBuffer, false),
            _ => (ShaderResourceType::SamplerWithTexture, false),
        },
        TypeDesc::Image { dim, sampled, .. } => match (dim, sampled) {
            (Dim::DimBuffer, Some(true)) => (ShaderResourceType::UniformTexelBuffer, false),
            (Dim::DimBuffer, _) => (ShaderResourceType::StorageTexelBuffer, true),
            (Dim::DimSubpassData, _) => (ShaderResourceType::InputAttachment, false),
            (_, Some(false)) => (ShaderResourceType::StorageImage, true),
            _ => (ShaderResourceType::Texture, false),
        },
        TypeDesc::Struct(_) => {
            let storage = var.storage_class == StorageClass::StorageBuffer
                || ast.has_decoration(pointee_id, Decoration::BufferBlock);
            if storage {
                (ShaderResourceType::StorageBuffer, true)
            } else {
                (ShaderResourceType::UniformBuffer, false)
            }
        }
        TypeDesc::Unknown => {
            return Err(ReflectError::UnsupportedDescriptor {
                stage,
                set,
                binding,
                reason: "unrecognized descriptor type (acceleration structures \
                         and extension descriptors are not supported)",
            });
        }
        // inputs/outputs and plain values reach here; not descriptors
        _ => return Ok(None),
    };

    let block_size = match ty {
        ShaderResourceType::UniformBuffer => block_byte_size(base, BlockLayout::Std140),
        ShaderResourceType::StorageBuffer => block_byte_size(base, BlockLayout::Std430),
        _ => 0,
    };

    // a NonWritable on the variable or its block type makes the binding
    // read-only even for storage classes
    let writable = writable
        && !ast.has_decoration(var.id, Decoration::NonWritable)
        && !ast.has_decoration(pointee_id, Decoration::NonWritable);

    // blocks are usually named by their type, not the (often empty) variable
    let name = var
        .name
        .clone()
        .filter(|n| !n.is_empty())
        .or_else(|| ast.name(pointee_id).map(str::to_owned))
        .unwrap_or_default();

    Ok(Some(ShaderResource {
        name,
        ty,
        set,
        binding,
        array_size,
        block_size,
        writable,
        stage_flags: stage.flag(),
    }))
}

/// Per-(set, binding) merge: identical declarations accumulate stage flags,
/// conflicting ones fail with the location identified.
fn merge_or_add_resource(
    stage: ShaderStage,
    resource: ShaderResource,
    sets: &mut Vec<Vec<ShaderResource>>,
) -> Result<(), ReflectError> {
    let set_index = resource.set as usize;
    if sets.len() <= set_index {
        sets.resize_with(set_index + 1, Vec::new);
    }

    if let Some(existing) = sets[set_index]
        .iter_mut()
        .find(|r| r.binding == resource.binding)
    {
        let existing_ty = existing.ty;
        let conflict = |what| ReflectError::BindingConflict {
            stage,
            set: resource.set,
            binding: resource.binding,
            existing: existing_ty,
            incoming: resource.ty,
            what,
        };
        if existing.ty != resource.ty {
            return Err(conflict("type"));
        }
        if existing.array_size != resource.array_size {
            return Err(conflict("array size"));
        }
        if existing.block_size != resource.block_size {
            return Err(conflict("block size"));
        }
        existing.stage_flags |= resource.stage_flags;
        existing.writable &= resource.writable;
        return Ok(());
    }

    sets[set_index].push(resource);
    Ok(())
}

fn reflect_push_constants(
    stage: ShaderStage,
    ast: &ModuleAst,
    var: &VariableInfo,
    out: &mut Option<PushConstantRange>,
) -> Result<(), ReflectError> {
    let pointee_id = ast.pointee_type_id(var.type_id);
    let size = block_byte_size(var.ty.deref(), BlockLayout::Std430);
    let name = ast
        .name(pointee_id)
        .map(str::to_owned)
        .or_else(|| var.name.clone())
        .unwrap_or_default();

    match out {
        None => {
            *out = Some(PushConstantRange {
                name,
                size,
                stage_flags: stage.flag(),
            });
            Ok(())
        }
        Some(range) if range.stage_flags.contains(stage.flag()) => {
            // two blocks in one stage
            Err(ReflectError::MultiplePushConstantBlocks { stage })
        }
        Some(range) if range.size == size && range.name == name => {
            range.stage_flags |= stage.flag();
            Ok(())
        }
        Some(range) => Err(ReflectError::PushConstantMismatch {
            stage,
            name,
            size,
            other_name: range.name.clone(),
            other_size: range.size,
        }),
    }
}

fn reflect_vertex_inputs(ast: &ModuleAst, info: &mut ShaderGroupInfo) {
    let mut inputs: Vec<(&VariableInfo, u32)> = Vec::new();
    for var in ast.variables() {
        if var.storage_class != StorageClass::Input {
            continue;
        }
        // built-ins never occupy a vertex binding slot
        if var.name.as_deref().map_or(false, |n| n.starts_with("gl_")) {
            continue;
        }
        if ast.has_decoration(var.id, Decoration::BuiltIn) {
            continue;
        }
        let location = ast
            .decoration(var.id, Decoration::Location)
            .and_then(|p| p.first().copied())
            .unwrap_or(0);
        inputs.push((var, location));
    }
    inputs.sort_by_key(|&(_, location)| location);

    // attributes pack into binding 0; each offset is the running sum of the
    // preceding attribute sizes
    let mut offset = 0u32;
    for (var, location) in inputs {
        let ty = var.ty.deref();
        let (size, format) = attribute_format(ty);
        info.vertex_input_attributes.push(VertexInputAttribute {
            name: var.name.clone().unwrap_or_default(),
            location,
            binding: 0,
            offset,
            format,
        });
        offset += size;
    }
    info.vertex_binding_stride = offset;
}

fn attribute_format(ty: &TypeDesc) -> (u32, Format) {
    let (prim, count) = match ty {
        TypeDesc::Primitive(p) => (*p, 1u8),
        TypeDesc::Vector(p, n) => (*p, *n),
        // matrices and exotic attribute types fall back to a vec4 slot
        _ => (PrimitiveType::Float, 4),
    };
    let size = prim.byte_width() as u32 * count as u32;
    let format = match (prim, count) {
        (PrimitiveType::Float, 1) => Format::R32_SFLOAT,
        (PrimitiveType::Float, 2) => Format::R32G32_SFLOAT,
        (PrimitiveType::Float, 3) => Format::R32G32B32_SFLOAT,
        (PrimitiveType::Float, _) => Format::R32G32B32A32_SFLOAT,
        (PrimitiveType::Int, 1) => Format::R32_SINT,
        (PrimitiveType::Int, 2) => Format::R32G32_SINT,
        (PrimitiveType::Int, 3) => Format::R32G32B32_SINT,
        (PrimitiveType::Int, _) => Format::R32G32B32A32_SINT,
        (PrimitiveType::UnsignedInt, 1) => Format::R32_UINT,
        (PrimitiveType::UnsignedInt, 2) => Format::R32G32_UINT,
        (PrimitiveType::UnsignedInt, 3) => Format::R32G32B32_UINT,
        (PrimitiveType::UnsignedInt, _) => Format::R32G32B32A32_UINT,
        _ => Format::R32G32B32A32_SFLOAT,
    };
    (size, format)
}

fn reflect_spec_constants(
    stage: ShaderStage,
    ast: &ModuleAst,
    out: &mut Vec<SpecializationConstant>,
) {
    for sc in ast.spec_constants() {
        let default = match sc.default {
            SpecConstantDefault::Bool(v) => SpecConstantValue::Bool(v),
            SpecConstantDefault::Int(v) => SpecConstantValue::Int(v),
            SpecConstantDefault::Float(v) => SpecConstantValue::Float(v),
        };
        if let Some(existing) = out.iter_mut().find(|c| c.constant_id == sc.spec_id) {
            // disagreement across stages is reported but not fatal; the
            // first declaration wins
            if std::mem::discriminant(&existing.default) != std::mem::discriminant(&default) {
                log::error!(
                    "specialization constant id={} declared with different types across stages",
                    sc.spec_id
                );
            } else if existing.default != default {
                log::error!(
                    "specialization constant id={} declared with different default values \
                     across stages",
                    sc.spec_id
                );
            }
            existing.stage_flags |= stage.flag();
        } else {
            out.push(SpecializationConstant {
                constant_id: sc.spec_id,
                name: sc.name.clone().unwrap_or_default(),
                default,
                stage_flags: stage.flag(),
            });
        }
    }
}
