//! Shader groups: per-stage SPIR-V bundles and their reflected description.

mod reflect;

pub use self::reflect::reflect_shader_group;

use crate::format::Format;
use bitflags::bitflags;
use fxhash::FxHasher;
use std::hash::Hasher;

/// A single pipeline stage a shader module can target.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum ShaderStage {
    Vertex,
    TessellationControl,
    TessellationEvaluation,
    Geometry,
    Fragment,
    Compute,
}

impl ShaderStage {
    pub const ALL: [ShaderStage; 6] = [
        ShaderStage::Vertex,
        ShaderStage::TessellationControl,
        ShaderStage::TessellationEvaluation,
        ShaderStage::Geometry,
        ShaderStage::Fragment,
        ShaderStage::Compute,
    ];

    pub fn flag(self) -> ShaderStageFlags {
        match self {
            ShaderStage::Vertex => ShaderStageFlags::VERTEX,
            ShaderStage::TessellationControl => ShaderStageFlags::TESSELLATION_CONTROL,
            ShaderStage::TessellationEvaluation => ShaderStageFlags::TESSELLATION_EVALUATION,
            ShaderStage::Geometry => ShaderStageFlags::GEOMETRY,
            ShaderStage::Fragment => ShaderStageFlags::FRAGMENT,
            ShaderStage::Compute => ShaderStageFlags::COMPUTE,
        }
    }

    fn index(self) -> usize {
        match self {
            ShaderStage::Vertex => 0,
            ShaderStage::TessellationControl => 1,
            ShaderStage::TessellationEvaluation => 2,
            ShaderStage::Geometry => 3,
            ShaderStage::Fragment => 4,
            ShaderStage::Compute => 5,
        }
    }
}

bitflags! {
    pub struct ShaderStageFlags: u32 {
        const VERTEX                  = 1 << 0;
        const TESSELLATION_CONTROL    = 1 << 1;
        const TESSELLATION_EVALUATION = 1 << 2;
        const GEOMETRY                = 1 << 3;
        const FRAGMENT                = 1 << 4;
        const COMPUTE                 = 1 << 5;
    }
}

impl Default for ShaderStageFlags {
    fn default() -> ShaderStageFlags {
        ShaderStageFlags::empty()
    }
}

/// The bytecode of one stage plus its entry point name.
#[derive(Clone, Debug)]
pub struct StageSpirv {
    pub code: Vec<u8>,
    pub entry_point: String,
}

/// A shader group: one SPIR-V module per participating stage.
#[derive(Clone, Debug, Default)]
pub struct ShaderGroupSpec {
    stages: [Option<StageSpirv>; 6],
}

impl ShaderGroupSpec {
    pub fn new() -> ShaderGroupSpec {
        ShaderGroupSpec::default()
    }

    pub fn with_stage(
        mut self,
        stage: ShaderStage,
        code: Vec<u8>,
        entry_point: &str,
    ) -> ShaderGroupSpec {
        self.stages[stage.index()] = Some(StageSpirv {
            code,
            entry_point: entry_point.to_owned(),
        });
        self
    }

    /// Vertex + fragment with the conventional `main` entry points.
    pub fn graphics(vertex: Vec<u8>, fragment: Vec<u8>) -> ShaderGroupSpec {
        ShaderGroupSpec::new()
            .with_stage(ShaderStage::Vertex, vertex, "main")
            .with_stage(ShaderStage::Fragment, fragment, "main")
    }

    pub fn compute(code: Vec<u8>) -> ShaderGroupSpec {
        ShaderGroupSpec::new().with_stage(ShaderStage::Compute, code, "main")
    }

    pub fn stage(&self, stage: ShaderStage) -> Option<&StageSpirv> {
        self.stages[stage.index()].as_ref()
    }

    pub fn stage_flags(&self) -> ShaderStageFlags {
        let mut flags = ShaderStageFlags::empty();
        for stage in ShaderStage::ALL {
            if self.stage(stage).is_some() {
                flags |= stage.flag();
            }
        }
        flags
    }

    /// Stable hash over all stage bytecodes; two groups with identical
    /// bytecode share one pipeline layout.
    pub fn group_hash(&self) -> u64 {
        let mut hasher = FxHasher::default();
        for stage in ShaderStage::ALL {
            if let Some(spirv) = self.stage(stage) {
                hasher.write_u32(stage.index() as u32);
                hasher.write(&spirv.code);
            }
        }
        hasher.finish()
    }
}

/// The kind of resource a (set, binding) slot refers to.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum ShaderResourceType {
    Sampler,
    SamplerWithTexture,
    Texture,
    StorageImage,
    UniformTexelBuffer,
    StorageTexelBuffer,
    UniformBuffer,
    StorageBuffer,
    InputAttachment,
}

/// One reflected descriptor binding, merged across stages.
#[derive(Clone, Debug, PartialEq)]
pub struct ShaderResource {
    pub name: String,
    pub ty: ShaderResourceType,
    pub set: u32,
    pub binding: u32,
    /// Product of the array dimensions for image-like bindings; 1 otherwise.
    pub array_size: u32,
    /// Byte size of the block for buffer bindings; 0 otherwise.
    pub block_size: u32,
    pub writable: bool,
    pub stage_flags: ShaderStageFlags,
}

/// One reflected vertex input attribute. All attributes share binding 0;
/// offsets are the running sum of prior attribute sizes.
#[derive(Clone, Debug, PartialEq)]
pub struct VertexInputAttribute {
    pub name: String,
    pub location: u32,
    pub binding: u32,
    pub offset: u32,
    pub format: Format,
}

/// The single push constant range of a shader group.
#[derive(Clone, Debug, PartialEq)]
pub struct PushConstantRange {
    pub name: String,
    pub size: u32,
    pub stage_flags: ShaderStageFlags,
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum SpecConstantValue {
    Bool(bool),
    Int(i32),
    Float(f32),
}

/// One specialization constant; later stages must agree on type and default.
#[derive(Clone, Debug, PartialEq)]
pub struct SpecializationConstant {
    pub constant_id: u32,
    pub name: String,
    pub default: SpecConstantValue,
    pub stage_flags: ShaderStageFlags,
}

/// Everything reflection knows about a shader group.
#[derive(Clone, Debug, Default)]
pub struct ShaderGroupInfo {
    pub stage_flags: ShaderStageFlags,
    pub vertex_input_attributes: Vec<VertexInputAttribute>,
    pub vertex_binding_stride: u32,
    pub push_constants: Option<PushConstantRange>,
    pub specialization_constants: Vec<SpecializationConstant>,
    /// Nested by set index; bindings within a set are sorted by binding.
    pub descriptor_sets: Vec<Vec<ShaderResource>>,
    /// Hash over all stage bytecodes; pipeline-layout cache key.
    pub group_hash: u64,
}

impl ShaderGroupInfo {
    /// Logs the reflected interface at info level; handy when bringing up a
    /// new shader group.
    pub fn log_summary(&self) {
        log::info!("shader group {:#018x}: stages {:?}", self.group_hash, self.stage_flags);
        if let Some(range) = &self.push_constants {
            log::info!(
                "  push constants: name={:?} size={} stages={:?}",
                range.name,
                range.size,
                range.stage_flags
            );
        }
        for (set_index, set) in self.descriptor_sets.iter().enumerate() {
            for resource in set {
                log::info!(
                    "  srd set={} binding={} name={:?} type={:?} array={} block={} stages={:?}",
                    set_index,
                    resource.binding,
                    resource.name,
                    resource.ty,
                    resource.array_size,
                    resource.block_size,
                    resource.stage_flags
                );
            }
        }
        for attr in &self.vertex_input_attributes {
            log::info!(
                "  vertex input name={:?} location={} offset={} format={:?}",
                attr.name,
                attr.location,
                attr.offset,
                attr.format
            );
        }
        if self.vertex_binding_stride != 0 {
            log::info!("  vertex binding stride={}", self.vertex_binding_stride);
        }
        for constant in &self.specialization_constants {
            log::info!(
                "  spec constant id={} name={:?} default={:?} stages={:?}",
                constant.constant_id,
                constant.name,
                constant.default,
                constant.stage_flags
            );
        }
    }
}
