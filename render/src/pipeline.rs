//! Pipeline state objects and create-time pipeline descriptions.
//!
//! Every state struct here is `Eq + Hash` so that the full pipeline state
//! can serve as a cache key; floating point fields go through `NotNan`.

use crate::handle::{RenderPassHandle, ShaderHandle};
use crate::texture::CompareOp;
use crate::vertex::VertexInputState;
use bitflags::bitflags;
use ordered_float::NotNan;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum PrimitiveTopology {
    PointList,
    LineList,
    LineStrip,
    TriangleList,
    TriangleStrip,
    TriangleFan,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum PolygonMode {
    Fill,
    Line,
    Point,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum CullMode {
    None,
    Front,
    Back,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum FrontFace {
    CounterClockwise,
    Clockwise,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct InputAssemblyState {
    pub topology: PrimitiveTopology,
    pub primitive_restart_enable: bool,
}

impl Default for InputAssemblyState {
    fn default() -> Self {
        InputAssemblyState {
            topology: PrimitiveTopology::TriangleList,
            primitive_restart_enable: false,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct DepthBias {
    pub constant_factor: NotNan<f32>,
    pub clamp: NotNan<f32>,
    pub slope_factor: NotNan<f32>,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct RasterizationState {
    pub polygon_mode: PolygonMode,
    pub cull_mode: CullMode,
    pub front_face: FrontFace,
    pub depth_clamp_enable: bool,
    pub rasterizer_discard_enable: bool,
    pub depth_bias: Option<DepthBias>,
    pub line_width: NotNan<f32>,
}

impl Default for RasterizationState {
    fn default() -> Self {
        RasterizationState {
            polygon_mode: PolygonMode::Fill,
            cull_mode: CullMode::Back,
            front_face: FrontFace::CounterClockwise,
            depth_clamp_enable: false,
            rasterizer_discard_enable: false,
            depth_bias: None,
            line_width: NotNan::new(1.0).unwrap(),
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum StencilOp {
    Keep,
    Zero,
    Replace,
    IncrementAndClamp,
    DecrementAndClamp,
    Invert,
    IncrementAndWrap,
    DecrementAndWrap,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct StencilOpState {
    pub fail_op: StencilOp,
    pub pass_op: StencilOp,
    pub depth_fail_op: StencilOp,
    pub compare_op: CompareOp,
}

impl Default for StencilOpState {
    fn default() -> Self {
        StencilOpState {
            fail_op: StencilOp::Keep,
            pass_op: StencilOp::Keep,
            depth_fail_op: StencilOp::Keep,
            compare_op: CompareOp::Always,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct DepthStencilState {
    pub depth_test_enable: bool,
    pub depth_write_enable: bool,
    pub depth_compare_op: CompareOp,
    pub depth_bounds_test_enable: bool,
    pub stencil_test_enable: bool,
    pub front: StencilOpState,
    pub back: StencilOpState,
}

impl Default for DepthStencilState {
    fn default() -> Self {
        DepthStencilState {
            depth_test_enable: true,
            depth_write_enable: true,
            depth_compare_op: CompareOp::LessOrEqual,
            depth_bounds_test_enable: false,
            stencil_test_enable: false,
            front: StencilOpState::default(),
            back: StencilOpState::default(),
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum BlendFactor {
    Zero,
    One,
    SrcColor,
    OneMinusSrcColor,
    DstColor,
    OneMinusDstColor,
    SrcAlpha,
    OneMinusSrcAlpha,
    DstAlpha,
    OneMinusDstAlpha,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum BlendOp {
    Add,
    Subtract,
    ReverseSubtract,
    Min,
    Max,
}

bitflags! {
    pub struct ColorComponentFlags: u32 {
        const R = 1 << 0;
        const G = 1 << 1;
        const B = 1 << 2;
        const A = 1 << 3;
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct ColorBlendAttachment {
    pub blend_enable: bool,
    pub src_color_blend_factor: BlendFactor,
    pub dst_color_blend_factor: BlendFactor,
    pub color_blend_op: BlendOp,
    pub src_alpha_blend_factor: BlendFactor,
    pub dst_alpha_blend_factor: BlendFactor,
    pub alpha_blend_op: BlendOp,
    pub color_write_mask: ColorComponentFlags,
}

impl Default for ColorBlendAttachment {
    fn default() -> Self {
        ColorBlendAttachment {
            blend_enable: false,
            src_color_blend_factor: BlendFactor::One,
            dst_color_blend_factor: BlendFactor::Zero,
            color_blend_op: BlendOp::Add,
            src_alpha_blend_factor: BlendFactor::One,
            dst_alpha_blend_factor: BlendFactor::Zero,
            alpha_blend_op: BlendOp::Add,
            color_write_mask: ColorComponentFlags::all(),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct ColorBlendState {
    pub attachments: Vec<ColorBlendAttachment>,
    pub blend_constants: [NotNan<f32>; 4],
}

impl Default for ColorBlendState {
    fn default() -> Self {
        ColorBlendState {
            attachments: vec![ColorBlendAttachment::default()],
            blend_constants: [NotNan::new(0.0).unwrap(); 4],
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct MultisampleState {
    pub rasterization_samples: u32,
    pub sample_shading_enable: bool,
    pub min_sample_shading: NotNan<f32>,
    pub alpha_to_coverage_enable: bool,
    pub alpha_to_one_enable: bool,
}

impl Default for MultisampleState {
    fn default() -> Self {
        MultisampleState {
            rasterization_samples: 1,
            sample_shading_enable: false,
            min_sample_shading: NotNan::new(0.0).unwrap(),
            alpha_to_coverage_enable: false,
            alpha_to_one_enable: false,
        }
    }
}

/// States that are set on the command list instead of baked into the
/// pipeline.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum DynamicState {
    Viewport,
    Scissor,
    DepthBias,
    LineWidth,
    BlendConstants,
}

/// The full fixed-function state of a graphics pipeline.
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct GraphicsPipelineState {
    pub vertex_input: VertexInputState,
    pub input_assembly: InputAssemblyState,
    pub rasterization: RasterizationState,
    pub depth_stencil: DepthStencilState,
    pub color_blend: ColorBlendState,
    pub multisample: MultisampleState,
    pub dynamic_states: Vec<DynamicState>,
}

impl GraphicsPipelineState {
    /// The graph's default state: dynamic viewport/scissor, one blend
    /// attachment per color target.
    pub fn with_color_attachment_count(count: usize) -> GraphicsPipelineState {
        GraphicsPipelineState {
            color_blend: ColorBlendState {
                attachments: vec![ColorBlendAttachment::default(); count],
                ..ColorBlendState::default()
            },
            dynamic_states: vec![DynamicState::Viewport, DynamicState::Scissor],
            ..GraphicsPipelineState::default()
        }
    }
}

/// Specialization constant values applied at pipeline build time, keyed by
/// constant id.
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct SpecializationState {
    pub entries: Vec<(u32, Vec<u8>)>,
}

impl SpecializationState {
    pub fn set_u32(&mut self, constant_id: u32, value: u32) {
        self.entries.push((constant_id, value.to_le_bytes().to_vec()));
    }
}

/// Create-time description of a graphics pipeline; also its cache key
/// together with the shader group.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct GraphicsPipelineSpec {
    pub shader: ShaderHandle,
    pub render_pass: RenderPassHandle,
    pub subpass: u32,
    pub state: GraphicsPipelineState,
    pub specialization: SpecializationState,
}

#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct ComputePipelineSpec {
    pub shader: ShaderHandle,
    pub specialization: SpecializationState,
}

/// Either flavor of pipeline.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub enum PipelineSpec {
    Graphics(GraphicsPipelineSpec),
    Compute(ComputePipelineSpec),
}

/// A viewport rectangle with depth range, in framebuffer pixels.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub min_depth: f32,
    pub max_depth: f32,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct ScissorRect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}
