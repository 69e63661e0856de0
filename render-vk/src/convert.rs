//! Conversions between portable descriptions and Vulkan enums and flags.

use ash::vk;
use ember_render::buffer::BufferUsage;
use ember_render::pipeline::{
    BlendFactor, BlendOp, ColorComponentFlags, CullMode, FrontFace, PolygonMode,
    PrimitiveTopology, StencilOp, StencilOpState,
};
use ember_render::renderpass::{LoadOp, StoreOp};
use ember_render::shader::{ShaderStage, ShaderStageFlags};
use ember_render::sync::PipelineStageFlags;
use ember_render::texture::{
    BorderColor, CompareOp, Filter, SamplerAddressMode, SamplerMipmapMode, TextureLayout,
    TextureUsage,
};
use ember_render::Format;

pub fn format(format: Format) -> vk::Format {
    use Format::*;
    match format {
        UNDEFINED => vk::Format::UNDEFINED,
        R8_UNORM => vk::Format::R8_UNORM,
        R8_SNORM => vk::Format::R8_SNORM,
        R8_UINT => vk::Format::R8_UINT,
        R8_SINT => vk::Format::R8_SINT,
        R8G8_UNORM => vk::Format::R8G8_UNORM,
        R8G8B8A8_UNORM => vk::Format::R8G8B8A8_UNORM,
        R8G8B8A8_SNORM => vk::Format::R8G8B8A8_SNORM,
        R8G8B8A8_UINT => vk::Format::R8G8B8A8_UINT,
        R8G8B8A8_SINT => vk::Format::R8G8B8A8_SINT,
        R8G8B8A8_SRGB => vk::Format::R8G8B8A8_SRGB,
        B8G8R8A8_UNORM => vk::Format::B8G8R8A8_UNORM,
        B8G8R8A8_SRGB => vk::Format::B8G8R8A8_SRGB,
        R10G10B10A2_UNORM => vk::Format::A2B10G10R10_UNORM_PACK32,
        R16_SFLOAT => vk::Format::R16_SFLOAT,
        R16G16_SFLOAT => vk::Format::R16G16_SFLOAT,
        R16G16B16A16_SFLOAT => vk::Format::R16G16B16A16_SFLOAT,
        R32_SFLOAT => vk::Format::R32_SFLOAT,
        R32_UINT => vk::Format::R32_UINT,
        R32_SINT => vk::Format::R32_SINT,
        R32G32_SFLOAT => vk::Format::R32G32_SFLOAT,
        R32G32B32_SFLOAT => vk::Format::R32G32B32_SFLOAT,
        R32G32B32A32_SFLOAT => vk::Format::R32G32B32A32_SFLOAT,
        R32G32_UINT => vk::Format::R32G32_UINT,
        R32G32B32_UINT => vk::Format::R32G32B32_UINT,
        R32G32B32A32_UINT => vk::Format::R32G32B32A32_UINT,
        R32G32_SINT => vk::Format::R32G32_SINT,
        R32G32B32_SINT => vk::Format::R32G32B32_SINT,
        R32G32B32A32_SINT => vk::Format::R32G32B32A32_SINT,
        D16_UNORM => vk::Format::D16_UNORM,
        D32_SFLOAT => vk::Format::D32_SFLOAT,
        D24_UNORM_S8_UINT => vk::Format::D24_UNORM_S8_UINT,
        D32_SFLOAT_S8_UINT => vk::Format::D32_SFLOAT_S8_UINT,
    }
}

pub fn from_vk_format(format: vk::Format) -> Format {
    match format {
        vk::Format::R8G8B8A8_UNORM => Format::R8G8B8A8_UNORM,
        vk::Format::R8G8B8A8_SRGB => Format::R8G8B8A8_SRGB,
        vk::Format::B8G8R8A8_UNORM => Format::B8G8R8A8_UNORM,
        vk::Format::B8G8R8A8_SRGB => Format::B8G8R8A8_SRGB,
        _ => Format::UNDEFINED,
    }
}

pub fn aspect_mask(format: Format) -> vk::ImageAspectFlags {
    if format.is_depth() {
        if format.has_stencil() {
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        } else {
            vk::ImageAspectFlags::DEPTH
        }
    } else {
        vk::ImageAspectFlags::COLOR
    }
}

pub fn texture_usage(usage: TextureUsage) -> vk::ImageUsageFlags {
    let mut flags = vk::ImageUsageFlags::empty();
    if usage.contains(TextureUsage::SAMPLED) {
        flags |= vk::ImageUsageFlags::SAMPLED;
    }
    if usage.contains(TextureUsage::STORAGE) {
        flags |= vk::ImageUsageFlags::STORAGE;
    }
    if usage.contains(TextureUsage::COLOR_ATTACHMENT) {
        flags |= vk::ImageUsageFlags::COLOR_ATTACHMENT;
    }
    if usage.contains(TextureUsage::DEPTH_STENCIL_ATTACHMENT) {
        flags |= vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT;
    }
    if usage.contains(TextureUsage::INPUT_ATTACHMENT) {
        flags |= vk::ImageUsageFlags::INPUT_ATTACHMENT;
    }
    if usage.contains(TextureUsage::TRANSFER_SRC) {
        flags |= vk::ImageUsageFlags::TRANSFER_SRC;
    }
    if usage.contains(TextureUsage::TRANSFER_DST) {
        flags |= vk::ImageUsageFlags::TRANSFER_DST;
    }
    flags
}

/// Layout an image occupies while used exactly one way; multi-bit usages
/// resolve through the same priority order the core uses.
pub fn texture_usage_layout(usage: TextureUsage) -> vk::ImageLayout {
    texture_layout(usage.image_layout())
}

pub fn texture_layout(layout: TextureLayout) -> vk::ImageLayout {
    match layout {
        TextureLayout::Undefined => vk::ImageLayout::UNDEFINED,
        TextureLayout::General => vk::ImageLayout::GENERAL,
        TextureLayout::ColorAttachment => vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        TextureLayout::DepthStencilAttachment => {
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL
        }
        TextureLayout::DepthStencilReadOnly => vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL,
        TextureLayout::ShaderReadOnly => vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        TextureLayout::TransferSrc => vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
        TextureLayout::TransferDst => vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        TextureLayout::PresentSrc => vk::ImageLayout::PRESENT_SRC_KHR,
    }
}

pub fn texture_usage_access(usage: TextureUsage) -> vk::AccessFlags {
    let mut access = vk::AccessFlags::empty();
    if usage.contains(TextureUsage::SAMPLED) || usage.contains(TextureUsage::INPUT_ATTACHMENT) {
        access |= vk::AccessFlags::SHADER_READ;
    }
    if usage.contains(TextureUsage::STORAGE) {
        access |= vk::AccessFlags::SHADER_READ | vk::AccessFlags::SHADER_WRITE;
    }
    if usage.contains(TextureUsage::COLOR_ATTACHMENT) {
        access |= vk::AccessFlags::COLOR_ATTACHMENT_READ | vk::AccessFlags::COLOR_ATTACHMENT_WRITE;
    }
    if usage.contains(TextureUsage::DEPTH_STENCIL_ATTACHMENT) {
        access |= vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ
            | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE;
    }
    if usage.contains(TextureUsage::TRANSFER_SRC) {
        access |= vk::AccessFlags::TRANSFER_READ;
    }
    if usage.contains(TextureUsage::TRANSFER_DST) {
        access |= vk::AccessFlags::TRANSFER_WRITE;
    }
    access
}

pub fn buffer_usage(usage: BufferUsage) -> vk::BufferUsageFlags {
    let mut flags = vk::BufferUsageFlags::empty();
    if usage.contains(BufferUsage::TRANSFER_SRC) {
        flags |= vk::BufferUsageFlags::TRANSFER_SRC;
    }
    if usage.contains(BufferUsage::TRANSFER_DST) {
        flags |= vk::BufferUsageFlags::TRANSFER_DST;
    }
    if usage.contains(BufferUsage::VERTEX) {
        flags |= vk::BufferUsageFlags::VERTEX_BUFFER;
    }
    if usage.contains(BufferUsage::INDEX) {
        flags |= vk::BufferUsageFlags::INDEX_BUFFER;
    }
    if usage.contains(BufferUsage::UNIFORM) {
        flags |= vk::BufferUsageFlags::UNIFORM_BUFFER;
    }
    if usage.contains(BufferUsage::STORAGE) {
        flags |= vk::BufferUsageFlags::STORAGE_BUFFER;
    }
    if usage.contains(BufferUsage::INDIRECT) {
        flags |= vk::BufferUsageFlags::INDIRECT_BUFFER;
    }
    flags
}

pub fn buffer_usage_access(usage: BufferUsage) -> vk::AccessFlags {
    let mut access = vk::AccessFlags::empty();
    if usage.contains(BufferUsage::TRANSFER_SRC) {
        access |= vk::AccessFlags::TRANSFER_READ;
    }
    if usage.contains(BufferUsage::TRANSFER_DST) {
        access |= vk::AccessFlags::TRANSFER_WRITE;
    }
    if usage.contains(BufferUsage::VERTEX) {
        access |= vk::AccessFlags::VERTEX_ATTRIBUTE_READ;
    }
    if usage.contains(BufferUsage::INDEX) {
        access |= vk::AccessFlags::INDEX_READ;
    }
    if usage.contains(BufferUsage::UNIFORM) {
        access |= vk::AccessFlags::UNIFORM_READ;
    }
    if usage.contains(BufferUsage::STORAGE) {
        access |= vk::AccessFlags::SHADER_READ | vk::AccessFlags::SHADER_WRITE;
    }
    if usage.contains(BufferUsage::INDIRECT) {
        access |= vk::AccessFlags::INDIRECT_COMMAND_READ;
    }
    access
}

pub fn pipeline_stages(stages: PipelineStageFlags) -> vk::PipelineStageFlags {
    if stages.is_empty() {
        return vk::PipelineStageFlags::TOP_OF_PIPE;
    }
    let mut flags = vk::PipelineStageFlags::empty();
    let table = [
        (PipelineStageFlags::TOP_OF_PIPE, vk::PipelineStageFlags::TOP_OF_PIPE),
        (PipelineStageFlags::DRAW_INDIRECT, vk::PipelineStageFlags::DRAW_INDIRECT),
        (PipelineStageFlags::VERTEX_INPUT, vk::PipelineStageFlags::VERTEX_INPUT),
        (PipelineStageFlags::VERTEX_SHADER, vk::PipelineStageFlags::VERTEX_SHADER),
        (PipelineStageFlags::FRAGMENT_SHADER, vk::PipelineStageFlags::FRAGMENT_SHADER),
        (
            PipelineStageFlags::EARLY_FRAGMENT_TESTS,
            vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
        ),
        (
            PipelineStageFlags::LATE_FRAGMENT_TESTS,
            vk::PipelineStageFlags::LATE_FRAGMENT_TESTS,
        ),
        (
            PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
        ),
        (PipelineStageFlags::COMPUTE_SHADER, vk::PipelineStageFlags::COMPUTE_SHADER),
        (PipelineStageFlags::TRANSFER, vk::PipelineStageFlags::TRANSFER),
        (PipelineStageFlags::BOTTOM_OF_PIPE, vk::PipelineStageFlags::BOTTOM_OF_PIPE),
        (PipelineStageFlags::HOST, vk::PipelineStageFlags::HOST),
        (PipelineStageFlags::ALL_GRAPHICS, vk::PipelineStageFlags::ALL_GRAPHICS),
        (PipelineStageFlags::ALL_COMMANDS, vk::PipelineStageFlags::ALL_COMMANDS),
    ];
    for (portable, native) in table {
        if stages.contains(portable) {
            flags |= native;
        }
    }
    flags
}

pub fn shader_stage(stage: ShaderStage) -> vk::ShaderStageFlags {
    match stage {
        ShaderStage::Vertex => vk::ShaderStageFlags::VERTEX,
        ShaderStage::TessellationControl => vk::ShaderStageFlags::TESSELLATION_CONTROL,
        ShaderStage::TessellationEvaluation => vk::ShaderStageFlags::TESSELLATION_EVALUATION,
        ShaderStage::Geometry => vk::ShaderStageFlags::GEOMETRY,
        ShaderStage::Fragment => vk::ShaderStageFlags::FRAGMENT,
        ShaderStage::Compute => vk::ShaderStageFlags::COMPUTE,
    }
}

pub fn shader_stage_flags(stages: ShaderStageFlags) -> vk::ShaderStageFlags {
    let mut flags = vk::ShaderStageFlags::empty();
    for stage in ShaderStage::ALL {
        if stages.contains(stage.flag()) {
            flags |= shader_stage(stage);
        }
    }
    flags
}

pub fn load_op(op: LoadOp) -> vk::AttachmentLoadOp {
    match op {
        LoadOp::Load => vk::AttachmentLoadOp::LOAD,
        LoadOp::Clear => vk::AttachmentLoadOp::CLEAR,
        LoadOp::DontCare => vk::AttachmentLoadOp::DONT_CARE,
    }
}

pub fn store_op(op: StoreOp) -> vk::AttachmentStoreOp {
    match op {
        StoreOp::Store => vk::AttachmentStoreOp::STORE,
        StoreOp::DontCare => vk::AttachmentStoreOp::DONT_CARE,
    }
}

pub fn sample_count(samples: u32) -> vk::SampleCountFlags {
    match samples {
        2 => vk::SampleCountFlags::TYPE_2,
        4 => vk::SampleCountFlags::TYPE_4,
        8 => vk::SampleCountFlags::TYPE_8,
        16 => vk::SampleCountFlags::TYPE_16,
        _ => vk::SampleCountFlags::TYPE_1,
    }
}

pub fn filter(filter: Filter) -> vk::Filter {
    match filter {
        Filter::Nearest => vk::Filter::NEAREST,
        Filter::Linear => vk::Filter::LINEAR,
    }
}

pub fn mipmap_mode(mode: SamplerMipmapMode) -> vk::SamplerMipmapMode {
    match mode {
        SamplerMipmapMode::Nearest => vk::SamplerMipmapMode::NEAREST,
        SamplerMipmapMode::Linear => vk::SamplerMipmapMode::LINEAR,
    }
}

pub fn address_mode(mode: SamplerAddressMode) -> vk::SamplerAddressMode {
    match mode {
        SamplerAddressMode::Repeat => vk::SamplerAddressMode::REPEAT,
        SamplerAddressMode::MirroredRepeat => vk::SamplerAddressMode::MIRRORED_REPEAT,
        SamplerAddressMode::ClampToEdge => vk::SamplerAddressMode::CLAMP_TO_EDGE,
        SamplerAddressMode::ClampToBorder => vk::SamplerAddressMode::CLAMP_TO_BORDER,
    }
}

pub fn border_color(color: BorderColor) -> vk::BorderColor {
    match color {
        BorderColor::TransparentBlack => vk::BorderColor::FLOAT_TRANSPARENT_BLACK,
        BorderColor::OpaqueBlack => vk::BorderColor::FLOAT_OPAQUE_BLACK,
        BorderColor::OpaqueWhite => vk::BorderColor::FLOAT_OPAQUE_WHITE,
    }
}

pub fn compare_op(op: CompareOp) -> vk::CompareOp {
    match op {
        CompareOp::Never => vk::CompareOp::NEVER,
        CompareOp::Less => vk::CompareOp::LESS,
        CompareOp::Equal => vk::CompareOp::EQUAL,
        CompareOp::LessOrEqual => vk::CompareOp::LESS_OR_EQUAL,
        CompareOp::Greater => vk::CompareOp::GREATER,
        CompareOp::NotEqual => vk::CompareOp::NOT_EQUAL,
        CompareOp::GreaterOrEqual => vk::CompareOp::GREATER_OR_EQUAL,
        CompareOp::Always => vk::CompareOp::ALWAYS,
    }
}

pub fn primitive_topology(topology: PrimitiveTopology) -> vk::PrimitiveTopology {
    match topology {
        PrimitiveTopology::PointList => vk::PrimitiveTopology::POINT_LIST,
        PrimitiveTopology::LineList => vk::PrimitiveTopology::LINE_LIST,
        PrimitiveTopology::LineStrip => vk::PrimitiveTopology::LINE_STRIP,
        PrimitiveTopology::TriangleList => vk::PrimitiveTopology::TRIANGLE_LIST,
        PrimitiveTopology::TriangleStrip => vk::PrimitiveTopology::TRIANGLE_STRIP,
        PrimitiveTopology::TriangleFan => vk::PrimitiveTopology::TRIANGLE_FAN,
    }
}

pub fn polygon_mode(mode: PolygonMode) -> vk::PolygonMode {
    match mode {
        PolygonMode::Fill => vk::PolygonMode::FILL,
        PolygonMode::Line => vk::PolygonMode::LINE,
        PolygonMode::Point => vk::PolygonMode::POINT,
    }
}

pub fn cull_mode(mode: CullMode) -> vk::CullModeFlags {
    match mode {
        CullMode::None => vk::CullModeFlags::NONE,
        CullMode::Front => vk::CullModeFlags::FRONT,
        CullMode::Back => vk::CullModeFlags::BACK,
    }
}

pub fn front_face(face: FrontFace) -> vk::FrontFace {
    match face {
        FrontFace::CounterClockwise => vk::FrontFace::COUNTER_CLOCKWISE,
        FrontFace::Clockwise => vk::FrontFace::CLOCKWISE,
    }
}

pub fn stencil_op(op: StencilOp) -> vk::StencilOp {
    match op {
        StencilOp::Keep => vk::StencilOp::KEEP,
        StencilOp::Zero => vk::StencilOp::ZERO,
        StencilOp::Replace => vk::StencilOp::REPLACE,
        StencilOp::IncrementAndClamp => vk::StencilOp::INCREMENT_AND_CLAMP,
        StencilOp::DecrementAndClamp => vk::StencilOp::DECREMENT_AND_CLAMP,
        StencilOp::Invert => vk::StencilOp::INVERT,
        StencilOp::IncrementAndWrap => vk::StencilOp::INCREMENT_AND_WRAP,
        StencilOp::DecrementAndWrap => vk::StencilOp::DECREMENT_AND_WRAP,
    }
}

pub fn stencil_op_state(state: &StencilOpState) -> vk::StencilOpState {
    vk::StencilOpState {
        fail_op: stencil_op(state.fail_op),
        pass_op: stencil_op(state.pass_op),
        depth_fail_op: stencil_op(state.depth_fail_op),
        compare_op: compare_op(state.compare_op),
        compare_mask: !0,
        write_mask: !0,
        reference: 0,
    }
}

pub fn blend_factor(factor: BlendFactor) -> vk::BlendFactor {
    match factor {
        BlendFactor::Zero => vk::BlendFactor::ZERO,
        BlendFactor::One => vk::BlendFactor::ONE,
        BlendFactor::SrcColor => vk::BlendFactor::SRC_COLOR,
        BlendFactor::OneMinusSrcColor => vk::BlendFactor::ONE_MINUS_SRC_COLOR,
        BlendFactor::DstColor => vk::BlendFactor::DST_COLOR,
        BlendFactor::OneMinusDstColor => vk::BlendFactor::ONE_MINUS_DST_COLOR,
        BlendFactor::SrcAlpha => vk::BlendFactor::SRC_ALPHA,
        BlendFactor::OneMinusSrcAlpha => vk::BlendFactor::ONE_MINUS_SRC_ALPHA,
        BlendFactor::DstAlpha => vk::BlendFactor::DST_ALPHA,
        BlendFactor::OneMinusDstAlpha => vk::BlendFactor::ONE_MINUS_DST_ALPHA,
    }
}

pub fn blend_op(op: BlendOp) -> vk::BlendOp {
    match op {
        BlendOp::Add => vk::BlendOp::ADD,
        BlendOp::Subtract => vk::BlendOp::SUBTRACT,
        BlendOp::ReverseSubtract => vk::BlendOp::REVERSE_SUBTRACT,
        BlendOp::Min => vk::BlendOp::MIN,
        BlendOp::Max => vk::BlendOp::MAX,
    }
}

pub fn color_components(flags: ColorComponentFlags) -> vk::ColorComponentFlags {
    let mut out = vk::ColorComponentFlags::empty();
    if flags.contains(ColorComponentFlags::R) {
        out |= vk::ColorComponentFlags::R;
    }
    if flags.contains(ColorComponentFlags::G) {
        out |= vk::ColorComponentFlags::G;
    }
    if flags.contains(ColorComponentFlags::B) {
        out |= vk::ColorComponentFlags::B;
    }
    if flags.contains(ColorComponentFlags::A) {
        out |= vk::ColorComponentFlags::A;
    }
    out
}

pub fn descriptor_type(ty: ember_render::ShaderResourceType) -> vk::DescriptorType {
    use ember_render::ShaderResourceType::*;
    match ty {
        Sampler => vk::DescriptorType::SAMPLER,
        SamplerWithTexture => vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
        Texture => vk::DescriptorType::SAMPLED_IMAGE,
        StorageImage => vk::DescriptorType::STORAGE_IMAGE,
        UniformTexelBuffer => vk::DescriptorType::UNIFORM_TEXEL_BUFFER,
        StorageTexelBuffer => vk::DescriptorType::STORAGE_TEXEL_BUFFER,
        UniformBuffer => vk::DescriptorType::UNIFORM_BUFFER,
        StorageBuffer => vk::DescriptorType::STORAGE_BUFFER,
        InputAttachment => vk::DescriptorType::INPUT_ATTACHMENT,
    }
}
