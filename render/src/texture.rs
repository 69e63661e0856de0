//! Texture and sampler descriptions, layouts, and texture barriers.

use crate::format::Format;
use crate::handle::TextureHandle;
use crate::sync::PipelineStageFlags;
use bitflags::bitflags;
use std::fmt;

/// Dimensions of a texture.
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub enum Dimensions {
    Dim1d {
        width: u32,
    },
    Dim1dArray {
        width: u32,
        array_layers: u32,
    },
    Dim2d {
        width: u32,
        height: u32,
    },
    Dim2dArray {
        width: u32,
        height: u32,
        array_layers: u32,
    },
    Dim3d {
        width: u32,
        height: u32,
        depth: u32,
    },
    /// 6 2D faces.
    Cubemap {
        size: u32,
    },
    CubemapArray {
        size: u32,
        array_layers: u32,
    },
}

impl Dimensions {
    pub fn width(&self) -> u32 {
        match *self {
            Dimensions::Dim1d { width } => width,
            Dimensions::Dim1dArray { width, .. } => width,
            Dimensions::Dim2d { width, .. } => width,
            Dimensions::Dim2dArray { width, .. } => width,
            Dimensions::Dim3d { width, .. } => width,
            Dimensions::Cubemap { size } => size,
            Dimensions::CubemapArray { size, .. } => size,
        }
    }

    /// Returns 1 for 1D textures.
    pub fn height(&self) -> u32 {
        match *self {
            Dimensions::Dim1d { .. } | Dimensions::Dim1dArray { .. } => 1,
            Dimensions::Dim2d { height, .. } => height,
            Dimensions::Dim2dArray { height, .. } => height,
            Dimensions::Dim3d { height, .. } => height,
            Dimensions::Cubemap { size } => size,
            Dimensions::CubemapArray { size, .. } => size,
        }
    }

    /// Returns 1 for anything but 3D textures.
    pub fn depth(&self) -> u32 {
        match *self {
            Dimensions::Dim3d { depth, .. } => depth,
            _ => 1,
        }
    }

    pub fn extent(&self) -> Extent3d {
        Extent3d {
            width: self.width(),
            height: self.height(),
            depth: self.depth(),
        }
    }

    /// Layer count with cubemap faces folded in.
    pub fn array_layers(&self) -> u32 {
        match *self {
            Dimensions::Dim1dArray { array_layers, .. } => array_layers,
            Dimensions::Dim2dArray { array_layers, .. } => array_layers,
            Dimensions::Cubemap { .. } => 6,
            Dimensions::CubemapArray { array_layers, .. } => array_layers * 6,
            _ => 1,
        }
    }

    pub fn is_cubemap(&self) -> bool {
        matches!(
            self,
            Dimensions::Cubemap { .. } | Dimensions::CubemapArray { .. }
        )
    }
}

impl From<(u32, u32)> for Dimensions {
    fn from((width, height): (u32, u32)) -> Dimensions {
        Dimensions::Dim2d { width, height }
    }
}

impl fmt::Debug for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Dimensions::Dim1d { width } => write!(f, "[1D {}x1]", width),
            Dimensions::Dim1dArray {
                width,
                array_layers,
            } => write!(f, "[1D Array {}x1(x{})]", width, array_layers),
            Dimensions::Dim2d { width, height } => write!(f, "[2D {}x{}]", width, height),
            Dimensions::Dim2dArray {
                width,
                height,
                array_layers,
            } => write!(f, "[2D Array {}x{}(x{})]", width, height, array_layers),
            Dimensions::Dim3d {
                width,
                height,
                depth,
            } => write!(f, "[3D {}x{}x{}]", width, height, depth),
            Dimensions::Cubemap { size } => write!(f, "[Cubemap {}x{}]", size, size),
            Dimensions::CubemapArray { size, array_layers } => {
                write!(f, "[Cubemap Array {}x{}(x{})]", size, size, array_layers)
            }
        }
    }
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct Extent3d {
    pub width: u32,
    pub height: u32,
    pub depth: u32,
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct Extent2d {
    pub width: u32,
    pub height: u32,
}

impl Extent2d {
    pub fn new(width: u32, height: u32) -> Extent2d {
        Extent2d { width, height }
    }
}

/// Maximum number of mip levels for a texture of the given size:
/// `1 + floor(log2(size))`.
pub fn mip_level_count(size: u32) -> u32 {
    32 - size.max(1).leading_zeros()
}

bitflags! {
    pub struct TextureUsage: u32 {
        const SAMPLED                  = 1 << 0;
        const STORAGE                  = 1 << 1;
        const COLOR_ATTACHMENT         = 1 << 2;
        const DEPTH_STENCIL_ATTACHMENT = 1 << 3;
        const INPUT_ATTACHMENT         = 1 << 4;
        const TRANSFER_SRC             = 1 << 5;
        const TRANSFER_DST             = 1 << 6;
    }
}

impl Default for TextureUsage {
    fn default() -> TextureUsage {
        TextureUsage::empty()
    }
}

impl TextureUsage {
    /// The layout a texture sits in while used this way. Meaningful for
    /// single-usage values, i.e. the entries of a transition.
    pub fn image_layout(self) -> TextureLayout {
        if self.contains(TextureUsage::COLOR_ATTACHMENT) {
            TextureLayout::ColorAttachment
        } else if self.contains(TextureUsage::DEPTH_STENCIL_ATTACHMENT) {
            TextureLayout::DepthStencilAttachment
        } else if self.intersects(TextureUsage::SAMPLED | TextureUsage::INPUT_ATTACHMENT) {
            TextureLayout::ShaderReadOnly
        } else if self.contains(TextureUsage::STORAGE) {
            TextureLayout::General
        } else if self.contains(TextureUsage::TRANSFER_SRC) {
            TextureLayout::TransferSrc
        } else if self.contains(TextureUsage::TRANSFER_DST) {
            TextureLayout::TransferDst
        } else {
            TextureLayout::Undefined
        }
    }

    /// The pipeline stages that touch a texture in this usage.
    pub fn pipeline_stages(self) -> PipelineStageFlags {
        let mut stages = PipelineStageFlags::empty();
        if self.intersects(TextureUsage::TRANSFER_SRC | TextureUsage::TRANSFER_DST) {
            stages |= PipelineStageFlags::TRANSFER;
        }
        if self.intersects(TextureUsage::SAMPLED | TextureUsage::INPUT_ATTACHMENT) {
            stages |= PipelineStageFlags::VERTEX_SHADER | PipelineStageFlags::FRAGMENT_SHADER;
        }
        if self.contains(TextureUsage::STORAGE) {
            stages |= PipelineStageFlags::COMPUTE_SHADER;
        }
        if self.contains(TextureUsage::COLOR_ATTACHMENT) {
            stages |= PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT;
        }
        if self.contains(TextureUsage::DEPTH_STENCIL_ATTACHMENT) {
            stages |= PipelineStageFlags::EARLY_FRAGMENT_TESTS
                | PipelineStageFlags::LATE_FRAGMENT_TESTS;
        }
        if stages.is_empty() {
            stages = PipelineStageFlags::TOP_OF_PIPE;
        }
        stages
    }

    /// Usages that imply a write the next access must see; storage counts as
    /// write-dependent even against itself.
    pub fn is_write_dependent(self) -> bool {
        self.intersects(
            TextureUsage::STORAGE
                | TextureUsage::COLOR_ATTACHMENT
                | TextureUsage::DEPTH_STENCIL_ATTACHMENT
                | TextureUsage::TRANSFER_SRC
                | TextureUsage::TRANSFER_DST,
        )
    }
}

/// The layout of a texture's memory, as tracked by the render graph and
/// translated to API layouts by the backend.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum TextureLayout {
    Undefined,
    General,
    ColorAttachment,
    DepthStencilAttachment,
    DepthStencilReadOnly,
    ShaderReadOnly,
    TransferSrc,
    TransferDst,
    PresentSrc,
}

/// Create-time description of a texture; the initial layout is always
/// `Undefined`.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct TextureSpec {
    pub format: Format,
    pub dimensions: Dimensions,
    pub mip_levels: u32,
    pub samples: u32,
    pub usage: TextureUsage,
}

impl TextureSpec {
    pub fn new_2d(format: Format, width: u32, height: u32, usage: TextureUsage) -> TextureSpec {
        TextureSpec {
            format,
            dimensions: Dimensions::Dim2d { width, height },
            mip_levels: 1,
            samples: 1,
            usage,
        }
    }

    pub fn new_cube(format: Format, size: u32, usage: TextureUsage) -> TextureSpec {
        TextureSpec {
            format,
            dimensions: Dimensions::Cubemap { size },
            mip_levels: 1,
            samples: 1,
            usage,
        }
    }

    pub fn with_mip_levels(mut self, mip_levels: u32) -> TextureSpec {
        self.mip_levels = mip_levels;
        self
    }

    pub fn with_samples(mut self, samples: u32) -> TextureSpec {
        self.samples = samples;
        self
    }
}

/// A texture layout transition between two usages.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct TextureTransition {
    pub texture: TextureHandle,
    pub src_usage: TextureUsage,
    pub dst_usage: TextureUsage,
}

/// One region of a buffer-to-texture copy.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct BufferTextureCopyRegion {
    pub buffer_offset: u64,
    pub mip_level: u32,
    pub base_array_layer: u32,
    pub layer_count: u32,
    pub texture_offset: Extent3d,
    pub texture_extent: Extent3d,
}

//--------------------------------------------------------------------------------------------------
// Samplers

#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq)]
pub enum Filter {
    Nearest,
    Linear,
}

#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq)]
pub enum SamplerMipmapMode {
    Nearest,
    Linear,
}

#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq)]
pub enum SamplerAddressMode {
    Repeat,
    MirroredRepeat,
    ClampToEdge,
    ClampToBorder,
}

#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq)]
pub enum BorderColor {
    TransparentBlack,
    OpaqueBlack,
    OpaqueWhite,
}

#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq)]
pub enum CompareOp {
    Never,
    Less,
    Equal,
    LessOrEqual,
    Greater,
    NotEqual,
    GreaterOrEqual,
    Always,
}

/// Create-time description of a sampler.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct SamplerSpec {
    pub min_filter: Filter,
    pub mag_filter: Filter,
    pub mipmap_mode: SamplerMipmapMode,
    pub address_u: SamplerAddressMode,
    pub address_v: SamplerAddressMode,
    pub address_w: SamplerAddressMode,
    pub min_lod: f32,
    pub max_lod: f32,
    pub max_anisotropy: Option<f32>,
    pub border_color: BorderColor,
    pub compare_op: Option<CompareOp>,
}

impl Default for SamplerSpec {
    fn default() -> SamplerSpec {
        SamplerSpec {
            min_filter: Filter::Linear,
            mag_filter: Filter::Linear,
            mipmap_mode: SamplerMipmapMode::Nearest,
            address_u: SamplerAddressMode::Repeat,
            address_v: SamplerAddressMode::Repeat,
            address_w: SamplerAddressMode::Repeat,
            min_lod: 0.0,
            max_lod: 1000.0,
            max_anisotropy: None,
            border_color: BorderColor::OpaqueBlack,
            compare_op: None,
        }
    }
}

impl SamplerSpec {
    pub const LINEAR_CLAMP: SamplerSpec = SamplerSpec {
        min_filter: Filter::Linear,
        mag_filter: Filter::Linear,
        mipmap_mode: SamplerMipmapMode::Linear,
        address_u: SamplerAddressMode::ClampToEdge,
        address_v: SamplerAddressMode::ClampToEdge,
        address_w: SamplerAddressMode::ClampToEdge,
        min_lod: 0.0,
        max_lod: 1000.0,
        max_anisotropy: None,
        border_color: BorderColor::OpaqueBlack,
        compare_op: None,
    };

    pub const NEAREST_CLAMP: SamplerSpec = SamplerSpec {
        min_filter: Filter::Nearest,
        mag_filter: Filter::Nearest,
        mipmap_mode: SamplerMipmapMode::Nearest,
        address_u: SamplerAddressMode::ClampToEdge,
        address_v: SamplerAddressMode::ClampToEdge,
        address_w: SamplerAddressMode::ClampToEdge,
        min_lod: 0.0,
        max_lod: 1000.0,
        max_anisotropy: None,
        border_color: BorderColor::OpaqueBlack,
        compare_op: None,
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mip_counts() {
        assert_eq!(mip_level_count(1), 1);
        assert_eq!(mip_level_count(2), 2);
        assert_eq!(mip_level_count(1024), 11);
        assert_eq!(mip_level_count(1000), 10);
    }

    #[test]
    fn single_usage_layouts() {
        assert_eq!(
            TextureUsage::COLOR_ATTACHMENT.image_layout(),
            TextureLayout::ColorAttachment
        );
        assert_eq!(
            TextureUsage::SAMPLED.image_layout(),
            TextureLayout::ShaderReadOnly
        );
        assert_eq!(
            TextureUsage::TRANSFER_SRC.image_layout(),
            TextureLayout::TransferSrc
        );
    }

    #[test]
    fn cubemap_layer_count() {
        let spec = TextureSpec::new_cube(Format::R8G8B8A8_UNORM, 64, TextureUsage::SAMPLED);
        assert_eq!(spec.dimensions.array_layers(), 6);
        assert!(spec.dimensions.is_cubemap());
    }
}
