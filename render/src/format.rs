//! Texel formats.

/// Subset of texel formats the core understands; names follow the Vulkan
/// convention.
#[allow(non_camel_case_types)]
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Format {
    UNDEFINED,
    R8_UNORM,
    R8_SNORM,
    R8_UINT,
    R8_SINT,
    R8G8_UNORM,
    R8G8B8A8_UNORM,
    R8G8B8A8_SNORM,
    R8G8B8A8_UINT,
    R8G8B8A8_SINT,
    R8G8B8A8_SRGB,
    B8G8R8A8_UNORM,
    B8G8R8A8_SRGB,
    R10G10B10A2_UNORM,
    R16_SFLOAT,
    R16G16_SFLOAT,
    R16G16B16A16_SFLOAT,
    R32_SFLOAT,
    R32_UINT,
    R32_SINT,
    R32G32_SFLOAT,
    R32G32B32_SFLOAT,
    R32G32B32A32_SFLOAT,
    R32G32_UINT,
    R32G32B32_UINT,
    R32G32B32A32_UINT,
    R32G32_SINT,
    R32G32B32_SINT,
    R32G32B32A32_SINT,
    D16_UNORM,
    D32_SFLOAT,
    D24_UNORM_S8_UINT,
    D32_SFLOAT_S8_UINT,
}

impl Format {
    pub fn is_depth(&self) -> bool {
        matches!(
            self,
            Format::D16_UNORM
                | Format::D32_SFLOAT
                | Format::D24_UNORM_S8_UINT
                | Format::D32_SFLOAT_S8_UINT
        )
    }

    pub fn has_stencil(&self) -> bool {
        matches!(self, Format::D24_UNORM_S8_UINT | Format::D32_SFLOAT_S8_UINT)
    }

    /// Bytes per texel; depth-stencil formats report their packed size.
    pub fn byte_size(&self) -> u32 {
        use Format::*;
        match self {
            UNDEFINED => 0,
            R8_UNORM | R8_SNORM | R8_UINT | R8_SINT => 1,
            R8G8_UNORM | R16_SFLOAT | D16_UNORM => 2,
            R8G8B8A8_UNORM | R8G8B8A8_SNORM | R8G8B8A8_UINT | R8G8B8A8_SINT | R8G8B8A8_SRGB
            | B8G8R8A8_UNORM | B8G8R8A8_SRGB | R10G10B10A2_UNORM | R16G16_SFLOAT | R32_SFLOAT
            | R32_UINT | R32_SINT | D32_SFLOAT | D24_UNORM_S8_UINT => 4,
            R16G16B16A16_SFLOAT | R32G32_SFLOAT | R32G32_UINT | R32G32_SINT
            | D32_SFLOAT_S8_UINT => 8,
            R32G32B32_SFLOAT | R32G32B32_UINT | R32G32B32_SINT => 12,
            R32G32B32A32_SFLOAT | R32G32B32A32_UINT | R32G32B32A32_SINT => 16,
        }
    }
}

impl Default for Format {
    fn default() -> Format {
        Format::UNDEFINED
    }
}
