//! Logical resources tracked by the render graph.

use crate::buffer::BufferUsage;
use crate::format::Format;
use crate::texture::{Extent2d, Extent3d, TextureUsage};

/// How a logical image derives its extent.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum ImageSize {
    /// `factor ×` the back-buffer extent.
    SwapchainRelative(f32),
    Absolute(Extent3d),
}

impl ImageSize {
    pub fn resolve(&self, back_buffer: Extent2d) -> Extent3d {
        match *self {
            ImageSize::SwapchainRelative(factor) => Extent3d {
                width: (back_buffer.width as f32 * factor) as u32,
                height: (back_buffer.height as f32 * factor) as u32,
                depth: 1,
            },
            ImageSize::Absolute(extent) => extent,
        }
    }
}

/// Declared properties of a logical image.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct RdgImageInfo {
    pub format: Format,
    pub size: ImageSize,
    pub samples: u32,
    pub levels: u32,
    pub layers: u32,
}

impl Default for RdgImageInfo {
    fn default() -> RdgImageInfo {
        RdgImageInfo {
            format: Format::UNDEFINED,
            size: ImageSize::SwapchainRelative(1.0),
            samples: 1,
            levels: 1,
            layers: 1,
        }
    }
}

impl RdgImageInfo {
    pub fn swapchain_relative(format: Format) -> RdgImageInfo {
        RdgImageInfo {
            format,
            ..RdgImageInfo::default()
        }
    }

    pub fn absolute(format: Format, width: u32, height: u32) -> RdgImageInfo {
        RdgImageInfo {
            format,
            size: ImageSize::Absolute(Extent3d {
                width,
                height,
                depth: 1,
            }),
            ..RdgImageInfo::default()
        }
    }
}

/// Declared properties of a logical buffer.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct RdgBufferInfo {
    pub size: u64,
}

#[derive(Clone, Debug)]
pub(crate) enum RdgResourceKind {
    Image { info: RdgImageInfo },
    Buffer { info: RdgBufferInfo },
}

/// One named logical resource and the passes that touch it.
#[derive(Clone, Debug)]
pub(crate) struct RdgResource {
    pub tag: String,
    pub kind: RdgResourceKind,
    /// Pass indices that write the resource, in declaration order.
    pub written_in: Vec<usize>,
    /// Pass indices that read the resource.
    pub read_in: Vec<usize>,
    /// Index into the graph's physical image/buffer table after compile.
    pub physical_index: Option<usize>,
}

impl RdgResource {
    pub fn new_image(tag: &str) -> RdgResource {
        RdgResource {
            tag: tag.to_owned(),
            kind: RdgResourceKind::Image {
                info: RdgImageInfo::default(),
            },
            written_in: Vec::new(),
            read_in: Vec::new(),
            physical_index: None,
        }
    }

    pub fn new_buffer(tag: &str) -> RdgResource {
        RdgResource {
            tag: tag.to_owned(),
            kind: RdgResourceKind::Buffer {
                info: RdgBufferInfo::default(),
            },
            written_in: Vec::new(),
            read_in: Vec::new(),
            physical_index: None,
        }
    }

    pub fn is_image(&self) -> bool {
        matches!(self.kind, RdgResourceKind::Image { .. })
    }

    pub fn image_info(&self) -> Option<&RdgImageInfo> {
        match &self.kind {
            RdgResourceKind::Image { info } => Some(info),
            RdgResourceKind::Buffer { .. } => None,
        }
    }

    pub fn buffer_info(&self) -> Option<&RdgBufferInfo> {
        match &self.kind {
            RdgResourceKind::Buffer { info } => Some(info),
            RdgResourceKind::Image { .. } => None,
        }
    }
}

/// A (source usage, destination usage) pair; the backend derives layouts,
/// stages, and access masks from it.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct UsageTransition<U> {
    pub src: U,
    pub dst: U,
}

pub type ImageTransition = UsageTransition<TextureUsage>;
pub type BufferUsageTransition = UsageTransition<BufferUsage>;
