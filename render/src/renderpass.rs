//! Render pass, framebuffer, and dynamic-rendering descriptions.

use crate::format::Format;
use crate::handle::{RenderPassHandle, TextureHandle};
use crate::sync::PipelineStageFlags;
use crate::texture::{Extent2d, TextureLayout};

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum LoadOp {
    Load,
    Clear,
    DontCare,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum StoreOp {
    Store,
    DontCare,
}

/// One attachment slot of a render pass.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct AttachmentDescription {
    pub format: Format,
    pub samples: u32,
    pub load_op: LoadOp,
    pub store_op: StoreOp,
    pub stencil_load_op: LoadOp,
    pub stencil_store_op: StoreOp,
    pub initial_layout: TextureLayout,
    pub final_layout: TextureLayout,
}

impl AttachmentDescription {
    /// The graph's default attachment: cleared on load, stored, stencil
    /// untouched, discovered in `Undefined`.
    pub fn cleared(format: Format, samples: u32, final_layout: TextureLayout) -> Self {
        AttachmentDescription {
            format,
            samples,
            load_op: LoadOp::Clear,
            store_op: StoreOp::Store,
            stencil_load_op: LoadOp::DontCare,
            stencil_store_op: StoreOp::DontCare,
            initial_layout: TextureLayout::Undefined,
            final_layout,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct AttachmentReference {
    pub attachment: u32,
    pub layout: TextureLayout,
}

/// One subpass: which attachments it renders to and reads from.
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct SubpassSpec {
    pub color_refs: Vec<AttachmentReference>,
    pub input_refs: Vec<AttachmentReference>,
    pub depth_stencil_ref: Option<AttachmentReference>,
}

/// An execution dependency between two subpasses (`None` = external).
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct SubpassDependencySpec {
    pub src_subpass: Option<u32>,
    pub dst_subpass: Option<u32>,
    pub src_stages: PipelineStageFlags,
    pub dst_stages: PipelineStageFlags,
}

/// Create-time description of a render pass; also its cache key.
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct RenderPassSpec {
    pub attachments: Vec<AttachmentDescription>,
    pub subpasses: Vec<SubpassSpec>,
    pub dependencies: Vec<SubpassDependencySpec>,
}

/// Create-time description of a framebuffer. Lifetime is bound to the
/// compatibility class of `render_pass`.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct FramebufferSpec {
    pub render_pass: RenderPassHandle,
    pub attachments: Vec<TextureHandle>,
    pub extent: Extent2d,
    pub layers: u32,
}

/// A clear value for one attachment.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum ClearValue {
    Color([f32; 4]),
    DepthStencil { depth: f32, stencil: u32 },
}

impl ClearValue {
    /// The graph's defaults: neutral gray, depth 1.0, stencil 0.
    pub const COLOR_DEFAULT: ClearValue = ClearValue::Color([0.2, 0.2, 0.2, 1.0]);
    pub const DEPTH_DEFAULT: ClearValue = ClearValue::DepthStencil {
        depth: 1.0,
        stencil: 0,
    };
}

/// One attachment of a dynamic (render-pass-less) rendering scope.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct RenderingAttachment {
    pub texture: TextureHandle,
    pub format: Format,
    pub samples: u32,
    pub load_op: LoadOp,
    pub store_op: StoreOp,
    pub final_layout: TextureLayout,
    pub clear: ClearValue,
}

/// Describes the attachments and load/store behavior of one rendering
/// scope. Backends built on classic render passes translate this into a
/// compatible render pass + framebuffer through the resource cache.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RenderingLayout {
    pub color_attachments: Vec<RenderingAttachment>,
    pub depth_stencil_attachment: Option<RenderingAttachment>,
    pub render_area: Extent2d,
}

impl RenderingLayout {
    /// The render pass this layout is compatible with: one subpass over the
    /// attachment list, clear-in, store-out.
    pub fn compatible_render_pass(&self) -> RenderPassSpec {
        let mut attachments = Vec::new();
        let mut color_refs = Vec::new();
        let mut depth_stencil_ref = None;
        for att in &self.color_attachments {
            color_refs.push(AttachmentReference {
                attachment: attachments.len() as u32,
                layout: att.final_layout,
            });
            attachments.push(AttachmentDescription {
                format: att.format,
                samples: att.samples,
                load_op: att.load_op,
                store_op: att.store_op,
                stencil_load_op: LoadOp::DontCare,
                stencil_store_op: StoreOp::DontCare,
                initial_layout: TextureLayout::Undefined,
                final_layout: att.final_layout,
            });
        }
        if let Some(att) = &self.depth_stencil_attachment {
            depth_stencil_ref = Some(AttachmentReference {
                attachment: attachments.len() as u32,
                layout: att.final_layout,
            });
            attachments.push(AttachmentDescription {
                format: att.format,
                samples: att.samples,
                load_op: att.load_op,
                store_op: att.store_op,
                stencil_load_op: LoadOp::DontCare,
                stencil_store_op: StoreOp::DontCare,
                initial_layout: TextureLayout::Undefined,
                final_layout: att.final_layout,
            });
        }
        RenderPassSpec {
            attachments,
            subpasses: vec![SubpassSpec {
                color_refs,
                input_refs: Vec::new(),
                depth_stencil_ref,
            }],
            dependencies: Vec::new(),
        }
    }
}
