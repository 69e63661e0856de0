//! Graph passes and the builder used to declare them.

use super::resource::{RdgBufferInfo, RdgImageInfo};
use super::RenderGraph;
use crate::buffer::BufferUsage;
use crate::device::CommandContext;
use crate::handle::{BufferHandle, SamplerHandle, ShaderHandle, TextureHandle};
use crate::pipeline::{GraphicsPipelineState, SpecializationState};
use crate::renderpass::LoadOp;
use crate::texture::TextureUsage;
use bitflags::bitflags;
use fxhash::FxHashMap;

bitflags! {
    /// Queue capabilities a pass needs.
    pub struct QueueFlags: u32 {
        const GRAPHICS      = 1 << 0;
        const ASYNC_COMPUTE = 1 << 1;
        const TRANSFER      = 1 << 2;
    }
}

/// The callback a pass runs at execute time; it is handed the frame's
/// recording context and usually replays a deferred command list into it.
pub type PassCallback = Box<dyn FnMut(&mut dyn CommandContext)>;

#[derive(Copy, Clone, Debug)]
pub(crate) struct ImageWrite {
    pub resource: usize,
    pub usage: TextureUsage,
    pub load_op: LoadOp,
}

pub(crate) struct RdgPass {
    pub tag: String,
    pub index: usize,
    pub queue_flags: QueueFlags,
    pub image_writes: Vec<ImageWrite>,
    pub image_reads: Vec<(usize, TextureUsage)>,
    pub buffer_writes: Vec<(usize, BufferUsage)>,
    pub buffer_reads: Vec<(usize, BufferUsage)>,
    /// Resources supplied by the renderer rather than the graph, keyed by
    /// the binding tag.
    pub external_images: FxHashMap<String, Vec<TextureHandle>>,
    pub external_buffers: FxHashMap<String, BufferHandle>,
    pub samplers: FxHashMap<String, SamplerHandle>,
    /// (binding tag, reflected resource name); resolved during compile.
    pub srd_requests: Vec<(String, String)>,
    pub shader: Option<ShaderHandle>,
    pub pipeline_state: GraphicsPipelineState,
    pub specialization: SpecializationState,
    pub on_execute: Option<PassCallback>,
    pub physical_index: Option<usize>,
}

impl RdgPass {
    pub fn new(tag: &str, index: usize, queue_flags: QueueFlags) -> RdgPass {
        RdgPass {
            tag: tag.to_owned(),
            index,
            queue_flags,
            image_writes: Vec::new(),
            image_reads: Vec::new(),
            buffer_writes: Vec::new(),
            buffer_reads: Vec::new(),
            external_images: FxHashMap::default(),
            external_buffers: FxHashMap::default(),
            samplers: FxHashMap::default(),
            srd_requests: Vec::new(),
            shader: None,
            pipeline_state: GraphicsPipelineState::default(),
            specialization: SpecializationState::default(),
            on_execute: None,
            physical_index: None,
        }
    }
}

/// Fluent declaration interface returned by [`RenderGraph::add_pass`].
pub struct PassBuilder<'a> {
    pub(crate) graph: &'a mut RenderGraph,
    pub(crate) pass: usize,
}

impl<'a> PassBuilder<'a> {
    fn declare_image_write(&mut self, tag: &str, info: RdgImageInfo, usage: TextureUsage) {
        let pass = self.pass;
        let res = self.graph.image_resource(tag);
        self.graph.set_image_info(res, info);
        self.graph.record_write(res, pass);
        self.graph.passes[pass].image_writes.push(ImageWrite {
            resource: res,
            usage,
            load_op: LoadOp::Clear,
        });
    }

    /// Declares a color attachment this pass renders into.
    pub fn write_color_image(&mut self, tag: &str, info: RdgImageInfo) -> &mut Self {
        self.declare_image_write(tag, info, TextureUsage::COLOR_ATTACHMENT);
        self
    }

    /// Declares the depth-stencil attachment of this pass.
    pub fn write_depth_stencil_image(&mut self, tag: &str, info: RdgImageInfo) -> &mut Self {
        self.declare_image_write(tag, info, TextureUsage::DEPTH_STENCIL_ATTACHMENT);
        self
    }

    /// Declares a storage image this pass writes from shaders.
    pub fn write_storage_image(&mut self, tag: &str, info: RdgImageInfo) -> &mut Self {
        self.declare_image_write(tag, info, TextureUsage::STORAGE);
        self
    }

    /// Keeps the previous contents of an attachment instead of clearing.
    pub fn preserve_contents(&mut self, tag: &str) -> &mut Self {
        let pass = self.pass;
        if let Some(res) = self.graph.resource_index(tag) {
            for write in &mut self.graph.passes[pass].image_writes {
                if write.resource == res {
                    write.load_op = LoadOp::Load;
                }
            }
        }
        self
    }

    /// Declares a read of an internal image produced by another pass.
    pub fn read_image(&mut self, tag: &str, usage: TextureUsage) -> &mut Self {
        let pass = self.pass;
        match self.graph.resource_index(tag) {
            Some(res) => {
                self.graph.record_read(res, pass);
                self.graph.passes[pass].image_reads.push((res, usage));
            }
            None => self.graph.declaration_error_unknown(pass, tag),
        }
        self
    }

    /// Declares a storage buffer this pass writes.
    pub fn write_storage_buffer(&mut self, tag: &str, info: RdgBufferInfo) -> &mut Self {
        self.declare_buffer_write(tag, info, BufferUsage::STORAGE);
        self
    }

    /// Declares a buffer this pass fills by transfer.
    pub fn write_transfer_dst_buffer(&mut self, tag: &str, info: RdgBufferInfo) -> &mut Self {
        self.declare_buffer_write(tag, info, BufferUsage::TRANSFER_DST);
        self
    }

    fn declare_buffer_write(&mut self, tag: &str, info: RdgBufferInfo, usage: BufferUsage) {
        let pass = self.pass;
        let res = self.graph.buffer_resource(tag);
        self.graph.set_buffer_info(res, info);
        self.graph.record_write(res, pass);
        self.graph.passes[pass].buffer_writes.push((res, usage));
    }

    /// Declares a read of an internal buffer produced by another pass.
    pub fn read_buffer(&mut self, tag: &str, usage: BufferUsage) -> &mut Self {
        let pass = self.pass;
        match self.graph.resource_index(tag) {
            Some(res) => {
                self.graph.record_read(res, pass);
                self.graph.passes[pass].buffer_reads.push((res, usage));
            }
            None => self.graph.declaration_error_unknown(pass, tag),
        }
        self
    }

    /// Supplies an externally owned image for the named binding tag.
    pub fn read_external_image(&mut self, tag: &str, texture: TextureHandle) -> &mut Self {
        self.graph.passes[self.pass]
            .external_images
            .insert(tag.to_owned(), vec![texture]);
        self
    }

    /// Supplies an array of externally owned images for one binding tag.
    pub fn read_external_images(&mut self, tag: &str, textures: &[TextureHandle]) -> &mut Self {
        self.graph.passes[self.pass]
            .external_images
            .insert(tag.to_owned(), textures.to_vec());
        self
    }

    pub fn read_external_buffer(&mut self, tag: &str, buffer: BufferHandle) -> &mut Self {
        self.graph.passes[self.pass]
            .external_buffers
            .insert(tag.to_owned(), buffer);
        self
    }

    /// Associates a sampler with the named binding tag.
    pub fn bind_sampler(&mut self, tag: &str, sampler: SamplerHandle) -> &mut Self {
        self.graph.passes[self.pass]
            .samplers
            .insert(tag.to_owned(), sampler);
        self
    }

    /// Routes the named binding tag into the shader resource with the given
    /// reflected name. Resolved against the pass's shader group at compile.
    pub fn bind_shader_resource(&mut self, tag: &str, resource_name: &str) -> &mut Self {
        self.graph.passes[self.pass]
            .srd_requests
            .push((tag.to_owned(), resource_name.to_owned()));
        self
    }

    pub fn set_shader(&mut self, shader: ShaderHandle) -> &mut Self {
        self.graph.passes[self.pass].shader = Some(shader);
        self
    }

    /// Overrides the default fixed-function state template for this pass.
    pub fn set_pipeline_state(&mut self, state: GraphicsPipelineState) -> &mut Self {
        self.graph.passes[self.pass].pipeline_state = state;
        self
    }

    pub fn set_specialization(&mut self, specialization: SpecializationState) -> &mut Self {
        self.graph.passes[self.pass].specialization = specialization;
        self
    }

    pub fn set_on_execute(&mut self, callback: PassCallback) -> &mut Self {
        self.graph.passes[self.pass].on_execute = Some(callback);
        self
    }
}
