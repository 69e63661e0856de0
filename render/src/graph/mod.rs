//! The render graph: a per-frame DAG of passes over named logical
//! resources.
//!
//! A renderer declares passes and their reads/writes, then calls
//! [`RenderGraph::compile`] once; compilation orders the passes, resolves
//! per-pass resource transitions, allocates the physical GPU resources, and
//! requests render passes / framebuffers / pipelines / descriptor sets from
//! the cache. [`RenderGraph::execute`] then runs every pass in order,
//! emitting the exact pipeline barriers required in between, and finally
//! blits the back buffer into the acquired swapchain image.

mod dump;
mod pass;
mod resource;

pub use self::pass::{PassBuilder, PassCallback, QueueFlags};
pub use self::resource::{
    BufferUsageTransition, ImageSize, ImageTransition, RdgBufferInfo, RdgImageInfo,
    UsageTransition,
};

use self::pass::RdgPass;
use self::resource::{RdgResource, RdgResourceKind};
use crate::buffer::{BufferSpec, BufferTransition, BufferUsage};
use crate::cache::{PipelineLayoutInfo, ResourceCache};
use crate::descriptor::{DescriptorResource, DescriptorWrite};
use crate::device::{CommandContext, RenderDevice, RenderingInfo};
use crate::error::GraphError;
use crate::handle::{
    BufferHandle, CommandBufferHandle, DescriptorSetHandle, FramebufferHandle, PipelineHandle,
    RenderPassHandle, TextureHandle,
};
use crate::pipeline::{
    ComputePipelineSpec, DynamicState, GraphicsPipelineSpec, PipelineSpec,
};
use crate::renderpass::{
    AttachmentDescription, AttachmentReference, ClearValue, FramebufferSpec, LoadOp,
    RenderPassSpec, RenderingAttachment, StoreOp, SubpassSpec,
};
use crate::shader::{ShaderResource, ShaderResourceType};
use crate::sync::PipelineStageFlags;
use crate::texture::{
    Dimensions, Extent2d, Extent3d, TextureLayout, TextureSpec, TextureTransition, TextureUsage,
};
use crate::vertex::VertexInputState;
use fxhash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;

#[derive(Default)]
struct StateTable {
    image_transitions: FxHashMap<(usize, usize), ImageTransition>,
    buffer_transitions: FxHashMap<(usize, usize), BufferUsageTransition>,
    image_first_use: FxHashMap<usize, usize>,
    image_last_use: FxHashMap<usize, usize>,
    buffer_first_use: FxHashMap<usize, usize>,
    buffer_last_use: FxHashMap<usize, usize>,
    total_image_usage: FxHashMap<usize, TextureUsage>,
    total_buffer_usage: FxHashMap<usize, BufferUsage>,
}

/// A pass name binding resolved against the pass's reflected shader.
struct ResolvedBinding {
    tag: String,
    resource: ShaderResource,
}

/// Everything a pass needs at execute time, produced by compile.
struct PhysicalPass {
    pass_index: usize,
    render_pass: Option<RenderPassHandle>,
    framebuffer: Option<FramebufferHandle>,
    pipeline_layout: Option<PipelineLayoutInfo>,
    pipeline: Option<PipelineHandle>,
    descriptor_sets: Vec<DescriptorSetHandle>,
    color_attachments: Vec<RenderingAttachment>,
    depth_attachment: Option<RenderingAttachment>,
    render_area: Extent2d,
    /// (resource, transition) pairs, sorted by resource for determinism.
    image_barriers: Vec<(usize, ImageTransition)>,
    buffer_barriers: Vec<(usize, BufferUsageTransition)>,
    bindings: Vec<ResolvedBinding>,
    descriptor_sets_updated: bool,
}

/// The per-frame pass DAG. See the module docs.
pub struct RenderGraph {
    pub(crate) passes: Vec<RdgPass>,
    pass_index: FxHashMap<String, usize>,
    resources: Vec<RdgResource>,
    res_index: FxHashMap<String, usize>,
    back_buffer_tag: Option<String>,
    back_buffer_extent: Extent2d,
    declaration_errors: Vec<GraphError>,
    execution_order: Vec<usize>,
    state: StateTable,
    physical_images: Vec<TextureHandle>,
    physical_buffers: Vec<BufferHandle>,
    physical_passes: Vec<PhysicalPass>,
    compiled: bool,
    pre_executed: bool,
}

impl Default for RenderGraph {
    fn default() -> RenderGraph {
        RenderGraph::new()
    }
}

impl RenderGraph {
    pub fn new() -> RenderGraph {
        RenderGraph {
            passes: Vec::new(),
            pass_index: FxHashMap::default(),
            resources: Vec::new(),
            res_index: FxHashMap::default(),
            back_buffer_tag: None,
            back_buffer_extent: Extent2d::default(),
            declaration_errors: Vec::new(),
            execution_order: Vec::new(),
            state: StateTable::default(),
            physical_images: Vec::new(),
            physical_buffers: Vec::new(),
            physical_passes: Vec::new(),
            compiled: false,
            pre_executed: false,
        }
    }

    // ---- declaration ---------------------------------------------------

    /// Adds (or returns) a pass; re-adding a tag continues declaring the
    /// same pass.
    pub fn add_pass(&mut self, tag: &str, queue_flags: QueueFlags) -> PassBuilder<'_> {
        let index = match self.pass_index.get(tag) {
            Some(&index) => index,
            None => {
                let index = self.passes.len();
                self.passes.push(RdgPass::new(tag, index, queue_flags));
                self.pass_index.insert(tag.to_owned(), index);
                index
            }
        };
        PassBuilder {
            graph: self,
            pass: index,
        }
    }

    /// Names the resource that feeds the swapchain after the final pass.
    pub fn set_back_buffer_tag(&mut self, tag: &str) {
        self.back_buffer_tag = Some(tag.to_owned());
    }

    /// Registers a logical image without attaching it to a pass; passes may
    /// then read it (a back buffer declared this way but never written is a
    /// compile error).
    pub fn declare_image(&mut self, tag: &str, info: RdgImageInfo) {
        let res = self.image_resource(tag);
        self.set_image_info(res, info);
    }

    /// Registers a logical buffer without attaching it to a pass.
    pub fn declare_buffer(&mut self, tag: &str, info: RdgBufferInfo) {
        let res = self.buffer_resource(tag);
        self.set_buffer_info(res, info);
    }

    pub fn set_back_buffer_size(&mut self, width: u32, height: u32) {
        self.back_buffer_extent = Extent2d::new(width, height);
    }

    pub fn back_buffer_extent(&self) -> Extent2d {
        self.back_buffer_extent
    }

    pub(crate) fn resource_index(&self, tag: &str) -> Option<usize> {
        self.res_index.get(tag).copied()
    }

    pub(crate) fn image_resource(&mut self, tag: &str) -> usize {
        match self.res_index.get(tag) {
            Some(&index) => {
                if !self.resources[index].is_image() {
                    self.declaration_errors
                        .push(GraphError::ResourceKindMismatch(tag.to_owned()));
                }
                index
            }
            None => {
                let index = self.resources.len();
                self.resources.push(RdgResource::new_image(tag));
                self.res_index.insert(tag.to_owned(), index);
                index
            }
        }
    }

    pub(crate) fn buffer_resource(&mut self, tag: &str) -> usize {
        match self.res_index.get(tag) {
            Some(&index) => {
                if self.resources[index].is_image() {
                    self.declaration_errors
                        .push(GraphError::ResourceKindMismatch(tag.to_owned()));
                }
                index
            }
            None => {
                let index = self.resources.len();
                self.resources.push(RdgResource::new_buffer(tag));
                self.res_index.insert(tag.to_owned(), index);
                index
            }
        }
    }

    pub(crate) fn set_image_info(&mut self, res: usize, info: RdgImageInfo) {
        if let RdgResourceKind::Image { info: slot } = &mut self.resources[res].kind {
            *slot = info;
        }
    }

    pub(crate) fn set_buffer_info(&mut self, res: usize, info: RdgBufferInfo) {
        if let RdgResourceKind::Buffer { info: slot } = &mut self.resources[res].kind {
            *slot = info;
        }
    }

    pub(crate) fn record_write(&mut self, res: usize, pass: usize) {
        self.resources[res].written_in.push(pass);
    }

    pub(crate) fn record_read(&mut self, res: usize, pass: usize) {
        self.resources[res].read_in.push(pass);
    }

    pub(crate) fn declaration_error_unknown(&mut self, pass: usize, tag: &str) {
        self.declaration_errors.push(GraphError::UnknownResource {
            pass: self.passes[pass].tag.clone(),
            resource: tag.to_owned(),
        });
    }

    // ---- compilation ---------------------------------------------------

    /// Orders the passes, resolves resource state, and builds the physical
    /// resources and passes. Idempotent: once compiled, later calls return
    /// without rebuilding anything.
    pub fn compile(
        &mut self,
        device: &dyn RenderDevice,
        cache: &ResourceCache,
    ) -> Result<(), GraphError> {
        if self.compiled {
            return Ok(());
        }
        if let Some(err) = self.declaration_errors.first() {
            return Err(err.clone());
        }
        self.check_write_after_write()?;
        self.sort_passes()?;
        for resource in &self.resources {
            if !resource.read_in.is_empty() && resource.written_in.is_empty() {
                log::warn!(
                    "resource {:?} is read but never written inside the graph; \
                     its first use starts from Undefined",
                    resource.tag
                );
            }
        }
        self.resolve_resource_state();
        self.build_physical_resources(device)?;
        self.build_physical_passes(device, cache)?;
        self.compiled = true;
        Ok(())
    }

    fn check_write_after_write(&self) -> Result<(), GraphError> {
        for pass in &self.passes {
            let mut written = FxHashSet::default();
            let image_writes = pass.image_writes.iter().map(|w| w.resource);
            let buffer_writes = pass.buffer_writes.iter().map(|&(res, _)| res);
            for res in image_writes.chain(buffer_writes) {
                if !written.insert(res) {
                    return Err(GraphError::WriteAfterWrite {
                        pass: pass.tag.clone(),
                        resource: self.resources[res].tag.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Depth-first traversal from the back-buffer writers through each
    /// pass's inputs; post-order yields a dependencies-first execution
    /// order. Cycles are detected with on-stack coloring, with the depth
    /// bound kept as a backstop.
    fn sort_passes(&mut self) -> Result<(), GraphError> {
        let back_buffer_tag = self
            .back_buffer_tag
            .clone()
            .ok_or_else(|| GraphError::MissingBackBuffer(String::new()))?;
        let back_buffer = self
            .resource_index(&back_buffer_tag)
            .ok_or_else(|| GraphError::MissingBackBuffer(back_buffer_tag.clone()))?;
        if self.resources[back_buffer].written_in.is_empty() {
            return Err(GraphError::NoBackBufferWriter(back_buffer_tag));
        }

        // per-pass dependency lists: the writers of every input, in
        // declaration order, first occurrence kept
        let mut deps: Vec<Vec<usize>> = Vec::with_capacity(self.passes.len());
        for pass in &self.passes {
            let mut seen = FxHashSet::default();
            let mut list = Vec::new();
            let inputs = pass
                .image_reads
                .iter()
                .map(|&(res, _)| res)
                .chain(pass.buffer_reads.iter().map(|&(res, _)| res));
            for res in inputs {
                for &writer in &self.resources[res].written_in {
                    if writer != pass.index && seen.insert(writer) {
                        list.push(writer);
                    }
                }
            }
            deps.push(list);
        }

        #[derive(Copy, Clone, Eq, PartialEq)]
        enum Color {
            White,
            Gray,
            Black,
        }

        fn visit(
            pass: usize,
            deps: &[Vec<usize>],
            colors: &mut [Color],
            order: &mut Vec<usize>,
            depth: usize,
        ) -> Result<(), GraphError> {
            if depth > deps.len() {
                return Err(GraphError::CycleDetected);
            }
            match colors[pass] {
                Color::Black => return Ok(()),
                Color::Gray => return Err(GraphError::CycleDetected),
                Color::White => {}
            }
            colors[pass] = Color::Gray;
            for &dep in &deps[pass] {
                visit(dep, deps, colors, order, depth + 1)?;
            }
            colors[pass] = Color::Black;
            order.push(pass);
            Ok(())
        }

        let mut colors = vec![Color::White; self.passes.len()];
        let mut order = Vec::new();
        for &writer in &self.resources[back_buffer].written_in {
            visit(writer, &deps, &mut colors, &mut order, 0)?;
        }
        log::debug!(
            "render graph execution order: {:?}",
            order
                .iter()
                .map(|&i| self.passes[i].tag.as_str())
                .collect::<Vec<_>>()
        );
        self.execution_order = order;
        Ok(())
    }

    /// Walks the passes in execution order recording, for every touched
    /// resource, the transition from its previous usage; afterwards the
    /// first-use transition's source is patched to the final usage, closing
    /// the ring across frames.
    fn resolve_resource_state(&mut self) {
        let state = &mut self.state;
        let mut last_image: FxHashMap<usize, TextureUsage> = FxHashMap::default();
        let mut last_buffer: FxHashMap<usize, BufferUsage> = FxHashMap::default();

        for &pass_index in &self.execution_order {
            let pass = &self.passes[pass_index];

            let buffer_touches = pass
                .buffer_reads
                .iter()
                .chain(pass.buffer_writes.iter())
                .copied();
            for (res, usage) in buffer_touches {
                let src = match last_buffer.get(&res) {
                    Some(&prev) => prev,
                    None => {
                        state.buffer_first_use.insert(res, pass_index);
                        // patched after the loop
                        BufferUsage::empty()
                    }
                };
                state
                    .buffer_transitions
                    .insert((pass_index, res), UsageTransition { src, dst: usage });
                *state
                    .total_buffer_usage
                    .entry(res)
                    .or_insert_with(BufferUsage::empty) |= usage;
                last_buffer.insert(res, usage);
                state.buffer_last_use.insert(res, pass_index);
            }

            let image_touches = pass
                .image_reads
                .iter()
                .copied()
                .chain(pass.image_writes.iter().map(|w| (w.resource, w.usage)));
            for (res, usage) in image_touches {
                let src = match last_image.get(&res) {
                    Some(&prev) => prev,
                    None => {
                        state.image_first_use.insert(res, pass_index);
                        TextureUsage::empty()
                    }
                };
                state
                    .image_transitions
                    .insert((pass_index, res), UsageTransition { src, dst: usage });
                *state
                    .total_image_usage
                    .entry(res)
                    .or_insert_with(TextureUsage::empty) |= usage;
                last_image.insert(res, usage);
                state.image_last_use.insert(res, pass_index);
            }
        }

        // the back buffer is additionally blitted to the swapchain
        if let Some(tag) = &self.back_buffer_tag {
            if let Some(&res) = self.res_index.get(tag) {
                *state
                    .total_image_usage
                    .entry(res)
                    .or_insert_with(TextureUsage::empty) |= TextureUsage::TRANSFER_SRC;
            }
        }

        for (&res, &pass_index) in &state.buffer_first_use {
            if let Some(transition) = state.buffer_transitions.get_mut(&(pass_index, res)) {
                transition.src = last_buffer.get(&res).copied().unwrap_or_default();
            }
        }
        for (&res, &pass_index) in &state.image_first_use {
            if let Some(transition) = state.image_transitions.get_mut(&(pass_index, res)) {
                transition.src = last_image.get(&res).copied().unwrap_or_default();
            }
        }
    }

    fn build_physical_resources(&mut self, device: &dyn RenderDevice) -> Result<(), GraphError> {
        for (index, resource) in self.resources.iter_mut().enumerate() {
            match &resource.kind {
                RdgResourceKind::Image { info } => {
                    let usage = match self.state.total_image_usage.get(&index) {
                        Some(&usage) if !usage.is_empty() => usage,
                        _ => {
                            log::debug!("logical image {:?} is never used; skipping", resource.tag);
                            continue;
                        }
                    };
                    let extent = info.size.resolve(self.back_buffer_extent);
                    let dimensions = image_dimensions(extent, info.layers);
                    let spec = TextureSpec {
                        format: info.format,
                        dimensions,
                        mip_levels: info.levels,
                        samples: info.samples,
                        usage,
                    };
                    let texture = device.create_texture(&spec)?;
                    resource.physical_index = Some(self.physical_images.len());
                    self.physical_images.push(texture);
                }
                RdgResourceKind::Buffer { info } => {
                    let usage = match self.state.total_buffer_usage.get(&index) {
                        Some(&usage) if !usage.is_empty() => usage,
                        _ => {
                            log::debug!("logical buffer {:?} is never used; skipping", resource.tag);
                            continue;
                        }
                    };
                    let buffer = device.create_buffer(&BufferSpec::new(info.size, usage))?;
                    resource.physical_index = Some(self.physical_buffers.len());
                    self.physical_buffers.push(buffer);
                }
            }
        }
        Ok(())
    }

    fn build_physical_passes(
        &mut self,
        device: &dyn RenderDevice,
        cache: &ResourceCache,
    ) -> Result<(), GraphError> {
        for order_index in 0..self.execution_order.len() {
            let pass_index = self.execution_order[order_index];
            let phys = self.build_physical_pass(device, cache, pass_index)?;
            self.passes[pass_index].physical_index = Some(self.physical_passes.len());
            self.physical_passes.push(phys);
        }
        Ok(())
    }

    fn build_physical_pass(
        &self,
        device: &dyn RenderDevice,
        cache: &ResourceCache,
        pass_index: usize,
    ) -> Result<PhysicalPass, GraphError> {
        let pass = &self.passes[pass_index];

        let mut attachment_descriptions = Vec::new();
        let mut color_refs = Vec::new();
        let mut depth_stencil_ref = None;
        let mut color_attachments = Vec::new();
        let mut depth_attachment = None;
        let mut framebuffer_textures = Vec::new();
        let mut render_area = Extent2d::default();

        for (att_index, write) in pass.image_writes.iter().enumerate() {
            let resource = &self.resources[write.resource];
            let info = resource
                .image_info()
                .copied()
                .unwrap_or_default();
            let physical = resource
                .physical_index
                .map(|i| self.physical_images[i])
                .unwrap_or(TextureHandle::NULL);
            let extent = info.size.resolve(self.back_buffer_extent);
            render_area.width = render_area.width.max(extent.width);
            render_area.height = render_area.height.max(extent.height);
            framebuffer_textures.push(physical);

            let final_layout = self
                .state
                .image_transitions
                .get(&(pass_index, write.resource))
                .map(|t| t.dst.image_layout())
                .unwrap_or(TextureLayout::Undefined);
            attachment_descriptions.push(AttachmentDescription {
                format: info.format,
                samples: info.samples,
                load_op: write.load_op,
                store_op: StoreOp::Store,
                stencil_load_op: LoadOp::DontCare,
                stencil_store_op: StoreOp::DontCare,
                initial_layout: TextureLayout::Undefined,
                final_layout,
            });
            let reference = AttachmentReference {
                attachment: att_index as u32,
                layout: final_layout,
            };
            let rendering_attachment = RenderingAttachment {
                texture: physical,
                format: info.format,
                samples: info.samples,
                load_op: write.load_op,
                store_op: StoreOp::Store,
                final_layout,
                clear: if write.usage == TextureUsage::DEPTH_STENCIL_ATTACHMENT {
                    ClearValue::DEPTH_DEFAULT
                } else {
                    ClearValue::COLOR_DEFAULT
                },
            };
            if write.usage == TextureUsage::DEPTH_STENCIL_ATTACHMENT {
                depth_stencil_ref = Some(reference);
                depth_attachment = Some(rendering_attachment);
            } else {
                color_refs.push(reference);
                color_attachments.push(rendering_attachment);
            }
        }

        let has_attachments = !attachment_descriptions.is_empty();
        let (render_pass, framebuffer) = if has_attachments {
            let render_pass = cache.request_render_pass(
                device,
                &RenderPassSpec {
                    attachments: attachment_descriptions,
                    subpasses: vec![SubpassSpec {
                        color_refs: color_refs.clone(),
                        input_refs: Vec::new(),
                        depth_stencil_ref,
                    }],
                    dependencies: Vec::new(),
                },
            )?;
            let framebuffer = cache.request_framebuffer(
                device,
                &FramebufferSpec {
                    render_pass,
                    attachments: framebuffer_textures,
                    extent: render_area,
                    layers: 1,
                },
            )?;
            (Some(render_pass), Some(framebuffer))
        } else {
            (None, None)
        };

        let mut pipeline_layout = None;
        let mut pipeline = None;
        let mut descriptor_sets = Vec::new();
        let mut bindings = Vec::new();
        if let Some(shader) = pass.shader {
            let layout = cache.request_pipeline_layout(device, shader)?;
            for set_layout in &layout.set_layouts {
                descriptor_sets.push(device.create_descriptor_set(set_layout)?);
            }

            let info = device
                .shader_group_info(shader)
                .ok_or(crate::error::DeviceError::HandleInvalid(shader.raw()))?;
            for (tag, resource_name) in &pass.srd_requests {
                let found = info
                    .descriptor_sets
                    .iter()
                    .flatten()
                    .find(|r| r.name == *resource_name);
                match found {
                    Some(resource) => bindings.push(ResolvedBinding {
                        tag: tag.clone(),
                        resource: resource.clone(),
                    }),
                    None => log::warn!(
                        "pass {:?}: shader resource {:?} not found in reflection",
                        pass.tag,
                        resource_name
                    ),
                }
            }

            if let Some(render_pass) = render_pass {
                let mut state = pass.pipeline_state.clone();
                state
                    .color_blend
                    .attachments
                    .resize(color_refs.len(), Default::default());
                if state.vertex_input == VertexInputState::default() {
                    state.vertex_input = VertexInputState::from_reflection(&info);
                }
                for dynamic in [DynamicState::Viewport, DynamicState::Scissor] {
                    if !state.dynamic_states.contains(&dynamic) {
                        state.dynamic_states.push(dynamic);
                    }
                }
                if let Some(first) = pass.image_writes.first() {
                    if let Some(img_info) = self.resources[first.resource].image_info() {
                        state.multisample.rasterization_samples = img_info.samples;
                    }
                }
                let spec = GraphicsPipelineSpec {
                    shader,
                    render_pass,
                    subpass: 0,
                    state,
                    specialization: pass.specialization.clone(),
                };
                pipeline = Some(cache.request_graphics_pipeline(device, &spec)?);
            } else if pass.queue_flags.intersects(QueueFlags::ASYNC_COMPUTE) {
                pipeline = Some(device.create_pipeline(&PipelineSpec::Compute(
                    ComputePipelineSpec {
                        shader,
                        specialization: pass.specialization.clone(),
                    },
                ))?);
            }
            pipeline_layout = Some(layout);
        }

        // precompute this pass's barrier table, sorted for determinism
        let mut image_barriers: Vec<_> = self
            .state
            .image_transitions
            .iter()
            .filter(|((p, _), _)| *p == pass_index)
            .map(|((_, res), &t)| (*res, t))
            .collect();
        image_barriers.sort_by_key(|&(res, _)| res);
        let mut buffer_barriers: Vec<_> = self
            .state
            .buffer_transitions
            .iter()
            .filter(|((p, _), _)| *p == pass_index)
            .map(|((_, res), &t)| (*res, t))
            .collect();
        buffer_barriers.sort_by_key(|&(res, _)| res);

        Ok(PhysicalPass {
            pass_index,
            render_pass,
            framebuffer,
            pipeline_layout,
            pipeline,
            descriptor_sets,
            color_attachments,
            depth_attachment,
            render_area,
            image_barriers,
            buffer_barriers,
            bindings,
            descriptor_sets_updated: false,
        })
    }

    // ---- execution -----------------------------------------------------

    /// Runs every pass in order into `cmd`, then blits the back buffer into
    /// `present_target` (the acquired swapchain image, left in
    /// `TransferDst`).
    pub fn execute(
        &mut self,
        device: &dyn RenderDevice,
        cmd: CommandBufferHandle,
        present_target: TextureHandle,
    ) -> Result<(), GraphError> {
        if !self.compiled {
            return Err(GraphError::NotCompiled);
        }
        let mut ctx = device
            .command_context(cmd)
            .map_err(GraphError::Device)?;

        if !self.pre_executed {
            self.seed_initial_layouts(ctx.as_mut());
            self.pre_executed = true;
        }

        for phys_index in 0..self.physical_passes.len() {
            self.update_descriptor_sets(device, phys_index);
            self.emit_pass_barrier(ctx.as_mut(), phys_index);

            let phys = &self.physical_passes[phys_index];
            let pass_index = phys.pass_index;
            let has_attachments =
                !phys.color_attachments.is_empty() || phys.depth_attachment.is_some();
            if has_attachments {
                ctx.begin_rendering(&RenderingInfo {
                    color_attachments: &phys.color_attachments,
                    depth_stencil_attachment: phys.depth_attachment,
                    render_area: phys.render_area,
                });
            }
            if let Some(pipeline) = phys.pipeline {
                ctx.bind_pipeline(pipeline, &phys.descriptor_sets);
            }
            if let Some(callback) = self.passes[pass_index].on_execute.as_mut() {
                callback(ctx.as_mut());
            }
            if has_attachments {
                ctx.end_rendering();
            }
        }

        self.copy_to_present(ctx.as_mut(), present_target);
        Ok(())
    }

    /// One-time step after compile: moves every graph-owned image from
    /// `Undefined` into the (ring-patched) layout its first-use barrier
    /// expects, so that every subsequent frame starts consistent.
    fn seed_initial_layouts(&self, ctx: &mut dyn CommandContext) {
        let mut seeds: Vec<(usize, ImageTransition)> = Vec::new();
        for (&res, &pass_index) in &self.state.image_first_use {
            if let Some(transition) = self.state.image_transitions.get(&(pass_index, res)) {
                seeds.push((
                    res,
                    UsageTransition {
                        src: TextureUsage::empty(),
                        dst: transition.src,
                    },
                ));
            }
        }
        seeds.sort_by_key(|&(res, _)| res);
        self.emit_barrier(ctx, &seeds, &[]);
    }

    fn emit_pass_barrier(&self, ctx: &mut dyn CommandContext, phys_index: usize) {
        let phys = &self.physical_passes[phys_index];
        self.emit_barrier(ctx, &phys.image_barriers, &phys.buffer_barriers);
    }

    /// Translates a transition table into one `add_transitions` call,
    /// pruning entries whose source equals their destination unless the
    /// usage is write-dependent.
    fn emit_barrier(
        &self,
        ctx: &mut dyn CommandContext,
        images: &[(usize, ImageTransition)],
        buffers: &[(usize, BufferUsageTransition)],
    ) {
        let mut src_stages = PipelineStageFlags::empty();
        let mut dst_stages = PipelineStageFlags::empty();
        let mut texture_transitions: SmallVec<[TextureTransition; 8]> = SmallVec::new();
        let mut buffer_transitions: SmallVec<[BufferTransition; 4]> = SmallVec::new();

        for &(res, transition) in buffers {
            if transition.src == transition.dst && !transition.src.is_write_dependent() {
                continue;
            }
            let Some(physical) = self.resources[res].physical_index else {
                continue;
            };
            src_stages |= transition.src.pipeline_stages();
            dst_stages |= transition.dst.pipeline_stages();
            buffer_transitions.push(BufferTransition {
                buffer: self.physical_buffers[physical],
                src_usage: transition.src,
                dst_usage: transition.dst,
            });
        }

        for &(res, transition) in images {
            if transition.src == transition.dst && !transition.src.is_write_dependent() {
                continue;
            }
            let Some(physical) = self.resources[res].physical_index else {
                continue;
            };
            src_stages |= transition.src.pipeline_stages();
            dst_stages |= transition.dst.pipeline_stages();
            texture_transitions.push(TextureTransition {
                texture: self.physical_images[physical],
                src_usage: transition.src,
                dst_usage: transition.dst,
            });
        }

        if texture_transitions.is_empty() && buffer_transitions.is_empty() {
            return;
        }
        ctx.add_transitions(
            src_stages,
            dst_stages,
            &[],
            &buffer_transitions,
            &texture_transitions,
        );
    }

    /// Writes the descriptor sets of one pass. Sets are written once after
    /// compile and then considered stable; a renderer that changes bindings
    /// must call [`RenderGraph::invalidate_descriptor_sets`].
    fn update_descriptor_sets(&mut self, device: &dyn RenderDevice, phys_index: usize) {
        if self.physical_passes[phys_index].descriptor_sets_updated {
            return;
        }

        let phys = &self.physical_passes[phys_index];
        let pass = &self.passes[phys.pass_index];
        // writes bucketed by set index
        let mut writes: FxHashMap<u32, Vec<DescriptorWrite>> = FxHashMap::default();

        for binding in &phys.bindings {
            let resource = &binding.resource;
            match resource.ty {
                ShaderResourceType::SamplerWithTexture => {
                    let Some(&sampler) = pass.samplers.get(&binding.tag) else {
                        log::warn!(
                            "pass {:?}: no sampler bound for {:?}",
                            pass.tag,
                            binding.tag
                        );
                        continue;
                    };
                    let mut refs: SmallVec<[DescriptorResource; 1]> = SmallVec::new();
                    if let Some(externals) = pass.external_images.get(&binding.tag) {
                        for &texture in externals {
                            refs.push(DescriptorResource::SamplerWithTexture {
                                sampler,
                                texture,
                                layout: TextureLayout::ShaderReadOnly,
                            });
                        }
                    } else if let Some(texture) = self.internal_texture(&binding.tag) {
                        refs.push(DescriptorResource::SamplerWithTexture {
                            sampler,
                            texture,
                            layout: TextureLayout::ShaderReadOnly,
                        });
                    } else {
                        log::warn!(
                            "pass {:?}: binding {:?} resolves to no image",
                            pass.tag,
                            binding.tag
                        );
                        continue;
                    }
                    writes.entry(resource.set).or_default().push(DescriptorWrite {
                        binding: resource.binding,
                        ty: resource.ty,
                        resources: refs,
                    });
                }
                ShaderResourceType::StorageImage => {
                    if let Some(texture) = self.internal_texture(&binding.tag) {
                        writes.entry(resource.set).or_default().push(DescriptorWrite {
                            binding: resource.binding,
                            ty: resource.ty,
                            resources: smallvec::smallvec![DescriptorResource::StorageImage {
                                texture,
                            }],
                        });
                    }
                }
                ShaderResourceType::UniformBuffer | ShaderResourceType::StorageBuffer => {
                    let buffer = pass
                        .external_buffers
                        .get(&binding.tag)
                        .copied()
                        .or_else(|| self.internal_buffer(&binding.tag));
                    let Some(buffer) = buffer else {
                        log::warn!(
                            "pass {:?}: binding {:?} resolves to no buffer",
                            pass.tag,
                            binding.tag
                        );
                        continue;
                    };
                    writes.entry(resource.set).or_default().push(DescriptorWrite {
                        binding: resource.binding,
                        ty: resource.ty,
                        resources: smallvec::smallvec![DescriptorResource::Buffer {
                            buffer,
                            offset: 0,
                            range: None,
                        }],
                    });
                }
                other => {
                    log::warn!(
                        "pass {:?}: descriptor type {:?} is not updated by the graph",
                        pass.tag,
                        other
                    );
                }
            }
        }

        let mut set_indices: Vec<u32> = writes.keys().copied().collect();
        set_indices.sort_unstable();
        for set_index in set_indices {
            if let Some(&set) = phys.descriptor_sets.get(set_index as usize) {
                device.update_descriptor_set(set, &writes[&set_index]);
            }
        }
        self.physical_passes[phys_index].descriptor_sets_updated = true;
    }

    /// Re-arms the one-time descriptor update of a pass after its bindings
    /// changed.
    pub fn invalidate_descriptor_sets(&mut self, pass_tag: &str) {
        if let Some(&pass_index) = self.pass_index.get(pass_tag) {
            if let Some(phys_index) = self.passes[pass_index].physical_index {
                self.physical_passes[phys_index].descriptor_sets_updated = false;
            }
        }
    }

    /// Blits the back buffer into the acquired swapchain image, then puts
    /// the back buffer back into the layout its first-use barrier expects
    /// next frame.
    fn copy_to_present(
        &self,
        ctx: &mut dyn CommandContext,
        present_target: TextureHandle,
    ) {
        let Some(tag) = &self.back_buffer_tag else {
            return;
        };
        let Some(&res) = self.res_index.get(tag) else {
            return;
        };
        let (Some(&first_pass), Some(&last_pass)) = (
            self.state.image_first_use.get(&res),
            self.state.image_last_use.get(&res),
        ) else {
            return;
        };
        let Some(physical) = self.resources[res].physical_index else {
            return;
        };
        let back_buffer = self.physical_images[physical];

        let last_usage = self
            .state
            .image_transitions
            .get(&(last_pass, res))
            .map(|t| t.dst)
            .unwrap_or_default();
        let first_usage = self
            .state
            .image_transitions
            .get(&(first_pass, res))
            .map(|t| t.src)
            .unwrap_or_default();

        ctx.blit_texture(back_buffer, last_usage, present_target, TextureUsage::empty());

        // the blit left the back buffer in TransferSrc; restore the layout
        // the next frame's first pass will transition from
        if first_usage != TextureUsage::TRANSFER_SRC {
            ctx.add_transitions(
                PipelineStageFlags::TRANSFER,
                first_usage.pipeline_stages(),
                &[],
                &[],
                &[TextureTransition {
                    texture: back_buffer,
                    src_usage: TextureUsage::TRANSFER_SRC,
                    dst_usage: first_usage,
                }],
            );
        }
    }

    // ---- introspection -------------------------------------------------

    /// The compiled execution order, as pass tags.
    pub fn execution_order(&self) -> Vec<&str> {
        self.execution_order
            .iter()
            .map(|&i| self.passes[i].tag.as_str())
            .collect()
    }

    /// The physical texture backing a logical image.
    pub fn physical_texture(&self, tag: &str) -> Option<TextureHandle> {
        let res = self.resource_index(tag)?;
        let physical = self.resources[res].physical_index?;
        self.resources[res]
            .is_image()
            .then(|| self.physical_images[physical])
    }

    /// The physical buffer backing a logical buffer.
    pub fn physical_buffer(&self, tag: &str) -> Option<BufferHandle> {
        let res = self.resource_index(tag)?;
        let physical = self.resources[res].physical_index?;
        (!self.resources[res].is_image()).then(|| self.physical_buffers[physical])
    }

    fn internal_texture(&self, tag: &str) -> Option<TextureHandle> {
        self.physical_texture(tag)
    }

    fn internal_buffer(&self, tag: &str) -> Option<BufferHandle> {
        self.physical_buffer(tag)
    }

    /// The recorded transition of `resource` at `pass`, for inspection.
    pub fn image_transition(&self, pass_tag: &str, resource_tag: &str) -> Option<ImageTransition> {
        let pass = *self.pass_index.get(pass_tag)?;
        let res = self.resource_index(resource_tag)?;
        self.state.image_transitions.get(&(pass, res)).copied()
    }

    /// First-use and last-use pass tags of a resource, after compile.
    pub fn resource_lifetime(&self, resource_tag: &str) -> Option<(&str, &str)> {
        let res = self.resource_index(resource_tag)?;
        let (first, last) = if self.resources[res].is_image() {
            (
                self.state.image_first_use.get(&res)?,
                self.state.image_last_use.get(&res)?,
            )
        } else {
            (
                self.state.buffer_first_use.get(&res)?,
                self.state.buffer_last_use.get(&res)?,
            )
        };
        Some((
            self.passes[*first].tag.as_str(),
            self.passes[*last].tag.as_str(),
        ))
    }

    /// The cached render pass of a compiled pass.
    pub fn render_pass_of(&self, pass_tag: &str) -> Option<RenderPassHandle> {
        let pass = *self.pass_index.get(pass_tag)?;
        let phys = self.passes[pass].physical_index?;
        self.physical_passes[phys].render_pass
    }

    /// The cached framebuffer of a compiled pass.
    pub fn framebuffer_of(&self, pass_tag: &str) -> Option<FramebufferHandle> {
        let pass = *self.pass_index.get(pass_tag)?;
        let phys = self.passes[pass].physical_index?;
        self.physical_passes[phys].framebuffer
    }

    /// The pipeline layout shape of a compiled pass.
    pub fn pipeline_layout_of(&self, pass_tag: &str) -> Option<PipelineLayoutInfo> {
        let pass = *self.pass_index.get(pass_tag)?;
        let phys = self.passes[pass].physical_index?;
        self.physical_passes[phys].pipeline_layout.clone()
    }

    /// Destroys the graph-owned physical resources; the caller must have
    /// waited for the device first.
    pub fn release_physical_resources(&mut self, device: &dyn RenderDevice) {
        for texture in self.physical_images.drain(..) {
            device.destroy_texture(texture);
        }
        for buffer in self.physical_buffers.drain(..) {
            device.destroy_buffer(buffer);
        }
        for phys in &mut self.physical_passes {
            for set in phys.descriptor_sets.drain(..) {
                device.destroy_descriptor_set(set);
            }
        }
        for resource in &mut self.resources {
            resource.physical_index = None;
        }
    }
}

fn image_dimensions(extent: Extent3d, layers: u32) -> Dimensions {
    if extent.depth > 1 {
        Dimensions::Dim3d {
            width: extent.width,
            height: extent.height,
            depth: extent.depth,
        }
    } else if layers > 1 {
        Dimensions::Dim2dArray {
            width: extent.width,
            height: extent.height,
            array_layers: layers,
        }
    } else {
        Dimensions::Dim2d {
            width: extent.width,
            height: extent.height,
        }
    }
}
