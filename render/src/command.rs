//! Deferred command lists.
//!
//! A command list is an intrusive forward chain of command records bump-
//! allocated from a list-owned arena: appending costs one allocation bump
//! and one pointer write. Commands are plain data; variable-length payloads
//! (copy regions, transition batches) are slices living in the same arena,
//! allocated directly behind the command that owns them. Nothing here needs
//! a destructor, so releasing the arena releases the whole list.
//!
//! Replay walks the chain in insertion order and translates each record
//! into a call on a [`CommandContext`].

use crate::buffer::{BufferTransition, MemoryTransition};
use crate::device::{CommandContext, DrawIndexedParams, RenderingInfo};
use crate::handle::{BufferHandle, DescriptorSetHandle, PipelineHandle, TextureHandle};
use crate::pipeline::{ScissorRect, Viewport};
use crate::renderpass::RenderingAttachment;
use crate::sync::PipelineStageFlags;
use crate::texture::{
    BufferTextureCopyRegion, Extent2d, TextureLayout, TextureTransition, TextureUsage,
};
use bumpalo::Bump;
use std::cell::Cell;

/// The arena a list allocates from. Owned by the frame record and reset
/// only after the GPU finished the submission that consumed the list.
#[derive(Default)]
pub struct CommandArena {
    bump: Bump,
}

impl CommandArena {
    pub fn new() -> CommandArena {
        CommandArena { bump: Bump::new() }
    }

    pub fn with_capacity(bytes: usize) -> CommandArena {
        CommandArena {
            bump: Bump::with_capacity(bytes),
        }
    }

    /// Releases every allocation at once. Callers must ensure no list built
    /// from this arena is still pending on the GPU.
    pub fn reset(&mut self) {
        self.bump.reset();
    }

    pub fn allocated_bytes(&self) -> usize {
        self.bump.allocated_bytes()
    }
}

/// One recorded command. Everything is `Copy`: commands never own heap
/// memory, which is what lets list destruction skip them entirely.
#[derive(Copy, Clone, Debug)]
pub enum Command<'a> {
    BeginRendering {
        color_attachments: &'a [RenderingAttachment],
        depth_stencil_attachment: Option<RenderingAttachment>,
        render_area: Extent2d,
    },
    EndRendering,
    SetViewport(Viewport),
    SetScissor(ScissorRect),
    SetDepthBias {
        constant_factor: f32,
        clamp: f32,
        slope_factor: f32,
    },
    SetLineWidth(f32),
    SetBlendConstants([f32; 4]),
    BindPipeline {
        pipeline: PipelineHandle,
        descriptor_sets: &'a [DescriptorSetHandle],
    },
    BindVertexBuffer {
        buffer: BufferHandle,
        offset: u64,
    },
    Draw {
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    },
    DrawIndexed(DrawIndexedParams),
    DrawIndexedIndirect {
        indirect_buffer: BufferHandle,
        index_buffer: BufferHandle,
        offset: u64,
        draw_count: u32,
        stride: u32,
    },
    Dispatch {
        group_count_x: u32,
        group_count_y: u32,
        group_count_z: u32,
    },
    DispatchIndirect {
        indirect_buffer: BufferHandle,
        offset: u64,
    },
    CopyBuffer {
        src: BufferHandle,
        src_offset: u64,
        dst: BufferHandle,
        dst_offset: u64,
        size: u64,
    },
    CopyBufferToTexture {
        src: BufferHandle,
        dst: TextureHandle,
        regions: &'a [BufferTextureCopyRegion],
    },
    BlitTexture {
        src: TextureHandle,
        src_usage: TextureUsage,
        dst: TextureHandle,
        dst_usage: TextureUsage,
    },
    GenTextureMipmaps {
        texture: TextureHandle,
    },
    AddTransitions {
        src_stages: PipelineStageFlags,
        dst_stages: PipelineStageFlags,
        memory: &'a [MemoryTransition],
        buffers: &'a [BufferTransition],
        textures: &'a [TextureTransition],
    },
    AddTextureTransition {
        texture: TextureHandle,
        new_layout: TextureLayout,
    },
}

impl<'a> Command<'a> {
    fn execute(&self, ctx: &mut dyn CommandContext) {
        match *self {
            Command::BeginRendering {
                color_attachments,
                depth_stencil_attachment,
                render_area,
            } => ctx.begin_rendering(&RenderingInfo {
                color_attachments,
                depth_stencil_attachment,
                render_area,
            }),
            Command::EndRendering => ctx.end_rendering(),
            Command::SetViewport(ref viewport) => ctx.set_viewport(viewport),
            Command::SetScissor(ref scissor) => ctx.set_scissor(scissor),
            Command::SetDepthBias {
                constant_factor,
                clamp,
                slope_factor,
            } => ctx.set_depth_bias(constant_factor, clamp, slope_factor),
            Command::SetLineWidth(width) => ctx.set_line_width(width),
            Command::SetBlendConstants(constants) => ctx.set_blend_constants(constants),
            Command::BindPipeline {
                pipeline,
                descriptor_sets,
            } => ctx.bind_pipeline(pipeline, descriptor_sets),
            Command::BindVertexBuffer { buffer, offset } => ctx.bind_vertex_buffer(buffer, offset),
            Command::Draw {
                vertex_count,
                instance_count,
                first_vertex,
                first_instance,
            } => ctx.draw(vertex_count, instance_count, first_vertex, first_instance),
            Command::DrawIndexed(ref params) => ctx.draw_indexed(params),
            Command::DrawIndexedIndirect {
                indirect_buffer,
                index_buffer,
                offset,
                draw_count,
                stride,
            } => ctx.draw_indexed_indirect(indirect_buffer, index_buffer, offset, draw_count, stride),
            Command::Dispatch {
                group_count_x,
                group_count_y,
                group_count_z,
            } => ctx.dispatch(group_count_x, group_count_y, group_count_z),
            Command::DispatchIndirect {
                indirect_buffer,
                offset,
            } => ctx.dispatch_indirect(indirect_buffer, offset),
            Command::CopyBuffer {
                src,
                src_offset,
                dst,
                dst_offset,
                size,
            } => ctx.copy_buffer(src, src_offset, dst, dst_offset, size),
            Command::CopyBufferToTexture { src, dst, regions } => {
                ctx.copy_buffer_to_texture(src, dst, regions)
            }
            Command::BlitTexture {
                src,
                src_usage,
                dst,
                dst_usage,
            } => ctx.blit_texture(src, src_usage, dst, dst_usage),
            Command::GenTextureMipmaps { texture } => ctx.gen_texture_mipmaps(texture),
            Command::AddTransitions {
                src_stages,
                dst_stages,
                memory,
                buffers,
                textures,
            } => ctx.add_transitions(src_stages, dst_stages, memory, buffers, textures),
            Command::AddTextureTransition {
                texture,
                new_layout,
            } => ctx.add_texture_transition(texture, new_layout),
        }
    }
}

struct CommandNode<'a> {
    cmd: Command<'a>,
    next: Cell<Option<&'a CommandNode<'a>>>,
}

/// A recorded, replayable command list.
pub struct DeferredCommandList<'a> {
    arena: &'a Bump,
    head: Cell<Option<&'a CommandNode<'a>>>,
    tail: Cell<Option<&'a CommandNode<'a>>>,
    len: Cell<u32>,
}

impl<'a> DeferredCommandList<'a> {
    pub fn new(arena: &'a CommandArena) -> DeferredCommandList<'a> {
        DeferredCommandList {
            arena: &arena.bump,
            head: Cell::new(None),
            tail: Cell::new(None),
            len: Cell::new(0),
        }
    }

    /// Number of recorded commands.
    pub fn len(&self) -> u32 {
        self.len.get()
    }

    pub fn is_empty(&self) -> bool {
        self.len.get() == 0
    }

    fn push(&self, cmd: Command<'a>) {
        let node = self.arena.alloc(CommandNode {
            cmd,
            next: Cell::new(None),
        });
        match self.tail.get() {
            Some(tail) => tail.next.set(Some(node)),
            None => self.head.set(Some(node)),
        }
        self.tail.set(Some(node));
        self.len.set(self.len.get() + 1);
    }

    /// Replays the recorded commands, in insertion order, against `ctx`.
    pub fn replay(&self, ctx: &mut dyn CommandContext) {
        let mut cursor = self.head.get();
        while let Some(node) = cursor {
            node.cmd.execute(ctx);
            cursor = node.next.get();
        }
    }

    /// Iterates the recorded commands without executing them.
    pub fn iter(&self) -> impl Iterator<Item = &Command<'a>> {
        let mut cursor = self.head.get();
        std::iter::from_fn(move || {
            let node = cursor?;
            cursor = node.next.get();
            Some(&node.cmd)
        })
    }

    // ---- recording -----------------------------------------------------

    pub fn begin_rendering(&self, info: &RenderingInfo<'_>) {
        // the variable-length tail lands in the arena right behind the node
        let color_attachments = self.arena.alloc_slice_copy(info.color_attachments);
        self.push(Command::BeginRendering {
            color_attachments,
            depth_stencil_attachment: info.depth_stencil_attachment,
            render_area: info.render_area,
        });
    }

    pub fn end_rendering(&self) {
        self.push(Command::EndRendering);
    }

    pub fn set_viewport(&self, viewport: Viewport) {
        self.push(Command::SetViewport(viewport));
    }

    pub fn set_scissor(&self, scissor: ScissorRect) {
        self.push(Command::SetScissor(scissor));
    }

    pub fn set_depth_bias(&self, constant_factor: f32, clamp: f32, slope_factor: f32) {
        self.push(Command::SetDepthBias {
            constant_factor,
            clamp,
            slope_factor,
        });
    }

    pub fn set_line_width(&self, width: f32) {
        self.push(Command::SetLineWidth(width));
    }

    pub fn set_blend_constants(&self, constants: [f32; 4]) {
        self.push(Command::SetBlendConstants(constants));
    }

    pub fn bind_pipeline(&self, pipeline: PipelineHandle, descriptor_sets: &[DescriptorSetHandle]) {
        let descriptor_sets = self.arena.alloc_slice_copy(descriptor_sets);
        self.push(Command::BindPipeline {
            pipeline,
            descriptor_sets,
        });
    }

    pub fn bind_vertex_buffer(&self, buffer: BufferHandle, offset: u64) {
        self.push(Command::BindVertexBuffer { buffer, offset });
    }

    pub fn draw(&self, vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32) {
        self.push(Command::Draw {
            vertex_count,
            instance_count,
            first_vertex,
            first_instance,
        });
    }

    pub fn draw_indexed(&self, params: DrawIndexedParams) {
        self.push(Command::DrawIndexed(params));
    }

    pub fn draw_indexed_indirect(
        &self,
        indirect_buffer: BufferHandle,
        index_buffer: BufferHandle,
        offset: u64,
        draw_count: u32,
        stride: u32,
    ) {
        self.push(Command::DrawIndexedIndirect {
            indirect_buffer,
            index_buffer,
            offset,
            draw_count,
            stride,
        });
    }

    pub fn dispatch(&self, group_count_x: u32, group_count_y: u32, group_count_z: u32) {
        self.push(Command::Dispatch {
            group_count_x,
            group_count_y,
            group_count_z,
        });
    }

    pub fn dispatch_indirect(&self, indirect_buffer: BufferHandle, offset: u64) {
        self.push(Command::DispatchIndirect {
            indirect_buffer,
            offset,
        });
    }

    pub fn copy_buffer(
        &self,
        src: BufferHandle,
        src_offset: u64,
        dst: BufferHandle,
        dst_offset: u64,
        size: u64,
    ) {
        self.push(Command::CopyBuffer {
            src,
            src_offset,
            dst,
            dst_offset,
            size,
        });
    }

    pub fn copy_buffer_to_texture(
        &self,
        src: BufferHandle,
        dst: TextureHandle,
        regions: &[BufferTextureCopyRegion],
    ) {
        let regions = self.arena.alloc_slice_copy(regions);
        self.push(Command::CopyBufferToTexture { src, dst, regions });
    }

    pub fn blit_texture(
        &self,
        src: TextureHandle,
        src_usage: TextureUsage,
        dst: TextureHandle,
        dst_usage: TextureUsage,
    ) {
        self.push(Command::BlitTexture {
            src,
            src_usage,
            dst,
            dst_usage,
        });
    }

    pub fn gen_texture_mipmaps(&self, texture: TextureHandle) {
        self.push(Command::GenTextureMipmaps { texture });
    }

    pub fn add_transitions(
        &self,
        src_stages: PipelineStageFlags,
        dst_stages: PipelineStageFlags,
        memory: &[MemoryTransition],
        buffers: &[BufferTransition],
        textures: &[TextureTransition],
    ) {
        let memory = self.arena.alloc_slice_copy(memory);
        let buffers = self.arena.alloc_slice_copy(buffers);
        let textures = self.arena.alloc_slice_copy(textures);
        self.push(Command::AddTransitions {
            src_stages,
            dst_stages,
            memory,
            buffers,
            textures,
        });
    }

    pub fn add_texture_transition(&self, texture: TextureHandle, new_layout: TextureLayout) {
        self.push(Command::AddTextureTransition {
            texture,
            new_layout,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct CountingContext {
        ops: Vec<&'static str>,
        draw_args: Vec<(u32, u32, u32, u32)>,
    }

    impl CommandContext for CountingContext {
        fn begin_rendering(&mut self, _info: &RenderingInfo<'_>) {
            self.ops.push("begin_rendering");
        }
        fn end_rendering(&mut self) {
            self.ops.push("end_rendering");
        }
        fn set_viewport(&mut self, _viewport: &Viewport) {
            self.ops.push("set_viewport");
        }
        fn set_scissor(&mut self, _scissor: &ScissorRect) {
            self.ops.push("set_scissor");
        }
        fn set_depth_bias(&mut self, _c: f32, _cl: f32, _s: f32) {
            self.ops.push("set_depth_bias");
        }
        fn set_line_width(&mut self, _width: f32) {
            self.ops.push("set_line_width");
        }
        fn set_blend_constants(&mut self, _constants: [f32; 4]) {
            self.ops.push("set_blend_constants");
        }
        fn bind_pipeline(&mut self, _p: PipelineHandle, _d: &[DescriptorSetHandle]) {
            self.ops.push("bind_pipeline");
        }
        fn bind_vertex_buffer(&mut self, _b: BufferHandle, _o: u64) {
            self.ops.push("bind_vertex_buffer");
        }
        fn draw(&mut self, v: u32, i: u32, fv: u32, fi: u32) {
            self.ops.push("draw");
            self.draw_args.push((v, i, fv, fi));
        }
        fn draw_indexed(&mut self, _params: &DrawIndexedParams) {
            self.ops.push("draw_indexed");
        }
        fn draw_indexed_indirect(
            &mut self,
            _ib: BufferHandle,
            _xb: BufferHandle,
            _o: u64,
            _dc: u32,
            _s: u32,
        ) {
            self.ops.push("draw_indexed_indirect");
        }
        fn dispatch(&mut self, _x: u32, _y: u32, _z: u32) {
            self.ops.push("dispatch");
        }
        fn dispatch_indirect(&mut self, _b: BufferHandle, _o: u64) {
            self.ops.push("dispatch_indirect");
        }
        fn copy_buffer(&mut self, _s: BufferHandle, _so: u64, _d: BufferHandle, _do: u64, _n: u64) {
            self.ops.push("copy_buffer");
        }
        fn copy_buffer_to_texture(
            &mut self,
            _s: BufferHandle,
            _d: TextureHandle,
            regions: &[BufferTextureCopyRegion],
        ) {
            assert!(!regions.is_empty());
            self.ops.push("copy_buffer_to_texture");
        }
        fn blit_texture(
            &mut self,
            _s: TextureHandle,
            _su: TextureUsage,
            _d: TextureHandle,
            _du: TextureUsage,
        ) {
            self.ops.push("blit_texture");
        }
        fn gen_texture_mipmaps(&mut self, _t: TextureHandle) {
            self.ops.push("gen_texture_mipmaps");
        }
        fn add_transitions(
            &mut self,
            _ss: PipelineStageFlags,
            _ds: PipelineStageFlags,
            _m: &[MemoryTransition],
            _b: &[BufferTransition],
            _t: &[TextureTransition],
        ) {
            self.ops.push("add_transitions");
        }
        fn add_texture_transition(&mut self, _t: TextureHandle, _l: TextureLayout) {
            self.ops.push("add_texture_transition");
        }
    }

    #[test]
    fn replay_preserves_insertion_order() {
        let arena = CommandArena::new();
        let list = DeferredCommandList::new(&arena);
        list.set_viewport(Viewport {
            x: 0.0,
            y: 0.0,
            width: 640.0,
            height: 480.0,
            min_depth: 0.0,
            max_depth: 1.0,
        });
        list.bind_pipeline(PipelineHandle::NULL, &[]);
        list.draw(3, 1, 0, 0);
        list.end_rendering();
        assert_eq!(list.len(), 4);

        let mut ctx = CountingContext::default();
        list.replay(&mut ctx);
        assert_eq!(
            ctx.ops,
            vec!["set_viewport", "bind_pipeline", "draw", "end_rendering"]
        );
        assert_eq!(ctx.draw_args, vec![(3, 1, 0, 0)]);
    }

    #[test]
    fn variable_tails_survive_in_the_arena() {
        let arena = CommandArena::new();
        let list = DeferredCommandList::new(&arena);
        let regions = [BufferTextureCopyRegion::default(); 3];
        list.copy_buffer_to_texture(BufferHandle::NULL, TextureHandle::NULL, &regions);

        let recorded: Vec<_> = list.iter().collect();
        assert_eq!(recorded.len(), 1);
        match recorded[0] {
            Command::CopyBufferToTexture { regions, .. } => assert_eq!(regions.len(), 3),
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn replay_twice_observes_the_same_sequence() {
        let arena = CommandArena::new();
        let list = DeferredCommandList::new(&arena);
        list.dispatch(8, 8, 1);
        list.add_texture_transition(TextureHandle::NULL, TextureLayout::ShaderReadOnly);

        let mut first = CountingContext::default();
        let mut second = CountingContext::default();
        list.replay(&mut first);
        list.replay(&mut second);
        assert_eq!(first.ops, second.ops);
    }
}
