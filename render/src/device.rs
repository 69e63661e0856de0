//! The device and command-context traits every backend implements.
//!
//! All operations speak in handles and plain descriptor structs, so the
//! core (render graph, frame pacer, caches, tests) never sees an API type.

use crate::buffer::{BufferSpec, BufferTransition, MemoryTransition};
use crate::descriptor::{DescriptorSetLayoutSpec, DescriptorWrite};
use crate::error::DeviceResult;
use crate::format::Format;
use crate::handle::*;
use crate::pipeline::{PipelineSpec, ScissorRect, Viewport};
use crate::renderpass::{FramebufferSpec, RenderPassSpec, RenderingAttachment};
use crate::shader::{ShaderGroupInfo, ShaderGroupSpec};
use crate::sync::PipelineStageFlags;
use crate::texture::{
    BufferTextureCopyRegion, Extent2d, SamplerSpec, TextureLayout, TextureSpec, TextureTransition,
    TextureUsage,
};

/// Which hardware queue a pass or submission targets.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum QueueClass {
    Graphics,
    AsyncCompute,
    Transfer,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum CommandBufferLevel {
    Primary,
    Secondary,
}

/// How a command pool recycles its buffers at frame boundaries.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum CommandPoolResetMode {
    /// The whole pool resets at once; buffers are re-requested each frame.
    ResetPool,
    /// Buffers reset individually on `begin`.
    ResetBuffer,
}

/// Parameters of an indexed draw. The index format is fixed to 32-bit.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct DrawIndexedParams {
    pub index_buffer: BufferHandle,
    pub offset: u64,
    pub index_count: u32,
    pub instance_count: u32,
    pub first_index: u32,
    pub vertex_offset: i32,
    pub first_instance: u32,
}

/// One queue submission.
#[derive(Clone, Debug, Default)]
pub struct SubmitInfo {
    pub command_buffers: Vec<CommandBufferHandle>,
    pub wait_semaphores: Vec<(SemaphoreHandle, PipelineStageFlags)>,
    pub signal_semaphores: Vec<SemaphoreHandle>,
}

/// Result of a successful swapchain image acquisition.
#[derive(Copy, Clone, Debug)]
pub struct AcquiredImage {
    pub image_index: u32,
    /// The swapchain still works but no longer matches the surface; the
    /// caller should recreate it at the next opportunity.
    pub suboptimal: bool,
}

#[derive(Copy, Clone, Debug)]
pub struct SwapchainInfo {
    pub image_count: u32,
    pub format: Format,
    pub extent: Extent2d,
}

/// Surface properties consulted on resize.
#[derive(Copy, Clone, Debug)]
pub struct SurfaceCapabilities {
    /// `None` when the surface reports the sentinel "undefined" extent.
    pub current_extent: Option<Extent2d>,
    pub min_extent: Extent2d,
    pub max_extent: Extent2d,
}

/// A borrowed view of a dynamic rendering scope, as recorded in command
/// lists.
#[derive(Copy, Clone, Debug)]
pub struct RenderingInfo<'a> {
    pub color_attachments: &'a [RenderingAttachment],
    pub depth_stencil_attachment: Option<RenderingAttachment>,
    pub render_area: Extent2d,
}

/// Unbounded fence wait.
pub const WAIT_FOREVER: u64 = u64::MAX;

/// Creates and destroys GPU objects and drives queues. Object-safe; the
/// renderer passes `&dyn RenderDevice` down through explicit context
/// structs.
pub trait RenderDevice: Send + Sync {
    fn name(&self) -> &str;

    // ---- resources -----------------------------------------------------

    fn create_buffer(&self, spec: &BufferSpec) -> DeviceResult<BufferHandle>;
    fn destroy_buffer(&self, buffer: BufferHandle);
    /// Byte size the buffer was created with.
    fn buffer_size(&self, buffer: BufferHandle) -> u64;
    /// Writes into a host-visible buffer.
    fn write_buffer(&self, buffer: BufferHandle, offset: u64, data: &[u8]) -> DeviceResult<()>;

    fn create_texture(&self, spec: &TextureSpec) -> DeviceResult<TextureHandle>;
    fn destroy_texture(&self, texture: TextureHandle);
    fn texture_spec(&self, texture: TextureHandle) -> Option<TextureSpec>;

    fn create_sampler(&self, spec: &SamplerSpec) -> DeviceResult<SamplerHandle>;
    fn destroy_sampler(&self, sampler: SamplerHandle);

    /// Reflects the group and creates the per-stage shader modules.
    fn create_shader(&self, spec: &ShaderGroupSpec) -> DeviceResult<ShaderHandle>;
    fn destroy_shader(&self, shader: ShaderHandle);
    fn shader_group_info(&self, shader: ShaderHandle) -> Option<ShaderGroupInfo>;

    fn create_render_pass(&self, spec: &RenderPassSpec) -> DeviceResult<RenderPassHandle>;
    fn destroy_render_pass(&self, render_pass: RenderPassHandle);

    fn create_framebuffer(&self, spec: &FramebufferSpec) -> DeviceResult<FramebufferHandle>;
    fn destroy_framebuffer(&self, framebuffer: FramebufferHandle);

    fn create_pipeline(&self, spec: &PipelineSpec) -> DeviceResult<PipelineHandle>;
    fn destroy_pipeline(&self, pipeline: PipelineHandle);

    fn create_descriptor_set(
        &self,
        layout: &DescriptorSetLayoutSpec,
    ) -> DeviceResult<DescriptorSetHandle>;
    fn update_descriptor_set(&self, set: DescriptorSetHandle, writes: &[DescriptorWrite]);
    fn destroy_descriptor_set(&self, set: DescriptorSetHandle);

    // ---- command pools and buffers ------------------------------------

    fn create_command_pool(
        &self,
        queue: QueueClass,
        reset_mode: CommandPoolResetMode,
    ) -> DeviceResult<CommandPoolHandle>;
    fn reset_command_pool(&self, pool: CommandPoolHandle) -> DeviceResult<()>;
    fn destroy_command_pool(&self, pool: CommandPoolHandle);

    /// Returns a recycled command buffer from the pool, or allocates one.
    fn get_or_create_command_buffer(
        &self,
        pool: CommandPoolHandle,
        level: CommandBufferLevel,
    ) -> DeviceResult<CommandBufferHandle>;
    /// One-time-submit begin.
    fn begin_command_buffer(&self, cmd: CommandBufferHandle) -> DeviceResult<()>;
    fn end_command_buffer(&self, cmd: CommandBufferHandle) -> DeviceResult<()>;

    /// Borrows a recording context that translates portable commands into
    /// API commands on `cmd`.
    fn command_context<'a>(
        &'a self,
        cmd: CommandBufferHandle,
    ) -> DeviceResult<Box<dyn CommandContext + 'a>>;

    // ---- sync objects --------------------------------------------------

    fn create_fence(&self, signaled: bool) -> DeviceResult<FenceHandle>;
    fn destroy_fence(&self, fence: FenceHandle);
    fn reset_fences(&self, fences: &[FenceHandle]);
    /// Waits for all fences; `DeviceError::Timeout` is recoverable and the
    /// caller decides how to proceed.
    fn wait_for_fences(&self, fences: &[FenceHandle], timeout_ns: u64) -> DeviceResult<()>;

    fn create_semaphore(&self) -> DeviceResult<SemaphoreHandle>;
    fn destroy_semaphore(&self, semaphore: SemaphoreHandle);

    // ---- queues --------------------------------------------------------

    fn submit(
        &self,
        queue: QueueClass,
        info: &SubmitInfo,
        fence: Option<FenceHandle>,
    ) -> DeviceResult<()>;
    /// Submits on a dedicated fence, waits, and resets it; used by resource
    /// uploads.
    fn submit_immediate(&self, queue: QueueClass, cmd: CommandBufferHandle) -> DeviceResult<()>;
    fn wait_idle(&self);

    // ---- swapchain -----------------------------------------------------

    fn create_swapchain(&self, surface: SurfaceHandle, vsync: bool)
        -> DeviceResult<SwapchainHandle>;
    /// Rebuilds the swapchain at the given extent, chaining the old one.
    fn resize_swapchain(&self, swapchain: SwapchainHandle, extent: Extent2d) -> DeviceResult<()>;
    fn destroy_swapchain(&self, swapchain: SwapchainHandle);
    fn swapchain_info(&self, swapchain: SwapchainHandle) -> DeviceResult<SwapchainInfo>;
    /// The texture backing one swapchain image.
    fn swapchain_texture(
        &self,
        swapchain: SwapchainHandle,
        image_index: u32,
    ) -> DeviceResult<TextureHandle>;
    fn surface_capabilities(&self, surface: SurfaceHandle) -> DeviceResult<SurfaceCapabilities>;

    fn acquire_next_image(
        &self,
        swapchain: SwapchainHandle,
        signal: SemaphoreHandle,
    ) -> DeviceResult<AcquiredImage>;
    fn present(
        &self,
        swapchain: SwapchainHandle,
        image_index: u32,
        wait: SemaphoreHandle,
    ) -> DeviceResult<()>;
}

/// Records GPU work. Recording operations are infallible at the API level;
/// invalid handles degrade to no-ops in release builds.
pub trait CommandContext {
    fn begin_rendering(&mut self, info: &RenderingInfo<'_>);
    fn end_rendering(&mut self);

    fn set_viewport(&mut self, viewport: &Viewport);
    fn set_scissor(&mut self, scissor: &ScissorRect);
    fn set_depth_bias(&mut self, constant_factor: f32, clamp: f32, slope_factor: f32);
    fn set_line_width(&mut self, width: f32);
    fn set_blend_constants(&mut self, constants: [f32; 4]);

    /// Binding a new pipeline invalidates previously bound descriptor sets
    /// only if the layouts differ.
    fn bind_pipeline(&mut self, pipeline: PipelineHandle, descriptor_sets: &[DescriptorSetHandle]);
    /// All vertex attributes are packed in one buffer.
    fn bind_vertex_buffer(&mut self, buffer: BufferHandle, offset: u64);

    fn draw(&mut self, vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32);
    fn draw_indexed(&mut self, params: &DrawIndexedParams);
    fn draw_indexed_indirect(
        &mut self,
        indirect_buffer: BufferHandle,
        index_buffer: BufferHandle,
        offset: u64,
        draw_count: u32,
        stride: u32,
    );
    fn dispatch(&mut self, group_count_x: u32, group_count_y: u32, group_count_z: u32);
    fn dispatch_indirect(&mut self, indirect_buffer: BufferHandle, offset: u64);

    fn copy_buffer(
        &mut self,
        src: BufferHandle,
        src_offset: u64,
        dst: BufferHandle,
        dst_offset: u64,
        size: u64,
    );
    fn copy_buffer_to_texture(
        &mut self,
        src: BufferHandle,
        dst: TextureHandle,
        regions: &[BufferTextureCopyRegion],
    );
    /// Transitions both textures into transfer layouts from the given
    /// usages and blits the whole of `src` over the whole of `dst`.
    fn blit_texture(
        &mut self,
        src: TextureHandle,
        src_usage: TextureUsage,
        dst: TextureHandle,
        dst_usage: TextureUsage,
    );
    fn gen_texture_mipmaps(&mut self, texture: TextureHandle);

    fn add_transitions(
        &mut self,
        src_stages: PipelineStageFlags,
        dst_stages: PipelineStageFlags,
        memory: &[MemoryTransition],
        buffers: &[BufferTransition],
        textures: &[TextureTransition],
    );
    fn add_texture_transition(&mut self, texture: TextureHandle, new_layout: TextureLayout);
}
