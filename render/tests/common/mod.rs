//! A software device for exercising the core without a GPU: every object is
//! a table entry, every recorded command lands in a shared op log, and the
//! swapchain acquire/present results can be scripted.

#![allow(dead_code)]

pub mod spirv;

use ember_render::buffer::{BufferSpec, BufferTransition, MemoryTransition};
use ember_render::descriptor::{DescriptorSetLayoutSpec, DescriptorWrite};
use ember_render::device::*;
use ember_render::error::{DeviceError, DeviceResult};
use ember_render::handle::*;
use ember_render::pipeline::{PipelineSpec, ScissorRect, Viewport};
use ember_render::renderpass::{FramebufferSpec, RenderPassSpec};
use ember_render::shader::{reflect_shader_group, ShaderGroupInfo, ShaderGroupSpec};
use ember_render::sync::PipelineStageFlags;
use ember_render::texture::{
    BufferTextureCopyRegion, Extent2d, SamplerSpec, TextureLayout, TextureSpec, TextureTransition,
    TextureUsage,
};
use ember_render::Format;
use parking_lot::Mutex;
use std::collections::VecDeque;

/// One recorded context operation, kept coarse enough to assert on.
#[derive(Clone, Debug, PartialEq)]
pub enum Op {
    BeginRendering {
        color_count: usize,
        has_depth: bool,
        extent: Extent2d,
    },
    EndRendering,
    BindPipeline {
        pipeline: PipelineHandle,
        set_count: usize,
    },
    BindVertexBuffer,
    Draw {
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    },
    DrawIndexed,
    DrawIndexedIndirect,
    Dispatch,
    DispatchIndirect,
    SetViewport,
    SetScissor,
    SetDepthBias,
    SetLineWidth,
    SetBlendConstants,
    CopyBuffer {
        src_offset: u64,
        size: u64,
    },
    CopyBufferToTexture {
        dst: TextureHandle,
        regions: Vec<BufferTextureCopyRegion>,
    },
    Blit {
        src: TextureHandle,
        dst: TextureHandle,
    },
    Transitions {
        textures: Vec<(TextureHandle, TextureUsage, TextureUsage)>,
        buffer_count: usize,
    },
    TextureTransition {
        texture: TextureHandle,
        layout: TextureLayout,
    },
    GenMipmaps,
}

struct MockPool {
    allocated: Vec<CommandBufferHandle>,
    next: usize,
    resets: u64,
}

struct MockSwapchain {
    extent: Extent2d,
    format: Format,
    images: Vec<TextureHandle>,
    next_image: u32,
    resizes: u64,
}

#[derive(Default)]
pub struct MockStats {
    pub submits: u64,
    pub immediate_submits: u64,
    pub presents: u64,
    pub fence_waits: u64,
    pub wait_idles: u64,
    pub pool_resets: u64,
    pub buffer_writes: u64,
    /// Total descriptor-write entries, per set handle.
    pub descriptor_writes: fxhash::FxHashMap<DescriptorSetHandle, u64>,
    pub swapchain_resizes: u64,
}

pub struct MockDevice {
    buffers: HandleTable<BufferSpec>,
    textures: HandleTable<TextureSpec>,
    samplers: HandleTable<SamplerSpec>,
    shaders: HandleTable<ShaderGroupInfo>,
    render_passes: HandleTable<RenderPassSpec>,
    framebuffers: HandleTable<FramebufferSpec>,
    pipelines: HandleTable<PipelineSpec>,
    descriptor_sets: HandleTable<DescriptorSetLayoutSpec>,
    command_pools: HandleTable<MockPool>,
    command_buffers: HandleTable<()>,
    swapchains: HandleTable<MockSwapchain>,
    surfaces: HandleTable<()>,
    fences: HandleTable<()>,
    semaphores: HandleTable<()>,
    /// Everything every context recorded, in submission order.
    pub ops: Mutex<Vec<Op>>,
    pub stats: Mutex<MockStats>,
    /// Scripted acquire outcomes; empty means round-robin success.
    pub acquire_script: Mutex<VecDeque<DeviceResult<AcquiredImage>>>,
    pub surface_caps: Mutex<SurfaceCapabilities>,
    pub swapchain_extent: Mutex<Extent2d>,
}

impl MockDevice {
    pub fn new() -> MockDevice {
        MockDevice::with_extent(Extent2d::new(1280, 720))
    }

    pub fn with_extent(extent: Extent2d) -> MockDevice {
        MockDevice {
            buffers: HandleTable::new(HandleKind::Buffer),
            textures: HandleTable::new(HandleKind::Texture),
            samplers: HandleTable::new(HandleKind::Sampler),
            shaders: HandleTable::new(HandleKind::Shader),
            render_passes: HandleTable::new(HandleKind::RenderPass),
            framebuffers: HandleTable::new(HandleKind::Framebuffer),
            pipelines: HandleTable::new(HandleKind::Pipeline),
            descriptor_sets: HandleTable::new(HandleKind::DescriptorSet),
            command_pools: HandleTable::new(HandleKind::CommandPool),
            command_buffers: HandleTable::new(HandleKind::CommandBuffer),
            swapchains: HandleTable::new(HandleKind::Swapchain),
            surfaces: HandleTable::new(HandleKind::Surface),
            fences: HandleTable::new(HandleKind::Fence),
            semaphores: HandleTable::new(HandleKind::Semaphore),
            ops: Mutex::new(Vec::new()),
            stats: Mutex::new(MockStats::default()),
            acquire_script: Mutex::new(VecDeque::new()),
            surface_caps: Mutex::new(SurfaceCapabilities {
                current_extent: Some(extent),
                min_extent: Extent2d::new(1, 1),
                max_extent: Extent2d::new(16384, 16384),
            }),
            swapchain_extent: Mutex::new(extent),
        }
    }

    pub fn create_surface(&self) -> SurfaceHandle {
        SurfaceHandle::from_raw(self.surfaces.insert(())).unwrap()
    }

    pub fn take_ops(&self) -> Vec<Op> {
        std::mem::take(&mut *self.ops.lock())
    }

    pub fn op_count(&self, matcher: impl Fn(&Op) -> bool) -> usize {
        self.ops.lock().iter().filter(|op| matcher(op)).count()
    }

    pub fn live_textures(&self) -> usize {
        self.textures.len()
    }

    pub fn total_descriptor_writes(&self) -> u64 {
        self.stats.lock().descriptor_writes.values().sum()
    }
}

struct MockContext<'a> {
    device: &'a MockDevice,
}

impl<'a> MockContext<'a> {
    fn push(&mut self, op: Op) {
        self.device.ops.lock().push(op);
    }
}

impl<'a> CommandContext for MockContext<'a> {
    fn begin_rendering(&mut self, info: &RenderingInfo<'_>) {
        self.push(Op::BeginRendering {
            color_count: info.color_attachments.len(),
            has_depth: info.depth_stencil_attachment.is_some(),
            extent: info.render_area,
        });
    }

    fn end_rendering(&mut self) {
        self.push(Op::EndRendering);
    }

    fn set_viewport(&mut self, _viewport: &Viewport) {
        self.push(Op::SetViewport);
    }

    fn set_scissor(&mut self, _scissor: &ScissorRect) {
        self.push(Op::SetScissor);
    }

    fn set_depth_bias(&mut self, _constant_factor: f32, _clamp: f32, _slope_factor: f32) {
        self.push(Op::SetDepthBias);
    }

    fn set_line_width(&mut self, _width: f32) {
        self.push(Op::SetLineWidth);
    }

    fn set_blend_constants(&mut self, _constants: [f32; 4]) {
        self.push(Op::SetBlendConstants);
    }

    fn bind_pipeline(&mut self, pipeline: PipelineHandle, descriptor_sets: &[DescriptorSetHandle]) {
        self.push(Op::BindPipeline {
            pipeline,
            set_count: descriptor_sets.len(),
        });
    }

    fn bind_vertex_buffer(&mut self, _buffer: BufferHandle, _offset: u64) {
        self.push(Op::BindVertexBuffer);
    }

    fn draw(&mut self, vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32) {
        self.push(Op::Draw {
            vertex_count,
            instance_count,
            first_vertex,
            first_instance,
        });
    }

    fn draw_indexed(&mut self, _params: &DrawIndexedParams) {
        self.push(Op::DrawIndexed);
    }

    fn draw_indexed_indirect(
        &mut self,
        _indirect_buffer: BufferHandle,
        _index_buffer: BufferHandle,
        _offset: u64,
        _draw_count: u32,
        _stride: u32,
    ) {
        self.push(Op::DrawIndexedIndirect);
    }

    fn dispatch(&mut self, _x: u32, _y: u32, _z: u32) {
        self.push(Op::Dispatch);
    }

    fn dispatch_indirect(&mut self, _indirect_buffer: BufferHandle, _offset: u64) {
        self.push(Op::DispatchIndirect);
    }

    fn copy_buffer(
        &mut self,
        _src: BufferHandle,
        src_offset: u64,
        _dst: BufferHandle,
        _dst_offset: u64,
        size: u64,
    ) {
        self.push(Op::CopyBuffer { src_offset, size });
    }

    fn copy_buffer_to_texture(
        &mut self,
        _src: BufferHandle,
        dst: TextureHandle,
        regions: &[BufferTextureCopyRegion],
    ) {
        self.push(Op::CopyBufferToTexture {
            dst,
            regions: regions.to_vec(),
        });
    }

    fn blit_texture(
        &mut self,
        src: TextureHandle,
        _src_usage: TextureUsage,
        dst: TextureHandle,
        _dst_usage: TextureUsage,
    ) {
        self.push(Op::Blit { src, dst });
    }

    fn gen_texture_mipmaps(&mut self, _texture: TextureHandle) {
        self.push(Op::GenMipmaps);
    }

    fn add_transitions(
        &mut self,
        _src_stages: PipelineStageFlags,
        _dst_stages: PipelineStageFlags,
        _memory: &[MemoryTransition],
        buffers: &[BufferTransition],
        textures: &[TextureTransition],
    ) {
        self.push(Op::Transitions {
            textures: textures
                .iter()
                .map(|t| (t.texture, t.src_usage, t.dst_usage))
                .collect(),
            buffer_count: buffers.len(),
        });
    }

    fn add_texture_transition(&mut self, texture: TextureHandle, new_layout: TextureLayout) {
        self.push(Op::TextureTransition {
            texture,
            layout: new_layout,
        });
    }
}

impl RenderDevice for MockDevice {
    fn name(&self) -> &str {
        "mock"
    }

    fn create_buffer(&self, spec: &BufferSpec) -> DeviceResult<BufferHandle> {
        if spec.size == 0 {
            return Err(DeviceError::InvalidSpec("buffer size is zero".into()));
        }
        Ok(BufferHandle::from_raw(self.buffers.insert(*spec)).unwrap())
    }

    fn destroy_buffer(&self, buffer: BufferHandle) {
        self.buffers.remove(buffer.raw());
    }

    fn buffer_size(&self, buffer: BufferHandle) -> u64 {
        self.buffers.with(buffer.raw(), |b| b.size).unwrap_or(0)
    }

    fn write_buffer(&self, buffer: BufferHandle, offset: u64, data: &[u8]) -> DeviceResult<()> {
        let size = self.buffer_size(buffer);
        if offset + data.len() as u64 > size {
            return Err(DeviceError::InvalidSpec("write out of bounds".into()));
        }
        self.stats.lock().buffer_writes += 1;
        Ok(())
    }

    fn create_texture(&self, spec: &TextureSpec) -> DeviceResult<TextureHandle> {
        Ok(TextureHandle::from_raw(self.textures.insert(*spec)).unwrap())
    }

    fn destroy_texture(&self, texture: TextureHandle) {
        self.textures.remove(texture.raw());
    }

    fn texture_spec(&self, texture: TextureHandle) -> Option<TextureSpec> {
        self.textures.with(texture.raw(), |t| *t)
    }

    fn create_sampler(&self, spec: &SamplerSpec) -> DeviceResult<SamplerHandle> {
        Ok(SamplerHandle::from_raw(self.samplers.insert(*spec)).unwrap())
    }

    fn destroy_sampler(&self, sampler: SamplerHandle) {
        self.samplers.remove(sampler.raw());
    }

    fn create_shader(&self, spec: &ShaderGroupSpec) -> DeviceResult<ShaderHandle> {
        let info = reflect_shader_group(spec).map_err(DeviceError::ShaderInvalid)?;
        Ok(ShaderHandle::from_raw(self.shaders.insert(info)).unwrap())
    }

    fn destroy_shader(&self, shader: ShaderHandle) {
        self.shaders.remove(shader.raw());
    }

    fn shader_group_info(&self, shader: ShaderHandle) -> Option<ShaderGroupInfo> {
        self.shaders.with(shader.raw(), |info| info.clone())
    }

    fn create_render_pass(&self, spec: &RenderPassSpec) -> DeviceResult<RenderPassHandle> {
        Ok(RenderPassHandle::from_raw(self.render_passes.insert(spec.clone())).unwrap())
    }

    fn destroy_render_pass(&self, render_pass: RenderPassHandle) {
        self.render_passes.remove(render_pass.raw());
    }

    fn create_framebuffer(&self, spec: &FramebufferSpec) -> DeviceResult<FramebufferHandle> {
        Ok(FramebufferHandle::from_raw(self.framebuffers.insert(spec.clone())).unwrap())
    }

    fn destroy_framebuffer(&self, framebuffer: FramebufferHandle) {
        self.framebuffers.remove(framebuffer.raw());
    }

    fn create_pipeline(&self, spec: &PipelineSpec) -> DeviceResult<PipelineHandle> {
        Ok(PipelineHandle::from_raw(self.pipelines.insert(spec.clone())).unwrap())
    }

    fn destroy_pipeline(&self, pipeline: PipelineHandle) {
        self.pipelines.remove(pipeline.raw());
    }

    fn create_descriptor_set(
        &self,
        layout: &DescriptorSetLayoutSpec,
    ) -> DeviceResult<DescriptorSetHandle> {
        Ok(DescriptorSetHandle::from_raw(self.descriptor_sets.insert(layout.clone())).unwrap())
    }

    fn update_descriptor_set(&self, set: DescriptorSetHandle, writes: &[DescriptorWrite]) {
        *self
            .stats
            .lock()
            .descriptor_writes
            .entry(set)
            .or_insert(0) += writes.len() as u64;
    }

    fn destroy_descriptor_set(&self, set: DescriptorSetHandle) {
        self.descriptor_sets.remove(set.raw());
    }

    fn create_command_pool(
        &self,
        _queue: QueueClass,
        _reset_mode: CommandPoolResetMode,
    ) -> DeviceResult<CommandPoolHandle> {
        let handle = self.command_pools.insert(MockPool {
            allocated: Vec::new(),
            next: 0,
            resets: 0,
        });
        Ok(CommandPoolHandle::from_raw(handle).unwrap())
    }

    fn reset_command_pool(&self, pool: CommandPoolHandle) -> DeviceResult<()> {
        self.stats.lock().pool_resets += 1;
        self.command_pools
            .with_mut(pool.raw(), |p| {
                p.next = 0;
                p.resets += 1;
            })
            .ok_or(DeviceError::HandleInvalid(pool.raw()))
    }

    fn destroy_command_pool(&self, pool: CommandPoolHandle) {
        if let Some(p) = self.command_pools.remove(pool.raw()) {
            for cmd in p.allocated {
                self.command_buffers.remove(cmd.raw());
            }
        }
    }

    fn get_or_create_command_buffer(
        &self,
        pool: CommandPoolHandle,
        _level: CommandBufferLevel,
    ) -> DeviceResult<CommandBufferHandle> {
        let recycled = self
            .command_pools
            .with_mut(pool.raw(), |p| {
                if p.next < p.allocated.len() {
                    let cmd = p.allocated[p.next];
                    p.next += 1;
                    Some(cmd)
                } else {
                    None
                }
            })
            .ok_or(DeviceError::HandleInvalid(pool.raw()))?;
        if let Some(cmd) = recycled {
            return Ok(cmd);
        }
        let cmd = CommandBufferHandle::from_raw(self.command_buffers.insert(())).unwrap();
        self.command_pools.with_mut(pool.raw(), |p| {
            p.allocated.push(cmd);
            p.next = p.allocated.len();
        });
        Ok(cmd)
    }

    fn begin_command_buffer(&self, _cmd: CommandBufferHandle) -> DeviceResult<()> {
        Ok(())
    }

    fn end_command_buffer(&self, _cmd: CommandBufferHandle) -> DeviceResult<()> {
        Ok(())
    }

    fn command_context<'a>(
        &'a self,
        cmd: CommandBufferHandle,
    ) -> DeviceResult<Box<dyn CommandContext + 'a>> {
        if !self.command_buffers.contains(cmd.raw()) {
            return Err(DeviceError::HandleInvalid(cmd.raw()));
        }
        Ok(Box::new(MockContext { device: self }))
    }

    fn create_fence(&self, _signaled: bool) -> DeviceResult<FenceHandle> {
        Ok(FenceHandle::from_raw(self.fences.insert(())).unwrap())
    }

    fn destroy_fence(&self, fence: FenceHandle) {
        self.fences.remove(fence.raw());
    }

    fn reset_fences(&self, _fences: &[FenceHandle]) {}

    fn wait_for_fences(&self, fences: &[FenceHandle], _timeout_ns: u64) -> DeviceResult<()> {
        if !fences.is_empty() {
            self.stats.lock().fence_waits += 1;
        }
        Ok(())
    }

    fn create_semaphore(&self) -> DeviceResult<SemaphoreHandle> {
        Ok(SemaphoreHandle::from_raw(self.semaphores.insert(())).unwrap())
    }

    fn destroy_semaphore(&self, semaphore: SemaphoreHandle) {
        self.semaphores.remove(semaphore.raw());
    }

    fn submit(
        &self,
        _queue: QueueClass,
        _info: &SubmitInfo,
        _fence: Option<FenceHandle>,
    ) -> DeviceResult<()> {
        self.stats.lock().submits += 1;
        Ok(())
    }

    fn submit_immediate(&self, _queue: QueueClass, _cmd: CommandBufferHandle) -> DeviceResult<()> {
        let mut stats = self.stats.lock();
        stats.immediate_submits += 1;
        stats.fence_waits += 1;
        Ok(())
    }

    fn wait_idle(&self) {
        self.stats.lock().wait_idles += 1;
    }

    fn create_swapchain(
        &self,
        _surface: SurfaceHandle,
        _vsync: bool,
    ) -> DeviceResult<SwapchainHandle> {
        let extent = *self.swapchain_extent.lock();
        let images = self.make_swapchain_images(extent);
        let handle = self.swapchains.insert(MockSwapchain {
            extent,
            format: Format::B8G8R8A8_SRGB,
            images,
            next_image: 0,
            resizes: 0,
        });
        Ok(SwapchainHandle::from_raw(handle).unwrap())
    }

    fn resize_swapchain(&self, swapchain: SwapchainHandle, extent: Extent2d) -> DeviceResult<()> {
        self.stats.lock().swapchain_resizes += 1;
        let images = self.make_swapchain_images(extent);
        self.swapchains
            .with_mut(swapchain.raw(), |sc| {
                for &old in &sc.images {
                    self.textures.remove(old.raw());
                }
                sc.extent = extent;
                sc.images = images;
                sc.next_image = 0;
                sc.resizes += 1;
            })
            .ok_or(DeviceError::HandleInvalid(swapchain.raw()))?;
        *self.swapchain_extent.lock() = extent;
        Ok(())
    }

    fn destroy_swapchain(&self, swapchain: SwapchainHandle) {
        if let Some(sc) = self.swapchains.remove(swapchain.raw()) {
            for image in sc.images {
                self.textures.remove(image.raw());
            }
        }
    }

    fn swapchain_info(&self, swapchain: SwapchainHandle) -> DeviceResult<SwapchainInfo> {
        self.swapchains
            .with(swapchain.raw(), |sc| SwapchainInfo {
                image_count: sc.images.len() as u32,
                format: sc.format,
                extent: sc.extent,
            })
            .ok_or(DeviceError::HandleInvalid(swapchain.raw()))
    }

    fn swapchain_texture(
        &self,
        swapchain: SwapchainHandle,
        image_index: u32,
    ) -> DeviceResult<TextureHandle> {
        self.swapchains
            .with(swapchain.raw(), |sc| {
                sc.images.get(image_index as usize).copied()
            })
            .flatten()
            .ok_or(DeviceError::HandleInvalid(swapchain.raw()))
    }

    fn surface_capabilities(&self, _surface: SurfaceHandle) -> DeviceResult<SurfaceCapabilities> {
        Ok(*self.surface_caps.lock())
    }

    fn acquire_next_image(
        &self,
        swapchain: SwapchainHandle,
        _signal: SemaphoreHandle,
    ) -> DeviceResult<AcquiredImage> {
        if let Some(scripted) = self.acquire_script.lock().pop_front() {
            return scripted;
        }
        self.swapchains
            .with_mut(swapchain.raw(), |sc| {
                let index = sc.next_image;
                sc.next_image = (sc.next_image + 1) % sc.images.len().max(1) as u32;
                AcquiredImage {
                    image_index: index,
                    suboptimal: false,
                }
            })
            .ok_or(DeviceError::HandleInvalid(swapchain.raw()))
    }

    fn present(
        &self,
        _swapchain: SwapchainHandle,
        _image_index: u32,
        _wait: SemaphoreHandle,
    ) -> DeviceResult<()> {
        self.stats.lock().presents += 1;
        Ok(())
    }
}

impl MockDevice {
    fn make_swapchain_images(&self, extent: Extent2d) -> Vec<TextureHandle> {
        (0..3)
            .map(|_| {
                let spec = TextureSpec::new_2d(
                    Format::B8G8R8A8_SRGB,
                    extent.width,
                    extent.height,
                    TextureUsage::COLOR_ATTACHMENT | TextureUsage::TRANSFER_DST,
                );
                TextureHandle::from_raw(self.textures.insert(spec)).unwrap()
            })
            .collect()
    }
}
