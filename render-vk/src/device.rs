//! The `RenderDevice` implementation.

use crate::commands::VulkanCommandContext;
use crate::convert;
use crate::instance::VulkanInstance;
use crate::resources::*;
use crate::{map_vk_error, pipeline, swapchain};
use ash::extensions::khr;
use ash::vk;
use ember_render::buffer::{BufferSpec, MemoryPlacement};
use ember_render::descriptor::{DescriptorSetLayoutSpec, DescriptorWrite};
use ember_render::device::*;
use ember_render::error::{DeviceError, DeviceResult};
use ember_render::handle::*;
use ember_render::pipeline::PipelineSpec;
use ember_render::renderpass::{FramebufferSpec, RenderPassSpec};
use ember_render::shader::{reflect_shader_group, ShaderGroupInfo, ShaderGroupSpec};
use ember_render::texture::{Extent2d, SamplerSpec, TextureSpec};
use fxhash::FxHashMap;
use parking_lot::Mutex;
use std::io::Cursor;

pub(crate) struct DescriptorPoolChain {
    pub pools: Vec<vk::DescriptorPool>,
}

/// The Vulkan device: owns the logical device, one graphics queue, and the
/// handle tables resolving core handles into Vulkan objects.
pub struct VulkanDevice {
    pub(crate) instance: VulkanInstance,
    pub(crate) physical_device: vk::PhysicalDevice,
    pub(crate) device: ash::Device,
    pub(crate) swapchain_loader: khr::Swapchain,
    pub(crate) graphics_queue: vk::Queue,
    pub(crate) graphics_family: u32,
    pub(crate) memory_props: vk::PhysicalDeviceMemoryProperties,

    pub(crate) surfaces: HandleTable<vk::SurfaceKHR>,
    pub(crate) buffers: HandleTable<VkBuffer>,
    pub(crate) textures: HandleTable<VkTexture>,
    pub(crate) samplers: HandleTable<vk::Sampler>,
    pub(crate) shaders: HandleTable<VkShader>,
    pub(crate) render_passes: HandleTable<vk::RenderPass>,
    pub(crate) framebuffers: HandleTable<vk::Framebuffer>,
    pub(crate) pipelines: HandleTable<VkPipeline>,
    pub(crate) descriptor_sets: HandleTable<vk::DescriptorSet>,
    pub(crate) command_pools: HandleTable<VkCommandPool>,
    pub(crate) command_buffers: HandleTable<vk::CommandBuffer>,
    pub(crate) swapchains: HandleTable<VkSwapchain>,
    pub(crate) fences: HandleTable<vk::Fence>,
    pub(crate) semaphores: HandleTable<vk::Semaphore>,

    /// One pipeline layout per shader group hash.
    pub(crate) pipeline_layouts: Mutex<FxHashMap<u64, VkPipelineLayout>>,
    /// Descriptor set layouts deduped by their portable spec.
    pub(crate) set_layouts: Mutex<FxHashMap<DescriptorSetLayoutSpec, vk::DescriptorSetLayout>>,
    pub(crate) descriptor_pools: Mutex<DescriptorPoolChain>,
    /// Render passes and framebuffers derived from dynamic rendering
    /// scopes; keyed by the structural hash of the compatible pass.
    pub(crate) rendering_passes: Mutex<FxHashMap<RenderPassSpec, vk::RenderPass>>,
    pub(crate) rendering_framebuffers:
        Mutex<FxHashMap<(RenderPassSpec, Vec<TextureHandle>, Extent2d), vk::Framebuffer>>,

    /// Queue submissions are externally synchronized.
    pub(crate) queue_lock: Mutex<()>,
    /// Dedicated fence for immediate submits.
    pub(crate) immediate: Mutex<vk::Fence>,
}

impl VulkanDevice {
    /// Builds the logical device for a surface and registers the surface,
    /// returning its handle for swapchain creation.
    pub fn new(
        instance: VulkanInstance,
        surface: vk::SurfaceKHR,
    ) -> DeviceResult<(VulkanDevice, SurfaceHandle)> {
        let (physical_device, graphics_family) = instance.pick_physical_device(surface)?;
        let props = unsafe {
            instance
                .instance
                .get_physical_device_properties(physical_device)
        };
        let device_name = unsafe {
            std::ffi::CStr::from_ptr(props.device_name.as_ptr())
                .to_string_lossy()
                .into_owned()
        };
        log::info!("using vulkan device {:?}", device_name);

        let priorities = [1.0f32];
        let queue_infos = [vk::DeviceQueueCreateInfo::builder()
            .queue_family_index(graphics_family)
            .queue_priorities(&priorities)
            .build()];
        let extensions = [khr::Swapchain::name().as_ptr()];
        let features = vk::PhysicalDeviceFeatures::builder().sampler_anisotropy(true);
        let device_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_infos)
            .enabled_extension_names(&extensions)
            .enabled_features(&features);
        let device = unsafe {
            instance
                .instance
                .create_device(physical_device, &device_info, None)
                .map_err(map_vk_error)?
        };
        let graphics_queue = unsafe { device.get_device_queue(graphics_family, 0) };
        let swapchain_loader = khr::Swapchain::new(&instance.instance, &device);
        let memory_props = unsafe {
            instance
                .instance
                .get_physical_device_memory_properties(physical_device)
        };
        let immediate_fence = unsafe {
            device
                .create_fence(&vk::FenceCreateInfo::builder(), None)
                .map_err(map_vk_error)?
        };

        let out = VulkanDevice {
            instance,
            physical_device,
            device,
            swapchain_loader,
            graphics_queue,
            graphics_family,
            memory_props,
            surfaces: HandleTable::new(HandleKind::Surface),
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
            fences: HandleTable::new(HandleKind::Fence),
            semaphores: HandleTable::new(HandleKind::Semaphore),
            pipeline_layouts: Mutex::new(FxHashMap::default()),
            set_layouts: Mutex::new(FxHashMap::default()),
            descriptor_pools: Mutex::new(DescriptorPoolChain { pools: Vec::new() }),
            rendering_passes: Mutex::new(FxHashMap::default()),
            rendering_framebuffers: Mutex::new(FxHashMap::default()),
            queue_lock: Mutex::new(()),
            immediate: Mutex::new(immediate_fence),
        };
        let surface_handle = SurfaceHandle::from_raw(out.surfaces.insert(surface))
            .unwrap_or(SurfaceHandle::NULL);
        Ok((out, surface_handle))
    }

    pub(crate) fn vk_buffer(&self, handle: BufferHandle) -> Option<vk::Buffer> {
        self.buffers.with(handle.raw(), |b| b.raw)
    }

    pub(crate) fn vk_texture(&self, handle: TextureHandle) -> Option<(vk::Image, TextureSpec)> {
        self.textures.with(handle.raw(), |t| (t.image, t.spec))
    }

    pub(crate) fn vk_semaphore(&self, handle: SemaphoreHandle) -> Option<vk::Semaphore> {
        self.semaphores.get(handle.raw())
    }

    pub(crate) fn vk_fence(&self, handle: FenceHandle) -> Option<vk::Fence> {
        self.fences.get(handle.raw())
    }
}

// the raw pointers behind the tables are only dereferenced through &self
// with the documented external synchronization rules
unsafe impl Send for VulkanDevice {}
unsafe impl Sync for VulkanDevice {}

impl RenderDevice for VulkanDevice {
    fn name(&self) -> &str {
        "vulkan"
    }

    // ---- resources -----------------------------------------------------

    fn create_buffer(&self, spec: &BufferSpec) -> DeviceResult<BufferHandle> {
        if spec.size == 0 {
            return Err(DeviceError::InvalidSpec("buffer size is zero".into()));
        }
        let info = vk::BufferCreateInfo::builder()
            .size(spec.size)
            .usage(convert::buffer_usage(spec.usage))
            .sharing_mode(vk::SharingMode::EXCLUSIVE);
        let raw = unsafe { self.device.create_buffer(&info, None).map_err(map_vk_error)? };
        let requirements = unsafe { self.device.get_buffer_memory_requirements(raw) };
        let memory = allocate_memory(&self.device, &self.memory_props, requirements, spec.placement)
            .map_err(|err| {
                unsafe { self.device.destroy_buffer(raw, None) };
                err
            })?;
        unsafe {
            self.device
                .bind_buffer_memory(raw, memory, 0)
                .map_err(map_vk_error)?;
        }
        let mapped = if spec.placement != MemoryPlacement::DeviceLocal {
            unsafe {
                self.device
                    .map_memory(memory, 0, vk::WHOLE_SIZE, vk::MemoryMapFlags::empty())
                    .map_err(map_vk_error)? as usize
            }
        } else {
            0
        };
        let handle = self.buffers.insert(VkBuffer {
            raw,
            memory,
            size: spec.size,
            placement: spec.placement,
            mapped,
        });
        Ok(BufferHandle::from_raw(handle).unwrap_or(BufferHandle::NULL))
    }

    fn destroy_buffer(&self, buffer: BufferHandle) {
        if let Some(b) = self.buffers.remove(buffer.raw()) {
            unsafe {
                self.device.destroy_buffer(b.raw, None);
                self.device.free_memory(b.memory, None);
            }
        }
    }

    fn buffer_size(&self, buffer: BufferHandle) -> u64 {
        self.buffers.with(buffer.raw(), |b| b.size).unwrap_or(0)
    }

    fn write_buffer(&self, buffer: BufferHandle, offset: u64, data: &[u8]) -> DeviceResult<()> {
        self.buffers
            .with(buffer.raw(), |b| {
                if b.placement == MemoryPlacement::DeviceLocal || b.mapped == 0 {
                    return Err(DeviceError::InvalidSpec(
                        "write_buffer on a device-local buffer".into(),
                    ));
                }
                if offset + data.len() as u64 > b.size {
                    return Err(DeviceError::InvalidSpec(
                        "write_buffer out of bounds".into(),
                    ));
                }
                unsafe {
                    std::ptr::copy_nonoverlapping(
                        data.as_ptr(),
                        (b.mapped as *mut u8).add(offset as usize),
                        data.len(),
                    );
                }
                Ok(())
            })
            .unwrap_or(Err(DeviceError::HandleInvalid(buffer.raw())))
    }

    fn create_texture(&self, spec: &TextureSpec) -> DeviceResult<TextureHandle> {
        pipeline::create_texture(self, spec)
    }

    fn destroy_texture(&self, texture: TextureHandle) {
        if let Some(t) = self.textures.remove(texture.raw()) {
            unsafe {
                self.device.destroy_image_view(t.view, None);
                if t.owned {
                    self.device.destroy_image(t.image, None);
                }
                if let Some(memory) = t.memory {
                    self.device.free_memory(memory, None);
                }
            }
        }
    }

    fn texture_spec(&self, texture: TextureHandle) -> Option<TextureSpec> {
        self.textures.with(texture.raw(), |t| t.spec)
    }

    fn create_sampler(&self, spec: &SamplerSpec) -> DeviceResult<SamplerHandle> {
        let mut info = vk::SamplerCreateInfo::builder()
            .min_filter(convert::filter(spec.min_filter))
            .mag_filter(convert::filter(spec.mag_filter))
            .mipmap_mode(convert::mipmap_mode(spec.mipmap_mode))
            .address_mode_u(convert::address_mode(spec.address_u))
            .address_mode_v(convert::address_mode(spec.address_v))
            .address_mode_w(convert::address_mode(spec.address_w))
            .min_lod(spec.min_lod)
            .max_lod(spec.max_lod)
            .border_color(convert::border_color(spec.border_color));
        if let Some(max_anisotropy) = spec.max_anisotropy {
            info = info.anisotropy_enable(true).max_anisotropy(max_anisotropy);
        }
        if let Some(op) = spec.compare_op {
            info = info.compare_enable(true).compare_op(convert::compare_op(op));
        }
        let raw = unsafe { self.device.create_sampler(&info, None).map_err(map_vk_error)? };
        Ok(SamplerHandle::from_raw(self.samplers.insert(raw)).unwrap_or(SamplerHandle::NULL))
    }

    fn destroy_sampler(&self, sampler: SamplerHandle) {
        if let Some(raw) = self.samplers.remove(sampler.raw()) {
            unsafe { self.device.destroy_sampler(raw, None) };
        }
    }

    fn create_shader(&self, spec: &ShaderGroupSpec) -> DeviceResult<ShaderHandle> {
        let info = match reflect_shader_group(spec) {
            Ok(info) => info,
            Err(err) => {
                log::error!("shader group rejected: {}", err);
                return Err(DeviceError::ShaderInvalid(err));
            }
        };
        let mut modules = Vec::new();
        for stage in ember_render::ShaderStage::ALL {
            let Some(stage_spirv) = spec.stage(stage) else {
                continue;
            };
            let words = ash::util::read_spv(&mut Cursor::new(&stage_spirv.code))
                .map_err(|_| DeviceError::InvalidSpec("malformed SPIR-V words".into()))?;
            let module_info = vk::ShaderModuleCreateInfo::builder().code(&words);
            let module = unsafe {
                self.device
                    .create_shader_module(&module_info, None)
                    .map_err(map_vk_error)?
            };
            let entry_point = std::ffi::CString::new(stage_spirv.entry_point.as_str())
                .map_err(|_| DeviceError::InvalidSpec("entry point contains NUL".into()))?;
            modules.push(VkShaderModule {
                stage,
                module,
                entry_point,
            });
        }
        let handle = self.shaders.insert(VkShader { info, modules });
        Ok(ShaderHandle::from_raw(handle).unwrap_or(ShaderHandle::NULL))
    }

    fn destroy_shader(&self, shader: ShaderHandle) {
        if let Some(s) = self.shaders.remove(shader.raw()) {
            for m in s.modules {
                unsafe { self.device.destroy_shader_module(m.module, None) };
            }
        }
    }

    fn shader_group_info(&self, shader: ShaderHandle) -> Option<ShaderGroupInfo> {
        self.shaders.with(shader.raw(), |s| s.info.clone())
    }

    fn create_render_pass(&self, spec: &RenderPassSpec) -> DeviceResult<RenderPassHandle> {
        let raw = pipeline::create_vk_render_pass(self, spec)?;
        Ok(RenderPassHandle::from_raw(self.render_passes.insert(raw))
            .unwrap_or(RenderPassHandle::NULL))
    }

    fn destroy_render_pass(&self, render_pass: RenderPassHandle) {
        if let Some(raw) = self.render_passes.remove(render_pass.raw()) {
            unsafe { self.device.destroy_render_pass(raw, None) };
        }
    }

    fn create_framebuffer(&self, spec: &FramebufferSpec) -> DeviceResult<FramebufferHandle> {
        let raw = pipeline::create_vk_framebuffer(self, spec)?;
        Ok(FramebufferHandle::from_raw(self.framebuffers.insert(raw))
            .unwrap_or(FramebufferHandle::NULL))
    }

    fn destroy_framebuffer(&self, framebuffer: FramebufferHandle) {
        if let Some(raw) = self.framebuffers.remove(framebuffer.raw()) {
            unsafe { self.device.destroy_framebuffer(raw, None) };
        }
    }

    fn create_pipeline(&self, spec: &PipelineSpec) -> DeviceResult<PipelineHandle> {
        let pipeline = match spec {
            PipelineSpec::Graphics(graphics) => pipeline::create_graphics_pipeline(self, graphics),
            PipelineSpec::Compute(compute) => pipeline::create_compute_pipeline(self, compute),
        };
        match pipeline {
            Ok(p) => Ok(PipelineHandle::from_raw(self.pipelines.insert(p))
                .unwrap_or(PipelineHandle::NULL)),
            Err(err) => {
                log::error!("pipeline creation failed: {}; spec: {:?}", err, spec);
                Err(err)
            }
        }
    }

    fn destroy_pipeline(&self, pipeline: PipelineHandle) {
        if let Some(p) = self.pipelines.remove(pipeline.raw()) {
            unsafe { self.device.destroy_pipeline(p.raw, None) };
        }
    }

    fn create_descriptor_set(
        &self,
        layout: &DescriptorSetLayoutSpec,
    ) -> DeviceResult<DescriptorSetHandle> {
        let set = pipeline::allocate_descriptor_set(self, layout)?;
        Ok(
            DescriptorSetHandle::from_raw(self.descriptor_sets.insert(set))
                .unwrap_or(DescriptorSetHandle::NULL),
        )
    }

    fn update_descriptor_set(&self, set: DescriptorSetHandle, writes: &[DescriptorWrite]) {
        pipeline::update_descriptor_set(self, set, writes);
    }

    fn destroy_descriptor_set(&self, set: DescriptorSetHandle) {
        // sets return to their pool on pool reset; only forget the handle
        self.descriptor_sets.remove(set.raw());
    }

    // ---- command pools and buffers ------------------------------------

    fn create_command_pool(
        &self,
        _queue: QueueClass,
        reset_mode: CommandPoolResetMode,
    ) -> DeviceResult<CommandPoolHandle> {
        let mut flags = vk::CommandPoolCreateFlags::TRANSIENT;
        if reset_mode == CommandPoolResetMode::ResetBuffer {
            flags |= vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER;
        }
        let info = vk::CommandPoolCreateInfo::builder()
            .queue_family_index(self.graphics_family)
            .flags(flags);
        let raw = unsafe {
            self.device
                .create_command_pool(&info, None)
                .map_err(map_vk_error)?
        };
        let handle = self.command_pools.insert(VkCommandPool {
            raw,
            allocated: Vec::new(),
            next: 0,
        });
        Ok(CommandPoolHandle::from_raw(handle).unwrap_or(CommandPoolHandle::NULL))
    }

    fn reset_command_pool(&self, pool: CommandPoolHandle) -> DeviceResult<()> {
        let raw = self
            .command_pools
            .with_mut(pool.raw(), |p| {
                p.next = 0;
                p.raw
            })
            .ok_or(DeviceError::HandleInvalid(pool.raw()))?;
        unsafe {
            self.device
                .reset_command_pool(raw, vk::CommandPoolResetFlags::empty())
                .map_err(map_vk_error)
        }
    }

    fn destroy_command_pool(&self, pool: CommandPoolHandle) {
        if let Some(p) = self.command_pools.remove(pool.raw()) {
            for cmd in p.allocated {
                self.command_buffers.remove(cmd.raw());
            }
            unsafe { self.device.destroy_command_pool(p.raw, None) };
        }
    }

    fn get_or_create_command_buffer(
        &self,
        pool: CommandPoolHandle,
        level: CommandBufferLevel,
    ) -> DeviceResult<CommandBufferHandle> {
        // recycle first
        let recycled = self.command_pools.with_mut(pool.raw(), |p| {
            if p.next < p.allocated.len() {
                let cmd = p.allocated[p.next];
                p.next += 1;
                Some(cmd)
            } else {
                None
            }
        });
        match recycled {
            Some(Some(cmd)) => return Ok(cmd),
            Some(None) => {}
            None => return Err(DeviceError::HandleInvalid(pool.raw())),
        }

        let pool_raw = self
            .command_pools
            .with(pool.raw(), |p| p.raw)
            .ok_or(DeviceError::HandleInvalid(pool.raw()))?;
        let info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(pool_raw)
            .level(match level {
                CommandBufferLevel::Primary => vk::CommandBufferLevel::PRIMARY,
                CommandBufferLevel::Secondary => vk::CommandBufferLevel::SECONDARY,
            })
            .command_buffer_count(1);
        let raw = unsafe {
            self.device
                .allocate_command_buffers(&info)
                .map_err(map_vk_error)?[0]
        };
        let handle = CommandBufferHandle::from_raw(self.command_buffers.insert(raw))
            .unwrap_or(CommandBufferHandle::NULL);
        self.command_pools.with_mut(pool.raw(), |p| {
            p.allocated.push(handle);
            p.next = p.allocated.len();
        });
        Ok(handle)
    }

    fn begin_command_buffer(&self, cmd: CommandBufferHandle) -> DeviceResult<()> {
        let raw = self
            .command_buffers
            .get(cmd.raw())
            .ok_or(DeviceError::HandleInvalid(cmd.raw()))?;
        let info = vk::CommandBufferBeginInfo::builder()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        unsafe {
            self.device
                .begin_command_buffer(raw, &info)
                .map_err(map_vk_error)
        }
    }

    fn end_command_buffer(&self, cmd: CommandBufferHandle) -> DeviceResult<()> {
        let raw = self
            .command_buffers
            .get(cmd.raw())
            .ok_or(DeviceError::HandleInvalid(cmd.raw()))?;
        unsafe { self.device.end_command_buffer(raw).map_err(map_vk_error) }
    }

    fn command_context<'a>(
        &'a self,
        cmd: CommandBufferHandle,
    ) -> DeviceResult<Box<dyn CommandContext + 'a>> {
        let raw = self
            .command_buffers
            .get(cmd.raw())
            .ok_or(DeviceError::HandleInvalid(cmd.raw()))?;
        Ok(Box::new(VulkanCommandContext::new(self, raw)))
    }

    // ---- sync objects --------------------------------------------------

    fn create_fence(&self, signaled: bool) -> DeviceResult<FenceHandle> {
        let mut info = vk::FenceCreateInfo::builder();
        if signaled {
            info = info.flags(vk::FenceCreateFlags::SIGNALED);
        }
        let raw = unsafe { self.device.create_fence(&info, None).map_err(map_vk_error)? };
        Ok(FenceHandle::from_raw(self.fences.insert(raw)).unwrap_or(FenceHandle::NULL))
    }

    fn destroy_fence(&self, fence: FenceHandle) {
        if let Some(raw) = self.fences.remove(fence.raw()) {
            unsafe { self.device.destroy_fence(raw, None) };
        }
    }

    fn reset_fences(&self, fences: &[FenceHandle]) {
        let raw: Vec<vk::Fence> = fences
            .iter()
            .filter_map(|&f| self.vk_fence(f))
            .collect();
        if raw.is_empty() {
            return;
        }
        if let Err(err) = unsafe { self.device.reset_fences(&raw) } {
            log::error!("reset_fences failed: {:?}", err);
        }
    }

    fn wait_for_fences(&self, fences: &[FenceHandle], timeout_ns: u64) -> DeviceResult<()> {
        let raw: Vec<vk::Fence> = fences
            .iter()
            .filter_map(|&f| self.vk_fence(f))
            .collect();
        if raw.is_empty() {
            return Ok(());
        }
        unsafe {
            self.device
                .wait_for_fences(&raw, true, timeout_ns)
                .map_err(map_vk_error)
        }
    }

    fn create_semaphore(&self) -> DeviceResult<SemaphoreHandle> {
        let raw = unsafe {
            self.device
                .create_semaphore(&vk::SemaphoreCreateInfo::builder(), None)
                .map_err(map_vk_error)?
        };
        Ok(SemaphoreHandle::from_raw(self.semaphores.insert(raw)).unwrap_or(SemaphoreHandle::NULL))
    }

    fn destroy_semaphore(&self, semaphore: SemaphoreHandle) {
        if let Some(raw) = self.semaphores.remove(semaphore.raw()) {
            unsafe { self.device.destroy_semaphore(raw, None) };
        }
    }

    // ---- queues --------------------------------------------------------

    fn submit(
        &self,
        _queue: QueueClass,
        info: &SubmitInfo,
        fence: Option<FenceHandle>,
    ) -> DeviceResult<()> {
        let command_buffers: Vec<vk::CommandBuffer> = info
            .command_buffers
            .iter()
            .filter_map(|&cmd| self.command_buffers.get(cmd.raw()))
            .collect();
        let wait_semaphores: Vec<vk::Semaphore> = info
            .wait_semaphores
            .iter()
            .filter_map(|&(s, _)| self.vk_semaphore(s))
            .collect();
        let wait_stages: Vec<vk::PipelineStageFlags> = info
            .wait_semaphores
            .iter()
            .map(|&(_, stages)| convert::pipeline_stages(stages))
            .collect();
        let signal_semaphores: Vec<vk::Semaphore> = info
            .signal_semaphores
            .iter()
            .filter_map(|&s| self.vk_semaphore(s))
            .collect();
        let vk_fence = fence.and_then(|f| self.vk_fence(f)).unwrap_or_default();

        let submit = vk::SubmitInfo::builder()
            .command_buffers(&command_buffers)
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .signal_semaphores(&signal_semaphores)
            .build();
        let _guard = self.queue_lock.lock();
        unsafe {
            self.device
                .queue_submit(self.graphics_queue, &[submit], vk_fence)
                .map_err(map_vk_error)
        }
    }

    fn submit_immediate(&self, _queue: QueueClass, cmd: CommandBufferHandle) -> DeviceResult<()> {
        let raw = self
            .command_buffers
            .get(cmd.raw())
            .ok_or(DeviceError::HandleInvalid(cmd.raw()))?;
        let fence_guard = self.immediate.lock();
        let fence = *fence_guard;
        let command_buffers = [raw];
        let submit = vk::SubmitInfo::builder()
            .command_buffers(&command_buffers)
            .build();
        {
            let _guard = self.queue_lock.lock();
            unsafe {
                self.device
                    .queue_submit(self.graphics_queue, &[submit], fence)
                    .map_err(map_vk_error)?;
            }
        }
        unsafe {
            self.device
                .wait_for_fences(&[fence], true, WAIT_FOREVER)
                .map_err(map_vk_error)?;
            self.device.reset_fences(&[fence]).map_err(map_vk_error)?;
        }
        Ok(())
    }

    fn wait_idle(&self) {
        let _guard = self.queue_lock.lock();
        if let Err(err) = unsafe { self.device.device_wait_idle() } {
            log::error!("device_wait_idle failed: {:?}", err);
        }
    }

    // ---- swapchain -----------------------------------------------------

    fn create_swapchain(
        &self,
        surface: SurfaceHandle,
        vsync: bool,
    ) -> DeviceResult<SwapchainHandle> {
        swapchain::create_swapchain(self, surface, vsync)
    }

    fn resize_swapchain(&self, handle: SwapchainHandle, extent: Extent2d) -> DeviceResult<()> {
        swapchain::resize_swapchain(self, handle, extent)
    }

    fn destroy_swapchain(&self, handle: SwapchainHandle) {
        swapchain::destroy_swapchain(self, handle);
    }

    fn swapchain_info(&self, handle: SwapchainHandle) -> DeviceResult<SwapchainInfo> {
        self.swapchains
            .with(handle.raw(), |sc| SwapchainInfo {
                image_count: sc.images.len() as u32,
                format: convert::from_vk_format(sc.format),
                extent: sc.extent,
            })
            .ok_or(DeviceError::HandleInvalid(handle.raw()))
    }

    fn swapchain_texture(
        &self,
        handle: SwapchainHandle,
        image_index: u32,
    ) -> DeviceResult<TextureHandle> {
        self.swapchains
            .with(handle.raw(), |sc| {
                sc.images.get(image_index as usize).copied()
            })
            .flatten()
            .ok_or(DeviceError::HandleInvalid(handle.raw()))
    }

    fn surface_capabilities(&self, surface: SurfaceHandle) -> DeviceResult<SurfaceCapabilities> {
        swapchain::surface_capabilities(self, surface)
    }

    fn acquire_next_image(
        &self,
        handle: SwapchainHandle,
        signal: SemaphoreHandle,
    ) -> DeviceResult<AcquiredImage> {
        swapchain::acquire_next_image(self, handle, signal)
    }

    fn present(
        &self,
        handle: SwapchainHandle,
        image_index: u32,
        wait: SemaphoreHandle,
    ) -> DeviceResult<()> {
        swapchain::present(self, handle, image_index, wait)
    }
}

impl Drop for VulkanDevice {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device_wait_idle();

            for p in self.pipelines.drain() {
                self.device.destroy_pipeline(p.raw, None);
            }
            for layout in self.pipeline_layouts.lock().drain() {
                self.device.destroy_pipeline_layout(layout.1.layout, None);
            }
            for (_, layout) in self.set_layouts.lock().drain() {
                self.device.destroy_descriptor_set_layout(layout, None);
            }
            for fb in self.framebuffers.drain() {
                self.device.destroy_framebuffer(fb, None);
            }
            for (_, fb) in self.rendering_framebuffers.lock().drain() {
                self.device.destroy_framebuffer(fb, None);
            }
            for rp in self.render_passes.drain() {
                self.device.destroy_render_pass(rp, None);
            }
            for (_, rp) in self.rendering_passes.lock().drain() {
                self.device.destroy_render_pass(rp, None);
            }
            for s in self.shaders.drain() {
                for m in s.modules {
                    self.device.destroy_shader_module(m.module, None);
                }
            }
            for sampler in self.samplers.drain() {
                self.device.destroy_sampler(sampler, None);
            }
            for t in self.textures.drain() {
                self.device.destroy_image_view(t.view, None);
                if t.owned {
                    self.device.destroy_image(t.image, None);
                }
                if let Some(memory) = t.memory {
                    self.device.free_memory(memory, None);
                }
            }
            for b in self.buffers.drain() {
                self.device.destroy_buffer(b.raw, None);
                self.device.free_memory(b.memory, None);
            }
            for pool in self.descriptor_pools.lock().pools.drain(..) {
                self.device.destroy_descriptor_pool(pool, None);
            }
            for pool in self.command_pools.drain() {
                self.device.destroy_command_pool(pool.raw, None);
            }
            for sc in self.swapchains.drain() {
                self.swapchain_loader.destroy_swapchain(sc.raw, None);
            }
            for fence in self.fences.drain() {
                self.device.destroy_fence(fence, None);
            }
            self.device.destroy_fence(*self.immediate.lock(), None);
            for semaphore in self.semaphores.drain() {
                self.device.destroy_semaphore(semaphore, None);
            }
            for surface in self.surfaces.drain() {
                self.instance.surface_loader.destroy_surface(surface, None);
            }
            self.device.destroy_device(None);
            self.instance.destroy();
        }
    }
}
