//! Frame pacing: image acquisition, per-frame recording, submission,
//! present, and swapchain resize.

use crate::device::{
    CommandBufferLevel, CommandPoolResetMode, QueueClass, RenderDevice, SubmitInfo,
};
use crate::error::{DeviceResult, FrameError};
use crate::format::Format;
use crate::frame::{RenderFrame, StagingAllocation, MAX_STAGING_BUFFER_SIZE};
use crate::handle::{
    BufferHandle, CommandBufferHandle, CommandPoolHandle, SemaphoreHandle, SurfaceHandle,
    SwapchainHandle, TextureHandle,
};
use crate::sync::PipelineStageFlags;
use crate::texture::{BufferTextureCopyRegion, Extent2d, TextureLayout};

/// Tuning knobs of the pacer; plain values, loaded however the embedder
/// likes.
#[derive(Copy, Clone, Debug)]
pub struct ContextConfig {
    pub vsync: bool,
    pub thread_count: u32,
    pub staging_size: u64,
}

impl Default for ContextConfig {
    fn default() -> ContextConfig {
        ContextConfig {
            vsync: true,
            thread_count: 1,
            staging_size: MAX_STAGING_BUFFER_SIZE,
        }
    }
}

/// Owns the swapchain and the ring of per-frame records, and drives the
/// acquire → record → submit → present cycle.
pub struct RenderContext {
    surface: SurfaceHandle,
    swapchain: SwapchainHandle,
    frames: Vec<RenderFrame>,
    active_frame_index: u32,
    frame_active: bool,
    /// Signaled by acquisition, waited on by the frame's submit.
    image_acquired: Option<SemaphoreHandle>,
    active_cmd: Option<CommandBufferHandle>,
    /// Pool for work outside the frame loop (uploads).
    common_pool: CommandPoolHandle,
    config: ContextConfig,
}

impl RenderContext {
    pub fn new(
        device: &dyn RenderDevice,
        surface: SurfaceHandle,
        config: ContextConfig,
    ) -> DeviceResult<RenderContext> {
        let swapchain = device.create_swapchain(surface, config.vsync)?;
        let frames = Self::build_frames(device, swapchain, &config)?;
        let common_pool =
            device.create_command_pool(QueueClass::Graphics, CommandPoolResetMode::ResetPool)?;
        Ok(RenderContext {
            surface,
            swapchain,
            frames,
            active_frame_index: 0,
            frame_active: false,
            image_acquired: None,
            active_cmd: None,
            common_pool,
            config,
        })
    }

    fn build_frames(
        device: &dyn RenderDevice,
        swapchain: SwapchainHandle,
        config: &ContextConfig,
    ) -> DeviceResult<Vec<RenderFrame>> {
        let info = device.swapchain_info(swapchain)?;
        let mut frames = Vec::with_capacity(info.image_count as usize);
        for image_index in 0..info.image_count {
            let texture = device.swapchain_texture(swapchain, image_index)?;
            frames.push(RenderFrame::new(
                device,
                texture,
                config.thread_count,
                config.staging_size,
            )?);
        }
        Ok(frames)
    }

    // ---- frame loop ----------------------------------------------------

    /// Acquires the next swapchain image and returns a primary command
    /// buffer with `begin` already called. `OutOfDate`/`Suboptimal`
    /// propagate so the caller can trigger [`recreate_swapchain`].
    ///
    /// [`recreate_swapchain`]: RenderContext::recreate_swapchain
    pub fn start_frame(
        &mut self,
        device: &dyn RenderDevice,
        reset_mode: CommandPoolResetMode,
    ) -> Result<CommandBufferHandle, FrameError> {
        if !self.frame_active {
            self.start_frame_internal(device)?;
        }
        let frame = &mut self.frames[self.active_frame_index as usize];
        let cmd = frame.request_command_buffer(
            device,
            QueueClass::Graphics,
            reset_mode,
            CommandBufferLevel::Primary,
            0,
        )?;
        device.begin_command_buffer(cmd)?;
        self.active_cmd = Some(cmd);
        Ok(cmd)
    }

    fn start_frame_internal(&mut self, device: &dyn RenderDevice) -> Result<(), FrameError> {
        debug_assert!(!self.frame_active);
        // the previous frame's pool owns the acquire semaphore for the time
        // being; it is released back after present
        let prev = &mut self.frames[self.active_frame_index as usize];
        let semaphore = prev.request_semaphore_with_ownership(device)?;
        match device.acquire_next_image(self.swapchain, semaphore) {
            Ok(acquired) => {
                if acquired.suboptimal {
                    log::warn!("swapchain is suboptimal; continuing this frame");
                }
                self.active_frame_index = acquired.image_index;
                self.image_acquired = Some(semaphore);
                self.frame_active = true;
                Ok(())
            }
            Err(err) => {
                prev.release_semaphore_with_ownership(semaphore);
                let _ = prev.reset(device);
                log::warn!("frame discarded without submit: {}", err);
                Err(err.into())
            }
        }
    }

    /// Transitions the swapchain image for present, submits, presents, and
    /// recycles this frame's resources.
    pub fn end_frame(&mut self, device: &dyn RenderDevice) -> Result<(), FrameError> {
        if !self.frame_active {
            return Err(FrameError::NoActiveFrame);
        }
        let cmd = self.active_cmd.take().ok_or(FrameError::NoActiveFrame)?;

        {
            let mut ctx = device.command_context(cmd)?;
            let frame = &self.frames[self.active_frame_index as usize];
            ctx.add_texture_transition(frame.swapchain_texture(), TextureLayout::PresentSrc);
        }
        device.end_command_buffer(cmd)?;

        let frame = &mut self.frames[self.active_frame_index as usize];
        let render_finished = frame.request_semaphore(device)?;
        let fence = frame.request_fence(device)?;

        let mut submit = SubmitInfo {
            command_buffers: vec![cmd],
            wait_semaphores: Vec::new(),
            signal_semaphores: vec![render_finished],
        };
        if let Some(acquired) = self.image_acquired {
            submit
                .wait_semaphores
                .push((acquired, PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT));
        }
        device.submit(QueueClass::Graphics, &submit, Some(fence))?;

        let present_result = device.present(
            self.swapchain,
            self.active_frame_index,
            render_finished,
        );

        if let Some(acquired) = self.image_acquired.take() {
            frame.release_semaphore_with_ownership(acquired);
        }
        frame.reset(device)?;
        self.frame_active = false;

        match present_result {
            Ok(()) => Ok(()),
            Err(err) => {
                log::warn!("present failed: {}", err);
                Err(err.into())
            }
        }
    }

    /// Rebuilds the swapchain after a resize: device-idle wait, surface
    /// caps query, extent clamp, rebuild chaining the old swapchain, then
    /// per-frame records.
    pub fn recreate_swapchain(
        &mut self,
        device: &dyn RenderDevice,
        new_width: u32,
        new_height: u32,
    ) -> Result<(), FrameError> {
        device.wait_idle();
        let caps = device.surface_capabilities(self.surface)?;
        let Some(current) = caps.current_extent else {
            // the surface reports no definite extent yet (e.g. minimized)
            return Ok(());
        };
        let info = device.swapchain_info(self.swapchain)?;
        if current == info.extent {
            return Ok(());
        }
        let extent = Extent2d {
            width: new_width.clamp(caps.min_extent.width, caps.max_extent.width),
            height: new_height.clamp(caps.min_extent.height, caps.max_extent.height),
        };
        log::info!(
            "recreating swapchain at {}x{}",
            extent.width,
            extent.height
        );
        device.resize_swapchain(self.swapchain, extent)?;
        for frame in &mut self.frames {
            frame.destroy(device);
        }
        self.frames = Self::build_frames(device, self.swapchain, &self.config)?;
        self.active_frame_index = 0;
        Ok(())
    }

    // ---- uploads -------------------------------------------------------

    /// A command buffer from the common pool, begun and ready for upload
    /// recording outside the frame loop.
    pub fn get_command_buffer(
        &mut self,
        device: &dyn RenderDevice,
    ) -> DeviceResult<CommandBufferHandle> {
        let cmd =
            device.get_or_create_command_buffer(self.common_pool, CommandBufferLevel::Primary)?;
        device.begin_command_buffer(cmd)?;
        Ok(cmd)
    }

    /// Ends `cmd` and submits it synchronously on a dedicated fence.
    pub fn submit_immediate(
        &mut self,
        device: &dyn RenderDevice,
        cmd: CommandBufferHandle,
    ) -> Result<(), FrameError> {
        device.end_command_buffer(cmd)?;
        device.submit_immediate(QueueClass::Graphics, cmd)?;
        Ok(())
    }

    pub fn reset_command_pool(&mut self, device: &dyn RenderDevice) -> DeviceResult<()> {
        device.reset_command_pool(self.common_pool)
    }

    /// Stages `data` and records a copy into `dst` on `cmd`.
    pub fn upload_to_buffer(
        &mut self,
        device: &dyn RenderDevice,
        cmd: CommandBufferHandle,
        data: &[u8],
        dst: BufferHandle,
        dst_offset: u64,
    ) -> Result<StagingAllocation, FrameError> {
        let frame = &mut self.frames[self.active_frame_index as usize];
        let allocation = frame.staging().submit(device, data)?;
        let mut ctx = device.command_context(cmd)?;
        ctx.copy_buffer(
            allocation.buffer,
            allocation.offset,
            dst,
            dst_offset,
            allocation.size,
        );
        Ok(allocation)
    }

    /// Stages `data` and records a buffer-to-texture copy of one region.
    pub fn upload_to_texture(
        &mut self,
        device: &dyn RenderDevice,
        cmd: CommandBufferHandle,
        data: &[u8],
        dst: TextureHandle,
        region: BufferTextureCopyRegion,
    ) -> Result<StagingAllocation, FrameError> {
        let frame = &mut self.frames[self.active_frame_index as usize];
        let allocation = frame.staging().submit(device, data)?;
        let mut ctx = device.command_context(cmd)?;
        ctx.copy_buffer_to_texture(
            allocation.buffer,
            dst,
            &[BufferTextureCopyRegion {
                buffer_offset: allocation.offset,
                ..region
            }],
        );
        Ok(allocation)
    }

    // ---- accessors -----------------------------------------------------

    pub fn active_frame(&self) -> &RenderFrame {
        &self.frames[self.active_frame_index as usize]
    }

    pub fn active_frame_mut(&mut self) -> &mut RenderFrame {
        &mut self.frames[self.active_frame_index as usize]
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub fn active_frame_index(&self) -> u32 {
        self.active_frame_index
    }

    pub fn is_frame_active(&self) -> bool {
        self.frame_active
    }

    pub fn swapchain_format(&self, device: &dyn RenderDevice) -> DeviceResult<Format> {
        Ok(device.swapchain_info(self.swapchain)?.format)
    }

    pub fn swapchain_extent(&self, device: &dyn RenderDevice) -> DeviceResult<Extent2d> {
        Ok(device.swapchain_info(self.swapchain)?.extent)
    }

    pub fn swapchain(&self) -> SwapchainHandle {
        self.swapchain
    }

    /// Tears everything down; waits for the device to go idle first.
    pub fn destroy(&mut self, device: &dyn RenderDevice) {
        device.wait_idle();
        for frame in &mut self.frames {
            frame.destroy(device);
        }
        self.frames.clear();
        device.destroy_command_pool(self.common_pool);
        device.destroy_swapchain(self.swapchain);
    }
}
