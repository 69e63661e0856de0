//! Per-frame resources: command pools, sync objects, staging memory.

use crate::buffer::BufferSpec;
use crate::command::CommandArena;
use crate::device::{CommandBufferLevel, CommandPoolResetMode, QueueClass, RenderDevice};
use crate::error::{DeviceResult, FrameError};
use crate::handle::{
    BufferHandle, CommandBufferHandle, CommandPoolHandle, FenceHandle, SemaphoreHandle,
    TextureHandle,
};
use fxhash::FxHashMap;

/// Upper bound of one frame's staging ring.
pub const MAX_STAGING_BUFFER_SIZE: u64 = 64 * 1024 * 1024;

/// Recycling pool of fences and semaphores private to one frame.
///
/// Semaphores come in two flavors. Plain semaphores stay owned by the pool
/// and recycle on [`reset`](SyncObjectPool::reset). Ownership semaphores are
/// handed out entirely (swapchain acquisition outlives the request site) and
/// return through [`release_semaphore_with_ownership`]; they rejoin the
/// recycled set only at reset, so nothing outside the releasing frame can
/// still be waiting on them.
///
/// [`release_semaphore_with_ownership`]: SyncObjectPool::release_semaphore_with_ownership
#[derive(Default)]
pub struct SyncObjectPool {
    fences: Vec<FenceHandle>,
    active_fences: usize,
    semaphores: Vec<SemaphoreHandle>,
    active_semaphores: usize,
    released_semaphores: Vec<SemaphoreHandle>,
}

impl SyncObjectPool {
    pub fn new() -> SyncObjectPool {
        SyncObjectPool::default()
    }

    pub fn request_fence(&mut self, device: &dyn RenderDevice) -> DeviceResult<FenceHandle> {
        if self.active_fences == self.fences.len() {
            self.fences.push(device.create_fence(false)?);
        }
        let fence = self.fences[self.active_fences];
        self.active_fences += 1;
        Ok(fence)
    }

    pub fn request_semaphore(
        &mut self,
        device: &dyn RenderDevice,
    ) -> DeviceResult<SemaphoreHandle> {
        if self.active_semaphores == self.semaphores.len() {
            self.semaphores.push(device.create_semaphore()?);
        }
        let semaphore = self.semaphores[self.active_semaphores];
        self.active_semaphores += 1;
        Ok(semaphore)
    }

    /// Hands a semaphore out of the pool entirely; the caller keeps it until
    /// [`release_semaphore_with_ownership`](Self::release_semaphore_with_ownership).
    pub fn request_semaphore_with_ownership(
        &mut self,
        device: &dyn RenderDevice,
    ) -> DeviceResult<SemaphoreHandle> {
        if self.active_semaphores < self.semaphores.len() {
            if let Some(semaphore) = self.semaphores.pop() {
                return Ok(semaphore);
            }
        }
        device.create_semaphore()
    }

    pub fn release_semaphore_with_ownership(&mut self, semaphore: SemaphoreHandle) {
        self.released_semaphores.push(semaphore);
    }

    pub fn wait_for_fences(
        &self,
        device: &dyn RenderDevice,
        timeout_ns: u64,
    ) -> DeviceResult<()> {
        if self.active_fences == 0 {
            return Ok(());
        }
        device.wait_for_fences(&self.fences[..self.active_fences], timeout_ns)
    }

    /// Recycles everything: waits are the caller's duty.
    pub fn reset(&mut self, device: &dyn RenderDevice) {
        if self.active_fences > 0 {
            device.reset_fences(&self.fences[..self.active_fences]);
        }
        self.active_fences = 0;
        self.active_semaphores = 0;
        self.semaphores.append(&mut self.released_semaphores);
    }

    pub fn destroy(&mut self, device: &dyn RenderDevice) {
        for fence in self.fences.drain(..) {
            device.destroy_fence(fence);
        }
        for semaphore in self
            .semaphores
            .drain(..)
            .chain(self.released_semaphores.drain(..))
        {
            device.destroy_semaphore(semaphore);
        }
        self.active_fences = 0;
        self.active_semaphores = 0;
    }
}

/// One suballocation out of the staging ring.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct StagingAllocation {
    pub buffer: BufferHandle,
    pub offset: u64,
    pub size: u64,
}

/// A host-visible ring with a frame-scoped cursor; uploads go through here
/// into device-local resources.
pub struct StagingBuffer {
    buffer: BufferHandle,
    size: u64,
    cursor: u64,
}

impl StagingBuffer {
    pub fn new(device: &dyn RenderDevice, byte_size: u64) -> DeviceResult<StagingBuffer> {
        let buffer = device.create_buffer(&BufferSpec::staging(byte_size))?;
        Ok(StagingBuffer {
            buffer,
            size: byte_size,
            cursor: 0,
        })
    }

    /// Copies `data` into the ring and advances the cursor.
    pub fn submit(
        &mut self,
        device: &dyn RenderDevice,
        data: &[u8],
    ) -> Result<StagingAllocation, FrameError> {
        let size = data.len() as u64;
        if self.cursor + size > self.size {
            return Err(FrameError::StagingExhausted {
                requested: size,
                remaining: self.size - self.cursor,
            });
        }
        device.write_buffer(self.buffer, self.cursor, data)?;
        let allocation = StagingAllocation {
            buffer: self.buffer,
            offset: self.cursor,
            size,
        };
        self.cursor += size;
        Ok(allocation)
    }

    pub fn handle(&self) -> BufferHandle {
        self.buffer
    }

    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    pub fn capacity(&self) -> u64 {
        self.size
    }

    pub fn reset_cursor(&mut self) {
        self.cursor = 0;
    }

    pub fn destroy(&mut self, device: &dyn RenderDevice) {
        device.destroy_buffer(self.buffer);
        self.buffer = BufferHandle::NULL;
    }
}

/// Everything owned by one in-flight frame: command pools per (queue,
/// thread), the staging ring, a private sync pool, the command arena, and
/// this frame's swapchain image.
pub struct RenderFrame {
    command_pools: FxHashMap<(QueueClass, u32), CommandPoolHandle>,
    sync_pool: SyncObjectPool,
    staging: StagingBuffer,
    arena: CommandArena,
    swapchain_texture: TextureHandle,
    thread_count: u32,
}

impl RenderFrame {
    pub fn new(
        device: &dyn RenderDevice,
        swapchain_texture: TextureHandle,
        thread_count: u32,
        staging_size: u64,
    ) -> DeviceResult<RenderFrame> {
        Ok(RenderFrame {
            command_pools: FxHashMap::default(),
            sync_pool: SyncObjectPool::new(),
            staging: StagingBuffer::new(device, staging_size)?,
            arena: CommandArena::new(),
            swapchain_texture,
            thread_count,
        })
    }

    /// Requests a command buffer from this frame's pool for (queue,
    /// thread); pools are created lazily, one per recording thread.
    pub fn request_command_buffer(
        &mut self,
        device: &dyn RenderDevice,
        queue: QueueClass,
        reset_mode: CommandPoolResetMode,
        level: CommandBufferLevel,
        thread_id: u32,
    ) -> DeviceResult<CommandBufferHandle> {
        debug_assert!(thread_id < self.thread_count.max(1));
        let pool = match self.command_pools.get(&(queue, thread_id)) {
            Some(&pool) => pool,
            None => {
                let pool = device.create_command_pool(queue, reset_mode)?;
                self.command_pools.insert((queue, thread_id), pool);
                pool
            }
        };
        device.get_or_create_command_buffer(pool, level)
    }

    pub fn request_fence(&mut self, device: &dyn RenderDevice) -> DeviceResult<FenceHandle> {
        self.sync_pool.request_fence(device)
    }

    pub fn request_semaphore(
        &mut self,
        device: &dyn RenderDevice,
    ) -> DeviceResult<SemaphoreHandle> {
        self.sync_pool.request_semaphore(device)
    }

    pub fn request_semaphore_with_ownership(
        &mut self,
        device: &dyn RenderDevice,
    ) -> DeviceResult<SemaphoreHandle> {
        self.sync_pool.request_semaphore_with_ownership(device)
    }

    pub fn release_semaphore_with_ownership(&mut self, semaphore: SemaphoreHandle) {
        self.sync_pool.release_semaphore_with_ownership(semaphore);
    }

    /// Waits for this frame's submissions, then recycles the pools, the
    /// staging cursor, the arena, and the sync objects.
    pub fn reset(&mut self, device: &dyn RenderDevice) -> DeviceResult<()> {
        self.sync_pool
            .wait_for_fences(device, crate::device::WAIT_FOREVER)?;
        self.sync_pool.reset(device);
        for &pool in self.command_pools.values() {
            device.reset_command_pool(pool)?;
        }
        self.staging.reset_cursor();
        self.arena.reset();
        Ok(())
    }

    pub fn swapchain_texture(&self) -> TextureHandle {
        self.swapchain_texture
    }

    pub fn staging(&mut self) -> &mut StagingBuffer {
        &mut self.staging
    }

    pub fn staging_cursor(&self) -> u64 {
        self.staging.cursor()
    }

    pub fn arena(&self) -> &CommandArena {
        &self.arena
    }

    pub fn destroy(&mut self, device: &dyn RenderDevice) {
        self.sync_pool.destroy(device);
        self.staging.destroy(device);
        for (_, pool) in self.command_pools.drain() {
            device.destroy_command_pool(pool);
        }
    }
}
