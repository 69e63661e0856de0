//! Buffer descriptions and buffer barriers.

use crate::handle::BufferHandle;
use crate::sync::PipelineStageFlags;
use bitflags::bitflags;

bitflags! {
    pub struct BufferUsage: u32 {
        const TRANSFER_SRC = 1 << 0;
        const TRANSFER_DST = 1 << 1;
        const VERTEX       = 1 << 2;
        const INDEX        = 1 << 3;
        const UNIFORM      = 1 << 4;
        const STORAGE      = 1 << 5;
        const INDIRECT     = 1 << 6;
    }
}

impl BufferUsage {
    /// The pipeline stages that consume a buffer in this usage.
    pub fn pipeline_stages(self) -> PipelineStageFlags {
        let mut stages = PipelineStageFlags::empty();
        if self.intersects(BufferUsage::TRANSFER_SRC | BufferUsage::TRANSFER_DST) {
            stages |= PipelineStageFlags::TRANSFER;
        }
        if self.intersects(BufferUsage::VERTEX | BufferUsage::INDEX) {
            stages |= PipelineStageFlags::VERTEX_INPUT;
        }
        if self.intersects(BufferUsage::UNIFORM | BufferUsage::STORAGE) {
            stages |= PipelineStageFlags::VERTEX_SHADER
                | PipelineStageFlags::FRAGMENT_SHADER
                | PipelineStageFlags::COMPUTE_SHADER;
        }
        if self.contains(BufferUsage::INDIRECT) {
            stages |= PipelineStageFlags::DRAW_INDIRECT;
        }
        if stages.is_empty() {
            stages = PipelineStageFlags::TOP_OF_PIPE;
        }
        stages
    }

    /// Usages that imply a write the next access must see.
    pub fn is_write_dependent(self) -> bool {
        self.intersects(BufferUsage::TRANSFER_DST | BufferUsage::STORAGE | BufferUsage::UNIFORM)
    }
}

impl Default for BufferUsage {
    fn default() -> BufferUsage {
        BufferUsage::empty()
    }
}

/// Where the buffer memory lives and how the host may touch it.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum MemoryPlacement {
    DeviceLocal,
    /// Host-mapped, written front to back (staging rings).
    HostVisibleSequentialWrite,
    /// Host-mapped with random access (readback, dynamic uniforms).
    HostVisibleRandom,
}

/// Create-time description of a buffer; immutable once the object exists.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct BufferSpec {
    pub size: u64,
    pub usage: BufferUsage,
    pub placement: MemoryPlacement,
}

impl BufferSpec {
    pub fn new(size: u64, usage: BufferUsage) -> BufferSpec {
        BufferSpec {
            size,
            usage,
            placement: MemoryPlacement::DeviceLocal,
        }
    }

    pub fn vertex(size: u64) -> BufferSpec {
        BufferSpec::new(size, BufferUsage::VERTEX | BufferUsage::TRANSFER_DST)
    }

    pub fn index(size: u64) -> BufferSpec {
        BufferSpec::new(size, BufferUsage::INDEX | BufferUsage::TRANSFER_DST)
    }

    pub fn uniform(size: u64) -> BufferSpec {
        BufferSpec::new(size, BufferUsage::UNIFORM | BufferUsage::TRANSFER_DST)
    }

    pub fn storage(size: u64) -> BufferSpec {
        BufferSpec::new(size, BufferUsage::STORAGE | BufferUsage::TRANSFER_DST)
    }

    pub fn staging(size: u64) -> BufferSpec {
        BufferSpec {
            size,
            usage: BufferUsage::TRANSFER_SRC,
            placement: MemoryPlacement::HostVisibleSequentialWrite,
        }
    }
}

/// A buffer memory dependency between two usages.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct BufferTransition {
    pub buffer: BufferHandle,
    pub src_usage: BufferUsage,
    pub dst_usage: BufferUsage,
}

/// A global memory dependency, expressed in the same usage vocabulary.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct MemoryTransition {
    pub src_usage: BufferUsage,
    pub dst_usage: BufferUsage,
}
