//! Error taxonomy for the rendering core.

use crate::format::Format;
use crate::handle::RawHandle;
use crate::shader::{ShaderResourceType, ShaderStage};
use thiserror::Error;

/// Errors surfaced by device object creation and submission.
#[derive(Debug, Clone, Error)]
pub enum DeviceError {
    /// Recoverable for one frame by releasing per-frame resources and
    /// retrying; persisting across frames should be escalated to fatal.
    #[error("out of device memory")]
    OutOfDeviceMemory,
    #[error("out of host memory")]
    OutOfHostMemory,
    #[error("invalid resource description: {0}")]
    InvalidSpec(String),
    #[error("unsupported format {0:?}")]
    UnsupportedFormat(Format),
    #[error("surface lost")]
    SurfaceLost,
    #[error("swapchain out of date")]
    OutOfDate,
    #[error("swapchain suboptimal")]
    Suboptimal,
    #[error("invalid handle {0:?}")]
    HandleInvalid(RawHandle),
    #[error("shader rejected: {0}")]
    ShaderInvalid(#[from] ReflectError),
    #[error("pipeline creation failed: {0}")]
    PipelineCreationFailed(String),
    #[error("descriptor pool exhausted")]
    DescriptorPoolExhausted,
    #[error("wait timed out")]
    Timeout,
    #[error("device lost")]
    DeviceLost,
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),
}

pub type DeviceResult<T> = Result<T, DeviceError>;

/// Errors from shader-group reflection.
#[derive(Debug, Clone, Error)]
pub enum ReflectError {
    #[error("stage {stage:?}: malformed SPIR-V: {source}")]
    Parse {
        stage: ShaderStage,
        source: ember_spirv::ParseError,
    },
    #[error("stage {stage:?}: more than one push constant block in the shader group")]
    MultiplePushConstantBlocks { stage: ShaderStage },
    #[error(
        "stage {stage:?}: push constant block {name:?} ({size} bytes) conflicts with \
         previously declared block {other_name:?} ({other_size} bytes)"
    )]
    PushConstantMismatch {
        stage: ShaderStage,
        name: String,
        size: u32,
        other_name: String,
        other_size: u32,
    },
    #[error(
        "stage {stage:?}: binding (set={set}, binding={binding}) redeclared as {incoming:?} \
         ({what} mismatch, previously {existing:?})"
    )]
    BindingConflict {
        stage: ShaderStage,
        set: u32,
        binding: u32,
        existing: ShaderResourceType,
        incoming: ShaderResourceType,
        what: &'static str,
    },
    #[error("stage {stage:?}: descriptor (set={set}, binding={binding}) not supported: {reason}")]
    UnsupportedDescriptor {
        stage: ShaderStage,
        set: u32,
        binding: u32,
        reason: &'static str,
    },
}

/// Errors from render graph compilation; fatal for the current frame.
#[derive(Debug, Clone, Error)]
pub enum GraphError {
    #[error("back buffer resource {0:?} does not exist")]
    MissingBackBuffer(String),
    #[error("no pass writes to back buffer {0:?}")]
    NoBackBufferWriter(String),
    #[error("cycle detected in render graph")]
    CycleDetected,
    #[error("graph has not been compiled")]
    NotCompiled,
    #[error("pass {pass:?} writes resource {resource:?} more than once")]
    WriteAfterWrite { pass: String, resource: String },
    #[error("resource {0:?} redeclared with a different kind")]
    ResourceKindMismatch(String),
    #[error("pass {pass:?} depends on unknown resource {resource:?}")]
    UnknownResource { pass: String, resource: String },
    #[error(transparent)]
    Device(#[from] DeviceError),
}

/// Errors from frame pacing.
#[derive(Debug, Clone, Error)]
pub enum FrameError {
    #[error("no frame is active")]
    NoActiveFrame,
    #[error("frame already active")]
    FrameAlreadyActive,
    #[error("staging buffer exhausted: requested {requested} bytes, {remaining} remaining")]
    StagingExhausted { requested: u64, remaining: u64 },
    #[error(transparent)]
    Device(#[from] DeviceError),
}
