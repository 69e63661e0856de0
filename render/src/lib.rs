//! The ember rendering core.
//!
//! Turns frame-scoped "draw this scene" intent into a correctly ordered,
//! synchronized, well-batched stream of GPU commands, while reusing GPU
//! objects across frames:
//!
//! * typed opaque handles and descriptor structs for every GPU resource,
//!   plus the [`RenderDevice`]/[`CommandContext`] traits a backend
//!   implements ([`device`]);
//! * deferred command lists recorded into a bump arena and replayed
//!   against a context ([`command`]);
//! * a per-frame render graph that orders passes, places barriers, and
//!   allocates physical resources ([`graph`]);
//! * hash-keyed caches for render passes, framebuffers, pipeline layouts,
//!   and pipelines ([`cache`]);
//! * shader-group reflection from SPIR-V ([`shader`]);
//! * frame pacing over the swapchain ([`context`]).
//!
//! The core itself never touches a graphics API; see the Vulkan backend
//! crate for the `ash` implementation.
//!
//! [`RenderDevice`]: device::RenderDevice
//! [`CommandContext`]: device::CommandContext

pub mod buffer;
pub mod cache;
pub mod command;
pub mod context;
pub mod descriptor;
pub mod device;
pub mod error;
pub mod format;
pub mod frame;
pub mod graph;
pub mod handle;
pub mod pipeline;
pub mod renderpass;
pub mod shader;
pub mod sync;
pub mod texture;
pub mod vertex;

pub use crate::buffer::{BufferSpec, BufferTransition, BufferUsage, MemoryPlacement};
pub use crate::cache::ResourceCache;
pub use crate::command::{Command, CommandArena, DeferredCommandList};
pub use crate::context::{ContextConfig, RenderContext};
pub use crate::device::{
    AcquiredImage, CommandBufferLevel, CommandContext, CommandPoolResetMode, DrawIndexedParams,
    QueueClass, RenderDevice, RenderingInfo, SubmitInfo, SurfaceCapabilities, SwapchainInfo,
};
pub use crate::error::{DeviceError, DeviceResult, FrameError, GraphError, ReflectError};
pub use crate::format::Format;
pub use crate::frame::{RenderFrame, StagingAllocation, StagingBuffer, SyncObjectPool};
pub use crate::graph::{QueueFlags, RdgBufferInfo, RdgImageInfo, RenderGraph};
pub use crate::handle::*;
pub use crate::shader::{
    reflect_shader_group, ShaderGroupInfo, ShaderGroupSpec, ShaderResourceType, ShaderStage,
    ShaderStageFlags,
};
pub use crate::texture::{
    Dimensions, Extent2d, Extent3d, SamplerSpec, TextureLayout, TextureSpec, TextureTransition,
    TextureUsage,
};
