//! Descriptor set layouts and descriptor writes.

use crate::handle::{BufferHandle, SamplerHandle, TextureHandle};
use crate::shader::{ShaderResource, ShaderResourceType, ShaderStageFlags};
use crate::texture::TextureLayout;
use smallvec::SmallVec;

/// One binding slot in a descriptor set layout.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct DescriptorSetLayoutBinding {
    pub binding: u32,
    pub ty: ShaderResourceType,
    pub count: u32,
    pub stage_flags: ShaderStageFlags,
}

/// A whole set layout: the (set index, bindings) pair the cache dedups on.
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct DescriptorSetLayoutSpec {
    pub set_index: u32,
    pub bindings: Vec<DescriptorSetLayoutBinding>,
}

impl DescriptorSetLayoutSpec {
    /// Derives the layout of one set from reflected shader resources.
    pub fn from_shader_resources(set_index: u32, resources: &[ShaderResource]) -> Self {
        let mut bindings: Vec<_> = resources
            .iter()
            .map(|r| DescriptorSetLayoutBinding {
                binding: r.binding,
                ty: r.ty,
                count: r.array_size.max(1),
                stage_flags: r.stage_flags,
            })
            .collect();
        bindings.sort_by_key(|b| b.binding);
        DescriptorSetLayoutSpec {
            set_index,
            bindings,
        }
    }
}

/// A single resource reference inside a descriptor write.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum DescriptorResource {
    SamplerWithTexture {
        sampler: SamplerHandle,
        texture: TextureHandle,
        layout: TextureLayout,
    },
    Texture {
        texture: TextureHandle,
        layout: TextureLayout,
    },
    StorageImage {
        texture: TextureHandle,
    },
    Buffer {
        buffer: BufferHandle,
        offset: u64,
        /// `None` binds the whole buffer.
        range: Option<u64>,
    },
    Sampler {
        sampler: SamplerHandle,
    },
}

/// One `WriteDescriptorSet`-shaped update: a binding and the resources that
/// land in it (arrays carry several).
#[derive(Clone, Debug, PartialEq)]
pub struct DescriptorWrite {
    pub binding: u32,
    pub ty: ShaderResourceType,
    pub resources: SmallVec<[DescriptorResource; 1]>,
}

impl DescriptorWrite {
    pub fn sampled_texture(
        binding: u32,
        sampler: SamplerHandle,
        texture: TextureHandle,
    ) -> DescriptorWrite {
        DescriptorWrite {
            binding,
            ty: ShaderResourceType::SamplerWithTexture,
            resources: smallvec::smallvec![DescriptorResource::SamplerWithTexture {
                sampler,
                texture,
                layout: TextureLayout::ShaderReadOnly,
            }],
        }
    }

    pub fn uniform_buffer(binding: u32, buffer: BufferHandle) -> DescriptorWrite {
        DescriptorWrite {
            binding,
            ty: ShaderResourceType::UniformBuffer,
            resources: smallvec::smallvec![DescriptorResource::Buffer {
                buffer,
                offset: 0,
                range: None,
            }],
        }
    }

    pub fn storage_buffer(binding: u32, buffer: BufferHandle) -> DescriptorWrite {
        DescriptorWrite {
            binding,
            ty: ShaderResourceType::StorageBuffer,
            resources: smallvec::smallvec![DescriptorResource::Buffer {
                buffer,
                offset: 0,
                range: None,
            }],
        }
    }
}
