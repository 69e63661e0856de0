//! Vertex stream layout descriptions.

use crate::format::Format;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum IndexFormat {
    U16,
    U32,
}

impl IndexFormat {
    pub fn byte_size(self) -> u64 {
        match self {
            IndexFormat::U16 => 2,
            IndexFormat::U32 => 4,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum VertexInputRate {
    Vertex,
    Instance,
}

/// One vertex buffer binding slot.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct VertexInputBinding {
    pub binding: u32,
    pub stride: u32,
    pub input_rate: VertexInputRate,
}

/// One attribute fetched from a binding slot.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct VertexAttribute {
    pub location: u32,
    pub binding: u32,
    pub format: Format,
    pub offset: u32,
}

/// The complete vertex fetch layout of a pipeline.
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct VertexInputState {
    pub bindings: Vec<VertexInputBinding>,
    pub attributes: Vec<VertexAttribute>,
}

impl VertexInputState {
    /// Builds the packed single-binding layout reflection produces: all
    /// attributes in binding 0 at their reflected offsets.
    pub fn from_reflection(info: &crate::shader::ShaderGroupInfo) -> VertexInputState {
        if info.vertex_input_attributes.is_empty() {
            return VertexInputState::default();
        }
        VertexInputState {
            bindings: vec![VertexInputBinding {
                binding: 0,
                stride: info.vertex_binding_stride,
                input_rate: VertexInputRate::Vertex,
            }],
            attributes: info
                .vertex_input_attributes
                .iter()
                .map(|a| VertexAttribute {
                    location: a.location,
                    binding: a.binding,
                    format: a.format,
                    offset: a.offset,
                })
                .collect(),
        }
    }
}
