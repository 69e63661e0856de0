//! SPIR-V module parsing and reflection primitives.
//!
//! This crate decodes a compiled SPIR-V module far enough to answer the
//! questions a renderer asks of shader bytecode: which interface variables
//! exist, how they are decorated, what their types look like, and how big
//! uniform/storage blocks are under std140/std430 rules. It never modifies
//! the bytecode.

pub mod ast;
mod decode;
pub mod inst;
pub mod layout;

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use thiserror::Error;

pub use self::ast::ModuleAst;
pub use self::decode::DecodedInstruction;
pub use self::layout::{block_byte_size, AlignAndSize, BlockLayout};
// the enums that appear in this crate's public types
pub use spirv_headers::{Decoration, Dim, ExecutionModel, ImageFormat, StorageClass};

pub const SPIRV_MAGIC: u32 = 0x0723_0203;

/// Errors that can happen while decoding a module.
#[derive(Debug, Clone, Error)]
pub enum ParseError {
    #[error("missing or truncated SPIR-V header")]
    MissingHeader,
    #[error("wrong SPIR-V magic number")]
    WrongHeader,
    #[error("instruction extends past the end of the module")]
    IncompleteInstruction,
    #[error("unknown value {1} for SPIR-V constant ({0})")]
    UnknownConstant(&'static str, u32),
}

/// A decoded SPIR-V module: the raw word stream plus header fields.
#[derive(Debug, Clone)]
pub struct Module {
    pub data: Vec<u32>,
    pub version: (u8, u8),
    pub bound: u32,
}

impl Module {
    /// Parses a module from raw bytes, handling either byte order.
    ///
    /// The byte order is determined from the magic number in the first word.
    pub fn from_bytes(data: &[u8]) -> Result<Module, ParseError> {
        if data.len() < 20 || data.len() % 4 != 0 {
            return Err(ParseError::MissingHeader);
        }
        let mut words = vec![0u32; data.len() / 4];
        LittleEndian::read_u32_into(data, &mut words);
        if words[0] != SPIRV_MAGIC {
            BigEndian::read_u32_into(data, &mut words);
            if words[0] != SPIRV_MAGIC {
                return Err(ParseError::WrongHeader);
            }
        }
        Self::from_words(&words)
    }

    /// Parses a module from a word stream in host order.
    pub fn from_words(i: &[u32]) -> Result<Module, ParseError> {
        if i.len() < 5 {
            return Err(ParseError::MissingHeader);
        }
        if i[0] != SPIRV_MAGIC {
            return Err(ParseError::WrongHeader);
        }
        let version = (
            ((i[1] & 0x00ff_0000) >> 16) as u8,
            ((i[1] & 0x0000_ff00) >> 8) as u8,
        );
        Ok(Module {
            version,
            bound: i[3],
            data: i.to_vec(),
        })
    }
}

//--------------------------------------------------------------------------------------------------

/// Primitive SPIR-V scalar types.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum PrimitiveType {
    /// 32-bit signed integer
    Int,
    /// 32-bit unsigned integer
    UnsignedInt,
    /// 16-bit half float
    Half,
    /// 32-bit floating-point value
    Float,
    /// 64-bit floating-point value
    Double,
    Bool,
}

impl PrimitiveType {
    /// Byte width as stored in a buffer or vertex stream.
    pub fn byte_width(&self) -> usize {
        match self {
            PrimitiveType::Half => 2,
            PrimitiveType::Double => 8,
            // bools are 32-bit in interface blocks
            _ => 4,
        }
    }
}

/// The sampled data class of an image type.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum ImageDataType {
    Float,
    Integer,
    UnsignedInteger,
}

/// A member of a struct type: byte offset (from `Offset` decorations, if
/// present) and the member type.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct StructMember {
    pub offset: Option<u32>,
    pub ty: TypeDesc,
}

/// Describes a data type used inside a SPIR-V shader.
///
/// `TypeDesc` describes unpacked data as seen by the shader, not the packed
/// bit layout of buffer memory; a `R16G16B16_UNORM` vertex attribute still
/// reads as `Vector(Float, 3)` here.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub enum TypeDesc {
    Primitive(PrimitiveType),
    /// Element type and length; a length of `None` is a runtime array.
    Array(Box<TypeDesc>, Option<u32>),
    /// (component type, component count)
    Vector(PrimitiveType, u8),
    /// (component type, rows, columns)
    Matrix(PrimitiveType, u8, u8),
    Struct(Vec<StructMember>),
    Image {
        data_type: ImageDataType,
        dim: spirv_headers::Dim,
        arrayed: bool,
        multisampled: bool,
        /// `Some(true)` when declared for sampling, `Some(false)` for storage.
        sampled: Option<bool>,
        format: spirv_headers::ImageFormat,
    },
    SampledImage(Box<TypeDesc>),
    Sampler,
    Void,
    Pointer {
        storage_class: spirv_headers::StorageClass,
        pointee: Box<TypeDesc>,
    },
    Unknown,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header_words() -> Vec<u32> {
        // magic, version 1.5, generator, bound, schema
        vec![SPIRV_MAGIC, 0x0001_0500, 0, 8, 0]
    }

    #[test]
    fn parse_header() {
        let m = Module::from_words(&header_words()).unwrap();
        assert_eq!(m.version, (1, 5));
        assert_eq!(m.bound, 8);
    }

    #[test]
    fn parse_bytes_either_endianness() {
        let words = header_words();
        let le: Vec<u8> = words.iter().flat_map(|w| w.to_le_bytes()).collect();
        let be: Vec<u8> = words.iter().flat_map(|w| w.to_be_bytes()).collect();
        assert_eq!(Module::from_bytes(&le).unwrap().version, (1, 5));
        assert_eq!(Module::from_bytes(&be).unwrap().version, (1, 5));
    }

    #[test]
    fn reject_bad_magic() {
        let mut words = header_words();
        words[0] = 0xdead_beef;
        assert!(matches!(
            Module::from_words(&words),
            Err(ParseError::WrongHeader)
        ));
    }
}

impl TypeDesc {
    /// Follows pointer indirections down to the pointee type.
    pub fn deref(&self) -> &TypeDesc {
        match self {
            TypeDesc::Pointer { pointee, .. } => pointee.deref(),
            other => other,
        }
    }

    /// Peels array dimensions, returning the element type and the product of
    /// all literal dimensions. A runtime array contributes a factor of 1.
    pub fn strip_arrays(&self) -> (&TypeDesc, u32) {
        let mut ty = self;
        let mut count = 1u32;
        while let TypeDesc::Array(elem, len) = ty {
            count *= len.unwrap_or(1);
            ty = elem;
        }
        (ty, count)
    }
}
