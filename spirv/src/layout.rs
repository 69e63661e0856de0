//! std140 / std430 layout computation for interface block types.

use crate::TypeDesc;

fn round_up(value: u32, multiple: u32) -> u32 {
    if multiple == 0 {
        return value;
    }
    let remainder = value % multiple;
    if remainder == 0 {
        value
    } else {
        value + multiple - remainder
    }
}

/// Which buffer layout rule set to apply.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum BlockLayout {
    /// Uniform blocks: array and struct alignments rounded up to 16 bytes.
    Std140,
    /// Storage blocks: natural alignments.
    Std430,
}

/// Alignment and size of a type under one of the block layout rule sets.
///
/// `size` is more precisely the offset to the next member.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct AlignAndSize {
    pub align: u32,
    pub size: u32,
}

impl AlignAndSize {
    pub fn of(ty: &TypeDesc, layout: BlockLayout) -> AlignAndSize {
        match ty {
            TypeDesc::Primitive(p) => {
                let n = p.byte_width() as u32;
                AlignAndSize { align: n, size: n }
            }
            TypeDesc::Vector(p, count) => {
                let n = p.byte_width() as u32;
                // vec3 aligns like vec4
                let align = match count {
                    2 => 2 * n,
                    _ => 4 * n,
                };
                AlignAndSize {
                    align,
                    size: n * *count as u32,
                }
            }
            // column-major: a matrix lays out as an array of column vectors
            TypeDesc::Matrix(p, rows, cols) => {
                AlignAndSize::of_array(&TypeDesc::Vector(*p, *rows), *cols as u32, layout)
            }
            TypeDesc::Array(elem, len) => {
                AlignAndSize::of_array(elem, len.unwrap_or(0), layout)
            }
            TypeDesc::Struct(members) => {
                let mut align = 0;
                let mut offset = 0;
                for member in members {
                    let m = AlignAndSize::of(&member.ty, layout);
                    align = align.max(m.align);
                    offset = match member.offset {
                        Some(declared) => declared + m.size,
                        None => round_up(offset, m.align) + m.size,
                    };
                }
                if layout == BlockLayout::Std140 {
                    align = round_up(align, 16);
                }
                AlignAndSize {
                    align,
                    size: round_up(offset, align.max(1)),
                }
            }
            TypeDesc::Pointer { pointee, .. } => AlignAndSize::of(pointee, layout),
            // opaque types occupy no block space
            _ => AlignAndSize { align: 0, size: 0 },
        }
    }

    fn of_array(elem: &TypeDesc, len: u32, layout: BlockLayout) -> AlignAndSize {
        let e = AlignAndSize::of(elem, layout);
        let align = match layout {
            BlockLayout::Std140 => round_up(e.align, 16),
            BlockLayout::Std430 => e.align,
        };
        let stride = round_up(e.size, align.max(1));
        AlignAndSize {
            align,
            size: stride * len,
        }
    }
}

/// Byte size of an interface block type: the declared member offsets win
/// when present, the layout rules fill in the rest.
pub fn block_byte_size(ty: &TypeDesc, layout: BlockLayout) -> u32 {
    match ty.deref() {
        TypeDesc::Struct(members) => {
            let mut size = 0;
            let mut implicit_offset = 0;
            for member in members {
                let m = AlignAndSize::of(&member.ty, layout);
                let offset = match member.offset {
                    Some(declared) => declared,
                    None => round_up(implicit_offset, m.align.max(1)),
                };
                implicit_offset = offset + m.size;
                size = size.max(offset + m.size);
            }
            size
        }
        other => AlignAndSize::of(other, layout).size,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{PrimitiveType, StructMember};

    fn member(offset: u32, ty: TypeDesc) -> StructMember {
        StructMember {
            offset: Some(offset),
            ty,
        }
    }

    #[test]
    fn scalar_and_vector_sizes() {
        let f = TypeDesc::Primitive(PrimitiveType::Float);
        assert_eq!(AlignAndSize::of(&f, BlockLayout::Std140).size, 4);

        let v3 = TypeDesc::Vector(PrimitiveType::Float, 3);
        let l = AlignAndSize::of(&v3, BlockLayout::Std140);
        assert_eq!(l.align, 16);
        assert_eq!(l.size, 12);
    }

    #[test]
    fn mat4_block_size() {
        let m = TypeDesc::Matrix(PrimitiveType::Float, 4, 4);
        assert_eq!(AlignAndSize::of(&m, BlockLayout::Std140).size, 64);
    }

    #[test]
    fn struct_with_declared_offsets() {
        // struct { mat4 mvp; vec4 tint; float exposure; }
        let s = TypeDesc::Struct(vec![
            member(0, TypeDesc::Matrix(PrimitiveType::Float, 4, 4)),
            member(64, TypeDesc::Vector(PrimitiveType::Float, 4)),
            member(80, TypeDesc::Primitive(PrimitiveType::Float)),
        ]);
        assert_eq!(block_byte_size(&s, BlockLayout::Std140), 84);
    }

    #[test]
    fn std140_array_stride_rounds_to_16() {
        let a = TypeDesc::Array(
            Box::new(TypeDesc::Primitive(PrimitiveType::Float)),
            Some(4),
        );
        assert_eq!(AlignAndSize::of(&a, BlockLayout::Std140).size, 64);
        assert_eq!(AlignAndSize::of(&a, BlockLayout::Std430).size, 16);
    }
}
