//! Raw and typed instruction decoding.

use crate::{inst::*, Module, ParseError};
use num_traits::FromPrimitive;
use spirv_headers::*;

impl Module {
    /// Iterates over the raw instruction stream, starting after the header.
    pub fn decode_raw(&self) -> impl Iterator<Item = RawInstruction<'_>> {
        struct RawInstIter<'m> {
            i: &'m [u32],
        }

        impl<'m> Iterator for RawInstIter<'m> {
            type Item = RawInstruction<'m>;

            fn next(&mut self) -> Option<RawInstruction<'m>> {
                if self.i.is_empty() {
                    return None;
                }
                match decode_raw_instruction(self.i) {
                    Ok((inst, rest)) => {
                        self.i = rest;
                        Some(inst)
                    }
                    Err(_) => {
                        // a malformed tail terminates iteration
                        self.i = &[];
                        None
                    }
                }
            }
        }

        // word 5 is the beginning of the instruction stream
        RawInstIter { i: &self.data[5..] }
    }

    /// Iterates over decoded instructions; unhandled opcodes and
    /// instructions with out-of-range enum operands come out as
    /// [`Instruction::Unknown`].
    pub fn decode(&self) -> impl Iterator<Item = Instruction<'_>> {
        self.decode_raw().map(|raw| raw.decode())
    }

    /// Iterates over all instructions of one decoded type.
    pub fn filter_instructions<'a, T: DecodedInstruction<'a>>(
        &'a self,
    ) -> impl Iterator<Item = T> + 'a {
        self.decode_raw().filter_map(|inst| {
            if inst.opcode == T::OPCODE as u16 {
                T::decode(inst.operands)
            } else {
                None
            }
        })
    }
}

/// Implemented by every typed instruction that can be decoded from operand
/// words. Decoding returns `None` when an enum operand holds a value this
/// crate does not know about; such instructions surface as
/// [`Instruction::Unknown`] from the untyped path.
pub trait DecodedInstruction<'m>: Sized + 'm {
    const OPCODE: Op;
    fn decode(operands: &'m [u32]) -> Option<Self>;
}

impl<'m> DecodedInstruction<'m> for IName {
    const OPCODE: Op = Op::Name;
    fn decode(operands: &'m [u32]) -> Option<Self> {
        Some(IName {
            target_id: operands[0],
            name: parse_string(&operands[1..]).0,
        })
    }
}

impl<'m> DecodedInstruction<'m> for IMemberName {
    const OPCODE: Op = Op::MemberName;
    fn decode(operands: &'m [u32]) -> Option<Self> {
        Some(IMemberName {
            target_id: operands[0],
            member: operands[1],
            name: parse_string(&operands[2..]).0,
        })
    }
}

impl<'m> DecodedInstruction<'m> for IEntryPoint<'m> {
    const OPCODE: Op = Op::EntryPoint;
    fn decode(operands: &'m [u32]) -> Option<Self> {
        let (name, interface) = parse_string(&operands[2..]);
        Some(IEntryPoint {
            execution: ExecutionModel::from_u32(operands[0])?,
            id: operands[1],
            name,
            interface,
        })
    }
}

impl<'m> DecodedInstruction<'m> for IExecutionMode<'m> {
    const OPCODE: Op = Op::ExecutionMode;
    fn decode(operands: &'m [u32]) -> Option<Self> {
        Some(IExecutionMode {
            target_id: operands[0],
            mode: ExecutionMode::from_u32(operands[1])?,
            optional_literals: &operands[2..],
        })
    }
}

impl<'m> DecodedInstruction<'m> for ITypeVoid {
    const OPCODE: Op = Op::TypeVoid;
    fn decode(operands: &'m [u32]) -> Option<Self> {
        Some(ITypeVoid {
            result_id: operands[0],
        })
    }
}

impl<'m> DecodedInstruction<'m> for ITypeBool {
    const OPCODE: Op = Op::TypeBool;
    fn decode(operands: &'m [u32]) -> Option<Self> {
        Some(ITypeBool {
            result_id: operands[0],
        })
    }
}

impl<'m> DecodedInstruction<'m> for ITypeInt {
    const OPCODE: Op = Op::TypeInt;
    fn decode(operands: &'m [u32]) -> Option<Self> {
        Some(ITypeInt {
            result_id: operands[0],
            width: operands[1],
            signedness: operands[2] != 0,
        })
    }
}

impl<'m> DecodedInstruction<'m> for ITypeFloat {
    const OPCODE: Op = Op::TypeFloat;
    fn decode(operands: &'m [u32]) -> Option<Self> {
        Some(ITypeFloat {
            result_id: operands[0],
            width: operands[1],
        })
    }
}

impl<'m> DecodedInstruction<'m> for ITypeVector {
    const OPCODE: Op = Op::TypeVector;
    fn decode(operands: &'m [u32]) -> Option<Self> {
        Some(ITypeVector {
            result_id: operands[0],
            component_id: operands[1],
            count: operands[2],
        })
    }
}

impl<'m> DecodedInstruction<'m> for ITypeMatrix {
    const OPCODE: Op = Op::TypeMatrix;
    fn decode(operands: &'m [u32]) -> Option<Self> {
        Some(ITypeMatrix {
            result_id: operands[0],
            column_type_id: operands[1],
            column_count: operands[2],
        })
    }
}

impl<'m> DecodedInstruction<'m> for ITypeImage {
    const OPCODE: Op = Op::TypeImage;
    fn decode(operands: &'m [u32]) -> Option<Self> {
        Some(ITypeImage {
            result_id: operands[0],
            sampled_type_id: operands[1],
            dim: Dim::from_u32(operands[2])?,
            depth: match operands[3] {
                0 => Some(false),
                1 => Some(true),
                _ => None,
            },
            arrayed: operands[4] != 0,
            ms: operands[5] != 0,
            sampled: match operands[6] {
                1 => Some(true),
                2 => Some(false),
                _ => None,
            },
            format: ImageFormat::from_u32(operands[7])?,
            access: match operands.get(8) {
                Some(&v) => Some(AccessQualifier::from_u32(v)?),
                None => None,
            },
        })
    }
}

impl<'m> DecodedInstruction<'m> for ITypeSampler {
    const OPCODE: Op = Op::TypeSampler;
    fn decode(operands: &'m [u32]) -> Option<Self> {
        Some(ITypeSampler {
            result_id: operands[0],
        })
    }
}

impl<'m> DecodedInstruction<'m> for ITypeSampledImage {
    const OPCODE: Op = Op::TypeSampledImage;
    fn decode(operands: &'m [u32]) -> Option<Self> {
        Some(ITypeSampledImage {
            result_id: operands[0],
            image_type_id: operands[1],
        })
    }
}

impl<'m> DecodedInstruction<'m> for ITypeArray {
    const OPCODE: Op = Op::TypeArray;
    fn decode(operands: &'m [u32]) -> Option<Self> {
        Some(ITypeArray {
            result_id: operands[0],
            type_id: operands[1],
            length_id: operands[2],
        })
    }
}

impl<'m> DecodedInstruction<'m> for ITypeRuntimeArray {
    const OPCODE: Op = Op::TypeRuntimeArray;
    fn decode(operands: &'m [u32]) -> Option<Self> {
        Some(ITypeRuntimeArray {
            result_id: operands[0],
            type_id: operands[1],
        })
    }
}

impl<'m> DecodedInstruction<'m> for ITypeStruct<'m> {
    const OPCODE: Op = Op::TypeStruct;
    fn decode(operands: &'m [u32]) -> Option<ITypeStruct<'m>> {
        Some(ITypeStruct {
            result_id: operands[0],
            member_types: &operands[1..],
        })
    }
}

impl<'m> DecodedInstruction<'m> for ITypePointer {
    const OPCODE: Op = Op::TypePointer;
    fn decode(operands: &'m [u32]) -> Option<Self> {
        Some(ITypePointer {
            result_id: operands[0],
            storage_class: StorageClass::from_u32(operands[1])?,
            type_id: operands[2],
        })
    }
}

impl<'m> DecodedInstruction<'m> for IConstant<'m> {
    const OPCODE: Op = Op::Constant;
    fn decode(operands: &'m [u32]) -> Option<Self> {
        Some(IConstant {
            result_type_id: operands[0],
            result_id: operands[1],
            data: &operands[2..],
        })
    }
}

impl<'m> DecodedInstruction<'m> for IVariable {
    const OPCODE: Op = Op::Variable;
    fn decode(operands: &'m [u32]) -> Option<Self> {
        Some(IVariable {
            result_type_id: operands[0],
            result_id: operands[1],
            storage_class: StorageClass::from_u32(operands[2])?,
            initializer: operands.get(3).copied(),
        })
    }
}

impl<'m> DecodedInstruction<'m> for IDecorate<'m> {
    const OPCODE: Op = Op::Decorate;
    fn decode(operands: &'m [u32]) -> Option<Self> {
        Some(IDecorate {
            target_id: operands[0],
            decoration: Decoration::from_u32(operands[1])?,
            params: &operands[2..],
        })
    }
}

impl<'m> DecodedInstruction<'m> for IMemberDecorate<'m> {
    const OPCODE: Op = Op::MemberDecorate;
    fn decode(operands: &'m [u32]) -> Option<Self> {
        Some(IMemberDecorate {
            target_id: operands[0],
            member: operands[1],
            decoration: Decoration::from_u32(operands[2])?,
            params: &operands[3..],
        })
    }
}

impl<'m> RawInstruction<'m> {
    pub fn decode(&self) -> Instruction<'m> {
        decode_instruction(self.opcode, self.operands)
    }
}

pub(crate) fn decode_raw_instruction(i: &[u32]) -> Result<(RawInstruction<'_>, &[u32]), ParseError> {
    let word_count = (i[0] >> 16) as usize;
    if word_count < 1 || i.len() < word_count {
        return Err(ParseError::IncompleteInstruction);
    }
    let opcode = (i[0] & 0xffff) as u16;
    let raw_inst = RawInstruction {
        opcode,
        word_count: word_count as u16,
        operands: &i[1..word_count],
    };
    Ok((raw_inst, &i[word_count..]))
}

fn decode_instruction(opcode: u16, operands: &[u32]) -> Instruction<'_> {
    let unknown = || Instruction::Unknown(IUnknownInst(opcode, operands));
    match opcode {
        0 => Instruction::Nop,
        5 => IName::decode(operands).map_or_else(unknown, Instruction::Name),
        6 => IMemberName::decode(operands).map_or_else(unknown, Instruction::MemberName),
        15 => IEntryPoint::decode(operands).map_or_else(unknown, Instruction::EntryPoint),
        16 => IExecutionMode::decode(operands).map_or_else(unknown, Instruction::ExecutionMode),
        19 => ITypeVoid::decode(operands).map_or_else(unknown, Instruction::TypeVoid),
        20 => ITypeBool::decode(operands).map_or_else(unknown, Instruction::TypeBool),
        21 => ITypeInt::decode(operands).map_or_else(unknown, Instruction::TypeInt),
        22 => ITypeFloat::decode(operands).map_or_else(unknown, Instruction::TypeFloat),
        23 => ITypeVector::decode(operands).map_or_else(unknown, Instruction::TypeVector),
        24 => ITypeMatrix::decode(operands).map_or_else(unknown, Instruction::TypeMatrix),
        25 => ITypeImage::decode(operands).map_or_else(unknown, Instruction::TypeImage),
        26 => ITypeSampler::decode(operands).map_or_else(unknown, Instruction::TypeSampler),
        27 => {
            ITypeSampledImage::decode(operands).map_or_else(unknown, Instruction::TypeSampledImage)
        }
        28 => ITypeArray::decode(operands).map_or_else(unknown, Instruction::TypeArray),
        29 => {
            ITypeRuntimeArray::decode(operands).map_or_else(unknown, Instruction::TypeRuntimeArray)
        }
        30 => ITypeStruct::decode(operands).map_or_else(unknown, Instruction::TypeStruct),
        32 => ITypePointer::decode(operands).map_or_else(unknown, Instruction::TypePointer),
        41 => Instruction::ConstantTrue(IConstantBool {
            result_type_id: operands[0],
            result_id: operands[1],
        }),
        42 => Instruction::ConstantFalse(IConstantBool {
            result_type_id: operands[0],
            result_id: operands[1],
        }),
        43 => IConstant::decode(operands).map_or_else(unknown, Instruction::Constant),
        48 => Instruction::SpecConstantTrue(IConstantBool {
            result_type_id: operands[0],
            result_id: operands[1],
        }),
        49 => Instruction::SpecConstantFalse(IConstantBool {
            result_type_id: operands[0],
            result_id: operands[1],
        }),
        50 => Instruction::SpecConstant(IConstant {
            result_type_id: operands[0],
            result_id: operands[1],
            data: &operands[2..],
        }),
        59 => IVariable::decode(operands).map_or_else(unknown, Instruction::Variable),
        71 => IDecorate::decode(operands).map_or_else(unknown, Instruction::Decorate),
        72 => IMemberDecorate::decode(operands).map_or_else(unknown, Instruction::MemberDecorate),
        _ => unknown(),
    }
}

/// Parses a nul-terminated UTF-8 string packed into words; returns the
/// string and the remaining operands.
pub(crate) fn parse_string(data: &[u32]) -> (String, &[u32]) {
    let bytes = data
        .iter()
        .flat_map(|&n| n.to_le_bytes())
        .take_while(|&b| b != 0)
        .collect::<Vec<u8>>();
    let r = 1 + bytes.len() / 4;
    let s = String::from_utf8_lossy(&bytes).into_owned();
    (s, &data[r.min(data.len())..])
}
