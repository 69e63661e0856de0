//! An owned, queryable view of a decoded module.
//!
//! SPIR-V guarantees that debug names and annotations precede the
//! types/constants/variables section, and that parameterizing operands of a
//! type are defined before use, so a single in-order pass over the
//! instruction stream is enough to reconstruct everything reflection needs.

use crate::inst::*;
use crate::{ImageDataType, Module, PrimitiveType, StructMember, TypeDesc};
use spirv_headers::{Decoration, ExecutionModel, StorageClass};
use std::collections::HashMap;

/// A global variable declaration: interface variables, uniform/storage
/// blocks, samplers, images.
#[derive(Debug, Clone)]
pub struct VariableInfo {
    pub id: u32,
    pub name: Option<String>,
    pub storage_class: StorageClass,
    /// The declared (pointer) type; use [`TypeDesc::deref`] for the pointee.
    pub ty: TypeDesc,
    /// Result id of the declared type, for decoration lookups on the type.
    pub type_id: u32,
}

/// The default value of a specialization constant.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum SpecConstantDefault {
    Bool(bool),
    Int(i32),
    Float(f32),
}

/// A specialization constant declaration (`OpSpecConstant*` + `SpecId`).
#[derive(Debug, Clone)]
pub struct SpecConstantInfo {
    /// The `SpecId` decoration value, i.e. the application-visible id.
    pub spec_id: u32,
    pub name: Option<String>,
    pub default: SpecConstantDefault,
}

#[derive(Debug, Clone)]
pub struct EntryPointInfo {
    pub execution: ExecutionModel,
    pub name: String,
}

/// Owned reflection view over one module.
#[derive(Debug, Default)]
pub struct ModuleAst {
    names: HashMap<u32, String>,
    member_names: HashMap<(u32, u32), String>,
    decorations: HashMap<u32, Vec<(Decoration, Vec<u32>)>>,
    member_decorations: HashMap<(u32, u32), Vec<(Decoration, Vec<u32>)>>,
    types: HashMap<u32, TypeDesc>,
    /// Pointer type id -> pointee type id.
    pointees: HashMap<u32, u32>,
    /// Scalar constants by result id (first data word).
    constants: HashMap<u32, u32>,
    variables: Vec<VariableInfo>,
    entry_points: Vec<EntryPointInfo>,
    spec_constants: Vec<SpecConstantInfo>,
}

impl ModuleAst {
    pub fn build(module: &Module) -> ModuleAst {
        let mut ast = ModuleAst::default();
        let mut raw_variables = Vec::new();
        let mut raw_spec_constants = Vec::new();

        for inst in module.decode() {
            match inst {
                Instruction::Name(n) => {
                    if !n.name.is_empty() {
                        ast.names.insert(n.target_id, n.name);
                    }
                }
                Instruction::MemberName(n) => {
                    ast.member_names.insert((n.target_id, n.member), n.name);
                }
                Instruction::Decorate(d) => {
                    ast.decorations
                        .entry(d.target_id)
                        .or_default()
                        .push((d.decoration, d.params.to_vec()));
                }
                Instruction::MemberDecorate(d) => {
                    ast.member_decorations
                        .entry((d.target_id, d.member))
                        .or_default()
                        .push((d.decoration, d.params.to_vec()));
                }
                Instruction::EntryPoint(e) => {
                    ast.entry_points.push(EntryPointInfo {
                        execution: e.execution,
                        name: e.name,
                    });
                }
                Instruction::TypeVoid(t) => {
                    ast.types.insert(t.result_id, TypeDesc::Void);
                }
                Instruction::TypeBool(t) => {
                    ast.types
                        .insert(t.result_id, TypeDesc::Primitive(PrimitiveType::Bool));
                }
                Instruction::TypeInt(t) => {
                    let prim = match (t.width, t.signedness) {
                        (_, true) => PrimitiveType::Int,
                        (_, false) => PrimitiveType::UnsignedInt,
                    };
                    ast.types.insert(t.result_id, TypeDesc::Primitive(prim));
                }
                Instruction::TypeFloat(t) => {
                    let prim = match t.width {
                        16 => PrimitiveType::Half,
                        64 => PrimitiveType::Double,
                        _ => PrimitiveType::Float,
                    };
                    ast.types.insert(t.result_id, TypeDesc::Primitive(prim));
                }
                Instruction::TypeVector(t) => {
                    let desc = match ast.types.get(&t.component_id) {
                        Some(TypeDesc::Primitive(p)) => TypeDesc::Vector(*p, t.count as u8),
                        _ => TypeDesc::Unknown,
                    };
                    ast.types.insert(t.result_id, desc);
                }
                Instruction::TypeMatrix(t) => {
                    let desc = match ast.types.get(&t.column_type_id) {
                        Some(TypeDesc::Vector(p, rows)) => {
                            TypeDesc::Matrix(*p, *rows, t.column_count as u8)
                        }
                        _ => TypeDesc::Unknown,
                    };
                    ast.types.insert(t.result_id, desc);
                }
                Instruction::TypeImage(t) => {
                    let data_type = match ast.types.get(&t.sampled_type_id) {
                        Some(TypeDesc::Primitive(PrimitiveType::Int)) => ImageDataType::Integer,
                        Some(TypeDesc::Primitive(PrimitiveType::UnsignedInt)) => {
                            ImageDataType::UnsignedInteger
                        }
                        _ => ImageDataType::Float,
                    };
                    ast.types.insert(
                        t.result_id,
                        TypeDesc::Image {
                            data_type,
                            dim: t.dim,
                            arrayed: t.arrayed,
                            multisampled: t.ms,
                            sampled: t.sampled,
                            format: t.format,
                        },
                    );
                }
                Instruction::TypeSampler(t) => {
                    ast.types.insert(t.result_id, TypeDesc::Sampler);
                }
                Instruction::TypeSampledImage(t) => {
                    let image = ast
                        .types
                        .get(&t.image_type_id)
                        .cloned()
                        .unwrap_or(TypeDesc::Unknown);
                    ast.types
                        .insert(t.result_id, TypeDesc::SampledImage(Box::new(image)));
                }
                Instruction::TypeArray(t) => {
                    let elem = ast
                        .types
                        .get(&t.type_id)
                        .cloned()
                        .unwrap_or(TypeDesc::Unknown);
                    let len = ast.constants.get(&t.length_id).copied();
                    ast.types
                        .insert(t.result_id, TypeDesc::Array(Box::new(elem), len));
                }
                Instruction::TypeRuntimeArray(t) => {
                    let elem = ast
                        .types
                        .get(&t.type_id)
                        .cloned()
                        .unwrap_or(TypeDesc::Unknown);
                    ast.types
                        .insert(t.result_id, TypeDesc::Array(Box::new(elem), None));
                }
                Instruction::TypeStruct(t) => {
                    let members = t
                        .member_types
                        .iter()
                        .enumerate()
                        .map(|(index, tyid)| StructMember {
                            offset: ast
                                .member_decoration(t.result_id, index as u32, Decoration::Offset)
                                .and_then(|p| p.first().copied()),
                            ty: ast.types.get(tyid).cloned().unwrap_or(TypeDesc::Unknown),
                        })
                        .collect();
                    ast.types.insert(t.result_id, TypeDesc::Struct(members));
                }
                Instruction::TypePointer(t) => {
                    let pointee = ast
                        .types
                        .get(&t.type_id)
                        .cloned()
                        .unwrap_or(TypeDesc::Unknown);
                    ast.pointees.insert(t.result_id, t.type_id);
                    ast.types.insert(
                        t.result_id,
                        TypeDesc::Pointer {
                            storage_class: t.storage_class,
                            pointee: Box::new(pointee),
                        },
                    );
                }
                Instruction::Constant(c) => {
                    if let Some(&word) = c.data.first() {
                        ast.constants.insert(c.result_id, word);
                    }
                }
                Instruction::ConstantTrue(c) => {
                    ast.constants.insert(c.result_id, 1);
                }
                Instruction::ConstantFalse(c) => {
                    ast.constants.insert(c.result_id, 0);
                }
                Instruction::SpecConstant(c) => {
                    raw_spec_constants.push((
                        c.result_id,
                        c.result_type_id,
                        c.data.first().copied().unwrap_or(0),
                    ));
                }
                Instruction::SpecConstantTrue(c) => {
                    raw_spec_constants.push((c.result_id, c.result_type_id, 1));
                }
                Instruction::SpecConstantFalse(c) => {
                    raw_spec_constants.push((c.result_id, c.result_type_id, 0));
                }
                Instruction::Variable(v) => {
                    raw_variables.push(v);
                }
                _ => {}
            }
        }

        for v in raw_variables {
            let ty = ast
                .types
                .get(&v.result_type_id)
                .cloned()
                .unwrap_or(TypeDesc::Unknown);
            ast.variables.push(VariableInfo {
                id: v.result_id,
                name: ast.names.get(&v.result_id).cloned(),
                storage_class: v.storage_class,
                ty,
                type_id: v.result_type_id,
            });
        }

        for (id, type_id, word) in raw_spec_constants {
            // only declarations carrying a SpecId are application-visible
            let spec_id = match ast.decoration(id, Decoration::SpecId) {
                Some(params) => match params.first() {
                    Some(&sid) => sid,
                    None => continue,
                },
                None => continue,
            };
            let default = match ast.types.get(&type_id) {
                Some(TypeDesc::Primitive(PrimitiveType::Bool)) => {
                    SpecConstantDefault::Bool(word != 0)
                }
                Some(TypeDesc::Primitive(PrimitiveType::Float)) => {
                    SpecConstantDefault::Float(f32::from_bits(word))
                }
                _ => SpecConstantDefault::Int(word as i32),
            };
            ast.spec_constants.push(SpecConstantInfo {
                spec_id,
                name: ast.names.get(&id).cloned(),
                default,
            });
        }

        ast
    }

    pub fn name(&self, id: u32) -> Option<&str> {
        self.names.get(&id).map(String::as_str)
    }

    pub fn decoration(&self, id: u32, deco: Decoration) -> Option<&[u32]> {
        self.decorations
            .get(&id)?
            .iter()
            .find(|(d, _)| *d == deco)
            .map(|(_, params)| params.as_slice())
    }

    pub fn has_decoration(&self, id: u32, deco: Decoration) -> bool {
        self.decoration(id, deco).is_some()
    }

    fn member_decoration(&self, id: u32, member: u32, deco: Decoration) -> Option<&[u32]> {
        self.member_decorations
            .get(&(id, member))?
            .iter()
            .find(|(d, _)| *d == deco)
            .map(|(_, params)| params.as_slice())
    }

    /// The name of a struct member, from `OpMemberName`.
    pub fn member_name(&self, id: u32, member: u32) -> Option<&str> {
        self.member_names.get(&(id, member)).map(String::as_str)
    }

    pub fn variables(&self) -> &[VariableInfo] {
        &self.variables
    }

    pub fn entry_points(&self) -> &[EntryPointInfo] {
        &self.entry_points
    }

    pub fn spec_constants(&self) -> &[SpecConstantInfo] {
        &self.spec_constants
    }

    /// Resolves a pointer type id down to the ultimate pointee type id.
    pub fn pointee_type_id(&self, mut type_id: u32) -> u32 {
        while let Some(&inner) = self.pointees.get(&type_id) {
            type_id = inner;
        }
        type_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SPIRV_MAGIC;

    fn inst(opcode: u16, operands: &[u32]) -> Vec<u32> {
        let mut words = vec![((operands.len() as u32 + 1) << 16) | opcode as u32];
        words.extend_from_slice(operands);
        words
    }

    /// `in vec3 pos;` declared by hand: name, location decoration, float,
    /// vec3, input pointer, variable.
    fn input_variable_module() -> Module {
        let mut words = vec![SPIRV_MAGIC, 0x0001_0300, 0, 10, 0];
        words.extend(inst(5, &[4, u32::from_le_bytes(*b"pos\0")])); // OpName
        words.extend(inst(71, &[4, 30, 0])); // OpDecorate Location 0
        words.extend(inst(22, &[1, 32])); // OpTypeFloat
        words.extend(inst(23, &[2, 1, 3])); // OpTypeVector
        words.extend(inst(32, &[3, 1, 2])); // OpTypePointer Input
        words.extend(inst(59, &[3, 4, 1])); // OpVariable Input
        Module::from_words(&words).unwrap()
    }

    #[test]
    fn reconstructs_variables_with_names_and_types() {
        let module = input_variable_module();
        let ast = ModuleAst::build(&module);

        assert_eq!(ast.variables().len(), 1);
        let var = &ast.variables()[0];
        assert_eq!(var.name.as_deref(), Some("pos"));
        assert_eq!(var.storage_class, StorageClass::Input);
        assert_eq!(
            *var.ty.deref(),
            TypeDesc::Vector(PrimitiveType::Float, 3)
        );
        assert_eq!(ast.decoration(var.id, Decoration::Location), Some(&[0][..]));
        assert_eq!(ast.pointee_type_id(var.type_id), 2);
    }

    #[test]
    fn identical_modules_build_identical_asts() {
        let a = ModuleAst::build(&input_variable_module());
        let b = ModuleAst::build(&input_variable_module());
        assert_eq!(a.variables().len(), b.variables().len());
        assert_eq!(
            format!("{:?}", a.variables()),
            format!("{:?}", b.variables())
        );
    }
}
