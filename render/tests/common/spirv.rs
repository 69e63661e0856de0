//! Hand-assembled SPIR-V modules for reflection tests.
//!
//! Only the instruction subset reflection looks at is emitted: debug names,
//! annotations, types, constants, and module-scope variables, in the order
//! the SPIR-V spec mandates.

#![allow(dead_code)]

const OP_NAME: u16 = 5;
const OP_MEMBER_NAME: u16 = 6;
const OP_TYPE_VOID: u16 = 19;
const OP_TYPE_BOOL: u16 = 20;
const OP_TYPE_INT: u16 = 21;
const OP_TYPE_FLOAT: u16 = 22;
const OP_TYPE_VECTOR: u16 = 23;
const OP_TYPE_MATRIX: u16 = 24;
const OP_TYPE_IMAGE: u16 = 25;
const OP_TYPE_SAMPLER: u16 = 26;
const OP_TYPE_SAMPLED_IMAGE: u16 = 27;
const OP_TYPE_ARRAY: u16 = 28;
const OP_TYPE_STRUCT: u16 = 30;
const OP_TYPE_POINTER: u16 = 32;
const OP_CONSTANT: u16 = 43;
const OP_SPEC_CONSTANT_TRUE: u16 = 48;
const OP_SPEC_CONSTANT: u16 = 50;
const OP_VARIABLE: u16 = 59;
const OP_DECORATE: u16 = 71;
const OP_MEMBER_DECORATE: u16 = 72;

pub const SC_UNIFORM_CONSTANT: u32 = 0;
pub const SC_INPUT: u32 = 1;
pub const SC_UNIFORM: u32 = 2;
pub const SC_OUTPUT: u32 = 3;
pub const SC_PUSH_CONSTANT: u32 = 9;
pub const SC_STORAGE_BUFFER: u32 = 12;

pub const DECO_SPEC_ID: u32 = 1;
pub const DECO_BLOCK: u32 = 2;
pub const DECO_BUFFER_BLOCK: u32 = 3;
pub const DECO_BUILT_IN: u32 = 11;
pub const DECO_NON_WRITABLE: u32 = 24;
pub const DECO_LOCATION: u32 = 30;
pub const DECO_BINDING: u32 = 33;
pub const DECO_DESCRIPTOR_SET: u32 = 34;
pub const DECO_OFFSET: u32 = 35;

pub const DIM_2D: u32 = 1;
pub const DIM_BUFFER: u32 = 5;
pub const DIM_SUBPASS_DATA: u32 = 6;

fn pack_string(s: &str) -> Vec<u32> {
    let mut bytes: Vec<u8> = s.as_bytes().to_vec();
    bytes.push(0);
    while bytes.len() % 4 != 0 {
        bytes.push(0);
    }
    bytes
        .chunks(4)
        .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

/// Assembles the three module sections in spec order and tracks ids.
pub struct ModuleBuilder {
    debug: Vec<u32>,
    annotations: Vec<u32>,
    types: Vec<u32>,
    next_id: u32,
}

impl ModuleBuilder {
    pub fn new() -> ModuleBuilder {
        ModuleBuilder {
            debug: Vec::new(),
            annotations: Vec::new(),
            types: Vec::new(),
            next_id: 1,
        }
    }

    pub fn id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn inst(section: &mut Vec<u32>, opcode: u16, operands: &[u32]) {
        section.push(((operands.len() as u32 + 1) << 16) | opcode as u32);
        section.extend_from_slice(operands);
    }

    pub fn name(&mut self, id: u32, name: &str) {
        let mut ops = vec![id];
        ops.extend(pack_string(name));
        Self::inst(&mut self.debug, OP_NAME, &ops);
    }

    pub fn member_name(&mut self, id: u32, member: u32, name: &str) {
        let mut ops = vec![id, member];
        ops.extend(pack_string(name));
        Self::inst(&mut self.debug, OP_MEMBER_NAME, &ops);
    }

    pub fn decorate(&mut self, id: u32, decoration: u32, params: &[u32]) {
        let mut ops = vec![id, decoration];
        ops.extend_from_slice(params);
        Self::inst(&mut self.annotations, OP_DECORATE, &ops);
    }

    pub fn member_decorate(&mut self, id: u32, member: u32, decoration: u32, params: &[u32]) {
        let mut ops = vec![id, member, decoration];
        ops.extend_from_slice(params);
        Self::inst(&mut self.annotations, OP_MEMBER_DECORATE, &ops);
    }

    pub fn type_void(&mut self) -> u32 {
        let id = self.id();
        Self::inst(&mut self.types, OP_TYPE_VOID, &[id]);
        id
    }

    pub fn type_bool(&mut self) -> u32 {
        let id = self.id();
        Self::inst(&mut self.types, OP_TYPE_BOOL, &[id]);
        id
    }

    pub fn type_float(&mut self) -> u32 {
        let id = self.id();
        Self::inst(&mut self.types, OP_TYPE_FLOAT, &[id, 32]);
        id
    }

    pub fn type_int(&mut self, signed: bool) -> u32 {
        let id = self.id();
        Self::inst(&mut self.types, OP_TYPE_INT, &[id, 32, signed as u32]);
        id
    }

    pub fn type_vector(&mut self, component: u32, count: u32) -> u32 {
        let id = self.id();
        Self::inst(&mut self.types, OP_TYPE_VECTOR, &[id, component, count]);
        id
    }

    pub fn type_matrix(&mut self, column: u32, columns: u32) -> u32 {
        let id = self.id();
        Self::inst(&mut self.types, OP_TYPE_MATRIX, &[id, column, columns]);
        id
    }

    pub fn type_image(&mut self, sampled_type: u32, dim: u32, sampled: u32) -> u32 {
        let id = self.id();
        // depth=0, arrayed=0, ms=0, format=Unknown
        Self::inst(
            &mut self.types,
            OP_TYPE_IMAGE,
            &[id, sampled_type, dim, 0, 0, 0, sampled, 0],
        );
        id
    }

    pub fn type_sampler(&mut self) -> u32 {
        let id = self.id();
        Self::inst(&mut self.types, OP_TYPE_SAMPLER, &[id]);
        id
    }

    pub fn type_sampled_image(&mut self, image: u32) -> u32 {
        let id = self.id();
        Self::inst(&mut self.types, OP_TYPE_SAMPLED_IMAGE, &[id, image]);
        id
    }

    pub fn type_array(&mut self, element: u32, length_constant: u32) -> u32 {
        let id = self.id();
        Self::inst(&mut self.types, OP_TYPE_ARRAY, &[id, element, length_constant]);
        id
    }

    pub fn type_struct(&mut self, members: &[u32]) -> u32 {
        let id = self.id();
        let mut ops = vec![id];
        ops.extend_from_slice(members);
        Self::inst(&mut self.types, OP_TYPE_STRUCT, &ops);
        id
    }

    pub fn type_pointer(&mut self, storage_class: u32, pointee: u32) -> u32 {
        let id = self.id();
        Self::inst(&mut self.types, OP_TYPE_POINTER, &[id, storage_class, pointee]);
        id
    }

    pub fn constant_u32(&mut self, ty: u32, value: u32) -> u32 {
        let id = self.id();
        Self::inst(&mut self.types, OP_CONSTANT, &[ty, id, value]);
        id
    }

    pub fn spec_constant(&mut self, ty: u32, default: u32, spec_id: u32, name: &str) -> u32 {
        let id = self.id();
        self.decorate(id, DECO_SPEC_ID, &[spec_id]);
        self.name(id, name);
        Self::inst(&mut self.types, OP_SPEC_CONSTANT, &[ty, id, default]);
        id
    }

    pub fn spec_constant_bool(&mut self, ty: u32, spec_id: u32, name: &str) -> u32 {
        let id = self.id();
        self.decorate(id, DECO_SPEC_ID, &[spec_id]);
        self.name(id, name);
        Self::inst(&mut self.types, OP_SPEC_CONSTANT_TRUE, &[ty, id]);
        id
    }

    pub fn variable(&mut self, pointer_type: u32, storage_class: u32) -> u32 {
        let id = self.id();
        Self::inst(&mut self.types, OP_VARIABLE, &[pointer_type, id, storage_class]);
        id
    }

    pub fn build(self) -> Vec<u8> {
        let mut words = vec![
            0x0723_0203, // magic
            0x0001_0300, // version 1.3
            0,           // generator
            self.next_id,
            0, // schema
        ];
        words.extend(self.debug);
        words.extend(self.annotations);
        words.extend(self.types);
        words.iter().flat_map(|w| w.to_le_bytes()).collect()
    }
}

// ---- prebuilt shader bundles ------------------------------------------------

/// A vertex stage with one `vec3 position` input at location 0 and a
/// `gl_Position`-style builtin that reflection must skip.
pub fn vertex_position_only() -> Vec<u8> {
    let mut b = ModuleBuilder::new();
    let float = b.type_float();
    let vec3 = b.type_vector(float, 3);
    let vec4 = b.type_vector(float, 4);
    let in_ptr = b.type_pointer(SC_INPUT, vec3);
    let out_ptr = b.type_pointer(SC_OUTPUT, vec4);

    let position = b.variable(in_ptr, SC_INPUT);
    b.name(position, "position");
    b.decorate(position, DECO_LOCATION, &[0]);

    let gl_position = b.variable(out_ptr, SC_OUTPUT);
    b.name(gl_position, "gl_Position");
    b.decorate(gl_position, DECO_BUILT_IN, &[0]);

    b.build()
}

/// A vertex stage with `vec3 position` @0 and `vec2 uv` @1.
pub fn vertex_position_uv() -> Vec<u8> {
    let mut b = ModuleBuilder::new();
    let float = b.type_float();
    let vec3 = b.type_vector(float, 3);
    let vec2 = b.type_vector(float, 2);
    let pos_ptr = b.type_pointer(SC_INPUT, vec3);
    let uv_ptr = b.type_pointer(SC_INPUT, vec2);

    // declared out of location order on purpose
    let uv = b.variable(uv_ptr, SC_INPUT);
    b.name(uv, "uv");
    b.decorate(uv, DECO_LOCATION, &[1]);

    let position = b.variable(pos_ptr, SC_INPUT);
    b.name(position, "position");
    b.decorate(position, DECO_LOCATION, &[0]);

    b.build()
}

/// A fragment stage with a single color output and no descriptors.
pub fn fragment_constant_color() -> Vec<u8> {
    let mut b = ModuleBuilder::new();
    let float = b.type_float();
    let vec4 = b.type_vector(float, 4);
    let out_ptr = b.type_pointer(SC_OUTPUT, vec4);
    let color = b.variable(out_ptr, SC_OUTPUT);
    b.name(color, "out_color");
    b.decorate(color, DECO_LOCATION, &[0]);
    b.build()
}

/// A fragment stage sampling combined image samplers, one per entry in
/// `bindings` (set, binding, name).
pub fn fragment_sampling(bindings: &[(u32, u32, &str)]) -> Vec<u8> {
    let mut b = ModuleBuilder::new();
    let float = b.type_float();
    let image = b.type_image(float, DIM_2D, 1);
    let sampled = b.type_sampled_image(image);
    let ptr = b.type_pointer(SC_UNIFORM_CONSTANT, sampled);
    for &(set, binding, name) in bindings {
        let var = b.variable(ptr, SC_UNIFORM_CONSTANT);
        b.name(var, name);
        b.decorate(var, DECO_DESCRIPTOR_SET, &[set]);
        b.decorate(var, DECO_BINDING, &[binding]);
    }
    b.build()
}

/// A stage with one uniform block `{ mat4; vec4 }` at (set, binding).
pub fn stage_with_uniform_block(
    storage_class: u32,
    set: u32,
    binding: u32,
    block_name: &str,
) -> Vec<u8> {
    let mut b = ModuleBuilder::new();
    let float = b.type_float();
    let vec4 = b.type_vector(float, 4);
    let mat4 = b.type_matrix(vec4, 4);
    let block = b.type_struct(&[mat4, vec4]);
    b.name(block, block_name);
    b.member_name(block, 0, "mvp");
    b.member_name(block, 1, "tint");
    b.decorate(block, DECO_BLOCK, &[]);
    b.member_decorate(block, 0, DECO_OFFSET, &[0]);
    b.member_decorate(block, 1, DECO_OFFSET, &[64]);
    let ptr = b.type_pointer(storage_class, block);
    let var = b.variable(ptr, storage_class);
    b.decorate(var, DECO_DESCRIPTOR_SET, &[set]);
    b.decorate(var, DECO_BINDING, &[binding]);
    b.build()
}

/// A stage with one push-constant block of a single vec4.
pub fn stage_with_push_constants(block_name: &str) -> Vec<u8> {
    let mut b = ModuleBuilder::new();
    let float = b.type_float();
    let vec4 = b.type_vector(float, 4);
    let block = b.type_struct(&[vec4]);
    b.name(block, block_name);
    b.decorate(block, DECO_BLOCK, &[]);
    b.member_decorate(block, 0, DECO_OFFSET, &[0]);
    let ptr = b.type_pointer(SC_PUSH_CONSTANT, block);
    b.variable(ptr, SC_PUSH_CONSTANT);
    b.build()
}

/// A compute-style stage with a writable storage buffer at (set, binding).
pub fn stage_with_storage_buffer(set: u32, binding: u32, name: &str) -> Vec<u8> {
    let mut b = ModuleBuilder::new();
    let float = b.type_float();
    let vec4 = b.type_vector(float, 4);
    let block = b.type_struct(&[vec4]);
    b.name(block, name);
    b.decorate(block, DECO_BLOCK, &[]);
    b.member_decorate(block, 0, DECO_OFFSET, &[0]);
    let ptr = b.type_pointer(SC_STORAGE_BUFFER, block);
    let var = b.variable(ptr, SC_STORAGE_BUFFER);
    b.decorate(var, DECO_DESCRIPTOR_SET, &[set]);
    b.decorate(var, DECO_BINDING, &[binding]);
    b.build()
}

/// A stage carrying one integer specialization constant.
pub fn stage_with_spec_constant(spec_id: u32, default: u32, name: &str) -> Vec<u8> {
    let mut b = ModuleBuilder::new();
    let int = b.type_int(true);
    b.spec_constant(int, default, spec_id, name);
    b.build()
}
