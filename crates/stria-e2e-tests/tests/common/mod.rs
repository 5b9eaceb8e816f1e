use stria_ir::{
    Access, AddressSpace, Builder, BuiltinValue, Handle, IoAttributes, MemberDesc, Module,
    PipelineStage, Scalar, StructFlags, Value, VectorSize,
};
use stria_opt::{Capabilities, Capability};

/// Capabilities the fixtures are validated with.
#[allow(dead_code)]
pub fn capabilities() -> Capabilities {
    Capabilities::from_iter([
        Capability::AllowMultipleEntryPoints,
        Capability::AllowOverrides,
    ])
}

/// The uniform buffer declared by [`lighting_shader`].
#[allow(dead_code)]
pub struct Lighting {
    pub buffer: Handle<Value>,
}

/// A fragment shader reading a uniform buffer shaped like
///
/// ```text
/// struct Inner { m: mat3x2<f32>, scale: f32 }
/// struct Outer { inners: array<Inner, 4>, t: mat4x2<f32> }
/// @group(0) @binding(0) var<uniform> lights: Outer;
/// ```
///
/// It loads the whole array, one scalar through a nested access and one
/// column of `t`.
#[allow(dead_code)]
pub fn lighting_shader(module: &mut Module) -> Lighting {
    let mut b = Builder::new(module);
    let f32 = b.types().f32();
    let vec2 = b.types().vec2(Scalar::F32);
    let vec4 = b.types().vec4(Scalar::F32);
    let m3x2 = b.types().mat(VectorSize::Tri, VectorSize::Bi, Scalar::F32);
    let m4x2 = b.types().mat(VectorSize::Quad, VectorSize::Bi, Scalar::F32);
    let inner = b.types().structure("Inner", [("m", m3x2), ("scale", f32)]);
    let inners = b.types().array(inner, 4);
    let outer = b.types().structure_with_attributes(
        "Outer",
        vec![MemberDesc::new("inners", inners), MemberDesc::new("t", m4x2)],
        StructFlags::BLOCK,
    );
    let outer_ptr = b.types().ptr(AddressSpace::Uniform, outer, Access::Read);
    let inners_ptr = b.types().ptr(AddressSpace::Uniform, inners, Access::Read);
    let f32_ptr = b.types().ptr(AddressSpace::Uniform, f32, Access::Read);
    let vec2_ptr = b.types().ptr(AddressSpace::Uniform, vec2, Access::Read);

    let root = b.module().root_block();
    let buffer = b.append(root, |b| b.binding_var("lights", outer_ptr, 0, 0));

    let main = b.entry_point("main", PipelineStage::Fragment, vec4);
    b.module_mut().function_mut(main).return_attributes = IoAttributes::location(0);
    let pos = b.io_param(main, "pos", vec4, IoAttributes::builtin(BuiltinValue::Position));
    let body = b.module().function(main).block();
    b.append(body, |b| {
        let zero = b.u32(0);
        let one = b.u32(1);
        let two = b.u32(2);
        let three = b.u32(3);

        let all = b.access(inners_ptr, buffer, &[zero]);
        let all = b.load(all);
        b.let_("all", all);

        let scale = b.access(f32_ptr, buffer, &[zero, two, one]);
        let scale = b.load(scale);

        let column = b.access(vec2_ptr, buffer, &[one, three]);
        let column = b.load(column);
        let x = b.swizzle(f32, column, &[0]);

        let depth = b.swizzle(f32, pos, &[2]);
        let color = b.construct(vec4, &[x, scale, depth, scale]);
        b.return_value(main, color);
    });

    Lighting { buffer }
}

/// A compute entry point that loads the whole buffer of [`lighting_shader`]
/// twice.
#[allow(dead_code)]
pub fn add_double_load(module: &mut Module, lighting: &Lighting) {
    let mut b = Builder::new(module);
    let f = b.compute_entry_point("copy", [64, 1, 1]);
    let body = b.module().function(f).block();
    let buffer = lighting.buffer;
    b.append(body, |b| {
        let first = b.load(buffer);
        b.let_("first", first);
        let second = b.load(buffer);
        b.let_("second", second);
        b.return_(f);
    });
}

/// Number of times `needle` occurs in `haystack`.
#[allow(dead_code)]
pub fn occurrences(haystack: &str, needle: &str) -> usize {
    haystack.matches(needle).count()
}
