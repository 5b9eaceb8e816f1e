use pretty_assertions::assert_eq;
use stria_ir::{
    Access, AddressSpace, Builder, Handle, MemberDesc, Module, Scalar, StructFlags, Type, Value,
    VectorSize, dump_module,
};
use stria_opt::{Capabilities, OptError, Pass, Std140, std140, validate};

/// `struct MyStruct { <members> }` bound as `@group(0) @binding(0)`.
fn uniform_buffer(module: &mut Module, members: Vec<MemberDesc>) -> (Handle<Type>, Handle<Value>) {
    let mut b = Builder::new(module);
    let s = b
        .types()
        .structure_with_attributes("MyStruct", members, StructFlags::BLOCK);
    let ptr = b.types().ptr(AddressSpace::Uniform, s, Access::Read);
    let root = b.module().root_block();
    let buffer = b.append(root, |b| b.binding_var("buffer", ptr, 0, 0));
    (s, buffer)
}

#[test]
fn load_matrix_member() {
    let mut module = Module::new();
    let mut b = Builder::new(&mut module);
    let mat = b.types().mat(VectorSize::Tri, VectorSize::Bi, Scalar::F32);
    let (_, buffer) = uniform_buffer(&mut module, vec![MemberDesc::new("m", mat)]);

    let mut b = Builder::new(&mut module);
    let mat_ptr = b.types().ptr(AddressSpace::Uniform, mat, Access::Read);
    let f = b.function("foo", mat);
    let body = b.module().function(f).block();
    b.append(body, |b| {
        let zero = b.u32(0);
        let p = b.access(mat_ptr, buffer, &[zero]);
        let m = b.load(p);
        b.return_value(f, m);
    });

    std140(&mut module).unwrap();
    let expected = "\
MyStruct = struct @align(8), @block {
  m:mat3x2<f32> @offset(0)
}

MyStruct_std140 = struct @align(8), @block {
  m_col0:vec2<f32> @offset(0)
  m_col1:vec2<f32> @offset(8)
  m_col2:vec2<f32> @offset(16)
}

$B1: {  # root
  %buffer:ptr<uniform, MyStruct_std140, read> = var @binding_point(0, 0)
}

%foo = func():mat3x2<f32> {
  $B2: {
    %3:ptr<uniform, vec2<f32>, read> = access %buffer, 0u
    %4:vec2<f32> = load %3
    %5:ptr<uniform, vec2<f32>, read> = access %buffer, 1u
    %6:vec2<f32> = load %5
    %7:ptr<uniform, vec2<f32>, read> = access %buffer, 2u
    %8:vec2<f32> = load %7
    %9:mat3x2<f32> = construct %4, %6, %8
    ret %9
  }
}
";
    assert_eq!(dump_module(&module), expected);
    assert_eq!(validate(&module, Capabilities::new()), Ok(()));
}

#[test]
fn load_whole_struct_goes_through_a_helper() {
    let mut module = Module::new();
    let mut b = Builder::new(&mut module);
    let mat = b.types().mat(VectorSize::Tri, VectorSize::Bi, Scalar::F32);
    let (s, buffer) = uniform_buffer(&mut module, vec![MemberDesc::new("m", mat)]);

    let mut b = Builder::new(&mut module);
    let f = b.function("foo", s);
    let body = b.module().function(f).block();
    b.append(body, |b| {
        let v = b.load(buffer);
        b.return_value(f, v);
    });

    std140(&mut module).unwrap();
    let expected = "\
MyStruct = struct @align(8), @block {
  m:mat3x2<f32> @offset(0)
}

MyStruct_std140 = struct @align(8), @block {
  m_col0:vec2<f32> @offset(0)
  m_col1:vec2<f32> @offset(8)
  m_col2:vec2<f32> @offset(16)
}

$B1: {  # root
  %buffer:ptr<uniform, MyStruct_std140, read> = var @binding_point(0, 0)
}

%foo = func():MyStruct {
  $B2: {
    %3:MyStruct_std140 = load %buffer
    %4:MyStruct = call %convert_MyStruct, %3
    ret %4
  }
}

%convert_MyStruct = func(%input:MyStruct_std140):MyStruct {
  $B3: {
    %7:vec2<f32> = access %input, 0u
    %8:vec2<f32> = access %input, 1u
    %9:vec2<f32> = access %input, 2u
    %10:mat3x2<f32> = construct %7, %8, %9
    %11:MyStruct = construct %10
    ret %11
  }
}
";
    assert_eq!(dump_module(&module), expected);
    assert_eq!(validate(&module, Capabilities::new()), Ok(()));
}

#[test]
fn let_of_the_buffer_pointer_is_folded() {
    let mut module = Module::new();
    let mut b = Builder::new(&mut module);
    let f32 = b.types().f32();
    let mat = b.types().mat(VectorSize::Bi, VectorSize::Bi, Scalar::F32);
    let (_, buffer) = uniform_buffer(
        &mut module,
        vec![MemberDesc::new("m", mat), MemberDesc::new("x", f32)],
    );

    let mut b = Builder::new(&mut module);
    let f32_ptr = b.types().ptr(AddressSpace::Uniform, f32, Access::Read);
    let f = b.function("foo", f32);
    let body = b.module().function(f).block();
    b.append(body, |b| {
        let alias = b.let_("alias", buffer);
        let one = b.u32(1);
        let p = b.access(f32_ptr, alias, &[one]);
        let x = b.load(p);
        b.return_value(f, x);
    });

    std140(&mut module).unwrap();
    let text = dump_module(&module);
    assert!(!text.contains("let"), "{text}");
    assert!(
        text.contains("%3:ptr<uniform, f32, read> = access %buffer, 2u\n"),
        "{text}"
    );
    assert_eq!(validate(&module, Capabilities::new()), Ok(()));
}

#[test]
fn modules_without_narrow_matrices_are_unchanged() {
    let mut module = Module::new();
    let mut b = Builder::new(&mut module);
    let mat = b.types().mat(VectorSize::Quad, VectorSize::Quad, Scalar::F32);
    let narrow = b.types().mat(VectorSize::Bi, VectorSize::Bi, Scalar::F32);
    let narrow_array = b.types().array(narrow, 2);
    uniform_buffer(
        &mut module,
        vec![MemberDesc::new("m", mat), MemberDesc::new("a", narrow_array)],
    );

    let before = dump_module(&module);
    assert!(!Std140.run(&mut module).unwrap());
    assert_eq!(dump_module(&module), before);
}

#[test]
fn invalid_input_is_rejected() {
    let mut module = Module::new();
    let mut b = Builder::new(&mut module);
    let void = b.types().void();
    b.function("no_terminator", void);

    let err = std140(&mut module).unwrap_err();
    assert!(matches!(err, OptError::Validation(_)), "{err}");
}

#[test]
fn f16_matrix_columns_are_split() {
    let mut module = Module::new();
    let mut b = Builder::new(&mut module);
    let mat = b.types().mat(VectorSize::Quad, VectorSize::Tri, Scalar::F16);
    let (_, buffer) = uniform_buffer(&mut module, vec![MemberDesc::new("m", mat)]);

    let mut b = Builder::new(&mut module);
    let mat_ptr = b.types().ptr(AddressSpace::Uniform, mat, Access::Read);
    let f = b.function("foo", mat);
    let body = b.module().function(f).block();
    b.append(body, |b| {
        let zero = b.u32(0);
        let p = b.access(mat_ptr, buffer, &[zero]);
        let m = b.load(p);
        b.return_value(f, m);
    });

    assert!(Std140.run(&mut module).unwrap());
    let text = dump_module(&module);
    for (i, offset) in [0, 8, 16, 24].into_iter().enumerate() {
        let member = format!("  m_col{i}:vec3<f16> @offset({offset})\n");
        assert!(text.contains(&member), "{text}");
    }
    assert!(text.contains(":mat4x3<f16> = construct"), "{text}");
    assert_eq!(validate(&module, Capabilities::new()), Ok(()));
}

#[test]
fn dynamic_array_index_is_kept_in_the_access() {
    let mut module = Module::new();
    let mut b = Builder::new(&mut module);
    let mat = b.types().mat(VectorSize::Tri, VectorSize::Bi, Scalar::F32);
    let inner = b.types().structure("Inner", [("m", mat)]);
    let inners = b.types().array(inner, 4);
    let (_, buffer) = uniform_buffer(&mut module, vec![MemberDesc::new("a", inners)]);

    let mut b = Builder::new(&mut module);
    let u32 = b.types().u32();
    let mat_ptr = b.types().ptr(AddressSpace::Uniform, mat, Access::Read);
    let f = b.function("foo", mat);
    let i = b.param(f, "i", u32);
    let body = b.module().function(f).block();
    b.append(body, |b| {
        let zero = b.u32(0);
        let p = b.access(mat_ptr, buffer, &[zero, i, zero]);
        let m = b.load(p);
        b.return_value(f, m);
    });

    std140(&mut module).unwrap();
    let text = dump_module(&module);
    assert!(text.contains("Inner_std140 = struct"), "{text}");
    assert!(text.contains("a:array<Inner_std140, 4> @offset(0)"), "{text}");
    assert!(
        text.contains(":ptr<uniform, Inner_std140, read> = access %buffer, 0u, %i\n"),
        "{text}"
    );
    assert_eq!(occurrences(&text, "= load "), 3, "{text}");
    assert_eq!(validate(&module, Capabilities::new()), Ok(()));
}

#[test]
fn chain_of_access_instructions() {
    let mut module = Module::new();
    let mut b = Builder::new(&mut module);
    let f32 = b.types().f32();
    let mat = b.types().mat(VectorSize::Tri, VectorSize::Bi, Scalar::F32);
    let inner = b.types().structure("Inner", [("scale", f32), ("m", mat)]);
    let (_, buffer) = uniform_buffer(&mut module, vec![MemberDesc::new("inner", inner)]);

    let mut b = Builder::new(&mut module);
    let inner_ptr = b.types().ptr(AddressSpace::Uniform, inner, Access::Read);
    let mat_ptr = b.types().ptr(AddressSpace::Uniform, mat, Access::Read);
    let f = b.function("foo", mat);
    let body = b.module().function(f).block();
    b.append(body, |b| {
        let zero = b.u32(0);
        let one = b.u32(1);
        let a = b.access(inner_ptr, buffer, &[zero]);
        let m = b.access(mat_ptr, a, &[one]);
        let m = b.load(m);
        b.return_value(f, m);
    });

    std140(&mut module).unwrap();
    let text = dump_module(&module);
    assert!(
        text.contains(":ptr<uniform, Inner_std140, read> = access %buffer, 0u\n"),
        "{text}"
    );
    for column in ["1u", "2u", "3u"] {
        assert!(text.contains(&format!(":ptr<uniform, vec2<f32>, read> = access %3, {column}\n")), "{text}");
    }
    assert!(!text.contains("ptr<uniform, mat3x2<f32>, read>"), "{text}");
    assert_eq!(validate(&module, Capabilities::new()), Ok(()));
}

fn occurrences(text: &str, needle: &str) -> usize {
    text.matches(needle).count()
}
