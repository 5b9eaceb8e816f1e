use pretty_assertions::assert_eq;
use stria_ir::{
    Access, AddressSpace, Builder, BuiltinValue, IoAttributes, Module, PipelineStage, Scalar,
    VectorSize,
};
use stria_opt::{Capabilities, Capability, Severity, validate};

fn reason(module: &Module, capabilities: Capabilities) -> String {
    match validate(module, capabilities) {
        Ok(()) => String::new(),
        Err(failure) => failure.reason(),
    }
}

#[test]
fn out_of_bounds_access_renders_the_disassembly() {
    let mut module = Module::new();
    let mut b = Builder::new(&mut module);
    let f32 = b.types().f32();
    let arr = b.types().array(f32, 4);
    let arr_ptr = b.types().ptr(AddressSpace::Function, arr, Access::ReadWrite);
    let f32_ptr = b.types().ptr(AddressSpace::Function, f32, Access::ReadWrite);
    let f = b.function("f", f32);
    let body = b.module().function(f).block();
    b.append(body, |b| {
        let v = b.var("v", arr_ptr);
        let four = b.u32(4);
        let p = b.access(f32_ptr, v, &[four]);
        let x = b.load(p);
        b.return_value(f, x);
    });

    let failure = validate(&module, Capabilities::new()).unwrap_err();
    assert_eq!(failure.errors().count(), 1);
    let expected = "\
:3:52 error: access: index out of bounds for type 'ptr<function, array<f32, 4>, read_write>'
    %3:ptr<function, f32, read_write> = access %v, 4u
                                                   ^^

:2:3 note: in block
  $B1: {
  ^^^

:3:52 note: acceptable range: [0..3]
    %3:ptr<function, f32, read_write> = access %v, 4u
                                                   ^^

note: # Disassembly
%f = func():f32 {
  $B1: {
    %v:ptr<function, array<f32, 4>, read_write> = var
    %3:ptr<function, f32, read_write> = access %v, 4u
    %4:f32 = load %3
    ret %4
  }
}
";
    assert_eq!(failure.reason(), expected);
}

#[test]
fn call_cycle_is_reported_where_it_closes() {
    let mut module = Module::new();
    let mut b = Builder::new(&mut module);
    let void = b.types().void();
    let f = b.function("f", void);
    let g = b.function("g", void);
    let h = b.function("h", void);
    for (caller, callee) in [(f, g), (g, h), (h, f)] {
        let body = b.module().function(caller).block();
        b.append(body, |b| {
            b.call(callee, &[]);
            b.return_(caller);
        });
    }

    let failure = validate(&module, Capabilities::new()).unwrap_err();
    let recursive: Vec<_> = failure
        .errors()
        .filter(|d| d.message == "recursive function calls are not allowed")
        .collect();
    assert_eq!(recursive.len(), 1, "{failure}");
    assert_eq!(recursive[0].source.map(|s| (s.line, s.column)), Some((1, 1)));
}

#[test]
fn workgroup_grid_must_fit_in_u32() {
    let mut module = Module::new();
    let mut b = Builder::new(&mut module);
    let f = b.compute_entry_point("main", [1_048_576, 1_048_576, 1_048_576]);
    let body = b.module().function(f).block();
    b.append(body, |b| b.return_(f));

    let text = reason(&module, Capabilities::new());
    assert!(text.contains(":1:1 error: workgroup grid size cannot exceed 0xffffffff"), "{text}");
}

#[test]
fn front_facing_must_be_bool() {
    let mut module = Module::new();
    let mut b = Builder::new(&mut module);
    let void = b.types().void();
    let u32 = b.types().u32();
    let f = b.entry_point("main", PipelineStage::Fragment, void);
    b.io_param(f, "facing", u32, IoAttributes::builtin(BuiltinValue::FrontFacing));
    let body = b.module().function(f).block();
    b.append(body, |b| b.return_(f));

    let text = reason(&module, Capabilities::new());
    assert!(text.contains("front_facing must be a bool"), "{text}");
}

#[test]
fn access_into_a_matrix_column_reports_the_range() {
    let mut module = Module::new();
    let mut b = Builder::new(&mut module);
    let f32 = b.types().f32();
    let mat = b.types().mat(VectorSize::Tri, VectorSize::Bi, Scalar::F32);
    let f = b.function("f", f32);
    let m = b.param(f, "m", mat);
    let body = b.module().function(f).block();
    b.append(body, |b| {
        let one = b.u32(1);
        let three = b.u32(3);
        let x = b.access(f32, m, &[one, three]);
        b.return_value(f, x);
    });

    let text = reason(&module, Capabilities::new());
    assert!(text.contains("error: access: index out of bounds for type 'vec2<f32>'"), "{text}");
    assert!(text.contains("note: acceptable range: [0..1]"), "{text}");
}

#[test]
fn vector_elements_have_no_address() {
    let mut module = Module::new();
    let mut b = Builder::new(&mut module);
    let f32 = b.types().f32();
    let vec3 = b.types().vec3(Scalar::F32);
    let vec_ptr = b.types().ptr(AddressSpace::Function, vec3, Access::ReadWrite);
    let f32_ptr = b.types().ptr(AddressSpace::Function, f32, Access::ReadWrite);

    let by_pointer = b.function("by_pointer", f32);
    let body = b.module().function(by_pointer).block();
    b.append(body, |b| {
        let v = b.var("v", vec_ptr);
        let one = b.u32(1);
        let p = b.access(f32_ptr, v, &[one]);
        let x = b.load(p);
        b.return_value(by_pointer, x);
    });
    let text = reason(&module, Capabilities::new());
    assert!(text.contains("access: cannot obtain address of vector element"), "{text}");

    let mut module = Module::new();
    let mut b = Builder::new(&mut module);
    let by_value = b.function("by_value", f32);
    let body = b.module().function(by_value).block();
    let f32 = b.types().f32();
    let vec3 = b.types().vec3(Scalar::F32);
    let vec_ptr = b.types().ptr(AddressSpace::Function, vec3, Access::ReadWrite);
    b.append(body, |b| {
        let v = b.var("v", vec_ptr);
        let loaded = b.load(v);
        let one = b.u32(1);
        let x = b.access(f32, loaded, &[one]);
        b.return_value(by_value, x);
    });
    assert_eq!(reason(&module, Capabilities::new()), "");
}

#[test]
fn exit_loop_from_continuing_is_rejected() {
    let mut module = Module::new();
    let mut b = Builder::new(&mut module);
    let void = b.types().void();
    let f = b.function("f", void);
    let body = b.module().function(f).block();
    b.append(body, |b| {
        let lp = b.loop_();
        let stria_ir::InstKind::Loop {
            body: loop_body,
            continuing,
            ..
        } = b.module().instruction(lp).kind
        else {
            unreachable!();
        };
        b.append(loop_body, |b| b.continue_(lp));
        b.append(continuing, |b| b.exit_loop(lp, &[]));
        b.return_(f);
    });

    let text = reason(&module, Capabilities::new());
    assert!(text.contains("exit_loop: loop exit jumps out of continuing block"), "{text}");
    assert!(text.contains("note: in continuing block"), "{text}");
}

#[test]
fn exit_loop_cannot_leave_a_switch() {
    let mut module = Module::new();
    let mut b = Builder::new(&mut module);
    let void = b.types().void();
    let f = b.function("f", void);
    let body = b.module().function(f).block();
    b.append(body, |b| {
        let lp = b.loop_();
        let stria_ir::InstKind::Loop { body: loop_body, .. } = b.module().instruction(lp).kind else {
            unreachable!();
        };
        b.append(loop_body, |b| {
            let zero = b.u32(0);
            let sw = b.switch(zero);
            let default = b.default_case(sw);
            b.append(default, |b| b.exit_loop(lp, &[]));
            b.exit_loop(lp, &[]);
        });
        b.return_(f);
    });

    let failure = validate(&module, Capabilities::new()).unwrap_err();
    let text = failure.reason();
    assert!(
        text.contains("exit_loop: loop target jumps over other control instructions"),
        "{text}"
    );
    assert!(text.contains("note: first control instruction jumped"), "{text}");
    assert!(
        failure
            .diagnostics()
            .iter()
            .any(|d| d.severity == Severity::Note && d.message.starts_with("# Disassembly"))
    );
}

#[test]
fn module_scope_lets_need_a_capability() {
    let mut module = Module::new();
    let mut b = Builder::new(&mut module);
    let root = b.module().root_block();
    b.append(root, |b| {
        let one = b.i32(1);
        b.let_("one", one);
    });

    assert!(!reason(&module, Capabilities::new()).is_empty());
    assert_eq!(reason(&module, Capability::AllowModuleScopeLets.into()), "");
}
