mod common;

use pretty_assertions::assert_eq;
use stria_ir::{Module, dump_module};
use stria_opt::{IrValidation, Pass, PassManager, Std140, validate};

fn run_pipeline(module: &mut Module) -> bool {
    let mut pm = PassManager::new().with_validation(common::capabilities());
    pm.add_pass(Box::new(Std140));
    pm.add_pass(Box::new(IrValidation::new(common::capabilities())));
    pm.run(module).unwrap()
}

#[test]
fn fixture_is_valid_before_the_transform() {
    let mut module = Module::new();
    common::lighting_shader(&mut module);
    assert_eq!(validate(&module, common::capabilities()), Ok(()));
}

#[test]
fn std140_output_validates() {
    let mut module = Module::new();
    common::lighting_shader(&mut module);
    assert!(run_pipeline(&mut module));

    let text = dump_module(&module);
    assert!(
        text.contains(
            "\
Inner_std140 = struct @align(8) {
  m_col0:vec2<f32> @offset(0)
  m_col1:vec2<f32> @offset(8)
  m_col2:vec2<f32> @offset(16)
  scale:f32 @offset(24)
}
"
        ),
        "{text}"
    );
    assert!(
        text.contains(
            "\
Outer_std140 = struct @align(8), @block {
  inners:array<Inner_std140, 4> @offset(0)
  t_col0:vec2<f32> @offset(128)
  t_col1:vec2<f32> @offset(136)
  t_col2:vec2<f32> @offset(144)
  t_col3:vec2<f32> @offset(152)
}
"
        ),
        "{text}"
    );
    assert!(
        text.contains("%lights:ptr<uniform, Outer_std140, read> = var @binding_point(0, 0)"),
        "{text}"
    );
    // The nested scalar skips the split columns of `m`.
    assert!(text.contains(" = access %lights, 0u, 2u, 3u\n"), "{text}");
    // The array is converted element by element.
    assert!(text.contains("%idx:ptr<function, u32, read_write> = var 0u\n"), "{text}");
    assert_eq!(common::occurrences(&text, "%convert_Inner = func(%input:Inner_std140):Inner {"), 1);
    assert_eq!(common::occurrences(&text, "convert_Outer"), 0, "{text}");
}

#[test]
fn std140_is_idempotent() {
    let mut module = Module::new();
    common::lighting_shader(&mut module);
    assert!(Std140.run(&mut module).unwrap());
    let once = dump_module(&module);

    assert!(!Std140.run(&mut module).unwrap());
    assert_eq!(dump_module(&module), once);
}

#[test]
fn conversion_helpers_are_shared() {
    let mut module = Module::new();
    let lighting = common::lighting_shader(&mut module);
    common::add_double_load(&mut module, &lighting);
    assert!(run_pipeline(&mut module));

    let text = dump_module(&module);
    assert_eq!(common::occurrences(&text, "%convert_Outer = func("), 1, "{text}");
    assert_eq!(common::occurrences(&text, "%convert_Inner = func("), 1, "{text}");
    assert_eq!(common::occurrences(&text, "call %convert_Outer"), 2, "{text}");

    // Each load rebuilds a value of the original type.
    assert!(text.contains("%first:Outer = let"), "{text}");
    assert!(text.contains("%second:Outer = let"), "{text}");
}
