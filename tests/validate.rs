mod common;

use weft::{validate, Module, Trap};

use common::*;

fn check(bytes: &[u8]) -> Result<(), Trap> {
    validate(&Module::decode(bytes).unwrap())
}

#[test]
fn accepts_structured_control_flow() {
    // f(x): block yielding x, plus an if/else, added together.
    let body = cat(&[
        &[0x02, 0x7F, 0x20, 0x00, END],
        &[0x20, 0x00],
        &[0x04, 0x7F],
        &i32c(1),
        &[0x05],
        &i32c(2),
        &[END],
        &[0x6A],
        &[END],
    ]);
    check(&single_func(&[I32], &[I32], &[], &body)).unwrap();

    // Empty if without else, loop with a conditional backward branch,
    // typed select.
    let body = cat(&[
        &[0x20, 0x00],
        &[0x04, 0x40, 0x01, END],
        &[0x03, 0x40, 0x20, 0x00, 0x0D, 0x00, END], // loop { br_if 0 }
        &i32c(1),
        &i32c(2),
        &[0x20, 0x00],
        &[0x1C, 0x01, I32],
        &[END],
    ]);
    check(&single_func(&[I32], &[I32], &[], &body)).unwrap();
}

#[test]
fn rejects_operand_type_mismatch() {
    let body = cat(&[&i32c(1), &i64c(2), &[0x6A], &[END]]);
    assert_eq!(
        check(&single_func(&[], &[I32], &[], &body)).unwrap_err(),
        Trap::Validation("type mismatch")
    );
}

#[test]
fn rejects_wrong_return_type() {
    let body = cat(&[&i64c(1), &[END]]);
    assert_eq!(
        check(&single_func(&[], &[I32], &[], &body)).unwrap_err(),
        Trap::Validation("type mismatch")
    );
}

#[test]
fn rejects_value_left_on_stack() {
    let body = cat(&[&i32c(1), &[END]]);
    assert_eq!(
        check(&single_func(&[], &[], &[], &body)).unwrap_err(),
        Trap::Validation("type mismatch")
    );
}

#[test]
fn rejects_stack_underflow() {
    assert_eq!(
        check(&single_func(&[], &[], &[], &[0x1A, END])).unwrap_err(),
        Trap::Validation("type mismatch")
    );
}

#[test]
fn underflow_is_fine_in_dead_code() {
    // After unreachable the flow is polymorphic; the add conjures values.
    let body = cat(&[&[0x00], &[0x6A], &[0x1A], &[END]]);
    check(&single_func(&[], &[], &[], &body)).unwrap();
}

#[test]
fn rejects_unknown_local() {
    assert_eq!(
        check(&single_func(&[I32], &[], &[], &[0x20, 0x01, 0x1A, END])).unwrap_err(),
        Trap::Validation("unknown local")
    );
}

#[test]
fn rejects_branch_depth_out_of_range() {
    assert_eq!(
        check(&single_func(&[], &[], &[], &[0x0C, 0x01, END])).unwrap_err(),
        Trap::Validation("unknown label")
    );
}

#[test]
fn rejects_unknown_call_targets() {
    assert_eq!(
        check(&single_func(&[], &[], &[], &[0x10, 0x05, END])).unwrap_err(),
        Trap::Validation("unknown function")
    );

    // call_indirect with no table in scope.
    let body = cat(&[&i32c(0), &[0x11, 0x00, 0x00], &[END]]);
    assert_eq!(
        check(&single_func(&[], &[], &[], &body)).unwrap_err(),
        Trap::Validation("unknown table")
    );

    // Table present but the type index is out of range.
    let mut b = ModuleBuilder::new();
    let void = b.add_type(&[], &[]);
    b.add_table(FUNCREF, 1, None);
    b.add_func(void, &[], &cat(&[&i32c(0), &[0x11, 0x05, 0x00], &[END]]));
    assert_eq!(check(&b.build()).unwrap_err(), Trap::Validation("unknown type"));
}

#[test]
fn global_mutability_is_enforced() {
    let mut b = ModuleBuilder::new();
    let void = b.add_type(&[], &[]);
    b.add_global(I32, false, &cat(&[&i32c(0), &[END]]));
    b.add_func(void, &[], &cat(&[&i32c(1), &[0x24, 0x00], &[END]]));
    assert_eq!(
        check(&b.build()).unwrap_err(),
        Trap::Validation("global is immutable")
    );

    let mut b = ModuleBuilder::new();
    let void = b.add_type(&[], &[]);
    b.add_func(void, &[], &cat(&[&i32c(1), &[0x24, 0x05], &[END]]));
    assert_eq!(check(&b.build()).unwrap_err(), Trap::Validation("unknown global"));
}

#[test]
fn alignment_must_fit_the_access_width() {
    // align 2^3 = 8 on a 4-byte load.
    let mut b = ModuleBuilder::new();
    let void = b.add_type(&[], &[]);
    b.add_memory(1, None);
    b.add_func(void, &[], &cat(&[&i32c(0), &[0x28, 0x03, 0x00], &[0x1A], &[END]]));
    assert_eq!(
        check(&b.build()).unwrap_err(),
        Trap::Validation("alignment must not be larger than natural")
    );

    // An alignment exponent of 32 or more cannot denote any width at all.
    let mut b = ModuleBuilder::new();
    let void = b.add_type(&[], &[]);
    b.add_memory(1, None);
    b.add_func(void, &[], &cat(&[&i32c(0), &[0x28, 0x20, 0x00], &[0x1A], &[END]]));
    assert_eq!(check(&b.build()).unwrap_err(), Trap::Malformed("integer too large"));
}

#[test]
fn memory_ops_need_a_memory() {
    let body = cat(&[&i32c(0), &[0x28, 0x02, 0x00], &[0x1A], &[END]]);
    assert_eq!(
        check(&single_func(&[], &[], &[], &body)).unwrap_err(),
        Trap::Validation("unknown memory")
    );

    assert_eq!(
        check(&single_func(&[], &[I32], &[], &[0x3F, 0x00, END])).unwrap_err(),
        Trap::Validation("unknown memory")
    );
}

#[test]
fn select_merges_operand_types() {
    // Untyped select cannot mix i32 and i64.
    let body = cat(&[&i32c(1), &i64c(2), &i32c(0), &[0x1B], &[0x1A], &[END]]);
    assert_eq!(
        check(&single_func(&[], &[], &[], &body)).unwrap_err(),
        Trap::Validation("type mismatch")
    );

    // Untyped select is for numbers; references need select t.
    let body = cat(&[
        &[0xD0, FUNCREF],
        &[0xD0, FUNCREF],
        &i32c(0),
        &[0x1B],
        &[0x1A],
        &[END],
    ]);
    assert_eq!(
        check(&single_func(&[], &[], &[], &body)).unwrap_err(),
        Trap::Validation("type mismatch")
    );
}

#[test]
fn if_without_else_must_pass_types_through() {
    let body = cat(&[&i32c(1), &[0x04, 0x7F], &i32c(42), &[END], &[END]]);
    assert_eq!(
        check(&single_func(&[], &[I32], &[], &body)).unwrap_err(),
        Trap::Validation("type mismatch")
    );
}

#[test]
fn br_table_arms_must_agree_with_the_default() {
    let body = cat(&[
        &[0x02, 0x7F], // block (result i32)
        &[0x02, 0x40], //   block
        &i32c(0),
        &[0x0E, 0x01, 0x00, 0x01], //     br_table 0 1
        &[END],
        &i32c(42),
        &[END],
        &[END],
    ]);
    assert_eq!(
        check(&single_func(&[], &[I32], &[], &body)).unwrap_err(),
        Trap::Validation("type mismatch")
    );
}

#[test]
fn initializers_must_be_constant() {
    let mut b = ModuleBuilder::new();
    b.add_global(I32, false, &cat(&[&i32c(1), &i32c(2), &[0x6A], &[END]]));
    assert_eq!(
        check(&b.build()).unwrap_err(),
        Trap::Validation("constant expression required")
    );

    let mut b = ModuleBuilder::new();
    b.add_global(I32, false, &cat(&[&i64c(1), &[END]]));
    assert_eq!(check(&b.build()).unwrap_err(), Trap::Validation("type mismatch"));

    // An empty initializer leaves nothing for the global.
    let mut b = ModuleBuilder::new();
    b.add_global(I32, false, &[END]);
    assert_eq!(check(&b.build()).unwrap_err(), Trap::Validation("type mismatch"));
}

#[test]
fn initializers_may_read_imported_immutable_globals_only() {
    // A module-local global is not visible to initializers.
    let mut b = ModuleBuilder::new();
    b.add_global(I32, false, &cat(&[&i32c(1), &[END]]));
    b.add_global(I32, false, &[0x23, 0x00, END]);
    assert_eq!(check(&b.build()).unwrap_err(), Trap::Validation("unknown global"));

    // An imported mutable global is not constant.
    let mut b = ModuleBuilder::new();
    b.import_global("env", "g", I32, true);
    b.add_global(I32, false, &[0x23, 0x00, END]);
    assert_eq!(
        check(&b.build()).unwrap_err(),
        Trap::Validation("constant expression required")
    );

    // Imported and immutable passes.
    let mut b = ModuleBuilder::new();
    b.import_global("env", "g", I32, false);
    b.add_global(I32, false, &[0x23, 0x00, END]);
    check(&b.build()).unwrap();
}

#[test]
fn active_offsets_are_const_checked() {
    let mut b = ModuleBuilder::new();
    b.add_memory(1, None);
    b.data_active(&cat(&[&i64c(0), &[END]]), b"x");
    assert_eq!(check(&b.build()).unwrap_err(), Trap::Validation("type mismatch"));

    let mut b = ModuleBuilder::new();
    let void = b.add_type(&[], &[]);
    b.add_func(void, &[], &[END]);
    b.add_table(FUNCREF, 1, None);
    b.elem_active(&cat(&[&i64c(0), &[END]]), &[0]);
    assert_eq!(check(&b.build()).unwrap_err(), Trap::Validation("type mismatch"));
}

#[test]
fn ref_func_requires_a_declaration() {
    let mut b = ModuleBuilder::new();
    let void = b.add_type(&[], &[]);
    b.add_func(void, &[], &[END]);
    b.add_func(void, &[], &[0xD2, 0x00, 0x1A, END]);
    b.export_func("f", 1);
    assert_eq!(
        check(&b.build()).unwrap_err(),
        Trap::Validation("undeclared function reference")
    );

    // The same body validates once func 0 appears in a declarative segment.
    let mut b = ModuleBuilder::new();
    let void = b.add_type(&[], &[]);
    b.add_func(void, &[], &[END]);
    b.add_func(void, &[], &[0xD2, 0x00, 0x1A, END]);
    b.export_func("f", 1);
    b.elem_declared(&[0]);
    check(&b.build()).unwrap();

    let mut b = ModuleBuilder::new();
    let void = b.add_type(&[], &[]);
    b.add_func(void, &[], &[0xD2, 0x07, 0x1A, END]);
    assert_eq!(check(&b.build()).unwrap_err(), Trap::Validation("unknown function"));
}

#[test]
fn bulk_ops_check_segment_indices() {
    let mut b = ModuleBuilder::new();
    let void = b.add_type(&[], &[]);
    b.add_memory(1, None);
    b.set_data_count(1);
    b.data_passive(b"x");
    b.add_func(
        void,
        &[],
        &cat(&[&i32c(0), &i32c(0), &i32c(1), &[0xFC, 0x08, 0x01, 0x00], &[END]]),
    );
    assert_eq!(
        check(&b.build()).unwrap_err(),
        Trap::Validation("unknown data segment")
    );

    let mut b = ModuleBuilder::new();
    let void = b.add_type(&[], &[]);
    b.add_func(void, &[], &[0xFC, 0x0D, 0x02, END]);
    b.add_table(FUNCREF, 1, None);
    b.elem_passive(&[]);
    assert_eq!(
        check(&b.build()).unwrap_err(),
        Trap::Validation("unknown elem segment")
    );
}

#[test]
fn vector_instructions_are_rejected() {
    let mut body = vec![0xFD, 0x0C];
    body.extend_from_slice(&[0u8; 16]); // v128.const immediate
    body.extend_from_slice(&[0x1A, END]);
    assert_eq!(
        check(&single_func(&[], &[], &[], &body)).unwrap_err(),
        Trap::Validation("vector instructions not supported")
    );

    // So are v128 locals and signatures, even without vector code.
    assert_eq!(
        check(&single_func(&[], &[], &[(1, 0x7B)], &[END])).unwrap_err(),
        Trap::Validation("vector instructions not supported")
    );
    assert_eq!(
        check(&single_func(&[0x7B], &[], &[], &[END])).unwrap_err(),
        Trap::Validation("vector instructions not supported")
    );
}

#[test]
fn start_function_must_take_and_return_nothing() {
    let mut b = ModuleBuilder::new();
    let unary = b.add_type(&[I32], &[]);
    b.add_func(unary, &[], &[END]);
    b.set_start(0);
    assert_eq!(check(&b.build()).unwrap_err(), Trap::Validation("start function"));
}
