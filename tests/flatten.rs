mod common;

use common::*;
use weft::{Module, Op, Trap};

fn flat_of(bytes: &[u8]) -> weft::FlatCode {
    let module = Module::decode(bytes).unwrap();
    (*module.func_bodies[0].code).clone()
}

#[test]
fn block_end_resolves_past_its_end() {
    let body = cat(&[
        &[0x02, 0x40], // block void
        &[0x01],       // nop
        &[END, END],
    ]);
    let flat = flat_of(&single_func(&[], &[], &[], &body));

    assert_eq!(flat.code.len(), 4);
    assert_eq!(flat.code[0].op, Op::Block);
    assert_eq!(flat.code[0].operand.jump_target(), 3);
    assert_eq!(flat.code[0].operand.block_type(), -64);
    assert_eq!(flat.code[3].op, Op::End);
}

#[test]
fn loop_targets_its_own_header() {
    let body = cat(&[
        &[0x03, 0x40], // loop void
        &[0x01],       // nop
        &[END, END],
    ]);
    let flat = flat_of(&single_func(&[], &[], &[], &body));

    assert_eq!(flat.code[0].op, Op::Loop);
    assert_eq!(flat.code[0].operand.jump_target(), 0);
}

#[test]
fn if_else_targets_fall_after_else_and_end() {
    let body = cat(&[
        &[0x20, 0x00], // local.get 0
        &[0x04, 0x40], // if void
        &[0x01],       // nop
        &[0x05],       // else
        &[0x01],       // nop
        &[END, END],
    ]);
    let flat = flat_of(&single_func(&[I32], &[], &[], &body));

    assert_eq!(flat.code[1].op, Op::If);
    let (else_target, end_target) = flat.code[1].operand.if_targets();
    assert_eq!(else_target, 4); // first instruction of the else arm
    assert_eq!(end_target, 6); // past the END at index 5
}

#[test]
fn if_without_else_jumps_past_end_on_false() {
    let body = cat(&[
        &[0x20, 0x00], // local.get 0
        &[0x04, 0x40], // if void
        &[0x01],       // nop
        &[END, END],
    ]);
    let flat = flat_of(&single_func(&[I32], &[], &[], &body));

    let (else_target, end_target) = flat.code[1].operand.if_targets();
    assert_eq!(else_target, 4);
    assert_eq!(end_target, 4);
}

#[test]
fn nested_blocks_resolve_independently() {
    let body = cat(&[
        &[0x02, 0x40], // outer block
        &[0x02, 0x40], // inner block
        &i32c(0),
        &[0x0E, 0x02, 0x00, 0x01, 0x01], // br_table [0 1] default 1
        &[END, END, END],
    ]);
    let flat = flat_of(&single_func(&[], &[], &[], &body));

    assert_eq!(flat.code[0].operand.jump_target(), 6); // outer
    assert_eq!(flat.code[1].operand.jump_target(), 5); // inner
    assert_eq!(flat.code[3].op, Op::BrTable);
    assert_eq!(flat.code[3].operand.as_u32(), 0);
    assert_eq!(flat.br_tables[0], vec![0, 1, 1]);
}

#[test]
fn shorthand_and_indexed_block_types() {
    let body = cat(&[
        &[0x02, 0x7F], // block (result i32)
        &i32c(7),
        &[END],
        &[0x1A], // drop
        &[END],
    ]);
    let flat = flat_of(&single_func(&[], &[], &[], &body));
    assert_eq!(flat.code[0].operand.block_type(), -1);

    // Block type as an index into the type table.
    let body = cat(&[
        &[0x20, 0x00], // local.get 0
        &[0x02, 0x00], // block (type 0): [i32] -> [i32]
        &[END, END],
    ]);
    let flat = flat_of(&single_func(&[I32], &[I32], &[], &body));
    assert_eq!(flat.code[1].operand.block_type(), 0);
}

#[test]
fn vector_opcodes_become_carrier_instructions() {
    let mut body = vec![0xFD, 0x0C]; // v128.const
    body.extend_from_slice(&[0u8; 16]);
    body.extend_from_slice(&[0x1A, END]); // drop, end

    // Decode succeeds; rejection is validation's job.
    let flat = flat_of(&single_func(&[], &[], &[], &body));
    assert_eq!(flat.code[0].op, Op::Vector);
    assert_eq!(flat.code[0].operand.as_u32(), 12);
}

#[test]
fn unterminated_body_is_rejected() {
    let bytes = single_func(&[], &[], &[], &[0x02, 0x40]); // block, no end
    assert_eq!(
        Module::decode(&bytes),
        Err(Trap::Malformed("unexpected end of section or function"))
    );
}

#[test]
fn branch_depths_are_kept_relative() {
    let body = cat(&[
        &[0x02, 0x40], // block
        &[0x03, 0x40], // loop
        &i32c(1),
        &[0x0D, 0x01], // br_if 1 (the block)
        &[0x0C, 0x00], // br 0 (the loop)
        &[END, END, END],
    ]);
    let flat = flat_of(&single_func(&[], &[], &[], &body));

    assert_eq!(flat.code[3].op, Op::BrIf);
    assert_eq!(flat.code[3].operand.as_u32(), 1);
    assert_eq!(flat.code[4].op, Op::Br);
    assert_eq!(flat.code[4].operand.as_u32(), 0);
}
