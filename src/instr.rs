//! Instruction decoding and control-flow flattening.
//!
//! Function bodies and constant expressions decode into one linear
//! [`Instruction`] array in a single pass. Block-shaped instructions
//! carry their branch targets as absolute positions in that array,
//! back-patched when the matching END (or ELSE) is reached, so execution
//! never re-walks nested structure.

use crate::error::Trap::*;
use crate::error::*;
use crate::leb128::*;
use crate::opcode::{Op, Shape};
use crate::types::read_block_type;
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Instruction {
    pub op: Op,
    pub operand: Value,
}

/// One flattened body: the instruction array plus the side list of
/// branch-table arms (each arm list ends with the default depth).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlatCode {
    pub code: Vec<Instruction>,
    pub br_tables: Vec<Vec<u32>>,
}

struct OpenBlock {
    op: Op,
    at: usize,
    else_at: Option<usize>,
}

/// Decodes instructions from `bytes` starting at `*pc` until the END that
/// closes the outermost level, leaving `*pc` just past it. The END itself
/// is kept in the output; executing it pops the enclosing label.
pub fn flatten(bytes: &[u8], pc: &mut usize, types_len: usize) -> Result<FlatCode, Trap> {
    let mut flat = FlatCode::default();
    let mut open: Vec<OpenBlock> = Vec::new();

    loop {
        if *pc >= bytes.len() { return malformed(UNEXPECTED_END); }
        let byte = bytes[*pc];
        *pc += 1;

        let op = match byte {
            0xFC => {
                let sub: u32 = safe_read_leb128(bytes, pc, 32)?;
                match Op::from_fc(sub) {
                    Some(op) => op,
                    None => return malformed(UNKNOWN_INSTRUCTION),
                }
            }
            0xFD => {
                let sub: u32 = safe_read_leb128(bytes, pc, 32)?;
                skip_vector_immediates(bytes, pc, sub)?;
                flat.code.push(Instruction { op: Op::Vector, operand: Value::from_u32(sub) });
                continue;
            }
            b => match Op::from_byte(b) {
                Some(op) => op,
                None => return malformed(UNKNOWN_INSTRUCTION),
            },
        };

        let here = flat.code.len();
        let operand = match op {
            Op::Block | Op::Loop | Op::If => {
                let bt = read_block_type(types_len, bytes, pc)?;
                open.push(OpenBlock { op, at: here, else_at: None });
                match op {
                    // A branch to a loop re-enters at the loop header itself.
                    Op::Loop => Value::block_operand(here, bt),
                    Op::Block => Value::block_operand(0, bt),
                    _ => Value::if_operand(bt, 0, 0),
                }
            }
            Op::Else => {
                match open.last_mut() {
                    Some(blk) if blk.op == Op::If && blk.else_at.is_none() => {
                        blk.else_at = Some(here);
                    }
                    _ => return malformed(ELSE_MUST_CLOSE_IF),
                }
                Value::default()
            }
            Op::End => {
                let Some(blk) = open.pop() else {
                    flat.code.push(Instruction { op: Op::End, operand: Value::default() });
                    return Ok(flat);
                };
                let past_end = here + 1;
                match blk.op {
                    Op::Block => {
                        let bt = flat.code[blk.at].operand.block_type();
                        flat.code[blk.at].operand = Value::block_operand(past_end, bt);
                    }
                    Op::If => {
                        // Without an ELSE both targets land past the END.
                        let else_target = blk.else_at.map_or(past_end, |e| e + 1);
                        flat.code[blk.at].operand.set_if_targets(else_target, past_end);
                    }
                    _ => {} // Loop targets are final at decode time.
                }
                Value::default()
            }
            Op::BrTable => {
                let count: u32 = safe_read_leb128(bytes, pc, 32)?;
                let mut arms: Vec<u32> = Vec::with_capacity(count as usize + 1);
                for _ in 0..count {
                    arms.push(safe_read_leb128(bytes, pc, 32)?);
                }
                arms.push(safe_read_leb128(bytes, pc, 32)?); // default, kept last
                flat.br_tables.push(arms);
                Value::from_u32(flat.br_tables.len() as u32 - 1)
            }
            _ => decode_operand(bytes, pc, op.shape())?,
        };

        flat.code.push(Instruction { op, operand });
    }
}

fn decode_operand(bytes: &[u8], pc: &mut usize, shape: Shape) -> Result<Value, Trap> {
    Ok(match shape {
        Shape::None => Value::default(),
        Shape::Index => Value::from_u32(safe_read_leb128(bytes, pc, 32)?),
        Shape::Pair => {
            let a: u32 = safe_read_leb128(bytes, pc, 32)?;
            let b: u32 = safe_read_leb128(bytes, pc, 32)?;
            Value::pair_operand(a, b)
        }
        Shape::MemArg => {
            let align: u32 = safe_read_leb128(bytes, pc, 32)?;
            let offset: u32 = safe_read_leb128(bytes, pc, 32)?;
            Value::mem_operand(offset, align)
        }
        Shape::ZeroByte => {
            expect_zero(bytes, pc)?;
            Value::default()
        }
        Shape::ZeroZero => {
            expect_zero(bytes, pc)?;
            expect_zero(bytes, pc)?;
            Value::default()
        }
        Shape::IdxZero => {
            let idx: u32 = safe_read_leb128(bytes, pc, 32)?;
            expect_zero(bytes, pc)?;
            Value::from_u32(idx)
        }
        Shape::RefTy => {
            if *pc >= bytes.len() { return malformed(UNEXPECTED_END); }
            let byte = bytes[*pc];
            *pc += 1;
            if !crate::types::is_ref_type(byte) { return malformed(MALFORMED_REF_TYPE); }
            Value::from_u32(byte as u32)
        }
        Shape::SelectTy => {
            let count: u32 = safe_read_leb128(bytes, pc, 32)?;
            if count != 1 { return Err(Validation(INVALID_RESULT_ARITY)); }
            if *pc >= bytes.len() { return malformed(UNEXPECTED_END); }
            let byte = bytes[*pc];
            *pc += 1;
            if !crate::types::is_val_type(byte) { return malformed(INVALID_VALUE_TYPE); }
            Value::from_u32(byte as u32)
        }
        Shape::ConstI32 => Value::from_i32(safe_read_sleb128(bytes, pc, 32)?),
        Shape::ConstI64 => Value::from_i64(safe_read_sleb128(bytes, pc, 64)?),
        Shape::ConstF32 => {
            let raw = take(bytes, pc, 4)?;
            Value::from_f32_bits(u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]))
        }
        Shape::ConstF64 => {
            let raw = take(bytes, pc, 8)?;
            let mut le = [0u8; 8];
            le.copy_from_slice(raw);
            Value::from_f64_bits(u64::from_le_bytes(le))
        }
        // Control shapes are handled by the flattening loop itself.
        Shape::Block | Shape::BrTable | Shape::Vector => unreachable!(),
    })
}

fn expect_zero(bytes: &[u8], pc: &mut usize) -> Result<(), Trap> {
    if *pc >= bytes.len() { return malformed(UNEXPECTED_END); }
    if bytes[*pc] != 0 { return malformed(ZERO_FLAG_EXPECTED); }
    *pc += 1;
    Ok(())
}

fn take<'a>(bytes: &'a [u8], pc: &mut usize, n: usize) -> Result<&'a [u8], Trap> {
    if *pc + n > bytes.len() { return malformed(UNEXPECTED_END); }
    let slice = &bytes[*pc..*pc + n];
    *pc += n;
    Ok(slice)
}

/// The vector space is decoded (so surrounding code stays addressable)
/// but never executed. Only the immediate widths matter here.
fn skip_vector_immediates(bytes: &[u8], pc: &mut usize, sub: u32) -> Result<(), Trap> {
    match sub {
        // Loads, stores and splat-loads: plain memarg.
        0..=11 | 92 | 93 => {
            let _: u32 = safe_read_leb128(bytes, pc, 32)?;
            let _: u32 = safe_read_leb128(bytes, pc, 32)?;
        }
        // v128.const and i8x16.shuffle: sixteen immediate bytes.
        12 | 13 => {
            take(bytes, pc, 16)?;
        }
        // Lane extract/replace: one lane byte.
        21..=34 => {
            take(bytes, pc, 1)?;
        }
        // Lane loads/stores: memarg plus one lane byte.
        84..=91 => {
            let _: u32 = safe_read_leb128(bytes, pc, 32)?;
            let _: u32 = safe_read_leb128(bytes, pc, 32)?;
            take(bytes, pc, 1)?;
        }
        14..=20 | 35..=83 | 94..=255 => {}
        _ => return malformed(UNKNOWN_INSTRUCTION),
    }
    Ok(())
}
