//! Instruction set tables.
//!
//! [`for_each_op!`] holds the canonical opcode list (name, wire code,
//! operand shape, mnemonic) and invokes a callback macro, so the enum,
//! the decode tables and the disassembler all generate from one list.
//! Two-byte opcodes carry their prefix in the high byte of the code
//! (`0xFC00 | sub`); the whole vector (`0xFD`) space collapses into one
//! carrier op that the decoder skips immediates for and the executor
//! refuses to run.

/// Operand shape as it appears in the byte stream.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Shape {
    /// No immediate.
    None,
    /// One u32 varint.
    Index,
    /// Two u32 varints.
    Pair,
    /// Block type, then a nested body.
    Block,
    /// Branch-table vector.
    BrTable,
    /// Type vector, length fixed at one.
    SelectTy,
    /// Alignment then offset, both u32 varints.
    MemArg,
    /// One reserved 0x00 byte.
    ZeroByte,
    /// Two reserved 0x00 bytes.
    ZeroZero,
    /// One u32 varint, then a reserved 0x00 byte.
    IdxZero,
    /// One reference-type byte.
    RefTy,
    /// Signed 32-bit varint literal.
    ConstI32,
    /// Signed 64-bit varint literal.
    ConstI64,
    /// Four-byte little-endian literal.
    ConstF32,
    /// Eight-byte little-endian literal.
    ConstF64,
    /// Vector sub-opcode with its own immediate grammar.
    Vector,
}

macro_rules! for_each_op {
    ($callback:ident) => {
        $callback! {
            // Control
            (Unreachable, 0x00, None, "unreachable"),
            (Nop, 0x01, None, "nop"),
            (Block, 0x02, Block, "block"),
            (Loop, 0x03, Block, "loop"),
            (If, 0x04, Block, "if"),
            (Else, 0x05, None, "else"),
            (End, 0x0B, None, "end"),
            (Br, 0x0C, Index, "br"),
            (BrIf, 0x0D, Index, "br_if"),
            (BrTable, 0x0E, BrTable, "br_table"),
            (Return, 0x0F, None, "return"),
            (Call, 0x10, Index, "call"),
            (CallIndirect, 0x11, Pair, "call_indirect"),
            // Parametric
            (Drop, 0x1A, None, "drop"),
            (Select, 0x1B, None, "select"),
            (SelectT, 0x1C, SelectTy, "select"),
            // Variables
            (LocalGet, 0x20, Index, "local.get"),
            (LocalSet, 0x21, Index, "local.set"),
            (LocalTee, 0x22, Index, "local.tee"),
            (GlobalGet, 0x23, Index, "global.get"),
            (GlobalSet, 0x24, Index, "global.set"),
            // Tables
            (TableGet, 0x25, Index, "table.get"),
            (TableSet, 0x26, Index, "table.set"),
            // Memory
            (I32Load, 0x28, MemArg, "i32.load"),
            (I64Load, 0x29, MemArg, "i64.load"),
            (F32Load, 0x2A, MemArg, "f32.load"),
            (F64Load, 0x2B, MemArg, "f64.load"),
            (I32Load8S, 0x2C, MemArg, "i32.load8_s"),
            (I32Load8U, 0x2D, MemArg, "i32.load8_u"),
            (I32Load16S, 0x2E, MemArg, "i32.load16_s"),
            (I32Load16U, 0x2F, MemArg, "i32.load16_u"),
            (I64Load8S, 0x30, MemArg, "i64.load8_s"),
            (I64Load8U, 0x31, MemArg, "i64.load8_u"),
            (I64Load16S, 0x32, MemArg, "i64.load16_s"),
            (I64Load16U, 0x33, MemArg, "i64.load16_u"),
            (I64Load32S, 0x34, MemArg, "i64.load32_s"),
            (I64Load32U, 0x35, MemArg, "i64.load32_u"),
            (I32Store, 0x36, MemArg, "i32.store"),
            (I64Store, 0x37, MemArg, "i64.store"),
            (F32Store, 0x38, MemArg, "f32.store"),
            (F64Store, 0x39, MemArg, "f64.store"),
            (I32Store8, 0x3A, MemArg, "i32.store8"),
            (I32Store16, 0x3B, MemArg, "i32.store16"),
            (I64Store8, 0x3C, MemArg, "i64.store8"),
            (I64Store16, 0x3D, MemArg, "i64.store16"),
            (I64Store32, 0x3E, MemArg, "i64.store32"),
            (MemorySize, 0x3F, ZeroByte, "memory.size"),
            (MemoryGrow, 0x40, ZeroByte, "memory.grow"),
            // Constants
            (I32Const, 0x41, ConstI32, "i32.const"),
            (I64Const, 0x42, ConstI64, "i64.const"),
            (F32Const, 0x43, ConstF32, "f32.const"),
            (F64Const, 0x44, ConstF64, "f64.const"),
            // i32 comparisons
            (I32Eqz, 0x45, None, "i32.eqz"),
            (I32Eq, 0x46, None, "i32.eq"),
            (I32Ne, 0x47, None, "i32.ne"),
            (I32LtS, 0x48, None, "i32.lt_s"),
            (I32LtU, 0x49, None, "i32.lt_u"),
            (I32GtS, 0x4A, None, "i32.gt_s"),
            (I32GtU, 0x4B, None, "i32.gt_u"),
            (I32LeS, 0x4C, None, "i32.le_s"),
            (I32LeU, 0x4D, None, "i32.le_u"),
            (I32GeS, 0x4E, None, "i32.ge_s"),
            (I32GeU, 0x4F, None, "i32.ge_u"),
            // i64 comparisons
            (I64Eqz, 0x50, None, "i64.eqz"),
            (I64Eq, 0x51, None, "i64.eq"),
            (I64Ne, 0x52, None, "i64.ne"),
            (I64LtS, 0x53, None, "i64.lt_s"),
            (I64LtU, 0x54, None, "i64.lt_u"),
            (I64GtS, 0x55, None, "i64.gt_s"),
            (I64GtU, 0x56, None, "i64.gt_u"),
            (I64LeS, 0x57, None, "i64.le_s"),
            (I64LeU, 0x58, None, "i64.le_u"),
            (I64GeS, 0x59, None, "i64.ge_s"),
            (I64GeU, 0x5A, None, "i64.ge_u"),
            // f32 comparisons
            (F32Eq, 0x5B, None, "f32.eq"),
            (F32Ne, 0x5C, None, "f32.ne"),
            (F32Lt, 0x5D, None, "f32.lt"),
            (F32Gt, 0x5E, None, "f32.gt"),
            (F32Le, 0x5F, None, "f32.le"),
            (F32Ge, 0x60, None, "f32.ge"),
            // f64 comparisons
            (F64Eq, 0x61, None, "f64.eq"),
            (F64Ne, 0x62, None, "f64.ne"),
            (F64Lt, 0x63, None, "f64.lt"),
            (F64Gt, 0x64, None, "f64.gt"),
            (F64Le, 0x65, None, "f64.le"),
            (F64Ge, 0x66, None, "f64.ge"),
            // i32 arithmetic
            (I32Clz, 0x67, None, "i32.clz"),
            (I32Ctz, 0x68, None, "i32.ctz"),
            (I32Popcnt, 0x69, None, "i32.popcnt"),
            (I32Add, 0x6A, None, "i32.add"),
            (I32Sub, 0x6B, None, "i32.sub"),
            (I32Mul, 0x6C, None, "i32.mul"),
            (I32DivS, 0x6D, None, "i32.div_s"),
            (I32DivU, 0x6E, None, "i32.div_u"),
            (I32RemS, 0x6F, None, "i32.rem_s"),
            (I32RemU, 0x70, None, "i32.rem_u"),
            (I32And, 0x71, None, "i32.and"),
            (I32Or, 0x72, None, "i32.or"),
            (I32Xor, 0x73, None, "i32.xor"),
            (I32Shl, 0x74, None, "i32.shl"),
            (I32ShrS, 0x75, None, "i32.shr_s"),
            (I32ShrU, 0x76, None, "i32.shr_u"),
            (I32Rotl, 0x77, None, "i32.rotl"),
            (I32Rotr, 0x78, None, "i32.rotr"),
            // i64 arithmetic
            (I64Clz, 0x79, None, "i64.clz"),
            (I64Ctz, 0x7A, None, "i64.ctz"),
            (I64Popcnt, 0x7B, None, "i64.popcnt"),
            (I64Add, 0x7C, None, "i64.add"),
            (I64Sub, 0x7D, None, "i64.sub"),
            (I64Mul, 0x7E, None, "i64.mul"),
            (I64DivS, 0x7F, None, "i64.div_s"),
            (I64DivU, 0x80, None, "i64.div_u"),
            (I64RemS, 0x81, None, "i64.rem_s"),
            (I64RemU, 0x82, None, "i64.rem_u"),
            (I64And, 0x83, None, "i64.and"),
            (I64Or, 0x84, None, "i64.or"),
            (I64Xor, 0x85, None, "i64.xor"),
            (I64Shl, 0x86, None, "i64.shl"),
            (I64ShrS, 0x87, None, "i64.shr_s"),
            (I64ShrU, 0x88, None, "i64.shr_u"),
            (I64Rotl, 0x89, None, "i64.rotl"),
            (I64Rotr, 0x8A, None, "i64.rotr"),
            // f32 arithmetic
            (F32Abs, 0x8B, None, "f32.abs"),
            (F32Neg, 0x8C, None, "f32.neg"),
            (F32Ceil, 0x8D, None, "f32.ceil"),
            (F32Floor, 0x8E, None, "f32.floor"),
            (F32Trunc, 0x8F, None, "f32.trunc"),
            (F32Nearest, 0x90, None, "f32.nearest"),
            (F32Sqrt, 0x91, None, "f32.sqrt"),
            (F32Add, 0x92, None, "f32.add"),
            (F32Sub, 0x93, None, "f32.sub"),
            (F32Mul, 0x94, None, "f32.mul"),
            (F32Div, 0x95, None, "f32.div"),
            (F32Min, 0x96, None, "f32.min"),
            (F32Max, 0x97, None, "f32.max"),
            (F32Copysign, 0x98, None, "f32.copysign"),
            // f64 arithmetic
            (F64Abs, 0x99, None, "f64.abs"),
            (F64Neg, 0x9A, None, "f64.neg"),
            (F64Ceil, 0x9B, None, "f64.ceil"),
            (F64Floor, 0x9C, None, "f64.floor"),
            (F64Trunc, 0x9D, None, "f64.trunc"),
            (F64Nearest, 0x9E, None, "f64.nearest"),
            (F64Sqrt, 0x9F, None, "f64.sqrt"),
            (F64Add, 0xA0, None, "f64.add"),
            (F64Sub, 0xA1, None, "f64.sub"),
            (F64Mul, 0xA2, None, "f64.mul"),
            (F64Div, 0xA3, None, "f64.div"),
            (F64Min, 0xA4, None, "f64.min"),
            (F64Max, 0xA5, None, "f64.max"),
            (F64Copysign, 0xA6, None, "f64.copysign"),
            // Conversions
            (I32WrapI64, 0xA7, None, "i32.wrap_i64"),
            (I32TruncF32S, 0xA8, None, "i32.trunc_f32_s"),
            (I32TruncF32U, 0xA9, None, "i32.trunc_f32_u"),
            (I32TruncF64S, 0xAA, None, "i32.trunc_f64_s"),
            (I32TruncF64U, 0xAB, None, "i32.trunc_f64_u"),
            (I64ExtendI32S, 0xAC, None, "i64.extend_i32_s"),
            (I64ExtendI32U, 0xAD, None, "i64.extend_i32_u"),
            (I64TruncF32S, 0xAE, None, "i64.trunc_f32_s"),
            (I64TruncF32U, 0xAF, None, "i64.trunc_f32_u"),
            (I64TruncF64S, 0xB0, None, "i64.trunc_f64_s"),
            (I64TruncF64U, 0xB1, None, "i64.trunc_f64_u"),
            (F32ConvertI32S, 0xB2, None, "f32.convert_i32_s"),
            (F32ConvertI32U, 0xB3, None, "f32.convert_i32_u"),
            (F32ConvertI64S, 0xB4, None, "f32.convert_i64_s"),
            (F32ConvertI64U, 0xB5, None, "f32.convert_i64_u"),
            (F32DemoteF64, 0xB6, None, "f32.demote_f64"),
            (F64ConvertI32S, 0xB7, None, "f64.convert_i32_s"),
            (F64ConvertI32U, 0xB8, None, "f64.convert_i32_u"),
            (F64ConvertI64S, 0xB9, None, "f64.convert_i64_s"),
            (F64ConvertI64U, 0xBA, None, "f64.convert_i64_u"),
            (F64PromoteF32, 0xBB, None, "f64.promote_f32"),
            (I32ReinterpretF32, 0xBC, None, "i32.reinterpret_f32"),
            (I64ReinterpretF64, 0xBD, None, "i64.reinterpret_f64"),
            (F32ReinterpretI32, 0xBE, None, "f32.reinterpret_i32"),
            (F64ReinterpretI64, 0xBF, None, "f64.reinterpret_i64"),
            // Sign extension
            (I32Extend8S, 0xC0, None, "i32.extend8_s"),
            (I32Extend16S, 0xC1, None, "i32.extend16_s"),
            (I64Extend8S, 0xC2, None, "i64.extend8_s"),
            (I64Extend16S, 0xC3, None, "i64.extend16_s"),
            (I64Extend32S, 0xC4, None, "i64.extend32_s"),
            // References
            (RefNull, 0xD0, RefTy, "ref.null"),
            (RefIsNull, 0xD1, None, "ref.is_null"),
            (RefFunc, 0xD2, Index, "ref.func"),
            // Saturating truncation (0xFC prefix)
            (I32TruncSatF32S, 0xFC00, None, "i32.trunc_sat_f32_s"),
            (I32TruncSatF32U, 0xFC01, None, "i32.trunc_sat_f32_u"),
            (I32TruncSatF64S, 0xFC02, None, "i32.trunc_sat_f64_s"),
            (I32TruncSatF64U, 0xFC03, None, "i32.trunc_sat_f64_u"),
            (I64TruncSatF32S, 0xFC04, None, "i64.trunc_sat_f32_s"),
            (I64TruncSatF32U, 0xFC05, None, "i64.trunc_sat_f32_u"),
            (I64TruncSatF64S, 0xFC06, None, "i64.trunc_sat_f64_s"),
            (I64TruncSatF64U, 0xFC07, None, "i64.trunc_sat_f64_u"),
            // Bulk memory (0xFC prefix)
            (MemoryInit, 0xFC08, IdxZero, "memory.init"),
            (DataDrop, 0xFC09, Index, "data.drop"),
            (MemoryCopy, 0xFC0A, ZeroZero, "memory.copy"),
            (MemoryFill, 0xFC0B, ZeroByte, "memory.fill"),
            (TableInit, 0xFC0C, Pair, "table.init"),
            (ElemDrop, 0xFC0D, Index, "elem.drop"),
            (TableCopy, 0xFC0E, Pair, "table.copy"),
            (TableGrow, 0xFC0F, Index, "table.grow"),
            (TableSize, 0xFC10, Index, "table.size"),
            (TableFill, 0xFC11, Index, "table.fill"),
            // Vector carrier (0xFD prefix)
            (Vector, 0xFD00, Vector, "v128"),
        }
    };
}

macro_rules! define_ops {
    ($(($name:ident, $code:literal, $shape:ident, $mnemonic:literal)),* $(,)?) => {
        #[repr(u16)]
        #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
        pub enum Op {
            $($name = $code,)*
        }

        impl Op {
            pub fn from_code(code: u16) -> Option<Op> {
                match code {
                    $($code => Some(Op::$name),)*
                    _ => None,
                }
            }

            pub fn shape(self) -> Shape {
                match self {
                    $(Op::$name => Shape::$shape,)*
                }
            }

            pub fn mnemonic(self) -> &'static str {
                match self {
                    $(Op::$name => $mnemonic,)*
                }
            }
        }
    };
}

for_each_op!(define_ops);

impl Op {
    #[inline] pub fn code(self) -> u16 { self as u16 }

    #[inline]
    pub fn from_byte(byte: u8) -> Option<Op> {
        Op::from_code(byte as u16)
    }

    /// Second byte of a 0xFC-prefixed opcode, decoded from its varint.
    #[inline]
    pub fn from_fc(sub: u32) -> Option<Op> {
        if sub > 0xFF { return None; }
        Op::from_code(0xFC00 | sub as u16)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_codes_are_stable() {
        assert_eq!(Op::Unreachable.code(), 0x00);
        assert_eq!(Op::End.code(), 0x0B);
        assert_eq!(Op::I32Const.code(), 0x41);
        assert_eq!(Op::I32Add.code(), 0x6A);
        assert_eq!(Op::I64Rotr.code(), 0x8A);
        assert_eq!(Op::RefFunc.code(), 0xD2);
        assert_eq!(Op::MemoryInit.code(), 0xFC08);
        assert_eq!(Op::TableFill.code(), 0xFC11);
        assert_eq!(Op::Vector.code(), 0xFD00);
    }

    #[test]
    fn from_code_round_trips() {
        for code in 0..=0xFFFFu16 {
            if let Some(op) = Op::from_code(code) {
                assert_eq!(op.code(), code);
            }
        }
        assert_eq!(Op::from_byte(0x6A), Some(Op::I32Add));
        assert_eq!(Op::from_byte(0x12), None);
        assert_eq!(Op::from_fc(8), Some(Op::MemoryInit));
        assert_eq!(Op::from_fc(0x12), None);
        assert_eq!(Op::from_fc(0x4000), None);
    }

    #[test]
    fn shapes_follow_the_wire_grammar() {
        assert_eq!(Op::Block.shape(), Shape::Block);
        assert_eq!(Op::BrTable.shape(), Shape::BrTable);
        assert_eq!(Op::I64Load32U.shape(), Shape::MemArg);
        assert_eq!(Op::CallIndirect.shape(), Shape::Pair);
        assert_eq!(Op::MemoryCopy.shape(), Shape::ZeroZero);
        assert_eq!(Op::RefNull.shape(), Shape::RefTy);
        assert_eq!(Op::F64Const.shape(), Shape::ConstF64);
    }
}
