use std::fmt::{Display, Formatter};

use crate::error::*;
use crate::leb128::safe_read_sleb128;

#[repr(u8)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ValType {
    I32 = 0x7f,
    I64 = 0x7e,
    F32 = 0x7d,
    F64 = 0x7c,
    V128 = 0x7b,
    FuncRef = 0x70,
    ExternRef = 0x6f,
}

impl ValType {
    #[inline]
    pub fn from_byte(byte: u8) -> Option<ValType> {
        match byte {
            0x7f => Some(ValType::I32),
            0x7e => Some(ValType::I64),
            0x7d => Some(ValType::F32),
            0x7c => Some(ValType::F64),
            0x7b => Some(ValType::V128),
            0x70 => Some(ValType::FuncRef),
            0x6f => Some(ValType::ExternRef),
            _ => None,
        }
    }

    #[inline] pub fn byte(self) -> u8 { self as u8 }
    #[inline] pub fn is_ref(self) -> bool { matches!(self, ValType::FuncRef | ValType::ExternRef) }
    #[inline] pub fn is_num(self) -> bool {
        matches!(self, ValType::I32 | ValType::I64 | ValType::F32 | ValType::F64)
    }
}

impl Display for ValType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ValType::I32 => "i32",
            ValType::I64 => "i64",
            ValType::F32 => "f32",
            ValType::F64 => "f64",
            ValType::V128 => "v128",
            ValType::FuncRef => "funcref",
            ValType::ExternRef => "externref",
        })
    }
}

#[inline(always)]
pub fn is_val_type(byte: u8) -> bool { ValType::from_byte(byte).is_some() }

#[inline(always)]
pub fn is_ref_type(byte: u8) -> bool { matches!(byte, 0x70 | 0x6f) }

/// Function signature. Equality is structural over both sequences, which
/// is exactly the check indirect calls and import matching need.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FuncType {
    pub params: Vec<ValType>,
    pub results: Vec<ValType>,
}

impl Display for FuncType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str("[")?;
        for (i, p) in self.params.iter().enumerate() {
            if i > 0 { f.write_str(" ")?; }
            write!(f, "{p}")?;
        }
        f.write_str("] -> [")?;
        for (i, r) in self.results.iter().enumerate() {
            if i > 0 { f.write_str(" ")?; }
            write!(f, "{r}")?;
        }
        f.write_str("]")
    }
}

#[repr(u8)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Mut {
    Const = 0x0,
    Var = 0x1,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct GlobalType {
    pub vtype: ValType,
    pub mutability: Mut,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Limits {
    pub min: u32,
    pub max: Option<u32>,
}

impl Limits {
    /// Import compatibility: the provided entity must promise at least as
    /// much as the declaration demands.
    pub fn subsumes(&self, declared: &Limits) -> bool {
        if self.min < declared.min { return false; }
        match declared.max {
            None => true,
            Some(dmax) => matches!(self.max, Some(amax) if amax <= dmax),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TableType {
    pub elem: ValType,
    pub limits: Limits,
}

/// Canonical block-type encoding carried in instruction operands: the raw
/// s33 from the byte stream. Negative values are the one-byte shorthands
/// (-64 is void, the rest name a single result type); non-negative values
/// index the module's function-type table.
pub const BLOCK_VOID: i64 = -64;

pub fn read_block_type(types_len: usize, bytes: &[u8], pc: &mut usize) -> Result<i64, Trap> {
    if *pc >= bytes.len() { return malformed(UNEXPECTED_END); }
    let byte = bytes[*pc];
    if byte == 0x40 || is_val_type(byte) {
        *pc += 1;
        // Shorthand bytes all have bit 6 set; as 7-bit signed values they
        // sit in [-64, -1].
        return Ok(byte as i64 - 128);
    }
    let n: i64 = safe_read_sleb128(bytes, pc, 33)?;
    if n < 0 || (n as usize) >= types_len {
        return malformed(INVALID_VALUE_TYPE);
    }
    Ok(n)
}

/// Single-result shorthand carried by a negative block type, if any.
#[inline]
pub fn block_shorthand(bt: i64) -> Option<ValType> {
    if bt == BLOCK_VOID { return None; }
    ValType::from_byte((bt & 0x7f) as u8)
}

/// (param count, result count) for a block type.
pub fn block_arity(types: &[FuncType], bt: i64) -> (usize, usize) {
    if bt < 0 {
        return if bt == BLOCK_VOID { (0, 0) } else { (0, 1) };
    }
    let ftype = &types[bt as usize];
    (ftype.params.len(), ftype.results.len())
}
