use crate::types::ValType;

/// Untagged 16-byte slot. The low lane carries numeric payloads and
/// reference addresses; the high lane carries a reference-type tag, a
/// block-type encoding, or the packed IF target pair. Which reading is
/// valid is instruction context, established by validation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Value {
    lo: u64,
    hi: u64,
}

const _: () = assert!(std::mem::size_of::<Value>() == 16);

impl Value {
    pub const NULL: Self = Self { lo: 0, hi: 0 };

    #[inline] pub fn from_i32(v: i32) -> Self { Self { lo: v as u32 as u64, hi: 0 } }
    #[inline] pub fn as_i32(self) -> i32 { self.lo as u32 as i32 }
    #[inline] pub fn from_u32(v: u32) -> Self { Self { lo: v as u64, hi: 0 } }
    #[inline] pub fn as_u32(self) -> u32 { self.lo as u32 }
    #[inline] pub fn from_i64(v: i64) -> Self { Self { lo: v as u64, hi: 0 } }
    #[inline] pub fn as_i64(self) -> i64 { self.lo as i64 }
    #[inline] pub fn from_u64(v: u64) -> Self { Self { lo: v, hi: 0 } }
    #[inline] pub fn as_u64(self) -> u64 { self.lo }
    #[inline] pub fn from_f32_bits(bits: u32) -> Self { Self { lo: bits as u64, hi: 0 } }
    #[inline] pub fn as_f32_bits(self) -> u32 { self.lo as u32 }
    #[inline] pub fn from_f64_bits(bits: u64) -> Self { Self { lo: bits, hi: 0 } }
    #[inline] pub fn as_f64_bits(self) -> u64 { self.lo }
    #[inline] pub fn from_f32(v: f32) -> Self { Self::from_f32_bits(v.to_bits()) }
    #[inline] pub fn as_f32(self) -> f32 { f32::from_bits(self.as_f32_bits()) }
    #[inline] pub fn from_f64(v: f64) -> Self { Self::from_f64_bits(v.to_bits()) }
    #[inline] pub fn as_f64(self) -> f64 { f64::from_bits(self.as_f64_bits()) }

    /// Non-null reference to a machine address. The tag keeps address 0
    /// distinguishable from the null encoding.
    #[inline]
    pub fn from_ref(addr: usize, kind: ValType) -> Self {
        Self { lo: addr as u64, hi: kind.byte() as u64 }
    }
    #[inline] pub fn is_null(self) -> bool { self.lo == 0 && self.hi == 0 }
    #[inline] pub fn ref_addr(self) -> usize { self.lo as usize }

    // Flattened-instruction operand encodings.
    #[inline]
    pub fn block_operand(target: usize, block_type: i64) -> Self {
        Self { lo: target as u64, hi: block_type as u64 }
    }
    #[inline] pub fn jump_target(self) -> usize { self.lo as usize }
    #[inline] pub fn block_type(self) -> i64 { self.hi as i64 }

    #[inline]
    pub fn if_operand(block_type: i64, else_target: usize, end_target: usize) -> Self {
        Self { lo: block_type as u64, hi: (end_target as u64) << 32 | else_target as u64 }
    }
    #[inline] pub fn if_block_type(self) -> i64 { self.lo as i64 }
    #[inline] pub fn if_targets(self) -> (usize, usize) {
        ((self.hi & 0xFFFF_FFFF) as usize, (self.hi >> 32) as usize)
    }
    /// Patch form used while the construct is still open.
    #[inline]
    pub fn set_if_targets(&mut self, else_target: usize, end_target: usize) {
        self.hi = (end_target as u64) << 32 | else_target as u64;
    }

    #[inline]
    pub fn mem_operand(offset: u32, align: u32) -> Self {
        Self { lo: offset as u64, hi: align as u64 }
    }
    #[inline] pub fn mem_offset(self) -> u32 { self.lo as u32 }
    #[inline] pub fn mem_align(self) -> u32 { self.hi as u32 }

    #[inline]
    pub fn pair_operand(a: u32, b: u32) -> Self {
        Self { lo: a as u64, hi: b as u64 }
    }
    #[inline] pub fn first(self) -> u32 { self.lo as u32 }
    #[inline] pub fn second(self) -> u32 { self.hi as u32 }
}
