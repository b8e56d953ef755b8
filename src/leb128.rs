use crate::error::Trap::*;
use crate::error::*;

#[inline]
pub fn safe_read_leb128<T>(bytes: &[u8], pc: &mut usize, bits: u8) -> Result<T, Trap>
where T: TryFrom<u64> {
    let mut result: u64 = 0;
    let mut shift: u32 = 0;
    let mut end = *pc;
    loop {
        if end >= bytes.len() { return Err(Malformed(UNEXPECTED_END)); }
        let byte = bytes[end];
        end += 1;
        if shift < 64 {
            result |= ((byte & 0x7f) as u64) << shift;
        }
        if byte & 0x80 == 0 { break; }
        shift += 7;
    }
    let consumed = end - *pc;
    if consumed > (bits as usize).div_ceil(7) { return Err(Malformed(INT_TOO_LONG)); }
    if bits < 64 && (result >> bits) != 0 { return Err(Malformed(INT_TOO_LARGE)); }

    // The final byte may only carry value bits below `bits`.
    if consumed > 1 {
        let used = (consumed - 1) * 7;
        if used < bits as usize {
            let rem = bits as usize - used;
            if rem < 8 && (bytes[end - 1] as u32) >> rem != 0 { return Err(Malformed(INT_TOO_LARGE)); }
        }
    }
    *pc = end;
    T::try_from(result).map_err(|_| Malformed(INT_TOO_LARGE))
}

#[inline]
pub fn safe_read_sleb128<T>(bytes: &[u8], pc: &mut usize, bits: u8) -> Result<T, Trap>
where T: TryFrom<i64> {
    let mut result: i64 = 0;
    let mut shift: u32 = 0;
    let mut end = *pc;
    let mut byte: u8;
    loop {
        if end >= bytes.len() { return Err(Malformed(UNEXPECTED_END)); }
        byte = bytes[end];
        end += 1;
        if shift < 63 {
            result |= ((byte & 0x7f) as i64) << shift;
        }
        shift = (shift + 7).min(63);
        if byte & 0x80 == 0 { break; }
    }
    if (byte & 0x40) != 0 {
        result |= (!0i64).checked_shl(shift).unwrap_or(0);
    }
    let consumed = end - *pc;
    if consumed > (bits as usize).div_ceil(7) { return Err(Malformed(INT_TOO_LONG)); }

    match bits { // Only bits=32, 33, 64 are used
        32 => {
            if result < i32::MIN as i64 || result > i32::MAX as i64 { return Err(Malformed(INT_TOO_LARGE)); }
        }
        33 => {
            const MIN_S33: i64 = -(1i64 << 32);
            const MAX_S33: i64 = (1i64 << 32) - 1;
            if !(MIN_S33..=MAX_S33).contains(&result) { return Err(Malformed(INT_TOO_LARGE)); }
        }
        64 => {} // Already i64
        _ => unreachable!(),
    }

    // A maximal-length encoding leaves nothing but sign bits in the last byte.
    if consumed >= 1 {
        let last = bytes[end - 1];
        if ((last != 0 && last != 127) as usize + (consumed - 1) * 7) >= bits as usize {
            return Err(Malformed(INT_TOO_LARGE));
        }
    }
    *pc = end;
    T::try_from(result).map_err(|_| Malformed(INT_TOO_LARGE))
}

pub fn write_leb128(mut value: u64, out: &mut Vec<u8>) {
    loop {
        let mut byte = (value & 0x7f) as u8;
        value >>= 7;
        if value != 0 { byte |= 0x80; }
        out.push(byte);
        if value == 0 { return; }
    }
}

pub fn write_sleb128(mut value: i64, out: &mut Vec<u8>) {
    loop {
        let mut byte = (value & 0x7f) as u8;
        value >>= 7;
        let done = (value == 0 && byte & 0x40 == 0) || (value == -1 && byte & 0x40 != 0);
        if !done { byte |= 0x80; }
        out.push(byte);
        if done { return; }
    }
}
