use weft::leb128::{safe_read_leb128, safe_read_sleb128, write_leb128, write_sleb128};
use weft::Trap;

fn read_u32(bytes: &[u8]) -> Result<u32, Trap> {
    let mut pc = 0;
    safe_read_leb128(bytes, &mut pc, 32)
}

fn read_i32(bytes: &[u8]) -> Result<i32, Trap> {
    let mut pc = 0;
    safe_read_sleb128(bytes, &mut pc, 32)
}

fn read_i64(bytes: &[u8]) -> Result<i64, Trap> {
    let mut pc = 0;
    safe_read_sleb128(bytes, &mut pc, 64)
}

#[test]
fn unsigned_single_and_multi_byte() {
    assert_eq!(read_u32(&[0x00]), Ok(0));
    assert_eq!(read_u32(&[0x7F]), Ok(127));
    assert_eq!(read_u32(&[0xE5, 0x8E, 0x26]), Ok(624485));
    assert_eq!(read_u32(&[0xFF, 0xFF, 0xFF, 0xFF, 0x0F]), Ok(u32::MAX));
}

#[test]
fn unsigned_advances_cursor() {
    let bytes = [0xE5, 0x8E, 0x26, 0x2A];
    let mut pc = 0;
    let first: u32 = safe_read_leb128(&bytes, &mut pc, 32).unwrap();
    assert_eq!(first, 624485);
    assert_eq!(pc, 3);
    let second: u32 = safe_read_leb128(&bytes, &mut pc, 32).unwrap();
    assert_eq!(second, 42);
    assert_eq!(pc, 4);
}

#[test]
fn unsigned_non_minimal_but_in_range_is_accepted() {
    // Padding with continuation bytes is legal as long as the total
    // length stays within ceil(bits/7).
    assert_eq!(read_u32(&[0x80, 0x00]), Ok(0));
    assert_eq!(read_u32(&[0xAA, 0x80, 0x00]), Ok(42));
}

#[test]
fn unsigned_rejects_too_long() {
    assert_eq!(
        read_u32(&[0x80, 0x80, 0x80, 0x80, 0x80, 0x01]),
        Err(Trap::Malformed("integer representation too long"))
    );
}

#[test]
fn unsigned_rejects_value_bits_beyond_width() {
    // The fifth byte of a 32-bit varint may only use its low four bits.
    assert_eq!(
        read_u32(&[0xFF, 0xFF, 0xFF, 0xFF, 0x1F]),
        Err(Trap::Malformed("integer too large"))
    );
}

#[test]
fn unsigned_rejects_truncation() {
    assert_eq!(
        read_u32(&[0x80]),
        Err(Trap::Malformed("unexpected end of section or function"))
    );
    assert_eq!(
        read_u32(&[]),
        Err(Trap::Malformed("unexpected end of section or function"))
    );
}

#[test]
fn signed_single_byte() {
    assert_eq!(read_i32(&[0x00]), Ok(0));
    assert_eq!(read_i32(&[0x3F]), Ok(63));
    assert_eq!(read_i32(&[0x40]), Ok(-64));
    assert_eq!(read_i32(&[0x7F]), Ok(-1));
}

#[test]
fn signed_extremes() {
    assert_eq!(read_i32(&[0x80, 0x80, 0x80, 0x80, 0x78]), Ok(i32::MIN));
    assert_eq!(read_i32(&[0xFF, 0xFF, 0xFF, 0xFF, 0x07]), Ok(i32::MAX));
    // Maximal-length encoding of -1 carries sign bits only.
    assert_eq!(read_i32(&[0xFF, 0xFF, 0xFF, 0xFF, 0x7F]), Ok(-1));
}

#[test]
fn signed_rejects_out_of_range() {
    // Bits 28..31 all set without sign extension puts the value past
    // i32::MAX.
    assert_eq!(
        read_i32(&[0xFF, 0xFF, 0xFF, 0xFF, 0x0F]),
        Err(Trap::Malformed("integer too large"))
    );
}

#[test]
fn signed_64_bit_final_byte_must_be_pure_sign() {
    let mut nine = vec![0xFF; 9];
    nine.push(0x7F);
    assert_eq!(read_i64(&nine), Ok(-1));

    let mut bad = vec![0xFF; 9];
    bad.push(0x01);
    assert_eq!(read_i64(&bad), Err(Trap::Malformed("integer too large")));

    let mut bad_sign = vec![0xFF; 9];
    bad_sign.push(0x41);
    assert_eq!(read_i64(&bad_sign), Err(Trap::Malformed("integer too large")));
}

#[test]
fn signed_33_bit_range() {
    let mut pc = 0;
    let v: i64 = safe_read_sleb128(&[0xFF, 0xFF, 0xFF, 0xFF, 0x0F], &mut pc, 33).unwrap();
    assert_eq!(v, (1i64 << 32) - 1);

    let mut pc = 0;
    let r: Result<i64, Trap> = safe_read_sleb128(&[0x80, 0x80, 0x80, 0x80, 0x10], &mut pc, 33);
    assert_eq!(r, Err(Trap::Malformed("integer too large")));
}

#[test]
fn writer_emits_minimal_lengths() {
    let unsigned: &[(u64, usize)] = &[
        (0, 1),
        (127, 1),
        (128, 2),
        (16383, 2),
        (16384, 3),
        (u32::MAX as u64, 5),
        (u64::MAX, 10),
    ];
    for &(value, len) in unsigned {
        let mut out = Vec::new();
        write_leb128(value, &mut out);
        assert_eq!(out.len(), len, "write_leb128({value})");
    }

    // A signed byte boundary sits where the next bit would be mistaken
    // for the sign: 63 fits in one byte, 64 does not, -64 does.
    let signed: &[(i64, usize)] = &[
        (0, 1),
        (63, 1),
        (64, 2),
        (-64, 1),
        (-65, 2),
        (8191, 2),
        (-8192, 2),
        (i32::MAX as i64, 5),
        (i32::MIN as i64, 5),
        (i64::MAX, 10),
        (i64::MIN, 10),
    ];
    for &(value, len) in signed {
        let mut out = Vec::new();
        write_sleb128(value, &mut out);
        assert_eq!(out.len(), len, "write_sleb128({value})");
    }
}

#[test]
fn writer_output_reads_back() {
    for value in [0u64, 1, 127, 128, 624485, u32::MAX as u64, u64::MAX] {
        let mut out = Vec::new();
        write_leb128(value, &mut out);
        let mut pc = 0;
        let read: u64 = safe_read_leb128(&out, &mut pc, 64).unwrap();
        assert_eq!(read, value);
        assert_eq!(pc, out.len());
    }
    for value in [0i64, 1, -1, 63, 64, -64, -65, i32::MIN as i64, i64::MAX, i64::MIN] {
        let mut out = Vec::new();
        write_sleb128(value, &mut out);
        let mut pc = 0;
        let read: i64 = safe_read_sleb128(&out, &mut pc, 64).unwrap();
        assert_eq!(read, value);
        assert_eq!(pc, out.len());
    }
}
