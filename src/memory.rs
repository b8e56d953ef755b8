use crate::error::*;
use crate::types::Limits;

macro_rules! impl_unsigned {
    ($type:ty, $size:literal, $load_name:ident, $store_name:ident) => {
        #[inline(always)]
        pub fn $load_name(&self, ptr: u32, offset: u32) -> Result<$type, Trap> {
            let addr = ptr as u64 + offset as u64;
            if addr + $size > self.data.len() as u64 { return runtime(OOB_MEMORY_ACCESS); }
            let addr = addr as usize;
            let mut buf = [0u8; $size];
            buf.copy_from_slice(&self.data[addr..addr + $size]);
            Ok(<$type>::from_le_bytes(buf))
        }
        #[inline(always)]
        pub fn $store_name(&mut self, ptr: u32, offset: u32, v: $type) -> Result<(), Trap> {
            let addr = ptr as u64 + offset as u64;
            if addr + $size > self.data.len() as u64 { return runtime(OOB_MEMORY_ACCESS); }
            let addr = addr as usize;
            self.data[addr..addr + $size].copy_from_slice(&v.to_le_bytes());
            Ok(())
        }
    };
}

macro_rules! impl_signed_load {
    ($name:ident, $target:ty, $source:ident) => {
        #[inline(always)]
        pub fn $name(&self, ptr: u32, offset: u32) -> Result<$target, Trap> {
            Ok(self.$source(ptr, offset)? as $target)
        }
    };
}

pub struct Memory {
    data: Vec<u8>,
    maximum: Option<u32>,
}

impl Memory {
    pub const PAGE_SIZE: u32 = 65536;
    /// Runtime growth stops here even when the declared maximum is larger;
    /// the format-level 65536-page limit applies only at decode time.
    pub const MAX_GROW_PAGES: u32 = 0x7FFF;

    pub fn new(limits: Limits) -> Self {
        Self {
            data: vec![0; limits.min as usize * Self::PAGE_SIZE as usize],
            maximum: limits.max,
        }
    }

    /// Current size in pages.
    pub fn size(&self) -> u32 {
        (self.data.len() / Self::PAGE_SIZE as usize) as u32
    }

    /// Current type, with the live size as the minimum.
    pub fn limits(&self) -> Limits {
        Limits { min: self.size(), max: self.maximum }
    }

    /// Grows by `delta` pages, returning the old page count, or u32::MAX
    /// without mutating anything when the request cannot be satisfied.
    pub fn grow(&mut self, delta: u32) -> u32 {
        let old = self.size();
        if delta == 0 { return old; }
        let ceiling = self.maximum.unwrap_or(u32::MAX).min(Self::MAX_GROW_PAGES);
        if delta > ceiling.saturating_sub(old) { return u32::MAX; }
        self.data.resize((old + delta) as usize * Self::PAGE_SIZE as usize, 0);
        old
    }

    impl_unsigned!(u8,  1, load_u8, store_u8);    impl_unsigned!(u16, 2, load_u16, store_u16);
    impl_unsigned!(u32, 4, load_u32, store_u32);  impl_unsigned!(u64, 8, load_u64, store_u64);
    impl_signed_load!(load_i8,  i8,  load_u8);    impl_signed_load!(load_i16, i16, load_u16);
    impl_signed_load!(load_i32, i32, load_u32);   impl_signed_load!(load_i64, i64, load_u64);

    #[inline(always)]
    pub fn load_f32(&self, ptr: u32, offset: u32) -> Result<f32, Trap> {
        Ok(f32::from_bits(self.load_u32(ptr, offset)?))
    }
    #[inline(always)]
    pub fn store_f32(&mut self, ptr: u32, offset: u32, v: f32) -> Result<(), Trap> {
        self.store_u32(ptr, offset, v.to_bits())
    }
    #[inline(always)]
    pub fn load_f64(&self, ptr: u32, offset: u32) -> Result<f64, Trap> {
        Ok(f64::from_bits(self.load_u64(ptr, offset)?))
    }
    #[inline(always)]
    pub fn store_f64(&mut self, ptr: u32, offset: u32, v: f64) -> Result<(), Trap> {
        self.store_u64(ptr, offset, v.to_bits())
    }

    /// memory.fill. Bounds are verified before any byte is written.
    pub fn fill(&mut self, dst: u32, val: u8, n: u32) -> Result<(), Trap> {
        let end = dst as u64 + n as u64;
        if end > self.data.len() as u64 { return runtime(OOB_MEMORY_ACCESS); }
        self.data[dst as usize..end as usize].fill(val);
        Ok(())
    }

    /// memory.copy; overlapping ranges move correctly.
    pub fn copy(&mut self, dst: u32, src: u32, n: u32) -> Result<(), Trap> {
        let len = self.data.len() as u64;
        if dst as u64 + n as u64 > len || src as u64 + n as u64 > len {
            return runtime(OOB_MEMORY_ACCESS);
        }
        self.data.copy_within(src as usize..(src as u64 + n as u64) as usize, dst as usize);
        Ok(())
    }

    /// memory.init from a data segment slice.
    pub fn init(&mut self, dst: u32, data: &[u8], src: u32, n: u32) -> Result<(), Trap> {
        if src as u64 + n as u64 > data.len() as u64 { return runtime(OOB_MEMORY_ACCESS); }
        if dst as u64 + n as u64 > self.data.len() as u64 { return runtime(OOB_MEMORY_ACCESS); }
        self.data[dst as usize..dst as usize + n as usize]
            .copy_from_slice(&data[src as usize..src as usize + n as usize]);
        Ok(())
    }

    pub fn write_bytes(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Trap> {
        let end = offset as u64 + bytes.len() as u64;
        if end > self.data.len() as u64 { return runtime(OOB_MEMORY_ACCESS); }
        self.data[offset as usize..end as usize].copy_from_slice(bytes);
        Ok(())
    }

    pub fn read_bytes(&self, offset: u32, len: u32) -> Result<&[u8], Trap> {
        let end = offset as u64 + len as u64;
        if end > self.data.len() as u64 { return runtime(OOB_MEMORY_ACCESS); }
        Ok(&self.data[offset as usize..end as usize])
    }

    /// UTF-8 view of guest memory, for host functions taking strings.
    pub fn read_string(&self, offset: u32, len: u32) -> Result<&str, Trap> {
        std::str::from_utf8(self.read_bytes(offset, len)?)
            .map_err(|_| Trap::Runtime(INVALID_UTF8))
    }

    pub fn write_string(&mut self, offset: u32, s: &str) -> Result<(), Trap> {
        self.write_bytes(offset, s.as_bytes())
    }
}
