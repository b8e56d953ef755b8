use crate::error::*;
use crate::types::{Limits, TableType, ValType};
use crate::value::Value;

/// Reference-typed array with the same trap-on-bounds contract as linear
/// memory. Elements are funcref or externref Values; fresh slots are null.
pub struct Table {
    elem: ValType,
    elements: Vec<Value>,
    maximum: Option<u32>,
}

impl Table {
    pub fn new(ttype: TableType) -> Self {
        Self {
            elem: ttype.elem,
            elements: vec![Value::NULL; ttype.limits.min as usize],
            maximum: ttype.limits.max,
        }
    }

    pub fn elem_type(&self) -> ValType { self.elem }

    pub fn size(&self) -> u32 { self.elements.len() as u32 }

    pub fn ttype(&self) -> TableType {
        TableType {
            elem: self.elem,
            limits: Limits { min: self.size(), max: self.maximum },
        }
    }

    pub fn get(&self, idx: u32) -> Result<Value, Trap> {
        match self.elements.get(idx as usize) {
            Some(v) => Ok(*v),
            None => runtime(OOB_TABLE_ACCESS),
        }
    }

    pub fn set(&mut self, idx: u32, v: Value) -> Result<(), Trap> {
        match self.elements.get_mut(idx as usize) {
            Some(slot) => {
                *slot = v;
                Ok(())
            }
            None => runtime(OOB_TABLE_ACCESS),
        }
    }

    /// Returns the old element count, or u32::MAX without mutating when
    /// the request exceeds the declared maximum.
    pub fn grow(&mut self, delta: u32, init: Value) -> u32 {
        let old = self.size();
        if delta == 0 { return old; }
        let ceiling = self.maximum.unwrap_or(u32::MAX);
        if delta > ceiling.saturating_sub(old) { return u32::MAX; }
        let new_len = old as u64 + delta as u64;
        if new_len > u32::MAX as u64 { return u32::MAX; }
        self.elements.resize(new_len as usize, init);
        old
    }

    pub fn fill(&mut self, dst: u32, val: Value, n: u32) -> Result<(), Trap> {
        let end = dst as u64 + n as u64;
        if end > self.elements.len() as u64 { return runtime(OOB_TABLE_ACCESS); }
        self.elements[dst as usize..end as usize].fill(val);
        Ok(())
    }

    pub fn copy_within(&mut self, dst: u32, src: u32, n: u32) -> Result<(), Trap> {
        let len = self.elements.len() as u64;
        if dst as u64 + n as u64 > len || src as u64 + n as u64 > len {
            return runtime(OOB_TABLE_ACCESS);
        }
        self.elements.copy_within(src as usize..(src as u64 + n as u64) as usize, dst as usize);
        Ok(())
    }

    pub fn window(&self, start: u32, n: u32) -> Result<&[Value], Trap> {
        let end = start as u64 + n as u64;
        if end > self.elements.len() as u64 { return runtime(OOB_TABLE_ACCESS); }
        Ok(&self.elements[start as usize..end as usize])
    }

    /// table.init from a materialized element segment.
    pub fn init(&mut self, dst: u32, elems: &[Value], src: u32, n: u32) -> Result<(), Trap> {
        if src as u64 + n as u64 > elems.len() as u64 { return runtime(OOB_TABLE_ACCESS); }
        if dst as u64 + n as u64 > self.elements.len() as u64 { return runtime(OOB_TABLE_ACCESS); }
        self.elements[dst as usize..dst as usize + n as usize]
            .copy_from_slice(&elems[src as usize..src as usize + n as usize]);
        Ok(())
    }
}
