//! Shared helpers for assembling module bytes directly. Every section is
//! built by hand so tests control the exact encoding, including the
//! malformed ones.
#![allow(dead_code)]

use std::rc::Rc;
use weft::leb128::{write_leb128, write_sleb128};
use weft::{instantiate, Machine, Module, ModuleInstance, Trap, Value};

pub const I32: u8 = 0x7F;
pub const I64: u8 = 0x7E;
pub const F32: u8 = 0x7D;
pub const F64: u8 = 0x7C;
pub const FUNCREF: u8 = 0x70;
pub const EXTERNREF: u8 = 0x6F;

pub const END: u8 = 0x0B;

pub fn leb(v: u64) -> Vec<u8> {
    let mut out = Vec::new();
    write_leb128(v, &mut out);
    out
}

pub fn sleb(v: i64) -> Vec<u8> {
    let mut out = Vec::new();
    write_sleb128(v, &mut out);
    out
}

/// `i32.const v` as bytes.
pub fn i32c(v: i32) -> Vec<u8> {
    let mut out = vec![0x41];
    out.extend(sleb(v as i64));
    out
}

/// `i64.const v` as bytes.
pub fn i64c(v: i64) -> Vec<u8> {
    let mut out = vec![0x42];
    out.extend(sleb(v));
    out
}

/// `f32.const v` as bytes.
pub fn f32c(v: f32) -> Vec<u8> {
    let mut out = vec![0x43];
    out.extend_from_slice(&v.to_le_bytes());
    out
}

/// `f64.const v` as bytes.
pub fn f64c(v: f64) -> Vec<u8> {
    let mut out = vec![0x44];
    out.extend_from_slice(&v.to_le_bytes());
    out
}

/// Concatenates byte fragments into one body.
pub fn cat(parts: &[&[u8]]) -> Vec<u8> {
    let mut out = Vec::new();
    for part in parts {
        out.extend_from_slice(part);
    }
    out
}

fn name(out: &mut Vec<u8>, s: &str) {
    out.extend(leb(s.len() as u64));
    out.extend_from_slice(s.as_bytes());
}

fn limits(out: &mut Vec<u8>, min: u32, max: Option<u32>) {
    match max {
        Some(max) => {
            out.push(0x01);
            out.extend(leb(min as u64));
            out.extend(leb(max as u64));
        }
        None => {
            out.push(0x00);
            out.extend(leb(min as u64));
        }
    }
}

/// Assembles one module from individually encoded section entries.
/// Sections are emitted in the mandatory order, each one only when it
/// has content.
#[derive(Default)]
pub struct ModuleBuilder {
    types: Vec<Vec<u8>>,
    imports: Vec<Vec<u8>>,
    funcs: Vec<u32>,
    tables: Vec<Vec<u8>>,
    memories: Vec<Vec<u8>>,
    globals: Vec<Vec<u8>>,
    exports: Vec<Vec<u8>>,
    start: Option<u32>,
    elems: Vec<Vec<u8>>,
    data_count: Option<u32>,
    code: Vec<Vec<u8>>,
    datas: Vec<Vec<u8>>,
}

impl ModuleBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_type(&mut self, params: &[u8], results: &[u8]) -> u32 {
        let mut t = vec![0x60];
        t.extend(leb(params.len() as u64));
        t.extend_from_slice(params);
        t.extend(leb(results.len() as u64));
        t.extend_from_slice(results);
        self.types.push(t);
        (self.types.len() - 1) as u32
    }

    pub fn import_func(&mut self, module: &str, field: &str, type_idx: u32) {
        let mut entry = Vec::new();
        name(&mut entry, module);
        name(&mut entry, field);
        entry.push(0x00);
        entry.extend(leb(type_idx as u64));
        self.imports.push(entry);
    }

    pub fn import_table(&mut self, module: &str, field: &str, elem: u8, min: u32, max: Option<u32>) {
        let mut entry = Vec::new();
        name(&mut entry, module);
        name(&mut entry, field);
        entry.push(0x01);
        entry.push(elem);
        limits(&mut entry, min, max);
        self.imports.push(entry);
    }

    pub fn import_memory(&mut self, module: &str, field: &str, min: u32, max: Option<u32>) {
        let mut entry = Vec::new();
        name(&mut entry, module);
        name(&mut entry, field);
        entry.push(0x02);
        limits(&mut entry, min, max);
        self.imports.push(entry);
    }

    pub fn import_global(&mut self, module: &str, field: &str, vtype: u8, mutable: bool) {
        let mut entry = Vec::new();
        name(&mut entry, module);
        name(&mut entry, field);
        entry.push(0x03);
        entry.push(vtype);
        entry.push(mutable as u8);
        self.imports.push(entry);
    }

    /// Adds a module-local function. `locals` is run-length encoded as in
    /// the binary format; `body` must end with END.
    pub fn add_func(&mut self, type_idx: u32, locals: &[(u32, u8)], body: &[u8]) {
        self.funcs.push(type_idx);
        let mut code = leb(locals.len() as u64);
        for (count, ty) in locals {
            code.extend(leb(*count as u64));
            code.push(*ty);
        }
        code.extend_from_slice(body);
        let mut sized = leb(code.len() as u64);
        sized.extend(code);
        self.code.push(sized);
    }

    pub fn add_table(&mut self, elem: u8, min: u32, max: Option<u32>) {
        let mut entry = vec![elem];
        limits(&mut entry, min, max);
        self.tables.push(entry);
    }

    pub fn add_memory(&mut self, min: u32, max: Option<u32>) {
        let mut entry = Vec::new();
        limits(&mut entry, min, max);
        self.memories.push(entry);
    }

    /// `init` must be a full constant expression ending with END.
    pub fn add_global(&mut self, vtype: u8, mutable: bool, init: &[u8]) {
        let mut entry = vec![vtype, mutable as u8];
        entry.extend_from_slice(init);
        self.globals.push(entry);
    }

    fn export(&mut self, field: &str, kind: u8, idx: u32) {
        let mut entry = Vec::new();
        name(&mut entry, field);
        entry.push(kind);
        entry.extend(leb(idx as u64));
        self.exports.push(entry);
    }

    pub fn export_func(&mut self, field: &str, idx: u32) {
        self.export(field, 0x00, idx);
    }

    pub fn export_table(&mut self, field: &str, idx: u32) {
        self.export(field, 0x01, idx);
    }

    pub fn export_memory(&mut self, field: &str, idx: u32) {
        self.export(field, 0x02, idx);
    }

    pub fn export_global(&mut self, field: &str, idx: u32) {
        self.export(field, 0x03, idx);
    }

    pub fn set_start(&mut self, func_idx: u32) {
        self.start = Some(func_idx);
    }

    /// Active segment in table 0; `offset` is a full constant expression.
    pub fn elem_active(&mut self, offset: &[u8], funcs: &[u32]) {
        let mut entry = vec![0x00];
        entry.extend_from_slice(offset);
        entry.extend(leb(funcs.len() as u64));
        for f in funcs {
            entry.extend(leb(*f as u64));
        }
        self.elems.push(entry);
    }

    pub fn elem_passive(&mut self, funcs: &[u32]) {
        let mut entry = vec![0x01, 0x00];
        entry.extend(leb(funcs.len() as u64));
        for f in funcs {
            entry.extend(leb(*f as u64));
        }
        self.elems.push(entry);
    }

    pub fn elem_declared(&mut self, funcs: &[u32]) {
        let mut entry = vec![0x03, 0x00];
        entry.extend(leb(funcs.len() as u64));
        for f in funcs {
            entry.extend(leb(*f as u64));
        }
        self.elems.push(entry);
    }

    /// Raw segment entry for the exotic encodings.
    pub fn elem_raw(&mut self, entry: Vec<u8>) {
        self.elems.push(entry);
    }

    pub fn data_active(&mut self, offset: &[u8], bytes: &[u8]) {
        let mut entry = vec![0x00];
        entry.extend_from_slice(offset);
        entry.extend(leb(bytes.len() as u64));
        entry.extend_from_slice(bytes);
        self.datas.push(entry);
    }

    pub fn data_passive(&mut self, bytes: &[u8]) {
        let mut entry = vec![0x01];
        entry.extend(leb(bytes.len() as u64));
        entry.extend_from_slice(bytes);
        self.datas.push(entry);
    }

    /// Emits a data count section. Required whenever code uses
    /// memory.init or data.drop.
    pub fn set_data_count(&mut self, count: u32) {
        self.data_count = Some(count);
    }

    fn vec_section(out: &mut Vec<u8>, id: u8, entries: &[Vec<u8>]) {
        if entries.is_empty() {
            return;
        }
        let mut payload = leb(entries.len() as u64);
        for entry in entries {
            payload.extend_from_slice(entry);
        }
        section(out, id, &payload);
    }

    pub fn build(&self) -> Vec<u8> {
        let mut out = vec![0x00, 0x61, 0x73, 0x6D, 0x01, 0x00, 0x00, 0x00];
        Self::vec_section(&mut out, 1, &self.types);
        Self::vec_section(&mut out, 2, &self.imports);
        if !self.funcs.is_empty() {
            let mut payload = leb(self.funcs.len() as u64);
            for f in &self.funcs {
                payload.extend(leb(*f as u64));
            }
            section(&mut out, 3, &payload);
        }
        Self::vec_section(&mut out, 4, &self.tables);
        Self::vec_section(&mut out, 5, &self.memories);
        Self::vec_section(&mut out, 6, &self.globals);
        Self::vec_section(&mut out, 7, &self.exports);
        if let Some(start) = self.start {
            section(&mut out, 8, &leb(start as u64));
        }
        Self::vec_section(&mut out, 9, &self.elems);
        if let Some(count) = self.data_count {
            section(&mut out, 12, &leb(count as u64));
        }
        Self::vec_section(&mut out, 10, &self.code);
        Self::vec_section(&mut out, 11, &self.datas);
        out
    }
}

pub fn section(out: &mut Vec<u8>, id: u8, payload: &[u8]) {
    out.push(id);
    out.extend(leb(payload.len() as u64));
    out.extend_from_slice(payload);
}

/// Decode and instantiate, panicking on failure.
pub fn boot(machine: &mut Machine, bytes: &[u8]) -> Rc<ModuleInstance> {
    let module = Module::decode(bytes).unwrap();
    instantiate(machine, module).unwrap()
}

/// One-shot invoke on a fresh machine.
pub fn invoke1(bytes: &[u8], func: &str, args: &[Value]) -> Result<Vec<Value>, Trap> {
    let mut machine = Machine::new();
    let module = Module::decode(bytes)?;
    let instance = instantiate(&mut machine, module)?;
    machine.invoke(&instance, func, args)
}

/// Builds a module with a single exported function `f` of the given
/// signature and body.
pub fn single_func(params: &[u8], results: &[u8], locals: &[(u32, u8)], body: &[u8]) -> Vec<u8> {
    let mut b = ModuleBuilder::new();
    let ty = b.add_type(params, results);
    b.add_func(ty, locals, body);
    b.export_func("f", 0);
    b.build()
}
