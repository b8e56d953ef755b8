//! Binary module decoder.
//!
//! Parses the container format (magic, version, ordered sections) into a
//! read-only [`Module`]. Function bodies and every constant expression
//! are flattened here, so nothing downstream touches raw bytes again.

use std::rc::Rc;

use nohash_hasher::IntSet;

use crate::error::Trap::*;
use crate::error::*;
use crate::instr::{flatten, FlatCode};
use crate::leb128::*;
use crate::opcode::Op;
use crate::types::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExternKind {
    Func = 0,
    Table = 1,
    Mem = 2,
    Global = 3,
}

impl ExternKind {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(ExternKind::Func),
            1 => Some(ExternKind::Table),
            2 => Some(ExternKind::Mem),
            3 => Some(ExternKind::Global),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ImportDesc {
    Func(u32),
    Table(TableType),
    Mem(Limits),
    Global(GlobalType),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Import {
    pub module: String,
    pub field: String,
    pub desc: ImportDesc,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Export {
    pub name: String,
    pub kind: ExternKind,
    pub idx: u32,
}

/// Body of a module-local function. `locals` holds the declared extras
/// only; parameters come from the signature.
#[derive(Debug, Clone, PartialEq)]
pub struct FuncBody {
    pub locals: Vec<ValType>,
    pub code: Rc<FlatCode>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GlobalDecl {
    pub gtype: GlobalType,
    pub init: Option<Rc<FlatCode>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ElemMode {
    Active { table: u32, offset: Rc<FlatCode> },
    Passive,
    Declarative,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ElemItems {
    Funcs(Vec<u32>),
    Exprs(Vec<Rc<FlatCode>>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ElemDecl {
    pub etype: ValType,
    pub mode: ElemMode,
    pub items: ElemItems,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DataMode {
    Active { memory: u32, offset: Rc<FlatCode> },
    Passive,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DataDecl {
    pub mode: DataMode,
    pub bytes: Vec<u8>,
}

/// Decoded module. Index spaces (funcs/tables/memories/globals) list
/// imports first, in declared order, then module-local definitions.
#[derive(Debug, PartialEq)]
pub struct Module {
    pub types: Vec<FuncType>,
    pub imports: Vec<Import>,
    /// Type index of every function in the index space.
    pub funcs: Vec<u32>,
    /// Bodies of the module-local functions, aligned after the imports.
    pub func_bodies: Vec<FuncBody>,
    pub tables: Vec<TableType>,
    pub memories: Vec<Limits>,
    pub globals: Vec<GlobalDecl>,
    pub exports: Vec<Export>,
    pub start: Option<u32>,
    pub elems: Vec<ElemDecl>,
    pub datas: Vec<DataDecl>,
    pub data_count: Option<u32>,
    /// Functions legally referenceable by `ref.func` in code.
    pub declared_funcs: IntSet<u32>,
    pub num_imported_funcs: usize,
    pub num_imported_tables: usize,
    pub num_imported_mems: usize,
    pub num_imported_globals: usize,
}

const MAGIC: [u8; 4] = [0x00, 0x61, 0x73, 0x6D];
const VERSION: u32 = 1;

impl Module {
    pub const MAX_PAGES: u32 = 65536;
    pub const MAX_LOCALS: usize = 50000;

    pub fn decode(bytes: &[u8]) -> Result<Self, Trap> {
        let mut m = Module {
            types: Vec::new(),
            imports: Vec::new(),
            funcs: Vec::new(),
            func_bodies: Vec::new(),
            tables: Vec::new(),
            memories: Vec::new(),
            globals: Vec::new(),
            exports: Vec::new(),
            start: None,
            elems: Vec::new(),
            datas: Vec::new(),
            data_count: None,
            declared_funcs: IntSet::default(),
            num_imported_funcs: 0,
            num_imported_tables: 0,
            num_imported_mems: 0,
            num_imported_globals: 0,
        };
        m.read_all(bytes)?;
        Ok(m)
    }

    fn read_all(&mut self, bytes: &[u8]) -> Result<(), Trap> {
        if bytes.len() < 4 { return malformed(UNEXPECTED_END_SHORT); }
        if bytes[0..4] != MAGIC { return malformed(NO_MAGIC_HEADER); }
        if bytes.len() < 8 { return malformed(UNEXPECTED_END_SHORT); }
        if u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]) != VERSION {
            return malformed(UNKNOWN_BINARY_VERSION);
        }

        let mut pc = 8usize;
        let mut last_rank = 0u8;
        while pc < bytes.len() {
            let id = bytes[pc];
            pc += 1;
            let length: u32 = safe_read_leb128(bytes, &mut pc, 32)?;
            let end = pc + length as usize;
            if end > bytes.len() { return malformed(LENGTH_OUT_OF_BOUNDS); }

            if id == 0 {
                // Custom sections carry a name we must still be able to read.
                read_name(bytes, &mut pc)?;
                if pc > end { return malformed(SECTION_SIZE_MISMATCH); }
                pc = end;
                continue;
            }

            let rank = section_rank(id).ok_or(Malformed(INVALID_SECTION_ID))?;
            if rank <= last_rank { return malformed(SECTION_OUT_OF_ORDER); }
            last_rank = rank;

            match id {
                1 => self.read_type_section(bytes, &mut pc)?,
                2 => self.read_import_section(bytes, &mut pc)?,
                3 => self.read_function_section(bytes, &mut pc)?,
                4 => self.read_table_section(bytes, &mut pc)?,
                5 => self.read_memory_section(bytes, &mut pc)?,
                6 => self.read_global_section(bytes, &mut pc)?,
                7 => self.read_export_section(bytes, &mut pc)?,
                8 => self.read_start_section(bytes, &mut pc)?,
                9 => self.read_element_section(bytes, &mut pc)?,
                10 => self.read_code_section(&bytes[..end], &mut pc)?,
                11 => self.read_data_section(bytes, &mut pc)?,
                12 => self.read_data_count_section(bytes, &mut pc)?,
                _ => unreachable!(),
            }
            if pc != end { return malformed(SECTION_SIZE_MISMATCH); }
        }

        if let Some(count) = self.data_count {
            if count as usize != self.datas.len() {
                return malformed(DATA_COUNT_INCONSISTENT);
            }
        }
        Ok(())
    }

    fn read_type_section(&mut self, bytes: &[u8], pc: &mut usize) -> Result<(), Trap> {
        let count: u32 = safe_read_leb128(bytes, pc, 32)?;
        self.types.reserve_exact(count as usize);
        for _ in 0..count {
            if read_u8(bytes, pc)? != 0x60 { return malformed(INT_TOO_LONG); }
            let params = read_valtype_vec(bytes, pc)?;
            let results = read_valtype_vec(bytes, pc)?;
            self.types.push(FuncType { params, results });
        }
        Ok(())
    }

    fn read_import_section(&mut self, bytes: &[u8], pc: &mut usize) -> Result<(), Trap> {
        let count: u32 = safe_read_leb128(bytes, pc, 32)?;
        for _ in 0..count {
            let module = read_name(bytes, pc)?;
            let field = read_name(bytes, pc)?;
            let kind = ExternKind::from_byte(read_u8(bytes, pc)?)
                .ok_or(Malformed(MALFORMED_IMPORT_KIND))?;

            let desc = match kind {
                ExternKind::Func => {
                    let type_idx: u32 = safe_read_leb128(bytes, pc, 32)?;
                    if type_idx as usize >= self.types.len() {
                        return validation(UNKNOWN_TYPE);
                    }
                    self.funcs.push(type_idx);
                    self.num_imported_funcs += 1;
                    ImportDesc::Func(type_idx)
                }
                ExternKind::Table => {
                    let ttype = read_table_type(bytes, pc)?;
                    self.tables.push(ttype);
                    self.num_imported_tables += 1;
                    ImportDesc::Table(ttype)
                }
                ExternKind::Mem => {
                    let limits = read_memory_limits(bytes, pc)?;
                    self.memories.push(limits);
                    if self.memories.len() > 1 { return validation(MULTIPLE_MEMORIES); }
                    self.num_imported_mems += 1;
                    ImportDesc::Mem(limits)
                }
                ExternKind::Global => {
                    let gtype = read_global_type(bytes, pc)?;
                    self.globals.push(GlobalDecl { gtype, init: None });
                    self.num_imported_globals += 1;
                    ImportDesc::Global(gtype)
                }
            };
            self.imports.push(Import { module, field, desc });
        }
        Ok(())
    }

    fn read_function_section(&mut self, bytes: &[u8], pc: &mut usize) -> Result<(), Trap> {
        let count: u32 = safe_read_leb128(bytes, pc, 32)?;
        self.funcs.reserve(count as usize);
        for _ in 0..count {
            let type_idx: u32 = safe_read_leb128(bytes, pc, 32)?;
            if type_idx as usize >= self.types.len() { return validation(UNKNOWN_TYPE); }
            self.funcs.push(type_idx);
        }
        Ok(())
    }

    fn read_table_section(&mut self, bytes: &[u8], pc: &mut usize) -> Result<(), Trap> {
        let count: u32 = safe_read_leb128(bytes, pc, 32)?;
        for _ in 0..count {
            let ttype = read_table_type(bytes, pc)?;
            self.tables.push(ttype);
        }
        Ok(())
    }

    fn read_memory_section(&mut self, bytes: &[u8], pc: &mut usize) -> Result<(), Trap> {
        let count: u32 = safe_read_leb128(bytes, pc, 32)?;
        for _ in 0..count {
            let limits = read_memory_limits(bytes, pc)?;
            self.memories.push(limits);
            if self.memories.len() > 1 { return validation(MULTIPLE_MEMORIES); }
        }
        Ok(())
    }

    fn read_global_section(&mut self, bytes: &[u8], pc: &mut usize) -> Result<(), Trap> {
        let count: u32 = safe_read_leb128(bytes, pc, 32)?;
        for _ in 0..count {
            let gtype = read_global_type(bytes, pc)?;
            let init = flatten(bytes, pc, self.types.len())?;
            self.note_declared(&init);
            self.globals.push(GlobalDecl { gtype, init: Some(Rc::new(init)) });
        }
        Ok(())
    }

    fn read_export_section(&mut self, bytes: &[u8], pc: &mut usize) -> Result<(), Trap> {
        let count: u32 = safe_read_leb128(bytes, pc, 32)?;
        for _ in 0..count {
            let name = read_name(bytes, pc)?;
            let kind = ExternKind::from_byte(read_u8(bytes, pc)?)
                .ok_or(Malformed(INVALID_EXPORT_DESC))?;
            let idx: u32 = safe_read_leb128(bytes, pc, 32)?;

            if self.exports.iter().any(|e| e.name == name) {
                return validation(DUP_EXPORT_NAME);
            }
            match kind {
                ExternKind::Func => {
                    if idx as usize >= self.funcs.len() { return validation(UNKNOWN_FUNC); }
                    self.declared_funcs.insert(idx);
                }
                ExternKind::Table => {
                    if idx as usize >= self.tables.len() { return validation(UNKNOWN_TABLE); }
                }
                ExternKind::Mem => {
                    if idx as usize >= self.memories.len() { return validation(UNKNOWN_MEMORY); }
                }
                ExternKind::Global => {
                    if idx as usize >= self.globals.len() { return validation(UNKNOWN_GLOBAL); }
                }
            }
            self.exports.push(Export { name, kind, idx });
        }
        Ok(())
    }

    fn read_start_section(&mut self, bytes: &[u8], pc: &mut usize) -> Result<(), Trap> {
        let idx: u32 = safe_read_leb128(bytes, pc, 32)?;
        if idx as usize >= self.funcs.len() { return validation(UNKNOWN_FUNC); }
        self.start = Some(idx);
        Ok(())
    }

    fn read_element_section(&mut self, bytes: &[u8], pc: &mut usize) -> Result<(), Trap> {
        let count: u32 = safe_read_leb128(bytes, pc, 32)?;
        for _ in 0..count {
            let tag: u32 = safe_read_leb128(bytes, pc, 32)?;
            if tag > 7 { return malformed(INVALID_ELEM_SEG_FLAG); }

            // Bit 0: passive/declarative. Bit 1: explicit table index (active)
            // or declarative (non-active). Bit 2: expression items.
            let mode = if tag & 0b001 == 0 {
                let table: u32 = if tag & 0b010 != 0 {
                    safe_read_leb128(bytes, pc, 32)?
                } else {
                    0
                };
                if table as usize >= self.tables.len() { return validation(UNKNOWN_TABLE); }
                let offset = flatten(bytes, pc, self.types.len())?;
                ElemMode::Active { table, offset: Rc::new(offset) }
            } else if tag & 0b010 != 0 {
                ElemMode::Declarative
            } else {
                ElemMode::Passive
            };

            // Tags 0 and 4 imply funcref; the others carry an elemkind or
            // reference-type byte.
            let etype = if tag & 0b011 == 0 {
                ValType::FuncRef
            } else if tag & 0b100 == 0 {
                if read_u8(bytes, pc)? != 0x00 { return malformed(MALFORMED_ELEM_KIND); }
                ValType::FuncRef
            } else {
                let byte = read_u8(bytes, pc)?;
                if !is_ref_type(byte) { return malformed(MALFORMED_REF_TYPE); }
                ValType::from_byte(byte).ok_or(Malformed(MALFORMED_REF_TYPE))?
            };

            let items = if tag & 0b100 == 0 {
                let n: u32 = safe_read_leb128(bytes, pc, 32)?;
                let mut idxs = Vec::with_capacity(n as usize);
                for _ in 0..n {
                    let f: u32 = safe_read_leb128(bytes, pc, 32)?;
                    if f as usize >= self.funcs.len() { return validation(UNKNOWN_FUNC); }
                    self.declared_funcs.insert(f);
                    idxs.push(f);
                }
                ElemItems::Funcs(idxs)
            } else {
                let n: u32 = safe_read_leb128(bytes, pc, 32)?;
                let mut exprs = Vec::with_capacity(n as usize);
                for _ in 0..n {
                    let expr = flatten(bytes, pc, self.types.len())?;
                    self.note_declared(&expr);
                    exprs.push(Rc::new(expr));
                }
                ElemItems::Exprs(exprs)
            };

            self.elems.push(ElemDecl { etype, mode, items });
        }
        Ok(())
    }

    fn read_code_section(&mut self, bytes: &[u8], pc: &mut usize) -> Result<(), Trap> {
        let count: u32 = safe_read_leb128(bytes, pc, 32)?;
        if count as usize + self.num_imported_funcs != self.funcs.len() {
            return malformed(FUNC_CODE_INCONSISTENT);
        }

        for i in 0..count as usize {
            let size: u32 = safe_read_leb128(bytes, pc, 32)?;
            let body_end = *pc + size as usize;
            if body_end > bytes.len() { return malformed(LENGTH_OUT_OF_BOUNDS); }

            let n_params = {
                let type_idx = self.funcs[self.num_imported_funcs + i];
                self.types[type_idx as usize].params.len()
            };
            let mut locals: Vec<ValType> = Vec::new();
            let decls: u32 = safe_read_leb128(bytes, pc, 32)?;
            for _ in 0..decls {
                let n: u32 = safe_read_leb128(bytes, pc, 32)?;
                let byte = read_u8(bytes, pc)?;
                let vt = ValType::from_byte(byte).ok_or(Malformed(INVALID_VALUE_TYPE))?;
                if n_params + locals.len() + n as usize > Self::MAX_LOCALS {
                    return malformed(TOO_MANY_LOCALS);
                }
                locals.extend(std::iter::repeat(vt).take(n as usize));
            }

            let code = flatten(&bytes[..body_end], pc, self.types.len())?;
            if *pc != body_end { return malformed(END_EXPECTED); }

            if self.data_count.is_none() {
                let uses_data = code.code.iter()
                    .any(|ins| matches!(ins.op, Op::MemoryInit | Op::DataDrop));
                if uses_data { return malformed(DATA_COUNT_REQUIRED); }
            }

            self.func_bodies.push(FuncBody { locals, code: Rc::new(code) });
        }
        Ok(())
    }

    fn read_data_section(&mut self, bytes: &[u8], pc: &mut usize) -> Result<(), Trap> {
        let count: u32 = safe_read_leb128(bytes, pc, 32)?;
        for _ in 0..count {
            let tag: u32 = safe_read_leb128(bytes, pc, 32)?;
            let mode = match tag {
                0 | 2 => {
                    let memory = if tag == 2 { safe_read_leb128(bytes, pc, 32)? } else { 0 };
                    if memory as usize >= self.memories.len() {
                        return validation(UNKNOWN_MEMORY);
                    }
                    let offset = flatten(bytes, pc, self.types.len())?;
                    DataMode::Active { memory, offset: Rc::new(offset) }
                }
                1 => DataMode::Passive,
                _ => return malformed(INVALID_DATA_SEG_FLAG),
            };

            let len: u32 = safe_read_leb128(bytes, pc, 32)?;
            if *pc + len as usize > bytes.len() { return malformed(UNEXPECTED_END); }
            let data = bytes[*pc..*pc + len as usize].to_vec();
            *pc += len as usize;

            self.datas.push(DataDecl { mode, bytes: data });
        }
        Ok(())
    }

    fn read_data_count_section(&mut self, bytes: &[u8], pc: &mut usize) -> Result<(), Trap> {
        self.data_count = Some(safe_read_leb128(bytes, pc, 32)?);
        Ok(())
    }

    fn note_declared(&mut self, code: &FlatCode) {
        for ins in &code.code {
            if ins.op == Op::RefFunc {
                self.declared_funcs.insert(ins.operand.as_u32());
            }
        }
    }

    /// Signature of a function in the combined index space.
    pub fn func_type(&self, idx: u32) -> &FuncType {
        &self.types[self.funcs[idx as usize] as usize]
    }

    pub fn export(&self, name: &str) -> Option<&Export> {
        self.exports.iter().find(|e| e.name == name)
    }
}

/// Position of a section id in the required order. Data-count slots in
/// between element and code.
fn section_rank(id: u8) -> Option<u8> {
    match id {
        1..=9 => Some(id),
        12 => Some(10),
        10 => Some(11),
        11 => Some(12),
        _ => None,
    }
}

fn read_u8(bytes: &[u8], pc: &mut usize) -> Result<u8, Trap> {
    if *pc >= bytes.len() { return malformed(UNEXPECTED_END); }
    let b = bytes[*pc];
    *pc += 1;
    Ok(b)
}

fn read_name(bytes: &[u8], pc: &mut usize) -> Result<String, Trap> {
    let len: u32 = safe_read_leb128(bytes, pc, 32)?;
    if *pc + len as usize > bytes.len() { return malformed(UNEXPECTED_END); }
    let raw = &bytes[*pc..*pc + len as usize];
    *pc += len as usize;
    match std::str::from_utf8(raw) {
        Ok(s) => Ok(s.to_string()),
        Err(_) => malformed(INVALID_UTF8),
    }
}

fn read_valtype_vec(bytes: &[u8], pc: &mut usize) -> Result<Vec<ValType>, Trap> {
    let count: u32 = safe_read_leb128(bytes, pc, 32)?;
    let mut out = Vec::with_capacity(count.min(1024) as usize);
    for _ in 0..count {
        let byte = read_u8(bytes, pc)?;
        out.push(ValType::from_byte(byte).ok_or(Malformed(INVALID_VALUE_TYPE))?);
    }
    Ok(out)
}

fn read_limits(bytes: &[u8], pc: &mut usize) -> Result<Limits, Trap> {
    let flags: u32 = safe_read_leb128(bytes, pc, 1)?;
    let min: u32 = safe_read_leb128(bytes, pc, 32)?;
    let max = if flags == 1 {
        let max: u32 = safe_read_leb128(bytes, pc, 32)?;
        if max < min { return validation(MIN_GREATER_THAN_MAX); }
        Some(max)
    } else {
        None
    };
    Ok(Limits { min, max })
}

fn read_memory_limits(bytes: &[u8], pc: &mut usize) -> Result<Limits, Trap> {
    let limits = read_limits(bytes, pc)?;
    if limits.min > Module::MAX_PAGES || limits.max.unwrap_or(0) > Module::MAX_PAGES {
        return validation(MEMORY_SIZE_LIMIT);
    }
    Ok(limits)
}

fn read_table_type(bytes: &[u8], pc: &mut usize) -> Result<TableType, Trap> {
    let byte = read_u8(bytes, pc)?;
    if !is_ref_type(byte) { return malformed(MALFORMED_REF_TYPE); }
    let elem = ValType::from_byte(byte).ok_or(Malformed(MALFORMED_REF_TYPE))?;
    let limits = read_limits(bytes, pc)?;
    Ok(TableType { elem, limits })
}

fn read_global_type(bytes: &[u8], pc: &mut usize) -> Result<GlobalType, Trap> {
    let byte = read_u8(bytes, pc)?;
    let vtype = ValType::from_byte(byte).ok_or(Malformed(INVALID_GLOBAL_TYPE))?;
    let mutability = match read_u8(bytes, pc)? {
        0x00 => Mut::Const,
        0x01 => Mut::Var,
        _ => return malformed(INVALID_MUTABILITY),
    };
    Ok(GlobalType { vtype, mutability })
}
