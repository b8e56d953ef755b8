use std::rc::Rc;

use crate::debug_println;
use crate::error::*;
use crate::frame;
use crate::machine::{Extern, Func, Global, Machine, WasmFunc};
use crate::memory::Memory;
use crate::module::{DataMode, ElemItems, ElemMode, ExternKind, ImportDesc, Module};
use crate::table::Table;
use crate::types::ValType;
use crate::validate;
use crate::value::Value;

/// One instantiated module: the decoded form plus index-to-address maps
/// into the machine's arenas. Imports occupy the low end of each map, so
/// a module index is always a direct lookup regardless of origin.
#[derive(Debug)]
pub struct ModuleInstance {
    pub module: Rc<Module>,
    pub funcs: Vec<usize>,
    pub tables: Vec<usize>,
    pub memories: Vec<usize>,
    pub globals: Vec<usize>,
    pub elems: Vec<usize>,
    pub datas: Vec<usize>,
}

impl ModuleInstance {
    pub fn find_export(&self, name: &str) -> Option<Extern> {
        let export = self.module.export(name)?;
        Some(self.extern_of(export.kind, export.idx))
    }

    pub(crate) fn extern_of(&self, kind: ExternKind, idx: u32) -> Extern {
        match kind {
            ExternKind::Func => Extern::Func(self.funcs[idx as usize]),
            ExternKind::Table => Extern::Table(self.tables[idx as usize]),
            ExternKind::Mem => Extern::Memory(self.memories[idx as usize]),
            ExternKind::Global => Extern::Global(self.globals[idx as usize]),
        }
    }
}

/// Validates and instantiates a module against the machine's registry.
///
/// Imports resolve first, then module-local definitions are allocated,
/// globals are initialized, element and data segments materialize and
/// active ones copy out, and finally the start function runs. Failure at
/// any point aborts instantiation; arena entries already allocated are
/// not rolled back.
pub fn instantiate(machine: &mut Machine, module: Module) -> Result<Rc<ModuleInstance>, Trap> {
    validate::validate(&module)?;
    let module = Rc::new(module);

    let mut funcs = Vec::new();
    let mut tables = Vec::new();
    let mut memories = Vec::new();
    let mut globals = Vec::new();
    for import in &module.imports {
        let ext = machine.resolve(&import.module, &import.field)?;
        match (&import.desc, ext) {
            (ImportDesc::Func(type_idx), Extern::Func(addr)) => {
                if machine.funcs[addr].ftype() != &module.types[*type_idx as usize] {
                    return link(INCOMPATIBLE_IMPORT);
                }
                funcs.push(addr);
            }
            (ImportDesc::Table(want), Extern::Table(addr)) => {
                let have = machine.tables[addr].ttype();
                if have.elem != want.elem || !have.limits.subsumes(&want.limits) {
                    return link(INCOMPATIBLE_IMPORT);
                }
                tables.push(addr);
            }
            (ImportDesc::Mem(want), Extern::Memory(addr)) => {
                if !machine.memories[addr].limits().subsumes(want) {
                    return link(INCOMPATIBLE_IMPORT);
                }
                memories.push(addr);
            }
            (ImportDesc::Global(want), Extern::Global(addr)) => {
                if machine.globals[addr].gtype != *want {
                    return link(INCOMPATIBLE_IMPORT);
                }
                globals.push(addr);
            }
            _ => return link(INCOMPATIBLE_IMPORT),
        }
    }
    debug_println!(
        "linked {} imports ({} funcs)",
        module.imports.len(),
        funcs.len()
    );

    for ttype in module.tables.iter().skip(module.num_imported_tables) {
        tables.push(machine.tables.len());
        machine.tables.push(Table::new(*ttype));
    }
    for limits in module.memories.iter().skip(module.num_imported_mems) {
        memories.push(machine.memories.len());
        machine.memories.push(Memory::new(*limits));
    }
    for decl in module.globals.iter().skip(module.num_imported_globals) {
        globals.push(machine.globals.len());
        machine.globals.push(Global { value: Value::default(), gtype: decl.gtype });
    }
    // Function addresses are predicted here; the bodies are pushed after
    // the instance exists for them to point back at.
    let first_local_func = machine.funcs.len();
    for i in 0..module.func_bodies.len() {
        funcs.push(first_local_func + i);
    }
    let mut elems = Vec::new();
    for _ in &module.elems {
        elems.push(machine.elems.len());
        machine.elems.push(Vec::new());
    }
    let mut datas = Vec::new();
    for decl in &module.datas {
        datas.push(machine.datas.len());
        machine.datas.push(decl.bytes.clone());
    }

    let instance = Rc::new(ModuleInstance {
        module: Rc::clone(&module),
        funcs,
        tables,
        memories,
        globals,
        elems,
        datas,
    });

    for (i, body) in module.func_bodies.iter().enumerate() {
        let type_idx = module.funcs[module.num_imported_funcs + i];
        machine.funcs.push(Rc::new(Func::Wasm(WasmFunc {
            ftype: module.types[type_idx as usize].clone(),
            locals: body.locals.clone(),
            code: Rc::clone(&body.code),
            instance: Rc::clone(&instance),
        })));
    }

    for (i, decl) in module.globals.iter().enumerate().skip(module.num_imported_globals) {
        if let Some(init) = &decl.init {
            let v = frame::eval_const(machine, &instance, init)?;
            machine.globals[instance.globals[i]].value = v;
        }
    }

    // Segments materialize for every mode; active ones copy into their
    // target and drop, declarative ones drop outright.
    for (i, decl) in module.elems.iter().enumerate() {
        let eaddr = instance.elems[i];
        machine.elems[eaddr] = match &decl.items {
            ElemItems::Funcs(idxs) => idxs
                .iter()
                .map(|&f| Value::from_ref(instance.funcs[f as usize], ValType::FuncRef))
                .collect(),
            ElemItems::Exprs(exprs) => {
                let mut vals = Vec::with_capacity(exprs.len());
                for expr in exprs {
                    vals.push(frame::eval_const(machine, &instance, expr)?);
                }
                vals
            }
        };
        match &decl.mode {
            ElemMode::Active { table, offset } => {
                let dst = frame::eval_const(machine, &instance, offset)?.as_u32();
                let taddr = instance.tables[*table as usize];
                let n = machine.elems[eaddr].len() as u32;
                machine.table_init(taddr, eaddr, dst, 0, n)?;
                machine.elems[eaddr] = Vec::new();
            }
            ElemMode::Declarative => machine.elems[eaddr] = Vec::new(),
            ElemMode::Passive => {}
        }
    }

    for (i, decl) in module.datas.iter().enumerate() {
        if let DataMode::Active { memory, offset } = &decl.mode {
            let dst = frame::eval_const(machine, &instance, offset)?.as_u32();
            let maddr = instance.memories[*memory as usize];
            let daddr = instance.datas[i];
            let n = machine.datas[daddr].len() as u32;
            machine.memory_init(maddr, daddr, dst, 0, n)?;
            machine.datas[daddr] = Vec::new();
        }
    }

    if let Some(start) = module.start {
        let addr = instance.funcs[start as usize];
        debug_println!("running start func@{}", addr);
        match frame::call(machine, addr, &[]) {
            Ok(_) => {}
            Err(Trap::Exit(code)) => return Err(Trap::Exit(code)),
            Err(Trap::Runtime(msg)) => return Err(Trap::Uninstantiable(msg)),
            Err(e) => return Err(e),
        }
    }

    Ok(instance)
}
