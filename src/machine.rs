use std::collections::HashMap;
use std::rc::Rc;

use crate::error::*;
use crate::frame;
use crate::instance::ModuleInstance;
use crate::instr::FlatCode;
use crate::memory::Memory;
use crate::table::Table;
use crate::types::{FuncType, GlobalType, ValType};
use crate::value::Value;

/// Nested wasm calls recurse on the host stack, so the guard is well below
/// what a native thread could tolerate.
pub(crate) const MAX_CALL_DEPTH: u32 = 1000;

/// Address of an entity in the machine's arenas.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Extern {
    Func(usize),
    Table(usize),
    Memory(usize),
    Global(usize),
}

pub type HostCallable = Box<dyn Fn(&mut Machine, &[Value]) -> Result<Option<Value>, Trap>>;

pub struct WasmFunc {
    pub ftype: FuncType,
    pub locals: Vec<ValType>,
    pub code: Rc<FlatCode>,
    pub instance: Rc<ModuleInstance>,
}

pub struct HostFunc {
    pub ftype: FuncType,
    pub callable: HostCallable,
}

pub enum Func {
    Wasm(WasmFunc),
    Host(HostFunc),
}

impl Func {
    pub fn ftype(&self) -> &FuncType {
        match self {
            Func::Wasm(f) => &f.ftype,
            Func::Host(f) => &f.ftype,
        }
    }
}

pub struct Global {
    pub value: Value,
    pub gtype: GlobalType,
}

/// Owns every runtime entity. Instances hold addresses into these arenas,
/// never the entities themselves, so instantiating a second module can link
/// against anything a prior one exported.
pub struct Machine {
    pub funcs: Vec<Rc<Func>>,
    pub tables: Vec<Table>,
    pub memories: Vec<Memory>,
    pub globals: Vec<Global>,
    pub elems: Vec<Vec<Value>>,
    pub datas: Vec<Vec<u8>>,
    registry: HashMap<String, HashMap<String, Extern>>,
    pub(crate) budget: Option<u64>,
    pub(crate) depth: u32,
}

impl Machine {
    pub fn new() -> Self {
        Self {
            funcs: Vec::new(),
            tables: Vec::new(),
            memories: Vec::new(),
            globals: Vec::new(),
            elems: Vec::new(),
            datas: Vec::new(),
            registry: HashMap::new(),
            budget: None,
            depth: 0,
        }
    }

    /// Caps the number of instructions any subsequent call may execute.
    /// The budget is shared across nested and host-re-entrant calls;
    /// `None` removes the cap.
    pub fn set_step_budget(&mut self, budget: Option<u64>) {
        self.budget = budget;
    }

    pub fn register(&mut self, module: &str, name: &str, ext: Extern) {
        self.registry
            .entry(module.to_string())
            .or_default()
            .insert(name.to_string(), ext);
    }

    /// Makes every export of `instance` importable under `module`.
    pub fn register_instance(&mut self, module: &str, instance: &Rc<ModuleInstance>) {
        for export in &instance.module.exports {
            let ext = instance.extern_of(export.kind, export.idx);
            self.register(module, &export.name, ext);
        }
    }

    pub fn register_host_fn(
        &mut self,
        module: &str,
        name: &str,
        ftype: FuncType,
        callable: HostCallable,
    ) -> usize {
        let addr = self.funcs.len();
        self.funcs.push(Rc::new(Func::Host(HostFunc { ftype, callable })));
        self.register(module, name, Extern::Func(addr));
        addr
    }

    // Arena-to-arena bulk ops need two fields borrowed at once.
    pub(crate) fn memory_init(
        &mut self,
        maddr: usize,
        daddr: usize,
        dst: u32,
        src: u32,
        n: u32,
    ) -> Result<(), Trap> {
        let Machine { memories, datas, .. } = self;
        memories[maddr].init(dst, &datas[daddr], src, n)
    }

    pub(crate) fn table_init(
        &mut self,
        taddr: usize,
        eaddr: usize,
        dst: u32,
        src: u32,
        n: u32,
    ) -> Result<(), Trap> {
        let Machine { tables, elems, .. } = self;
        tables[taddr].init(dst, &elems[eaddr], src, n)
    }

    pub(crate) fn table_copy(
        &mut self,
        dst_t: usize,
        src_t: usize,
        dst: u32,
        src: u32,
        n: u32,
    ) -> Result<(), Trap> {
        if dst_t == src_t {
            return self.tables[dst_t].copy_within(dst, src, n);
        }
        let vals = self.tables[src_t].window(src, n)?.to_vec();
        self.tables[dst_t].init(dst, &vals, 0, n)
    }

    pub(crate) fn resolve(&self, module: &str, name: &str) -> Result<Extern, Trap> {
        match self.registry.get(module).and_then(|m| m.get(name)) {
            Some(ext) => Ok(*ext),
            None => link(UNKNOWN_IMPORT),
        }
    }

    /// Calls an exported function by name. Arguments are raw values; only
    /// their count is checked against the signature.
    pub fn invoke(
        &mut self,
        instance: &Rc<ModuleInstance>,
        name: &str,
        args: &[Value],
    ) -> Result<Vec<Value>, Trap> {
        let Some(Extern::Func(addr)) = instance.find_export(name) else {
            return link(UNKNOWN_EXPORT);
        };
        if args.len() != self.funcs[addr].ftype().params.len() {
            return runtime(INVALID_NUM_ARG);
        }
        frame::call(self, addr, args)
    }
}

impl Default for Machine {
    fn default() -> Self {
        Self::new()
    }
}
