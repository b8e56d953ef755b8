#![deny(unsafe_code)]

//! A WebAssembly interpreter built around flattened bytecode: module
//! decoding resolves every branch to an absolute program counter, so the
//! dispatch loop never walks a block tree. Modules link against each
//! other and against typed host functions through a [`Machine`], which
//! owns all runtime state.

mod error;
mod frame;
mod host;
mod instance;
mod instr;
pub mod leb128;
mod machine;
mod memory;
mod module;
mod opcode;
mod table;
mod types;
mod validate;
mod value;

// Debug macro that only prints when the vm_debug feature is enabled
#[cfg(feature = "vm_debug")]
macro_rules! debug_println {
    ($($arg:tt)*) => {
        eprintln!($($arg)*);
    };
}

#[cfg(not(feature = "vm_debug"))]
macro_rules! debug_println {
    ($($arg:tt)*) => {};
}

pub(crate) use debug_println;

pub use error::Trap;
pub use host::{IntoHost, WasmRet, WasmTy};
pub use instance::{instantiate, ModuleInstance};
pub use instr::{FlatCode, Instruction};
pub use machine::{Extern, Func, Global, HostCallable, HostFunc, Machine, WasmFunc};
pub use memory::Memory;
pub use module::{
    DataDecl, DataMode, ElemDecl, ElemItems, ElemMode, Export, ExternKind, FuncBody, GlobalDecl,
    Import, ImportDesc, Module,
};
pub use opcode::{Op, Shape};
pub use table::Table;
pub use types::{FuncType, GlobalType, Limits, Mut, TableType, ValType};
pub use validate::validate;
pub use value::Value;
