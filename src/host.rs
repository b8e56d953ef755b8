//! Typed host-function boundary. Embedders write closures over plain Rust
//! types; the conversion to and from raw stack values and the derived
//! signature come from the [`WasmTy`] impls.

use crate::error::Trap;
use crate::machine::{HostCallable, Machine};
use crate::types::{FuncType, ValType};
use crate::value::Value;

pub trait WasmTy: Copy {
    const TYPE: ValType;
    fn from_value(v: Value) -> Self;
    fn into_value(self) -> Value;
}

macro_rules! impl_wasm_ty {
    ($rust:ty, $vt:ident, $from:ident, $as:ident) => {
        impl WasmTy for $rust {
            const TYPE: ValType = ValType::$vt;
            #[inline]
            fn from_value(v: Value) -> Self {
                v.$as()
            }
            #[inline]
            fn into_value(self) -> Value {
                Value::$from(self)
            }
        }
    };
}

impl_wasm_ty!(i32, I32, from_i32, as_i32);
impl_wasm_ty!(u32, I32, from_u32, as_u32);
impl_wasm_ty!(i64, I64, from_i64, as_i64);
impl_wasm_ty!(u64, I64, from_u64, as_u64);
impl_wasm_ty!(f32, F32, from_f32, as_f32);
impl_wasm_ty!(f64, F64, from_f64, as_f64);

/// Host return position: either nothing or a single value.
pub trait WasmRet {
    fn result_types() -> Vec<ValType>;
    fn into_result(self) -> Option<Value>;
}

impl WasmRet for () {
    fn result_types() -> Vec<ValType> {
        Vec::new()
    }
    fn into_result(self) -> Option<Value> {
        None
    }
}

impl<T: WasmTy> WasmRet for T {
    fn result_types() -> Vec<ValType> {
        vec![T::TYPE]
    }
    fn into_result(self) -> Option<Value> {
        Some(self.into_value())
    }
}

/// Closures convertible into the erased calling convention the machine
/// stores. Implemented for `Fn(&mut Machine, args..) -> Result<R, Trap>`
/// up to six arguments.
pub trait IntoHost<Args> {
    fn signature() -> FuncType;
    fn into_callable(self) -> HostCallable;
}

macro_rules! impl_into_host {
    ($($arg:ident),*) => {
        impl<F, R, $($arg),*> IntoHost<($($arg,)*)> for F
        where
            F: Fn(&mut Machine $(, $arg)*) -> Result<R, Trap> + 'static,
            R: WasmRet,
            $($arg: WasmTy,)*
        {
            fn signature() -> FuncType {
                FuncType {
                    params: vec![$(<$arg>::TYPE),*],
                    results: R::result_types(),
                }
            }

            fn into_callable(self) -> HostCallable {
                // The caller sizes the argument slice from the signature,
                // so the unpack below never comes up short.
                Box::new(move |machine, args| {
                    let mut vals = args.iter().copied();
                    let ret = self(machine $(, <$arg>::from_value(vals.next().unwrap_or_default()))*)?;
                    Ok(ret.into_result())
                })
            }
        }
    };
}

impl_into_host!();
impl_into_host!(A1);
impl_into_host!(A1, A2);
impl_into_host!(A1, A2, A3);
impl_into_host!(A1, A2, A3, A4);
impl_into_host!(A1, A2, A3, A4, A5);
impl_into_host!(A1, A2, A3, A4, A5, A6);

impl Machine {
    /// Registers a typed closure as an importable function. The wasm
    /// signature is derived from the closure's Rust signature.
    pub fn register_host<Args, F: IntoHost<Args>>(
        &mut self,
        module: &str,
        name: &str,
        f: F,
    ) -> usize {
        self.register_host_fn(module, name, F::signature(), f.into_callable())
    }
}
