use std::rc::Rc;

use paste::paste;

use crate::debug_println;
use crate::error::*;
use crate::instance::ModuleInstance;
use crate::instr::FlatCode;
use crate::machine::{Func, Machine, WasmFunc, MAX_CALL_DEPTH};
use crate::opcode::Op;
use crate::types::{block_arity, ValType};
use crate::value::Value;

/// Branch destination for one open block, loop, if-arm or function body.
/// `arity` is the value count the branch carries: results for a block or
/// function, arguments for a loop re-entry.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Label {
    pub arity: usize,
    pub target: usize,
}

/// One function activation. Frames live on the host call stack; a wasm
/// call is a Rust call into [`run_wasm`].
pub(crate) struct Frame {
    locals: Vec<Value>,
    stack: Vec<Value>,
    labels: Vec<Label>,
    pc: usize,
    code: Rc<FlatCode>,
    instance: Rc<ModuleInstance>,
    arity: usize,
}

/// Runs the function at arena address `addr`. Wasm callees get a fresh
/// frame; host callees consume the argument slice directly, with no frame
/// of their own. The depth counter spans both, so a host function calling
/// back into guest code cannot recurse past the cap.
pub(crate) fn call(machine: &mut Machine, addr: usize, args: &[Value]) -> Result<Vec<Value>, Trap> {
    machine.depth += 1;
    if machine.depth > MAX_CALL_DEPTH {
        machine.depth -= 1;
        return runtime(STACK_EXHAUSTED);
    }
    debug_println!("call func@{} depth {}", addr, machine.depth);
    let func = Rc::clone(&machine.funcs[addr]);
    let result = match &*func {
        Func::Host(host) => (host.callable)(machine, args).map(|ret| ret.into_iter().collect()),
        Func::Wasm(wasm) => run_wasm(machine, wasm, args),
    };
    machine.depth -= 1;
    result
}

fn run_wasm(machine: &mut Machine, func: &WasmFunc, args: &[Value]) -> Result<Vec<Value>, Trap> {
    let arity = func.ftype.results.len();
    let mut locals = Vec::with_capacity(args.len() + func.locals.len());
    locals.extend_from_slice(args);
    locals.resize(args.len() + func.locals.len(), Value::default());

    let mut frame = Frame {
        locals,
        stack: Vec::new(),
        labels: vec![Label { arity, target: func.code.code.len() }],
        pc: 0,
        code: Rc::clone(&func.code),
        instance: Rc::clone(&func.instance),
        arity,
    };
    frame.run(machine)?;

    // Implicit return: the top `arity` values, in push order.
    let Some(base) = frame.stack.len().checked_sub(frame.arity) else {
        return runtime(STACK_UNDERFLOW);
    };
    Ok(frame.stack.split_off(base))
}

/// Runs a constant-expression body in a throwaway frame and hands back the
/// single value it leaves behind.
pub(crate) fn eval_const(
    machine: &mut Machine,
    instance: &Rc<ModuleInstance>,
    code: &Rc<FlatCode>,
) -> Result<Value, Trap> {
    let mut frame = Frame {
        locals: Vec::new(),
        stack: Vec::new(),
        labels: vec![Label { arity: 1, target: code.code.len() }],
        pc: 0,
        code: Rc::clone(code),
        instance: Rc::clone(instance),
        arity: 1,
    };
    frame.run(machine)?;
    match frame.stack.pop() {
        Some(v) => Ok(v),
        None => runtime(STACK_UNDERFLOW),
    }
}

impl Frame {
    fn run(&mut self, machine: &mut Machine) -> Result<(), Trap> {
        let code_rc = Rc::clone(&self.code);
        let code = &code_rc.code[..];
        let instance = Rc::clone(&self.instance);
        let types = &instance.module.types[..];
        let stack = &mut self.stack;
        let locals = &mut self.locals;
        let labels = &mut self.labels;
        let mut pc = self.pc;
        let mut operand;

        macro_rules! pop_val { () => {{
            match stack.pop() { Some(v) => v, None => return runtime(STACK_UNDERFLOW) }
        }} }
        macro_rules! mem_addr { () => {{
            match instance.memories.first() {
                Some(&addr) => addr,
                None => return validation(UNKNOWN_MEMORY),
            }
        }} }
        // Jumps land on target - 1 so the shared increment below finishes
        // the hop. Popping depth + 1 labels and taking the last keeps the
        // label stack balanced: a loop header re-pushes its own label and a
        // block target sits past the END that would otherwise pop it.
        macro_rules! branch {
            ($depth:expr) => {{
                let n = $depth as usize;
                let Some(base) = labels.len().checked_sub(n + 1) else {
                    return runtime(STACK_UNDERFLOW);
                };
                let label = labels[base];
                labels.truncate(base);
                debug_assert!(stack.len() >= label.arity);
                pc = label.target.wrapping_sub(1);
            }};
        }
        macro_rules! call_at {
            ($faddr:expr) => {{
                let faddr = $faddr;
                let n = machine.funcs[faddr].ftype().params.len();
                let Some(base) = stack.len().checked_sub(n) else {
                    return runtime(STACK_UNDERFLOW);
                };
                let args = stack.split_off(base);
                let results = call(machine, faddr, &args)?;
                stack.extend(results);
            }};
        }
        macro_rules! binary {
            ($type:ident, $op:tt) => {{
                paste! {
                    let b = pop_val!().[<as_ $type>]();
                    let a = pop_val!().[<as_ $type>]();
                    stack.push(Value::[<from_ $type>](a $op b));
                }
            }};
            ($type:ident, .$method:ident) => {{
                paste! {
                    let b = pop_val!().[<as_ $type>]();
                    let a = pop_val!().[<as_ $type>]();
                    stack.push(Value::[<from_ $type>](a.$method(b)));
                }
            }};
        }
        macro_rules! compare {
            ($type:ident, $op:tt) => {{
                paste! {
                    let b = pop_val!().[<as_ $type>]();
                    let a = pop_val!().[<as_ $type>]();
                    stack.push(Value::from_u32((a $op b) as u32));
                }
            }};
        }
        macro_rules! shift {
            (u32, $op:tt) => {{
                let b = pop_val!().as_u32() % 32;
                let a = pop_val!().as_u32();
                stack.push(Value::from_u32(a $op b));
            }};
            (u64, $op:tt) => {{
                let b = pop_val!().as_u64() % 64;
                let a = pop_val!().as_u64();
                stack.push(Value::from_u64(a $op b));
            }};
        }
        macro_rules! shr_s {
            ($int_type:ident, $uint_type:ident, $bits:literal) => {{
                paste! {
                    let b = pop_val!().[<as_ $uint_type>]() % $bits;
                    let a = pop_val!().[<as_ $int_type>]();
                    stack.push(Value::[<from_ $int_type>](a >> b));
                }
            }};
        }
        macro_rules! rotate {
            (u32, $dir:ident) => {{
                let b = pop_val!().as_u32();
                let a = pop_val!().as_u32();
                paste! {
                    stack.push(Value::from_u32(a.[<rotate_ $dir>](b % 32)));
                }
            }};
            (u64, $dir:ident) => {{
                let b = pop_val!().as_u64();
                let a = pop_val!().as_u64();
                paste! {
                    stack.push(Value::from_u64(a.[<rotate_ $dir>]((b % 64) as u32)));
                }
            }};
        }
        macro_rules! unary {
            ($type:ident, $f:expr) => {{
                paste! {
                    let a = pop_val!().[<as_ $type>]();
                    stack.push(Value::[<from_ $type>]($f(a)));
                }
            }};
        }
        macro_rules! extend {
            ($type:ident as $narrow:ty => $wide:ident) => {{
                paste! {
                    let a = pop_val!().[<as_ $type>]();
                    stack.push(Value::[<from_ $wide>](a as $narrow as $wide));
                }
            }};
        }
        macro_rules! minmax {
            ($type:ident, min) => {{ minmax!(@impl $type, min, true) }};
            ($type:ident, max) => {{ minmax!(@impl $type, max, false) }};
            (@impl $type:ident, $op:ident, $want_negative:literal) => {{
                paste! {
                    let b = pop_val!().[<as_ $type>]();
                    let a = pop_val!().[<as_ $type>]();

                    let result = if a.is_nan() {
                        a
                    } else if b.is_nan() {
                        b
                    } else if a == b && a == 0.0 {
                        const SIGN_BIT_SHIFT: usize = std::mem::size_of::<$type>() * 8 - 1;
                        let a_has_sign = a.to_bits() >> SIGN_BIT_SHIFT != 0;
                        if a_has_sign == $want_negative { a } else { b }
                    } else {
                        a.$op(b)
                    };
                    stack.push(Value::[<from_ $type>](result));
                }
            }};
        }
        macro_rules! copysign {
            ($type:ident) => {{
                paste! {
                    let b = pop_val!().[<as_ $type>]();
                    let a = pop_val!().[<as_ $type>]();
                    stack.push(Value::[<from_ $type>](a.copysign(b)));
                }
            }};
        }
        macro_rules! nearest {
            ($type:ident) => {{
                paste! {
                    let x = stack.pop().unwrap().[<as_ $type>]();
                    let y = if x.is_nan() || x.is_infinite() {
                        x
                    } else {
                        let lower = x.floor();
                        let upper = x.ceil();
                        let dl = x - lower;
                        let du = upper - x;
                        if dl < du {
                            lower
                        } else if dl > du {
                            upper
                        } else {
                            if (lower % 2.0) == 0.0 { lower } else { upper }
                        }
                    };
                    stack.push(Value::[<from_ $type>](y));
                }
            }};
        }
        macro_rules! convert {
            ($src_type:ident -> $dst_type:ident) => {{
                paste! {
                    let v = stack.pop().unwrap().[<as_ $src_type>]();
                    stack.push(Value::[<from_ $dst_type>](v as $dst_type));
                }
            }};
        }
        macro_rules! trunc {
            ($src_type:ident -> $dst_type:ident : $min:expr, $max:expr) => {{
                paste! {
                    let x = stack.pop().unwrap().[<as_ $src_type>]();
                    if !x.is_finite() {
                        if x.is_nan() {
                            return runtime(INVALID_CONV_TO_INT);
                        } else {
                            return runtime(INTEGER_OVERFLOW);
                        }
                    }
                    if x <= $min || x >= $max {
                        return runtime(INTEGER_OVERFLOW);
                    }
                    stack.push(Value::[<from_ $dst_type>](x as $dst_type));
                }
            }};
        }
        macro_rules! div_s {
            ($int_type:ident) => {{
                paste! {
                    let b = pop_val!().[<as_ $int_type>]();
                    let a = pop_val!().[<as_ $int_type>]();
                    if b == 0 { return runtime(DIVIDE_BY_ZERO); }
                    if a == $int_type::MIN && b == -1 { return runtime(INTEGER_OVERFLOW); }
                    stack.push(Value::[<from_ $int_type>](a / b));
                }
            }};
        }
        macro_rules! div_u {
            ($uint_type:ident) => {{
                paste! {
                    let b = pop_val!().[<as_ $uint_type>]();
                    let a = pop_val!().[<as_ $uint_type>]();
                    if b == 0 { return runtime(DIVIDE_BY_ZERO); }
                    stack.push(Value::[<from_ $uint_type>](a / b));
                }
            }};
        }
        macro_rules! rem_s {
            ($int_type:ident) => {{
                paste! {
                    let b = pop_val!().[<as_ $int_type>]();
                    let a = pop_val!().[<as_ $int_type>]();
                    if b == 0 { return runtime(DIVIDE_BY_ZERO); }
                    if a == $int_type::MIN && b == -1 {
                        stack.push(Value::[<from_ $int_type>](0));
                    } else {
                        stack.push(Value::[<from_ $int_type>](a % b));
                    }
                }
            }};
        }
        macro_rules! rem_u {
            ($uint_type:ident) => {{
                paste! {
                    let b = pop_val!().[<as_ $uint_type>]();
                    let a = pop_val!().[<as_ $uint_type>]();
                    if b == 0 { return runtime(DIVIDE_BY_ZERO); }
                    stack.push(Value::[<from_ $uint_type>](a % b));
                }
            }};
        }
        macro_rules! load {
            ($method:ident, $push:expr) => {{
                let addr = pop_val!().as_u32();
                let maddr = mem_addr!();
                let v = machine.memories[maddr].$method(addr, operand.mem_offset())?;
                stack.push(($push)(v));
            }};
        }
        macro_rules! store {
            ($method:ident, $from:expr) => {{
                let raw = pop_val!();
                let addr = pop_val!().as_u32();
                let maddr = mem_addr!();
                machine.memories[maddr].$method(addr, operand.mem_offset(), ($from)(raw))?;
            }};
        }

        while pc < code.len() {
            if let Some(budget) = machine.budget.as_mut() {
                if *budget == 0 { return runtime(BUDGET_EXHAUSTED); }
                *budget -= 1;
            }
            let op = code[pc].op;
            operand = code[pc].operand;
            match op {
                Op::Unreachable => return runtime(UNREACHABLE),
                // Reinterprets are no-ops on the raw bit pattern.
                Op::Nop
                | Op::I32ReinterpretF32
                | Op::I64ReinterpretF64
                | Op::F32ReinterpretI32
                | Op::F64ReinterpretI64 => {}
                Op::Block => {
                    let (_, results) = block_arity(types, operand.block_type());
                    labels.push(Label { arity: results, target: operand.jump_target() });
                }
                Op::Loop => {
                    let (params, _) = block_arity(types, operand.block_type());
                    labels.push(Label { arity: params, target: operand.jump_target() });
                }
                Op::If => {
                    let (else_target, end_target) = operand.if_targets();
                    let cond = pop_val!().as_u32();
                    if cond != 0 {
                        let (_, results) = block_arity(types, operand.if_block_type());
                        labels.push(Label { arity: results, target: end_target });
                    } else if else_target != end_target {
                        let (_, results) = block_arity(types, operand.if_block_type());
                        labels.push(Label { arity: results, target: end_target });
                        pc = else_target.wrapping_sub(1);
                    } else {
                        // No else arm: the whole construct is skipped, so
                        // no label is opened and none is ever popped.
                        pc = end_target.wrapping_sub(1);
                    }
                }
                // Reached only by falling out of the true arm.
                Op::Else => branch!(0),
                Op::End => match labels.pop() {
                    Some(_) => {}
                    None => return runtime(STACK_UNDERFLOW),
                },
                Op::Br => branch!(operand.as_u32()),
                Op::BrIf => {
                    let cond = pop_val!().as_u32();
                    if cond != 0 {
                        branch!(operand.as_u32());
                    }
                }
                Op::BrTable => {
                    let arms = &code_rc.br_tables[operand.as_u32() as usize];
                    let i = pop_val!().as_u32() as usize;
                    let depth = arms[i.min(arms.len() - 1)];
                    branch!(depth);
                }
                Op::Return => pc = code.len() - 1,
                Op::Call => {
                    let faddr = instance.funcs[operand.as_u32() as usize];
                    call_at!(faddr);
                }
                Op::CallIndirect => {
                    let expect = &types[operand.first() as usize];
                    let taddr = instance.tables[operand.second() as usize];
                    let i = pop_val!().as_u32();
                    let tbl = &machine.tables[taddr];
                    let Ok(entry) = tbl.get(i) else { return runtime(UNDEF_ELEM) };
                    if entry.is_null() { return runtime(UNINITIALIZED_ELEM); }
                    let faddr = entry.ref_addr();
                    if machine.funcs[faddr].ftype() != expect {
                        return runtime(INDIRECT_CALL_MISMATCH);
                    }
                    call_at!(faddr);
                }
                Op::Drop => { pop_val!(); }
                Op::Select | Op::SelectT => {
                    let cond = pop_val!().as_u32();
                    let b = pop_val!();
                    let a = pop_val!();
                    stack.push(if cond != 0 { a } else { b });
                }
                Op::LocalGet => stack.push(locals[operand.as_u32() as usize]),
                Op::LocalSet => locals[operand.as_u32() as usize] = pop_val!(),
                Op::LocalTee => {
                    let v = match stack.last() {
                        Some(v) => *v,
                        None => return runtime(STACK_UNDERFLOW),
                    };
                    locals[operand.as_u32() as usize] = v;
                }
                Op::GlobalGet => {
                    let addr = instance.globals[operand.as_u32() as usize];
                    stack.push(machine.globals[addr].value);
                }
                Op::GlobalSet => {
                    let addr = instance.globals[operand.as_u32() as usize];
                    machine.globals[addr].value = pop_val!();
                }
                Op::TableGet => {
                    let taddr = instance.tables[operand.as_u32() as usize];
                    let i = pop_val!().as_u32();
                    let v = machine.tables[taddr].get(i)?;
                    stack.push(v);
                }
                Op::TableSet => {
                    let taddr = instance.tables[operand.as_u32() as usize];
                    let v = pop_val!();
                    let i = pop_val!().as_u32();
                    machine.tables[taddr].set(i, v)?;
                }
                Op::I32Load => load!(load_u32, Value::from_u32),
                Op::I64Load => load!(load_u64, Value::from_u64),
                Op::F32Load => load!(load_f32, Value::from_f32),
                Op::F64Load => load!(load_f64, Value::from_f64),
                Op::I32Load8S => load!(load_i8, |v: i8| Value::from_i32(v as i32)),
                Op::I32Load8U => load!(load_u8, |v: u8| Value::from_u32(v as u32)),
                Op::I32Load16S => load!(load_i16, |v: i16| Value::from_i32(v as i32)),
                Op::I32Load16U => load!(load_u16, |v: u16| Value::from_u32(v as u32)),
                Op::I64Load8S => load!(load_i8, |v: i8| Value::from_i64(v as i64)),
                Op::I64Load8U => load!(load_u8, |v: u8| Value::from_u64(v as u64)),
                Op::I64Load16S => load!(load_i16, |v: i16| Value::from_i64(v as i64)),
                Op::I64Load16U => load!(load_u16, |v: u16| Value::from_u64(v as u64)),
                Op::I64Load32S => load!(load_i32, |v: i32| Value::from_i64(v as i64)),
                Op::I64Load32U => load!(load_u32, |v: u32| Value::from_u64(v as u64)),
                Op::I32Store => store!(store_u32, Value::as_u32),
                Op::I64Store => store!(store_u64, Value::as_u64),
                Op::F32Store => store!(store_f32, Value::as_f32),
                Op::F64Store => store!(store_f64, Value::as_f64),
                Op::I32Store8 => store!(store_u8, |v: Value| v.as_u32() as u8),
                Op::I32Store16 => store!(store_u16, |v: Value| v.as_u32() as u16),
                Op::I64Store8 => store!(store_u8, |v: Value| v.as_u64() as u8),
                Op::I64Store16 => store!(store_u16, |v: Value| v.as_u64() as u16),
                Op::I64Store32 => store!(store_u32, |v: Value| v.as_u64() as u32),
                Op::MemorySize => {
                    let maddr = mem_addr!();
                    stack.push(Value::from_u32(machine.memories[maddr].size()));
                }
                Op::MemoryGrow => {
                    let delta = pop_val!().as_u32();
                    let maddr = mem_addr!();
                    stack.push(Value::from_u32(machine.memories[maddr].grow(delta)));
                }
                Op::I32Const | Op::I64Const | Op::F32Const | Op::F64Const => {
                    stack.push(operand)
                }
                Op::I32Eqz => {
                    let v = pop_val!().as_u32();
                    stack.push(Value::from_u32((v == 0) as u32));
                }
                Op::I32Eq => compare!(u32, ==),
                Op::I32Ne => compare!(u32, !=),
                Op::I32LtS => compare!(i32, <),
                Op::I32LtU => compare!(u32, <),
                Op::I32GtS => compare!(i32, >),
                Op::I32GtU => compare!(u32, >),
                Op::I32LeS => compare!(i32, <=),
                Op::I32LeU => compare!(u32, <=),
                Op::I32GeS => compare!(i32, >=),
                Op::I32GeU => compare!(u32, >=),
                Op::I64Eqz => {
                    let v = pop_val!().as_u64();
                    stack.push(Value::from_u32((v == 0) as u32));
                }
                Op::I64Eq => compare!(u64, ==),
                Op::I64Ne => compare!(u64, !=),
                Op::I64LtS => compare!(i64, <),
                Op::I64LtU => compare!(u64, <),
                Op::I64GtS => compare!(i64, >),
                Op::I64GtU => compare!(u64, >),
                Op::I64LeS => compare!(i64, <=),
                Op::I64LeU => compare!(u64, <=),
                Op::I64GeS => compare!(i64, >=),
                Op::I64GeU => compare!(u64, >=),
                Op::F32Eq => compare!(f32, ==),
                Op::F32Ne => compare!(f32, !=),
                Op::F32Lt => compare!(f32, <),
                Op::F32Gt => compare!(f32, >),
                Op::F32Le => compare!(f32, <=),
                Op::F32Ge => compare!(f32, >=),
                Op::F64Eq => compare!(f64, ==),
                Op::F64Ne => compare!(f64, !=),
                Op::F64Lt => compare!(f64, <),
                Op::F64Gt => compare!(f64, >),
                Op::F64Le => compare!(f64, <=),
                Op::F64Ge => compare!(f64, >=),
                Op::I32Clz => unary!(u32, |a: u32| a.leading_zeros()),
                Op::I32Ctz => unary!(u32, |a: u32| a.trailing_zeros()),
                Op::I32Popcnt => unary!(u32, |a: u32| a.count_ones()),
                Op::I32Add => binary!(u32, .wrapping_add),
                Op::I32Sub => binary!(u32, .wrapping_sub),
                Op::I32Mul => binary!(u32, .wrapping_mul),
                Op::I32DivS => div_s!(i32),
                Op::I32DivU => div_u!(u32),
                Op::I32RemS => rem_s!(i32),
                Op::I32RemU => rem_u!(u32),
                Op::I32And => binary!(u32, &),
                Op::I32Or => binary!(u32, |),
                Op::I32Xor => binary!(u32, ^),
                Op::I32Shl => shift!(u32, <<),
                Op::I32ShrS => shr_s!(i32, u32, 32),
                Op::I32ShrU => shift!(u32, >>),
                Op::I32Rotl => rotate!(u32, left),
                Op::I32Rotr => rotate!(u32, right),
                Op::I64Clz => unary!(u64, |a: u64| a.leading_zeros() as u64),
                Op::I64Ctz => unary!(u64, |a: u64| a.trailing_zeros() as u64),
                Op::I64Popcnt => unary!(u64, |a: u64| a.count_ones() as u64),
                Op::I64Add => binary!(u64, .wrapping_add),
                Op::I64Sub => binary!(u64, .wrapping_sub),
                Op::I64Mul => binary!(u64, .wrapping_mul),
                Op::I64DivS => div_s!(i64),
                Op::I64DivU => div_u!(u64),
                Op::I64RemS => rem_s!(i64),
                Op::I64RemU => rem_u!(u64),
                Op::I64And => binary!(u64, &),
                Op::I64Or => binary!(u64, |),
                Op::I64Xor => binary!(u64, ^),
                Op::I64Shl => shift!(u64, <<),
                Op::I64ShrS => shr_s!(i64, u64, 64),
                Op::I64ShrU => shift!(u64, >>),
                Op::I64Rotl => rotate!(u64, left),
                Op::I64Rotr => rotate!(u64, right),
                Op::F32Abs => unary!(f32, f32::abs),
                Op::F32Neg => unary!(f32, |a: f32| -a),
                Op::F32Ceil => unary!(f32, f32::ceil),
                Op::F32Floor => unary!(f32, f32::floor),
                Op::F32Trunc => unary!(f32, f32::trunc),
                Op::F32Nearest => nearest!(f32),
                Op::F32Sqrt => unary!(f32, f32::sqrt),
                Op::F32Add => binary!(f32, +),
                Op::F32Sub => binary!(f32, -),
                Op::F32Mul => binary!(f32, *),
                Op::F32Div => binary!(f32, /),
                Op::F32Min => minmax!(f32, min),
                Op::F32Max => minmax!(f32, max),
                Op::F32Copysign => copysign!(f32),
                Op::F64Abs => unary!(f64, f64::abs),
                Op::F64Neg => unary!(f64, |a: f64| -a),
                Op::F64Ceil => unary!(f64, f64::ceil),
                Op::F64Floor => unary!(f64, f64::floor),
                Op::F64Trunc => unary!(f64, f64::trunc),
                Op::F64Nearest => nearest!(f64),
                Op::F64Sqrt => unary!(f64, f64::sqrt),
                Op::F64Add => binary!(f64, +),
                Op::F64Sub => binary!(f64, -),
                Op::F64Mul => binary!(f64, *),
                Op::F64Div => binary!(f64, /),
                Op::F64Min => minmax!(f64, min),
                Op::F64Max => minmax!(f64, max),
                Op::F64Copysign => copysign!(f64),
                Op::I32WrapI64 => convert!(u64 -> u32),
                Op::I32TruncF32S => trunc!(f32 -> i32 : -2147483777.0, 2147483648.0),
                Op::I32TruncF32U => trunc!(f32 -> u32 : -1.0, 4294967296.0),
                Op::I32TruncF64S => trunc!(f64 -> i32 : -2147483649.0, 2147483648.0),
                Op::I32TruncF64U => trunc!(f64 -> u32 : -1.0, 4294967296.0),
                Op::I64ExtendI32S => convert!(i32 -> i64),
                Op::I64ExtendI32U => convert!(u32 -> u64),
                Op::I64TruncF32S => trunc!(f32 -> i64 : -9223373136366404000.0, 9223372036854776000.0),
                Op::I64TruncF32U => trunc!(f32 -> u64 : -1.0, 18446744073709552000.0),
                Op::I64TruncF64S => trunc!(f64 -> i64 : -9223372036854777856.0, 9223372036854776000.0),
                Op::I64TruncF64U => trunc!(f64 -> u64 : -1.0, 18446744073709552000.0),
                Op::F32ConvertI32S => convert!(i32 -> f32),
                Op::F32ConvertI32U => convert!(u32 -> f32),
                Op::F32ConvertI64S => convert!(i64 -> f32),
                Op::F32ConvertI64U => convert!(u64 -> f32),
                Op::F32DemoteF64 => convert!(f64 -> f32),
                Op::F64ConvertI32S => convert!(i32 -> f64),
                Op::F64ConvertI32U => convert!(u32 -> f64),
                Op::F64ConvertI64S => convert!(i64 -> f64),
                Op::F64ConvertI64U => convert!(u64 -> f64),
                Op::F64PromoteF32 => convert!(f32 -> f64),
                Op::I32Extend8S => extend!(i32 as i8 => i32),
                Op::I32Extend16S => extend!(i32 as i16 => i32),
                Op::I64Extend8S => extend!(i64 as i8 => i64),
                Op::I64Extend16S => extend!(i64 as i16 => i64),
                Op::I64Extend32S => extend!(i64 as i32 => i64),
                Op::RefNull => stack.push(Value::NULL),
                Op::RefIsNull => {
                    let v = pop_val!();
                    stack.push(Value::from_u32(v.is_null() as u32));
                }
                Op::RefFunc => {
                    let faddr = instance.funcs[operand.as_u32() as usize];
                    stack.push(Value::from_ref(faddr, ValType::FuncRef));
                }
                // Rust's saturating float-to-int cast is exactly the
                // trunc_sat contract, NaN included.
                Op::I32TruncSatF32S => convert!(f32 -> i32),
                Op::I32TruncSatF32U => convert!(f32 -> u32),
                Op::I32TruncSatF64S => convert!(f64 -> i32),
                Op::I32TruncSatF64U => convert!(f64 -> u32),
                Op::I64TruncSatF32S => convert!(f32 -> i64),
                Op::I64TruncSatF32U => convert!(f32 -> u64),
                Op::I64TruncSatF64S => convert!(f64 -> i64),
                Op::I64TruncSatF64U => convert!(f64 -> u64),
                Op::MemoryInit => {
                    let daddr = instance.datas[operand.as_u32() as usize];
                    let n = pop_val!().as_u32();
                    let src = pop_val!().as_u32();
                    let dst = pop_val!().as_u32();
                    let maddr = mem_addr!();
                    machine.memory_init(maddr, daddr, dst, src, n)?;
                }
                Op::DataDrop => {
                    let daddr = instance.datas[operand.as_u32() as usize];
                    machine.datas[daddr] = Vec::new();
                }
                Op::MemoryCopy => {
                    let n = pop_val!().as_u32();
                    let src = pop_val!().as_u32();
                    let dst = pop_val!().as_u32();
                    let maddr = mem_addr!();
                    machine.memories[maddr].copy(dst, src, n)?;
                }
                Op::MemoryFill => {
                    let n = pop_val!().as_u32();
                    let v = pop_val!().as_u32() as u8;
                    let dst = pop_val!().as_u32();
                    let maddr = mem_addr!();
                    machine.memories[maddr].fill(dst, v, n)?;
                }
                Op::TableInit => {
                    let eaddr = instance.elems[operand.first() as usize];
                    let taddr = instance.tables[operand.second() as usize];
                    let n = pop_val!().as_u32();
                    let src = pop_val!().as_u32();
                    let dst = pop_val!().as_u32();
                    machine.table_init(taddr, eaddr, dst, src, n)?;
                }
                Op::ElemDrop => {
                    let eaddr = instance.elems[operand.as_u32() as usize];
                    machine.elems[eaddr] = Vec::new();
                }
                Op::TableCopy => {
                    let dst_t = instance.tables[operand.first() as usize];
                    let src_t = instance.tables[operand.second() as usize];
                    let n = pop_val!().as_u32();
                    let src = pop_val!().as_u32();
                    let dst = pop_val!().as_u32();
                    machine.table_copy(dst_t, src_t, dst, src, n)?;
                }
                Op::TableGrow => {
                    let taddr = instance.tables[operand.as_u32() as usize];
                    let delta = pop_val!().as_u32();
                    let init = pop_val!();
                    stack.push(Value::from_u32(machine.tables[taddr].grow(delta, init)));
                }
                Op::TableSize => {
                    let taddr = instance.tables[operand.as_u32() as usize];
                    stack.push(Value::from_u32(machine.tables[taddr].size()));
                }
                Op::TableFill => {
                    let taddr = instance.tables[operand.as_u32() as usize];
                    let n = pop_val!().as_u32();
                    let v = pop_val!();
                    let i = pop_val!().as_u32();
                    machine.tables[taddr].fill(i, v, n)?;
                }
                Op::Vector => return runtime(VECTOR_UNSUPPORTED),
            }
            pc = pc.wrapping_add(1);
        }
        Ok(())
    }
}
