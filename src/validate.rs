//! Module checker, run once before instantiation.
//!
//! The dispatch loop indexes locals, globals, labels and types without
//! bounds checks and reinterprets value lanes by static type. This pass
//! is what makes that safe: every flattened body is walked with a typed
//! stack, and the structural rules the decoder cannot see (start
//! signature, initializer expressions, segment typing) are checked here.

use crate::debug_println;
use crate::error::*;
use crate::instr::FlatCode;
use crate::module::{DataMode, ElemItems, ElemMode, Module};
use crate::opcode::Op;
use crate::types::{block_shorthand, Mut, ValType};
use crate::value::Value;

/// One checked-stack entry. `Barrier` fences a control frame's operands;
/// `Any` is the wildcard that dead code may produce.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Ty {
    Val(ValType),
    Barrier,
    Any,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum ControlKind {
    Func,
    Block,
    Loop,
    If,
    IfElse,
}

struct ControlFrame {
    /// What a branch targeting this frame must supply: loop headers take
    /// their parameters again, everything else yields its results.
    expected: Vec<ValType>,
    params: Vec<ValType>,
    results: Vec<ValType>,
    /// Reachability of the enclosing flow, restored when this frame ends.
    polymorphic: bool,
    kind: ControlKind,
}

struct ValidatorStack {
    polymorphic: bool,
    buf: Vec<Ty>,
}

impl ValidatorStack {
    fn new() -> Self {
        // The floor barrier doubles as the function frame's fence.
        Self { polymorphic: false, buf: vec![Ty::Barrier] }
    }

    fn polymorphism(&self) -> bool {
        self.polymorphic
    }

    fn set_polymorphism(&mut self, poly: bool) {
        self.polymorphic = poly;
    }

    /// Marks the current flow dead and discards its operands down to the
    /// nearest barrier.
    fn polymorphize(&mut self) {
        self.polymorphic = true;
        if let Some(pos) = self.buf.iter().rposition(|&t| t == Ty::Barrier) {
            self.buf.truncate(pos + 1);
        }
    }

    fn depolymorphize(&mut self) {
        self.polymorphic = false;
    }

    fn push(&mut self, ty: ValType) {
        self.buf.push(Ty::Val(ty));
    }

    fn push_entry(&mut self, entry: Ty) {
        self.buf.push(entry);
    }

    fn push_slice(&mut self, tys: &[ValType]) {
        for &ty in tys {
            self.buf.push(Ty::Val(ty));
        }
    }

    fn count_matching_suffix(&self, expected: &[ValType]) -> usize {
        let available = self.buf.len();
        let to_compare = expected.len().min(available);
        let mut matched = 0;
        while matched < to_compare {
            let want = expected[expected.len() - 1 - matched];
            let ok = match self.buf[available - 1 - matched] {
                Ty::Val(t) => t == want,
                Ty::Any => true,
                Ty::Barrier => false,
            };
            if !ok {
                break;
            }
            matched += 1;
        }
        matched
    }

    fn check_slice(&self, expected: &[ValType]) -> bool {
        let matched = self.count_matching_suffix(expected);
        if matched == expected.len() {
            return true;
        }
        let available = self.buf.len();
        if matched == available {
            return self.polymorphic;
        }
        // A short match is fine only when the flow is dead and the next
        // entry is the frame's barrier.
        self.polymorphic && self.buf[available - 1 - matched] == Ty::Barrier
    }

    /// Exact match: the suffix agrees and nothing else sits above the
    /// frame's barrier.
    fn equals_slice(&self, expected: &[ValType]) -> bool {
        let matched = self.count_matching_suffix(expected);
        let available = self.buf.len();
        if matched == available {
            return self.polymorphic;
        }
        if self.buf[available - 1 - matched] != Ty::Barrier {
            return false;
        }
        if matched == expected.len() {
            return true;
        }
        self.polymorphic
    }

    fn pop_slice(&mut self, expected: &[ValType]) -> Result<(), Trap> {
        if !self.check_slice(expected) {
            return validation(TYPE_MISMATCH);
        }
        let matched = self.count_matching_suffix(expected);
        let new_len = self.buf.len() - matched;
        self.buf.truncate(new_len);
        Ok(())
    }

    /// Pops one entry of whatever type; dead flow may synthesize a
    /// wildcard at the barrier.
    fn pop_loose(&mut self) -> Result<Ty, Trap> {
        match self.buf.last().copied() {
            Some(Ty::Barrier) | None => {
                if self.polymorphic {
                    Ok(Ty::Any)
                } else {
                    validation(TYPE_MISMATCH)
                }
            }
            Some(entry) => {
                self.buf.pop();
                Ok(entry)
            }
        }
    }

    fn pop_barrier(&mut self) -> Result<(), Trap> {
        match self.buf.pop() {
            Some(Ty::Barrier) => Ok(()),
            _ => validation(TYPE_MISMATCH),
        }
    }

    /// Block entry: consume the arguments, fence the new frame, resupply
    /// the arguments inside it.
    fn enter_flow(&mut self, params: &[ValType]) -> Result<(), Trap> {
        self.pop_slice(params)?;
        self.buf.push(Ty::Barrier);
        self.push_slice(params);
        Ok(())
    }

    /// Non-destructive branch check against the frame `depth` levels up.
    fn check_br(&mut self, ctrls: &[ControlFrame], depth: u32) -> Result<(), Trap> {
        if depth as usize >= ctrls.len() {
            return validation(UNKNOWN_LABEL);
        }
        let expected = &ctrls[ctrls.len() - 1 - depth as usize].expected;
        self.pop_slice(expected)?;
        self.push_slice(expected);
        Ok(())
    }
}

macro_rules! numeric {
    ($vs:ident, [$($i:ident),*] -> [$($o:ident),*]) => {{
        $vs.pop_slice(&[$(ValType::$i),*])?;
        $vs.push_slice(&[$(ValType::$o),*]);
    }};
}

macro_rules! load {
    ($module:ident, $vs:ident, $operand:ident, $ty:ident, $natural:expr) => {{
        check_memarg($module, $operand, $natural)?;
        $vs.pop_slice(&[ValType::I32])?;
        $vs.push(ValType::$ty);
    }};
}

macro_rules! store {
    ($module:ident, $vs:ident, $operand:ident, $ty:ident, $natural:expr) => {{
        check_memarg($module, $operand, $natural)?;
        $vs.pop_slice(&[ValType::I32, ValType::$ty])?;
    }};
}

/// Checks a decoded module. On success every body is type-correct, every
/// index it mentions is in range, and every initializer is constant.
pub fn validate(module: &Module) -> Result<(), Trap> {
    if let Some(start) = module.start {
        let ftype = module.func_type(start);
        if !ftype.params.is_empty() || !ftype.results.is_empty() {
            return validation(START_FUNC);
        }
    }

    for decl in &module.globals {
        if let Some(init) = &decl.init {
            check_const_expr(module, init, decl.gtype.vtype)?;
        }
    }

    for decl in &module.elems {
        if let ElemMode::Active { table, offset } = &decl.mode {
            if module.tables[*table as usize].elem != decl.etype {
                return validation(TYPE_MISMATCH);
            }
            check_const_expr(module, offset, ValType::I32)?;
        }
        if let ElemItems::Exprs(exprs) = &decl.items {
            for expr in exprs {
                check_const_expr(module, expr, decl.etype)?;
            }
        }
    }

    for decl in &module.datas {
        if let DataMode::Active { offset, .. } = &decl.mode {
            check_const_expr(module, offset, ValType::I32)?;
        }
    }

    for i in 0..module.func_bodies.len() {
        check_body(module, i)?;
    }
    Ok(())
}

/// Initializer expressions allow only constants, reference literals and
/// reads of imported immutable globals, and must leave exactly one value
/// of the expected type.
fn check_const_expr(module: &Module, code: &FlatCode, want: ValType) -> Result<(), Trap> {
    let mut stack: Vec<ValType> = Vec::new();
    for ins in &code.code {
        match ins.op {
            Op::I32Const => stack.push(ValType::I32),
            Op::I64Const => stack.push(ValType::I64),
            Op::F32Const => stack.push(ValType::F32),
            Op::F64Const => stack.push(ValType::F64),
            Op::RefNull => {
                match ValType::from_byte(ins.operand.as_u32() as u8) {
                    Some(ty) => stack.push(ty),
                    None => return validation(TYPE_MISMATCH),
                }
            }
            Op::RefFunc => {
                if ins.operand.as_u32() as usize >= module.funcs.len() {
                    return validation(UNKNOWN_FUNC);
                }
                stack.push(ValType::FuncRef);
            }
            Op::GlobalGet => {
                let idx = ins.operand.as_u32() as usize;
                if idx >= module.num_imported_globals {
                    return validation(UNKNOWN_GLOBAL);
                }
                let gtype = module.globals[idx].gtype;
                if gtype.mutability != Mut::Const {
                    return validation(CONST_EXP_REQUIRED);
                }
                stack.push(gtype.vtype);
            }
            Op::End => break,
            _ => return validation(CONST_EXP_REQUIRED),
        }
    }
    if stack != [want] {
        return validation(TYPE_MISMATCH);
    }
    Ok(())
}

fn block_signature(module: &Module, bt: i64) -> (Vec<ValType>, Vec<ValType>) {
    if bt < 0 {
        return (Vec::new(), block_shorthand(bt).into_iter().collect());
    }
    let ftype = &module.types[bt as usize];
    (ftype.params.clone(), ftype.results.clone())
}

fn check_memarg(module: &Module, operand: Value, natural: u32) -> Result<(), Trap> {
    if module.memories.is_empty() {
        return validation(UNKNOWN_MEMORY);
    }
    let align = operand.mem_align();
    if align >= 32 {
        return malformed(INT_TOO_LARGE);
    }
    if 1u64 << align > natural as u64 {
        return validation(ALIGNMENT_TOO_LARGE);
    }
    Ok(())
}

fn check_body(module: &Module, index: usize) -> Result<(), Trap> {
    let ftype = module.func_type((module.num_imported_funcs + index) as u32);
    let body = &module.func_bodies[index];
    let mut locals: Vec<ValType> = ftype.params.clone();
    locals.extend_from_slice(&body.locals);
    // v128 decodes as a type but has no executable operations.
    if locals.iter().chain(&ftype.results).any(|&t| t == ValType::V128) {
        return validation(VECTOR_UNSUPPORTED);
    }
    debug_println!(
        "check body {} {} ({} instructions)",
        index,
        ftype,
        body.code.code.len()
    );

    let mut vs = ValidatorStack::new();
    let mut cs: Vec<ControlFrame> = Vec::with_capacity(64);
    cs.push(ControlFrame {
        expected: ftype.results.clone(),
        params: Vec::new(),
        results: ftype.results.clone(),
        polymorphic: false,
        kind: ControlKind::Func,
    });

    let code = &body.code;
    for ins in &code.code {
        let operand = ins.operand;
        match ins.op {
            // Control
            Op::Unreachable => vs.polymorphize(),
            Op::Nop => {}
            Op::Block => {
                let (params, results) = block_signature(module, operand.block_type());
                vs.enter_flow(&params)?;
                cs.push(ControlFrame {
                    expected: results.clone(),
                    params,
                    results,
                    polymorphic: vs.polymorphism(),
                    kind: ControlKind::Block,
                });
                vs.depolymorphize();
            }
            Op::Loop => {
                let (params, results) = block_signature(module, operand.block_type());
                vs.enter_flow(&params)?;
                cs.push(ControlFrame {
                    expected: params.clone(),
                    params,
                    results,
                    polymorphic: vs.polymorphism(),
                    kind: ControlKind::Loop,
                });
                vs.depolymorphize();
            }
            Op::If => {
                let (params, results) = block_signature(module, operand.if_block_type());
                vs.pop_slice(&[ValType::I32])?;
                vs.enter_flow(&params)?;
                cs.push(ControlFrame {
                    expected: results.clone(),
                    params,
                    results,
                    polymorphic: vs.polymorphism(),
                    kind: ControlKind::If,
                });
                vs.depolymorphize();
            }
            Op::Else => {
                let Some(top) = cs.last_mut() else {
                    return validation(ELSE_MUST_CLOSE_IF);
                };
                if top.kind != ControlKind::If {
                    return validation(ELSE_MUST_CLOSE_IF);
                }
                if !vs.equals_slice(&top.results) {
                    return validation(TYPE_MISMATCH);
                }
                vs.pop_slice(&top.results)?;
                vs.push_slice(&top.params);
                top.kind = ControlKind::IfElse;
                vs.depolymorphize();
            }
            Op::End => {
                let Some(top) = cs.pop() else {
                    return validation(TYPE_MISMATCH);
                };
                if !vs.equals_slice(&top.results) {
                    return validation(TYPE_MISMATCH);
                }
                vs.pop_slice(&top.results)?;
                if cs.is_empty() {
                    // Function frame; flattening guarantees this END is last.
                    break;
                }
                // An IF that never saw an ELSE validates its empty false
                // arm: arguments must pass through unchanged.
                if top.kind == ControlKind::If && top.params != top.results {
                    return validation(TYPE_MISMATCH);
                }
                vs.pop_barrier()?;
                vs.set_polymorphism(top.polymorphic);
                vs.push_slice(&top.results);
            }
            Op::Br => {
                vs.check_br(&cs, operand.as_u32())?;
                vs.polymorphize();
            }
            Op::BrIf => {
                vs.pop_slice(&[ValType::I32])?;
                vs.check_br(&cs, operand.as_u32())?;
            }
            Op::BrTable => {
                vs.pop_slice(&[ValType::I32])?;
                let arms = &code.br_tables[operand.as_u32() as usize];
                for &depth in arms {
                    if depth as usize >= cs.len() {
                        return validation(UNKNOWN_LABEL);
                    }
                }
                let base = cs.len() - 1;
                let default = arms[arms.len() - 1];
                let default_expected = &cs[base - default as usize].expected;
                for &depth in arms {
                    if cs[base - depth as usize].expected != *default_expected {
                        return validation(TYPE_MISMATCH);
                    }
                }
                vs.check_br(&cs, default)?;
                vs.polymorphize();
            }
            Op::Return => {
                vs.check_br(&cs, cs.len() as u32 - 1)?;
                vs.polymorphize();
            }
            Op::Call => {
                let idx = operand.as_u32();
                if idx as usize >= module.funcs.len() {
                    return validation(UNKNOWN_FUNC);
                }
                let ftype = module.func_type(idx);
                vs.pop_slice(&ftype.params)?;
                vs.push_slice(&ftype.results);
            }
            Op::CallIndirect => {
                let type_idx = operand.first();
                let table_idx = operand.second();
                if table_idx as usize >= module.tables.len() {
                    return validation(UNKNOWN_TABLE);
                }
                if module.tables[table_idx as usize].elem != ValType::FuncRef {
                    return validation(TYPE_MISMATCH);
                }
                if type_idx as usize >= module.types.len() {
                    return validation(UNKNOWN_TYPE);
                }
                let ftype = &module.types[type_idx as usize];
                vs.pop_slice(&[ValType::I32])?;
                vs.pop_slice(&ftype.params)?;
                vs.push_slice(&ftype.results);
            }

            // Parametric
            Op::Drop => {
                vs.pop_loose()?;
            }
            Op::Select => {
                vs.pop_slice(&[ValType::I32])?;
                let a = vs.pop_loose()?;
                let b = vs.pop_loose()?;
                let merged = match (a, b) {
                    (Ty::Any, other) | (other, Ty::Any) => other,
                    (x, y) if x == y => x,
                    _ => return validation(TYPE_MISMATCH),
                };
                if let Ty::Val(t) = merged {
                    if !t.is_num() {
                        return validation(TYPE_MISMATCH);
                    }
                }
                vs.push_entry(merged);
            }
            Op::SelectT => {
                let Some(ty) = ValType::from_byte(operand.as_u32() as u8) else {
                    return validation(TYPE_MISMATCH);
                };
                vs.pop_slice(&[ValType::I32])?;
                vs.pop_slice(&[ty, ty])?;
                vs.push(ty);
            }

            // Variables
            Op::LocalGet => {
                let Some(&ty) = locals.get(operand.as_u32() as usize) else {
                    return validation(UNKNOWN_LOCAL);
                };
                vs.push(ty);
            }
            Op::LocalSet => {
                let Some(&ty) = locals.get(operand.as_u32() as usize) else {
                    return validation(UNKNOWN_LOCAL);
                };
                vs.pop_slice(&[ty])?;
            }
            Op::LocalTee => {
                let Some(&ty) = locals.get(operand.as_u32() as usize) else {
                    return validation(UNKNOWN_LOCAL);
                };
                vs.pop_slice(&[ty])?;
                vs.push(ty);
            }
            Op::GlobalGet => {
                let Some(decl) = module.globals.get(operand.as_u32() as usize) else {
                    return validation(UNKNOWN_GLOBAL);
                };
                vs.push(decl.gtype.vtype);
            }
            Op::GlobalSet => {
                let Some(decl) = module.globals.get(operand.as_u32() as usize) else {
                    return validation(UNKNOWN_GLOBAL);
                };
                if decl.gtype.mutability != Mut::Var {
                    return validation(GLOBAL_IS_IMMUTABLE);
                }
                vs.pop_slice(&[decl.gtype.vtype])?;
            }

            // Tables
            Op::TableGet => {
                let Some(ttype) = module.tables.get(operand.as_u32() as usize) else {
                    return validation(UNKNOWN_TABLE);
                };
                vs.pop_slice(&[ValType::I32])?;
                vs.push(ttype.elem);
            }
            Op::TableSet => {
                let Some(ttype) = module.tables.get(operand.as_u32() as usize) else {
                    return validation(UNKNOWN_TABLE);
                };
                vs.pop_slice(&[ValType::I32, ttype.elem])?;
            }

            // Memory
            Op::I32Load => load!(module, vs, operand, I32, 4),
            Op::I64Load => load!(module, vs, operand, I64, 8),
            Op::F32Load => load!(module, vs, operand, F32, 4),
            Op::F64Load => load!(module, vs, operand, F64, 8),
            Op::I32Load8S | Op::I32Load8U => load!(module, vs, operand, I32, 1),
            Op::I32Load16S | Op::I32Load16U => load!(module, vs, operand, I32, 2),
            Op::I64Load8S | Op::I64Load8U => load!(module, vs, operand, I64, 1),
            Op::I64Load16S | Op::I64Load16U => load!(module, vs, operand, I64, 2),
            Op::I64Load32S | Op::I64Load32U => load!(module, vs, operand, I64, 4),
            Op::I32Store => store!(module, vs, operand, I32, 4),
            Op::I64Store => store!(module, vs, operand, I64, 8),
            Op::F32Store => store!(module, vs, operand, F32, 4),
            Op::F64Store => store!(module, vs, operand, F64, 8),
            Op::I32Store8 => store!(module, vs, operand, I32, 1),
            Op::I32Store16 => store!(module, vs, operand, I32, 2),
            Op::I64Store8 => store!(module, vs, operand, I64, 1),
            Op::I64Store16 => store!(module, vs, operand, I64, 2),
            Op::I64Store32 => store!(module, vs, operand, I64, 4),
            Op::MemorySize => {
                if module.memories.is_empty() {
                    return validation(UNKNOWN_MEMORY);
                }
                vs.push(ValType::I32);
            }
            Op::MemoryGrow => {
                if module.memories.is_empty() {
                    return validation(UNKNOWN_MEMORY);
                }
                numeric!(vs, [I32] -> [I32])
            }

            // Constants
            Op::I32Const => vs.push(ValType::I32),
            Op::I64Const => vs.push(ValType::I64),
            Op::F32Const => vs.push(ValType::F32),
            Op::F64Const => vs.push(ValType::F64),

            // Comparisons
            Op::I32Eqz => numeric!(vs, [I32] -> [I32]),
            Op::I32Eq | Op::I32Ne | Op::I32LtS | Op::I32LtU | Op::I32GtS | Op::I32GtU
            | Op::I32LeS | Op::I32LeU | Op::I32GeS | Op::I32GeU => {
                numeric!(vs, [I32, I32] -> [I32])
            }
            Op::I64Eqz => numeric!(vs, [I64] -> [I32]),
            Op::I64Eq | Op::I64Ne | Op::I64LtS | Op::I64LtU | Op::I64GtS | Op::I64GtU
            | Op::I64LeS | Op::I64LeU | Op::I64GeS | Op::I64GeU => {
                numeric!(vs, [I64, I64] -> [I32])
            }
            Op::F32Eq | Op::F32Ne | Op::F32Lt | Op::F32Gt | Op::F32Le | Op::F32Ge => {
                numeric!(vs, [F32, F32] -> [I32])
            }
            Op::F64Eq | Op::F64Ne | Op::F64Lt | Op::F64Gt | Op::F64Le | Op::F64Ge => {
                numeric!(vs, [F64, F64] -> [I32])
            }

            // Integer arithmetic
            Op::I32Clz | Op::I32Ctz | Op::I32Popcnt => numeric!(vs, [I32] -> [I32]),
            Op::I32Add | Op::I32Sub | Op::I32Mul | Op::I32DivS | Op::I32DivU | Op::I32RemS
            | Op::I32RemU | Op::I32And | Op::I32Or | Op::I32Xor | Op::I32Shl | Op::I32ShrS
            | Op::I32ShrU | Op::I32Rotl | Op::I32Rotr => numeric!(vs, [I32, I32] -> [I32]),
            Op::I64Clz | Op::I64Ctz | Op::I64Popcnt => numeric!(vs, [I64] -> [I64]),
            Op::I64Add | Op::I64Sub | Op::I64Mul | Op::I64DivS | Op::I64DivU | Op::I64RemS
            | Op::I64RemU | Op::I64And | Op::I64Or | Op::I64Xor | Op::I64Shl | Op::I64ShrS
            | Op::I64ShrU | Op::I64Rotl | Op::I64Rotr => numeric!(vs, [I64, I64] -> [I64]),

            // Float arithmetic
            Op::F32Abs | Op::F32Neg | Op::F32Ceil | Op::F32Floor | Op::F32Trunc
            | Op::F32Nearest | Op::F32Sqrt => numeric!(vs, [F32] -> [F32]),
            Op::F32Add | Op::F32Sub | Op::F32Mul | Op::F32Div | Op::F32Min | Op::F32Max
            | Op::F32Copysign => numeric!(vs, [F32, F32] -> [F32]),
            Op::F64Abs | Op::F64Neg | Op::F64Ceil | Op::F64Floor | Op::F64Trunc
            | Op::F64Nearest | Op::F64Sqrt => numeric!(vs, [F64] -> [F64]),
            Op::F64Add | Op::F64Sub | Op::F64Mul | Op::F64Div | Op::F64Min | Op::F64Max
            | Op::F64Copysign => numeric!(vs, [F64, F64] -> [F64]),

            // Conversions
            Op::I32WrapI64 => numeric!(vs, [I64] -> [I32]),
            Op::I32TruncF32S | Op::I32TruncF32U | Op::I32TruncSatF32S | Op::I32TruncSatF32U
            | Op::I32ReinterpretF32 => numeric!(vs, [F32] -> [I32]),
            Op::I32TruncF64S | Op::I32TruncF64U | Op::I32TruncSatF64S | Op::I32TruncSatF64U => {
                numeric!(vs, [F64] -> [I32])
            }
            Op::I64ExtendI32S | Op::I64ExtendI32U => numeric!(vs, [I32] -> [I64]),
            Op::I64TruncF32S | Op::I64TruncF32U | Op::I64TruncSatF32S | Op::I64TruncSatF32U => {
                numeric!(vs, [F32] -> [I64])
            }
            Op::I64TruncF64S | Op::I64TruncF64U | Op::I64TruncSatF64S | Op::I64TruncSatF64U
            | Op::I64ReinterpretF64 => numeric!(vs, [F64] -> [I64]),
            Op::F32ConvertI32S | Op::F32ConvertI32U | Op::F32ReinterpretI32 => {
                numeric!(vs, [I32] -> [F32])
            }
            Op::F32ConvertI64S | Op::F32ConvertI64U => numeric!(vs, [I64] -> [F32]),
            Op::F32DemoteF64 => numeric!(vs, [F64] -> [F32]),
            Op::F64ConvertI32S | Op::F64ConvertI32U => numeric!(vs, [I32] -> [F64]),
            Op::F64ConvertI64S | Op::F64ConvertI64U | Op::F64ReinterpretI64 => {
                numeric!(vs, [I64] -> [F64])
            }
            Op::F64PromoteF32 => numeric!(vs, [F32] -> [F64]),

            // Sign extension
            Op::I32Extend8S | Op::I32Extend16S => numeric!(vs, [I32] -> [I32]),
            Op::I64Extend8S | Op::I64Extend16S | Op::I64Extend32S => {
                numeric!(vs, [I64] -> [I64])
            }

            // References
            Op::RefNull => {
                match ValType::from_byte(operand.as_u32() as u8) {
                    Some(ty) => vs.push(ty),
                    None => return validation(TYPE_MISMATCH),
                }
            }
            Op::RefIsNull => {
                match vs.pop_loose()? {
                    Ty::Val(t) if !t.is_ref() => return validation(TYPE_MISMATCH),
                    _ => {}
                }
                vs.push(ValType::I32);
            }
            Op::RefFunc => {
                let idx = operand.as_u32();
                if idx as usize >= module.funcs.len() {
                    return validation(UNKNOWN_FUNC);
                }
                if !module.declared_funcs.contains(&idx) {
                    return validation(UNDECLARED_FUNC_REF);
                }
                vs.push(ValType::FuncRef);
            }

            // Bulk memory
            Op::MemoryInit => {
                if module.memories.is_empty() {
                    return validation(UNKNOWN_MEMORY);
                }
                if operand.as_u32() as usize >= module.datas.len() {
                    return validation(UNKNOWN_DATA_SEG);
                }
                vs.pop_slice(&[ValType::I32, ValType::I32, ValType::I32])?;
            }
            Op::DataDrop => {
                if operand.as_u32() as usize >= module.datas.len() {
                    return validation(UNKNOWN_DATA_SEG);
                }
            }
            Op::MemoryCopy | Op::MemoryFill => {
                if module.memories.is_empty() {
                    return validation(UNKNOWN_MEMORY);
                }
                vs.pop_slice(&[ValType::I32, ValType::I32, ValType::I32])?;
            }

            // Bulk table
            Op::TableInit => {
                let elem_idx = operand.first() as usize;
                let table_idx = operand.second() as usize;
                let Some(ttype) = module.tables.get(table_idx) else {
                    return validation(UNKNOWN_TABLE);
                };
                let Some(decl) = module.elems.get(elem_idx) else {
                    return validation(UNKNOWN_ELEM_SEG);
                };
                if decl.etype != ttype.elem {
                    return validation(TYPE_MISMATCH);
                }
                vs.pop_slice(&[ValType::I32, ValType::I32, ValType::I32])?;
            }
            Op::ElemDrop => {
                if operand.as_u32() as usize >= module.elems.len() {
                    return validation(UNKNOWN_ELEM_SEG);
                }
            }
            Op::TableCopy => {
                let dst = operand.first() as usize;
                let src = operand.second() as usize;
                let (Some(dtype), Some(stype)) =
                    (module.tables.get(dst), module.tables.get(src))
                else {
                    return validation(UNKNOWN_TABLE);
                };
                if dtype.elem != stype.elem {
                    return validation(TYPE_MISMATCH);
                }
                vs.pop_slice(&[ValType::I32, ValType::I32, ValType::I32])?;
            }
            Op::TableGrow => {
                let Some(ttype) = module.tables.get(operand.as_u32() as usize) else {
                    return validation(UNKNOWN_TABLE);
                };
                vs.pop_slice(&[ttype.elem, ValType::I32])?;
                vs.push(ValType::I32);
            }
            Op::TableSize => {
                if operand.as_u32() as usize >= module.tables.len() {
                    return validation(UNKNOWN_TABLE);
                }
                vs.push(ValType::I32);
            }
            Op::TableFill => {
                let Some(ttype) = module.tables.get(operand.as_u32() as usize) else {
                    return validation(UNKNOWN_TABLE);
                };
                vs.pop_slice(&[ValType::I32, ttype.elem, ValType::I32])?;
            }

            Op::Vector => return validation(VECTOR_UNSUPPORTED),
        }
    }
    Ok(())
}
