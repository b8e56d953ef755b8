mod common;

use std::cell::RefCell;
use std::rc::Rc;
use weft::{
    instantiate, Extern, FuncType, Global, GlobalType, Limits, Machine, Memory, Module, Mut, Trap,
    ValType, Value,
};

use common::*;

fn decode(bytes: &[u8]) -> Module {
    Module::decode(bytes).unwrap()
}

/// Exports an adder, a constant global, a memory and a table.
fn provider_module() -> Vec<u8> {
    let mut b = ModuleBuilder::new();
    let bin = b.add_type(&[I32, I32], &[I32]);
    b.add_func(bin, &[], &cat(&[&[0x20, 0x00], &[0x20, 0x01], &[0x6A], &[END]]));
    b.add_global(I32, false, &cat(&[&i32c(5), &[END]]));
    b.add_memory(1, None);
    b.add_table(FUNCREF, 2, None);
    b.export_func("add", 0);
    b.export_global("g", 0);
    b.export_memory("memory", 0);
    b.export_table("table", 0);
    b.build()
}

#[test]
fn imports_resolve_through_the_registry() {
    let mut machine = Machine::new();
    let provider = boot(&mut machine, &provider_module());
    machine.register_instance("a", &provider);

    let mut b = ModuleBuilder::new();
    let bin = b.add_type(&[I32, I32], &[I32]);
    let nullary = b.add_type(&[], &[I32]);
    b.import_func("a", "add", bin);
    b.import_global("a", "g", I32, false);
    b.import_memory("a", "memory", 1, None);
    b.import_table("a", "table", FUNCREF, 2, None);
    // f() = add(g, 37)
    b.add_func(nullary, &[], &cat(&[&[0x23, 0x00], &i32c(37), &[0x10, 0x00], &[END]]));
    b.export_func("f", 1);

    let consumer = instantiate(&mut machine, decode(&b.build())).unwrap();
    assert_eq!(machine.invoke(&consumer, "f", &[]).unwrap()[0].as_i32(), 42);

    // Imported entities alias the provider's, they are not copies.
    assert_eq!(machine.memories.len(), 1);
    assert_eq!(machine.tables.len(), 1);
    assert_eq!(consumer.memories[0], provider.memories[0]);
}

#[test]
fn missing_import_is_a_link_error() {
    let mut b = ModuleBuilder::new();
    let ty = b.add_type(&[], &[]);
    b.import_func("env", "nope", ty);

    let mut machine = Machine::new();
    assert_eq!(
        instantiate(&mut machine, decode(&b.build())).unwrap_err(),
        Trap::Link("unknown import")
    );
}

#[test]
fn import_type_mismatches_are_rejected() {
    let incompatible = Trap::Link("incompatible import type");

    // Function signature mismatch.
    let mut machine = Machine::new();
    machine.register_host("env", "f", |_m: &mut Machine| -> Result<(), Trap> { Ok(()) });
    let mut b = ModuleBuilder::new();
    let unary = b.add_type(&[I32], &[]);
    b.import_func("env", "f", unary);
    assert_eq!(instantiate(&mut machine, decode(&b.build())).unwrap_err(), incompatible);

    // Global value type mismatch.
    let mut machine = Machine::new();
    let gaddr = machine.globals.len();
    machine.globals.push(Global {
        value: Value::from_i32(1),
        gtype: GlobalType { vtype: ValType::I32, mutability: Mut::Const },
    });
    machine.register("env", "g", Extern::Global(gaddr));
    let mut b = ModuleBuilder::new();
    b.import_global("env", "g", I64, false);
    assert_eq!(instantiate(&mut machine, decode(&b.build())).unwrap_err(), incompatible);

    // Mutability mismatch.
    let mut machine = Machine::new();
    let gaddr = machine.globals.len();
    machine.globals.push(Global {
        value: Value::from_i32(1),
        gtype: GlobalType { vtype: ValType::I32, mutability: Mut::Const },
    });
    machine.register("env", "g", Extern::Global(gaddr));
    let mut b = ModuleBuilder::new();
    b.import_global("env", "g", I32, true);
    assert_eq!(instantiate(&mut machine, decode(&b.build())).unwrap_err(), incompatible);

    // Kind mismatch: a global where a function is expected.
    let mut machine = Machine::new();
    let gaddr = machine.globals.len();
    machine.globals.push(Global {
        value: Value::from_i32(1),
        gtype: GlobalType { vtype: ValType::I32, mutability: Mut::Const },
    });
    machine.register("env", "x", Extern::Global(gaddr));
    let mut b = ModuleBuilder::new();
    let void = b.add_type(&[], &[]);
    b.import_func("env", "x", void);
    assert_eq!(instantiate(&mut machine, decode(&b.build())).unwrap_err(), incompatible);
}

#[test]
fn limits_subsumption_gates_imports() {
    let incompatible = Trap::Link("incompatible import type");

    // Provider memory is 1 page, consumer demands at least 2.
    let mut machine = Machine::new();
    let provider = boot(&mut machine, &provider_module());
    machine.register_instance("a", &provider);
    let mut b = ModuleBuilder::new();
    b.import_memory("a", "memory", 2, None);
    assert_eq!(instantiate(&mut machine, decode(&b.build())).unwrap_err(), incompatible);

    // Provider has no maximum, consumer demands one.
    let mut b = ModuleBuilder::new();
    b.import_memory("a", "memory", 1, Some(4));
    assert_eq!(instantiate(&mut machine, decode(&b.build())).unwrap_err(), incompatible);

    // Table element type must match exactly.
    let mut b = ModuleBuilder::new();
    b.import_table("a", "table", EXTERNREF, 2, None);
    assert_eq!(instantiate(&mut machine, decode(&b.build())).unwrap_err(), incompatible);

    // Compatible demands link fine.
    let mut b = ModuleBuilder::new();
    b.import_memory("a", "memory", 1, None);
    b.import_table("a", "table", FUNCREF, 1, None);
    assert!(instantiate(&mut machine, decode(&b.build())).is_ok());
}

#[test]
fn host_provided_memory() {
    let mut machine = Machine::new();
    let maddr = machine.memories.len();
    machine.memories.push(Memory::new(Limits { min: 1, max: None }));
    machine.register("env", "memory", Extern::Memory(maddr));

    let mut b = ModuleBuilder::new();
    let set2 = b.add_type(&[I32, I32], &[]);
    b.import_memory("env", "memory", 1, None);
    b.add_func(set2, &[], &cat(&[&[0x20, 0x00], &[0x20, 0x01], &[0x36, 0x02, 0x00], &[END]]));
    b.export_func("store", 0);

    let instance = instantiate(&mut machine, decode(&b.build())).unwrap();
    machine
        .invoke(&instance, "store", &[Value::from_i32(8), Value::from_i32(0x74666577)])
        .unwrap();
    assert_eq!(machine.memories[maddr].read_string(8, 4).unwrap(), "weft");
}

#[test]
fn start_function_runs_at_instantiation() {
    let calls = Rc::new(RefCell::new(0u32));
    let counter = Rc::clone(&calls);

    let mut machine = Machine::new();
    machine.register_host("env", "tick", move |_m: &mut Machine| -> Result<(), Trap> {
        *counter.borrow_mut() += 1;
        Ok(())
    });

    let mut b = ModuleBuilder::new();
    let void = b.add_type(&[], &[]);
    b.import_func("env", "tick", void);
    b.add_func(void, &[], &cat(&[&[0x10, 0x00], &[END]]));
    b.set_start(1);

    instantiate(&mut machine, decode(&b.build())).unwrap();
    assert_eq!(*calls.borrow(), 1);
}

#[test]
fn trapping_start_makes_the_module_uninstantiable() {
    let mut b = ModuleBuilder::new();
    let void = b.add_type(&[], &[]);
    b.add_func(void, &[], &[0x00, END]); // unreachable
    b.set_start(0);

    let mut machine = Machine::new();
    assert_eq!(
        instantiate(&mut machine, decode(&b.build())).unwrap_err(),
        Trap::Uninstantiable("unreachable")
    );
}

#[test]
fn exit_during_start_keeps_its_code() {
    let mut machine = Machine::new();
    machine.register_host("env", "quit", |_m: &mut Machine| -> Result<(), Trap> {
        Err(Trap::Exit(3))
    });

    let mut b = ModuleBuilder::new();
    let void = b.add_type(&[], &[]);
    b.import_func("env", "quit", void);
    b.add_func(void, &[], &cat(&[&[0x10, 0x00], &[END]]));
    b.set_start(1);

    assert_eq!(
        instantiate(&mut machine, decode(&b.build())).unwrap_err(),
        Trap::Exit(3)
    );
}

#[test]
fn imported_global_feeds_const_expressions() {
    let mut machine = Machine::new();
    let provider = boot(&mut machine, &provider_module());
    machine.register_instance("a", &provider);

    let mut b = ModuleBuilder::new();
    let nullary = b.add_type(&[], &[I32]);
    b.import_global("a", "g", I32, false);
    // Local global initialized from the imported one.
    b.add_global(I32, false, &[0x23, 0x00, END]);
    b.add_func(nullary, &[], &cat(&[&[0x23, 0x01], &[END]]));
    b.export_func("f", 0);

    let instance = instantiate(&mut machine, decode(&b.build())).unwrap();
    assert_eq!(machine.invoke(&instance, "f", &[]).unwrap()[0].as_i32(), 5);
}

#[test]
fn derived_host_signatures() {
    let mut machine = Machine::new();
    let addr = machine.register_host(
        "env",
        "mix",
        |_m: &mut Machine, _a: i32, _b: i64| -> Result<f64, Trap> { Ok(0.0) },
    );
    assert_eq!(
        machine.funcs[addr].ftype(),
        &FuncType {
            params: vec![ValType::I32, ValType::I64],
            results: vec![ValType::F64],
        }
    );
}
