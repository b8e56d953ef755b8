//! Demonstrates the host-function boundary: typed closures registered as
//! imports, a host that calls back into the guest, and a host that reads
//! guest memory. The demo module is assembled directly as bytes.

use std::cell::RefCell;
use std::rc::Rc;
use weft::leb128::write_leb128;
use weft::{instantiate, Machine, ModuleInstance, Trap, Value};

fn write_name(out: &mut Vec<u8>, name: &str) {
    write_leb128(name.len() as u64, out);
    out.extend_from_slice(name.as_bytes());
}

fn write_section(out: &mut Vec<u8>, id: u8, payload: &[u8]) {
    out.push(id);
    write_leb128(payload.len() as u64, out);
    out.extend_from_slice(payload);
}

fn write_func_type(out: &mut Vec<u8>, params: &[u8], results: &[u8]) {
    out.push(0x60);
    write_leb128(params.len() as u64, out);
    out.extend_from_slice(params);
    write_leb128(results.len() as u64, out);
    out.extend_from_slice(results);
}

/// Builds the demo module. In text form it would read:
///
/// ```wat
/// (module
///   (import "env" "print" (func $print (param i32)))
///   (import "env" "add" (func $add (param i32 i32) (result i32)))
///   (import "env" "quadruple" (func $quadruple (param i32) (result i32)))
///   (import "env" "log" (func $log (param i32 i32)))
///   (memory (export "memory") 1)
///   (data (i32.const 8) "hello from weft")
///   (func (export "double") (param i32) (result i32)
///     local.get 0
///     i32.const 2
///     i32.mul)
///   (func (export "run") (result i32) (local i32)
///     i32.const 10
///     call $quadruple
///     i32.const 2
///     call $add
///     local.tee 0
///     call $print
///     i32.const 8
///     i32.const 15
///     call $log
///     local.get 0))
/// ```
fn build_demo_module() -> Vec<u8> {
    let mut out = vec![0x00, 0x61, 0x73, 0x6D, 0x01, 0x00, 0x00, 0x00];

    // Type section: (i32)->i32, (i32,i32)->i32, (i32)->(), (i32,i32)->(), ()->i32.
    let mut types = Vec::new();
    write_leb128(5, &mut types);
    write_func_type(&mut types, &[0x7F], &[0x7F]);
    write_func_type(&mut types, &[0x7F, 0x7F], &[0x7F]);
    write_func_type(&mut types, &[0x7F], &[]);
    write_func_type(&mut types, &[0x7F, 0x7F], &[]);
    write_func_type(&mut types, &[], &[0x7F]);
    write_section(&mut out, 1, &types);

    // Import section: func indices 0..3 are print, add, quadruple, log.
    let mut imports = Vec::new();
    write_leb128(4, &mut imports);
    for (field, type_idx) in [("print", 2u64), ("add", 1), ("quadruple", 0), ("log", 3)] {
        write_name(&mut imports, "env");
        write_name(&mut imports, field);
        imports.push(0x00);
        write_leb128(type_idx, &mut imports);
    }
    write_section(&mut out, 2, &imports);

    // Function section: double is type 0, run is type 4.
    let mut funcs = Vec::new();
    write_leb128(2, &mut funcs);
    write_leb128(0, &mut funcs);
    write_leb128(4, &mut funcs);
    write_section(&mut out, 3, &funcs);

    // Memory section: one memory, min 1 page.
    write_section(&mut out, 5, &[0x01, 0x00, 0x01]);

    // Export section.
    let mut exports = Vec::new();
    write_leb128(3, &mut exports);
    for (name, kind, idx) in [("double", 0x00u8, 4u64), ("run", 0x00, 5), ("memory", 0x02, 0)] {
        write_name(&mut exports, name);
        exports.push(kind);
        write_leb128(idx, &mut exports);
    }
    write_section(&mut out, 7, &exports);

    // Code section.
    let double_body: &[u8] = &[
        0x00, // no extra locals
        0x20, 0x00, // local.get 0
        0x41, 0x02, // i32.const 2
        0x6C, // i32.mul
        0x0B, // end
    ];
    let run_body: &[u8] = &[
        0x01, 0x01, 0x7F, // one i32 local
        0x41, 0x0A, // i32.const 10
        0x10, 0x02, // call quadruple -> 40
        0x41, 0x02, // i32.const 2
        0x10, 0x01, // call add -> 42
        0x22, 0x00, // local.tee 0
        0x10, 0x00, // call print
        0x41, 0x08, // i32.const 8
        0x41, 0x0F, // i32.const 15
        0x10, 0x03, // call log
        0x20, 0x00, // local.get 0
        0x0B, // end
    ];
    let mut code = Vec::new();
    write_leb128(2, &mut code);
    for body in [double_body, run_body] {
        write_leb128(body.len() as u64, &mut code);
        code.extend_from_slice(body);
    }
    write_section(&mut out, 10, &code);

    // Data section: "hello from weft" at offset 8.
    let mut data = Vec::new();
    write_leb128(1, &mut data);
    data.push(0x00);
    data.extend_from_slice(&[0x41, 0x08, 0x0B]); // i32.const 8; end
    let text = b"hello from weft";
    write_leb128(text.len() as u64, &mut data);
    data.extend_from_slice(text);
    write_section(&mut out, 11, &data);

    out
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut machine = Machine::new();

    let print_count = Rc::new(RefCell::new(0u32));
    let counter = Rc::clone(&print_count);
    machine.register_host(
        "env",
        "print",
        move |_m: &mut Machine, v: i32| -> Result<(), Trap> {
            *counter.borrow_mut() += 1;
            println!("  [host] print({})", v);
            Ok(())
        },
    );

    machine.register_host(
        "env",
        "add",
        |_m: &mut Machine, a: i32, b: i32| -> Result<i32, Trap> {
            println!("  [host] add({}, {})", a, b);
            Ok(a.wrapping_add(b))
        },
    );

    // Filled in after instantiation so the quadruple host can call back
    // into the guest's exported double.
    let slot: Rc<RefCell<Option<Rc<ModuleInstance>>>> = Rc::new(RefCell::new(None));
    let inner = Rc::clone(&slot);
    machine.register_host(
        "env",
        "quadruple",
        move |m: &mut Machine, v: i32| -> Result<i32, Trap> {
            let instance = inner.borrow().clone().unwrap();
            let doubled = m.invoke(&instance, "double", &[Value::from_i32(v)])?[0];
            let result = m.invoke(&instance, "double", &[doubled])?[0];
            println!("  [host] quadruple({}) -> {}", v, result.as_i32());
            Ok(result.as_i32())
        },
    );

    machine.register_host(
        "env",
        "log",
        |m: &mut Machine, ptr: u32, len: u32| -> Result<(), Trap> {
            let text = m.memories[0].read_string(ptr, len)?;
            println!("  [host] log: {}", text);
            Ok(())
        },
    );

    let bytes = build_demo_module();
    println!("Assembled demo module: {} bytes", bytes.len());

    let module = weft::Module::decode(&bytes)?;
    let instance = instantiate(&mut machine, module)?;
    *slot.borrow_mut() = Some(Rc::clone(&instance));

    println!("Invoking run():");
    let results = machine.invoke(&instance, "run", &[])?;
    println!("run() returned {}", results[0].as_i32());
    println!("print was called {} time(s)", print_count.borrow());

    Ok(())
}
