use clap::Parser;
use std::fs;
use std::path::PathBuf;
use weft::{instantiate, Extern, ExternKind, Machine, Trap};

mod utils;
use utils::{format_value, parse_value};

#[derive(Parser)]
#[command(name = "weft-run")]
#[command(about = "Run a WebAssembly module", long_about = "
Runs a WebAssembly module, optionally invoking a named export with arguments.

Examples:
  # Run the module's _start entry point
  weft-run module.wasm

  # Invoke an exported function with two arguments
  weft-run module.wasm -i add -a \"1:i32 2:i32\"

  # Cap execution at one million interpreter steps
  weft-run module.wasm -i spin -s 1000000

  # List the module's exports without running anything
  weft-run module.wasm -l
")]
struct Args {
    /// Path to the WebAssembly module to run
    wasm_file: PathBuf,

    /// Name of the exported function to invoke (defaults to _start)
    #[arg(short, long)]
    invoke: Option<String>,

    /// Space-separated arguments in value:type format (e.g. "1:i32 2.5:f64")
    #[arg(short, long, value_delimiter = ' ', num_args = 0..)]
    args: Vec<String>,

    /// Abort execution after this many interpreter steps
    #[arg(short, long)]
    step_budget: Option<u64>,

    /// List the module's exports and exit
    #[arg(short, long)]
    list_exports: bool,

    /// Print debug information while loading
    #[arg(short, long)]
    debug: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let bytes = fs::read(&args.wasm_file)
        .map_err(|e| format!("Failed to read {}: {}", args.wasm_file.display(), e))?;

    if args.debug {
        eprintln!("Read {} bytes from {}", bytes.len(), args.wasm_file.display());
    }

    let module = weft::Module::decode(&bytes)
        .map_err(|e| format!("Failed to decode module: {}", e))?;

    if args.debug {
        eprintln!(
            "Decoded module: {} types, {} functions, {} exports",
            module.types.len(),
            module.funcs.len(),
            module.exports.len()
        );
    }

    let mut machine = Machine::new();
    machine.set_step_budget(args.step_budget);

    let instance = match instantiate(&mut machine, module) {
        Ok(instance) => instance,
        Err(Trap::Exit(code)) => std::process::exit(code),
        Err(e) => return Err(format!("Failed to instantiate module: {}", e).into()),
    };

    if args.list_exports {
        println!("Exports of {}:", args.wasm_file.display());
        for export in &instance.module.exports {
            match export.kind {
                ExternKind::Func => {
                    println!(
                        "  {} : func {}",
                        export.name,
                        instance.module.func_type(export.idx)
                    );
                }
                ExternKind::Table => println!("  {} : table", export.name),
                ExternKind::Mem => println!("  {} : memory", export.name),
                ExternKind::Global => println!("  {} : global", export.name),
            }
        }
        return Ok(());
    }

    let func_name = args.invoke.as_deref().unwrap_or("_start");

    let Some(ext) = instance.find_export(func_name) else {
        return Err(format!("Export '{}' not found in module", func_name).into());
    };
    let Extern::Func(addr) = ext else {
        return Err(format!("Export '{}' is not a function", func_name).into());
    };
    let ftype = machine.funcs[addr].ftype().clone();

    if args.args.len() != ftype.params.len() {
        return Err(format!(
            "Function '{}' expects {} arguments, got {}",
            func_name,
            ftype.params.len(),
            args.args.len()
        )
        .into());
    }

    let mut wasm_args = Vec::with_capacity(args.args.len());
    for arg in &args.args {
        wasm_args.push(parse_value(arg)?);
    }

    if args.debug {
        eprintln!("Invoking '{}' with {} arguments", func_name, wasm_args.len());
    }

    match machine.invoke(&instance, func_name, &wasm_args) {
        Ok(results) => {
            if results.is_empty() {
                println!("Function '{}' executed successfully", func_name);
            } else {
                for (val, ty) in results.iter().zip(ftype.results.iter()) {
                    println!("{}", format_value(*val, *ty));
                }
            }
            Ok(())
        }
        Err(Trap::Exit(code)) => std::process::exit(code),
        Err(e) => Err(format!("Execution failed: {}", e).into()),
    }
}
