use clap::Parser;
use nohash_hasher::IntMap;
use serde::Serialize;
use std::fs;
use std::path::PathBuf;
use weft::{ExternKind, FlatCode, ImportDesc, Instruction, Module, Op, Shape};

#[derive(Parser)]
#[command(name = "weft-inspect")]
#[command(about = "Inspect a WebAssembly module", long_about = "
Decodes a WebAssembly module and prints its structure without running it.

Examples:
  # Print a summary of the module's sections
  weft-inspect module.wasm

  # Also list the flattened bytecode of every function
  weft-inspect module.wasm --disasm

  # Count how often each opcode occurs
  weft-inspect module.wasm --opcount

  # Emit the summary as JSON
  weft-inspect module.wasm --json
")]
struct Args {
    /// Path to the WebAssembly module to inspect
    wasm_file: PathBuf,

    /// Print the flattened bytecode of every function
    #[arg(short, long)]
    disasm: bool,

    /// Print a histogram of opcode usage
    #[arg(short = 'c', long)]
    opcount: bool,

    /// Emit the summary as JSON instead of text
    #[arg(short, long)]
    json: bool,
}

#[derive(Serialize)]
struct ExportSummary {
    name: String,
    kind: &'static str,
    signature: Option<String>,
}

#[derive(Serialize)]
struct ModuleSummary {
    size_bytes: usize,
    types: Vec<String>,
    imports: Vec<String>,
    exports: Vec<ExportSummary>,
    functions: usize,
    imported_functions: usize,
    tables: usize,
    memories: usize,
    globals: usize,
    start: Option<u32>,
    elem_segments: usize,
    data_segments: usize,
    instructions: usize,
}

fn kind_name(kind: ExternKind) -> &'static str {
    match kind {
        ExternKind::Func => "func",
        ExternKind::Table => "table",
        ExternKind::Mem => "memory",
        ExternKind::Global => "global",
    }
}

fn import_desc(desc: &ImportDesc, module: &Module) -> String {
    match desc {
        ImportDesc::Func(type_idx) => format!("func {}", module.types[*type_idx as usize]),
        ImportDesc::Table(ttype) => format!("table {} {:?}", ttype.elem, ttype.limits),
        ImportDesc::Mem(limits) => format!("memory {:?}", limits),
        ImportDesc::Global(gtype) => format!("global {}", gtype.vtype),
    }
}

/// Renders the decoded operand of one flattened instruction.
fn render_operand(ins: &Instruction, code: &FlatCode) -> String {
    match ins.op {
        Op::Block | Op::Loop => return format!(" (target {})", ins.operand.jump_target()),
        Op::If => {
            let (else_target, end_target) = ins.operand.if_targets();
            return format!(" (else {} end {})", else_target, end_target);
        }
        Op::BrTable => {
            let arms = &code.br_tables[ins.operand.as_u32() as usize];
            return format!(" {:?}", arms);
        }
        _ => {}
    }
    match ins.op.shape() {
        Shape::None | Shape::ZeroByte | Shape::ZeroZero => String::new(),
        Shape::Index | Shape::IdxZero | Shape::SelectTy | Shape::RefTy => {
            format!(" {}", ins.operand.as_u32())
        }
        Shape::Pair => format!(" {} {}", ins.operand.first(), ins.operand.second()),
        Shape::MemArg => format!(
            " offset={} align={}",
            ins.operand.mem_offset(),
            ins.operand.mem_align()
        ),
        Shape::ConstI32 => format!(" {}", ins.operand.as_i32()),
        Shape::ConstI64 => format!(" {}", ins.operand.as_i64()),
        Shape::ConstF32 => format!(" {}", ins.operand.as_f32()),
        Shape::ConstF64 => format!(" {}", ins.operand.as_f64()),
        Shape::Vector => format!(" 0x{:02x}", ins.operand.as_u32()),
        Shape::Block | Shape::BrTable => String::new(),
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let bytes = fs::read(&args.wasm_file)
        .map_err(|e| format!("Failed to read {}: {}", args.wasm_file.display(), e))?;

    let module = weft::Module::decode(&bytes)
        .map_err(|e| format!("Failed to decode module: {}", e))?;

    let instructions: usize = module.func_bodies.iter().map(|b| b.code.code.len()).sum();

    if args.json {
        let summary = ModuleSummary {
            size_bytes: bytes.len(),
            types: module.types.iter().map(|t| t.to_string()).collect(),
            imports: module
                .imports
                .iter()
                .map(|i| format!("{}.{} ({})", i.module, i.field, import_desc(&i.desc, &module)))
                .collect(),
            exports: module
                .exports
                .iter()
                .map(|e| ExportSummary {
                    name: e.name.clone(),
                    kind: kind_name(e.kind),
                    signature: match e.kind {
                        ExternKind::Func => Some(module.func_type(e.idx).to_string()),
                        _ => None,
                    },
                })
                .collect(),
            functions: module.funcs.len(),
            imported_functions: module.num_imported_funcs,
            tables: module.tables.len(),
            memories: module.memories.len(),
            globals: module.globals.len(),
            start: module.start,
            elem_segments: module.elems.len(),
            data_segments: module.datas.len(),
            instructions,
        };
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!("Module: {}", args.wasm_file.display());
    println!("  Size: {} bytes", bytes.len());

    println!("Types ({}):", module.types.len());
    for (i, ftype) in module.types.iter().enumerate() {
        println!("  [{}] {}", i, ftype);
    }

    if !module.imports.is_empty() {
        println!("Imports ({}):", module.imports.len());
        for import in &module.imports {
            println!(
                "  {}.{} : {}",
                import.module,
                import.field,
                import_desc(&import.desc, &module)
            );
        }
    }

    if !module.exports.is_empty() {
        println!("Exports ({}):", module.exports.len());
        for export in &module.exports {
            match export.kind {
                ExternKind::Func => println!(
                    "  {} : func {}",
                    export.name,
                    module.func_type(export.idx)
                ),
                kind => println!("  {} : {}", export.name, kind_name(kind)),
            }
        }
    }

    println!(
        "Functions: {} ({} imported), {} instructions total",
        module.funcs.len(),
        module.num_imported_funcs,
        instructions
    );
    println!("Tables: {}", module.tables.len());
    println!("Memories: {}", module.memories.len());
    println!("Globals: {}", module.globals.len());
    if let Some(start) = module.start {
        println!("Start: func {}", start);
    }
    println!("Element segments: {}", module.elems.len());
    println!("Data segments: {}", module.datas.len());

    if args.disasm {
        for (i, body) in module.func_bodies.iter().enumerate() {
            let func_idx = module.num_imported_funcs + i;
            println!(
                "\nfunc[{}] {} ({} locals)",
                func_idx,
                module.func_type(func_idx as u32),
                body.locals.len()
            );
            for (pc, ins) in body.code.code.iter().enumerate() {
                println!("  {:4}: {}{}", pc, ins.op.mnemonic(), render_operand(ins, &body.code));
            }
        }
    }

    if args.opcount {
        let mut counts: IntMap<u16, u64> = IntMap::default();
        let mut names: IntMap<u16, &'static str> = IntMap::default();
        for body in &module.func_bodies {
            for ins in &body.code.code {
                *counts.entry(ins.op.code()).or_insert(0) += 1;
                names.entry(ins.op.code()).or_insert(ins.op.mnemonic());
            }
        }
        let mut sorted: Vec<(u16, u64)> = counts.into_iter().collect();
        sorted.sort_by(|a, b| b.1.cmp(&a.1).then(names[&a.0].cmp(names[&b.0])));
        println!("\nOpcode histogram:");
        for (code, count) in sorted {
            println!("  {:20} {}", names[&code], count);
        }
    }

    Ok(())
}
