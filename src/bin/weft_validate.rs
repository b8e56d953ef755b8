use clap::Parser;
use std::fs;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "weft-validate")]
#[command(about = "Validate WebAssembly modules", long_about = "
Decodes and validates WebAssembly modules without running them.

Prints VALID or INVALID for every file, and exits non-zero if any
module fails.

Examples:
  # Validate a single module
  weft-validate module.wasm

  # Validate several modules and print a summary
  weft-validate a.wasm b.wasm c.wasm

  # Only report failures
  weft-validate --quiet *.wasm
")]
struct Args {
    /// Paths of the WebAssembly modules to validate
    #[arg(required = true)]
    wasm_files: Vec<PathBuf>,

    /// Print per-module details while validating
    #[arg(short, long)]
    verbose: bool,

    /// Only print failures
    #[arg(short, long)]
    quiet: bool,
}

fn check_file(path: &PathBuf, verbose: bool) -> Result<(), String> {
    let bytes = fs::read(path).map_err(|e| format!("failed to read: {}", e))?;

    let module = weft::Module::decode(&bytes).map_err(|e| e.to_string())?;

    if verbose {
        println!(
            "  {} functions, {} imports, {} exports, {} bytes",
            module.funcs.len(),
            module.imports.len(),
            module.exports.len(),
            bytes.len()
        );
    }

    weft::validate(&module).map_err(|e| e.to_string())
}

fn main() {
    let args = Args::parse();

    let total = args.wasm_files.len();
    let mut valid = 0;

    for path in &args.wasm_files {
        match check_file(path, args.verbose) {
            Ok(()) => {
                valid += 1;
                if !args.quiet {
                    println!("VALID: {}", path.display());
                }
            }
            Err(e) => {
                println!("INVALID: {} - {}", path.display(), e);
            }
        }
    }

    if total > 1 && !args.quiet {
        println!("\nValid: {}/{}", valid, total);
    }

    if valid != total {
        std::process::exit(1);
    }
}
