pub(crate) mod check;
pub(crate) mod compile;
pub(crate) mod parse;
pub(crate) mod permissions;
pub(crate) mod tokenize;
pub(crate) mod validate;

use std::path::Path;
use std::process;

use rpl_core::{CompilationResult, CompileMode, CompileOptions, Diagnostic, SymbolTable};

use crate::config::RplConfig;
use crate::{report_error, OutputFormat};

/// Read a source file or exit with status 1.
pub(crate) fn read_source(path: &Path, output: OutputFormat, quiet: bool) -> String {
    match std::fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) => {
            let msg = format!("error reading file '{}': {}", path.display(), e);
            report_error(&msg, output, quiet);
            process::exit(1);
        }
    }
}

/// Print diagnostics to stderr, one per line (text mode only).
pub(crate) fn print_diagnostics(diagnostics: &[Diagnostic], output: OutputFormat, quiet: bool) {
    if quiet || output == OutputFormat::Json {
        return;
    }
    for d in diagnostics {
        eprintln!("{}", d);
    }
}

/// Print a JSON value, pretty, to stdout.
pub(crate) fn print_json(value: &impl serde::Serialize) {
    println!(
        "{}",
        serde_json::to_string_pretty(value)
            .unwrap_or_else(|e| format!("{{\"error\": \"serialization: {}\"}}", e))
    );
}

/// Compile far enough to get a validated symbol table, or report the
/// diagnostics and exit with status 1.
pub(crate) fn load_policy(
    path: &Path,
    config: &RplConfig,
    output: OutputFormat,
    quiet: bool,
) -> SymbolTable {
    let source = read_source(path, output, quiet);
    let options = CompileOptions {
        mode: CompileMode::Validate,
        generate_code: false,
        ..config.compile_options()
    };
    let result = rpl_core::compile(&source, &options);
    match result.symbol_table {
        Some(table) if result.success => table,
        _ => fail_compilation(path, &result, output, quiet),
    }
}

fn fail_compilation(
    path: &Path,
    result: &CompilationResult,
    output: OutputFormat,
    quiet: bool,
) -> ! {
    match output {
        OutputFormat::Json => {
            if !quiet {
                let json = serde_json::json!({
                    "file": path.display().to_string(),
                    "success": false,
                    "errors": result.errors,
                    "diagnostics": result.diagnostics,
                });
                eprintln!("{}", serde_json::to_string_pretty(&json).unwrap_or_default());
            }
        }
        OutputFormat::Text => {
            if !quiet {
                eprintln!("{}: compilation failed", path.display());
            }
            print_diagnostics(&result.diagnostics, output, quiet);
        }
    }
    process::exit(1);
}
