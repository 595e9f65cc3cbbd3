use std::path::Path;
use std::process;

use rpl_core::{CompileMode, CompileOptions};

use super::{print_diagnostics, read_source};
use crate::config::RplConfig;
use crate::OutputFormat;

pub(crate) fn cmd_validate(path: &Path, config: &RplConfig, output: OutputFormat, quiet: bool) {
    let source = read_source(path, output, quiet);
    let options = CompileOptions {
        mode: CompileMode::Validate,
        generate_code: false,
        ..config.compile_options()
    };
    let result = rpl_core::compile(&source, &options);

    match output {
        OutputFormat::Json => {
            let json = serde_json::json!({
                "valid": result.success,
                "policy_id": result.policy_id,
                "errors": result.errors,
                "warnings": result.warnings,
                "diagnostics": result.diagnostics,
            });
            let pretty = serde_json::to_string_pretty(&json).unwrap_or_default();
            if result.success {
                if !quiet {
                    println!("{}", pretty);
                }
            } else {
                eprintln!("{}", pretty);
            }
        }
        OutputFormat::Text => {
            print_diagnostics(&result.diagnostics, output, quiet);
            if result.success && !quiet {
                match result.warnings.len() {
                    0 => println!("valid"),
                    n => println!("valid ({} warning(s))", n),
                }
            } else if !result.success && !quiet {
                eprintln!("invalid: {} error(s)", result.errors.len());
            }
        }
    }

    if !result.success {
        process::exit(1);
    }
}
