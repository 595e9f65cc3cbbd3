use std::path::Path;
use std::process;

use rpl_core::{CompilationResult, CompileOptions};

use super::{print_diagnostics, print_json, read_source};
use crate::{report_error, OutputFormat};

static ARTIFACT_SCHEMA_STR: &str = include_str!("../../../../docs/artifact-schema.json");

pub(crate) fn cmd_compile(
    path: &Path,
    options: &CompileOptions,
    out: Option<&Path>,
    output: OutputFormat,
    quiet: bool,
) {
    let source = read_source(path, output, quiet);
    let result = rpl_core::compile(&source, options);

    if !result.success {
        match output {
            OutputFormat::Json => {
                // The full result is the error report.
                eprintln!(
                    "{}",
                    serde_json::to_string_pretty(&result).unwrap_or_default()
                );
            }
            OutputFormat::Text => {
                print_diagnostics(&result.diagnostics, output, quiet);
                if !quiet {
                    eprintln!("compilation failed: {} error(s)", result.errors.len());
                }
            }
        }
        process::exit(1);
    }

    if let Some(out_path) = out {
        write_artifact(&result, options, out_path, output, quiet);
        return;
    }

    if quiet {
        return;
    }
    match output {
        OutputFormat::Json => print_json(&result),
        OutputFormat::Text => print_summary(&result, options),
    }
}

fn print_summary(result: &CompilationResult, options: &CompileOptions) {
    println!("compiled ({} mode)", options.mode);
    println!("policy id: {}", result.policy_id);
    if let Some(table) = &result.symbol_table {
        println!(
            "  {} role(s), {} user(s), {} resource(s), {} group(s), {} rule(s)",
            table.roles().len(),
            table.users().len(),
            table.resources().len(),
            table.groups().len(),
            table.rules().len()
        );
    }
    if !result.warnings.is_empty() {
        println!("{} warning(s):", result.warnings.len());
        for w in &result.warnings {
            println!("  - {}", w);
        }
    }
    if let Some(artifact) = &result.generated_artifact {
        println!();
        println!("{}", artifact);
    }
}

fn write_artifact(
    result: &CompilationResult,
    options: &CompileOptions,
    out_path: &Path,
    output: OutputFormat,
    quiet: bool,
) {
    let artifact = match &result.generated_artifact {
        Some(a) => a,
        None => {
            let msg = format!(
                "no artifact generated in {} mode{}",
                options.mode,
                if options.generate_code { "" } else { " with --no-codegen" }
            );
            report_error(&msg, output, quiet);
            process::exit(1);
        }
    };

    if let Err(errors) = check_artifact(artifact) {
        let msg = format!(
            "internal error: artifact does not match its schema: {}",
            errors.join("; ")
        );
        report_error(&msg, output, quiet);
        process::exit(1);
    }

    if let Err(e) = std::fs::write(out_path, artifact) {
        let msg = format!("error writing '{}': {}", out_path.display(), e);
        report_error(&msg, output, quiet);
        process::exit(1);
    }

    if !quiet {
        match output {
            OutputFormat::Json => print_json(&serde_json::json!({
                "policy_id": result.policy_id,
                "artifact": out_path.display().to_string(),
                "warnings": result.warnings,
            })),
            OutputFormat::Text => {
                for w in &result.warnings {
                    eprintln!("warning: {}", w);
                }
                println!("wrote {}", out_path.display());
            }
        }
    }
}

/// Validate a generated artifact against the bundled JSON Schema.
fn check_artifact(artifact: &str) -> Result<(), Vec<String>> {
    let schema: serde_json::Value = serde_json::from_str(ARTIFACT_SCHEMA_STR)
        .map_err(|e| vec![format!("embedded schema: {}", e)])?;
    let validator =
        jsonschema::validator_for(&schema).map_err(|e| vec![format!("schema: {}", e)])?;
    let doc: serde_json::Value =
        serde_json::from_str(artifact).map_err(|e| vec![format!("artifact: {}", e)])?;
    let errors: Vec<String> = validator.iter_errors(&doc).map(|e| e.to_string()).collect();
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
