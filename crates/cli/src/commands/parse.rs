use std::path::Path;
use std::process;

use rpl_core::ast::render_tree;

use super::{print_diagnostics, print_json, read_source};
use crate::config::RplConfig;
use crate::OutputFormat;

pub(crate) fn cmd_parse(path: &Path, config: &RplConfig, output: OutputFormat, quiet: bool) {
    let source = read_source(path, output, quiet);
    let (tokens, lex_errors) = rpl_core::tokenize(&source);
    if !lex_errors.is_empty() {
        fail(&lex_errors, output, quiet);
    }

    let (program, syntax_errors) =
        rpl_core::parse_recovering(&tokens, config.compile.max_errors);
    if !syntax_errors.is_empty() {
        fail(&syntax_errors, output, quiet);
    }

    let tree = render_tree(&program);
    if !quiet {
        match output {
            OutputFormat::Json => print_json(&serde_json::json!({
                "statements": program.statements.len(),
                "syntax_tree": tree,
            })),
            OutputFormat::Text => println!("{}", tree),
        }
    }
}

fn fail(errors: &[rpl_core::Diagnostic], output: OutputFormat, quiet: bool) -> ! {
    if output == OutputFormat::Json && !quiet {
        let json = serde_json::json!({ "errors": errors });
        eprintln!("{}", serde_json::to_string_pretty(&json).unwrap_or_default());
    }
    print_diagnostics(errors, output, quiet);
    process::exit(1);
}
