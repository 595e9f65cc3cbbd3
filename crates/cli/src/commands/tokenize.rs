use std::path::Path;
use std::process;

use rpl_core::TokenKind;

use super::{print_diagnostics, print_json, read_source};
use crate::OutputFormat;

pub(crate) fn cmd_tokenize(path: &Path, output: OutputFormat, quiet: bool) {
    let source = read_source(path, output, quiet);
    let (tokens, errors) = rpl_core::tokenize(&source);
    let tokens: Vec<_> = tokens
        .into_iter()
        .filter(|t| t.kind != TokenKind::Eof)
        .collect();

    if !quiet {
        match output {
            OutputFormat::Json => print_json(&serde_json::json!({
                "tokens": tokens,
                "errors": errors,
            })),
            OutputFormat::Text => {
                for t in &tokens {
                    println!("{}:{}\t{}\t{}", t.line, t.column, t.kind.name(), t.text);
                }
            }
        }
    }
    print_diagnostics(&errors, output, quiet);
    if !errors.is_empty() {
        process::exit(1);
    }
}
