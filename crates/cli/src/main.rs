mod commands;
mod config;

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand, ValueEnum};
use rpl_core::CompileMode;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::config::RplConfig;

/// Output format for CLI responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    Text,
    Json,
}

/// Compile mode as accepted on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ModeArg {
    Full,
    Validate,
    Analyze,
    Parse,
}

impl From<ModeArg> for CompileMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Full => CompileMode::Full,
            ModeArg::Validate => CompileMode::Validate,
            ModeArg::Analyze => CompileMode::Analyze,
            ModeArg::Parse => CompileMode::Parse,
        }
    }
}

/// RPL role/policy language toolchain.
#[derive(Parser)]
#[command(name = "rpl", version, about = "RPL role/policy language toolchain")]
struct Cli {
    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text", value_enum)]
    output: OutputFormat,

    /// Suppress non-essential output
    #[arg(long, global = true)]
    quiet: bool,

    /// Configuration file (default: rpl.toml in the working directory, if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the token stream of a .rpl file
    Tokenize {
        /// Path to the .rpl source file
        file: PathBuf,
    },

    /// Print the syntax tree of a .rpl file
    Parse {
        /// Path to the .rpl source file
        file: PathBuf,
    },

    /// Lex, parse and analyze a .rpl file and report diagnostics
    Validate {
        /// Path to the .rpl source file
        file: PathBuf,
    },

    /// Run the compilation pipeline
    Compile {
        /// Path to the .rpl source file
        file: PathBuf,
        /// Pipeline depth (defaults to the configured mode)
        #[arg(long, value_enum)]
        mode: Option<ModeArg>,
        /// Skip artifact generation
        #[arg(long)]
        no_codegen: bool,
        /// Write the generated artifact to this path instead of printing the result
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Compile a policy and evaluate one access request against it
    Check {
        /// Path to the .rpl source file
        file: PathBuf,
        #[arg(long)]
        subject: String,
        #[arg(long)]
        action: String,
        #[arg(long)]
        resource: String,
        /// Request context as a JSON object
        #[arg(long)]
        context: Option<String>,
        /// Show every rule the engine looked at
        #[arg(long)]
        explain: bool,
    },

    /// Show what a user is allowed to do
    Permissions {
        /// Path to the .rpl source file
        file: PathBuf,
        #[arg(long)]
        user: String,
        /// Evaluation day (defaults to today, UTC)
        #[arg(long)]
        as_of: Option<String>,
    },
}

fn main() {
    let cli = Cli::parse();

    let config = match config::load(cli.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            report_error(&e.to_string(), cli.output, cli.quiet);
            process::exit(1);
        }
    };
    init_logging(&config);
    debug!(
        event = "Cli",
        phase = "ConfigLoaded",
        config = ?cli.config,
        mode = %config.compile.mode,
        engine = ?config.engine,
    );

    match cli.command {
        Commands::Tokenize { file } => {
            commands::tokenize::cmd_tokenize(&file, cli.output, cli.quiet);
        }
        Commands::Parse { file } => {
            commands::parse::cmd_parse(&file, &config, cli.output, cli.quiet);
        }
        Commands::Validate { file } => {
            commands::validate::cmd_validate(&file, &config, cli.output, cli.quiet);
        }
        Commands::Compile {
            file,
            mode,
            no_codegen,
            out,
        } => {
            let mut options = config.compile_options();
            if let Some(mode) = mode {
                options.mode = mode.into();
            }
            if no_codegen {
                options.generate_code = false;
            }
            commands::compile::cmd_compile(&file, &options, out.as_deref(), cli.output, cli.quiet);
        }
        Commands::Check {
            file,
            subject,
            action,
            resource,
            context,
            explain,
        } => {
            commands::check::cmd_check(
                &file,
                commands::check::CheckArgs {
                    subject,
                    action,
                    resource,
                    context: context.as_deref(),
                    explain,
                },
                &config,
                cli.output,
                cli.quiet,
            );
        }
        Commands::Permissions { file, user, as_of } => {
            commands::permissions::cmd_permissions(
                &file,
                &user,
                as_of.as_deref(),
                &config,
                cli.output,
                cli.quiet,
            );
        }
    }
}

/// `RUST_LOG` wins over the config file; both fall back to `warn`.
fn init_logging(config: &RplConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log.filter.as_deref().unwrap_or("warn")))
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

pub(crate) fn report_error(msg: &str, output: OutputFormat, quiet: bool) {
    if quiet {
        return;
    }
    match output {
        OutputFormat::Text => eprintln!("{}", msg),
        OutputFormat::Json => {
            eprintln!("{}", serde_json::json!({ "error": msg }));
        }
    }
}
