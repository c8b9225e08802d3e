//! Command-line interface for the Koko scripting language.

use clap::{Parser, Subcommand};
use koko_eval::{eval_program, graphviz, Environment};
use miette::{Diagnostic, NamedSource, SourceSpan};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// CLI error with source context for pretty printing.
#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    #[error("failed to read file: {message}")]
    IoError { message: String },

    #[error("parse error: {message}")]
    #[diagnostic(code(koko::parse_error))]
    ParseError {
        message: String,
        #[source_code]
        src: NamedSource<Arc<String>>,
        #[label("here")]
        span: SourceSpan,
    },
}

impl CliError {
    fn from_parse_error(e: koko_syntax::ParseError, source: Arc<String>, filename: &str) -> Self {
        let span = e.span();
        CliError::ParseError {
            message: e.to_string(),
            src: NamedSource::new(filename, source),
            span: (span.start, span.len()).into(),
        }
    }
}

#[derive(Parser)]
#[command(name = "koko", version)]
#[command(about = "Koko scripting language interpreter", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a Koko file and print the result
    Run {
        /// Input file
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Evaluate an inline program string
    Eval {
        /// Program source
        #[arg(value_name = "SOURCE")]
        source: String,
    },

    /// Parse a Koko file and show the AST
    Parse {
        /// Input file
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Show the parsed tree in full detail
        #[arg(short, long)]
        verbose: bool,
    },

    /// Run a Koko file and print the dependency graph of its result as
    /// Graphviz DOT
    Graph {
        /// Input file
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
}

fn main() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run { file } => {
            let program = load_and_parse(&file)?;
            println!("{}", evaluate(&program));
        }
        Commands::Eval { source } => {
            let program = koko_syntax::parse(&source).map_err(|e| {
                CliError::from_parse_error(e, Arc::new(source.clone()), "<eval>")
            })?;
            println!("{}", evaluate(&program));
        }
        Commands::Parse { file, verbose } => {
            let program = load_and_parse(&file)?;
            if verbose {
                println!("{:#?}", program);
            } else {
                println!("{}", program);
            }
        }
        Commands::Graph { file } => {
            let program = load_and_parse(&file)?;
            let env = Environment::root();
            match eval_program(&program, &env) {
                Ok(result) => println!("{}", graphviz::to_dot(&result)),
                Err(e) => println!("{}", koko_eval::Object::error(e.to_string())),
            }
        }
    }
    Ok(())
}

fn load_and_parse(file: &PathBuf) -> Result<koko_syntax::Program, CliError> {
    let source = fs::read_to_string(file).map_err(|e| CliError::IoError {
        message: format!("{}: {}", file.display(), e),
    })?;
    let source = Arc::new(source);
    debug!(file = %file.display(), bytes = source.len(), "parsing");
    koko_syntax::parse(&source)
        .map_err(|e| CliError::from_parse_error(e, source.clone(), &file.display().to_string()))
}

/// Evaluate in a fresh root environment; runtime failures render as
/// error values, never as process panics.
fn evaluate(program: &koko_syntax::Program) -> String {
    let env = Environment::root();
    match eval_program(program, &env) {
        Ok(result) => result.inspect(),
        Err(e) => koko_eval::Object::error(e.to_string()).inspect(),
    }
}
