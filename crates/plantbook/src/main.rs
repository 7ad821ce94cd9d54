//! plantbook - `PlantUML` preprocessor for mdbook.
//!
//! Invoked by the host in two ways:
//! - `plantbook supports <renderer>`: answer a capability query by exit status
//! - `plantbook`: read `[context, book]` from stdin, render every diagram and
//!   write `[context, book]` to stdout

mod book;
mod cleaner;
mod error;
mod output;
mod preprocess;
mod protocol;
mod walker;

use std::io::{self, Read, Write};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use error::Error;
use output::Output;
use protocol::ProtocolError;

/// plantbook - render `PlantUML` diagrams in mdbook chapters.
#[derive(Parser)]
#[command(name = "plantbook", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Check whether a renderer is supported by this preprocessor.
    Supports {
        /// Renderer name (e.g. "html").
        renderer: String,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let output = Output::new();

    if let Some(Commands::Supports { renderer }) = cli.command {
        return if protocol::supports_renderer(&renderer) {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        };
    }

    match preprocess_stdin() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            output.error(&format!("Error: {err}"));
            ExitCode::FAILURE
        }
    }
}

fn preprocess_stdin() -> Result<(), Error> {
    let mut input = String::new();
    io::stdin()
        .read_to_string(&mut input)
        .map_err(ProtocolError::Read)?;

    init_tracing(peek_verbose(&input));

    let payload = preprocess::transform(&input)?;

    let mut stdout = io::stdout().lock();
    stdout
        .write_all(&payload)
        .and_then(|()| stdout.flush())
        .map_err(ProtocolError::Write)?;
    Ok(())
}

/// Read the `verbose` flag without failing on malformed input; parse errors
/// are reported by the transform itself.
fn peek_verbose(input: &str) -> bool {
    serde_json::from_str::<(serde_json::Value, serde::de::IgnoredAny)>(input)
        .is_ok_and(|(context, _)| protocol::verbose_requested(&context))
}

/// Initialize tracing on stderr.
///
/// `RUST_LOG` wins when set; otherwise `verbose` selects DEBUG and the
/// default is WARN.
fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}
