//! Binary entry point for wikiretrieve.
//!
//! wikiretrieve: a wiki knowledge-base retrieval engine, exposed as a
//! local CLI over the same buffer/chunk store and as a library for
//! embedding the retrieval pipeline in a host service.

#![allow(clippy::print_stdout, clippy::print_stderr)]

use clap::Parser;
use wikiretrieve::cli::output::{OutputFormat, format_error};
use wikiretrieve::cli::{Cli, execute};
use std::io::{self, Write};
use std::process::ExitCode;

fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init()
        .ok();
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();
    let format = OutputFormat::parse(&cli.format);

    match execute(&cli) {
        Ok(output) => {
            if !output.is_empty() {
                // Handle broken pipe gracefully (e.g., when piped to `head` or `jq`)
                if let Err(e) = write!(io::stdout(), "{output}")
                    && e.kind() != io::ErrorKind::BrokenPipe
                {
                    eprintln!("Error writing to stdout: {e}");
                    return ExitCode::FAILURE;
                }
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            let error_output = format_error(&e, format);
            match format {
                OutputFormat::Json | OutputFormat::Ndjson => {
                    // JSON errors go to stdout for programmatic parsing
                    println!("{error_output}");
                }
                OutputFormat::Text => {
                    eprintln!("Error: {error_output}");
                }
            }
            ExitCode::FAILURE
        }
    }
}
