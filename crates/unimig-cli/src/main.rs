//! unimig command-line interface
//!
//! Drives the migration pipeline over files: a JSON snapshot of the legacy
//! database goes in, analysis, mapping and plan documents come out, and
//! execution writes into a sled-backed EAV store.

mod commands;
mod formatter;
mod workspace;

use clap::Parser;
use commands::{Command, Settings};
use formatter::OutputFormat;
use std::path::PathBuf;

/// unimig command-line interface
#[derive(Parser, Debug)]
#[command(name = "unimig")]
#[command(version, about = "Migrate legacy relational schemas into a universal EAV model")]
pub struct Args {
    /// Output format
    #[arg(long, global = true, default_value = "table", value_enum)]
    pub format: OutputFormat,

    /// Directory of the migration log
    #[arg(long, global = true, default_value = ".unimig/log")]
    pub log_dir: PathBuf,

    /// Custom vocabulary (JSON) replacing the built-in one
    #[arg(long, global = true)]
    pub vocabulary: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

fn main() {
    // Initialize tracing
    let directive: tracing_subscriber::filter::Directive = "unimig=info"
        .parse()
        .unwrap_or_else(|_| tracing_subscriber::filter::LevelFilter::INFO.into());
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(directive))
        .init();

    let args = Args::parse();
    let formatter = formatter::create_formatter(args.format);
    let settings = Settings {
        log_dir: args.log_dir,
        vocabulary: args.vocabulary,
    };

    match commands::run(args.command, &settings, &*formatter) {
        Ok(output) => {
            println!("{}", output.text);
            if !output.success {
                std::process::exit(2);
            }
        }
        Err(e) => {
            eprintln!("{}", formatter.format_error(&e.to_string()));
            std::process::exit(1);
        }
    }
}
