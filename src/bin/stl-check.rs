//! stl-check - Parse, link, and type-check STL files
//!
//! A CI-friendly front-end check: reads the given STL sources, runs the full
//! static pipeline, and reports every diagnostic with its location.
//!
//! # Usage
//!
//! ```bash
//! # Check a protocol description
//! stl-check tls.stl
//!
//! # Check several files that link together
//! stl-check tls.stl common.stl
//! ```

use clap::Parser;
use colored::Colorize;
use std::path::PathBuf;
use std::process::ExitCode;

use stlang::error::CompileError;

/// Parse, link, and type-check STL files
#[derive(Parser, Debug)]
#[command(name = "stl-check")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// STL files to check (linked together)
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Quiet mode: exit code only
    #[arg(short, long)]
    quiet: bool,

    /// Increase log verbosity
    #[arg(short = 'd', long)]
    debug: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();

    env_logger::Builder::from_default_env()
        .filter_level(if args.debug {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Warn
        })
        .init();

    let mut sources = Vec::new();
    for path in &args.files {
        match std::fs::read_to_string(path) {
            Ok(text) => sources.push(text),
            Err(err) => {
                eprintln!("{} cannot read {}: {}", "error:".red().bold(), path.display(), err);
                return ExitCode::FAILURE;
            }
        }
    }

    match stlang::compile(&sources) {
        Ok(program) => {
            if !args.quiet {
                let decls: usize = program
                    .modules
                    .iter()
                    .map(|m| {
                        m.consts.len()
                            + m.states.len()
                            + m.roles.len()
                            + m.messages.len()
                            + m.qualifiers.len()
                            + m.events.len()
                            + m.transitions.len()
                            + m.bindings.len()
                    })
                    .sum();
                println!(
                    "{} {} module(s), {} declaration(s)",
                    "ok:".green().bold(),
                    program.modules.len(),
                    decls
                );
            }
            ExitCode::SUCCESS
        }
        Err(CompileError::Type(errors)) => {
            if !args.quiet {
                for error in &errors {
                    eprintln!("{} {}", "error:".red().bold(), error);
                }
                eprintln!("{} type error(s)", errors.len());
            }
            ExitCode::FAILURE
        }
        Err(err) => {
            if !args.quiet {
                eprintln!("{} {}", "error:".red().bold(), err);
            }
            ExitCode::FAILURE
        }
    }
}
