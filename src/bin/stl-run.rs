//! stl-run - Execute a conformance test from a manifest
//!
//! Loads the manifest (after `$key` substitution), compiles the STL sources
//! it names, instantiates the listed roles, and drives the roles under
//! `test` through the executor with the stock primitives registered.
//!
//! # Usage
//!
//! ```bash
//! # Drive a manifest with substitution arguments
//! stl-run manifest.json -a ip=0.0.0.0 port=4433
//!
//! # Randomized exploration, five rounds
//! stl-run manifest.json --policy random --seed 7 --steps 5
//! ```
//!
//! Exit code 0 on successful conformance; non-zero on static errors, a
//! stuck role, a failed transition, or a fatal primitive result.

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use colored::Colorize;
use std::path::PathBuf;
use std::process::ExitCode;

use stlang::builtins::register_builtins;
use stlang::executor::{Executor, SelectionPolicy, StepOutcome, TransitionResult};
use stlang::manifest;
use stlang::registry::Registry;

/// Execute a conformance test from a manifest
#[derive(Parser, Debug)]
#[command(name = "stl-run")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the manifest file
    manifest: PathBuf,

    /// Space-separated key=value substitution arguments
    #[arg(short = 'a', long = "manifest-args", num_args = 0.., value_name = "KEY=VALUE")]
    manifest_args: Vec<String>,

    /// Increase log verbosity
    #[arg(short = 'd', long)]
    debug: bool,

    /// Transition selection policy
    #[arg(long, value_enum, default_value = "order")]
    policy: Policy,

    /// Seed for the random policy
    #[arg(long, default_value = "0")]
    seed: u64,

    /// Rounds to drive: each round steps every test role once
    #[arg(long, default_value = "1")]
    steps: usize,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum Policy {
    /// First firable transition in declaration order
    Order,
    /// Seeded-random among the firable set
    Random,
}

fn main() -> ExitCode {
    let args = Args::parse();

    env_logger::Builder::from_default_env()
        .filter_level(if args.debug {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        })
        .init();

    match run(&args) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            eprintln!("{} {:#}", "error:".red().bold(), err);
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<bool> {
    let manifest_args = manifest::parse_args(&args.manifest_args)?;
    let manifest = manifest::load(&args.manifest, &manifest_args)
        .with_context(|| format!("loading manifest {}", args.manifest.display()))?;

    let mut sources = Vec::new();
    for path in &manifest.stl_files {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        sources.push(text);
    }
    let program = stlang::compile(&sources)?;

    let mut registry = Registry::new();
    register_builtins(&mut registry);

    let mut executor = Executor::new(&program, &registry)?;
    if args.policy == Policy::Random {
        executor = executor.with_policy(SelectionPolicy::random(args.seed));
    }
    for instance in manifest.role_instances(&program)? {
        executor.add_role(instance);
    }

    if manifest.test.is_empty() {
        bail!("manifest drives no roles");
    }

    let mut conformant = true;
    'rounds: for round in 0..args.steps {
        for role in &manifest.test {
            match executor.step(role)? {
                StepOutcome::Fired { transition, result } => match result {
                    TransitionResult::Committed => {
                        println!("{} {} fired {}", "ok:".green().bold(), role, transition);
                    }
                    TransitionResult::ErrorCommitted { event_index, reason } => {
                        println!(
                            "{} {} fired {}: event {} failed ({}), error_states applied",
                            "fail:".yellow().bold(),
                            role,
                            transition,
                            event_index,
                            reason
                        );
                        conformant = false;
                    }
                    TransitionResult::RolledBack { event_index, reason } => {
                        println!(
                            "{} {} fired {}: event {} failed ({}), rolled back",
                            "fail:".yellow().bold(),
                            role,
                            transition,
                            event_index,
                            reason
                        );
                        conformant = false;
                    }
                },
                StepOutcome::Stuck(report) => {
                    println!(
                        "{} {} is stuck in round {}",
                        "stuck:".red().bold(),
                        role,
                        round
                    );
                    for precondition in &report.preconditions {
                        for unmet in &precondition.unmet {
                            println!(
                                "  {}: {} wants one of [{}], currently {}",
                                precondition.transition,
                                unmet.state,
                                unmet.acceptable.join(", "),
                                unmet
                                    .actual
                                    .as_deref()
                                    .unwrap_or("<unmapped>")
                            );
                        }
                    }
                    conformant = false;
                    break 'rounds;
                }
            }
        }
    }

    Ok(conformant)
}
