mod cli;
mod commands;
mod config;
mod engine;
mod paths;
mod progress;
mod resource;
mod ui;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command};
use std::io;
use std::process::ExitCode;

/// Global context for the application
pub struct Context {
    pub verbose: u8,
    pub quiet: bool,
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter_level(if cli.quiet {
            log::LevelFilter::Error
        } else {
            log_level
        })
        .format_timestamp(None)
        .init();

    let ctx = Context {
        verbose: cli.verbose,
        quiet: cli.quiet,
    };
    log::debug!("sonda {} (verbosity {})", env!("CARGO_PKG_VERSION"), ctx.verbose);

    let passed = match cli.command {
        Command::Run(args) => commands::run::run(&ctx, args)?,
        Command::Get(args) => commands::get::run(&ctx, args)?,
        Command::Resources { name, json } => {
            commands::resources::run(&ctx, name.as_deref(), json)?;
            true
        }
        Command::Config(cmd) => {
            commands::config::run(&ctx, cmd)?;
            true
        }
        Command::Completions { shell } => {
            generate(shell, &mut Cli::command(), "sonda", &mut io::stdout());
            true
        }
    };

    Ok(if passed {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
