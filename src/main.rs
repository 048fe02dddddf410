mod cli;
mod commands;
mod config;
mod differ;
mod loader;
mod progress;
mod provider;
mod ui;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command};
use std::io;
use std::path::PathBuf;

/// Global context for the application
pub struct Context {
    pub verbose: u8,
    pub quiet: bool,
    pub config: Option<PathBuf>,
    pub overrides: Vec<String>,
}

fn main() -> Result<()> {
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
        config: cli.config,
        overrides: cli.overrides,
    };

    let result = match cli.command {
        Command::Diff(args) => commands::reconcile::diff(&ctx, &args),
        Command::Apply(args) => commands::reconcile::apply(&ctx, &args),
        Command::Validate(args) => commands::reconcile::validate(&ctx, &args),
        Command::Get(args) => commands::get::run(&ctx, &args),
        Command::Extensions(args) => commands::extensions::run(&ctx, &args),
        Command::Health(args) => commands::health::run(&ctx, &args),
        Command::Action(args) => commands::action::run(&ctx, &args),
        Command::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "streamform", &mut io::stdout());
            Ok(())
        }
    };

    if let Err(e) = &result {
        ui::error(&format!("{e:#}"));
        std::process::exit(1);
    }
    Ok(())
}
