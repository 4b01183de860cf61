mod cli;
mod commands;
mod config;
mod loader;
mod prompt;
mod report;
mod schema;
mod shell;
mod signal;
mod ui;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command};
use config::Config;
use std::io;
use std::process::ExitCode;

/// Global context for the application
pub struct Context {
    pub verbose: u8,
    pub quiet: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let verbose = if cli.debug {
        cli.verbose.max(2)
    } else {
        cli.verbose
    };
    let log_level = match verbose {
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
        verbose,
        quiet: cli.quiet,
    };

    match dispatch(&ctx, &cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            ui::error(&format!("{e:#}"));
            if signal::interrupted() {
                ExitCode::from(130)
            } else {
                ExitCode::FAILURE
            }
        }
    }
}

/// Run the selected command; `Ok(false)` means it ran but didn't succeed
fn dispatch(ctx: &Context, cli: &Cli) -> Result<bool> {
    if let Command::Completions { shell } = &cli.command {
        let mut cmd = Cli::command();
        generate(*shell, &mut cmd, "tend", &mut io::stdout());
        return Ok(true);
    }

    let config = Config::load(cli.config.as_deref())?;
    match &cli.command {
        Command::Meet(args) => commands::meet::run(ctx, &config, args),
        Command::List(args) => commands::list::run(ctx, &config, args).map(|()| true),
        Command::Sources => commands::sources::run(ctx, &config).map(|()| true),
        Command::Completions { .. } => Ok(true),
    }
}
