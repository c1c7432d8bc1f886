//! Keel CLI - relation resolution and backend validation

use std::io::{self, IsTerminal};

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;
mod progress;

use cli::{Cli, Commands};
use keel::util::GlobalContext;

fn main() {
    if let Err(e) = run() {
        eprintln!("error: {:#}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    // Parse CLI
    let cli = Cli::parse();

    // Set up logging
    let filter = if cli.verbose {
        EnvFilter::new("keel=debug")
    } else {
        EnvFilter::new("keel=info")
    };

    // Reports go to stdout, so logs stay on stderr.
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_ansi(!cli.no_color)
        .with_writer(io::stderr)
        .init();

    if let Commands::Completions(args) = cli.command {
        return commands::completions::execute(args);
    }

    let mut ctx = GlobalContext::new().context("failed to create global context")?;
    ctx.set_verbose(cli.verbose);
    ctx.set_color(!cli.no_color && io::stdout().is_terminal());

    // Execute command
    match cli.command {
        Commands::Relations(args) => commands::relations::execute(args, &ctx),
        Commands::Validate(args) => commands::validate::execute(args, &ctx),
        Commands::Check(args) => commands::check::execute(args, &ctx),
        Commands::CheckBatch(args) => commands::check_batch::execute(args, &ctx),
        Commands::KillPort(args) => commands::kill_port::execute(args, &ctx),
        Commands::Completions(args) => commands::completions::execute(args),
    }
}
