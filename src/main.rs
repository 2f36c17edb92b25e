mod aggregate;
mod cli;
mod coerce;
mod commands;
mod compare;
mod config;
mod engine;
mod error;
mod hungarian;
mod model;
mod path;
mod schema;
mod semantic;
mod split;
mod tree;
mod util;
mod value;

use anyhow::Result;
use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands};

fn main() {
    init_tracing();

    if let Err(err) = run() {
        error!(error = %err, "command failed");
        for cause in err.chain().skip(1) {
            error!(cause = %cause, "caused by");
        }
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Evaluate(args) => commands::evaluate::run(args),
        Commands::CheckSchema(args) => commands::schema::check(args),
        Commands::InferSchema(args) => commands::schema::infer(args),
        Commands::Inspect(args) => commands::inspect::run(args),
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
