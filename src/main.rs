mod changelog;
mod changelog_cmd;
mod cli;
mod config;
mod conventional;
mod error;
mod forge;
mod git;
mod github_cmd;
mod prepare;
mod release;
mod reporter;
mod runner;
mod sign;
mod template;
mod version;
mod version_cmd;
mod version_file;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};
use tracing_subscriber::EnvFilter;

fn main() {
    init_tracing();
    if let Err(err) = run() {
        eprintln!("Error: {err:#}");
        std::process::exit(1);
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Prepare(args) => prepare::run(args),
        Commands::Release(args) => release::run(args),
        Commands::Sign(args) => sign::run(args),
        Commands::Changelog(args) => changelog_cmd::run(args),
        Commands::Version(command) => version_cmd::run(command),
        Commands::Github(command) => github_cmd::run(command),
    }
}
