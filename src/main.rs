use clap::Parser;

mod agg;
mod cli;
mod commands;
mod config;
mod db;
mod error;
mod feed;
mod models;

use cli::Cli;
use commands::State;
use config::Config;
use db::Repository;
use error::Result;

#[tokio::main]
async fn main() {
    // Initialize logging (info and up, overridable via RUST_LOG)
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

/// The single boundary that turns errors into a non-zero exit code.
async fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;
    let repo = Repository::new(&config.db_url).await?;

    let mut state = State { repo, config };
    commands::run_command(&mut state, cli.command).await
}
