//! RepoQuery CLI: answer questions about a GitHub repository.
//!
//! Runs the query pipeline from the command line or serves it over HTTP.

mod commands;
mod server;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
