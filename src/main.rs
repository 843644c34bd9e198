mod api;
mod auth;
mod cli;
mod collect;
mod config;
mod dispatch;
mod error;
mod models;
mod providers;
mod scan;
mod store;

use anyhow::Result;
use clap::Parser;
use cli::Cli;
use log::info;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    info!("Starting failtrack - failing-test history collector");
    cli.execute().await?;

    Ok(())
}
