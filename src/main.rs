mod cli;
mod config;
mod error;
mod flaky;
mod outcome;
mod output;
mod pipeline;
mod recovery;
mod runner;
mod toolchain;
mod validate;
mod variant;

use anyhow::Result;
use clap::Parser;
use cli::Cli;
use log::info;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    output::print_banner();

    let cli = Cli::parse();
    info!("Starting BuildGate - build and test orchestrator");
    let exit_code = cli.execute().await?;

    std::process::exit(exit_code)
}
