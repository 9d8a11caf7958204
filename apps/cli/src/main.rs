//! Lectio CLI: daily readings augmentation.
//!
//! Turns a day's Scripture readings into a bundle with synopses, a unified
//! reflection, a sourced prayer and feast information for the site renderer.

mod commands;

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
