//! Binary crate for the `weather` gateway.
//!
//! This crate focuses on:
//! - Parsing CLI arguments and interactive configuration
//! - Serving `GET /weather/{city}` over HTTP
//! - Logging setup

use clap::Parser;

mod cli;
mod gateway;
mod logging;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cmd = cli::Cli::parse();
    cmd.run().await
}
