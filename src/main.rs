//! arcmount — mount archives into a virtual filesystem tree and measure
//! read throughput.
//!
//! Thin binary entry point. All logic lives in the `arcmount-core`
//! and `arcmount-cli` crates.

use clap::Parser;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    let cli = arcmount_cli::Cli::parse();

    // Initialise structured logging. RUST_LOG wins over --verbose.
    let level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("arcmount starting");

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    arcmount_cli::run(&cli, &mut out)
}
