mod cli;
mod engine;
mod error;
mod evaluator;
mod health;
mod metrics;
mod model;
mod orchestrator;
mod registry;
mod report;
#[cfg(test)]
mod testing;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

fn init_logging(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Cli::parse();
    init_logging(&args.log_level);

    match cli::run(args).await {
        Ok(()) => {
            // Stdin may still be held by the blocking reader; exit explicitly.
            std::process::exit(0);
        }
        Err(e) => Err(e),
    }
}
